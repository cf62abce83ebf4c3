//! Schema definition and validation.
//!
//! Schemas declare the fields of each entity type. The merge engine uses the
//! declared [`FieldType`] to decide which field resolutions are legal and what
//! precision an averaged value is stored with.

use crate::{error::Result, EntityType, Error};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Field types supported in schemas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum FieldType {
    Text,
    Integer,
    /// Fixed-point number stored with `scale` decimal places (currency)
    Decimal { scale: u32 },
    Float,
    Bool,
    /// Milliseconds since epoch or an RFC 3339 string
    Timestamp,
    /// Reference to another record
    Identifier,
    List,
    /// Arbitrary nested JSON
    Json,
}

impl FieldType {
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            FieldType::Integer | FieldType::Decimal { .. } | FieldType::Float
        )
    }

    pub fn is_text(&self) -> bool {
        matches!(self, FieldType::Text)
    }
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldType::Text => write!(f, "Text"),
            FieldType::Integer => write!(f, "Integer"),
            FieldType::Decimal { scale } => write!(f, "Decimal({scale})"),
            FieldType::Float => write!(f, "Float"),
            FieldType::Bool => write!(f, "Bool"),
            FieldType::Timestamp => write!(f, "Timestamp"),
            FieldType::Identifier => write!(f, "Identifier"),
            FieldType::List => write!(f, "List"),
            FieldType::Json => write!(f, "Json"),
        }
    }
}

/// Definition of a field in an entity schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDef {
    /// Field name, as it appears in payloads
    pub name: String,
    /// Label shown next to field changes
    pub display_name: String,
    /// Field type
    pub field_type: FieldType,
    /// Whether this field is required
    pub required: bool,
}

impl FieldDef {
    /// Create a new required field definition.
    pub fn required(name: impl Into<String>, field_type: FieldType) -> Self {
        let name = name.into();
        Self {
            display_name: humanize(&name),
            name,
            field_type,
            required: true,
        }
    }

    /// Create a new optional field definition.
    pub fn optional(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            required: false,
            ..Self::required(name, field_type)
        }
    }

    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = display_name.into();
        self
    }

    /// Validate a JSON value against this field definition.
    pub fn validate(&self, value: Option<&serde_json::Value>) -> Result<()> {
        match value {
            None if self.required => Err(Error::MissingRequiredField(self.name.clone())),
            None => Ok(()),
            Some(serde_json::Value::Null) if self.required => {
                Err(Error::MissingRequiredField(self.name.clone()))
            }
            Some(serde_json::Value::Null) => Ok(()),
            Some(v) => self.validate_type(v),
        }
    }

    fn validate_type(&self, value: &serde_json::Value) -> Result<()> {
        let valid = match self.field_type {
            FieldType::Text | FieldType::Identifier => value.is_string(),
            FieldType::Integer => value.is_i64() || value.is_u64(),
            FieldType::Decimal { .. } | FieldType::Float => value.is_number(),
            FieldType::Bool => value.is_boolean(),
            FieldType::Timestamp => value.is_u64() || value.is_i64() || value.is_string(),
            FieldType::List => value.is_array(),
            FieldType::Json => true,
        };

        if valid {
            Ok(())
        } else {
            Err(Error::TypeMismatch {
                field: self.name.clone(),
                expected: self.field_type.to_string(),
                got: json_type_name(value).to_string(),
            })
        }
    }
}

pub(crate) fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "Null",
        serde_json::Value::Bool(_) => "Bool",
        serde_json::Value::Number(n) if n.is_i64() || n.is_u64() => "Integer",
        serde_json::Value::Number(_) => "Float",
        serde_json::Value::String(_) => "Text",
        serde_json::Value::Array(_) => "List",
        serde_json::Value::Object(_) => "Object",
    }
}

/// "purchasePrice" -> "Purchase Price"
pub(crate) fn humanize(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for (i, c) in name.chars().enumerate() {
        if i == 0 {
            out.extend(c.to_uppercase());
        } else if c.is_uppercase() {
            out.push(' ');
            out.push(c);
        } else if c == '_' {
            out.push(' ');
        } else {
            out.push(c);
        }
    }
    out
}

/// Schema for one entity type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitySchema {
    pub entity_type: EntityType,
    /// Field definitions, in display order
    pub fields: Vec<FieldDef>,
}

impl EntitySchema {
    pub fn new(entity_type: EntityType, fields: Vec<FieldDef>) -> Self {
        Self {
            entity_type,
            fields,
        }
    }

    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Declared type of a field. Undeclared fields are `Json`.
    pub fn field_type(&self, name: &str) -> FieldType {
        self.field(name).map_or(FieldType::Json, |f| f.field_type)
    }

    pub fn display_name(&self, name: &str) -> String {
        self.field(name)
            .map_or_else(|| humanize(name), |f| f.display_name.clone())
    }

    /// Validate a payload against this schema. Undeclared keys are allowed.
    pub fn validate_payload(&self, payload: &serde_json::Value) -> Result<()> {
        let obj = payload
            .as_object()
            .ok_or_else(|| Error::InvalidPayload("payload must be an object".into()))?;

        for field in &self.fields {
            field.validate(obj.get(&field.name))?;
        }

        Ok(())
    }
}

/// Schemas for every synchronizable entity type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schema {
    pub entities: HashMap<EntityType, EntitySchema>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entity schema, replacing any previous one for that type.
    pub fn add_entity(&mut self, schema: EntitySchema) -> &mut Self {
        self.entities.insert(schema.entity_type, schema);
        self
    }

    /// Builder-style method to add an entity schema.
    pub fn with_entity(mut self, schema: EntitySchema) -> Self {
        self.add_entity(schema);
        self
    }

    pub fn get(&self, entity_type: EntityType) -> Option<&EntitySchema> {
        self.entities.get(&entity_type)
    }

    pub fn require(&self, entity_type: EntityType) -> Result<&EntitySchema> {
        self.get(entity_type)
            .ok_or(Error::UnsupportedEntityType(entity_type))
    }

    /// Built-in schemas for the home inventory record kinds.
    pub fn inventory() -> Self {
        const CURRENCY: FieldType = FieldType::Decimal { scale: 2 };

        let item = EntitySchema::new(
            EntityType::Item,
            vec![
                FieldDef::required("name", FieldType::Text),
                FieldDef::optional("brand", FieldType::Text),
                FieldDef::optional("model", FieldType::Text),
                FieldDef::optional("category", FieldType::Text),
                FieldDef::optional("condition", FieldType::Text),
                FieldDef::optional("quantity", FieldType::Integer),
                FieldDef::optional("value", CURRENCY),
                FieldDef::optional("purchasePrice", CURRENCY),
                FieldDef::optional("purchaseDate", FieldType::Timestamp),
                FieldDef::optional("notes", FieldType::Text),
                FieldDef::optional("barcode", FieldType::Text),
                FieldDef::optional("serialNumber", FieldType::Text),
                FieldDef::optional("tags", FieldType::List),
                FieldDef::optional("imageIds", FieldType::List).with_display_name("Images"),
                FieldDef::optional("locationId", FieldType::Identifier)
                    .with_display_name("Location"),
                FieldDef::optional("storageUnitId", FieldType::Identifier)
                    .with_display_name("Storage Unit"),
                FieldDef::optional("warrantyId", FieldType::Identifier)
                    .with_display_name("Warranty"),
                FieldDef::optional("storeName", FieldType::Text).with_display_name("Store"),
            ],
        );

        let receipt = EntitySchema::new(
            EntityType::Receipt,
            vec![
                FieldDef::required("storeName", FieldType::Text).with_display_name("Store"),
                FieldDef::optional("purchaseDate", FieldType::Timestamp),
                FieldDef::optional("totalAmount", CURRENCY),
                FieldDef::optional("taxAmount", CURRENCY),
                FieldDef::optional("currency", FieldType::Text),
                FieldDef::optional("paymentMethod", FieldType::Text),
                FieldDef::optional("receiptNumber", FieldType::Text),
                FieldDef::optional("itemId", FieldType::Identifier).with_display_name("Item"),
                FieldDef::optional("notes", FieldType::Text),
            ],
        );

        let location = EntitySchema::new(
            EntityType::Location,
            vec![
                FieldDef::required("name", FieldType::Text),
                FieldDef::optional("icon", FieldType::Text),
                FieldDef::optional("notes", FieldType::Text),
                FieldDef::optional("parentId", FieldType::Identifier)
                    .with_display_name("Parent Location"),
            ],
        );

        Schema::new()
            .with_entity(item)
            .with_entity(receipt)
            .with_entity(location)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn test_schema() -> EntitySchema {
        EntitySchema::new(
            EntityType::Item,
            vec![
                FieldDef::required("name", FieldType::Text),
                FieldDef::required("quantity", FieldType::Integer),
                FieldDef::optional("purchasePrice", FieldType::Decimal { scale: 2 }),
            ],
        )
    }

    #[test]
    fn validate_valid_payload() {
        let schema = test_schema();

        let payload = json!({"name": "Desk Lamp", "quantity": 2});
        assert!(schema.validate_payload(&payload).is_ok());

        let payload = json!({"name": "Desk Lamp", "quantity": 2, "purchasePrice": 39.99});
        assert!(schema.validate_payload(&payload).is_ok());
    }

    #[test]
    fn validate_missing_required_field() {
        let schema = test_schema();

        let result = schema.validate_payload(&json!({"name": "Desk Lamp"}));
        assert!(matches!(result, Err(Error::MissingRequiredField(f)) if f == "quantity"));

        let result = schema.validate_payload(&json!({"name": null, "quantity": 1}));
        assert!(matches!(result, Err(Error::MissingRequiredField(f)) if f == "name"));
    }

    #[test]
    fn validate_wrong_type() {
        let schema = test_schema();

        let result = schema.validate_payload(&json!({"name": "Desk Lamp", "quantity": "two"}));
        assert!(matches!(result, Err(Error::TypeMismatch { field, .. }) if field == "quantity"));
    }

    #[test]
    fn validate_non_object_payload() {
        let result = test_schema().validate_payload(&json!(["not", "an", "object"]));
        assert!(matches!(result, Err(Error::InvalidPayload(_))));
    }

    #[test]
    fn undeclared_fields_are_json() {
        let schema = test_schema();
        assert_eq!(schema.field_type("customField"), FieldType::Json);
        assert_eq!(schema.field_type("quantity"), FieldType::Integer);
        assert!(schema
            .validate_payload(&json!({"name": "x", "quantity": 1, "extra": [1, 2]}))
            .is_ok());
    }

    #[test]
    fn display_names() {
        let schema = Schema::inventory();
        let item = schema.get(EntityType::Item).unwrap();
        assert_eq!(item.display_name("purchasePrice"), "Purchase Price");
        assert_eq!(item.display_name("locationId"), "Location");
        assert_eq!(item.display_name("someNewField"), "Some New Field");
    }

    #[test]
    fn inventory_covers_core_types() {
        let schema = Schema::inventory();
        for entity_type in [EntityType::Item, EntityType::Receipt, EntityType::Location] {
            assert!(schema.require(entity_type).is_ok());
        }
        assert!(matches!(
            schema.require(EntityType::Document),
            Err(Error::UnsupportedEntityType(EntityType::Document))
        ));

        let receipt = schema.get(EntityType::Receipt).unwrap();
        assert_eq!(
            receipt.field_type("totalAmount"),
            FieldType::Decimal { scale: 2 }
        );
    }

    #[test]
    fn field_type_categories() {
        assert!(FieldType::Integer.is_numeric());
        assert!(FieldType::Decimal { scale: 2 }.is_numeric());
        assert!(!FieldType::Identifier.is_numeric());
        assert!(FieldType::Text.is_text());
        assert!(!FieldType::Identifier.is_text());
        assert_eq!(FieldType::Decimal { scale: 2 }.to_string(), "Decimal(2)");
    }

    #[test]
    fn schema_serialization() {
        let schema = Schema::inventory();
        let json = serde_json::to_string(&schema).unwrap();
        let parsed: Schema = serde_json::from_str(&json).unwrap();
        assert_eq!(schema, parsed);
    }
}
