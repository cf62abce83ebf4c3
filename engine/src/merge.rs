//! Field-level diffing and merging of two conflict versions.
//!
//! Everything here is pure computation. A merge resolves every planned field
//! before building the merged snapshot, so an invalid instruction never yields
//! a partially merged entity.
//!
//! # Averages
//!
//! Numbers are averaged as exact decimals, parsed from their JSON text, and
//! then rounded to the precision the field is stored with:
//!
//! - `Integer`: 0 places
//! - `Decimal { scale }`: `scale` places
//! - `Float`: [`EngineConfig::float_scale`] places
//!
//! Ties follow [`EngineConfig::rounding`] (half-up unless configured).

use crate::config::{EngineConfig, RoundingMode, MAX_SCALE};
use crate::schema::{humanize, json_type_name};
use crate::{
    error::Result, ConflictDetails, ConflictVersion, EntitySnapshot, Error, FieldChange,
    FieldResolutionType, FieldType, Schema, SyncConflict,
};
use serde_json::{Number, Value};
use std::collections::HashSet;

/// A conflicting field paired with the instruction that resolves it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPlan {
    pub change: FieldChange,
    pub resolution: FieldResolutionType,
}

/// Diffs versions and resolves individual fields according to the schema.
#[derive(Debug, Clone)]
pub struct FieldMergeEngine {
    schema: Schema,
    config: EngineConfig,
}

impl FieldMergeEngine {
    pub fn new(schema: Schema, config: EngineConfig) -> Self {
        Self { schema, config }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn field_type(&self, local: &ConflictVersion, field: &str) -> FieldType {
        self.schema
            .get(local.snapshot.entity_type)
            .map_or(FieldType::Json, |s| s.field_type(field))
    }

    /// Fields whose values differ, in schema order, then undeclared fields by name.
    pub fn diff(&self, local: &ConflictVersion, remote: &ConflictVersion) -> Vec<FieldChange> {
        let entity_schema = self.schema.get(local.snapshot.entity_type);

        let declared: Vec<&str> = entity_schema
            .into_iter()
            .flat_map(|s| s.fields.iter().map(|f| f.name.as_str()))
            .collect();
        let declared_set: HashSet<&str> = declared.iter().copied().collect();
        let undeclared = local
            .snapshot
            .field_names_with(&remote.snapshot)
            .into_iter()
            .filter(|name| !declared_set.contains(name));

        declared
            .into_iter()
            .chain(undeclared)
            .filter_map(|name| {
                let old = local.snapshot.field(name);
                let new = remote.snapshot.field(name);
                if same_value(old, new) {
                    return None;
                }
                let display_name =
                    entity_schema.map_or_else(|| humanize(name), |s| s.display_name(name));
                Some(FieldChange {
                    field_name: name.to_string(),
                    display_name,
                    old_value: display_value(old),
                    new_value: display_value(new),
                    is_conflicting: true,
                })
            })
            .collect()
    }

    /// Diff of a conflict, packaged for display.
    pub fn details(&self, conflict: &SyncConflict) -> ConflictDetails {
        ConflictDetails {
            conflict_id: conflict.id(),
            entity_type: conflict.entity_type(),
            entity_id: conflict.entity_id().clone(),
            conflict_type: conflict.conflict_type(),
            changes: self.diff(conflict.local(), conflict.remote()),
        }
    }

    /// Resolve one changed field.
    pub fn resolve_field(
        &self,
        change: &FieldChange,
        resolution: &FieldResolutionType,
        local: &ConflictVersion,
        remote: &ConflictVersion,
    ) -> Result<Value> {
        let field = change.field_name.as_str();
        let local_value = local.snapshot.field(field);
        let remote_value = remote.snapshot.field(field);

        match resolution {
            FieldResolutionType::UseLocal => Ok(local_value.clone()),
            FieldResolutionType::UseRemote => Ok(remote_value.clone()),
            FieldResolutionType::Latest => {
                if remote.is_newer_than(local) {
                    Ok(remote_value.clone())
                } else {
                    Ok(local_value.clone())
                }
            }
            FieldResolutionType::Average => {
                let field_type = self.field_type(local, field);
                average(
                    field,
                    field_type,
                    local_value,
                    remote_value,
                    &self.config,
                )
            }
            FieldResolutionType::Concatenate { separator } => {
                let field_type = self.field_type(local, field);
                concatenate(field, field_type, local_value, remote_value, separator)
            }
        }
    }

    /// Build the merged snapshot: local values for unconflicting fields, the
    /// planned resolution for every changed field. A resolved `null` drops the key.
    pub fn merge(
        &self,
        local: &ConflictVersion,
        remote: &ConflictVersion,
        plan: &[FieldPlan],
    ) -> Result<EntitySnapshot> {
        let resolved = plan
            .iter()
            .map(|p| {
                let value = self.resolve_field(&p.change, &p.resolution, local, remote)?;
                tracing::debug!(
                    entity_id = %local.snapshot.id,
                    field = %p.change.field_name,
                    resolution = p.resolution.display_name(),
                    "Resolved field"
                );
                Ok((p.change.field_name.as_str(), value))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut fields = local
            .snapshot
            .fields()
            .cloned()
            .ok_or_else(|| Error::InvalidPayload("payload must be an object".into()))?;

        for (name, value) in resolved {
            if value.is_null() {
                fields.remove(name);
            } else {
                fields.insert(name.to_string(), value);
            }
        }

        Ok(EntitySnapshot::new(
            local.snapshot.id.clone(),
            local.snapshot.entity_type,
            Value::Object(fields),
        ))
    }
}

/// Render a value for display next to a field change.
pub fn display_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Array(items) => Some(
            items
                .iter()
                .filter_map(display_value)
                .collect::<Vec<_>>()
                .join(", "),
        ),
        Value::Object(_) => Some(value.to_string()),
    }
}

fn type_mismatch(field: &str, expected: impl ToString, got: impl ToString) -> Error {
    Error::TypeMismatch {
        field: field.to_string(),
        expected: expected.to_string(),
        got: got.to_string(),
    }
}

fn concatenate(
    field: &str,
    field_type: FieldType,
    local: &Value,
    remote: &Value,
    separator: &str,
) -> Result<Value> {
    if !field_type.is_text() {
        return Err(type_mismatch(field, FieldType::Text, field_type));
    }

    let as_text = |value: &Value| -> Result<Option<String>> {
        match value {
            Value::Null => Ok(None),
            Value::String(s) => Ok(Some(s.clone())),
            other => Err(type_mismatch(field, FieldType::Text, json_type_name(other))),
        }
    };

    Ok(match (as_text(local)?, as_text(remote)?) {
        (Some(l), Some(r)) => Value::String(format!("{l}{separator}{r}")),
        (Some(only), None) | (None, Some(only)) => Value::String(only),
        (None, None) => Value::Null,
    })
}

fn average(
    field: &str,
    field_type: FieldType,
    local: &Value,
    remote: &Value,
    config: &EngineConfig,
) -> Result<Value> {
    let scale = match field_type {
        FieldType::Integer => 0,
        FieldType::Decimal { scale } => scale.min(MAX_SCALE),
        FieldType::Float => config.float_scale.min(MAX_SCALE),
        other => return Err(type_mismatch(field, "numeric", other)),
    };

    let as_number = |value: &Value| -> Result<Option<Number>> {
        match value {
            Value::Null => Ok(None),
            Value::Number(n) => Ok(Some(n.clone())),
            other => Err(type_mismatch(field, field_type, json_type_name(other))),
        }
    };
    let (local, remote) = (as_number(local)?, as_number(remote)?);
    let exact = |n: &Number| Fixed::parse(&n.to_string());

    let mean = match (&local, &remote) {
        (Some(l), Some(r)) => exact(l).zip(exact(r)).and_then(|(l, r)| l.mean(&r)),
        (Some(only), None) | (None, Some(only)) => exact(only),
        (None, None) => return Ok(Value::Null),
    };
    let averaged = mean
        .and_then(|m| m.round_to(scale, config.rounding))
        .and_then(|m| m.to_json());

    match averaged {
        Some(value) => Ok(value),
        // Floats outside the exact range are averaged in binary
        None if field_type == FieldType::Float => {
            float_average(local.as_ref(), remote.as_ref(), scale).ok_or_else(|| {
                Error::InvalidPayload(format!("average of '{field}' is out of range"))
            })
        }
        None => Err(Error::InvalidPayload(format!("'{field}' is out of range"))),
    }
}

fn float_average(local: Option<&Number>, remote: Option<&Number>, scale: u32) -> Option<Value> {
    let mean = match (local.and_then(Number::as_f64), remote.and_then(Number::as_f64)) {
        (Some(l), Some(r)) => l / 2.0 + r / 2.0,
        (Some(only), None) | (None, Some(only)) => only,
        (None, None) => return None,
    };
    let rounded: f64 = format!("{mean:.prec$}", prec = scale as usize).parse().ok()?;
    Number::from_f64(rounded).map(Value::Number)
}

/// Equality that compares numbers by value, so `10` equals `10.0`.
pub(crate) fn same_value(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(a), Value::Number(b)) => same_number(a, b),
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(a, b)| same_value(a, b))
        }
        (Value::Object(a), Value::Object(b)) => {
            a.len() == b.len()
                && a.iter()
                    .all(|(key, value)| b.get(key).is_some_and(|other| same_value(value, other)))
        }
        _ => a == b,
    }
}

fn same_number(a: &Number, b: &Number) -> bool {
    if a == b {
        return true;
    }
    Fixed::parse(&a.to_string())
        .zip(Fixed::parse(&b.to_string()))
        .and_then(|(x, y)| {
            let exponent = x.exponent.max(y.exponent);
            Some(x.rescale(exponent)? == y.rescale(exponent)?)
        })
        .unwrap_or_else(|| a.as_f64() == b.as_f64())
}

/// Exact decimal: `mantissa / 10^exponent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Fixed {
    mantissa: i128,
    exponent: u32,
}

const MAX_EXPONENT: u32 = 36;

fn pow10(exponent: u32) -> Option<i128> {
    10i128.checked_pow(exponent)
}

impl Fixed {
    /// Parse JSON number text such as `-12.5`, `3`, or `1.5e-7`.
    fn parse(text: &str) -> Option<Self> {
        let (digits, shift) = match text.find(|c: char| c == 'e' || c == 'E') {
            Some(i) => (&text[..i], text[i + 1..].parse::<i32>().ok()?),
            None => (text, 0),
        };
        let (negative, digits) = match digits.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, digits),
        };
        let (int_part, frac_part) = digits.split_once('.').unwrap_or((digits, ""));

        let mut mantissa: i128 = 0;
        for c in int_part.chars().chain(frac_part.chars()) {
            let digit = c.to_digit(10)?;
            mantissa = mantissa.checked_mul(10)?.checked_add(i128::from(digit))?;
        }

        let mut exponent = i32::try_from(frac_part.len()).ok()? - shift;
        if exponent < 0 {
            mantissa = mantissa.checked_mul(pow10(exponent.unsigned_abs())?)?;
            exponent = 0;
        }
        let exponent = u32::try_from(exponent).ok()?;
        if exponent > MAX_EXPONENT {
            return None;
        }

        Some(Self {
            mantissa: if negative { -mantissa } else { mantissa },
            exponent,
        })
    }

    fn rescale(&self, exponent: u32) -> Option<i128> {
        self.mantissa
            .checked_mul(pow10(exponent.checked_sub(self.exponent)?)?)
    }

    /// `(self + other) / 2`, exact.
    fn mean(&self, other: &Fixed) -> Option<Fixed> {
        let exponent = self.exponent.max(other.exponent);
        let sum = self.rescale(exponent)?.checked_add(other.rescale(exponent)?)?;
        // x / 2 == x * 5 / 10
        Some(Fixed {
            mantissa: sum.checked_mul(5)?,
            exponent: exponent + 1,
        })
    }

    fn round_to(&self, scale: u32, mode: RoundingMode) -> Option<Fixed> {
        if self.exponent <= scale {
            return Some(Fixed {
                mantissa: self.rescale(scale)?,
                exponent: scale,
            });
        }

        let divisor = pow10(self.exponent - scale)?;
        let quotient = self.mantissa / divisor;
        let remainder = (self.mantissa % divisor).abs();
        let away = match (remainder * 2).cmp(&divisor) {
            std::cmp::Ordering::Greater => true,
            std::cmp::Ordering::Less => false,
            std::cmp::Ordering::Equal => match mode {
                RoundingMode::HalfUp => true,
                RoundingMode::HalfEven => quotient % 2 != 0,
            },
        };

        let mantissa = if away {
            quotient + self.mantissa.signum()
        } else {
            quotient
        };
        Some(Fixed {
            mantissa,
            exponent: scale,
        })
    }

    fn to_json(self) -> Option<Value> {
        if self.exponent == 0 {
            return i64::try_from(self.mantissa).ok().map(Value::from);
        }
        let divisor = pow10(self.exponent)?;
        let sign = if self.mantissa < 0 { "-" } else { "" };
        let text = format!(
            "{sign}{}.{:0width$}",
            (self.mantissa / divisor).abs(),
            (self.mantissa % divisor).abs(),
            width = self.exponent as usize
        );
        text.parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
    }
}
