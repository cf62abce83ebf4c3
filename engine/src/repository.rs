//! Repository collaborators the engine persists merged entities through.
//!
//! The engine only ever calls [`Repository::save`]. `fetch` is part of the
//! collaborator contract for the layers that build snapshots.

use crate::{EntityId, EntitySnapshot, EntityType};
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Failure reported by a repository.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    #[error("repository unavailable: {0}")]
    Unavailable(String),

    #[error("save rejected: {0}")]
    Rejected(String),

    #[error("wrong entity type: expected {expected}, got {got}")]
    WrongEntityType { expected: EntityType, got: EntityType },
}

/// Store of one entity type.
#[async_trait]
pub trait Repository: Send + Sync {
    fn entity_type(&self) -> EntityType;

    async fn fetch(&self, id: &str) -> Result<Option<EntitySnapshot>, RepositoryError>;

    async fn save(&self, entity: EntitySnapshot) -> Result<(), RepositoryError>;
}

/// Repositories keyed by the entity type they store.
#[derive(Clone, Default)]
pub struct RepositoryRegistry {
    repositories: HashMap<EntityType, Arc<dyn Repository>>,
}

impl RepositoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a repository under its own entity type.
    pub fn register(&mut self, repository: Arc<dyn Repository>) -> &mut Self {
        self.repositories
            .insert(repository.entity_type(), repository);
        self
    }

    pub fn with(mut self, repository: Arc<dyn Repository>) -> Self {
        self.register(repository);
        self
    }

    pub fn get(&self, entity_type: EntityType) -> Option<&Arc<dyn Repository>> {
        self.repositories.get(&entity_type)
    }

    pub fn entity_types(&self) -> impl Iterator<Item = EntityType> + '_ {
        self.repositories.keys().copied()
    }
}

impl std::fmt::Debug for RepositoryRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepositoryRegistry")
            .field("entity_types", &self.repositories.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// In-process repository.
///
/// Thread-safe and can be shared via `Arc`.
#[derive(Debug)]
pub struct InMemoryRepository {
    entity_type: EntityType,
    entities: DashMap<EntityId, EntitySnapshot>,
}

impl InMemoryRepository {
    pub fn new(entity_type: EntityType) -> Self {
        Self {
            entity_type,
            entities: DashMap::new(),
        }
    }

    pub fn new_shared(entity_type: EntityType) -> Arc<Self> {
        Arc::new(Self::new(entity_type))
    }

    /// Current copy of an entity, without going through the async API.
    pub fn get(&self, id: &str) -> Option<EntitySnapshot> {
        self.entities.get(id).map(|e| e.value().clone())
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    fn entity_type(&self) -> EntityType {
        self.entity_type
    }

    async fn fetch(&self, id: &str) -> Result<Option<EntitySnapshot>, RepositoryError> {
        Ok(self.get(id))
    }

    async fn save(&self, entity: EntitySnapshot) -> Result<(), RepositoryError> {
        if entity.entity_type != self.entity_type {
            return Err(RepositoryError::WrongEntityType {
                expected: self.entity_type,
                got: entity.entity_type,
            });
        }
        self.entities.insert(entity.id.clone(), entity);
        Ok(())
    }
}
