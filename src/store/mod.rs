//! The datastore sits behind this trait. The web layer only ever sees
//! entities and property values; how they get to and from the store is up to
//! the implementation.

mod emulator;
mod memory;
mod wire;

pub use emulator::EmulatorClient;
pub use memory::MemoryStore;

use super::models::{Entity, EntityKey, EntityPage, ProjectContext};
use anyhow::Result;
use async_trait::async_trait;

#[async_trait]
pub trait Datastore: Send + Sync {
    /// Sorted, without the `__`-prefixed kinds the store keeps statistics in.
    async fn list_kinds(&self, ctx: &ProjectContext) -> Result<Vec<String>>;
    async fn list_entities(
        &self,
        ctx: &ProjectContext,
        kind: &str,
        limit: usize,
        offset: usize,
    ) -> Result<EntityPage>;
    async fn get_entity(
        &self,
        ctx: &ProjectContext,
        key: &EntityKey,
    ) -> Result<Option<Entity>>;
    /// Insert or overwrite. Returns the complete key, which is newly
    /// allocated when `entity.key` has no id.
    async fn put_entity(
        &self,
        ctx: &ProjectContext,
        entity: Entity,
    ) -> Result<EntityKey>;
    /// `Ok(false)` when there was nothing to delete.
    async fn delete_entity(
        &self,
        ctx: &ProjectContext,
        key: &EntityKey,
    ) -> Result<bool>;
}

pub fn is_internal_kind(kind: &str) -> bool {
    kind.starts_with("__")
}
