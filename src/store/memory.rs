use super::{is_internal_kind, Datastore};
use crate::models::{
    Entity, EntityId, EntityKey, EntityPage, ProjectContext, PropertyValue,
};
use anyhow::{bail, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

type Properties = BTreeMap<String, PropertyValue>;

#[derive(Default)]
struct Partition {
    entities: BTreeMap<(String, EntityId), Properties>,
    last_id: i64,
}

impl Partition {
    fn allocate_id(&mut self, kind: &str) -> EntityId {
        loop {
            self.last_id += 1;
            let id = EntityId::Id(self.last_id);
            if !self.entities.contains_key(&(kind.to_string(), id.clone())) {
                return id;
            }
        }
    }
}

/// Entities held in process memory, one partition per project. Ids are
/// allocated sequentially from 1.
#[derive(Default)]
pub struct MemoryStore {
    projects: RwLock<HashMap<String, Partition>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn entity_from(kind: &str, id: &EntityId, properties: &Properties) -> Entity {
    Entity {
        key: EntityKey::new(kind, id.clone()),
        properties: properties.clone(),
    }
}

#[async_trait]
impl Datastore for MemoryStore {
    async fn list_kinds(&self, ctx: &ProjectContext) -> Result<Vec<String>> {
        let projects = self.projects.read().await;
        let Some(partition) = projects.get(&ctx.project_id) else {
            return Ok(vec![]);
        };
        let mut kinds: Vec<String> = partition
            .entities
            .keys()
            .map(|(kind, _)| kind.clone())
            .filter(|kind| !is_internal_kind(kind))
            .collect();
        kinds.dedup();
        Ok(kinds)
    }

    async fn list_entities(
        &self,
        ctx: &ProjectContext,
        kind: &str,
        limit: usize,
        offset: usize,
    ) -> Result<EntityPage> {
        let projects = self.projects.read().await;
        let Some(partition) = projects.get(&ctx.project_id) else {
            return Ok(EntityPage::default());
        };
        let of_kind = partition
            .entities
            .iter()
            .filter(|((k, _), _)| k == kind);
        let total_count = of_kind.clone().count();
        let entities = of_kind
            .skip(offset)
            .take(limit)
            .map(|((k, id), props)| entity_from(k, id, props))
            .collect();
        Ok(EntityPage {
            entities,
            total_count,
        })
    }

    async fn get_entity(
        &self,
        ctx: &ProjectContext,
        key: &EntityKey,
    ) -> Result<Option<Entity>> {
        let Some(id) = &key.id else {
            return Ok(None);
        };
        let projects = self.projects.read().await;
        Ok(projects.get(&ctx.project_id).and_then(|partition| {
            partition
                .entities
                .get(&(key.kind.clone(), id.clone()))
                .map(|props| entity_from(&key.kind, id, props))
        }))
    }

    async fn put_entity(
        &self,
        ctx: &ProjectContext,
        entity: Entity,
    ) -> Result<EntityKey> {
        if entity.key.kind.is_empty() {
            bail!("entity kind must not be empty");
        }
        if let Some(EntityId::Id(0)) = entity.key.id {
            bail!("entity id 0 is reserved");
        }
        let mut projects = self.projects.write().await;
        let partition = projects.entry(ctx.project_id.clone()).or_default();
        let id = match entity.key.id {
            Some(id) => id,
            None => partition.allocate_id(&entity.key.kind),
        };
        partition
            .entities
            .insert((entity.key.kind.clone(), id.clone()), entity.properties);
        Ok(EntityKey::new(&entity.key.kind, id))
    }

    async fn delete_entity(
        &self,
        ctx: &ProjectContext,
        key: &EntityKey,
    ) -> Result<bool> {
        let Some(id) = &key.id else {
            return Ok(false);
        };
        let mut projects = self.projects.write().await;
        Ok(projects
            .get_mut(&ctx.project_id)
            .and_then(|partition| {
                partition.entities.remove(&(key.kind.clone(), id.clone()))
            })
            .is_some())
    }
}
