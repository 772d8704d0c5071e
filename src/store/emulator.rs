use super::{
    is_internal_kind,
    wire::{
        entity_to_wire, key_from_wire, key_to_wire, properties_from_wire,
        CommitRequest, CommitResponse, LookupRequest, LookupResponse, Mutation,
        PartitionId, Query, RunQueryRequest, RunQueryResponse, WireEntity,
    },
    Datastore,
};
use crate::models::{Entity, EntityKey, EntityPage, ProjectContext};
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use hyper::{client::HttpConnector, Body, Client, Method, Request};
use serde::{de::DeserializeOwned, Serialize};

/// Talks to the Datastore emulator's v1 REST API.
pub struct EmulatorClient {
    base_url: String,
    http: Client<HttpConnector>,
}

impl EmulatorClient {
    /// `host` is what `DATASTORE_EMULATOR_HOST` holds, e.g. `localhost:8081`.
    pub fn new(host: &str) -> Self {
        let host = host.trim_end_matches('/');
        let base_url = if host.starts_with("http://") {
            host.to_string()
        } else {
            format!("http://{host}")
        };
        Self {
            base_url,
            http: Client::new(),
        }
    }

    fn url(&self, ctx: &ProjectContext, method: &str) -> String {
        format!(
            "{}/v1/projects/{}:{method}",
            self.base_url,
            urlencoding::encode(&ctx.project_id)
        )
    }

    async fn call<Req, Resp>(
        &self,
        ctx: &ProjectContext,
        method: &str,
        body: &Req,
    ) -> Result<Resp>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let url = self.url(ctx, method);
        tracing::debug!(%url, "datastore request");
        let request = Request::builder()
            .method(Method::POST)
            .uri(&url)
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(body)?))?;
        let response = self
            .http
            .request(request)
            .await
            .with_context(|| format!("could not reach the emulator at {}", self.base_url))?;
        let status = response.status();
        let bytes = hyper::body::to_bytes(response.into_body()).await?;
        if !status.is_success() {
            bail!(
                "{method} failed with {status}: {}",
                String::from_utf8_lossy(&bytes)
            );
        }
        serde_json::from_slice(&bytes)
            .with_context(|| format!("unexpected {method} response"))
    }

    /// Runs `query` to completion. The emulator hands results back in
    /// batches, and an offset may be only partly consumed by one batch.
    async fn run_query(
        &self,
        ctx: &ProjectContext,
        mut query: Query,
    ) -> Result<Vec<WireEntity>> {
        let mut entities = vec![];
        loop {
            let response: RunQueryResponse = self
                .call(
                    ctx,
                    "runQuery",
                    &RunQueryRequest {
                        partition_id: PartitionId {
                            project_id: ctx.project_id.clone(),
                            namespace_id: None,
                        },
                        query: &query,
                    },
                )
                .await?;
            let batch = response.batch;
            let finished = batch.is_finished();
            let returned = batch.entity_results.len() as i32;
            entities.extend(batch.entity_results.into_iter().map(|r| r.entity));
            if finished {
                break;
            }
            let Some(cursor) = batch.end_cursor else {
                break;
            };
            if let Some(offset) = query.offset.as_mut() {
                *offset = (*offset - batch.skipped_results).max(0);
            }
            if let Some(limit) = query.limit.as_mut() {
                *limit -= returned;
                if *limit <= 0 {
                    break;
                }
            }
            query.start_cursor = Some(cursor);
        }
        Ok(entities)
    }

    async fn count(&self, ctx: &ProjectContext, kind: &str) -> Result<usize> {
        Ok(self
            .run_query(ctx, Query::of_kind(kind).keys_only())
            .await?
            .len())
    }

    async fn lookup(
        &self,
        ctx: &ProjectContext,
        key: &EntityKey,
    ) -> Result<Option<WireEntity>> {
        let keys = [key_to_wire(&ctx.project_id, key)];
        let response: LookupResponse = self
            .call(ctx, "lookup", &LookupRequest { keys: &keys })
            .await?;
        Ok(response.found.into_iter().next().map(|r| r.entity))
    }

    async fn commit(
        &self,
        ctx: &ProjectContext,
        mutation: Mutation,
    ) -> Result<CommitResponse> {
        self.call(ctx, "commit", &CommitRequest::non_transactional(mutation))
            .await
    }
}

fn entity_from_wire(entity: WireEntity) -> Result<Entity> {
    let key = entity
        .key
        .as_ref()
        .ok_or_else(|| anyhow!("datastore returned an entity without a key"))?;
    Ok(Entity {
        key: key_from_wire(key)?,
        properties: properties_from_wire(&entity.properties),
    })
}

fn to_i32(n: usize) -> i32 {
    i32::try_from(n).unwrap_or(i32::MAX)
}

#[async_trait]
impl Datastore for EmulatorClient {
    async fn list_kinds(&self, ctx: &ProjectContext) -> Result<Vec<String>> {
        let found = self
            .run_query(ctx, Query::of_kind("__kind__").keys_only())
            .await?;
        let mut kinds = vec![];
        for entity in found {
            let Some(key) = entity.key.as_ref() else {
                continue;
            };
            let key = key_from_wire(key)?;
            if let Some(id) = key.id {
                let kind = id.to_string();
                if !is_internal_kind(&kind) {
                    kinds.push(kind);
                }
            }
        }
        kinds.sort();
        Ok(kinds)
    }

    async fn list_entities(
        &self,
        ctx: &ProjectContext,
        kind: &str,
        limit: usize,
        offset: usize,
    ) -> Result<EntityPage> {
        let mut query = Query::of_kind(kind);
        query.limit = Some(to_i32(limit));
        query.offset = Some(to_i32(offset));
        let (total_count, found) =
            futures::join!(self.count(ctx, kind), self.run_query(ctx, query));
        let entities = found?
            .into_iter()
            .map(entity_from_wire)
            .collect::<Result<Vec<_>>>()?;
        Ok(EntityPage {
            entities,
            total_count: total_count?,
        })
    }

    async fn get_entity(
        &self,
        ctx: &ProjectContext,
        key: &EntityKey,
    ) -> Result<Option<Entity>> {
        if key.id.is_none() {
            return Ok(None);
        }
        self.lookup(ctx, key).await?.map(entity_from_wire).transpose()
    }

    async fn put_entity(
        &self,
        ctx: &ProjectContext,
        entity: Entity,
    ) -> Result<EntityKey> {
        let wire = entity_to_wire(&ctx.project_id, &entity.key, &entity.properties);
        let response = self.commit(ctx, Mutation::Upsert(wire)).await?;
        let allocated = response
            .mutation_results
            .into_iter()
            .next()
            .and_then(|r| r.key);
        match (entity.key.id.is_some(), allocated) {
            (true, _) => Ok(entity.key),
            (false, Some(key)) => key_from_wire(&key),
            (false, None) => bail!("datastore did not allocate an id"),
        }
    }

    async fn delete_entity(
        &self,
        ctx: &ProjectContext,
        key: &EntityKey,
    ) -> Result<bool> {
        if self.get_entity(ctx, key).await?.is_none() {
            return Ok(false);
        }
        self.commit(ctx, Mutation::Delete(key_to_wire(&ctx.project_id, key)))
            .await?;
        Ok(true)
    }
}
