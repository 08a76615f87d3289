//! Advisory read-through cache for task reads.
//!
//! Single tasks live under `task:{id}:{generation}` and list views under
//! `tasks:{org}:{branch}:{generation}:{shape}`. Each task and each tenant
//! scope has a generation token, and invalidation swaps it for a fresh random
//! one so every entry cached before the mutation becomes unreachable. This
//! also covers a read that loaded the old record and writes it back after the
//! mutation: it lands under the retired token. A missing token is replaced
//! with a fresh one, so evicting it cannot resurrect old entries.
//!
//! Every cache failure is logged and treated as a miss.

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::sync::Arc;

use taskhub_core::config::CacheConfig;
use taskhub_core::error::Result;
use taskhub_core::traits::CacheStore;
use taskhub_core::types::{Task, TenantScope, new_id};

const GENERATION_TTL_SECS: u64 = 86_400;

#[derive(Clone)]
pub struct TaskCache {
    store: Arc<dyn CacheStore>,
    task_ttl_secs: u64,
    list_ttl_secs: u64,
}

impl TaskCache {
    pub fn new(store: Arc<dyn CacheStore>, config: &CacheConfig) -> Self {
        Self {
            store,
            task_ttl_secs: config.task_ttl_secs,
            list_ttl_secs: config.list_ttl_secs,
        }
    }

    fn task_generation_key(task_id: &str) -> String {
        format!("task:gen:{task_id}")
    }

    fn generation_key(scope: &TenantScope) -> String {
        format!("tasks:gen:{}", scope.key())
    }

    /// Current token stored under `key`, minted when absent.
    async fn generation(&self, key: &str) -> String {
        match self.store.get(key).await {
            Ok(Some(token)) => token,
            Ok(None) => {
                let token = new_id();
                if let Err(e) = self.store.set(key, &token, GENERATION_TTL_SECS).await {
                    tracing::warn!("⚠️ Cache generation write failed for {key}: {e}");
                }
                token
            }
            Err(e) => {
                tracing::warn!("⚠️ Cache generation read failed for {key}: {e}");
                new_id()
            }
        }
    }

    /// Swap the token under `key`; fall back to deleting it.
    async fn bump(&self, key: &str) {
        if let Err(e) = self.store.set(key, &new_id(), GENERATION_TTL_SECS).await {
            tracing::warn!("⚠️ Cache generation bump failed for {key}: {e}");
            if let Err(e) = self.store.delete(key).await {
                tracing::warn!("⚠️ Cache generation delete failed for {key}: {e}");
            }
        }
    }

    /// Key for the single-task entry of `task_id`.
    pub async fn task_key(&self, task_id: &str) -> String {
        let token = self.generation(&Self::task_generation_key(task_id)).await;
        format!("task:{task_id}:{token}")
    }

    /// Key for a list view of `scope` with the given query shape.
    pub async fn list_key(&self, scope: &TenantScope, shape: &str) -> String {
        let token = self.generation(&Self::generation_key(scope)).await;
        format!("tasks:{}:{token}:{shape}", scope.key())
    }

    /// Return the cached value under `key`, or compute, store and return it.
    pub async fn read_through<T, F, Fut>(&self, key: &str, ttl_secs: u64, compute: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        match self.store.get(key).await {
            Ok(Some(raw)) => match serde_json::from_str::<T>(&raw) {
                Ok(value) => return Ok(value),
                Err(e) => tracing::warn!("⚠️ Dropping undecodable cache entry {key}: {e}"),
            },
            Ok(None) => {}
            Err(e) => tracing::warn!("⚠️ Cache read failed for {key}: {e}"),
        }

        let value = compute().await?;
        match serde_json::to_string(&value) {
            Ok(raw) => {
                if let Err(e) = self.store.set(key, &raw, ttl_secs).await {
                    tracing::warn!("⚠️ Cache write failed for {key}: {e}");
                }
            }
            Err(e) => tracing::warn!("⚠️ Cache encode failed for {key}: {e}"),
        }
        Ok(value)
    }

    pub fn task_ttl(&self) -> u64 {
        self.task_ttl_secs
    }

    pub fn list_ttl(&self) -> u64 {
        self.list_ttl_secs
    }

    /// Retire every list view of `scope` and of its organisation-wide scope.
    pub async fn invalidate_scope(&self, scope: &TenantScope) {
        self.bump(&Self::generation_key(scope)).await;
        if scope.branch_id.is_some() {
            let org = TenantScope {
                organisation_id: scope.organisation_id.clone(),
                branch_id: None,
            };
            self.bump(&Self::generation_key(&org)).await;
        }
    }

    /// Retire the single-task entry and the task's list views.
    pub async fn invalidate_task(&self, task: &Task) {
        self.bump(&Self::task_generation_key(&task.id)).await;
        self.invalidate_scope(&task.scope).await;
    }
}
