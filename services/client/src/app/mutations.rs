//! services/client/src/app/mutations.rs
//!
//! Writes that change server state and then invalidate the cache keys they
//! affect. Writes are not optimistic: no entry changes until the server has
//! accepted the write, and a failed write touches nothing.

use daily_gk_core::ports::{DataService, PortResult};
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::queries::{keys, Queries};
use super::query_cache::{CacheKey, QueryCache};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToggleOutcome {
    Added { bookmark_id: String },
    Removed { bookmark_id: String },
}

#[derive(Clone)]
pub struct Mutations {
    cache: QueryCache,
    data: Arc<dyn DataService>,
    queries: Queries,
}

impl Mutations {
    pub fn new(cache: QueryCache, data: Arc<dyn DataService>, queries: Queries) -> Self {
        Self { cache, data, queries }
    }

    /// Runs `write`; on success invalidates exactly `affected`, on failure
    /// returns the error and leaves the cache alone.
    pub async fn execute<T, Fut>(&self, label: &str, write: Fut, affected: &[CacheKey]) -> PortResult<T>
    where
        Fut: Future<Output = PortResult<T>>,
    {
        match write.await {
            Ok(value) => {
                let invalidated = self.cache.invalidate(|key| affected.contains(key));
                info!(mutation = label, invalidated, "Mutation applied");
                Ok(value)
            }
            Err(e) => {
                warn!(mutation = label, error = %e, "Mutation failed");
                Err(e)
            }
        }
    }

    /// Adds the bookmark if `user_id` has none for `summary_id`, removes it
    /// otherwise.
    #[instrument(skip(self))]
    pub async fn toggle_bookmark(&self, summary_id: &str, user_id: &str) -> PortResult<ToggleOutcome> {
        let existing = self
            .queries
            .bookmark(summary_id, Some(user_id))
            .await
            .into_result()?;
        let affected = [keys::bookmark(summary_id, user_id), keys::bookmarks(user_id)];

        match &*existing {
            Some(bookmark) => {
                let bookmark_id = bookmark.id.clone();
                let filters = [("id".to_string(), bookmark_id.clone())];
                self.execute("remove bookmark", self.data.delete("bookmarks", &filters), &affected)
                    .await?;
                Ok(ToggleOutcome::Removed { bookmark_id })
            }
            None => {
                let bookmark_id = Uuid::new_v4().to_string();
                let row = json!({
                    "id": bookmark_id,
                    "user_id": user_id,
                    "summary_id": summary_id,
                });
                self.execute("add bookmark", self.data.insert("bookmarks", row), &affected)
                    .await?;
                Ok(ToggleOutcome::Added { bookmark_id })
            }
        }
    }
}
