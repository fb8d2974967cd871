//! services/client/src/app/queries.rs
//!
//! Typed read models for every screen: the cache key each one lives under
//! and the data-service query that fills it.

use bytes::Bytes;
use chrono::{NaiveDate, Utc};
use daily_gk_core::domain::{Bookmark, BookmarkedSummary, DigestFile, Quiz, Summary};
use daily_gk_core::ports::{BlobListOptions, DataService, Order, PortError, PortResult, RowQuery};
use futures::future::{BoxFuture, FutureExt};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::{debug, instrument};

use super::query_cache::{CacheEntry, CacheKey, QueryCache, QueryOptions};

pub const LATEST_SUMMARIES_LIMIT: usize = 20;
pub const DIGEST_LIST_LIMIT: usize = 50;
const BOOKMARKED_SUMMARY_COLUMNS: &str = "id,summaries(id,title,body,date,tags)";

/// Cache key constructors. Mutations invalidate through these, so reads and
/// writes always agree on key shape.
pub mod keys {
    use super::CacheKey;
    use chrono::NaiveDate;

    pub const SUMMARIES: &str = "summaries";
    pub const SUMMARY: &str = "summary";
    pub const BOOKMARK: &str = "bookmark";
    pub const BOOKMARKS: &str = "bookmarks";
    pub const QUIZ: &str = "quiz";
    pub const DIGEST_FILES: &str = "digest-files";

    pub fn latest_summaries() -> CacheKey {
        CacheKey::new(SUMMARIES, Vec::<String>::new())
    }

    pub fn summaries_on(date: NaiveDate) -> CacheKey {
        CacheKey::new(SUMMARIES, [date.to_string()])
    }

    pub fn summary(id: &str) -> CacheKey {
        CacheKey::new(SUMMARY, [id])
    }

    pub fn bookmark(summary_id: &str, user_id: &str) -> CacheKey {
        CacheKey::new(BOOKMARK, [summary_id, user_id])
    }

    pub fn bookmarks(user_id: &str) -> CacheKey {
        CacheKey::new(BOOKMARKS, [user_id])
    }

    pub fn quiz(date: NaiveDate) -> CacheKey {
        CacheKey::new(QUIZ, [date.to_string()])
    }

    pub fn digest_files() -> CacheKey {
        CacheKey::new(DIGEST_FILES, Vec::<String>::new())
    }
}

/// Decodes raw rows into `T`. A row that does not fit is a classified error,
/// not a panic.
pub fn decode_rows<T: DeserializeOwned>(table: &str, rows: Vec<serde_json::Value>) -> PortResult<Vec<T>> {
    rows.into_iter()
        .map(serde_json::from_value)
        .collect::<Result<Vec<T>, _>>()
        .map_err(|e| PortError::Unknown(format!("Malformed {} row: {}", table, e)))
}

fn rows_fetcher<T>(
    data: Arc<dyn DataService>,
    query: RowQuery,
) -> impl Fn() -> BoxFuture<'static, PortResult<Vec<T>>> + Send + Sync + 'static
where
    T: DeserializeOwned + Send + 'static,
{
    move || {
        let data = data.clone();
        let query = query.clone();
        async move {
            let rows = data.select(&query).await?;
            decode_rows(&query.table, rows)
        }
        .boxed()
    }
}

/// Like `rows_fetcher` but keeps only the first row, for "maybe single" reads.
fn first_row_fetcher<T>(
    data: Arc<dyn DataService>,
    query: RowQuery,
) -> impl Fn() -> BoxFuture<'static, PortResult<Option<T>>> + Send + Sync + 'static
where
    T: DeserializeOwned + Send + 'static,
{
    let rows = rows_fetcher::<T>(data, query);
    move || rows().map(|r| r.map(|rows| rows.into_iter().next())).boxed()
}

//=========================================================================================
// Read Models
//=========================================================================================

#[derive(Clone)]
pub struct Queries {
    cache: QueryCache,
    data: Arc<dyn DataService>,
    options: QueryOptions,
    digest_bucket: String,
}

impl Queries {
    pub fn new(
        cache: QueryCache,
        data: Arc<dyn DataService>,
        options: QueryOptions,
        digest_bucket: impl Into<String>,
    ) -> Self {
        Self {
            cache,
            data,
            options,
            digest_bucket: digest_bucket.into(),
        }
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    /// The newest summaries, newest first.
    pub async fn latest_summaries(&self) -> CacheEntry<Vec<Summary>> {
        let query = RowQuery::table("summaries")
            .order(Order::desc("date"))
            .limit(LATEST_SUMMARIES_LIMIT);
        self.cache
            .get(keys::latest_summaries(), rows_fetcher(self.data.clone(), query), self.options)
            .await
    }

    pub async fn summaries_on(&self, date: NaiveDate) -> CacheEntry<Vec<Summary>> {
        let query = RowQuery::table("summaries").eq("date", date.to_string());
        self.cache
            .get(keys::summaries_on(date), rows_fetcher(self.data.clone(), query), self.options)
            .await
    }

    pub async fn summary(&self, id: &str) -> CacheEntry<Option<Summary>> {
        let query = RowQuery::table("summaries").eq("id", id);
        self.cache
            .get(keys::summary(id), first_row_fetcher(self.data.clone(), query), self.options)
            .await
    }

    /// The caller's bookmark of `summary_id`, if any. `Idle` while signed out.
    pub async fn bookmark(&self, summary_id: &str, user_id: Option<&str>) -> CacheEntry<Option<Bookmark>> {
        let user = user_id.unwrap_or_default();
        let query = RowQuery::table("bookmarks")
            .eq("summary_id", summary_id)
            .eq("user_id", user);
        self.cache
            .get(
                keys::bookmark(summary_id, user),
                first_row_fetcher(self.data.clone(), query),
                self.options.enabled(user_id.is_some()),
            )
            .await
    }

    /// The caller's bookmarks joined with their summaries, newest first.
    /// `Idle` while signed out.
    pub async fn bookmarks(&self, user_id: Option<&str>) -> CacheEntry<Vec<BookmarkedSummary>> {
        let user = user_id.unwrap_or_default();
        let query = RowQuery::table("bookmarks")
            .select(BOOKMARKED_SUMMARY_COLUMNS)
            .eq("user_id", user)
            .order(Order::desc("created_at"));
        self.cache
            .get(
                keys::bookmarks(user),
                rows_fetcher(self.data.clone(), query),
                self.options.enabled(user_id.is_some()),
            )
            .await
    }

    pub async fn quiz_for(&self, date: NaiveDate) -> CacheEntry<Option<Quiz>> {
        let query = RowQuery::table("quizzes").eq("date", date.to_string());
        self.cache
            .get(keys::quiz(date), first_row_fetcher(self.data.clone(), query), self.options)
            .await
    }

    /// Today's quiz, "today" being the UTC calendar date.
    pub async fn todays_quiz(&self) -> CacheEntry<Option<Quiz>> {
        self.quiz_for(Utc::now().date_naive()).await
    }

    /// PDF digests in the digest bucket, newest first.
    pub async fn digest_files(&self) -> CacheEntry<Vec<DigestFile>> {
        let data = self.data.clone();
        let bucket = self.digest_bucket.clone();
        let fetcher = move || {
            let data = data.clone();
            let bucket = bucket.clone();
            async move {
                let options = BlobListOptions {
                    limit: DIGEST_LIST_LIMIT,
                    sort_by: Order::desc("created_at"),
                };
                let objects = data.list_blobs(&bucket, "", &options).await?;
                let files: Vec<DigestFile> = objects
                    .into_iter()
                    .map(DigestFile::from)
                    .filter(DigestFile::is_pdf)
                    .collect();
                debug!(bucket = %bucket, files = files.len(), "Listed digests");
                Ok::<_, PortError>(files)
            }
        };
        self.cache.get(keys::digest_files(), fetcher, self.options).await
    }

    /// Downloads one digest. Not cached.
    #[instrument(skip(self))]
    pub async fn download_digest(&self, name: &str) -> PortResult<Bytes> {
        self.data.download_blob(&self.digest_bucket, name).await
    }
}
