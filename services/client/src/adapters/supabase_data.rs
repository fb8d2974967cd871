//! services/client/src/adapters/supabase_data.rs
//!
//! This module contains the data adapter, which is the concrete implementation
//! of the `DataService` port from the `core` crate. Rows go through PostgREST
//! (`/rest/v1`), blobs through Supabase Storage (`/storage/v1`).

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use daily_gk_core::ports::{
    BlobListOptions, BlobObject, DataService, PortError, PortResult, RowQuery,
};
use reqwest::Method;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::debug;

use super::supabase_auth::SupabaseAuthAdapter;
use super::supabase_http::SupabaseHttp;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A data adapter that implements the `DataService` port.
///
/// Requests carry the signed-in user's token when there is one so row-level
/// security sees the right user.
#[derive(Clone)]
pub struct SupabaseDataAdapter {
    http: SupabaseHttp,
    auth: Arc<SupabaseAuthAdapter>,
}

impl SupabaseDataAdapter {
    /// Creates a new `SupabaseDataAdapter`.
    pub fn new(http: SupabaseHttp, auth: Arc<SupabaseAuthAdapter>) -> Self {
        Self { http, auth }
    }

    fn rest_url(&self, table: &str) -> String {
        self.http.url(&format!("/rest/v1/{}", table))
    }

    fn object_url(&self, bucket: &str, name: &str) -> PortResult<url::Url> {
        let mut url = url::Url::parse(&self.http.url("/storage/v1/object"))
            .map_err(|e| PortError::Unknown(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| PortError::Unknown("Storage URL cannot be a base".to_string()))?
            .push(bucket)
            .extend(name.split('/'));
        Ok(url)
    }
}

/// Renders a `RowQuery` as PostgREST query parameters.
fn postgrest_params(query: &RowQuery) -> Vec<(String, String)> {
    let mut params = vec![("select".to_string(), query.columns.clone())];
    params.extend(
        query
            .filters
            .iter()
            .map(|(column, value)| (column.clone(), format!("eq.{}", value))),
    );
    if let Some(order) = &query.order {
        let direction = if order.ascending { "asc" } else { "desc" };
        params.push(("order".to_string(), format!("{}.{}", order.column, direction)));
    }
    if let Some(limit) = query.limit {
        params.push(("limit".to_string(), limit.to_string()));
    }
    params
}

//=========================================================================================
// "Impure" Storage Record Structs
//=========================================================================================

#[derive(Deserialize)]
struct StorageObjectRecord {
    name: String,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
}

impl StorageObjectRecord {
    fn to_domain(self) -> BlobObject {
        BlobObject {
            name: self.name,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

//=========================================================================================
// `DataService` Trait Implementation
//=========================================================================================

#[async_trait]
impl DataService for SupabaseDataAdapter {
    async fn select(&self, query: &RowQuery) -> PortResult<Vec<serde_json::Value>> {
        let token = self.auth.access_token();
        let request = self
            .http
            .request(Method::GET, self.rest_url(&query.table), token.as_deref())
            .header("Accept", "application/json")
            .query(&postgrest_params(query));

        let response = self.http.send(request, "select rows").await?;
        let rows: Vec<serde_json::Value> = response
            .json()
            .await
            .map_err(|e| PortError::Unknown(e.to_string()))?;
        debug!(table = %query.table, rows = rows.len(), "Fetched rows");
        Ok(rows)
    }

    async fn insert(&self, table: &str, row: serde_json::Value) -> PortResult<()> {
        let token = self.auth.access_token();
        let request = self
            .http
            .request(Method::POST, self.rest_url(table), token.as_deref())
            .header("Prefer", "return=minimal")
            .json(&row);
        self.http.send(request, "insert row").await?;
        Ok(())
    }

    async fn delete(&self, table: &str, filters: &[(String, String)]) -> PortResult<()> {
        if filters.is_empty() {
            return Err(PortError::ValidationFailed(format!(
                "Refusing to delete from {} without a filter",
                table
            )));
        }
        let params: Vec<(String, String)> = filters
            .iter()
            .map(|(column, value)| (column.clone(), format!("eq.{}", value)))
            .collect();
        let token = self.auth.access_token();
        let request = self
            .http
            .request(Method::DELETE, self.rest_url(table), token.as_deref())
            .query(&params);
        self.http.send(request, "delete rows").await?;
        Ok(())
    }

    async fn list_blobs(
        &self,
        bucket: &str,
        prefix: &str,
        options: &BlobListOptions,
    ) -> PortResult<Vec<BlobObject>> {
        let token = self.auth.access_token();
        let order = if options.sort_by.ascending { "asc" } else { "desc" };
        let request = self
            .http
            .request(
                Method::POST,
                self.http.url(&format!("/storage/v1/object/list/{}", bucket)),
                token.as_deref(),
            )
            .json(&json!({
                "prefix": prefix,
                "limit": options.limit,
                "offset": 0,
                "sortBy": { "column": options.sort_by.column, "order": order },
            }));

        let response = self.http.send(request, "list blobs").await?;
        let records: Vec<StorageObjectRecord> = response
            .json()
            .await
            .map_err(|e| PortError::Unknown(e.to_string()))?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn download_blob(&self, bucket: &str, name: &str) -> PortResult<Bytes> {
        let token = self.auth.access_token();
        let url = self.object_url(bucket, name)?;
        let request = self.http.request(Method::GET, url, token.as_deref());
        let response = self.http.send(request, "download blob").await?;
        response
            .bytes()
            .await
            .map_err(|e| PortError::NetworkOrServiceUnavailable(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use daily_gk_core::ports::Order;

    #[test]
    fn row_query_renders_postgrest_params() {
        let query = RowQuery::table("bookmarks")
            .select("id,summaries(id,title)")
            .eq("user_id", "u1")
            .order(Order::desc("created_at"))
            .limit(5);

        assert_eq!(
            postgrest_params(&query),
            vec![
                ("select".to_string(), "id,summaries(id,title)".to_string()),
                ("user_id".to_string(), "eq.u1".to_string()),
                ("order".to_string(), "created_at.desc".to_string()),
                ("limit".to_string(), "5".to_string()),
            ]
        );
    }
}
