//! crates/daily_gk_core/src/ports.rs
//!
//! Defines the service contracts (traits) the client core depends on.
//! These traits form the boundary of the hexagonal architecture: the session
//! store, query cache and mutation coordinator only ever talk to an auth
//! provider, a data service and a navigator through these ports.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::Stream;
use std::pin::Pin;

use crate::domain::{DigestFile, ProviderEvent, Session, SignUpProfile};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// The classified error every port operation reports.
///
/// Adapters convert transport failures, HTTP statuses and provider error
/// bodies into one of these before anything reaches the core.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PortError {
    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),
    #[error("Already exists: {0}")]
    AlreadyExists(String),
    #[error("Network or service unavailable: {0}")]
    NetworkOrServiceUnavailable(String),
    #[error("Validation failed: {0}")]
    ValidationFailed(String),
    #[error("An unexpected error occurred: {0}")]
    Unknown(String),
}

impl PortError {
    /// The human-readable message without the classification prefix.
    pub fn message(&self) -> &str {
        match self {
            PortError::InvalidCredentials(m)
            | PortError::AlreadyExists(m)
            | PortError::NetworkOrServiceUnavailable(m)
            | PortError::ValidationFailed(m)
            | PortError::Unknown(m) => m,
        }
    }
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

/// Stream of raw provider events. Dropping it unsubscribes.
pub type AuthEventStream = Pin<Box<dyn Stream<Item = ProviderEvent> + Send>>;

//=========================================================================================
// Auth Provider
//=========================================================================================

#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn sign_up(&self, email: &str, password: &str, profile: &SignUpProfile)
        -> PortResult<()>;

    async fn sign_in(&self, email: &str, password: &str) -> PortResult<()>;

    async fn sign_out(&self) -> PortResult<()>;

    /// Sends a recovery link that lands on `redirect_to`.
    async fn reset_password_for_email(&self, email: &str, redirect_to: &str) -> PortResult<()>;

    /// Changes the password of the currently signed-in (or recovering) user.
    async fn update_password(&self, new_password: &str) -> PortResult<()>;

    /// The session the provider currently holds, if any.
    async fn get_session(&self) -> PortResult<Option<Session>>;

    /// Subscribes to session changes. Events are yielded in emission order.
    fn on_auth_state_change(&self) -> AuthEventStream;
}

//=========================================================================================
// Data Service
//=========================================================================================

/// Sort instruction for row queries and blob listings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub column: String,
    pub ascending: bool,
}

impl Order {
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            ascending: true,
        }
    }

    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            ascending: false,
        }
    }
}

/// A single-table row query with equality filters, ordering and a limit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowQuery {
    pub table: String,
    /// Column projection, PostgREST syntax (embedded resources allowed).
    pub columns: String,
    pub filters: Vec<(String, String)>,
    pub order: Option<Order>,
    pub limit: Option<usize>,
}

impl RowQuery {
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns: "*".to_string(),
            filters: Vec::new(),
            order: None,
            limit: None,
        }
    }

    pub fn select(mut self, columns: impl Into<String>) -> Self {
        self.columns = columns.into();
        self
    }

    pub fn eq(mut self, column: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.push((column.into(), value.into()));
        self
    }

    pub fn order(mut self, order: Order) -> Self {
        self.order = Some(order);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Options for listing a blob bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobListOptions {
    pub limit: usize,
    pub sort_by: Order,
}

/// An object found in a blob bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobObject {
    pub name: String,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<BlobObject> for DigestFile {
    fn from(blob: BlobObject) -> Self {
        DigestFile {
            name: blob.name,
            created_at: blob.created_at,
            updated_at: blob.updated_at,
        }
    }
}

#[async_trait]
pub trait DataService: Send + Sync {
    /// Runs a row query and returns the matching rows in order.
    async fn select(&self, query: &RowQuery) -> PortResult<Vec<serde_json::Value>>;

    async fn insert(&self, table: &str, row: serde_json::Value) -> PortResult<()>;

    /// Deletes the rows of `table` matching every equality filter.
    async fn delete(&self, table: &str, filters: &[(String, String)]) -> PortResult<()>;

    async fn list_blobs(
        &self,
        bucket: &str,
        prefix: &str,
        options: &BlobListOptions,
    ) -> PortResult<Vec<BlobObject>>;

    async fn download_blob(&self, bucket: &str, name: &str) -> PortResult<Bytes>;
}

//=========================================================================================
// Navigation
//=========================================================================================

/// Route of the screen where a recovering user picks a new password.
pub const RESET_PASSWORD_ROUTE: &str = "/reset-password";

/// The view layer's router, reduced to the one capability the core needs.
pub trait Navigator: Send + Sync {
    /// Hard navigation: replaces the current location, whatever it is.
    fn replace(&self, route: &str);
}
