pub mod account_probe;
pub mod auth_bridge;
pub mod auth_flow;
pub mod mutations;
pub mod notice;
pub mod queries;
pub mod query_cache;
pub mod session_store;
pub mod state;

pub use auth_bridge::AuthBridge;
pub use mutations::{Mutations, ToggleOutcome};
pub use notice::Notice;
pub use queries::Queries;
pub use query_cache::{CacheEntry, CacheKey, FetchStatus, QueryCache, QueryOptions, Subscription};
pub use session_store::{SessionSnapshot, SessionStore};
pub use state::AppState;
