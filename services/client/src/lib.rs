//! services/client/src/lib.rs
//!
//! Client runtime for Daily GK: Supabase adapters, the session store and
//! query cache, and the flows the screens drive.

pub mod adapters;
pub mod app;
pub mod config;
pub mod error;
