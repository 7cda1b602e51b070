//! Storage layer for sheetlens
//!
//! SQLite-backed configuration store:
//! - Schema migrations
//! - Key-value blobs for the connection settings and the report collection
//! - The [`SessionStore`] seam the sync controller persists through

pub mod repo;
pub mod schema;

pub use repo::{Database, SessionStore};
