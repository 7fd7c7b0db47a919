//! Storage backends for published songbook artifacts.
//!
//! The build pipeline only ever needs three things from storage: check whether
//! a key exists, read it back, and write it. Everything else (listing,
//! lifecycle rules, credentials) belongs to whoever operates the bucket or
//! directory. Backends are selected by configuration and passed around as a
//! [`BackendHandle`] so that concurrent builds and tests can share or swap them.

pub mod backend;
pub mod error;
mod path;

pub use crate::backend::StorageBackend;
pub use crate::path::validate as validate_path;
use std::sync::Arc;

pub type BackendHandle = Arc<dyn StorageBackend + Send + Sync>;
