//! Encore Shared Library
//!
//! Crate-spanning pieces used by both the API server and the payments core:
//! database pool construction and the migrations runner.

pub mod db;

pub use db::{create_migration_pool, create_pool, run_migrations};
