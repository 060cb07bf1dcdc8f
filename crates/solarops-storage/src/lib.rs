// Postgres storage layer with sqlx
//
// This crate provides database implementations for core traits:
// - PgAutomationStore: implements AutomationStore and LocationResolver
// - PgStoreTransaction: implements StoreTransaction over one sqlx transaction
//
// Schema lives in ./migrations and is applied by Database::migrate.

pub mod automation_store;
pub mod models;
pub mod repositories;

pub use automation_store::{create_pg_automation_store, PgAutomationStore, PgStoreTransaction};
pub use models::*;
pub use repositories::Database;
