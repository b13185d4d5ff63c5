//! Database access: the contact table and its typed CRUD

pub mod db;

// Re-exports for convenience
pub use db::{
    create_pool, get_connection, DbConnection, DbPool, Record, RecordField, RecordFilter,
};
