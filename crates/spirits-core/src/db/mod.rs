//! Persistence layer for Good Spirits

mod connection;
mod libsql_store;
mod migrations;
mod store;

pub use connection::Database;
pub use libsql_store::{LibSqlStore, LibSqlTransaction};
pub use store::{DataAccess, Store, StoreChanged, TransactionMode};
