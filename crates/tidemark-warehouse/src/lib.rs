//! Warehouse connectivity for the tidemark loader.
//!
//! Provides the [`Warehouse`] and [`WarehouseConnector`] traits plus a
//! [`PostgresConnector`] (PostgreSQL wire protocol, including Redshift) and
//! a [`SqliteConnector`] for local development and tests.

#![warn(clippy::pedantic)]

pub mod backend;
pub mod copy;
pub mod error;
pub mod pg;
pub mod sql;
pub mod sqlite;
pub mod value;

pub use backend::{AbortHandle, Statement, Warehouse, WarehouseConnector};
pub use copy::{CopyCommand, CopyOptions, Credentials};
pub use error::WarehouseError;
pub use pg::{PostgresConnector, PostgresWarehouse};
pub use sqlite::{SqliteConnector, SqliteWarehouse};
pub use value::{Row, Value};
