#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Company store for the ETL pipeline.
//!
//! Uses `switchy_database` so the same SQL runs against Postgres (the
//! production store, selected by `DATABASE_URL`) or a local `SQLite` file.
//! Statements are written with `?` placeholders and rewritten for Postgres
//! by [`db::Dialect::sql`].

pub mod db;
pub mod queries;
pub mod schema;
pub mod sink;

/// Errors that can occur during database operations.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// Database query error.
    #[error("Database error: {0}")]
    Database(#[from] switchy_database::DatabaseError),

    /// The connection could not be established.
    #[error("Connection error: {0}")]
    Connection(String),

    /// An I/O operation failed (e.g., creating the database directory).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Data conversion error.
    #[error("Data conversion error: {message}")]
    Conversion {
        /// Description of what went wrong.
        message: String,
    },
}
