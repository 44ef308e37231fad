//! Error types for the migration library.

use thiserror::Error;

/// Main error type for migration operations.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// An endpoint could not be reached. Fatal: the run aborts before any DDL.
    #[error("Connection to {endpoint} failed: {message}")]
    Connect { endpoint: String, message: String },

    /// SQL Server driver error
    #[error("SQL Server error: {0}")]
    Mssql(#[from] tiberius::error::Error),

    /// PostgreSQL driver error
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    /// Catalog query failed (schema or table listing). Fatal: there is no
    /// safe partial schema list to continue from.
    #[error("Catalog discovery failed: {0}")]
    Discovery(String),

    /// Destination rejected schema or table creation
    #[error("DDL failed for {table}: {message}")]
    Ddl { table: String, message: String },

    /// Read, encode, or write error while moving rows for a table
    #[error("Transfer failed for {table}: {message}")]
    Transfer { table: String, message: String },

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MigrateError {
    /// Create a Connect error for an endpoint.
    pub fn connect(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::Connect {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    /// Create a Ddl error for a table.
    pub fn ddl(table: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::Ddl {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Create a Transfer error for a table.
    pub fn transfer(table: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::Transfer {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;
