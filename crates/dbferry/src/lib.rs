//! # dbferry
//!
//! Cross-dialect schema and data migration between Microsoft SQL Server and
//! PostgreSQL:
//!
//! - **Schema discovery** from each engine's information schema, with
//!   engine-reserved schemas filtered out
//! - **Type mapping** between dialects, with a text fallback for unknown
//!   source types
//! - **DDL synthesis** with destination-correct quoting and sanitized
//!   column names
//! - **Bulk transfer** over each destination's fastest path: TDS bulk
//!   insert or binary COPY
//! - **Per-table failure isolation**: one bad table never aborts the run;
//!   the result is a manifest of everything that failed
//!
//! ## Example
//!
//! ```rust,no_run
//! use dbferry::{Config, Orchestrator};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), dbferry::MigrateError> {
//!     let config = Config::load("config.yaml")?;
//!     let report = Orchestrator::new(config).run().await?;
//!     for failed in &report.failures {
//!         eprintln!("{}.{}: {}", failed.schema, failed.table, failed.reason);
//!     }
//!     Ok(())
//! }
//! ```

pub mod catalog;
pub mod config;
pub mod ddl;
pub mod engine;
pub mod error;
pub mod orchestrator;
pub mod progress;
pub mod transfer;
pub mod typemap;

mod value;

// Re-exports for convenient access
pub use catalog::{Column, TableRef};
pub use config::{Config, CopySelection, EndpointConfig, EngineKind, SelectionEntry};
pub use error::{MigrateError, Result};
pub use orchestrator::{
    health_check, FailedTable, FailureManifest, MigrationReport, Orchestrator,
};
pub use progress::{NullProgress, Progress, ProgressEvent};
pub use typemap::Direction;
pub use value::{SqlNullType, SqlValue};
