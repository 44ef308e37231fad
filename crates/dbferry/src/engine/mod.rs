//! Engine connections: catalog discovery, row reads, DDL execution, and the
//! per-dialect bulk-load paths.

pub mod mssql;
pub mod postgres;

pub use mssql::MssqlConn;
pub use postgres::PgConn;

use crate::catalog::{Column, TableRef};
use crate::config::EngineKind;
use crate::error::Result;
use crate::value::SqlValue;
use async_trait::async_trait;

/// Source-side operations: catalog discovery and full-table reads.
#[async_trait]
pub trait SourceDb: Send {
    /// The engine dialect behind this connection.
    fn kind(&self) -> EngineKind;

    /// List user schemas, with engine-reserved schemas already removed.
    async fn list_schemas(&mut self) -> Result<Vec<String>>;

    /// List tables and views in a schema. Empty schemas yield an empty list.
    async fn list_tables(&mut self, schema: &str) -> Result<Vec<TableRef>>;

    /// List a table's columns in catalog ordinal order.
    async fn list_columns(&mut self, schema: &str, table: &str) -> Result<Vec<Column>>;

    /// Read the whole table into memory, values in `columns` order.
    async fn fetch_rows(
        &mut self,
        schema: &str,
        table: &str,
        columns: &[Column],
    ) -> Result<Vec<Vec<SqlValue>>>;
}

/// Destination-side operations: DDL and bulk row loading.
#[async_trait]
pub trait TargetDb: Send {
    /// The engine dialect behind this connection.
    fn kind(&self) -> EngineKind;

    /// Create a schema if it doesn't exist.
    async fn create_schema(&mut self, schema: &str) -> Result<()>;

    /// Execute a DDL statement.
    async fn execute_ddl(&mut self, sql: &str) -> Result<()>;

    /// Write rows into a freshly created table using the engine's fastest
    /// bulk path. Insert-only; returns the number of rows written.
    async fn bulk_load(
        &mut self,
        schema: &str,
        table: &str,
        columns: &[String],
        rows: Vec<Vec<SqlValue>>,
    ) -> Result<u64>;
}
