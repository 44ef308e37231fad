//! Bulk table transfer: read the whole table, write it once.

use crate::catalog::{Column, TableRef};
use crate::ddl;
use crate::engine::{SourceDb, TargetDb};
use crate::error::Result;
use tracing::debug;

/// Move one table's rows from source to destination.
///
/// The full result set is materialized before writing. Tables are processed
/// strictly one at a time, so at most one buffer is ever alive; the memory
/// bound is the largest single table. The destination table is assumed
/// freshly created, so the write is insert-only.
pub async fn transfer_table<S, D>(
    source: &mut S,
    dest: &mut D,
    table: &TableRef,
    columns: &[Column],
) -> Result<u64>
where
    S: SourceDb + ?Sized,
    D: TargetDb + ?Sized,
{
    let rows = source
        .fetch_rows(&table.schema, &table.name, columns)
        .await?;
    debug!("Fetched {} rows from {}", rows.len(), table.full_name());

    // Same normalization as the generated DDL, so column binding can't
    // diverge from the created table.
    let dest_columns = ddl::destination_column_names(columns);

    let written = dest
        .bulk_load(&table.schema, &table.name, &dest_columns, rows)
        .await?;
    debug!("Wrote {} rows to {}", written, table.full_name());
    Ok(written)
}
