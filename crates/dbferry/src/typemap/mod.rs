//! Type mapping between SQL Server and PostgreSQL.
//!
//! Each direction is a static table from lower-cased source type name to the
//! destination type literal. Lookups that miss resolve to the destination's
//! widest variable text type instead of failing, which favors migration
//! completeness over DDL fidelity. Several mappings are intentionally lossy:
//! json/jsonb, network and text-search types all land in `nvarchar(max)`,
//! `interval` becomes `time`, and `float`/`real` become `numeric`.

use std::collections::HashMap;
use std::sync::LazyLock;

/// Direction of a cross-dialect migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// SQL Server source, PostgreSQL destination.
    MssqlToPostgres,

    /// PostgreSQL source, SQL Server destination.
    PostgresToMssql,
}

/// SQL Server type name -> PostgreSQL type literal.
static MSSQL_TO_POSTGRES: &[(&str, &str)] = &[
    ("bigint", "bigint"),
    ("binary", "bytea"),
    ("varbinary", "bytea"),
    ("image", "bytea"),
    ("bit", "boolean"),
    ("char", "char"),
    ("nchar", "char"),
    ("date", "timestamp"),
    ("datetime", "timestamp"),
    ("datetime2", "timestamp"),
    ("smalldatetime", "timestamp"),
    ("datetimeoffset", "timestamptz"),
    ("decimal", "numeric"),
    ("numeric", "numeric"),
    ("money", "numeric"),
    ("smallmoney", "numeric"),
    ("float", "numeric"),
    ("real", "numeric"),
    ("int", "integer"),
    ("tinyint", "smallint"),
    ("smallint", "smallint"),
    ("nvarchar", "text"),
    ("varchar", "text"),
    ("text", "text"),
    ("ntext", "text"),
    ("time", "time"),
    ("timestamp", "timestamp"),
    ("uniqueidentifier", "uuid"),
];

/// PostgreSQL type name -> SQL Server type literal.
static POSTGRES_TO_MSSQL: &[(&str, &str)] = &[
    ("bigint", "bigint"),
    ("boolean", "bit"),
    ("character", "char"),
    ("character varying", "nvarchar(max)"),
    // datetime2 rather than date: the TDS bulk path serializes dates as
    // datetime2, and a plain DATE destination column rejects those tokens.
    ("date", "datetime2"),
    ("double precision", "float"),
    ("integer", "int"),
    ("interval", "time"),
    ("numeric", "decimal"),
    ("real", "real"),
    ("smallint", "smallint"),
    ("text", "nvarchar(max)"),
    ("time", "time"),
    ("timestamp", "datetime2"),
    ("timestamp with time zone", "datetimeoffset"),
    ("timestamptz", "datetimeoffset"),
    ("uuid", "uniqueidentifier"),
    ("bytea", "varbinary(max)"),
    ("bit", "bit"),
    ("bit varying", "varbinary(max)"),
    ("money", "money"),
    ("json", "nvarchar(max)"),
    ("jsonb", "nvarchar(max)"),
    ("cidr", "nvarchar(max)"),
    ("inet", "nvarchar(max)"),
    ("macaddr", "nvarchar(max)"),
    ("tsvector", "nvarchar(max)"),
    ("tsquery", "nvarchar(max)"),
    ("array", "nvarchar(max)"),
    ("domain", "nvarchar(max)"),
];

static MSSQL_TO_POSTGRES_MAP: LazyLock<HashMap<&'static str, &'static str>> =
    LazyLock::new(|| MSSQL_TO_POSTGRES.iter().copied().collect());

static POSTGRES_TO_MSSQL_MAP: LazyLock<HashMap<&'static str, &'static str>> =
    LazyLock::new(|| POSTGRES_TO_MSSQL.iter().copied().collect());

/// Map a source type name to the destination type literal.
///
/// Case-insensitive; unknown names resolve to [`fallback_type`].
pub fn map_type(direction: Direction, source_type: &str) -> &'static str {
    let key = source_type.trim().to_lowercase();
    let table = match direction {
        Direction::MssqlToPostgres => &*MSSQL_TO_POSTGRES_MAP,
        Direction::PostgresToMssql => &*POSTGRES_TO_MSSQL_MAP,
    };
    table
        .get(key.as_str())
        .copied()
        .unwrap_or_else(|| fallback_type(direction))
}

/// The destination type used when a source type name has no mapping.
pub fn fallback_type(direction: Direction) -> &'static str {
    match direction {
        Direction::MssqlToPostgres => "text",
        Direction::PostgresToMssql => "nvarchar(max)",
    }
}
