//! DDL synthesis for the destination dialect.
//!
//! Identifier quoting follows the destination: brackets for SQL Server,
//! double quotes for PostgreSQL. Column clauses are emitted in discovery
//! order, with types resolved through the type mapper (or copied verbatim on
//! the same-dialect path).

use crate::catalog::Column;
use crate::config::EngineKind;
use crate::typemap::{map_type, Direction};

/// Quote an identifier for the given dialect.
pub fn quote_ident(kind: EngineKind, name: &str) -> String {
    match kind {
        EngineKind::Mssql => format!("[{}]", name.replace(']', "]]")),
        EngineKind::Postgres => format!("\"{}\"", name.replace('"', "\"\"")),
    }
}

/// Fully qualify a table name for the given dialect.
pub fn qualify_table(kind: EngineKind, schema: &str, table: &str) -> String {
    format!("{}.{}", quote_ident(kind, schema), quote_ident(kind, table))
}

/// Normalize a column name for use in destination DDL and bulk-load column
/// lists: `%` is dropped and every whitespace character becomes `_`.
///
/// The function is idempotent, and its output never contains whitespace or
/// `%` for any input.
pub fn sanitize_column(name: &str) -> String {
    name.chars()
        .filter(|c| *c != '%')
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .collect()
}

/// Destination column names in discovery order, sanitized.
///
/// This is the single source for the bulk loader's column list; it applies
/// the same normalization as [`create_table_stmt`], so generated DDL and
/// bulk column binding cannot diverge.
pub fn destination_column_names(columns: &[Column]) -> Vec<String> {
    columns.iter().map(|c| sanitize_column(&c.name)).collect()
}

/// Build a CREATE SCHEMA statement for the destination dialect.
///
/// Both forms are safe to re-run: PostgreSQL uses `IF NOT EXISTS`, SQL
/// Server guards with a `sys.schemas` existence check (T-SQL `CREATE SCHEMA`
/// must run in its own batch, hence the `EXEC`).
pub fn create_schema_stmt(kind: EngineKind, schema: &str) -> String {
    match kind {
        EngineKind::Mssql => {
            let literal = schema.replace('\'', "''");
            let quoted = quote_ident(kind, schema).replace('\'', "''");
            format!(
                "IF NOT EXISTS (SELECT 1 FROM sys.schemas WHERE name = N'{}') EXEC(N'CREATE SCHEMA {}')",
                literal, quoted
            )
        }
        EngineKind::Postgres => {
            format!("CREATE SCHEMA IF NOT EXISTS {}", quote_ident(kind, schema))
        }
    }
}

/// Build a CREATE TABLE statement for the destination dialect.
///
/// `direction` selects the type mapping; `None` copies source types verbatim
/// (same-dialect migration needs no conversion).
pub fn create_table_stmt(
    kind: EngineKind,
    schema: &str,
    table: &str,
    columns: &[Column],
    direction: Option<Direction>,
) -> String {
    let cols: Vec<String> = columns
        .iter()
        .map(|c| {
            let dest_type = match direction {
                Some(dir) => map_type(dir, &c.data_type).to_string(),
                None => c.data_type.clone(),
            };
            format!(
                "{} {}",
                quote_ident(kind, &sanitize_column(&c.name)),
                dest_type
            )
        })
        .collect();

    format!(
        "CREATE TABLE {} ({})",
        qualify_table(kind, schema, table),
        cols.join(", ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_strips_percent_and_whitespace() {
        assert_eq!(sanitize_column("order id"), "order_id");
        assert_eq!(sanitize_column("discount%"), "discount");
        assert_eq!(sanitize_column("a  b"), "a__b");
        assert_eq!(sanitize_column("tab\there"), "tab_here");
        assert_eq!(sanitize_column("% lead"), "_lead");
        assert_eq!(sanitize_column("clean"), "clean");
    }

    #[test]
    fn test_sanitize_is_idempotent() {
        for input in ["order id", "a % b\tc", "  ", "%%%", "plain", "mixed %one two"] {
            let once = sanitize_column(input);
            assert_eq!(sanitize_column(&once), once, "not idempotent for {:?}", input);
        }
    }

    #[test]
    fn test_sanitize_output_is_clean() {
        for input in ["a b c", "x%y z", "\t\n ", "weird % name  here"] {
            let out = sanitize_column(input);
            assert!(!out.contains('%'), "output contains %: {:?}", out);
            assert!(
                !out.chars().any(char::is_whitespace),
                "output contains whitespace: {:?}",
                out
            );
        }
    }

    #[test]
    fn test_quote_ident_styles() {
        assert_eq!(quote_ident(EngineKind::Mssql, "orders"), "[orders]");
        assert_eq!(quote_ident(EngineKind::Postgres, "orders"), "\"orders\"");
        assert_eq!(quote_ident(EngineKind::Mssql, "odd]name"), "[odd]]name]");
        assert_eq!(quote_ident(EngineKind::Postgres, "odd\"name"), "\"odd\"\"name\"");
    }

    #[test]
    fn test_create_schema_statements() {
        assert_eq!(
            create_schema_stmt(EngineKind::Postgres, "sales"),
            "CREATE SCHEMA IF NOT EXISTS \"sales\""
        );
        let mssql = create_schema_stmt(EngineKind::Mssql, "sales");
        assert!(mssql.contains("IF NOT EXISTS"));
        assert!(mssql.contains("EXEC(N'CREATE SCHEMA [sales]')"));
    }

    #[test]
    fn test_create_table_preserves_column_order() {
        let columns = vec![
            Column::new("id", "int"),
            Column::new("note", "text"),
            Column::new("created", "datetime2"),
        ];
        let sql = create_table_stmt(
            EngineKind::Postgres,
            "sales",
            "orders",
            &columns,
            Some(Direction::MssqlToPostgres),
        );
        assert_eq!(
            sql,
            "CREATE TABLE \"sales\".\"orders\" (\"id\" integer, \"note\" text, \"created\" timestamp)"
        );

        // DDL order and bulk binding order come from the same walk.
        assert_eq!(
            destination_column_names(&columns),
            vec!["id", "note", "created"]
        );
    }

    #[test]
    fn test_create_table_same_dialect_copies_types_verbatim() {
        let columns = vec![
            Column::new("id", "int"),
            Column::new("payload", "nvarchar(max)"),
        ];
        let sql = create_table_stmt(EngineKind::Mssql, "dbo", "events", &columns, None);
        assert_eq!(
            sql,
            "CREATE TABLE [dbo].[events] ([id] int, [payload] nvarchar(max))"
        );
    }

    #[test]
    fn test_create_table_sanitizes_column_names() {
        let columns = vec![Column::new("unit price%", "numeric")];
        let sql = create_table_stmt(
            EngineKind::Mssql,
            "sales",
            "items",
            &columns,
            Some(Direction::PostgresToMssql),
        );
        assert!(sql.contains("[unit_price] decimal"));
    }

    #[test]
    fn test_create_table_unknown_type_uses_fallback() {
        let columns = vec![Column::new("geo", "geography")];
        let sql = create_table_stmt(
            EngineKind::Postgres,
            "gis",
            "shapes",
            &columns,
            Some(Direction::MssqlToPostgres),
        );
        assert!(sql.contains("\"geo\" text"));
    }
}
