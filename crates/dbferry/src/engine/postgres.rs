//! PostgreSQL connection: catalog queries, row reads, and binary COPY load.

use crate::catalog::{Column, TableRef};
use crate::config::{EndpointConfig, EngineKind};
use crate::ddl;
use crate::error::{MigrateError, Result};
use crate::value::{SqlNullType, SqlValue};
use async_trait::async_trait;
use bytes::{BufMut, BytesMut};
use chrono::Timelike;
use futures::SinkExt;
use rust_decimal::prelude::FromPrimitive;
use tokio_postgres::{Config, NoTls};
use tracing::{debug, error, info, warn};

/// Engine-owned schemas that are never migrated. Matched case-sensitively;
/// Postgres schema names are stored as written.
const RESERVED_SCHEMAS: &[&str] = &["information_schema", "pg_catalog", "pg_toast"];

/// Per-session temp schemas come numbered; exclude them by prefix.
const RESERVED_PREFIXES: &[&str] = &["pg_temp_", "pg_toast_temp_"];

/// A single PostgreSQL connection, held for the lifetime of a run.
pub struct PgConn {
    client: tokio_postgres::Client,
}

impl PgConn {
    /// Connect and verify the connection with a round trip.
    pub async fn connect(config: &EndpointConfig) -> Result<Self> {
        let mut pg = Config::new();
        pg.host(&config.host);
        pg.port(config.effective_port());
        pg.dbname(&config.database);
        pg.user(&config.user);
        pg.password(&config.password);

        let endpoint = config.endpoint();

        let (client, connection) = pg
            .connect(NoTls)
            .await
            .map_err(|e| MigrateError::connect(&endpoint, e.to_string()))?;

        // The connection object drives the socket; it lives until the client
        // is dropped.
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!("PostgreSQL connection error: {}", e);
            }
        });

        client
            .simple_query("SELECT 1")
            .await
            .map_err(|e| MigrateError::connect(&endpoint, e.to_string()))?;

        info!("Connected to PostgreSQL: {}", endpoint);

        Ok(Self { client })
    }

    fn is_reserved(schema: &str) -> bool {
        RESERVED_SCHEMAS.contains(&schema)
            || RESERVED_PREFIXES.iter().any(|p| schema.starts_with(p))
    }
}

#[async_trait]
impl crate::engine::SourceDb for PgConn {
    fn kind(&self) -> EngineKind {
        EngineKind::Postgres
    }

    async fn list_schemas(&mut self) -> Result<Vec<String>> {
        let rows = self
            .client
            .query(
                "SELECT schema_name FROM information_schema.schemata ORDER BY schema_name",
                &[],
            )
            .await?;

        let mut schemas = Vec::with_capacity(rows.len());
        for row in rows {
            let name: String = row.try_get(0)?;
            if !Self::is_reserved(&name) {
                schemas.push(name);
            }
        }
        debug!("Found {} user schemas", schemas.len());
        Ok(schemas)
    }

    async fn list_tables(&mut self, schema: &str) -> Result<Vec<TableRef>> {
        let rows = self
            .client
            .query(
                "SELECT table_name FROM information_schema.tables \
                 WHERE table_schema = $1 ORDER BY table_name",
                &[&schema],
            )
            .await?;

        let mut tables = Vec::with_capacity(rows.len());
        for row in rows {
            let name: String = row.try_get(0)?;
            tables.push(TableRef::new(schema, name));
        }
        Ok(tables)
    }

    async fn list_columns(&mut self, schema: &str, table: &str) -> Result<Vec<Column>> {
        let rows = self
            .client
            .query(
                "SELECT column_name, data_type FROM information_schema.columns \
                 WHERE table_schema = $1 AND table_name = $2 ORDER BY ordinal_position",
                &[&schema, &table],
            )
            .await?;

        let mut columns = Vec::with_capacity(rows.len());
        for row in rows {
            let name: String = row.try_get(0)?;
            let data_type: String = row.try_get(1)?;
            columns.push(Column::new(name, data_type));
        }
        Ok(columns)
    }

    async fn fetch_rows(
        &mut self,
        schema: &str,
        table: &str,
        columns: &[Column],
    ) -> Result<Vec<Vec<SqlValue>>> {
        let col_list: Vec<String> = columns
            .iter()
            .map(|c| ddl::quote_ident(EngineKind::Postgres, &c.name))
            .collect();
        let sql = format!(
            "SELECT {} FROM {}",
            col_list.join(", "),
            ddl::qualify_table(EngineKind::Postgres, schema, table)
        );

        let rows = self.client.query(&sql, &[]).await?;

        let mut result = Vec::with_capacity(rows.len());
        for row in rows {
            let mut values = Vec::with_capacity(columns.len());
            for (idx, col) in columns.iter().enumerate() {
                values.push(convert_row_value(&row, idx, &col.data_type).map_err(|e| {
                    MigrateError::transfer(
                        format!("{}.{}", schema, table),
                        format!("reading column {}: {}", col.name, e),
                    )
                })?);
            }
            result.push(values);
        }
        Ok(result)
    }
}

#[async_trait]
impl crate::engine::TargetDb for PgConn {
    fn kind(&self) -> EngineKind {
        EngineKind::Postgres
    }

    async fn create_schema(&mut self, schema: &str) -> Result<()> {
        let sql = ddl::create_schema_stmt(EngineKind::Postgres, schema);
        self.client.execute(&sql, &[]).await?;
        debug!("Created schema \"{}\"", schema);
        Ok(())
    }

    async fn execute_ddl(&mut self, sql: &str) -> Result<()> {
        self.client.execute(sql, &[]).await?;
        Ok(())
    }

    async fn bulk_load(
        &mut self,
        schema: &str,
        table: &str,
        columns: &[String],
        rows: Vec<Vec<SqlValue>>,
    ) -> Result<u64> {
        if rows.is_empty() {
            return Ok(0);
        }

        let plain = format!("{}.{}", schema, table);
        let col_list: Vec<String> = columns
            .iter()
            .map(|c| ddl::quote_ident(EngineKind::Postgres, c))
            .collect();
        let copy_sql = format!(
            "COPY {} ({}) FROM STDIN (FORMAT BINARY)",
            ddl::qualify_table(EngineKind::Postgres, schema, table),
            col_list.join(", ")
        );

        let sink = self
            .client
            .copy_in(&copy_sql)
            .await
            .map_err(|e| MigrateError::transfer(&plain, format!("initiating COPY: {}", e)))?;
        futures::pin_mut!(sink);

        let mut buf = BytesMut::with_capacity(64 * 1024);
        write_copy_header(&mut buf);

        // Flush in slices so the wire buffer never doubles the row buffer.
        const FLUSH_EVERY: usize = 4096;
        for (i, row) in rows.iter().enumerate() {
            buf.put_i16(row.len() as i16);
            for value in row {
                write_binary_value(&mut buf, value);
            }

            if (i + 1) % FLUSH_EVERY == 0 {
                sink.send(buf.split().freeze()).await.map_err(|e| {
                    MigrateError::transfer(&plain, format!("sending COPY data: {}", e))
                })?;
            }
        }

        buf.put_i16(-1); // trailer
        sink.send(buf.split().freeze())
            .await
            .map_err(|e| MigrateError::transfer(&plain, format!("sending COPY data: {}", e)))?;

        let copied = sink
            .finish()
            .await
            .map_err(|e| MigrateError::transfer(&plain, format!("finishing COPY: {}", e)))?;

        Ok(copied)
    }
}

/// Convert one row value based on the column's declared type.
///
/// Conversion failures are hard errors: a source type the driver cannot
/// decode (interval, money, arrays, geometric types) fails the table rather
/// than silently nulling or mis-encoding it.
fn convert_row_value(row: &tokio_postgres::Row, idx: usize, data_type: &str) -> Result<SqlValue> {
    let dt = data_type.to_lowercase();

    let value = match dt.as_str() {
        "boolean" | "bool" => or_null(
            row.try_get::<_, Option<bool>>(idx)?,
            SqlValue::Bool,
            SqlNullType::Bool,
        ),
        "smallint" | "int2" => or_null(
            row.try_get::<_, Option<i16>>(idx)?,
            SqlValue::I16,
            SqlNullType::I16,
        ),
        "integer" | "int" | "int4" => or_null(
            row.try_get::<_, Option<i32>>(idx)?,
            SqlValue::I32,
            SqlNullType::I32,
        ),
        "bigint" | "int8" => or_null(
            row.try_get::<_, Option<i64>>(idx)?,
            SqlValue::I64,
            SqlNullType::I64,
        ),
        "real" | "float4" => or_null(
            row.try_get::<_, Option<f32>>(idx)?,
            SqlValue::F32,
            SqlNullType::F32,
        ),
        "double precision" | "float8" => or_null(
            row.try_get::<_, Option<f64>>(idx)?,
            SqlValue::F64,
            SqlNullType::F64,
        ),
        "numeric" | "decimal" => or_null(
            row.try_get::<_, Option<rust_decimal::Decimal>>(idx)?,
            SqlValue::Decimal,
            SqlNullType::Decimal,
        ),
        "uuid" => or_null(
            row.try_get::<_, Option<uuid::Uuid>>(idx)?,
            SqlValue::Uuid,
            SqlNullType::Uuid,
        ),
        "date" => or_null(
            row.try_get::<_, Option<chrono::NaiveDate>>(idx)?,
            SqlValue::Date,
            SqlNullType::Date,
        ),
        "time" | "time without time zone" => or_null(
            row.try_get::<_, Option<chrono::NaiveTime>>(idx)?,
            SqlValue::Time,
            SqlNullType::Time,
        ),
        "timestamp" | "timestamp without time zone" => or_null(
            row.try_get::<_, Option<chrono::NaiveDateTime>>(idx)?,
            SqlValue::DateTime,
            SqlNullType::DateTime,
        ),
        "timestamptz" | "timestamp with time zone" => or_null(
            row.try_get::<_, Option<chrono::DateTime<chrono::FixedOffset>>>(idx)?,
            SqlValue::DateTimeOffset,
            SqlNullType::DateTimeOffset,
        ),
        "bytea" => or_null(
            row.try_get::<_, Option<Vec<u8>>>(idx)?,
            SqlValue::Bytes,
            SqlNullType::Bytes,
        ),
        "json" | "jsonb" => or_null(
            row.try_get::<_, Option<serde_json::Value>>(idx)?
                .map(|v| v.to_string()),
            SqlValue::String,
            SqlNullType::String,
        ),
        // text, character varying, character, name and friends; anything
        // else either decodes as text or fails the table.
        _ => or_null(
            row.try_get::<_, Option<String>>(idx)?,
            SqlValue::String,
            SqlNullType::String,
        ),
    };

    Ok(value)
}

fn or_null<T>(value: Option<T>, wrap: impl FnOnce(T) -> SqlValue, null: SqlNullType) -> SqlValue {
    value.map(wrap).unwrap_or(SqlValue::Null(null))
}

/// COPY BINARY header: signature + flags + extension area length.
fn write_copy_header(buf: &mut BytesMut) {
    buf.put_slice(b"PGCOPY\n\xff\r\n\0");
    buf.put_i32(0);
    buf.put_i32(0);
}

/// Write one field in COPY BINARY layout: 4-byte length then the payload,
/// or length -1 as the null marker.
///
/// The wire encoding is derived from the runtime value variant. Floats are
/// encoded as NUMERIC because the cross-dialect type map lands float/real
/// source columns in numeric destination columns.
fn write_binary_value(buf: &mut BytesMut, value: &SqlValue) {
    match value {
        SqlValue::Null(_) => {
            buf.put_i32(-1);
        }
        SqlValue::Bool(b) => {
            buf.put_i32(1);
            buf.put_u8(if *b { 1 } else { 0 });
        }
        SqlValue::I16(i) => {
            buf.put_i32(2);
            buf.put_i16(*i);
        }
        SqlValue::I32(i) => {
            buf.put_i32(4);
            buf.put_i32(*i);
        }
        SqlValue::I64(i) => {
            buf.put_i32(8);
            buf.put_i64(*i);
        }
        SqlValue::F32(f) => match rust_decimal::Decimal::from_f32(*f) {
            Some(d) => encode_decimal_binary(buf, &d),
            None => {
                warn!("Converting F32 NaN/Infinity to NULL for COPY");
                buf.put_i32(-1);
            }
        },
        SqlValue::F64(f) => match rust_decimal::Decimal::from_f64(*f) {
            Some(d) => encode_decimal_binary(buf, &d),
            None => {
                warn!("Converting F64 NaN/Infinity to NULL for COPY");
                buf.put_i32(-1);
            }
        },
        SqlValue::String(s) => {
            let bytes = s.as_bytes();
            buf.put_i32(bytes.len() as i32);
            buf.put_slice(bytes);
        }
        SqlValue::Bytes(b) => {
            buf.put_i32(b.len() as i32);
            buf.put_slice(b);
        }
        SqlValue::Uuid(u) => {
            buf.put_i32(16);
            buf.put_slice(u.as_bytes());
        }
        SqlValue::Decimal(d) => {
            encode_decimal_binary(buf, d);
        }
        SqlValue::DateTime(dt) => {
            // Microseconds since 2000-01-01 00:00:00.
            let epoch = pg_epoch();
            let micros = (*dt - epoch).num_microseconds().unwrap_or(0);
            buf.put_i32(8);
            buf.put_i64(micros);
        }
        SqlValue::DateTimeOffset(dto) => {
            let epoch = pg_epoch();
            let micros = (dto.naive_utc() - epoch).num_microseconds().unwrap_or(0);
            buf.put_i32(8);
            buf.put_i64(micros);
        }
        SqlValue::Date(d) => {
            // Days since 2000-01-01.
            let days = (*d - pg_epoch().date()).num_days() as i32;
            buf.put_i32(4);
            buf.put_i32(days);
        }
        SqlValue::Time(t) => {
            // Microseconds since midnight.
            let micros =
                t.num_seconds_from_midnight() as i64 * 1_000_000 + (t.nanosecond() / 1000) as i64;
            buf.put_i32(8);
            buf.put_i64(micros);
        }
    }
}

fn pg_epoch() -> chrono::NaiveDateTime {
    chrono::NaiveDate::from_ymd_opt(2000, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
}

/// Encode a decimal into NUMERIC binary layout:
/// ndigits (i16), weight (i16), sign (i16), dscale (i16), then base-10000
/// digits most significant first.
fn encode_decimal_binary(buf: &mut BytesMut, d: &rust_decimal::Decimal) {
    const NUMERIC_POS: i16 = 0x0000;
    const NUMERIC_NEG: i16 = 0x4000;

    if d.is_zero() {
        buf.put_i32(8);
        buf.put_i16(0); // ndigits
        buf.put_i16(0); // weight
        buf.put_i16(NUMERIC_POS);
        buf.put_i16(d.scale() as i16);
        return;
    }

    let sign = if d.is_sign_negative() {
        NUMERIC_NEG
    } else {
        NUMERIC_POS
    };
    let dscale = d.scale() as i16;

    // Work from the string form so decimal positioning is exact, e.g. 0.01
    // has mantissa 1 but needs the digit group "0100".
    let abs_str = d.abs().to_string();
    let (int_part, frac_part) = match abs_str.find('.') {
        Some(dot) => (&abs_str[..dot], &abs_str[dot + 1..]),
        None => (abs_str.as_str(), ""),
    };

    // Integer part groups from the decimal point leftward: pad on the left
    // to a multiple of 4.
    let mut digits: Vec<i16> = Vec::new();
    let int_clean = int_part.trim_start_matches('0');
    if !int_clean.is_empty() {
        let width = (int_clean.len() + 3) / 4 * 4;
        let padded = format!("{:0>width$}", int_clean, width = width);
        for chunk in padded.as_bytes().chunks(4) {
            digits.push(std::str::from_utf8(chunk).unwrap().parse::<i16>().unwrap());
        }
    }
    let int_groups = digits.len() as i16;

    // Fractional part groups rightward: pad on the right.
    if !frac_part.is_empty() {
        let width = (frac_part.len() + 3) / 4 * 4;
        let mut padded = frac_part.to_string();
        while padded.len() < width {
            padded.push('0');
        }
        for chunk in padded.as_bytes().chunks(4) {
            digits.push(std::str::from_utf8(chunk).unwrap().parse::<i16>().unwrap());
        }
    }

    // Weight is the base-10000 exponent of the first digit group.
    let weight = if int_groups > 0 {
        int_groups - 1
    } else {
        let leading_zero_groups = digits.iter().take_while(|&&g| g == 0).count() as i16;
        -(leading_zero_groups + 1)
    };

    // The server omits zero groups at both ends.
    while digits.len() > 1 && *digits.last().unwrap() == 0 {
        digits.pop();
    }
    while digits.len() > 1 && digits[0] == 0 {
        digits.remove(0);
    }

    let ndigits = digits.len() as i16;
    buf.put_i32(8 + ndigits as i32 * 2);
    buf.put_i16(ndigits);
    buf.put_i16(weight);
    buf.put_i16(sign);
    buf.put_i16(dscale);
    for digit in digits {
        buf.put_i16(digit);
    }
}
