//! SQL Server connection: catalog queries, row reads, and TDS bulk insert.

use crate::catalog::{Column, TableRef};
use crate::config::{EndpointConfig, EngineKind};
use crate::ddl;
use crate::error::{MigrateError, Result};
use crate::value::{SqlNullType, SqlValue};
use async_trait::async_trait;
use chrono::Timelike;
use rust_decimal::prelude::FromPrimitive;
use std::borrow::Cow;
use std::time::Duration;
use tiberius::{AuthMethod, Client, ColumnData, Config, EncryptionLevel, Query, Row, TokenRow};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::{debug, info, warn};

/// Schemas that ship with the engine and are never migrated. Matched
/// case-insensitively, following the catalog's collation.
const RESERVED_SCHEMAS: &[&str] = &[
    "guest",
    "INFORMATION_SCHEMA",
    "sys",
    "db_owner",
    "db_accessadmin",
    "db_securityadmin",
    "db_ddladmin",
    "db_backupoperator",
    "db_datareader",
    "db_datawriter",
    "db_denydatareader",
    "db_denydatawriter",
];

/// A single SQL Server connection, held for the lifetime of a run.
pub struct MssqlConn {
    client: Client<Compat<TcpStream>>,
    bulk_timeout: Duration,
}

impl MssqlConn {
    /// Connect and verify the connection with a round trip.
    ///
    /// Any failure here is a connectivity failure: the caller aborts before
    /// issuing DDL anywhere.
    pub async fn connect(config: &EndpointConfig, bulk_timeout: Duration) -> Result<Self> {
        let mut tib = Config::new();
        tib.host(&config.host);
        tib.port(config.effective_port());
        tib.database(&config.database);
        tib.authentication(AuthMethod::sql_server(&config.user, &config.password));

        if config.encrypt {
            if config.trust_server_cert {
                tib.trust_cert();
            }
            tib.encryption(EncryptionLevel::Required);
        } else {
            tib.encryption(EncryptionLevel::NotSupported);
        }

        let endpoint = config.endpoint();

        let tcp = TcpStream::connect(tib.get_addr())
            .await
            .map_err(|e| MigrateError::connect(&endpoint, e.to_string()))?;
        tcp.set_nodelay(true).ok();

        let mut client = Client::connect(tib, tcp.compat_write())
            .await
            .map_err(|e| MigrateError::connect(&endpoint, e.to_string()))?;

        client
            .simple_query("SELECT 1")
            .await
            .map_err(|e| MigrateError::connect(&endpoint, e.to_string()))?
            .into_row()
            .await
            .map_err(|e| MigrateError::connect(&endpoint, e.to_string()))?;

        info!("Connected to SQL Server: {}", endpoint);

        Ok(Self {
            client,
            bulk_timeout,
        })
    }
}

#[async_trait]
impl crate::engine::SourceDb for MssqlConn {
    fn kind(&self) -> EngineKind {
        EngineKind::Mssql
    }

    async fn list_schemas(&mut self) -> Result<Vec<String>> {
        let stream = self
            .client
            .simple_query("SELECT schema_name FROM information_schema.schemata ORDER BY schema_name")
            .await?;
        let rows = stream.into_first_result().await?;

        let mut schemas = Vec::with_capacity(rows.len());
        for row in rows {
            let name: &str = row
                .try_get(0)?
                .ok_or_else(|| MigrateError::Discovery("null schema name in catalog".into()))?;
            schemas.push(name.to_string());
        }

        schemas.retain(|s| !RESERVED_SCHEMAS.iter().any(|r| r.eq_ignore_ascii_case(s)));
        debug!("Found {} user schemas", schemas.len());
        Ok(schemas)
    }

    async fn list_tables(&mut self, schema: &str) -> Result<Vec<TableRef>> {
        let mut query = Query::new(
            "SELECT table_name FROM information_schema.tables WHERE table_schema = @P1 ORDER BY table_name",
        );
        query.bind(schema);

        let stream = query.query(&mut self.client).await?;
        let rows = stream.into_first_result().await?;

        let mut tables = Vec::with_capacity(rows.len());
        for row in rows {
            let name: &str = row
                .try_get(0)?
                .ok_or_else(|| MigrateError::Discovery("null table name in catalog".into()))?;
            tables.push(TableRef::new(schema, name));
        }
        Ok(tables)
    }

    async fn list_columns(&mut self, schema: &str, table: &str) -> Result<Vec<Column>> {
        let mut query = Query::new(
            "SELECT column_name, data_type FROM information_schema.columns \
             WHERE table_schema = @P1 AND table_name = @P2 ORDER BY ordinal_position",
        );
        query.bind(schema);
        query.bind(table);

        let stream = query.query(&mut self.client).await?;
        let rows = stream.into_first_result().await?;

        let mut columns = Vec::with_capacity(rows.len());
        for row in rows {
            let name: &str = row
                .try_get(0)?
                .ok_or_else(|| MigrateError::Discovery("null column name in catalog".into()))?;
            let data_type: &str = row.try_get(1)?.unwrap_or("nvarchar");
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
            .map(|c| ddl::quote_ident(EngineKind::Mssql, &c.name))
            .collect();
        let sql = format!(
            "SELECT {} FROM {}",
            col_list.join(", "),
            ddl::qualify_table(EngineKind::Mssql, schema, table)
        );

        let stream = self.client.simple_query(sql.as_str()).await?;
        let rows = stream.into_first_result().await?;

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
impl crate::engine::TargetDb for MssqlConn {
    fn kind(&self) -> EngineKind {
        EngineKind::Mssql
    }

    async fn create_schema(&mut self, schema: &str) -> Result<()> {
        let sql = ddl::create_schema_stmt(EngineKind::Mssql, schema);
        self.client.execute(sql.as_str(), &[]).await?;
        debug!("Created schema [{}]", schema);
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
        _columns: &[String],
        rows: Vec<Vec<SqlValue>>,
    ) -> Result<u64> {
        if rows.is_empty() {
            return Ok(0);
        }

        let qualified = ddl::qualify_table(EngineKind::Mssql, schema, table);
        let plain = format!("{}.{}", schema, table);
        let row_count = rows.len() as u64;
        let timeout = self.bulk_timeout;

        // The bulk request binds the destination table directly; column
        // order comes from the table we just created.
        let load = async {
            let mut bulk = self.client.bulk_insert(&qualified).await.map_err(|e| {
                MigrateError::transfer(&plain, format!("bulk insert init: {}", e))
            })?;

            for row in &rows {
                let mut token_row = TokenRow::new();
                for value in row {
                    token_row.push(sql_value_to_column_data(value));
                }
                bulk.send(token_row).await.map_err(|e| {
                    MigrateError::transfer(&plain, format!("bulk insert send: {}", e))
                })?;
            }

            bulk.finalize().await.map_err(|e| {
                MigrateError::transfer(&plain, format!("bulk insert finalize: {}", e))
            })?;

            Ok::<(), MigrateError>(())
        };

        tokio::time::timeout(timeout, load).await.map_err(|_| {
            MigrateError::transfer(
                &plain,
                format!("bulk load exceeded {}s timeout", timeout.as_secs()),
            )
        })??;

        Ok(row_count)
    }
}

/// Convert one row value based on the column's declared type.
///
/// Conversion failures are hard errors: a value the driver cannot hand over
/// in the expected shape fails the table instead of degrading to NULL.
fn convert_row_value(row: &Row, idx: usize, data_type: &str) -> Result<SqlValue> {
    let dt = data_type.to_lowercase();

    let value = match dt.as_str() {
        "bit" => or_null(row.try_get::<bool, _>(idx)?, SqlValue::Bool, SqlNullType::Bool),
        "tinyint" => or_null(
            row.try_get::<u8, _>(idx)?.map(|v| v as i16),
            SqlValue::I16,
            SqlNullType::I16,
        ),
        "smallint" => or_null(row.try_get::<i16, _>(idx)?, SqlValue::I16, SqlNullType::I16),
        "int" => or_null(row.try_get::<i32, _>(idx)?, SqlValue::I32, SqlNullType::I32),
        "bigint" => or_null(row.try_get::<i64, _>(idx)?, SqlValue::I64, SqlNullType::I64),
        "real" => or_null(row.try_get::<f32, _>(idx)?, SqlValue::F32, SqlNullType::F32),
        "float" => or_null(row.try_get::<f64, _>(idx)?, SqlValue::F64, SqlNullType::F64),
        "uniqueidentifier" => or_null(
            row.try_get::<uuid::Uuid, _>(idx)?,
            SqlValue::Uuid,
            SqlNullType::Uuid,
        ),
        // DATE columns keep a full (midnight) datetime: the cross-dialect
        // type map sends them into timestamp/datetime2 destination columns.
        "datetime" | "datetime2" | "smalldatetime" | "date" => or_null(
            row.try_get::<chrono::NaiveDateTime, _>(idx)?,
            SqlValue::DateTime,
            SqlNullType::DateTime,
        ),
        // Tiberius hands TIME back as a datetime; keep the time-of-day part.
        "time" => or_null(
            row.try_get::<chrono::NaiveDateTime, _>(idx)?.map(|v| v.time()),
            SqlValue::Time,
            SqlNullType::Time,
        ),
        "datetimeoffset" => or_null(
            row.try_get::<chrono::DateTime<chrono::Utc>, _>(idx)?
                .map(|v| v.fixed_offset()),
            SqlValue::DateTimeOffset,
            SqlNullType::DateTimeOffset,
        ),
        "binary" | "varbinary" | "image" | "rowversion" => or_null(
            row.try_get::<&[u8], _>(idx)?.map(|v| v.to_vec()),
            SqlValue::Bytes,
            SqlNullType::Bytes,
        ),
        "decimal" | "numeric" => or_null(
            row.try_get::<rust_decimal::Decimal, _>(idx)?,
            SqlValue::Decimal,
            SqlNullType::Decimal,
        ),
        // Money comes back as a float; re-anchor it as a decimal.
        "money" | "smallmoney" => or_null(
            row.try_get::<f64, _>(idx)?
                .map(|v| rust_decimal::Decimal::from_f64(v).map(SqlValue::Decimal).unwrap_or(SqlValue::F64(v))),
            |v| v,
            SqlNullType::Decimal,
        ),
        // varchar, nvarchar, char, nchar, text, ntext, xml and anything
        // else string-shaped.
        _ => or_null(
            row.try_get::<&str, _>(idx)?.map(|v| v.to_string()),
            SqlValue::String,
            SqlNullType::String,
        ),
    };

    Ok(value)
}

fn or_null<T>(value: Option<T>, wrap: impl FnOnce(T) -> SqlValue, null: SqlNullType) -> SqlValue {
    value.map(wrap).unwrap_or(SqlValue::Null(null))
}

/// Encode a SqlValue as the TDS token for bulk insert.
fn sql_value_to_column_data(value: &SqlValue) -> ColumnData<'static> {
    match value {
        SqlValue::Null(null_type) => match null_type {
            SqlNullType::Bool => ColumnData::Bit(None),
            SqlNullType::I16 => ColumnData::I16(None),
            SqlNullType::I32 => ColumnData::I32(None),
            SqlNullType::I64 => ColumnData::I64(None),
            SqlNullType::F32 => ColumnData::F32(None),
            SqlNullType::F64 => ColumnData::F64(None),
            SqlNullType::String => ColumnData::String(None),
            SqlNullType::Bytes => ColumnData::Binary(None),
            SqlNullType::Uuid => ColumnData::Guid(None),
            SqlNullType::Decimal => ColumnData::Numeric(None),
            SqlNullType::DateTime => ColumnData::DateTime2(None),
            SqlNullType::DateTimeOffset => ColumnData::DateTimeOffset(None),
            // Dates travel as datetime2 tokens; see the type map.
            SqlNullType::Date => ColumnData::DateTime2(None),
            SqlNullType::Time => ColumnData::Time(None),
        },
        SqlValue::Bool(b) => ColumnData::Bit(Some(*b)),
        SqlValue::I16(i) => ColumnData::I16(Some(*i)),
        SqlValue::I32(i) => ColumnData::I32(Some(*i)),
        SqlValue::I64(i) => ColumnData::I64(Some(*i)),
        SqlValue::F32(f) => {
            if f.is_nan() || f.is_infinite() {
                // The engine has no NaN/Infinity representation.
                warn!("Converting F32 NaN/Infinity to NULL");
                ColumnData::F32(None)
            } else {
                ColumnData::F32(Some(*f))
            }
        }
        SqlValue::F64(f) => {
            if f.is_nan() || f.is_infinite() {
                warn!("Converting F64 NaN/Infinity to NULL");
                ColumnData::F64(None)
            } else {
                ColumnData::F64(Some(*f))
            }
        }
        SqlValue::String(s) => ColumnData::String(Some(Cow::Owned(s.clone()))),
        SqlValue::Bytes(b) => ColumnData::Binary(Some(Cow::Owned(b.clone()))),
        SqlValue::Uuid(u) => ColumnData::Guid(Some(*u)),
        SqlValue::Decimal(d) => {
            let scale = d.scale() as u8;
            let mantissa = d.mantissa();
            ColumnData::Numeric(Some(tiberius::numeric::Numeric::new_with_scale(
                mantissa, scale,
            )))
        }
        SqlValue::DateTime(dt) => match datetime2_token(dt.date(), Some(dt.time())) {
            Some(v) => ColumnData::DateTime2(Some(v)),
            None => ColumnData::DateTime2(None),
        },
        SqlValue::DateTimeOffset(dto) => {
            let naive = dto.naive_utc();
            match datetime2_token(naive.date(), Some(naive.time())) {
                Some(datetime2) => {
                    let offset_minutes = (dto.offset().local_minus_utc() / 60) as i16;
                    ColumnData::DateTimeOffset(Some(tiberius::time::DateTimeOffset::new(
                        datetime2,
                        offset_minutes,
                    )))
                }
                None => ColumnData::DateTimeOffset(None),
            }
        }
        SqlValue::Date(d) => match datetime2_token(*d, None) {
            Some(v) => ColumnData::DateTime2(Some(v)),
            None => ColumnData::DateTime2(None),
        },
        SqlValue::Time(t) => ColumnData::Time(Some(tiberius::time::Time::new(
            time_increments(t),
            7,
        ))),
    }
}

/// Build a DateTime2 token: days since year 1 plus 100ns increments since
/// midnight (scale 7). Dates before year 1 have no representation.
fn datetime2_token(
    date: chrono::NaiveDate,
    time: Option<chrono::NaiveTime>,
) -> Option<tiberius::time::DateTime2> {
    let epoch = chrono::NaiveDate::from_ymd_opt(1, 1, 1).unwrap();
    let days = (date - epoch).num_days();
    if days < 0 || days > u32::MAX as i64 {
        warn!("Date out of range for the TDS calendar (days={}), converting to NULL", days);
        return None;
    }

    let increments = time.map(|t| time_increments(&t)).unwrap_or(0);
    Some(tiberius::time::DateTime2::new(
        tiberius::time::Date::new(days as u32),
        tiberius::time::Time::new(increments, 7),
    ))
}

/// 100-nanosecond increments since midnight.
fn time_increments(t: &chrono::NaiveTime) -> u64 {
    let nanos = t.num_seconds_from_midnight() as u64 * 1_000_000_000 + t.nanosecond() as u64;
    nanos / 100
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime};

    #[test]
    fn test_nan_and_infinity_become_null() {
        assert!(matches!(
            sql_value_to_column_data(&SqlValue::F32(f32::NAN)),
            ColumnData::F32(None)
        ));
        assert!(matches!(
            sql_value_to_column_data(&SqlValue::F64(f64::INFINITY)),
            ColumnData::F64(None)
        ));
        assert!(matches!(
            sql_value_to_column_data(&SqlValue::F64(1.5)),
            ColumnData::F64(Some(_))
        ));
    }

    #[test]
    fn test_typed_nulls_keep_their_encoding() {
        assert!(matches!(
            sql_value_to_column_data(&SqlValue::Null(SqlNullType::I32)),
            ColumnData::I32(None)
        ));
        assert!(matches!(
            sql_value_to_column_data(&SqlValue::Null(SqlNullType::Uuid)),
            ColumnData::Guid(None)
        ));
        assert!(matches!(
            sql_value_to_column_data(&SqlValue::Null(SqlNullType::Date)),
            ColumnData::DateTime2(None)
        ));
    }

    #[test]
    fn test_decimal_keeps_mantissa_and_scale() {
        let d: rust_decimal::Decimal = "123.45".parse().unwrap();
        match sql_value_to_column_data(&SqlValue::Decimal(d)) {
            ColumnData::Numeric(Some(n)) => {
                assert_eq!(n.value(), 12345);
                assert_eq!(n.scale(), 2);
            }
            other => panic!("expected Numeric, got {:?}", other),
        }
    }

    #[test]
    fn test_time_increments_scale_seven() {
        let t = NaiveTime::from_hms_opt(0, 0, 1).unwrap();
        assert_eq!(time_increments(&t), 10_000_000);
    }

    #[test]
    fn test_pre_year_one_date_becomes_null() {
        // chrono supports negative years; the TDS calendar does not.
        let ancient = NaiveDate::from_ymd_opt(-1, 6, 1).unwrap();
        assert!(datetime2_token(ancient, None).is_none());
    }

    #[test]
    fn test_reserved_schema_set_matches_case_insensitively() {
        for name in ["sys", "SYS", "information_schema", "Db_Owner"] {
            assert!(
                RESERVED_SCHEMAS.iter().any(|r| r.eq_ignore_ascii_case(name)),
                "{} should be reserved",
                name
            );
        }
        assert!(!RESERVED_SCHEMAS.iter().any(|r| r.eq_ignore_ascii_case("sales")));
    }
}
