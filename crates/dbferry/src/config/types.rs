//! Configuration type definitions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Database engine kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    /// Microsoft SQL Server (T-SQL dialect).
    Mssql,

    /// PostgreSQL or a Postgres-compatible engine.
    #[serde(alias = "psql")]
    Postgres,
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineKind::Mssql => write!(f, "mssql"),
            EngineKind::Postgres => write!(f, "postgres"),
        }
    }
}

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Source database endpoint.
    pub source: EndpointConfig,

    /// Destination database endpoint.
    pub destination: EndpointConfig,

    /// Optional allow-list restricting which schemas/tables are migrated.
    #[serde(default)]
    pub selection: CopySelection,

    /// Transfer behavior settings.
    #[serde(default)]
    pub transfer: TransferSettings,
}

/// A single database endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Engine kind ("mssql" or "postgres"/"psql").
    pub kind: EngineKind,

    /// Database host.
    pub host: String,

    /// Database port. Defaults to the engine's standard port.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Database name.
    pub database: String,

    /// Username.
    pub user: String,

    /// Password.
    pub password: String,

    /// Encrypt the connection (SQL Server only; default: true).
    #[serde(default = "default_true")]
    pub encrypt: bool,

    /// Trust the server certificate (SQL Server only; default: false).
    #[serde(default)]
    pub trust_server_cert: bool,
}

impl EndpointConfig {
    /// Effective port, falling back to the engine default.
    pub fn effective_port(&self) -> u16 {
        self.port.unwrap_or(match self.kind {
            EngineKind::Mssql => 1433,
            EngineKind::Postgres => 5432,
        })
    }

    /// Short human-readable endpoint description for diagnostics.
    pub fn endpoint(&self) -> String {
        format!(
            "{}://{}:{}/{}",
            self.kind,
            self.host,
            self.effective_port(),
            self.database
        )
    }
}

/// Allow-list of schemas and tables to migrate.
///
/// Disabled (the default) means everything discoverable is migrated. An
/// entry with an empty `tables` list selects that whole schema.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CopySelection {
    /// Whether the allow-list is active.
    #[serde(default)]
    pub enabled: bool,

    /// Selected schemas and their tables.
    #[serde(default)]
    pub entries: Vec<SelectionEntry>,
}

/// One schema's selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionEntry {
    /// Schema name.
    pub schema: String,

    /// Table names within the schema. Empty selects the whole schema.
    #[serde(default)]
    pub tables: Vec<String>,
}

impl CopySelection {
    /// Whether a schema should be visited.
    pub fn allows_schema(&self, schema: &str) -> bool {
        if !self.enabled {
            return true;
        }
        self.entries.iter().any(|e| e.schema == schema)
    }

    /// Whether a table should be visited.
    pub fn allows_table(&self, schema: &str, table: &str) -> bool {
        if !self.enabled {
            return true;
        }
        self.entries
            .iter()
            .filter(|e| e.schema == schema)
            .any(|e| e.tables.is_empty() || e.tables.iter().any(|t| t == table))
    }
}

/// Transfer behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferSettings {
    /// Timeout in seconds for a single table's bulk load (default: 300).
    #[serde(default = "default_bulk_timeout")]
    pub bulk_timeout_secs: u64,
}

impl Default for TransferSettings {
    fn default() -> Self {
        Self {
            bulk_timeout_secs: default_bulk_timeout(),
        }
    }
}

// Default value functions for serde
fn default_true() -> bool {
    true
}

fn default_bulk_timeout() -> u64 {
    300
}
