//! User settings
//!
//! Stored in ~/.airdesk/config.toml. Every key is optional.

use crate::audit::{ActorId, AUDIT_TABLE};
use crate::config::ConnectionConfig;
use crate::db::identifier::{Identifier, TableName};
use crate::error::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Tables the console manages unless the settings narrow the list
pub const DEFAULT_TABLES: [&str; 14] = [
    "airports",
    "terminals",
    "gates",
    "flight_statuses",
    "payment_methods",
    "booking_statuses",
    "passengers",
    "flights",
    "flight_schedules",
    "bookings",
    "payments",
    "admin_roles",
    "admins",
    "notifications",
];

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Rows per page in `list`
    #[serde(default = "default_page_size")]
    pub page_size: u64,

    /// Managed tables, in display order
    #[serde(default = "default_tables")]
    pub tables: Vec<String>,

    /// Admin id used when `--actor` is not given
    #[serde(default)]
    pub actor_id: Option<i32>,

    /// `tracing` filter used when `RUST_LOG` is unset
    #[serde(default = "default_log_filter")]
    pub log_filter: String,

    #[serde(default = "default_audit_table")]
    pub audit_table: String,
}

fn default_page_size() -> u64 {
    50
}

fn default_tables() -> Vec<String> {
    DEFAULT_TABLES.iter().map(|t| t.to_string()).collect()
}

fn default_log_filter() -> String {
    "airdesk=info".to_string()
}

fn default_audit_table() -> String {
    AUDIT_TABLE.to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            tables: default_tables(),
            actor_id: None,
            log_filter: default_log_filter(),
            audit_table: default_audit_table(),
        }
    }
}

impl Settings {
    /// The configured tables as validated names
    ///
    /// # Errors
    /// `ConfigError::Invalid` naming the first entry that is not a plain
    /// identifier, or when the same table is listed twice.
    pub fn table_names(&self) -> ConfigResult<Vec<TableName>> {
        let mut names: Vec<TableName> = Vec::with_capacity(self.tables.len());
        for raw in &self.tables {
            let name = Identifier::parse(raw)
                .map_err(|e| ConfigError::Invalid(format!("tables: {}", e)))?;
            if names.contains(&name) {
                return Err(ConfigError::Invalid(format!("tables: '{}' listed twice", name)));
            }
            names.push(name);
        }
        Ok(names)
    }

    pub fn audit_table_name(&self) -> ConfigResult<Identifier> {
        Identifier::parse(&self.audit_table)
            .map_err(|e| ConfigError::Invalid(format!("audit_table: {}", e)))
    }

    pub fn default_actor(&self) -> Option<ActorId> {
        self.actor_id.map(ActorId)
    }

    fn validate(self) -> ConfigResult<Self> {
        if self.page_size == 0 {
            return Err(ConfigError::Invalid("page_size must be at least 1".into()));
        }
        self.table_names()?;
        self.audit_table_name()?;
        Ok(self)
    }
}

/// Load settings from ~/.airdesk/config.toml
pub fn load_settings() -> ConfigResult<Settings> {
    load_settings_from(&ConnectionConfig::config_dir()?.join("config.toml"))
}

/// Load settings from `path`; a missing file yields the defaults
pub fn load_settings_from(path: &Path) -> ConfigResult<Settings> {
    if !path.exists() {
        return Ok(Settings::default());
    }
    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::NotFound(format!("{}: {}", path.display(), e)))?;
    let settings: Settings = toml::from_str(&content)?;
    settings.validate()
}
