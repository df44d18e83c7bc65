//! Error types for airdesk
//!
//! This module defines the error hierarchy used throughout the application.
//! We use `thiserror` for library-style errors with clear error chains.

use std::fmt;
use std::io;

/// Main error type for the airdesk application
#[derive(Debug, thiserror::Error)]
pub enum AirdeskError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    /// CRUD engine errors
    #[error("{0}")]
    Crud(#[from] CrudError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Command parsing errors
    #[error("Command error: {0}")]
    Command(#[from] CommandError),
}

/// Database operation errors
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// Failed to establish connection
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Query execution failed
    #[error("Query execution failed: {0}")]
    QueryFailed(String),

    /// Schema introspection failed
    #[error("Schema loading failed: {0}")]
    SchemaLoadFailed(String),

    /// The connection to the server is gone
    #[error("Not connected to database")]
    NotConnected,
}

impl From<tokio_postgres::Error> for DbError {
    fn from(err: tokio_postgres::Error) -> Self {
        if err.is_closed() {
            DbError::NotConnected
        } else {
            DbError::QueryFailed(err.to_string())
        }
    }
}

/// Which kind of integrity constraint rejected a write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintKind {
    Unique,
    ForeignKey,
    NotNull,
    Check,
    Exclusion,
}

impl fmt::Display for ConstraintKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConstraintKind::Unique => "unique",
            ConstraintKind::ForeignKey => "foreign key",
            ConstraintKind::NotNull => "not-null",
            ConstraintKind::Check => "check",
            ConstraintKind::Exclusion => "exclusion",
        };
        f.write_str(name)
    }
}

/// A single rejected form field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    /// Column the bad input was meant for
    pub column: String,
    /// What was wrong with it
    pub message: String,
}

impl FieldError {
    pub fn new(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.column, self.message)
    }
}

/// CRUD engine errors
///
/// Every variant except `Database` is a distinct, actionable outcome the
/// caller is expected to surface on its own. Nothing here is retried.
#[derive(Debug, thiserror::Error)]
pub enum CrudError {
    /// Malformed identifier, or a table/column outside the known schema
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    /// Update/delete against a table without a single-column primary key
    #[error("Table '{0}' has no primary key")]
    NoPrimaryKey(String),

    /// No row matched the given key
    #[error("Record {key} no longer exists in '{table}'")]
    RecordNotFound { table: String, key: String },

    /// The database rejected the write because of an integrity constraint
    #[error("{kind} constraint violated: {message}")]
    ConstraintViolation {
        kind: ConstraintKind,
        constraint: Option<String>,
        message: String,
    },

    /// One or more form values could not be converted to the column type
    #[error("Invalid field value: {}", join_field_errors(.0))]
    InvalidFieldValue(Vec<FieldError>),

    /// Connection or query failure not covered above
    #[error(transparent)]
    Database(#[from] DbError),
}

fn join_field_errors(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl From<tokio_postgres::Error> for CrudError {
    fn from(err: tokio_postgres::Error) -> Self {
        use tokio_postgres::error::SqlState;

        let Some(db_err) = err.as_db_error() else {
            return CrudError::Database(DbError::from(err));
        };

        let code = db_err.code();
        let kind = if *code == SqlState::UNIQUE_VIOLATION {
            ConstraintKind::Unique
        } else if *code == SqlState::FOREIGN_KEY_VIOLATION {
            ConstraintKind::ForeignKey
        } else if *code == SqlState::NOT_NULL_VIOLATION {
            ConstraintKind::NotNull
        } else if *code == SqlState::CHECK_VIOLATION {
            ConstraintKind::Check
        } else if *code == SqlState::EXCLUSION_VIOLATION {
            ConstraintKind::Exclusion
        } else {
            return CrudError::Database(DbError::QueryFailed(db_err.message().to_string()));
        };

        // DETAIL carries the human meaning, e.g.
        // `Key (airport_id)=(1) is still referenced from table "terminals".`
        let message = db_err
            .detail()
            .unwrap_or_else(|| db_err.message())
            .to_string();

        CrudError::ConstraintViolation {
            kind,
            constraint: db_err.constraint().map(str::to_string),
            message,
        }
    }
}

/// Configuration loading/parsing errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Home directory not found
    #[error("Could not determine home directory")]
    NoHomeDir,

    /// Config file not found
    #[error("Configuration file not found: {0}")]
    NotFound(String),

    /// Failed to parse TOML
    #[error("Failed to parse configuration: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    /// Connection profile not found
    #[error("Connection profile '{0}' not found")]
    ProfileNotFound(String),
}

/// Command parsing and execution errors
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    /// Malformed `column=value` argument
    #[error("Expected column=value, got '{0}'")]
    MalformedAssignment(String),

    /// The same column was assigned twice
    #[error("Column '{0}' assigned more than once")]
    DuplicateAssignment(String),

    /// A write was requested without an acting admin
    #[error("An actor id is required for write commands (use --actor)")]
    MissingActor,

    /// Invalid argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

/// Specialized Result type for airdesk operations
pub type Result<T> = std::result::Result<T, AirdeskError>;

/// Specialized Result type for database operations
pub type DbResult<T> = std::result::Result<T, DbError>;

/// Specialized Result type for CRUD engine operations
pub type CrudResult<T> = std::result::Result<T, CrudError>;

/// Specialized Result type for config operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Specialized Result type for command operations
pub type CommandResult<T> = std::result::Result<T, CommandError>;
