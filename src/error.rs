//! Error types for the DAO layer.
//!
//! Filter and clause input is lenient and never produces an error here: a
//! malformed optional clause is simply left out. Only writes with nothing to
//! write are rejected up front; everything else in [`DaoError`] comes from the
//! driver, from configuration, or from the transaction coordinator.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DaoError {
    #[error("Connection failed: {message}")]
    Connection { message: String, suggestion: String },

    #[error("Database error: {message}")]
    Database {
        message: String,
        /// e.g., "42S02" for unknown table
        sql_state: Option<String>,
    },

    #[error("Timeout: {operation} exceeded {elapsed_secs}s")]
    Timeout {
        operation: String,
        elapsed_secs: u64,
    },

    #[error("Client not found: {client}")]
    ClientNotFound { client: String },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Transaction state error: {message} (client: {client})")]
    TransactionState { message: String, client: String },

    #[error("Commit failed for {}: {message}", .clients.join(", "))]
    CommitFailed {
        clients: Vec<String>,
        message: String,
    },

    #[error("transaction failed: {transaction_error}; rollback also failed: {rollback_error}")]
    TransactionRollbackFailed {
        transaction_error: String,
        rollback_error: String,
    },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DaoError {
    /// Create a connection error with a helpful suggestion.
    pub fn connection(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a database error with optional SQL state.
    pub fn database(message: impl Into<String>, sql_state: Option<String>) -> Self {
        Self::Database {
            message: message.into(),
            sql_state,
        }
    }

    pub fn timeout(operation: impl Into<String>, elapsed_secs: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            elapsed_secs,
        }
    }

    /// Create a client not found error. `None` is the primary client.
    pub fn client_not_found(client: Option<&str>) -> Self {
        Self::ClientNotFound {
            client: client_label(client).to_string(),
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create a transaction state error for the given client.
    pub fn transaction_state(message: impl Into<String>, client: Option<&str>) -> Self {
        Self::TransactionState {
            message: message.into(),
            client: client_label(client).to_string(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connection { suggestion, .. } => Some(suggestion),
            _ => None,
        }
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::Timeout { .. })
    }

    /// Machine-readable error code.
    pub fn error_code(&self) -> String {
        match self {
            Self::Database {
                sql_state: Some(code),
                ..
            } => format!("MYSQL_{}", code),
            Self::Database { .. } => "DATABASE_ERROR".to_string(),
            Self::Connection { .. } => "CONNECTION_ERROR".to_string(),
            Self::Timeout { .. } => "TIMEOUT".to_string(),
            Self::ClientNotFound { .. } => "CLIENT_NOT_FOUND".to_string(),
            Self::InvalidInput { .. } => "INVALID_INPUT".to_string(),
            Self::TransactionState { .. } => "TRANSACTION_STATE".to_string(),
            Self::CommitFailed { .. } => "COMMIT_FAILED".to_string(),
            Self::TransactionRollbackFailed { .. } => "TRANSACTION_ROLLBACK_FAILED".to_string(),
            Self::Config { .. } => "CONFIG_ERROR".to_string(),
            Self::Internal { .. } => "INTERNAL_ERROR".to_string(),
        }
    }
}

/// Display name for a client; the unnamed client is the primary one.
pub(crate) fn client_label(client: Option<&str>) -> &str {
    client.unwrap_or("primary")
}

/// Convert sqlx errors to DaoError.
impl From<sqlx::Error> for DaoError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => DaoError::connection(
                msg.to_string(),
                "Check the connection string format and credentials",
            ),
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                DaoError::database(db_err.message(), code)
            }
            sqlx::Error::RowNotFound => DaoError::database("No rows returned", None),
            sqlx::Error::PoolTimedOut => DaoError::timeout("connection pool acquire", 30),
            sqlx::Error::PoolClosed => {
                DaoError::connection("Connection pool is closed", "Reconnect to the database")
            }
            sqlx::Error::Io(io_err) => DaoError::connection(
                format!("I/O error: {}", io_err),
                "Check network connectivity and database server status",
            ),
            sqlx::Error::Tls(tls_err) => DaoError::connection(
                format!("TLS error: {}", tls_err),
                "Verify TLS configuration and certificates",
            ),
            sqlx::Error::Protocol(msg) => DaoError::connection(
                format!("Protocol error: {}", msg),
                "Check database server compatibility",
            ),
            sqlx::Error::ColumnDecode { index, source } => {
                DaoError::internal(format!("Failed to decode column {}: {}", index, source))
            }
            sqlx::Error::Decode(source) => DaoError::internal(format!("Decode error: {}", source)),
            sqlx::Error::WorkerCrashed => DaoError::internal("Database worker crashed"),
            _ => DaoError::internal(format!("Unknown database error: {}", err)),
        }
    }
}

/// Result type alias for DAO operations.
pub type DaoResult<T> = Result<T, DaoError>;
