use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Connection error: {0}")]
    Connection(String),

    /// Transient failure reported by the exchange (rate limit, 5xx, garbled reply).
    #[error("Exchange API error: {0}")]
    Exchange(String),

    /// The exchange refused the request outright. Retrying will not help.
    #[error("Exchange rejected request: {0}")]
    Rejected(String),

    #[error("Invalid market data: {0}")]
    DataValidation(String),

    #[error("Order validation failed: {0}")]
    OrderValidation(String),

    #[error("Order already in progress for {symbol} on {exchange}")]
    LockContention { exchange: String, symbol: String },

    #[error("Notification delivery via {channel} failed: {message}")]
    NotificationDelivery { channel: String, message: String },

    #[error("Strategy execution failed: {0}")]
    StrategyExecution(String),

    #[error("Invalid strategy parameters: {0}")]
    InvalidParameters(String),

    #[error("{operation} failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        operation: String,
        attempts: u32,
        #[source]
        last: Box<Error>,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse classification used by retry loops and the worker to decide what
/// to do with a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Connection,
    Exchange,
    Rejected,
    DataValidation,
    OrderValidation,
    LockContention,
    NotificationDelivery,
    StrategyExecution,
    InvalidParameters,
    RetriesExhausted,
    Config,
    Json,
    Io,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Connection(_) => ErrorKind::Connection,
            Error::Exchange(_) => ErrorKind::Exchange,
            Error::Rejected(_) => ErrorKind::Rejected,
            Error::DataValidation(_) => ErrorKind::DataValidation,
            Error::OrderValidation(_) => ErrorKind::OrderValidation,
            Error::LockContention { .. } => ErrorKind::LockContention,
            Error::NotificationDelivery { .. } => ErrorKind::NotificationDelivery,
            Error::StrategyExecution(_) => ErrorKind::StrategyExecution,
            Error::InvalidParameters(_) => ErrorKind::InvalidParameters,
            Error::RetriesExhausted { .. } => ErrorKind::RetriesExhausted,
            Error::Config(_) => ErrorKind::Config,
            Error::Json(_) => ErrorKind::Json,
            Error::Io(_) => ErrorKind::Io,
        }
    }

    /// Whether a retry loop may attempt the operation again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Connection
                | ErrorKind::Exchange
                | ErrorKind::DataValidation
                | ErrorKind::NotificationDelivery
        )
    }

    /// Failures the worker loop treats as "skip this cycle" rather than fatal.
    pub fn is_local(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::OrderValidation | ErrorKind::LockContention
        )
    }

    /// The innermost error, looking through `RetriesExhausted` wrappers.
    pub fn root(&self) -> &Error {
        match self {
            Error::RetriesExhausted { last, .. } => last.root(),
            other => other,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
