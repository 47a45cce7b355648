use {
    thiserror::Error,
    crate::config::ConfigError,
};

/// Failure while incrementing a counter. Every variant is reported to the client as the same
/// generic internal error, the detail only goes to the logs.
#[derive(Error, Debug, Eq, PartialEq)]
pub enum CounterError {
    #[error("database driver is not available: {driver}")]
    DriverUnavailable { driver: String },

    #[error("failed to connect to database: {reason}")]
    ConnectionFailed { reason: String },

    #[error("failed to query sequence: {reason}")]
    QueryFailed { reason: String },

    #[error("failed to update sequence: {reason}")]
    UpdateFailed { reason: String },
}

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("database check failed: {0}")]
    DatabaseCheck(#[from] CounterError),

    #[error("failed to create worker pool: {reason}")]
    WorkerPool { reason: String },

    #[error("failed to create metrics registry: {reason}")]
    Metrics { reason: String },

    #[error("failed to bind {addr}: {reason}")]
    Bind { addr: String, reason: String },
}
