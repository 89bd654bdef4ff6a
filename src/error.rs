//! Error types for the fan-out pipeline.

/// Top-level error type for the pipeline.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Broker error: {0}")]
    Broker(#[from] BrokerError),

    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),

    #[error("Notification error: {0}")]
    Notify(#[from] NotifyError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Broker-related errors (connection, declaration, publish, consume).
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("Failed to connect to broker at {url}: {reason}")]
    Connect { url: String, reason: String },

    #[error("Failed to declare queue {queue}: {reason}")]
    Declare { queue: String, reason: String },

    #[error("Failed to publish to queue {queue}: {reason}")]
    Publish { queue: String, reason: String },

    #[error("Failed to subscribe to queue {queue}: {reason}")]
    Subscribe { queue: String, reason: String },

    #[error("Failed to acknowledge delivery: {reason}")]
    Ack { reason: String },

    #[error("Delivery stream for queue {queue} failed: {reason}")]
    Stream { queue: String, reason: String },
}

/// Errors reading the input or intermediate CSV files.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Missing required column '{column}' (headers: {headers:?})")]
    MissingColumn {
        column: String,
        headers: Vec<String>,
    },

    #[error("Intermediate file {0} does not exist or is not accessible")]
    IntermediateMissing(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Per-record validation errors. Always recoverable: the record is
/// logged and dropped, never retried.
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("Expected {expected} fields, found {found}")]
    FieldCount { expected: usize, found: usize },

    #[error("Invalid number in field '{field}': {raw:?}")]
    InvalidNumber { field: String, raw: String },

    #[error("Message body is not valid UTF-8")]
    InvalidUtf8,
}

/// Errors appending to a per-region output file.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Errors dispatching notification emails.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Invalid address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("Failed to build message for {attachment}: {reason}")]
    Build { attachment: String, reason: String },

    #[error("Failed to read attachment {attachment}: {source}")]
    Attachment {
        attachment: String,
        #[source]
        source: std::io::Error,
    },

    #[error("SMTP error: {0}")]
    Smtp(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for the pipeline.
pub type Result<T> = std::result::Result<T, Error>;
