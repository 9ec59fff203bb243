//! Error types for quantabot.

use std::time::Duration;

/// Top-level error type for the engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Dataset error: {0}")]
    Dataset(#[from] DatasetError),

    #[error("Statistics error: {0}")]
    Stats(#[from] StatsError),

    #[error("Chart error: {0}")]
    Chart(#[from] ChartError),

    #[error("Document error: {0}")]
    Document(#[from] DocumentError),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Channel-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Channel {name} failed to start: {reason}")]
    StartupFailed { name: String, reason: String },

    #[error("Failed to send response on channel {name}: {reason}")]
    SendFailed { name: String, reason: String },

    #[error("Invalid message format: {0}")]
    InvalidMessage(String),

    #[error("HTTP error: {0}")]
    Http(String),
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Request timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Dataset loading/validation errors.
#[derive(Debug, thiserror::Error)]
pub enum DatasetError {
    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    #[error("Failed to parse {path}: {reason}")]
    ParseFailed { path: String, reason: String },

    #[error("Dataset is empty: {0}")]
    Empty(String),

    #[error("Column not found: {0}")]
    ColumnNotFound(String),

    #[error("Schema mismatch: expected column {expected} is missing")]
    SchemaMismatch { expected: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Statistics engine errors. These cross the collaborator boundary as
/// values, never as panics.
#[derive(Debug, thiserror::Error)]
pub enum StatsError {
    #[error("Column {column} is not numeric")]
    NotNumeric { column: String },

    #[error("Column {column} has {found} groups, {required} required")]
    GroupCount {
        column: String,
        found: usize,
        required: String,
    },

    #[error("Not enough observations for {analysis}: {found} < {required}")]
    TooFewObservations {
        analysis: String,
        found: usize,
        required: usize,
    },

    #[error("Degenerate input for {analysis}: {reason}")]
    Degenerate { analysis: String, reason: String },

    #[error("Column not found: {0}")]
    ColumnNotFound(String),
}

/// Chart rendering errors.
#[derive(Debug, thiserror::Error)]
pub enum ChartError {
    #[error("Rendering failed for {kind}: {reason}")]
    RenderFailed { kind: String, reason: String },

    #[error("No drawable data in column {0}")]
    NoData(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Document generation errors.
#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("Nothing to report: history is empty")]
    EmptyHistory,

    #[error("Failed to write document: {0}")]
    WriteFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Workflow engine errors raised by the router and wizards.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("No wizard owns state {0}")]
    UnroutableState(String),

    #[error("Sticky flag {0} has no registered handler")]
    UnhandledFlag(String),

    #[error("No dataset loaded")]
    NoDataset,

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Dataset error: {0}")]
    Dataset(#[from] DatasetError),

    #[error("Statistics error: {0}")]
    Stats(#[from] StatsError),

    #[error("Chart error: {0}")]
    Chart(#[from] ChartError),

    #[error("Document error: {0}")]
    Document(#[from] DocumentError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),
}

/// Result type alias for the engine.
pub type Result<T> = std::result::Result<T, Error>;
