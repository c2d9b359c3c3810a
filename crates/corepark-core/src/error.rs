//! Error types for the corepark controller.

use thiserror::Error;

/// Result type alias for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Result type alias for controller lifecycle operations.
pub type ControllerResult<T> = Result<T, ControllerError>;

/// Rejections raised by the configuration surface.
///
/// A rejected write leaves the previous value in place.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("malformed value for {tunable}: {value:?}")]
    Malformed { tunable: String, value: String },

    #[error("unknown tunable: {0}")]
    UnknownTunable(String),

    #[error("unit {unit} out of range for a pool of {pool_size}")]
    UnitOutOfRange { unit: usize, pool_size: usize },

    #[error("{tunable} is not tunable on the anchor unit")]
    AnchorNotTunable { tunable: String },

    #[error("class list has {got} entries, pool has {expected} units")]
    ClassCount { expected: usize, got: usize },

    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Errors that can occur while starting or stopping the controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("pool reports zero units")]
    EmptyPool,

    #[error("no async runtime available to host the sampling task")]
    NoRuntime,

    #[error("sampling task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}
