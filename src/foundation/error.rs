/// Convenience result type used across the engine.
pub type EngineResult<T> = Result<T, EngineError>;

/// Top-level error taxonomy used by engine APIs.
#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    /// Invalid graph wiring (connect, attach, plant).
    #[error("connection error: {0}")]
    Connection(String),

    /// An index outside the addressable range of a container.
    #[error("invalid index {index} (count {count})")]
    InvalidIndex { index: i64, count: usize },

    /// Growing an internal array failed.
    #[error("allocation error: {0}")]
    Allocation(String),

    /// A producer, filter or frame callback failed to produce media.
    #[error("production error: {0}")]
    Production(String),

    /// Invalid timeline edit (playlist, multitrack, mix).
    #[error("timeline error: {0}")]
    Timeline(String),

    /// Invalid profile or engine configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Errors when serializing or deserializing data structures.
    #[error("serialization error: {0}")]
    Serde(String),

    /// Wrapped lower-level error from dependencies or IO.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl EngineError {
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    pub fn invalid_index(index: impl Into<i64>, count: usize) -> Self {
        Self::InvalidIndex {
            index: index.into(),
            count,
        }
    }

    pub fn production(msg: impl Into<String>) -> Self {
        Self::Production(msg.into())
    }

    pub fn timeline(msg: impl Into<String>) -> Self {
        Self::Timeline(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn serde(msg: impl Into<String>) -> Self {
        Self::Serde(msg.into())
    }
}

impl From<std::collections::TryReserveError> for EngineError {
    fn from(err: std::collections::TryReserveError) -> Self {
        Self::Allocation(err.to_string())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
