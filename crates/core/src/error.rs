use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AngleVarError {
    /// Precondition violation caught before any computation starts.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Point {index} has dimension {found}, expected {expected}")]
    DimensionMismatch {
        index: usize,
        expected: usize,
        found: usize,
    },

    #[error("Point {index} has a non-finite coordinate")]
    NonFiniteCoordinate { index: usize },

    #[error("Projection {index} is malformed: {reason}")]
    MalformedProjection { index: usize, reason: String },

    #[error("Thread pool error: {0}")]
    ThreadPool(String),
}

pub type Result<T> = std::result::Result<T, AngleVarError>;

impl AngleVarError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }
}
