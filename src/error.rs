use thiserror::Error;

/// Type alias for Result with TrainerError
pub type Result<T> = std::result::Result<T, TrainerError>;

/// Error types for the classification engine and training orchestrator
#[derive(Error, Debug)]
pub enum TrainerError {
    /// Email generator unreachable or returned a malformed batch (aborts the current cycle only)
    #[error("Email generation failed: {0}")]
    Generation(String),

    /// External model unavailable; the classifier falls back instead of failing
    #[error("Classification degraded: {0}")]
    ClassificationDegraded(String),

    /// Category already present in the registry
    #[error("Category already exists: {0}")]
    DuplicateCategory(String),

    /// Category name rejected before reaching storage
    #[error("Invalid category name: {0}")]
    InvalidCategory(String),

    /// Feedback log could not be written
    #[error("Failed to write feedback: {0}")]
    FeedbackWrite(String),

    /// Network-related error (connection refused, DNS, reset)
    #[error("Network error: {0}")]
    Network(String),

    /// Request exceeded its deadline
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// Backend returned a non-success status
    #[error("Backend error (HTTP {status}): {message}")]
    Backend { status: u16, message: String },

    /// Response body did not match the expected contract
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Circuit breaker is open (rejecting external model calls)
    #[error("Circuit breaker open: {message}. Will retry after {retry_after_secs} seconds")]
    CircuitBreakerOpen {
        message: String,
        retry_after_secs: u64,
    },

    /// Caller supplied an out-of-range argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error (file operations, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl TrainerError {
    /// Check if the error is transient and should be retried
    pub fn is_transient(&self) -> bool {
        match self {
            TrainerError::Network(_)
            | TrainerError::Timeout(_)
            | TrainerError::CircuitBreakerOpen { .. } => true,
            TrainerError::Backend { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// Check if the error is permanent and should not be retried
    pub fn is_permanent(&self) -> bool {
        !self.is_transient()
    }
}

impl From<reqwest::Error> for TrainerError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            return TrainerError::Timeout(error.to_string());
        }
        if error.is_decode() {
            return TrainerError::InvalidResponse(error.to_string());
        }
        if let Some(status) = error.status() {
            return TrainerError::Backend {
                status: status.as_u16(),
                message: status.canonical_reason().unwrap_or("Unknown").to_string(),
            };
        }
        TrainerError::Network(error.to_string())
    }
}
