use thiserror::Error;

/// Failures of the invocation itself, before any operation runs.
///
/// These are the only errors that terminate the process with a non-zero status.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("arguments are not a JSON array: {0}")]
    MalformedArguments(#[from] serde_json::Error),
    #[error("invalid argument `{name}`: {reason}")]
    InvalidArgument { name: &'static str, reason: String },
    #[error("runtime error: {0}")]
    Runtime(#[from] std::io::Error),
}

impl AppError {
    pub fn invalid_argument<T: Into<String>>(name: &'static str, reason: T) -> Self {
        Self::InvalidArgument {
            name,
            reason: reason.into(),
        }
    }
}
