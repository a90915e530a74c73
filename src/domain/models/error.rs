#[cfg(test)]
#[path = "error_test.rs"]
mod tests;

use thiserror::Error;

/// Failures detected locally, before the model is ever contacted. Anything
/// else reaching a transport is treated as an upstream generation failure.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FlowError {
    #[error("{0}")]
    Validation(String),
    #[error("Invalid session ID: {0}")]
    InvalidSession(String),
    #[error("No catalog provided in the request.")]
    MissingCatalog,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    InvalidArgument,
    NotFound,
    Unavailable,
}

impl ErrorKind {
    pub fn classify(err: &anyhow::Error) -> ErrorKind {
        match err.downcast_ref::<FlowError>() {
            Some(FlowError::Validation(_)) | Some(FlowError::MissingCatalog) => {
                return ErrorKind::InvalidArgument;
            }
            Some(FlowError::InvalidSession(_)) => return ErrorKind::NotFound,
            None => return ErrorKind::Unavailable,
        }
    }
}
