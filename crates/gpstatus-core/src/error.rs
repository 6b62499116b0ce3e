//! Error types for the core crate.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    #[error("roll number is empty")]
    EmptyRollNumber,

    #[error("malformed payload: {0}")]
    MalformedPayload(String),
}
