use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("invalid image reference: {0:?}")]
    InvalidImage(String),
    #[error("invalid container state: {0:?}")]
    InvalidState(String),
}
