use thiserror::Error;

/// Failure reported by a [`ContainerRuntime`](crate::ContainerRuntime) implementation.
///
/// Every variant names the container, image or name it relates to.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    #[error("container runtime unavailable: {0}")]
    Unavailable(String),

    #[error("{target} not found")]
    NotFound { target: String },

    #[error("{target} already exists")]
    Conflict { target: String },

    #[error("{op} failed for {target}: {reason}")]
    Api {
        op: &'static str,
        target: String,
        reason: String,
    },
}

impl RuntimeError {
    pub fn api(op: &'static str, target: impl Into<String>, reason: impl ToString) -> Self {
        RuntimeError::Api {
            op,
            target: target.into(),
            reason: reason.to_string(),
        }
    }

    pub fn not_found(target: impl Into<String>) -> Self {
        RuntimeError::NotFound {
            target: target.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, RuntimeError::NotFound { .. })
    }
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("runtime error: {0}")]
    Runtime(#[from] RuntimeError),
}
