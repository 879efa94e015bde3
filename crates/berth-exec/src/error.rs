use thiserror::Error;

use berth_core::{CoreError, RuntimeError};

#[derive(Error, Debug)]
pub enum ExecError {
    #[error("pull {image}: {source}")]
    Pull {
        image: String,
        #[source]
        source: RuntimeError,
    },
    #[error("create {name}: {source}")]
    Create {
        name: String,
        #[source]
        source: RuntimeError,
    },
    #[error("could not create nor find container with name {name} ({found} matches)")]
    NotFound { name: String, found: usize },
    #[error("start {id}: {source}")]
    Start {
        id: String,
        #[source]
        source: RuntimeError,
    },
    #[error("expected {expected} matching container, got {found}")]
    MatchCount { expected: usize, found: usize },
    #[error("kill {id}: {source}")]
    Kill {
        id: String,
        #[source]
        source: RuntimeError,
    },
    #[error("remove {id}: {source}")]
    Remove {
        id: String,
        #[source]
        source: RuntimeError,
    },
    #[error("wait {id}: {source}")]
    Wait {
        id: String,
        #[source]
        source: RuntimeError,
    },
    #[error("attach {id}: {source}")]
    Attach {
        id: String,
        #[source]
        source: RuntimeError,
    },
    #[error("list: {0}")]
    List(#[from] CoreError),
    #[error("cancelled")]
    Cancelled,
    #[error("invalid spec: {0}")]
    InvalidSpec(String),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("io error: {0}")]
    Io(String),
}

pub type ExecResult<T> = Result<T, ExecError>;

impl ExecError {
    /// Errors that abort a run before a container was started.
    pub fn is_fatal_to_run(&self) -> bool {
        matches!(
            self,
            ExecError::Pull { .. }
                | ExecError::Create { .. }
                | ExecError::NotFound { .. }
                | ExecError::Start { .. }
        )
    }
}

impl From<std::io::Error> for ExecError {
    fn from(e: std::io::Error) -> Self {
        ExecError::Io(e.to_string())
    }
}
