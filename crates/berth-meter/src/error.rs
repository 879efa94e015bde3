use thiserror::Error;

#[derive(Debug, Error)]
pub enum MeterError {
    /// The identity is out of credit.
    #[error("no time left for {identity} (remaining {remaining}ms)")]
    Exhausted { identity: String, remaining: i64 },

    #[error("no meter for {0}")]
    NotFound(String),

    #[error("meter for {0} already exists")]
    AlreadyExists(String),

    #[error("invalid amount: {0}ms")]
    InvalidAmount(i64),

    #[error("corrupt {field} for {identity}: {value:?}")]
    Corrupt {
        identity: String,
        field: &'static str,
        value: String,
    },

    #[error("storage error: {0}")]
    Storage(String),
}

impl MeterError {
    pub fn is_exhausted(&self) -> bool {
        matches!(self, MeterError::Exhausted { .. })
    }
}

impl From<redb::Error> for MeterError {
    fn from(err: redb::Error) -> Self {
        MeterError::Storage(err.to_string())
    }
}

impl From<redb::DatabaseError> for MeterError {
    fn from(err: redb::DatabaseError) -> Self {
        MeterError::Storage(err.to_string())
    }
}

impl From<redb::TableError> for MeterError {
    fn from(err: redb::TableError) -> Self {
        MeterError::Storage(err.to_string())
    }
}

impl From<redb::TransactionError> for MeterError {
    fn from(err: redb::TransactionError) -> Self {
        MeterError::Storage(err.to_string())
    }
}

impl From<redb::CommitError> for MeterError {
    fn from(err: redb::CommitError) -> Self {
        MeterError::Storage(err.to_string())
    }
}

impl From<redb::StorageError> for MeterError {
    fn from(err: redb::StorageError) -> Self {
        MeterError::Storage(err.to_string())
    }
}
