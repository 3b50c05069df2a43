use thiserror::Error;

/// Error type for every entgraph operation.
#[derive(Debug, Error)]
pub enum EntGraphError {
    #[error("duplicate entity type: {0}")]
    DuplicateType(String),
    #[error("unknown entity type: {0}")]
    UnknownType(String),
    #[error("unknown edge: {0}")]
    UnknownEdge(String),
    #[error("invalid schema: {0}")]
    InvalidSchema(String),
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),
    #[error("entity not found: {0}")]
    NotFound(String),
    #[error("expected exactly one result: {0}")]
    NotSingular(String),
    #[error("operation cancelled: {0}")]
    Cancelled(String),
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
}

pub type Result<T> = std::result::Result<T, EntGraphError>;

impl EntGraphError {
    pub fn duplicate_type<T: Into<String>>(msg: T) -> Self {
        EntGraphError::DuplicateType(msg.into())
    }

    pub fn unknown_type<T: Into<String>>(msg: T) -> Self {
        EntGraphError::UnknownType(msg.into())
    }

    pub fn unknown_edge<T: Into<String>>(msg: T) -> Self {
        EntGraphError::UnknownEdge(msg.into())
    }

    pub fn invalid_schema<T: Into<String>>(msg: T) -> Self {
        EntGraphError::InvalidSchema(msg.into())
    }

    pub fn constraint<T: Into<String>>(msg: T) -> Self {
        EntGraphError::ConstraintViolation(msg.into())
    }

    pub fn not_found<T: Into<String>>(msg: T) -> Self {
        EntGraphError::NotFound(msg.into())
    }

    pub fn not_singular<T: Into<String>>(msg: T) -> Self {
        EntGraphError::NotSingular(msg.into())
    }

    pub fn cancelled<T: Into<String>>(msg: T) -> Self {
        EntGraphError::Cancelled(msg.into())
    }

    pub fn store<T: Into<String>>(msg: T) -> Self {
        EntGraphError::StoreUnavailable(msg.into())
    }

    /// Maps a SQLite failure, keeping interrupts distinguishable from outages.
    pub fn from_sqlite(err: rusqlite::Error) -> Self {
        match err.sqlite_error_code() {
            Some(rusqlite::ErrorCode::OperationInterrupted) => {
                EntGraphError::cancelled("store operation interrupted")
            }
            _ => EntGraphError::store(err.to_string()),
        }
    }
}
