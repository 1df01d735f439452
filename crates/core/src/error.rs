use thiserror::Error;

use crate::data_access::{DataAccessError, DataAccessErrorKind};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("database server is not reachable")]
    Unavailable,
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("connection failed: {0}")]
    Connectivity(String),
    #[error("query failed: {0}")]
    Query(String),
    #[error("{0}")]
    Validation(String),
}

impl SessionError {
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    #[must_use]
    pub fn from_connect(error: DataAccessError) -> Self {
        match error.kind() {
            DataAccessErrorKind::Auth => Self::Auth(error.message().to_string()),
            DataAccessErrorKind::Connectivity | DataAccessErrorKind::Query => {
                Self::Connectivity(error.message().to_string())
            }
        }
    }

    #[must_use]
    pub fn from_query(error: DataAccessError) -> Self {
        Self::Query(error.message().to_string())
    }
}
