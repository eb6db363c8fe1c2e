//! Error taxonomy for graph store clients
//!
//! Drivers map every backend-native failure into one of these three kinds.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Connect, disconnect or transport failure, including use while disconnected
    #[error("connection error: {0}")]
    Connection(String),

    /// Query execution failure on a live connection
    #[error("query error: {0}")]
    Query(String),

    /// Invalid connection parameters
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl StoreError {
    pub fn is_connection(&self) -> bool {
        matches!(self, StoreError::Connection(_))
    }

    pub fn is_query(&self) -> bool {
        matches!(self, StoreError::Query(_))
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, StoreError::Configuration(_))
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;
