//! Error types for the connection index

use thiserror::Error;

/// Result type for index operations
pub type Result<T> = std::result::Result<T, IndexError>;

/// Errors that can occur while mutating the connection index
#[derive(Error, Debug, Clone, PartialEq)]
pub enum IndexError {
    /// Placement mutation attempted on a record already handed to the engine
    #[error("Connection {source_gid}->{dest_gid} is already instantiated")]
    AlreadyInstantiated {
        /// Source gid of the record
        source_gid: u32,
        /// Destination gid of the record
        dest_gid: u32,
    },

    /// A value could not be parsed
    #[error("Invalid {what}: {value}")]
    InvalidValue {
        /// Kind of value being parsed
        what: &'static str,
        /// Offending input
        value: String,
    },
}

impl IndexError {
    /// Create an already-instantiated error
    pub fn already_instantiated(source_gid: u32, dest_gid: u32) -> Self {
        Self::AlreadyInstantiated { source_gid, dest_gid }
    }

    /// Create an invalid value error
    pub fn invalid_value(what: &'static str, value: impl Into<String>) -> Self {
        Self::InvalidValue {
            what,
            value: value.into(),
        }
    }
}
