//! Error types for the connection managers

use thiserror::Error;

/// Result type for connection manager operations
pub type Result<T> = std::result::Result<T, ConnectionError>;

/// Errors that can occur while building or instantiating connectivity
#[derive(Error, Debug)]
pub enum ConnectionError {
    /// Index layer error
    #[error("Index error: {source}")]
    Index {
        #[from]
        /// Source index error
        source: synconn_index::IndexError,
    },

    /// The simulation cannot proceed with this setup
    #[error("Configuration error: {reason}")]
    Configuration {
        /// Reason for the configuration failure
        reason: String,
    },

    /// A fully specified population selector named no population
    #[error("Population {source_pop}-{dest_pop} not found")]
    PopulationNotFound {
        /// Source population id
        source_pop: u32,
        /// Destination population id
        dest_pop: u32,
    },

    /// Target name unknown to the target resolver
    #[error("Target {name} not found")]
    UnknownTarget {
        /// Target name
        name: String,
    },

    /// The synapse parameter reader failed
    #[error("Synapse reader error: {reason}")]
    Reader {
        /// Reason for the reader failure
        reason: String,
    },

    /// The engine failed to materialize a connection
    #[error("Instantiation failed: {reason}")]
    Instantiation {
        /// Reason for the instantiation failure
        reason: String,
    },

    /// I/O error
    #[error("I/O error: {source}")]
    Io {
        #[from]
        /// Source I/O error
        source: std::io::Error,
    },

    /// Rule file could not be parsed
    #[error("Invalid rule file: {source}")]
    Toml {
        #[from]
        /// Source TOML error
        source: toml::de::Error,
    },
}

impl ConnectionError {
    /// Create a configuration error
    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }

    /// Create an unknown target error
    pub fn unknown_target(name: impl Into<String>) -> Self {
        Self::UnknownTarget { name: name.into() }
    }

    /// Create a reader error
    pub fn reader(reason: impl Into<String>) -> Self {
        Self::Reader {
            reason: reason.into(),
        }
    }

    /// Create an instantiation error
    pub fn instantiation(reason: impl Into<String>) -> Self {
        Self::Instantiation {
            reason: reason.into(),
        }
    }
}
