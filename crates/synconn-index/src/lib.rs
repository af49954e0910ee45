//! Sorted connection index for distributed synaptic connectivity
//!
//! This crate holds the leaf data structures of the connectivity layer:
//! directed connection records with their synapse placements, and the
//! per-population sets that index them by destination gid, each
//! destination's records kept ascending by source gid.
//!
//! Building, configuring and instantiating connections is the job of
//! `synconn-runtime`; nothing here talks to a reader, a target resolver
//! or a simulation engine.

#![deny(missing_docs)]
#![warn(clippy::all)]

// Core modules
pub mod error;
pub mod ids;
pub mod record;
pub mod selector;
pub mod set;

// Re-export essential types
pub use error::{IndexError, Result};
pub use ids::{Gid, PopulationId};
pub use record::{
    ConnectionRecord, EngineHandle, LocationHandle, RecordOptions, ReplayStimulus, SynapseMode,
    SynapseParams, SynapsePlacement,
};
pub use selector::{GidFilter, GidSet, PopulationSelector};
pub use set::ConnectionSet;
