//! Connection managers for distributed synaptic connectivity
//!
//! This crate drives the index of `synconn-index`: it discovers a circuit's
//! connectivity file, builds the rank-local connections from a synapse
//! reader, configures them from pathway rules, moves them between the live
//! index and the disabled table, and finally hands them to an engine.
//!
//! Every component outside the index (reader, location resolver, targets,
//! cell partition, engine, collectives) is reached through the traits in
//! [`collaborators`]. In-memory implementations live in [`memory`].

#![deny(missing_docs)]
#![warn(clippy::all)]

// Re-export essential types from the index
pub use synconn_index::{
    ConnectionRecord, ConnectionSet, EngineHandle, Gid, GidFilter, GidSet, IndexError,
    LocationHandle, PopulationId, PopulationSelector, RecordOptions, ReplayStimulus, SynapseMode,
    SynapseParams, SynapsePlacement,
};

// Core modules
pub mod collaborators;
pub mod discovery;
pub mod error;
pub mod gap_junction;
pub mod manager;
pub mod memory;
pub mod rules;
pub mod synapse;

// Re-export essential types
pub use collaborators::{
    CellDistributor, CellMetadata, Collaborators, Communicator, GapJunctionOffsetPair,
    Instantiator, LocalCommunicator, LocationResolver, SynapseReader, SynapseReaderFactory, Target,
    TargetResolver,
};
pub use discovery::{find_circuit_file, resolve_circuit_path, ConnectionKind};
pub use error::{ConnectionError, Result};
pub use gap_junction::{GapJunctionConnectionManager, GapJunctionOffsets, GAP_JUNCTION_INFO_FILE};
pub use manager::{ConnectionManager, TRACE_TARGET};
pub use rules::{ConfigureAction, ConnectionRule, ConnectionRules, LiveUpdate};
pub use synapse::{SpikeTrains, SynapseConnectionManager};
