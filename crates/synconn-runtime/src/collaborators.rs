//! Interfaces of the components the connection managers rely on
//!
//! The managers never parse circuit files, resolve morphology locations,
//! partition cells or create engine objects themselves. Each of those is
//! reached through one of the traits below.

use crate::{discovery::ConnectionKind, error::Result};

use std::path::Path;
use std::sync::Arc;
use synconn_index::{ConnectionRecord, EngineHandle, Gid, LocationHandle, SynapseParams};

/// Reads per-destination synapse parameter rows
pub trait SynapseReader {
    /// Parameter rows of `dest`, grouped and non-decreasing by source gid
    fn get_synapse_parameters(&mut self, dest: Gid) -> Result<Vec<SynapseParams>>;
}

/// Opens synapse readers on connectivity files
pub trait SynapseReaderFactory {
    /// Whether formats beyond the legacy one can be read
    fn is_format_supported(&self) -> bool;

    /// Open a reader restricted to the rank-local destination gids
    fn open(
        &self,
        path: &Path,
        kind: ConnectionKind,
        local_gids: &[Gid],
    ) -> Result<Box<dyn SynapseReader>>;
}

/// Maps a (section, segment, offset) on a destination cell to an engine location
pub trait LocationResolver {
    /// Resolve one location. Pure function of its inputs.
    fn resolve(&self, dest: Gid, section_id: u32, segment: u32, offset: f64) -> LocationHandle;
}

/// A named group of cells
pub trait Target {
    /// Target name
    fn name(&self) -> &str;

    /// Cheap rank-local membership test
    fn contains(&self, gid: Gid) -> bool;

    /// Authoritative full-circuit membership test
    fn complete_contains(&self, gid: Gid) -> bool;
}

/// Looks targets up by name
pub trait TargetResolver {
    /// Resolve a target, failing with [`ConnectionError::UnknownTarget`](crate::ConnectionError::UnknownTarget)
    fn get_target(&self, name: &str) -> Result<Arc<dyn Target>>;
}

/// Per-cell data the engine needs to instantiate connections onto a cell
#[derive(Debug, Clone, PartialEq)]
pub struct CellMetadata {
    /// Cell gid
    pub gid: Gid,
    /// Morpho-electrical type name
    pub me_type: String,
    /// Spike-exchange gid of the cell
    pub spgid: u64,
}

/// Owns the rank-local cell partition
pub trait CellDistributor {
    /// Destination gids owned by this rank, ascending
    fn local_gids(&self) -> Vec<Gid>;

    /// Metadata of a local cell
    fn cell_metadata(&self, gid: Gid) -> Result<CellMetadata>;
}

/// Electrical coupling offsets of a gap junction's two sides
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GapJunctionOffsetPair {
    /// Offset of the destination cell
    pub dest: u64,
    /// Offset of the source cell
    pub source: u64,
}

/// Turns configured records into engine objects and updates them afterwards
pub trait Instantiator {
    /// Create the engine objects of one connection
    fn instantiate(
        &mut self,
        record: &ConnectionRecord,
        cell: &CellMetadata,
        base_seed: u64,
        gap_junction: Option<GapJunctionOffsetPair>,
    ) -> Result<EngineHandle>;

    /// Whether the engine can hold a connection in a native disabled state
    fn supports_disable(&self) -> bool {
        true
    }

    /// Activate or deactivate an instantiated connection
    fn set_active(&mut self, handle: EngineHandle, active: bool, zero_conductance: bool) -> Result<()>;

    /// Set the netcon weight of an instantiated connection
    fn update_weight(&mut self, handle: EngineHandle, weight: f64) -> Result<()>;

    /// Run a synapse configuration snippet on an instantiated connection
    fn configure_synapses(&mut self, handle: EngineHandle, configuration: &str) -> Result<()>;

    /// Assign named synapse parameters on an instantiated connection
    fn update_synapse_parameters(&mut self, handle: EngineHandle, params: &[(String, f64)]) -> Result<()>;

    /// Whether a mechanism override helper is available
    fn has_mechanism_helper(&self, name: &str) -> bool;
}

/// Collective operations across ranks
pub trait Communicator {
    /// Rank of this process
    fn rank(&self) -> usize;

    /// Number of ranks
    fn size(&self) -> usize;

    /// Global sum
    fn allreduce_sum(&self, value: u64) -> u64;

    /// True when every rank reports `local_ok`
    fn check_no_errors(&self, local_ok: bool) -> bool;
}

/// Single-rank communicator
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalCommunicator;

impl Communicator for LocalCommunicator {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn allreduce_sum(&self, value: u64) -> u64 {
        value
    }

    fn check_no_errors(&self, local_ok: bool) -> bool {
        local_ok
    }
}

/// Everything a connection manager is wired to
pub struct Collaborators<E> {
    /// Opens connectivity files
    pub readers: Arc<dyn SynapseReaderFactory>,
    /// Resolves target names
    pub targets: Arc<dyn TargetResolver>,
    /// Resolves synapse locations
    pub locations: Arc<dyn LocationResolver>,
    /// Rank-local cell partition
    pub cells: Arc<dyn CellDistributor>,
    /// Collective operations
    pub comm: Arc<dyn Communicator>,
    /// Instantiation sink
    pub engine: E,
}
