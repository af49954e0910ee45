//! Connection records: one directed edge plus its synapse placements

use crate::{
    error::{IndexError, Result},
    ids::{Gid, PopulationId},
};

use core::fmt;
use core::str::FromStr;
use smallvec::SmallVec;
use std::sync::Arc;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Opaque handle to a resolved location on the destination cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LocationHandle(pub u64);

/// Opaque handle to an instantiated engine object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EngineHandle(pub u64);

/// One row of raw synapse parameters as produced by the circuit reader
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SynapseParams {
    /// Pre-synaptic gid
    pub source: Gid,
    /// Section on the destination cell
    pub section_id: u32,
    /// Segment (point) index within the section
    pub segment: u32,
    /// Fractional offset within the segment
    pub offset: f64,
    /// Synapse type code
    pub synapse_type: i32,
    /// Peak conductance
    #[cfg_attr(feature = "serde", serde(default))]
    pub weight: f64,
    /// Axonal delay (ms)
    #[cfg_attr(feature = "serde", serde(default))]
    pub delay: f64,
}

impl SynapseParams {
    /// Create a parameter row at the given location with zero weight and delay
    pub fn new(source: Gid, section_id: u32, segment: u32, offset: f64, synapse_type: i32) -> Self {
        Self {
            source,
            section_id,
            segment,
            offset,
            synapse_type,
            weight: 0.0,
            delay: 0.0,
        }
    }

    /// Set weight and delay
    pub fn with_weight(mut self, weight: f64, delay: f64) -> Self {
        self.weight = weight;
        self.delay = delay;
        self
    }
}

/// A synapse placed on the destination cell
#[derive(Debug, Clone, PartialEq)]
pub struct SynapsePlacement {
    /// Resolved location
    pub location: LocationHandle,
    /// Raw parameters from the reader
    pub params: SynapseParams,
    /// Ordinal of the row within the destination cell's parameter list
    pub index: usize,
}

/// Which receptor flavours get placed for excitatory synapses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SynapseMode {
    /// AMPA only
    AmpaOnly,
    /// AMPA and NMDA
    #[default]
    DualSyns,
}

impl FromStr for SynapseMode {
    type Err = IndexError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "ampaonly" => Ok(Self::AmpaOnly),
            "dualsyns" => Ok(Self::DualSyns),
            _ => Err(IndexError::invalid_value("synapse mode", s)),
        }
    }
}

impl fmt::Display for SynapseMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AmpaOnly => write!(f, "AmpaOnly"),
            Self::DualSyns => write!(f, "DualSyns"),
        }
    }
}

/// Construction-time options applied to newly created records
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecordOptions {
    /// Netcon weight scale factor
    pub weight_factor: f64,
    /// Receptor placement mode
    pub synapse_mode: SynapseMode,
}

impl Default for RecordOptions {
    fn default() -> Self {
        Self {
            weight_factor: 1.0,
            synapse_mode: SynapseMode::default(),
        }
    }
}

/// Timed spike events attached to a connection
#[derive(Debug, Clone, PartialEq)]
pub struct ReplayStimulus {
    /// Spike times of the source cell (ms)
    pub spike_times: Arc<[f64]>,
    /// Events earlier than this are suppressed (ms)
    pub start_delay: f64,
}

/// A directed connection from `source` to `dest` within one edge population
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionRecord {
    source: Gid,
    dest: Gid,
    population: PopulationId,
    placements: SmallVec<[SynapsePlacement; 4]>,
    /// Netcon weight scale factor
    pub weight_factor: f64,
    /// Spontaneous minis rate, when configured
    pub minis_spont_rate: Option<f64>,
    /// Receptor placement mode
    pub synapse_mode: SynapseMode,
    /// Synapse configuration snippets, applied in order
    pub synapse_configurations: Vec<String>,
    /// Mechanism overriding the default synapse model
    pub mod_override: Option<String>,
    /// Replay events to wire at instantiation
    pub replay: Option<ReplayStimulus>,
    locked: bool,
    disabled: bool,
    zero_conductance: bool,
    engine_handle: Option<EngineHandle>,
}

impl ConnectionRecord {
    /// Create an empty record
    pub fn new(source: Gid, dest: Gid, population: PopulationId, options: &RecordOptions) -> Self {
        Self {
            source,
            dest,
            population,
            placements: SmallVec::new(),
            weight_factor: options.weight_factor,
            minis_spont_rate: None,
            synapse_mode: options.synapse_mode,
            synapse_configurations: Vec::new(),
            mod_override: None,
            replay: None,
            locked: false,
            disabled: false,
            zero_conductance: false,
            engine_handle: None,
        }
    }

    /// Pre-synaptic gid
    pub fn source(&self) -> Gid {
        self.source
    }

    /// Post-synaptic gid
    pub fn dest(&self) -> Gid {
        self.dest
    }

    /// Edge population this record belongs to
    pub fn population(&self) -> PopulationId {
        self.population
    }

    /// Synapse placements in file order
    pub fn placements(&self) -> &[SynapsePlacement] {
        &self.placements
    }

    /// Number of synapses
    pub fn synapse_count(&self) -> usize {
        self.placements.len()
    }

    /// Append a synapse placement. Fails once the record is instantiated.
    pub fn add_synapse(&mut self, placement: SynapsePlacement) -> Result<()> {
        self.ensure_mutable()?;
        self.placements.push(placement);
        Ok(())
    }

    /// Append several placements at once
    pub fn extend_synapses<I>(&mut self, placements: I) -> Result<()>
    where
        I: IntoIterator<Item = SynapsePlacement>,
    {
        self.ensure_mutable()?;
        self.placements.extend(placements);
        Ok(())
    }

    fn ensure_mutable(&self) -> Result<()> {
        if self.engine_handle.is_some() {
            return Err(IndexError::already_instantiated(self.source.raw(), self.dest.raw()));
        }
        Ok(())
    }

    /// Append a synapse configuration snippet
    pub fn add_synapse_configuration(&mut self, configuration: impl Into<String>) {
        self.synapse_configurations.push(configuration.into());
    }

    /// Whether a pathway rule already consumed this record
    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Prevent later pathway rules from appending placements
    pub fn lock(&mut self) {
        self.locked = true;
    }

    /// Allow appending again (new connectivity source)
    pub fn unlock(&mut self) {
        self.locked = false;
    }

    /// Whether the record is currently disabled
    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    /// Whether synaptic conductance was zeroed by a disable
    pub fn is_zero_conductance(&self) -> bool {
        self.zero_conductance
    }

    /// Flag as disabled, optionally zeroing conductance (sticky)
    pub fn disable(&mut self, also_zero_conductance: bool) {
        self.disabled = true;
        self.zero_conductance |= also_zero_conductance;
    }

    /// Clear the disabled flag
    pub fn enable(&mut self) {
        self.disabled = false;
    }

    /// Engine handle, once instantiated
    pub fn engine_handle(&self) -> Option<EngineHandle> {
        self.engine_handle
    }

    /// Whether finalize already produced an engine object for this record
    pub fn is_instantiated(&self) -> bool {
        self.engine_handle.is_some()
    }

    /// Record the engine handle produced at finalize
    pub fn mark_instantiated(&mut self, handle: EngineHandle) {
        self.engine_handle = Some(handle);
    }
}

impl fmt::Display for ConnectionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}->{} [pop {}, {} synapses]",
            self.source,
            self.dest,
            self.population,
            self.placements.len()
        )
    }
}
