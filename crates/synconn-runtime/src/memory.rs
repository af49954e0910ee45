//! In-memory collaborators
//!
//! Readers, targets, cells and an engine that keep everything in memory.
//! They back the tests and serve callers that stage connectivity themselves.

use crate::{
    collaborators::{
        CellDistributor, CellMetadata, GapJunctionOffsetPair, Instantiator, LocationResolver,
        SynapseReader, SynapseReaderFactory, Target, TargetResolver,
    },
    discovery::ConnectionKind,
    error::{ConnectionError, Result},
};

use serde::Deserialize;
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use synconn_index::{
    ConnectionRecord, EngineHandle, Gid, LocationHandle, PopulationId, SynapseParams,
};

/// Synapse rows held in memory, per destination gid
#[derive(Debug, Clone, Default)]
pub struct InMemorySynapseReader {
    rows: HashMap<Gid, Vec<SynapseParams>>,
}

#[derive(Deserialize)]
struct EdgeTable {
    #[serde(default)]
    edge: Vec<EdgeRow>,
}

#[derive(Deserialize)]
struct EdgeRow {
    dest: Gid,
    #[serde(flatten)]
    params: SynapseParams,
}

impl InMemorySynapseReader {
    /// Create an empty reader
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one row. Rows of a destination stay grouped by source in insertion order.
    pub fn add_row(&mut self, dest: Gid, params: SynapseParams) {
        let rows = self.rows.entry(dest).or_default();
        let pos = rows.partition_point(|row| row.source <= params.source);
        rows.insert(pos, params);
    }

    /// Builder form of [`add_row`](Self::add_row)
    pub fn with_row(mut self, dest: Gid, params: SynapseParams) -> Self {
        self.add_row(dest, params);
        self
    }

    /// Parse `[[edge]]` tables: `dest` plus the synapse parameter fields
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let table: EdgeTable = toml::from_str(content)?;
        let mut reader = Self::new();
        for row in table.edge {
            reader.add_row(row.dest, row.params);
        }
        Ok(reader)
    }

    /// Keep only the given destinations
    pub fn restricted_to(&self, dests: &[Gid]) -> Self {
        Self {
            rows: dests
                .iter()
                .filter_map(|gid| self.rows.get(gid).map(|rows| (*gid, rows.clone())))
                .collect(),
        }
    }

    /// Number of rows
    pub fn row_count(&self) -> usize {
        self.rows.values().map(Vec::len).sum()
    }
}

impl SynapseReader for InMemorySynapseReader {
    fn get_synapse_parameters(&mut self, dest: Gid) -> Result<Vec<SynapseParams>> {
        Ok(self.rows.get(&dest).cloned().unwrap_or_default())
    }
}

/// Hands out in-memory readers, optionally a distinct one per file
#[derive(Debug, Clone, Default)]
pub struct InMemoryReaderFactory {
    default: InMemorySynapseReader,
    sources: HashMap<PathBuf, InMemorySynapseReader>,
    advanced_formats: bool,
}

impl InMemoryReaderFactory {
    /// Serve `reader` for every file
    pub fn new(reader: InMemorySynapseReader) -> Self {
        Self {
            default: reader,
            sources: HashMap::new(),
            advanced_formats: true,
        }
    }

    /// Serve `reader` for one specific file
    pub fn with_source(mut self, path: impl Into<PathBuf>, reader: InMemorySynapseReader) -> Self {
        self.sources.insert(path.into(), reader);
        self
    }

    /// Only read the legacy formats
    pub fn legacy_only(mut self) -> Self {
        self.advanced_formats = false;
        self
    }
}

impl SynapseReaderFactory for InMemoryReaderFactory {
    fn is_format_supported(&self) -> bool {
        self.advanced_formats
    }

    fn open(&self, path: &Path, kind: ConnectionKind, local_gids: &[Gid]) -> Result<Box<dyn SynapseReader>> {
        let reader = self.sources.get(path).unwrap_or(&self.default);
        log::debug!("Opening in-memory {} reader for {}", kind, path.display());
        Ok(Box::new(reader.restricted_to(local_gids)))
    }
}

/// A target over an explicit gid list
#[derive(Debug, Clone)]
pub struct GidTarget {
    name: String,
    members: BTreeSet<Gid>,
    local: Option<BTreeSet<Gid>>,
}

impl GidTarget {
    /// Target whose cheap and full membership agree
    pub fn new<I, G>(name: impl Into<String>, gids: I) -> Self
    where
        I: IntoIterator<Item = G>,
        G: Into<Gid>,
    {
        Self {
            name: name.into(),
            members: gids.into_iter().map(Into::into).collect(),
            local: None,
        }
    }

    /// Override the cheap membership test with its own gid list
    pub fn with_local_members<I, G>(mut self, gids: I) -> Self
    where
        I: IntoIterator<Item = G>,
        G: Into<Gid>,
    {
        self.local = Some(gids.into_iter().map(Into::into).collect());
        self
    }
}

impl Target for GidTarget {
    fn name(&self) -> &str {
        &self.name
    }

    fn contains(&self, gid: Gid) -> bool {
        self.local.as_ref().unwrap_or(&self.members).contains(&gid)
    }

    fn complete_contains(&self, gid: Gid) -> bool {
        self.members.contains(&gid)
    }
}

/// Targets looked up by name
#[derive(Default)]
pub struct InMemoryTargets {
    targets: HashMap<String, Arc<dyn Target>>,
}

impl InMemoryTargets {
    /// Create an empty resolver
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a target under its own name
    pub fn with_target<T: Target + 'static>(mut self, target: T) -> Self {
        self.targets.insert(target.name().to_string(), Arc::new(target));
        self
    }
}

impl TargetResolver for InMemoryTargets {
    fn get_target(&self, name: &str) -> Result<Arc<dyn Target>> {
        self.targets
            .get(name)
            .cloned()
            .ok_or_else(|| ConnectionError::unknown_target(name))
    }
}

/// Packs the destination, section and segment into the handle bits.
///
/// Layout: gid in the upper 32 bits, section in the next 16, segment in the low 16.
#[derive(Debug, Clone, Copy, Default)]
pub struct PackedLocationResolver;

impl LocationResolver for PackedLocationResolver {
    fn resolve(&self, dest: Gid, section_id: u32, segment: u32, _offset: f64) -> LocationHandle {
        LocationHandle(
            (u64::from(dest.raw()) << 32)
                | (u64::from(section_id & 0xffff) << 16)
                | u64::from(segment & 0xffff),
        )
    }
}

/// A fixed rank-local cell partition
#[derive(Debug, Clone, Default)]
pub struct StaticCells {
    gids: BTreeSet<Gid>,
    me_types: HashMap<Gid, String>,
}

impl StaticCells {
    /// Own the given gids
    pub fn new<I, G>(gids: I) -> Self
    where
        I: IntoIterator<Item = G>,
        G: Into<Gid>,
    {
        Self {
            gids: gids.into_iter().map(Into::into).collect(),
            me_types: HashMap::new(),
        }
    }

    /// Set the morpho-electrical type of one cell
    pub fn with_me_type(mut self, gid: Gid, me_type: impl Into<String>) -> Self {
        self.me_types.insert(gid, me_type.into());
        self
    }
}

impl CellDistributor for StaticCells {
    fn local_gids(&self) -> Vec<Gid> {
        self.gids.iter().copied().collect()
    }

    fn cell_metadata(&self, gid: Gid) -> Result<CellMetadata> {
        if !self.gids.contains(&gid) {
            return Err(ConnectionError::configuration(format!("Gid {} is not local", gid)));
        }
        Ok(CellMetadata {
            gid,
            me_type: self.me_types.get(&gid).cloned().unwrap_or_default(),
            spgid: u64::from(gid.raw()),
        })
    }
}

/// One call to [`Instantiator::instantiate`]
#[derive(Debug, Clone, PartialEq)]
pub struct InstantiateCall {
    /// Source gid
    pub source: Gid,
    /// Destination gid
    pub dest: Gid,
    /// Population of the record
    pub population: PopulationId,
    /// Seed passed in
    pub base_seed: u64,
    /// Gap-junction offsets passed in
    pub gap_junction: Option<GapJunctionOffsetPair>,
    /// Number of synapses of the record
    pub synapses: usize,
    /// Weight factor of the record
    pub weight_factor: f64,
    /// Handle returned
    pub handle: EngineHandle,
}

/// An engine that records every call it receives
#[derive(Debug, Clone)]
pub struct RecordingInstantiator {
    /// Instantiations in call order
    pub instantiated: Vec<InstantiateCall>,
    /// `set_active` calls: handle, active, zero conductance
    pub activity: Vec<(EngineHandle, bool, bool)>,
    /// Weight updates
    pub weights: Vec<(EngineHandle, f64)>,
    /// Synapse configuration snippets run
    pub configurations: Vec<(EngineHandle, String)>,
    /// Named parameter updates
    pub parameter_updates: Vec<(EngineHandle, Vec<(String, f64)>)>,
    supports_disable: bool,
    helpers: BTreeSet<String>,
    fail_on: Option<(Gid, Gid)>,
    next_handle: u64,
}

impl Default for RecordingInstantiator {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingInstantiator {
    /// Engine with a native disabled state and no mechanism helper
    pub fn new() -> Self {
        Self {
            instantiated: Vec::new(),
            activity: Vec::new(),
            weights: Vec::new(),
            configurations: Vec::new(),
            parameter_updates: Vec::new(),
            supports_disable: true,
            helpers: BTreeSet::new(),
            fail_on: None,
            next_handle: 1,
        }
    }

    /// Engine without a native disabled state
    pub fn without_disable(mut self) -> Self {
        self.supports_disable = false;
        self
    }

    /// Provide the override helper for a mechanism
    pub fn with_helper(mut self, mechanism: impl Into<String>) -> Self {
        self.helpers.insert(mechanism.into());
        self
    }

    /// Fail when asked to instantiate `source -> dest`
    pub fn fail_on(mut self, source: Gid, dest: Gid) -> Self {
        self.fail_on = Some((source, dest));
        self
    }

    /// `(source, dest)` pairs in instantiation order
    pub fn instantiation_order(&self) -> Vec<(u32, u32)> {
        self.instantiated
            .iter()
            .map(|call| (call.source.raw(), call.dest.raw()))
            .collect()
    }
}

impl Instantiator for RecordingInstantiator {
    fn instantiate(
        &mut self,
        record: &ConnectionRecord,
        cell: &CellMetadata,
        base_seed: u64,
        gap_junction: Option<GapJunctionOffsetPair>,
    ) -> Result<EngineHandle> {
        if self.fail_on == Some((record.source(), record.dest())) {
            return Err(ConnectionError::instantiation(format!("Cannot instantiate {}", record)));
        }
        debug_assert_eq!(cell.gid, record.dest());
        let handle = EngineHandle(self.next_handle);
        self.next_handle += 1;
        self.instantiated.push(InstantiateCall {
            source: record.source(),
            dest: record.dest(),
            population: record.population(),
            base_seed,
            gap_junction,
            synapses: record.synapse_count(),
            weight_factor: record.weight_factor,
            handle,
        });
        Ok(handle)
    }

    fn supports_disable(&self) -> bool {
        self.supports_disable
    }

    fn set_active(&mut self, handle: EngineHandle, active: bool, zero_conductance: bool) -> Result<()> {
        self.activity.push((handle, active, zero_conductance));
        Ok(())
    }

    fn update_weight(&mut self, handle: EngineHandle, weight: f64) -> Result<()> {
        self.weights.push((handle, weight));
        Ok(())
    }

    fn configure_synapses(&mut self, handle: EngineHandle, configuration: &str) -> Result<()> {
        self.configurations.push((handle, configuration.to_string()));
        Ok(())
    }

    fn update_synapse_parameters(&mut self, handle: EngineHandle, params: &[(String, f64)]) -> Result<()> {
        self.parameter_updates.push((handle, params.to_vec()));
        Ok(())
    }

    fn has_mechanism_helper(&self, name: &str) -> bool {
        self.helpers.contains(name)
    }
}
