//! The connection manager: builds, mutates and instantiates the rank-local index
//!
//! A manager owns one [`ConnectionSet`] per edge population and a side table
//! of disabled records. Every record lives in exactly one of the two at any
//! time. Bulk construction pulls parameter rows from a [`SynapseReader`],
//! configuration comes from pathway rules, and finalize hands every record
//! to the [`Instantiator`].

use crate::{
    collaborators::{
        CellDistributor, Collaborators, Communicator, GapJunctionOffsetPair, Instantiator,
        LocationResolver, SynapseReader, SynapseReaderFactory, Target, TargetResolver,
    },
    discovery::{resolve_circuit_path, ConnectionKind},
    error::{ConnectionError, Result},
    rules::{ConfigureAction, ConnectionRule, ConnectionRules, LiveUpdate},
};

use std::collections::BTreeMap;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use synconn_index::{
    ConnectionRecord, ConnectionSet, EngineHandle, Gid, GidFilter, PopulationId,
    PopulationSelector, RecordOptions, SynapseMode, SynapseParams, SynapsePlacement,
};

/// Log target of the per-build gid trace
pub const TRACE_TARGET: &str = "synconn::trace";

static ALL_GIDS: GidFilter = GidFilter::All;

/// Rank-local connectivity of one connection kind
pub struct ConnectionManager<E> {
    kind: ConnectionKind,
    readers: Arc<dyn SynapseReaderFactory>,
    reader: Box<dyn SynapseReader>,
    pub(crate) targets: Arc<dyn TargetResolver>,
    locations: Arc<dyn LocationResolver>,
    cells: Arc<dyn CellDistributor>,
    pub(crate) comm: Arc<dyn Communicator>,
    engine: E,
    local_gids: Vec<Gid>,
    pub(crate) populations: BTreeMap<PopulationId, ConnectionSet>,
    current: PopulationId,
    disabled: BTreeMap<Gid, Vec<ConnectionRecord>>,
    synapse_mode: SynapseMode,
    pub(crate) source_filter: Option<Arc<dyn Target>>,
    circuit_file: PathBuf,
}

impl<E: Instantiator> ConnectionManager<E> {
    /// Discover the connectivity file under `circuit_path` and open a reader on it.
    ///
    /// Discovery failures on any rank fail every rank.
    pub fn open(circuit_path: &Path, kind: ConnectionKind, collab: Collaborators<E>) -> Result<Self> {
        let found = resolve_circuit_path(circuit_path, kind, collab.readers.is_format_supported());
        let all_found = collab.comm.check_no_errors(found.is_ok());
        let circuit_file = match found {
            Err(e) => return Err(e),
            Ok(_) if !all_found => {
                return Err(ConnectionError::configuration(format!(
                    "{} file missing on another rank",
                    kind
                )))
            }
            Ok(path) => path,
        };
        if collab.comm.rank() == 0 {
            log::info!("Found {} file: {}", kind, circuit_file.display());
        }

        let mut local_gids = collab.cells.local_gids();
        local_gids.sort_unstable();
        let reader = collab.readers.open(&circuit_file, kind, &local_gids)?;

        let mut populations = BTreeMap::new();
        populations.insert(PopulationId::BASE, ConnectionSet::new(PopulationId::BASE));

        Ok(Self {
            kind,
            readers: collab.readers,
            reader,
            targets: collab.targets,
            locations: collab.locations,
            cells: collab.cells,
            comm: collab.comm,
            engine: collab.engine,
            local_gids,
            populations,
            current: PopulationId::BASE,
            disabled: BTreeMap::new(),
            synapse_mode: SynapseMode::default(),
            source_filter: None,
            circuit_file,
        })
    }

    /// Open a new connectivity source for population `(source_pop, 0)`.
    ///
    /// Every record is unlocked so the new source's pathway rules may append again.
    pub fn open_synapse_file(&mut self, path: &Path, source_pop: u32) -> Result<()> {
        let file = resolve_circuit_path(path, self.kind, self.readers.is_format_supported())?;
        self.reader = self.readers.open(&file, self.kind, &self.local_gids)?;
        log::info!("Opened {} file {} for population {}", self.kind, file.display(), source_pop);
        self.circuit_file = file;
        self.select_populations(source_pop, 0);
        for set in self.populations.values_mut() {
            set.unlock_all();
        }
        Ok(())
    }

    /// Connection kind
    pub fn kind(&self) -> ConnectionKind {
        self.kind
    }

    /// The connectivity file currently read
    pub fn circuit_file(&self) -> &Path {
        &self.circuit_file
    }

    /// Destination gids owned by this rank, ascending
    pub fn local_gids(&self) -> &[Gid] {
        &self.local_gids
    }

    /// Receptor placement mode given to new records
    pub fn synapse_mode(&self) -> SynapseMode {
        self.synapse_mode
    }

    /// Change the receptor placement mode for records created from now on
    pub fn set_synapse_mode(&mut self, mode: SynapseMode) {
        self.synapse_mode = mode;
    }

    /// The instantiation engine
    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Mutable access to the instantiation engine
    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    // -- Populations --------------------------------------------------------

    /// Make `(source, dest)` the target of subsequent bulk builds
    pub fn select_populations(&mut self, source: u32, dest: u32) -> &mut ConnectionSet {
        self.current = PopulationId::new(source, dest);
        self.get_population(source, dest)
    }

    /// Population targeted by bulk builds
    pub fn current_population(&self) -> PopulationId {
        self.current
    }

    /// The set of `(source, dest)`, created if absent
    pub fn get_population(&mut self, source: u32, dest: u32) -> &mut ConnectionSet {
        let id = PopulationId::new(source, dest);
        self.populations.entry(id).or_insert_with(|| ConnectionSet::new(id))
    }

    /// The set of a population, if it exists
    pub fn population(&self, id: PopulationId) -> Option<&ConnectionSet> {
        self.populations.get(&id)
    }

    /// Every population set, ascending by id
    pub fn populations(&self) -> impl Iterator<Item = &ConnectionSet> {
        self.populations.values()
    }

    /// Resolve a selector to population ids.
    ///
    /// A fully specified pair must name an existing population.
    pub fn find_populations(&self, selector: &PopulationSelector) -> Result<Vec<PopulationId>> {
        if let Some(id) = selector.as_exact() {
            if !self.populations.contains_key(&id) {
                return Err(ConnectionError::PopulationNotFound {
                    source_pop: id.source,
                    dest_pop: id.dest,
                });
            }
            return Ok(vec![id]);
        }
        Ok(self
            .populations
            .keys()
            .copied()
            .filter(|id| selector.matches(*id))
            .collect())
    }

    // -- Bulk construction --------------------------------------------------

    /// Create records for every parameter row of the local (or given) destinations.
    ///
    /// Rows of one source gid go to a single record. Returns the number of
    /// records created in the current population.
    pub fn connect_all(
        &mut self,
        weight_factor: f64,
        only_gids: Option<&[Gid]>,
        trace_gid: Option<Gid>,
    ) -> Result<usize> {
        let options = RecordOptions {
            weight_factor,
            synapse_mode: self.synapse_mode,
        };
        let dests: Vec<Gid> = only_gids.map_or_else(|| self.local_gids.clone(), <[Gid]>::to_vec);
        let pop = self.current;
        let set = self.populations.entry(pop).or_insert_with(|| ConnectionSet::new(pop));
        let before = set.count();

        for dest in dests {
            let rows = self.reader.get_synapse_parameters(dest)?;
            trace_rows(trace_gid, dest, &rows);
            let indexed: Vec<(usize, &SynapseParams)> = rows.iter().enumerate().collect();

            for run in source_runs(&indexed) {
                let source = indexed[run.start].1.source;
                if let Some(filter) = &self.source_filter {
                    if !filter.complete_contains(source) {
                        continue;
                    }
                }
                if is_disabled(&self.disabled, pop, source, dest) {
                    log::debug!("Skipping disabled connection {}->{}", source, dest);
                    continue;
                }
                let placements = indexed[run]
                    .iter()
                    .map(|&(index, params)| place(&*self.locations, dest, params, index));
                set.get_or_create(source, dest, &options).extend_synapses(placements)?;
            }
        }

        let created = set.count() - before;
        log::debug!("ConnectAll: {} new {} in population {}", created, self.kind, pop);
        Ok(created)
    }

    /// Create records from `source_target` to local members of `dest_target`.
    ///
    /// Each source gid is consumed once per destination: its record is
    /// locked after its rows are placed, so later rules over the same
    /// population never append to it again. Sources outside
    /// `source_target` and rows of another synapse type are skipped.
    pub fn connect_group(
        &mut self,
        source_target: &str,
        dest_target: &str,
        synapse_type: Option<i32>,
        trace_gid: Option<Gid>,
    ) -> Result<usize> {
        let src = self.targets.get_target(source_target)?;
        let dst = self.targets.get_target(dest_target)?;
        let options = RecordOptions {
            weight_factor: 1.0,
            synapse_mode: self.synapse_mode,
        };
        let pop = self.current;
        let set = self.populations.entry(pop).or_insert_with(|| ConnectionSet::new(pop));
        let before = set.count();

        for &dest in self.local_gids.iter().filter(|gid| dst.contains(**gid)) {
            let rows = self.reader.get_synapse_parameters(dest)?;
            trace_rows(trace_gid, dest, &rows);
            let indexed: Vec<(usize, &SynapseParams)> = rows
                .iter()
                .enumerate()
                .filter(|(_, params)| synapse_type.map_or(true, |t| params.synapse_type == t))
                .collect();

            for run in source_runs(&indexed) {
                let source = indexed[run.start].1.source;
                if !src.complete_contains(source) {
                    continue;
                }
                if let Some(filter) = &self.source_filter {
                    if !filter.complete_contains(source) {
                        continue;
                    }
                }
                if is_disabled(&self.disabled, pop, source, dest) {
                    continue;
                }
                let conn = set.get_or_create(source, dest, &options);
                if conn.is_locked() {
                    continue;
                }
                conn.extend_synapses(
                    indexed[run]
                        .iter()
                        .map(|&(index, params)| place(&*self.locations, dest, params, index)),
                )?;
                conn.lock();
            }
        }

        let created = set.count() - before;
        log::debug!(
            "ConnectGroup {} -> {}: {} new {} in population {}",
            source_target,
            dest_target,
            created,
            self.kind,
            pop
        );
        Ok(created)
    }

    /// Build connectivity from the creating rules, or everything when none creates.
    ///
    /// A failure on any rank fails every rank before the global count.
    pub fn create_connections(&mut self, rules: &ConnectionRules, trace_gid: Option<Gid>) -> Result<usize> {
        let outcome = self.create_local(rules, trace_gid);
        let all_ok = self.comm.check_no_errors(outcome.is_ok());
        let created = match outcome {
            Err(e) => {
                log::error!("Failed to create {}: {}", self.kind, e);
                return Err(e);
            }
            Ok(_) if !all_ok => {
                return Err(ConnectionError::configuration(format!(
                    "{} creation failed on another rank",
                    self.kind
                )))
            }
            Ok(created) => created,
        };
        let total = self.comm.allreduce_sum(created as u64);
        if self.comm.rank() == 0 {
            if total == 0 {
                log::warn!("No {} were created", self.kind);
            } else {
                log::info!("Built {} {}", total, self.kind);
            }
        }
        Ok(created)
    }

    fn create_local(&mut self, rules: &ConnectionRules, trace_gid: Option<Gid>) -> Result<usize> {
        let mut created = 0;
        let mut any_rule = false;
        for rule in rules.creation_rules() {
            any_rule = true;
            log::info!("Creating connections from rule {}: {} -> {}", rule.name, rule.source, rule.destination);
            created += self.connect_group(&rule.source, &rule.destination, rule.synapse_type, trace_gid)?;
        }
        if !any_rule {
            created = self.connect_all(1.0, None, trace_gid)?;
        }
        Ok(created)
    }

    // -- Queries ------------------------------------------------------------

    /// Lazily iterate the live records matching gid filters in the selected populations
    pub fn get_connections<'a>(
        &'a self,
        dests: &'a GidFilter,
        sources: &'a GidFilter,
        selector: &PopulationSelector,
    ) -> Result<impl Iterator<Item = &'a ConnectionRecord> + 'a> {
        let ids = self.find_populations(selector)?;
        Ok(ids
            .into_iter()
            .filter_map(move |id| self.populations.get(&id))
            .flat_map(move |set| set.query(dests, sources)))
    }

    /// Lazily iterate the live records between two targets.
    ///
    /// Both ends are checked with full-circuit membership.
    pub fn get_target_connections<'a>(
        &'a self,
        source_target: &str,
        dest_target: &str,
        dests: &'a GidFilter,
        selector: &PopulationSelector,
    ) -> Result<impl Iterator<Item = &'a ConnectionRecord> + 'a> {
        let src = self.targets.get_target(source_target)?;
        let dst = self.targets.get_target(dest_target)?;
        let ids = self.find_populations(selector)?;
        Ok(ids
            .into_iter()
            .filter_map(move |id| self.populations.get(&id))
            .flat_map(move |set| set.query(dests, &ALL_GIDS))
            .filter(move |conn| dst.complete_contains(conn.dest()) && src.complete_contains(conn.source())))
    }

    /// Disabled records, all or for one destination
    pub fn get_disabled(&self, dest: Option<Gid>) -> impl Iterator<Item = &ConnectionRecord> {
        self.disabled
            .iter()
            .filter(move |(gid, _)| dest.map_or(true, |d| **gid == d))
            .flat_map(|(_, conns)| conns.iter())
    }

    /// Every live record
    pub fn all_connections(&self) -> impl Iterator<Item = &ConnectionRecord> {
        self.populations.values().flat_map(ConnectionSet::all_connections)
    }

    /// Number of live records
    pub fn count(&self) -> usize {
        self.populations.values().map(ConnectionSet::count).sum()
    }

    /// Number of disabled records
    pub fn disabled_count(&self) -> usize {
        self.disabled.values().map(Vec::len).sum()
    }

    /// Live plus disabled records
    pub fn total_count(&self) -> usize {
        self.count() + self.disabled_count()
    }

    // -- Configuration ------------------------------------------------------

    /// Apply a rule's properties to the live records between its targets.
    ///
    /// Returns the number of records configured.
    pub fn configure_group(
        &mut self,
        rule: &ConnectionRule,
        dests: &GidFilter,
        selector: &PopulationSelector,
    ) -> Result<usize> {
        let actions = rule.configure_actions()?;
        for action in &actions {
            if let ConfigureAction::ModOverride(name) = action {
                if !self.engine.has_mechanism_helper(name) {
                    return Err(ConnectionError::configuration(format!(
                        "Rule {}: ModOverride helper {}Helper is not available",
                        rule.name, name
                    )));
                }
            }
        }

        let src = self.targets.get_target(&rule.source)?;
        let dst = self.targets.get_target(&rule.destination)?;
        let mut configured = 0;
        for id in self.find_populations(selector)? {
            let Some(set) = self.populations.get_mut(&id) else {
                continue;
            };
            for (dest, conns) in set.iter_mut() {
                if !dests.contains(dest) || !dst.complete_contains(dest) {
                    continue;
                }
                for conn in conns.iter_mut().filter(|c| src.complete_contains(c.source())) {
                    for action in &actions {
                        action.apply(conn);
                    }
                    configured += 1;
                }
            }
        }
        log::debug!("Rule {} configured {} connections", rule.name, configured);
        Ok(configured)
    }

    /// Apply every non-delayed rule in order; returns the delayed ones
    pub fn configure_connections(&mut self, rules: &ConnectionRules) -> Result<Vec<ConnectionRule>> {
        for rule in rules.immediate_rules() {
            self.configure_group(rule, &GidFilter::All, &PopulationSelector::All)?;
        }
        Ok(rules.delayed_rules().cloned().collect())
    }

    /// Push weight and synapse updates to the records between two targets.
    ///
    /// Instantiated records are updated in the engine; the others keep the
    /// new values for finalize.
    pub fn update_connections(
        &mut self,
        source_target: &str,
        dest_target: &str,
        dests: &GidFilter,
        selector: &PopulationSelector,
        update: &LiveUpdate,
    ) -> Result<usize> {
        if update.is_empty() {
            log::warn!("No update to apply to connections {} -> {}", source_target, dest_target);
            return Ok(0);
        }
        let src = self.targets.get_target(source_target)?;
        let dst = self.targets.get_target(dest_target)?;
        let mut updated = 0;
        for id in self.find_populations(selector)? {
            let Some(set) = self.populations.get_mut(&id) else {
                continue;
            };
            for (dest, conns) in set.iter_mut() {
                if !dests.contains(dest) || !dst.complete_contains(dest) {
                    continue;
                }
                for conn in conns.iter_mut().filter(|c| src.complete_contains(c.source())) {
                    apply_live_update(&mut self.engine, conn, update)?;
                    updated += 1;
                }
            }
        }
        log::debug!("Updated {} connections {} -> {}", updated, source_target, dest_target);
        Ok(updated)
    }

    /// Apply a delayed rule to instantiated connections
    pub fn configure_group_delayed(
        &mut self,
        rule: &ConnectionRule,
        dests: &GidFilter,
        selector: &PopulationSelector,
    ) -> Result<usize> {
        let update = rule.live_update()?;
        log::info!("Applying delayed rule {} (t={:?})", rule.name, rule.delay);
        self.update_connections(&rule.source, &rule.destination, dests, selector, &update)
    }

    // -- Lifecycle ----------------------------------------------------------

    /// Permanently remove `source -> dest` from the selected populations.
    ///
    /// Disabled records are removed too. Returns how many records went.
    pub fn delete(&mut self, source: Gid, dest: Gid, selector: &PopulationSelector) -> Result<usize> {
        let ids = self.find_populations(selector)?;
        let mut removed = 0;
        for id in &ids {
            if let Some(set) = self.populations.get_mut(id) {
                if set.take(source, dest).is_some() {
                    removed += 1;
                }
            }
        }
        removed += self.remove_disabled(|c| {
            ids.contains(&c.population()) && c.source() == source && c.dest() == dest
        });
        if removed == 0 {
            log::error!("Non-existing connection to delete: {}->{}", source, dest);
        }
        Ok(removed)
    }

    /// Permanently remove every record matching the gid filters
    pub fn delete_group(
        &mut self,
        dests: &GidFilter,
        sources: &GidFilter,
        selector: &PopulationSelector,
    ) -> Result<usize> {
        let ids = self.find_populations(selector)?;
        let mut removed = 0;
        for id in &ids {
            if let Some(set) = self.populations.get_mut(id) {
                removed += set.delete_group(dests, sources);
            }
        }
        removed += self.remove_disabled(|c| {
            ids.contains(&c.population()) && dests.contains(c.dest()) && sources.contains(c.source())
        });
        Ok(removed)
    }

    /// Move `source -> dest` out of the live index into the disabled table.
    ///
    /// Instantiated records are deactivated in the engine.
    pub fn disable(
        &mut self,
        source: Gid,
        dest: Gid,
        also_zero_conductance: bool,
        selector: &PopulationSelector,
    ) -> Result<usize> {
        let ids = self.find_populations(selector)?;
        let taken: Vec<ConnectionRecord> = ids
            .iter()
            .filter_map(|id| self.populations.get_mut(id)?.take(source, dest))
            .collect();
        if taken.is_empty() {
            log::warn!("Non-existing connection to disable: {}->{}", source, dest);
        }
        self.park(taken, also_zero_conductance)
    }

    /// Disable every live record matching the gid filters
    pub fn disable_group(
        &mut self,
        dests: &GidFilter,
        sources: &GidFilter,
        also_zero_conductance: bool,
        selector: &PopulationSelector,
    ) -> Result<usize> {
        let ids = self.find_populations(selector)?;
        let mut taken = Vec::new();
        for id in &ids {
            if let Some(set) = self.populations.get_mut(id) {
                taken.extend(set.take_group(dests, sources));
            }
        }
        self.park(taken, also_zero_conductance)
    }

    /// Move `source -> dest` back to the live index of the selected populations
    pub fn reenable(&mut self, source: Gid, dest: Gid, selector: &PopulationSelector) -> Result<usize> {
        let ids = self.find_populations(selector)?;
        let restored = self.reenable_where(|c| {
            ids.contains(&c.population()) && c.source() == source && c.dest() == dest
        })?;
        if restored == 0 {
            log::warn!("Non-existing connection to enable: {}->{}", source, dest);
        }
        Ok(restored)
    }

    /// Re-enable every disabled record of the selected populations
    pub fn reenable_all(&mut self, selector: &PopulationSelector) -> Result<usize> {
        let ids = self.find_populations(selector)?;
        self.reenable_where(|c| ids.contains(&c.population()))
    }

    /// Re-enable the disabled records matching the gid filters
    pub fn reenable_group(
        &mut self,
        dests: &GidFilter,
        sources: &GidFilter,
        selector: &PopulationSelector,
    ) -> Result<usize> {
        let ids = self.find_populations(selector)?;
        self.reenable_where(|c| {
            ids.contains(&c.population()) && dests.contains(c.dest()) && sources.contains(c.source())
        })
    }

    fn park(&mut self, taken: Vec<ConnectionRecord>, also_zero_conductance: bool) -> Result<usize> {
        let mut deactivate = Vec::new();
        let parked = taken.len();
        for mut conn in taken {
            conn.disable(also_zero_conductance);
            if let Some(handle) = conn.engine_handle() {
                deactivate.push((handle, conn.is_zero_conductance()));
            }
            self.disabled.entry(conn.dest()).or_default().push(conn);
        }
        for (handle, zero) in deactivate {
            self.engine.set_active(handle, false, zero)?;
        }
        Ok(parked)
    }

    fn reenable_where<F>(&mut self, matches: F) -> Result<usize>
    where
        F: Fn(&ConnectionRecord) -> bool,
    {
        let picked = take_disabled(&mut self.disabled, &matches);
        let mut reactivate = Vec::new();
        let mut restored = 0;
        for conn in picked {
            if let Some(instantiated) = self.restore(conn) {
                reactivate.extend(instantiated);
                restored += 1;
            }
        }
        for (handle, zero) in reactivate {
            self.engine.set_active(handle, true, zero)?;
        }
        Ok(restored)
    }

    /// Put a disabled record back into its set; `None` when its pair is live again
    fn restore(&mut self, mut conn: ConnectionRecord) -> Option<Option<(EngineHandle, bool)>> {
        let id = conn.population();
        let set = self.populations.entry(id).or_insert_with(|| ConnectionSet::new(id));
        if set.get(conn.source(), conn.dest()).is_some() {
            log::warn!("Connection {} is live again, keeping the disabled copy", conn);
            self.disabled.entry(conn.dest()).or_default().push(conn);
            return None;
        }
        conn.enable();
        let handle = conn.engine_handle().map(|h| (h, conn.is_zero_conductance()));
        set.store(conn);
        Some(handle)
    }

    fn remove_disabled<F>(&mut self, matches: F) -> usize
    where
        F: Fn(&ConnectionRecord) -> bool,
    {
        take_disabled(&mut self.disabled, &matches).len()
    }

    // -- Finalize -----------------------------------------------------------

    /// Instantiate every record not yet instantiated and return the global count.
    ///
    /// Live records go first, each destination's records in reverse source
    /// order; disabled records follow when the engine can hold them inactive.
    pub(crate) fn instantiate_all<F>(&mut self, base_seed: u64, gap_junction: F) -> Result<u64>
    where
        F: Fn(&ConnectionRecord) -> Result<Option<GapJunctionOffsetPair>>,
    {
        let outcome = self.instantiate_local(base_seed, &gap_junction);
        let all_ok = self.comm.check_no_errors(outcome.is_ok());
        let created = match outcome {
            Err(e) => {
                log::error!("Failed to instantiate {}: {}", self.kind, e);
                return Err(e);
            }
            Ok(_) if !all_ok => {
                return Err(ConnectionError::instantiation(format!(
                    "{} instantiation failed on another rank",
                    self.kind
                )))
            }
            Ok(created) => created,
        };
        let total = self.comm.allreduce_sum(created);
        if self.comm.rank() == 0 {
            log::info!("Created {} {}", total, self.kind);
        }
        Ok(total)
    }

    fn instantiate_local<F>(&mut self, base_seed: u64, gap_junction: &F) -> Result<u64>
    where
        F: Fn(&ConnectionRecord) -> Result<Option<GapJunctionOffsetPair>>,
    {
        let mut created = 0u64;
        for set in self.populations.values_mut() {
            for (dest, conns) in set.iter_mut() {
                let cell = self.cells.cell_metadata(dest)?;
                for conn in conns.iter_mut().rev().filter(|c| !c.is_instantiated()) {
                    let offsets = gap_junction(conn)?;
                    let handle = self.engine.instantiate(conn, &cell, base_seed, offsets)?;
                    conn.mark_instantiated(handle);
                    created += 1;
                }
            }
        }

        if !self.engine.supports_disable() {
            let pending = self.disabled.values().flatten().filter(|c| !c.is_instantiated()).count();
            if pending > 0 {
                log::info!("Engine has no disabled state: skipping {} disabled {}", pending, self.kind);
            }
            return Ok(created);
        }
        for (&dest, conns) in self.disabled.iter_mut() {
            let cell = self.cells.cell_metadata(dest)?;
            for conn in conns.iter_mut().rev().filter(|c| !c.is_instantiated()) {
                let offsets = gap_junction(conn)?;
                let handle = self.engine.instantiate(conn, &cell, base_seed, offsets)?;
                conn.mark_instantiated(handle);
                self.engine.set_active(handle, false, conn.is_zero_conductance())?;
                created += 1;
            }
        }
        Ok(created)
    }
}

/// Consecutive ranges of rows sharing a source gid
fn source_runs(rows: &[(usize, &SynapseParams)]) -> Vec<Range<usize>> {
    let mut runs = Vec::new();
    let mut start = 0;
    for pos in 1..=rows.len() {
        if pos == rows.len() || rows[pos].1.source != rows[start].1.source {
            runs.push(start..pos);
            start = pos;
        }
    }
    runs
}

fn place(locations: &dyn LocationResolver, dest: Gid, params: &SynapseParams, index: usize) -> SynapsePlacement {
    SynapsePlacement {
        location: locations.resolve(dest, params.section_id, params.segment, params.offset),
        params: params.clone(),
        index,
    }
}

fn trace_rows(trace_gid: Option<Gid>, dest: Gid, rows: &[SynapseParams]) {
    if trace_gid != Some(dest) {
        return;
    }
    log::info!(target: TRACE_TARGET, "Gid {}: {} synapse rows", dest, rows.len());
    for (index, row) in rows.iter().enumerate() {
        log::info!(target: TRACE_TARGET, "  [{}] {:?}", index, row);
    }
}

fn is_disabled(
    disabled: &BTreeMap<Gid, Vec<ConnectionRecord>>,
    pop: PopulationId,
    source: Gid,
    dest: Gid,
) -> bool {
    disabled
        .get(&dest)
        .map_or(false, |conns| conns.iter().any(|c| c.population() == pop && c.source() == source))
}

/// Remove and return the disabled records matching `matches`, keeping the rest in order
fn take_disabled<F>(disabled: &mut BTreeMap<Gid, Vec<ConnectionRecord>>, matches: &F) -> Vec<ConnectionRecord>
where
    F: Fn(&ConnectionRecord) -> bool,
{
    let mut picked = Vec::new();
    disabled.retain(|_, conns| {
        let (taken, kept): (Vec<_>, Vec<_>) = std::mem::take(conns).into_iter().partition(|c| matches(c));
        picked.extend(taken);
        *conns = kept;
        !conns.is_empty()
    });
    picked
}

fn apply_live_update<E: Instantiator>(
    engine: &mut E,
    conn: &mut ConnectionRecord,
    update: &LiveUpdate,
) -> Result<()> {
    if let Some(weight) = update.weight {
        conn.weight_factor = weight;
    }
    let Some(handle) = conn.engine_handle() else {
        if let Some(cfg) = &update.synapse_configure {
            conn.add_synapse_configuration(cfg.clone());
        }
        return Ok(());
    };
    if let Some(weight) = update.weight {
        engine.update_weight(handle, weight)?;
    }
    if let Some(cfg) = &update.synapse_configure {
        engine.configure_synapses(handle, cfg)?;
    }
    if !update.synapse_params.is_empty() {
        engine.update_synapse_parameters(handle, &update.synapse_params)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_runs() {
        let rows: Vec<SynapseParams> = [3u32, 3, 3, 7, 7, 12]
            .iter()
            .map(|&s| SynapseParams::new(Gid(s), 0, 0, 0.0, 1))
            .collect();
        let indexed: Vec<_> = rows.iter().enumerate().collect();
        assert_eq!(source_runs(&indexed), vec![0..3, 3..5, 5..6]);
        assert!(source_runs(&[]).is_empty());
    }

    #[test]
    fn test_take_disabled_keeps_order() {
        let opts = RecordOptions::default();
        let mut disabled = BTreeMap::new();
        disabled.insert(
            Gid(5),
            vec![
                ConnectionRecord::new(Gid(1), Gid(5), PopulationId::BASE, &opts),
                ConnectionRecord::new(Gid(2), Gid(5), PopulationId::BASE, &opts),
                ConnectionRecord::new(Gid(3), Gid(5), PopulationId::BASE, &opts),
            ],
        );
        let taken = take_disabled(&mut disabled, &|c: &ConnectionRecord| c.source() == Gid(2));
        assert_eq!(taken.len(), 1);
        let left: Vec<_> = disabled[&Gid(5)].iter().map(|c| c.source().raw()).collect();
        assert_eq!(left, vec![1, 3]);

        take_disabled(&mut disabled, &|_: &ConnectionRecord| true);
        assert!(disabled.is_empty());
    }
}
