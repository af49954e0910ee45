//! Connection sets: the per-population, per-destination sorted index
//!
//! Records of one edge population are grouped by destination gid. Each
//! destination's list is kept strictly ascending by source gid so that
//! lookup, insertion and removal are binary searches.

use crate::{
    ids::{Gid, PopulationId},
    record::{ConnectionRecord, RecordOptions, SynapseParams},
    selector::{GidFilter, PopulationSelector},
};

use std::collections::BTreeMap;

/// A set-valued source filter switches from per-gid binary search to a
/// filtered scan once it is this many times smaller than the list.
const SEARCH_RATIO: usize = 4;

/// All connections of one (source population, destination population) pair
#[derive(Debug, Clone, Default)]
pub struct ConnectionSet {
    id: PopulationId,
    connections: BTreeMap<Gid, Vec<ConnectionRecord>>,
    count: usize,
}

impl ConnectionSet {
    /// Create an empty set for a population pair
    pub fn new(id: PopulationId) -> Self {
        Self {
            id,
            connections: BTreeMap::new(),
            count: 0,
        }
    }

    /// Population pair of this set
    pub fn id(&self) -> PopulationId {
        self.id
    }

    /// Number of live records
    pub fn count(&self) -> usize {
        self.count
    }

    /// Whether the set holds no record
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Whether any record targets `dest`
    pub fn contains_dest(&self, dest: Gid) -> bool {
        self.connections.contains_key(&dest)
    }

    /// Destination gids with at least one record, ascending
    pub fn dest_gids(&self) -> impl Iterator<Item = Gid> + '_ {
        self.connections.keys().copied()
    }

    /// Records of one destination, ascending by source gid
    pub fn records(&self, dest: Gid) -> &[ConnectionRecord] {
        self.connections.get(&dest).map(Vec::as_slice).unwrap_or_default()
    }

    /// Iterate `(dest, records)` by ascending destination
    pub fn iter(&self) -> impl Iterator<Item = (Gid, &[ConnectionRecord])> {
        self.connections.iter().map(|(gid, conns)| (*gid, conns.as_slice()))
    }

    /// Mutable variant of [`iter`](Self::iter)
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Gid, &mut [ConnectionRecord])> {
        self.connections
            .iter_mut()
            .map(|(gid, conns)| (*gid, conns.as_mut_slice()))
    }

    /// Every record of the set
    pub fn all_connections(&self) -> impl Iterator<Item = &ConnectionRecord> {
        self.connections.values().flatten()
    }

    /// Binary search for `source` among the records of `dest`.
    ///
    /// `Ok(pos)` is an exact match, `Err(pos)` the insertion point that
    /// keeps the list ascending.
    pub fn find(&self, source: Gid, dest: Gid) -> Result<usize, usize> {
        search(self.records(dest), source)
    }

    /// Exact lookup
    pub fn get(&self, source: Gid, dest: Gid) -> Option<&ConnectionRecord> {
        let conns = self.records(dest);
        search(conns, source).ok().map(|pos| &conns[pos])
    }

    /// Exact mutable lookup
    pub fn get_mut(&mut self, source: Gid, dest: Gid) -> Option<&mut ConnectionRecord> {
        let conns = self.connections.get_mut(&dest)?;
        let pos = search(conns, source).ok()?;
        conns.get_mut(pos)
    }

    /// Return the record for `source -> dest`, creating it in order if missing.
    ///
    /// Reader streams are source-sorted per destination, so appending after
    /// the current maximum is checked before falling back to a binary search.
    pub fn get_or_create(
        &mut self,
        source: Gid,
        dest: Gid,
        options: &RecordOptions,
    ) -> &mut ConnectionRecord {
        let id = self.id;
        let conns = self.connections.entry(dest).or_default();
        let len = conns.len();
        let pos = match conns.last().map(ConnectionRecord::source) {
            None => 0,
            Some(last) if last == source => return &mut conns[len - 1],
            Some(last) if last < source => len,
            Some(_) => match search(conns, source) {
                Ok(found) => return &mut conns[found],
                Err(insert) => insert,
            },
        };
        conns.insert(pos, ConnectionRecord::new(source, dest, id, options));
        self.count += 1;
        &mut conns[pos]
    }

    /// Insert a record unless one already exists for its pair.
    ///
    /// Returns whether the record was stored. Duplicates are logged and dropped.
    pub fn store(&mut self, record: ConnectionRecord) -> bool {
        if record.population() != self.id {
            log::error!(
                "Attempt to store connection {} of population {} into population {}",
                record,
                record.population(),
                self.id
            );
            return false;
        }
        let conns = self.connections.entry(record.dest()).or_default();
        match search(conns, record.source()) {
            Ok(_) => {
                log::error!(
                    "Attempt to store existing connection: {}->{}",
                    record.source(),
                    record.dest()
                );
                false
            }
            Err(pos) => {
                conns.insert(pos, record);
                self.count += 1;
                true
            }
        }
    }

    /// Remove and return the record for `source -> dest`
    pub fn take(&mut self, source: Gid, dest: Gid) -> Option<ConnectionRecord> {
        let conns = self.connections.get_mut(&dest)?;
        let pos = search(conns, source).ok()?;
        let record = conns.remove(pos);
        if conns.is_empty() {
            self.connections.remove(&dest);
        }
        self.count -= 1;
        Some(record)
    }

    /// Remove the record for `source -> dest`. Logs when absent.
    pub fn delete(&mut self, source: Gid, dest: Gid) -> bool {
        if self.take(source, dest).is_some() {
            return true;
        }
        log::error!("Non-existing connection to delete: {}->{}", source, dest);
        false
    }

    /// Remove and return every record matching the filters, in index order
    pub fn take_group(&mut self, dests: &GidFilter, sources: &GidFilter) -> Vec<ConnectionRecord> {
        let mut removed = Vec::new();
        for dest in self.dest_keys(dests) {
            let Some(conns) = self.connections.get_mut(&dest) else {
                continue;
            };
            let positions = matching_positions(conns, sources);
            if positions.is_empty() {
                continue;
            }
            removed.extend(remove_positions(conns, &positions));
            if conns.is_empty() {
                self.connections.remove(&dest);
            }
        }
        self.count -= removed.len();
        removed
    }

    /// Remove every record matching the filters; returns how many went
    pub fn delete_group(&mut self, dests: &GidFilter, sources: &GidFilter) -> usize {
        self.take_group(dests, sources).len()
    }

    /// Lazily iterate the records matching both filters.
    ///
    /// A single source gid is a binary search per destination; a source set
    /// is either searched gid by gid or scanned, whichever is cheaper.
    pub fn query<'a>(
        &'a self,
        dests: &'a GidFilter,
        sources: &'a GidFilter,
    ) -> impl Iterator<Item = &'a ConnectionRecord> + 'a {
        let lists: Box<dyn Iterator<Item = &'a [ConnectionRecord]> + 'a> = match dests {
            GidFilter::All => Box::new(self.connections.values().map(Vec::as_slice)),
            GidFilter::One(gid) => Box::new(self.connections.get(gid).map(Vec::as_slice).into_iter()),
            GidFilter::Many(set) => Box::new(
                set.as_slice()
                    .iter()
                    .filter_map(move |gid| self.connections.get(gid).map(Vec::as_slice)),
            ),
        };

        let matches: Box<dyn Iterator<Item = &'a ConnectionRecord> + 'a> = match sources {
            GidFilter::All => Box::new(lists.flatten()),
            GidFilter::One(gid) => {
                let gid = *gid;
                Box::new(lists.filter_map(move |conns| search(conns, gid).ok().map(|pos| &conns[pos])))
            }
            GidFilter::Many(_) => Box::new(lists.flat_map(move |conns| {
                matching_positions(conns, sources)
                    .into_iter()
                    .map(move |pos| &conns[pos])
            })),
        };
        matches
    }

    /// Synapse parameters of every placement targeting `dest`
    pub fn synapse_params(&self, dest: Gid) -> impl Iterator<Item = &SynapseParams> {
        self.records(dest)
            .iter()
            .flat_map(|conn| conn.placements().iter().map(|p| &p.params))
    }

    /// Whether a population selector names this set
    pub fn population_matches(&self, selector: &PopulationSelector) -> bool {
        selector.matches(self.id)
    }

    /// Allow pathway rules to append to every record again
    pub fn unlock_all(&mut self) {
        for conn in self.connections.values_mut().flatten() {
            conn.unlock();
        }
    }

    /// Drop every record
    pub fn clear(&mut self) {
        self.connections.clear();
        self.count = 0;
    }

    /// Check the ordering and count invariants
    pub fn is_consistent(&self) -> bool {
        let mut total = 0;
        for (dest, conns) in &self.connections {
            if conns.is_empty() {
                return false;
            }
            if conns.iter().any(|c| c.dest() != *dest || c.population() != self.id) {
                return false;
            }
            if conns.windows(2).any(|w| w[0].source() >= w[1].source()) {
                return false;
            }
            total += conns.len();
        }
        total == self.count
    }

    fn dest_keys(&self, dests: &GidFilter) -> Vec<Gid> {
        match dests {
            GidFilter::All => self.connections.keys().copied().collect(),
            GidFilter::One(gid) => self.connections.get_key_value(gid).map(|(g, _)| *g).into_iter().collect(),
            GidFilter::Many(set) => set
                .as_slice()
                .iter()
                .copied()
                .filter(|gid| self.connections.contains_key(gid))
                .collect(),
        }
    }
}

fn search(conns: &[ConnectionRecord], source: Gid) -> Result<usize, usize> {
    conns.binary_search_by_key(&source, ConnectionRecord::source)
}

/// Ascending positions of the exact source matches within one destination list
fn matching_positions(conns: &[ConnectionRecord], sources: &GidFilter) -> Vec<usize> {
    match sources {
        GidFilter::All => (0..conns.len()).collect(),
        GidFilter::One(gid) => search(conns, *gid).ok().into_iter().collect(),
        GidFilter::Many(set) if set.len().saturating_mul(SEARCH_RATIO) < conns.len() => set
            .as_slice()
            .iter()
            .filter_map(|gid| search(conns, *gid).ok())
            .collect(),
        GidFilter::Many(set) => conns
            .iter()
            .enumerate()
            .filter(|(_, conn)| set.contains(conn.source()))
            .map(|(pos, _)| pos)
            .collect(),
    }
}

/// Split `conns` in one pass, returning the records at `positions` (ascending)
fn remove_positions(conns: &mut Vec<ConnectionRecord>, positions: &[usize]) -> Vec<ConnectionRecord> {
    let mut removed = Vec::with_capacity(positions.len());
    let mut kept = Vec::with_capacity(conns.len().saturating_sub(positions.len()));
    let mut next = positions.iter().copied().peekable();
    for (pos, conn) in std::mem::take(conns).into_iter().enumerate() {
        if next.peek() == Some(&pos) {
            next.next();
            removed.push(conn);
        } else {
            kept.push(conn);
        }
    }
    *conns = kept;
    removed
}
