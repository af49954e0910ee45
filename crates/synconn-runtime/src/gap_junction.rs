//! Gap-junction connectivity
//!
//! Gap junctions couple both cells of a pair, so instantiation needs the
//! coupling offset of each side. Offsets come from a `gjinfo.txt` file next
//! to the connectivity file: one `gid count` line per cell, in gid order.
//! The n-th entry belongs to gid n, and its offset is the running sum of
//! `2 * count` over the entries before it.

use crate::{
    collaborators::{Collaborators, GapJunctionOffsetPair, Instantiator},
    discovery::ConnectionKind,
    error::{ConnectionError, Result},
    manager::ConnectionManager,
};

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::ops::{Deref, DerefMut};
use std::path::Path;
use synconn_index::Gid;

/// Name of the gap-junction offsets file
pub const GAP_JUNCTION_INFO_FILE: &str = "gjinfo.txt";

/// Per-gid gap-junction coupling offsets, indexed by `gid - 1`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GapJunctionOffsets {
    offsets: Vec<u64>,
}

impl GapJunctionOffsets {
    /// Parse `gid count` lines, accumulating offsets in entry order.
    ///
    /// Entries are positional: the gid column is validated but the n-th
    /// entry always belongs to gid n. Blank lines are skipped.
    pub fn parse<R: BufRead>(reader: R) -> Result<Self> {
        let mut offsets = Vec::new();
        let mut running = 0u64;
        for (lineno, line) in reader.lines().enumerate() {
            let line = line?;
            let mut fields = line.split_whitespace();
            let Some(gid) = fields.next() else {
                continue;
            };
            let parsed = gid
                .parse::<u32>()
                .ok()
                .zip(fields.next().and_then(|count| count.parse::<u64>().ok()));
            let Some((gid, count)) = parsed else {
                return Err(ConnectionError::configuration(format!(
                    "Invalid {} line {}: {:?}",
                    GAP_JUNCTION_INFO_FILE,
                    lineno + 1,
                    line
                )));
            };
            if gid as usize != offsets.len() + 1 {
                log::debug!(
                    "{} line {} lists gid {} for entry {}",
                    GAP_JUNCTION_INFO_FILE,
                    lineno + 1,
                    gid,
                    offsets.len() + 1
                );
            }
            offsets.push(running);
            running = count
                .checked_mul(2)
                .and_then(|junctions| running.checked_add(junctions))
                .ok_or_else(|| {
                    ConnectionError::configuration(format!(
                        "{} line {}: gap-junction count {} overflows the offset",
                        GAP_JUNCTION_INFO_FILE,
                        lineno + 1,
                        count
                    ))
                })?;
        }
        Ok(Self { offsets })
    }

    /// Load an offsets file
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| {
            ConnectionError::configuration(format!("Cannot open {}: {}", path.display(), e))
        })?;
        Self::parse(BufReader::new(file))
    }

    /// Offset of one cell
    pub fn offset(&self, gid: Gid) -> Option<u64> {
        let index = gid.raw().checked_sub(1)?;
        self.offsets.get(index as usize).copied()
    }

    /// Offsets of both sides of a junction
    pub fn pair(&self, source: Gid, dest: Gid) -> Option<GapJunctionOffsetPair> {
        Some(GapJunctionOffsetPair {
            dest: self.offset(dest)?,
            source: self.offset(source)?,
        })
    }

    /// Number of cells with an offset
    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    /// Whether no offset is known
    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }
}

/// Connection manager for gap junctions
pub struct GapJunctionConnectionManager<E> {
    inner: ConnectionManager<E>,
    offsets: GapJunctionOffsets,
}

impl<E: Instantiator> GapJunctionConnectionManager<E> {
    /// Open the gap-junction file of a circuit and its offsets.
    ///
    /// With `circuit_target`, source gids outside that target are never connected.
    pub fn open(circuit_path: &Path, collab: Collaborators<E>, circuit_target: Option<&str>) -> Result<Self> {
        let mut inner = ConnectionManager::open(circuit_path, ConnectionKind::GapJunctions, collab)?;
        let info_dir = inner.circuit_file().parent().unwrap_or(circuit_path).to_path_buf();
        let offsets = GapJunctionOffsets::load(&info_dir.join(GAP_JUNCTION_INFO_FILE))?;
        log::debug!("Loaded {} gap-junction offsets", offsets.len());
        if let Some(name) = circuit_target {
            inner.source_filter = Some(inner.targets.get_target(name)?);
        }
        Ok(Self { inner, offsets })
    }

    /// Coupling offsets in use
    pub fn offsets(&self) -> &GapJunctionOffsets {
        &self.offsets
    }

    /// Instantiate every pending junction with the offsets of both sides
    pub fn finalize(&mut self) -> Result<u64> {
        let offsets = &self.offsets;
        self.inner.instantiate_all(0, |conn| {
            offsets.pair(conn.source(), conn.dest()).map(Some).ok_or_else(|| {
                ConnectionError::configuration(format!(
                    "No gap-junction offset for {}->{}",
                    conn.source(),
                    conn.dest()
                ))
            })
        })
    }
}

impl<E> Deref for GapJunctionConnectionManager<E> {
    type Target = ConnectionManager<E>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl<E> DerefMut for GapJunctionConnectionManager<E> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.inner
    }
}
