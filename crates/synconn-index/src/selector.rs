//! Selectors over populations and gids

use crate::ids::{Gid, PopulationId};

/// Selects edge populations
///
/// `BySource` matches the source population id only; `ByPair` fields set
/// to `None` act as wildcards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PopulationSelector {
    /// Every population
    #[default]
    All,
    /// Populations with this source id
    BySource(u32),
    /// Populations matching a (source, destination) pair, each optionally a wildcard
    ByPair(Option<u32>, Option<u32>),
}

impl PopulationSelector {
    /// Fully specified pair selector
    pub const fn exact(source: u32, dest: u32) -> Self {
        Self::ByPair(Some(source), Some(dest))
    }

    /// Whether a population id is selected
    pub fn matches(&self, id: PopulationId) -> bool {
        match *self {
            Self::All => true,
            Self::BySource(source) => source == id.source,
            Self::ByPair(source, dest) => {
                source.map_or(true, |s| s == id.source) && dest.map_or(true, |d| d == id.dest)
            }
        }
    }

    /// The single population this selector names, if fully specified
    pub fn as_exact(&self) -> Option<PopulationId> {
        match *self {
            Self::ByPair(Some(source), Some(dest)) => Some(PopulationId::new(source, dest)),
            _ => None,
        }
    }
}

impl From<u32> for PopulationSelector {
    fn from(source: u32) -> Self {
        Self::BySource(source)
    }
}

impl From<(u32, u32)> for PopulationSelector {
    fn from((source, dest): (u32, u32)) -> Self {
        Self::exact(source, dest)
    }
}

impl From<PopulationId> for PopulationSelector {
    fn from(id: PopulationId) -> Self {
        Self::exact(id.source, id.dest)
    }
}

/// A sorted, deduplicated set of gids
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GidSet(Vec<Gid>);

impl GidSet {
    /// Whether the set contains a gid
    pub fn contains(&self, gid: Gid) -> bool {
        self.0.binary_search(&gid).is_ok()
    }

    /// Gids in ascending order
    pub fn as_slice(&self) -> &[Gid] {
        &self.0
    }

    /// Number of gids
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the set is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<Gid> for GidSet {
    fn from_iter<I: IntoIterator<Item = Gid>>(iter: I) -> Self {
        let mut gids: Vec<Gid> = iter.into_iter().collect();
        gids.sort_unstable();
        gids.dedup();
        Self(gids)
    }
}

/// Restricts a query to some gids; `All` is unrestricted
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum GidFilter {
    /// No restriction
    #[default]
    All,
    /// A single gid
    One(Gid),
    /// A set of gids
    Many(GidSet),
}

impl GidFilter {
    /// Build a set filter from any gids
    pub fn many<I, G>(gids: I) -> Self
    where
        I: IntoIterator<Item = G>,
        G: Into<Gid>,
    {
        Self::Many(gids.into_iter().map(Into::into).collect())
    }

    /// Whether a gid passes the filter
    pub fn contains(&self, gid: Gid) -> bool {
        match self {
            Self::All => true,
            Self::One(g) => *g == gid,
            Self::Many(set) => set.contains(gid),
        }
    }
}

impl From<Gid> for GidFilter {
    fn from(gid: Gid) -> Self {
        Self::One(gid)
    }
}

impl From<Option<Gid>> for GidFilter {
    fn from(gid: Option<Gid>) -> Self {
        gid.map_or(Self::All, Self::One)
    }
}

impl From<Vec<Gid>> for GidFilter {
    fn from(gids: Vec<Gid>) -> Self {
        Self::Many(gids.into_iter().collect())
    }
}

impl From<&[Gid]> for GidFilter {
    fn from(gids: &[Gid]) -> Self {
        Self::Many(gids.iter().copied().collect())
    }
}
