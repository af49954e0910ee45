//! Connectivity file discovery
//!
//! A circuit location may name a connectivity file directly or a directory
//! holding one. Directories are searched for a per-kind list of candidate
//! filenames, most specific format first and the legacy format last.

use crate::error::{ConnectionError, Result};

use core::fmt;
use std::path::{Path, PathBuf};

/// What a connection manager builds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionKind {
    /// Chemical synapses
    Synapses,
    /// Electrical gap junctions
    GapJunctions,
}

impl ConnectionKind {
    /// Candidate filenames in search order; the last one is the legacy format
    pub const fn circuit_filenames(&self) -> &'static [&'static str] {
        match self {
            Self::Synapses => &["edges.sonata", "edges.h5", "circuit.syn2", "nrn.h5"],
            Self::GapJunctions => &["gj.sonata", "gj.syn2", "nrn_gj.h5"],
        }
    }

    /// The legacy filename, readable without advanced format support
    pub fn legacy_filename(&self) -> &'static str {
        let names = self.circuit_filenames();
        names[names.len() - 1]
    }
}

impl fmt::Display for ConnectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Synapses => write!(f, "connections"),
            Self::GapJunctions => write!(f, "gap-junctions"),
        }
    }
}

/// Resolve a circuit location to a connectivity file
pub fn resolve_circuit_path(
    location: &Path,
    kind: ConnectionKind,
    advanced_formats: bool,
) -> Result<PathBuf> {
    if location.is_dir() {
        return find_circuit_file(location, kind, advanced_formats);
    }
    if location.is_file() {
        return Ok(location.to_path_buf());
    }
    Err(ConnectionError::configuration(format!(
        "Circuit path {} is neither a file nor a directory",
        location.display()
    )))
}

/// Search a directory for the connectivity file of `kind`
pub fn find_circuit_file(
    location: &Path,
    kind: ConnectionKind,
    advanced_formats: bool,
) -> Result<PathBuf> {
    let legacy = kind.legacy_filename();
    let available: Vec<&str> = kind
        .circuit_filenames()
        .iter()
        .copied()
        .filter(|name| location.join(name).is_file())
        .collect();

    let Some(&first) = available.first() else {
        return Err(ConnectionError::configuration(format!(
            "{} is not a file and holds no {} file",
            location.display(),
            kind
        )));
    };
    let has_legacy = available.contains(&legacy);
    if !advanced_formats && !has_legacy {
        return Err(ConnectionError::configuration(format!(
            "Found {} file {} requires format support which is not available",
            kind, first
        )));
    }
    if available.len() > 1 {
        log::warn!(
            "DEPRECATION: Found several {} file formats in {}. Auto-select is deprecated",
            kind,
            location.display()
        );
    }
    let chosen = if advanced_formats { first } else { legacy };
    Ok(location.join(chosen))
}
