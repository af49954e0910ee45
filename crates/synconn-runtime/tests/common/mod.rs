//! Fixtures shared by the integration tests
#![allow(dead_code)]

use std::error::Error;
use std::sync::Arc;
use synconn_runtime::memory::{
    GidTarget, InMemoryReaderFactory, InMemorySynapseReader, InMemoryTargets,
    PackedLocationResolver, RecordingInstantiator, StaticCells,
};
use synconn_runtime::{Collaborators, Gid, LocalCommunicator, SynapseParams};
use tempfile::TempDir;

pub type TestResult = Result<(), Box<dyn Error>>;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A circuit directory holding empty files with the given names
pub fn circuit_dir(files: &[&str]) -> std::io::Result<TempDir> {
    let dir = tempfile::tempdir()?;
    for name in files {
        std::fs::write(dir.path().join(name), b"")?;
    }
    Ok(dir)
}

/// One row per listed source, section id = row ordinal, synapse type 1
pub fn reader_with(rows: &[(u32, &[u32])]) -> InMemorySynapseReader {
    let mut reader = InMemorySynapseReader::new();
    for &(dest, sources) in rows {
        for (i, &source) in sources.iter().enumerate() {
            reader.add_row(Gid(dest), SynapseParams::new(Gid(source), i as u32, 0, 0.5, 1));
        }
    }
    reader
}

pub fn targets(defs: &[(&str, &[u32])]) -> InMemoryTargets {
    defs.iter().fold(InMemoryTargets::new(), |targets, (name, gids)| {
        targets.with_target(GidTarget::new(*name, gids.iter().copied()))
    })
}

pub fn collaborators(
    readers: InMemoryReaderFactory,
    targets: InMemoryTargets,
    local_gids: &[u32],
    engine: RecordingInstantiator,
) -> Collaborators<RecordingInstantiator> {
    Collaborators {
        readers: Arc::new(readers),
        targets: Arc::new(targets),
        locations: Arc::new(PackedLocationResolver),
        cells: Arc::new(StaticCells::new(local_gids.iter().copied())),
        comm: Arc::new(LocalCommunicator),
        engine,
    }
}

pub fn sources_of<'a>(records: impl Iterator<Item = &'a synconn_runtime::ConnectionRecord>) -> Vec<u32> {
    records.map(|c| c.source().raw()).collect()
}
