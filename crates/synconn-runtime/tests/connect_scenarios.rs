mod common;

use common::*;
use synconn_runtime::memory::{InMemoryReaderFactory, RecordingInstantiator};
use synconn_runtime::{
    ConnectionError, ConnectionRules, Gid, GidFilter, IndexError, PopulationId, PopulationSelector,
    SynapseConnectionManager, SynapseMode, SynapseParams,
};

#[test]
fn connect_all_groups_rows_by_source() -> TestResult {
    init_logging();
    let dir = circuit_dir(&["nrn.h5"])?;
    let reader = reader_with(&[(10, &[3, 3, 3, 7, 7, 12])]);
    let collab = collaborators(
        InMemoryReaderFactory::new(reader),
        targets(&[]),
        &[10],
        RecordingInstantiator::new(),
    );
    let mut manager = SynapseConnectionManager::open(dir.path(), collab)?;

    assert_eq!(manager.connect_all(1.0, None, None)?, 3);
    let records: Vec<_> = manager
        .get_connections(&GidFilter::One(Gid(10)), &GidFilter::All, &PopulationSelector::All)?
        .collect();
    assert_eq!(sources_of(records.iter().copied()), vec![3, 7, 12]);
    let counts: Vec<_> = records.iter().map(|c| c.synapse_count()).collect();
    assert_eq!(counts, vec![3, 2, 1]);

    // Placements keep their ordinal within the destination's rows
    let indices: Vec<_> = records[1].placements().iter().map(|p| p.index).collect();
    assert_eq!(indices, vec![3, 4]);
    Ok(())
}

#[test]
fn connect_all_applies_weight_and_mode() -> TestResult {
    let dir = circuit_dir(&["nrn.h5"])?;
    let collab = collaborators(
        InMemoryReaderFactory::new(reader_with(&[(2, &[1])])),
        targets(&[]),
        &[2],
        RecordingInstantiator::new(),
    );
    let mut manager = SynapseConnectionManager::open(dir.path(), collab)?.with_synapse_mode("AmpaOnly")?;
    manager.connect_all(0.5, None, None)?;
    let conn = manager.all_connections().next().ok_or("no connection")?;
    assert_eq!(conn.weight_factor, 0.5);
    assert_eq!(conn.synapse_mode, SynapseMode::AmpaOnly);
    Ok(())
}

#[test]
fn unknown_synapse_mode_is_rejected() -> TestResult {
    let dir = circuit_dir(&["nrn.h5"])?;
    let collab = collaborators(
        InMemoryReaderFactory::new(reader_with(&[])),
        targets(&[]),
        &[2],
        RecordingInstantiator::new(),
    );
    let result = SynapseConnectionManager::open(dir.path(), collab)?.with_synapse_mode("Nmda");
    assert!(matches!(
        result,
        Err(ConnectionError::Index {
            source: IndexError::InvalidValue { .. }
        })
    ));
    Ok(())
}

#[test]
fn connect_all_restricted_to_given_gids() -> TestResult {
    let dir = circuit_dir(&["nrn.h5"])?;
    let collab = collaborators(
        InMemoryReaderFactory::new(reader_with(&[(5, &[1, 2]), (6, &[1])])),
        targets(&[]),
        &[5, 6],
        RecordingInstantiator::new(),
    );
    let mut manager = SynapseConnectionManager::open(dir.path(), collab)?;
    assert_eq!(manager.connect_all(1.0, Some(&[Gid(6)]), None)?, 1);
    assert_eq!(manager.count(), 1);
    Ok(())
}

#[test]
fn connect_group_skips_sources_outside_target() -> TestResult {
    let dir = circuit_dir(&["nrn.h5"])?;
    let collab = collaborators(
        InMemoryReaderFactory::new(reader_with(&[(5, &[9])])),
        targets(&[("A", &[1, 2, 3]), ("B", &[5])]),
        &[5],
        RecordingInstantiator::new(),
    );
    let mut manager = SynapseConnectionManager::open(dir.path(), collab)?;
    assert_eq!(manager.connect_group("A", "B", None, None)?, 0);
    assert_eq!(manager.count(), 0);
    Ok(())
}

#[test]
fn connect_group_only_visits_destination_members() -> TestResult {
    let dir = circuit_dir(&["nrn.h5"])?;
    let collab = collaborators(
        InMemoryReaderFactory::new(reader_with(&[(5, &[1]), (6, &[1])])),
        targets(&[("A", &[1]), ("B", &[6])]),
        &[5, 6],
        RecordingInstantiator::new(),
    );
    let mut manager = SynapseConnectionManager::open(dir.path(), collab)?;
    assert_eq!(manager.connect_group("A", "B", None, None)?, 1);
    assert!(manager.all_connections().all(|c| c.dest() == Gid(6)));
    Ok(())
}

#[test]
fn sequential_rules_never_duplicate_locked_records() -> TestResult {
    let dir = circuit_dir(&["nrn.h5"])?;
    let collab = collaborators(
        InMemoryReaderFactory::new(reader_with(&[(5, &[1, 1, 2, 3]), (6, &[2])])),
        targets(&[("All", &[1, 2, 3]), ("Some", &[2]), ("Dest", &[5, 6])]),
        &[5, 6],
        RecordingInstantiator::new(),
    );
    let mut manager = SynapseConnectionManager::open(dir.path(), collab)?;

    assert_eq!(manager.connect_group("All", "Dest", None, None)?, 4);
    assert!(manager.all_connections().all(|c| c.is_locked()));
    let before: Vec<_> = manager.all_connections().cloned().collect();

    assert_eq!(manager.connect_group("Some", "Dest", None, None)?, 0);
    let after: Vec<_> = manager.all_connections().cloned().collect();
    assert_eq!(before, after);
    Ok(())
}

#[test]
fn connect_group_filters_synapse_type() -> TestResult {
    let dir = circuit_dir(&["nrn.h5"])?;
    let reader = synconn_runtime::memory::InMemorySynapseReader::new()
        .with_row(Gid(5), SynapseParams::new(Gid(1), 0, 0, 0.5, 1))
        .with_row(Gid(5), SynapseParams::new(Gid(1), 1, 0, 0.5, 110))
        .with_row(Gid(5), SynapseParams::new(Gid(2), 2, 0, 0.5, 1));
    let collab = collaborators(
        InMemoryReaderFactory::new(reader),
        targets(&[("A", &[1, 2]), ("B", &[5])]),
        &[5],
        RecordingInstantiator::new(),
    );
    let mut manager = SynapseConnectionManager::open(dir.path(), collab)?;
    assert_eq!(manager.connect_group("A", "B", Some(110), None)?, 1);
    let conn = manager.all_connections().next().ok_or("no connection")?;
    assert_eq!(conn.source(), Gid(1));
    assert_eq!(conn.placements()[0].index, 1);
    assert_eq!(conn.synapse_count(), 1);
    Ok(())
}

#[test]
fn unknown_target_is_an_error() -> TestResult {
    let dir = circuit_dir(&["nrn.h5"])?;
    let collab = collaborators(
        InMemoryReaderFactory::new(reader_with(&[])),
        targets(&[("A", &[1])]),
        &[5],
        RecordingInstantiator::new(),
    );
    let mut manager = SynapseConnectionManager::open(dir.path(), collab)?;
    let err = manager.connect_group("A", "Missing", None, None).unwrap_err();
    assert!(matches!(err, ConnectionError::UnknownTarget { .. }));
    Ok(())
}

#[test]
fn populations_are_independent() -> TestResult {
    let dir = circuit_dir(&["nrn.h5"])?;
    let projection = dir.path().join("projection");
    std::fs::create_dir(&projection)?;
    std::fs::write(projection.join("nrn.h5"), b"")?;

    let readers = InMemoryReaderFactory::new(reader_with(&[(5, &[3])]))
        .with_source(projection.join("nrn.h5"), reader_with(&[(5, &[3, 4])]));
    let collab = collaborators(readers, targets(&[]), &[5], RecordingInstantiator::new());
    let mut manager = SynapseConnectionManager::open(dir.path(), collab)?;

    manager.connect_all(1.0, None, None)?;
    manager.open_synapse_file(&projection, 1)?;
    assert_eq!(manager.current_population(), PopulationId::new(1, 0));
    assert_eq!(manager.connect_all(1.0, None, None)?, 2);
    assert_eq!(manager.count(), 3);

    // Same pair disabled under (0,0) only
    assert_eq!(manager.disable(Gid(3), Gid(5), false, &PopulationSelector::exact(0, 0))?, 1);
    let base = manager.population(PopulationId::BASE).ok_or("no base")?;
    let proj = manager.population(PopulationId::new(1, 0)).ok_or("no projection")?;
    assert!(base.get(Gid(3), Gid(5)).is_none());
    assert!(proj.get(Gid(3), Gid(5)).is_some());

    // Re-enabling under (1,0) finds nothing to restore
    assert_eq!(manager.reenable(Gid(3), Gid(5), &PopulationSelector::exact(1, 0))?, 0);
    assert_eq!(manager.disabled_count(), 1);

    // Source-only selector picks the projection
    let from_one: Vec<_> = manager
        .get_connections(&GidFilter::All, &GidFilter::All, &PopulationSelector::BySource(1))?
        .map(|c| c.source().raw())
        .collect();
    assert_eq!(from_one, vec![3, 4]);
    Ok(())
}

#[test]
fn exact_missing_population_is_an_error() -> TestResult {
    let dir = circuit_dir(&["nrn.h5"])?;
    let collab = collaborators(
        InMemoryReaderFactory::new(reader_with(&[])),
        targets(&[]),
        &[5],
        RecordingInstantiator::new(),
    );
    let manager = SynapseConnectionManager::open(dir.path(), collab)?;
    let err = manager.find_populations(&PopulationSelector::exact(2, 0)).unwrap_err();
    assert!(matches!(err, ConnectionError::PopulationNotFound { source_pop: 2, dest_pop: 0 }));
    assert_eq!(manager.find_populations(&PopulationSelector::BySource(2))?, vec![]);
    Ok(())
}

#[test]
fn target_connections_use_full_membership() -> TestResult {
    let dir = circuit_dir(&["nrn.h5"])?;
    let src = synconn_runtime::memory::GidTarget::new("A", [3u32]).with_local_members([3u32, 7]);
    let collab = collaborators(
        InMemoryReaderFactory::new(reader_with(&[(10, &[3, 7])])),
        targets(&[("B", &[10])]).with_target(src),
        &[10],
        RecordingInstantiator::new(),
    );
    let mut manager = SynapseConnectionManager::open(dir.path(), collab)?;
    manager.connect_all(1.0, None, None)?;
    let found: Vec<_> = manager
        .get_target_connections("A", "B", &GidFilter::All, &PopulationSelector::All)?
        .map(|c| c.source().raw())
        .collect();
    assert_eq!(found, vec![3]);
    Ok(())
}

#[test]
fn create_connections_without_creating_rules_connects_all() -> TestResult {
    let dir = circuit_dir(&["nrn.h5"])?;
    let collab = collaborators(
        InMemoryReaderFactory::new(reader_with(&[(5, &[1, 2])])),
        targets(&[("A", &[1]), ("B", &[5])]),
        &[5],
        RecordingInstantiator::new(),
    );
    let mut manager = SynapseConnectionManager::open(dir.path(), collab)?;
    let rules = ConnectionRules::from_toml_str(
        "[[connection]]\nname = \"w\"\nsource = \"A\"\ndestination = \"B\"\nweight = 2.0\n",
    )?;
    assert_eq!(manager.create_connections(&rules, None)?, 2);
    Ok(())
}

#[test]
fn create_connections_with_creating_rules() -> TestResult {
    let dir = circuit_dir(&["nrn.h5"])?;
    let collab = collaborators(
        InMemoryReaderFactory::new(reader_with(&[(5, &[1, 2])])),
        targets(&[("A", &[1]), ("B", &[5])]),
        &[5],
        RecordingInstantiator::new(),
    );
    let mut manager = SynapseConnectionManager::open(dir.path(), collab)?;
    let rules = ConnectionRules::from_toml_str(
        "[[connection]]\nname = \"c\"\nsource = \"A\"\ndestination = \"B\"\ncreate = true\n",
    )?;
    assert_eq!(manager.create_connections(&rules, Some(Gid(5)))?, 1);
    assert_eq!(sources_of(manager.all_connections()), vec![1]);
    Ok(())
}

#[test]
fn reopening_unlocks_records_for_new_rows() -> TestResult {
    let dir = circuit_dir(&["nrn.h5"])?;
    let bonus = dir.path().join("bonus");
    std::fs::create_dir(&bonus)?;
    std::fs::write(bonus.join("nrn.h5"), b"")?;

    let readers = InMemoryReaderFactory::new(reader_with(&[(5, &[1])]))
        .with_source(bonus.join("nrn.h5"), reader_with(&[(5, &[1, 1])]));
    let collab = collaborators(readers, targets(&[("A", &[1]), ("B", &[5])]), &[5], RecordingInstantiator::new());
    let mut manager = SynapseConnectionManager::open(dir.path(), collab)?;

    manager.connect_group("A", "B", None, None)?;
    manager.connect_group("A", "B", None, None)?;
    let conn = manager.all_connections().next().ok_or("missing 1->5")?;
    assert!(conn.is_locked());
    assert_eq!(conn.synapse_count(), 1);

    manager.open_synapse_file(&bonus, 0)?;
    assert!(manager.all_connections().all(|c| !c.is_locked()));
    assert_eq!(manager.connect_group("A", "B", None, None)?, 0);
    let conn = manager.all_connections().next().ok_or("missing 1->5")?;
    assert_eq!(conn.synapse_count(), 3);
    assert!(conn.is_locked());
    assert_eq!(manager.count(), 1);
    Ok(())
}
