mod common;

use common::*;
use synconn_runtime::memory::{InMemoryReaderFactory, RecordingInstantiator};
use synconn_runtime::{
    ConnectionError, Gid, GidFilter, IndexError, PopulationSelector, SynapseConnectionManager,
};

fn built_manager(
    rows: &[(u32, &[u32])],
    local: &[u32],
    engine: RecordingInstantiator,
) -> Result<(tempfile::TempDir, SynapseConnectionManager<RecordingInstantiator>), Box<dyn std::error::Error>> {
    init_logging();
    let dir = circuit_dir(&["nrn.h5"])?;
    let collab = collaborators(InMemoryReaderFactory::new(reader_with(rows)), targets(&[]), local, engine);
    let mut manager = SynapseConnectionManager::open(dir.path(), collab)?;
    manager.connect_all(1.0, None, None)?;
    Ok((dir, manager))
}

#[test]
fn disable_then_reenable_round_trip() -> TestResult {
    let (_dir, mut manager) = built_manager(&[(10, &[3, 7, 12])], &[10], RecordingInstantiator::new())?;
    let all = PopulationSelector::All;
    let original = manager
        .get_connections(&GidFilter::One(Gid(10)), &GidFilter::One(Gid(7)), &all)?
        .next()
        .cloned()
        .ok_or("missing 7->10")?;

    assert_eq!(manager.disable(Gid(7), Gid(10), false, &all)?, 1);
    assert_eq!(manager.count(), 2);
    assert_eq!(manager.disabled_count(), 1);
    assert_eq!(manager.total_count(), 3);
    assert!(manager.get_disabled(Some(Gid(10))).all(|c| c.is_disabled()));

    assert_eq!(manager.reenable(Gid(7), Gid(10), &all)?, 1);
    assert_eq!(manager.total_count(), 3);
    assert_eq!(manager.disabled_count(), 0);
    let restored = manager
        .get_connections(&GidFilter::One(Gid(10)), &GidFilter::All, &all)?
        .collect::<Vec<_>>();
    assert_eq!(sources_of(restored.iter().copied()), vec![3, 7, 12]);
    assert_eq!(*restored[1], original);
    Ok(())
}

#[test]
fn reenable_all_restores_order() -> TestResult {
    let (_dir, mut manager) = built_manager(&[(5, &[1, 4, 9, 20])], &[5], RecordingInstantiator::new())?;
    let all = PopulationSelector::All;
    let dest = GidFilter::One(Gid(5));
    let before: Vec<_> = manager.get_connections(&dest, &GidFilter::All, &all)?.cloned().collect();

    assert_eq!(manager.disable_group(&dest, &GidFilter::All, true, &all)?, 4);
    assert_eq!(manager.get_connections(&dest, &GidFilter::All, &all)?.count(), 0);
    assert!(manager.get_disabled(None).all(|c| c.is_zero_conductance()));

    assert_eq!(manager.reenable_all(&all)?, 4);
    let after: Vec<_> = manager.get_connections(&dest, &GidFilter::All, &all)?.collect();
    assert_eq!(sources_of(after.iter().copied()), vec![1, 4, 9, 20]);
    assert!(after.iter().all(|c| !c.is_disabled()));
    assert_eq!(after.len(), before.len());
    Ok(())
}

#[test]
fn reenable_group_matches_gid_filters() -> TestResult {
    let (_dir, mut manager) = built_manager(&[(5, &[1, 2]), (6, &[1])], &[5, 6], RecordingInstantiator::new())?;
    let all = PopulationSelector::All;
    manager.disable_group(&GidFilter::All, &GidFilter::One(Gid(1)), false, &all)?;
    assert_eq!(manager.disabled_count(), 2);
    assert_eq!(manager.reenable_group(&GidFilter::One(Gid(6)), &GidFilter::All, &all)?, 1);
    assert_eq!(manager.get_disabled(None).map(|c| c.dest().raw()).collect::<Vec<_>>(), vec![5]);
    Ok(())
}

#[test]
fn disabled_pairs_are_not_recreated() -> TestResult {
    let (_dir, mut manager) = built_manager(&[(5, &[1, 2])], &[5], RecordingInstantiator::new())?;
    let all = PopulationSelector::All;
    manager.disable(Gid(1), Gid(5), false, &all)?;
    manager.connect_all(1.0, None, None)?;
    assert_eq!(manager.count(), 1);
    assert_eq!(manager.total_count(), 2);
    Ok(())
}

#[test]
fn missing_pairs_are_no_ops() -> TestResult {
    let (_dir, mut manager) = built_manager(&[(5, &[1])], &[5], RecordingInstantiator::new())?;
    let all = PopulationSelector::All;
    assert_eq!(manager.disable(Gid(8), Gid(5), false, &all)?, 0);
    assert_eq!(manager.reenable(Gid(8), Gid(5), &all)?, 0);
    assert_eq!(manager.delete(Gid(8), Gid(5), &all)?, 0);
    assert_eq!(manager.total_count(), 1);
    Ok(())
}

#[test]
fn delete_reaches_both_stores() -> TestResult {
    let (_dir, mut manager) = built_manager(&[(5, &[1, 2, 3])], &[5], RecordingInstantiator::new())?;
    let all = PopulationSelector::All;
    manager.disable(Gid(2), Gid(5), false, &all)?;

    assert_eq!(manager.delete(Gid(2), Gid(5), &all)?, 1);
    assert_eq!(manager.disabled_count(), 0);
    assert_eq!(manager.delete(Gid(1), Gid(5), &all)?, 1);
    assert_eq!(manager.total_count(), 1);

    manager.disable(Gid(3), Gid(5), false, &all)?;
    assert_eq!(manager.delete_group(&GidFilter::One(Gid(5)), &GidFilter::All, &all)?, 1);
    assert_eq!(manager.total_count(), 0);
    Ok(())
}

#[test]
fn finalize_walks_destinations_in_reverse_source_order() -> TestResult {
    let (_dir, mut manager) =
        built_manager(&[(10, &[3, 7, 12]), (11, &[4])], &[10, 11], RecordingInstantiator::new())?;
    assert_eq!(manager.finalize(42)?, 4);
    assert_eq!(manager.engine().instantiation_order(), vec![(12, 10), (7, 10), (3, 10), (4, 11)]);
    assert!(manager.engine().instantiated.iter().all(|call| call.base_seed == 42));
    assert!(manager.all_connections().all(|c| c.is_instantiated()));

    // A second pass has nothing left to do
    assert_eq!(manager.finalize(42)?, 0);
    Ok(())
}

#[test]
fn finalize_instantiates_disabled_records_inactive() -> TestResult {
    let (_dir, mut manager) = built_manager(&[(10, &[3, 7])], &[10], RecordingInstantiator::new())?;
    manager.disable(Gid(3), Gid(10), true, &PopulationSelector::All)?;
    assert_eq!(manager.finalize(1)?, 2);

    let engine = manager.engine();
    assert_eq!(engine.instantiation_order(), vec![(7, 10), (3, 10)]);
    let disabled_handle = engine.instantiated[1].handle;
    assert_eq!(engine.activity, vec![(disabled_handle, false, true)]);
    Ok(())
}

#[test]
fn finalize_skips_disabled_records_without_engine_support() -> TestResult {
    let engine = RecordingInstantiator::new().without_disable();
    let (_dir, mut manager) = built_manager(&[(10, &[3, 7])], &[10], engine)?;
    manager.disable(Gid(3), Gid(10), false, &PopulationSelector::All)?;
    assert_eq!(manager.finalize(1)?, 1);
    assert_eq!(manager.engine().instantiation_order(), vec![(7, 10)]);
    assert!(manager.get_disabled(None).all(|c| !c.is_instantiated()));
    Ok(())
}

#[test]
fn finalize_failure_is_fatal() -> TestResult {
    let engine = RecordingInstantiator::new().fail_on(Gid(3), Gid(10));
    let (_dir, mut manager) = built_manager(&[(10, &[3, 7])], &[10], engine)?;
    let err = manager.finalize(1).unwrap_err();
    assert!(matches!(err, ConnectionError::Instantiation { .. }));
    Ok(())
}

#[test]
fn placements_are_frozen_after_finalize() -> TestResult {
    let (_dir, mut manager) = built_manager(&[(10, &[3])], &[10], RecordingInstantiator::new())?;
    manager.finalize(1)?;
    let err = manager.connect_all(1.0, None, None).unwrap_err();
    assert!(matches!(
        err,
        ConnectionError::Index {
            source: IndexError::AlreadyInstantiated { .. }
        }
    ));
    Ok(())
}

#[test]
fn toggling_instantiated_records_reaches_the_engine() -> TestResult {
    let (_dir, mut manager) = built_manager(&[(10, &[3])], &[10], RecordingInstantiator::new())?;
    manager.finalize(1)?;
    let handle = manager.engine().instantiated[0].handle;
    let all = PopulationSelector::All;

    manager.disable(Gid(3), Gid(10), false, &all)?;
    manager.reenable(Gid(3), Gid(10), &all)?;
    assert_eq!(manager.engine().activity, vec![(handle, false, false), (handle, true, false)]);
    Ok(())
}
