// File: tests/torrent_integration_test.rs
//
// Torrent integration tests: several independent resources flooded in
// unison through one shared barrier, results aggregated per target name.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use flood_harness::prelude::*;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

struct Counter;

#[test]
fn torrent_print_and_add10_scenario() {
    init_logging();

    // Heterogeneous resources share one value type: a Runnable-style
    // closure contributes None, a Supplier-style closure contributes Some.
    let mut torrent = TorrentBuilder::of::<Counter>()
        .with_flood_gate("print", || -> Option<i64> {
            println!("print resource invoked");
            None
        })
        .with_flood_gate("add10", || Some(10i64))
        .build()
        .unwrap();

    assert_eq!(torrent.total_threads(), 10); // 2 gates x default 5
    torrent.open().unwrap();
    let results = torrent.flood().unwrap();

    assert_eq!(results.len(), 2);

    let add10 = &results["Counter[add10]"];
    assert!(add10.len() <= 5);
    assert!(add10.iter().all(|value| *value == Some(10)));

    let print = &results["Counter[print]"];
    assert!(print.len() <= 5);
    assert!(print.iter().all(Option::is_none));

    assert!(torrent.unstable_targets().is_empty());
    assert_eq!(torrent.state(), SessionState::Flooded);
}

#[test]
fn torrent_totals_and_result_keys_follow_children() {
    init_logging();

    let mut torrent = TorrentBuilder::of::<Counter>()
        .with_default_iterations(1)
        .with_flood_gate_configured("one", Some(1), None, || 1u64)
        .with_flood_gate_configured("two", Some(2), None, || 2u64)
        .with_flood_gate_configured("four", Some(4), None, || 4u64)
        .build()
        .unwrap();

    assert_eq!(torrent.total_threads(), 1 + 2 + 4);

    torrent.open().unwrap();
    let results = torrent.flood().unwrap();

    assert_eq!(results.len(), 3);
    assert_eq!(results["Counter[one]"].len(), 1);
    assert_eq!(results["Counter[two]"].len(), 2);
    assert_eq!(results["Counter[four]"].len(), 4);
}

#[test]
fn torrent_amplifies_contention_on_a_shared_cell() {
    init_logging();

    let cell = Arc::new(AtomicU64::new(0));
    let bump = |cell: &Arc<AtomicU64>| {
        let cell = Arc::clone(cell);
        move || cell.fetch_add(1, Ordering::SeqCst)
    };

    let mut torrent = TorrentBuilder::of::<Counter>()
        .with_default_threads(3)
        .with_default_iterations(4)
        .with_flood_gate("left", bump(&cell))
        .with_flood_gate("right", bump(&cell))
        .build()
        .unwrap();

    torrent.open().unwrap();
    let results = torrent.flood().unwrap();

    // 2 gates x 3 threads x 4 iterations, every increment accounted for.
    assert_eq!(cell.load(Ordering::SeqCst), 24);
    assert_eq!(results["Counter[left]"].len(), 3);
    assert_eq!(results["Counter[right]"].len(), 3);
}

#[test]
fn torrent_read_only_gate_view_after_flooding() {
    init_logging();

    let mut torrent = TorrentBuilder::of::<Counter>()
        .with_default_threads(1)
        .with_default_iterations(1)
        .with_flood_gate("solo", || 42u64)
        .build()
        .unwrap();

    torrent.open().unwrap();
    torrent.flood().unwrap();

    let gates = torrent.gates();
    assert_eq!(gates.len(), 1);
    assert_eq!(gates[0].state(), SessionState::Flooded);
    assert!(gates[0].target().name().contains("solo"));
    assert_eq!(gates[0].threads(), 1);
}

#[test]
fn torrent_summary_reports_unstable_children() {
    init_logging();

    let mut torrent = TorrentBuilder::of::<Counter>()
        .with_default_threads(2)
        .with_default_iterations(2)
        .with_flood_gate("steady", || 1u64)
        .with_flood_gate("shaky", || -> u64 { panic!("crumbles under load") })
        .build()
        .unwrap();

    torrent.open().unwrap();
    let results = torrent.flood().unwrap();

    assert_eq!(results.len(), 2);
    assert_eq!(torrent.unstable_targets(), vec!["Counter[shaky]".to_string()]);

    let summary = torrent.summary();
    assert_eq!(summary.state, "FLOODED");
    assert_eq!(summary.total_threads, 4);
    assert_eq!(summary.unstable_targets, vec!["Counter[shaky]".to_string()]);
    assert_eq!(summary.gates.len(), 2);

    let dir = tempfile::tempdir().unwrap();
    let path = write_artifact(dir.path(), torrent.coordinator(), &summary).unwrap();
    assert!(path.exists());
}
