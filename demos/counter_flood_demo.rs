// File: demos/counter_flood_demo.rs
//
// Floods a check-then-act counter and an atomic counter with the same
// worker/iteration budget, then prints both verdicts.
//
// Run with: cargo run --example counter_flood_demo

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

use flood_harness::prelude::*;

struct Counter;

fn main() {
    env_logger::init();

    // Non-atomic discipline: read, yield, write back, verify.
    let racy_cell = Arc::new(AtomicU64::new(0));
    let racy = {
        let cell = Arc::clone(&racy_cell);
        move || {
            let seen = cell.load(Ordering::SeqCst);
            thread::yield_now();
            cell.store(seen + 1, Ordering::SeqCst);
            assert_eq!(cell.load(Ordering::SeqCst), seen + 1, "lost update");
            seen + 1
        }
    };

    let mut gate = Floodgate::new::<Counter, _>(Some("racy"), 8, 50, racy).unwrap();
    gate.open().unwrap();
    let results = gate.flood().unwrap();
    println!("{}", gate);
    println!(
        "  racy counter: {} of 8 workers produced a value, target {}",
        results.len(),
        if gate.target().is_unstable() { "UNSTABLE" } else { "STABLE" }
    );

    // Same flood against a properly atomic counter.
    let atomic_cell = Arc::new(AtomicU64::new(0));
    let atomic = {
        let cell = Arc::clone(&atomic_cell);
        move || cell.fetch_add(1, Ordering::SeqCst) + 1
    };

    let mut gate = Floodgate::new::<Counter, _>(Some("atomic"), 8, 50, atomic).unwrap();
    gate.open().unwrap();
    let results = gate.flood().unwrap();
    println!("{}", gate);
    println!(
        "  atomic counter: {} of 8 workers produced a value, final count {}",
        results.len(),
        atomic_cell.load(Ordering::SeqCst)
    );
}
