// File: demos/torrent_demo.rs
//
// Releases two independent resources through one shared barrier and prints
// the aggregated result map plus a JSON artifact.
//
// Run with: cargo run --example torrent_demo

use flood_harness::prelude::*;

struct Counter;

fn main() {
    env_logger::init();

    let mut torrent = TorrentBuilder::of::<Counter>()
        .with_flood_gate("print", || -> Option<i64> {
            println!("print resource invoked");
            None
        })
        .with_flood_gate("add10", || Some(10i64))
        .build()
        .unwrap();

    torrent.open().unwrap();
    let results = torrent.flood().unwrap();

    for (name, values) in &results {
        println!("{}: {} result(s)", name, values.len());
    }

    let summary = torrent.summary();
    let dir = std::env::temp_dir().join("flood-harness-demo");
    match write_artifact(&dir, torrent.coordinator(), &summary) {
        Ok(path) => println!("artifact: {}", path.display()),
        Err(err) => eprintln!("artifact write failed: {:#}", err),
    }
}
