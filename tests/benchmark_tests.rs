//! Performance benchmarks for the hot paths of the engine.

use client::reconcile::ClientView;
use server::game::GridGame;
use shared::{decode, encode, now_ms, CellCoord, Datagram, Grid, Payload, SnapshotChunk, CELL_COUNT};
use std::time::Instant;

fn bundle_datagram() -> Datagram {
    let mut grid = Grid::new();
    for cell in 0..50u16 {
        grid.claim(cell, (cell % 4 + 1) as u8);
    }
    let chunks = (0..3)
        .map(|i| SnapshotChunk {
            id: 10 - i,
            finished: false,
            grid: grid.clone(),
        })
        .collect();
    Datagram {
        snapshot_id: 10,
        sequence: 10,
        timestamp_ms: now_ms(),
        payload: Payload::Snapshot(chunks),
    }
}

/// Benchmarks encoding a full 3-snapshot redundancy bundle
#[test]
fn benchmark_bundle_encode() {
    let dgram = bundle_datagram();

    let iterations = 10_000;
    let start = Instant::now();

    for _ in 0..iterations {
        let _ = encode(&dgram).unwrap();
    }

    let duration = start.elapsed();
    println!(
        "Bundle encode: {} iterations in {:?} ({:.2} μs/iter)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    // encoding a bundle at 20Hz is nothing; 10k in a second is the floor
    assert!(duration.as_millis() < 1000);
}

/// Benchmarks decode + checksum validation of a bundle
#[test]
fn benchmark_bundle_decode() {
    let bytes = encode(&bundle_datagram()).unwrap();

    let iterations = 10_000;
    let start = Instant::now();

    for _ in 0..iterations {
        let _ = decode(&bytes).unwrap();
    }

    let duration = start.elapsed();
    println!(
        "Bundle decode: {} iterations in {:?} ({:.2} μs/iter)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    assert!(duration.as_millis() < 1000);
}

/// Benchmarks claim resolution throughput on the authoritative machine
#[test]
fn benchmark_claim_resolution() {
    let iterations = 1_000;
    let start = Instant::now();

    for _ in 0..iterations {
        let mut game = GridGame::new();
        for cell_id in 0..CELL_COUNT as u16 {
            let cell = CellCoord::from_cell_id(cell_id).unwrap();
            let _ = game.claim((cell_id % 3 + 1) as u8, cell);
            // losing claims are part of the workload
            let _ = game.claim(4, cell);
        }
    }

    let duration = start.elapsed();
    println!(
        "Claim resolution: {} full games in {:?} ({:.2} μs/game)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    assert!(duration.as_millis() < 1000);
}

/// Benchmarks reconciliation of redundant bundles on the client
#[test]
fn benchmark_bundle_apply() {
    let chunks: Vec<SnapshotChunk> = (0..3)
        .map(|i| SnapshotChunk {
            id: 3 - i,
            finished: false,
            grid: Grid::new(),
        })
        .collect();

    let iterations = 10_000;
    let start = Instant::now();

    for _ in 0..iterations {
        let mut view = ClientView::new();
        let _ = view.apply_bundle(&chunks);
        // redundant second application must stay cheap too
        let _ = view.apply_bundle(&chunks);
    }

    let duration = start.elapsed();
    println!(
        "Bundle apply: {} iterations in {:?} ({:.2} μs/iter)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    assert!(duration.as_millis() < 1000);
}
