//! Loss tolerance without acknowledgments: snapshot bundling and
//! duplicate detection.
//!
//! Snapshots ride a bounded history so every broadcast carries the current
//! state plus the previous K-1 states in one datagram; a receiver that lost
//! the last K-1 broadcasts recovers from any single delivery. Events are
//! sent twice and deduplicated by sequence number on receipt.

use crate::protocol::SnapshotChunk;
use std::collections::VecDeque;

/// Default number of snapshots bundled per broadcast.
pub const REDUNDANCY: usize = 3;
/// Gap between the two copies of a double-sent message.
pub const DOUBLE_SEND_GAP_MS: u64 = 1;

/// Bounded history of the most recent snapshots, newest first.
#[derive(Debug)]
pub struct SnapshotHistory {
    chunks: VecDeque<SnapshotChunk>,
    capacity: usize,
}

impl SnapshotHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            chunks: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    /// Records the newest snapshot, dropping the oldest past capacity.
    pub fn push(&mut self, chunk: SnapshotChunk) {
        self.chunks.push_front(chunk);
        while self.chunks.len() > self.capacity {
            self.chunks.pop_back();
        }
    }

    /// The redundancy bundle for the next broadcast, newest first.
    pub fn bundle(&self) -> Vec<SnapshotChunk> {
        self.chunks.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

/// Drops the second copy of a double-sent message.
///
/// Both copies of one logical message carry the same sequence number, so a
/// repeat of the last accepted sequence is a duplicate and is ignored. Any
/// other value is accepted; sequences only ever move forward (modulo wrap),
/// so no further ordering check is needed.
#[derive(Debug, Default)]
pub struct SequenceGate {
    last: Option<u32>,
}

impl SequenceGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if this sequence has not been seen yet.
    pub fn accept(&mut self, sequence: u32) -> bool {
        if self.last == Some(sequence) {
            return false;
        }
        self.last = Some(sequence);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Grid;

    fn chunk(id: u32) -> SnapshotChunk {
        SnapshotChunk {
            id,
            finished: false,
            grid: Grid::new(),
        }
    }

    #[test]
    fn test_history_keeps_newest_first() {
        let mut history = SnapshotHistory::new(3);
        assert!(history.is_empty());

        for id in 1..=5 {
            history.push(chunk(id));
        }

        let bundle = history.bundle();
        let ids: Vec<u32> = bundle.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![5, 4, 3]);
        assert_eq!(history.len(), 3);
    }

    #[test]
    fn test_history_partial_fill() {
        let mut history = SnapshotHistory::new(3);
        history.push(chunk(1));
        assert_eq!(history.bundle().len(), 1);
        history.push(chunk(2));
        assert_eq!(history.bundle().len(), 2);
    }

    #[test]
    fn test_gate_drops_exact_duplicate() {
        let mut gate = SequenceGate::new();
        assert!(gate.accept(10));
        assert!(!gate.accept(10));
        assert!(gate.accept(11));
        assert!(!gate.accept(11));
    }

    #[test]
    fn test_gate_accepts_wraparound() {
        let mut gate = SequenceGate::new();
        assert!(gate.accept(u32::MAX));
        assert!(gate.accept(0));
    }
}
