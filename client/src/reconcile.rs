//! Client-side reconciliation: converging a local grid view on the
//! server's truth from a lossy, duplicated, out-of-order datagram stream.
//!
//! The rule is apply-if-newer: a snapshot is applied only when its id is
//! strictly greater than the highest id already applied, in increasing
//! order within a redundancy bundle. That makes application idempotent
//! under duplication and insensitive to delivery order. There is no
//! client-side prediction: a claim shows up locally only after the server
//! confirms it, trading input latency for a view that never retracts.

use shared::{CellEvent, EventKind, GameOutcome, Grid, SnapshotChunk};

/// Advisory copy of the authoritative grid, plus reconciliation bookkeeping.
///
/// Owned and mutated exclusively by the network-receive path; the render
/// path reads clones.
#[derive(Debug, Clone)]
pub struct ClientView {
    grid: Grid,
    last_applied: u32,
    finished: bool,
    winner: Option<u8>,
}

impl Default for ClientView {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientView {
    pub fn new() -> Self {
        Self {
            grid: Grid::new(),
            last_applied: 0,
            finished: false,
            winner: None,
        }
    }

    /// Applies a redundancy bundle, returning the newly applied snapshot
    /// ids in the order they were applied (ascending).
    ///
    /// Chunks with ids at or below the high-water mark are skipped, so
    /// feeding the same bundle twice (or bundles overlapping previously
    /// seen ones) is a no-op beyond the first application.
    pub fn apply_bundle(&mut self, chunks: &[SnapshotChunk]) -> Vec<u32> {
        if self.finished {
            return Vec::new();
        }

        let mut fresh: Vec<&SnapshotChunk> = chunks
            .iter()
            .filter(|c| c.id > self.last_applied)
            .collect();
        fresh.sort_by_key(|c| c.id);

        let mut applied = Vec::with_capacity(fresh.len());
        for chunk in fresh {
            self.grid = chunk.grid.clone();
            self.last_applied = chunk.id;
            applied.push(chunk.id);
            if chunk.finished {
                self.finished = true;
                self.winner = self.grid.leader().map(|(player, _)| player);
                break;
            }
        }
        applied
    }

    /// Applies an authoritative claim announcement ahead of the next
    /// snapshot. Cells never revert, so setting the owner early is safe
    /// and a duplicate delivery changes nothing.
    pub fn apply_event(&mut self, event: &CellEvent) -> bool {
        if self.finished || event.kind != EventKind::CellClaimed {
            return false;
        }
        self.grid.claim(event.cell_id, event.player_id)
    }

    /// Freezes the view on the terminal outcome. Idempotent.
    pub fn apply_game_over(&mut self, outcome: &GameOutcome) {
        self.finished = true;
        self.winner = Some(outcome.winner_id);
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn last_applied(&self) -> u32 {
        self.last_applied
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn winner(&self) -> Option<u8> {
        self.winner
    }
}

/// Exponentially smoothed latency and jitter over applied snapshots.
///
/// Raw per-datagram latency (receive wall-clock minus the header
/// timestamp) is noisy under loss and scheduling jitter; the smoothing
/// factor `alpha` in (0, 1] controls how quickly the estimate tracks it.
#[derive(Debug, Clone)]
pub struct LatencyTracker {
    alpha: f64,
    last_latency_ms: Option<f64>,
    smoothed_latency_ms: Option<f64>,
    smoothed_jitter_ms: f64,
}

impl LatencyTracker {
    pub fn new(alpha: f64) -> Self {
        Self {
            alpha: alpha.clamp(0.01, 1.0),
            last_latency_ms: None,
            smoothed_latency_ms: None,
            smoothed_jitter_ms: 0.0,
        }
    }

    /// Feeds one latency sample, returning the smoothed (latency, jitter).
    pub fn observe(&mut self, latency_ms: f64) -> (f64, f64) {
        let jitter = match self.last_latency_ms {
            Some(last) => (latency_ms - last).abs(),
            None => 0.0,
        };
        self.last_latency_ms = Some(latency_ms);

        let smoothed = match self.smoothed_latency_ms {
            Some(prev) => self.alpha * latency_ms + (1.0 - self.alpha) * prev,
            None => latency_ms,
        };
        self.smoothed_latency_ms = Some(smoothed);
        self.smoothed_jitter_ms = self.alpha * jitter + (1.0 - self.alpha) * self.smoothed_jitter_ms;

        (smoothed, self.smoothed_jitter_ms)
    }

    pub fn latency_ms(&self) -> Option<f64> {
        self.smoothed_latency_ms
    }

    pub fn jitter_ms(&self) -> f64 {
        self.smoothed_jitter_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use shared::CELL_COUNT;

    fn chunk(id: u32, owner_of_cell_zero: u8) -> SnapshotChunk {
        let mut grid = Grid::new();
        if owner_of_cell_zero != 0 {
            grid.claim(0, owner_of_cell_zero);
        }
        SnapshotChunk {
            id,
            finished: false,
            grid,
        }
    }

    #[test]
    fn test_fresh_snapshot_applies() {
        let mut view = ClientView::new();
        let applied = view.apply_bundle(&[chunk(1, 0)]);
        assert_eq!(applied, vec![1]);
        assert_eq!(view.last_applied(), 1);
        assert_eq!(view.grid().claimed_count(), 0);
    }

    #[test]
    fn test_duplicate_application_is_idempotent() {
        let mut view = ClientView::new();
        let bundle = [chunk(2, 1), chunk(1, 0)];

        assert_eq!(view.apply_bundle(&bundle), vec![1, 2]);
        let grid_after_first = view.grid().clone();

        assert_eq!(view.apply_bundle(&bundle), Vec::<u32>::new());
        assert_eq!(view.grid(), &grid_after_first);
        assert_eq!(view.last_applied(), 2);
    }

    #[test]
    fn test_overlapping_bundle_applies_only_newer() {
        let mut view = ClientView::new();
        view.apply_bundle(&[chunk(8, 0)]);

        // bundle {9, 8, 7} after 8 was applied: only 9 is new
        let applied = view.apply_bundle(&[chunk(9, 1), chunk(8, 0), chunk(7, 0)]);
        assert_eq!(applied, vec![9]);
        assert_eq!(view.last_applied(), 9);
        assert_eq!(view.grid().owner(0), Some(1));
    }

    #[test]
    fn test_stale_bundle_is_skipped_entirely() {
        let mut view = ClientView::new();
        view.apply_bundle(&[chunk(5, 2)]);
        let applied = view.apply_bundle(&[chunk(4, 1), chunk(3, 1)]);
        assert!(applied.is_empty());
        assert_eq!(view.grid().owner(0), Some(2));
    }

    #[test]
    fn test_event_sets_owner_early_and_never_reverts() {
        let mut view = ClientView::new();
        let event = CellEvent {
            player_id: 3,
            kind: EventKind::CellClaimed,
            cell_id: 42,
            event_ts: 1000,
        };

        assert!(view.apply_event(&event));
        assert_eq!(view.grid().owner(42), Some(3));
        // duplicate delivery of the double-send is a no-op
        assert!(!view.apply_event(&event));
        assert_eq!(view.grid().owner(42), Some(3));
    }

    #[test]
    fn test_acquire_requests_are_not_applied() {
        let mut view = ClientView::new();
        let request = CellEvent {
            player_id: 3,
            kind: EventKind::AcquireRequest,
            cell_id: 42,
            event_ts: 1000,
        };
        assert!(!view.apply_event(&request));
        assert_eq!(view.grid().owner(42), Some(0));
    }

    #[test]
    fn test_game_over_freezes_view() {
        let mut view = ClientView::new();
        view.apply_bundle(&[chunk(1, 0)]);
        view.apply_game_over(&GameOutcome {
            winner_id: 2,
            winner_cells: 55,
        });

        assert!(view.is_finished());
        assert_eq!(view.winner(), Some(2));

        // nothing mutates a finished view
        assert!(view.apply_bundle(&[chunk(2, 1)]).is_empty());
        assert!(!view.apply_event(&CellEvent {
            player_id: 1,
            kind: EventKind::CellClaimed,
            cell_id: 0,
            event_ts: 0,
        }));
        assert_eq!(view.grid().owner(0), Some(0));
    }

    #[test]
    fn test_terminal_snapshot_finishes_view() {
        let mut grid = Grid::new();
        for cell in 0..CELL_COUNT as u16 {
            grid.claim(cell, if cell < 70 { 1 } else { 2 });
        }
        let terminal = SnapshotChunk {
            id: 10,
            finished: true,
            grid,
        };

        let mut view = ClientView::new();
        view.apply_bundle(&[terminal]);
        assert!(view.is_finished());
        assert_eq!(view.winner(), Some(1));
    }

    #[test]
    fn test_latency_smoothing() {
        let mut tracker = LatencyTracker::new(0.5);

        let (latency, jitter) = tracker.observe(100.0);
        assert_approx_eq!(latency, 100.0, 1e-9);
        assert_approx_eq!(jitter, 0.0, 1e-9);

        // raw sample 200, raw jitter 100, both pulled halfway by alpha
        let (latency, jitter) = tracker.observe(200.0);
        assert_approx_eq!(latency, 150.0, 1e-9);
        assert_approx_eq!(jitter, 50.0, 1e-9);

        let (latency, _) = tracker.observe(150.0);
        assert_approx_eq!(latency, 150.0, 1e-9);
    }
}
