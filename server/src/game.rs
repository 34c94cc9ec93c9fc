//! Authoritative grid state machine.
//!
//! [`GridGame`] owns the only canonical copy of the ownership grid. Claims
//! are resolved strictly in the order they reach this module (network
//! arrival order is decision order), first claim on an unclaimed cell wins
//! permanently, and the claim that fills the last cell flips the game to
//! `Finished` exactly once. All access is funneled through the single
//! server task that owns this struct, so no internal locking is needed.

use log::info;
use shared::{CellCoord, GameOutcome, Grid, SnapshotChunk};

/// Lifecycle of one game.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Running,
    Finished { winner: u8 },
}

/// Result of one claim request, in arrival order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// The requester now owns the cell. `finished` is set on the claim
    /// that filled the last cell.
    Accepted { finished: bool },
    /// The cell was already owned; the request loses silently.
    AlreadyOwned(u8),
    /// The game is over; no further claims are decided.
    GameOver,
}

/// Canonical game state: grid, snapshot counter, and phase.
#[derive(Debug)]
pub struct GridGame {
    grid: Grid,
    phase: Phase,
    next_snapshot_id: u32,
}

impl Default for GridGame {
    fn default() -> Self {
        Self::new()
    }
}

impl GridGame {
    pub fn new() -> Self {
        Self {
            grid: Grid::new(),
            phase: Phase::Running,
            // snapshot ids are strictly positive so a fresh client
            // (last applied id 0) accepts the first broadcast
            next_snapshot_id: 1,
        }
    }

    /// Decides a claim for `player_id` on `cell`.
    ///
    /// First-come-first-served, no rollback: the decision is permanent the
    /// moment it is made. Rejections are not errors, just losses.
    pub fn claim(&mut self, player_id: u8, cell: CellCoord) -> ClaimOutcome {
        if matches!(self.phase, Phase::Finished { .. }) {
            return ClaimOutcome::GameOver;
        }

        let cell_id = cell.cell_id();
        if !self.grid.claim(cell_id, player_id) {
            // in-range by construction of CellCoord, so the only way to
            // fail is an existing owner
            let owner = self.grid.owner(cell_id).unwrap_or(shared::UNCLAIMED);
            return ClaimOutcome::AlreadyOwned(owner);
        }

        if self.grid.is_full() {
            let (winner, cells) = self
                .grid
                .leader()
                .expect("full grid always has a leader");
            self.phase = Phase::Finished { winner };
            info!(
                "game finished: player {} wins with {} cells",
                winner, cells
            );
            ClaimOutcome::Accepted { finished: true }
        } else {
            ClaimOutcome::Accepted { finished: false }
        }
    }

    /// Produces the next immutable snapshot.
    ///
    /// Pure read of the grid plus assignment of the next strictly
    /// increasing identifier; nothing else changes.
    pub fn snapshot(&mut self) -> SnapshotChunk {
        let id = self.next_snapshot_id;
        self.next_snapshot_id = self.next_snapshot_id.wrapping_add(1);
        SnapshotChunk {
            id,
            finished: matches!(self.phase, Phase::Finished { .. }),
            grid: self.grid.clone(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.phase, Phase::Finished { .. })
    }

    /// Terminal outcome, available once the phase is `Finished`.
    pub fn outcome(&self) -> Option<GameOutcome> {
        match self.phase {
            Phase::Running => None,
            Phase::Finished { winner } => Some(GameOutcome {
                winner_id: winner,
                winner_cells: self.grid.count_for(winner) as u8,
            }),
        }
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::CELL_COUNT;

    fn coord(cell_id: u16) -> CellCoord {
        CellCoord::from_cell_id(cell_id).unwrap()
    }

    #[test]
    fn test_first_claim_wins() {
        let mut game = GridGame::new();
        assert_eq!(
            game.claim(1, coord(34)),
            ClaimOutcome::Accepted { finished: false }
        );
        assert_eq!(game.claim(2, coord(34)), ClaimOutcome::AlreadyOwned(1));
        assert_eq!(game.grid().owner(34), Some(1));
    }

    #[test]
    fn test_claims_never_revert() {
        let mut game = GridGame::new();
        game.claim(1, coord(0));
        for player in 2..=5 {
            game.claim(player, coord(0));
        }
        assert_eq!(game.grid().owner(0), Some(1));
    }

    #[test]
    fn test_snapshot_ids_strictly_increase() {
        let mut game = GridGame::new();
        let a = game.snapshot();
        let b = game.snapshot();
        assert_eq!(a.id, 1);
        assert_eq!(b.id, 2);
        // producing snapshots does not touch the grid
        assert_eq!(a.grid, b.grid);
    }

    #[test]
    fn test_snapshot_is_immutable_copy() {
        let mut game = GridGame::new();
        let before = game.snapshot();
        game.claim(1, coord(7));
        let after = game.snapshot();
        assert_eq!(before.grid.owner(7), Some(0));
        assert_eq!(after.grid.owner(7), Some(1));
    }

    #[test]
    fn test_last_cell_finishes_exactly_once() {
        let mut game = GridGame::new();
        for cell in 0..(CELL_COUNT - 1) as u16 {
            assert_eq!(
                game.claim(1, coord(cell)),
                ClaimOutcome::Accepted { finished: false }
            );
        }
        assert!(!game.is_finished());

        assert_eq!(
            game.claim(2, coord((CELL_COUNT - 1) as u16)),
            ClaimOutcome::Accepted { finished: true }
        );
        assert!(game.is_finished());
        assert_eq!(game.phase(), Phase::Finished { winner: 1 });

        // any later claim is refused without a second transition
        assert_eq!(game.claim(3, coord(0)), ClaimOutcome::GameOver);
        assert_eq!(game.phase(), Phase::Finished { winner: 1 });
    }

    #[test]
    fn test_outcome_reports_winner_tally() {
        let mut game = GridGame::new();
        assert_eq!(game.outcome(), None);

        for cell in 0..CELL_COUNT as u16 {
            let player = if cell < 60 { 1 } else { 2 };
            game.claim(player, coord(cell));
        }

        let outcome = game.outcome().unwrap();
        assert_eq!(outcome.winner_id, 1);
        assert_eq!(outcome.winner_cells, 60);
    }

    #[test]
    fn test_finished_snapshot_carries_terminal_flag() {
        let mut game = GridGame::new();
        for cell in 0..CELL_COUNT as u16 {
            game.claim(1, coord(cell));
        }
        assert!(game.snapshot().finished);
    }
}
