//! Fixed 10x10 ownership grid shared by server and clients.
//!
//! Owners are single bytes; `0` means unclaimed. The server holds the only
//! authoritative [`Grid`]; clients hold advisory copies derived from
//! snapshots. A cell is claimed at most once and never reverts.

/// Grid side length. The protocol is fixed to a bounded square grid.
pub const GRID_N: usize = 10;
/// Total number of cells.
pub const CELL_COUNT: usize = GRID_N * GRID_N;
/// Owner byte marking an unclaimed cell.
pub const UNCLAIMED: u8 = 0;

/// A (row, column) coordinate inside the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellCoord {
    pub row: u8,
    pub col: u8,
}

impl CellCoord {
    /// Builds a coordinate, rejecting out-of-range rows or columns.
    pub fn new(row: u8, col: u8) -> Option<Self> {
        if (row as usize) < GRID_N && (col as usize) < GRID_N {
            Some(Self { row, col })
        } else {
            None
        }
    }

    /// Row-major cell index as carried on the wire.
    pub fn cell_id(&self) -> u16 {
        self.row as u16 * GRID_N as u16 + self.col as u16
    }

    /// Inverse of [`CellCoord::cell_id`]; `None` for out-of-range ids.
    pub fn from_cell_id(cell_id: u16) -> Option<Self> {
        if (cell_id as usize) < CELL_COUNT {
            Some(Self {
                row: (cell_id / GRID_N as u16) as u8,
                col: (cell_id % GRID_N as u16) as u8,
            })
        } else {
            None
        }
    }
}

/// Full ownership state of the grid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grid {
    owners: [u8; CELL_COUNT],
}

impl Default for Grid {
    fn default() -> Self {
        Self::new()
    }
}

impl Grid {
    /// An entirely unclaimed grid.
    pub fn new() -> Self {
        Self {
            owners: [UNCLAIMED; CELL_COUNT],
        }
    }

    /// Rebuilds a grid from a wire-format owner array.
    pub fn from_owners(owners: [u8; CELL_COUNT]) -> Self {
        Self { owners }
    }

    /// Raw owner bytes in row-major order, as sent on the wire.
    pub fn owners(&self) -> &[u8; CELL_COUNT] {
        &self.owners
    }

    /// Owner of a cell, or `None` for out-of-range ids.
    pub fn owner(&self, cell_id: u16) -> Option<u8> {
        self.owners.get(cell_id as usize).copied()
    }

    /// Attempts to claim a cell for a player.
    ///
    /// Succeeds only when the cell is in range, currently unclaimed, and the
    /// player id is not the unclaimed marker. Returns whether the claim took;
    /// a `false` result leaves the grid untouched.
    pub fn claim(&mut self, cell_id: u16, player_id: u8) -> bool {
        if player_id == UNCLAIMED {
            return false;
        }
        match self.owners.get_mut(cell_id as usize) {
            Some(owner) if *owner == UNCLAIMED => {
                *owner = player_id;
                true
            }
            _ => false,
        }
    }

    /// Number of cells currently claimed by anyone.
    pub fn claimed_count(&self) -> usize {
        self.owners.iter().filter(|&&o| o != UNCLAIMED).count()
    }

    /// Number of cells owned by a specific player.
    pub fn count_for(&self, player_id: u8) -> usize {
        self.owners.iter().filter(|&&o| o == player_id).count()
    }

    /// True once every cell has an owner.
    pub fn is_full(&self) -> bool {
        self.owners.iter().all(|&o| o != UNCLAIMED)
    }

    /// The player holding the most cells, with their cell count.
    ///
    /// Ties go to the lowest player id. `None` while the grid is empty.
    pub fn leader(&self) -> Option<(u8, u8)> {
        let mut counts = [0u8; 256];
        for &owner in &self.owners {
            if owner != UNCLAIMED {
                counts[owner as usize] += 1;
            }
        }
        counts
            .iter()
            .enumerate()
            .skip(1)
            .filter(|(_, &count)| count > 0)
            .max_by(|(id_a, count_a), (id_b, count_b)| {
                count_a.cmp(count_b).then(id_b.cmp(id_a))
            })
            .map(|(id, &count)| (id as u8, count))
    }
}
