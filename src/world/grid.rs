use serde::{Deserialize, Serialize};

use crate::simulation::fault::TaskFault;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Cell {
    Open,
    Blocked,
}

impl Cell {
    pub fn glyph(self) -> char {
        match self {
            Cell::Open => '.',
            Cell::Blocked => '#',
        }
    }
}

/// Square grid of open/blocked cells, stored row-major as `rows[y][x]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grid {
    size: i32,
    rows: Vec<Vec<Cell>>,
}

impl Grid {
    /// Build a fresh grid from the seed pattern. `size` must be positive.
    pub fn generate(size: i32, seed: i32) -> Result<Grid, TaskFault> {
        let mut grid = Grid {
            size,
            rows: Vec::new(),
        };
        grid.regenerate(seed)?;
        Ok(grid)
    }

    /// Every cell open. Handy for harnesses that want walls out of the way.
    pub fn open(size: i32) -> Grid {
        let n = size.max(0) as usize;
        Grid {
            size,
            rows: vec![vec![Cell::Open; n]; n],
        }
    }

    /// Regenerate in place: cell (x, y) is blocked iff
    /// `(x + y + seed % 7) % 5 == 0`, with both corners forced open.
    pub fn regenerate(&mut self, seed: i32) -> Result<(), TaskFault> {
        let n = self.size.max(0) as usize;
        let shift = i64::from(seed % 7);
        self.rows = (0..n)
            .map(|y| {
                (0..n)
                    .map(|x| {
                        if (x as i64 + y as i64 + shift) % 5 == 0 {
                            Cell::Blocked
                        } else {
                            Cell::Open
                        }
                    })
                    .collect()
            })
            .collect();
        self.set(0, 0, Cell::Open)?;
        self.set(i64::from(self.size) - 1, i64::from(self.size) - 1, Cell::Open)?;
        Ok(())
    }

    /// Reverse the column order of every row. Applying it twice is a no-op.
    pub fn reverse_rows(&mut self) {
        for row in &mut self.rows {
            row.reverse();
        }
    }

    pub fn size(&self) -> i32 {
        self.size
    }

    /// The cell at (x, y), or `None` off the grid.
    pub fn cell(&self, x: i64, y: i64) -> Option<Cell> {
        if x < 0 || y < 0 {
            return None;
        }
        self.rows.get(y as usize)?.get(x as usize).copied()
    }

    pub fn is_blocked(&self, x: i64, y: i64) -> bool {
        self.cell(x, y) == Some(Cell::Blocked)
    }

    pub fn set(&mut self, x: i64, y: i64, cell: Cell) -> Result<(), TaskFault> {
        let fault = TaskFault::OutOfBounds {
            x,
            y,
            size: self.size,
        };
        if x < 0 || y < 0 {
            return Err(fault);
        }
        let slot = self
            .rows
            .get_mut(y as usize)
            .and_then(|row| row.get_mut(x as usize))
            .ok_or(fault)?;
        *slot = cell;
        Ok(())
    }

    pub fn blocked_count(&self) -> usize {
        self.rows
            .iter()
            .flatten()
            .filter(|c| **c == Cell::Blocked)
            .count()
    }

    pub fn render(&self) -> String {
        self.rows
            .iter()
            .map(|row| row.iter().map(|c| c.glyph()).collect::<String>())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corners_open_after_generation() {
        for seed in [-13, -1, 0, 1, 3, 6, 7, 123_456] {
            for size in [1, 2, 5, 12] {
                let grid = Grid::generate(size, seed).unwrap();
                let last = i64::from(size) - 1;
                assert_eq!(grid.cell(0, 0), Some(Cell::Open), "seed {seed} size {size}");
                assert_eq!(grid.cell(last, last), Some(Cell::Open), "seed {seed} size {size}");
            }
        }
    }

    #[test]
    fn pattern_follows_seed_shift() {
        // seed % 7 == 3, so (x + y + 3) % 5 == 0 marks x + y == 2, 7, ...
        let grid = Grid::generate(5, 10).unwrap();
        assert_eq!(grid.cell(2, 0), Some(Cell::Blocked));
        assert_eq!(grid.cell(1, 1), Some(Cell::Blocked));
        assert_eq!(grid.cell(3, 4), Some(Cell::Blocked));
        assert_eq!(grid.cell(1, 0), Some(Cell::Open));
        assert_eq!(grid.blocked_count(), 5);
    }

    #[test]
    fn reverse_rows_is_an_involution() {
        let original = Grid::generate(7, 4).unwrap();
        let mut grid = original.clone();
        grid.reverse_rows();
        assert_ne!(grid, original);
        assert_eq!(grid.cell(0, 0), original.cell(6, 0));
        grid.reverse_rows();
        assert_eq!(grid, original);
    }

    #[test]
    fn regenerate_restores_pattern_after_flip() {
        let mut grid = Grid::generate(6, 2).unwrap();
        let fresh = grid.clone();
        grid.reverse_rows();
        grid.regenerate(2).unwrap();
        assert_eq!(grid, fresh);
    }

    #[test]
    fn off_grid_reads_are_none() {
        let grid = Grid::open(3);
        assert_eq!(grid.cell(-1, 0), None);
        assert_eq!(grid.cell(0, 3), None);
        assert!(!grid.is_blocked(3, 3));
    }

    #[test]
    fn off_grid_writes_fault() {
        let mut grid = Grid::open(3);
        let err = grid.set(3, 0, Cell::Blocked).unwrap_err();
        assert_eq!(err, TaskFault::OutOfBounds { x: 3, y: 0, size: 3 });
        assert!(grid.set(-1, 1, Cell::Blocked).is_err());
    }

    #[test]
    fn render_uses_glyphs() {
        let mut grid = Grid::open(2);
        grid.set(1, 0, Cell::Blocked).unwrap();
        assert_eq!(grid.render(), ".#\n..");
    }
}
