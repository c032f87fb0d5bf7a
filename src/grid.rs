use anyhow::{bail, Result};

use crate::common::Cell;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellKind {
    Open,
    StaticObstacle,
}

/// Static `width x height` occupancy view. Built once per planning session;
/// the planner only ever reads it.
#[derive(Debug, Clone)]
pub struct Grid {
    width: usize,
    height: usize,
    cells: Vec<CellKind>,
}

impl Grid {
    pub fn from_rows(rows: Vec<Vec<CellKind>>) -> Result<Self> {
        if rows.is_empty() || rows[0].is_empty() {
            bail!("grid must have at least one row and one column");
        }
        let width = rows[0].len();
        let height = rows.len();
        let mut cells = Vec::with_capacity(width * height);
        for (y, row) in rows.into_iter().enumerate() {
            if row.len() != width {
                bail!("ragged grid: row {y} has {} cells, expected {width}", row.len());
            }
            cells.extend(row);
        }
        Ok(Grid {
            width,
            height,
            cells,
        })
    }

    /// Parse a row-per-line map where `#` is a static obstacle and any other
    /// character is open airspace. Line `y` holds the cells `(0, y)..(W, y)`.
    pub fn from_ascii(text: &str) -> Result<Self> {
        let rows = text
            .lines()
            .map(|line| {
                line.chars()
                    .map(|ch| {
                        if ch == '#' {
                            CellKind::StaticObstacle
                        } else {
                            CellKind::Open
                        }
                    })
                    .collect()
            })
            .collect();
        Self::from_rows(rows)
    }

    /// Build an all-open grid and mark the listed cells as obstacles.
    pub fn with_obstacles(width: usize, height: usize, obstacles: &[Cell]) -> Result<Self> {
        if width == 0 || height == 0 {
            bail!("grid must have at least one row and one column");
        }
        let mut grid = Grid {
            width,
            height,
            cells: vec![CellKind::Open; width * height],
        };
        for &cell in obstacles {
            if !grid.in_bounds(cell) {
                bail!(
                    "obstacle {cell:?} is outside the {width}x{height} grid"
                );
            }
            grid.cells[cell.1 * width + cell.0] = CellKind::StaticObstacle;
        }
        Ok(grid)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn in_bounds(&self, (x, y): Cell) -> bool {
        x < self.width && y < self.height
    }

    pub fn is_open(&self, cell: Cell) -> bool {
        self.in_bounds(cell) && self.cells[cell.1 * self.width + cell.0] == CellKind::Open
    }

    /// Out-of-bounds and obstacle cells are rejected with an error; used to
    /// validate caller-facing positions before planning starts.
    pub fn require_open(&self, cell: Cell) -> Result<()> {
        if !self.in_bounds(cell) {
            bail!(
                "position {cell:?} is outside the {}x{} grid",
                self.width,
                self.height
            );
        }
        if !self.is_open(cell) {
            bail!("position {cell:?} is a static obstacle");
        }
        Ok(())
    }

    /// Default step bound for the low-level search.
    pub fn default_time_limit(&self) -> usize {
        self.width * self.height * 2
    }
}
