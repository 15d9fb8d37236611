use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::domain::grid2d::GridDimensions2D;
use crate::error::GridError;

/// Smallest interior extent a mask may describe. Outflow extrapolation reads
/// one cell inward from the outer ring, so at least one cell must sit inside it.
pub const MIN_INTERIOR_CELLS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CellKind {
    #[default]
    Fluid,
    Wall,
}

impl CellKind {
    pub fn is_wall(self) -> bool {
        self == CellKind::Wall
    }

    pub fn is_fluid(self) -> bool {
        self == CellKind::Fluid
    }
}

/// Cell classification and outflow flags for a padded `(ny+2) x (nx+2)` domain.
#[derive(Debug, Clone, PartialEq)]
pub struct Masks {
    pub cells: DMatrix<CellKind>,
    pub outflow: DMatrix<bool>,
}

impl Masks {
    pub fn new(cells: DMatrix<CellKind>, outflow: DMatrix<bool>) -> Result<Self, GridError> {
        if cells.shape() != outflow.shape() {
            return Err(GridError::MaskDimensionMismatch {
                expected_rows: cells.nrows(),
                expected_cols: cells.ncols(),
                found_rows: outflow.nrows(),
                found_cols: outflow.ncols(),
            });
        }
        let min = MIN_INTERIOR_CELLS + 2;
        if cells.nrows() < min || cells.ncols() < min {
            return Err(GridError::InvalidGridSize(format!(
                "Mask must be at least {min}x{min} including the ghost ring, got {}x{}",
                cells.nrows(),
                cells.ncols()
            )));
        }
        Ok(Self { cells, outflow })
    }

    /// Interior extent described by the mask, ghost ring excluded.
    pub fn interior_dimensions(&self) -> GridDimensions2D {
        GridDimensions2D(self.cells.ncols() - 2, self.cells.nrows() - 2)
    }

    pub fn check_dimensions(&self, dimensions: GridDimensions2D) -> Result<(), GridError> {
        let GridDimensions2D(nx, ny) = dimensions;
        if self.cells.nrows() != ny + 2 || self.cells.ncols() != nx + 2 {
            return Err(GridError::MaskDimensionMismatch {
                expected_rows: ny + 2,
                expected_cols: nx + 2,
                found_rows: self.cells.nrows(),
                found_cols: self.cells.ncols(),
            });
        }
        Ok(())
    }

    /// Everything fluid, no outflow. The ghost ring then acts as a
    /// constant-velocity frame around the domain.
    pub fn all_fluid(dimensions: GridDimensions2D) -> Result<Self, GridError> {
        let GridDimensions2D(nx, ny) = dimensions;
        Self::new(
            DMatrix::from_element(ny + 2, nx + 2, CellKind::Fluid),
            DMatrix::from_element(ny + 2, nx + 2, false),
        )
    }

    /// Square box walled on three sides; the top ghost row above the interior
    /// is left fluid so it carries the lid velocity.
    pub fn lid_driven_cavity(n: usize) -> Result<Self, GridError> {
        let size = n + 2;
        let cells = DMatrix::from_fn(size, size, |i, j| {
            let on_ring = i == 0 || j == 0 || i == size - 1 || j == size - 1;
            let lid = i == 0 && j > 0 && j < size - 1;
            if on_ring && !lid {
                CellKind::Wall
            } else {
                CellKind::Fluid
            }
        });
        Self::new(cells, DMatrix::from_element(size, size, false))
    }

    /// Horizontal channel: walls above and below, fluid ghost columns on the
    /// left (inflow) and right, outflow flags on the last interior column.
    pub fn channel(dimensions: GridDimensions2D) -> Result<Self, GridError> {
        let GridDimensions2D(nx, ny) = dimensions;
        let (rows, cols) = (ny + 2, nx + 2);
        let cells = DMatrix::from_fn(rows, cols, |i, _| {
            if i == 0 || i == rows - 1 {
                CellKind::Wall
            } else {
                CellKind::Fluid
            }
        });
        let outflow = DMatrix::from_fn(rows, cols, |i, j| j == nx && i >= 1 && i <= ny);
        Self::new(cells, outflow)
    }

    /// Parses a text mask: `#` wall, `.` fluid, `o` fluid flagged as outflow.
    /// Blank lines and surrounding whitespace are ignored.
    pub fn from_ascii(text: &str) -> Result<Self, GridError> {
        let lines: Vec<&str> = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect();
        let rows = lines.len();
        let cols = lines.first().map_or(0, |line| line.chars().count());

        let mut cells = DMatrix::from_element(rows, cols, CellKind::Fluid);
        let mut outflow = DMatrix::from_element(rows, cols, false);
        for (i, line) in lines.iter().enumerate() {
            if line.chars().count() != cols {
                return Err(GridError::InvalidMask(format!(
                    "row {i} has {} columns, expected {cols}",
                    line.chars().count()
                )));
            }
            for (j, ch) in line.chars().enumerate() {
                match ch {
                    '#' => cells[(i, j)] = CellKind::Wall,
                    '.' => {}
                    'o' | 'O' => outflow[(i, j)] = true,
                    other => {
                        return Err(GridError::InvalidMask(format!(
                            "unexpected character '{other}' at row {i}, column {j}"
                        )))
                    }
                }
            }
        }
        Self::new(cells, outflow)
    }

    pub fn fluid_cell_count(&self) -> usize {
        self.cells.iter().filter(|kind| kind.is_fluid()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lid_driven_cavity_layout() {
        let masks = Masks::lid_driven_cavity(4).unwrap();
        assert_eq!(masks.cells.shape(), (6, 6));
        // Lid row stays fluid between the two wall corners.
        assert_eq!(masks.cells[(0, 0)], CellKind::Wall);
        assert_eq!(masks.cells[(0, 1)], CellKind::Fluid);
        assert_eq!(masks.cells[(0, 4)], CellKind::Fluid);
        assert_eq!(masks.cells[(0, 5)], CellKind::Wall);
        for k in 0..6 {
            assert!(masks.cells[(5, k)].is_wall());
            assert!(masks.cells[(k, 0)].is_wall());
            assert!(masks.cells[(k, 5)].is_wall());
        }
        assert!(masks.outflow.iter().all(|flag| !flag));
        assert_eq!(masks.interior_dimensions(), GridDimensions2D(4, 4));
    }

    #[test]
    fn test_channel_flags_last_column() {
        let masks = Masks::channel(GridDimensions2D(5, 3)).unwrap();
        assert_eq!(masks.cells.shape(), (5, 7));
        assert!(masks.cells[(0, 3)].is_wall());
        assert!(masks.cells[(4, 3)].is_wall());
        assert!(masks.cells[(2, 0)].is_fluid());
        assert!(masks.outflow[(1, 5)] && masks.outflow[(3, 5)]);
        assert!(!masks.outflow[(0, 5)] && !masks.outflow[(2, 4)]);
    }

    #[test]
    fn test_from_ascii() {
        let masks = Masks::from_ascii(
            "
            #####
            #...#
            #.#.o
            #...#
            #####
            ",
        )
        .unwrap();
        assert_eq!(masks.interior_dimensions(), GridDimensions2D(3, 3));
        assert!(masks.cells[(2, 2)].is_wall());
        assert!(masks.cells[(1, 1)].is_fluid());
        assert!(masks.outflow[(2, 4)]);
        assert_eq!(masks.fluid_cell_count(), 9);
    }

    #[test]
    fn test_from_ascii_rejects_bad_input() {
        assert!(matches!(
            Masks::from_ascii("#####\n#..#\n#####\n#####\n#####"),
            Err(GridError::InvalidMask(_))
        ));
        assert!(matches!(
            Masks::from_ascii("#####\n#.x.#\n#...#\n#...#\n#####"),
            Err(GridError::InvalidMask(_))
        ));
        assert!(matches!(
            Masks::from_ascii("####\n#..#\n####"),
            Err(GridError::InvalidGridSize(_))
        ));
    }

    #[test]
    fn test_check_dimensions() {
        let masks = Masks::lid_driven_cavity(4).unwrap();
        assert!(masks.check_dimensions(GridDimensions2D(4, 4)).is_ok());
        assert_eq!(
            masks.check_dimensions(GridDimensions2D(5, 4)),
            Err(GridError::MaskDimensionMismatch {
                expected_rows: 6,
                expected_cols: 7,
                found_rows: 6,
                found_cols: 6,
            })
        );
    }
}
