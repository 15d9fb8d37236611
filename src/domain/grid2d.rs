use nalgebra::DMatrix;

use crate::domain::mask::{CellKind, Masks};
use crate::error::GridError;
use crate::numerical::{interpolate_u_to_cell_centers, interpolate_v_to_cell_centers};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridDimensions2D(pub usize, pub usize); // nx, ny (interior cells)

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellSize2D(pub f64, pub f64); // dx, dy

impl GridDimensions2D {
    /// Spacing of a unit square domain split into `nx x ny` cells.
    pub fn unit_cell_size(&self) -> CellSize2D {
        CellSize2D(1.0 / self.0 as f64, 1.0 / self.1 as f64)
    }

    pub fn cell_count(&self) -> usize {
        self.0 * self.1
    }
}

/// Every per-cell buffer of one scenario.
///
/// Padded fields are `(ny+2) x (nx+2)`; index `(i, j)` is row `i` (growing
/// downward) and column `j` (growing rightward), with row/column `0` and
/// `n+1` forming the ghost ring. Velocities are staggered onto the faces of
/// the pressure cell they are stored with:
///
/// ```text
///            V[i-1,j]
///          +----↓----+
///          |         |
///  U[i,j-1]→  P[i,j] →U[i,j]
///          |         |
///          +----↓----+
///             V[i,j]
/// ```
///
/// `velx`/`vely` are cell-centred copies for export, `ny x nx`, no padding.
#[derive(Debug, Clone)]
pub struct GridState {
    pub dimensions: GridDimensions2D,
    pub u: DMatrix<f64>,
    pub v: DMatrix<f64>,
    pub p0: DMatrix<f64>,
    pub p1: DMatrix<f64>,
    pub f: DMatrix<f64>,
    pub velx: DMatrix<f64>,
    pub vely: DMatrix<f64>,
    pub(crate) masks: Masks,
}

impl GridState {
    /// Allocates all fields for `masks`. Fluid cells on the ghost ring are
    /// constant-velocity cells and start at `constant_velocity`; everything
    /// else starts at rest.
    pub fn new(
        dimensions: GridDimensions2D,
        masks: Masks,
        constant_velocity: (f64, f64),
    ) -> Result<Self, GridError> {
        let GridDimensions2D(nx, ny) = dimensions;
        if nx < 1 || ny < 1 {
            return Err(GridError::InvalidGridSize(
                "Grid dimensions (nx, ny) must be at least 1x1 for interior cells.".to_string(),
            ));
        }
        masks.check_dimensions(dimensions)?;

        let (rows, cols) = (ny + 2, nx + 2);
        let mut state = Self {
            dimensions,
            u: DMatrix::zeros(rows, cols),
            v: DMatrix::zeros(rows, cols),
            p0: DMatrix::zeros(rows, cols),
            p1: DMatrix::zeros(rows, cols),
            f: DMatrix::zeros(rows, cols),
            velx: DMatrix::zeros(ny, nx),
            vely: DMatrix::zeros(ny, nx),
            masks,
        };

        let (u0, v0) = constant_velocity;
        for j in 0..cols {
            for i in 0..rows {
                if state.is_constant_velocity(i, j) {
                    state.u[(i, j)] = u0;
                    state.v[(i, j)] = v0;
                }
            }
        }
        Ok(state)
    }

    pub fn rows(&self) -> usize {
        self.dimensions.1 + 2
    }

    pub fn cols(&self) -> usize {
        self.dimensions.0 + 2
    }

    pub fn masks(&self) -> &Masks {
        &self.masks
    }

    pub fn cell(&self, i: usize, j: usize) -> CellKind {
        self.masks.cells[(i, j)]
    }

    pub fn is_wall(&self, i: usize, j: usize) -> bool {
        self.cell(i, j).is_wall()
    }

    pub fn is_outflow(&self, i: usize, j: usize) -> bool {
        self.masks.outflow[(i, j)]
    }

    pub fn is_ghost(&self, i: usize, j: usize) -> bool {
        i == 0 || j == 0 || i == self.rows() - 1 || j == self.cols() - 1
    }

    pub fn is_constant_velocity(&self, i: usize, j: usize) -> bool {
        self.is_ghost(i, j) && self.cell(i, j).is_fluid()
    }

    /// Averages the two staggered faces of every interior cell into `velx`/`vely`.
    pub fn update_cell_centered(&mut self) {
        self.velx = interpolate_u_to_cell_centers(&self.u);
        self.vely = interpolate_v_to_cell_centers(&self.v);
    }
}
