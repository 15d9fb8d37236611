use nalgebra::DMatrix;

use crate::domain::grid2d::{CellSize2D, GridDimensions2D, GridState};

pub mod model1d;

pub fn interpolate_u_to_cell_centers(u: &DMatrix<f64>) -> DMatrix<f64> {
    // Interior cell (r, c) sits at padded (r+1, c+1) between faces c and c+1.
    let target_ny = u.nrows().saturating_sub(2);
    let target_nx = u.ncols().saturating_sub(2);
    DMatrix::from_fn(target_ny, target_nx, |r, c| {
        0.5 * (u[(r + 1, c)] + u[(r + 1, c + 1)])
    })
}

pub fn interpolate_v_to_cell_centers(v: &DMatrix<f64>) -> DMatrix<f64> {
    let target_ny = v.nrows().saturating_sub(2);
    let target_nx = v.ncols().saturating_sub(2);
    DMatrix::from_fn(target_ny, target_nx, |r, c| {
        0.5 * (v[(r, c + 1)] + v[(r + 1, c + 1)])
    })
}

/// Net outflow of cell `(i, j)` per unit area: east minus west face, plus
/// south minus north face.
#[inline]
pub fn cell_divergence(
    u: &DMatrix<f64>,
    v: &DMatrix<f64>,
    i: usize,
    j: usize,
    dx: f64,
    dy: f64,
) -> f64 {
    (u[(i, j)] - u[(i, j - 1)]) / dx + (v[(i, j)] - v[(i - 1, j)]) / dy
}

/// Discrete divergence over the interior (`ny x nx`), zero at wall cells.
pub fn divergence(state: &GridState) -> DMatrix<f64> {
    let GridDimensions2D(nx, ny) = state.dimensions;
    let CellSize2D(dx, dy) = state.dimensions.unit_cell_size();
    DMatrix::from_fn(ny, nx, |r, c| {
        let (i, j) = (r + 1, c + 1);
        if state.is_wall(i, j) {
            0.0
        } else {
            cell_divergence(&state.u, &state.v, i, j, dx, dy)
        }
    })
}

/// Sum of |divergence| over interior fluid cells.
pub fn total_abs_divergence(state: &GridState) -> f64 {
    divergence(state).iter().map(|d| d.abs()).sum()
}
