use nalgebra::DMatrix;
use rayon::prelude::*;

use crate::config::ScenarioParameters;
use crate::domain::grid2d::{GridDimensions2D, GridState};

/// Explicit advection-diffusion update of one staggered component at `(i, j)`.
///
/// Both axes use the same spacing `dx`. Convection is the product of the
/// averaged component and its forward difference along each axis; diffusion
/// is the kinematic viscosity times the five-point Laplacian.
#[inline]
fn advance(field: &DMatrix<f64>, i: usize, j: usize, dx: f64, dt: f64, nu: f64) -> f64 {
    let c = field[(i, j)];
    let east = field[(i, j + 1)];
    let west = field[(i, j - 1)];
    let south = field[(i + 1, j)];
    let north = field[(i - 1, j)];

    let convective = 0.5 * (c + east) * (east - c) / dx + 0.5 * (c + south) * (south - c) / dx;
    let diffusive = nu * ((east - 2.0 * c + west) / (dx * dx) + (south - 2.0 * c + north) / (dx * dx));

    c + dt * (-convective + diffusive)
}

/// Computes the intermediate velocity for every interior fluid cell.
///
/// New values are written to scratch copies of `u`/`v` and swapped in at
/// the end, so every update reads the previous step only. Wall cells keep
/// their values, as do faces shared with a wall: those carry the no-penetration
/// value set by the boundary conditions.
pub fn solve(state: &mut GridState, scenario: &ScenarioParameters) {
    let GridDimensions2D(nx, ny) = state.dimensions;
    let rows = state.rows();
    let dx = 1.0 / nx as f64;
    let dt = scenario.dt;
    let nu = scenario.kinematic_viscosity();

    let mut u_temp = state.u.clone();
    let mut v_temp = state.v.clone();
    let (u, v, masks) = (&state.u, &state.v, &state.masks);

    u_temp
        .as_mut_slice()
        .par_chunks_mut(rows)
        .zip(v_temp.as_mut_slice().par_chunks_mut(rows))
        .enumerate()
        .filter(|(j, _)| (1..=nx).contains(j))
        .for_each(|(j, (u_col, v_col))| {
            for i in 1..=ny {
                if masks.cells[(i, j)].is_wall() {
                    continue;
                }
                if masks.cells[(i, j + 1)].is_fluid() {
                    u_col[i] = advance(u, i, j, dx, dt, nu);
                }
                if masks.cells[(i + 1, j)].is_fluid() {
                    v_col[i] = advance(v, i, j, dx, dt, nu);
                }
            }
        });

    state.u = u_temp;
    state.v = v_temp;
}
