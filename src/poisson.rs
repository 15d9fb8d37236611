use nalgebra::DMatrix;
use rayon::prelude::*;
use tracing::{debug, warn};

use crate::config::PoissonParameters;
use crate::domain::grid2d::{CellSize2D, GridDimensions2D, GridState};
use crate::domain::mask::Masks;
use crate::numerical::cell_divergence;

/// Outcome of one pressure solve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoissonReport {
    /// Sweeps spent in the convergence loop, `1..=max_iterations`.
    pub sweeps: usize,
    /// Unconditional sweeps run afterwards (`min_iterations`).
    pub extra_sweeps: usize,
    /// Largest pressure change in the last convergence-loop sweep.
    pub max_error: f64,
    pub converged: bool,
}

impl PoissonReport {
    pub fn total_sweeps(&self) -> usize {
        self.sweeps + self.extra_sweeps
    }
}

#[derive(Debug, Clone, Copy)]
struct Stencil {
    dx2: f64,
    dy2: f64,
    denom: f64,
}

impl Stencil {
    fn new(CellSize2D(dx, dy): CellSize2D) -> Self {
        let (dx2, dy2) = (dx * dx, dy * dy);
        Self { dx2, dy2, denom: 2.0 * (dx2 + dy2) }
    }
}

/// Relaxes `p0`/`p1` against the divergence of the current (predicted)
/// velocity with Jacobi sweeps on `∇²p = div(u, v) / error`.
///
/// The convergence loop stops once a sweep changes no cell by more than
/// `tolerance`, or after `max_iterations` sweeps; `min_iterations` further
/// sweeps follow regardless. Wall cells are never written. Running out of
/// iterations is reported, not treated as an error.
pub fn solve_pressure(state: &mut GridState, params: &PoissonParameters) -> PoissonReport {
    let spacing = state.dimensions.unit_cell_size();
    let stencil = Stencil::new(spacing);

    update_source_term(state, params.error, spacing);

    let mut sweeps = 0;
    let mut max_error;
    loop {
        max_error = jacobi_sweep(state, &stencil);
        sweeps += 1;
        if sweeps >= params.max_iterations || max_error <= params.tolerance {
            break;
        }
    }
    let converged = max_error <= params.tolerance;

    for _ in 0..params.min_iterations {
        jacobi_sweep(state, &stencil);
    }

    let report = PoissonReport {
        sweeps,
        extra_sweeps: params.min_iterations,
        max_error,
        converged,
    };
    if converged {
        debug!(sweeps, max_error, "Pressure solve converged");
    } else {
        warn!(
            sweeps,
            max_error,
            tolerance = params.tolerance,
            "Pressure solve hit max_iterations before reaching tolerance"
        );
    }
    report
}

/// Fills `f` with the Poisson source at interior fluid cells and zero elsewhere.
fn update_source_term(state: &mut GridState, error: f64, CellSize2D(dx, dy): CellSize2D) {
    let GridDimensions2D(nx, ny) = state.dimensions;
    let rows = state.rows();
    let (u, v, masks) = (&state.u, &state.v, &state.masks);

    state
        .f
        .as_mut_slice()
        .par_chunks_mut(rows)
        .enumerate()
        .for_each(|(j, f_col)| {
            for (i, value) in f_col.iter_mut().enumerate() {
                let interior = (1..=ny).contains(&i) && (1..=nx).contains(&j);
                *value = if interior && masks.cells[(i, j)].is_fluid() {
                    cell_divergence(u, v, i, j, dx, dy) / error
                } else {
                    0.0
                };
            }
        });
}

/// Pressure seen across one face of `(i, j)`.
///
/// A neighbour is coupled only when the velocity on the shared face is
/// corrected by the projection: east/south faces belong to `(i, j)` and are
/// corrected whenever the neighbour is fluid, west/north faces belong to the
/// neighbour and are corrected only when it is an interior fluid cell. An
/// uncoupled neighbour contributes the centre value, i.e. zero gradient.
#[inline]
fn coupled_pressure(
    p: &DMatrix<f64>,
    masks: &Masks,
    centre: f64,
    (ni, nj): (usize, usize),
    owned_by_neighbour: bool,
) -> f64 {
    let fluid = masks.cells[(ni, nj)].is_fluid();
    let interior = ni >= 1 && nj >= 1;
    if fluid && (!owned_by_neighbour || interior) {
        p[(ni, nj)]
    } else {
        centre
    }
}

/// One Jacobi sweep `p0 -> p1`, then `p1` is copied back into `p0`.
/// Returns the largest absolute change.
fn jacobi_sweep(state: &mut GridState, stencil: &Stencil) -> f64 {
    let GridDimensions2D(nx, ny) = state.dimensions;
    let rows = state.rows();
    let Stencil { dx2, dy2, denom } = *stencil;
    let (p0, f, masks) = (&state.p0, &state.f, &state.masks);

    let max_error = state
        .p1
        .as_mut_slice()
        .par_chunks_mut(rows)
        .enumerate()
        .filter(|(j, _)| (1..=nx).contains(j))
        .map(|(j, p1_col)| {
            let mut column_error = 0.0_f64;
            for i in 1..=ny {
                if masks.cells[(i, j)].is_wall() {
                    continue;
                }
                let centre = p0[(i, j)];
                let east = coupled_pressure(p0, masks, centre, (i, j + 1), false);
                let south = coupled_pressure(p0, masks, centre, (i + 1, j), false);
                let west = coupled_pressure(p0, masks, centre, (i, j - 1), true);
                let north = coupled_pressure(p0, masks, centre, (i - 1, j), true);

                let updated = ((north + south) * dx2 + (east + west) * dy2
                    - f[(i, j)] * dx2 * dy2)
                    / denom;
                column_error = column_error.max((updated - centre).abs());
                p1_col[i] = updated;
            }
            column_error
        })
        .reduce(|| 0.0, f64::max);

    state.p0.copy_from(&state.p1);
    max_error
}
