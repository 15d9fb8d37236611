use rayon::prelude::*;

use crate::config::ScenarioParameters;
use crate::domain::grid2d::{CellSize2D, GridDimensions2D, GridState};

/// Projection step: subtracts `dt / density` times the pressure gradient
/// from the east (`u`) and south (`v`) face of every interior fluid cell.
///
/// A face shared with a wall has no gradient across it and is left alone,
/// matching how the pressure solve treats walls.
pub fn solve(state: &mut GridState, scenario: &ScenarioParameters) {
    let GridDimensions2D(nx, ny) = state.dimensions;
    let CellSize2D(dx, dy) = state.dimensions.unit_cell_size();
    let rows = state.rows();
    let scale = scenario.dt / scenario.density;
    let (p, masks) = (&state.p0, &state.masks);

    state
        .u
        .as_mut_slice()
        .par_chunks_mut(rows)
        .zip(state.v.as_mut_slice().par_chunks_mut(rows))
        .enumerate()
        .filter(|(j, _)| (1..=nx).contains(j))
        .for_each(|(j, (u_col, v_col))| {
            for i in 1..=ny {
                if masks.cells[(i, j)].is_wall() {
                    continue;
                }
                let centre = p[(i, j)];
                if masks.cells[(i, j + 1)].is_fluid() {
                    u_col[i] -= scale * (p[(i, j + 1)] - centre) / dx;
                }
                if masks.cells[(i + 1, j)].is_fluid() {
                    v_col[i] -= scale * (p[(i + 1, j)] - centre) / dy;
                }
            }
        });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::mask::Masks;
    use approx::assert_relative_eq;
    use nalgebra::DMatrix;

    #[test]
    fn test_subtracts_scaled_gradient() {
        let dims = GridDimensions2D(4, 4);
        let masks = Masks::all_fluid(dims).unwrap();
        let mut state = GridState::new(dims, masks, (0.0, 0.0)).unwrap();
        // p = 2 * column index, so dp/dx = 2 / dx = 8 and dp/dy = 0.
        state.p0 = DMatrix::from_fn(6, 6, |_, j| 2.0 * j as f64);
        let scenario = ScenarioParameters { dt: 0.1, density: 2.0, ..Default::default() };

        solve(&mut state, &scenario);

        for j in 1..=4 {
            for i in 1..=4 {
                assert_relative_eq!(state.u[(i, j)], -0.4, epsilon = 1e-12);
                assert_relative_eq!(state.v[(i, j)], 0.0, epsilon = 1e-12);
            }
        }
        // Ghost faces stay put.
        assert_eq!(state.u[(2, 0)], 0.0);
        assert_eq!(state.u[(0, 2)], 0.0);
    }

    #[test]
    fn test_walls_are_skipped() {
        let masks = Masks::lid_driven_cavity(3).unwrap();
        let mut state = GridState::new(GridDimensions2D(3, 3), masks, (0.0, 0.0)).unwrap();
        state.p0 = DMatrix::from_fn(5, 5, |i, j| (i * 5 + j) as f64);
        let scenario = ScenarioParameters { dt: 0.01, density: 1.0, ..Default::default() };

        solve(&mut state, &scenario);

        for k in 0..5 {
            assert_eq!(state.u[(4, k)], 0.0);
            assert_eq!(state.v[(k, 0)], 0.0);
        }
        // East faces of the last column and south faces of the last row meet a wall.
        for k in 1..=3 {
            assert_eq!(state.u[(k, 3)], 0.0);
            assert_eq!(state.v[(3, k)], 0.0);
        }
        // Interior faces are corrected: dp/dx = 1 / (1/3).
        assert_relative_eq!(state.u[(2, 1)], -0.03, epsilon = 1e-12);
        assert_relative_eq!(state.v[(1, 2)], -0.15, epsilon = 1e-12);
    }
}
