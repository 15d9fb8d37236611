use crate::domain::grid2d::{GridDimensions2D, GridState};

/// Neighbour of an interior cell across one of its four faces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Above,
    Below,
    Left,
    Right,
}

impl Side {
    pub const ALL: [Side; 4] = [Side::Above, Side::Below, Side::Left, Side::Right];

    pub fn neighbour(self, i: usize, j: usize) -> (usize, usize) {
        match self {
            Side::Above => (i - 1, j),
            Side::Below => (i + 1, j),
            Side::Left => (i, j - 1),
            Side::Right => (i, j + 1),
        }
    }
}

impl GridState {
    /// Enforces wall and outflow conditions on `u`/`v` ahead of the predictor.
    ///
    /// Runs in three passes over the interior fluid cells:
    /// 1. faces shared with a wall get zero normal velocity;
    /// 2. outflow cells on the outer ring copy both components from the cell
    ///    one step inward, overriding pass 1 on their own faces;
    /// 3. wall cells receive the negated tangential velocity of the adjacent
    ///    fluid cell, unless that component is itself a fluid cell's normal face.
    ///
    /// Each pass only reads values the later passes never write, so applying
    /// the conditions twice leaves the field unchanged.
    pub fn apply_boundary_conditions(&mut self) {
        let GridDimensions2D(nx, ny) = self.dimensions;

        for j in 1..=nx {
            for i in 1..=ny {
                if !self.is_wall(i, j) {
                    self.zero_wall_normals(i, j);
                }
            }
        }

        for j in 1..=nx {
            for i in 1..=ny {
                if let Some((si, sj)) = self.outflow_source(i, j) {
                    self.u[(i, j)] = self.u[(si, sj)];
                    self.v[(i, j)] = self.v[(si, sj)];
                }
            }
        }

        for j in 1..=nx {
            for i in 1..=ny {
                if !self.is_wall(i, j) {
                    self.mirror_wall_tangentials(i, j);
                }
            }
        }
    }

    fn zero_wall_normals(&mut self, i: usize, j: usize) {
        for side in Side::ALL {
            let (wi, wj) = side.neighbour(i, j);
            if !self.is_wall(wi, wj) {
                continue;
            }
            match side {
                Side::Above => self.v[(wi, wj)] = 0.0,
                Side::Below => self.v[(i, j)] = 0.0,
                Side::Left => self.u[(wi, wj)] = 0.0,
                Side::Right => self.u[(i, j)] = 0.0,
            }
        }
    }

    fn mirror_wall_tangentials(&mut self, i: usize, j: usize) {
        for side in Side::ALL {
            let (wi, wj) = side.neighbour(i, j);
            if !self.is_wall(wi, wj) {
                continue;
            }
            match side {
                Side::Above | Side::Below => {
                    // u[w] sits on the face between w and its right neighbour.
                    if self.is_wall(wi, wj + 1) {
                        self.u[(wi, wj)] = -self.u[(i, j)];
                    }
                }
                Side::Left | Side::Right => {
                    // v[w] sits on the face between w and the cell below it.
                    if self.is_wall(wi + 1, wj) {
                        self.v[(wi, wj)] = -self.v[(i, j)];
                    }
                }
            }
        }
    }

    fn is_outer_ring(&self, i: usize, j: usize) -> bool {
        let GridDimensions2D(nx, ny) = self.dimensions;
        i == 1 || i == ny || j == 1 || j == nx
    }

    fn extrapolates_outflow(&self, i: usize, j: usize) -> bool {
        self.is_outflow(i, j) && !self.is_wall(i, j) && self.is_outer_ring(i, j)
    }

    /// One step inward from an outer-ring cell. Column edges take precedence
    /// at corners.
    fn inward_step(&self, i: usize, j: usize) -> (usize, usize) {
        let GridDimensions2D(nx, ny) = self.dimensions;
        if j == 1 {
            (i, j + 1)
        } else if j == nx {
            (i, j - 1)
        } else if i == 1 {
            (i + 1, j)
        } else {
            debug_assert_eq!(i, ny);
            (i - 1, j)
        }
    }

    /// Cell an outflow cell copies from. A corner whose inward neighbour is
    /// itself an outflow edge cell follows it one more step, so every source
    /// is a cell this pass never writes.
    fn outflow_source(&self, i: usize, j: usize) -> Option<(usize, usize)> {
        if !self.extrapolates_outflow(i, j) {
            return None;
        }
        let mut source = self.inward_step(i, j);
        if self.extrapolates_outflow(source.0, source.1) {
            source = self.inward_step(source.0, source.1);
        }
        if self.is_wall(source.0, source.1) {
            return None;
        }
        Some(source)
    }
}
