#![allow(dead_code)]
//! One-dimensional warm-up problems on `x ∈ [0, 2]` with a square-wave start:
//! `u = 1` everywhere except `u = 2` on `[0.5, 1]`. Boundary points are
//! never updated.

use nalgebra::DVector;

use crate::error::GridError;

fn grid_spacing(nx: usize) -> Result<f64, GridError> {
    if nx < 2 {
        return Err(GridError::InvalidGridSize(format!(
            "a line needs at least 2 points, got {nx}"
        )));
    }
    Ok(2.0 / (nx - 1) as f64)
}

fn require_positive(name: &str, value: f64) -> Result<f64, GridError> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(GridError::InvalidParameter(format!(
            "{name} must be positive and finite, got {value}"
        )))
    }
}

fn square_wave(nx: usize, dx: f64) -> DVector<f64> {
    let start = (0.5 / dx) as usize;
    let end = ((1.0 / dx + 1.0) as usize).min(nx);
    let mut u = DVector::from_element(nx, 1.0);
    if start < end {
        u.rows_mut(start, end - start).fill(2.0);
    }
    u
}

/// First-order upwind `u_t + c u_x = 0` with `c = 1` and `dt = sigma * dx`.
pub fn linear_convection(nx: usize, nt: usize, sigma: f64) -> Result<DVector<f64>, GridError> {
    let dx = grid_spacing(nx)?;
    let sigma = require_positive("sigma", sigma)?;
    let mut u = square_wave(nx, dx);
    for _ in 0..nt {
        let un = u.clone();
        for i in 1..nx {
            u[i] = un[i] - sigma * (un[i] - un[i - 1]);
        }
    }
    Ok(u)
}

/// Inviscid Burgers `u_t + u u_x = 0`, upwind, fixed `dt`.
pub fn nonlinear_convection(nx: usize, nt: usize, dt: f64) -> Result<DVector<f64>, GridError> {
    let dx = grid_spacing(nx)?;
    let ratio = require_positive("dt", dt)? / dx;
    let mut u = square_wave(nx, dx);
    for _ in 0..nt {
        let un = u.clone();
        for i in 1..nx {
            u[i] = un[i] - un[i] * ratio * (un[i] - un[i - 1]);
        }
    }
    Ok(u)
}

/// Explicit `u_t = nu u_xx` with `dt = sigma * dx² / nu`.
pub fn diffusion(nx: usize, nt: usize, nu: f64, sigma: f64) -> Result<DVector<f64>, GridError> {
    let dx = grid_spacing(nx)?;
    let nu = require_positive("nu", nu)?;
    let sigma = require_positive("sigma", sigma)?;
    let dt = sigma * dx * dx / nu;
    let s = nu * dt / (dx * dx);
    let mut u = square_wave(nx, dx);
    for _ in 0..nt {
        let un = u.clone();
        for i in 1..nx - 1 {
            u[i] = un[i] + s * (un[i + 1] - 2.0 * un[i] + un[i - 1]);
        }
    }
    Ok(u)
}
