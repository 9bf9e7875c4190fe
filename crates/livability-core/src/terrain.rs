//! Per-pixel slope (Horn method) from an elevation layer.
//!
//! Computes slope angle (degrees) at every cell using Horn's (1981) 3×3
//! weighted finite-difference gradient. Edge cells reuse the nearest
//! in-grid neighbour, so the output covers the full grid.

use crate::par::*;
use crate::raster::{Grid, RasterLayer};

/// Horn (1981) weighted 3×3 gradient at cell `(r, c)` with clamped
/// neighbours.
///
/// Returns `(dz_dx, dz_dy)` as dimensionless rise/run values.
///
/// 3×3 neighbourhood layout:
/// ```text
///   NW(-1,-1)  N(-1, 0)  NE(-1,+1)
///   W ( 0,-1)  *         E ( 0,+1)
///   SW(+1,-1)  S(+1, 0)  SE(+1,+1)
/// ```
///
/// `dz/dx = ((NE + 2E + SE) − (NW + 2W + SW)) / (8 · cellsize)`
/// `dz/dy = ((NW + 2N + NE) − (SW + 2S + SE)) / (8 · cellsize)`
fn horn_gradient(dem: &RasterLayer, r: usize, c: usize, cellsize: f64) -> (f64, f64) {
    let g = &dem.grid;
    let up = r.saturating_sub(1);
    let down = (r + 1).min(g.height - 1);
    let left = c.saturating_sub(1);
    let right = (c + 1).min(g.width - 1);
    let z = |rr: usize, cc: usize| {
        let v = dem.get(rr, cc);
        if v.is_nan() { dem.get(r, c) as f64 } else { v as f64 }
    };

    let nw = z(up, left);
    let n = z(up, c);
    let ne = z(up, right);
    let w = z(r, left);
    let e = z(r, right);
    let sw = z(down, left);
    let s = z(down, c);
    let se = z(down, right);

    let dz_dx = ((ne + 2.0 * e + se) - (nw + 2.0 * w + sw)) / (8.0 * cellsize);
    let dz_dy = ((nw + 2.0 * n + ne) - (sw + 2.0 * s + se)) / (8.0 * cellsize);
    (dz_dx, dz_dy)
}

/// Slope raster (degrees, 0–90) named `name`. NaN elevation stays NaN.
pub fn slope_degrees(dem: &RasterLayer, name: &str) -> RasterLayer {
    let g: Grid = dem.grid;
    if g.is_empty() {
        return RasterLayer::filled(name, g, 0.0);
    }
    let cellsize = g.cellsize_m();

    let rows: Vec<Vec<f32>> = (0..g.height)
        .into_par_iter()
        .map(|r| {
            (0..g.width)
                .map(|c| {
                    if dem.get(r, c).is_nan() {
                        return f32::NAN;
                    }
                    let (dz_dx, dz_dy) = horn_gradient(dem, r, c, cellsize);
                    let slope_rad = (dz_dx * dz_dx + dz_dy * dz_dy).sqrt().atan();
                    (slope_rad.to_degrees() as f32).max(0.0)
                })
                .collect()
        })
        .collect();

    RasterLayer {
        name: name.to_string(),
        grid: g,
        data: rows.into_iter().flatten().collect(),
    }
}
