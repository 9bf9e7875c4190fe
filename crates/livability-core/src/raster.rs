use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Reference grid shared by every layer of a feature stack.
///
/// Row-major, row 0 = `min_lat` (S→N). Coordinates are node-registered:
/// pixel `(r, c)` sits at `min_lon + c / (width − 1) · Δlon`.
/// Coordinate math uses f64; raster values use f32.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Grid {
    pub width: usize,
    pub height: usize,
    pub min_lon: f64,
    pub max_lon: f64,
    pub min_lat: f64,
    pub max_lat: f64,
}

impl Grid {
    pub fn new(
        width: usize,
        height: usize,
        min_lon: f64,
        max_lon: f64,
        min_lat: f64,
        max_lat: f64,
    ) -> Self {
        Self { width, height, min_lon, max_lon, min_lat, max_lat }
    }

    /// Number of pixels.
    #[inline]
    pub fn len(&self) -> usize {
        self.width * self.height
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn index(&self, row: usize, col: usize) -> usize {
        row * self.width + col
    }

    /// `(row, col)` of a row-major pixel index.
    #[inline]
    pub fn row_col(&self, index: usize) -> (usize, usize) {
        (index / self.width, index % self.width)
    }

    /// Geographic `(lon, lat)` of pixel `(row, col)`. Edge pixels land
    /// exactly on the bounds.
    pub fn coord(&self, row: usize, col: usize) -> (f64, f64) {
        let lon = lerp(self.min_lon, self.max_lon, col, self.width);
        let lat = lerp(self.min_lat, self.max_lat, row, self.height);
        (lon, lat)
    }

    /// `"<width>x<height>"` for messages.
    pub fn shape(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }

    /// A grid nothing can be aligned to or from: no pixels, non-finite or
    /// inverted bounds.
    pub fn is_degenerate(&self) -> bool {
        self.is_empty()
            || ![self.min_lon, self.max_lon, self.min_lat, self.max_lat]
                .iter()
                .all(|v| v.is_finite())
            || self.max_lon < self.min_lon
            || self.max_lat < self.min_lat
    }

    /// True if the two extents overlap (inclusive edges).
    pub fn intersects(&self, other: &Grid) -> bool {
        self.min_lon <= other.max_lon
            && self.max_lon >= other.min_lon
            && self.min_lat <= other.max_lat
            && self.max_lat >= other.min_lat
    }

    /// Isotropic cellsize (metres) derived from the geographic bounds.
    /// Falls back to 90 m when bounds are degenerate (zero extent).
    pub fn cellsize_m(&self) -> f64 {
        let lat_extent = (self.max_lat - self.min_lat).abs();
        let lon_extent = (self.max_lon - self.min_lon).abs();
        let cy = if self.height > 0 {
            lat_extent / self.height as f64 * 111_320.0
        } else {
            0.0
        };
        let mid_lat = (self.min_lat + self.max_lat) / 2.0;
        let cx = if self.width > 0 {
            lon_extent / self.width as f64 * 111_320.0 * mid_lat.to_radians().cos()
        } else {
            0.0
        };
        let avg = (cy + cx) / 2.0;
        if avg < 1e-3 { 90.0 } else { avg }
    }

    pub(crate) fn ensure_same(&self, other: &Grid) -> Result<()> {
        if self == other {
            Ok(())
        } else {
            Err(Error::GridMismatch {
                expected_width: self.width,
                expected_height: self.height,
                width: other.width,
                height: other.height,
            })
        }
    }
}

/// Position `i` of `n` evenly spaced nodes from `lo` to `hi`.
fn lerp(lo: f64, hi: f64, i: usize, n: usize) -> f64 {
    if n < 2 {
        return lo;
    }
    let t = i as f64 / (n - 1) as f64;
    lo * (1.0 - t) + hi * t
}

/// `offset / extent`, or 0 across a zero extent.
fn fraction(offset: f64, extent: f64) -> f64 {
    if extent > 0.0 {
        offset / extent
    } else {
        0.0
    }
}

/// A named 2D grid of numeric values (NDVI, LST, ...). Row-major f32.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RasterLayer {
    pub name: String,
    #[serde(flatten)]
    pub grid: Grid,
    /// Row-major values; NaN marks nodata in source layers.
    pub data: Vec<f32>,
}

impl RasterLayer {
    /// Create a layer filled with the given value.
    pub fn filled(name: impl Into<String>, grid: Grid, fill: f32) -> Self {
        Self { name: name.into(), grid, data: vec![fill; grid.len()] }
    }

    /// Wrap existing row-major data; the length must match the grid.
    pub fn from_data(name: impl Into<String>, grid: Grid, data: Vec<f32>) -> Result<Self> {
        if data.len() != grid.len() {
            return Err(Error::invalid(
                "data",
                data.len(),
                &format!("expected {} values for a {} grid", grid.len(), grid.shape()),
            ));
        }
        Ok(Self { name: name.into(), grid, data })
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f32 {
        self.data[row * self.grid.width + col]
    }

    #[inline]
    pub fn set(&mut self, row: usize, col: usize, val: f32) {
        self.data[row * self.grid.width + col] = val;
    }

    /// Same values under a new band name.
    pub fn renamed(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Apply `f` to every value, keeping the grid.
    pub fn map(&self, name: impl Into<String>, f: impl Fn(f32) -> f32) -> Self {
        Self {
            name: name.into(),
            grid: self.grid,
            data: self.data.iter().map(|&v| f(v)).collect(),
        }
    }

    /// Sample the layer at (lon, lat) using bilinear interpolation.
    /// Returns None if (lon, lat) is outside the layer bounds. NaN
    /// neighbours propagate into the result.
    pub fn sample(&self, lon: f64, lat: f64) -> Option<f32> {
        let g = &self.grid;
        let inside =
            (g.min_lon..=g.max_lon).contains(&lon) && (g.min_lat..=g.max_lat).contains(&lat);
        if g.is_empty() || !inside {
            return None;
        }

        let lon_extent = g.max_lon - g.min_lon;
        let lat_extent = g.max_lat - g.min_lat;
        let fx = fraction(lon - g.min_lon, lon_extent) * (g.width - 1) as f64;
        let fy = fraction(lat - g.min_lat, lat_extent) * (g.height - 1) as f64;

        let x0 = (fx.floor() as usize).min(g.width - 1);
        let y0 = (fy.floor() as usize).min(g.height - 1);
        let x1 = (x0 + 1).min(g.width - 1);
        let y1 = (y0 + 1).min(g.height - 1);

        let tx = (fx - x0 as f64) as f32;
        let ty = (fy - y0 as f64) as f32;

        let v00 = self.get(y0, x0);
        let v10 = self.get(y0, x1);
        let v01 = self.get(y1, x0);
        let v11 = self.get(y1, x1);

        // Exact grid nodes skip the blend so a NaN neighbour with zero
        // weight cannot leak in.
        if tx == 0.0 && ty == 0.0 {
            return Some(v00);
        }

        let v = v00 * (1.0 - tx) * (1.0 - ty)
            + v10 * tx * (1.0 - ty)
            + v01 * (1.0 - tx) * ty
            + v11 * tx * ty;

        Some(v)
    }

    pub fn min_value(&self) -> f32 {
        self.data.iter().cloned().filter(|v| !v.is_nan()).fold(f32::INFINITY, f32::min)
    }

    pub fn max_value(&self) -> f32 {
        self.data.iter().cloned().filter(|v| !v.is_nan()).fold(f32::NEG_INFINITY, f32::max)
    }
}

/// Categorical raster of class labels (proxy labels or predictions).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassRaster {
    pub name: String,
    #[serde(flatten)]
    pub grid: Grid,
    /// Row-major labels; [`ClassRaster::NO_DATA`] outside the region.
    pub data: Vec<u8>,
}

impl ClassRaster {
    /// Label value for pixels outside the region mask.
    pub const NO_DATA: u8 = 0;

    pub fn new(name: impl Into<String>, grid: &Grid, data: Vec<u8>) -> Result<Self> {
        if data.len() != grid.len() {
            return Err(Error::invalid(
                "data",
                data.len(),
                &format!("expected {} labels for a {} grid", grid.len(), grid.shape()),
            ));
        }
        Ok(Self { name: name.into(), grid: *grid, data })
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> u8 {
        self.data[row * self.grid.width + col]
    }

    /// Pixel count per label, nodata excluded.
    pub fn histogram(&self) -> BTreeMap<u8, usize> {
        let mut counts = BTreeMap::new();
        for &v in &self.data {
            if v != Self::NO_DATA {
                *counts.entry(v).or_insert(0) += 1;
            }
        }
        counts
    }
}
