//! Multi-band covariate stack aligned to one reference grid and region.
//!
//! Every band is resampled onto the reference grid and masked to the region.
//! Undefined pixels (outside source coverage, nodata, outside the region)
//! are set to 0. That fill is an explicit, lossy policy, not imputation.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::par::*;
use crate::raster::{Grid, RasterLayer};
use crate::region::RegionMask;

pub const NDVI: &str = "NDVI";
pub const LST_C: &str = "LST_C";
pub const NDBI: &str = "NDBI";
pub const SLOPE: &str = "Slope";
pub const POP_DENSITY: &str = "Pop_Density";
pub const NOISE: &str = "Noise";

/// Covariates derived from the raster source, in stack order.
pub const COVARIATE_BANDS: [&str; 5] = [NDVI, LST_C, NDBI, SLOPE, POP_DENSITY];

/// Classifier input bands: the covariates plus the synthetic noise band.
/// Training and prediction must use exactly this order.
pub const MODEL_BANDS: [&str; 6] = [NDVI, LST_C, NDBI, SLOPE, POP_DENSITY, NOISE];

/// Ordered, duplicate-free list of band names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct BandSet {
    names: Vec<String>,
}

impl BandSet {
    pub fn new<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        if names.is_empty() {
            return Err(Error::EmptyFeatureList);
        }
        for (i, n) in names.iter().enumerate() {
            if names[..i].contains(n) {
                return Err(Error::DuplicateBand { band: n.clone() });
            }
        }
        Ok(Self { names })
    }

    /// `NDVI, LST_C, NDBI, Slope, Pop_Density, Noise`.
    pub fn model_bands() -> Self {
        Self { names: MODEL_BANDS.iter().map(|s| s.to_string()).collect() }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    /// Exact match in content and order.
    pub fn ensure_matches(&self, other: &BandSet) -> Result<()> {
        if self == other {
            Ok(())
        } else {
            Err(Error::BandMismatch { expected: self.names.clone(), got: other.names.clone() })
        }
    }
}

impl TryFrom<Vec<String>> for BandSet {
    type Error = Error;

    fn try_from(names: Vec<String>) -> Result<Self> {
        BandSet::new(names)
    }
}

impl From<BandSet> for Vec<String> {
    fn from(b: BandSet) -> Self {
        b.names
    }
}

/// Feature values for one location, ordered by the owning [`BandSet`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub values: Vec<f32>,
}

impl FeatureVector {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    #[inline]
    pub fn get(&self, i: usize) -> f32 {
        self.values[i]
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Aligned, masked multi-band raster.
#[derive(Debug, Clone)]
pub struct FeatureStack {
    mask: RegionMask,
    bands: Vec<RasterLayer>,
    omitted: Vec<String>,
}

impl FeatureStack {
    /// Align every layer to the mask's grid. Layers whose native grid cannot
    /// be aligned (degenerate, wrong data length, no overlap) are omitted and
    /// listed in [`FeatureStack::omitted`]; callers must check required bands
    /// with [`FeatureStack::require`] before training.
    pub fn build(mask: &RegionMask, layers: Vec<RasterLayer>) -> Result<Self> {
        let mut stack = Self {
            mask: mask.clone(),
            bands: Vec::with_capacity(layers.len()),
            omitted: Vec::new(),
        };
        for layer in layers {
            if stack.band(&layer.name).is_some() {
                return Err(Error::DuplicateBand { band: layer.name });
            }
            match align(&layer, &stack.mask) {
                Some(aligned) => {
                    debug!(band = %aligned.name, "aligned layer to reference grid");
                    stack.bands.push(aligned);
                }
                None => {
                    warn!(band = %layer.name, "layer cannot be aligned to the grid; omitted");
                    stack.omitted.push(layer.name);
                }
            }
        }
        Ok(stack)
    }

    /// Append a band already on the reference grid (e.g. the noise band).
    /// Values outside the region and NaNs become 0.
    pub fn with_band(mut self, layer: RasterLayer) -> Result<Self> {
        self.mask.grid.ensure_same(&layer.grid)?;
        if self.band(&layer.name).is_some() {
            return Err(Error::DuplicateBand { band: layer.name });
        }
        let aligned = align(&layer, &self.mask)
            .ok_or_else(|| Error::MissingBand { band: layer.name.clone() })?;
        self.bands.push(aligned);
        Ok(self)
    }

    /// Replace an existing band, keeping its position in the stack.
    pub fn replace_band(mut self, layer: RasterLayer) -> Result<Self> {
        self.mask.grid.ensure_same(&layer.grid)?;
        let pos = self
            .bands
            .iter()
            .position(|b| b.name == layer.name)
            .ok_or_else(|| Error::MissingBand { band: layer.name.clone() })?;
        let aligned = align(&layer, &self.mask)
            .ok_or_else(|| Error::MissingBand { band: layer.name.clone() })?;
        self.bands[pos] = aligned;
        Ok(self)
    }

    pub fn grid(&self) -> &Grid {
        &self.mask.grid
    }

    pub fn mask(&self) -> &RegionMask {
        &self.mask
    }

    pub fn band(&self, name: &str) -> Option<&RasterLayer> {
        self.bands.iter().find(|b| b.name == name)
    }

    pub fn band_names(&self) -> Vec<&str> {
        self.bands.iter().map(|b| b.name.as_str()).collect()
    }

    /// Names of input layers dropped during alignment.
    pub fn omitted(&self) -> &[String] {
        &self.omitted
    }

    /// Fail with `MissingBand` if any requested band is absent.
    pub fn require(&self, bands: &BandSet) -> Result<()> {
        self.columns(bands).map(|_| ())
    }

    /// Band layers in `bands` order.
    pub fn columns(&self, bands: &BandSet) -> Result<Vec<&RasterLayer>> {
        bands
            .names()
            .iter()
            .map(|n| self.band(n).ok_or_else(|| Error::MissingBand { band: n.clone() }))
            .collect()
    }

    /// Feature vector of pixel `(row, col)` in `bands` order.
    pub fn feature_vector(&self, bands: &BandSet, row: usize, col: usize) -> Result<FeatureVector> {
        let cols = self.columns(bands)?;
        Ok(vector_at(&cols, self.mask.grid.index(row, col)))
    }
}

pub(crate) fn vector_at(columns: &[&RasterLayer], index: usize) -> FeatureVector {
    FeatureVector::new(columns.iter().map(|b| b.data[index]).collect())
}

/// Resample `layer` onto the mask's grid. None if the layer's native grid
/// cannot be aligned.
fn align(layer: &RasterLayer, mask: &RegionMask) -> Option<RasterLayer> {
    let grid = mask.grid;
    let src = &layer.grid;
    if src.is_degenerate() || layer.data.len() != src.len() || !src.intersects(&grid) {
        return None;
    }
    let same_grid = layer.grid == grid;

    let rows: Vec<Vec<f32>> = (0..grid.height)
        .into_par_iter()
        .map(|r| {
            (0..grid.width)
                .map(|c| {
                    if !mask.contains(r, c) {
                        return 0.0;
                    }
                    let v = if same_grid {
                        layer.get(r, c)
                    } else {
                        let (lon, lat) = grid.coord(r, c);
                        layer.sample(lon, lat).unwrap_or(0.0)
                    };
                    if v.is_finite() { v } else { 0.0 }
                })
                .collect()
        })
        .collect();

    Some(RasterLayer { name: layer.name.clone(), grid, data: rows.into_iter().flatten().collect() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::Region;

    fn grid() -> Grid {
        Grid::new(4, 3, 36.6, 36.9, -1.4, -1.2)
    }

    fn layer(name: &str, g: Grid, f: impl Fn(usize, usize) -> f32) -> RasterLayer {
        let mut l = RasterLayer::filled(name, g, 0.0);
        for r in 0..g.height {
            for c in 0..g.width {
                l.set(r, c, f(r, c));
            }
        }
        l
    }

    #[test]
    fn band_set_rejects_empty_and_duplicates() {
        assert!(matches!(BandSet::new(Vec::<String>::new()), Err(Error::EmptyFeatureList)));
        assert!(matches!(BandSet::new(["NDVI", "NDBI", "NDVI"]), Err(Error::DuplicateBand { .. })));
        assert_eq!(BandSet::model_bands().names().last().map(String::as_str), Some(NOISE));
    }

    #[test]
    fn nodata_and_outside_region_become_zero() {
        let g = grid();
        let mut ndvi = layer(NDVI, g, |_, _| 0.4);
        ndvi.set(1, 1, f32::NAN);
        let mut flags = vec![true; g.len()];
        flags[g.index(0, 3)] = false;
        let mask = RegionMask::from_flags(&g, flags).unwrap();

        let stack = FeatureStack::build(&mask, vec![ndvi]).unwrap();
        let b = stack.band(NDVI).unwrap();
        assert_eq!(b.get(1, 1), 0.0);
        assert_eq!(b.get(0, 3), 0.0);
        assert_eq!(b.get(2, 2), 0.4);
    }

    #[test]
    fn misaligned_layer_is_omitted_and_required_band_fails() {
        let g = grid();
        let mask = RegionMask::full(&g);
        let far = Grid::new(4, 3, 100.0, 101.0, 40.0, 41.0);
        let layers = vec![layer(NDVI, g, |_, _| 0.5), layer(NDBI, far, |_, _| 0.1)];
        let stack = FeatureStack::build(&mask, layers).unwrap();

        assert_eq!(stack.omitted(), &["NDBI".to_string()]);
        let bands = BandSet::new([NDVI, NDBI]).unwrap();
        match stack.require(&bands) {
            Err(Error::MissingBand { band }) => assert_eq!(band, NDBI),
            other => panic!("expected MissingBand, got {other:?}"),
        }
    }

    #[test]
    fn coarser_layer_is_resampled_with_zero_outside_coverage() {
        let g = Grid::new(5, 5, 0.0, 4.0, 0.0, 4.0);
        // Covers only the western half.
        let half = Grid::new(3, 5, 0.0, 2.0, 0.0, 4.0);
        let slope = layer(SLOPE, half, |_, c| c as f32);
        let stack = FeatureStack::build(&RegionMask::full(&g), vec![slope]).unwrap();
        let b = stack.band(SLOPE).unwrap();
        assert!((b.get(2, 1) - 1.0).abs() < 1e-5);
        assert_eq!(b.get(2, 4), 0.0);
    }

    #[test]
    fn feature_vector_is_stable_across_rebuilds() {
        let g = grid();
        let region = Region::from_grid("aoi", &g);
        let mask = RegionMask::rasterize(&region, &g);
        let make = || {
            FeatureStack::build(
                &mask,
                vec![
                    layer(NDVI, g, |r, c| 0.1 * r as f32 + 0.01 * c as f32),
                    layer(NDBI, g, |r, _| 0.2 * r as f32),
                ],
            )
            .unwrap()
        };
        let bands = BandSet::new([NDVI, NDBI]).unwrap();
        let a = make().feature_vector(&bands, 2, 1).unwrap();
        let b = make().feature_vector(&bands, 2, 1).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 2);
    }

    #[test]
    fn with_band_requires_matching_grid() {
        let g = grid();
        let ndvi = layer(NDVI, g, |_, _| 0.3);
        let stack = FeatureStack::build(&RegionMask::full(&g), vec![ndvi]).unwrap();
        let other = Grid::new(2, 2, 36.6, 36.9, -1.4, -1.2);
        assert!(matches!(
            stack.clone().with_band(RasterLayer::filled(NOISE, other, 0.0)),
            Err(Error::GridMismatch { .. })
        ));
        let stack = stack.with_band(RasterLayer::filled(NOISE, g, 0.01)).unwrap();
        assert_eq!(stack.band_names(), vec![NDVI, NOISE]);
    }
}
