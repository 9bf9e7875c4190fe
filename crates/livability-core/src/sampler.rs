//! Stratified spatial sampling of the labeled surface.
//!
//! Eligible pixels are region pixels with a label, thinned to a lattice
//! whose stride approximates the requested sampling scale. The total budget
//! is split equally across the labels present; a class with fewer eligible
//! pixels than its share contributes all of them.

use std::collections::BTreeMap;

use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::features::{vector_at, BandSet, FeatureStack};
use crate::raster::ClassRaster;
use crate::region::RegionMask;
use crate::rng::{substream, CHART_SALT, SAMPLE_SALT};
use crate::sample::{Sample, SampleSet};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamplerConfig {
    /// Total number of points across all classes.
    pub num_points: usize,
    /// Nominal sampling scale in metres.
    pub scale_m: f64,
    pub seed: u64,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self { num_points: 7500, scale_m: 30.0, seed: 42 }
    }
}

#[derive(Debug, Clone)]
pub struct Sampler {
    config: SamplerConfig,
}

impl Sampler {
    pub fn new(config: SamplerConfig) -> Result<Self> {
        if config.num_points == 0 {
            return Err(Error::invalid("sampler.num_points", 0, "must be at least 1"));
        }
        if !(config.scale_m.is_finite() && config.scale_m > 0.0) {
            return Err(Error::invalid(
                "sampler.scale_m",
                config.scale_m,
                "must be a positive number of metres",
            ));
        }
        Ok(Self { config })
    }

    /// Lattice stride in pixels for the stack's grid.
    pub fn stride(&self, stack: &FeatureStack) -> usize {
        let cells = (self.config.scale_m / stack.grid().cellsize_m()).round();
        if cells >= 1.0 { cells as usize } else { 1 }
    }

    /// Stratified sample of `labels` carrying `bands` feature values.
    ///
    /// Samples are ordered by pixel index. Fails with `EmptyRegion` when no
    /// labeled region pixel lies on the sampling lattice.
    pub fn sample(
        &self,
        stack: &FeatureStack,
        labels: &ClassRaster,
        bands: &BandSet,
    ) -> Result<SampleSet> {
        let grid = *stack.grid();
        grid.ensure_same(&labels.grid)?;
        let columns = stack.columns(bands)?;
        let mask = stack.mask();
        let stride = self.stride(stack);

        let mut strata: BTreeMap<u8, Vec<usize>> = BTreeMap::new();
        for r in (0..grid.height).step_by(stride) {
            for c in (0..grid.width).step_by(stride) {
                let label = labels.get(r, c);
                if mask.contains(r, c) && label != ClassRaster::NO_DATA {
                    strata.entry(label).or_default().push(grid.index(r, c));
                }
            }
        }
        if strata.is_empty() {
            return Err(Error::EmptyRegion);
        }

        let n_classes = strata.len();
        let base = self.config.num_points / n_classes;
        let remainder = self.config.num_points % n_classes;

        let mut chosen: Vec<(usize, u8)> = Vec::with_capacity(self.config.num_points);
        for (i, (label, mut pixels)) in strata.into_iter().enumerate() {
            let quota = base + usize::from(i < remainder);
            if pixels.len() <= quota {
                if pixels.len() < quota {
                    warn!(
                        label,
                        available = pixels.len(),
                        quota,
                        "stratum under-filled; taking every pixel"
                    );
                }
            } else {
                let mut rng = substream(self.config.seed, SAMPLE_SALT, u64::from(label));
                let (picked, _) = pixels.partial_shuffle(&mut rng, quota);
                pixels = picked.to_vec();
            }
            debug!(label, drawn = pixels.len(), "stratum sampled");
            chosen.extend(pixels.into_iter().map(|p| (p, label)));
        }
        chosen.sort_unstable_by_key(|&(p, _)| p);

        let samples: Vec<Sample> = chosen
            .into_iter()
            .map(|(pixel, label)| {
                let (row, col) = grid.row_col(pixel);
                let (lon, lat) = grid.coord(row, col);
                let features = vector_at(&columns, pixel);
                Sample { pixel, row, col, lon, lat, label, features, key: None }
            })
            .collect();

        info!(samples = samples.len(), classes = n_classes, stride, "stratified sample drawn");
        Ok(SampleSet::new(bands.clone(), samples))
    }
}

/// Uniform seeded sample of up to `num_points` region pixels, sorted.
pub fn uniform_pixels(mask: &RegionMask, num_points: usize, seed: u64) -> Result<Vec<usize>> {
    let mut pixels: Vec<usize> = (0..mask.grid.len()).filter(|&i| mask.contains_index(i)).collect();
    if pixels.is_empty() {
        return Err(Error::EmptyRegion);
    }
    if pixels.len() > num_points {
        let mut rng = substream(seed, CHART_SALT, 0);
        let (picked, _) = pixels.partial_shuffle(&mut rng, num_points);
        pixels = picked.to_vec();
    }
    pixels.sort_unstable();
    Ok(pixels)
}
