//! Proxy livability labels.
//!
//! There is no ground truth, so training labels are synthesised from
//! covariate thresholds. A seeded noise band in `[0, 0.05)` blurs the
//! moderate-class boundary so the classes are not linearly separable and
//! accuracy is not trivially 1.0.
//!
//! Rule, evaluated in order, first match wins:
//!   NDVI > 0.5 && NDBI < 0.3                     → 3 (high)
//!   NDVI > 0.3 + Noise && NDBI < 0.4 + Noise     → 2 (moderate)
//!   otherwise                                    → 1 (low)
//!
//! The noise band is stacked as its own feature for training, and replaced
//! by zeros for full-extent prediction (see [`zero_noise_band`]).

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Error, Result};
use crate::features::{FeatureStack, NDBI, NDVI, NOISE};
use crate::par::*;
use crate::raster::{ClassRaster, Grid, RasterLayer};
use crate::region::RegionMask;
use crate::rng::{substream, NOISE_SALT};

/// Upper (exclusive) bound of the noise band.
pub const NOISE_AMPLITUDE: f32 = 0.05;

/// Band name of the proxy label raster.
pub const CLASS_BAND: &str = "Class";

/// Livability class; the discriminant is the label value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum LivabilityClass {
    Low = 1,
    Moderate = 2,
    High = 3,
}

impl LivabilityClass {
    pub const ALL: [LivabilityClass; 3] =
        [LivabilityClass::Low, LivabilityClass::Moderate, LivabilityClass::High];

    #[inline]
    pub fn label(self) -> u8 {
        self as u8
    }

    pub fn from_label(label: u8) -> Option<Self> {
        match label {
            1 => Some(LivabilityClass::Low),
            2 => Some(LivabilityClass::Moderate),
            3 => Some(LivabilityClass::High),
            _ => None,
        }
    }
}

impl TryFrom<u8> for LivabilityClass {
    type Error = String;

    fn try_from(v: u8) -> std::result::Result<Self, String> {
        Self::from_label(v).ok_or_else(|| format!("livability label must be 1..=3, got {v}"))
    }
}

impl From<LivabilityClass> for u8 {
    fn from(c: LivabilityClass) -> u8 {
        c.label()
    }
}

impl fmt::Display for LivabilityClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LivabilityClass::Low => "low",
            LivabilityClass::Moderate => "moderate",
            LivabilityClass::High => "high",
        };
        f.write_str(s)
    }
}

/// Threshold rule for one pixel.
#[inline]
pub fn classify_pixel(ndvi: f32, ndbi: f32, noise: f32) -> LivabilityClass {
    if ndvi > 0.5 && ndbi < 0.3 {
        LivabilityClass::High
    } else if ndvi > 0.3 + noise && ndbi < 0.4 + noise {
        LivabilityClass::Moderate
    } else {
        LivabilityClass::Low
    }
}

/// Seeded uniform noise in `[0, NOISE_AMPLITUDE)`, 0 outside the region.
///
/// Each row draws from its own sub-stream of `seed`, so rows can be filled
/// in parallel and the result is bit-identical for a given seed.
pub fn noise_band(mask: &RegionMask, seed: u64) -> RasterLayer {
    let grid = mask.grid;
    let rows: Vec<Vec<f32>> = (0..grid.height)
        .into_par_iter()
        .map(|r| {
            let mut rng = substream(seed, NOISE_SALT, r as u64);
            (0..grid.width)
                .map(|c| {
                    // Draw for every pixel so a row's stream does not depend
                    // on the mask.
                    let v: f32 = rng.gen_range(0.0..NOISE_AMPLITUDE);
                    if mask.contains(r, c) { v } else { 0.0 }
                })
                .collect()
        })
        .collect();
    RasterLayer { name: NOISE.to_string(), grid, data: rows.into_iter().flatten().collect() }
}

/// Constant-zero noise band used at prediction time.
pub fn zero_noise_band(grid: &Grid) -> RasterLayer {
    RasterLayer::filled(NOISE, *grid, 0.0)
}

/// `stack` with its `Noise` band zeroed in place, the layout every
/// full-extent prediction runs on.
pub fn without_noise(stack: FeatureStack) -> Result<FeatureStack> {
    let grid = *stack.grid();
    stack.replace_band(zero_noise_band(&grid))
}

/// Validated labeler configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LabelerConfig {
    pub seed: u64,
}

impl Default for LabelerConfig {
    fn default() -> Self {
        Self { seed: 42 }
    }
}

/// Covariate stack with its noise band and proxy label raster.
#[derive(Debug, Clone)]
pub struct LabeledStack {
    /// Covariates plus the `Noise` band.
    pub stack: FeatureStack,
    pub labels: ClassRaster,
}

#[derive(Debug, Clone)]
pub struct ProxyLabeler {
    config: LabelerConfig,
}

impl ProxyLabeler {
    pub fn new(config: LabelerConfig) -> Self {
        Self { config }
    }

    /// Add a seeded noise band to `stack` and label every region pixel.
    pub fn label(&self, stack: FeatureStack) -> Result<LabeledStack> {
        let noise = noise_band(stack.mask(), self.config.seed);
        let stack = stack.with_band(noise)?;
        let labels = label_with_noise(&stack)?;
        info!(
            seed = self.config.seed,
            classes = ?labels.histogram(),
            "proxy labels generated"
        );
        Ok(LabeledStack { stack, labels })
    }
}

/// Apply the threshold rule using the stack's own `NDVI`, `NDBI` and
/// `Noise` bands. Pixels outside the region get [`ClassRaster::NO_DATA`].
pub fn label_with_noise(stack: &FeatureStack) -> Result<ClassRaster> {
    let band = |name: &str| {
        stack.band(name).ok_or_else(|| Error::MissingBand { band: name.to_string() })
    };
    let ndvi = band(NDVI)?;
    let ndbi = band(NDBI)?;
    let noise = band(NOISE)?;
    let grid = *stack.grid();
    let mask = stack.mask();

    let rows: Vec<Vec<u8>> = (0..grid.height)
        .into_par_iter()
        .map(|r| {
            (0..grid.width)
                .map(|c| {
                    if mask.contains(r, c) {
                        classify_pixel(ndvi.get(r, c), ndbi.get(r, c), noise.get(r, c)).label()
                    } else {
                        ClassRaster::NO_DATA
                    }
                })
                .collect()
        })
        .collect();
    ClassRaster::new(CLASS_BAND, &grid, rows.into_iter().flatten().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::Grid;

    fn toy_stack(ndvi: &[f32], ndbi: &[f32]) -> FeatureStack {
        let g = Grid::new(ndvi.len(), 1, 36.7, 36.8, -1.3, -1.3);
        let mask = RegionMask::full(&g);
        FeatureStack::build(
            &mask,
            vec![
                RasterLayer::from_data(NDVI, g, ndvi.to_vec()).unwrap(),
                RasterLayer::from_data(NDBI, g, ndbi.to_vec()).unwrap(),
            ],
        )
        .unwrap()
    }

    #[test]
    fn four_pixel_scene_with_zero_noise() {
        let stack = toy_stack(&[0.6, 0.35, 0.1, 0.4], &[0.2, 0.35, 0.5, 0.2]);
        let grid = *stack.grid();
        let stack = stack.with_band(zero_noise_band(&grid)).unwrap();
        let labels = label_with_noise(&stack).unwrap();
        assert_eq!(labels.data, vec![3, 2, 1, 2]);
    }

    #[test]
    fn high_class_boundary_ignores_noise() {
        assert_eq!(classify_pixel(0.51, 0.29, 0.049), LivabilityClass::High);
        assert_eq!(classify_pixel(0.5, 0.29, 0.0), LivabilityClass::Moderate);
    }

    #[test]
    fn noise_blurs_moderate_boundary() {
        assert_eq!(classify_pixel(0.32, 0.2, 0.0), LivabilityClass::Moderate);
        assert_eq!(classify_pixel(0.32, 0.2, 0.03), LivabilityClass::Low);
        assert_eq!(classify_pixel(0.45, 0.42, 0.0), LivabilityClass::Low);
        assert_eq!(classify_pixel(0.45, 0.42, 0.04), LivabilityClass::Moderate);
    }

    #[test]
    fn noise_band_is_bounded_and_reproducible() {
        let g = Grid::new(17, 9, 36.6, 37.1, -1.45, -1.15);
        let mask = RegionMask::full(&g);
        let a = noise_band(&mask, 42);
        let b = noise_band(&mask, 42);
        assert_eq!(a.data, b.data);
        assert!(a.data.iter().all(|&v| (0.0..NOISE_AMPLITUDE).contains(&v)));
        let c = noise_band(&mask, 43);
        assert_ne!(a.data, c.data);
    }

    #[test]
    fn labeling_is_bit_identical_across_runs() {
        let ndvi: Vec<f32> = (0..64).map(|i| (i as f32) / 64.0).collect();
        let ndbi: Vec<f32> = (0..64).map(|i| 0.6 - (i as f32) / 100.0).collect();
        let labeler = ProxyLabeler::new(LabelerConfig { seed: 7 });
        let a = labeler.label(toy_stack(&ndvi, &ndbi)).unwrap();
        let b = labeler.label(toy_stack(&ndvi, &ndbi)).unwrap();
        assert_eq!(a.labels, b.labels);
        assert_eq!(a.stack.band(NOISE).unwrap().data, b.stack.band(NOISE).unwrap().data);
    }

    #[test]
    fn outside_region_is_nodata() {
        let g = Grid::new(2, 1, 36.7, 36.8, -1.3, -1.3);
        let mask = RegionMask::from_flags(&g, vec![true, false]).unwrap();
        let stack = FeatureStack::build(
            &mask,
            vec![RasterLayer::filled(NDVI, g, 0.9), RasterLayer::filled(NDBI, g, 0.1)],
        )
        .unwrap();
        let labeled = ProxyLabeler::new(LabelerConfig::default()).label(stack).unwrap();
        assert_eq!(labeled.labels.data, vec![3, ClassRaster::NO_DATA]);
    }

    #[test]
    fn deployment_stack_zeroes_noise_only() {
        let labeled = ProxyLabeler::new(LabelerConfig { seed: 3 })
            .label(toy_stack(&[0.1, 0.3, 0.5, 0.7], &[0.0, 0.0, 0.0, 0.0]))
            .unwrap();
        assert!(labeled.stack.band(NOISE).unwrap().data.iter().any(|&v| v > 0.0));

        let deployed = without_noise(labeled.stack.clone()).unwrap();
        assert_eq!(deployed.band_names(), labeled.stack.band_names());
        assert!(deployed.band(NOISE).unwrap().data.iter().all(|&v| v == 0.0));
        assert_eq!(deployed.band(NDVI), labeled.stack.band(NDVI));
    }

    #[test]
    fn class_serialises_as_label() {
        let json = serde_json::to_string(&LivabilityClass::Moderate).unwrap();
        assert_eq!(json, "2");
        assert!(serde_json::from_str::<LivabilityClass>("4").is_err());
    }
}
