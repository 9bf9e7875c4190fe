//! Structured artefacts for the visualisation sink. Nothing here formats
//! for display; everything serialises to JSON.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::classifier::ClassifierKind;
use crate::config::ChartSampleConfig;
use crate::cross_validation::CrossValidation;
use crate::error::{Error, Result};
use crate::evaluate::{Accuracy, Evaluation};
use crate::features::{FeatureStack, NDVI};
use crate::raster::ClassRaster;
use crate::sampler::uniform_pixels;

/// Results for one trained classifier.
#[derive(Debug, Clone, Serialize)]
pub struct ClassifierReport {
    pub name: String,
    pub kind: ClassifierKind,
    pub evaluation: Evaluation,
    /// Raw scores; absent for models without importances.
    pub importances: Option<BTreeMap<String, f64>>,
    /// Pixel count per predicted class over the full extent.
    pub predicted_distribution: BTreeMap<u8, usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ChartPoint {
    pub lon: f64,
    pub lat: f64,
    pub ndvi: f32,
    pub predicted: u8,
}

/// Seeded sample of predicted pixels for the NDVI-by-class chart.
#[derive(Debug, Clone, Serialize)]
pub struct ChartReport {
    pub classifier: String,
    pub seed: u64,
    pub points: Vec<ChartPoint>,
    pub mean_ndvi_by_class: BTreeMap<u8, f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub region: String,
    pub bands: Vec<String>,
    /// Input layers dropped because they could not be aligned.
    pub omitted_layers: Vec<String>,
    /// Proxy label pixel counts over the region.
    pub label_distribution: BTreeMap<u8, usize>,
    pub sample_size: usize,
    pub sample_distribution: BTreeMap<u8, usize>,
    pub train_size: usize,
    pub test_size: usize,
    pub classifiers: Vec<ClassifierReport>,
    /// Overall accuracy per classifier name.
    pub comparison: BTreeMap<String, Accuracy>,
    pub cross_validation: CrossValidation,
    pub chart: ChartReport,
    pub exported: Vec<String>,
}

impl PipelineReport {
    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Mean value per class.
pub fn mean_by_class(pairs: impl IntoIterator<Item = (u8, f32)>) -> BTreeMap<u8, f64> {
    let mut sums: BTreeMap<u8, (f64, usize)> = BTreeMap::new();
    for (class, v) in pairs {
        let e = sums.entry(class).or_insert((0.0, 0));
        e.0 += v as f64;
        e.1 += 1;
    }
    sums.into_iter().map(|(k, (s, n))| (k, s / n as f64)).collect()
}

/// Sample `predicted` uniformly inside the region and pair each point with
/// its NDVI.
pub fn chart_sample(
    stack: &FeatureStack,
    predicted: &ClassRaster,
    classifier: &str,
    config: &ChartSampleConfig,
) -> Result<ChartReport> {
    stack.grid().ensure_same(&predicted.grid)?;
    let ndvi = stack.band(NDVI).ok_or_else(|| Error::MissingBand { band: NDVI.to_string() })?;
    let grid = stack.grid();

    let points: Vec<ChartPoint> = uniform_pixels(stack.mask(), config.num_points, config.seed)?
        .into_iter()
        .map(|pixel| {
            let (row, col) = grid.row_col(pixel);
            let (lon, lat) = grid.coord(row, col);
            ChartPoint { lon, lat, ndvi: ndvi.data[pixel], predicted: predicted.data[pixel] }
        })
        .collect();
    let mean_ndvi_by_class = mean_by_class(points.iter().map(|p| (p.predicted, p.ndvi)));

    Ok(ChartReport {
        classifier: classifier.to_string(),
        seed: config.seed,
        points,
        mean_ndvi_by_class,
    })
}
