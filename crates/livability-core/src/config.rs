use serde::{Deserialize, Serialize};

use crate::classifier::ClassifierKind;
use crate::covariates::AssetConfig;
use crate::cross_validation::{CrossValidationConfig, CrossValidator};
use crate::error::{Error, Result};
use crate::labeler::LabelerConfig;
use crate::sampler::{Sampler, SamplerConfig};
use crate::splitter::{SplitConfig, Splitter};

/// Uniform sample of the prediction stack used for the NDVI-by-class chart.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChartSampleConfig {
    pub num_points: usize,
    pub seed: u64,
}

impl Default for ChartSampleConfig {
    fn default() -> Self {
        Self { num_points: 3000, seed: 99 }
    }
}

/// Full pipeline configuration. Every field has a default, so a partial
/// JSON document is enough.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Region name passed to the raster source.
    pub region: String,
    pub assets: AssetConfig,
    pub labeler: LabelerConfig,
    pub sampler: SamplerConfig,
    pub split: SplitConfig,
    /// Classifiers to train and compare. The first is the primary model
    /// whose map is exported as the livability map.
    pub classifiers: Vec<ClassifierKind>,
    pub cross_validation: CrossValidationConfig,
    pub chart_sample: ChartSampleConfig,
    /// Scale passed to the export sink, in metres.
    pub export_scale_m: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            region: "Nairobi".to_string(),
            assets: AssetConfig::default(),
            labeler: LabelerConfig::default(),
            sampler: SamplerConfig::default(),
            split: SplitConfig::default(),
            classifiers: vec![ClassifierKind::forest(100, 42), ClassifierKind::cart()],
            cross_validation: CrossValidationConfig::default(),
            chart_sample: ChartSampleConfig::default(),
            export_scale_m: 30.0,
        }
    }
}

impl PipelineConfig {
    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check every stage's parameters up front.
    pub fn validate(&self) -> Result<()> {
        Sampler::new(self.sampler)?;
        Splitter::new(self.split)?;
        CrossValidator::new(self.cross_validation.clone())?;
        if self.classifiers.is_empty() {
            return Err(Error::invalid("classifiers", "[]", "at least one classifier is required"));
        }
        for c in &self.classifiers {
            c.validate()?;
        }
        let mut names: Vec<&str> = self.classifiers.iter().map(ClassifierKind::name).collect();
        names.sort_unstable();
        if names.windows(2).any(|w| w[0] == w[1]) {
            let reason = "each classifier family may appear once";
            return Err(Error::invalid("classifiers", format!("{names:?}"), reason));
        }
        if self.chart_sample.num_points == 0 {
            return Err(Error::invalid("chart_sample.num_points", 0, "must be at least 1"));
        }
        if !(self.export_scale_m.is_finite() && self.export_scale_m > 0.0) {
            let reason = "must be a positive number of metres";
            return Err(Error::invalid("export_scale_m", self.export_scale_m, reason));
        }
        Ok(())
    }
}
