//! k-fold cross-validation over splitter keys.
//!
//! Fold `i` of `k` holds the samples with key in `[i/k, (i+1)/k)`; its
//! training subset is every other sample. Each fold trains a fresh model and
//! folds run concurrently, but results are collected in fold order.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::classifier::{ClassifierKind, Trainable};
use crate::error::{Error, Result, Stage};
use crate::evaluate::{evaluate, Accuracy};
use crate::features::BandSet;
use crate::par::*;
use crate::sample::SampleSet;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossValidationConfig {
    pub k: usize,
    pub classifier: ClassifierKind,
}

impl Default for CrossValidationConfig {
    fn default() -> Self {
        Self { k: 5, classifier: ClassifierKind::forest(50, 42) }
    }
}

/// Score of one fold.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FoldResult {
    pub fold: usize,
    pub train_size: usize,
    pub validation_size: usize,
    pub accuracy: Accuracy,
}

/// All fold scores plus summary statistics over the defined ones.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CrossValidation {
    pub k: usize,
    pub folds: Vec<FoldResult>,
    pub mean: Accuracy,
    /// Population standard deviation over defined folds.
    pub std_dev: Accuracy,
}

impl CrossValidation {
    /// One accuracy per fold, in fold order.
    pub fn scores(&self) -> Vec<Accuracy> {
        self.folds.iter().map(|f| f.accuracy).collect()
    }
}

#[derive(Debug, Clone)]
pub struct CrossValidator {
    config: CrossValidationConfig,
}

impl CrossValidator {
    pub fn new(config: CrossValidationConfig) -> Result<Self> {
        if config.k == 0 {
            return Err(Error::invalid("cross_validation.k", 0, "need at least one fold"));
        }
        config.classifier.validate()?;
        Ok(Self { config })
    }

    /// Fold index of a key in `[0, 1)`.
    pub fn fold_of(&self, key: f64) -> usize {
        let k = self.config.k;
        ((key * k as f64).floor() as usize).min(k - 1)
    }

    /// Run all folds on a keyed sample set.
    pub fn cross_validate(&self, samples: &SampleSet, bands: &BandSet) -> Result<CrossValidation> {
        samples.ensure_not_empty(Stage::CrossValidation)?;
        samples.ensure_complete()?;
        let k = self.config.k;
        let folds: Vec<usize> = samples
            .iter()
            .map(|s| {
                let key = s.key.ok_or(Error::MissingPartitionKey { pixel: s.pixel })?;
                Ok(self.fold_of(key))
            })
            .collect::<Result<_>>()?;

        let results: Vec<Result<FoldResult>> = (0..k)
            .into_par_iter()
            .map(|fold| self.run_fold(fold, samples, &folds, bands))
            .collect();
        let folds = results.into_iter().collect::<Result<Vec<_>>>()?;

        let defined: Vec<f64> = folds.iter().filter_map(|f| f.accuracy.value()).collect();
        let (mean, std_dev) = mean_std(&defined);
        info!(k, %mean, %std_dev, defined = defined.len(), "cross-validation finished");
        Ok(CrossValidation { k, folds, mean, std_dev })
    }

    fn run_fold(
        &self,
        fold: usize,
        samples: &SampleSet,
        folds: &[usize],
        bands: &BandSet,
    ) -> Result<FoldResult> {
        let (mut train, mut validation) = (Vec::new(), Vec::new());
        for (s, &f) in samples.iter().zip(folds) {
            if f == fold {
                validation.push(s.clone());
            } else {
                train.push(s.clone());
            }
        }
        let train = SampleSet::new(samples.bands.clone(), train);
        let validation = SampleSet::new(samples.bands.clone(), validation);

        let accuracy = if validation.is_empty() || train.is_empty() {
            Accuracy::Undefined
        } else {
            let model = self.config.classifier.train(&train, bands)?;
            evaluate(model.as_ref(), &validation)?.accuracy
        };
        debug!(fold, train = train.len(), validation = validation.len(), %accuracy, "fold scored");
        Ok(FoldResult {
            fold,
            train_size: train.len(),
            validation_size: validation.len(),
            accuracy,
        })
    }
}

fn mean_std(values: &[f64]) -> (Accuracy, Accuracy) {
    if values.is_empty() {
        return (Accuracy::Undefined, Accuracy::Undefined);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (Accuracy::Defined(mean), Accuracy::Defined(var.sqrt()))
}
