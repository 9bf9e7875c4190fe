//! Accuracy assessment on held-out samples.
//!
//! An empty test subset yields [`Accuracy::Undefined`], which stays distinct
//! from a real 0% accuracy everywhere it flows, including the JSON report
//! (`null`).

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::classifier::ClassificationModel;
use crate::error::Result;
use crate::sample::SampleSet;

/// A score that may be undefined for lack of samples.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "Option<f64>", into = "Option<f64>")]
pub enum Accuracy {
    Defined(f64),
    Undefined,
}

impl Accuracy {
    /// `num / den`, undefined when `den == 0`.
    pub fn ratio(num: usize, den: usize) -> Self {
        if den == 0 {
            Accuracy::Undefined
        } else {
            Accuracy::Defined(num as f64 / den as f64)
        }
    }

    pub fn value(self) -> Option<f64> {
        match self {
            Accuracy::Defined(v) => Some(v),
            Accuracy::Undefined => None,
        }
    }

    pub fn is_defined(self) -> bool {
        matches!(self, Accuracy::Defined(_))
    }
}

impl From<Option<f64>> for Accuracy {
    fn from(v: Option<f64>) -> Self {
        v.map_or(Accuracy::Undefined, Accuracy::Defined)
    }
}

impl From<Accuracy> for Option<f64> {
    fn from(a: Accuracy) -> Self {
        a.value()
    }
}

impl fmt::Display for Accuracy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Accuracy::Defined(v) => write!(f, "{v:.4}"),
            Accuracy::Undefined => f.write_str("undefined"),
        }
    }
}

/// Counts keyed by `(true_label, predicted_label)`.
///
/// The label axis is the sorted union of the labels declared at construction
/// and every label recorded since.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfusionMatrix {
    labels: Vec<u8>,
    cells: BTreeMap<(u8, u8), usize>,
}

impl ConfusionMatrix {
    pub fn new(labels: &[u8]) -> Self {
        let mut m = Self::default();
        for &l in labels {
            m.add_label(l);
        }
        m
    }

    fn add_label(&mut self, label: u8) {
        if let Err(pos) = self.labels.binary_search(&label) {
            self.labels.insert(pos, label);
        }
    }

    pub fn record(&mut self, actual: u8, predicted: u8) {
        self.add_label(actual);
        self.add_label(predicted);
        *self.cells.entry((actual, predicted)).or_insert(0) += 1;
    }

    pub fn labels(&self) -> &[u8] {
        &self.labels
    }

    pub fn get(&self, actual: u8, predicted: u8) -> usize {
        self.cells.get(&(actual, predicted)).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.cells.values().sum()
    }

    pub fn trace(&self) -> usize {
        self.labels.iter().map(|&l| self.get(l, l)).sum()
    }

    pub fn off_diagonal(&self) -> usize {
        self.total() - self.trace()
    }

    fn row_total(&self, actual: u8) -> usize {
        self.labels.iter().map(|&p| self.get(actual, p)).sum()
    }

    fn col_total(&self, predicted: u8) -> usize {
        self.labels.iter().map(|&a| self.get(a, predicted)).sum()
    }

    /// trace / total.
    pub fn accuracy(&self) -> Accuracy {
        Accuracy::ratio(self.trace(), self.total())
    }

    /// Producer's accuracy per class: correct / reference count (row).
    pub fn producers_accuracy(&self) -> BTreeMap<u8, Accuracy> {
        self.labels
            .iter()
            .map(|&l| (l, Accuracy::ratio(self.get(l, l), self.row_total(l))))
            .collect()
    }

    /// Consumer's accuracy per class: correct / predicted count (column).
    pub fn consumers_accuracy(&self) -> BTreeMap<u8, Accuracy> {
        self.labels
            .iter()
            .map(|&l| (l, Accuracy::ratio(self.get(l, l), self.col_total(l))))
            .collect()
    }

    /// Cohen's kappa. Undefined with no samples or when chance agreement is 1.
    pub fn kappa(&self) -> Accuracy {
        let n = self.total();
        if n == 0 {
            return Accuracy::Undefined;
        }
        let n = n as f64;
        let po = self.trace() as f64 / n;
        let pe: f64 = self
            .labels
            .iter()
            .map(|&l| (self.row_total(l) as f64 / n) * (self.col_total(l) as f64 / n))
            .sum();
        if (1.0 - pe).abs() < f64::EPSILON {
            Accuracy::Undefined
        } else {
            Accuracy::Defined((po - pe) / (1.0 - pe))
        }
    }

    /// Dense rows in [`ConfusionMatrix::labels`] order.
    pub fn to_rows(&self) -> Vec<Vec<usize>> {
        self.labels
            .iter()
            .map(|&a| self.labels.iter().map(|&p| self.get(a, p)).collect())
            .collect()
    }
}

impl Serialize for ConfusionMatrix {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        #[derive(Serialize)]
        struct Dense<'a> {
            labels: &'a [u8],
            rows: Vec<Vec<usize>>,
        }
        Dense { labels: &self.labels, rows: self.to_rows() }.serialize(serializer)
    }
}

/// Outcome of scoring a model on a test subset.
#[derive(Debug, Clone, Serialize)]
pub struct Evaluation {
    pub confusion: ConfusionMatrix,
    pub accuracy: Accuracy,
    /// Producer's accuracy per class.
    pub per_class: BTreeMap<u8, Accuracy>,
    pub consumers: BTreeMap<u8, Accuracy>,
    pub kappa: Accuracy,
    pub samples: usize,
}

/// Predict every test sample and tabulate the results.
pub fn evaluate(model: &dyn ClassificationModel, test: &SampleSet) -> Result<Evaluation> {
    let mut confusion = ConfusionMatrix::new(model.classes());
    if test.is_empty() {
        warn!("test subset is empty; accuracy undefined");
    } else {
        let projection = test.projection(model.bands())?;
        test.ensure_complete()?;
        let mut values = vec![0.0f32; projection.len()];
        for s in test {
            for (dst, &j) in values.iter_mut().zip(&projection) {
                *dst = s.features.get(j);
            }
            confusion.record(s.label, model.predict_values(&values));
        }
    }
    let accuracy = confusion.accuracy();
    debug!(samples = test.len(), %accuracy, "model evaluated");
    Ok(Evaluation {
        per_class: confusion.producers_accuracy(),
        consumers: confusion.consumers_accuracy(),
        kappa: confusion.kappa(),
        samples: test.len(),
        accuracy,
        confusion,
    })
}

/// Raw importance scores, for models that report them.
pub fn importances(model: &dyn ClassificationModel) -> Option<BTreeMap<String, f64>> {
    model.importances()
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::classifier::{train, ClassifierKind};
    use crate::error::Error;
    use crate::features::BandSet;
    use crate::sample::fixtures::{sample, separable};

    #[test]
    fn separable_two_sample_set_scores_one() {
        let bands = BandSet::new(["x"]).unwrap();
        let samples = vec![sample(0, 1, vec![0.0]), sample(1, 3, vec![1.0])];
        let set = SampleSet::new(bands.clone(), samples);
        let model = train(&ClassifierKind::cart(), &set, &bands).unwrap();
        let eval = evaluate(model.as_ref(), &set).unwrap();
        assert_eq!(eval.accuracy, Accuracy::Defined(1.0));
        assert_eq!(eval.confusion.off_diagonal(), 0);
        assert_eq!(eval.confusion.get(3, 3), 1);
    }

    #[test]
    fn empty_test_subset_is_undefined_not_zero() {
        let set = separable(5);
        let model = train(&ClassifierKind::cart(), &set, &set.bands).unwrap();
        let eval = evaluate(model.as_ref(), &SampleSet::empty(set.bands.clone())).unwrap();
        assert_eq!(eval.accuracy, Accuracy::Undefined);
        assert_ne!(eval.accuracy, Accuracy::Defined(0.0));
        assert!(eval.per_class.values().all(|a| !a.is_defined()));
        assert_eq!(eval.samples, 0);
    }

    #[test]
    fn short_test_vector_is_an_error() {
        let set = separable(5);
        let model = train(&ClassifierKind::cart(), &set, &set.bands).unwrap();
        let test = SampleSet::new(set.bands.clone(), vec![sample(0, 1, vec![0.0])]);
        assert!(matches!(
            evaluate(model.as_ref(), &test),
            Err(Error::FeatureLength { pixel: 0, expected: 2, got: 1 })
        ));
    }

    #[test]
    fn metrics_from_known_matrix() {
        let mut m = ConfusionMatrix::new(&[1, 2]);
        for _ in 0..45 {
            m.record(1, 1);
        }
        for _ in 0..5 {
            m.record(1, 2);
        }
        for _ in 0..15 {
            m.record(2, 1);
        }
        for _ in 0..35 {
            m.record(2, 2);
        }
        assert_eq!(m.total(), 100);
        assert_eq!(m.trace(), 80);
        assert_relative_eq!(m.accuracy().value().unwrap(), 0.8);
        assert_relative_eq!(m.producers_accuracy()[&1].value().unwrap(), 0.9);
        assert_relative_eq!(m.consumers_accuracy()[&1].value().unwrap(), 0.75);
        // po = 0.8, pe = 0.5·0.6 + 0.5·0.4 = 0.5.
        assert_relative_eq!(m.kappa().value().unwrap(), 0.6, epsilon = 1e-12);
        assert_eq!(m.to_rows(), vec![vec![45, 5], vec![15, 35]]);
    }

    #[test]
    fn unseen_predicted_label_extends_axis() {
        let mut m = ConfusionMatrix::new(&[1, 2]);
        m.record(2, 3);
        assert_eq!(m.labels(), &[1, 2, 3]);
        assert_eq!(m.accuracy(), Accuracy::Defined(0.0));
        assert_eq!(m.producers_accuracy()[&1], Accuracy::Undefined);
    }

    #[test]
    fn accuracy_serialises_as_nullable_number() {
        assert_eq!(serde_json::to_string(&Accuracy::Undefined).unwrap(), "null");
        assert_eq!(serde_json::to_string(&Accuracy::Defined(0.5)).unwrap(), "0.5");
        let back: Accuracy = serde_json::from_str("null").unwrap();
        assert_eq!(back, Accuracy::Undefined);
    }

    #[test]
    fn importances_only_for_forests() {
        let set = separable(10);
        let forest = train(&ClassifierKind::forest(5, 1), &set, &set.bands).unwrap();
        let cart = train(&ClassifierKind::cart(), &set, &set.bands).unwrap();
        assert_eq!(importances(forest.as_ref()).map(|m| m.len()), Some(2));
        assert!(importances(cart.as_ref()).is_none());
    }
}
