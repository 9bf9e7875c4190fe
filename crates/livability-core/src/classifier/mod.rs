//! Supervised classifiers trained on a [`SampleSet`].
//!
//! Two families: a random forest (seeded, with importances) and a single
//! CART tree. Both are deterministic for identical input and configuration.

mod forest;
mod tree;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::features::{BandSet, FeatureVector};
use crate::sample::SampleSet;

pub use forest::RandomForest;
use tree::{Dataset, DecisionTree, Growth};

/// Classifier family and its parameters. `max_depth` caps every tree
/// (root = depth 0); trees grow until leaves are pure when it is absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClassifierKind {
    RandomForest {
        trees: usize,
        seed: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_depth: Option<usize>,
    },
    Cart {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_depth: Option<usize>,
    },
}

impl Default for ClassifierKind {
    fn default() -> Self {
        ClassifierKind::forest(100, 42)
    }
}

impl ClassifierKind {
    /// Random forest with unbounded tree depth.
    pub fn forest(trees: usize, seed: u64) -> Self {
        ClassifierKind::RandomForest { trees, seed, max_depth: None }
    }

    /// Single CART tree with unbounded depth.
    pub fn cart() -> Self {
        ClassifierKind::Cart { max_depth: None }
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        match &mut self {
            ClassifierKind::RandomForest { max_depth, .. } | ClassifierKind::Cart { max_depth } => {
                *max_depth = Some(depth);
            }
        }
        self
    }

    pub fn max_depth(&self) -> Option<usize> {
        match *self {
            ClassifierKind::RandomForest { max_depth, .. }
            | ClassifierKind::Cart { max_depth } => max_depth,
        }
    }

    /// Short display name used as the report key.
    pub fn name(&self) -> &'static str {
        match self {
            ClassifierKind::RandomForest { .. } => "RandomForest",
            ClassifierKind::Cart { .. } => "CART",
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            ClassifierKind::RandomForest { trees: 0, .. } => {
                Err(Error::invalid("classifier.trees", 0, "a forest needs at least one tree"))
            }
            _ => Ok(()),
        }
    }
}

impl fmt::Display for ClassifierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClassifierKind::RandomForest { trees, seed, max_depth: None } => {
                write!(f, "RandomForest(trees={trees}, seed={seed})")
            }
            ClassifierKind::RandomForest { trees, seed, max_depth: Some(d) } => {
                write!(f, "RandomForest(trees={trees}, seed={seed}, max_depth={d})")
            }
            ClassifierKind::Cart { max_depth: None } => f.write_str("CART"),
            ClassifierKind::Cart { max_depth: Some(d) } => write!(f, "CART(max_depth={d})"),
        }
    }
}

/// A trained model. Input values follow [`ClassificationModel::bands`].
pub trait ClassificationModel: Send + Sync + fmt::Debug {
    /// Band layout the model was trained on.
    fn bands(&self) -> &BandSet;

    /// Labels seen in training, ascending.
    fn classes(&self) -> &[u8];

    /// Predict from raw values in band order.
    fn predict_values(&self, values: &[f32]) -> u8;

    fn predict(&self, features: &FeatureVector) -> u8 {
        self.predict_values(&features.values)
    }

    /// Per-band importance, for models that report it.
    fn importances(&self) -> Option<BTreeMap<String, f64>> {
        None
    }
}

/// Something that can fit a [`ClassificationModel`].
pub trait Trainable {
    fn train(&self, set: &SampleSet, fields: &BandSet) -> Result<Box<dyn ClassificationModel>>;
}

impl Trainable for ClassifierKind {
    fn train(&self, set: &SampleSet, fields: &BandSet) -> Result<Box<dyn ClassificationModel>> {
        self.validate()?;
        let data = TrainingData::prepare(set, fields)?;
        let model: Box<dyn ClassificationModel> = match *self {
            ClassifierKind::RandomForest { trees, seed, max_depth } => {
                Box::new(RandomForest::fit(&data, trees, seed, max_depth))
            }
            ClassifierKind::Cart { max_depth } => Box::new(SingleTree::fit(&data, max_depth)),
        };
        info!(
            classifier = %self,
            samples = data.rows.len(),
            classes = ?data.classes,
            "model trained"
        );
        Ok(model)
    }
}

/// Fit `kind` on `set` using the `fields` columns.
pub fn train(
    kind: &ClassifierKind,
    set: &SampleSet,
    fields: &BandSet,
) -> Result<Box<dyn ClassificationModel>> {
    kind.train(set, fields)
}

/// Training rows projected onto the requested fields, with labels mapped
/// to class indices.
pub(crate) struct TrainingData {
    pub bands: BandSet,
    pub rows: Vec<Vec<f32>>,
    pub targets: Vec<usize>,
    pub classes: Vec<u8>,
}

impl TrainingData {
    fn prepare(set: &SampleSet, fields: &BandSet) -> Result<Self> {
        if set.is_empty() {
            return Err(Error::EmptyTrainingSet);
        }
        let projection = set.projection(fields)?;
        set.ensure_complete()?;
        let rows: Vec<Vec<f32>> = set
            .iter()
            .map(|s| projection.iter().map(|&j| s.features.get(j)).collect())
            .collect();

        let labels: BTreeSet<u8> = set.iter().map(|s| s.label).collect();
        let classes: Vec<u8> = labels.into_iter().collect();
        if let [only] = classes[..] {
            return Err(Error::SingleClass { label: only });
        }
        let targets = set
            .iter()
            .map(|s| classes.binary_search(&s.label).unwrap_or_default())
            .collect();

        Ok(Self { bands: fields.clone(), rows, targets, classes })
    }

    fn dataset(&self) -> Dataset<'_> {
        Dataset { rows: &self.rows, targets: &self.targets, n_classes: self.classes.len() }
    }
}

/// Single CART tree over all features. Reports no importances.
#[derive(Debug, Clone)]
pub struct SingleTree {
    bands: BandSet,
    classes: Vec<u8>,
    tree: DecisionTree,
}

impl SingleTree {
    fn fit(data: &TrainingData, max_depth: Option<usize>) -> Self {
        let dataset = data.dataset();
        let mut unused = vec![0.0; data.bands.len()];
        let growth = Growth { max_features: None, max_depth, rng: None };
        let tree = DecisionTree::fit(&dataset, (0..data.rows.len()).collect(), growth, &mut unused);
        debug!(depth = tree.depth(), "single tree grown");
        Self { bands: data.bands.clone(), classes: data.classes.clone(), tree }
    }
}

impl ClassificationModel for SingleTree {
    fn bands(&self) -> &BandSet {
        &self.bands
    }

    fn classes(&self) -> &[u8] {
        &self.classes
    }

    fn predict_values(&self, values: &[f32]) -> u8 {
        self.classes[self.tree.predict(values)]
    }
}
