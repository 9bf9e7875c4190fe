//! Random forest: bootstrap-aggregated CART trees with random feature
//! subsets per split.

use std::collections::BTreeMap;

use rand::Rng;
use tracing::debug;

use super::tree::{DecisionTree, Growth};
use super::{ClassificationModel, TrainingData};
use crate::features::BandSet;
use crate::par::*;
use crate::rng::{substream, TREE_SALT};

#[derive(Debug, Clone)]
pub struct RandomForest {
    bands: BandSet,
    classes: Vec<u8>,
    trees: Vec<DecisionTree>,
    importances: Vec<f64>,
}

impl RandomForest {
    /// Tree `t` draws its bootstrap and feature subsets from sub-stream `t`
    /// of `seed`, so the forest is identical however the trees are scheduled.
    pub(crate) fn fit(
        data: &TrainingData,
        n_trees: usize,
        seed: u64,
        max_depth: Option<usize>,
    ) -> Self {
        let n = data.rows.len();
        let p = data.bands.len();
        let max_features = ((p as f64).sqrt().floor() as usize).max(1);
        let dataset = data.dataset();

        let grown: Vec<(DecisionTree, Vec<f64>)> = (0..n_trees)
            .into_par_iter()
            .map(|t| {
                let mut rng = substream(seed, TREE_SALT, t as u64);
                let bootstrap: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
                let mut importance = vec![0.0; p];
                let growth =
                    Growth { max_features: Some(max_features), max_depth, rng: Some(&mut rng) };
                let tree = DecisionTree::fit(&dataset, bootstrap, growth, &mut importance);
                (tree, importance)
            })
            .collect();

        let mut importances = vec![0.0; p];
        let mut trees = Vec::with_capacity(n_trees);
        for (tree, imp) in grown {
            for (total, v) in importances.iter_mut().zip(imp) {
                *total += v;
            }
            trees.push(tree);
        }
        debug!(
            trees = trees.len(),
            max_features,
            max_depth = trees.iter().map(DecisionTree::depth).max().unwrap_or(0),
            "random forest grown"
        );

        Self { bands: data.bands.clone(), classes: data.classes.clone(), trees, importances }
    }
}

impl ClassificationModel for RandomForest {
    fn bands(&self) -> &BandSet {
        &self.bands
    }

    fn classes(&self) -> &[u8] {
        &self.classes
    }

    /// Majority vote; ties go to the lowest label.
    fn predict_values(&self, values: &[f32]) -> u8 {
        let mut votes = vec![0usize; self.classes.len()];
        for tree in &self.trees {
            votes[tree.predict(values)] += 1;
        }
        let mut best = 0;
        for (k, &v) in votes.iter().enumerate() {
            if v > votes[best] {
                best = k;
            }
        }
        self.classes[best]
    }

    fn importances(&self) -> Option<BTreeMap<String, f64>> {
        Some(self.bands.names().iter().cloned().zip(self.importances.iter().copied()).collect())
    }
}
