//! Train/test partitioning by a per-sample random key.
//!
//! Each sample gets a key in `[0, 1)` drawn from a sub-stream of the seed
//! indexed by the sample's pixel, so a sample's key does not depend on where
//! it sits in the set. `key < train_fraction` goes to train, the rest to
//! test. The same keys drive the cross-validation folds.

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Error, Result, Stage};
use crate::rng::{substream, SPLIT_SALT};
use crate::sample::SampleSet;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SplitConfig {
    pub train_fraction: f64,
    pub seed: u64,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self { train_fraction: 0.7, seed: 42 }
    }
}

/// Keyed input set and its two halves.
#[derive(Debug, Clone)]
pub struct TrainTest {
    /// Every input sample with its partition key.
    pub keyed: SampleSet,
    pub train: SampleSet,
    pub test: SampleSet,
}

#[derive(Debug, Clone)]
pub struct Splitter {
    config: SplitConfig,
}

impl Splitter {
    pub fn new(config: SplitConfig) -> Result<Self> {
        let f = config.train_fraction;
        if !(0.0..=1.0).contains(&f) {
            return Err(Error::invalid("split.train_fraction", f, "must lie in [0, 1]"));
        }
        Ok(Self { config })
    }

    /// Attach a partition key to every sample, replacing any existing key.
    pub fn assign_keys(&self, mut set: SampleSet) -> SampleSet {
        for s in &mut set.samples {
            let mut rng = substream(self.config.seed, SPLIT_SALT, s.pixel as u64);
            s.key = Some(rng.gen::<f64>());
        }
        set
    }

    pub fn split(&self, set: SampleSet) -> Result<TrainTest> {
        set.ensure_not_empty(Stage::Splitting)?;
        let keyed = self.assign_keys(set);
        let fraction = self.config.train_fraction;
        let (train, test) = keyed.partition_by_key(|k| k < fraction)?;
        info!(train = train.len(), test = test.len(), fraction, "samples partitioned");
        Ok(TrainTest { keyed, train, test })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::sample::fixtures::separable;

    fn pixels(set: &SampleSet) -> BTreeSet<usize> {
        set.iter().map(|s| s.pixel).collect()
    }

    #[test]
    fn rejects_fraction_outside_unit_interval() {
        for f in [-0.2, 1.5, f64::NAN, f64::INFINITY] {
            assert!(Splitter::new(SplitConfig { train_fraction: f, seed: 1 }).is_err(), "{f}");
        }
    }

    #[test]
    fn partition_is_exact_for_every_seed_and_fraction() {
        for seed in [0, 1, 7, 42, 1234, u64::MAX] {
            for fraction in [0.0, 0.1, 0.5, 0.7, 0.95, 1.0] {
                let config = SplitConfig { train_fraction: fraction, seed };
                let splitter = Splitter::new(config).unwrap();
                let split = splitter.split(separable(50)).unwrap();
                let context = format!("seed {seed}, fraction {fraction}");
                assert_eq!(split.train.len() + split.test.len(), 100, "{context}");

                let all = pixels(&split.keyed);
                let train = pixels(&split.train);
                let test = pixels(&split.test);
                assert_eq!(all.len(), 100);
                assert!(train.is_disjoint(&test), "{context}");
                assert_eq!(train.union(&test).copied().collect::<BTreeSet<_>>(), all);

                let again = splitter.split(separable(50)).unwrap();
                assert_eq!(pixels(&again.train), train);
            }
        }
    }

    #[test]
    fn unit_fractions_send_everything_one_way() {
        let split_at = |train_fraction| {
            let splitter = Splitter::new(SplitConfig { train_fraction, seed: 3 }).unwrap();
            splitter.split(separable(20)).unwrap()
        };
        let none = split_at(0.0);
        assert!(none.train.is_empty());
        assert_eq!(none.test.len(), 40);
        let all = split_at(1.0);
        assert_eq!(all.train.len(), 40);
        assert!(all.test.is_empty());
    }

    #[test]
    fn keys_follow_pixels_not_order() {
        let splitter = Splitter::new(SplitConfig::default()).unwrap();
        let forward = splitter.assign_keys(separable(10));
        let mut reversed = separable(10);
        reversed.samples.reverse();
        let reversed = splitter.assign_keys(reversed);
        for s in forward.iter() {
            let twin = reversed.iter().find(|t| t.pixel == s.pixel).unwrap();
            assert_eq!(s.key, twin.key);
            let k = s.key.unwrap();
            assert!((0.0..1.0).contains(&k));
        }
    }

    #[test]
    fn empty_set_is_a_data_error() {
        let splitter = Splitter::new(SplitConfig::default()).unwrap();
        let empty = SampleSet::empty(separable(1).bands);
        assert!(matches!(
            splitter.split(empty),
            Err(Error::EmptySampleSet { stage: Stage::Splitting })
        ));
    }
}
