use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result, Stage};
use crate::features::{BandSet, FeatureVector};

/// One labeled point drawn from the labeled surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Row-major pixel index on the reference grid. Unique within a set.
    pub pixel: usize,
    pub row: usize,
    pub col: usize,
    pub lon: f64,
    pub lat: f64,
    pub label: u8,
    pub features: FeatureVector,
    /// Partition key in `[0, 1)`, assigned by the splitter.
    pub key: Option<f64>,
}

/// Samples sharing one band layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleSet {
    pub bands: BandSet,
    pub samples: Vec<Sample>,
}

impl SampleSet {
    pub fn new(bands: BandSet, samples: Vec<Sample>) -> Self {
        Self { bands, samples }
    }

    pub fn empty(bands: BandSet) -> Self {
        Self { bands, samples: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Sample> {
        self.samples.iter()
    }

    /// Sample count per label.
    pub fn class_distribution(&self) -> BTreeMap<u8, usize> {
        let mut counts = BTreeMap::new();
        for s in &self.samples {
            *counts.entry(s.label).or_insert(0) += 1;
        }
        counts
    }

    /// `Err(EmptySampleSet)` tagged with `stage` when the set is empty.
    pub fn ensure_not_empty(&self, stage: Stage) -> Result<()> {
        if self.is_empty() {
            Err(Error::EmptySampleSet { stage })
        } else {
            Ok(())
        }
    }

    /// `Err(FeatureLength)` for the first sample whose vector does not
    /// have one value per band.
    pub fn ensure_complete(&self) -> Result<()> {
        let expected = self.bands.len();
        match self.samples.iter().find(|s| s.features.len() != expected) {
            Some(s) => {
                Err(Error::FeatureLength { pixel: s.pixel, expected, got: s.features.len() })
            }
            None => Ok(()),
        }
    }

    /// Positions of `fields` within this set's band layout.
    pub fn projection(&self, fields: &BandSet) -> Result<Vec<usize>> {
        fields
            .names()
            .iter()
            .map(|f| {
                self.bands.index_of(f).ok_or_else(|| Error::MissingFeature { field: f.clone() })
            })
            .collect()
    }

    /// Split by partition key: samples whose key satisfies `pred` go left.
    /// Every sample must carry a key.
    pub fn partition_by_key(&self, pred: impl Fn(f64) -> bool) -> Result<(SampleSet, SampleSet)> {
        let mut left = Vec::new();
        let mut right = Vec::new();
        for s in &self.samples {
            let key = s.key.ok_or(Error::MissingPartitionKey { pixel: s.pixel })?;
            if pred(key) {
                left.push(s.clone());
            } else {
                right.push(s.clone());
            }
        }
        Ok((SampleSet::new(self.bands.clone(), left), SampleSet::new(self.bands.clone(), right)))
    }
}

impl<'a> IntoIterator for &'a SampleSet {
    type Item = &'a Sample;
    type IntoIter = std::slice::Iter<'a, Sample>;

    fn into_iter(self) -> Self::IntoIter {
        self.samples.iter()
    }
}
