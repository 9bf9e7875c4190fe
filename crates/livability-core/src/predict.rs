//! Full-extent prediction.
//!
//! Every region pixel is classified independently from its feature vector
//! in the model's band order. Pixels outside the region are nodata. A
//! predicted label outside `1..=3` or outside the labels the model was
//! trained on is a fatal error; nothing is masked.

use tracing::info;

use crate::classifier::ClassificationModel;
use crate::error::{Error, Result};
use crate::features::FeatureStack;
use crate::labeler::LivabilityClass;
use crate::par::*;
use crate::raster::ClassRaster;

/// Classify every region pixel of `stack`.
pub fn predict(
    model: &dyn ClassificationModel,
    stack: &FeatureStack,
    name: &str,
) -> Result<ClassRaster> {
    let columns = stack.columns(model.bands())?;
    let grid = *stack.grid();
    let mask = stack.mask();
    let classes = model.classes();

    let rows: Vec<Result<Vec<u8>>> = (0..grid.height)
        .into_par_iter()
        .map(|r| {
            let mut values = vec![0.0f32; columns.len()];
            let mut out = Vec::with_capacity(grid.width);
            for c in 0..grid.width {
                if !mask.contains(r, c) {
                    out.push(ClassRaster::NO_DATA);
                    continue;
                }
                let idx = grid.index(r, c);
                for (dst, band) in values.iter_mut().zip(&columns) {
                    *dst = band.data[idx];
                }
                let label = model.predict_values(&values);
                if LivabilityClass::from_label(label).is_none() || !classes.contains(&label) {
                    return Err(Error::LabelOutOfDomain { label, row: r, col: c });
                }
                out.push(label);
            }
            Ok(out)
        })
        .collect();

    let mut data = Vec::with_capacity(grid.len());
    for row in rows {
        data.extend(row?);
    }
    let raster = ClassRaster::new(name, &grid, data)?;
    info!(raster = name, classes = ?raster.histogram(), "prediction raster produced");
    Ok(raster)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{train, ClassifierKind};
    use crate::features::{BandSet, NDVI};
    use crate::raster::{Grid, RasterLayer};
    use crate::region::RegionMask;
    use crate::sample::{fixtures::sample, SampleSet};

    #[derive(Debug)]
    struct Constant {
        bands: BandSet,
        classes: Vec<u8>,
        label: u8,
    }

    impl ClassificationModel for Constant {
        fn bands(&self) -> &BandSet {
            &self.bands
        }
        fn classes(&self) -> &[u8] {
            &self.classes
        }
        fn predict_values(&self, _: &[f32]) -> u8 {
            self.label
        }
    }

    fn stack(flags: Vec<bool>) -> FeatureStack {
        let g = Grid::new(4, 2, 36.7, 36.8, -1.3, -1.2);
        let mut ndvi = RasterLayer::filled(NDVI, g, 0.0);
        for c in 0..4 {
            ndvi.set(0, c, 0.2 * c as f32);
            ndvi.set(1, c, 0.2 * c as f32);
        }
        let mask = RegionMask::from_flags(&g, flags).unwrap();
        FeatureStack::build(&mask, vec![ndvi]).unwrap()
    }

    #[test]
    fn trained_model_labels_region_pixels() {
        let bands = BandSet::new([NDVI]).unwrap();
        let samples = [(1, 0.0), (1, 0.2), (3, 0.4), (3, 0.6)]
            .into_iter()
            .enumerate()
            .map(|(i, (label, v))| sample(i, label, vec![v]))
            .collect();
        let set = SampleSet::new(bands.clone(), samples);
        let model = train(&ClassifierKind::cart(), &set, &bands).unwrap();
        let mut flags = vec![true; 8];
        flags[7] = false;
        let out = predict(model.as_ref(), &stack(flags), "classified_RF").unwrap();
        assert_eq!(out.data, vec![1, 1, 3, 3, 1, 1, 3, ClassRaster::NO_DATA]);
        assert_eq!(out.name, "classified_RF");
    }

    #[test]
    fn label_outside_domain_is_fatal() {
        let bands = BandSet::new([NDVI]).unwrap();
        let bad = Constant { bands: bands.clone(), classes: vec![1, 2, 7], label: 7 };
        match predict(&bad, &stack(vec![true; 8]), "x") {
            Err(Error::LabelOutOfDomain { label, row, col }) => {
                assert_eq!((label, row, col), (7, 0, 0))
            }
            other => panic!("expected LabelOutOfDomain, got {other:?}"),
        }

        let unseen = Constant { bands, classes: vec![1, 2], label: 3 };
        let out = predict(&unseen, &stack(vec![true; 8]), "x");
        assert!(matches!(out, Err(Error::LabelOutOfDomain { .. })));
    }

    #[test]
    fn missing_model_band_is_a_configuration_error() {
        let bands = BandSet::new(["Noise"]).unwrap();
        let model = Constant { bands, classes: vec![1], label: 1 };
        let out = predict(&model, &stack(vec![true; 8]), "x");
        assert!(matches!(out, Err(Error::MissingBand { .. })));
    }
}
