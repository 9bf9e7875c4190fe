//! End-to-end orchestration.
//!
//! covariates → feature stack → proxy labels → stratified sample → split →
//! train/evaluate each classifier → cross-validate → full-extent prediction
//! with Noise = 0 → export of one map per classifier. A failing stage aborts
//! the run with [`Error::Stage`]; nothing is exported unless every stage
//! succeeded.

use std::collections::BTreeMap;

use tracing::info;

use crate::classifier::{ClassificationModel, ClassifierKind, Trainable};
use crate::config::PipelineConfig;
use crate::covariates::derive_covariates;
use crate::cross_validation::CrossValidator;
use crate::error::{Error, Result, Stage, StageExt};
use crate::evaluate::{evaluate, importances};
use crate::features::{BandSet, FeatureStack, COVARIATE_BANDS};
use crate::labeler::{without_noise, LabelerConfig, ProxyLabeler};
use crate::predict::predict;
use crate::raster::ClassRaster;
use crate::region::RegionMask;
use crate::report::{chart_sample, ClassifierReport, PipelineReport};
use crate::sampler::Sampler;
use crate::source::{ExportSink, RasterSource};
use crate::splitter::Splitter;

/// Everything a run produces.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub report: PipelineReport,
    /// Proxy label surface.
    pub labels: ClassRaster,
    /// One prediction raster per classifier, in configuration order.
    pub predictions: Vec<ClassRaster>,
}

#[derive(Debug, Clone)]
pub struct LivabilityPipeline {
    config: PipelineConfig,
    labeler: ProxyLabeler,
    sampler: Sampler,
    splitter: Splitter,
    validator: CrossValidator,
}

impl LivabilityPipeline {
    /// Validate the configuration and build every stage.
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            labeler: ProxyLabeler::new(LabelerConfig { seed: config.labeler.seed }),
            sampler: Sampler::new(config.sampler)?,
            splitter: Splitter::new(config.split)?,
            validator: CrossValidator::new(config.cross_validation.clone())?,
            config,
        })
    }

    pub fn run(&self, source: &dyn RasterSource, sink: &dyn ExportSink) -> Result<PipelineOutput> {
        let cfg = &self.config;

        let region = source.region(&cfg.region).at(Stage::Covariates)?;
        let layers = derive_covariates(source, &cfg.assets).at(Stage::Covariates)?;
        info!(region = %region.name, layers = layers.len(), "covariates derived");

        let grid = layers[0].grid;
        let mask = RegionMask::rasterize(&region, &grid);
        if mask.count() == 0 {
            return Err(Error::EmptyRegion).at(Stage::FeatureStack);
        }
        let stack = FeatureStack::build(&mask, layers).at(Stage::FeatureStack)?;
        let covariates = BandSet::new(COVARIATE_BANDS).at(Stage::FeatureStack)?;
        stack.require(&covariates).at(Stage::FeatureStack)?;
        info!(
            width = grid.width,
            height = grid.height,
            region_pixels = mask.count(),
            bands = ?stack.band_names(),
            "feature stack built"
        );

        let labeled = self.labeler.label(stack).at(Stage::Labeling)?;
        let bands = BandSet::model_bands();
        labeled.stack.require(&bands).at(Stage::Labeling)?;

        let samples = self
            .sampler
            .sample(&labeled.stack, &labeled.labels, &bands)
            .at(Stage::Sampling)?;
        let sample_size = samples.len();
        let sample_distribution = samples.class_distribution();

        let split = self.splitter.split(samples).at(Stage::Splitting)?;

        let mut models: Vec<Box<dyn ClassificationModel>> =
            Vec::with_capacity(cfg.classifiers.len());
        let mut evaluations = Vec::with_capacity(cfg.classifiers.len());
        for kind in &cfg.classifiers {
            let model = kind.train(&split.train, &bands).at(Stage::Training)?;
            let evaluation = evaluate(model.as_ref(), &split.test).at(Stage::Evaluation)?;
            info!(
                classifier = kind.name(),
                accuracy = %evaluation.accuracy,
                kappa = %evaluation.kappa,
                "classifier evaluated"
            );
            models.push(model);
            evaluations.push(evaluation);
        }

        let cross_validation = self
            .validator
            .cross_validate(&split.keyed, &bands)
            .at(Stage::CrossValidation)?;

        let omitted_layers = labeled.stack.omitted().to_vec();
        let deploy = without_noise(labeled.stack).at(Stage::Prediction)?;
        let mut predictions = Vec::with_capacity(models.len());
        for (kind, model) in cfg.classifiers.iter().zip(&models) {
            let name = format!("classified_{}", kind.name());
            predictions.push(predict(model.as_ref(), &deploy, &name).at(Stage::Prediction)?);
        }

        let primary = cfg.classifiers[0].name();
        let chart = chart_sample(&deploy, &predictions[0], primary, &cfg.chart_sample)
            .at(Stage::Prediction)?;

        let mut exported = Vec::with_capacity(predictions.len());
        for (kind, raster) in cfg.classifiers.iter().zip(&predictions) {
            let name = export_name(kind, &region.name);
            sink.export(&name, raster, cfg.export_scale_m, &region).at(Stage::Export)?;
            info!(name = %name, scale_m = cfg.export_scale_m, "prediction exported");
            exported.push(name);
        }

        let mut comparison = BTreeMap::new();
        let mut classifiers = Vec::with_capacity(models.len());
        let trained = cfg.classifiers.iter().zip(&models).zip(evaluations).zip(&predictions);
        for (((kind, model), evaluation), raster) in trained {
            comparison.insert(kind.name().to_string(), evaluation.accuracy);
            classifiers.push(ClassifierReport {
                name: kind.name().to_string(),
                kind: kind.clone(),
                importances: importances(model.as_ref()),
                predicted_distribution: raster.histogram(),
                evaluation,
            });
        }

        let report = PipelineReport {
            region: region.name.clone(),
            bands: bands.names().to_vec(),
            omitted_layers,
            label_distribution: labeled.labels.histogram(),
            sample_size,
            sample_distribution,
            train_size: split.train.len(),
            test_size: split.test.len(),
            classifiers,
            comparison,
            cross_validation,
            chart,
            exported,
        };
        Ok(PipelineOutput { report, labels: labeled.labels, predictions })
    }
}

/// `Livability_<classifier>_<region>`.
pub fn export_name(kind: &ClassifierKind, region: &str) -> String {
    format!("Livability_{}_{}", kind.name(), region)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::features::NOISE;
    use crate::raster::{Grid, RasterLayer};
    use crate::region::Region;
    use crate::sampler::SamplerConfig;
    use crate::source::{MemorySink, NullSink};
    use crate::synthetic::{SyntheticScene, SYNTHETIC_REGION};

    fn small_config() -> PipelineConfig {
        PipelineConfig {
            region: SYNTHETIC_REGION.to_string(),
            sampler: SamplerConfig { num_points: 300, scale_m: 30.0, seed: 42 },
            classifiers: vec![ClassifierKind::forest(10, 42), ClassifierKind::cart()],
            cross_validation: crate::cross_validation::CrossValidationConfig {
                k: 3,
                classifier: ClassifierKind::forest(5, 42),
            },
            ..Default::default()
        }
    }

    #[test]
    fn run_exports_one_map_per_classifier() {
        let cfg = small_config();
        let source = SyntheticScene::generate(40, 30, 11).into_source(&cfg.assets);
        let sink = MemorySink::new();
        let out = LivabilityPipeline::new(cfg).unwrap().run(&source, &sink).unwrap();

        let exports = sink.exports();
        let names: Vec<&str> = exports.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["Livability_RandomForest_Synthetic", "Livability_CART_Synthetic"]);
        assert_eq!(out.report.exported, names);
        for (e, raster) in exports.iter().zip(&out.predictions) {
            assert_eq!(&e.raster, raster);
        }
        assert_eq!(out.predictions.len(), 2);
        assert_eq!(out.report.train_size + out.report.test_size, out.report.sample_size);
        assert_eq!(out.report.cross_validation.folds.len(), 3);
    }

    #[test]
    fn deployed_map_is_classified_with_zero_noise() {
        let cfg = small_config();
        let source = SyntheticScene::generate(40, 30, 11).into_source(&cfg.assets);
        let out = LivabilityPipeline::new(cfg.clone()).unwrap().run(&source, &NullSink).unwrap();

        let layers = derive_covariates(&source, &cfg.assets).unwrap();
        let region = source.region(&cfg.region).unwrap();
        let mask = RegionMask::rasterize(&region, &layers[0].grid);
        let stack = FeatureStack::build(&mask, layers).unwrap();
        let labeled = ProxyLabeler::new(cfg.labeler).label(stack).unwrap();
        let bands = BandSet::model_bands();
        let sampler = Sampler::new(cfg.sampler).unwrap();
        let samples = sampler.sample(&labeled.stack, &labeled.labels, &bands).unwrap();
        let split = Splitter::new(cfg.split).unwrap().split(samples).unwrap();
        let model = cfg.classifiers[0].train(&split.train, &bands).unwrap();

        let deploy = without_noise(labeled.stack).unwrap();
        assert!(deploy.band(NOISE).unwrap().data.iter().all(|&v| v == 0.0));
        let expected = predict(model.as_ref(), &deploy, &out.predictions[0].name).unwrap();
        assert_eq!(out.predictions[0], expected);

        for (r, c) in [(0, 0), (7, 13), (29, 39)] {
            let fv = deploy.feature_vector(&bands, r, c).unwrap();
            assert_eq!(fv.values.last(), Some(&0.0));
            assert_eq!(model.predict(&fv), out.predictions[0].get(r, c));
        }
    }

    #[test]
    fn missing_region_names_the_stage() {
        let cfg = PipelineConfig { region: "Atlantis".into(), ..small_config() };
        let source = SyntheticScene::generate(8, 8, 1).into_source(&cfg.assets);
        let err = LivabilityPipeline::new(cfg).unwrap().run(&source, &NullSink).unwrap_err();
        assert_eq!(err.stage(), Some(Stage::Covariates));
        assert_eq!(err.kind(), ErrorKind::Data);
    }

    #[test]
    fn region_outside_grid_fails_before_export() {
        let cfg = small_config();
        let scene = SyntheticScene::generate(8, 8, 1);
        let far = Region::new(SYNTHETIC_REGION, vec![(10.0, 10.0), (11.0, 10.0), (11.0, 11.0)]);
        let source = scene.into_source(&cfg.assets).with_region(far);
        let sink = MemorySink::new();
        let err = LivabilityPipeline::new(cfg).unwrap().run(&source, &sink).unwrap_err();
        assert_eq!(err.stage(), Some(Stage::FeatureStack));
        assert!(sink.exports().is_empty());
    }

    #[test]
    fn unalignable_layer_is_a_configuration_error() {
        let cfg = small_config();
        let far = Grid::new(4, 4, 100.0, 101.0, 40.0, 41.0);
        let source = SyntheticScene::generate(8, 8, 1)
            .into_source(&cfg.assets)
            .with_layer(cfg.assets.population.clone(), RasterLayer::filled("population", far, 1.0));
        let err = LivabilityPipeline::new(cfg).unwrap().run(&source, &NullSink).unwrap_err();
        assert_eq!(err.stage(), Some(Stage::FeatureStack));
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn invalid_config_is_rejected_up_front() {
        let cfg = PipelineConfig { export_scale_m: -1.0, ..small_config() };
        assert!(LivabilityPipeline::new(cfg).is_err());
    }
}
