//! Livability classification of a region from raster covariates.
//!
//! Proxy labels are synthesised from NDVI/NDBI thresholds with seeded jitter,
//! a stratified sample is drawn and split, classifiers are trained, scored
//! and cross-validated, and the region is classified pixel by pixel.
//! [`pipeline::LivabilityPipeline`] runs the whole chain against a
//! [`source::RasterSource`] and an [`source::ExportSink`]; every component
//! is also usable on its own.

pub mod classifier;
pub mod config;
pub mod covariates;
pub mod cross_validation;
pub mod error;
pub mod evaluate;
pub mod features;
pub mod labeler;
mod par;
pub mod pipeline;
pub mod predict;
pub mod raster;
pub mod region;
pub mod report;
mod rng;
pub mod sample;
pub mod sampler;
pub mod source;
pub mod splitter;
pub mod synthetic;
pub mod terrain;

pub use error::{Error, ErrorKind, Result, Stage};
pub use pipeline::{LivabilityPipeline, PipelineOutput};
