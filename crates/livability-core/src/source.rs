//! Collaborator seams: where rasters come from and where results go.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::{Error, Result};
use crate::raster::{ClassRaster, RasterLayer};
use crate::region::Region;

/// Read-only provider of region boundaries and raster layers.
pub trait RasterSource {
    /// Boundary of the named region.
    fn region(&self, name: &str) -> Result<Region>;

    /// Raster layer for an asset id.
    fn layer(&self, asset_id: &str) -> Result<RasterLayer>;
}

/// Durable storage for finished prediction rasters.
pub trait ExportSink {
    fn export(&self, name: &str, raster: &ClassRaster, scale_m: f64, region: &Region) -> Result<()>;
}

/// In-memory source keyed by region name and asset id.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    regions: HashMap<String, Region>,
    layers: HashMap<String, RasterLayer>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_region(mut self, region: Region) -> Self {
        self.regions.insert(region.name.clone(), region);
        self
    }

    pub fn with_layer(mut self, asset_id: impl Into<String>, layer: RasterLayer) -> Self {
        self.layers.insert(asset_id.into(), layer);
        self
    }
}

impl RasterSource for MemorySource {
    fn region(&self, name: &str) -> Result<Region> {
        self.regions
            .get(name)
            .cloned()
            .ok_or_else(|| Error::Source(format!("unknown region '{name}'")))
    }

    fn layer(&self, asset_id: &str) -> Result<RasterLayer> {
        self.layers
            .get(asset_id)
            .cloned()
            .ok_or_else(|| Error::Source(format!("unknown asset '{asset_id}'")))
    }
}

/// One export request as received by [`MemorySink`].
#[derive(Debug, Clone, PartialEq)]
pub struct Exported {
    pub name: String,
    pub raster: ClassRaster,
    pub scale_m: f64,
    pub region: String,
}

/// Sink that keeps exports in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    exports: Mutex<Vec<Exported>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn exports(&self) -> Vec<Exported> {
        self.exports.lock().map(|v| v.clone()).unwrap_or_default()
    }
}

impl ExportSink for MemorySink {
    fn export(
        &self,
        name: &str,
        raster: &ClassRaster,
        scale_m: f64,
        region: &Region,
    ) -> Result<()> {
        let mut exports =
            self.exports.lock().map_err(|_| Error::Source("export sink poisoned".to_string()))?;
        exports.push(Exported {
            name: name.to_string(),
            raster: raster.clone(),
            scale_m,
            region: region.name.clone(),
        });
        Ok(())
    }
}

/// Sink that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl ExportSink for NullSink {
    fn export(&self, _: &str, _: &ClassRaster, _: f64, _: &Region) -> Result<()> {
        Ok(())
    }
}
