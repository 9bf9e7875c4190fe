//! Directory-backed raster source and export sink.
//!
//! Input layout under the input directory:
//!
//! ```text
//! regions.json                 {"regions": [{"name": ..., "polygons": [...]}]}
//!                              each polygon is {"exterior": [[lon, lat], ...], "holes": [...]}
//! <asset_id>.json              RasterLayer JSON (name, grid bounds, row-major data)
//! <asset_id>.tif               single-band TIFF, north-up
//! <asset_id>.grid.json         grid bounds for the TIFF of the same asset
//! ```
//!
//! Asset ids may contain `/`, which maps to subdirectories.

use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use livability_core::raster::{ClassRaster, Grid, RasterLayer};
use livability_core::region::Region;
use livability_core::source::{ExportSink, RasterSource};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tiff::decoder::{Decoder, DecodingResult};
use tracing::{debug, info};

#[derive(Deserialize)]
struct RegionsFile {
    regions: Vec<Region>,
}

/// Reads regions and layers from files under `root`.
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn load_region(&self, name: &str) -> Result<Region> {
        let path = self.root.join("regions.json");
        let file: RegionsFile = read_json(&path)?;
        match file.regions.into_iter().find(|r| r.name == name) {
            Some(r) => Ok(r),
            None => bail!("region '{}' not listed in {}", name, path.display()),
        }
    }

    fn load_layer(&self, asset_id: &str) -> Result<RasterLayer> {
        let json = self.root.join(format!("{asset_id}.json"));
        if json.exists() {
            let layer: RasterLayer = read_json(&json)?;
            if layer.data.len() != layer.grid.len() {
                let (n, shape) = (layer.data.len(), layer.grid.shape());
                bail!("{}: {} values for a {} grid", json.display(), n, shape);
            }
            debug!(asset = asset_id, path = %json.display(), "loaded JSON layer");
            return Ok(layer);
        }

        let tif = self.root.join(format!("{asset_id}.tif"));
        if tif.exists() {
            let sidecar = self.root.join(format!("{asset_id}.grid.json"));
            if !sidecar.exists() {
                bail!("TIFF {} needs {}", tif.display(), sidecar.display());
            }
            let bounds: Grid = read_json(&sidecar)?;
            let layer = read_tiff(&tif, asset_id, bounds)?;
            debug!(asset = asset_id, path = %tif.display(), "loaded TIFF layer");
            return Ok(layer);
        }

        bail!("no {asset_id}.json or {asset_id}.tif under {}", self.root.display())
    }
}

impl RasterSource for DirectorySource {
    fn region(&self, name: &str) -> livability_core::Result<Region> {
        self.load_region(name).map_err(|e| livability_core::Error::Source(format!("{e:#}")))
    }

    fn layer(&self, asset_id: &str) -> livability_core::Result<RasterLayer> {
        self.load_layer(asset_id).map_err(|e| livability_core::Error::Source(format!("{e:#}")))
    }
}

/// Decode a single-band TIFF. TIFF rows run north to south; layers run
/// south to north, so rows are flipped. The TIFF's dimensions override the
/// sidecar's width and height.
fn read_tiff(path: &Path, name: &str, bounds: Grid) -> Result<RasterLayer> {
    let bytes = fs::read(path).with_context(|| format!("Cannot open {}", path.display()))?;
    let mut decoder = Decoder::new(Cursor::new(bytes))
        .with_context(|| format!("Not a valid TIFF: {}", path.display()))?;
    let (width, height) = decoder
        .dimensions()
        .with_context(|| format!("Dimensions error: {}", path.display()))?;
    let (width, height) = (width as usize, height as usize);
    let image = decoder
        .read_image()
        .with_context(|| format!("read_image failed: {}", path.display()))?;

    let values: Vec<f32> = match image {
        DecodingResult::F32(v) => v,
        DecodingResult::F64(v) => v.into_iter().map(|x| x as f32).collect(),
        DecodingResult::U8(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::U16(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::I16(v) => v.into_iter().map(f32::from).collect(),
        _ => bail!("Unsupported pixel type in {}", path.display()),
    };
    if width == 0 || values.len() != width * height {
        bail!("{}: expected a single band of {}x{} pixels", path.display(), width, height);
    }

    let mut data = Vec::with_capacity(values.len());
    for row in values.chunks_exact(width).rev() {
        data.extend_from_slice(row);
    }
    let grid = Grid { width, height, ..bounds };
    Ok(RasterLayer::from_data(name, grid, data)?)
}

/// Writes each exported raster as `<root>/<name>.json`.
pub struct DirectorySink {
    root: PathBuf,
}

#[derive(Serialize)]
struct ExportFile<'a> {
    name: &'a str,
    region: &'a str,
    scale_m: f64,
    raster: &'a ClassRaster,
}

impl DirectorySink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn write(&self, name: &str, raster: &ClassRaster, scale_m: f64, region: &Region) -> Result<()> {
        fs::create_dir_all(&self.root)
            .with_context(|| format!("Cannot create {}", self.root.display()))?;
        let path = self.root.join(format!("{name}.json"));
        let file = ExportFile { name, region: &region.name, scale_m, raster };
        let json = serde_json::to_string(&file)?;
        fs::write(&path, json).with_context(|| format!("Write failed: {}", path.display()))?;
        info!(path = %path.display(), "raster exported");
        Ok(())
    }
}

impl ExportSink for DirectorySink {
    fn export(
        &self,
        name: &str,
        raster: &ClassRaster,
        scale_m: f64,
        region: &Region,
    ) -> livability_core::Result<()> {
        self.write(name, raster, scale_m, region)
            .map_err(|e| livability_core::Error::Source(format!("{e:#}")))
    }
}

/// Read and parse a JSON file.
fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text =
        fs::read_to_string(path).with_context(|| format!("Cannot read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Failed to parse {}", path.display()))
}

/// Write any serialisable value as pretty JSON, creating parent directories.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("Cannot create {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json).with_context(|| format!("Write failed: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("livability-io-{tag}-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn reads_json_layers_and_regions() {
        let dir = scratch("read");
        let g = Grid::new(2, 2, 36.7, 36.8, -1.3, -1.2);
        fs::create_dir_all(dir.join("sentinel2")).unwrap();
        write_json(&dir.join("sentinel2/ndvi.json"), &RasterLayer::filled("ndvi", g, 0.4)).unwrap();
        let regions = serde_json::json!({ "regions": [Region::from_grid("Nairobi", &g)] });
        write_json(&dir.join("regions.json"), &regions).unwrap();

        let src = DirectorySource::new(&dir);
        assert_eq!(src.layer("sentinel2/ndvi").unwrap().data, vec![0.4; 4]);
        let nairobi = src.region("Nairobi").unwrap();
        assert_eq!(nairobi.parts(), 1);
        assert!(nairobi.contains(36.75, -1.25));
        assert!(matches!(src.region("Kisumu"), Err(livability_core::Error::Source(_))));
        assert!(matches!(src.layer("modis/lst"), Err(livability_core::Error::Source(_))));
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn sink_writes_named_file() {
        let dir = scratch("sink");
        let g = Grid::new(1, 2, 0.0, 0.0, 0.0, 1.0);
        let raster = ClassRaster::new("classified_RandomForest", &g, vec![1, 3]).unwrap();
        let region = Region::from_grid("Nairobi", &g);
        let sink = DirectorySink::new(&dir);
        sink.export("Livability_RandomForest_Nairobi", &raster, 30.0, &region).unwrap();
        let text = fs::read_to_string(dir.join("Livability_RandomForest_Nairobi.json")).unwrap();
        let v: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(v["raster"]["data"], serde_json::json!([1, 3]));
        assert_eq!(v["scale_m"], serde_json::json!(30.0));
        fs::remove_dir_all(&dir).ok();
    }
}
