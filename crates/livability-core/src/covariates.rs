//! Covariate derivation from raw source layers.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::features::{LST_C, NDBI, NDVI, POP_DENSITY, SLOPE};
use crate::raster::RasterLayer;
use crate::source::RasterSource;
use crate::terrain::slope_degrees;

/// Offset between Kelvin and degrees Celsius.
pub const KELVIN_OFFSET: f32 = 273.15;

/// Asset ids of the raw inputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetConfig {
    pub ndvi: String,
    /// Land-surface temperature in Kelvin.
    pub lst_kelvin: String,
    pub ndbi: String,
    /// Elevation in metres.
    pub dem: String,
    /// People per pixel.
    pub population: String,
}

impl Default for AssetConfig {
    fn default() -> Self {
        Self {
            ndvi: "sentinel2/ndvi".into(),
            lst_kelvin: "modis/lst_day_1km".into(),
            ndbi: "sentinel2/ndbi".into(),
            dem: "srtm/elevation".into(),
            population: "worldpop/population".into(),
        }
    }
}

/// Fetch the raw layers and turn them into the five named covariates, each
/// still on its native grid. The NDVI layer comes first; its grid is the
/// reference grid for the feature stack.
pub fn derive_covariates(
    source: &dyn RasterSource,
    assets: &AssetConfig,
) -> Result<Vec<RasterLayer>> {
    let ndvi = source.layer(&assets.ndvi)?.renamed(NDVI);
    let lst_c = source.layer(&assets.lst_kelvin)?.map(LST_C, |k| k - KELVIN_OFFSET);
    let ndbi = source.layer(&assets.ndbi)?.renamed(NDBI);
    let slope = slope_degrees(&source.layer(&assets.dem)?, SLOPE);
    let pop = source.layer(&assets.population)?.renamed(POP_DENSITY);

    let layers = vec![ndvi, lst_c, ndbi, slope, pop];
    for l in &layers {
        debug!(band = %l.name, width = l.grid.width, height = l.grid.height, "covariate derived");
    }
    Ok(layers)
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::error::Error;
    use crate::raster::Grid;
    use crate::source::MemorySource;

    fn source(g: Grid) -> MemorySource {
        let a = AssetConfig::default();
        MemorySource::new()
            .with_layer(a.ndvi, RasterLayer::filled("B8_B4", g, 0.42))
            .with_layer(a.lst_kelvin, RasterLayer::filled("LST_Day_1km", g, 300.0))
            .with_layer(a.ndbi, RasterLayer::filled("B11_B8", g, 0.1))
            .with_layer(a.dem, RasterLayer::filled("elevation", g, 1650.0))
            .with_layer(a.population, RasterLayer::filled("population", g, 12.5))
    }

    #[test]
    fn derives_named_covariates_in_stack_order() {
        let g = Grid::new(3, 3, 36.6, 37.1, -1.45, -1.15);
        let layers = derive_covariates(&source(g), &AssetConfig::default()).unwrap();
        let names: Vec<&str> = layers.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec![NDVI, LST_C, NDBI, SLOPE, POP_DENSITY]);
        assert_relative_eq!(layers[1].get(1, 1), 26.85, epsilon = 1e-3);
        assert_eq!(layers[3].get(1, 1), 0.0);
        assert_eq!(layers[4].get(2, 2), 12.5);
    }

    #[test]
    fn missing_asset_surfaces_source_error() {
        let g = Grid::new(2, 2, 0.0, 1.0, 0.0, 1.0);
        let assets = AssetConfig { dem: "nope".into(), ..Default::default() };
        assert!(matches!(derive_covariates(&source(g), &assets), Err(Error::Source(_))));
    }
}
