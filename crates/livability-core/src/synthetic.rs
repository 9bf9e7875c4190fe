//! Seeded synthetic scene for exercising the pipeline without a raster
//! backend.
//!
//! Each raw layer is a blend of fBm fields (Perlin octaves, gain 0.5,
//! lacunarity 2) so vegetation, built-up area, heat and population vary
//! smoothly and are correlated the way an urban fringe is: dense built-up
//! core, greener and cooler periphery, hills where it is green.

use noise::{NoiseFn, Perlin};

use crate::covariates::{AssetConfig, KELVIN_OFFSET};
use crate::raster::{Grid, RasterLayer};
use crate::region::Region;
use crate::source::MemorySource;

/// Name of the synthetic region.
pub const SYNTHETIC_REGION: &str = "Synthetic";

/// fBm over Perlin noise.
struct Fbm {
    octaves: u32,
    noise: Perlin,
}

impl Fbm {
    fn new(seed: u32, octaves: u32) -> Self {
        Self { octaves, noise: Perlin::new(seed) }
    }

    /// Roughly in `[-1, 1]`.
    fn sample(&self, x: f64, y: f64) -> f64 {
        let mut value = 0.0;
        let mut amp = 1.0;
        let mut freq = 1.0;
        let mut norm = 0.0;
        for _ in 0..self.octaves {
            value += amp * self.noise.get([x * freq, y * freq]);
            norm += amp;
            amp *= 0.5;
            freq *= 2.0;
        }
        value / norm
    }
}

/// Raw layers and region of a synthetic scene.
#[derive(Debug, Clone)]
pub struct SyntheticScene {
    pub grid: Grid,
    pub region: Region,
    pub ndvi: RasterLayer,
    pub lst_kelvin: RasterLayer,
    pub ndbi: RasterLayer,
    pub dem: RasterLayer,
    pub population: RasterLayer,
}

impl SyntheticScene {
    /// Scene of `width × height` pixels around Nairobi's extent. Identical
    /// for identical arguments.
    pub fn generate(width: usize, height: usize, seed: u64) -> Self {
        let grid = Grid::new(width, height, 36.65, 37.10, -1.45, -1.16);
        // Perlin takes a 32-bit seed; fold the high half in.
        let base = (seed ^ (seed >> 32)) as u32;
        let green = Fbm::new(base, 5);
        let urban = Fbm::new(base.wrapping_add(1), 4);
        let relief = Fbm::new(base.wrapping_add(2), 6);
        let heat = Fbm::new(base.wrapping_add(3), 3);

        let freq = 4.0;
        let mut ndvi = RasterLayer::filled("NDVI_raw", grid, 0.0);
        let mut ndbi = RasterLayer::filled("NDBI_raw", grid, 0.0);
        let mut lst = RasterLayer::filled("LST_Day_1km", grid, 0.0);
        let mut dem = RasterLayer::filled("elevation", grid, 0.0);
        let mut pop = RasterLayer::filled("population", grid, 0.0);

        for r in 0..height {
            for c in 0..width {
                let x = c as f64 / width.max(1) as f64 * freq;
                let y = r as f64 / height.max(1) as f64 * freq;
                // Distance from the scene centre in [0, ~1.4].
                let dx = (c as f64 / width.max(1) as f64 - 0.5) * 2.0;
                let dy = (r as f64 / height.max(1) as f64 - 0.5) * 2.0;
                let core = (1.0 - (dx * dx + dy * dy).sqrt()).clamp(0.0, 1.0);

                let built = (0.55 * core + 0.45 * (urban.sample(x, y) * 0.5 + 0.5)).clamp(0.0, 1.0);
                let veg = (0.45 + 0.5 * green.sample(x, y) - 0.4 * built).clamp(-0.2, 0.9);
                let ndbi_v = (-0.25 + 0.75 * built - 0.2 * veg).clamp(-0.5, 0.8);
                let elev = 1600.0 + 250.0 * relief.sample(x * 0.5, y * 0.5) + 120.0 * veg;
                let temp_c = 24.0 + 8.0 * built - 6.0 * veg + 2.0 * heat.sample(x, y);
                let people = (4000.0 * built.powi(2) * (0.8 + 0.2 * urban.sample(y, x))).max(0.0);

                ndvi.set(r, c, veg as f32);
                ndbi.set(r, c, ndbi_v as f32);
                dem.set(r, c, elev as f32);
                lst.set(r, c, temp_c as f32 + KELVIN_OFFSET);
                pop.set(r, c, people as f32);
            }
        }

        let region = Region::from_grid(SYNTHETIC_REGION, &grid);
        Self { grid, region, ndvi, lst_kelvin: lst, ndbi, dem, population: pop }
    }

    /// In-memory source serving this scene under `assets`' ids.
    pub fn into_source(self, assets: &AssetConfig) -> MemorySource {
        MemorySource::new()
            .with_region(self.region)
            .with_layer(assets.ndvi.clone(), self.ndvi)
            .with_layer(assets.lst_kelvin.clone(), self.lst_kelvin)
            .with_layer(assets.ndbi.clone(), self.ndbi)
            .with_layer(assets.dem.clone(), self.dem)
            .with_layer(assets.population.clone(), self.population)
    }
}
