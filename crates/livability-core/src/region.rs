//! Area of interest: a named multipolygon and its rasterised mask.
//!
//! Boundaries are `geo` multipolygons, so a region may have several parts
//! (islands) and holes (enclaves). On disk a region is
//! `{"name": .., "polygons": [{"exterior": [[lon, lat], ..], "holes": [..]}]}`;
//! rings may repeat or omit the closing vertex.

use geo::{Area, BoundingRect, Coord, Intersects, LineString, MultiPolygon, Polygon, Rect};
use serde::{Deserialize, Serialize};

use crate::par::*;
use crate::raster::Grid;

/// Ring as `(lon, lat)` vertices.
pub type Ring = Vec<(f64, f64)>;

/// One polygon part as stored in region files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolygonRings {
    pub exterior: Ring,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub holes: Vec<Ring>,
}

#[derive(Serialize, Deserialize)]
struct RegionRecord {
    name: String,
    polygons: Vec<PolygonRings>,
}

/// A named region boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RegionRecord", into = "RegionRecord")]
pub struct Region {
    pub name: String,
    geometry: MultiPolygon<f64>,
}

impl Region {
    /// Single-part region without holes.
    pub fn new(name: impl Into<String>, boundary: Ring) -> Self {
        Self::from_parts(name, vec![PolygonRings { exterior: boundary, holes: Vec::new() }])
    }

    pub fn from_parts(name: impl Into<String>, parts: Vec<PolygonRings>) -> Self {
        let polygons = parts
            .into_iter()
            .map(|p| {
                let holes = p.holes.into_iter().map(LineString::from).collect();
                Polygon::new(LineString::from(p.exterior), holes)
            })
            .collect();
        Self::from_geometry(name, MultiPolygon::new(polygons))
    }

    /// Parts with zero area (fewer than three distinct vertices, collinear
    /// rings) are dropped.
    pub fn from_geometry(name: impl Into<String>, geometry: MultiPolygon<f64>) -> Self {
        let parts = geometry.0.into_iter().filter(|p| p.unsigned_area() > 0.0).collect();
        Self { name: name.into(), geometry: MultiPolygon::new(parts) }
    }

    /// Rectangle covering the whole grid extent.
    pub fn from_grid(name: impl Into<String>, grid: &Grid) -> Self {
        let rect = Rect::new(
            Coord { x: grid.min_lon, y: grid.min_lat },
            Coord { x: grid.max_lon, y: grid.max_lat },
        );
        Self::from_geometry(name, MultiPolygon::new(vec![rect.to_polygon()]))
    }

    pub fn geometry(&self) -> &MultiPolygon<f64> {
        &self.geometry
    }

    /// Number of polygon parts.
    pub fn parts(&self) -> usize {
        self.geometry.0.len()
    }

    /// Inside any part and outside its holes. Points on an outer or hole
    /// boundary count as inside.
    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        let c = Coord { x: lon, y: lat };
        self.geometry.0.iter().any(|p| p.intersects(&c))
    }

    fn bounds(&self) -> Option<Rect<f64>> {
        self.geometry.bounding_rect()
    }
}

impl From<RegionRecord> for Region {
    fn from(r: RegionRecord) -> Self {
        Region::from_parts(r.name, r.polygons)
    }
}

impl From<Region> for RegionRecord {
    fn from(r: Region) -> Self {
        let ring = |ls: &LineString<f64>| ls.coords().map(|c| (c.x, c.y)).collect::<Ring>();
        let polygons = r
            .geometry
            .0
            .iter()
            .map(|p| PolygonRings {
                exterior: ring(p.exterior()),
                holes: p.interiors().iter().map(ring).collect(),
            })
            .collect();
        RegionRecord { name: r.name, polygons }
    }
}

/// Per-pixel membership of a region on a reference grid.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionMask {
    pub grid: Grid,
    inside: Vec<bool>,
}

impl RegionMask {
    /// Mark every pixel whose coordinate falls inside `region`.
    pub fn rasterize(region: &Region, grid: &Grid) -> Self {
        let bounds = region.bounds();
        let rows: Vec<Vec<bool>> = (0..grid.height)
            .into_par_iter()
            .map(|r| {
                (0..grid.width)
                    .map(|c| {
                        let (lon, lat) = grid.coord(r, c);
                        let near = bounds.map_or(false, |b| {
                            let (lo, hi) = (b.min(), b.max());
                            lon >= lo.x && lon <= hi.x && lat >= lo.y && lat <= hi.y
                        });
                        near && region.contains(lon, lat)
                    })
                    .collect()
            })
            .collect();
        Self { grid: *grid, inside: rows.into_iter().flatten().collect() }
    }

    /// Mask covering every pixel of the grid.
    pub fn full(grid: &Grid) -> Self {
        Self { grid: *grid, inside: vec![true; grid.len()] }
    }

    /// Mask from explicit row-major membership flags.
    pub fn from_flags(grid: &Grid, inside: Vec<bool>) -> Option<Self> {
        (inside.len() == grid.len()).then(|| Self { grid: *grid, inside })
    }

    #[inline]
    pub fn contains(&self, row: usize, col: usize) -> bool {
        self.inside[row * self.grid.width + col]
    }

    #[inline]
    pub fn contains_index(&self, index: usize) -> bool {
        self.inside[index]
    }

    /// Number of pixels inside the region.
    pub fn count(&self) -> usize {
        self.inside.iter().filter(|&&b| b).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle() -> Region {
        Region::new("tri", vec![(0.0, 0.0), (4.0, 0.0), (0.0, 4.0)])
    }

    fn square(x0: f64, y0: f64, x1: f64, y1: f64) -> Ring {
        vec![(x0, y0), (x1, y0), (x1, y1), (x0, y1)]
    }

    #[test]
    fn contains_interior_and_rejects_exterior() {
        let t = triangle();
        assert!(t.contains(1.0, 1.0));
        assert!(!t.contains(3.0, 3.0));
        assert!(!t.contains(-1.0, 1.0));
    }

    #[test]
    fn boundary_points_are_inside() {
        let t = triangle();
        assert!(t.contains(0.0, 0.0));
        assert!(t.contains(2.0, 0.0));
        assert!(t.contains(2.0, 2.0));
    }

    #[test]
    fn rectangle_region_masks_whole_grid() {
        let g = Grid::new(6, 4, 10.0, 11.0, -2.0, -1.0);
        let mask = RegionMask::rasterize(&Region::from_grid("all", &g), &g);
        assert_eq!(mask.count(), g.len());

        let nairobi = Grid::new(160, 120, 36.65, 37.10, -1.45, -1.16);
        let mask = RegionMask::rasterize(&Region::from_grid("Nairobi", &nairobi), &nairobi);
        assert_eq!(mask.count(), nairobi.len());
    }

    #[test]
    fn triangle_mask_covers_lower_left_half() {
        let g = Grid::new(5, 5, 0.0, 4.0, 0.0, 4.0);
        let mask = RegionMask::rasterize(&triangle(), &g);
        assert!(mask.contains(0, 0));
        assert!(!mask.contains(4, 4));
        // Pixels on or below the hypotenuse x + y <= 4: 5 + 4 + 3 + 2 + 1.
        assert_eq!(mask.count(), 15);
    }

    #[test]
    fn degenerate_ring_contains_nothing() {
        let r = Region::new("line", vec![(0.0, 0.0), (1.0, 1.0)]);
        assert_eq!(r.parts(), 0);
        assert!(!r.contains(0.5, 0.5));
        let collinear = Region::new("flat", vec![(0.0, 0.0), (1.0, 1.0), (2.0, 2.0)]);
        assert!(!collinear.contains(1.0, 1.0));
    }

    #[test]
    fn holes_and_islands_shape_the_mask() {
        // Outer 0..4 square with a hole over 1..3, plus an island at 6..8.
        let region = Region::from_parts(
            "county",
            vec![
                PolygonRings {
                    exterior: square(0.0, 0.0, 4.0, 4.0),
                    holes: vec![square(1.5, 1.5, 2.5, 2.5)],
                },
                PolygonRings { exterior: square(6.0, 0.0, 8.0, 2.0), holes: Vec::new() },
            ],
        );
        assert_eq!(region.parts(), 2);
        assert!(region.contains(0.5, 0.5));
        assert!(!region.contains(2.0, 2.0));
        assert!(!region.contains(5.0, 1.0));
        assert!(region.contains(7.0, 1.0));

        let g = Grid::new(9, 5, 0.0, 8.0, 0.0, 4.0);
        let mask = RegionMask::rasterize(&region, &g);
        assert!(!mask.contains(2, 2));
        assert!(!mask.contains(1, 5));
        assert!(mask.contains(1, 7));
        // 25 mainland pixels less the hole centre, plus 3x3 on the island.
        assert_eq!(mask.count(), 24 + 9);
    }

    #[test]
    fn region_file_format_round_trips() {
        let json = r#"{
            "name": "aoi",
            "polygons": [{
                "exterior": [[0.0, 0.0], [2.0, 0.0], [2.0, 2.0], [0.0, 2.0]],
                "holes": [[[0.5, 0.5], [1.0, 0.5], [1.0, 1.0]]]
            }]
        }"#;
        let region: Region = serde_json::from_str(json).unwrap();
        assert_eq!(region.name, "aoi");
        assert_eq!(region.geometry().0[0].interiors().len(), 1);
        assert!(!region.contains(0.8, 0.6));

        let back: Region = serde_json::from_str(&serde_json::to_string(&region).unwrap()).unwrap();
        assert_eq!(back, region);
    }
}
