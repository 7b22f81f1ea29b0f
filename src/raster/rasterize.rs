//! Polar-to-Cartesian rasterizer.
//!
//! Turns a decoded sweep into gate quads in world space. Radials are put in
//! azimuth order, bounded by the shared edge columns of a [`SweepGeometry`],
//! and grouped into tiles of consecutive radials so the renderer can cull
//! them against the view.

use super::grid::{GeometryKey, GridCache, SweepGeometry, DEFAULT_GRID_CACHE_CAPACITY};
use crate::radar::{DecodedMoment, RadarSweep, RadialRecord, SweepKey};
use chrono::{DateTime, Utc};
use geo_types::Coord;
use glam::{DVec2, Vec2};
use rayon::prelude::*;
use std::ops::Range;

/// Default number of consecutive radials grouped into one render tile.
pub const DEFAULT_RADIALS_PER_TILE: usize = 32;

/// One gate (or one angular segment of a wide gate) as a quad.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GateQuad {
    /// Inner-left, inner-right, outer-right, outer-left; world units
    /// relative to the sweep origin.
    pub corners: [Vec2; 4],
    pub moment: DecodedMoment,
}

/// Rasterized sweep geometry: every gate as a positioned quad.
#[derive(Debug, Clone)]
pub struct RasterGeometry {
    pub key: SweepKey,
    pub scan_time: DateTime<Utc>,
    pub elevation_deg: f32,
    pub value_range: (f32, f32),
    /// World position of the radar site; quad corners are relative to it.
    pub origin_world: DVec2,
    pub quads: Vec<GateQuad>,
    /// Quad ranges, one per group of consecutive radials.
    pub tiles: Vec<Range<usize>>,
}

impl RasterGeometry {
    pub fn quad_count(&self) -> usize {
        self.quads.len()
    }
}

/// Rasterizer with a geometry cache shared across sweeps.
pub struct Rasterizer {
    grid: GridCache,
    radials_per_tile: usize,
}

impl Default for Rasterizer {
    fn default() -> Self {
        Self::new(DEFAULT_GRID_CACHE_CAPACITY, DEFAULT_RADIALS_PER_TILE)
    }
}

impl Rasterizer {
    pub fn new(grid_cache_capacity: usize, radials_per_tile: usize) -> Self {
        Self {
            grid: GridCache::new(grid_cache_capacity),
            radials_per_tile: radials_per_tile.max(1),
        }
    }

    pub fn grid_cache(&self) -> &GridCache {
        &self.grid
    }

    /// Rasterizes `sweep` around `origin` (x = lon, y = lat).
    pub fn rasterize(&self, sweep: &RadarSweep, origin: Coord<f64>) -> RasterGeometry {
        let order = azimuth_order(sweep);
        let geometry = self.grid.get_or_build(GeometryKey::new(origin, &order));
        build_quads(sweep, &order, &geometry, self.radials_per_tile)
    }
}

/// Rasterizes without caching the geometry.
pub fn rasterize(sweep: &RadarSweep, origin: Coord<f64>) -> RasterGeometry {
    let order = azimuth_order(sweep);
    let geometry = SweepGeometry::build(&GeometryKey::new(origin, &order));
    build_quads(sweep, &order, &geometry, DEFAULT_RADIALS_PER_TILE)
}

fn azimuth_order(sweep: &RadarSweep) -> Vec<&RadialRecord> {
    let mut order: Vec<&RadialRecord> = sweep.radials.iter().collect();
    order.sort_by(|a, b| a.azimuth_deg.total_cmp(&b.azimuth_deg));
    order
}

fn build_quads(
    sweep: &RadarSweep,
    order: &[&RadialRecord],
    geometry: &SweepGeometry,
    radials_per_tile: usize,
) -> RasterGeometry {
    let base = geometry.origin_world;
    let relative = |p: DVec2| (p - base).as_vec2();

    let tiles: Vec<Vec<GateQuad>> = order
        .par_chunks(radials_per_tile)
        .enumerate()
        .map(|(tile, radials)| {
            let mut quads = Vec::new();
            for (offset, radial) in radials.iter().enumerate() {
                let shape = &geometry.radials[tile * radials_per_tile + offset];
                let rings = shape.layout.ring_count();
                for (g, gate) in radial.gates.iter().enumerate() {
                    if g + 1 >= rings {
                        break;
                    }
                    for pair in shape.columns.windows(2) {
                        let (left, right) = (pair[0], pair[1]);
                        quads.push(GateQuad {
                            corners: [
                                relative(geometry.vertex(left, g)),
                                relative(geometry.vertex(right, g)),
                                relative(geometry.vertex(right, g + 1)),
                                relative(geometry.vertex(left, g + 1)),
                            ],
                            moment: gate.moment,
                        });
                    }
                }
            }
            quads
        })
        .collect();

    let total = tiles.iter().map(Vec::len).sum();
    let mut quads = Vec::with_capacity(total);
    let mut ranges = Vec::with_capacity(tiles.len());
    for tile in tiles {
        let start = quads.len();
        quads.extend(tile);
        ranges.push(start..quads.len());
    }

    log::debug!(
        "Rasterized {} into {} quads across {} tiles",
        sweep.key(),
        quads.len(),
        ranges.len()
    );

    RasterGeometry {
        key: sweep.key(),
        scan_time: sweep.header.scan_time,
        elevation_deg: sweep.header.elevation_deg,
        value_range: sweep.header.value_range,
        origin_world: base,
        quads,
        tiles: ranges,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::projection::{lon_lat_to_world, world_to_lon_lat};
    use crate::radar::synthetic::{RadialSpec, SweepBuilder};
    use crate::radar::{decode, ProductType};
    use geographiclib_rs::{DirectGeodesic, Geodesic, InverseGeodesic};

    const LAT: f64 = 38.6989;
    const LON: f64 = -90.6828;

    fn origin() -> Coord<f64> {
        Coord { x: LON, y: LAT }
    }

    fn sweep_of(radials: Vec<RadialSpec>) -> RadarSweep {
        let bytes = SweepBuilder::new("KLSX", ProductType::Reflectivity)
            .location(LAT, LON)
            .radials(radials)
            .encode();
        decode(&bytes).unwrap()
    }

    fn quads_of_radial(geometry: &RasterGeometry, per_radial: usize, index: usize) -> &[GateQuad] {
        &geometry.quads[index * per_radial..(index + 1) * per_radial]
    }

    #[test]
    fn test_adjacent_radials_share_edges() {
        for spacing in [0.5f32, 1.0, 10.0, 36.0, 90.0, 180.0, 270.0] {
            let sweep = sweep_of(vec![
                RadialSpec::new(20.0, spacing, 2125.0, 250.0, vec![80; 4]),
                RadialSpec::new(20.0 + spacing, spacing, 2125.0, 250.0, vec![80; 4]),
            ]);
            let geometry = rasterize(&sweep, origin());
            let segments = (spacing as f64).ceil() as usize;
            let per_radial = 4 * segments;
            assert_eq!(geometry.quads.len(), 2 * per_radial, "spacing {}", spacing);

            let a = quads_of_radial(&geometry, per_radial, 0);
            let b = quads_of_radial(&geometry, per_radial, 1);
            for gate in 0..4 {
                // Last segment of radial a against the first segment of radial b
                let qa = &a[gate * segments + segments - 1];
                let qb = &b[gate * segments];
                assert_eq!(qa.corners[1], qb.corners[0], "spacing {}", spacing);
                assert_eq!(qa.corners[2], qb.corners[3], "spacing {}", spacing);
            }
        }
    }

    #[test]
    fn test_full_circle_radial_closes() {
        let sweep = sweep_of(vec![RadialSpec::new(0.0, 360.0, 2125.0, 250.0, vec![80; 2])]);
        let geometry = rasterize(&sweep, origin());
        let first = &geometry.quads[0];
        let last = &geometry.quads[359];
        assert_eq!(first.corners[0], last.corners[1]);
        assert_eq!(first.corners[3], last.corners[2]);
    }

    #[test]
    fn test_wraparound_at_north_is_seamless() {
        let radials = (0..360)
            .map(|i| RadialSpec::new(i as f32 + 0.5, 1.0, 2125.0, 250.0, vec![80; 3]))
            .collect();
        let geometry = rasterize(&sweep_of(radials), origin());
        // Innermost gate of the first and last radials
        let first = &geometry.quads[0];
        let last = &geometry.quads[359 * 3];
        assert_eq!(last.corners[1], first.corners[0]);
        assert_eq!(last.corners[2], first.corners[3]);
    }

    #[test]
    fn test_zero_gate_radial_skipped_without_shifting_neighbours() {
        let with_gap = sweep_of(vec![
            RadialSpec::new(10.0, 1.0, 2125.0, 250.0, vec![80; 3]),
            RadialSpec::new(11.0, 1.0, 2125.0, 250.0, vec![]),
            RadialSpec::new(12.0, 1.0, 2125.0, 250.0, vec![80; 3]),
        ]);
        let without = sweep_of(vec![
            RadialSpec::new(10.0, 1.0, 2125.0, 250.0, vec![80; 3]),
            RadialSpec::new(12.0, 1.0, 2125.0, 250.0, vec![80; 3]),
        ]);
        let a = rasterize(&with_gap, origin());
        let b = rasterize(&without, origin());

        assert_eq!(a.quads.len(), 6);
        assert_eq!(a.quads, b.quads);
    }

    #[test]
    fn test_gate_center_at_geodesic_range() {
        let sweep = sweep_of(vec![RadialSpec::new(135.0, 1.0, 2125.0, 250.0, vec![80; 200])]);
        let geometry = rasterize(&sweep, origin());
        let geodesic = Geodesic::wgs84();

        for gate in [0usize, 57, 199] {
            let expected = 2125.0 + gate as f64 * 250.0;
            // Geodesic gate center, projected and rasterized the same way
            let (lat, lon): (f64, f64) = geodesic.direct(LAT, LON, 135.0, expected);
            let center = lon_lat_to_world(Coord { x: lon, y: lat });
            let back = world_to_lon_lat(center);
            let s12: f64 = geodesic.inverse(LAT, LON, back.y, back.x);
            assert!((s12 - expected).abs() < 1.0);

            // Both quad edges reach the gate center range halfway along
            let q = &geometry.quads[gate];
            for (inner, outer) in [(q.corners[0], q.corners[3]), (q.corners[1], q.corners[2])] {
                let mid = geometry.origin_world + ((inner + outer) * 0.5).as_dvec2();
                let p = world_to_lon_lat(mid);
                let d: f64 = geodesic.inverse(LAT, LON, p.y, p.x);
                assert!((d - expected).abs() < 1.0, "gate {}: {} vs {}", gate, d, expected);
            }
        }
    }

    #[test]
    fn test_tiles_group_radials() {
        let radials = (0..100)
            .map(|i| RadialSpec::new(i as f32 + 0.5, 1.0, 2125.0, 250.0, vec![80; 2]))
            .collect();
        let rasterizer = Rasterizer::new(2, 32);
        let geometry = rasterizer.rasterize(&sweep_of(radials), origin());

        assert_eq!(geometry.tiles.len(), 4);
        assert_eq!(geometry.tiles[0], 0..64);
        assert_eq!(geometry.tiles[3], 192..200);
    }

    #[test]
    fn test_rasterizer_reuses_geometry() {
        let rasterizer = Rasterizer::default();
        let make = || {
            sweep_of(
                (0..10)
                    .map(|i| RadialSpec::new(i as f32 * 36.0, 36.0, 2125.0, 250.0, vec![80; 5]))
                    .collect(),
            )
        };
        rasterizer.rasterize(&make(), origin());
        rasterizer.rasterize(&make(), origin());
        assert_eq!(rasterizer.grid_cache().stats(), (1, 1));
    }
}
