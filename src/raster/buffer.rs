//! GPU-ready raster buffers.
//!
//! A [`RasterBuffer`] is the only artifact of a sweep that outlives the
//! pipeline: colored triangles in world space, grouped into tiles with
//! precomputed bounds. Buffers are immutable once built and shared by `Arc`.

use super::rasterize::RasterGeometry;
use crate::color::ColorTable;
use crate::geo::projection::WorldBounds;
use crate::radar::SweepKey;
use bytemuck::{Pod, Zeroable};
use chrono::{DateTime, Utc};
use glam::{DVec2, Vec2};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Vertices emitted per gate quad (two triangles).
pub const VERTICES_PER_QUAD: usize = 6;

/// Process-unique buffer identity, used to key GPU uploads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(u64);

impl BufferId {
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for BufferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Vertex layout shared with the sweep shader.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct RasterVertex {
    /// World units relative to the buffer origin.
    pub position: [f32; 2],
    /// Premultiplied RGBA.
    pub color: [u8; 4],
}

/// A contiguous vertex range covering consecutive radials.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterTile {
    pub first_vertex: u32,
    pub vertex_count: u32,
    pub bounds: WorldBounds,
}

/// Colored sweep geometry ready for upload.
#[derive(Debug, Clone)]
pub struct RasterBuffer {
    pub id: BufferId,
    pub key: SweepKey,
    pub scan_time: DateTime<Utc>,
    pub elevation_deg: f32,
    pub value_range: (f32, f32),
    /// World position vertex coordinates are relative to.
    pub origin: DVec2,
    pub vertices: Vec<RasterVertex>,
    /// Non-empty tiles in vertex order.
    pub tiles: Vec<RasterTile>,
    pub bounds: WorldBounds,
}

impl RasterBuffer {
    /// Colors `geometry` through `table`. Gates whose color is fully
    /// transparent produce no vertices.
    pub fn build(geometry: &RasterGeometry, table: &ColorTable) -> Self {
        let mut vertices = Vec::with_capacity(geometry.quads.len() * VERTICES_PER_QUAD);
        let mut tiles = Vec::with_capacity(geometry.tiles.len());
        let mut bounds = WorldBounds::empty();

        for range in &geometry.tiles {
            let first = vertices.len();
            let mut tile_bounds = WorldBounds::empty();

            for quad in &geometry.quads[range.clone()] {
                let color = table.colorize(quad.moment);
                if color.a() == 0 {
                    continue;
                }
                let rgba = color.to_array();
                let [a, b, c, d] = quad.corners;
                for corner in [a, b, c, a, c, d] {
                    vertices.push(RasterVertex {
                        position: corner.to_array(),
                        color: rgba,
                    });
                }
                for corner in quad.corners {
                    tile_bounds.include(geometry.origin_world + corner.as_dvec2());
                }
            }

            let count = vertices.len() - first;
            if count > 0 {
                bounds = bounds.union(&tile_bounds);
                tiles.push(RasterTile {
                    first_vertex: first as u32,
                    vertex_count: count as u32,
                    bounds: tile_bounds,
                });
            }
        }

        Self {
            id: BufferId::next(),
            key: geometry.key.clone(),
            scan_time: geometry.scan_time,
            elevation_deg: geometry.elevation_deg,
            value_range: geometry.value_range,
            origin: geometry.origin_world,
            vertices,
            tiles,
            bounds,
        }
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// Vertex data as raw bytes for upload.
    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }

    pub fn byte_len(&self) -> usize {
        std::mem::size_of_val(self.vertices.as_slice())
    }

    /// World position of a vertex.
    pub fn world_position(&self, vertex: &RasterVertex) -> DVec2 {
        self.origin + Vec2::from_array(vertex.position).as_dvec2()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::ColorTableSet;
    use crate::radar::synthetic::{RadialSpec, SweepBuilder};
    use crate::radar::{decode, ProductType};
    use crate::raster::rasterize::rasterize;
    use geo_types::Coord;

    fn buffer_for(codes: Vec<u16>) -> RasterBuffer {
        let radials = (0..64)
            .map(|i| RadialSpec::new(i as f32 + 0.5, 1.0, 2125.0, 250.0, codes.clone()));
        let bytes = SweepBuilder::new("KLSX", ProductType::Reflectivity)
            .radials(radials)
            .encode();
        let sweep = decode(&bytes).unwrap();
        let geometry = rasterize(
            &sweep,
            Coord {
                x: sweep.header.longitude,
                y: sweep.header.latitude,
            },
        );
        let table = ColorTableSet::builtin()
            .table_for(ProductType::Reflectivity)
            .unwrap();
        RasterBuffer::build(&geometry, &table)
    }

    #[test]
    fn test_vertex_layout_is_packed() {
        assert_eq!(std::mem::size_of::<RasterVertex>(), 12);
    }

    #[test]
    fn test_transparent_gates_are_dropped() {
        // code 0 is NoData, 66 is 0 dBZ (below the 5 dBZ palette floor), 136 is 35 dBZ
        let buffer = buffer_for(vec![0, 66, 136, 136]);
        assert_eq!(buffer.vertex_count(), 64 * 2 * VERTICES_PER_QUAD);
        assert_eq!(buffer.tiles.len(), 2);
        assert_eq!(buffer.tiles[1].first_vertex as usize, 32 * 2 * VERTICES_PER_QUAD);
    }

    #[test]
    fn test_bounds_contain_all_vertices() {
        let buffer = buffer_for(vec![136; 10]);
        for tile in &buffer.tiles {
            let first = tile.first_vertex as usize;
            let range = first..first + tile.vertex_count as usize;
            for v in &buffer.vertices[range] {
                let p = buffer.world_position(v);
                assert!(tile.bounds.expand(1e-9).contains(p));
                assert!(buffer.bounds.expand(1e-9).contains(p));
            }
        }
    }

    #[test]
    fn test_ids_are_unique() {
        let a = buffer_for(vec![136]);
        let b = buffer_for(vec![136]);
        assert_ne!(a.id, b.id);
        assert_eq!(a.byte_len(), a.vertex_bytes().len());
    }

    #[test]
    fn test_all_transparent_sweep_is_empty() {
        let buffer = buffer_for(vec![0, 0, 0]);
        assert!(buffer.is_empty());
        assert!(buffer.tiles.is_empty());
        assert!(buffer.bounds.is_empty());
    }
}
