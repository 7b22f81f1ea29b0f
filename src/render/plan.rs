//! Frame planning: view culling and draw-range merging.

use crate::camera::ViewTransform;
use crate::raster::{BufferId, RasterBuffer};
use glam::Mat4;
use std::sync::Arc;

/// Vertex range of one draw call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawRange {
    pub first: u32,
    pub count: u32,
}

/// Draw calls for one buffer.
#[derive(Debug, Clone)]
pub struct BufferDraw {
    pub buffer: Arc<RasterBuffer>,
    /// Clip-space transform for the buffer's origin-relative vertices
    pub matrix: Mat4,
    pub ranges: Vec<DrawRange>,
}

impl BufferDraw {
    pub fn id(&self) -> BufferId {
        self.buffer.id
    }

    pub fn vertex_count(&self) -> u32 {
        self.ranges.iter().map(|r| r.count).sum()
    }
}

/// Everything a frame draws.
#[derive(Debug, Clone, Default)]
pub struct FramePlan {
    pub draws: Vec<BufferDraw>,
    pub visible_tiles: usize,
    pub culled_tiles: usize,
}

impl FramePlan {
    pub fn is_empty(&self) -> bool {
        self.draws.is_empty()
    }

    pub fn draw_calls(&self) -> usize {
        self.draws.iter().map(|d| d.ranges.len()).sum()
    }
}

/// Culls every buffer's tiles against the view and merges adjacent
/// visible tiles into single ranges. Buffers with nothing visible are
/// left out of the plan.
pub fn plan_frame<'a>(
    buffers: impl IntoIterator<Item = &'a Arc<RasterBuffer>>,
    view: &ViewTransform,
) -> FramePlan {
    let visible = view.visible_bounds();
    let mut plan = FramePlan::default();

    for buffer in buffers {
        if buffer.is_empty() || !buffer.bounds.intersects(&visible) {
            plan.culled_tiles += buffer.tiles.len();
            continue;
        }

        let mut ranges: Vec<DrawRange> = Vec::new();
        for tile in &buffer.tiles {
            if !tile.bounds.intersects(&visible) {
                plan.culled_tiles += 1;
                continue;
            }
            plan.visible_tiles += 1;
            match ranges.last_mut() {
                Some(last) if last.first + last.count == tile.first_vertex => {
                    last.count += tile.vertex_count;
                }
                _ => ranges.push(DrawRange {
                    first: tile.first_vertex,
                    count: tile.vertex_count,
                }),
            }
        }

        if !ranges.is_empty() {
            plan.draws.push(BufferDraw {
                buffer: Arc::clone(buffer),
                matrix: view.clip_matrix(buffer.origin),
                ranges,
            });
        }
    }

    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::CameraState;
    use crate::geo::projection::{lon_lat_to_world, WorldBounds};
    use crate::radar::{ProductType, SweepKey};
    use crate::raster::{RasterTile, RasterVertex};
    use chrono::Utc;
    use geo_types::Coord;
    use glam::DVec2;

    fn view() -> ViewTransform {
        let state = CameraState {
            center_lat: 38.7,
            center_lon: -90.7,
            zoom: 8.0,
            rotation_deg: 0.0,
        };
        ViewTransform::new(&state, DVec2::new(800.0, 600.0))
    }

    /// Tiles of 6 vertices, each a small box centered at the given lon/lat.
    fn buffer(centers: &[(f64, f64)]) -> Arc<RasterBuffer> {
        let tiles: Vec<RasterTile> = centers
            .iter()
            .enumerate()
            .map(|(i, &(lon, lat))| {
                let c = lon_lat_to_world(Coord { x: lon, y: lat });
                RasterTile {
                    first_vertex: i as u32 * 6,
                    vertex_count: 6,
                    bounds: WorldBounds::new(c - DVec2::splat(1e-5), c + DVec2::splat(1e-5)),
                }
            })
            .collect();
        let bounds = tiles
            .iter()
            .fold(WorldBounds::empty(), |b, t| b.union(&t.bounds));
        Arc::new(RasterBuffer {
            id: BufferId::next(),
            key: SweepKey::new("KLSX", ProductType::Reflectivity),
            scan_time: Utc::now(),
            elevation_deg: 0.5,
            value_range: (-32.0, 94.5),
            origin: lon_lat_to_world(Coord { x: -90.7, y: 38.7 }),
            vertices: vec![
                RasterVertex {
                    position: [0.0, 0.0],
                    color: [255; 4],
                };
                centers.len() * 6
            ],
            tiles,
            bounds,
        })
    }

    #[test]
    fn test_offscreen_tiles_are_culled() {
        // Second tile is hundreds of kilometres outside a zoom-8 view
        let b = buffer(&[(-90.7, 38.7), (-80.0, 30.0), (-90.6, 38.8)]);
        let plan = plan_frame([&b], &view());

        assert_eq!(plan.visible_tiles, 2);
        assert_eq!(plan.culled_tiles, 1);
        let ranges = &plan.draws[0].ranges;
        assert_eq!(
            ranges,
            &vec![DrawRange { first: 0, count: 6 }, DrawRange { first: 12, count: 6 }]
        );
        let visible = view().visible_bounds();
        for range in ranges {
            let tile = b.tiles.iter().find(|t| t.first_vertex == range.first).unwrap();
            assert!(tile.bounds.intersects(&visible));
        }
    }

    #[test]
    fn test_contiguous_tiles_merge() {
        let b = buffer(&[(-90.7, 38.7), (-90.65, 38.75), (-90.6, 38.8)]);
        let plan = plan_frame([&b], &view());
        assert_eq!(plan.draws.len(), 1);
        assert_eq!(plan.draws[0].ranges, vec![DrawRange { first: 0, count: 18 }]);
        assert_eq!(plan.draw_calls(), 1);
        assert_eq!(plan.draws[0].vertex_count(), 18);
    }

    #[test]
    fn test_fully_offscreen_buffer_is_skipped() {
        let near = buffer(&[(-90.7, 38.7)]);
        let far = buffer(&[(-120.0, 45.0), (-121.0, 45.0)]);
        let plan = plan_frame([&near, &far], &view());
        assert_eq!(plan.draws.len(), 1);
        assert_eq!(plan.draws[0].id(), near.id);
        assert_eq!(plan.culled_tiles, 2);
    }

    #[test]
    fn test_matrix_places_origin() {
        let b = buffer(&[(-90.7, 38.7)]);
        let plan = plan_frame([&b], &view());
        // The buffer origin is the view center, so it maps to clip (0, 0)
        let p = plan.draws[0].matrix * glam::Vec4::new(0.0, 0.0, 0.0, 1.0);
        assert!(p.x.abs() < 1e-4 && p.y.abs() < 1e-4);
    }
}
