//! Overlay layers drawn over the sweep: shapefile boundaries and radar
//! range rings, projected once into world coordinates.

use super::projection::{lon_lat_to_world, WorldBounds};
use eframe::egui::Color32;
use geo_types::Coord;
use geographiclib_rs::{DirectGeodesic, Geodesic};
use glam::DVec2;
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::path::Path;
use thiserror::Error;

/// Kind of overlay; decides the default style and minimum zoom.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OverlayKind {
    States,
    Counties,
    Rivers,
    Highways,
    Coastline,
    RangeRing,
}

impl OverlayKind {
    pub fn default_color(&self) -> Color32 {
        match self {
            OverlayKind::States => Color32::from_rgb(100, 100, 120),
            OverlayKind::Counties => Color32::from_rgb(70, 70, 90),
            OverlayKind::Rivers => Color32::from_rgb(60, 100, 180),
            OverlayKind::Highways => Color32::from_rgb(120, 100, 80),
            OverlayKind::Coastline => Color32::from_rgb(80, 80, 100),
            OverlayKind::RangeRing => Color32::from_rgba_unmultiplied(180, 180, 180, 140),
        }
    }

    pub fn default_line_width(&self) -> f32 {
        match self {
            OverlayKind::States => 1.5,
            OverlayKind::Counties => 0.8,
            OverlayKind::Rivers => 1.0,
            OverlayKind::Highways => 0.7,
            OverlayKind::Coastline => 1.2,
            OverlayKind::RangeRing => 1.0,
        }
    }

    /// Web Mercator zoom below which the layer is hidden.
    pub fn min_zoom(&self) -> f64 {
        match self {
            OverlayKind::States | OverlayKind::Coastline | OverlayKind::RangeRing => 0.0,
            OverlayKind::Rivers => 6.0,
            OverlayKind::Counties => 7.0,
            OverlayKind::Highways => 8.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum OverlayError {
    #[error("failed to read overlay {0}")]
    Io(String),

    #[error("failed to parse shapefile: {0}")]
    Shapefile(String),
}

/// A polyline in world coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayLine {
    pub points: Vec<DVec2>,
    pub bounds: WorldBounds,
}

impl OverlayLine {
    /// Projects `coords` (x = lon, y = lat). Lines with fewer than two
    /// points are dropped.
    pub fn from_coords(coords: impl IntoIterator<Item = Coord<f64>>) -> Option<Self> {
        let points: Vec<DVec2> = coords.into_iter().map(lon_lat_to_world).collect();
        if points.len() < 2 {
            return None;
        }
        let bounds = WorldBounds::from_points(points.iter().copied());
        Some(Self { points, bounds })
    }
}

/// One overlay: a set of projected polylines and a style.
#[derive(Debug, Clone)]
pub struct OverlayLayer {
    pub kind: OverlayKind,
    pub name: String,
    pub lines: Vec<OverlayLine>,
    pub bounds: WorldBounds,
    /// Override color (None = kind default)
    pub color: Option<Color32>,
    /// Override line width (None = kind default)
    pub line_width: Option<f32>,
    pub visible: bool,
}

impl OverlayLayer {
    pub fn new(kind: OverlayKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            lines: Vec::new(),
            bounds: WorldBounds::empty(),
            color: None,
            line_width: None,
            visible: true,
        }
    }

    pub fn push_line(&mut self, line: OverlayLine) {
        self.bounds = self.bounds.union(&line.bounds);
        self.lines.push(line);
    }

    /// Builds a layer from polyline and polygon shapes. Polygon rings are
    /// drawn as outlines; other shape types are skipped.
    pub fn from_shapes(
        kind: OverlayKind,
        name: impl Into<String>,
        shapes: impl IntoIterator<Item = shapefile::Shape>,
    ) -> Self {
        let mut layer = Self::new(kind, name);
        let to_coord = |p: &shapefile::Point| Coord { x: p.x, y: p.y };
        for shape in shapes {
            match shape {
                shapefile::Shape::Polyline(pl) => {
                    for part in pl.parts() {
                        if let Some(line) = OverlayLine::from_coords(part.iter().map(to_coord)) {
                            layer.push_line(line);
                        }
                    }
                }
                shapefile::Shape::Polygon(poly) => {
                    for ring in poly.rings() {
                        if let Some(line) =
                            OverlayLine::from_coords(ring.points().iter().map(to_coord))
                        {
                            layer.push_line(line);
                        }
                    }
                }
                _ => {}
            }
        }
        layer
    }

    /// Parses the contents of a `.shp` file.
    pub fn from_shapefile_bytes(
        kind: OverlayKind,
        name: impl Into<String>,
        shp_bytes: &[u8],
    ) -> Result<Self, OverlayError> {
        let mut reader = shapefile::ShapeReader::new(Cursor::new(shp_bytes))
            .map_err(|e| OverlayError::Shapefile(e.to_string()))?;
        let shapes = reader
            .iter_shapes()
            .collect::<Result<Vec<shapefile::Shape>, _>>()
            .map_err(|e| OverlayError::Shapefile(e.to_string()))?;
        Ok(Self::from_shapes(kind, name, shapes))
    }

    /// Reads a `.shp` file from disk; the layer is named after the file.
    pub fn load(kind: OverlayKind, path: &Path) -> Result<Self, OverlayError> {
        let bytes = std::fs::read(path)
            .map_err(|e| OverlayError::Io(format!("{}: {}", path.display(), e)))?;
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("overlay")
            .to_string();
        let layer = Self::from_shapefile_bytes(kind, name, &bytes)?;
        log::info!(
            "Loaded {:?} overlay '{}' from {} ({} lines)",
            kind,
            layer.name,
            path.display(),
            layer.lines.len()
        );
        Ok(layer)
    }

    /// Geodesic circle of `radius_m` around `origin` (x = lon, y = lat).
    pub fn range_ring(
        name: impl Into<String>,
        origin: Coord<f64>,
        radius_m: f64,
        segments: usize,
    ) -> Self {
        let geodesic = Geodesic::wgs84();
        let segments = segments.max(8);
        let coords = (0..=segments).map(|i| {
            let azimuth = 360.0 * (i % segments) as f64 / segments as f64;
            let (lat, lon): (f64, f64) = geodesic.direct(origin.y, origin.x, azimuth, radius_m);
            Coord { x: lon, y: lat }
        });
        let mut layer = Self::new(OverlayKind::RangeRing, name);
        if let Some(line) = OverlayLine::from_coords(coords) {
            layer.push_line(line);
        }
        layer
    }

    pub fn effective_color(&self) -> Color32 {
        self.color.unwrap_or_else(|| self.kind.default_color())
    }

    pub fn effective_line_width(&self) -> f32 {
        self.line_width
            .unwrap_or_else(|| self.kind.default_line_width())
    }

    pub fn is_shown_at(&self, zoom: f64) -> bool {
        self.visible && zoom >= self.kind.min_zoom()
    }

    /// Lines whose bounds intersect `view`.
    pub fn visible_lines<'a>(
        &'a self,
        view: &'a WorldBounds,
    ) -> impl Iterator<Item = &'a OverlayLine> + 'a {
        let any = self.bounds.intersects(view);
        self.lines
            .iter()
            .filter(move |line| any && line.bounds.intersects(view))
    }
}

/// Overlays in draw order (back to front). Range rings are kept apart so
/// they can be rebuilt when the displayed sites change.
#[derive(Debug, Clone, Default)]
pub struct OverlaySet {
    layers: Vec<OverlayLayer>,
    rings: Vec<OverlayLayer>,
}

impl OverlaySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, layer: OverlayLayer) {
        self.layers.push(layer);
    }

    pub fn set_range_rings(&mut self, rings: Vec<OverlayLayer>) {
        self.rings = rings;
    }

    pub fn iter(&self) -> impl Iterator<Item = &OverlayLayer> {
        self.layers.iter().chain(self.rings.iter())
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut OverlayLayer> {
        self.layers.iter_mut().chain(self.rings.iter_mut())
    }

    pub fn len(&self) -> usize {
        self.layers.len() + self.rings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::projection::world_to_lon_lat;
    use geographiclib_rs::InverseGeodesic;
    use shapefile::{Point, PolygonRing, Polyline, Shape};

    fn square(lon: f64, lat: f64, size: f64) -> Shape {
        Shape::Polygon(shapefile::Polygon::new(PolygonRing::Outer(vec![
            Point::new(lon, lat),
            Point::new(lon, lat + size),
            Point::new(lon + size, lat + size),
            Point::new(lon + size, lat),
            Point::new(lon, lat),
        ])))
    }

    #[test]
    fn test_from_shapes() {
        let shapes = vec![
            Shape::Polyline(Polyline::new(vec![
                Point::new(-91.0, 38.0),
                Point::new(-90.0, 39.0),
            ])),
            square(-95.0, 40.0, 1.0),
            Shape::Point(Point::new(-90.0, 38.0)),
        ];
        let layer = OverlayLayer::from_shapes(OverlayKind::States, "test", shapes);
        assert_eq!(layer.lines.len(), 2);
        assert_eq!(layer.lines[1].points.len(), 5);
        for line in &layer.lines {
            for p in &line.points {
                assert!(layer.bounds.contains(*p));
            }
        }
    }

    #[test]
    fn test_visible_lines_culls_by_bounds() {
        let layer = OverlayLayer::from_shapes(
            OverlayKind::Counties,
            "test",
            vec![square(-91.0, 38.0, 0.5), square(-120.0, 45.0, 0.5)],
        );
        let view = WorldBounds::from_points([
            lon_lat_to_world(Coord { x: -92.0, y: 37.0 }),
            lon_lat_to_world(Coord { x: -89.0, y: 40.0 }),
        ]);
        assert_eq!(layer.visible_lines(&view).count(), 1);
        assert!(!layer.is_shown_at(5.0));
        assert!(layer.is_shown_at(7.5));
    }

    #[test]
    fn test_range_ring_is_geodesic() {
        let origin = Coord {
            x: -90.6828,
            y: 38.6989,
        };
        let ring = OverlayLayer::range_ring("KLSX", origin, 230_000.0, 90);
        assert_eq!(ring.lines.len(), 1);
        let points = &ring.lines[0].points;
        assert_eq!(points.len(), 91);
        assert_eq!(points.first(), points.last());

        let geodesic = Geodesic::wgs84();
        for p in points {
            let c = world_to_lon_lat(*p);
            let d: f64 = geodesic.inverse(origin.y, origin.x, c.y, c.x);
            assert!((d - 230_000.0).abs() < 1.0);
        }
    }

    #[test]
    fn test_bad_shapefile_bytes() {
        let result = OverlayLayer::from_shapefile_bytes(OverlayKind::States, "bad", b"not a shp");
        assert!(matches!(result, Err(OverlayError::Shapefile(_))));
        let missing = OverlayLayer::load(OverlayKind::States, Path::new("/nonexistent/x.shp"));
        assert!(matches!(missing, Err(OverlayError::Io(_))));
    }

    #[test]
    fn test_overlay_set_order() {
        let mut set = OverlaySet::new();
        set.push(OverlayLayer::new(OverlayKind::States, "states"));
        set.set_range_rings(vec![OverlayLayer::new(OverlayKind::RangeRing, "KLSX")]);
        set.push(OverlayLayer::new(OverlayKind::Counties, "counties"));
        let names: Vec<&str> = set.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["states", "counties", "KLSX"]);
        set.set_range_rings(Vec::new());
        assert_eq!(set.len(), 2);
    }
}
