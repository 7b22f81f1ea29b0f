//! Web Mercator projection and world-space bounds.
//!
//! World coordinates span [0, 1] on both axes, x growing east from the
//! antimeridian and y growing south from the northern latitude limit. One
//! world unit is `TILE_SIZE * 2^zoom` screen pixels at a given zoom level.

use geo_types::Coord;
use glam::DVec2;
use std::f64::consts::PI;

/// Latitude limit of the Web Mercator square, in degrees.
pub const MAX_LATITUDE: f64 = 85.051_128_779_806_59;

/// Screen pixels covered by the whole world at zoom 0.
pub const TILE_SIZE: f64 = 512.0;

/// Clamps a latitude into the projectable range.
#[inline]
pub fn clamp_latitude(lat: f64) -> f64 {
    lat.clamp(-MAX_LATITUDE, MAX_LATITUDE)
}

/// Projects geographic coordinates (x = lon, y = lat) into world space.
#[inline]
pub fn lon_lat_to_world(coord: Coord<f64>) -> DVec2 {
    let lat = clamp_latitude(coord.y).to_radians();
    let x = (coord.x + 180.0) / 360.0;
    let y = 0.5 - ((PI / 4.0 + lat / 2.0).tan().ln()) / (2.0 * PI);
    DVec2::new(x, y)
}

/// Inverse of [`lon_lat_to_world`].
#[inline]
pub fn world_to_lon_lat(world: DVec2) -> Coord<f64> {
    let lon = world.x * 360.0 - 180.0;
    let n = PI * (1.0 - 2.0 * world.y);
    let lat = n.sinh().atan().to_degrees();
    Coord { x: lon, y: lat }
}

/// Screen pixels per world unit at `zoom`.
#[inline]
pub fn pixels_per_world_unit(zoom: f64) -> f64 {
    TILE_SIZE * 2f64.powf(zoom)
}

/// Axis-aligned bounds in world space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorldBounds {
    pub min: DVec2,
    pub max: DVec2,
}

impl Default for WorldBounds {
    fn default() -> Self {
        Self::empty()
    }
}

impl WorldBounds {
    /// Bounds containing nothing; including any point makes them valid.
    pub const fn empty() -> Self {
        Self {
            min: DVec2::new(f64::INFINITY, f64::INFINITY),
            max: DVec2::new(f64::NEG_INFINITY, f64::NEG_INFINITY),
        }
    }

    pub fn new(min: DVec2, max: DVec2) -> Self {
        Self {
            min: min.min(max),
            max: min.max(max),
        }
    }

    pub fn from_points(points: impl IntoIterator<Item = DVec2>) -> Self {
        let mut bounds = Self::empty();
        for p in points {
            bounds.include(p);
        }
        bounds
    }

    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y
    }

    pub fn include(&mut self, p: DVec2) {
        self.min = self.min.min(p);
        self.max = self.max.max(p);
    }

    pub fn union(&self, other: &WorldBounds) -> WorldBounds {
        WorldBounds {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// True when the two boxes overlap (touching edges count).
    pub fn intersects(&self, other: &WorldBounds) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
    }

    pub fn contains(&self, p: DVec2) -> bool {
        p.x >= self.min.x && p.x <= self.max.x && p.y >= self.min.y && p.y <= self.max.y
    }

    pub fn expand(&self, margin: f64) -> WorldBounds {
        WorldBounds {
            min: self.min - DVec2::splat(margin),
            max: self.max + DVec2::splat(margin),
        }
    }

    pub fn translate(&self, offset: DVec2) -> WorldBounds {
        WorldBounds {
            min: self.min + offset,
            max: self.max + offset,
        }
    }

    pub fn center(&self) -> DVec2 {
        (self.min + self.max) * 0.5
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_origin_maps_to_center() {
        let world = lon_lat_to_world(Coord { x: 0.0, y: 0.0 });
        assert!((world.x - 0.5).abs() < 1e-12);
        assert!((world.y - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_projection_inverts() {
        let coord = Coord {
            x: -90.6828,
            y: 38.6989,
        };
        let back = world_to_lon_lat(lon_lat_to_world(coord));
        assert!((back.x - coord.x).abs() < 1e-9);
        assert!((back.y - coord.y).abs() < 1e-9);
    }

    #[test]
    fn test_latitude_clamped() {
        let north = lon_lat_to_world(Coord { x: 0.0, y: 89.9 });
        assert!(north.y.abs() < 1e-9);
    }

    #[test]
    fn test_bounds_intersection() {
        let a = WorldBounds::new(DVec2::new(0.1, 0.1), DVec2::new(0.2, 0.2));
        let b = WorldBounds::new(DVec2::new(0.15, 0.15), DVec2::new(0.3, 0.3));
        let c = WorldBounds::new(DVec2::new(0.25, 0.0), DVec2::new(0.3, 0.05));

        assert!(a.intersects(&b));
        assert!(!a.intersects(&c));
        assert!(!a.intersects(&WorldBounds::empty()));
    }
}
