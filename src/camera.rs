//! Frame/camera controller.
//!
//! [`CameraController`] owns the mutable [`CameraState`] and applies pan,
//! zoom and rotate inputs to it. The renderer never touches the controller;
//! it takes a [`ViewTransform`] snapshot once per frame.
//!
//! Screen coordinates are logical pixels from the viewport's top-left
//! corner, y down. Positive rotation turns the map clockwise on screen.

use crate::geo::projection::{
    clamp_latitude, lon_lat_to_world, pixels_per_world_unit, world_to_lon_lat, WorldBounds,
};
use geo_types::Coord;
use glam::{DMat4, DVec2, DVec3, Mat4};
use serde::{Deserialize, Serialize};

/// Camera position, zoom and rotation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraState {
    pub center_lat: f64,
    pub center_lon: f64,
    /// Web Mercator zoom level
    pub zoom: f64,
    /// Clockwise map rotation in degrees, [0, 360)
    pub rotation_deg: f64,
}

impl Default for CameraState {
    fn default() -> Self {
        Self {
            // Center of the continental US
            center_lat: 39.0,
            center_lon: -98.0,
            zoom: 5.0,
            rotation_deg: 0.0,
        }
    }
}

impl CameraState {
    pub fn center(&self) -> Coord<f64> {
        Coord {
            x: self.center_lon,
            y: self.center_lat,
        }
    }
}

/// Allowed zoom range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoomLimits {
    pub min: f64,
    pub max: f64,
}

impl ZoomLimits {
    pub fn new(a: f64, b: f64) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    pub fn clamp(&self, zoom: f64) -> f64 {
        zoom.clamp(self.min, self.max)
    }
}

impl Default for ZoomLimits {
    fn default() -> Self {
        Self::new(3.0, 14.0)
    }
}

/// Applies user input to the camera state.
#[derive(Debug, Clone)]
pub struct CameraController {
    state: CameraState,
    limits: ZoomLimits,
    viewport: DVec2,
}

impl Default for CameraController {
    fn default() -> Self {
        Self::new(CameraState::default(), ZoomLimits::default())
    }
}

impl CameraController {
    pub fn new(state: CameraState, limits: ZoomLimits) -> Self {
        let mut controller = Self {
            state,
            limits,
            viewport: DVec2::new(800.0, 600.0),
        };
        controller.state.zoom = limits.clamp(state.zoom);
        controller.state.center_lat = clamp_latitude(state.center_lat);
        controller.state.rotation_deg = state.rotation_deg.rem_euclid(360.0);
        controller
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> CameraState {
        self.state
    }

    pub fn limits(&self) -> ZoomLimits {
        self.limits
    }

    pub fn set_limits(&mut self, limits: ZoomLimits) {
        self.limits = limits;
        self.state.zoom = limits.clamp(self.state.zoom);
    }

    pub fn viewport(&self) -> DVec2 {
        self.viewport
    }

    /// Updates the viewport size in logical pixels.
    pub fn set_viewport(&mut self, width: f32, height: f32) {
        if width.is_finite() && height.is_finite() && width > 0.0 && height > 0.0 {
            self.viewport = DVec2::new(width as f64, height as f64);
        }
    }

    /// View transform for the current state.
    pub fn view(&self) -> ViewTransform {
        ViewTransform::new(&self.state, self.viewport)
    }

    /// Moves the map with a drag of `dx, dy` pixels.
    pub fn pan_by_pixels(&mut self, dx: f32, dy: f32) {
        if !dx.is_finite() || !dy.is_finite() {
            return;
        }
        let view = self.view();
        let unrotated = view.unrotate(DVec2::new(dx as f64, dy as f64));
        self.set_center_world(view.center_world - unrotated / view.pixels_per_unit);
    }

    /// Changes zoom by `levels`, keeping the world point under `anchor`
    /// (screen pixels) fixed. Without an anchor the viewport center is kept.
    pub fn zoom_by(&mut self, levels: f64, anchor: Option<DVec2>) {
        if !levels.is_finite() {
            return;
        }
        self.zoom_to(self.state.zoom + levels, anchor);
    }

    /// Sets the zoom level, clamped to the limits.
    pub fn set_zoom(&mut self, zoom: f64) {
        if zoom.is_finite() {
            self.zoom_to(zoom, None);
        }
    }

    fn zoom_to(&mut self, zoom: f64, anchor: Option<DVec2>) {
        let zoom = self.limits.clamp(zoom);
        let anchor = anchor.filter(|a| a.is_finite());
        let Some(anchor) = anchor else {
            self.state.zoom = zoom;
            return;
        };

        let before = self.view();
        let world_anchor = before.screen_to_world(anchor);
        self.state.zoom = zoom;
        let after = self.view();
        let offset = after.unrotate(anchor - self.viewport / 2.0) / after.pixels_per_unit;
        self.set_center_world(world_anchor - offset);
    }

    /// Rotates the map clockwise by `degrees`.
    pub fn rotate_by(&mut self, degrees: f64) {
        if degrees.is_finite() {
            self.state.rotation_deg = (self.state.rotation_deg + degrees).rem_euclid(360.0);
        }
    }

    pub fn reset_rotation(&mut self) {
        self.state.rotation_deg = 0.0;
    }

    /// Centers on a geographic location, optionally changing zoom.
    pub fn center_on(&mut self, lat: f64, lon: f64, zoom: Option<f64>) {
        if !lat.is_finite() || !lon.is_finite() {
            return;
        }
        self.state.center_lat = clamp_latitude(lat);
        self.state.center_lon = wrap_longitude(lon);
        if let Some(zoom) = zoom.filter(|z| z.is_finite()) {
            self.state.zoom = self.limits.clamp(zoom);
        }
    }

    fn set_center_world(&mut self, world: DVec2) {
        let world = DVec2::new(world.x.rem_euclid(1.0), world.y.clamp(0.0, 1.0));
        let coord = world_to_lon_lat(world);
        self.state.center_lat = clamp_latitude(coord.y);
        self.state.center_lon = wrap_longitude(coord.x);
    }
}

fn wrap_longitude(lon: f64) -> f64 {
    (lon + 180.0).rem_euclid(360.0) - 180.0
}

/// Per-frame mapping between world space, screen pixels and clip space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewTransform {
    pub center_world: DVec2,
    pub zoom: f64,
    pub rotation_rad: f64,
    /// Viewport size in logical pixels
    pub viewport: DVec2,
    pub pixels_per_unit: f64,
}

impl ViewTransform {
    pub fn new(state: &CameraState, viewport: DVec2) -> Self {
        Self {
            center_world: lon_lat_to_world(state.center()),
            zoom: state.zoom,
            rotation_rad: state.rotation_deg.to_radians(),
            viewport,
            pixels_per_unit: pixels_per_world_unit(state.zoom),
        }
    }

    fn rotate(&self, v: DVec2) -> DVec2 {
        DVec2::from_angle(self.rotation_rad).rotate(v)
    }

    fn unrotate(&self, v: DVec2) -> DVec2 {
        DVec2::from_angle(-self.rotation_rad).rotate(v)
    }

    pub fn world_to_screen(&self, world: DVec2) -> DVec2 {
        self.rotate((world - self.center_world) * self.pixels_per_unit) + self.viewport / 2.0
    }

    pub fn screen_to_world(&self, screen: DVec2) -> DVec2 {
        self.center_world + self.unrotate(screen - self.viewport / 2.0) / self.pixels_per_unit
    }

    pub fn geo_to_screen(&self, coord: Coord<f64>) -> DVec2 {
        self.world_to_screen(lon_lat_to_world(coord))
    }

    pub fn screen_to_geo(&self, screen: DVec2) -> Coord<f64> {
        world_to_lon_lat(self.screen_to_world(screen))
    }

    /// World-space box enclosing the (possibly rotated) viewport.
    pub fn visible_bounds(&self) -> WorldBounds {
        let (w, h) = (self.viewport.x, self.viewport.y);
        WorldBounds::from_points(
            [
                DVec2::new(0.0, 0.0),
                DVec2::new(w, 0.0),
                DVec2::new(w, h),
                DVec2::new(0.0, h),
            ]
            .map(|corner| self.screen_to_world(corner)),
        )
    }

    /// Clip-space matrix for vertices given relative to `origin`.
    ///
    /// Built in double precision so the translation stays exact at high
    /// zoom; only the final matrix is narrowed to f32.
    pub fn clip_matrix(&self, origin: DVec2) -> Mat4 {
        let scale = DMat4::from_scale(DVec3::new(
            2.0 * self.pixels_per_unit / self.viewport.x,
            -2.0 * self.pixels_per_unit / self.viewport.y,
            1.0,
        ));
        let rotate = DMat4::from_rotation_z(self.rotation_rad);
        let translate = DMat4::from_translation((origin - self.center_world).extend(0.0));
        (scale * rotate * translate).as_mat4()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec4;

    fn controller() -> CameraController {
        let mut c = CameraController::new(
            CameraState {
                center_lat: 38.6989,
                center_lon: -90.6828,
                zoom: 9.0,
                rotation_deg: 0.0,
            },
            ZoomLimits::new(3.0, 14.0),
        );
        c.set_viewport(1000.0, 800.0);
        c
    }

    #[test]
    fn test_zoom_clamps() {
        let mut c = controller();
        c.set_zoom(42.0);
        assert_eq!(c.state().zoom, 14.0);
        c.zoom_by(-100.0, None);
        assert_eq!(c.state().zoom, 3.0);
        c.set_zoom(f64::NAN);
        assert_eq!(c.state().zoom, 3.0);
    }

    #[test]
    fn test_zoom_keeps_anchor_fixed() {
        for rotation in [0.0, 37.0] {
            let mut c = controller();
            c.rotate_by(rotation);
            let anchor = DVec2::new(820.0, 130.0);
            let before = c.view().screen_to_world(anchor);
            c.zoom_by(1.5, Some(anchor));
            let after = c.view().world_to_screen(before);
            assert!((after - anchor).length() < 1e-6, "{:?} vs {:?}", after, anchor);
        }
    }

    #[test]
    fn test_pan_follows_drag() {
        let mut c = controller();
        c.rotate_by(90.0);
        let start = DVec2::new(500.0, 400.0);
        let world = c.view().screen_to_world(start);
        c.pan_by_pixels(25.0, -40.0);
        let moved = c.view().world_to_screen(world);
        assert!((moved - (start + DVec2::new(25.0, -40.0))).length() < 1e-6);
    }

    #[test]
    fn test_rotation_wraps() {
        let mut c = controller();
        c.rotate_by(350.0);
        c.rotate_by(20.0);
        assert!((c.state().rotation_deg - 10.0).abs() < 1e-9);
        c.rotate_by(-30.0);
        assert!((c.state().rotation_deg - 340.0).abs() < 1e-9);
        c.reset_rotation();
        assert_eq!(c.state().rotation_deg, 0.0);
    }

    #[test]
    fn test_latitude_clamped() {
        let mut c = controller();
        c.center_on(89.0, 190.0, None);
        assert!(c.state().center_lat <= crate::geo::projection::MAX_LATITUDE);
        assert!((c.state().center_lon - -170.0).abs() < 1e-9);
    }

    #[test]
    fn test_clip_matrix_matches_screen_mapping() {
        let mut c = controller();
        c.rotate_by(30.0);
        let view = c.view();
        let origin = view.center_world + DVec2::new(0.001, -0.0005);
        let m = view.clip_matrix(origin);

        let relative = DVec2::new(0.0002, 0.0003);
        let screen = view.world_to_screen(origin + relative);
        let clip = m * Vec4::new(relative.x as f32, relative.y as f32, 0.0, 1.0);
        let expected_x = screen.x / view.viewport.x * 2.0 - 1.0;
        let expected_y = 1.0 - screen.y / view.viewport.y * 2.0;
        assert!((clip.x as f64 - expected_x).abs() < 1e-4);
        assert!((clip.y as f64 - expected_y).abs() < 1e-4);
    }

    #[test]
    fn test_visible_bounds_contain_viewport() {
        let mut c = controller();
        c.rotate_by(45.0);
        let view = c.view();
        let bounds = view.visible_bounds();
        assert!(bounds.contains(view.center_world));
        assert!(bounds.contains(view.screen_to_world(DVec2::new(0.0, 0.0))));
        assert!(bounds.contains(view.screen_to_world(DVec2::new(1000.0, 800.0))));
    }
}
