//! Overlay painting.
//!
//! Overlays are drawn with the egui painter after the sweep paint callback,
//! so they composite on top of the radar layer.

use super::layer::{OverlayLayer, OverlaySet};
use super::projection::WorldBounds;
use crate::camera::ViewTransform;
use eframe::egui::{Painter, Pos2, Rect, Stroke};
use glam::DVec2;

/// Paints every overlay shown at the view's zoom. Returns the number of
/// segments drawn.
pub fn paint_overlays(
    painter: &Painter,
    rect: Rect,
    overlays: &OverlaySet,
    view: &ViewTransform,
) -> usize {
    let visible = view.visible_bounds();
    let mut segments = 0;
    for layer in overlays.iter() {
        if layer.is_shown_at(view.zoom) {
            segments += paint_layer(painter, rect, layer, view, &visible);
        }
    }
    segments
}

fn paint_layer(
    painter: &Painter,
    rect: Rect,
    layer: &OverlayLayer,
    view: &ViewTransform,
    visible: &WorldBounds,
) -> usize {
    let stroke = Stroke::new(layer.effective_line_width(), layer.effective_color());
    let to_screen = |p: DVec2| {
        let s = view.world_to_screen(p);
        Pos2::new(rect.min.x + s.x as f32, rect.min.y + s.y as f32)
    };

    let mut drawn = 0;
    for line in layer.visible_lines(visible) {
        let mut previous = to_screen(line.points[0]);
        for point in &line.points[1..] {
            let next = to_screen(*point);
            // Sub-pixel segments are merged into the next one
            if previous.distance_sq(next) > 0.5 {
                painter.line_segment([previous, next], stroke);
                previous = next;
                drawn += 1;
            }
        }
    }
    drawn
}
