//! Central canvas UI: sweep layer, overlays, site markers and legend.

use super::{colors, legend};
use crate::app::{FrameOutcome, SharedRenderer, ViewState};
use eframe::egui::{
    self, Align2, FontId, Painter, PointerButton, Pos2, Rect, RichText, Sense, Stroke, Vec2,
};
use glam::DVec2;
use std::sync::mpsc::Sender;
use std::sync::Arc;
use wxradar_workbench::camera::{CameraController, ViewTransform};
use wxradar_workbench::color::ColorTable;
use wxradar_workbench::data::RADAR_SITES;
use wxradar_workbench::geo::{paint_overlays, OverlaySet};
use wxradar_workbench::raster::RasterBuffer;
use wxradar_workbench::sweep_cache::SweepCache;

/// Zoom levels per point of scroll.
const ZOOM_PER_SCROLL_POINT: f64 = 1.0 / 200.0;
/// Rotation degrees per point of right-drag.
const ROTATE_PER_DRAG_POINT: f64 = 0.3;
/// Click distance for selecting a site marker.
const SITE_PICK_RADIUS: f32 = 10.0;

/// What the canvas draws besides the camera.
pub struct SweepLayer<'a> {
    pub renderer: &'a SharedRenderer,
    pub cache: &'a Arc<SweepCache>,
    pub frames: &'a Sender<FrameOutcome>,
    pub overlays: &'a OverlaySet,
    /// Current buffer for the selected site and product
    pub current: Option<&'a RasterBuffer>,
    pub legend: &'a ColorTable,
}

pub fn render_canvas(
    ctx: &egui::Context,
    state: &mut ViewState,
    camera: &mut CameraController,
    layer: SweepLayer<'_>,
) {
    egui::CentralPanel::default()
        .frame(egui::Frame::NONE)
        .show(ctx, |ui| {
            let available_size = ui.available_size();

            // Allocate the full available space for the canvas
            let (response, painter) =
                ui.allocate_painter(available_size, Sense::click_and_drag());
            let rect = response.rect;
            camera.set_viewport(rect.width(), rect.height());

            handle_canvas_interaction(ui, &response, rect, state, camera);
            let view = camera.view();

            // Draw background
            painter.rect_filled(rect, 0.0, colors::canvas::BACKGROUND);

            add_sweep_callback(&painter, rect, state, &view, &layer);

            // Overlays composite on top of the sweep layer
            paint_overlays(&painter, rect, layer.overlays, &view);
            render_site_markers(&painter, rect, &view, state);

            draw_overlay_info(ui, rect, state, &view, layer.current);
            if view.rotation_rad != 0.0 {
                draw_north_arrow(&painter, rect, &view);
            }
            legend::paint_legend(&painter, rect, layer.legend);
        });
}

/// Queues the GL pass that draws every current sweep of the selected product.
fn add_sweep_callback(
    painter: &Painter,
    rect: Rect,
    state: &ViewState,
    view: &ViewTransform,
    layer: &SweepLayer<'_>,
) {
    let renderer = Arc::clone(layer.renderer);
    let cache = Arc::clone(layer.cache);
    let frames = layer.frames.clone();
    let view = *view;
    let product = state.product;
    let opacity = state.opacity;

    let callback = egui::PaintCallback {
        rect,
        callback: Arc::new(egui_glow::CallbackFn::new(move |_info, painter| {
            let mut guard = renderer.lock();
            let Some(tiles) = guard.as_mut() else {
                return;
            };
            let outcome = tiles.render_frame(
                painter.gl(),
                &cache,
                &view,
                |key| key.product == product,
                opacity,
            );
            // The app only goes away after the last frame
            let _ = frames.send(outcome);
        })),
    };
    painter.add(callback);
}

fn local(pos: Pos2, rect: Rect) -> DVec2 {
    DVec2::new((pos.x - rect.min.x) as f64, (pos.y - rect.min.y) as f64)
}

fn handle_canvas_interaction(
    ui: &egui::Ui,
    response: &egui::Response,
    rect: Rect,
    state: &mut ViewState,
    camera: &mut CameraController,
) {
    // Left-drag pans, right-drag rotates
    if response.dragged_by(PointerButton::Primary) {
        let delta = response.drag_delta();
        camera.pan_by_pixels(delta.x, delta.y);
    }
    if response.dragged_by(PointerButton::Secondary) {
        camera.rotate_by(response.drag_delta().x as f64 * ROTATE_PER_DRAG_POINT);
    }

    if response.hovered() {
        // Scroll zooms about the cursor
        let scroll = ui.input(|i| i.smooth_scroll_delta.y);
        if scroll != 0.0 {
            let anchor = response.hover_pos().map(|p| local(p, rect));
            camera.zoom_by(scroll as f64 * ZOOM_PER_SCROLL_POINT, anchor);
        }

        if ui.input(|i| i.key_pressed(egui::Key::R)) {
            camera.reset_rotation();
        }
    }

    if response.double_clicked() {
        let anchor = response.interact_pointer_pos().map(|p| local(p, rect));
        camera.zoom_by(1.0, anchor);
    } else if response.clicked() {
        if let Some(pos) = response.interact_pointer_pos() {
            if let Some(site) = pick_site(pos, rect, &camera.view(), state.show_all_sites) {
                state.site = site;
            }
        }
    }
}

fn site_screen_pos(view: &ViewTransform, rect: Rect, lat: f64, lon: f64) -> Pos2 {
    let screen = view.geo_to_screen(geo_types::Coord { x: lon, y: lat });
    Pos2::new(rect.min.x + screen.x as f32, rect.min.y + screen.y as f32)
}

/// Nearest site marker under `pos`.
fn pick_site(
    pos: Pos2,
    rect: Rect,
    view: &ViewTransform,
    all_sites: bool,
) -> Option<wxradar_workbench::radar::SiteId> {
    if !all_sites {
        return None;
    }
    RADAR_SITES
        .iter()
        .map(|site| {
            let distance = site_screen_pos(view, rect, site.lat, site.lon).distance(pos);
            (site, distance)
        })
        .filter(|(_, distance)| *distance <= SITE_PICK_RADIUS)
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(site, _)| site.site_id())
}

fn render_site_markers(painter: &Painter, rect: Rect, view: &ViewTransform, state: &ViewState) {
    let visible = rect.expand(20.0);

    if state.show_all_sites {
        for site in RADAR_SITES.iter() {
            // Skip current site (we'll draw it on top)
            if site.site_id() == state.site {
                continue;
            }
            let screen_pos = site_screen_pos(view, rect, site.lat, site.lon);
            if !visible.contains(screen_pos) {
                continue;
            }

            painter.circle_filled(screen_pos, 4.0, colors::sites::OTHER);
            painter.circle_stroke(
                screen_pos,
                4.0,
                Stroke::new(1.0, colors::sites::OTHER_STROKE),
            );
            painter.text(
                screen_pos + Vec2::new(6.0, -2.0),
                Align2::LEFT_CENTER,
                site.id,
                FontId::proportional(10.0),
                colors::sites::LABEL,
            );
        }
    }

    // Always render the current site (on top of others)
    if let Some(site) = RADAR_SITES.iter().find(|s| s.site_id() == state.site) {
        let screen_pos = site_screen_pos(view, rect, site.lat, site.lon);
        painter.circle_filled(screen_pos, 6.0, colors::sites::CURRENT);
        painter.circle_stroke(
            screen_pos,
            6.0,
            Stroke::new(1.5, colors::sites::CURRENT_STROKE),
        );
        painter.text(
            screen_pos + Vec2::new(8.0, -2.0),
            Align2::LEFT_CENTER,
            site.id,
            FontId::proportional(11.0),
            colors::sites::CURRENT_LABEL,
        );
    }
}

fn draw_overlay_info(
    ui: &mut egui::Ui,
    rect: Rect,
    state: &ViewState,
    view: &ViewTransform,
    current: Option<&RasterBuffer>,
) {
    let overlay_pos = rect.left_top() + Vec2::new(10.0, 10.0);
    let overlay_rect = Rect::from_min_size(overlay_pos, Vec2::new(220.0, 96.0));
    ui.painter()
        .rect_filled(overlay_rect.expand(4.0), 4.0, colors::canvas::info_backdrop());

    let lines = [
        format!("Site:    {}", state.site),
        format!("Product: {}", state.product.label()),
        match current {
            Some(buffer) => format!("Time:    {}", buffer.scan_time.format("%Y-%m-%d %H:%M:%SZ")),
            None => "Time:    no data".to_string(),
        },
        match current {
            Some(buffer) => format!("Elev:    {:.1}°", buffer.elevation_deg),
            None => "Elev:    -".to_string(),
        },
        format!(
            "Zoom:    {:.1}  Rot: {:.0}°",
            view.zoom,
            view.rotation_rad.to_degrees().rem_euclid(360.0)
        ),
    ];

    ui.scope_builder(egui::UiBuilder::new().max_rect(overlay_rect), |ui| {
        ui.vertical(|ui| {
            for line in lines {
                ui.label(
                    RichText::new(line)
                        .monospace()
                        .size(12.0)
                        .color(colors::canvas::INFO_TEXT),
                );
            }
        });
    });
}

/// Arrow in the top-right corner pointing to geographic north.
fn draw_north_arrow(painter: &Painter, rect: Rect, view: &ViewTransform) {
    let center = rect.right_top() + Vec2::new(-30.0, 30.0);
    let (sin, cos) = (view.rotation_rad as f32).sin_cos();
    let north = Vec2::new(sin, -cos);
    let side = Vec2::new(cos, sin);

    let tip = center + north * 14.0;
    let tail = center - north * 10.0;
    let stroke = Stroke::new(2.0, colors::canvas::NORTH_ARROW);
    painter.line_segment([tail, tip], stroke);
    painter.line_segment([tip, tip - north * 6.0 + side * 5.0], stroke);
    painter.line_segment([tip, tip - north * 6.0 - side * 5.0], stroke);
    painter.text(
        tip + north * 8.0,
        Align2::CENTER_CENTER,
        "N",
        FontId::proportional(11.0),
        colors::canvas::NORTH_ARROW,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use wxradar_workbench::camera::{CameraState, ZoomLimits};

    fn view_at_klsx() -> (ViewTransform, Rect) {
        let mut camera = CameraController::new(
            CameraState {
                center_lat: 38.6989,
                center_lon: -90.6828,
                zoom: 6.0,
                rotation_deg: 0.0,
            },
            ZoomLimits::default(),
        );
        camera.set_viewport(800.0, 600.0);
        let rect = Rect::from_min_size(Pos2::new(0.0, 40.0), Vec2::new(800.0, 600.0));
        (camera.view(), rect)
    }

    #[test]
    fn test_pick_site_at_center() {
        let (view, rect) = view_at_klsx();
        let picked = pick_site(rect.center() + Vec2::new(3.0, -2.0), rect, &view, true);
        assert_eq!(picked.map(|s| s.to_string()), Some("KLSX".to_string()));
    }

    #[test]
    fn test_pick_site_misses_and_respects_toggle() {
        let (view, rect) = view_at_klsx();
        assert!(pick_site(rect.center() + Vec2::new(60.0, 60.0), rect, &view, true).is_none());
        assert!(pick_site(rect.center(), rect, &view, false).is_none());
    }
}
