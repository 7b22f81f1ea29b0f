//! Color-table legend drawn in the canvas corner.

use super::colors;
use eframe::egui::{Align2, Color32, FontId, Painter, Pos2, Rect, Stroke, StrokeKind, Vec2};
use wxradar_workbench::color::ColorTable;

const BAR_WIDTH: f32 = 240.0;
const BAR_HEIGHT: f32 = 12.0;
const SAMPLES: usize = 96;
const MARGIN: f32 = 12.0;

/// Paints `table` as a horizontal bar in the bottom-right of `rect`.
pub fn paint_legend(painter: &Painter, rect: Rect, table: &ColorTable) {
    let (lo, hi) = table.span();
    // Extend past the last threshold so its bucket is visible
    let step = (hi - lo) / (SAMPLES as f32 - 1.0).max(1.0);
    let hi = if hi > lo { hi + step * 4.0 } else { lo + 1.0 };

    let origin = Pos2::new(
        rect.max.x - BAR_WIDTH - MARGIN,
        rect.max.y - BAR_HEIGHT - MARGIN - 30.0,
    );
    let backdrop = Rect::from_min_size(
        origin - Vec2::new(8.0, 20.0),
        Vec2::new(BAR_WIDTH + 16.0, BAR_HEIGHT + 46.0),
    );
    painter.rect_filled(backdrop, 4.0, colors::canvas::info_backdrop());

    painter.text(
        origin - Vec2::new(0.0, 4.0),
        Align2::LEFT_BOTTOM,
        format!("{} ({})", table.product().label(), table.units()),
        FontId::proportional(11.0),
        colors::canvas::INFO_TEXT,
    );

    let slice = BAR_WIDTH / SAMPLES as f32;
    for i in 0..SAMPLES {
        let value = lo + (hi - lo) * (i as f32 + 0.5) / SAMPLES as f32;
        let color = opaque(table.color_for_value(value));
        let cell = Rect::from_min_size(
            origin + Vec2::new(i as f32 * slice, 0.0),
            Vec2::new(slice + 0.5, BAR_HEIGHT),
        );
        painter.rect_filled(cell, 0.0, color);
    }
    let bar = Rect::from_min_size(origin, Vec2::new(BAR_WIDTH, BAR_HEIGHT));
    painter.rect_stroke(
        bar,
        0.0,
        Stroke::new(1.0, colors::legend::BORDER),
        StrokeKind::Outside,
    );

    for (value, label) in tick_labels(lo, hi) {
        let x = origin.x + BAR_WIDTH * (value - lo) / (hi - lo);
        painter.line_segment(
            [
                Pos2::new(x, bar.max.y),
                Pos2::new(x, bar.max.y + 4.0),
            ],
            Stroke::new(1.0, colors::legend::TICK),
        );
        painter.text(
            Pos2::new(x, bar.max.y + 5.0),
            Align2::CENTER_TOP,
            label,
            FontId::monospace(10.0),
            colors::legend::TICK,
        );
    }

    // Range-folded swatch
    let swatch = Rect::from_min_size(
        Pos2::new(bar.max.x - 10.0, origin.y - 16.0),
        Vec2::splat(10.0),
    );
    painter.rect_filled(swatch, 0.0, opaque(table.range_folded()));
    painter.text(
        swatch.left_center() - Vec2::new(4.0, 0.0),
        Align2::RIGHT_CENTER,
        "RF",
        FontId::monospace(10.0),
        colors::legend::TICK,
    );
}

/// Up to six evenly spaced ticks at round values inside `[lo, hi]`.
fn tick_labels(lo: f32, hi: f32) -> Vec<(f32, String)> {
    let span = hi - lo;
    if !span.is_finite() || span <= 0.0 {
        return Vec::new();
    }
    let raw = span / 5.0;
    let magnitude = 10f32.powf(raw.log10().floor());
    let step = [1.0, 2.0, 2.5, 5.0, 10.0]
        .iter()
        .map(|m| m * magnitude)
        .find(|s| *s >= raw)
        .unwrap_or(10.0 * magnitude);
    let decimals = (0..3)
        .find(|d| {
            let scaled = step * 10f32.powi(*d);
            (scaled - scaled.round()).abs() < 1e-3
        })
        .unwrap_or(3) as usize;

    let first = (lo / step - 1e-3).ceil();
    let mut ticks = Vec::new();
    for i in 0..6 {
        // Adding zero turns -0.0 into 0.0
        let value = (first + i as f32) * step + 0.0;
        if value > hi + step * 1e-3 {
            break;
        }
        ticks.push((value, format!("{:.*}", decimals, value)));
    }
    ticks
}

fn opaque(color: Color32) -> Color32 {
    if color.a() == 0 {
        Color32::TRANSPARENT
    } else {
        Color32::from_rgb(color.r(), color.g(), color.b())
    }
}
