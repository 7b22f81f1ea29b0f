//! Built-in palettes for every known product.
//!
//! Reflectivity follows the NWS standard scheme; the dual-pol and velocity
//! ramps follow the GR2Analyst default palettes.

use super::table::{ColorStop, ColorTable};
use crate::radar::ProductType;
use eframe::egui::Color32;

/// Built-in table for `product`, or `None` for unknown products.
pub fn builtin(product: ProductType) -> Option<ColorTable> {
    let stops = match product {
        ProductType::Reflectivity => reflectivity(),
        ProductType::Velocity => velocity(),
        ProductType::SpectrumWidth => spectrum_width(),
        ProductType::DifferentialReflectivity => differential_reflectivity(),
        ProductType::CorrelationCoefficient => correlation_coefficient(),
        ProductType::DifferentialPhase => differential_phase(),
        ProductType::Unknown(_) => return None,
    };
    ColorTable::new(product, stops).ok()
}

fn rgba(r: u8, g: u8, b: u8, a: u8) -> Color32 {
    Color32::from_rgba_unmultiplied(r, g, b, a)
}

/// NWS standard reflectivity palette.
///
/// - < 5 dBZ: transparent (no precipitation)
/// - 5-20 dBZ: cyan to blue (light precipitation)
/// - 20-35 dBZ: greens (moderate rain)
/// - 35-50 dBZ: yellow to orange (heavy rain)
/// - 50-65 dBZ: reds (severe)
/// - > 65 dBZ: magenta to white (extreme)
fn reflectivity() -> Vec<ColorStop> {
    vec![
        ColorStop::new(5.0, rgba(0, 236, 236, 180)),  // Light cyan
        ColorStop::new(10.0, rgba(1, 160, 246, 180)), // Cyan
        ColorStop::new(15.0, rgba(0, 0, 246, 180)),   // Blue
        ColorStop::new(20.0, rgba(0, 255, 0, 180)),   // Light green
        ColorStop::new(25.0, rgba(0, 200, 0, 180)),   // Green
        ColorStop::new(30.0, rgba(0, 144, 0, 180)),   // Dark green
        ColorStop::new(35.0, rgba(255, 255, 0, 200)), // Yellow
        ColorStop::new(40.0, rgba(231, 192, 0, 200)), // Gold
        ColorStop::new(45.0, rgba(255, 144, 0, 200)), // Orange
        ColorStop::new(50.0, rgba(255, 0, 0, 220)),   // Red
        ColorStop::new(55.0, rgba(214, 0, 0, 220)),   // Dark red
        ColorStop::new(60.0, rgba(192, 0, 0, 220)),   // Maroon
        ColorStop::new(65.0, rgba(255, 0, 255, 240)), // Magenta
        ColorStop::new(70.0, rgba(153, 85, 201, 240)),
        ColorStop::new(75.0, rgba(255, 255, 255, 255)), // White
    ]
}

/// Inbound greens, outbound reds, muted near zero. m/s.
fn velocity() -> Vec<ColorStop> {
    vec![
        ColorStop::new(-64.0, rgba(2, 252, 2, 220)),
        ColorStop::new(-50.0, rgba(1, 228, 1, 220)),
        ColorStop::new(-36.0, rgba(1, 197, 1, 220)),
        ColorStop::new(-26.0, rgba(7, 172, 4, 220)),
        ColorStop::new(-20.0, rgba(6, 143, 3, 220)),
        ColorStop::new(-10.0, rgba(4, 114, 2, 220)),
        ColorStop::new(-1.0, rgba(124, 151, 123, 200)),
        ColorStop::new(0.0, rgba(152, 119, 119, 200)),
        ColorStop::new(1.0, rgba(137, 0, 0, 220)),
        ColorStop::new(10.0, rgba(162, 0, 0, 220)),
        ColorStop::new(20.0, rgba(185, 0, 0, 220)),
        ColorStop::new(26.0, rgba(216, 0, 0, 220)),
        ColorStop::new(36.0, rgba(239, 0, 0, 220)),
        ColorStop::new(50.0, rgba(254, 0, 0, 220)),
    ]
}

fn spectrum_width() -> Vec<ColorStop> {
    vec![
        ColorStop::new(0.0, rgba(118, 118, 118, 160)),
        ColorStop::new(4.0, rgba(156, 156, 156, 180)),
        ColorStop::new(6.0, rgba(0, 187, 0, 200)),
        ColorStop::new(8.0, rgba(255, 0, 0, 200)),
        ColorStop::new(10.0, rgba(208, 112, 0, 210)),
        ColorStop::new(12.0, rgba(255, 255, 0, 220)),
        ColorStop::new(20.0, rgba(255, 255, 255, 240)),
    ]
}

/// dB.
fn differential_reflectivity() -> Vec<ColorStop> {
    vec![
        ColorStop::new(-4.0, rgba(64, 64, 64, 200)),
        ColorStop::new(-2.0, rgba(128, 128, 128, 200)),
        ColorStop::new(-0.5, rgba(200, 200, 200, 200)),
        ColorStop::new(0.0, rgba(0, 0, 139, 200)),
        ColorStop::new(0.5, rgba(0, 191, 255, 200)),
        ColorStop::new(1.0, rgba(0, 255, 0, 200)),
        ColorStop::new(1.5, rgba(255, 255, 0, 210)),
        ColorStop::new(2.0, rgba(255, 165, 0, 210)),
        ColorStop::new(3.0, rgba(255, 0, 0, 220)),
        ColorStop::new(4.0, rgba(255, 0, 255, 230)),
        ColorStop::new(6.0, rgba(255, 255, 255, 240)),
    ]
}

/// Unitless, 0..1.05.
fn correlation_coefficient() -> Vec<ColorStop> {
    vec![
        ColorStop::new(0.2, rgba(20, 0, 50, 200)),
        ColorStop::new(0.45, rgba(0, 0, 139, 200)),
        ColorStop::new(0.65, rgba(0, 0, 255, 200)),
        ColorStop::new(0.75, rgba(0, 255, 0, 200)),
        ColorStop::new(0.85, rgba(255, 255, 0, 210)),
        ColorStop::new(0.90, rgba(255, 165, 0, 210)),
        ColorStop::new(0.95, rgba(255, 0, 0, 220)),
        ColorStop::new(0.97, rgba(139, 0, 0, 220)),
        ColorStop::new(1.0, rgba(255, 0, 255, 230)),
        ColorStop::new(1.05, rgba(255, 255, 255, 240)),
    ]
}

/// Degrees, 0..360, as a continuous hue ramp.
fn differential_phase() -> Vec<ColorStop> {
    vec![
        ColorStop::gradient(0.0, rgba(128, 0, 128, 200), rgba(0, 0, 255, 200)),
        ColorStop::gradient(60.0, rgba(0, 0, 255, 200), rgba(0, 200, 0, 200)),
        ColorStop::gradient(120.0, rgba(0, 200, 0, 200), rgba(255, 255, 0, 210)),
        ColorStop::gradient(180.0, rgba(255, 255, 0, 210), rgba(255, 140, 0, 210)),
        ColorStop::gradient(240.0, rgba(255, 140, 0, 210), rgba(255, 0, 0, 220)),
        ColorStop::new(300.0, rgba(255, 0, 0, 220)),
    ]
}
