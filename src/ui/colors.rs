//! Centralized color constants for the UI.

use eframe::egui::Color32;

/// General UI colors for labels and values.
pub mod ui {
    use super::Color32;

    /// Muted gray for stat labels.
    pub const LABEL: Color32 = Color32::from_rgb(100, 100, 100);
    /// Slightly brighter for stat values.
    pub const VALUE: Color32 = Color32::from_rgb(160, 160, 160);
    /// Emphasized color for active states.
    pub const ACTIVE: Color32 = Color32::from_rgb(100, 180, 255);
    pub const WARNING: Color32 = Color32::from_rgb(255, 180, 50);
    pub const ERROR: Color32 = Color32::from_rgb(255, 80, 80);
    pub const SUCCESS: Color32 = Color32::from_rgb(100, 200, 100);
}

/// Colors for the map canvas.
pub mod canvas {
    use super::Color32;

    pub const BACKGROUND: Color32 = Color32::from_rgb(20, 20, 35);
    /// Info overlay text.
    pub const INFO_TEXT: Color32 = Color32::from_rgb(200, 200, 220);

    /// Backdrop behind overlay text - requires alpha, use function.
    pub fn info_backdrop() -> Color32 {
        Color32::from_rgba_unmultiplied(10, 10, 20, 180)
    }

    /// North arrow drawn while the map is rotated.
    pub const NORTH_ARROW: Color32 = Color32::from_rgb(220, 220, 240);
}

/// Colors for radar site markers.
pub mod sites {
    use super::Color32;

    /// Orange for other (non-current) sites.
    pub const OTHER: Color32 = Color32::from_rgb(255, 180, 80);
    /// Orange stroke for other sites.
    pub const OTHER_STROKE: Color32 = Color32::from_rgb(180, 120, 40);
    /// Cyan for current site.
    pub const CURRENT: Color32 = Color32::from_rgb(50, 200, 255);
    /// Cyan stroke for current site.
    pub const CURRENT_STROKE: Color32 = Color32::from_rgb(30, 150, 200);
    /// Label color for other sites.
    pub const LABEL: Color32 = Color32::from_rgb(220, 220, 240);
    /// Label color for current site.
    pub const CURRENT_LABEL: Color32 = Color32::from_rgb(50, 200, 255);
}

/// Colors for the color-table legend.
pub mod legend {
    use super::Color32;

    pub const BORDER: Color32 = Color32::from_rgb(60, 60, 80);
    pub const TICK: Color32 = Color32::from_rgb(140, 140, 160);
}
