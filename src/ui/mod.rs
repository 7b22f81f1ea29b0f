//! UI modules for the Weather Radar Workbench application.
//!
//! The UI is split into distinct panels:
//! - Top bar: site and product selection, file open, display toggles
//! - Central canvas: sweep layer, overlays, site markers and legend
//! - Bottom panel: pipeline and renderer statistics

mod bottom_panel;
mod canvas;
mod colors;
mod legend;
mod top_bar;

pub use bottom_panel::{render_bottom_panel, GpuUsage, StatusView};
pub use canvas::{render_canvas, SweepLayer};
pub use top_bar::render_top_bar;
