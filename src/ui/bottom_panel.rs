//! Bottom panel UI: pipeline, cache and renderer statistics.

use super::colors;
use eframe::egui::{self, Color32, RichText};
use std::sync::Arc;
use wxradar_workbench::state::SessionStats;
use wxradar_workbench::sweep_cache::SweepCache;

/// Read-only inputs for the status rows.
pub struct StatusView<'a> {
    pub stats: &'a SessionStats,
    pub cache: &'a Arc<SweepCache>,
    pub pending_jobs: usize,
    /// Geometry cache (hits, misses)
    pub grid_stats: (u64, u64),
    /// `None` while the renderer is being rebuilt
    pub gpu: Option<GpuUsage>,
}

/// Renderer residency at the start of the frame.
#[derive(Debug, Clone, Copy)]
pub struct GpuUsage {
    pub buffers: usize,
    pub bytes: usize,
    pub frames_in_flight: usize,
}

pub fn render_bottom_panel(ctx: &egui::Context, view: &StatusView<'_>) {
    egui::TopBottomPanel::bottom("bottom_panel")
        .exact_height(52.0)
        .show(ctx, |ui| {
            ui.vertical(|ui| {
                ui.add_space(4.0);
                ui.horizontal(|ui| render_pipeline_row(ui, view));
                ui.horizontal(|ui| render_renderer_row(ui, view));
            });
        });
}

fn stat(ui: &mut egui::Ui, label: &str, value: impl Into<String>, color: Color32) {
    ui.label(RichText::new(label).size(11.0).color(colors::ui::LABEL));
    ui.label(RichText::new(value).monospace().size(11.0).color(color));
}

/// Value color for a failure counter.
fn count_color(count: u64, problem: Color32) -> Color32 {
    if count == 0 {
        colors::ui::VALUE
    } else {
        problem
    }
}

fn format_bytes(bytes: usize) -> String {
    const KIB: f64 = 1024.0;
    let bytes = bytes as f64;
    if bytes >= KIB * KIB {
        format!("{:.1} MiB", bytes / (KIB * KIB))
    } else {
        format!("{:.1} KiB", bytes / KIB)
    }
}

fn render_pipeline_row(ui: &mut egui::Ui, view: &StatusView<'_>) {
    let stats = view.stats;
    stat(
        ui,
        "Sweeps:",
        stats.sweeps_published.to_string(),
        colors::ui::SUCCESS,
    );
    stat(ui, "Avg:", stats.format_timing(), colors::ui::VALUE);
    stat(
        ui,
        "Queued:",
        view.pending_jobs.to_string(),
        if view.pending_jobs > 0 {
            colors::ui::ACTIVE
        } else {
            colors::ui::VALUE
        },
    );
    ui.separator();
    stat(
        ui,
        "Decode errors:",
        stats.decode_failures.to_string(),
        count_color(stats.decode_failures, colors::ui::WARNING),
    );
    stat(
        ui,
        "Palette misses:",
        stats.color_table_misses.to_string(),
        count_color(stats.color_table_misses, colors::ui::WARNING),
    );
    stat(
        ui,
        "Abandoned:",
        stats.sweeps_abandoned.to_string(),
        colors::ui::VALUE,
    );
    stat(
        ui,
        "Rejected:",
        stats.cache_rejections.to_string(),
        count_color(stats.cache_rejections, colors::ui::WARNING),
    );
    ui.separator();

    let (hits, misses) = view.grid_stats;
    stat(
        ui,
        "Grid cache:",
        format!("{} hit / {} miss", hits, misses),
        colors::ui::VALUE,
    );
}

fn render_renderer_row(ui: &mut egui::Ui, view: &StatusView<'_>) {
    let stats = view.stats;
    match view.gpu {
        Some(gpu) => {
            stat(ui, "GPU:", "ready", colors::ui::SUCCESS);
            stat(
                ui,
                "Resident:",
                format!("{} buffers, {}", gpu.buffers, format_bytes(gpu.bytes)),
                colors::ui::VALUE,
            );
            stat(
                ui,
                "In flight:",
                gpu.frames_in_flight.to_string(),
                colors::ui::VALUE,
            );
        }
        None => stat(ui, "GPU:", "rebuilding", colors::ui::ERROR),
    }
    stat(ui, "Frame:", stats.format_frame(), colors::ui::VALUE);
    stat(
        ui,
        "Uploads:",
        stats.last_frame.uploads.to_string(),
        colors::ui::VALUE,
    );
    ui.separator();
    stat(
        ui,
        "Cache:",
        format!(
            "{}/{} slots, {} retiring",
            view.cache.len(),
            view.cache.capacity(),
            view.cache.retiring()
        ),
        colors::ui::VALUE,
    );
    stat(
        ui,
        "Skipped frames:",
        stats.frames_skipped.to_string(),
        count_color(stats.frames_skipped, colors::ui::WARNING),
    );
    stat(
        ui,
        "Device losses:",
        stats.device_losses.to_string(),
        count_color(stats.device_losses, colors::ui::ERROR),
    );

    if let Some(problem) = &stats.last_problem {
        ui.separator();
        ui.label(
            RichText::new(problem)
                .size(11.0)
                .color(colors::ui::WARNING),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "0.5 KiB");
        assert_eq!(format_bytes(3 * 1024 * 1024 + 512 * 1024), "3.5 MiB");
    }
}
