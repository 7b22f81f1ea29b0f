//! Session statistics shown in the bottom panel.

use crate::diagnostics::PipelineEvent;
use crate::render::{FrameStats, RenderError};

/// Counters folded from pipeline events and rendered frames.
#[derive(Debug, Default, Clone)]
pub struct SessionStats {
    pub sweeps_published: u64,
    pub decode_failures: u64,
    pub color_table_misses: u64,
    pub sweeps_abandoned: u64,
    pub cache_rejections: u64,
    pub frames_skipped: u64,
    pub device_losses: u64,
    /// Vertices of the most recently published sweep
    pub last_sweep_vertices: usize,
    /// Exponential moving average of pipeline time
    pub avg_process_ms: Option<f64>,
    pub last_frame: FrameStats,
    /// Most recent warning-level event, for the status line
    pub last_problem: Option<String>,
}

impl SessionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_event(&mut self, event: &PipelineEvent) {
        match event {
            PipelineEvent::SweepPublished {
                vertices,
                elapsed_ms,
                ..
            } => {
                self.sweeps_published += 1;
                self.last_sweep_vertices = *vertices;
                self.avg_process_ms = Some(match self.avg_process_ms {
                    Some(avg) => avg * 0.8 + elapsed_ms * 0.2,
                    None => *elapsed_ms,
                });
            }
            PipelineEvent::DecodeFailed { .. } => self.decode_failures += 1,
            PipelineEvent::ColorTableMiss { .. } => self.color_table_misses += 1,
            PipelineEvent::SweepAbandoned { .. } => self.sweeps_abandoned += 1,
            PipelineEvent::CacheRejected { .. } => self.cache_rejections += 1,
            PipelineEvent::RenderFailed(RenderError::DeviceLost(_)) => self.device_losses += 1,
            PipelineEvent::RenderFailed(_) => self.frames_skipped += 1,
        }
        if event.level() <= log::Level::Warn {
            self.last_problem = Some(event.to_string());
        }
    }

    pub fn record_frame(&mut self, frame: FrameStats) {
        self.last_frame = frame;
    }

    /// Format pipeline timing for display.
    pub fn format_timing(&self) -> String {
        match self.avg_process_ms {
            Some(ms) => format!("{:.1} ms/sweep", ms),
            None => "—".to_string(),
        }
    }

    /// Format the last frame for display.
    pub fn format_frame(&self) -> String {
        let f = &self.last_frame;
        format!(
            "{} draws · {} tiles ({} culled) · {}",
            f.draw_calls,
            f.visible_tiles,
            f.culled_tiles,
            format_count(f.vertices)
        )
    }
}

/// Format a vertex count (e.g., "1.2M vtx").
fn format_count(n: u64) -> String {
    if n >= 1_000_000 {
        format!("{:.1}M vtx", n as f64 / 1_000_000.0)
    } else if n >= 1_000 {
        format!("{:.1}K vtx", n as f64 / 1_000.0)
    } else {
        format!("{} vtx", n)
    }
}
