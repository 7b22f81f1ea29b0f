//! Structured diagnostic events.
//!
//! The pipeline and renderer report what happened as [`PipelineEvent`]s
//! rather than formatting log lines themselves. [`Diagnostics::report`]
//! logs each event at a fixed level and target, then forwards it to every
//! registered [`DiagnosticSink`].

use crate::color::ColorTableError;
use crate::radar::{DecodeError, ProductType, SweepKey};
use crate::render::RenderError;
use crate::sweep_cache::CacheError;
use chrono::{DateTime, Utc};
use log::Level;
use std::fmt;
use std::sync::mpsc::Sender;
use std::sync::Arc;

pub const PIPELINE_TARGET: &str = "wxradar::pipeline";
pub const RENDER_TARGET: &str = "wxradar::render";

#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    /// A new buffer became current.
    SweepPublished {
        key: SweepKey,
        scan_time: DateTime<Utc>,
        vertices: usize,
        elapsed_ms: f64,
    },
    /// A sweep was dropped; the previous buffer stays current.
    DecodeFailed {
        /// Site/product when known, else the input's label
        source: String,
        error: DecodeError,
    },
    /// A product had no configured color table and a neutral one was used.
    ColorTableMiss {
        product: ProductType,
        error: ColorTableError,
    },
    /// A sweep in flight was cancelled or superseded.
    SweepAbandoned { key: SweepKey, reason: String },
    /// The cache refused a finished buffer.
    CacheRejected { key: SweepKey, error: CacheError },
    /// A frame could not be drawn.
    RenderFailed(RenderError),
}

impl PipelineEvent {
    pub fn level(&self) -> Level {
        match self {
            PipelineEvent::SweepPublished { .. } => Level::Info,
            PipelineEvent::SweepAbandoned { .. } => Level::Debug,
            PipelineEvent::DecodeFailed { .. }
            | PipelineEvent::ColorTableMiss { .. }
            | PipelineEvent::CacheRejected { .. } => Level::Warn,
            PipelineEvent::RenderFailed(RenderError::ResourceExhausted(_)) => Level::Warn,
            PipelineEvent::RenderFailed(_) => Level::Error,
        }
    }

    pub fn target(&self) -> &'static str {
        match self {
            PipelineEvent::RenderFailed(_) => RENDER_TARGET,
            _ => PIPELINE_TARGET,
        }
    }
}

impl fmt::Display for PipelineEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineEvent::SweepPublished {
                key,
                scan_time,
                vertices,
                elapsed_ms,
            } => write!(
                f,
                "published {} scanned {} ({} vertices, {:.1} ms)",
                key,
                scan_time.format("%Y-%m-%d %H:%M:%SZ"),
                vertices,
                elapsed_ms
            ),
            PipelineEvent::DecodeFailed { source, error } => {
                write!(f, "dropped sweep from {}: {}", source, error)
            }
            PipelineEvent::ColorTableMiss { product, error } => {
                write!(f, "using neutral palette for {}: {}", product, error)
            }
            PipelineEvent::SweepAbandoned { key, reason } => {
                write!(f, "abandoned {}: {}", key, reason)
            }
            PipelineEvent::CacheRejected { key, error } => {
                write!(f, "cache rejected {}: {}", key, error)
            }
            PipelineEvent::RenderFailed(error) => write!(f, "frame failed: {}", error),
        }
    }
}

/// Receives reported events.
pub trait DiagnosticSink: Send + Sync {
    fn record(&self, event: &PipelineEvent);
}

/// Forwards events over a channel, typically to the UI thread.
pub struct ChannelSink {
    sender: Sender<PipelineEvent>,
}

impl ChannelSink {
    pub fn new(sender: Sender<PipelineEvent>) -> Self {
        Self { sender }
    }
}

impl DiagnosticSink for ChannelSink {
    fn record(&self, event: &PipelineEvent) {
        // The receiver going away only means nobody is listening any more
        let _ = self.sender.send(event.clone());
    }
}

/// Cloneable reporting handle shared by the pipeline and the renderer.
#[derive(Clone, Default)]
pub struct Diagnostics {
    sinks: Vec<Arc<dyn DiagnosticSink>>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sink(mut self, sink: impl DiagnosticSink + 'static) -> Self {
        self.sinks.push(Arc::new(sink));
        self
    }

    pub fn report(&self, event: PipelineEvent) {
        log::log!(target: event.target(), event.level(), "{}", event);
        for sink in &self.sinks {
            sink.record(&event);
        }
    }
}

impl fmt::Debug for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Diagnostics")
            .field("sinks", &self.sinks.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn test_levels_and_targets() {
        let lost = PipelineEvent::RenderFailed(RenderError::DeviceLost("gone".into()));
        assert_eq!(lost.level(), Level::Error);
        assert_eq!(lost.target(), RENDER_TARGET);

        let exhausted = PipelineEvent::RenderFailed(RenderError::ResourceExhausted("vbo".into()));
        assert_eq!(exhausted.level(), Level::Warn);

        let decode = PipelineEvent::DecodeFailed {
            source: "KLSX/REF".into(),
            error: DecodeError::UnsupportedVersion(9),
        };
        assert_eq!(decode.level(), Level::Warn);
        assert_eq!(decode.target(), PIPELINE_TARGET);
        assert!(decode.to_string().contains("KLSX/REF"));
    }

    #[test]
    fn test_channel_sink_forwards() {
        let (tx, rx) = mpsc::channel();
        let diagnostics = Diagnostics::new().with_sink(ChannelSink::new(tx));
        let event = PipelineEvent::ColorTableMiss {
            product: ProductType::Unknown(7),
            error: ColorTableError::UnknownProduct(ProductType::Unknown(7)),
        };
        diagnostics.report(event.clone());
        assert_eq!(rx.try_recv().unwrap(), event);

        drop(rx);
        // A closed channel is not an error
        diagnostics.report(event);
    }
}
