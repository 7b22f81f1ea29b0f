//! Configuration and session statistics.

pub mod settings;
pub mod stats;

pub use settings::{CameraSettings, OverlaySettings, Settings, SettingsError};
pub use stats::SessionStats;
