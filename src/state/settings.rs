//! Application settings.
//!
//! Native builds read a JSON file: the first command-line argument, else
//! `$WXRADAR_SETTINGS`, else `wxradar.json` in the working directory. Web
//! builds keep the same JSON in localStorage. A missing or unreadable
//! source yields defaults; a broken one is also logged.

use crate::camera::{CameraState, ZoomLimits};
use crate::color::{load_color_table, ColorTableError, ColorTableSet};
use crate::data::get_site;
use crate::geo::{OverlayKind, OverlayLayer, OverlaySet};
use crate::pipeline::WorkerConfig;
use crate::radar::{ProductType, SiteId};
use crate::sweep_cache::DEFAULT_SLOT_COUNT;
use eframe::egui::Color32;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Environment variable naming the settings file.
pub const SETTINGS_ENV: &str = "WXRADAR_SETTINGS";
/// Settings file used when neither an argument nor the variable is given.
pub const DEFAULT_SETTINGS_FILE: &str = "wxradar.json";

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SettingsError {
    #[error("settings file {0} does not exist")]
    Missing(String),

    #[error("failed to read settings: {0}")]
    Io(String),

    #[error("invalid settings: {0}")]
    Parse(String),

    #[error("settings storage unavailable: {0}")]
    Storage(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraSettings {
    pub min_zoom: f64,
    pub max_zoom: f64,
    pub initial_zoom: f64,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            min_zoom: 3.0,
            max_zoom: 14.0,
            initial_zoom: 9.0,
        }
    }
}

/// A shapefile overlay to load at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverlaySettings {
    pub kind: OverlayKind,
    pub path: PathBuf,
    #[serde(default)]
    pub color: Option<[u8; 3]>,
    #[serde(default)]
    pub line_width: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub default_site: String,
    pub default_product: ProductType,
    pub camera: CameraSettings,
    /// Sweep worker threads; 0 uses the available parallelism
    pub worker_threads: usize,
    pub cache_slots: usize,
    pub geometry_cache_capacity: usize,
    pub radials_per_tile: usize,
    pub sweep_opacity: f32,
    /// Per-product `.pal` or `.json` palette replacing the built-in one
    pub color_tables: BTreeMap<ProductType, PathBuf>,
    pub overlays: Vec<OverlaySettings>,
    pub show_range_rings: bool,
    /// Generate synthetic sweeps instead of waiting for input
    pub demo_mode: bool,
    pub demo_interval_secs: f64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_site: "KLSX".to_string(),
            default_product: ProductType::Reflectivity,
            camera: CameraSettings::default(),
            worker_threads: 0,
            cache_slots: DEFAULT_SLOT_COUNT,
            geometry_cache_capacity: 8,
            radials_per_tile: 32,
            sweep_opacity: 0.85,
            color_tables: BTreeMap::new(),
            overlays: Vec::new(),
            show_range_rings: true,
            demo_mode: true,
            demo_interval_secs: 4.0,
        }
    }
}

impl Settings {
    /// localStorage key for persisting settings.
    #[cfg(target_arch = "wasm32")]
    const STORAGE_KEY: &'static str = "wxradar_settings";

    pub fn from_json(text: &str) -> Result<Self, SettingsError> {
        serde_json::from_str(text).map_err(|e| SettingsError::Parse(e.to_string()))
    }

    pub fn to_json(&self) -> Result<String, SettingsError> {
        serde_json::to_string_pretty(self).map_err(|e| SettingsError::Parse(e.to_string()))
    }

    /// Settings file chosen from a command-line argument and environment.
    pub fn resolve_path(arg: Option<String>, env: Option<String>) -> PathBuf {
        arg.or(env)
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SETTINGS_FILE))
    }

    pub fn load_from(path: &Path) -> Result<Self, SettingsError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                SettingsError::Missing(path.display().to_string())
            } else {
                SettingsError::Io(format!("{}: {}", path.display(), e))
            }
        })?;
        Self::from_json(&text)
    }

    /// Loads from the resolved settings file, falling back to defaults.
    #[cfg(not(target_arch = "wasm32"))]
    pub fn load() -> Self {
        let path = Self::resolve_path(std::env::args().nth(1), std::env::var(SETTINGS_ENV).ok());
        Self::load_or_default(&path)
    }

    /// Loads `path`, falling back to defaults, and validates the result.
    pub fn load_or_default(path: &Path) -> Self {
        let mut settings = match Self::load_from(path) {
            Ok(settings) => {
                log::info!("Loaded settings from {}", path.display());
                settings
            }
            Err(SettingsError::Missing(_)) => {
                log::info!("No settings at {}, using defaults", path.display());
                Self::default()
            }
            Err(e) => {
                log::warn!("{}; using defaults", e);
                Self::default()
            }
        };
        settings.validate();
        settings
    }

    /// Load settings from localStorage.
    #[cfg(target_arch = "wasm32")]
    pub fn load() -> Self {
        let mut settings = match Self::read_storage() {
            Ok(Some(json)) => match Self::from_json(&json) {
                Ok(settings) => {
                    log::info!("Loaded settings from localStorage");
                    settings
                }
                Err(e) => {
                    log::warn!("{}; using defaults", e);
                    Self::default()
                }
            },
            Ok(None) => Self::default(),
            Err(e) => {
                log::warn!("{}", e);
                Self::default()
            }
        };
        settings.validate();
        settings
    }

    #[cfg(target_arch = "wasm32")]
    fn storage() -> Result<web_sys::Storage, SettingsError> {
        web_sys::window()
            .ok_or_else(|| SettingsError::Storage("no window".into()))?
            .local_storage()
            .map_err(|e| SettingsError::Storage(format!("{:?}", e)))?
            .ok_or_else(|| SettingsError::Storage("localStorage disabled".into()))
    }

    #[cfg(target_arch = "wasm32")]
    fn read_storage() -> Result<Option<String>, SettingsError> {
        Self::storage()?
            .get_item(Self::STORAGE_KEY)
            .map_err(|e| SettingsError::Storage(format!("{:?}", e)))
    }

    /// Clamps inconsistent values into range. Returns a description of
    /// every change, each of which is also logged.
    pub fn validate(&mut self) -> Vec<String> {
        let mut changes = Vec::new();
        let defaults = Self::default();

        if get_site(&self.default_site).is_none() {
            changes.push(format!(
                "unknown default site '{}' replaced by {}",
                self.default_site, defaults.default_site
            ));
            self.default_site = defaults.default_site.clone();
        } else {
            self.default_site = self.default_site.trim().to_ascii_uppercase();
        }

        let camera = &mut self.camera;
        if !camera.min_zoom.is_finite() || !camera.max_zoom.is_finite() {
            changes.push("non-finite zoom limits reset".to_string());
            *camera = CameraSettings::default();
        }
        if camera.min_zoom > camera.max_zoom {
            changes.push(format!(
                "zoom limits swapped to {}..{}",
                camera.max_zoom, camera.min_zoom
            ));
            std::mem::swap(&mut camera.min_zoom, &mut camera.max_zoom);
        }
        let initial = if camera.initial_zoom.is_finite() {
            camera.initial_zoom.clamp(camera.min_zoom, camera.max_zoom)
        } else {
            camera.min_zoom
        };
        if initial != camera.initial_zoom {
            changes.push(format!(
                "initial zoom {} clamped to {}",
                camera.initial_zoom, initial
            ));
            camera.initial_zoom = initial;
        }

        for (name, value, default) in [
            ("cache_slots", &mut self.cache_slots, defaults.cache_slots),
            (
                "geometry_cache_capacity",
                &mut self.geometry_cache_capacity,
                defaults.geometry_cache_capacity,
            ),
            ("radials_per_tile", &mut self.radials_per_tile, defaults.radials_per_tile),
        ] {
            if *value == 0 {
                changes.push(format!("{} of 0 replaced by {}", name, default));
                *value = default;
            }
        }

        let opacity = if self.sweep_opacity.is_finite() {
            self.sweep_opacity.clamp(0.0, 1.0)
        } else {
            defaults.sweep_opacity
        };
        if opacity != self.sweep_opacity {
            changes.push(format!("sweep opacity {} clamped to {}", self.sweep_opacity, opacity));
            self.sweep_opacity = opacity;
        }

        if !(self.demo_interval_secs.is_finite() && self.demo_interval_secs >= 0.5) {
            changes.push(format!(
                "demo interval {}s raised to 0.5s",
                self.demo_interval_secs
            ));
            self.demo_interval_secs = 0.5;
        }

        for change in &changes {
            log::warn!("Settings: {}", change);
        }
        changes
    }

    pub fn default_site_id(&self) -> SiteId {
        SiteId::new(&self.default_site)
    }

    pub fn zoom_limits(&self) -> ZoomLimits {
        ZoomLimits::new(self.camera.min_zoom, self.camera.max_zoom)
    }

    /// Camera centered on the default site at the initial zoom.
    pub fn initial_camera(&self) -> CameraState {
        let mut state = CameraState::default();
        if let Some(site) = get_site(&self.default_site) {
            state.center_lat = site.lat;
            state.center_lon = site.lon;
        }
        state.zoom = self.camera.initial_zoom;
        state
    }

    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            threads: self.worker_threads,
        }
    }

    /// Built-in palettes with the configured overrides applied. Overrides
    /// that fail to load are returned alongside; the built-in table stays.
    pub fn color_tables(&self) -> (ColorTableSet, Vec<(ProductType, ColorTableError)>) {
        let mut tables = ColorTableSet::builtin();
        let mut failures = Vec::new();
        for (product, path) in &self.color_tables {
            match load_color_table(path, Some(*product)) {
                Ok(table) if table.product() == *product => tables.insert(table),
                Ok(table) => {
                    log::warn!(
                        "Palette {} is for {}, not {}; ignored",
                        path.display(),
                        table.product(),
                        product
                    );
                    failures.push((*product, ColorTableError::UnknownProduct(table.product())));
                }
                Err(e) => {
                    log::warn!("Palette override for {} failed: {}", product, e);
                    failures.push((*product, e));
                }
            }
        }
        (tables, failures)
    }

    /// Loads the configured shapefile overlays, skipping failures.
    pub fn overlays(&self) -> OverlaySet {
        let mut set = OverlaySet::new();
        for overlay in &self.overlays {
            match OverlayLayer::load(overlay.kind, &overlay.path) {
                Ok(mut layer) => {
                    layer.color = overlay.color.map(|[r, g, b]| Color32::from_rgb(r, g, b));
                    layer.line_width = overlay.line_width;
                    set.push(layer);
                }
                Err(e) => log::warn!("Overlay {} skipped: {}", overlay.path.display(), e),
            }
        }
        set
    }
}
