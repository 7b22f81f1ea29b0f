//! Application shell: owns the pipeline, renderer and camera, and feeds
//! UI state into them once per frame.

use crate::file_ops::{self, FilePickerChannel};
use crate::ui;
use chrono::Utc;
use eframe::egui;
use glam::DVec2;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;
use std::time::Duration;
use web_time::Instant;
use wxradar_workbench::camera::CameraController;
use wxradar_workbench::color::{ColorTable, ColorTableSet};
use wxradar_workbench::data::get_site;
use wxradar_workbench::diagnostics::{ChannelSink, Diagnostics, PipelineEvent};
use wxradar_workbench::geo::{world_to_lon_lat, OverlayLayer, OverlaySet};
use wxradar_workbench::pipeline::{SweepInput, SweepPipeline, SweepWorkerPool};
use wxradar_workbench::radar::synthetic::demo_sweep;
use wxradar_workbench::radar::{ProductType, SiteId, SweepKey};
use wxradar_workbench::raster::{RasterBuffer, Rasterizer};
use wxradar_workbench::render::{FrameStats, RenderError, TileRenderer};
use wxradar_workbench::state::{SessionStats, Settings};
use wxradar_workbench::sweep_cache::SweepCache;

/// Renderer shared with the paint callback. `None` until the first frame
/// with a GL context, and again after device loss.
pub type SharedRenderer = Arc<egui::mutex::Mutex<Option<TileRenderer>>>;

/// What the paint callback reports back for each frame it drew.
pub type FrameOutcome = Result<FrameStats, RenderError>;

/// Delay before rebuilding a renderer that failed or was lost.
const RENDERER_RETRY: Duration = Duration::from_secs(2);

/// Segments per range ring.
const RING_SEGMENTS: usize = 180;

/// Selection and toggles edited by the UI panels.
pub struct ViewState {
    pub site: SiteId,
    pub product: ProductType,
    pub opacity: f32,
    pub show_range_rings: bool,
    pub show_all_sites: bool,
    pub demo_mode: bool,
    pub status_message: String,
    pub open_file_requested: bool,
    pub clear_site_requested: bool,
}

impl ViewState {
    fn from_settings(settings: &Settings) -> Self {
        Self {
            site: settings.default_site_id(),
            product: settings.default_product,
            opacity: settings.sweep_opacity,
            show_range_rings: settings.show_range_rings,
            show_all_sites: true,
            demo_mode: settings.demo_mode,
            status_message: "Waiting for sweeps".to_string(),
            open_file_requested: false,
            clear_site_requested: false,
        }
    }

    pub fn key(&self) -> SweepKey {
        SweepKey::new(self.site.clone(), self.product)
    }
}

/// Periodic synthetic sweeps for the selected site and product.
struct DemoSource {
    interval: Duration,
    last: Option<Instant>,
    phase: f32,
}

impl DemoSource {
    fn new(interval_secs: f64) -> Self {
        Self {
            interval: Duration::from_secs_f64(interval_secs),
            last: None,
            phase: 0.0,
        }
    }

    /// Time left until the next sweep is due; zero when it is due now.
    fn remaining(&self, now: Instant) -> Duration {
        match self.last {
            Some(last) => self.interval.saturating_sub(now.duration_since(last)),
            None => Duration::ZERO,
        }
    }

    fn generate(
        &mut self,
        now: Instant,
        site: &SiteId,
        product: ProductType,
    ) -> Option<SweepInput> {
        self.last = Some(now);
        let Some(info) = get_site(site.as_str()) else {
            log::warn!("Demo source has no location for {}", site);
            return None;
        };
        self.phase += 1.0;
        let data = demo_sweep(site, product, info.lat, info.lon, Utc::now(), self.phase);
        Some(SweepInput::new(site.clone(), product, data))
    }
}

/// Main application state and logic.
pub struct WorkbenchApp {
    state: ViewState,
    workers: SweepWorkerPool,
    events: Receiver<PipelineEvent>,
    stats: SessionStats,
    camera: CameraController,
    overlays: OverlaySet,
    /// Sites whose range rings are currently in `overlays`
    /// Site origins the current range rings were built for
    ring_origins: Vec<(SiteId, DVec2)>,
    /// Palettes for the legend; the workers hold their own copy
    color_tables: ColorTableSet,
    renderer: SharedRenderer,
    renderer_retry_at: Option<Instant>,
    frame_sender: Sender<FrameOutcome>,
    frame_results: Receiver<FrameOutcome>,
    file_picker: FilePickerChannel,
    demo: DemoSource,
    previous_site: SiteId,
    previous_product: ProductType,
}

impl WorkbenchApp {
    /// Creates a new WorkbenchApp instance.
    pub fn new(cc: &eframe::CreationContext<'_>, settings: Settings) -> Self {
        let mut fonts = egui::FontDefinitions::default();
        egui_phosphor::add_to_fonts(&mut fonts, egui_phosphor::Variant::Regular);
        cc.egui_ctx.set_fonts(fonts);

        let (color_tables, failures) = settings.color_tables();
        if !failures.is_empty() {
            log::warn!("{} palette overrides failed to load", failures.len());
        }

        let (event_sender, events) = channel();
        let diagnostics = Diagnostics::new().with_sink(ChannelSink::new(event_sender));
        let cache = Arc::new(SweepCache::new(settings.cache_slots));
        let pipeline = Arc::new(SweepPipeline::new(
            cache,
            Rasterizer::new(settings.geometry_cache_capacity, settings.radials_per_tile),
            color_tables.clone(),
            diagnostics,
        ));

        let repaint_ctx = cc.egui_ctx.clone();
        let workers = SweepWorkerPool::with_repaint(
            pipeline,
            settings.worker_config(),
            Some(Arc::new(move || repaint_ctx.request_repaint())),
        );

        let overlays = settings.overlays();
        log::info!("Loaded {} overlay layers", overlays.len());

        let (frame_sender, frame_results) = channel();
        let state = ViewState::from_settings(&settings);

        Self {
            previous_site: state.site.clone(),
            previous_product: state.product,
            state,
            workers,
            events,
            stats: SessionStats::new(),
            camera: CameraController::new(settings.initial_camera(), settings.zoom_limits()),
            overlays,
            ring_origins: Vec::new(),
            color_tables,
            renderer: Arc::new(egui::mutex::Mutex::new(None)),
            renderer_retry_at: None,
            frame_sender,
            frame_results,
            file_picker: FilePickerChannel::new(),
            demo: DemoSource::new(settings.demo_interval_secs),
        }
    }

    fn cache(&self) -> &Arc<SweepCache> {
        self.workers.pipeline().cache()
    }

    fn diagnostics(&self) -> &Diagnostics {
        self.workers.pipeline().diagnostics()
    }

    /// Folds pipeline events into the session stats.
    fn poll_events(&mut self) {
        let selected = self.state.key();
        while let Ok(event) = self.events.try_recv() {
            self.stats.record_event(&event);
            match &event {
                PipelineEvent::SweepPublished { key, .. } if *key == selected => {
                    self.state.status_message = event.to_string();
                }
                PipelineEvent::SweepPublished { .. } | PipelineEvent::SweepAbandoned { .. } => {}
                _ => self.state.status_message = event.to_string(),
            }
        }
    }

    /// Handles what the paint callback reported for earlier frames.
    fn poll_frames(&mut self) {
        while let Ok(outcome) = self.frame_results.try_recv() {
            match outcome {
                Ok(frame) => self.stats.record_frame(frame),
                Err(error) => {
                    let fatal = error.is_fatal();
                    self.diagnostics().report(PipelineEvent::RenderFailed(error));
                    if fatal {
                        self.drop_renderer();
                    }
                }
            }
        }
    }

    /// Forgets the renderer without touching GL. Current buffers are
    /// uploaded again by the next renderer.
    fn drop_renderer(&mut self) {
        let lost = self.renderer.lock().take();
        if let Some(renderer) = lost {
            renderer.abandon(self.cache());
        }
        self.renderer_retry_at = Some(Instant::now() + RENDERER_RETRY);
    }

    fn ensure_renderer(&mut self, frame: &eframe::Frame) {
        if self.renderer.lock().is_some() {
            return;
        }
        let now = Instant::now();
        if self.renderer_retry_at.is_some_and(|at| now < at) {
            return;
        }
        let Some(gl) = frame.gl() else {
            return;
        };

        match TileRenderer::new(gl) {
            Ok(renderer) => {
                log::info!(
                    "Tile renderer ready; {} cached sweeps will upload on demand",
                    self.cache().len()
                );
                *self.renderer.lock() = Some(renderer);
                self.renderer_retry_at = None;
            }
            Err(error) => {
                self.diagnostics().report(PipelineEvent::RenderFailed(error));
                self.renderer_retry_at = Some(now + RENDERER_RETRY);
            }
        }
    }

    fn handle_file_pick(&mut self, ctx: &egui::Context) {
        if self.state.open_file_requested {
            self.state.open_file_requested = false;
            self.file_picker.pick_file(ctx.clone());
        }

        let Some(picked) = self.file_picker.try_recv() else {
            return;
        };
        let Some(file) = picked else {
            log::debug!("File dialog cancelled");
            return;
        };

        let name = file.name.clone();
        match file_ops::submit_file(&self.workers, file) {
            Ok(header) => {
                self.state.site = header.site.clone();
                self.state.product = header.product;
                self.camera
                    .center_on(header.latitude, header.longitude, None);
                self.state.status_message = format!("Processing {}", name);
            }
            Err(error) => {
                self.diagnostics().report(PipelineEvent::DecodeFailed {
                    source: name,
                    error,
                });
            }
        }
    }

    /// Cancels work the new selection no longer needs.
    fn handle_selection_change(&mut self) {
        if self.state.site != self.previous_site {
            log::info!("Site changed from {} to {}", self.previous_site, self.state.site);
            if let Some(site) = get_site(self.state.site.as_str()) {
                self.camera.center_on(site.lat, site.lon, None);
            }
            self.previous_site = self.state.site.clone();
            self.demo.last = None;
        }

        if self.state.product != self.previous_product {
            let product = self.state.product;
            let cancelled = self
                .workers
                .retain_subscriptions(|key| key.product == product);
            log::info!(
                "Product changed to {}; cancelled {} pending sweeps",
                product,
                cancelled
            );
            self.previous_product = product;
            self.demo.last = None;
        }

        if self.state.clear_site_requested {
            self.state.clear_site_requested = false;
            let site = self.state.site.clone();
            let cancelled = self.workers.unsubscribe_site(&site);
            let cache = Arc::clone(self.cache());
            let evicted = cache
                .keys()
                .into_iter()
                .filter(|key| key.site == site)
                .filter_map(|key| cache.evict(&key))
                .count();
            self.state.status_message = format!(
                "Cleared {}: {} sweeps evicted, {} cancelled",
                site, evicted, cancelled
            );
        }
    }

    fn run_demo(&mut self, ctx: &egui::Context) {
        if !self.state.demo_mode {
            return;
        }
        let now = Instant::now();
        let remaining = self.demo.remaining(now);
        if remaining.is_zero() {
            if let Some(input) = self.demo.generate(now, &self.state.site, self.state.product) {
                self.workers.submit(input);
            }
            ctx.request_repaint_after(self.demo.interval);
        } else {
            ctx.request_repaint_after(remaining);
        }
    }

    /// Keeps one range ring per site shown for the selected product.
    fn update_range_rings(&mut self) {
        let origins = if self.state.show_range_rings {
            ring_origins(self.cache(), self.state.product)
        } else {
            Vec::new()
        };
        if origins == self.ring_origins {
            return;
        }

        let range_m = self.state.product.max_range_km() * 1000.0;
        let rings = origins
            .iter()
            .map(|(site, origin)| {
                OverlayLayer::range_ring(
                    format!("{} range", site),
                    world_to_lon_lat(*origin),
                    range_m,
                    RING_SEGMENTS,
                )
            })
            .collect();
        self.overlays.set_range_rings(rings);
        self.ring_origins = origins;
    }

    /// Palette for the legend. Falls back to the neutral ramp the
    /// pipeline uses for products without a table.
    fn legend_table(&self, current: Option<&RasterBuffer>) -> Arc<ColorTable> {
        let product = self.state.product;
        self.color_tables.table_for(product).unwrap_or_else(|_| {
            let range = current.map(|b| b.value_range).unwrap_or_else(|| {
                product
                    .default_calibration()
                    .map(|c| c.value_range(product.default_gate_bytes()))
                    .unwrap_or((0.0, 1.0))
            });
            Arc::new(ColorTable::neutral(product, range))
        })
    }
}

impl eframe::App for WorkbenchApp {
    fn update(&mut self, ctx: &egui::Context, frame: &mut eframe::Frame) {
        self.poll_events();
        self.poll_frames();
        self.ensure_renderer(frame);
        self.handle_file_pick(ctx);
        self.handle_selection_change();
        self.run_demo(ctx);
        self.update_range_rings();

        let current = self.cache().current(&self.state.key());
        let legend = self.legend_table(current.as_deref());
        let gpu = self.renderer.lock().as_ref().map(|tiles| ui::GpuUsage {
            buffers: tiles.resident(),
            bytes: tiles.resident_bytes(),
            frames_in_flight: tiles.frames_in_flight(),
        });

        // Render UI panels in the correct order for egui layout
        // Side and top/bottom panels must be rendered before CentralPanel
        ui::render_top_bar(ctx, &mut self.state);
        ui::render_bottom_panel(
            ctx,
            &ui::StatusView {
                stats: &self.stats,
                cache: self.cache(),
                pending_jobs: self.workers.pending(),
                grid_stats: self.workers.pipeline().rasterizer().grid_cache().stats(),
                gpu,
            },
        );

        let cache = Arc::clone(self.cache());
        ui::render_canvas(
            ctx,
            &mut self.state,
            &mut self.camera,
            ui::SweepLayer {
                renderer: &self.renderer,
                cache: &cache,
                frames: &self.frame_sender,
                overlays: &self.overlays,
                current: current.as_deref(),
                legend: &legend,
            },
        );
    }

    fn on_exit(&mut self, gl: Option<&glow::Context>) {
        let renderer = self.renderer.lock().take();
        if let Some(mut renderer) = renderer {
            match gl {
                Some(gl) => renderer.destroy(gl, self.cache()),
                None => renderer.abandon(self.cache()),
            }
        }
        self.workers.shutdown();
    }
}

/// Origins of every site with a published buffer for `product`. Keys that
/// are only loading have no origin yet and are left out.
fn ring_origins(cache: &SweepCache, product: ProductType) -> Vec<(SiteId, DVec2)> {
    cache
        .keys()
        .into_iter()
        .filter(|key| key.product == product)
        .filter_map(|key| {
            let buffer = cache.current(&key)?;
            Some((key.site, buffer.origin))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::Coord;
    use wxradar_workbench::radar::decode;

    fn demo_buffer(site: &str, product: ProductType) -> RasterBuffer {
        let site = SiteId::new(site);
        let location = get_site(site.as_str()).unwrap();
        let bytes = demo_sweep(&site, product, location.lat, location.lon, Utc::now(), 0.0);
        let sweep = decode(&bytes).unwrap();
        let origin = Coord {
            x: sweep.header.longitude,
            y: sweep.header.latitude,
        };
        let geometry = Rasterizer::default().rasterize(&sweep, origin);
        let table = ColorTable::neutral(product, sweep.header.value_range);
        RasterBuffer::build(&geometry, &table)
    }

    #[test]
    fn test_ring_origins_skip_loading_keys() {
        let cache = SweepCache::new(4);
        let key = SweepKey::new("KLSX", ProductType::Reflectivity);
        let ticket = cache.begin_load(&key).unwrap();
        assert!(ring_origins(&cache, ProductType::Reflectivity).is_empty());

        let buffer = demo_buffer("KLSX", ProductType::Reflectivity);
        let origin = buffer.origin;
        cache.complete_load(ticket, buffer).unwrap();
        assert_eq!(
            ring_origins(&cache, ProductType::Reflectivity),
            vec![(SiteId::new("KLSX"), origin)]
        );
    }

    #[test]
    fn test_ring_origins_filter_by_product() {
        let cache = SweepCache::new(4);
        cache.submit(demo_buffer("KLSX", ProductType::Velocity)).unwrap();
        cache.submit(demo_buffer("KDMX", ProductType::Reflectivity)).unwrap();

        let origins = ring_origins(&cache, ProductType::Reflectivity);
        assert_eq!(origins.len(), 1);
        assert_eq!(origins[0].0, SiteId::new("KDMX"));
    }
}
