#![warn(clippy::all)]

//! Weather Radar Workbench - a real-time radar sweep viewer.
//!
//! Sweeps arriving from local files or the demo source are decoded,
//! rasterized and colorized on background workers, then drawn by the GPU
//! tile renderer under a pannable, zoomable, rotatable map.

mod app;
mod file_ops;
mod ui;

use app::WorkbenchApp;
use wxradar_workbench::state::Settings;

// Native entry point
#[cfg(not(target_arch = "wasm32"))]
fn main() -> eframe::Result<()> {
    env_logger::init();

    let settings = Settings::load();
    let native_options = eframe::NativeOptions::default();

    eframe::run_native(
        "Weather Radar Workbench",
        native_options,
        Box::new(|cc| Ok(Box::new(WorkbenchApp::new(cc, settings)))),
    )
}

// WASM entry point - main is not called on wasm32
#[cfg(target_arch = "wasm32")]
fn main() {}

/// Entry point for the WASM application.
#[cfg(target_arch = "wasm32")]
#[wasm_bindgen::prelude::wasm_bindgen(start)]
pub async fn start() {
    use eframe::wasm_bindgen::JsCast as _;

    // Redirect `log` messages to `console.log`:
    eframe::WebLogger::init(log::LevelFilter::Debug).ok();

    let web_options = eframe::WebOptions::default();

    wasm_bindgen_futures::spawn_local(async {
        let Some(document) = web_sys::window().and_then(|w| w.document()) else {
            log::error!("No document to attach to");
            return;
        };

        let canvas = match document
            .get_element_by_id("app_canvas")
            .map(|e| e.dyn_into::<web_sys::HtmlCanvasElement>())
        {
            Some(Ok(canvas)) => canvas,
            Some(Err(_)) => {
                log::error!("app_canvas was not a HtmlCanvasElement");
                return;
            }
            None => {
                log::error!("Failed to find app_canvas");
                return;
            }
        };

        let settings = Settings::load();
        let start_result = eframe::WebRunner::new()
            .start(
                canvas,
                web_options,
                Box::new(|cc| Ok(Box::new(WorkbenchApp::new(cc, settings)))),
            )
            .await;

        // Remove the loading text once the app has loaded:
        if let Some(loading_text) = document.get_element_by_id("loading_text") {
            match start_result {
                Ok(_) => {
                    loading_text.remove();
                }
                Err(e) => {
                    loading_text.set_inner_html(
                        "<p>The app has crashed. See the developer console for details.</p>",
                    );
                    log::error!("Failed to start eframe: {e:?}");
                }
            }
        }
    });
}
