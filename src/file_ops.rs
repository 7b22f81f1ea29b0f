//! Opening sweep records from disk.
//!
//! File dialogs are async while egui's update loop is not, so the picked
//! file travels back to the UI thread over a channel and is then handed to
//! the sweep workers.

use bytes::Bytes;
use eframe::egui;
use std::sync::mpsc::{channel, Receiver, Sender};
use wxradar_workbench::pipeline::{SweepInput, SweepWorkerPool};
use wxradar_workbench::radar::{peek_header, DecodeError, SweepHeader};

/// A file chosen in the open dialog.
#[derive(Debug, Clone)]
pub struct PickedFile {
    pub name: String,
    pub data: Bytes,
}

/// Outcome of one dialog: `None` when the user cancelled.
type PickOutcome = Option<PickedFile>;

/// Bridges the async open dialog to the UI thread.
pub struct FilePickerChannel {
    sender: Sender<PickOutcome>,
    receiver: Receiver<PickOutcome>,
    open: bool,
}

impl Default for FilePickerChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl FilePickerChannel {
    pub fn new() -> Self {
        let (sender, receiver) = channel();
        Self {
            sender,
            receiver,
            open: false,
        }
    }

    /// Shows the open dialog unless one is already showing.
    ///
    /// Native builds block on the dialog from a helper thread with
    /// `pollster`; wasm drives it with `spawn_local`.
    pub fn pick_file(&mut self, ctx: egui::Context) {
        if self.open {
            return;
        }
        self.open = true;
        let sender = self.sender.clone();

        #[cfg(not(target_arch = "wasm32"))]
        std::thread::spawn(move || {
            let _ = sender.send(pollster::block_on(pick_sweep_file()));
            ctx.request_repaint();
        });

        #[cfg(target_arch = "wasm32")]
        wasm_bindgen_futures::spawn_local(async move {
            let _ = sender.send(pick_sweep_file().await);
            ctx.request_repaint();
        });
    }

    /// `Some(outcome)` once the dialog has closed.
    pub fn try_recv(&mut self) -> Option<PickOutcome> {
        let outcome = self.receiver.try_recv().ok()?;
        self.open = false;
        Some(outcome)
    }
}

/// Reads the header of a picked sweep file and queues the whole record on
/// the workers under the site and product it declares.
pub fn submit_file(
    workers: &SweepWorkerPool,
    file: PickedFile,
) -> Result<SweepHeader, DecodeError> {
    let header = peek_header(&file.data)?;
    log::info!(
        "Queued {} ({} bytes) as {}",
        file.name,
        file.data.len(),
        header.key()
    );
    workers.submit(SweepInput::new(header.site.clone(), header.product, file.data));
    Ok(header)
}

async fn pick_sweep_file() -> PickOutcome {
    let handle = rfd::AsyncFileDialog::new()
        .set_title("Open Radar Sweep")
        .add_filter("Sweep records", &["rswp", "bin"])
        .add_filter("All files", &["*"])
        .pick_file()
        .await?;

    let data = handle.read().await;
    Some(PickedFile {
        name: handle.file_name(),
        data: Bytes::from(data),
    })
}
