//! Sweep processing pipeline.
//!
//! One job takes raw bytes for a (site, product) through decode,
//! rasterization and colorization, then publishes the resulting buffer to
//! the [`SweepCache`]. Failures never disturb the buffer already current
//! for the key; they are reported through [`Diagnostics`] instead.

pub mod worker;

pub use worker::{SweepWorkerPool, WorkerConfig};

use crate::color::{ColorTable, ColorTableSet};
use crate::diagnostics::{Diagnostics, PipelineEvent};
use crate::radar::{decode_for, DecodeError, ProductType, SiteId, SweepKey};
use crate::raster::{BufferId, RasterBuffer, Rasterizer};
use crate::sweep_cache::{CacheError, LoadTicket, SweepCache};
use bytes::Bytes;
use geo_types::Coord;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use thiserror::Error;
use web_time::Instant;

/// Raw sweep bytes plus the metadata the fetch layer knows about them.
#[derive(Debug, Clone)]
pub struct SweepInput {
    pub site: SiteId,
    pub product: ProductType,
    pub data: Bytes,
}

impl SweepInput {
    pub fn new(site: impl Into<SiteId>, product: ProductType, data: impl Into<Bytes>) -> Self {
        Self {
            site: site.into(),
            product,
            data: data.into(),
        }
    }

    pub fn key(&self) -> SweepKey {
        SweepKey::new(self.site.clone(), self.product)
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("sweep processing was cancelled")]
    Cancelled,
}

/// Shared cancellation flag for one job.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    /// Whether both handles share one flag.
    pub fn same(&self, other: &CancelToken) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    fn check(&self) -> Result<(), PipelineError> {
        if self.is_cancelled() {
            Err(PipelineError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Result of a published sweep.
#[derive(Debug, Clone, PartialEq)]
pub struct Published {
    pub key: SweepKey,
    pub buffer: BufferId,
    /// Buffer retired by the publication
    pub replaced: Option<BufferId>,
    pub vertices: usize,
}

/// Decode → rasterize → colorize → publish.
pub struct SweepPipeline {
    cache: Arc<SweepCache>,
    rasterizer: Rasterizer,
    tables: RwLock<ColorTableSet>,
    diagnostics: Diagnostics,
}

impl SweepPipeline {
    pub fn new(
        cache: Arc<SweepCache>,
        rasterizer: Rasterizer,
        tables: ColorTableSet,
        diagnostics: Diagnostics,
    ) -> Self {
        Self {
            cache,
            rasterizer,
            tables: RwLock::new(tables),
            diagnostics,
        }
    }

    pub fn cache(&self) -> &Arc<SweepCache> {
        &self.cache
    }

    pub fn rasterizer(&self) -> &Rasterizer {
        &self.rasterizer
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Replaces the color tables used by subsequent jobs.
    pub fn set_color_tables(&self, tables: ColorTableSet) {
        *self.tables.write().unwrap_or_else(|e| e.into_inner()) = tables;
    }

    /// Table for `product`, or a neutral ramp over `range` with a
    /// diagnostic when none is configured.
    pub fn color_table(&self, product: ProductType, range: (f32, f32)) -> Arc<ColorTable> {
        let lookup = self
            .tables
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .table_for(product);
        match lookup {
            Ok(table) => table,
            Err(error) => {
                self.diagnostics
                    .report(PipelineEvent::ColorTableMiss { product, error });
                Arc::new(ColorTable::neutral(product, range))
            }
        }
    }

    /// Runs one job to completion on the calling thread.
    pub fn process(
        &self,
        input: SweepInput,
        cancel: &CancelToken,
    ) -> Result<Published, PipelineError> {
        let generation = self.cache.next_generation();
        self.process_at(input, generation, cancel)
    }

    /// Runs one job whose load generation was taken when it was queued, so
    /// a job dequeued late never outranks a newer one for the same key.
    pub fn process_at(
        &self,
        input: SweepInput,
        generation: u64,
        cancel: &CancelToken,
    ) -> Result<Published, PipelineError> {
        let key = input.key();
        let begun = cancel.check().and_then(|()| {
            self.cache
                .begin_load_at(&key, generation)
                .map_err(PipelineError::from)
        });
        let ticket = match begun {
            Ok(ticket) => ticket,
            Err(error) => {
                self.report_failure(&key, &error);
                return Err(error);
            }
        };

        let started = Instant::now();
        let buffer = match self.build(&input, cancel) {
            Ok(buffer) => buffer,
            Err(error) => {
                self.cache.abandon(ticket);
                self.report_failure(&key, &error);
                return Err(error);
            }
        };

        self.publish(ticket, buffer, started, cancel)
    }

    fn build(
        &self,
        input: &SweepInput,
        cancel: &CancelToken,
    ) -> Result<RasterBuffer, PipelineError> {
        cancel.check()?;
        let sweep = decode_for(&input.data, &input.site, input.product)?;

        cancel.check()?;
        let origin = Coord {
            x: sweep.header.longitude,
            y: sweep.header.latitude,
        };
        let geometry = self.rasterizer.rasterize(&sweep, origin);
        let table = self.color_table(sweep.header.product, sweep.header.value_range);
        drop(sweep);

        cancel.check()?;
        Ok(RasterBuffer::build(&geometry, &table))
    }

    fn publish(
        &self,
        ticket: LoadTicket,
        buffer: RasterBuffer,
        started: Instant,
        cancel: &CancelToken,
    ) -> Result<Published, PipelineError> {
        let key = ticket.key().clone();
        let (id, scan_time, vertices) = (buffer.id, buffer.scan_time, buffer.vertex_count());

        let swapped = self
            .cache
            .complete_load_if(ticket, buffer, || !cancel.is_cancelled());
        match swapped {
            Ok(replaced) => {
                self.diagnostics.report(PipelineEvent::SweepPublished {
                    key: key.clone(),
                    scan_time,
                    vertices,
                    elapsed_ms: started.elapsed().as_secs_f64() * 1000.0,
                });
                Ok(Published {
                    key,
                    buffer: id,
                    replaced,
                    vertices,
                })
            }
            Err(error) => {
                let error = match error {
                    CacheError::Withdrawn(_) => PipelineError::Cancelled,
                    error => PipelineError::from(error),
                };
                self.report_failure(&key, &error);
                Err(error)
            }
        }
    }

    fn report_failure(&self, key: &SweepKey, error: &PipelineError) {
        let event = match error {
            PipelineError::Decode(error) => PipelineEvent::DecodeFailed {
                source: key.to_string(),
                error: error.clone(),
            },
            PipelineError::Cancelled => PipelineEvent::SweepAbandoned {
                key: key.clone(),
                reason: "cancelled".into(),
            },
            PipelineError::Cache(CacheError::Superseded(_)) => PipelineEvent::SweepAbandoned {
                key: key.clone(),
                reason: "superseded by a newer sweep".into(),
            },
            PipelineError::Cache(error) => PipelineEvent::CacheRejected {
                key: key.clone(),
                error: error.clone(),
            },
        };
        self.diagnostics.report(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::ColorTableError;
    use crate::diagnostics::ChannelSink;
    use crate::radar::decode;
    use crate::radar::synthetic::{RadialSpec, SweepBuilder};
    use crate::radar::Calibration;
    use crate::sweep_cache::SlotStatus;
    use std::sync::mpsc::{self, Receiver};

    fn pipeline() -> (SweepPipeline, Receiver<PipelineEvent>) {
        let (tx, rx) = mpsc::channel();
        let pipeline = SweepPipeline::new(
            Arc::new(SweepCache::new(8)),
            Rasterizer::default(),
            ColorTableSet::builtin(),
            Diagnostics::new().with_sink(ChannelSink::new(tx)),
        );
        (pipeline, rx)
    }

    fn sweep_bytes(product: ProductType) -> Vec<u8> {
        let radials =
            (0..36).map(|i| RadialSpec::new(i as f32 * 10.0, 10.0, 2125.0, 250.0, vec![136; 8]));
        SweepBuilder::new("KLSX", product)
            .calibration(Calibration::new(0.5, 66.0, 2))
            .radials(radials)
            .encode()
    }

    /// KLSX reflectivity bytes submitted as `site`.
    fn reflectivity(site: &str) -> SweepInput {
        let product = ProductType::Reflectivity;
        SweepInput::new(site, product, sweep_bytes(product))
    }

    fn build_buffer(pipeline: &SweepPipeline, data: &[u8]) -> RasterBuffer {
        let sweep = decode(data).unwrap();
        let origin = Coord {
            x: sweep.header.longitude,
            y: sweep.header.latitude,
        };
        let geometry = pipeline.rasterizer().rasterize(&sweep, origin);
        let table = ColorTableSet::builtin().table_for(sweep.header.product).unwrap();
        RasterBuffer::build(&geometry, &table)
    }

    #[test]
    fn test_publishes_sweep() {
        let (pipeline, rx) = pipeline();
        let input = reflectivity("KLSX");
        let published = pipeline.process(input.clone(), &CancelToken::new()).unwrap();

        assert_eq!(published.replaced, None);
        assert!(published.vertices > 0);
        let current = pipeline.cache().current(&input.key()).unwrap();
        assert_eq!(current.id, published.buffer);
        assert_eq!(pipeline.cache().status(&input.key()), SlotStatus::Ready);
        assert!(matches!(rx.try_recv(), Ok(PipelineEvent::SweepPublished { .. })));
    }

    #[test]
    fn test_decode_failure_keeps_previous_buffer() {
        let (pipeline, rx) = pipeline();
        let good = reflectivity("KLSX");
        let first = pipeline.process(good.clone(), &CancelToken::new()).unwrap();
        let _ = rx.try_recv();

        let garbage = Bytes::from_static(b"garbage");
        let bad = SweepInput::new("KLSX", ProductType::Reflectivity, garbage);
        let err = pipeline.process(bad, &CancelToken::new()).unwrap_err();
        assert!(matches!(err, PipelineError::Decode(DecodeError::MalformedHeader(_))));

        assert_eq!(pipeline.cache().current(&good.key()).unwrap().id, first.buffer);
        assert_eq!(pipeline.cache().status(&good.key()), SlotStatus::Ready);
        assert!(matches!(rx.try_recv(), Ok(PipelineEvent::DecodeFailed { .. })));
    }

    #[test]
    fn test_metadata_mismatch_is_a_decode_failure() {
        let (pipeline, _rx) = pipeline();
        let input = reflectivity("KTLX");
        let err = pipeline.process(input.clone(), &CancelToken::new()).unwrap_err();
        assert!(matches!(err, PipelineError::Decode(DecodeError::MetadataMismatch { .. })));
        assert_eq!(pipeline.cache().status(&input.key()), SlotStatus::Empty);
    }

    #[test]
    fn test_unknown_product_uses_neutral_table() {
        let (pipeline, rx) = pipeline();
        let known = reflectivity("KLSX");
        let before = pipeline.process(known.clone(), &CancelToken::new()).unwrap();
        let before_vertices = pipeline.cache().current(&known.key()).unwrap().vertices.clone();
        let _: Vec<PipelineEvent> = rx.try_iter().collect();

        let product = ProductType::Unknown(42);
        let input = SweepInput::new("KLSX", product, sweep_bytes(product));
        let published = pipeline.process(input, &CancelToken::new()).unwrap();
        assert!(published.vertices > 0);
        assert_eq!(published.replaced, None);

        let events: Vec<PipelineEvent> = rx.try_iter().collect();
        assert!(events.iter().any(|e| matches!(
            e,
            PipelineEvent::ColorTableMiss {
                product: ProductType::Unknown(42),
                error: ColorTableError::UnknownProduct(ProductType::Unknown(42)),
            }
        )));

        // The reflectivity buffer published earlier is untouched
        let after = pipeline.cache().current(&known.key()).unwrap();
        assert_eq!(after.id, before.buffer);
        assert_eq!(after.vertices, before_vertices);
        assert_eq!(pipeline.cache().retiring(), 0);
    }

    #[test]
    fn test_stale_job_cannot_supersede_newer_load() {
        let (pipeline, _rx) = pipeline();
        let cache = pipeline.cache();
        let input = reflectivity("KLSX");
        let key = input.key();

        // The older job was queued first but is dequeued after the newer
        // job has begun loading
        let older = cache.next_generation();
        let newer = cache.begin_load(&key).unwrap();

        let cancelled = CancelToken::new();
        cancelled.cancel();
        let err = pipeline.process_at(input.clone(), older, &cancelled).unwrap_err();
        assert_eq!(err, PipelineError::Cancelled);
        let err = pipeline.process_at(input.clone(), older, &CancelToken::new()).unwrap_err();
        assert_eq!(err, PipelineError::Cache(CacheError::Superseded(key.clone())));
        assert_eq!(cache.status(&key), SlotStatus::Loading);

        let buffer = build_buffer(&pipeline, &input.data);
        let id = buffer.id;
        cache.complete_load(newer, buffer).unwrap();
        assert_eq!(cache.current(&key).unwrap().id, id);
    }

    #[test]
    fn test_cancelled_job_is_discarded() {
        let (pipeline, rx) = pipeline();
        let input = reflectivity("KLSX");
        let cancel = CancelToken::new();
        cancel.cancel();

        let err = pipeline.process(input.clone(), &cancel).unwrap_err();
        assert_eq!(err, PipelineError::Cancelled);
        assert!(pipeline.cache().current(&input.key()).is_none());
        assert_eq!(pipeline.cache().status(&input.key()), SlotStatus::Empty);
        assert!(matches!(rx.try_recv(), Ok(PipelineEvent::SweepAbandoned { .. })));
    }

    #[test]
    fn test_republish_retires_previous() {
        let (pipeline, _rx) = pipeline();
        let input = reflectivity("KLSX");
        let a = pipeline.process(input.clone(), &CancelToken::new()).unwrap();
        let b = pipeline.process(input, &CancelToken::new()).unwrap();
        assert_eq!(b.replaced, Some(a.buffer));
        assert_eq!(pipeline.cache().retiring(), 1);
        // Same site and layout: the edge geometry is built once
        assert_eq!(pipeline.rasterizer().grid_cache().stats(), (1, 1));
    }
}
