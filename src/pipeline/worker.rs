//! Background sweep workers.
//!
//! Jobs go through one shared channel to a fixed set of threads, so
//! sweeps for different keys decode in parallel while the render thread
//! never waits on them. Every job carries a [`CancelToken`]; a newer job
//! for the same key, or the UI dropping a site, cancels it. On wasm there
//! are no threads and jobs run on the submitting thread.

use super::{CancelToken, SweepInput, SweepPipeline};
use crate::radar::{SiteId, SweepKey};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[cfg(not(target_arch = "wasm32"))]
use std::sync::mpsc::{self, Receiver, Sender};
#[cfg(not(target_arch = "wasm32"))]
use std::thread::JoinHandle;

type RepaintHook = Arc<dyn Fn() + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WorkerConfig {
    /// Worker threads; 0 uses the available parallelism.
    pub threads: usize,
}

impl WorkerConfig {
    pub fn resolved_threads(&self) -> usize {
        if self.threads > 0 {
            return self.threads;
        }
        #[cfg(not(target_arch = "wasm32"))]
        {
            std::thread::available_parallelism()
                .map(|n| n.get().clamp(1, 8))
                .unwrap_or(2)
        }
        #[cfg(target_arch = "wasm32")]
        {
            0
        }
    }
}

/// The newest outstanding job per key.
#[derive(Debug, Default)]
pub(crate) struct Subscriptions {
    pending: Mutex<HashMap<SweepKey, CancelToken>>,
}

impl Subscriptions {
    /// Registers a job for `key`, cancelling the one it replaces. The
    /// job's load generation is drawn while the registry is locked, so
    /// generations follow registration order.
    pub(crate) fn register(
        &self,
        key: &SweepKey,
        next_generation: impl FnOnce() -> u64,
    ) -> (CancelToken, u64) {
        let token = CancelToken::new();
        let mut pending = self.lock();
        let generation = next_generation();
        if let Some(previous) = pending.insert(key.clone(), token.clone()) {
            previous.cancel();
        }
        (token, generation)
    }

    /// Clears `key` if `token` is still its newest job.
    pub(crate) fn finish(&self, key: &SweepKey, token: &CancelToken) {
        let mut pending = self.lock();
        if pending.get(key).is_some_and(|t| t.same(token)) {
            pending.remove(key);
        }
    }

    /// Cancels every pending job for keys rejected by `keep`.
    pub(crate) fn retain(&self, keep: impl Fn(&SweepKey) -> bool) -> usize {
        let mut cancelled = 0;
        self.lock().retain(|key, token| {
            if keep(key) {
                true
            } else {
                token.cancel();
                cancelled += 1;
                false
            }
        });
        cancelled
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<SweepKey, CancelToken>> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(not(target_arch = "wasm32"))]
struct Job {
    input: SweepInput,
    generation: u64,
    cancel: CancelToken,
}

/// Runs [`SweepPipeline`] jobs off the render thread.
pub struct SweepWorkerPool {
    pipeline: Arc<SweepPipeline>,
    subscriptions: Arc<Subscriptions>,
    repaint: Option<RepaintHook>,
    #[cfg(not(target_arch = "wasm32"))]
    sender: Option<Sender<Job>>,
    #[cfg(not(target_arch = "wasm32"))]
    workers: Vec<JoinHandle<()>>,
}

impl SweepWorkerPool {
    pub fn new(pipeline: Arc<SweepPipeline>, config: WorkerConfig) -> Self {
        Self::with_repaint(pipeline, config, None)
    }

    /// `repaint` is called after every published sweep.
    pub fn with_repaint(
        pipeline: Arc<SweepPipeline>,
        config: WorkerConfig,
        repaint: Option<RepaintHook>,
    ) -> Self {
        let subscriptions = Arc::new(Subscriptions::default());
        #[allow(unused_mut)]
        let mut pool = Self {
            pipeline,
            subscriptions,
            repaint,
            #[cfg(not(target_arch = "wasm32"))]
            sender: None,
            #[cfg(not(target_arch = "wasm32"))]
            workers: Vec::new(),
        };
        #[cfg(not(target_arch = "wasm32"))]
        pool.spawn(config.resolved_threads());
        #[cfg(target_arch = "wasm32")]
        let _ = config;
        pool
    }

    #[cfg(not(target_arch = "wasm32"))]
    fn spawn(&mut self, threads: usize) {
        let (sender, receiver) = mpsc::channel::<Job>();
        let receiver = Arc::new(Mutex::new(receiver));

        for index in 0..threads {
            let receiver = Arc::clone(&receiver);
            let pipeline = Arc::clone(&self.pipeline);
            let subscriptions = Arc::clone(&self.subscriptions);
            let repaint = self.repaint.clone();
            let spawned = std::thread::Builder::new()
                .name(format!("sweep-worker-{}", index))
                .spawn(move || worker_loop(receiver, pipeline, subscriptions, repaint));
            match spawned {
                Ok(handle) => self.workers.push(handle),
                Err(e) => log::warn!("Failed to spawn sweep worker {}: {}", index, e),
            }
        }

        if self.workers.is_empty() {
            log::warn!("No sweep workers running; jobs will run on the caller");
        } else {
            log::info!("Started {} sweep workers", self.workers.len());
            self.sender = Some(sender);
        }
    }

    pub fn pipeline(&self) -> &Arc<SweepPipeline> {
        &self.pipeline
    }

    /// Jobs queued or running.
    pub fn pending(&self) -> usize {
        self.subscriptions.len()
    }

    /// Queues `input`, superseding any queued job for the same key.
    pub fn submit(&self, input: SweepInput) -> CancelToken {
        let key = input.key();
        let cache = self.pipeline.cache();
        let (cancel, generation) = self.subscriptions.register(&key, || cache.next_generation());

        #[cfg(not(target_arch = "wasm32"))]
        if let Some(sender) = &self.sender {
            let job = Job {
                input,
                generation,
                cancel: cancel.clone(),
            };
            match sender.send(job) {
                Ok(()) => return cancel,
                Err(mpsc::SendError(job)) => {
                    log::warn!("Sweep workers are gone; processing {} inline", key);
                    run_job(
                        &self.pipeline,
                        &self.subscriptions,
                        self.repaint.as_ref(),
                        job.input,
                        job.generation,
                        &job.cancel,
                    );
                    return cancel;
                }
            }
        }

        run_job(
            &self.pipeline,
            &self.subscriptions,
            self.repaint.as_ref(),
            input,
            generation,
            &cancel,
        );
        cancel
    }

    /// Cancels pending jobs for `site`. Returns how many were cancelled.
    pub fn unsubscribe_site(&self, site: &SiteId) -> usize {
        self.subscriptions.retain(|key| &key.site != site)
    }

    /// Cancels pending jobs whose key is rejected by `keep`.
    pub fn retain_subscriptions(&self, keep: impl Fn(&SweepKey) -> bool) -> usize {
        self.subscriptions.retain(keep)
    }

    /// Stops accepting jobs and waits for the workers to drain the queue.
    pub fn shutdown(&mut self) {
        #[cfg(not(target_arch = "wasm32"))]
        {
            self.sender = None;
            for handle in self.workers.drain(..) {
                if handle.join().is_err() {
                    log::error!("A sweep worker panicked");
                }
            }
        }
    }
}

impl Drop for SweepWorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn worker_loop(
    receiver: Arc<Mutex<Receiver<Job>>>,
    pipeline: Arc<SweepPipeline>,
    subscriptions: Arc<Subscriptions>,
    repaint: Option<RepaintHook>,
) {
    loop {
        let job = {
            let receiver = receiver.lock().unwrap_or_else(|e| e.into_inner());
            receiver.recv()
        };
        let Ok(job) = job else {
            break;
        };
        run_job(
            &pipeline,
            &subscriptions,
            repaint.as_ref(),
            job.input,
            job.generation,
            &job.cancel,
        );
    }
}

fn run_job(
    pipeline: &SweepPipeline,
    subscriptions: &Subscriptions,
    repaint: Option<&RepaintHook>,
    input: SweepInput,
    generation: u64,
    cancel: &CancelToken,
) {
    let key = input.key();
    // Failures are reported through diagnostics by the pipeline
    let published = pipeline.process_at(input, generation, cancel).is_ok();
    subscriptions.finish(&key, cancel);
    if published {
        if let Some(repaint) = repaint {
            repaint();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::ColorTableSet;
    use crate::diagnostics::Diagnostics;
    use crate::radar::synthetic::{RadialSpec, SweepBuilder};
    use crate::radar::ProductType;
    use crate::raster::Rasterizer;
    use crate::sweep_cache::SweepCache;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn pipeline() -> Arc<SweepPipeline> {
        Arc::new(SweepPipeline::new(
            Arc::new(SweepCache::new(16)),
            Rasterizer::default(),
            ColorTableSet::builtin(),
            Diagnostics::new(),
        ))
    }

    fn input(site: &str, product: ProductType) -> SweepInput {
        let radials =
            (0..72).map(|i| RadialSpec::new(i as f32 * 5.0, 5.0, 2125.0, 500.0, vec![140; 20]));
        let bytes = SweepBuilder::new(site, product).radials(radials).encode();
        SweepInput::new(site, product, bytes)
    }

    #[test]
    fn test_pool_processes_jobs() {
        let repaints = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&repaints);
        let mut pool = SweepWorkerPool::with_repaint(
            pipeline(),
            WorkerConfig { threads: 3 },
            Some(Arc::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })),
        );

        let keys: Vec<SweepKey> = ["KLSX", "KDMX", "KTLX", "KFWS"]
            .iter()
            .map(|site| {
                let input = input(site, ProductType::Reflectivity);
                let key = input.key();
                pool.submit(input);
                key
            })
            .collect();
        pool.shutdown();

        let cache = pool.pipeline().cache();
        for key in &keys {
            assert!(cache.current(key).is_some(), "{}", key);
        }
        assert_eq!(repaints.load(Ordering::SeqCst), 4);
        assert_eq!(pool.pending(), 0);
    }

    #[test]
    fn test_newer_job_supersedes_older() {
        let subscriptions = Subscriptions::default();
        let key = SweepKey::new("KLSX", ProductType::Velocity);
        let (first, _) = subscriptions.register(&key, || 1);
        let (second, _) = subscriptions.register(&key, || 2);
        assert!(first.is_cancelled());
        assert!(!second.is_cancelled());

        // The stale job finishing does not clear the newer registration
        subscriptions.finish(&key, &first);
        assert_eq!(subscriptions.len(), 1);
        subscriptions.finish(&key, &second);
        assert_eq!(subscriptions.len(), 0);
    }

    #[test]
    fn test_generations_follow_registration_order() {
        let pipeline = pipeline();
        let cache = pipeline.cache();
        let subscriptions = Subscriptions::default();
        let key = SweepKey::new("KLSX", ProductType::Reflectivity);

        let (older, older_generation) = subscriptions.register(&key, || cache.next_generation());
        let (newer, newer_generation) = subscriptions.register(&key, || cache.next_generation());
        assert!(older_generation < newer_generation);

        // The newer job starts first; the older one is dequeued after it
        let newer_input = input("KLSX", ProductType::Reflectivity);
        let published = pipeline
            .process_at(newer_input, newer_generation, &newer)
            .unwrap();
        let stale = pipeline.process_at(
            input("KLSX", ProductType::Reflectivity),
            older_generation,
            &older,
        );
        assert!(stale.is_err());
        assert_eq!(cache.current(&key).unwrap().id, published.buffer);
    }

    #[test]
    fn test_unsubscribed_site_is_cancelled() {
        let subscriptions = Subscriptions::default();
        let register = |site: &str, product| {
            subscriptions.register(&SweepKey::new(site, product), || 0).0
        };
        let klsx = register("KLSX", ProductType::Reflectivity);
        let klsx_vel = register("KLSX", ProductType::Velocity);
        let kdmx = register("KDMX", ProductType::Reflectivity);

        let site = SiteId::new("KLSX");
        assert_eq!(subscriptions.retain(|key| key.site != site), 2);
        assert!(klsx.is_cancelled());
        assert!(klsx_vel.is_cancelled());
        assert!(!kdmx.is_cancelled());
    }
}
