//! Sweep cache and version manager.
//!
//! Holds the current [`RasterBuffer`] for every (site, product) key in a
//! fixed arena of slots. Publishing a buffer is a single `Arc` swap inside a
//! slot's mutex, so readers observe either the previous buffer or the new
//! one, never a mixture.
//!
//! Replaced buffers are retired with the frame epoch current at the swap.
//! The render thread brackets every frame with [`SweepCache::begin_frame`]
//! and [`SweepCache::complete_frame`]; once every frame that could have seen
//! a retired buffer has completed, [`SweepCache::reclaim`] hands its id back
//! so the GPU copy can be freed.

use crate::raster::{BufferId, RasterBuffer};
use crate::radar::SweepKey;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use thiserror::Error;

/// Default number of slots in the arena.
pub const DEFAULT_SLOT_COUNT: usize = 64;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CacheError {
    #[error("all {0} sweep slots are in use")]
    Full(usize),

    #[error("load of {0} was superseded by a newer load")]
    Superseded(SweepKey),

    #[error("load of {0} was withdrawn before publication")]
    Withdrawn(SweepKey),
}

/// Lifecycle of a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotStatus {
    /// No buffer has been published.
    Empty,
    /// A new sweep is being decoded; the previous buffer (if any) stays current.
    Loading,
    /// A buffer is current.
    Ready,
}

#[derive(Debug)]
struct Slot {
    key: Option<SweepKey>,
    status: SlotStatus,
    current: Option<Arc<RasterBuffer>>,
    /// Generation of the newest outstanding load
    load_generation: u64,
}

impl Slot {
    fn vacant() -> Self {
        Self {
            key: None,
            status: SlotStatus::Empty,
            current: None,
            load_generation: 0,
        }
    }
}

#[derive(Debug)]
struct Retired {
    buffer: Arc<RasterBuffer>,
    /// Frames with an epoch below this may still reference the buffer
    retire_after: u64,
}

/// Proof of an outstanding load, returned by [`SweepCache::begin_load`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadTicket {
    key: SweepKey,
    slot: usize,
    generation: u64,
}

impl LoadTicket {
    pub fn key(&self) -> &SweepKey {
        &self.key
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// The buffers a frame draws, pinned for the frame's duration.
#[derive(Debug, Clone)]
pub struct FrameSnapshot {
    pub epoch: u64,
    pub buffers: Vec<Arc<RasterBuffer>>,
}

/// Arena of per-key sweep slots with epoch-based reclamation.
pub struct SweepCache {
    index: RwLock<HashMap<SweepKey, usize>>,
    slots: Box<[Mutex<Slot>]>,
    free: Mutex<Vec<usize>>,
    retired: Mutex<Vec<Retired>>,
    /// Epoch handed to the next frame
    frame_epoch: AtomicU64,
    /// Every frame below this epoch has completed
    completed_epoch: AtomicU64,
    generation: AtomicU64,
}

impl Default for SweepCache {
    fn default() -> Self {
        Self::new(DEFAULT_SLOT_COUNT)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Status of a slot with no load in progress.
fn settled_status(slot: &Slot) -> SlotStatus {
    if slot.current.is_some() {
        SlotStatus::Ready
    } else {
        SlotStatus::Empty
    }
}

impl SweepCache {
    pub fn new(slot_count: usize) -> Self {
        let slot_count = slot_count.max(1);
        Self {
            index: RwLock::new(HashMap::with_capacity(slot_count)),
            slots: (0..slot_count).map(|_| Mutex::new(Slot::vacant())).collect(),
            free: Mutex::new((0..slot_count).rev().collect()),
            retired: Mutex::new(Vec::new()),
            frame_epoch: AtomicU64::new(0),
            completed_epoch: AtomicU64::new(0),
            generation: AtomicU64::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of keys holding a slot.
    pub fn len(&self) -> usize {
        self.index.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slot_of(&self, key: &SweepKey) -> Option<usize> {
        self.index
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .copied()
    }

    fn slot_or_allocate(&self, key: &SweepKey) -> Result<usize, CacheError> {
        if let Some(slot) = self.slot_of(key) {
            return Ok(slot);
        }
        let mut index = self.index.write().unwrap_or_else(|e| e.into_inner());
        if let Some(&slot) = index.get(key) {
            return Ok(slot);
        }
        let slot = lock(&self.free)
            .pop()
            .ok_or(CacheError::Full(self.slots.len()))?;
        {
            let mut state = lock(&self.slots[slot]);
            *state = Slot::vacant();
            state.key = Some(key.clone());
        }
        index.insert(key.clone(), slot);
        log::debug!("SweepCache: slot {} assigned to {}", slot, key);
        Ok(slot)
    }

    /// Hands out the next load generation. Generations order loads of a
    /// key: a load never supersedes one with a higher generation.
    pub fn next_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Marks `key` as loading and returns a ticket for the load.
    ///
    /// A later `begin_load` for the same key supersedes the ticket.
    pub fn begin_load(&self, key: &SweepKey) -> Result<LoadTicket, CacheError> {
        self.begin_load_at(key, self.next_generation())
    }

    /// Like [`SweepCache::begin_load`], with a generation taken earlier from
    /// [`SweepCache::next_generation`]. Fails with `Superseded` when a load
    /// with a newer generation has already begun.
    pub fn begin_load_at(
        &self,
        key: &SweepKey,
        generation: u64,
    ) -> Result<LoadTicket, CacheError> {
        let slot = self.slot_or_allocate(key)?;
        let mut state = lock(&self.slots[slot]);
        if state.load_generation >= generation {
            return Err(CacheError::Superseded(key.clone()));
        }
        state.status = SlotStatus::Loading;
        state.load_generation = generation;
        Ok(LoadTicket {
            key: key.clone(),
            slot,
            generation,
        })
    }

    /// Publishes the result of a load, unless a newer load or an eviction
    /// has superseded it. Returns the id of the replaced buffer.
    pub fn complete_load(
        &self,
        ticket: LoadTicket,
        buffer: RasterBuffer,
    ) -> Result<Option<BufferId>, CacheError> {
        self.complete_load_if(ticket, buffer, || true)
    }

    /// [`SweepCache::complete_load`], with `keep` asked under the slot lock
    /// right before the swap. When it returns false the load is dropped and
    /// the call fails with `Withdrawn`.
    pub fn complete_load_if(
        &self,
        ticket: LoadTicket,
        buffer: RasterBuffer,
        keep: impl FnOnce() -> bool,
    ) -> Result<Option<BufferId>, CacheError> {
        let mut state = lock(&self.slots[ticket.slot]);
        if state.key.as_ref() != Some(&ticket.key) || state.load_generation != ticket.generation {
            return Err(CacheError::Superseded(ticket.key));
        }
        if !keep() {
            state.status = settled_status(&state);
            return Err(CacheError::Withdrawn(ticket.key));
        }
        Ok(self.publish(&mut state, buffer))
    }

    /// Drops an outstanding load; the slot returns to its previous state.
    pub fn abandon(&self, ticket: LoadTicket) {
        let mut state = lock(&self.slots[ticket.slot]);
        if state.key.as_ref() == Some(&ticket.key) && state.load_generation == ticket.generation {
            state.status = settled_status(&state);
        }
    }

    /// Publishes `buffer` as current for its key, whatever loads are pending.
    /// Returns the id of the replaced buffer.
    pub fn submit(&self, buffer: RasterBuffer) -> Result<Option<BufferId>, CacheError> {
        let slot = self.slot_or_allocate(&buffer.key)?;
        let mut state = lock(&self.slots[slot]);
        Ok(self.publish(&mut state, buffer))
    }

    fn publish(&self, state: &mut Slot, buffer: RasterBuffer) -> Option<BufferId> {
        let incoming = Arc::new(buffer);
        log::debug!(
            "SweepCache: publishing {} as {} ({} vertices)",
            incoming.id,
            incoming.key,
            incoming.vertex_count()
        );
        let previous = state.current.replace(incoming);
        state.status = SlotStatus::Ready;
        previous.map(|old| {
            let id = old.id;
            self.retire(old);
            id
        })
    }

    fn retire(&self, buffer: Arc<RasterBuffer>) {
        // Any frame that snapshotted the old pointer began before the swap,
        // so its epoch is below the value read here.
        let retire_after = self.frame_epoch.load(Ordering::SeqCst);
        lock(&self.retired).push(Retired {
            buffer,
            retire_after,
        });
    }

    /// The last published buffer for `key`. Never waits on a load.
    pub fn current(&self, key: &SweepKey) -> Option<Arc<RasterBuffer>> {
        let slot = self.slot_of(key)?;
        let state = lock(&self.slots[slot]);
        if state.key.as_ref() == Some(key) {
            state.current.clone()
        } else {
            None
        }
    }

    pub fn status(&self, key: &SweepKey) -> SlotStatus {
        let Some(slot) = self.slot_of(key) else {
            return SlotStatus::Empty;
        };
        let state = lock(&self.slots[slot]);
        if state.key.as_ref() == Some(key) {
            state.status
        } else {
            SlotStatus::Empty
        }
    }

    /// Keys currently holding a slot.
    pub fn keys(&self) -> Vec<SweepKey> {
        let mut keys: Vec<SweepKey> = self
            .index
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect();
        keys.sort();
        keys
    }

    /// Releases `key`'s slot, retiring its buffer.
    pub fn evict(&self, key: &SweepKey) -> Option<BufferId> {
        let slot = self
            .index
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(key)?;
        let previous = {
            let mut state = lock(&self.slots[slot]);
            let previous = state.current.take();
            *state = Slot::vacant();
            previous
        };
        lock(&self.free).push(slot);
        log::debug!("SweepCache: evicted {} from slot {}", key, slot);
        previous.map(|old| {
            let id = old.id;
            self.retire(old);
            id
        })
    }

    /// Starts a frame: takes a new epoch and pins every current buffer.
    pub fn begin_frame(&self) -> FrameSnapshot {
        let epoch = self.frame_epoch.fetch_add(1, Ordering::SeqCst);
        let mut buffers: Vec<Arc<RasterBuffer>> = self
            .slots
            .iter()
            .filter_map(|slot| lock(slot).current.clone())
            .collect();
        buffers.sort_by(|a, b| a.key.cmp(&b.key));
        FrameSnapshot { epoch, buffers }
    }

    /// Signals that the frame with `epoch` (and every earlier frame) no
    /// longer reads any buffer.
    pub fn complete_frame(&self, epoch: u64) {
        self.completed_epoch.fetch_max(epoch + 1, Ordering::SeqCst);
    }

    /// Epoch of the oldest frame that may still be in flight.
    pub fn completed_epoch(&self) -> u64 {
        self.completed_epoch.load(Ordering::SeqCst)
    }

    /// Removes retired buffers no in-flight frame can reference and
    /// returns their ids.
    pub fn reclaim(&self) -> Vec<BufferId> {
        let completed = self.completed_epoch.load(Ordering::SeqCst);
        let mut retired = lock(&self.retired);
        let mut freed = Vec::new();
        retired.retain(|r| {
            if completed >= r.retire_after {
                freed.push(r.buffer.id);
                false
            } else {
                true
            }
        });
        if !freed.is_empty() {
            log::debug!(
                "SweepCache: reclaimed {} buffers ({} still retiring)",
                freed.len(),
                retired.len()
            );
        }
        freed
    }

    /// Number of buffers waiting for reclamation.
    pub fn retiring(&self) -> usize {
        lock(&self.retired).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::projection::WorldBounds;
    use crate::radar::ProductType;
    use crate::raster::RasterVertex;
    use chrono::Utc;
    use glam::DVec2;
    use std::sync::atomic::AtomicBool;
    use std::thread;

    fn key() -> SweepKey {
        SweepKey::new("KLSX", ProductType::Reflectivity)
    }

    /// Buffer whose every vertex carries `fill`, so torn reads would show
    /// mixed colors.
    fn buffer(key: &SweepKey, fill: u8, vertices: usize) -> RasterBuffer {
        RasterBuffer {
            id: BufferId::next(),
            key: key.clone(),
            scan_time: Utc::now(),
            elevation_deg: 0.5,
            value_range: (0.0, 1.0),
            origin: DVec2::ZERO,
            vertices: vec![
                RasterVertex {
                    position: [0.0, 0.0],
                    color: [fill; 4],
                };
                vertices
            ],
            tiles: Vec::new(),
            bounds: WorldBounds::empty(),
        }
    }

    #[test]
    fn test_current_empty_until_submit() {
        let cache = SweepCache::new(4);
        assert!(cache.current(&key()).is_none());
        assert_eq!(cache.status(&key()), SlotStatus::Empty);

        let a = buffer(&key(), 1, 6);
        let id = a.id;
        assert_eq!(cache.submit(a).unwrap(), None);
        assert_eq!(cache.current(&key()).unwrap().id, id);
        assert_eq!(cache.status(&key()), SlotStatus::Ready);
    }

    #[test]
    fn test_state_machine() {
        let cache = SweepCache::new(4);
        let ticket = cache.begin_load(&key()).unwrap();
        assert_eq!(cache.status(&key()), SlotStatus::Loading);
        cache.complete_load(ticket, buffer(&key(), 1, 6)).unwrap();
        assert_eq!(cache.status(&key()), SlotStatus::Ready);

        // Loading again keeps the ready buffer visible
        let ticket = cache.begin_load(&key()).unwrap();
        assert_eq!(cache.status(&key()), SlotStatus::Loading);
        assert!(cache.current(&key()).is_some());
        cache.abandon(ticket);
        assert_eq!(cache.status(&key()), SlotStatus::Ready);
    }

    #[test]
    fn test_superseded_load_is_rejected() {
        let cache = SweepCache::new(4);
        let stale = cache.begin_load(&key()).unwrap();
        let fresh = cache.begin_load(&key()).unwrap();

        let err = cache.complete_load(stale, buffer(&key(), 1, 6)).unwrap_err();
        assert_eq!(err, CacheError::Superseded(key()));
        assert!(cache.current(&key()).is_none());

        cache.complete_load(fresh, buffer(&key(), 2, 6)).unwrap();
        assert_eq!(cache.current(&key()).unwrap().vertices[0].color, [2; 4]);
    }

    #[test]
    fn test_older_generation_cannot_start_after_newer() {
        let cache = SweepCache::new(4);
        let older = cache.next_generation();
        let newer = cache.next_generation();

        let fresh = cache.begin_load_at(&key(), newer).unwrap();
        let err = cache.begin_load_at(&key(), older).unwrap_err();
        assert_eq!(err, CacheError::Superseded(key()));

        // The newer load is still the one in progress
        assert_eq!(cache.status(&key()), SlotStatus::Loading);
        cache.complete_load(fresh, buffer(&key(), 2, 6)).unwrap();
        assert_eq!(cache.current(&key()).unwrap().vertices[0].color, [2; 4]);
    }

    #[test]
    fn test_withdrawn_load_leaves_current_buffer() {
        let cache = SweepCache::new(4);
        cache.submit(buffer(&key(), 1, 6)).unwrap();

        let ticket = cache.begin_load(&key()).unwrap();
        let err = cache
            .complete_load_if(ticket, buffer(&key(), 2, 6), || false)
            .unwrap_err();
        assert_eq!(err, CacheError::Withdrawn(key()));
        assert_eq!(cache.status(&key()), SlotStatus::Ready);
        assert_eq!(cache.current(&key()).unwrap().vertices[0].color, [1; 4]);
        assert_eq!(cache.retiring(), 0);
    }

    #[test]
    fn test_full_arena() {
        let cache = SweepCache::new(2);
        for product in [ProductType::Reflectivity, ProductType::Velocity] {
            cache.submit(buffer(&SweepKey::new("KLSX", product), 1, 6)).unwrap();
        }
        let third = SweepKey::new("KLSX", ProductType::SpectrumWidth);
        assert_eq!(cache.submit(buffer(&third, 1, 6)).unwrap_err(), CacheError::Full(2));

        cache.evict(&SweepKey::new("KLSX", ProductType::Velocity));
        assert!(cache.submit(buffer(&third, 1, 6)).is_ok());
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_retired_buffer_outlives_in_flight_frame() {
        let cache = SweepCache::new(4);
        let a = buffer(&key(), 1, 6);
        let a_id = a.id;
        cache.submit(a).unwrap();

        let frame = cache.begin_frame();
        assert_eq!(frame.buffers[0].id, a_id);

        let replaced = cache.submit(buffer(&key(), 2, 6)).unwrap();
        assert_eq!(replaced, Some(a_id));
        assert!(cache.reclaim().is_empty());
        assert_eq!(cache.retiring(), 1);

        cache.complete_frame(frame.epoch);
        assert_eq!(cache.reclaim(), vec![a_id]);
        assert_eq!(cache.retiring(), 0);
    }

    #[test]
    fn test_retired_without_frames_is_reclaimed_immediately() {
        let cache = SweepCache::new(4);
        cache.submit(buffer(&key(), 1, 6)).unwrap();
        cache.submit(buffer(&key(), 2, 6)).unwrap();
        assert_eq!(cache.reclaim().len(), 1);
    }

    #[test]
    fn test_later_frames_do_not_pin_retired_buffer() {
        let cache = SweepCache::new(4);
        let a = buffer(&key(), 1, 6);
        let a_id = a.id;
        cache.submit(a).unwrap();
        let first = cache.begin_frame();
        cache.complete_frame(first.epoch);

        cache.submit(buffer(&key(), 2, 6)).unwrap();
        // A frame begun after the swap never saw A
        let second = cache.begin_frame();
        assert_ne!(second.buffers[0].id, a_id);
        assert_eq!(cache.reclaim(), vec![a_id]);
    }

    #[test]
    fn test_concurrent_readers_never_see_torn_buffers() {
        let cache = Arc::new(SweepCache::new(4));
        let initial = buffer(&key(), 0, 600);
        cache.submit(initial).unwrap();
        let done = Arc::new(AtomicBool::new(false));

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let cache = cache.clone();
                let done = done.clone();
                thread::spawn(move || {
                    while !done.load(Ordering::Relaxed) {
                        let current = cache.current(&key()).unwrap();
                        let fill = current.vertices[0].color;
                        assert!(fill == [0; 4] || fill == [1; 4] || fill == [2; 4]);
                        assert!(current.vertices.iter().all(|v| v.color == fill));
                    }
                })
            })
            .collect();

        for fill in [1u8, 2] {
            cache.submit(buffer(&key(), fill, 600)).unwrap();
            thread::yield_now();
        }
        done.store(true, Ordering::Relaxed);
        for reader in readers {
            reader.join().unwrap();
        }
        assert_eq!(cache.current(&key()).unwrap().vertices[0].color, [2; 4]);
    }

    #[test]
    fn test_evicted_load_is_superseded() {
        let cache = SweepCache::new(4);
        let ticket = cache.begin_load(&key()).unwrap();
        cache.evict(&key());
        assert!(cache.complete_load(ticket, buffer(&key(), 1, 6)).is_err());
        assert!(cache.current(&key()).is_none());
    }
}
