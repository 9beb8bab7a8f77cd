use crate::cache::lru::Lru;
use crate::cache::{EvictionPolicy, FrameId};
use crate::config::{ConfigError, PoolConfig};
use crate::pages::PageId;
use crate::storage::{PageStore, StoreError};

use std::collections::{HashMap, VecDeque};
use std::ops::{Deref, DerefMut};

use memmap2::MmapMut;
use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PoolError {
    #[error("invalid configuration")]
    Config(#[from] ConfigError),
    #[error("frame arena allocation failed")]
    Arena(#[source] std::io::Error),
    #[error("store")]
    Store(#[from] StoreError),
    #[error("no free or evictable frame")]
    Exhausted,
    #[error("handle is not pinned")]
    InvalidHandle,
    #[error("pages still pinned")]
    Busy,
    #[error("no store attached")]
    Closed,
    #[error("a store is already attached")]
    AlreadyOpen,
}

/// Monotonic counters describing pool activity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub write_backs: u64,
}

/// Per-frame descriptor.
///
/// A frame is in exactly one of three states: free (`page_id` is `None`, the
/// frame index sits on the free list), pinned-resident (`pin_count > 0`,
/// absent from both lists), or unpinned-resident (`pin_count == 0`, a member
/// of the eviction policy).
struct FrameMeta {
    page_id: Option<PageId>,
    pin_count: u32,
    dirty: bool,
}

impl FrameMeta {
    fn free() -> Self {
        Self {
            page_id: None,
            pin_count: 0,
            dirty: false,
        }
    }
}

struct PoolState<S> {
    store: Option<S>,
    table: HashMap<PageId, FrameId>,
    free_list: VecDeque<FrameId>,
    policy: Box<dyn EvictionPolicy>,
    frames: Box<[FrameMeta]>,
    tick: i64,
    stats: PoolStats,
}

/// A fixed-capacity cache of pages backed by a [`PageStore`].
///
/// `fetch`/`fetch_mut` return pinned handles; a pinned page cannot be evicted
/// until every handle to it is gone. Unpinned resident pages are evicted in
/// least-recently-released order once the free list runs dry, with dirty
/// pages written back first.
pub struct BufferPool<S: PageStore> {
    config: PoolConfig,
    // keeps the anonymous mapping alive; frames are accessed through `base`
    _arena: MmapMut,
    base: *mut u8,
    latches: Box<[RwLock<()>]>,
    state: Mutex<PoolState<S>>,
}

// SAFETY:
// `base` points into `_arena`, which lives exactly as long as the pool. A
// frame's bytes are only touched while its latch is held (shared for reads,
// exclusive for writes) or while the structural lock excludes every pin, so
// no two threads ever access a frame mutably at the same time.
unsafe impl<S: PageStore> Send for BufferPool<S> {}
unsafe impl<S: PageStore> Sync for BufferPool<S> {}

impl<S: PageStore> BufferPool<S> {
    /// Allocates a pool of `config.npage` frames. The pool starts without a
    /// store attached; call [`BufferPool::open`] before fetching.
    pub fn try_new(config: PoolConfig) -> Result<Self, PoolError> {
        config.validate()?;

        let mut arena = MmapMut::map_anon(config.arena_len()).map_err(PoolError::Arena)?;
        let base = arena.as_mut_ptr();
        let latches = Box::from_iter(std::iter::repeat_with(|| RwLock::new(())).take(config.npage));
        let frames = Box::from_iter(std::iter::repeat_with(FrameMeta::free).take(config.npage));

        Ok(Self {
            config,
            _arena: arena,
            base,
            latches,
            state: Mutex::new(PoolState {
                store: None,
                table: HashMap::new(),
                free_list: VecDeque::from_iter(0..config.npage),
                policy: Box::new(Lru::new()),
                frames,
                tick: 0,
                stats: PoolStats::default(),
            }),
        })
    }

    /// Attaches a backing store to the pool.
    pub fn open(&self, store: S) -> Result<(), PoolError> {
        let mut state = self.state.lock();
        if state.store.is_some() {
            return Err(PoolError::AlreadyOpen);
        }
        state.store = Some(store);
        Ok(())
    }

    /// Detaches and returns the backing store.
    ///
    /// Dirty resident pages are flushed first, so residency stays valid
    /// across a close/open pair against the same backing data. Fails with
    /// `Busy` while any page is pinned.
    pub fn close(&self) -> Result<S, PoolError> {
        let mut state = self.state.lock();
        if state.store.is_none() {
            return Err(PoolError::Closed);
        }
        if state.frames.iter().any(|meta| meta.pin_count > 0) {
            return Err(PoolError::Busy);
        }
        self.flush_locked(&mut state)?;
        state.store.take().ok_or(PoolError::Closed)
    }

    /// Tears the pool down, failing with `Busy` if a page is still pinned.
    ///
    /// Live handles borrow the pool, so this can only be refused when a
    /// handle was leaked with its pin outstanding; the pool is handed back
    /// untouched in that case.
    pub fn destroy(self) -> Result<(), (Self, PoolError)> {
        let busy = {
            let state = self.state.lock();
            state.frames.iter().any(|meta| meta.pin_count > 0)
        };
        if busy {
            return Err((self, PoolError::Busy));
        }
        Ok(())
    }

    /// Returns a pinned, read-only handle to the page.
    ///
    /// Concurrent readers of the same page share access; the page cannot be
    /// evicted while the handle is alive.
    pub fn fetch(&self, page_id: PageId) -> Result<PageRef<'_, S>, PoolError> {
        let frame_id = self.pin(page_id, false)?;
        let guard = self.latches[frame_id].read();
        // SAFETY: the frame is pinned and read-latched, so it cannot be
        // rebound and no writer can touch its bytes.
        let data = unsafe { self.frame(frame_id) };

        Ok(PageRef {
            pool: self,
            page_id,
            frame_id,
            guard: Some(guard),
            data,
        })
    }

    /// Returns a pinned, writable handle to the page and marks it dirty.
    ///
    /// The write latch excludes every other holder for the handle's lifetime.
    pub fn fetch_mut(&self, page_id: PageId) -> Result<PageRefMut<'_, S>, PoolError> {
        let frame_id = self.pin(page_id, true)?;
        let guard = self.latches[frame_id].write();
        // SAFETY: the frame is pinned and write-latched, so this is the only
        // access to its bytes.
        let data = unsafe { self.frame_mut(frame_id) };

        Ok(PageRefMut {
            pool: self,
            page_id,
            frame_id,
            guard: Some(guard),
            data,
        })
    }

    /// Writes every dirty resident page back to the store and clears its
    /// dirty flag. Eviction write-back remains the only implicit write path.
    pub fn flush(&self) -> Result<(), PoolError> {
        let mut state = self.state.lock();
        self.flush_locked(&mut state)
    }

    pub fn is_open(&self) -> bool {
        self.state.lock().store.is_some()
    }

    /// Number of pages currently resident in the pool.
    pub fn resident_pages(&self) -> usize {
        self.state.lock().table.len()
    }

    /// Number of resident pages with at least one live handle.
    pub fn pinned_pages(&self) -> usize {
        self.state
            .lock()
            .frames
            .iter()
            .filter(|meta| meta.pin_count > 0)
            .count()
    }

    pub fn stats(&self) -> PoolStats {
        self.state.lock().stats
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Pins `page_id` into a frame, loading it from the store on a miss.
    ///
    /// All structural transitions and the miss-path I/O happen under the
    /// state lock, so concurrent fetches of the same page id cannot load it
    /// into two frames.
    fn pin(&self, page_id: PageId, for_write: bool) -> Result<FrameId, PoolError> {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        if state.store.is_none() {
            return Err(PoolError::Closed);
        }

        if let Some(&frame_id) = state.table.get(&page_id) {
            let meta = &mut state.frames[frame_id];
            meta.pin_count += 1;
            if for_write {
                meta.dirty = true;
            }
            if meta.pin_count == 1 {
                state.policy.remove(frame_id);
            }
            state.stats.hits += 1;
            return Ok(frame_id);
        }

        let store = state.store.as_ref().ok_or(PoolError::Closed)?;

        let frame_id = match state.free_list.pop_front() {
            Some(frame_id) => frame_id,
            None => {
                let victim = state.policy.peek_victim().ok_or(PoolError::Exhausted)?;
                let meta = &state.frames[victim];
                debug_assert_eq!(meta.pin_count, 0);
                if meta.dirty {
                    // SAFETY: the victim is unpinned and the structural lock
                    // is held, so no latch holder exists and none can appear.
                    let bytes = unsafe { self.frame(victim) };
                    if let Some(old_id) = meta.page_id {
                        // on failure the victim stays resident and dirty
                        store.write_page(old_id, bytes)?;
                    }
                    state.stats.write_backs += 1;
                }
                let popped = state.policy.pop_victim();
                debug_assert_eq!(popped, Some(victim));
                if let Some(old_id) = state.frames[victim].page_id.take() {
                    state.table.remove(&old_id);
                }
                state.frames[victim].dirty = false;
                state.stats.evictions += 1;
                victim
            }
        };

        // SAFETY: the frame is unbound (absent from the lookup index) and
        // the structural lock is held, so this is the only access.
        let buf = unsafe { self.frame_mut(frame_id) };
        if let Err(e) = store.read_page(page_id, buf) {
            state.free_list.push_front(frame_id);
            return Err(e.into());
        }

        let meta = &mut state.frames[frame_id];
        meta.page_id = Some(page_id);
        meta.pin_count = 1;
        meta.dirty = for_write;
        state.table.insert(page_id, frame_id);
        state.stats.misses += 1;
        Ok(frame_id)
    }

    /// Drops one pin. On the 1 -> 0 transition the frame joins the eviction
    /// order with a fresh release tick.
    fn unpin(&self, frame_id: FrameId) -> Result<(), PoolError> {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let meta = &mut state.frames[frame_id];
        if meta.page_id.is_none() || meta.pin_count == 0 {
            return Err(PoolError::InvalidHandle);
        }
        meta.pin_count -= 1;
        if meta.pin_count == 0 {
            state.tick += 1;
            state.policy.record_release(frame_id, state.tick);
        }
        Ok(())
    }

    fn flush_locked(&self, state: &mut PoolState<S>) -> Result<(), PoolError> {
        let PoolState {
            store,
            frames,
            stats,
            ..
        } = state;
        let store = store.as_ref().ok_or(PoolError::Closed)?;

        for (frame_id, meta) in frames.iter_mut().enumerate() {
            let Some(page_id) = meta.page_id else { continue };
            if !meta.dirty {
                continue;
            }
            // readers may share the latch; an exclusive writer finishes first
            let _latch = self.latches[frame_id].read();
            // SAFETY: the read latch is held, so no writer can touch the
            // frame's bytes.
            let bytes = unsafe { self.frame(frame_id) };
            store.write_page(page_id, bytes)?;
            meta.dirty = false;
            stats.write_backs += 1;
        }
        Ok(())
    }

    unsafe fn frame(&self, frame_id: FrameId) -> &[u8] {
        unsafe {
            std::slice::from_raw_parts(
                self.base.add(frame_id * self.config.page_size),
                self.config.page_size,
            )
        }
    }

    #[allow(clippy::mut_from_ref)]
    unsafe fn frame_mut(&self, frame_id: FrameId) -> &mut [u8] {
        unsafe {
            std::slice::from_raw_parts_mut(
                self.base.add(frame_id * self.config.page_size),
                self.config.page_size,
            )
        }
    }
}

/// A pinned, read-only view of a page's bytes.
///
/// Dropping the handle releases the pin; [`PageRef::release`] does the same
/// with an error report.
pub struct PageRef<'pool, S: PageStore> {
    pool: &'pool BufferPool<S>,
    page_id: PageId,
    frame_id: FrameId,
    guard: Option<RwLockReadGuard<'pool, ()>>,
    data: &'pool [u8],
}

/// A pinned, writable view of a page's bytes.
pub struct PageRefMut<'pool, S: PageStore> {
    pool: &'pool BufferPool<S>,
    page_id: PageId,
    frame_id: FrameId,
    guard: Option<RwLockWriteGuard<'pool, ()>>,
    data: &'pool mut [u8],
}

impl<S: PageStore> PageRef<'_, S> {
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    /// Releases the pin explicitly, reporting a pin-count underflow instead
    /// of ignoring it.
    pub fn release(mut self) -> Result<(), PoolError> {
        self.guard.take();
        let result = self.pool.unpin(self.frame_id);
        std::mem::forget(self);
        result
    }
}

impl<S: PageStore> PageRefMut<'_, S> {
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    /// Releases the pin explicitly, reporting a pin-count underflow instead
    /// of ignoring it.
    pub fn release(mut self) -> Result<(), PoolError> {
        self.guard.take();
        let result = self.pool.unpin(self.frame_id);
        std::mem::forget(self);
        result
    }
}

impl<S: PageStore> Deref for PageRef<'_, S> {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.data
    }
}

impl<S: PageStore> Deref for PageRefMut<'_, S> {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.data
    }
}

impl<S: PageStore> DerefMut for PageRefMut<'_, S> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.data
    }
}

impl<S: PageStore> Drop for PageRef<'_, S> {
    fn drop(&mut self) {
        // the latch must be gone before the pin count can reach zero
        self.guard.take();
        let result = self.pool.unpin(self.frame_id);
        debug_assert!(result.is_ok());
    }
}

impl<S: PageStore> Drop for PageRefMut<'_, S> {
    fn drop(&mut self) {
        self.guard.take();
        let result = self.pool.unpin(self.frame_id);
        debug_assert!(result.is_ok());
    }
}
