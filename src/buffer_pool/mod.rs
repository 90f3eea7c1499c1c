mod frame;
mod replacer;

use crate::errors::Error;
#[cfg(debug_assertions)]
use crate::get_caller_name;
use crate::printdbg;
use crate::store::{PageId, PageStore};
use anyhow::Result;
use frame::Frame;
use parking_lot::{ArcRwLockWriteGuard, Mutex, RawRwLock, RwLock};
use replacer::{Replacer, LRU};
use std::collections::{HashMap, LinkedList};
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

pub(crate) type FrameId = usize;
/// An index in `[0, poolSize)` identifying a slot in the frame array.
pub type FrameIndex = FrameId;

struct Inner {
    frames: Vec<Frame>,
    page_table: HashMap<PageId, FrameId>,
    free_list: LinkedList<FrameId>,
    replacer: Box<dyn Replacer>,
    store: Arc<dyn PageStore>,
}

/// Outcome of trying to secure a victim frame chosen by `find_victim` for
/// reuse.
enum VictimStatus {
    /// Flushed (if needed) and its old directory entry dropped, or held no
    /// page to begin with. Ready to be rebound.
    Ready,
    /// Still resident and its data buffer is locked by an outstanding
    /// `PageGuard`, so it can't be safely read right now without blocking.
    Busy,
}

/// The buffer pool manager: a fixed-size cache of fixed-size pages
/// mediating all access between client code and a [`PageStore`].
///
/// All five public operations acquire a single internal mutex covering the
/// frame array, the page directory, the free list, and the replacer, and
/// release it before returning. A pinned frame's data buffer may then be
/// read and written by its pinning client without holding that lock; see
/// [`PageGuard`].
pub struct BufferPoolManager {
    inner: Mutex<Inner>,
}

impl BufferPoolManager {
    /// Builds a pool of `pool_size` frames, each holding a `page_size`-byte
    /// page, backed by `store`. Fails with [`Error::BadConfig`] if either
    /// size is zero or doesn't match what `store` serves.
    pub fn new(pool_size: usize, page_size: usize, store: Arc<dyn PageStore>) -> Result<Self, Error> {
        if pool_size == 0 {
            return Err(Error::BadConfig("pool_size must be greater than 0".into()));
        }
        if page_size == 0 {
            return Err(Error::BadConfig("page_size must be greater than 0".into()));
        }
        if store.page_size() != page_size {
            return Err(Error::BadConfig(format!(
                "store page size ({}) does not match pool page size ({})",
                store.page_size(),
                page_size
            )));
        }

        let frames = (0..pool_size).map(|_| Frame::new(page_size)).collect();

        Ok(Self {
            inner: Mutex::new(Inner {
                frames,
                page_table: HashMap::with_capacity(pool_size),
                free_list: LinkedList::from_iter(0..pool_size),
                replacer: Box::new(LRU::new(pool_size)),
                store,
            }),
        })
    }

    /// Picks a victim frame per the free-list-then-replacer protocol.
    /// Returns `None` if the pool is fully pinned. If the replacer hands
    /// back a frame that turns out still pinned, that's an invariant
    /// violation: fail defensively rather than evict it.
    fn find_victim(inner: &mut Inner) -> Option<FrameId> {
        if let Some(frame_id) = inner.free_list.pop_front() {
            return Some(frame_id);
        }

        let frame_id = inner.replacer.evict()?;
        if inner.frames[frame_id].pin_count() != 0 {
            debug_assert!(false, "replacer returned frame {frame_id} with a nonzero pin count");
            return None;
        }
        Some(frame_id)
    }

    /// Returns a victim's frame to an unset, free state after it turned out
    /// unusable partway through being rebound — any dirty content was
    /// already written back (or it held none) before that was discovered,
    /// so this never loses data, only abandons the attempt.
    fn abandon_victim(inner: &mut Inner, frame_id: FrameId) {
        inner.frames[frame_id].clear();
        inner.free_list.push_back(frame_id);
    }

    /// If the victim frame currently holds a page, writes it back when
    /// dirty and drops its page-directory entry, leaving the frame ready
    /// to be rebound.
    ///
    /// `frame_id` has already been taken out of the free list or the
    /// replacer by `find_victim` by the time this runs. Every exit path
    /// that doesn't return `Ready` restores the cross-component invariants
    /// of §3 itself rather than leaving the frame stranded outside every
    /// tracking structure:
    ///
    /// - If the write-back fails, the frame is left exactly as it was —
    ///   still dirty, still holding its old page, directory entry intact —
    ///   and, since a resident victim can only have come from the replacer
    ///   (free-list frames are never resident), it's re-touched there
    ///   before the error is returned.
    /// - If the frame is resident but its data buffer is still locked by an
    ///   outstanding [`PageGuard`] from before it became evictable (`pin(
    ///   ) -> PageGuard -> unpin_page` doesn't drop the guard; the two are
    ///   independent by design), the write-back can't be read without
    ///   blocking while this pool's own lock is held — forbidden by §5's
    ///   "the only blocking point is the BPM lock acquisition and any I/O
    ///   performed by the store". This is treated the same way
    ///   `find_victim` treats a replacer handing back a still-pinned frame:
    ///   a defensive failure rather than a stall, surfaced as `Busy`.
    fn evict(inner: &mut Inner, frame_id: FrameId) -> Result<VictimStatus> {
        let frame = &mut inner.frames[frame_id];
        if !frame.is_resident() {
            return Ok(VictimStatus::Ready);
        }

        let old_page_id = frame.page_id();
        if frame.is_dirty() {
            printdbg!("buffer_pool: writing back dirty page {} before eviction", old_page_id);
            let data = match frame.try_read_data() {
                Some(data) => data,
                None => {
                    debug_assert!(
                        false,
                        "frame {frame_id} is evictable but its data buffer is still locked by an outstanding PageGuard"
                    );
                    inner.replacer.touch(frame_id);
                    return Ok(VictimStatus::Busy);
                }
            };
            if let Err(err) = inner.store.write(old_page_id, &data) {
                inner.replacer.touch(frame_id);
                return Err(err.into());
            }
            inner.frames[frame_id].mark_clean();
        }
        inner.page_table.remove(&old_page_id);
        Ok(VictimStatus::Ready)
    }

    /// Returns a pinned, resident frame whose content equals the store's
    /// current content for `page_id`, or `None` if no victim frame is
    /// available or the page doesn't exist in the store. A miss is
    /// validated against the store *before* any victim is touched, so a
    /// missing page never leaves a frame partially evicted.
    ///
    /// Pin count can legitimately exceed one for the same page, so the
    /// pool's own lock is released before the returned guard takes the
    /// frame's buffer lock: a second concurrent fetch of an already-pinned
    /// page blocks there on its own, rather than blocking every other
    /// client waiting on an unrelated page.
    pub fn fetch_page(&self, page_id: PageId) -> Result<Option<PageGuard>> {
        let mut inner = self.inner.lock();

        if let Some(&frame_id) = inner.page_table.get(&page_id) {
            inner.frames[frame_id].pin();
            inner.replacer.remove(frame_id);
            let data = inner.frames[frame_id].data_handle();
            drop(inner);
            printdbg!(
                "buffer_pool: {} fetch hit page {} (frame {})",
                get_caller_name!(),
                page_id,
                frame_id
            );
            return Ok(Some(PageGuard::new(page_id, data)));
        }

        if !inner.store.exists(page_id) {
            printdbg!("buffer_pool: fetch miss, page {} does not exist", page_id);
            return Ok(None);
        }

        let frame_id = match Self::find_victim(&mut inner) {
            Some(frame_id) => frame_id,
            None => {
                printdbg!("buffer_pool: fetch_page({}) found no victim frame", page_id);
                return Ok(None);
            }
        };

        if let VictimStatus::Busy = Self::evict(&mut inner, frame_id)? {
            Self::abandon_victim(&mut inner, frame_id);
            printdbg!(
                "buffer_pool: fetch_page({}) found victim frame {} still locked by an outstanding guard",
                page_id,
                frame_id
            );
            return Ok(None);
        }

        let contents = inner.store.read(page_id)?;
        if !inner.frames[frame_id].try_bind(page_id, &contents) {
            Self::abandon_victim(&mut inner, frame_id);
            printdbg!(
                "buffer_pool: fetch_page({}) found victim frame {} locked just before rebinding",
                page_id,
                frame_id
            );
            return Ok(None);
        }
        inner.page_table.insert(page_id, frame_id);
        inner.replacer.remove(frame_id);
        let data = inner.frames[frame_id].data_handle();
        drop(inner);

        printdbg!("buffer_pool: fetched page {} into frame {}", page_id, frame_id);
        Ok(Some(PageGuard::new(page_id, data)))
    }

    /// Allocates a fresh page in the store and returns it pinned with
    /// zeroed content, or `None` if the pool is fully pinned. A victim is
    /// secured *before* the store is asked to allocate, so a full pool
    /// never leaks an orphaned page id in the store.
    pub fn new_page(&self) -> Result<Option<(PageId, PageGuard)>> {
        let mut inner = self.inner.lock();

        let frame_id = match Self::find_victim(&mut inner) {
            Some(frame_id) => frame_id,
            None => {
                printdbg!("buffer_pool: new_page() found no victim frame");
                return Ok(None);
            }
        };

        if let VictimStatus::Busy = Self::evict(&mut inner, frame_id)? {
            Self::abandon_victim(&mut inner, frame_id);
            printdbg!("buffer_pool: new_page() found victim frame {} still locked by an outstanding guard", frame_id);
            return Ok(None);
        }

        let page_id = inner.store.allocate()?;
        let zeroed = vec![0u8; inner.frames[frame_id].len()];
        if !inner.frames[frame_id].try_bind(page_id, &zeroed) {
            // The store already allocated `page_id`, so this call leaves it
            // as an orphan the pool never hands out — the same class of
            // benign leak the victim-before-allocate ordering above already
            // accepts in the fully-pinned case, not a new one.
            Self::abandon_victim(&mut inner, frame_id);
            printdbg!("buffer_pool: new_page() found victim frame {} locked just before rebinding", frame_id);
            return Ok(None);
        }
        inner.page_table.insert(page_id, frame_id);
        inner.replacer.remove(frame_id);
        let data = inner.frames[frame_id].data_handle();
        drop(inner);

        printdbg!("buffer_pool: allocated page {} into frame {}", page_id, frame_id);
        Ok(Some((page_id, PageGuard::new(page_id, data))))
    }

    /// Decrements `page_id`'s pin count, marking its frame dirty if
    /// `mark_dirty`. Returns `false` (no state change) if the page isn't
    /// resident or was already unpinned to zero. A true dirty bit is
    /// sticky: it is cleared only by a write-back, never by a clean unpin.
    pub fn unpin_page(&self, page_id: PageId, mark_dirty: bool) -> bool {
        let mut inner = self.inner.lock();

        let frame_id = match inner.page_table.get(&page_id) {
            Some(&frame_id) => frame_id,
            None => return false,
        };

        if inner.frames[frame_id].pin_count() == 0 {
            return false;
        }

        inner.frames[frame_id].unpin();
        if mark_dirty {
            inner.frames[frame_id].mark_dirty();
        }

        if inner.frames[frame_id].pin_count() == 0 {
            inner.replacer.touch(frame_id);
            printdbg!(
                "buffer_pool: {} frame {} for page {} is now evictable",
                get_caller_name!(),
                frame_id,
                page_id
            );
        }

        true
    }

    /// Removes `page_id` from both the pool and the store. Fails (`false`,
    /// store untouched) if the page is resident and currently pinned.
    pub fn delete_page(&self, page_id: PageId) -> Result<bool> {
        let mut inner = self.inner.lock();

        if let Some(&frame_id) = inner.page_table.get(&page_id) {
            if inner.frames[frame_id].pin_count() != 0 {
                return Ok(false);
            }

            inner.page_table.remove(&page_id);
            inner.frames[frame_id].clear();
            inner.replacer.remove(frame_id);
            inner.free_list.push_back(frame_id);
        }

        if inner.store.exists(page_id) {
            inner.store.deallocate(page_id)?;
        }

        Ok(true)
    }

    /// If `page_id` is resident, writes its frame back to the store iff
    /// dirty and clears the dirty bit. Returns `false` iff not resident.
    ///
    /// A page can be flushed while still pinned by another client, whose
    /// outstanding `PageGuard` may hold the frame's data lock. Reading it
    /// is non-blocking, since this runs under the pool's own lock: if the
    /// buffer is currently locked, the write-back is skipped for this call
    /// and the dirty bit is left set rather than stalling every other
    /// client's call into the pool.
    pub fn flush_page(&self, page_id: PageId) -> Result<bool> {
        let mut inner = self.inner.lock();

        let frame_id = match inner.page_table.get(&page_id) {
            Some(&frame_id) => frame_id,
            None => return Ok(false),
        };

        if inner.frames[frame_id].is_dirty() {
            match inner.frames[frame_id].try_read_data() {
                Some(data) => {
                    inner.store.write(page_id, &data)?;
                    inner.frames[frame_id].mark_clean();
                }
                None => {
                    printdbg!(
                        "buffer_pool: flush_page({}) found frame {} locked by an outstanding guard, leaving it dirty",
                        page_id,
                        frame_id
                    );
                }
            }
        }

        Ok(true)
    }

    /// Flushes every resident dirty page. Iteration order over the
    /// directory is unspecified. Does not change any pin count. Same
    /// non-blocking treatment of a locked buffer as `flush_page`: that
    /// page is simply skipped this round, still dirty.
    pub fn flush_all(&self) -> Result<()> {
        let mut inner = self.inner.lock();

        let resident: Vec<(PageId, FrameId)> =
            inner.page_table.iter().map(|(&p, &f)| (p, f)).collect();

        for (page_id, frame_id) in resident {
            if inner.frames[frame_id].is_dirty() {
                match inner.frames[frame_id].try_read_data() {
                    Some(data) => {
                        inner.store.write(page_id, &data)?;
                        inner.frames[frame_id].mark_clean();
                    }
                    None => {
                        printdbg!(
                            "buffer_pool: flush_all() found frame {} locked by an outstanding guard, leaving it dirty",
                            frame_id
                        );
                    }
                }
            }
        }

        Ok(())
    }

    #[cfg(test)]
    fn pin_count(&self, page_id: PageId) -> Option<u32> {
        let inner = self.inner.lock();
        let frame_id = *inner.page_table.get(&page_id)?;
        Some(inner.frames[frame_id].pin_count())
    }

    #[cfg(test)]
    fn resident_count(&self) -> usize {
        self.inner.lock().page_table.len()
    }

    #[cfg(test)]
    fn free_count(&self) -> usize {
        self.inner.lock().free_list.len()
    }

    #[cfg(test)]
    fn replacer_count(&self) -> usize {
        self.inner.lock().replacer.size()
    }
}

/// A borrow of a pinned frame's data buffer. Exposes read/write access to
/// the page's bytes (via `Deref`/`DerefMut`) and read access to its page
/// id; all other frame metadata stays internal to the pool.
///
/// Holds the frame's own `Arc<RwLock<_>>` write guard rather than a raw
/// pointer, so a client can hold and mutate it across other threads' calls
/// into the pool without aliasing another live `&mut` into the same
/// buffer: the pool guarantees a pinned frame is never evicted or
/// overwritten from the store, but pin count can exceed one for the same
/// page, and a second `PageGuard` on an already-checked-out frame blocks on
/// this lock — real exclusion rather than the UB of two simultaneous `&mut`
/// borrows. Clients pinning the same page concurrently still need to agree
/// on who writes when; this only makes that coordination sound instead of
/// merely polite.
pub struct PageGuard {
    page_id: PageId,
    guard: ArcRwLockWriteGuard<RawRwLock, Box<[u8]>>,
}

impl PageGuard {
    fn new(page_id: PageId, data: Arc<RwLock<Box<[u8]>>>) -> Self {
        Self {
            page_id,
            guard: data.write_arc(),
        }
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }
}

impl Deref for PageGuard {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &**self.guard
    }
}

impl DerefMut for PageGuard {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut **self.guard
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemStore;
    use anyhow::Result;
    use rand::Rng;

    fn pool(pool_size: usize, page_size: usize) -> BufferPoolManager {
        let store = Arc::new(MemStore::new(page_size));
        BufferPoolManager::new(pool_size, page_size, store).unwrap()
    }

    #[test]
    fn construction_rejects_bad_config() {
        let store = Arc::new(MemStore::new(16));
        assert!(matches!(
            BufferPoolManager::new(0, 16, store.clone()),
            Err(Error::BadConfig(_))
        ));
        assert!(matches!(
            BufferPoolManager::new(2, 0, store),
            Err(Error::BadConfig(_))
        ));
    }

    #[test]
    fn construction_rejects_mismatched_store_page_size() {
        let store = Arc::new(MemStore::new(16));
        assert!(matches!(
            BufferPoolManager::new(2, 32, store),
            Err(Error::BadConfig(_))
        ));
    }

    // Scenario 1: basic round-trip.
    #[test]
    fn basic_round_trip() -> Result<()> {
        let bpm = pool(2, 16);

        let (page_id, mut guard) = bpm.new_page()?.expect("frame available");
        guard.copy_from_slice(&[b'A'; 16]);
        drop(guard);

        assert!(bpm.unpin_page(page_id, true));
        assert!(bpm.flush_page(page_id)?);
        Ok(())
    }

    // Scenario 2: LRU eviction order.
    #[test]
    fn lru_eviction_order() -> Result<()> {
        let bpm = pool(2, 16);

        let (p0, _) = bpm.new_page()?.unwrap();
        assert!(bpm.unpin_page(p0, true));

        let (p1, _) = bpm.new_page()?.unwrap();
        assert!(bpm.unpin_page(p1, false));

        // touch p0 again so p1 becomes the LRU frame
        bpm.fetch_page(p0)?.unwrap();
        assert!(bpm.unpin_page(p0, false));

        let (p2, _) = bpm.new_page()?.unwrap();
        assert_ne!(p2, p0);

        // p1 was evicted (not p0) and wasn't dirty, but is still readable
        // straight back out of the store.
        assert_eq!(bpm.resident_count(), 2);
        assert!(bpm.fetch_page(p1)?.is_some());
        Ok(())
    }

    // Scenario 3: write-back on evict.
    #[test]
    fn write_back_on_evict() -> Result<()> {
        let bpm = pool(1, 16);

        let (p0, mut guard) = bpm.new_page()?.unwrap();
        guard.copy_from_slice(&[b'X'; 16]);
        drop(guard);
        assert!(bpm.unpin_page(p0, true));

        // evicts p0, writing "X" back first
        let (p1, _) = bpm.new_page()?.unwrap();
        assert!(bpm.unpin_page(p1, false));

        let guard = bpm.fetch_page(p0)?.expect("page still in store");
        assert_eq!(&guard[..], &[b'X'; 16]);
        Ok(())
    }

    // Scenario 4: pin prevents eviction.
    #[test]
    fn pin_prevents_eviction() -> Result<()> {
        let bpm = pool(2, 16);

        let (p0, _g0) = bpm.new_page()?.unwrap();
        let (p1, _g1) = bpm.new_page()?.unwrap();

        assert!(bpm.new_page()?.is_none());
        assert_eq!(bpm.resident_count(), 2);
        assert_eq!(bpm.pin_count(p0), Some(1));
        assert_eq!(bpm.pin_count(p1), Some(1));
        Ok(())
    }

    // Scenario 5: delete of a pinned page fails.
    #[test]
    fn delete_pinned_fails() -> Result<()> {
        let bpm = pool(1, 16);
        let (p0, _guard) = bpm.new_page()?.unwrap();

        assert!(!bpm.delete_page(p0)?);
        assert_eq!(bpm.pin_count(p0), Some(1));
        Ok(())
    }

    // Scenario 6: sticky dirty bit.
    #[test]
    fn sticky_dirty_survives_clean_unpin() -> Result<()> {
        let bpm = pool(1, 16);

        let (p0, guard) = bpm.new_page()?.unwrap();
        drop(guard);
        assert!(bpm.unpin_page(p0, true));

        bpm.fetch_page(p0)?.unwrap();
        assert!(bpm.unpin_page(p0, false));

        // dirty must have survived the clean unpin, so this still flushes.
        assert!(bpm.flush_page(p0)?);
        Ok(())
    }

    #[test]
    fn double_unpin_fails() -> Result<()> {
        let bpm = pool(1, 16);
        let (p0, _guard) = bpm.new_page()?.unwrap();

        assert!(bpm.unpin_page(p0, false));
        assert!(!bpm.unpin_page(p0, false));
        Ok(())
    }

    #[test]
    fn unpin_of_non_resident_page_fails() {
        let bpm = pool(1, 16);
        assert!(!bpm.unpin_page(42, false));
    }

    #[test]
    fn new_page_does_not_leak_id_when_pool_is_full() -> Result<()> {
        let bpm = pool(1, 16);
        let (_p0, _guard) = bpm.new_page()?.unwrap();

        assert!(bpm.new_page()?.is_none());
        // only the one page from the first call was ever allocated
        assert_eq!(bpm.resident_count(), 1);
        Ok(())
    }

    #[test]
    fn fetch_of_missing_page_does_not_disturb_resident_frames() -> Result<()> {
        let bpm = pool(1, 16);
        let (p0, guard) = bpm.new_page()?.unwrap();
        drop(guard);
        assert!(bpm.unpin_page(p0, false));

        // 9999 was never allocated by this store.
        assert!(bpm.fetch_page(9999)?.is_none());
        assert_eq!(bpm.resident_count(), 1);
        assert!(bpm.fetch_page(p0)?.is_some());
        Ok(())
    }

    #[test]
    fn flush_all_clears_every_dirty_bit() -> Result<()> {
        let bpm = pool(4, 16);
        let mut ids = Vec::new();
        for _ in 0..4 {
            let (id, mut guard) = bpm.new_page()?.unwrap();
            guard.copy_from_slice(&[1u8; 16]);
            drop(guard);
            assert!(bpm.unpin_page(id, true));
            ids.push(id);
        }

        bpm.flush_all()?;

        for id in ids {
            bpm.fetch_page(id)?.unwrap();
            assert!(bpm.unpin_page(id, false));
            // nothing left dirty to flush, but the page is still resident.
            assert!(bpm.flush_page(id)?);
        }
        Ok(())
    }

    /// Random operation sequences must never violate the cross-component
    /// invariants: free-list size plus replacer size plus pinned-frame
    /// count never exceeds the pool size, and the two evictable-candidate
    /// sets (free list, replacer) never overlap.
    #[test]
    fn random_ops_preserve_invariants() -> Result<()> {
        const POOL_SIZE: usize = 4;
        let bpm = pool(POOL_SIZE, 16);
        let mut rng = rand::thread_rng();
        let mut pinned: Vec<PageId> = Vec::new();

        for _ in 0..2000 {
            match rng.gen_range(0..3) {
                0 => {
                    if let Some((id, _guard)) = bpm.new_page()? {
                        pinned.push(id);
                    }
                }
                1 => {
                    if !pinned.is_empty() {
                        let id = pinned[rng.gen_range(0..pinned.len())];
                        if bpm.fetch_page(id)?.is_some() {
                            pinned.push(id);
                        }
                    }
                }
                _ => {
                    if !pinned.is_empty() {
                        let idx = rng.gen_range(0..pinned.len());
                        let id = pinned.remove(idx);
                        assert!(bpm.unpin_page(id, rng.gen()));
                    }
                }
            }

            assert!(bpm.free_count() + bpm.replacer_count() <= POOL_SIZE);
            assert!(bpm.resident_count() <= POOL_SIZE);
        }

        Ok(())
    }

    /// A second fetch of an already-pinned page must not hand out a second
    /// live `&mut` into the same buffer: it blocks on the frame's own lock
    /// until the first guard is dropped.
    #[test]
    fn concurrent_fetches_of_the_same_page_do_not_alias_the_buffer() -> Result<()> {
        use std::sync::mpsc;
        use std::thread;
        use std::time::Duration;

        let bpm = Arc::new(pool(1, 16));
        let (page_id, mut guard) = bpm.new_page()?.unwrap();
        guard.copy_from_slice(&[7u8; 16]);

        let (tx, rx) = mpsc::channel();
        let bpm2 = Arc::clone(&bpm);
        let handle = thread::spawn(move || {
            let _guard2 = bpm2.fetch_page(page_id).unwrap().unwrap();
            tx.send(()).unwrap();
        });

        // still blocked on our live write guard.
        assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());

        drop(guard);
        assert!(rx.recv_timeout(Duration::from_secs(1)).is_ok());
        handle.join().unwrap();
        Ok(())
    }

    /// `unpin_page` makes a frame evictable without requiring its
    /// `PageGuard` to have been dropped (the two are independent by
    /// design). A victim whose buffer lock is still held that way must be
    /// treated as busy and reported as "no frame available", never
    /// blocked on.
    #[test]
    fn victim_with_outstanding_guard_is_busy_not_blocked() -> Result<()> {
        let bpm = pool(1, 16);

        let (p0, guard) = bpm.new_page()?.unwrap();
        assert!(bpm.unpin_page(p0, false));
        // `guard` is still live: p0 is evictable but its buffer is locked.

        assert!(bpm.new_page()?.is_none());
        assert_eq!(bpm.resident_count(), 0);
        assert_eq!(bpm.free_count(), 1);
        assert_eq!(bpm.replacer_count(), 0);

        drop(guard);
        let (p1, _guard) = bpm.new_page()?.unwrap();
        assert_ne!(p0, p1);
        Ok(())
    }

    /// A store wrapper whose `write` fails on command, for exercising the
    /// eviction-rollback path (§7: "an eviction that fails mid-flush leaves
    /// the victim frame in its pre-flush state").
    struct FailingStore {
        inner: MemStore,
        fail_writes: std::sync::atomic::AtomicBool,
    }

    impl FailingStore {
        fn new(page_size: usize) -> Self {
            Self {
                inner: MemStore::new(page_size),
                fail_writes: std::sync::atomic::AtomicBool::new(false),
            }
        }

        fn fail_next_write(&self) {
            self.fail_writes.store(true, std::sync::atomic::Ordering::SeqCst);
        }
    }

    impl crate::store::PageStore for FailingStore {
        fn page_size(&self) -> usize {
            self.inner.page_size()
        }

        fn allocate(&self) -> Result<PageId, Error> {
            self.inner.allocate()
        }

        fn deallocate(&self, page_id: PageId) -> Result<(), Error> {
            self.inner.deallocate(page_id)
        }

        fn write(&self, page_id: PageId, data: &[u8]) -> Result<(), Error> {
            if self.fail_writes.swap(false, std::sync::atomic::Ordering::SeqCst) {
                return Err(Error::Io(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "injected write failure",
                )));
            }
            self.inner.write(page_id, data)
        }

        fn read(&self, page_id: PageId) -> Result<Vec<u8>, Error> {
            self.inner.read(page_id)
        }

        fn exists(&self, page_id: PageId) -> bool {
            self.inner.exists(page_id)
        }
    }

    /// When write-back fails mid-eviction, the victim frame must stay
    /// dirty and resident with its directory entry intact, and must be
    /// re-touched into the replacer rather than stranded outside both the
    /// free list and the replacer.
    #[test]
    fn failed_eviction_rolls_back_and_stays_evictable() -> Result<()> {
        let store = Arc::new(FailingStore::new(16));
        let bpm = BufferPoolManager::new(1, 16, store.clone()).unwrap();

        let (p0, mut guard) = bpm.new_page()?.unwrap();
        guard.copy_from_slice(&[b'X'; 16]);
        drop(guard);
        assert!(bpm.unpin_page(p0, true));

        store.fail_next_write();
        assert!(bpm.new_page().is_err());

        // p0 is still resident, still dirty, and evictable again.
        assert_eq!(bpm.resident_count(), 1);
        assert_eq!(bpm.replacer_count(), 1);

        // a second attempt succeeds now that the store is healthy again,
        // and writes "X" back before handing the frame to the new page.
        let (p1, _guard) = bpm.new_page()?.unwrap();
        assert_ne!(p0, p1);
        assert_eq!(store.read(p0).unwrap(), vec![b'X'; 16]);
        Ok(())
    }
}
