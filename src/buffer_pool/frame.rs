use std::sync::Arc;

use parking_lot::RwLock;

use crate::store::{PageId, INVALID_PAGE};

/// One slot of the pool. Frames are created once at pool construction and
/// destroyed only when the pool is. The data buffer lives behind its own
/// `RwLock` so a [`super::PageGuard`] can hand out real exclusive access to
/// it without holding the pool's own lock — pin count can legitimately
/// exceed one for the same page (clients pinning together "coordinate among
/// themselves", per the manager's docs), and a second concurrent guard on
/// the same frame blocks on this lock rather than aliasing the buffer.
pub(super) struct Frame {
    page_id: PageId,
    pin_count: u32,
    dirty: bool,
    page_size: usize,
    data: Arc<RwLock<Box<[u8]>>>,
}

impl Frame {
    pub fn new(page_size: usize) -> Self {
        Self {
            page_id: INVALID_PAGE,
            pin_count: 0,
            dirty: false,
            page_size,
            data: Arc::new(RwLock::new(vec![0u8; page_size].into_boxed_slice())),
        }
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn pin_count(&self) -> u32 {
        self.pin_count
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn is_resident(&self) -> bool {
        self.page_id != INVALID_PAGE
    }

    pub fn pin(&mut self) {
        self.pin_count += 1;
    }

    /// Decrements the pin count. Caller must have already checked
    /// `pin_count() > 0`.
    pub fn unpin(&mut self) {
        debug_assert!(self.pin_count > 0);
        self.pin_count -= 1;
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }

    /// A snapshot copy of the frame's current content, for the store
    /// write-back path, or `None` if the buffer lock is currently held by
    /// an outstanding [`PageGuard`](super::PageGuard) — `unpin_page` and
    /// the guard are independent by design, so a pin count of zero never
    /// guarantees the lock is free. Non-blocking: the caller (under the
    /// pool's own lock) must not stall on a client-held buffer lock.
    pub fn try_read_data(&self) -> Option<Vec<u8>> {
        self.data.try_read().map(|buf| buf.to_vec())
    }

    /// Hands out another owner of this frame's buffer lock, for building a
    /// [`PageGuard`](super::PageGuard). Acquiring the write lock on it is
    /// the caller's job, done without holding the pool's own lock.
    pub fn data_handle(&self) -> Arc<RwLock<Box<[u8]>>> {
        Arc::clone(&self.data)
    }

    pub fn len(&self) -> usize {
        self.page_size
    }

    /// Binds this frame to a freshly-fetched or freshly-allocated page:
    /// copies `contents` into the data buffer, sets the page id, pins it
    /// once, and marks it clean. Returns `false` without touching any
    /// metadata if the buffer lock is still held by an outstanding
    /// `PageGuard` from a previous occupant (possible if a client kept a
    /// guard past `unpin_page`/`delete_page`); non-blocking for the same
    /// reason as [`Self::try_read_data`].
    pub fn try_bind(&mut self, page_id: PageId, contents: &[u8]) -> bool {
        {
            let mut buf = match self.data.try_write() {
                Some(buf) => buf,
                None => return false,
            };
            debug_assert_eq!(contents.len(), buf.len());
            buf.copy_from_slice(contents);
        }
        self.page_id = page_id;
        self.pin_count = 1;
        self.dirty = false;
        true
    }

    /// Resets the frame to the unset state: `pageId = unset`, `pinCount =
    /// 0`, `dirty = false`. The data buffer itself is left as-is (its
    /// content is conceptually undefined once unset).
    pub fn clear(&mut self) {
        self.page_id = INVALID_PAGE;
        self.pin_count = 0;
        self.dirty = false;
    }
}
