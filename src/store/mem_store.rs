use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;

use super::{PageId, PageStore, INVALID_PAGE};
use crate::errors::Error;

/// An in-memory [`PageStore`], used by the buffer pool manager's test suite
/// so property tests don't depend on the filesystem. Shares the exact
/// narrow contract [`FileStore`](super::FileStore) does, so the buffer pool
/// manager's logic cannot tell the two apart.
#[derive(Debug, Default)]
pub struct MemStore {
    page_size: usize,
    next_id: AtomicI64,
    pages: Mutex<HashMap<PageId, Vec<u8>>>,
}

impl MemStore {
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size,
            next_id: AtomicI64::new(0),
            pages: Mutex::new(HashMap::new()),
        }
    }
}

impl PageStore for MemStore {
    fn page_size(&self) -> usize {
        self.page_size
    }

    fn allocate(&self) -> Result<PageId, Error> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.pages
            .lock()
            .unwrap()
            .insert(id, vec![0u8; self.page_size]);
        Ok(id)
    }

    fn deallocate(&self, page_id: PageId) -> Result<(), Error> {
        match self.pages.lock().unwrap().remove(&page_id) {
            Some(_) => Ok(()),
            None => Err(Error::NotFound(page_id)),
        }
    }

    fn write(&self, page_id: PageId, data: &[u8]) -> Result<(), Error> {
        if data.len() != self.page_size {
            return Err(Error::BadSize {
                expected: self.page_size,
                got: data.len(),
            });
        }

        let mut pages = self.pages.lock().unwrap();
        match pages.get_mut(&page_id) {
            Some(slot) => {
                slot.copy_from_slice(data);
                Ok(())
            }
            None => Err(Error::NotFound(page_id)),
        }
    }

    fn read(&self, page_id: PageId) -> Result<Vec<u8>, Error> {
        self.pages
            .lock()
            .unwrap()
            .get(&page_id)
            .cloned()
            .ok_or(Error::NotFound(page_id))
    }

    fn exists(&self, page_id: PageId) -> bool {
        page_id != INVALID_PAGE && self.pages.lock().unwrap().contains_key(&page_id)
    }
}
