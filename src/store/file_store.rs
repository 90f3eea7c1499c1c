use std::fs::OpenOptions;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;

use super::{PageId, PageStore, INVALID_PAGE};
use crate::errors::Error;
use crate::printdbg;

const COUNTER_FILE: &str = "_next_page_id";

/// A page-per-file store: every page is its own fixed-size file under
/// `path`, named after its [`PageId`]. The next id to hand out on
/// [`PageStore::allocate`] is persisted in a small counter file so it
/// survives across `FileStore` instances pointed at the same directory.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    page_size: usize,
    next_id: AtomicI64,
    // Serializes the read-modify-write of the persisted counter; page reads
    // and writes themselves are independent files and need no lock here.
    counter_lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl AsRef<Path>, page_size: usize) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();
        std::fs::create_dir_all(&path)?;

        let next_id = Self::read_counter(&path)?;

        Ok(Self {
            path,
            page_size,
            next_id: AtomicI64::new(next_id),
            counter_lock: Mutex::new(()),
        })
    }

    fn counter_path(path: &Path) -> PathBuf {
        path.join(COUNTER_FILE)
    }

    fn read_counter(path: &Path) -> Result<PageId, Error> {
        let counter_path = Self::counter_path(path);
        match OpenOptions::new().read(true).open(&counter_path) {
            Ok(mut file) => {
                let mut buf = [0u8; 8];
                file.read_exact(&mut buf)?;
                Ok(PageId::from_le_bytes(buf))
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(0),
            Err(err) => Err(err.into()),
        }
    }

    fn persist_counter(&self, id: PageId) -> Result<(), Error> {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(Self::counter_path(&self.path))?;
        file.write_all(&id.to_le_bytes())?;
        Ok(())
    }

    fn page_path(&self, page_id: PageId) -> PathBuf {
        self.path.join(page_id.to_string())
    }
}

impl PageStore for FileStore {
    fn page_size(&self) -> usize {
        self.page_size
    }

    fn allocate(&self) -> Result<PageId, Error> {
        let _guard = self.counter_lock.lock().unwrap();

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.persist_counter(id + 1)?;

        let zeroed = vec![0u8; self.page_size];
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(self.page_path(id))?;
        file.write_all(&zeroed)?;

        printdbg!("FileStore: allocated page {}", id);
        Ok(id)
    }

    fn deallocate(&self, page_id: PageId) -> Result<(), Error> {
        if page_id == INVALID_PAGE {
            return Err(Error::NotFound(page_id));
        }
        match std::fs::remove_file(self.page_path(page_id)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Err(Error::NotFound(page_id)),
            Err(err) => Err(err.into()),
        }
    }

    fn write(&self, page_id: PageId, data: &[u8]) -> Result<(), Error> {
        if data.len() != self.page_size {
            return Err(Error::BadSize {
                expected: self.page_size,
                got: data.len(),
            });
        }

        let mut file = OpenOptions::new()
            .write(true)
            .open(self.page_path(page_id))
            .map_err(|err| {
                if err.kind() == std::io::ErrorKind::NotFound {
                    Error::NotFound(page_id)
                } else {
                    err.into()
                }
            })?;
        file.write_all(data)?;
        Ok(())
    }

    fn read(&self, page_id: PageId) -> Result<Vec<u8>, Error> {
        let mut file = OpenOptions::new()
            .read(true)
            .open(self.page_path(page_id))
            .map_err(|err| {
                if err.kind() == std::io::ErrorKind::NotFound {
                    Error::NotFound(page_id)
                } else {
                    err.into()
                }
            })?;

        let mut buf = vec![0u8; self.page_size];
        file.read_exact(&mut buf)?;
        Ok(buf)
    }

    fn exists(&self, page_id: PageId) -> bool {
        page_id != INVALID_PAGE && self.page_path(page_id).exists()
    }
}
