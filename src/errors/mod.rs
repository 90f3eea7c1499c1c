use crate::store::PageId;

/// Errors surfaced at the store boundary and the buffer pool manager's
/// construction boundary. Operations that can fail for more than one reason
/// return `anyhow::Result<_>` and wrap one of these; operations with exactly
/// one recoverable outcome return a plain `bool`/`Option` instead, per the
/// buffer pool manager's public contract.
#[derive(Debug)]
pub enum Error {
    /// Invalid arguments passed to `BufferPoolManager::new`.
    BadConfig(String),
    /// The requested page was never allocated, or has been deallocated.
    NotFound(PageId),
    /// A `write` was given a buffer whose length didn't match the page size.
    BadSize { expected: usize, got: usize },
    /// Any I/O failure surfaced by a store backend.
    Io(std::io::Error),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::BadConfig(context) => write!(f, "Invalid buffer pool configuration: {context}."),
            Error::NotFound(page_id) => write!(f, "Page {page_id} does not exist in the store."),
            Error::BadSize { expected, got } => {
                write!(f, "Expected a buffer of {expected} bytes, got {got}.")
            }
            Error::Io(err) => write!(f, "Store I/O error: {err}."),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}
