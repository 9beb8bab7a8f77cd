use crate::pages::PageId;

use std::sync::Arc;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("io error")]
    Io(#[from] std::io::Error),
    #[error("file corrupted")]
    Corrupted,
    #[error("page not found")]
    PageNotFound,
}

/// A backing store that can materialize and persist pages by id.
///
/// Buffers passed to both operations are exactly one page long.
pub trait PageStore: Send + Sync {
    fn read_page(&self, page_id: PageId, buf: &mut [u8]) -> Result<(), StoreError>;
    fn write_page(&self, page_id: PageId, buf: &[u8]) -> Result<(), StoreError>;
}

impl<S: PageStore + ?Sized> PageStore for Arc<S> {
    fn read_page(&self, page_id: PageId, buf: &mut [u8]) -> Result<(), StoreError> {
        (**self).read_page(page_id, buf)
    }

    fn write_page(&self, page_id: PageId, buf: &[u8]) -> Result<(), StoreError> {
        (**self).write_page(page_id, buf)
    }
}
