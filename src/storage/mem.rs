use crate::pages::PageId;
use crate::storage::{PageStore, StoreError};

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;

/// A volatile store keeping every page on the heap.
///
/// Pages must be allocated before they can be fetched through a pool;
/// reading an unallocated page fails with `StoreError::PageNotFound`.
pub struct MemStore {
    pages: Mutex<HashMap<PageId, Box<[u8]>>>,
    page_size: usize,
    next_page_id: AtomicU32,
}

impl MemStore {
    pub fn new(page_size: usize) -> Self {
        Self {
            pages: Mutex::new(HashMap::new()),
            page_size,
            next_page_id: AtomicU32::new(0),
        }
    }

    /// Registers a new zeroed page and returns its id.
    pub fn allocate_page(&self) -> PageId {
        let page_id = PageId::new(self.next_page_id.fetch_add(1, Ordering::Relaxed));
        self.pages
            .lock()
            .insert(page_id, vec![0u8; self.page_size].into_boxed_slice());
        page_id
    }

    pub fn contains(&self, page_id: PageId) -> bool {
        self.pages.lock().contains_key(&page_id)
    }

    pub fn page_count(&self) -> usize {
        self.pages.lock().len()
    }
}

impl PageStore for MemStore {
    fn read_page(&self, page_id: PageId, buf: &mut [u8]) -> Result<(), StoreError> {
        let pages = self.pages.lock();
        let page = pages.get(&page_id).ok_or(StoreError::PageNotFound)?;
        buf.copy_from_slice(page);
        Ok(())
    }

    fn write_page(&self, page_id: PageId, buf: &[u8]) -> Result<(), StoreError> {
        self.pages.lock().insert(page_id, Box::from(buf));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE_SIZE: usize = 128;

    #[test]
    fn allocate_then_read() {
        let store = MemStore::new(PAGE_SIZE);
        let page_id = store.allocate_page();
        assert!(store.contains(page_id));

        let mut buf = vec![0xffu8; PAGE_SIZE];
        store.read_page(page_id, &mut buf).unwrap();
        assert_eq!(buf, vec![0u8; PAGE_SIZE]);
    }

    #[test]
    fn read_unallocated_page_fails() {
        let store = MemStore::new(PAGE_SIZE);
        let mut buf = vec![0u8; PAGE_SIZE];
        assert!(matches!(
            store.read_page(PageId::new(3), &mut buf),
            Err(StoreError::PageNotFound)
        ));
    }

    #[test]
    fn write_overwrites_contents() {
        let store = MemStore::new(PAGE_SIZE);
        let page_id = store.allocate_page();

        let bytes = vec![9u8; PAGE_SIZE];
        store.write_page(page_id, &bytes).unwrap();

        let mut read = vec![0u8; PAGE_SIZE];
        store.read_page(page_id, &mut read).unwrap();
        assert_eq!(read, bytes);
        assert_eq!(store.page_count(), 1);
    }
}
