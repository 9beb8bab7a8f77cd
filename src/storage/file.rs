use crate::pages::PageId;
use crate::storage::{PageStore, StoreError};

use std::fs::{File, OpenOptions};
use std::os::unix::fs::FileExt;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};

/// Stores pages in a single file as a dense array of `page_size` slots.
///
/// The `FileStore` is responsible for reading from and writing to the backing
/// file with positional I/O, so concurrent page accesses never race on a
/// shared cursor.
pub struct FileStore {
    file: File,
    page_size: usize,
    next_page_id: AtomicU32,
}

impl FileStore {
    /// Creates a new, empty store file.
    ///
    /// Returns a `Result` containing the `FileStore` instance if successful,
    /// or a `StoreError` on failure.
    pub fn create<P: AsRef<Path>>(path: P, page_size: usize) -> Result<Self, StoreError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .map_err(StoreError::Io)?;

        Ok(Self {
            file,
            page_size,
            next_page_id: AtomicU32::new(0),
        })
    }

    /// Opens an existing store file.
    ///
    /// Returns a `Result` containing the `FileStore` instance if successful,
    /// or a `StoreError` on failure.
    pub fn open<P: AsRef<Path>>(path: P, page_size: usize) -> Result<Self, StoreError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(StoreError::Io)?;

        let len = file.metadata()?.len() as usize;
        if !len.is_multiple_of(page_size) {
            return Err(StoreError::Corrupted);
        }

        Ok(Self {
            file,
            page_size,
            next_page_id: AtomicU32::new((len / page_size) as u32),
        })
    }

    /// Appends a zeroed page and returns its id.
    pub fn allocate_page(&self) -> Result<PageId, StoreError> {
        let page_id = PageId::new(self.next_page_id.fetch_add(1, Ordering::Relaxed));
        let zeroes = vec![0u8; self.page_size];
        self.write_page(page_id, &zeroes)?;
        Ok(page_id)
    }

    /// Number of pages allocated so far.
    pub fn page_count(&self) -> u32 {
        self.next_page_id.load(Ordering::Relaxed)
    }

    /// Attempts to sync file data and metadata to the disk.
    ///
    /// # Panics
    ///
    /// Panics if the underlying `File::sync_all` operation fails.
    pub fn sync(&self) {
        let result = self.file.sync_all();
        if result.is_err() {
            // if fsync fails, we can't make sure data is flushed to disk
            // ref: https://wiki.postgresql.org/wiki/Fsync_Errors
            panic!("flush (fsync) failed");
        }
    }
}

impl PageStore for FileStore {
    fn read_page(&self, page_id: PageId, buf: &mut [u8]) -> Result<(), StoreError> {
        debug_assert_eq!(buf.len(), self.page_size);
        let offset = page_id.get() as u64 * self.page_size as u64;

        self.file.read_exact_at(buf, offset).map_err(StoreError::Io)
    }

    fn write_page(&self, page_id: PageId, buf: &[u8]) -> Result<(), StoreError> {
        debug_assert_eq!(buf.len(), self.page_size);
        let offset = page_id.get() as u64 * self.page_size as u64;

        self.file.write_all_at(buf, offset).map_err(StoreError::Io)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Write;

    use tempfile::TempDir;

    const PAGE_SIZE: usize = 4096;

    #[test]
    fn write_read_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::create(dir.path().join("pages.db"), PAGE_SIZE).unwrap();
        let page_id = store.allocate_page().unwrap();

        let mut bytes = vec![0u8; PAGE_SIZE];
        bytes[0] = 0xca;
        bytes[PAGE_SIZE - 1] = 0xfe;
        store.write_page(page_id, &bytes).unwrap();

        let mut read = vec![0u8; PAGE_SIZE];
        store.read_page(page_id, &mut read).unwrap();
        assert_eq!(bytes, read);
    }

    #[test]
    fn reopen_preserves_pages() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pages.db");

        let store = FileStore::create(&path, PAGE_SIZE).unwrap();
        for _ in 0..3 {
            store.allocate_page().unwrap();
        }
        let bytes = vec![7u8; PAGE_SIZE];
        store.write_page(PageId::new(2), &bytes).unwrap();
        store.sync();
        drop(store);

        let store = FileStore::open(&path, PAGE_SIZE).unwrap();
        assert_eq!(store.page_count(), 3);
        let mut read = vec![0u8; PAGE_SIZE];
        store.read_page(PageId::new(2), &mut read).unwrap();
        assert_eq!(bytes, read);
    }

    #[test]
    fn open_rejects_torn_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pages.db");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(&[0u8; PAGE_SIZE + 1]).unwrap();
        drop(file);

        assert!(matches!(
            FileStore::open(&path, PAGE_SIZE),
            Err(StoreError::Corrupted)
        ));
    }

    #[test]
    fn read_past_end_fails() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::create(dir.path().join("pages.db"), PAGE_SIZE).unwrap();

        let mut read = vec![0u8; PAGE_SIZE];
        assert!(matches!(
            store.read_page(PageId::new(7), &mut read),
            Err(StoreError::Io(_))
        ));
    }
}
