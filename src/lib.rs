//! A fixed-capacity buffer pool for page-oriented storage engines.
//!
//! Pages are fetched by id and returned as pinned handles; misses are served
//! from a [`PageStore`] backend, with least-recently-released eviction once
//! all frames are occupied.

pub mod cache;
pub mod config;
pub mod pages;
pub mod storage;

pub use cache::{BufferPool, FrameId, Lru, PageRef, PageRefMut, PoolError, PoolStats};
pub use config::{ConfigError, PoolConfig};
pub use pages::PageId;
pub use storage::{FileStore, MemStore, PageStore, StoreError};
