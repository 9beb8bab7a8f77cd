use thiserror::Error;

/// Default page size in bytes.
pub const DEFAULT_PAGE_SIZE: usize = 4096;
/// Default number of frames in a pool.
pub const DEFAULT_NPAGE: usize = 1024;

/// Largest accepted page size (16 MiB).
pub const MAX_PAGE_SIZE: usize = 1 << 24;
/// Largest accepted frame count.
pub const MAX_NPAGE: usize = 1 << 22;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid page size: {0}")]
    PageSize(usize),
    #[error("invalid page count: {0}")]
    PageCount(usize),
    #[error("frame arena too large")]
    TooLarge,
}

/// Pool construction parameters, fixed for the pool's lifetime.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PoolConfig {
    /// Size of a page (and of a frame) in bytes.
    pub page_size: usize,
    /// Number of frames in the pool.
    pub npage: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            npage: DEFAULT_NPAGE,
        }
    }
}

impl PoolConfig {
    pub fn new(page_size: usize, npage: usize) -> Self {
        Self { page_size, npage }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.page_size == 0 || self.page_size > MAX_PAGE_SIZE {
            return Err(ConfigError::PageSize(self.page_size));
        }
        if self.npage == 0 || self.npage > MAX_NPAGE {
            return Err(ConfigError::PageCount(self.npage));
        }
        if self.page_size.checked_mul(self.npage).is_none() {
            return Err(ConfigError::TooLarge);
        }
        Ok(())
    }

    /// Total size of the frame arena in bytes.
    pub fn arena_len(&self) -> usize {
        self.page_size * self.npage
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert_eq!(PoolConfig::default().validate(), Ok(()));
    }

    #[test]
    fn rejects_zero_and_oversized_values() {
        assert_eq!(
            PoolConfig::new(0, 8).validate(),
            Err(ConfigError::PageSize(0))
        );
        assert_eq!(
            PoolConfig::new(MAX_PAGE_SIZE + 1, 8).validate(),
            Err(ConfigError::PageSize(MAX_PAGE_SIZE + 1))
        );
        assert_eq!(
            PoolConfig::new(4096, 0).validate(),
            Err(ConfigError::PageCount(0))
        );
        assert_eq!(
            PoolConfig::new(4096, MAX_NPAGE + 1).validate(),
            Err(ConfigError::PageCount(MAX_NPAGE + 1))
        );
    }
}
