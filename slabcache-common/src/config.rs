//! Engine configuration (spec §6.2).
//!
//! Kept in the common crate so the server, the benchmark harness, and the
//! engine's own tests all validate against the same rules instead of
//! re-deriving "is this a power of two" in three places.

/// Default arena size: 64 MiB, matching the reference server's default.
pub const DEFAULT_MEMORY_LIMIT: u64 = 64 * 1024 * 1024;

/// Default page size: 1 MiB.
pub const DEFAULT_PAGE_SIZE: u32 = 1024 * 1024;

/// Default initial hash-table capacity.
pub const DEFAULT_INITIAL_DICT_SIZE: usize = 65536;

/// Engine construction parameters.
///
/// All size fields are validated together by [`EngineConfig::validate`]
/// before the engine allocates its arena; cachelot's own constructor
/// rejects the same combinations (see `Cache::Create` in the reference
/// implementation this core is modeled on).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Total arena size in bytes. Must be a power of two and a multiple
    /// of `page_size`.
    pub memory_limit: u64,
    /// Page size in bytes; the unit of LRU accounting and eviction. Must
    /// be a power of two no larger than 2 GiB.
    pub page_size: u32,
    /// Initial hash index capacity. Must be a power of two.
    pub initial_dict_size: usize,
    /// If false, allocation failures are returned as `OutOfMemory` rather
    /// than satisfied by evicting a page.
    pub enable_evictions: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            memory_limit: DEFAULT_MEMORY_LIMIT,
            page_size: DEFAULT_PAGE_SIZE,
            initial_dict_size: DEFAULT_INITIAL_DICT_SIZE,
            enable_evictions: true,
        }
    }
}

/// Reason an [`EngineConfig`] failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("memory_limit must be a power of two")]
    MemoryLimitNotPow2,
    #[error("page_size must be a power of two")]
    PageSizeNotPow2,
    #[error("page_size must not exceed 2 GiB")]
    PageSizeTooLarge,
    #[error("memory_limit must be at least 4 pages")]
    MemoryLimitTooSmall,
    #[error("memory_limit must be an exact multiple of page_size")]
    MemoryLimitNotMultipleOfPageSize,
    #[error("initial_dict_size must be a power of two")]
    InitialDictSizeNotPow2,
    #[error("initial_dict_size must be non-zero")]
    InitialDictSizeZero,
}

const MAX_PAGE_SIZE: u32 = 2 * 1024 * 1024 * 1024 - 1; // < 2 GiB, u32 domain anyway

impl EngineConfig {
    /// Validates the combination of fields, matching the invariants in
    /// spec §3.3 and §6.2.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.memory_limit.is_power_of_two() {
            return Err(ConfigError::MemoryLimitNotPow2);
        }
        if !self.page_size.is_power_of_two() {
            return Err(ConfigError::PageSizeNotPow2);
        }
        if self.page_size as u64 > MAX_PAGE_SIZE as u64 {
            return Err(ConfigError::PageSizeTooLarge);
        }
        if self.memory_limit < 4 * self.page_size as u64 {
            return Err(ConfigError::MemoryLimitTooSmall);
        }
        if self.memory_limit % self.page_size as u64 != 0 {
            return Err(ConfigError::MemoryLimitNotMultipleOfPageSize);
        }
        if self.initial_dict_size == 0 {
            return Err(ConfigError::InitialDictSizeZero);
        }
        if !self.initial_dict_size.is_power_of_two() {
            return Err(ConfigError::InitialDictSizeNotPow2);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_non_pow2_memory_limit() {
        let cfg = EngineConfig {
            memory_limit: 100,
            ..EngineConfig::default()
        };
        assert_eq!(cfg.validate(), Err(ConfigError::MemoryLimitNotPow2));
    }

    #[test]
    fn rejects_memory_limit_not_multiple_of_page_size() {
        let cfg = EngineConfig {
            memory_limit: 1024 * 1024 * 3,
            page_size: 1024 * 1024 * 2,
            ..EngineConfig::default()
        };
        // 3*1M is not a power of two, so check the multiple rule directly
        // with a config that *is* pow2 but not a multiple.
        assert!(cfg.validate().is_err());

        let cfg2 = EngineConfig {
            memory_limit: 8 * 1024 * 1024,
            page_size: 3 * 1024 * 1024,
            ..EngineConfig::default()
        };
        assert!(cfg2.validate().is_err());
    }

    #[test]
    fn rejects_too_small_memory_limit() {
        let cfg = EngineConfig {
            memory_limit: 2 * 1024 * 1024,
            page_size: 1024 * 1024,
            ..EngineConfig::default()
        };
        assert_eq!(cfg.validate(), Err(ConfigError::MemoryLimitTooSmall));
    }
}
