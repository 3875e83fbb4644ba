//! 缓冲区缓存的配置

use crate::error::CacheError;

/// 块大小（字节）
pub const BSIZE: usize = 1024;

/// 缓冲块个数
pub const NBUF: usize = 30;

/// 哈希桶个数
pub const NBUCKET: usize = 13;

/// 缓存池的几何参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    /// 缓冲块个数
    pub nbuf: usize,
    /// 哈希桶个数
    pub nbucket: usize,
}

impl CacheConfig {
    /// 检查参数是否可用
    pub fn validate(&self) -> Result<(), CacheError> {
        if self.nbuf == 0 || self.nbucket == 0 {
            return Err(CacheError::InvalidConfig);
        }
        Ok(())
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            nbuf: NBUF,
            nbucket: NBUCKET,
        }
    }
}
