//! 缓冲区缓存错误类型
//!
//! 不变式被破坏时缓存直接 panic；这里只列出调用者可以处理的情况。

use core::fmt;

/// 缓存操作的可恢复错误
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheError {
    /// 所有缓冲块都被引用，没有可回收的块 (-ENOBUFS)
    NoBuffers,
    /// 缓冲块数或哈希桶数为零 (-EINVAL)
    InvalidConfig,
}

impl CacheError {
    /// 转换为系统调用错误码（负数）
    pub fn to_errno(&self) -> isize {
        match self {
            CacheError::NoBuffers => -105,
            CacheError::InvalidConfig => -22,
        }
    }
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheError::NoBuffers => write!(f, "no buffers"),
            CacheError::InvalidConfig => write!(f, "invalid cache config"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    #[test]
    fn test_errno_and_display() {
        assert_eq!(CacheError::NoBuffers.to_errno(), -105);
        assert_eq!(CacheError::InvalidConfig.to_errno(), -22);
        assert_eq!(CacheError::NoBuffers.to_string(), "no buffers");
        assert_eq!(CacheError::InvalidConfig.to_string(), "invalid cache config");
    }
}
