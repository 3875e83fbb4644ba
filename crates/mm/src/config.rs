//! 物理页分配器的配置常量

/// 页大小（字节）
pub const PAGE_SIZE: usize = 4096;

/// 释放时写入整页的垃圾字节，用于暴露释放后使用
pub const JUNK_FREE: u8 = 0x01;

/// 分配时写入整页的垃圾字节，用于暴露未初始化读取
pub const JUNK_ALLOC: u8 = 0x05;

/// 内核支持的最大 CPU 数
pub const NCPU: usize = 8;

/// 将地址向上取整到页边界
#[inline]
pub const fn page_round_up(addr: usize) -> usize {
    (addr + PAGE_SIZE - 1) & !(PAGE_SIZE - 1)
}

/// 将地址向下取整到页边界
#[inline]
pub const fn page_round_down(addr: usize) -> usize {
    addr & !(PAGE_SIZE - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_rounding() {
        assert_eq!(page_round_up(0), 0);
        assert_eq!(page_round_up(1), PAGE_SIZE);
        assert_eq!(page_round_up(PAGE_SIZE), PAGE_SIZE);
        assert_eq!(page_round_down(PAGE_SIZE + 17), PAGE_SIZE);
        assert_eq!(page_round_down(PAGE_SIZE - 1), 0);
    }
}
