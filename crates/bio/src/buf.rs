//! 缓冲块句柄

use core::mem::ManuallyDrop;

use sync::SleepLockGuard;

use crate::cache::{BufData, BufferCache};

/// 一个已加锁、已引用的缓冲块。
///
/// 持有期间独占块内容；离开作用域时等价于 [`BufferCache::brelse`]：
/// 先释放内容锁，再在所属桶中归还引用。
pub struct Buf<'a> {
    pub(crate) cache: &'a BufferCache,
    pub(crate) index: usize,
    pub(crate) dev: u32,
    pub(crate) blockno: u32,
    pub(crate) guard: ManuallyDrop<SleepLockGuard<'a, BufData>>,
}

impl Buf<'_> {
    /// 设备号
    pub fn dev(&self) -> u32 {
        self.dev
    }

    /// 块号
    pub fn blockno(&self) -> u32 {
        self.blockno
    }

    /// 块内容
    pub fn data(&self) -> &BufData {
        &self.guard
    }

    /// 可写的块内容，修改后需 [`BufferCache::bwrite`] 才会落盘
    pub fn data_mut(&mut self) -> &mut BufData {
        &mut self.guard
    }

    /// 块内容是否与设备一致（读入过或写出过）
    pub fn is_valid(&self) -> bool {
        self.cache.slot_valid(self.index)
    }
}

impl core::fmt::Debug for Buf<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Buf")
            .field("dev", &self.dev)
            .field("blockno", &self.blockno)
            .field("slot", &self.index)
            .finish()
    }
}

impl Drop for Buf<'_> {
    fn drop(&mut self) {
        // SAFETY: guard 只在这里释放一次，之后不再访问
        unsafe { ManuallyDrop::drop(&mut self.guard) };
        self.cache.release(self.index, self.dev, self.blockno);
    }
}
