//! 睡眠锁
//!
//! 提供基于“让出 CPU”的阻塞式互斥锁，适用于可能长时间持有的锁，
//! 例如跨越一次磁盘读写的缓冲块内容锁。
//!
//! 当锁被占用时，尝试获取锁的任务会通过 [`SchedOps::yield_now`](crate::SchedOps::yield_now)
//! 让出 CPU，被重新调度后再次尝试，避免在禁用中断的状态下忙等待。
//! 锁同时记录持有者的任务 ID，供 [`SleepLock::holding`] 检查调用者是否持有该锁。

use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use lock_api::{GuardNoSend, RawMutex};

use crate::sched_ops::sched_ops;

const NO_HOLDER: usize = usize::MAX;

/// 睡眠锁的底层实现，实现 [`lock_api::RawMutex`]。
#[derive(Debug)]
pub struct RawSleepLock {
    locked: AtomicBool,
    holder: AtomicUsize,
}

impl RawSleepLock {
    /// 创建一个未上锁的睡眠锁
    pub const fn new() -> Self {
        Self {
            locked: AtomicBool::new(false),
            holder: AtomicUsize::new(NO_HOLDER),
        }
    }

    /// 当前任务是否持有该锁
    pub fn holding(&self) -> bool {
        self.locked.load(Ordering::Acquire)
            && self.holder.load(Ordering::Relaxed) == sched_ops().current_task_id()
    }
}

impl Default for RawSleepLock {
    fn default() -> Self {
        Self::new()
    }
}

unsafe impl RawMutex for RawSleepLock {
    #[allow(clippy::declare_interior_mutable_const)]
    const INIT: Self = Self::new();

    // 持有者记录的是任务 ID，守卫不能被转交给其他任务
    type GuardMarker = GuardNoSend;

    fn lock(&self) {
        while !self.try_lock() {
            sched_ops().yield_now();
        }
    }

    fn try_lock(&self) -> bool {
        if self
            .locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
        {
            self.holder
                .store(sched_ops().current_task_id(), Ordering::Relaxed);
            true
        } else {
            false
        }
    }

    unsafe fn unlock(&self) {
        self.holder.store(NO_HOLDER, Ordering::Relaxed);
        self.locked.store(false, Ordering::Release);
    }

    fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Relaxed)
    }
}

/// 睡眠锁守卫，离开作用域时释放锁
pub type SleepLockGuard<'a, T> = lock_api::MutexGuard<'a, RawSleepLock, T>;

/// 睡眠锁，提供阻塞式同步机制
///
/// # 示例
/// ```ignore
/// let lock = SleepLock::new([0u8; 1024], "buffer");
/// let mut data = lock.lock(); // 可能让出 CPU
/// data[0] = 1;
/// assert!(lock.holding());
/// ```
pub struct SleepLock<T> {
    name: &'static str,
    inner: lock_api::Mutex<RawSleepLock, T>,
}

impl<T> SleepLock<T> {
    /// 创建一个新的睡眠锁实例
    pub const fn new(data: T, name: &'static str) -> Self {
        Self {
            name,
            inner: lock_api::Mutex::const_new(RawSleepLock::new(), data),
        }
    }

    /// 获取睡眠锁（可能让出 CPU）
    ///
    /// # Panics
    /// 当前任务已经持有该锁时 panic（重入必然死锁）。
    pub fn lock(&self) -> SleepLockGuard<'_, T> {
        if self.holding() {
            panic!("sleeplock {}: acquire while holding", self.name);
        }
        self.inner.lock()
    }

    /// 尝试获取睡眠锁，不让出 CPU
    pub fn try_lock(&self) -> Option<SleepLockGuard<'_, T>> {
        self.inner.try_lock()
    }

    /// 当前任务是否持有该锁
    pub fn holding(&self) -> bool {
        // SAFETY: 只读取持有者信息，不会绕过守卫解锁
        unsafe { self.inner.raw() }.holding()
    }

    /// 锁是否被任意任务持有
    pub fn is_locked(&self) -> bool {
        self.inner.is_locked()
    }

    /// 锁的名字
    pub fn name(&self) -> &'static str {
        self.name
    }
}
