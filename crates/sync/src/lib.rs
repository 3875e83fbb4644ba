//! 同步原语
//!
//! 向缓存层与物理页分配器提供两类锁：
//!
//! - **短锁**：[`SpinLock`]（基于 [`RawSpinLock`]），忙等待，持有期间禁用本地中断，
//!   只用于链表与元数据的短临界区，绝不跨越设备 I/O；
//! - **长锁**：[`SleepLock`]，获取失败时通过 [`SchedOps::yield_now`] 让出 CPU，
//!   并记录持有者任务 ID，供 [`SleepLock::holding`] 查询。
//!
//! 另外提供 [`IntrGuard`] 与 [`PreemptGuard`] 两个 RAII 保护器。
//!
//! # 架构依赖
//!
//! 此 crate 通过 `ArchOps` 与 `SchedOps` 两个 trait 抽象架构与调度器相关操作。
//! 使用前必须调用 [`register_arch_ops`] 与 [`register_sched_ops`] 注册实现。

#![no_std]

mod intr_guard;
mod preempt;
mod raw_spin_lock;
mod sched_ops;
mod sleep_lock;
mod spin_lock;

pub use intr_guard::*;
pub use preempt::PreemptGuard;
pub use raw_spin_lock::*;
pub use sched_ops::{SchedOps, register_sched_ops, sched_ops};
pub use sleep_lock::*;
pub use spin_lock::*;

use core::sync::atomic::{AtomicUsize, Ordering};

/// 架构相关操作的 trait
///
/// 由内核实现并注册，提供中断控制和 CPU 信息
pub trait ArchOps: Send + Sync {
    /// 读取并禁用中断，返回之前的状态
    ///
    /// # Safety
    /// 调用者必须确保在适当的上下文中调用
    unsafe fn read_and_disable_interrupts(&self) -> usize;

    /// 恢复中断状态
    ///
    /// # Safety
    /// flags 必须是之前 read_and_disable_interrupts 返回的值
    unsafe fn restore_interrupts(&self, flags: usize);

    /// 获取中断使能位
    fn sstatus_sie(&self) -> usize;

    /// 获取当前 CPU ID
    fn cpu_id(&self) -> usize;

    /// 获取最大 CPU 数量
    fn max_cpu_count(&self) -> usize;
}

/// 全局架构操作实例（存储 fat pointer 的两个部分）
static ARCH_OPS_DATA: AtomicUsize = AtomicUsize::new(0);
static ARCH_OPS_VTABLE: AtomicUsize = AtomicUsize::new(0);

/// 注册架构操作实现
///
/// # Safety
/// 必须在单线程环境下调用，且只能调用一次
pub unsafe fn register_arch_ops(ops: &'static dyn ArchOps) {
    let ptr = ops as *const dyn ArchOps;
    // SAFETY: fat pointer 的布局是 (data, vtable)
    let (data, vtable) = unsafe { core::mem::transmute::<*const dyn ArchOps, (usize, usize)>(ptr) };
    ARCH_OPS_DATA.store(data, Ordering::Release);
    ARCH_OPS_VTABLE.store(vtable, Ordering::Release);
}

/// 获取架构操作实例
///
/// # Panics
/// 如果尚未调用 [`register_arch_ops`]，则 panic
#[inline]
pub fn arch_ops() -> &'static dyn ArchOps {
    let data = ARCH_OPS_DATA.load(Ordering::Acquire);
    let vtable = ARCH_OPS_VTABLE.load(Ordering::Acquire);
    if data == 0 {
        panic!("sync: ArchOps not registered, call register_arch_ops first");
    }
    // SAFETY: data 和 vtable 是通过 register_arch_ops 设置的有效指针
    unsafe { &*core::mem::transmute::<(usize, usize), *const dyn ArchOps>((data, vtable)) }
}

/// 当前 CPU ID 的快捷方式
///
/// 结果只有在禁用抢占（见 [`PreemptGuard`]）期间才保持稳定。
#[inline]
pub fn cpu_id() -> usize {
    arch_ops().cpu_id()
}

#[cfg(test)]
pub(crate) mod test_env {
    //! 单元测试共用的 mock 注册

    use super::{ArchOps, SchedOps};
    use core::sync::atomic::{AtomicUsize, Ordering};
    use test_support::mock::arch::MOCK_ARCH_OPS;
    use test_support::mock::sched::MOCK_SCHED_OPS;

    struct TestArch;

    impl ArchOps for TestArch {
        unsafe fn read_and_disable_interrupts(&self) -> usize {
            MOCK_ARCH_OPS.read_and_disable_interrupts()
        }

        unsafe fn restore_interrupts(&self, flags: usize) {
            MOCK_ARCH_OPS.restore_interrupts(flags)
        }

        fn sstatus_sie(&self) -> usize {
            MOCK_ARCH_OPS.sstatus_sie()
        }

        fn cpu_id(&self) -> usize {
            MOCK_ARCH_OPS.cpu_id()
        }

        fn max_cpu_count(&self) -> usize {
            MOCK_ARCH_OPS.max_cpu_count()
        }
    }

    struct TestSched;

    impl SchedOps for TestSched {
        fn current_task_id(&self) -> usize {
            MOCK_SCHED_OPS.current_task_id()
        }

        fn yield_now(&self) {
            MOCK_SCHED_OPS.yield_now()
        }
    }

    static TEST_ARCH: TestArch = TestArch;
    static TEST_SCHED: TestSched = TestSched;
    // 0 = uninit, 1 = initializing, 2 = ready
    static INIT: AtomicUsize = AtomicUsize::new(0);

    pub(crate) fn init() {
        match INIT.compare_exchange(0, 1, Ordering::AcqRel, Ordering::Acquire) {
            Ok(_) => {
                // SAFETY: 测试进程内只注册一次
                unsafe {
                    super::register_arch_ops(&TEST_ARCH);
                    super::register_sched_ops(&TEST_SCHED);
                }
                INIT.store(2, Ordering::Release);
            }
            Err(_) => {
                while INIT.load(Ordering::Acquire) != 2 {
                    core::hint::spin_loop();
                }
            }
        }
    }
}
