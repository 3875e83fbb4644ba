//! 调度器操作 trait 定义和注册
//!
//! 睡眠锁需要知道“当前是谁”以及“如何让出 CPU”，这两件事属于调度器，
//! 因此与 [`ArchOps`](crate::ArchOps) 分开注册。

use core::sync::atomic::{AtomicUsize, Ordering};

/// 调度器操作
///
/// 由内核实现并在启动时注册。
pub trait SchedOps: Send + Sync {
    /// 当前任务 ID
    ///
    /// 在任务的整个生命周期内保持不变，且不同任务互不相同。
    fn current_task_id(&self) -> usize;

    /// 主动让出 CPU，稍后被重新调度时返回
    fn yield_now(&self);
}

static SCHED_OPS_DATA: AtomicUsize = AtomicUsize::new(0);
static SCHED_OPS_VTABLE: AtomicUsize = AtomicUsize::new(0);

/// 注册调度器操作实现
///
/// # Safety
/// 必须在单线程环境下调用，且只能调用一次
pub unsafe fn register_sched_ops(ops: &'static dyn SchedOps) {
    let ptr = ops as *const dyn SchedOps;
    // SAFETY: 将 fat pointer 拆分为 data 和 vtable 两部分存储
    let (data, vtable) =
        unsafe { core::mem::transmute::<*const dyn SchedOps, (usize, usize)>(ptr) };
    SCHED_OPS_DATA.store(data, Ordering::Release);
    SCHED_OPS_VTABLE.store(vtable, Ordering::Release);
}

/// 获取已注册的调度器操作实现
///
/// # Panics
/// 如果尚未调用 [`register_sched_ops`]，则 panic
#[inline]
pub fn sched_ops() -> &'static dyn SchedOps {
    let data = SCHED_OPS_DATA.load(Ordering::Acquire);
    let vtable = SCHED_OPS_VTABLE.load(Ordering::Acquire);
    if data == 0 {
        panic!("sync: SchedOps not registered, call register_sched_ops first");
    }
    // SAFETY: 重组 fat pointer
    unsafe { &*core::mem::transmute::<(usize, usize), *const dyn SchedOps>((data, vtable)) }
}
