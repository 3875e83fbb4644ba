//! 调度器相关操作的 Mock 实现
//!
//! 每个宿主线程是一个任务，任务 ID 在线程第一次查询时分配，从 1 开始递增。

use std::cell::Cell;
use std::sync::atomic::{AtomicUsize, Ordering};

static NEXT_TID: AtomicUsize = AtomicUsize::new(1);

thread_local! {
    static TID: Cell<usize> = const { Cell::new(0) };
}

/// Mock 调度器操作
pub struct MockSchedOps {
    pub yields: AtomicUsize,
}

impl MockSchedOps {
    pub const fn new() -> Self {
        Self {
            yields: AtomicUsize::new(0),
        }
    }

    pub fn current_task_id(&self) -> usize {
        TID.with(|t| {
            if t.get() == 0 {
                t.set(NEXT_TID.fetch_add(1, Ordering::Relaxed));
            }
            t.get()
        })
    }

    pub fn yield_now(&self) {
        self.yields.fetch_add(1, Ordering::Relaxed);
        std::thread::yield_now();
    }
}

impl Default for MockSchedOps {
    fn default() -> Self {
        Self::new()
    }
}

/// 全局 Mock 实例
pub static MOCK_SCHED_OPS: MockSchedOps = MockSchedOps::new();
