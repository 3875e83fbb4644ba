//! 架构相关操作的 Mock 实现
//!
//! 宿主机上每个线程扮演一个“CPU 上的执行流”：
//! 中断开关与 CPU ID 都是线程本地的，测试线程可以用 [`set_current_cpu`]
//! 把自己“放到”某个 CPU 上。

use std::cell::Cell;
use std::sync::atomic::{AtomicUsize, Ordering};

thread_local! {
    static INTERRUPTS_ON: Cell<bool> = const { Cell::new(true) };
    static CURRENT_CPU: Cell<usize> = const { Cell::new(0) };
}

const SIE: usize = 0x2;

/// 让当前线程之后报告的 CPU ID 为 `cpu`
pub fn set_current_cpu(cpu: usize) {
    CURRENT_CPU.with(|c| c.set(cpu));
}

/// Mock 架构操作
pub struct MockArchOps {
    pub max_cpus: AtomicUsize,
}

impl MockArchOps {
    pub const fn new() -> Self {
        Self {
            max_cpus: AtomicUsize::new(8),
        }
    }

    pub fn read_and_disable_interrupts(&self) -> usize {
        let was_on = INTERRUPTS_ON.with(|f| f.replace(false));
        if was_on {
            SIE
        } else {
            0
        }
    }

    pub fn restore_interrupts(&self, flags: usize) {
        INTERRUPTS_ON.with(|f| f.set(flags & SIE != 0));
    }

    pub fn interrupts_enabled(&self) -> bool {
        INTERRUPTS_ON.with(|f| f.get())
    }

    pub fn sstatus_sie(&self) -> usize {
        SIE
    }

    pub fn cpu_id(&self) -> usize {
        CURRENT_CPU.with(|c| c.get())
    }

    pub fn max_cpu_count(&self) -> usize {
        self.max_cpus.load(Ordering::Relaxed)
    }
}

impl Default for MockArchOps {
    fn default() -> Self {
        Self::new()
    }
}

/// 全局 Mock 实例
pub static MOCK_ARCH_OPS: MockArchOps = MockArchOps::new();
