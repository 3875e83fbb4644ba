//! 抢占保护器
//!
//! 读取“当前 CPU”与随后对该 CPU 私有数据加锁之间不能被调度到别的 CPU 上，
//! 否则读到的 CPU ID 会过期。本内核的抢占由本地时钟中断驱动，
//! 因此关闭本地中断即可禁止迁移。

use crate::intr_guard::IntrGuard;
use crate::arch_ops;

/// 禁止任务迁移的 RAII 保护器。
///
/// 存活期间 [`PreemptGuard::cpu_id`] 返回的值保持有效。
pub struct PreemptGuard {
    _intr: IntrGuard,
    cpu: usize,
}

impl PreemptGuard {
    /// 禁用抢占并记录当前 CPU ID。
    pub fn new() -> Self {
        let intr = IntrGuard::new();
        let cpu = arch_ops().cpu_id();
        Self { _intr: intr, cpu }
    }

    /// 进入保护时所在的 CPU。
    pub fn cpu_id(&self) -> usize {
        self.cpu
    }
}

impl Default for PreemptGuard {
    fn default() -> Self {
        Self::new()
    }
}
