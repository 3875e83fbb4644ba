//! Mock 实现模块
//!
//! 提供架构与调度器的 Mock 实现，用于测试。
//!
//! 注意：这里不直接依赖 `sync` crate（避免循环依赖）。
//! 各 crate 在测试中用本地包装类型为这些 mock 实现 `sync` 的 trait。

pub mod arch;
pub mod sched;
