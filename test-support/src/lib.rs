//! 测试支持 crate
//!
//! 提供 Mock 实现。只在宿主机 `cargo test` 下使用，因此可以依赖 std。

pub mod mock;
