//! 块设备协作方
//!
//! 缓冲区缓存只需要一种能力：按 `(设备号, 块号)` 同步地读写一整块。
//! 此 crate 提供：
//!
//! - [`Driver`] trait - 设备驱动基础接口
//! - [`BlockDriver`] trait - 块设备驱动接口
//! - [`RamDisk`] - 内存模拟块设备，用于测试与早期启动
//! - [`BlockDevices`] - 设备号到驱动的映射表，负责整块传输
//!
//! # 架构解耦
//!
//! 内部使用 `sync` crate 的自旋锁，使用前必须在 `sync` 中注册 `ArchOps`。

#![no_std]

extern crate alloc;

pub mod block;
pub mod driver;

pub use block::{BlockDevices, BlockDriver, DeviceError, RamDisk};
pub use driver::Driver;
