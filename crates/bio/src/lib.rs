//! 块缓冲区缓存
//!
//! 把磁盘块缓存在固定大小的内存池中，并为多个执行流提供同步点：
//! 同一时刻只有一个任务能访问某个缓冲块的内容。
//!
//! - [`BufferCache`]：`binit` / `bget` / `bread` / `bwrite` / `brelse` / `bpin` / `bunpin`
//! - [`Buf`]：已加锁的缓冲块句柄，drop 时自动 `brelse`
//! - [`CacheConfig`] / [`CacheStats`] / [`CacheError`]
//!
//! # 锁的两个层次
//!
//! - 桶锁（`sync::SpinLock`，名为 `"bcache"`）：只保护链表与身份、引用计数，
//!   临界区很短，不跨越 I/O；
//! - 内容锁（`sync::SleepLock`，名为 `"buffer"`）：串行化块内容访问，
//!   可以跨越设备读写，获取失败时让出 CPU。
//!
//! # 架构解耦
//!
//! 设备读写经由 `device::BlockDevices`；锁依赖 `sync` 中注册的 `ArchOps` 与 `SchedOps`。

#![no_std]

extern crate alloc;

mod bucket;
mod buf;
mod cache;
mod config;
mod error;

pub use buf::Buf;
pub use cache::{BufData, BufferCache, CacheStats};
pub use config::{BSIZE, CacheConfig, NBUCKET, NBUF};
pub use error::CacheError;
