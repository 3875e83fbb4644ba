//! 物理页分配器
//!
//! 每个 CPU 持有一条独立的空闲页链表和一把自旋锁：
//! 本地链表为空时，按固定顺序逐个“窃取”其他 CPU 的空闲页，
//! 任何时刻最多只持有一把链表锁。
//!
//! - [`FrameAllocator`]：分片空闲链表，提供 `init` / `free` / `alloc`
//! - [`Frame`]：已分配的一页物理内存（线性所有权，不可复制）
//! - [`FrameTracker`]：`Drop` 时自动归还的 RAII 包装
//!
//! # 架构解耦
//!
//! 锁与“当前 CPU”来自 `sync` crate，使用前必须在 `sync` 中注册 `ArchOps`。
//! 本 crate 假设物理地址与可访问的指针一一对应（恒等映射）。

#![no_std]

extern crate alloc;

mod config;
mod free_list;

pub mod frame_allocator;

pub use config::{JUNK_ALLOC, JUNK_FREE, NCPU, PAGE_SIZE, page_round_down, page_round_up};
pub use frame_allocator::{Frame, FrameAllocator, FrameTracker};
