//! 帧分配器模块
//!
//! 本模块提供按 CPU 分片的物理页分配。
//!
//! ## 分配策略（分片 + 窃取）
//!
//! - 每个 CPU 一条侵入式空闲链表和一把名为 `"kmem"` 的自旋锁；
//! - `alloc(cpu)` 先在本地链表取页，本地为空时释放本地锁，
//!   再按 `cpu+1, cpu+2, …`（模 CPU 数）逐个加锁探测，从第一个非空链表取一页；
//! - `free(frame, cpu)` 校验对齐与范围后把页挂回 `cpu` 的链表。
//!
//! 任意时刻最多持有一把链表锁，因此分配与窃取之间不存在锁序问题。
//!
//! ## 垃圾填充
//!
//! 释放的页整页写入 [`JUNK_FREE`]，分配出的页整页写入 [`JUNK_ALLOC`]，
//! 让释放后使用与未初始化读取尽早暴露。
//!
//! ## RAII：自动回收
//!
//! [`FrameTracker`] 在 `Drop` 时把页归还给当前 CPU 的链表。

use alloc::vec::Vec;
use core::ops::Range;
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use sync::{PreemptGuard, SpinLock};

use crate::config::{JUNK_ALLOC, JUNK_FREE, NCPU, PAGE_SIZE, page_round_down, page_round_up};
use crate::free_list::FreeList;

// ============================================================================
// Frame - 已分配的一页
// ============================================================================

/// 一页物理内存的所有权凭证。
///
/// 不可复制：同一页在归还之前只能有一个持有者。
#[derive(Debug, PartialEq, Eq)]
pub struct Frame(usize);

impl Frame {
    /// 由地址构造帧。
    ///
    /// # Safety
    /// 调用者必须独占该页，且该页不在任何空闲链表上。
    pub unsafe fn from_addr(addr: usize) -> Self {
        Frame(addr)
    }

    /// 帧的起始地址。
    pub fn addr(&self) -> usize {
        self.0
    }

    /// 帧起始处的裸指针。
    pub fn as_mut_ptr(&self) -> *mut u8 {
        self.0 as *mut u8
    }
}

/// # Safety
/// `addr` 必须指向受管范围内一整页可写内存，且页归调用方独占。
unsafe fn fill(addr: usize, byte: u8) {
    unsafe { core::ptr::write_bytes(addr as *mut u8, byte, PAGE_SIZE) };
}

// ============================================================================
// FrameAllocator - 分片空闲链表
// ============================================================================

/// 按 CPU 分片的物理帧分配器。
pub struct FrameAllocator {
    lists: Vec<SpinLock<FreeList>>,
    start: AtomicUsize,
    end: AtomicUsize,
    initialized: AtomicBool,
}

impl FrameAllocator {
    /// 为 `ncpu` 个 CPU 创建分配器，每条链表都为空。
    ///
    /// # Panics
    /// `ncpu == 0` 时 panic。
    pub fn new(ncpu: usize) -> Self {
        assert!(ncpu > 0, "kmem: need at least one cpu");
        let lists = (0..ncpu)
            .map(|_| SpinLock::new(FreeList::new(), "kmem"))
            .collect();
        FrameAllocator {
            lists,
            start: AtomicUsize::new(0),
            end: AtomicUsize::new(0),
            initialized: AtomicBool::new(false),
        }
    }

    /// 把 `[start, end)` 中的所有整页交给分配器，均匀切成 `ncpu` 段连续区间，
    /// 第 `i` 段挂到 CPU `i` 的链表上。
    ///
    /// # Safety
    /// 区间内的内存必须可写，且此后只通过本分配器分发。
    ///
    /// # Panics
    /// 重复初始化时 panic。
    pub unsafe fn init(&self, start: usize, end: usize) {
        let range = self.set_range(start, end);
        let nframes = (range.end - range.start) / PAGE_SIZE;
        let ncpu = self.ncpu();
        for k in 0..nframes {
            let cpu = k * ncpu / nframes;
            self.release(range.start + k * PAGE_SIZE, cpu);
        }
    }

    /// 把 `[start, end)` 中的所有整页挂到同一个 CPU 的链表上，
    /// 对应启动 CPU 独自释放整段内存的布局。
    ///
    /// # Safety
    /// 同 [`FrameAllocator::init`]。
    ///
    /// # Panics
    /// 重复初始化或 `cpu` 越界时 panic。
    pub unsafe fn init_on(&self, start: usize, end: usize, cpu: usize) {
        self.check_cpu(cpu);
        let range = self.set_range(start, end);
        for addr in range.step_by(PAGE_SIZE) {
            self.release(addr, cpu);
        }
    }

    fn set_range(&self, start: usize, end: usize) -> Range<usize> {
        if self.initialized.swap(true, Ordering::AcqRel) {
            panic!("kinit: already initialized");
        }
        let start = page_round_up(start);
        let end = page_round_down(end).max(start);
        self.start.store(start, Ordering::Release);
        self.end.store(end, Ordering::Release);
        log::info!(
            "kmem: managing [{:#x}, {:#x}), {} frames over {} cpus",
            start,
            end,
            (end - start) / PAGE_SIZE,
            self.ncpu()
        );
        start..end
    }

    fn check_cpu(&self, cpu: usize) {
        if cpu >= self.ncpu() {
            panic!("kmem: cpu {} out of range (ncpu = {})", cpu, self.ncpu());
        }
    }

    /// 填充垃圾字节后挂到 `cpu` 的链表头。
    fn release(&self, addr: usize, cpu: usize) {
        // SAFETY: addr 已在受管范围内且页对齐，所有权随 Frame 一并交回
        unsafe { fill(addr, JUNK_FREE) };
        let mut list = self.lists[cpu].lock();
        // SAFETY: 同上
        unsafe { list.push(addr) };
    }

    /// 归还一页到 `cpu` 的链表。
    ///
    /// # Panics
    /// 帧未页对齐、不在受管范围内或 `cpu` 越界时 panic。
    pub fn free(&self, frame: Frame, cpu: usize) {
        self.check_cpu(cpu);
        let addr = frame.addr();
        let range = self.range();
        if addr % PAGE_SIZE != 0 || !range.contains(&addr) {
            log::error!(
                "kfree: bad frame {:#x}, managed range [{:#x}, {:#x})",
                addr,
                range.start,
                range.end
            );
            panic!("kfree: bad frame {:#x}", addr);
        }
        self.release(addr, cpu);
    }

    /// 为 `cpu` 分配一页，本地为空时从其他 CPU 窃取。
    ///
    /// 所有链表都为空时返回 `None`。
    pub fn alloc(&self, cpu: usize) -> Option<Frame> {
        self.check_cpu(cpu);
        let local = self.lists[cpu].lock().pop();
        let addr = match local {
            Some(addr) => addr,
            None => self.steal(cpu)?,
        };
        // SAFETY: 刚从空闲链表摘下，页归本次分配独占
        unsafe { fill(addr, JUNK_ALLOC) };
        Some(Frame(addr))
    }

    fn steal(&self, cpu: usize) -> Option<usize> {
        let ncpu = self.ncpu();
        for i in 1..ncpu {
            let victim = (cpu + i) % ncpu;
            let stolen = self.lists[victim].lock().pop();
            if let Some(addr) = stolen {
                log::debug!("kalloc: cpu {} stole {:#x} from cpu {}", cpu, addr, victim);
                return Some(addr);
            }
        }
        log::warn!("kalloc: out of memory (requested by cpu {})", cpu);
        None
    }

    /// 在当前 CPU 上分配一页。读取 CPU ID 到加锁期间禁止迁移。
    pub fn alloc_local(&self) -> Option<Frame> {
        let guard = PreemptGuard::new();
        self.alloc(guard.cpu_id())
    }

    /// 把一页归还到当前 CPU 的链表。
    pub fn free_local(&self, frame: Frame) {
        let guard = PreemptGuard::new();
        self.free(frame, guard.cpu_id());
    }

    /// 在当前 CPU 上分配一页，并用 [`FrameTracker`] 包装。
    pub fn alloc_tracked(&self) -> Option<FrameTracker<'_>> {
        self.alloc_local().map(|frame| FrameTracker {
            addr: frame.addr(),
            allocator: self,
        })
    }

    /// CPU 数
    pub fn ncpu(&self) -> usize {
        self.lists.len()
    }

    /// `cpu` 链表上的空闲帧数
    pub fn free_frames(&self, cpu: usize) -> usize {
        self.check_cpu(cpu);
        self.lists[cpu].lock().len()
    }

    /// 所有链表上的空闲帧总数（逐个加锁读取，并发时只是近似值）
    pub fn total_free(&self) -> usize {
        (0..self.ncpu()).map(|cpu| self.free_frames(cpu)).sum()
    }

    /// 受管范围内的帧数
    pub fn total_frames(&self) -> usize {
        let range = self.range();
        (range.end - range.start) / PAGE_SIZE
    }

    /// 受管地址范围，初始化之前为空区间
    pub fn range(&self) -> Range<usize> {
        self.start.load(Ordering::Acquire)..self.end.load(Ordering::Acquire)
    }
}

impl Default for FrameAllocator {
    /// 按内核支持的最大 CPU 数 [`NCPU`] 创建。
    fn default() -> Self {
        Self::new(NCPU)
    }
}

// ============================================================================
// FrameTracker - 单帧 RAII 封装
// ============================================================================

/// 物理帧跟踪器。
/// 实现了 RAII 模式：当此结构体被 drop 时，它所管理的物理页帧会被归还给当前 CPU。
pub struct FrameTracker<'a> {
    addr: usize,
    allocator: &'a FrameAllocator,
}

impl FrameTracker<'_> {
    /// 帧的起始地址。
    pub fn addr(&self) -> usize {
        self.addr
    }

    /// 以字节切片读取整页。
    pub fn as_bytes(&self) -> &[u8] {
        // SAFETY: 跟踪器独占该页
        unsafe { core::slice::from_raw_parts(self.addr as *const u8, PAGE_SIZE) }
    }

    /// 以可变字节切片访问整页。
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        // SAFETY: 跟踪器独占该页，且 &mut self 保证没有其他借用
        unsafe { core::slice::from_raw_parts_mut(self.addr as *mut u8, PAGE_SIZE) }
    }

    /// 放弃自动回收，取回裸帧。
    pub fn into_frame(self) -> Frame {
        let frame = Frame(self.addr);
        core::mem::forget(self);
        frame
    }
}

impl core::fmt::Debug for FrameTracker<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FrameTracker")
            .field("addr", &format_args!("{:#x}", self.addr))
            .finish()
    }
}

impl Drop for FrameTracker<'_> {
    /// 自动回收物理页帧。
    fn drop(&mut self) {
        self.allocator.free_local(Frame(self.addr));
    }
}
