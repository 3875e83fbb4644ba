//! 侵入式空闲页链表
//!
//! 链表节点就存放在空闲页自身的前几个字节中，因此链表本身不需要额外内存。
//! 这是本 crate 唯一把任意地址重新解释为结构体的地方。

use core::ptr::NonNull;

use crate::config::PAGE_SIZE;

/// 写在空闲页开头的链表节点
#[repr(C)]
struct Run {
    next: Option<NonNull<Run>>,
}

/// 单个 CPU 的空闲页链表（无序，后进先出）
#[derive(Debug)]
pub(crate) struct FreeList {
    head: Option<NonNull<Run>>,
    len: usize,
}

// SAFETY: 链表中的页只能通过持有外层锁的 `&mut FreeList` 访问
unsafe impl Send for FreeList {}

impl FreeList {
    pub(crate) const fn new() -> Self {
        Self { head: None, len: 0 }
    }

    /// 把地址为 `addr` 的整页挂到链表头
    ///
    /// # Safety
    /// `addr` 必须页对齐，指向 [`PAGE_SIZE`] 字节可写且无人使用的内存，
    /// 并且当前不在任何空闲链表上。
    pub(crate) unsafe fn push(&mut self, addr: usize) {
        debug_assert_eq!(addr % PAGE_SIZE, 0);
        let run = addr as *mut Run;
        // SAFETY: 由调用者保证该页可写且归本链表独占
        unsafe { run.write(Run { next: self.head }) };
        self.head = NonNull::new(run);
        self.len += 1;
    }

    /// 从链表头摘下一页，返回其地址
    pub(crate) fn pop(&mut self) -> Option<usize> {
        let run = self.head?;
        // SAFETY: 链表上的每个节点都由 push 写入，且页仍归本链表所有
        self.head = unsafe { run.as_ptr().read().next };
        self.len -= 1;
        Some(run.as_ptr() as usize)
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }
}
