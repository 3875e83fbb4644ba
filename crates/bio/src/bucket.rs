//! 哈希桶：缓冲块槽位上的循环双向链表
//!
//! 链表用下标而不是指针链接：`links` 按槽位下标索引，末尾多出一个哨兵节点。
//! 哨兵之后是最近使用端（头），哨兵之前是最久未使用端（尾）。
//!
//! 槽位的身份与引用计数（[`SlotMeta`]）也存放在桶里，
//! 只有当前属于本桶的槽位才有 `Some`。跨桶迁移时元数据随槽位一起按值移动，
//! 因此“桶锁只保护本桶成员的元数据”由类型直接保证。

use alloc::vec;
use alloc::vec::Vec;

/// 槽位元数据，由所属桶的锁保护
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SlotMeta {
    /// `(设备号, 块号)`，`None` 表示空闲未命名
    pub key: Option<(u32, u32)>,
    /// 活跃持有者数，为 0 时可被回收
    pub refcnt: u32,
}

impl SlotMeta {
    pub(crate) const EMPTY: SlotMeta = SlotMeta {
        key: None,
        refcnt: 0,
    };
}

#[derive(Debug, Clone, Copy)]
struct Link {
    prev: usize,
    next: usize,
}

/// 一个哈希桶的链表
#[derive(Debug)]
pub(crate) struct Bucket {
    links: Vec<Link>,
    slots: Vec<Option<SlotMeta>>,
    len: usize,
}

impl Bucket {
    /// 创建能容纳 `nbuf` 个槽位下标的空桶
    pub(crate) fn new(nbuf: usize) -> Self {
        let mut links = vec![Link { prev: 0, next: 0 }; nbuf + 1];
        for (i, link) in links.iter_mut().enumerate() {
            link.prev = i;
            link.next = i;
        }
        Self {
            links,
            slots: vec![None; nbuf],
            len: 0,
        }
    }

    fn sentinel(&self) -> usize {
        self.slots.len()
    }

    fn link_after(&mut self, at: usize, idx: usize, meta: SlotMeta) {
        if self.slots[idx].is_some() {
            panic!("bcache: slot {} already in bucket", idx);
        }
        let next = self.links[at].next;
        self.links[idx] = Link { prev: at, next };
        self.links[next].prev = idx;
        self.links[at].next = idx;
        self.slots[idx] = Some(meta);
        self.len += 1;
    }

    fn unlink(&mut self, idx: usize) {
        let Link { prev, next } = self.links[idx];
        self.links[prev].next = next;
        self.links[next].prev = prev;
        self.links[idx] = Link {
            prev: idx,
            next: idx,
        };
    }

    /// 插入到最近使用端
    pub(crate) fn push_front(&mut self, idx: usize, meta: SlotMeta) {
        let head = self.sentinel();
        self.link_after(head, idx, meta);
    }

    /// 插入到最久未使用端
    pub(crate) fn push_back(&mut self, idx: usize, meta: SlotMeta) {
        let tail = self.links[self.sentinel()].prev;
        self.link_after(tail, idx, meta);
    }

    /// 摘下槽位并取走其元数据
    pub(crate) fn remove(&mut self, idx: usize) -> SlotMeta {
        let Some(meta) = self.slots[idx].take() else {
            panic!("bcache: slot {} not in bucket", idx);
        };
        self.unlink(idx);
        self.len -= 1;
        meta
    }

    /// 把成员移到最近使用端
    pub(crate) fn move_to_front(&mut self, idx: usize) {
        let meta = self.remove(idx);
        self.push_front(idx, meta);
    }

    /// 从头到尾查找身份为 `(dev, blockno)` 的成员
    pub(crate) fn find(&self, dev: u32, blockno: u32) -> Option<usize> {
        self.iter()
            .find(|&idx| self.slots[idx].is_some_and(|m| m.key == Some((dev, blockno))))
    }

    /// 从尾到头查找第一个引用计数为 0 的成员
    pub(crate) fn find_free_from_tail(&self) -> Option<usize> {
        let sentinel = self.sentinel();
        let mut idx = self.links[sentinel].prev;
        while idx != sentinel {
            if self.slots[idx].is_some_and(|m| m.refcnt == 0) {
                return Some(idx);
            }
            idx = self.links[idx].prev;
        }
        None
    }

    pub(crate) fn get(&self, idx: usize) -> Option<&SlotMeta> {
        self.slots.get(idx)?.as_ref()
    }

    pub(crate) fn get_mut(&mut self, idx: usize) -> Option<&mut SlotMeta> {
        self.slots.get_mut(idx)?.as_mut()
    }

    /// 成员元数据；`idx` 必须是本桶成员
    pub(crate) fn meta_mut(&mut self, idx: usize) -> &mut SlotMeta {
        match self.slots[idx].as_mut() {
            Some(meta) => meta,
            None => panic!("bcache: slot {} not in bucket", idx),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    /// 从最近使用端到最久未使用端遍历成员下标
    pub(crate) fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        let sentinel = self.sentinel();
        let mut idx = self.links[sentinel].next;
        core::iter::from_fn(move || {
            if idx == sentinel {
                return None;
            }
            let cur = idx;
            idx = self.links[cur].next;
            Some(cur)
        })
    }
}
