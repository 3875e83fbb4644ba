//! 缓冲区缓存
//!
//! 固定数量的缓冲块分布在固定数量的哈希桶中，块 `(dev, blockno)` 的归属桶为
//! `blockno % nbucket`。每个桶有一把自旋锁，只保护链表与成员的身份、引用计数；
//! 每个缓冲块另有一把睡眠锁，串行化对块内容的访问。
//!
//! ## 查找与回收（`bget`）
//!
//! 1. 锁住归属桶，从头查找命中的块，命中则增加引用后放锁；
//! 2. 未命中时仍在归属桶内，从尾（最久未使用端）查找引用计数为 0 的块就地改名；
//! 3. 归属桶没有空闲块时先放开归属桶锁，按 `h+1, h+2, …` 逐个锁住其他桶，
//!    从尾查找空闲块；找到后摘下、放锁，再锁归属桶并**重新查找目标块**：
//!    期间若已有其他执行流缓存了同一块，则引用那个块，
//!    把迁来的块作为未命名空闲块挂到归属桶尾部；否则把迁来的块改名后挂到头部；
//! 4. 所有桶都没有空闲块：`bget` panic，`try_bget` 返回 [`CacheError::NoBuffers`]。
//!
//! 任意时刻最多持有一把桶锁；桶锁从不跨越设备 I/O，也不在持有时等待睡眠锁。

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::mem::ManuallyDrop;
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use device::BlockDevices;
use sync::{SleepLock, SpinLock};

use crate::bucket::{Bucket, SlotMeta};
use crate::buf::Buf;
use crate::config::{BSIZE, CacheConfig};
use crate::error::CacheError;

/// 一个缓冲块的内容
pub type BufData = [u8; BSIZE];

struct BufSlot {
    valid: AtomicBool,
    data: SleepLock<BufData>,
}

#[derive(Default)]
struct Counters {
    hits: AtomicUsize,
    misses: AtomicUsize,
    local_recycles: AtomicUsize,
    migrations: AtomicUsize,
    parked: AtomicUsize,
    device_reads: AtomicUsize,
    device_writes: AtomicUsize,
}

impl Counters {
    fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// 缓存统计快照
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// 在归属桶中命中的次数
    pub hits: usize,
    /// 未命中的次数
    pub misses: usize,
    /// 在归属桶内就地改名的次数
    pub local_recycles: usize,
    /// 从其他桶迁入空闲块的次数
    pub migrations: usize,
    /// 迁移途中发现目标块已被他人缓存、迁来的块被搁置为空闲块的次数
    pub parked: usize,
    /// 设备读次数
    pub device_reads: usize,
    /// 设备写次数
    pub device_writes: usize,
}

/// 按哈希桶分片的块缓冲区缓存
pub struct BufferCache {
    buckets: Vec<SpinLock<Bucket>>,
    slots: Vec<BufSlot>,
    devices: Arc<BlockDevices>,
    counters: Counters,
}

impl BufferCache {
    /// 创建缓存并执行 [`BufferCache::binit`]。
    ///
    /// # Panics
    /// 配置无效时 panic。
    pub fn new(config: CacheConfig, devices: Arc<BlockDevices>) -> Self {
        if let Err(e) = config.validate() {
            panic!("binit: {} {:?}", e, config);
        }
        let buckets = (0..config.nbucket)
            .map(|_| SpinLock::new(Bucket::new(config.nbuf), "bcache"))
            .collect();
        let slots = (0..config.nbuf)
            .map(|_| BufSlot {
                valid: AtomicBool::new(false),
                data: SleepLock::new([0; BSIZE], "buffer"),
            })
            .collect();
        let mut cache = Self {
            buckets,
            slots,
            devices,
            counters: Counters::default(),
        };
        cache.binit();
        cache
    }

    /// 把所有缓冲块放回 0 号桶，清除身份与有效位；其他桶置空。
    ///
    /// # Panics
    /// 仍有缓冲块被引用（例如被 `bpin` 固定）时 panic。
    pub fn binit(&mut self) {
        let nbuf = self.slots.len();
        for (h, lock) in self.buckets.iter_mut().enumerate() {
            let bucket = lock.get_mut();
            let busy = bucket
                .iter()
                .find(|&idx| bucket.get(idx).is_some_and(|m| m.refcnt > 0));
            if let Some(idx) = busy {
                panic!("binit: buffer {} in bucket {} still referenced", idx, h);
            }
            *bucket = Bucket::new(nbuf);
        }
        let home = self.buckets[0].get_mut();
        for (idx, slot) in self.slots.iter_mut().enumerate() {
            *slot.valid.get_mut() = false;
            home.push_front(idx, SlotMeta::EMPTY);
        }
        log::info!(
            "bcache: {} buffers of {} bytes over {} buckets",
            nbuf,
            BSIZE,
            self.buckets.len()
        );
    }

    fn home(&self, blockno: u32) -> usize {
        blockno as usize % self.buckets.len()
    }

    /// 获取 `(dev, blockno)` 的缓冲块，内容不保证有效。
    ///
    /// # Panics
    /// 所有缓冲块都被引用时 panic（`"bget: no buffers"`）。
    pub fn bget(&self, dev: u32, blockno: u32) -> Buf<'_> {
        match self.try_bget(dev, blockno) {
            Ok(buf) => buf,
            Err(e) => {
                log::error!("bget: dev {} block {}: {}", dev, blockno, e);
                panic!("bget: {}", e);
            }
        }
    }

    /// 同 [`BufferCache::bget`]，但在没有可用缓冲块时返回错误。
    pub fn try_bget(&self, dev: u32, blockno: u32) -> Result<Buf<'_>, CacheError> {
        let index = self.claim(dev, blockno).ok_or(CacheError::NoBuffers)?;
        // 可能让出 CPU；此时不持有任何桶锁
        let guard = self.slots[index].data.lock();
        Ok(Buf {
            cache: self,
            index,
            dev,
            blockno,
            guard: ManuallyDrop::new(guard),
        })
    }

    /// 在归属桶中找到或腾出一个槽位，并为调用者记一次引用。
    fn claim(&self, dev: u32, blockno: u32) -> Option<usize> {
        let h = self.home(blockno);
        {
            let mut bucket = self.buckets[h].lock();
            if let Some(idx) = bucket.find(dev, blockno) {
                bucket.meta_mut(idx).refcnt += 1;
                Counters::bump(&self.counters.hits);
                return Some(idx);
            }
            Counters::bump(&self.counters.misses);
            if let Some(idx) = bucket.find_free_from_tail() {
                *bucket.meta_mut(idx) = SlotMeta {
                    key: Some((dev, blockno)),
                    refcnt: 1,
                };
                self.slots[idx].valid.store(false, Ordering::Release);
                Counters::bump(&self.counters.local_recycles);
                return Some(idx);
            }
        }
        self.migrate(dev, blockno, h)
    }

    fn migrate(&self, dev: u32, blockno: u32, h: usize) -> Option<usize> {
        let (idx, donor) = self.take_free(h)?;
        Some(self.adopt(dev, blockno, h, idx, donor))
    }

    /// 按 `h+1, h+2, …` 逐个锁住其他桶，摘下第一个找到的空闲块。
    /// 返回的槽位不在任何桶中，身份已清除。
    fn take_free(&self, h: usize) -> Option<(usize, usize)> {
        let nbucket = self.buckets.len();
        for step in 1..nbucket {
            let donor = (h + step) % nbucket;
            let taken = {
                let mut bucket = self.buckets[donor].lock();
                bucket
                    .find_free_from_tail()
                    .map(|idx| (idx, bucket.remove(idx)))
            };
            if let Some((idx, _old)) = taken {
                self.slots[idx].valid.store(false, Ordering::Release);
                return Some((idx, donor));
            }
        }
        None
    }

    /// 把摘下的槽位 `idx` 挂入归属桶 `h`。
    ///
    /// 先重新查找目标块：若期间已被其他执行流缓存，则引用那个槽位，
    /// 把 `idx` 作为未命名空闲块挂到桶尾；否则把 `idx` 改名后挂到桶头。
    fn adopt(&self, dev: u32, blockno: u32, h: usize, idx: usize, donor: usize) -> usize {
        let mut home = self.buckets[h].lock();
        if let Some(existing) = home.find(dev, blockno) {
            home.meta_mut(existing).refcnt += 1;
            home.push_back(idx, SlotMeta::EMPTY);
            Counters::bump(&self.counters.parked);
            log::debug!(
                "bcache: dev {} block {} cached concurrently, parked slot {} in bucket {}",
                dev,
                blockno,
                idx,
                h
            );
            return existing;
        }
        home.push_front(
            idx,
            SlotMeta {
                key: Some((dev, blockno)),
                refcnt: 1,
            },
        );
        Counters::bump(&self.counters.migrations);
        log::debug!(
            "bcache: slot {} migrated from bucket {} to {} for dev {} block {}",
            idx,
            donor,
            h,
            dev,
            blockno
        );
        idx
    }

    /// 获取 `(dev, blockno)` 的缓冲块，必要时从设备读入内容。
    ///
    /// # Panics
    /// 同 [`BufferCache::bget`]；设备传输失败时同样 panic。
    pub fn bread(&self, dev: u32, blockno: u32) -> Buf<'_> {
        let mut buf = self.bget(dev, blockno);
        self.fill(&mut buf);
        buf
    }

    /// 同 [`BufferCache::bread`]，但在没有可用缓冲块时返回错误。
    pub fn try_bread(&self, dev: u32, blockno: u32) -> Result<Buf<'_>, CacheError> {
        let mut buf = self.try_bget(dev, blockno)?;
        self.fill(&mut buf);
        Ok(buf)
    }

    fn fill(&self, buf: &mut Buf<'_>) {
        let slot = &self.slots[buf.index];
        if !slot.valid.load(Ordering::Acquire) {
            self.devices
                .transfer(buf.dev, buf.blockno, buf.data_mut().as_mut_slice(), false);
            Counters::bump(&self.counters.device_reads);
            slot.valid.store(true, Ordering::Release);
        }
    }

    /// 把块内容同步写回设备。
    ///
    /// # Panics
    /// 当前任务不持有该块的内容锁时 panic（`"bwrite"`）。
    pub fn bwrite(&self, buf: &mut Buf<'_>) {
        if !core::ptr::eq(buf.cache, self) || !self.slots[buf.index].data.holding() {
            panic!("bwrite");
        }
        self.devices
            .transfer(buf.dev, buf.blockno, buf.data_mut().as_mut_slice(), true);
        Counters::bump(&self.counters.device_writes);
    }

    /// 释放缓冲块，等价于直接 drop。
    pub fn brelse(&self, buf: Buf<'_>) {
        drop(buf);
    }

    /// 内容锁已释放后，在归属桶中归还一次引用；归零时移到最近使用端。
    pub(crate) fn release(&self, index: usize, dev: u32, blockno: u32) {
        let h = self.home(blockno);
        let mut bucket = self.buckets[h].lock();
        let Some(meta) = bucket.get_mut(index) else {
            panic!("brelse: slot {} not in bucket {}", index, h);
        };
        if meta.key != Some((dev, blockno)) || meta.refcnt == 0 {
            panic!(
                "brelse: slot {} is {:?} with refcnt {}, expected dev {} block {}",
                index, meta.key, meta.refcnt, dev, blockno
            );
        }
        meta.refcnt -= 1;
        if meta.refcnt == 0 {
            bucket.move_to_front(index);
        }
    }

    /// 额外固定一次缓冲块，使其在 `brelse` 之后仍不被回收。
    pub fn bpin(&self, buf: &Buf<'_>) {
        let h = self.home(buf.blockno);
        let mut bucket = self.buckets[h].lock();
        match bucket.get_mut(buf.index) {
            Some(meta) => meta.refcnt += 1,
            None => panic!("bpin: slot {} not in bucket {}", buf.index, h),
        }
    }

    /// 撤销一次 [`BufferCache::bpin`]。
    ///
    /// # Panics
    /// 除调用者自身的引用外没有固定计数时 panic（`"bunpin: not pinned"`）。
    pub fn bunpin(&self, buf: &Buf<'_>) {
        let h = self.home(buf.blockno);
        let mut bucket = self.buckets[h].lock();
        match bucket.get_mut(buf.index) {
            Some(meta) if meta.refcnt > 1 => meta.refcnt -= 1,
            Some(_) => panic!("bunpin: not pinned"),
            None => panic!("bunpin: slot {} not in bucket {}", buf.index, h),
        }
    }

    pub(crate) fn slot_valid(&self, index: usize) -> bool {
        self.slots[index].valid.load(Ordering::Acquire)
    }

    /// 块大小（字节）
    pub fn block_size(&self) -> usize {
        BSIZE
    }

    /// 缓冲块个数
    pub fn nbuf(&self) -> usize {
        self.slots.len()
    }

    /// 哈希桶个数
    pub fn nbucket(&self) -> usize {
        self.buckets.len()
    }

    /// 当前缓存着 `(dev, blockno)` 的桶（调试用）
    pub fn bucket_of(&self, dev: u32, blockno: u32) -> Option<usize> {
        (0..self.buckets.len()).find(|&h| self.buckets[h].lock().find(dev, blockno).is_some())
    }

    /// `(dev, blockno)` 的引用计数，未缓存时返回 `None`（调试用）
    pub fn ref_count(&self, dev: u32, blockno: u32) -> Option<u32> {
        let bucket = self.buckets[self.home(blockno)].lock();
        let idx = bucket.find(dev, blockno)?;
        bucket.get(idx).map(|m| m.refcnt)
    }

    /// 第 `h` 个桶当前的成员数（调试用）
    pub fn bucket_len(&self, h: usize) -> usize {
        self.buckets[h].lock().len()
    }

    /// 统计快照
    pub fn stats(&self) -> CacheStats {
        let c = &self.counters;
        CacheStats {
            hits: c.hits.load(Ordering::Relaxed),
            misses: c.misses.load(Ordering::Relaxed),
            local_recycles: c.local_recycles.load(Ordering::Relaxed),
            migrations: c.migrations.load(Ordering::Relaxed),
            parked: c.parked.load(Ordering::Relaxed),
            device_reads: c.device_reads.load(Ordering::Relaxed),
            device_writes: c.device_writes.load(Ordering::Relaxed),
        }
    }
}
