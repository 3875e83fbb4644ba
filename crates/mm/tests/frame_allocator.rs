//! 多线程下的分片分配器行为：窃取、守恒与不重复分配

use std::alloc::{Layout, alloc, dealloc};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Mutex};
use std::thread;

use mm::{Frame, FrameAllocator, JUNK_ALLOC, PAGE_SIZE};
use sync::{ArchOps, SchedOps};
use test_support::mock::arch::{MOCK_ARCH_OPS, set_current_cpu};
use test_support::mock::sched::MOCK_SCHED_OPS;

struct TestArch;

impl ArchOps for TestArch {
    unsafe fn read_and_disable_interrupts(&self) -> usize {
        MOCK_ARCH_OPS.read_and_disable_interrupts()
    }

    unsafe fn restore_interrupts(&self, flags: usize) {
        MOCK_ARCH_OPS.restore_interrupts(flags)
    }

    fn sstatus_sie(&self) -> usize {
        MOCK_ARCH_OPS.sstatus_sie()
    }

    fn cpu_id(&self) -> usize {
        MOCK_ARCH_OPS.cpu_id()
    }

    fn max_cpu_count(&self) -> usize {
        MOCK_ARCH_OPS.max_cpu_count()
    }
}

struct TestSched;

impl SchedOps for TestSched {
    fn current_task_id(&self) -> usize {
        MOCK_SCHED_OPS.current_task_id()
    }

    fn yield_now(&self) {
        MOCK_SCHED_OPS.yield_now()
    }
}

static TEST_ARCH: TestArch = TestArch;
static TEST_SCHED: TestSched = TestSched;
static INIT: AtomicUsize = AtomicUsize::new(0);

fn init() {
    match INIT.compare_exchange(0, 1, Ordering::AcqRel, Ordering::Acquire) {
        Ok(_) => {
            unsafe {
                sync::register_arch_ops(&TEST_ARCH);
                sync::register_sched_ops(&TEST_SCHED);
            }
            INIT.store(2, Ordering::Release);
        }
        Err(_) => {
            while INIT.load(Ordering::Acquire) != 2 {
                std::hint::spin_loop();
            }
        }
    }
}

struct Arena {
    base: *mut u8,
    layout: Layout,
}

// 只在测试线程间共享起止地址
unsafe impl Send for Arena {}
unsafe impl Sync for Arena {}

impl Arena {
    fn new(pages: usize) -> Self {
        let layout = Layout::from_size_align(pages * PAGE_SIZE, PAGE_SIZE).unwrap();
        let base = unsafe { alloc(layout) };
        assert!(!base.is_null());
        Self { base, layout }
    }

    fn start(&self) -> usize {
        self.base as usize
    }

    fn end(&self) -> usize {
        self.start() + self.layout.size()
    }
}

impl Drop for Arena {
    fn drop(&mut self) {
        unsafe { dealloc(self.base, self.layout) }
    }
}

#[test]
fn steal_from_boot_cpu_takes_exactly_one_frame() {
    init();
    let arena = Arena::new(6);
    let allocator = FrameAllocator::new(2);
    unsafe { allocator.init_on(arena.start(), arena.end(), 0) };
    assert_eq!(allocator.free_frames(0), 6);
    assert_eq!(allocator.free_frames(1), 0);

    let frame = allocator.alloc(1).expect("steal from cpu 0");
    assert_eq!(allocator.free_frames(0), 5);
    assert_eq!(allocator.free_frames(1), 0);

    let bytes = unsafe { std::slice::from_raw_parts(frame.as_mut_ptr(), PAGE_SIZE) };
    assert!(bytes.iter().all(|&b| b == JUNK_ALLOC));
    allocator.free(frame, 1);
    assert_eq!(allocator.free_frames(1), 1);
}

#[test]
fn stealing_probes_in_ring_order() {
    init();
    let arena = Arena::new(4);
    let allocator = FrameAllocator::new(4);
    unsafe { allocator.init(arena.start(), arena.end()) };

    // 每个 CPU 一页；CPU 1 取走本地页后，下一次应从 CPU 2 窃取
    let own = allocator.alloc(1).unwrap();
    let stolen = allocator.alloc(1).unwrap();
    assert_eq!(allocator.free_frames(2), 0);
    assert_eq!(allocator.free_frames(3), 1);
    assert_eq!(allocator.free_frames(0), 1);
    assert_eq!(stolen.addr(), arena.start() + 2 * PAGE_SIZE);

    allocator.free(own, 1);
    allocator.free(stolen, 2);
    assert_eq!(allocator.total_free(), 4);
}

#[test]
fn alloc_local_uses_current_cpu() {
    init();
    let arena = Arena::new(4);
    let allocator = FrameAllocator::new(2);
    unsafe { allocator.init(arena.start(), arena.end()) };

    set_current_cpu(1);
    let frame = allocator.alloc_local().unwrap();
    assert_eq!(allocator.free_frames(1), 1);
    assert_eq!(allocator.free_frames(0), 2);
    allocator.free_local(frame);
    assert_eq!(allocator.free_frames(1), 2);
    set_current_cpu(0);
}

#[test]
fn concurrent_alloc_free_conserves_frames() {
    init();
    const PAGES: usize = 64;
    const THREADS: usize = 4;
    const ROUNDS: usize = 200;

    let arena = Arc::new(Arena::new(PAGES));
    let allocator = Arc::new(FrameAllocator::new(THREADS));
    // 全部页都在 CPU 0 上，其余 CPU 只能靠窃取起步
    unsafe { allocator.init_on(arena.start(), arena.end(), 0) };

    let in_use = Arc::new(Mutex::new(HashSet::new()));
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|cpu| {
            let allocator = Arc::clone(&allocator);
            let in_use = Arc::clone(&in_use);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                set_current_cpu(cpu);
                barrier.wait();
                let mut held: Vec<Frame> = Vec::new();
                for round in 0..ROUNDS {
                    if round % 3 != 2 {
                        if let Some(frame) = allocator.alloc(cpu) {
                            assert!(
                                in_use.lock().unwrap().insert(frame.addr()),
                                "frame {:#x} handed out twice",
                                frame.addr()
                            );
                            held.push(frame);
                        }
                    } else if let Some(frame) = held.pop() {
                        in_use.lock().unwrap().remove(&frame.addr());
                        allocator.free(frame, cpu);
                    }
                }
                for frame in held {
                    in_use.lock().unwrap().remove(&frame.addr());
                    allocator.free(frame, cpu);
                }
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }

    assert!(in_use.lock().unwrap().is_empty());
    assert_eq!(allocator.total_free(), PAGES);
    assert_eq!(allocator.total_frames(), PAGES);

    // 清空后再取一遍，地址互不重复且都在范围内
    let mut seen = HashSet::new();
    let mut frames = Vec::new();
    while let Some(frame) = allocator.alloc(0) {
        assert!(allocator.range().contains(&frame.addr()));
        assert!(seen.insert(frame.addr()));
        frames.push(frame);
    }
    assert_eq!(frames.len(), PAGES);
    for frame in frames {
        allocator.free(frame, 0);
    }
}
