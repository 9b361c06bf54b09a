//! Multi-threaded lifetime scenarios, both through `Arc` handles and by
//! driving a `ControlBlock` directly.

use ctrlrc::arc::{Arc, Weak};
use ctrlrc::control::{ControlBlock, Release, State};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering::SeqCst};
use std::sync::Barrier;
use std::thread;

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Counts drops and trips if the value is touched after it was dropped.
struct Tracked<'a> {
    drops: &'a AtomicUsize,
    dead: AtomicBool,
}

impl<'a> Tracked<'a> {
    fn new(drops: &'a AtomicUsize) -> Self {
        Tracked {
            drops,
            dead: AtomicBool::new(false),
        }
    }

    fn touch(&self) {
        assert!(!self.dead.load(SeqCst), "value used after destruction");
    }
}

impl Drop for Tracked<'_> {
    fn drop(&mut self) {
        assert!(!self.dead.swap(true, SeqCst), "value destroyed twice");
        self.drops.fetch_add(1, SeqCst);
    }
}

type Block<'a> = ControlBlock<Tracked<'a>, AtomicUsize>;

#[derive(Clone, Copy)]
struct BlockPtr<'a>(NonNull<Block<'a>>);
unsafe impl Send for BlockPtr<'_> {}
unsafe impl Sync for BlockPtr<'_> {}

#[test]
fn two_threads_race_the_original_owner() {
    init();
    for _ in 0..200 {
        let drops = AtomicUsize::new(0);
        let freed = AtomicUsize::new(0);
        let block = BlockPtr(Block::allocate(Tracked::new(&drops)));
        let barrier = Barrier::new(3);

        thread::scope(|s| {
            for _ in 0..2 {
                // each thread takes its own strong reference before the race
                unsafe { block.0.as_ref().acquire_strong() };
                s.spawn(|| {
                    let b = block;
                    barrier.wait();
                    unsafe {
                        b.0.as_ref().value().touch();
                        b.0.as_ref().acquire_strong();
                        b.0.as_ref().value().touch();
                        let _ = Block::release_strong(b.0);
                        b.0.as_ref().value().touch();
                        if Block::release_strong(b.0) == Release::Freed {
                            freed.fetch_add(1, SeqCst);
                        }
                    }
                });
            }
            barrier.wait();
            if unsafe { Block::release_strong(block.0) } == Release::Freed {
                freed.fetch_add(1, SeqCst);
            }
        });

        assert_eq!(drops.load(SeqCst), 1);
        assert_eq!(freed.load(SeqCst), 1);
    }
}

#[test]
fn thousand_threads_leave_one_owner() {
    init();
    let drops = AtomicUsize::new(0);
    let block = BlockPtr(Block::allocate(Tracked::new(&drops)));

    thread::scope(|s| {
        for _ in 0..1000 {
            s.spawn(|| {
                let b = block;
                unsafe {
                    b.0.as_ref().acquire_strong();
                    b.0.as_ref().value().touch();
                    assert_eq!(Block::release_strong(b.0), Release::Retained);
                }
            });
        }
    });

    let b = unsafe { block.0.as_ref() };
    assert_eq!(b.strong_count(), 1);
    assert_eq!(b.state(), State::Alive);
    unsafe { b.value().touch() };
    assert_eq!(drops.load(SeqCst), 0);

    assert_eq!(unsafe { Block::release_strong(block.0) }, Release::Freed);
    assert_eq!(drops.load(SeqCst), 1);
}

#[test]
fn weak_keeps_block_after_value() {
    init();
    let drops = AtomicUsize::new(0);
    let block = Block::allocate(Tracked::new(&drops));
    unsafe {
        block.as_ref().acquire_weak();
        assert_eq!(block.as_ref().weak_count(), 1);

        assert_eq!(Block::release_strong(block), Release::ValueDestroyed);
        assert_eq!(drops.load(SeqCst), 1);
        assert_eq!(block.as_ref().strong_count(), 0);

        assert!(!block.as_ref().try_upgrade());
        assert!(Block::release_weak(block));
    }
    assert_eq!(drops.load(SeqCst), 1);
}

#[test]
fn upgrade_never_succeeds_after_last_release() {
    init();
    for _ in 0..200 {
        let drops = AtomicUsize::new(0);
        let upgraded_after_death = AtomicBool::new(false);
        let a = Arc::new(Tracked::new(&drops));
        let weaks: Vec<Weak<_>> = (0..4).map(|_| Arc::downgrade(&a)).collect();
        let barrier = Barrier::new(weaks.len() + 1);

        thread::scope(|s| {
            for w in weaks {
                let barrier = &barrier;
                let upgraded_after_death = &upgraded_after_death;
                s.spawn(move || {
                    barrier.wait();
                    for _ in 0..50 {
                        // more weak pointers while the owner may be dying
                        let w2 = w.clone();
                        match w2.upgrade() {
                            Some(p) => p.touch(),
                            None => {
                                if w.upgrade().is_some() {
                                    upgraded_after_death.store(true, SeqCst);
                                }
                            }
                        }
                    }
                });
            }
            barrier.wait();
            drop(a);
        });

        assert!(!upgraded_after_death.load(SeqCst));
        assert_eq!(drops.load(SeqCst), 1);
    }
}

#[test]
fn arc_clone_storm() {
    init();
    let drops = AtomicUsize::new(0);
    {
        let a = Arc::new(Tracked::new(&drops));
        thread::scope(|s| {
            for _ in 0..16 {
                let a = a.clone();
                s.spawn(move || {
                    let mut mine = Vec::new();
                    for _ in 0..100 {
                        mine.push(a.clone());
                        mine.push(Arc::downgrade(&a).upgrade().unwrap());
                    }
                    for p in &mine {
                        p.touch();
                    }
                });
            }
        });
        assert_eq!(Arc::strong_count(&a), 1);
        assert_eq!(Arc::weak_count(&a), 0);
        assert_eq!(drops.load(SeqCst), 0);
    }
    assert_eq!(drops.load(SeqCst), 1);
}

#[test]
fn last_drop_on_any_thread() {
    init();
    let drops = AtomicUsize::new(0);
    let a = Arc::new(Tracked::new(&drops));
    let w = Arc::downgrade(&a);
    thread::scope(|s| {
        for _ in 0..8 {
            let p = a.clone();
            s.spawn(move || p.touch());
        }
        drop(a);
    });
    assert_eq!(drops.load(SeqCst), 1);
    assert!(w.is_dangling());
    assert!(w.try_upgrade().is_err());
}

#[test]
fn get_mut_refuses_while_weak_made_by_departed_owner() {
    init();
    let mut granted = 0;
    for _ in 0..2000 {
        let mut a = Arc::new(0u64);
        let b = a.clone();
        let done = AtomicBool::new(false);
        let barrier = Barrier::new(2);

        let weak = thread::scope(|s| {
            let other = s.spawn(|| {
                barrier.wait();
                let w = Arc::downgrade(&b);
                drop(b);
                done.store(true, SeqCst);
                w
            });
            barrier.wait();
            // `b` becomes a weak pointer before it goes away, so `a` is
            // never the only reference during this round
            loop {
                let finished = done.load(SeqCst);
                if let Some(v) = Arc::get_mut(&mut a) {
                    *v += 1;
                    granted += 1;
                }
                if finished {
                    break;
                }
            }
            other.join().unwrap()
        });

        assert_eq!(Arc::weak_count(&a), 1);
        assert_eq!(weak.upgrade().map(|p| *p), Some(0));
    }
    assert_eq!(granted, 0);
}

#[test]
fn last_strong_and_last_weak_race() {
    init();
    for _ in 0..500 {
        let drops = AtomicUsize::new(0);
        let freed = AtomicUsize::new(0);
        let block = BlockPtr(Block::allocate(Tracked::new(&drops)));
        unsafe { block.0.as_ref().acquire_weak_from_strong() };
        let barrier = Barrier::new(2);

        thread::scope(|s| {
            s.spawn(|| {
                let b = block;
                barrier.wait();
                if unsafe { Block::release_weak(b.0) } {
                    freed.fetch_add(1, SeqCst);
                }
            });
            barrier.wait();
            match unsafe { Block::release_strong(block.0) } {
                Release::Freed => {
                    freed.fetch_add(1, SeqCst);
                }
                Release::ValueDestroyed => {}
                Release::Retained => panic!("last strong reference was retained"),
            }
        });

        assert_eq!(drops.load(SeqCst), 1);
        assert_eq!(freed.load(SeqCst), 1);
    }
}
