//! `ctrlrc::arc::Arc<T>` is a thread-safe refcounted pointer over an atomic
//! [`ControlBlock`][crate::control::ControlBlock], very similar to
//! `std::sync::Arc<T>`.
//!
//! See [`Shared`] for the detailed API.
//!
//! ## See also
//!
//! `ctrlrc::rc::Rc<T>` in this crate is the nonatomic version for
//! single-threaded use.
use crate::control::{private, Count, LOCKED};
use crate::shared::{self, Shared};

use core::hint;
use core::sync::atomic::{
    AtomicUsize,
    Ordering::{Acquire, Relaxed, Release},
};

impl private::Sealed for AtomicUsize {}

unsafe impl Count for AtomicUsize {
    fn new(v: usize) -> Self {
        AtomicUsize::new(v)
    }

    fn get(&self) -> usize {
        // relaxed ordering as this is only advisory
        self.load(Relaxed)
    }

    fn inc_relaxed(&self) -> usize {
        self.fetch_add(1, Relaxed)
    }

    fn set_release(&self, value: usize) {
        self.store(value, Release)
    }

    fn inc_if_nonzero(&self) -> Option<usize> {
        // Acquire on success pairs with the Release decrement in
        // `release_strong`, so an upgraded pointer sees the live value.
        self.fetch_update(Acquire, Relaxed, |n| {
            if n == 0 {
                None
            } else {
                Some(n + 1)
            }
        })
        .ok()
    }

    fn inc_unless_locked(&self) -> usize {
        let mut cur = self.load(Relaxed);
        loop {
            if cur == LOCKED {
                hint::spin_loop();
                cur = self.load(Relaxed);
                continue;
            }
            // Acquire pairs with the Release unlock in `is_unique`
            match self.compare_exchange_weak(cur, cur + 1, Acquire, Relaxed) {
                Ok(old) => return old,
                Err(old) => cur = old,
            }
        }
    }

    fn lock_if_one(&self) -> bool {
        self.compare_exchange(1, LOCKED, Acquire, Relaxed).is_ok()
    }

    fn claim_unique(&self) -> bool {
        // Acquire is done by the caller with `acquire_fence` on success.
        self.compare_exchange(1, 0, Relaxed, Relaxed).is_ok()
    }

    fn dec(&self) -> usize {
        self.fetch_sub(1, Release)
    }

    fn acquire_fence(&self) {
        // either `fence()` or `load()` would work here, and either may be more
        // performant depending on platform details.
        self.load(Acquire);
    }
}

pub type Arc<T> = Shared<T, AtomicUsize>;
pub type Weak<T> = shared::Weak<T, AtomicUsize>;
