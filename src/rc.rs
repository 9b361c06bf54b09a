//! `ctrlrc::rc::Rc<T>` is very similar to `std::rc::Rc<T>`: the same control
//! block as `ctrlrc::arc::Arc<T>`, with plain `Cell` counters.
//!
//! See [`Shared`] for the detailed API, as it's the same for both.
//!
//! ## See also
//!
//! `ctrlrc::arc::Arc<T>` in this crate is the atomic version for sharing
//! data across threads.
use crate::control::{private, Count, LOCKED};
use crate::shared::{self, Shared};
use core::cell::Cell;

impl private::Sealed for Cell<usize> {}

unsafe impl Count for Cell<usize> {
    fn new(v: usize) -> Self {
        Cell::new(v)
    }

    fn get(&self) -> usize {
        Cell::get(self)
    }

    fn inc_relaxed(&self) -> usize {
        let i = self.get();
        self.set(i + 1);
        i
    }

    fn set_release(&self, value: usize) {
        self.set(value);
    }

    fn inc_if_nonzero(&self) -> Option<usize> {
        let i = self.get();
        if i != 0 {
            self.set(i + 1);
            Some(i)
        } else {
            None
        }
    }

    fn inc_unless_locked(&self) -> usize {
        // single-threaded, so nobody can be holding the lock
        debug_assert_ne!(self.get(), LOCKED);
        self.inc_relaxed()
    }

    fn lock_if_one(&self) -> bool {
        if self.get() == 1 {
            self.set(LOCKED);
            true
        } else {
            false
        }
    }

    fn claim_unique(&self) -> bool {
        if self.get() == 1 {
            self.set(0);
            true
        } else {
            false
        }
    }

    fn dec(&self) -> usize {
        let i = self.get();
        self.set(i - 1);
        i
    }

    fn acquire_fence(&self) {}
}

pub type Rc<T> = Shared<T, Cell<usize>>;
pub type Weak<T> = shared::Weak<T, Cell<usize>>;
