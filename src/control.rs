//! `ControlBlock<T, C>` is the bookkeeping shared by every handle to one
//! managed value: a strong count, a weak count, and the value itself, all in a
//! single allocation.
//!
//! The handles in [`crate::shared`] are thin wrappers over the operations
//! here. Code that wants different handle ergonomics can drive a block
//! directly:
//!
//! ```
//! use core::sync::atomic::AtomicUsize;
//! use ctrlrc::control::{ControlBlock, Release};
//!
//! let block = ControlBlock::<String, AtomicUsize>::allocate("hi".into());
//! unsafe {
//!     let b = block.as_ref();
//!     b.acquire_weak();
//!     assert_eq!((b.strong_count(), b.weak_count()), (1, 1));
//!
//!     assert_eq!(ControlBlock::release_strong(block), Release::ValueDestroyed);
//!     assert!(!block.as_ref().try_upgrade());
//!     assert!(ControlBlock::release_weak(block));
//! }
//! ```
//!
//! ## Counting scheme
//!
//! Strong owners collectively hold one weak reference. Whoever drops the value
//! gives that reference up, so the storage is freed by whichever release takes
//! the raw weak count to zero, and only by that one.
#![warn(missing_docs)]
use alloc::boxed::Box;
use core::{
    cell::UnsafeCell,
    mem::MaybeUninit,
    ptr::{self, NonNull},
};

use log::trace;

/// Counter primitive behind a [`ControlBlock`]. The only implementers are
/// `AtomicUsize` (see [`crate::arc`]) and `Cell<usize>` (see [`crate::rc`]).
///
/// It is `pub` so you can write code that's generic over atomicity, but there's
/// no reason to implement it for any other types.
///
/// # Safety
/// Trait is sealed.
pub unsafe trait Count: private::Sealed {
    #[doc(hidden)]
    fn new(v: usize) -> Self;
    #[doc(hidden)]
    fn get(&self) -> usize;
    #[doc(hidden)]
    fn inc_relaxed(&self) -> usize;
    #[doc(hidden)]
    fn set_release(&self, value: usize);
    #[doc(hidden)]
    fn inc_if_nonzero(&self) -> Option<usize>;
    #[doc(hidden)]
    fn inc_unless_locked(&self) -> usize;
    #[doc(hidden)]
    fn lock_if_one(&self) -> bool;
    #[doc(hidden)]
    fn claim_unique(&self) -> bool;
    #[doc(hidden)]
    fn dec(&self) -> usize;
    #[doc(hidden)]
    fn acquire_fence(&self);
}

/// Counts above this are treated as a leak; see [`ControlBlock::acquire_strong`].
pub(crate) const MAX_REFCOUNT: usize = isize::MAX as usize;

/// Weak count value while [`ControlBlock::is_unique`] has it locked.
pub(crate) const LOCKED: usize = usize::MAX;

/// What a release did to the block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum Release {
    /// Other strong references remain.
    Retained,
    /// This release destroyed the value; weak references keep the block.
    ValueDestroyed,
    /// This release destroyed the value and freed the block.
    Freed,
}

/// Observable lifecycle state of a block. A freed block can't be observed, so
/// there is no variant for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// At least one strong reference exists.
    Alive,
    /// Only weak references remain; the value has been dropped.
    ValueDestroyed,
}

/// Strong and weak counts plus the managed value.
pub struct ControlBlock<T, C: Count> {
    strong: C,
    // includes the one weak reference owned by all strong references
    weak: C,
    value: UnsafeCell<MaybeUninit<T>>,
}

unsafe impl<T: Send + Sync, C: Count + Sync> Send for ControlBlock<T, C> {}
unsafe impl<T: Send + Sync, C: Count + Sync> Sync for ControlBlock<T, C> {}

impl<T, C: Count> ControlBlock<T, C> {
    /// Allocates a block holding `value`, with `strong = 1, weak = 0`.
    pub fn allocate(value: T) -> NonNull<Self> {
        let b = Box::new(ControlBlock {
            strong: C::new(1),
            weak: C::new(1),
            value: UnsafeCell::new(MaybeUninit::new(value)),
        });
        NonNull::from(Box::leak(b))
    }

    /// Allocates a block whose value is not yet written. It starts with
    /// `strong = 0` and a single weak reference owned by the caller, so any
    /// attempt to upgrade fails until [`initialize`][Self::initialize].
    pub fn allocate_uninit() -> NonNull<Self> {
        let b = Box::new(ControlBlock {
            strong: C::new(0),
            weak: C::new(1),
            value: UnsafeCell::new(MaybeUninit::uninit()),
        });
        NonNull::from(Box::leak(b))
    }

    /// Writes the value of a block from [`allocate_uninit`][Self::allocate_uninit]
    /// and makes it alive. The caller's weak reference becomes the one owned
    /// collectively by the strong references, and the caller now holds the
    /// single strong reference.
    ///
    /// # Safety
    /// `this` must come from `allocate_uninit`, be initialized at most once,
    /// and the caller must own the weak reference created with it.
    pub unsafe fn initialize(this: NonNull<Self>, value: T) {
        let p = this.as_ptr();
        unsafe {
            (*(*p).value.get()).write(value);
            // upgrade does an acquire on the strong count, so publishing the
            // value needs a release
            debug_assert_eq!((*p).strong.get(), 0);
            (*p).strong.set_release(1);
        }
    }

    /// AcquireStrong: register one more strong owner.
    ///
    /// # Safety
    /// The caller must hold a strong reference, so the count is at least 1.
    /// Calling this from zero would resurrect a destroyed value.
    #[inline]
    pub unsafe fn acquire_strong(&self) {
        // A new reference can only be made from an existing one, which
        // already provides whatever synchronization is needed.
        let old = self.strong.inc_relaxed();
        debug_assert!(old > 0, "acquire_strong on a destroyed value");
        if old > MAX_REFCOUNT {
            refcount_overflow();
        }
    }

    /// ReleaseStrong: drop one strong owner. The caller that takes the count
    /// from 1 to 0 destroys the value, then gives up the weak reference the
    /// strong owners held, freeing the block if nothing else holds it.
    ///
    /// # Safety
    /// The caller must own a strong reference to the live block `this` and
    /// gives it up; `this` must not be used afterwards through that reference.
    pub unsafe fn release_strong(this: NonNull<Self>) -> Release {
        let p = this.as_ptr();
        unsafe {
            if (*p).strong.dec() != 1 {
                return Release::Retained;
            }
            // every prior use of the value through other strong references
            // happens-before the drop below
            (*p).strong.acquire_fence();
            ptr::drop_in_place((*(*p).value.get()).as_mut_ptr());
            trace!("control block {:p}: value destroyed", p);

            if Self::release_weak(this) {
                Release::Freed
            } else {
                Release::ValueDestroyed
            }
        }
    }

    /// AcquireWeak: register one more weak observer. Succeeds whether or not
    /// the value is still alive.
    ///
    /// Callers that hold a strong reference rather than a weak one must use
    /// [`acquire_weak_from_strong`][Self::acquire_weak_from_strong] instead.
    #[inline]
    pub fn acquire_weak(&self) {
        let old = self.weak.inc_relaxed();
        if old > MAX_REFCOUNT {
            refcount_overflow();
        }
    }

    /// AcquireWeak for a caller holding a strong reference. Waits out a
    /// concurrent [`is_unique`][Self::is_unique] check, which briefly locks
    /// the weak count.
    #[inline]
    pub fn acquire_weak_from_strong(&self) {
        let old = self.weak.inc_unless_locked();
        if old > MAX_REFCOUNT {
            refcount_overflow();
        }
    }

    /// ReleaseWeak: drop one weak observer. Returns `true` if this freed the
    /// block, which happens only once the value has been destroyed.
    ///
    /// # Safety
    /// The caller must own a weak reference to `this` and gives it up.
    pub unsafe fn release_weak(this: NonNull<Self>) -> bool {
        let p = this.as_ptr();
        unsafe {
            if (*p).weak.dec() != 1 {
                return false;
            }
            // freeing must happen-after the value was dropped by whichever
            // thread released the last strong reference
            (*p).weak.acquire_fence();
            debug_assert_eq!((*p).strong.get(), 0);
            // `MaybeUninit` means the value isn't dropped a second time here
            drop(Box::from_raw(p));
        }
        trace!("control block {:p}: freed", p);
        true
    }

    /// TryUpgrade: turn a weak reference into a strong one if the value is
    /// still alive. The check and the increment are one atomic step, so this
    /// never succeeds once the value has been destroyed.
    #[inline]
    pub fn try_upgrade(&self) -> bool {
        match self.strong.inc_if_nonzero() {
            Some(old) => {
                if old > MAX_REFCOUNT {
                    refcount_overflow();
                }
                true
            }
            None => false,
        }
    }

    /// GetStrongCount. Advisory only.
    pub fn strong_count(&self) -> usize {
        self.strong.get()
    }

    /// GetWeakCount. Advisory only; the weak reference held by the strong
    /// owners is not included.
    pub fn weak_count(&self) -> usize {
        let weak = self.weak.get();
        if weak == LOCKED {
            // only `is_unique` locks it, and only with no weak references
            return 0;
        }
        if self.strong.get() == 0 {
            weak
        } else {
            weak.saturating_sub(1)
        }
    }

    /// Lifecycle state as of some recent moment. Advisory only.
    pub fn state(&self) -> State {
        if self.strong.get() > 0 {
            State::Alive
        } else {
            State::ValueDestroyed
        }
    }

    /// Returns `true` if exactly one strong reference and no weak references
    /// exist. If the caller holds that strong reference exclusively, nobody
    /// else can create a new one.
    ///
    /// The weak count is locked while strong is read, so another strong owner
    /// can't downgrade and then drop its strong reference in between.
    pub fn is_unique(&self) -> bool {
        if !self.weak.lock_if_one() {
            return false;
        }
        let unique = self.strong.get() == 1;
        self.weak.set_release(1);
        if unique {
            // pairs with the Release decrement of any strong owner that just
            // went away, so their uses of the value happen-before ours
            self.strong.acquire_fence();
        }
        unique
    }

    /// Shared access to the value.
    ///
    /// # Safety
    /// The caller must hold a strong reference for as long as the returned
    /// borrow is used.
    #[inline]
    pub unsafe fn value(&self) -> &T {
        unsafe { (*self.value.get()).assume_init_ref() }
    }

    /// Mutable access to the value.
    ///
    /// # Safety
    /// The caller must hold a strong reference and no other reference to the
    /// value may be used while the returned borrow is live.
    #[inline]
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn value_mut(&self) -> &mut T {
        unsafe { (*self.value.get()).assume_init_mut() }
    }

    /// Like [`release_strong`][Self::release_strong], but only succeeds for
    /// the sole strong owner, and moves the value out instead of dropping it.
    /// On failure the caller keeps its strong reference.
    ///
    /// # Safety
    /// The caller must own a strong reference to `this`. On success that
    /// reference has been given up.
    pub unsafe fn try_take(this: NonNull<Self>) -> Option<T> {
        let p = this.as_ptr();
        unsafe {
            if !(*p).strong.claim_unique() {
                return None;
            }
            (*p).strong.acquire_fence();
            let value = (*(*p).value.get()).assume_init_read();
            trace!("control block {:p}: value taken", p);
            let _ = Self::release_weak(this);
            Some(value)
        }
    }
}

#[cold]
#[inline(never)]
fn refcount_overflow() -> ! {
    #[cfg(feature = "std")]
    std::process::abort();
    #[cfg(not(feature = "std"))]
    panic!("reference count overflow");
}

pub(crate) mod private {
    pub trait Sealed {}
}
