//! `ctrlrc::shared::Shared<T, C>` implements `Arc` and `Rc` generically across
//! the count type (atomic vs. nonatomic).
//!
//! Every operation here maps onto one [`ControlBlock`] operation: cloning is
//! `acquire_strong`, dropping is `release_strong`, `downgrade` is
//! `acquire_weak`, and `Weak::upgrade` is `try_upgrade`.
//!
//! ## See also
//!
//! `ctrlrc::arc::Arc<T>` in this crate is the atomic version for sharing data
//! across threads.
//!
//! `ctrlrc::rc::Rc<T>` in this crate is the nonatomic version for
//! single-threaded use.
#![warn(missing_docs)]
use crate::control::{ControlBlock, Count};
use crate::error::Expired;
use core::{
    borrow, cmp, fmt, hash,
    marker::PhantomData,
    mem,
    ops::Deref,
    pin::Pin,
    ptr::NonNull,
};

/// Generic implementation behind [`Rc`][crate::Rc] and [`Arc`][crate::Arc].
/// Holds one strong reference to its control block.
pub struct Shared<T, C: Count> {
    block: NonNull<ControlBlock<T, C>>,
    // we own a `T` as far as drop check is concerned
    phantom: PhantomData<T>,
}

/// Generic implementation behind `rc::Weak` and `arc::Weak`, distinguished
/// by `Count`. Holds one weak reference to its control block.
pub struct Weak<T, C: Count> {
    block: NonNull<ControlBlock<T, C>>,
}

// Only a `Sync` counter (i.e. `AtomicUsize`) makes handles shareable across
// threads. Any thread may see `&T` or be the one that drops `T`.
unsafe impl<T: Send + Sync, C: Count + Sync> Send for Shared<T, C> {}
unsafe impl<T: Send + Sync, C: Count + Sync> Sync for Shared<T, C> {}
unsafe impl<T: Send + Sync, C: Count + Sync> Send for Weak<T, C> {}
unsafe impl<T: Send + Sync, C: Count + Sync> Sync for Weak<T, C> {}

impl<T, C: Count> Shared<T, C> {
    /// Constructs a new `Shared<T, C>` with the given value.
    pub fn new(value: T) -> Self {
        Shared {
            block: ControlBlock::allocate(value),
            phantom: PhantomData,
        }
    }

    /// Constructs a new `Shared<T, C>` while giving you a `Weak<T, C>` to the
    /// allocation, to allow you to construct a `T` which holds a weak pointer
    /// to itself.
    ///
    /// See `std::rc::Rc::new_cyclic` for more details.
    pub fn new_cyclic<F>(data_fn: F) -> Self
    where
        F: FnOnce(&Weak<T, C>) -> T,
    {
        // Construct the block in the "uninitialized" state with a single weak
        // reference. Strong stays 0 so that if `data_fn` panics, the weak
        // drop frees the block without touching the missing value.
        let weak = Weak {
            block: ControlBlock::allocate_uninit(),
        };
        let value = data_fn(&weak);

        // Safety: we own the only weak reference from `allocate_uninit`, which
        // now becomes the one held collectively by strong references.
        unsafe { ControlBlock::initialize(weak.block, value) };
        let strong = Shared {
            block: weak.block,
            phantom: PhantomData,
        };
        mem::forget(weak);
        strong
    }

    /// Constructs a new `Pin<Shared<T, C>>`. If `T` does not implement
    /// `Unpin`, then `value` will be pinned in memory and unable to be moved.
    pub fn pin(value: T) -> Pin<Self> {
        // Safety: the value lives in the block and never moves until dropped
        unsafe { Pin::new_unchecked(Self::new(value)) }
    }

    /// Return a [`Weak`] pointer to this object.
    pub fn downgrade(this: &Self) -> Weak<T, C> {
        this.block().acquire_weak_from_strong();
        Weak { block: this.block }
    }

    /// Returns the inner value if `this` is the only strong reference.
    /// Otherwise the same pointer is handed back. Outstanding weak pointers
    /// don't prevent this, but can no longer be upgraded.
    pub fn try_unwrap(this: Self) -> Result<T, Self> {
        // Safety: we hold a strong reference, and forget it on success
        match unsafe { ControlBlock::try_take(this.block) } {
            Some(value) => {
                mem::forget(this);
                Ok(value)
            }
            None => Err(this),
        }
    }

    /// Returns a mutable reference into the given `Shared`, without any check.
    ///
    /// See also [`get_mut`], which is safe and does appropriate checks.
    ///
    /// [`get_mut`]: Shared::get_mut
    ///
    /// # Safety
    ///
    /// If any other `Shared` or [`Weak`] pointers to the same allocation exist,
    /// then they must not be dereferenced or have active borrows for the
    /// duration of the returned borrow.
    pub unsafe fn get_mut_unchecked(this: &mut Self) -> &mut T {
        unsafe { this.block().value_mut() }
    }

    /// Returns a mutable reference if there are no other `Shared` or [`Weak`]
    /// pointers to this allocation.
    #[inline]
    pub fn get_mut(this: &mut Self) -> Option<&mut T> {
        if this.block().is_unique() {
            unsafe { Some(Shared::get_mut_unchecked(this)) }
        } else {
            None
        }
    }

    /// Returns true if two `Shared` pointers share the same control block.
    pub fn ptr_eq(this: &Self, other: &Self) -> bool {
        this.block == other.block
    }

    /// Get the current strong count of this pointer.
    pub fn strong_count(this: &Self) -> usize {
        this.block().strong_count()
    }

    /// Get the current weak count of this pointer.
    pub fn weak_count(this: &Self) -> usize {
        this.block().weak_count()
    }

    fn block(&self) -> &ControlBlock<T, C> {
        // Safety: our strong reference keeps the block allocated.
        unsafe { self.block.as_ref() }
    }
}

impl<T, C: Count> Weak<T, C> {
    /// Attempts to get a strong pointer, returning `None` if the value has
    /// already been destroyed.
    pub fn upgrade(&self) -> Option<Shared<T, C>> {
        self.try_upgrade().ok()
    }

    /// Like [`upgrade`][Weak::upgrade], with the failure as an error value.
    pub fn try_upgrade(&self) -> Result<Shared<T, C>, Expired> {
        if self.block().try_upgrade() {
            Ok(Shared {
                block: self.block,
                phantom: PhantomData,
            })
        } else {
            Err(Expired)
        }
    }

    /// Get the current strong count of this pointer.
    pub fn strong_count(&self) -> usize {
        self.block().strong_count()
    }

    /// Get the current weak count of this pointer.
    pub fn weak_count(&self) -> usize {
        self.block().weak_count()
    }

    /// Returns true if all strong pointers have been dropped,
    /// so `upgrade` will return None.
    pub fn is_dangling(&self) -> bool {
        self.strong_count() == 0
    }

    /// Returns true if both weak pointers share a control block.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        self.block == other.block
    }

    fn block(&self) -> &ControlBlock<T, C> {
        // Safety: our weak reference keeps the block allocated, even after
        // the value is gone.
        unsafe { self.block.as_ref() }
    }
}

impl<T, C: Count> Deref for Shared<T, C> {
    type Target = T;

    fn deref(&self) -> &T {
        // Safety: we hold a strong reference
        unsafe { self.block().value() }
    }
}

impl<T, C: Count> Clone for Shared<T, C> {
    fn clone(&self) -> Self {
        // Safety: we hold a strong reference
        unsafe { self.block().acquire_strong() };
        Shared {
            block: self.block,
            phantom: PhantomData,
        }
    }
}

impl<T, C: Count> Clone for Weak<T, C> {
    fn clone(&self) -> Self {
        self.block().acquire_weak();
        Weak { block: self.block }
    }
}

impl<T, C: Count> Drop for Shared<T, C> {
    fn drop(&mut self) {
        // Safety: we own a strong reference and are giving it up
        let _ = unsafe { ControlBlock::release_strong(self.block) };
    }
}

impl<T, C: Count> Drop for Weak<T, C> {
    fn drop(&mut self) {
        // Safety: we own a weak reference and are giving it up
        let _ = unsafe { ControlBlock::release_weak(self.block) };
    }
}

impl<T, C: Count> AsRef<T> for Shared<T, C> {
    fn as_ref(&self) -> &T {
        self
    }
}

impl<T, C: Count> borrow::Borrow<T> for Shared<T, C> {
    fn borrow(&self) -> &T {
        self
    }
}

impl<T: Default, C: Count> Default for Shared<T, C> {
    fn default() -> Self {
        Shared::new(T::default())
    }
}

impl<T, C: Count> From<T> for Shared<T, C> {
    fn from(value: T) -> Self {
        Shared::new(value)
    }
}

impl<T: PartialEq, C: Count> PartialEq for Shared<T, C> {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        **self == **other
    }
}

impl<T: Eq, C: Count> Eq for Shared<T, C> {}

impl<T: PartialOrd, C: Count> PartialOrd for Shared<T, C> {
    fn partial_cmp(&self, other: &Self) -> Option<cmp::Ordering> {
        (**self).partial_cmp(&**other)
    }
}

impl<T: Ord, C: Count> Ord for Shared<T, C> {
    fn cmp(&self, other: &Self) -> cmp::Ordering {
        (**self).cmp(&**other)
    }
}

impl<T: hash::Hash, C: Count> hash::Hash for Shared<T, C> {
    fn hash<H: hash::Hasher>(&self, state: &mut H) {
        (**self).hash(state)
    }
}

impl<T: fmt::Display, C: Count> fmt::Display for Shared<T, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&**self, f)
    }
}

impl<T: fmt::Debug, C: Count> fmt::Debug for Shared<T, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}

impl<T, C: Count> fmt::Pointer for Shared<T, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Pointer::fmt(&(&**self as *const T), f)
    }
}

impl<T, C: Count> fmt::Debug for Weak<T, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(Weak)")
    }
}
