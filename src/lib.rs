/*!
This crate provides refcounted pointers, [`Arc`] and [`Rc`], built on a single
shared-ownership [`ControlBlock`]: one allocation holding the managed value, a
strong count, and a weak count.

The block is the interesting part. It destroys the value exactly once, when the
last strong owner lets go, and frees its own storage exactly once, when the
last owner of either kind lets go. Every operation is a short lock-free
sequence of atomic instructions, so any number of threads can share a block
without further locking.

```rust
    use ctrlrc::arc::{Arc, Weak};
    let a: Arc<[i32; 3]> = Arc::new([1, 2, 3]);
    let w: Weak<[i32; 3]> = Arc::downgrade(&a);

    // the weak pointer can be upgraded while `a` is around
    assert_eq!(w.upgrade().map(|p| p[1]), Some(2));

    // but not afterwards, even though the block itself is still allocated
    drop(a);
    assert!(w.upgrade().is_none());
    assert_eq!((w.strong_count(), w.weak_count()), (0, 1));
```

# Operations

Handles are thin glue over the block:

| handle operation         | block operation                    |
|--------------------------|------------------------------------|
| `Arc::new`               | [`ControlBlock::allocate`]         |
| `Arc::clone`             | [`ControlBlock::acquire_strong`]   |
| drop an `Arc`            | [`ControlBlock::release_strong`]   |
| `Arc::downgrade`         | [`ControlBlock::acquire_weak_from_strong`] |
| `Weak::clone`            | [`ControlBlock::acquire_weak`]     |
| drop a `Weak`            | [`ControlBlock::release_weak`]     |
| `Weak::upgrade`          | [`ControlBlock::try_upgrade`]      |

The block can also be driven directly; see the [`control`] module.

# Lifecycle

A block is `Alive` while the strong count is positive, then `ValueDestroyed`
while only weak pointers remain, then freed. Nothing moves backwards: once the
strong count reaches zero, [`Weak::try_upgrade`][shared::Weak::try_upgrade]
fails with [`Expired`] forever.

```
    use ctrlrc::{Rc, Expired};
    let a = Rc::new(String::from("x"));
    let w = Rc::downgrade(&a);
    drop(a);
    assert_eq!(w.try_upgrade().unwrap_err(), Expired);
```

# Notes

Unlike in std, `Rc` and `Arc` share a single generic implementation. `Rc<T>` is
an alias for `Shared<T, Cell<usize>>` and `Arc<T>` is an alias for
`Shared<T, AtomicUsize>`. The counter type is picked at compile time, so there
is no dynamic dispatch anywhere on the hot path.

Cycles are not collected. Break them with weak pointers, e.g. with
[`Shared::new_cyclic`].

If you leak so many pointers that a count would pass `isize::MAX`, the process
aborts, like std. Without the `std` feature there's no `abort()`, so it
panics instead.

Misusing the raw block operations (acquiring a strong reference on a dead
block, releasing twice) is undefined behaviour, which is why they are
`unsafe fn`. The handle types can't misuse them.
*/
#![no_std]
#[cfg(any(test, feature = "std"))]
extern crate std;

extern crate alloc;

pub mod arc;
pub mod control;
pub mod error;
pub mod rc;
pub mod shared;

pub use self::arc::Arc;
pub use self::control::{ControlBlock, Count, Release, State};
pub use self::error::Expired;
pub use self::rc::Rc;
pub use self::shared::Shared;
