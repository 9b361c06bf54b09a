//! Errors reported by weak pointers.

/// Returned by [`Weak::try_upgrade`][crate::shared::Weak::try_upgrade] once
/// every strong pointer has been dropped. This is an expected outcome, not a
/// fault: the value is gone and can never come back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("the shared value has already been destroyed")]
pub struct Expired;
