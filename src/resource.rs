//! The contract between a [`Handle`](crate::Handle) and the layer that owns
//! the native resource.
//!
//! A handle never creates, inspects or frees the resource itself. It only
//! calls these operations, under its own lock, at the points its state
//! machine allows.

use std::fmt;

use crate::error::Result;

/// Proof that a lifecycle call comes from a [`Handle`](crate::Handle).
///
/// Only this crate can create one, so the lifecycle methods of a borrowed
/// resource cannot be called from outside:
///
/// ```compile_fail
/// use native_handle::{Capsule, Handle, Resource};
///
/// let handle = Handle::new(Capsule::from_box("publisher", Box::new(1u8))).unwrap();
/// let capsule = handle.enter().unwrap();
/// capsule.destroy(native_handle::LifecycleKey { _private: () });
/// ```
pub struct LifecycleKey {
    _private: (),
}

impl LifecycleKey {
    pub(crate) fn new() -> Self {
        Self { _private: () }
    }
}

impl fmt::Debug for LifecycleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("LifecycleKey")
    }
}

/// An opaque native resource token.
///
/// Implementors own the actual native object. [`Capsule`](crate::Capsule) is
/// the stock implementation.
pub trait Resource: Send + Sync {
    /// Stable identity of the native object, never reused for another one.
    ///
    /// Returns [`Error::Construction`](crate::Error::Construction) when the
    /// token is malformed. Called once, when the handle is created.
    fn identity(&self) -> Result<usize>;

    /// Diagnostic name of the resource.
    fn name(&self) -> String;

    /// Destroy the native resource.
    ///
    /// Called at most once per handle, and only when nobody holds the
    /// resource. If other resources were linked to this one through
    /// [`add_dependency`](Resource::add_dependency), the implementation is
    /// responsible for keeping this resource's dependencies alive as long as
    /// it needs them.
    fn destroy(&self, key: LifecycleKey);

    /// Record that `dependency` must be destroyed no earlier than `self`.
    fn add_dependency(&self, dependency: &Self, key: LifecycleKey) -> Result<()>;
}
