//! Scoped access to a handle's resource.

use std::fmt;
use std::ops::Deref;

use crate::handle::Handle;
use crate::resource::Resource;

/// A borrowed resource, released when the guard is dropped.
///
/// Returned by [`Handle::enter`]. The release also happens on early return
/// and while unwinding from a panic, so the handle's use count cannot leak.
///
/// # Example
///
/// ```
/// use native_handle::{Capsule, Handle};
///
/// fn publish(handle: &Handle<Capsule>) -> native_handle::Result<()> {
///     let capsule = handle.enter()?;
///     let _ptr = capsule.as_ptr();
///     Ok(())
/// }
///
/// let handle = Handle::new(Capsule::from_box("publisher", Box::new(1u8)))?;
/// publish(&handle)?;
/// assert_eq!(handle.use_count(), 0);
/// # Ok::<(), native_handle::Error>(())
/// ```
pub struct HandleGuard<'a, R: Resource> {
    handle: &'a Handle<R>,
    resource: &'a R,
}

impl<'a, R: Resource> HandleGuard<'a, R> {
    pub(crate) fn new(handle: &'a Handle<R>, resource: &'a R) -> Self {
        Self { handle, resource }
    }

    /// Get the handle this guard borrows from.
    pub fn handle(&self) -> &'a Handle<R> {
        self.handle
    }
}

impl<R: Resource> Deref for HandleGuard<'_, R> {
    type Target = R;

    fn deref(&self) -> &R {
        self.resource
    }
}

impl<R: Resource> Drop for HandleGuard<'_, R> {
    fn drop(&mut self) {
        self.handle.release();
    }
}

impl<R: Resource> fmt::Debug for HandleGuard<'_, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandleGuard")
            .field("handle", &self.handle.name())
            .finish()
    }
}
