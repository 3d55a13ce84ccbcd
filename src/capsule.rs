//! Reference-counted native objects.
//!
//! A [`Capsule`] is the stock [`Resource`] implementation. It wraps a raw
//! pointer together with the destructor that frees it. The pointer lives in a
//! shared, reference-counted core:
//!
//! - every `Capsule` (and every clone of it) holds one reference to the core;
//! - [`Resource::add_dependency`] makes the dependent core hold a reference to
//!   the dependency core;
//! - when the last reference to a core goes away, its destructor runs, and only
//!   then are its own dependencies released.
//!
//! A dependency is therefore never freed while a dependent still exists, no
//! matter in which order the owning handles are destroyed.

use std::fmt;
use std::os::raw::c_void;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use log::debug;
use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::resource::{LifecycleKey, Resource};

/// Destructor for the native object wrapped by a [`Capsule`].
pub type CapsuleDestructor = unsafe extern "C" fn(*mut c_void);

// Capsule identities are never reused, even after the native object is freed.
static NEXT_ID: AtomicUsize = AtomicUsize::new(1);

struct Core {
    name: String,
    ptr: *mut c_void,
    destructor: CapsuleDestructor,
    dependencies: Mutex<Vec<Arc<Core>>>,
}

impl Drop for Core {
    fn drop(&mut self) {
        debug!("freeing native object '{}' at {:p}", self.name, self.ptr);
        unsafe {
            (self.destructor)(self.ptr);
        }

        // Release dependencies only now, so they outlive the object. A core
        // whose last reference is ours hands its own dependencies over before
        // it drops, which keeps long chains off the stack.
        let mut pending = std::mem::take(self.dependencies.get_mut());
        while let Some(dependency) = pending.pop() {
            if let Ok(mut core) = Arc::try_unwrap(dependency) {
                pending.append(core.dependencies.get_mut());
            }
        }
    }
}

// The core only hands the pointer to its destructor, exactly once.
unsafe impl Send for Core {}
unsafe impl Sync for Core {}

/// A native pointer with a destructor and a list of dependencies.
///
/// # Example
///
/// ```
/// use native_handle::{Capsule, Handle};
///
/// let clock = Handle::new(Capsule::from_box("clock", Box::new(0u64)))?;
/// let timer = Handle::new(Capsule::from_box("timer", Box::new(1u64)))?;
/// timer.require(&clock)?;
///
/// // The clock handle is gone, but its native object lives until the timer
/// // is destroyed.
/// clock.destroy(None)?;
/// timer.destroy(None)?;
/// # Ok::<(), native_handle::Error>(())
/// ```
pub struct Capsule {
    name: String,
    id: usize,
    core: Mutex<Option<Arc<Core>>>,
}

impl Capsule {
    /// Wrap a raw pointer and its destructor.
    ///
    /// A null `ptr` produces an invalid capsule, which handles refuse to wrap.
    ///
    /// # Safety
    ///
    /// `ptr` must be valid to pass to `destructor`, must not be freed by
    /// anyone else, and the object behind it must be safe to use from any
    /// thread.
    pub unsafe fn new(name: &str, ptr: *mut c_void, destructor: CapsuleDestructor) -> Self {
        if ptr.is_null() {
            return Self::invalid(name);
        }

        let core = Arc::new(Core {
            name: name.to_string(),
            ptr,
            destructor,
            dependencies: Mutex::new(Vec::new()),
        });

        Self {
            name: name.to_string(),
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            core: Mutex::new(Some(core)),
        }
    }

    /// Wrap a boxed Rust value. The destructor drops the box.
    pub fn from_box<T: Send + Sync + 'static>(name: &str, value: Box<T>) -> Self {
        unsafe extern "C" fn drop_box<T>(ptr: *mut c_void) {
            drop(Box::from_raw(ptr.cast::<T>()));
        }

        let ptr = Box::into_raw(value).cast::<c_void>();
        unsafe { Self::new(name, ptr, drop_box::<T>) }
    }

    /// Create an invalid (null) capsule.
    pub fn invalid(name: &str) -> Self {
        Self {
            name: name.to_string(),
            id: 0,
            core: Mutex::new(None),
        }
    }

    /// Get the wrapped pointer, or null once this capsule was released.
    pub fn as_ptr(&self) -> *mut c_void {
        match self.core.lock().as_ref() {
            Some(core) => core.ptr,
            None => std::ptr::null_mut(),
        }
    }

    /// Check if this capsule has given up its reference to the native object.
    pub fn is_released(&self) -> bool {
        self.core.lock().is_none()
    }

    /// Number of references to the native object (capsules and dependents).
    pub fn ref_count(&self) -> usize {
        self.core.lock().as_ref().map_or(0, Arc::strong_count)
    }

    /// Number of dependencies recorded on the native object.
    pub fn dependency_count(&self) -> usize {
        self.core
            .lock()
            .as_ref()
            .map_or(0, |core| core.dependencies.lock().len())
    }

    fn shared_core(&self, op: &'static str) -> Result<Arc<Core>> {
        self.core
            .lock()
            .clone()
            .ok_or_else(|| Error::invalid_handle(&self.name, op))
    }
}

impl Resource for Capsule {
    fn identity(&self) -> Result<usize> {
        if self.id == 0 {
            return Err(Error::Construction(format!(
                "capsule '{}' wraps a null pointer",
                self.name
            )));
        }
        if self.is_released() {
            return Err(Error::Construction(format!(
                "capsule '{}' was already released",
                self.name
            )));
        }
        Ok(self.id)
    }

    fn name(&self) -> String {
        self.name.clone()
    }

    fn destroy(&self, _key: LifecycleKey) {
        let core = self.core.lock().take();
        if let Some(core) = core {
            debug!(
                "releasing capsule '{}' ({} references left)",
                self.name,
                Arc::strong_count(&core) - 1
            );
        }
    }

    fn add_dependency(&self, dependency: &Self, _key: LifecycleKey) -> Result<()> {
        let dependent = self.shared_core("link")?;
        let dependency = dependency.shared_core("link to")?;

        if Arc::ptr_eq(&dependent, &dependency) {
            return Err(Error::InvalidArgument(format!(
                "capsule '{}' cannot depend on itself",
                self.name
            )));
        }

        debug!("capsule '{}' now depends on '{}'", dependent.name, dependency.name);
        dependent.dependencies.lock().push(dependency);
        Ok(())
    }
}

impl Clone for Capsule {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            id: self.id,
            core: Mutex::new(self.core.lock().clone()),
        }
    }
}

impl fmt::Debug for Capsule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Capsule")
            .field("name", &self.name)
            .field("id", &self.id)
            .field("released", &self.is_released())
            .finish()
    }
}
