//! Thread-safe handles around native resources.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::ptr;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, trace, warn};
use parking_lot::{Mutex, MutexGuard};

use crate::error::{Error, Result};
use crate::guard::HandleGuard;
use crate::resource::{LifecycleKey, Resource};
use crate::types::{HandleOptions, HandleState};

/// Callback run once a handle's resource has been destroyed.
pub type DestroyCallback<R> = Box<dyn FnOnce(&Handle<R>) + Send>;

struct State<R: Resource> {
    use_count: usize,
    destroy_requested: bool,
    callbacks: Vec<DestroyCallback<R>>,
}

/// Callbacks collected by a teardown, to be run once the lock is released.
#[must_use]
struct Teardown<R: Resource> {
    callbacks: Vec<DestroyCallback<R>>,
}

impl<R: Resource> Teardown<R> {
    /// Run the callbacks, last registered first.
    ///
    /// The queue was already taken out of the handle, so if a callback panics
    /// the panic reaches the caller and the callbacks after it are dropped
    /// without running. The handle itself stays destroyed.
    fn run(self, handle: &Handle<R>) {
        for callback in self.callbacks.into_iter().rev() {
            callback(handle);
        }
    }
}

/// Controls access to, and destruction of, one native resource.
///
/// Callers borrow the resource with [`enter`](Handle::enter) (or the raw
/// [`acquire`](Handle::acquire)/[`release`](Handle::release) pair). The
/// resource can be destroyed at any time with [`destroy`](Handle::destroy):
/// if nobody is using it, it is destroyed right away, otherwise destruction is
/// deferred until the last user releases it.
///
/// Share a handle between threads with `Arc<Handle<R>>`. Dropping a handle
/// that was never destroyed destroys its resource.
///
/// # Example
///
/// ```
/// use native_handle::{Capsule, Handle};
///
/// let handle = Handle::new(Capsule::from_box("publisher", Box::new(42u32)))?;
///
/// {
///     let capsule = handle.enter()?;
///     assert!(!capsule.as_ptr().is_null());
///
///     // Deferred: the capsule is still in use.
///     handle.destroy(None)?;
///     assert!(handle.is_valid());
/// }
///
/// assert!(!handle.is_valid());
/// assert!(handle.enter().is_err());
/// # Ok::<(), native_handle::Error>(())
/// ```
pub struct Handle<R: Resource> {
    resource: R,
    identity: usize,
    name: String,
    // Only written with `state` locked.
    valid: AtomicBool,
    destroy_on_drop: bool,
    state: Mutex<State<R>>,
}

impl<R: Resource> Handle<R> {
    /// Wrap a resource.
    ///
    /// Fails with [`Error::Construction`] if the resource cannot report its
    /// identity.
    pub fn new(resource: R) -> Result<Self> {
        Self::with_options(resource, HandleOptions::default())
    }

    /// Wrap a resource with custom options.
    pub fn with_options(resource: R, options: HandleOptions) -> Result<Self> {
        let identity = resource.identity()?;
        let name = options.name.unwrap_or_else(|| resource.name());
        debug!("wrapping '{}' at {:#x}", name, identity);

        Ok(Self {
            resource,
            identity,
            name,
            valid: AtomicBool::new(true),
            destroy_on_drop: options.destroy_on_drop,
            state: Mutex::new(State {
                use_count: 0,
                destroy_requested: false,
                callbacks: Vec::new(),
            }),
        })
    }

    /// Get the identity of the managed resource.
    pub fn identity(&self) -> usize {
        self.identity
    }

    /// Get the name of the managed resource.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Check if the resource has not been destroyed yet.
    pub fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }

    /// Get the current lifecycle state.
    pub fn state(&self) -> HandleState {
        let state = self.state.lock();
        if !self.is_valid() {
            HandleState::Destroyed
        } else if state.destroy_requested {
            HandleState::Draining
        } else {
            HandleState::Active
        }
    }

    /// Number of callers currently holding the resource.
    pub fn use_count(&self) -> usize {
        self.state.lock().use_count
    }

    /// Borrow the resource.
    ///
    /// Every successful call must be paired with exactly one
    /// [`release`](Handle::release). Prefer [`enter`](Handle::enter), which
    /// releases automatically.
    pub fn acquire(&self) -> Result<&R> {
        let mut state = self.state.lock();
        if !self.is_valid() {
            return Err(Error::invalid_handle(&self.name, "acquire"));
        }
        state.use_count += 1;
        trace!("acquired '{}' (use count {})", self.name, state.use_count);
        Ok(&self.resource)
    }

    /// Give back a resource obtained with [`acquire`](Handle::acquire).
    ///
    /// If destruction was requested and this was the last user, the resource
    /// is destroyed before this returns.
    ///
    /// # Panics
    ///
    /// Panics if there is no matching `acquire`.
    pub fn release(&self) {
        let teardown = {
            let mut state = self.state.lock();
            assert!(
                state.use_count > 0,
                "release of '{}' without a matching acquire",
                self.name
            );
            state.use_count -= 1;
            trace!("released '{}' (use count {})", self.name, state.use_count);

            if state.use_count == 0 && state.destroy_requested {
                Some(self.teardown(&mut state))
            } else {
                None
            }
        };

        if let Some(teardown) = teardown {
            teardown.run(self);
        }
    }

    /// Borrow the resource until the returned guard is dropped.
    pub fn enter(&self) -> Result<HandleGuard<'_, R>> {
        let resource = self.acquire()?;
        Ok(HandleGuard::new(self, resource))
    }

    /// Run `f` with the resource borrowed.
    pub fn with<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&R) -> T,
    {
        let guard = self.enter()?;
        Ok(f(&guard))
    }

    /// Destroy the resource as soon as nobody is using it.
    ///
    /// `then` is called with this handle once the resource is destroyed.
    /// Callbacks run in reverse registration order.
    ///
    /// Fails with [`Error::InvalidHandle`] if the resource was already
    /// destroyed.
    pub fn destroy(&self, then: Option<DestroyCallback<R>>) -> Result<()> {
        let teardown = {
            let mut state = self.state.lock();
            self.request_destroy(&mut state, then)?
        };

        if let Some(teardown) = teardown {
            teardown.run(self);
        }
        Ok(())
    }

    /// Shorthand for [`destroy`](Handle::destroy) with a callback.
    pub fn destroy_then<F>(&self, then: F) -> Result<()>
    where
        F: FnOnce(&Handle<R>) + Send + 'static,
    {
        self.destroy(Some(Box::new(then)))
    }

    /// Declare that `dependency`'s resource must outlive this handle's.
    ///
    /// The ordering is recorded by the resource layer. If `dependency` was
    /// already destroyed the ordering can no longer be honoured, so this
    /// handle destroys itself instead.
    pub fn require(&self, dependency: &Handle<R>) -> Result<()> {
        if ptr::eq(self, dependency) {
            let _state = self.state.lock();
            if !self.is_valid() {
                return Err(Error::invalid_handle(&self.name, "require"));
            }
            return Err(Error::InvalidArgument(format!(
                "handle '{}' cannot require itself",
                self.name
            )));
        }

        let teardown = {
            let (mut mine, _theirs) = self.lock_pair(dependency);
            if !self.is_valid() {
                return Err(Error::invalid_handle(&self.name, "require"));
            }

            if dependency.is_valid() {
                self.resource
                    .add_dependency(&dependency.resource, LifecycleKey::new())?;
                debug!("'{}' requires '{}'", self.name, dependency.name);
                None
            } else {
                warn!(
                    "'{}' required '{}' after it was destroyed, destroying '{}'",
                    self.name, dependency.name, self.name
                );
                self.request_destroy(&mut mine, None)?
            }
        };

        if let Some(teardown) = teardown {
            teardown.run(self);
        }
        Ok(())
    }

    fn request_destroy(
        &self,
        state: &mut State<R>,
        then: Option<DestroyCallback<R>>,
    ) -> Result<Option<Teardown<R>>> {
        if !self.is_valid() {
            return Err(Error::invalid_handle(&self.name, "destroy"));
        }
        if let Some(callback) = then {
            state.callbacks.push(callback);
        }
        state.destroy_requested = true;

        if state.use_count == 0 {
            Ok(Some(self.teardown(state)))
        } else {
            debug!(
                "destroy of '{}' deferred ({} users)",
                self.name, state.use_count
            );
            Ok(None)
        }
    }

    /// Destroy the resource. `state` must come from this handle's lock.
    fn teardown(&self, state: &mut State<R>) -> Teardown<R> {
        assert_eq!(
            state.use_count, 0,
            "teardown of '{}' while it is in use",
            self.name
        );
        assert!(
            state.destroy_requested,
            "teardown of '{}' without a destroy request",
            self.name
        );
        assert!(self.is_valid(), "teardown of '{}' ran twice", self.name);

        self.valid.store(false, Ordering::Release);
        self.resource.destroy(LifecycleKey::new());
        debug!("destroyed '{}'", self.name);

        Teardown {
            callbacks: std::mem::take(&mut state.callbacks),
        }
    }

    fn lock_order(&self) -> (usize, usize) {
        (self.identity, self as *const Self as usize)
    }

    /// Lock this handle and `other` in a global order.
    fn lock_pair<'a>(
        &'a self,
        other: &'a Handle<R>,
    ) -> (MutexGuard<'a, State<R>>, MutexGuard<'a, State<R>>) {
        if self.lock_order() < other.lock_order() {
            let mine = self.state.lock();
            let theirs = other.state.lock();
            (mine, theirs)
        } else {
            let theirs = other.state.lock();
            let mine = self.state.lock();
            (mine, theirs)
        }
    }
}

impl<R: Resource> Drop for Handle<R> {
    fn drop(&mut self) {
        if !self.destroy_on_drop || !self.is_valid() {
            return;
        }

        let teardown = {
            let mut state = self.state.lock();
            if state.use_count > 0 {
                warn!(
                    "'{}' dropped with {} unreleased acquisitions",
                    self.name, state.use_count
                );
                state.use_count = 0;
            }
            state.destroy_requested = true;
            self.teardown(&mut state)
        };
        teardown.run(self);
    }
}

impl<R: Resource> PartialEq for Handle<R> {
    fn eq(&self, other: &Self) -> bool {
        self.identity == other.identity
    }
}

impl<R: Resource> Eq for Handle<R> {}

impl<R: Resource> Hash for Handle<R> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identity.hash(state);
    }
}

impl<R: Resource> fmt::Debug for Handle<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("name", &self.name)
            .field("identity", &format_args!("{:#x}", self.identity))
            .field("state", &self.state())
            .finish()
    }
}

impl<R: Resource> fmt::Display for Handle<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{:#x}", self.name, self.identity)
    }
}
