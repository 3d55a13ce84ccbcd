//! Thread-safe lifetime management for shared native resources.
//!
//! A [`Handle`] wraps one native resource and decides when it may be
//! destroyed:
//!
//! - callers borrow the resource with [`Handle::enter`], and it is never
//!   destroyed while borrowed;
//! - [`Handle::destroy`] destroys it right away, or as soon as the last
//!   borrower is done;
//! - [`Handle::require`] declares that another handle's resource must outlive
//!   this one, so the two are torn down in the right order.
//!
//! The native side is reached through the [`Resource`] trait. [`Capsule`] is
//! a ready-made implementation for raw pointers with a destructor.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use std::thread;
//!
//! use native_handle::{Capsule, Handle};
//!
//! fn main() -> native_handle::Result<()> {
//!     let node = Arc::new(Handle::new(Capsule::from_box("node", Box::new(0u32)))?);
//!     let timer = Arc::new(Handle::new(Capsule::from_box("timer", Box::new(0u32)))?);
//!
//!     // The node must outlive the timer.
//!     timer.require(&node)?;
//!
//!     let worker = {
//!         let timer = Arc::clone(&timer);
//!         thread::spawn(move || timer.with(|capsule| !capsule.as_ptr().is_null()))
//!     };
//!     assert!(worker.join().expect("worker panicked")?);
//!
//!     node.destroy(None)?;
//!     timer.destroy_then(|handle| println!("{} destroyed", handle.name()))?;
//!     Ok(())
//! }
//! ```

pub mod capsule;
pub mod error;
pub mod guard;
pub mod handle;
pub mod resource;
pub mod types;

// Re-export main types at the crate root
pub use capsule::{Capsule, CapsuleDestructor};
pub use error::{Error, Result};
pub use guard::HandleGuard;
pub use handle::{DestroyCallback, Handle};
pub use resource::{LifecycleKey, Resource};
pub use types::{HandleOptions, HandleState};

/// API version constants.
pub mod version {
    /// API major version.
    pub const MAJOR: u32 = 0;
    /// API minor version.
    pub const MINOR: u32 = 1;
    /// API patch version.
    pub const PATCH: u32 = 0;
}

/// Get the API version string (e.g., "0.1.0").
pub fn api_version() -> String {
    format!("{}.{}.{}", version::MAJOR, version::MINOR, version::PATCH)
}
