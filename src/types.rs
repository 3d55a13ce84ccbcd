//! Type definitions and enums.

use std::fmt;

/// Observable lifecycle state of a [`Handle`](crate::Handle).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandleState {
    /// Valid, and destruction has not been requested.
    Active,
    /// Valid, destruction requested, waiting for active users to release.
    Draining,
    /// The resource has been destroyed. Terminal.
    Destroyed,
}

impl HandleState {
    /// Check if the resource may still be acquired in this state.
    pub fn is_valid(self) -> bool {
        !matches!(self, HandleState::Destroyed)
    }
}

impl fmt::Display for HandleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HandleState::Active => "active",
            HandleState::Draining => "draining",
            HandleState::Destroyed => "destroyed",
        };
        f.write_str(s)
    }
}

/// Options for wrapping a resource in a handle.
#[derive(Debug, Clone)]
pub struct HandleOptions {
    /// Diagnostic name; overrides the name reported by the resource.
    pub name: Option<String>,
    /// Tear the resource down when a handle that was never destroyed is dropped.
    pub destroy_on_drop: bool,
}

impl Default for HandleOptions {
    fn default() -> Self {
        Self {
            name: None,
            destroy_on_drop: true,
        }
    }
}
