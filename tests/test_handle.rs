//! Lifecycle tests for a single handle.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use native_handle::{Capsule, Error, Handle, HandleOptions, HandleState};
use parking_lot::Mutex;

/// Native object that counts how often it has been freed.
struct Counted(Arc<AtomicUsize>);

impl Drop for Counted {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

fn counted(name: &str) -> (Handle<Capsule>, Arc<AtomicUsize>) {
    let frees = Arc::new(AtomicUsize::new(0));
    let capsule = Capsule::from_box(name, Box::new(Counted(Arc::clone(&frees))));
    let handle = Handle::new(capsule).expect("Handle::new should succeed");
    (handle, frees)
}

#[test]
fn test_api_version() {
    let version = native_handle::api_version();
    assert_eq!(version, "0.1.0", "Expected API version 0.1.0, got {}", version);
}

#[test]
fn test_construction_rejects_invalid_capsule() {
    let err = Handle::new(Capsule::invalid("broken")).unwrap_err();
    assert!(err.is_construction(), "expected construction error, got {}", err);
}

#[test]
fn test_immediate_destruction() {
    let (handle, frees) = counted("immediate");

    handle.destroy(None).expect("destroy should succeed");

    assert_eq!(frees.load(Ordering::SeqCst), 1, "destructor should have run");
    assert!(!handle.is_valid(), "handle should be invalid after destroy");
    assert_eq!(handle.state(), HandleState::Destroyed);
}

#[test]
fn test_deferred_destruction() {
    let (handle, frees) = counted("deferred");

    let capsule = handle.acquire().expect("acquire should succeed");
    assert!(!capsule.as_ptr().is_null());
    assert_eq!(handle.use_count(), 1);

    handle.destroy(None).expect("destroy should succeed");
    assert_eq!(
        frees.load(Ordering::SeqCst),
        0,
        "destructor must wait for release"
    );
    assert!(handle.is_valid(), "handle stays valid while draining");

    handle.release();
    assert_eq!(frees.load(Ordering::SeqCst), 1, "destructor should run once");
    assert!(!handle.is_valid());
}

#[test]
fn test_no_use_after_destroy() {
    let (handle, frees) = counted("gone");

    for _ in 0..3 {
        handle.with(|_| ()).expect("use before destroy should succeed");
    }
    handle.destroy(None).expect("destroy should succeed");

    for _ in 0..3 {
        let err = handle.acquire().unwrap_err();
        assert!(err.is_invalid_handle(), "expected invalid handle, got {}", err);
        assert!(handle.enter().is_err());
        assert!(handle.with(|_| ()).is_err());
    }
    assert_eq!(frees.load(Ordering::SeqCst), 1);
    assert_eq!(handle.use_count(), 0, "failed acquires must not count");
}

#[test]
fn test_double_destroy_rejected() {
    let (handle, frees) = counted("twice");

    handle.destroy(None).expect("first destroy should succeed");
    let err = handle.destroy(None).unwrap_err();

    assert_eq!(
        err,
        Error::InvalidHandle {
            name: "twice".to_string(),
            op: "destroy",
        }
    );
    assert_eq!(frees.load(Ordering::SeqCst), 1, "destructor must not re-run");
}

#[test]
fn test_callbacks_run_last_in_first_out() {
    let (handle, _) = counted("callbacks");
    let order = Arc::new(Mutex::new(Vec::new()));

    let _guard = handle.enter().expect("enter should succeed");
    {
        let order = Arc::clone(&order);
        handle
            .destroy_then(move |h| order.lock().push(("c1", h.name().to_string())))
            .expect("destroy should succeed");
    }
    {
        let order = Arc::clone(&order);
        handle
            .destroy_then(move |h| order.lock().push(("c2", h.name().to_string())))
            .expect("destroy should succeed");
    }
    assert!(order.lock().is_empty(), "callbacks wait for the last release");

    drop(_guard);
    assert_eq!(
        *order.lock(),
        vec![
            ("c2", "callbacks".to_string()),
            ("c1", "callbacks".to_string())
        ]
    );
}

#[test]
fn test_callback_receives_destroyed_handle() {
    let (handle, _) = counted("reentrant");
    let seen = Arc::new(Mutex::new(None));

    let sink = Arc::clone(&seen);
    handle
        .destroy_then(move |h| {
            // The handle is usable from inside its own callback.
            let state = h.state();
            let rejected = h.acquire().is_err();
            *sink.lock() = Some((h.is_valid(), state, rejected));
        })
        .expect("destroy should succeed");

    assert_eq!(
        *seen.lock(),
        Some((false, HandleState::Destroyed, true)),
        "callback should see a destroyed handle"
    );
}

#[test]
fn test_guard_releases_on_early_return() {
    fn fails(handle: &Handle<Capsule>) -> native_handle::Result<()> {
        let _capsule = handle.enter()?;
        Err(Error::InvalidArgument("bail out".to_string()))
    }

    let (handle, frees) = counted("early");
    assert!(fails(&handle).is_err());
    assert_eq!(handle.use_count(), 0, "guard should release on early return");

    handle.destroy(None).expect("destroy should succeed");
    assert_eq!(frees.load(Ordering::SeqCst), 1);
}

#[test]
fn test_guard_releases_on_panic() {
    let (handle, frees) = counted("panic");

    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        let _capsule = handle.enter().expect("enter should succeed");
        handle.destroy(None).expect("destroy should succeed");
        panic!("user code failed");
    }));

    assert!(result.is_err());
    assert_eq!(handle.use_count(), 0);
    assert_eq!(
        frees.load(Ordering::SeqCst),
        1,
        "unwinding should finish the deferred destroy"
    );
}

#[test]
fn test_drop_destroys_and_runs_callbacks() {
    let (handle, frees) = counted("dropped");
    let called = Arc::new(AtomicUsize::new(0));

    {
        let called = Arc::clone(&called);
        let _guard = handle.enter().expect("enter should succeed");
        handle
            .destroy_then(move |_| {
                called.fetch_add(1, Ordering::SeqCst);
            })
            .expect("destroy should succeed");
    }
    assert_eq!(called.load(Ordering::SeqCst), 1);
    drop(handle);
    assert_eq!(frees.load(Ordering::SeqCst), 1, "drop must not re-destroy");

    let (handle, frees) = counted("never destroyed");
    drop(handle);
    assert_eq!(frees.load(Ordering::SeqCst), 1, "drop should destroy");
}

#[test]
fn test_drop_keeps_resource_when_disabled() {
    let frees = Arc::new(AtomicUsize::new(0));
    let capsule = Capsule::from_box("kept", Box::new(Counted(Arc::clone(&frees))));
    let keeper = capsule.clone();

    let handle = Handle::with_options(
        capsule,
        HandleOptions {
            destroy_on_drop: false,
            ..Default::default()
        },
    )
    .expect("Handle::with_options should succeed");
    drop(handle);

    assert_eq!(frees.load(Ordering::SeqCst), 0, "the other capsule still owns it");
    drop(keeper);
    assert_eq!(frees.load(Ordering::SeqCst), 1);
}

#[test]
fn test_equality_and_hash() {
    let capsule = Capsule::from_box("shared", Box::new(5u64));
    let first = Handle::new(capsule.clone()).expect("Handle::new should succeed");
    let second = Handle::new(capsule).expect("Handle::new should succeed");
    let other = Handle::new(Capsule::from_box("other", Box::new(5u64)))
        .expect("Handle::new should succeed");

    assert_eq!(first, second, "same token should compare equal");
    assert_ne!(first, other, "different tokens should not compare equal");
    assert_eq!(first.identity(), second.identity());

    let mut set = HashSet::new();
    assert!(set.insert(first.identity()));
    assert!(!set.insert(second.identity()));

    let handles: HashSet<&Handle<Capsule>> = [&first, &second, &other].into_iter().collect();
    assert_eq!(handles.len(), 2);
}

#[test]
fn test_destroyed_handle_never_equals_new_one() {
    let (first, _) = counted("first");
    let identity = first.identity();
    first.destroy(None).expect("destroy should succeed");

    for _ in 0..16 {
        let (next, _) = counted("next");
        assert_ne!(
            next.identity(),
            identity,
            "identity must not be reused after destroy"
        );
        assert_ne!(first, next, "destroyed handle should not equal a new one");
    }
}
