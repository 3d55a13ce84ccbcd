//! Basic example demonstrating handle lifetimes.
//!
//! Run with: cargo run --example basic

use std::sync::Arc;
use std::thread;

use native_handle::{Capsule, Handle};

/// Stand-in for a native clock object.
struct Clock {
    ticks: u64,
}

impl Drop for Clock {
    fn drop(&mut self) {
        println!("  native clock freed after {} ticks", self.ticks);
    }
}

/// Stand-in for a native timer that reads its clock.
struct Timer {
    period_ns: u64,
}

impl Drop for Timer {
    fn drop(&mut self) {
        println!("  native timer freed (period {} ns)", self.period_ns);
    }
}

fn main() -> native_handle::Result<()> {
    println!("API Version: {}", native_handle::api_version());

    let clock = Handle::new(Capsule::from_box("clock", Box::new(Clock { ticks: 3 })))?;
    let timer = Arc::new(Handle::new(Capsule::from_box(
        "timer",
        Box::new(Timer { period_ns: 1_000_000 }),
    ))?);

    println!("\n--- Linking timer to clock ---");
    timer.require(&clock)?;
    println!("{} requires {}", timer, clock);

    println!("\n--- Using the timer from worker threads ---");
    let workers: Vec<_> = (0..4)
        .map(|i| {
            let timer = Arc::clone(&timer);
            thread::spawn(move || {
                timer.with(|capsule| {
                    // Safety: the timer capsule wraps a `Timer` and is kept
                    // alive while the handle is borrowed.
                    let period = unsafe { (*capsule.as_ptr().cast::<Timer>()).period_ns };
                    println!("  worker {} sees period {} ns", i, period);
                })
            })
        })
        .collect();
    for worker in workers {
        if let Ok(result) = worker.join() {
            result?;
        }
    }

    println!("\n--- Destroying the clock first ---");
    clock.destroy_then(|h| println!("  {} handle destroyed", h.name()))?;
    println!("clock valid: {}", clock.is_valid());

    println!("\n--- Destroying the timer while it is in use ---");
    {
        let _capsule = timer.enter()?;
        timer.destroy_then(|h| println!("  {} handle destroyed", h.name()))?;
        println!("timer state: {}", timer.state());
    }
    println!("timer state: {}", timer.state());

    match timer.enter() {
        Ok(_) => println!("unexpected: timer still usable"),
        Err(e) => println!("\nUsing the timer now fails: {}", e),
    }

    Ok(())
}
