//! Color Scopes Example
//!
//! Demonstrates nested scopes over ambient terminal state, plus the
//! explicit and fallback release paths of the concrete owners.
//!
//! Shows:
//! - Nested color scopes restoring inner to outer
//! - A holder extended with its own cleanup level
//! - A forgotten buffer reclaimed by a sweep
//!
//! Run with: cargo run --example color_scopes

use std::io::{self, Write};
use std::sync::Arc;

use parking_lot::Mutex;
use relinquish::testing::MockSystem;
use relinquish::{
    Ambient, AmbientScope, Color, HeapAllocator, Reclaimer, Releasable, ResourceHandle,
    ResourceHolder, StepError, UnmanagedBuffer,
};

/// Terminal foreground color, written to stdout on every change.
#[derive(Debug)]
struct Foreground {
    current: Mutex<Color>,
}

impl Foreground {
    fn new() -> Self {
        let foreground = Foreground {
            current: Mutex::new(Color::Gray),
        };
        foreground.set(Color::Gray);
        foreground
    }
}

impl Ambient for Foreground {
    type Value = Color;

    fn get(&self) -> Color {
        *self.current.lock()
    }

    fn set(&self, color: Color) {
        *self.current.lock() = color;
        print!("{}", color.ansi_foreground());
        let _ = io::stdout().flush();
    }
}

// ==================== Nested Color Scopes ====================

fn example_color_scopes() {
    println!("\n=== Example 1: Nested Color Scopes ===");

    let foreground = Arc::new(Foreground::new());
    println!("Default");
    {
        let _cyan = AmbientScope::enter(foreground.clone(), Color::Cyan);
        println!("In Cyan");
        {
            let _yellow = AmbientScope::enter(foreground.clone(), Color::Yellow);
            println!("In Yellow");
        }
        println!("In Cyan2");
    }
    println!("Default2");
}

// ==================== Extended Holder ====================

fn example_extended_holder() {
    println!("\n=== Example 2: Extended Holder ===");

    let system = Arc::new(MockSystem::new());
    let handle = ResourceHandle::acquire(system.clone(), &"report.csv").unwrap();
    let holder = ResourceHolder::extend(handle, |builder, handle| {
        let handle = Arc::clone(handle);
        builder.managed("flush rows", move || {
            let reference = handle.get().map_err(StepError::failed)?;
            println!("  Flushing rows to {:?} before the handle goes", reference);
            Ok(())
        })
    });

    holder.with_reference(|r| println!("  Working with {:?}", r)).unwrap();
    let report = holder.release().unwrap();
    println!("  {}", report);
    println!("  Second release: {}", holder.release().unwrap());
    println!("  After release: {}", holder.handle().unwrap_err());
}

// ==================== Forgotten Buffer ====================

fn example_forgotten_buffer() {
    println!("\n=== Example 3: Forgotten Buffer ===");

    let heap = Arc::new(HeapAllocator::new());
    let reclaimer = Reclaimer::new();
    let _shutdown = reclaimer.guard();
    {
        let buffer = UnmanagedBuffer::builder(heap.clone(), 4096)
            .with_fallback(&reclaimer)
            .build()
            .unwrap();
        buffer.write(0, b"scratch").unwrap();
        println!("  Buffer dropped without release");
    }
    println!("  Live blocks before sweep: {}", heap.live_blocks());

    let report = reclaimer.sweep();
    println!("  Sweep reclaimed {} entry", report.reclaimed);
    println!("  Live blocks after sweep: {}", heap.live_blocks());
}

fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .init();

    println!("Color Scopes Examples");
    println!("=====================");

    example_color_scopes();
    example_extended_holder();
    example_forgotten_buffer();

    println!("\n=== All examples completed successfully! ===");
}
