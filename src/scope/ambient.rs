//! Scoped mutation of shared state.
//!
//! Some resources are not handles at all but a temporary change to state
//! everybody shares: a terminal color, a locale, a log level. An
//! [`AmbientScope`] captures the current value on entry, installs a new
//! one, and puts the captured value back exactly once on exit.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use relinquish::{Ambient, AmbientScope, Color, SharedAmbient};
//!
//! let foreground = Arc::new(SharedAmbient::new(Color::White));
//! {
//!     let _cyan = AmbientScope::enter(foreground.clone(), Color::Cyan);
//!     {
//!         let _yellow = AmbientScope::enter(foreground.clone(), Color::Yellow);
//!         assert_eq!(foreground.get(), Color::Yellow);
//!     }
//!     assert_eq!(foreground.get(), Color::Cyan);
//! }
//! assert_eq!(foreground.get(), Color::White);
//! ```

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::{Scope, ScopeGuard};
use crate::error::{Corruption, ObjectReleased};
use crate::lifecycle::{Lifecycle, Releasable, ReleaseReport};

/// Narrow get/set access to a piece of shared state.
pub trait Ambient: Send + Sync {
    /// The state's value type.
    type Value: Clone + Send + Sync + fmt::Debug + 'static;

    /// Read the current value.
    fn get(&self) -> Self::Value;

    /// Replace the current value.
    fn set(&self, value: Self::Value);
}

/// In-process ambient state behind a lock, counting writes.
#[derive(Debug, Default)]
pub struct SharedAmbient<T> {
    value: Mutex<T>,
    writes: AtomicUsize,
}

impl<T> SharedAmbient<T> {
    /// Create with an initial value.
    pub fn new(initial: T) -> Self {
        SharedAmbient {
            value: Mutex::new(initial),
            writes: AtomicUsize::new(0),
        }
    }

    /// Number of `set` calls so far.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl<T> Ambient for SharedAmbient<T>
where
    T: Clone + Send + Sync + fmt::Debug + 'static,
{
    type Value = T;

    fn get(&self) -> T {
        self.value.lock().clone()
    }

    fn set(&self, value: T) {
        *self.value.lock() = value;
        self.writes.fetch_add(1, Ordering::SeqCst);
    }
}

/// A temporary change to ambient state, undone on release.
///
/// Only obtainable through [`AmbientScope::enter`], which returns it
/// already inside a [`ScopeGuard`].
pub struct AmbientScope<A: Ambient> {
    value: A::Value,
    previous: A::Value,
    lifecycle: Lifecycle,
}

impl<A: Ambient> fmt::Debug for AmbientScope<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AmbientScope")
            .field("value", &self.value)
            .field("previous", &self.previous)
            .field("state", &self.lifecycle.state())
            .finish()
    }
}

impl<A: Ambient + 'static> AmbientScope<A> {
    /// Capture the current value of `ambient`, install `value`, and return
    /// the guard that restores the captured value.
    pub fn enter(ambient: Arc<A>, value: A::Value) -> ScopeGuard<Self> {
        let previous = ambient.get();
        ambient.set(value.clone());

        let restore = previous.clone();
        let lifecycle = Lifecycle::builder(format!("ambient {:?} -> {:?}", previous, value))
            .managed("restore ambient", move || {
                ambient.set(restore);
                Ok(())
            })
            .build();

        Scope::new(AmbientScope {
            value,
            previous,
            lifecycle,
        })
        .enter()
    }

    /// The value this scope installed.
    pub fn value(&self) -> Result<&A::Value, ObjectReleased> {
        self.lifecycle.ensure_active()?;
        Ok(&self.value)
    }

    /// The value that will be restored.
    pub fn previous(&self) -> Result<&A::Value, ObjectReleased> {
        self.lifecycle.ensure_active()?;
        Ok(&self.previous)
    }
}

impl<A: Ambient> Releasable for AmbientScope<A> {
    fn release(&self) -> Result<ReleaseReport, Corruption> {
        self.lifecycle.release()
    }

    fn is_released(&self) -> bool {
        self.lifecycle.is_released()
    }

    fn name(&self) -> &str {
        self.lifecycle.name()
    }
}

/// Terminal foreground palette.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[allow(missing_docs)]
pub enum Color {
    Black,
    DarkBlue,
    DarkGreen,
    DarkCyan,
    DarkRed,
    DarkMagenta,
    DarkYellow,
    #[default]
    Gray,
    DarkGray,
    Blue,
    Green,
    Cyan,
    Red,
    Magenta,
    Yellow,
    White,
}

impl Color {
    /// SGR escape sequence selecting this color as foreground.
    pub fn ansi_foreground(self) -> &'static str {
        match self {
            Color::Black => "\x1b[30m",
            Color::DarkRed => "\x1b[31m",
            Color::DarkGreen => "\x1b[32m",
            Color::DarkYellow => "\x1b[33m",
            Color::DarkBlue => "\x1b[34m",
            Color::DarkMagenta => "\x1b[35m",
            Color::DarkCyan => "\x1b[36m",
            Color::Gray => "\x1b[37m",
            Color::DarkGray => "\x1b[90m",
            Color::Red => "\x1b[91m",
            Color::Green => "\x1b[92m",
            Color::Yellow => "\x1b[93m",
            Color::Blue => "\x1b[94m",
            Color::Magenta => "\x1b[95m",
            Color::Cyan => "\x1b[96m",
            Color::White => "\x1b[97m",
        }
    }
}
