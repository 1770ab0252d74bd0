//! Utility Module
//!
//! - [`interner`]: String interning for define names and values
//! - [`WarnOnce`]: De-duplicates capability / clamping warnings
//!
//! # String Interning
//!
//! Interned strings (Symbols) compare in O(1) time:
//!
//! ```rust,ignore
//! use myth_variants::utils::interner;
//!
//! let sym1 = interner::intern("USE_NORMALMAP");
//! let sym2 = interner::intern("USE_NORMALMAP");
//! assert_eq!(sym1, sym2);
//! ```

pub mod interner;

pub use interner::Symbol;

use rustc_hash::FxHashSet;

/// Remembers which warnings were already emitted so that per-frame conditions
/// (missing extensions, exhausted texture units) are reported only once.
#[derive(Debug, Default)]
pub struct WarnOnce {
    seen: FxHashSet<&'static str>,
}

impl WarnOnce {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` the first time `key` is seen.
    pub fn first(&mut self, key: &'static str) -> bool {
        self.seen.insert(key)
    }

    /// Logs `message` at warn level the first time `key` is seen.
    pub fn warn(&mut self, key: &'static str, message: impl FnOnce() -> String) {
        if self.first(key) {
            log::warn!("{}", message());
        }
    }
}
