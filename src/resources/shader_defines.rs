//! Shader Define Sets
//!
//! Free-form `#define NAME VALUE` collections attached to materials. Keys and
//! values are interned [`Symbol`]s, so comparing two define sets is a slice
//! comparison of integers.
//!
//! # Ordering
//!
//! Internally the set is sorted by symbol id, which depends on interning order
//! and therefore differs between processes. Everything that is *serialized*
//! (program cache keys, generated `#define` blocks) goes through
//! [`ShaderDefines::sorted_pairs`], which orders by name. Insertion order never
//! leaks into generated text.

use std::hash::{Hash, Hasher};

use crate::utils::interner::{self, Symbol};

/// A collection of shader macro definitions.
#[derive(Debug, Clone, Default)]
pub struct ShaderDefines {
    defines: Vec<(Symbol, Symbol)>,
}

impl ShaderDefines {
    /// Create empty shader defines collection
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            defines: Vec::new(),
        }
    }

    /// Set shader define; updates the value if the key already exists.
    pub fn set(&mut self, key: &str, value: &str) {
        let key_sym = interner::intern(key);
        let value_sym = interner::intern(value);
        self.set_symbol(key_sym, value_sym);
    }

    /// Set shader define using Symbols
    #[inline]
    pub fn set_symbol(&mut self, key: Symbol, value: Symbol) {
        match self.defines.binary_search_by_key(&key, |&(k, _)| k) {
            Ok(idx) => self.defines[idx].1 = value,
            Err(idx) => self.defines.insert(idx, (key, value)),
        }
    }

    /// Remove shader define
    pub fn remove(&mut self, key: &str) -> bool {
        let Some(key_sym) = interner::get(key) else {
            return false;
        };
        if let Ok(idx) = self.defines.binary_search_by_key(&key_sym, |&(k, _)| k) {
            self.defines.remove(idx);
            true
        } else {
            false
        }
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        interner::get(key).is_some_and(|key_sym| {
            self.defines
                .binary_search_by_key(&key_sym, |&(k, _)| k)
                .is_ok()
        })
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&'static str> {
        let key_sym = interner::get(key)?;
        self.defines
            .binary_search_by_key(&key_sym, |&(k, _)| k)
            .ok()
            .map(|idx| interner::resolve(self.defines[idx].1))
    }

    #[inline]
    pub fn clear(&mut self) {
        self.defines.clear();
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.defines.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.defines.is_empty()
    }

    /// Merge defines from `other`; values from `other` win on conflicts.
    pub fn merge(&mut self, other: &ShaderDefines) {
        for &(key, value) in &other.defines {
            self.set_symbol(key, value);
        }
    }

    /// All `(name, value)` pairs ordered by name.
    #[must_use]
    pub fn sorted_pairs(&self) -> Vec<(&'static str, &'static str)> {
        let mut pairs: Vec<_> = self
            .defines
            .iter()
            .map(|&(k, v)| (interner::resolve(k), interner::resolve(v)))
            .collect();
        pairs.sort_unstable_by(|a, b| a.0.cmp(b.0));
        pairs
    }

    /// Renders the set as a `#define` block, one define per line.
    ///
    /// A value of `""` produces a bare `#define NAME`.
    #[must_use]
    pub fn to_define_block(&self) -> String {
        let mut out = String::new();
        for (name, value) in self.sorted_pairs() {
            out.push_str("#define ");
            out.push_str(name);
            if !value.is_empty() {
                out.push(' ');
                out.push_str(value);
            }
            out.push('\n');
        }
        out
    }

    /// Fragment of the program cache key contributed by this set.
    #[must_use]
    pub fn cache_key_fragment(&self) -> String {
        let mut out = String::new();
        for (i, (name, value)) in self.sorted_pairs().into_iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            out.push_str(name);
            out.push('=');
            out.push_str(value);
        }
        out
    }
}

impl Hash for ShaderDefines {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.defines.hash(state);
    }
}

impl PartialEq for ShaderDefines {
    fn eq(&self, other: &Self) -> bool {
        self.defines == other.defines
    }
}

impl Eq for ShaderDefines {}

impl From<&[(&str, &str)]> for ShaderDefines {
    fn from(defines: &[(&str, &str)]) -> Self {
        let mut result = Self::new();
        for (k, v) in defines {
            result.set(k, v);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_get() {
        let mut defines = ShaderDefines::new();
        defines.set("USE_MAP", "1");
        defines.set("USE_NORMALMAP", "1");

        assert!(defines.contains("USE_MAP"));
        assert!(defines.contains("USE_NORMALMAP"));
        assert!(!defines.contains("USE_AOMAP"));

        assert_eq!(defines.get("USE_MAP"), Some("1"));
    }

    #[test]
    fn test_merge_overrides() {
        let mut d1 = ShaderDefines::new();
        d1.set("A", "1");
        d1.set("B", "2");

        let mut d2 = ShaderDefines::new();
        d2.set("B", "3");
        d2.set("C", "4");

        d1.merge(&d2);

        assert_eq!(d1.get("A"), Some("1"));
        assert_eq!(d1.get("B"), Some("3"));
        assert_eq!(d1.get("C"), Some("4"));
    }

    #[test]
    fn test_serialization_ignores_insertion_order() {
        let mut d1 = ShaderDefines::new();
        d1.set("ZETA", "1");
        d1.set("ALPHA", "2");

        let mut d2 = ShaderDefines::new();
        d2.set("ALPHA", "2");
        d2.set("ZETA", "1");

        assert_eq!(d1, d2);
        assert_eq!(d1.cache_key_fragment(), "ALPHA=2,ZETA=1");
        assert_eq!(d1.to_define_block(), d2.to_define_block());
    }

    #[test]
    fn test_bare_define() {
        let mut defines = ShaderDefines::new();
        defines.set("STANDARD", "");
        assert_eq!(defines.to_define_block(), "#define STANDARD\n");
    }
}
