//! Global String Interner
//!
//! Converts define names and values into integer [`Symbol`]s so that define
//! sets can be compared and hashed without touching string data. This is the
//! backing store of [`ShaderDefines`](crate::resources::ShaderDefines).

use std::sync::LazyLock;

use lasso::{Spur, ThreadedRodeo};

static INTERNER: LazyLock<ThreadedRodeo> = LazyLock::new(ThreadedRodeo::new);

/// Compact integer identifier for an interned string.
pub type Symbol = Spur;

/// Interns a string, returning the existing symbol if already present.
#[inline]
pub fn intern(s: &str) -> Symbol {
    INTERNER.get_or_intern(s)
}

/// Looks up the symbol of an already interned string without allocating.
#[inline]
pub fn get(s: &str) -> Option<Symbol> {
    INTERNER.get(s)
}

/// Resolves a symbol back to its string.
#[inline]
pub fn resolve(sym: Symbol) -> &'static str {
    // The interner lives for the whole process, so its strings do as well.
    let interner: &'static ThreadedRodeo = &INTERNER;
    interner.resolve(&sym)
}

/// Pre-interns the define names emitted by the parameter hasher so the hot
/// path never grows the interner.
pub fn preload_common_defines() {
    let common = [
        "USE_MAP",
        "USE_ALPHAMAP",
        "USE_AOMAP",
        "USE_LIGHTMAP",
        "USE_BUMPMAP",
        "USE_NORMALMAP",
        "USE_EMISSIVEMAP",
        "USE_METALNESSMAP",
        "USE_ROUGHNESSMAP",
        "USE_SPECULARMAP",
        "USE_ENVMAP",
        "USE_FOG",
        "FOG_EXP2",
        "USE_SKINNING",
        "BONE_TEXTURE",
        "USE_MORPHTARGETS",
        "USE_TANGENT",
        "USE_COLOR",
        "USE_SHADOWMAP",
        "USE_LOGDEPTHBUF",
        "DITHERING",
        "DOUBLE_SIDED",
        "FLIP_SIDED",
        "DEPTH_PASS",
        "1",
    ];

    for name in common {
        intern(name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intern_and_resolve() {
        let s1 = intern("hello");
        let s2 = intern("hello");
        let s3 = intern("world");

        assert_eq!(s1, s2);
        assert_ne!(s1, s3);

        assert_eq!(resolve(s1), "hello");
        assert_eq!(resolve(s3), "world");
    }

    #[test]
    fn test_get() {
        let _ = intern("existing_define");

        assert!(get("existing_define").is_some());
        assert!(get("never_interned_define").is_none());
    }
}
