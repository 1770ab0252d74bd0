//! Error Types
//!
//! This module defines the error types used throughout the crate.
//!
//! # Overview
//!
//! The main error type [`VariantError`] covers the failure modes of the
//! program-variant pipeline:
//! - Shader assembly failures (unresolved or cyclic `#include` directives)
//! - Program compile / link failures reported by the driver
//! - Lookups of resources that were already released
//! - Invalid renderer settings
//!
//! Per-item rendering never propagates these errors across the dispatcher
//! boundary: a failing item is logged and dropped for the frame. The errors are
//! surfaced through the assembler API, the program diagnostics and the
//! settings validation.
//!
//! ```rust,ignore
//! use myth_variants::errors::{VariantError, Result};
//!
//! fn assemble() -> Result<()> {
//!     // Operations that may fail return Result
//!     Ok(())
//! }
//! ```

use thiserror::Error;

use crate::resources::{GeometryId, MaterialId, ObjectId};

/// The main error type for the variant cache.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VariantError {
    // ========================================================================
    // Shader Assembly Errors
    // ========================================================================
    /// An `#include <name>` directive referenced a chunk that is not registered.
    #[error("Unresolved shader include <{name}> (included from '{parent}')")]
    UnresolvedInclude {
        /// Name of the missing chunk
        name: String,
        /// Chunk or template that contained the directive
        parent: String,
    },

    /// Chunks include each other recursively.
    #[error("Shader include cycle: {}", chain.join(" -> "))]
    IncludeCycle {
        /// Include chain, ending with the chunk that closes the cycle
        chain: Vec<String>,
    },

    /// An `#include` line that does not follow the `#include <name>` form.
    #[error("Malformed include directive: '{line}'")]
    MalformedInclude {
        /// Offending source line
        line: String,
    },

    /// A template name is not present in the chunk registry.
    #[error("Shader template not found: {0}")]
    TemplateNotFound(String),

    // ========================================================================
    // Program Errors
    // ========================================================================
    /// Program compilation or linking failed in the driver.
    #[error("Program '{label}' failed to compile: {log}")]
    CompileFailed {
        /// Program label (shader name)
        label: String,
        /// Driver info log
        log: String,
    },

    // ========================================================================
    // Resource Lookup Errors
    // ========================================================================
    /// The material was removed from the store.
    #[error("Unknown material: {0:?}")]
    UnknownMaterial(MaterialId),

    /// The geometry was removed from the store.
    #[error("Unknown geometry: {0:?}")]
    UnknownGeometry(GeometryId),

    /// The object was removed from the store.
    #[error("Unknown object: {0:?}")]
    UnknownObject(ObjectId),

    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Renderer settings failed validation.
    #[error("Invalid renderer settings: {0}")]
    InvalidSettings(String),
}

/// Alias for `Result<T, VariantError>`.
pub type Result<T> = std::result::Result<T, VariantError>;
