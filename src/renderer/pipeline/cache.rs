//! Program Cache
//!
//! Global, reference-counted pool of program variants keyed by the generated
//! cache key string.
//!
//! - **Hit**: the usage count is incremented and the existing variant returned.
//! - **Miss**: sources are assembled lazily through the supplied builder, the
//!   compile is issued and the variant inserted as [`ProgramState::Pending`].
//!   Assembly failures insert an invalid variant instead of propagating.
//! - **Release**: decrements the usage count; at zero the variant is removed
//!   and handed back to the caller, which deletes the driver program and drops
//!   dependent bindings.
//!
//! Readiness is polled ([`ProgramCache::poll`]) before every use and never
//! awaited.

use rustc_hash::FxHashMap;
use slotmap::SlotMap;

use crate::errors::{Result, VariantError};
use crate::renderer::driver::{GpuDriver, ProgramStatus};
use crate::renderer::pipeline::assembler::AssembledProgram;
use crate::renderer::pipeline::parameters::ProgramParameters;
use crate::renderer::pipeline::program::{
    ProgramId, ProgramState, ProgramVariant, error_line, source_context,
};

/// Diagnostics switches for compilation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CompileOptions {
    /// Log failures with numbered source context.
    pub check_errors: bool,
    /// Log generated sources at debug level.
    pub debug_source: bool,
    /// The driver compiles in the background; `Pending` is a valid answer.
    /// Without it a status query completes the compile, so a poll settles
    /// the variant immediately.
    pub parallel: bool,
}

/// Upper bound of status queries a non-parallel poll issues before giving up
/// for this frame.
const BLOCKING_POLL_LIMIT: u32 = 64;

/// Counters exposed for tests and profiling overlays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProgramCacheStats {
    /// `get_program` calls.
    pub requests: u64,
    pub hits: u64,
    /// Compiles issued to the driver (excludes assembly failures).
    pub compiles: u64,
    /// Variants destroyed after their usage dropped to zero.
    pub releases: u64,
    /// Variants currently cached.
    pub live: usize,
}

#[derive(Debug, Default)]
pub struct ProgramCache {
    variants: SlotMap<ProgramId, ProgramVariant>,
    lookup: FxHashMap<String, ProgramId>,
    stats: ProgramCacheStats,
}

impl ProgramCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the variant for `key`, building and compiling it on a miss.
    ///
    /// `build` is only invoked on a miss.
    pub fn get_program<D: GpuDriver>(
        &mut self,
        driver: &mut D,
        key: &str,
        parameters: &ProgramParameters,
        label: &str,
        options: CompileOptions,
        build: impl FnOnce() -> Result<AssembledProgram>,
    ) -> ProgramId {
        self.stats.requests += 1;

        if let Some(&id) = self.lookup.get(key)
            && let Some(variant) = self.variants.get_mut(id)
        {
            debug_assert_eq!(
                &variant.parameters, parameters,
                "program cache key collision for '{key}'"
            );
            variant.usage += 1;
            self.stats.hits += 1;
            log::debug!("Program cache hit: {label} (usage {})", variant.usage);
            return id;
        }

        let variant = match build() {
            Ok(sources) => {
                if options.debug_source {
                    log::debug!(
                        "Generated program {label}\n--- vertex ---\n{}\n--- fragment ---\n{}",
                        sources.vertex,
                        sources.fragment
                    );
                }
                let handle = driver.create_program(label, &sources.vertex, &sources.fragment);
                self.stats.compiles += 1;
                log::debug!("Program cache miss: compiling {label}");
                ProgramVariant {
                    id: ProgramId::default(),
                    key: key.to_string(),
                    label: label.to_string(),
                    handle: Some(handle),
                    vertex: sources.vertex,
                    fragment: sources.fragment,
                    state: ProgramState::Pending,
                    usage: 1,
                    parameters: parameters.clone(),
                }
            }
            Err(error) => {
                log::error!("Failed to assemble program {label}: {error}");
                ProgramVariant {
                    id: ProgramId::default(),
                    key: key.to_string(),
                    label: label.to_string(),
                    handle: None,
                    vertex: String::new(),
                    fragment: String::new(),
                    state: ProgramState::Invalid(error.to_string()),
                    usage: 1,
                    parameters: parameters.clone(),
                }
            }
        };

        let id = self
            .variants
            .insert_with_key(|id| ProgramVariant { id, ..variant });
        self.lookup.insert(key.to_string(), id);
        self.stats.live = self.variants.len();
        id
    }

    /// Polls the driver for a pending variant and returns its state.
    ///
    /// Only a parallel-compile driver can leave the variant pending. A failure marks the variant invalid and, with `check_errors`, logs the
    /// driver log and the offending source lines.
    pub fn poll<D: GpuDriver>(
        &mut self,
        driver: &mut D,
        id: ProgramId,
        options: CompileOptions,
    ) -> ProgramState {
        let Some(variant) = self.variants.get_mut(id) else {
            return ProgramState::Invalid("released program".to_string());
        };
        if variant.state != ProgramState::Pending {
            return variant.state.clone();
        }
        let Some(handle) = variant.handle else {
            return variant.state.clone();
        };

        let mut status = driver.program_status(handle);
        if !options.parallel {
            let mut polls = 1;
            while status == ProgramStatus::Pending && polls < BLOCKING_POLL_LIMIT {
                status = driver.program_status(handle);
                polls += 1;
            }
        }

        match status {
            ProgramStatus::Pending => {}
            ProgramStatus::Ready => variant.state = ProgramState::Ready,
            ProgramStatus::Failed(driver_log) => {
                let error = VariantError::CompileFailed {
                    label: variant.label.clone(),
                    log: driver_log.clone(),
                };
                if options.check_errors {
                    let context = error_line(&driver_log).map(|line| {
                        let source = if driver_log.contains("vertex") {
                            &variant.vertex
                        } else {
                            &variant.fragment
                        };
                        source_context(source, line, 6)
                    });
                    log::error!("{error}\n{}", context.unwrap_or_default());
                }
                variant.state = ProgramState::Invalid(error.to_string());
            }
        }
        variant.state.clone()
    }

    /// Drops one reference. Returns the variant when it was destroyed.
    pub fn release(&mut self, id: ProgramId) -> Option<ProgramVariant> {
        let variant = self.variants.get_mut(id)?;
        variant.usage = variant.usage.saturating_sub(1);
        if variant.usage > 0 {
            return None;
        }

        let variant = self.variants.remove(id)?;
        self.lookup.remove(&variant.key);
        self.stats.releases += 1;
        self.stats.live = self.variants.len();
        log::debug!("Program released: {}", variant.label);
        Some(variant)
    }

    #[must_use]
    pub fn get(&self, id: ProgramId) -> Option<&ProgramVariant> {
        self.variants.get(id)
    }

    /// Looks up a live variant by key without touching its usage count.
    #[must_use]
    pub fn find(&self, key: &str) -> Option<ProgramId> {
        self.lookup.get(key).copied()
    }

    #[must_use]
    pub fn key(&self, id: ProgramId) -> Option<&str> {
        self.variants.get(id).map(ProgramVariant::key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.variants.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.variants.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ProgramId, &ProgramVariant)> {
        self.variants.iter()
    }

    #[must_use]
    pub fn stats(&self) -> ProgramCacheStats {
        self.stats
    }

    /// Removes every variant (context loss); the caller owns driver cleanup.
    pub fn drain(&mut self) -> Vec<ProgramVariant> {
        self.lookup.clear();
        self.stats.live = 0;
        self.variants.drain().map(|(_, variant)| variant).collect()
    }
}
