//! Program Pipeline
//!
//! Everything between a draw's inputs and a usable GPU program:
//!
//! - [`parameters`]: feature vector and cache key ([`ParameterHasher`])
//! - [`chunks`]: embedded GLSL chunk and template registry
//! - [`assembler`]: include resolution, count substitution, loop unrolling
//!   and dialect prefix generation
//! - [`program`]: compiled variants and their diagnostics
//! - [`cache`]: global reference-counted variant pool ([`ProgramCache`])
//! - [`material_slots`]: per-material MRU lists and stale triggers

pub mod assembler;
pub mod cache;
pub mod chunks;
pub mod material_slots;
pub mod parameters;
pub mod program;

pub use assembler::{AssembledProgram, ShaderAssembler, TemplateSource};
pub use cache::{CompileOptions, ProgramCache, ProgramCacheStats};
pub use chunks::{ChunkLibrary, ShaderStage};
pub use material_slots::{MaterialProgramSlots, Resolution, StaleTriggers};
pub use parameters::{ParameterHasher, ProgramFeatures, ProgramParameters, ShaderSourceId};
pub use program::{ProgramId, ProgramState, ProgramVariant};
