#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::too_many_arguments)]

pub mod errors;
pub mod renderer;
pub mod resources;
pub mod utils;

pub use errors::{Result, VariantError};
pub use renderer::pipeline::{ChunkLibrary, ProgramParameters, ProgramState, ProgramVariant};
pub use renderer::{
    Capabilities, GpuDriver, HeadlessDriver, RenderInfo, RenderItem, RenderLists, RenderState,
    Renderer, RendererSettings, StateLocks,
};
pub use resources::{
    Geometry, GeometryId, Material, MaterialId, ObjectId, RenderObject, ResourceStore,
    ShaderDefines, ShaderKind, Side,
};
pub use utils::interner;
