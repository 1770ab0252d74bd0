//! Resource Module
//!
//! Application-facing descriptions consumed by the renderer:
//!
//! - [`Material`]: surface appearance, blend/depth/stencil flags, versions
//! - [`Geometry`]: attribute layout, index, draw ranges, content version
//! - [`RenderObject`]: model matrix and per-object program/draw flags
//! - [`Texture`] / [`EnvMap`]: texture references with readiness
//! - [`ShaderDefines`]: interned define sets
//! - [`ResourceStore`]: slotmap arenas handing out stable ids

pub mod geometry;
pub mod material;
pub mod object;
pub mod shader_defines;
pub mod store;
pub mod texture;
pub mod version_tracker;

pub use geometry::{DrawGroup, DrawRange, Geometry, IndexBuffer, VertexAttribute};
pub use material::{
    Blending, CustomShader, MapSlot, Material, MaterialUniforms, PolygonOffset, ShaderKind, Side,
    StencilSettings,
};
pub use object::{Instancing, ObjectKind, RenderObject, Skeleton};
pub use shader_defines::ShaderDefines;
pub use store::{GeometryId, MaterialId, ObjectId, ResourceStore};
pub use texture::{
    ColorEncoding, EnvMap, EnvMapKind, EnvMapMode, Texture, TextureHandle, TextureSlot,
};
pub use version_tracker::{ChangeTracker, TrackedMut};
