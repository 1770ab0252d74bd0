//! Driver capabilities.
//!
//! Queried once when the renderer is created and stable for the session, so
//! the parameter hasher may read them without making its output impure.

use serde::{Deserialize, Serialize};

use crate::renderer::settings::Precision;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Capabilities {
    pub max_texture_units: u32,
    pub max_vertex_uniform_vectors: u32,
    /// Vertex shaders can sample textures.
    pub vertex_textures: bool,
    /// Float textures can be sampled in vertex shaders (bone textures).
    pub float_vertex_textures: bool,
    /// Program compilation completes asynchronously and is polled.
    pub parallel_compile: bool,
    pub instancing: bool,
    pub multi_draw: bool,
    pub standard_derivatives: bool,
    pub frag_depth: bool,
    /// Maximum number of simultaneous color outputs.
    pub max_draw_buffers: u32,
    pub shader_texture_lod: bool,
    pub max_precision: Precision,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            max_texture_units: 16,
            max_vertex_uniform_vectors: 1024,
            vertex_textures: true,
            float_vertex_textures: true,
            parallel_compile: false,
            instancing: true,
            multi_draw: false,
            standard_derivatives: true,
            frag_depth: true,
            max_draw_buffers: 8,
            shader_texture_lod: true,
            max_precision: Precision::High,
        }
    }
}

impl Capabilities {
    /// A GLSL ES 1.00 class device without optional extensions.
    #[must_use]
    pub fn minimal() -> Self {
        Self {
            max_texture_units: 8,
            max_vertex_uniform_vectors: 128,
            vertex_textures: false,
            float_vertex_textures: false,
            parallel_compile: false,
            instancing: false,
            multi_draw: false,
            standard_derivatives: false,
            frag_depth: false,
            max_draw_buffers: 1,
            shader_texture_lod: false,
            max_precision: Precision::Medium,
        }
    }

    /// Clamps a requested precision to the supported maximum.
    #[must_use]
    pub fn clamp_precision(&self, requested: Precision) -> Precision {
        requested.min(self.max_precision)
    }

    /// Maximum bones expressible with uniform-based skinning.
    ///
    /// Each bone takes four vec4 uniforms; twenty vectors are reserved for the
    /// remaining vertex uniforms.
    #[must_use]
    pub fn max_uniform_bones(&self) -> u32 {
        self.max_vertex_uniform_vectors.saturating_sub(20) / 4
    }

    /// Whether bone matrices can be stored in a float texture.
    #[must_use]
    pub fn bone_textures(&self) -> bool {
        self.vertex_textures && self.float_vertex_textures
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_precision() {
        let caps = Capabilities::minimal();
        assert_eq!(caps.clamp_precision(Precision::High), Precision::Medium);
        assert_eq!(caps.clamp_precision(Precision::Low), Precision::Low);
    }

    #[test]
    fn test_max_uniform_bones() {
        let caps = Capabilities::minimal();
        assert_eq!(caps.max_uniform_bones(), 27);
        assert!(!caps.bone_textures());
    }
}
