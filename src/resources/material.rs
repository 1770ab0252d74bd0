//! Materials
//!
//! A [`Material`] is a mutable, application-owned description of surface
//! appearance. The renderer never stores anything on it: program variants and
//! stale-trigger factors live in side-tables keyed by [`MaterialId`].
//!
//! # Versions
//!
//! Two independent counters are tracked:
//!
//! - **`version`**: bumped by [`Material::needs_update`] (and automatically by
//!   map setters). Any change that affects the generated program (flags,
//!   defines, shader source, alpha test on/off, ...) must bump it.
//! - **`uniforms_version`**: bumped by every write through
//!   [`Material::uniforms_mut`]. Only controls the material uniform upload; it
//!   never triggers program recomputation.
//!
//! [`MaterialId`]: crate::resources::MaterialId

use bytemuck::{Pod, Zeroable};
use glam::Vec4;
use wgpu::{BlendComponent, BlendFactor, BlendOperation, BlendState, CompareFunction, StencilOperation};

use crate::resources::shader_defines::ShaderDefines;
use crate::resources::texture::{EnvMap, TextureSlot};
use crate::resources::version_tracker::{ChangeTracker, TrackedMut};

// ============================================================================
// Shader Source
// ============================================================================

/// User-provided GLSL source for custom materials.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CustomShader {
    pub name: String,
    pub vertex: String,
    pub fragment: String,
}

/// Which program template a material uses.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ShaderKind {
    /// Unlit, ignores lights.
    Basic,
    /// Blinn-Phong shading.
    Phong,
    /// Metalness / roughness PBR shading.
    Standard,
    /// Custom source that still receives the generated prefix and chunk includes.
    Custom(CustomShader),
    /// Custom source compiled as-is (only includes are resolved).
    Raw(CustomShader),
}

impl ShaderKind {
    /// Template name in the chunk registry, `None` for custom sources.
    #[must_use]
    pub fn template(&self) -> Option<&'static str> {
        match self {
            Self::Basic => Some("meshbasic"),
            Self::Phong => Some("meshphong"),
            Self::Standard => Some("meshstandard"),
            Self::Custom(_) | Self::Raw(_) => None,
        }
    }

    /// Human readable shader name used in markers and logs.
    #[must_use]
    pub fn shader_name(&self) -> &str {
        match self {
            Self::Basic => "MeshBasicMaterial",
            Self::Phong => "MeshPhongMaterial",
            Self::Standard => "MeshStandardMaterial",
            Self::Custom(c) | Self::Raw(c) => &c.name,
        }
    }

    #[must_use]
    pub fn is_raw(&self) -> bool {
        matches!(self, Self::Raw(_))
    }

    #[must_use]
    pub fn accepts_lights(&self) -> bool {
        matches!(self, Self::Phong | Self::Standard)
    }
}

// ============================================================================
// Map Slots
// ============================================================================

/// Texture map slots understood by the built-in templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MapSlot {
    Map,
    AlphaMap,
    AoMap,
    LightMap,
    BumpMap,
    NormalMap,
    EmissiveMap,
    MetalnessMap,
    RoughnessMap,
    SpecularMap,
}

impl MapSlot {
    pub const COUNT: usize = 10;

    /// Declared slot order; cache keys serialize maps in exactly this order.
    pub const ALL: [MapSlot; Self::COUNT] = [
        MapSlot::Map,
        MapSlot::AlphaMap,
        MapSlot::AoMap,
        MapSlot::LightMap,
        MapSlot::BumpMap,
        MapSlot::NormalMap,
        MapSlot::EmissiveMap,
        MapSlot::MetalnessMap,
        MapSlot::RoughnessMap,
        MapSlot::SpecularMap,
    ];

    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// `USE_*` define emitted when the slot is populated.
    #[must_use]
    pub const fn define(self) -> &'static str {
        match self {
            Self::Map => "USE_MAP",
            Self::AlphaMap => "USE_ALPHAMAP",
            Self::AoMap => "USE_AOMAP",
            Self::LightMap => "USE_LIGHTMAP",
            Self::BumpMap => "USE_BUMPMAP",
            Self::NormalMap => "USE_NORMALMAP",
            Self::EmissiveMap => "USE_EMISSIVEMAP",
            Self::MetalnessMap => "USE_METALNESSMAP",
            Self::RoughnessMap => "USE_ROUGHNESSMAP",
            Self::SpecularMap => "USE_SPECULARMAP",
        }
    }

    /// Define naming the UV attribute the slot samples with.
    #[must_use]
    pub const fn uv_define(self) -> &'static str {
        match self {
            Self::Map => "MAP_UV",
            Self::AlphaMap => "ALPHAMAP_UV",
            Self::AoMap => "AOMAP_UV",
            Self::LightMap => "LIGHTMAP_UV",
            Self::BumpMap => "BUMPMAP_UV",
            Self::NormalMap => "NORMALMAP_UV",
            Self::EmissiveMap => "EMISSIVEMAP_UV",
            Self::MetalnessMap => "METALNESSMAP_UV",
            Self::RoughnessMap => "ROUGHNESSMAP_UV",
            Self::SpecularMap => "SPECULARMAP_UV",
        }
    }

    /// Sampler uniform name.
    #[must_use]
    pub const fn uniform_name(self) -> &'static str {
        match self {
            Self::Map => "map",
            Self::AlphaMap => "alphaMap",
            Self::AoMap => "aoMap",
            Self::LightMap => "lightMap",
            Self::BumpMap => "bumpMap",
            Self::NormalMap => "normalMap",
            Self::EmissiveMap => "emissiveMap",
            Self::MetalnessMap => "metalnessMap",
            Self::RoughnessMap => "roughnessMap",
            Self::SpecularMap => "specularMap",
        }
    }

    /// Whether the slot holds color data (decoded with the texture encoding).
    #[must_use]
    pub const fn is_color(self) -> bool {
        matches!(self, Self::Map | Self::EmissiveMap | Self::LightMap)
    }
}

// ============================================================================
// Render State Settings
// ============================================================================

/// Which faces are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Side {
    #[default]
    Front,
    Back,
    Double,
}

/// Blending presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Blending {
    None,
    #[default]
    Normal,
    Additive,
    Subtractive,
    Multiply,
    Custom(BlendState),
}

impl Blending {
    /// Resolves the preset into explicit factors.
    ///
    /// Returns `None` when blending is disabled.
    #[must_use]
    pub fn resolve(self, premultiplied_alpha: bool) -> Option<BlendState> {
        let component = |src, dst| BlendComponent {
            src_factor: src,
            dst_factor: dst,
            operation: BlendOperation::Add,
        };

        match (self, premultiplied_alpha) {
            (Self::None, _) => None,
            (Self::Normal, false) => Some(BlendState {
                color: component(BlendFactor::SrcAlpha, BlendFactor::OneMinusSrcAlpha),
                alpha: component(BlendFactor::One, BlendFactor::OneMinusSrcAlpha),
            }),
            (Self::Normal, true) => Some(BlendState::PREMULTIPLIED_ALPHA_BLENDING),
            (Self::Additive, false) => Some(BlendState {
                color: component(BlendFactor::SrcAlpha, BlendFactor::One),
                alpha: component(BlendFactor::SrcAlpha, BlendFactor::One),
            }),
            (Self::Additive, true) => Some(BlendState {
                color: component(BlendFactor::One, BlendFactor::One),
                alpha: component(BlendFactor::One, BlendFactor::One),
            }),
            (Self::Subtractive, false) => Some(BlendState {
                color: component(BlendFactor::Zero, BlendFactor::OneMinusSrc),
                alpha: component(BlendFactor::Zero, BlendFactor::One),
            }),
            (Self::Subtractive, true) => Some(BlendState {
                color: component(BlendFactor::Zero, BlendFactor::OneMinusSrc),
                alpha: component(BlendFactor::Zero, BlendFactor::OneMinusSrcAlpha),
            }),
            (Self::Multiply, false) => Some(BlendState {
                color: component(BlendFactor::Zero, BlendFactor::Src),
                alpha: component(BlendFactor::Zero, BlendFactor::One),
            }),
            (Self::Multiply, true) => Some(BlendState {
                color: component(BlendFactor::Zero, BlendFactor::Src),
                alpha: component(BlendFactor::Zero, BlendFactor::SrcAlpha),
            }),
            (Self::Custom(state), _) => Some(state),
        }
    }
}

/// Stencil configuration of a material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StencilSettings {
    pub enabled: bool,
    pub write_mask: u32,
    pub func: CompareFunction,
    pub reference: u32,
    pub func_mask: u32,
    pub fail: StencilOperation,
    pub depth_fail: StencilOperation,
    pub pass: StencilOperation,
}

impl Default for StencilSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            write_mask: 0xFF,
            func: CompareFunction::Always,
            reference: 0,
            func_mask: 0xFF,
            fail: StencilOperation::Keep,
            depth_fail: StencilOperation::Keep,
            pass: StencilOperation::Keep,
        }
    }
}

/// Polygon offset factor / units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PolygonOffset {
    pub factor: f32,
    pub units: f32,
}

// ============================================================================
// Uniforms
// ============================================================================

/// Material uniform block, uploaded as one group.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct MaterialUniforms {
    pub color: Vec4,
    pub emissive: Vec4,
    pub roughness: f32,
    pub metalness: f32,
    pub opacity: f32,
    /// Alpha test threshold. Switching between zero and non-zero changes the
    /// program and therefore also requires [`Material::needs_update`].
    pub alpha_test: f32,
}

impl Default for MaterialUniforms {
    fn default() -> Self {
        Self {
            color: Vec4::ONE,
            emissive: Vec4::new(0.0, 0.0, 0.0, 1.0),
            roughness: 1.0,
            metalness: 0.0,
            opacity: 1.0,
            alpha_test: 0.0,
        }
    }
}

// ============================================================================
// Material
// ============================================================================

/// Surface description consumed by the renderer.
#[derive(Debug, Clone)]
pub struct Material {
    pub name: String,
    pub shader: ShaderKind,

    maps: [Option<TextureSlot>; MapSlot::COUNT],
    /// Material-level environment map; overrides the scene environment.
    pub env_map: Option<EnvMap>,

    /// Free-form defines injected into the generated prefix.
    pub defines: ShaderDefines,
    /// Extra key appended to the program cache key.
    pub custom_program_cache_key: Option<String>,
    /// Named vec4 uniforms uploaded with the material group.
    pub custom_uniforms: Vec<(String, Vec4)>,

    pub visible: bool,
    pub transparent: bool,
    pub blending: Blending,
    pub premultiplied_alpha: bool,
    pub side: Side,
    pub depth_test: bool,
    pub depth_write: bool,
    pub depth_func: CompareFunction,
    pub color_write: bool,
    pub stencil: StencilSettings,
    pub polygon_offset: Option<PolygonOffset>,
    pub wireframe: bool,
    pub wireframe_linewidth: f32,

    /// Whether scene fog applies to this material.
    pub fog: bool,
    /// Whether scene lights apply (ignored by shaders that cannot light).
    pub lights: bool,
    pub vertex_colors: bool,
    pub flat_shading: bool,
    pub dithering: bool,
    pub normal_map_object_space: bool,

    uniforms: MaterialUniforms,
    uniforms_version: ChangeTracker,
    version: ChangeTracker,
}

impl Material {
    #[must_use]
    pub fn new(shader: ShaderKind) -> Self {
        let lights = shader.accepts_lights();
        Self {
            name: String::new(),
            shader,
            maps: [None; MapSlot::COUNT],
            env_map: None,
            defines: ShaderDefines::new(),
            custom_program_cache_key: None,
            custom_uniforms: Vec::new(),
            visible: true,
            transparent: false,
            blending: Blending::Normal,
            premultiplied_alpha: false,
            side: Side::Front,
            depth_test: true,
            depth_write: true,
            depth_func: CompareFunction::LessEqual,
            color_write: true,
            stencil: StencilSettings::default(),
            polygon_offset: None,
            wireframe: false,
            wireframe_linewidth: 1.0,
            fog: true,
            lights,
            vertex_colors: false,
            flat_shading: false,
            dithering: false,
            normal_map_object_space: false,
            uniforms: MaterialUniforms::default(),
            uniforms_version: ChangeTracker::starting_at(1),
            version: ChangeTracker::new(),
        }
    }

    #[must_use]
    pub fn basic() -> Self {
        Self::new(ShaderKind::Basic)
    }

    #[must_use]
    pub fn phong() -> Self {
        Self::new(ShaderKind::Phong)
    }

    #[must_use]
    pub fn standard() -> Self {
        Self::new(ShaderKind::Standard)
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Flags the material's program as stale.
    pub fn needs_update(&mut self) {
        self.version.changed();
    }

    #[inline]
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version.version()
    }

    // --- Maps ---

    #[inline]
    #[must_use]
    pub fn map(&self, slot: MapSlot) -> Option<&TextureSlot> {
        self.maps[slot.index()].as_ref()
    }

    /// Assigns a map slot.
    ///
    /// Bumps the material version when presence, UV channel or encoding
    /// changes, since those select a different program. Swapping one texture
    /// for another with identical properties keeps the program.
    pub fn set_map(&mut self, slot: MapSlot, value: Option<TextureSlot>) {
        let old = self.maps[slot.index()];
        let affects_program = match (old, value) {
            (None, None) => false,
            (Some(a), Some(b)) => {
                a.channel != b.channel || a.texture.encoding != b.texture.encoding
            }
            _ => true,
        };
        self.maps[slot.index()] = value;
        if affects_program {
            self.version.changed();
        }
    }

    /// Iterates populated map slots in declared order.
    pub fn maps(&self) -> impl Iterator<Item = (MapSlot, &TextureSlot)> {
        MapSlot::ALL
            .iter()
            .filter_map(|&slot| self.maps[slot.index()].as_ref().map(|m| (slot, m)))
    }

    // --- Uniforms ---

    #[inline]
    #[must_use]
    pub fn uniforms(&self) -> &MaterialUniforms {
        &self.uniforms
    }

    /// Write access to the uniform block; bumps the uniform version on drop.
    pub fn uniforms_mut(&mut self) -> TrackedMut<'_, MaterialUniforms> {
        TrackedMut::new(&mut self.uniforms, &mut self.uniforms_version)
    }

    #[inline]
    #[must_use]
    pub fn uniforms_version(&self) -> u64 {
        self.uniforms_version.version()
    }

    pub fn set_color(&mut self, color: Vec4) {
        self.uniforms_mut().color = color;
    }

    pub fn set_opacity(&mut self, opacity: f32) {
        self.uniforms_mut().opacity = opacity;
    }

    /// Whether lights are applied in the generated program.
    #[must_use]
    pub fn uses_lights(&self) -> bool {
        self.lights && self.shader.accepts_lights()
    }

    /// Label used in warnings: the material name, or the shader name.
    #[must_use]
    pub fn label(&self) -> &str {
        if self.name.is_empty() {
            self.shader.shader_name()
        } else {
            &self.name
        }
    }
}

impl Default for Material {
    fn default() -> Self {
        Self::basic()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::texture::{Texture, TextureHandle};

    #[test]
    fn test_uniform_edits_do_not_bump_version() {
        let mut material = Material::standard();
        let before = material.version();
        let uniforms_before = material.uniforms_version();

        material.set_color(Vec4::new(1.0, 0.0, 0.0, 1.0));

        assert_eq!(material.version(), before);
        assert_eq!(material.uniforms_version(), uniforms_before + 1);
    }

    #[test]
    fn test_map_presence_bumps_version() {
        let mut material = Material::standard();
        let texture = Texture::new(TextureHandle(7));

        material.set_map(MapSlot::Map, Some(TextureSlot::new(texture)));
        assert_eq!(material.version(), 1);

        // Same properties, different texture: program unaffected.
        let other = Texture::new(TextureHandle(8));
        material.set_map(MapSlot::Map, Some(TextureSlot::new(other)));
        assert_eq!(material.version(), 1);

        material.set_map(MapSlot::Map, Some(TextureSlot::new(other).with_channel(1)));
        assert_eq!(material.version(), 2);
    }

    #[test]
    fn test_blending_resolution() {
        assert_eq!(Blending::None.resolve(false), None);
        assert_eq!(
            Blending::Normal.resolve(true),
            Some(BlendState::PREMULTIPLIED_ALPHA_BLENDING)
        );
        let additive = Blending::Additive.resolve(false).unwrap();
        assert_eq!(additive.color.dst_factor, BlendFactor::One);
    }
}
