//! Render State
//!
//! Per-pass inputs shared by every item of a render list: camera, lights,
//! fog, environment, clipping planes, output encoding and the pass kind.
//!
//! The scene graph owns the source data; it hands the renderer a snapshot plus
//! version counters. Everything the program-variant machinery derives from
//! this struct is either hashed into the feature vector (counts, kinds,
//! encodings) or uploaded as a uniform group gated by its version counter.

use glam::{Mat4, Vec3, Vec4};
use serde::{Deserialize, Serialize};

use crate::renderer::driver::Viewport;
use crate::resources::{ColorEncoding, EnvMap, MaterialId};

// ============================================================================
// Camera
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct CameraState {
    /// Identity of the camera in the scene graph.
    pub id: u64,
    pub view: Mat4,
    pub projection: Mat4,
    pub position: Vec3,
    pub near: f32,
    pub far: f32,
    /// Sub-rectangle of the render target this camera draws into.
    pub viewport: Option<Viewport>,
    /// Bumped by the scene graph whenever any field above changes.
    pub version: u64,
}

impl Default for CameraState {
    fn default() -> Self {
        Self {
            id: 0,
            view: Mat4::IDENTITY,
            projection: Mat4::IDENTITY,
            position: Vec3::ZERO,
            near: 0.1,
            far: 1000.0,
            viewport: None,
            version: 1,
        }
    }
}

impl CameraState {
    /// View-space depth of a world-space point, positive in front of the camera.
    #[must_use]
    pub fn view_depth(&self, world: Vec3) -> f32 {
        -self.view.transform_point3(world).z
    }
}

// ============================================================================
// Lights
// ============================================================================

/// Light counts by kind and by shadow-casting flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct LightCounts {
    pub directional: u32,
    pub point: u32,
    pub spot: u32,
    pub rect_area: u32,
    pub hemisphere: u32,
    pub directional_shadow: u32,
    pub point_shadow: u32,
    pub spot_shadow: u32,
}

impl LightCounts {
    #[must_use]
    pub fn total(&self) -> u32 {
        self.directional + self.point + self.spot + self.rect_area + self.hemisphere
    }
}

/// Shadow filtering technique.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ShadowMapKind {
    Basic,
    #[default]
    Pcf,
    PcfSoft,
    Vsm,
}

impl ShadowMapKind {
    #[must_use]
    pub const fn define(self) -> &'static str {
        match self {
            Self::Basic => "SHADOWMAP_TYPE_BASIC",
            Self::Pcf => "SHADOWMAP_TYPE_PCF",
            Self::PcfSoft => "SHADOWMAP_TYPE_PCF_SOFT",
            Self::Vsm => "SHADOWMAP_TYPE_VSM",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ShadowMapSettings {
    pub enabled: bool,
    pub kind: ShadowMapKind,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct LightState {
    pub counts: LightCounts,
    /// Tiled/clustered light evaluation instead of per-light loops.
    pub clustered: bool,
    pub ambient: Vec4,
}

// ============================================================================
// Fog / Clipping / Output
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FogKind {
    Linear,
    Exp2,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fog {
    pub kind: FogKind,
    pub color: Vec4,
    pub near: f32,
    pub far: f32,
    pub density: f32,
}

impl Fog {
    #[must_use]
    pub fn linear(color: Vec4, near: f32, far: f32) -> Self {
        Self {
            kind: FogKind::Linear,
            color,
            near,
            far,
            density: 0.0,
        }
    }

    #[must_use]
    pub fn exp2(color: Vec4, density: f32) -> Self {
        Self {
            kind: FogKind::Exp2,
            color,
            near: 0.0,
            far: 0.0,
            density,
        }
    }
}

/// Active clipping planes. The last `intersection` planes are combined with
/// AND, the others with OR.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ClippingState {
    pub planes: Vec<Vec4>,
    pub intersection: u32,
}

impl ClippingState {
    #[must_use]
    pub fn count(&self) -> u32 {
        self.planes.len() as u32
    }

    /// Planes combined with OR.
    #[must_use]
    pub fn union_count(&self) -> u32 {
        self.count().saturating_sub(self.intersection)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ToneMapping {
    #[default]
    None,
    Linear,
    Reinhard,
    Cineon,
    AcesFilmic,
}

impl ToneMapping {
    #[must_use]
    pub const fn code(self) -> u32 {
        match self {
            Self::None => 0,
            Self::Linear => 1,
            Self::Reinhard => 2,
            Self::Cineon => 3,
            Self::AcesFilmic => 4,
        }
    }

    #[must_use]
    pub const fn function_name(self) -> &'static str {
        match self {
            Self::None => "",
            Self::Linear => "LinearToneMapping",
            Self::Reinhard => "ReinhardToneMapping",
            Self::Cineon => "OptimizedCineonToneMapping",
            Self::AcesFilmic => "ACESFilmicToneMapping",
        }
    }
}

/// Off-screen target description.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderTargetInfo {
    pub width: u32,
    pub height: u32,
    /// Number of color attachments written by the fragment shader.
    pub draw_buffers: u32,
    pub encoding: ColorEncoding,
}

// ============================================================================
// Pass Kind
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DepthPacking {
    #[default]
    Basic,
    Rgba,
}

/// What the current pass writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PassKind {
    #[default]
    Color,
    /// Depth-only pass (shadow maps, depth prepass).
    Depth(DepthPacking),
}

impl PassKind {
    #[must_use]
    pub const fn code(self) -> u32 {
        match self {
            Self::Color => 0,
            Self::Depth(DepthPacking::Basic) => 1,
            Self::Depth(DepthPacking::Rgba) => 2,
        }
    }

    #[must_use]
    pub const fn is_depth(self) -> bool {
        matches!(self, Self::Depth(_))
    }
}

// ============================================================================
// Render State
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct RenderState {
    pub camera: CameraState,
    pub lights: LightState,
    pub fog: Option<Fog>,
    /// Scene environment; a material's own env map takes precedence.
    pub environment: Option<EnvMap>,
    pub environment_version: u64,
    pub clipping: ClippingState,
    /// Canvas output encoding, used when no render target is bound.
    pub output_encoding: ColorEncoding,
    pub tone_mapping: ToneMapping,
    pub tone_mapping_exposure: f32,
    pub physically_correct_lights: bool,
    pub shadow_map: ShadowMapSettings,
    pub viewport: Viewport,
    pub scissor: Option<Viewport>,
    pub render_target: Option<RenderTargetInfo>,
    /// Draws every item with this material instead of its own.
    pub override_material: Option<MaterialId>,
    /// Bumped whenever fog or other scene-level uniforms change.
    pub scene_version: u64,
    pub pass: PassKind,
}

impl Default for RenderState {
    fn default() -> Self {
        Self {
            camera: CameraState::default(),
            lights: LightState::default(),
            fog: None,
            environment: None,
            environment_version: 0,
            clipping: ClippingState::default(),
            output_encoding: ColorEncoding::Linear,
            tone_mapping: ToneMapping::None,
            tone_mapping_exposure: 1.0,
            physically_correct_lights: false,
            shadow_map: ShadowMapSettings::default(),
            viewport: Viewport::new(0, 0, 1, 1),
            scissor: None,
            render_target: None,
            override_material: None,
            scene_version: 1,
            pass: PassKind::Color,
        }
    }
}

impl RenderState {
    #[must_use]
    pub fn with_viewport(mut self, width: u32, height: u32) -> Self {
        self.viewport = Viewport::new(0, 0, width, height);
        self
    }

    /// Encoding of the current target: the render target's, else the canvas'.
    #[must_use]
    pub fn effective_output_encoding(&self) -> ColorEncoding {
        self.render_target
            .map_or(self.output_encoding, |target| target.encoding)
    }

    /// Tone mapping applies only when drawing to the canvas.
    #[must_use]
    pub fn effective_tone_mapping(&self) -> ToneMapping {
        if self.render_target.is_some() {
            ToneMapping::None
        } else {
            self.tone_mapping
        }
    }

    #[must_use]
    pub fn draw_buffers(&self) -> u32 {
        self.render_target.map_or(1, |target| target.draw_buffers.max(1))
    }

    /// Viewport of the current camera: its sub-rectangle if set, else the full
    /// viewport.
    #[must_use]
    pub fn effective_viewport(&self) -> Viewport {
        self.camera.viewport.unwrap_or(self.viewport)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_target_overrides_output() {
        let mut state = RenderState {
            output_encoding: ColorEncoding::Srgb,
            tone_mapping: ToneMapping::AcesFilmic,
            ..Default::default()
        };
        assert_eq!(state.effective_output_encoding(), ColorEncoding::Srgb);
        assert_eq!(state.effective_tone_mapping(), ToneMapping::AcesFilmic);

        state.render_target = Some(RenderTargetInfo {
            width: 64,
            height: 64,
            draw_buffers: 2,
            encoding: ColorEncoding::Linear,
        });
        assert_eq!(state.effective_output_encoding(), ColorEncoding::Linear);
        assert_eq!(state.effective_tone_mapping(), ToneMapping::None);
        assert_eq!(state.draw_buffers(), 2);
    }

    #[test]
    fn test_clipping_union_count() {
        let clipping = ClippingState {
            planes: vec![Vec4::X, Vec4::Y, Vec4::Z],
            intersection: 1,
        };
        assert_eq!(clipping.count(), 3);
        assert_eq!(clipping.union_count(), 2);
    }

    #[test]
    fn test_view_depth_in_front_is_positive() {
        let camera = CameraState {
            view: Mat4::look_at_rh(Vec3::new(0.0, 0.0, 10.0), Vec3::ZERO, Vec3::Y),
            ..Default::default()
        };
        assert!((camera.view_depth(Vec3::ZERO) - 10.0).abs() < 1e-5);
    }
}
