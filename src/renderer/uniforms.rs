//! Uniform Groups
//!
//! Uniforms are uploaded in fixed groups identified by [`UniformSlot`]. The
//! model matrix group is uploaded for every draw; every other group carries an
//! [`UploadStamp`] (owner identity + version counter) and is skipped when the
//! program already received that exact stamp.
//!
//! The stamps are remembered per program, because a shared program may be
//! used by many materials and cameras in one frame.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec4};
use slotmap::{Key, SecondaryMap};

use crate::renderer::pipeline::ProgramId;
use crate::renderer::render_state::RenderState;
use crate::resources::{Material, MaterialId, RenderObject};

/// Uniform group tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum UniformSlot {
    ModelMatrix,
    Camera,
    Scene,
    Material,
    Environment,
    /// User uniform declared on a material.
    Custom(String),
}

// ============================================================================
// Packed Groups
// ============================================================================

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct ModelUniforms {
    pub model: Mat4,
    pub model_view: Mat4,
    /// Inverse-transpose of the model-view matrix; only the upper 3x3 is read.
    pub normal_matrix: Mat4,
}

impl ModelUniforms {
    #[must_use]
    pub fn new(object: &RenderObject, view: Mat4) -> Self {
        let model_view = view * object.model_matrix;
        Self {
            model: object.model_matrix,
            model_view,
            normal_matrix: model_view.inverse().transpose(),
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct CameraUniforms {
    pub view: Mat4,
    pub projection: Mat4,
    pub position: Vec4,
    /// `(near, far, log_depth_fc, 0)`
    pub near_far: Vec4,
}

impl CameraUniforms {
    #[must_use]
    pub fn new(state: &RenderState) -> Self {
        let camera = &state.camera;
        let log_depth_fc = 2.0 / (camera.far + 1.0).log2();
        Self {
            view: camera.view,
            projection: camera.projection,
            position: camera.position.extend(1.0),
            near_far: Vec4::new(camera.near, camera.far, log_depth_fc, 0.0),
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct SceneUniforms {
    pub fog_color: Vec4,
    /// `(near, far, density, 0)`
    pub fog_params: Vec4,
    pub ambient: Vec4,
    /// `(exposure, 0, 0, 0)`
    pub tone_mapping: Vec4,
}

impl SceneUniforms {
    #[must_use]
    pub fn new(state: &RenderState) -> Self {
        let (fog_color, fog_params) = state.fog.map_or((Vec4::ZERO, Vec4::ZERO), |fog| {
            (fog.color, Vec4::new(fog.near, fog.far, fog.density, 0.0))
        });
        Self {
            fog_color,
            fog_params,
            ambient: state.lights.ambient,
            tone_mapping: Vec4::new(state.tone_mapping_exposure, 0.0, 0.0, 0.0),
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct EnvironmentUniforms {
    /// `(intensity, flip, max_mip_level, 0)`
    pub params: Vec4,
}

// ============================================================================
// Upload Cache
// ============================================================================

/// Identity + version of the data last uploaded for one group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UploadStamp {
    pub owner: u64,
    pub version: u64,
}

impl UploadStamp {
    #[must_use]
    pub const fn new(owner: u64, version: u64) -> Self {
        Self { owner, version }
    }

    #[must_use]
    pub fn camera(state: &RenderState) -> Self {
        Self::new(state.camera.id, state.camera.version)
    }

    #[must_use]
    pub fn scene(state: &RenderState) -> Self {
        Self::new(0, state.scene_version)
    }

    #[must_use]
    pub fn environment(state: &RenderState) -> Self {
        Self::new(0, state.environment_version)
    }

    #[must_use]
    pub fn material(id: MaterialId, material: &Material) -> Self {
        Self::new(id.data().as_ffi(), material.uniforms_version())
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct ProgramStamps {
    camera: Option<UploadStamp>,
    scene: Option<UploadStamp>,
    material: Option<UploadStamp>,
    environment: Option<UploadStamp>,
}

impl ProgramStamps {
    fn slot_mut(&mut self, slot: &UniformSlot) -> Option<&mut Option<UploadStamp>> {
        match slot {
            UniformSlot::Camera => Some(&mut self.camera),
            UniformSlot::Scene => Some(&mut self.scene),
            UniformSlot::Material => Some(&mut self.material),
            UniformSlot::Environment => Some(&mut self.environment),
            UniformSlot::ModelMatrix | UniformSlot::Custom(_) => None,
        }
    }
}

/// Per-program record of the last uploaded group stamps.
#[derive(Debug, Default)]
pub struct UniformUploads {
    programs: SecondaryMap<ProgramId, ProgramStamps>,
}

impl UniformUploads {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` (and records the stamp) when the group must be uploaded.
    ///
    /// The model matrix and custom uniforms always report `true`; custom
    /// uniforms are gated by the caller through the material stamp.
    pub fn needs_upload(&mut self, program: ProgramId, slot: &UniformSlot, stamp: UploadStamp) -> bool {
        if !self.programs.contains_key(program) {
            self.programs.insert(program, ProgramStamps::default());
        }
        let Some(stamps) = self.programs.get_mut(program) else {
            return true;
        };
        match stamps.slot_mut(slot) {
            Some(last) if *last == Some(stamp) => false,
            Some(last) => {
                *last = Some(stamp);
                true
            }
            None => true,
        }
    }

    /// Drops the record of a released program.
    pub fn forget(&mut self, program: ProgramId) {
        self.programs.remove(program);
    }

    /// Forces every group to re-upload (context restore).
    pub fn clear(&mut self) {
        self.programs.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;

    #[test]
    fn test_group_upload_skipped_for_same_stamp() {
        let mut programs: SlotMap<ProgramId, ()> = SlotMap::with_key();
        let program = programs.insert(());
        let mut uploads = UniformUploads::new();
        let stamp = UploadStamp::new(0, 3);

        assert!(uploads.needs_upload(program, &UniformSlot::Camera, stamp));
        assert!(!uploads.needs_upload(program, &UniformSlot::Camera, stamp));
        assert!(uploads.needs_upload(program, &UniformSlot::Camera, UploadStamp::new(0, 4)));
        assert!(uploads.needs_upload(program, &UniformSlot::Scene, stamp));
    }

    #[test]
    fn test_model_matrix_always_uploads() {
        let mut programs: SlotMap<ProgramId, ()> = SlotMap::with_key();
        let program = programs.insert(());
        let mut uploads = UniformUploads::new();
        let stamp = UploadStamp::new(0, 1);

        assert!(uploads.needs_upload(program, &UniformSlot::ModelMatrix, stamp));
        assert!(uploads.needs_upload(program, &UniformSlot::ModelMatrix, stamp));
    }

    #[test]
    fn test_programs_are_tracked_separately() {
        let mut programs: SlotMap<ProgramId, ()> = SlotMap::with_key();
        let a = programs.insert(());
        let b = programs.insert(());
        let mut uploads = UniformUploads::new();
        let stamp = UploadStamp::new(7, 1);

        assert!(uploads.needs_upload(a, &UniformSlot::Material, stamp));
        assert!(uploads.needs_upload(b, &UniformSlot::Material, stamp));

        uploads.forget(a);
        assert!(uploads.needs_upload(a, &UniformSlot::Material, stamp));
    }
}
