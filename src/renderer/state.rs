//! State Synchronizer
//!
//! Owns the driver and a shadow copy of every GPU state axis the renderer
//! touches. Each setter compares the request against the shadow and only
//! forwards it to the driver on a difference, so issuing the same
//! blend/depth/cull configuration twice costs nothing the second time.
//!
//! # Unknown state
//!
//! Every shadow field is an `Option` where `None` means "unknown": the next
//! setter on that axis always emits. [`StateSynchronizer::reset`] returns the
//! whole shadow to unknown, which is required after context loss or after
//! code outside the renderer touched the driver.
//!
//! # Locks
//!
//! Multi-target clear and blit sequences lock the color, depth or stencil
//! axes ([`StateLocks`]). While locked, setters on those axes are ignored and
//! the shadow keeps its old value, so unlocking and resending restores the
//! intended state.

use bitflags::bitflags;
use glam::Vec4;
use smallvec::SmallVec;
use wgpu::{BlendState, CompareFunction, Face, FrontFace, StencilOperation};

use crate::renderer::driver::{
    BufferHandle, BufferTarget, GpuDriver, ProgramHandle, VertexArrayHandle, Viewport,
};
use crate::resources::{Material, PolygonOffset, Side, TextureHandle};

bitflags! {
    /// Axes that can be locked against writes.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct StateLocks: u8 {
        /// Color mask and clear color.
        const COLOR = 1 << 0;
        /// Depth test, depth mask, depth function and clear depth.
        const DEPTH = 1 << 1;
        /// Stencil test, mask, function, ops and clear stencil.
        const STENCIL = 1 << 2;
    }
}

type StencilOps = (StencilOperation, StencilOperation, StencilOperation);

/// Shadow of the driver state. `None` in any field means unknown.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GpuStateShadow {
    pub program: Option<Option<ProgramHandle>>,
    pub cull_face: Option<Option<Face>>,
    pub front_face: Option<FrontFace>,
    pub blend: Option<Option<BlendState>>,
    pub depth_test: Option<bool>,
    pub depth_write: Option<bool>,
    pub depth_func: Option<CompareFunction>,
    pub color_mask: Option<bool>,
    pub stencil_test: Option<bool>,
    pub stencil_write_mask: Option<u32>,
    pub stencil_func: Option<(CompareFunction, u32, u32)>,
    pub stencil_op: Option<StencilOps>,
    pub polygon_offset: Option<Option<(f32, f32)>>,
    pub line_width: Option<f32>,
    pub viewport: Option<Viewport>,
    pub scissor: Option<Option<Viewport>>,
    pub clear_color: Option<Vec4>,
    pub clear_depth: Option<f32>,
    pub clear_stencil: Option<u32>,
    pub active_texture: Option<u32>,
    pub texture_units: SmallVec<[Option<Option<TextureHandle>>; 16]>,
    pub buffers: [Option<Option<BufferHandle>>; BufferTarget::COUNT],
    pub vertex_array: Option<Option<VertexArrayHandle>>,
}

impl GpuStateShadow {
    /// Fully unknown shadow for a context with `texture_units` units.
    #[must_use]
    pub fn unknown(texture_units: u32) -> Self {
        Self {
            texture_units: SmallVec::from_elem(None, texture_units as usize),
            ..Self::default()
        }
    }
}

/// Shadowed front-end of a [`GpuDriver`].
#[derive(Debug)]
pub struct StateSynchronizer<D: GpuDriver> {
    driver: D,
    shadow: GpuStateShadow,
    locks: StateLocks,
    texture_units: u32,
}

/// Compares `$requested` with the shadow field and forwards on a difference.
macro_rules! sync_axis {
    ($self:ident, $field:ident, $requested:expr, |$driver:ident, $value:ident| $call:expr) => {{
        let $value = $requested;
        if $self.shadow.$field != Some($value) {
            let $driver = &mut $self.driver;
            $call;
            $self.shadow.$field = Some($value);
        }
    }};
}

impl<D: GpuDriver> StateSynchronizer<D> {
    pub fn new(driver: D, texture_units: u32) -> Self {
        Self {
            driver,
            shadow: GpuStateShadow::unknown(texture_units),
            locks: StateLocks::empty(),
            texture_units,
        }
    }

    #[must_use]
    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Direct driver access for non-state commands (program creation, buffer
    /// uploads, draws). State changed through this handle bypasses the shadow;
    /// call [`reset`](Self::reset) afterwards if that happens.
    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    #[must_use]
    pub fn shadow(&self) -> &GpuStateShadow {
        &self.shadow
    }

    /// Forgets all shadowed state and releases the locks.
    pub fn reset(&mut self) {
        self.shadow = GpuStateShadow::unknown(self.texture_units);
        self.locks = StateLocks::empty();
        log::debug!("GPU state shadow reset");
    }

    // --- Locks ---

    pub fn lock(&mut self, axes: StateLocks) {
        self.locks.insert(axes);
    }

    pub fn unlock(&mut self, axes: StateLocks) {
        self.locks.remove(axes);
    }

    #[must_use]
    pub fn locks(&self) -> StateLocks {
        self.locks
    }

    // --- Program ---

    /// Returns `true` when the driver was called.
    pub fn use_program(&mut self, program: Option<ProgramHandle>) -> bool {
        if self.shadow.program == Some(program) {
            return false;
        }
        self.driver.use_program(program);
        self.shadow.program = Some(program);
        true
    }

    #[must_use]
    pub fn current_program(&self) -> Option<ProgramHandle> {
        self.shadow.program.flatten()
    }

    // --- Rasterizer ---

    pub fn set_cull_face(&mut self, face: Option<Face>) {
        sync_axis!(self, cull_face, face, |d, v| d.set_cull_face(v));
    }

    pub fn set_front_face(&mut self, face: FrontFace) {
        sync_axis!(self, front_face, face, |d, v| d.set_front_face(v));
    }

    pub fn set_polygon_offset(&mut self, offset: Option<PolygonOffset>) {
        let offset = offset.map(|o| (o.factor, o.units));
        sync_axis!(self, polygon_offset, offset, |d, v| d.set_polygon_offset(v));
    }

    pub fn set_line_width(&mut self, width: f32) {
        sync_axis!(self, line_width, width, |d, v| d.set_line_width(v));
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        sync_axis!(self, viewport, viewport, |d, v| d.set_viewport(v));
    }

    pub fn set_scissor(&mut self, scissor: Option<Viewport>) {
        sync_axis!(self, scissor, scissor, |d, v| d.set_scissor(v));
    }

    // --- Blending ---

    pub fn set_blend(&mut self, blend: Option<BlendState>) {
        sync_axis!(self, blend, blend, |d, v| d.set_blend(v));
    }

    // --- Color ---

    pub fn set_color_mask(&mut self, enabled: bool) {
        if self.locks.contains(StateLocks::COLOR) {
            return;
        }
        sync_axis!(self, color_mask, enabled, |d, v| d.set_color_mask(v));
    }

    pub fn set_clear_color(&mut self, color: Vec4) {
        if self.locks.contains(StateLocks::COLOR) {
            return;
        }
        sync_axis!(self, clear_color, color, |d, v| d.set_clear_color(v));
    }

    // --- Depth ---

    pub fn set_depth_test(&mut self, enabled: bool) {
        if self.locks.contains(StateLocks::DEPTH) {
            return;
        }
        sync_axis!(self, depth_test, enabled, |d, v| d.set_depth_test(v));
    }

    pub fn set_depth_write(&mut self, enabled: bool) {
        if self.locks.contains(StateLocks::DEPTH) {
            return;
        }
        sync_axis!(self, depth_write, enabled, |d, v| d.set_depth_write(v));
    }

    pub fn set_depth_func(&mut self, func: CompareFunction) {
        if self.locks.contains(StateLocks::DEPTH) {
            return;
        }
        sync_axis!(self, depth_func, func, |d, v| d.set_depth_func(v));
    }

    pub fn set_clear_depth(&mut self, depth: f32) {
        if self.locks.contains(StateLocks::DEPTH) {
            return;
        }
        sync_axis!(self, clear_depth, depth, |d, v| d.set_clear_depth(v));
    }

    // --- Stencil ---

    pub fn set_stencil_test(&mut self, enabled: bool) {
        if self.locks.contains(StateLocks::STENCIL) {
            return;
        }
        sync_axis!(self, stencil_test, enabled, |d, v| d.set_stencil_test(v));
    }

    pub fn set_stencil_write_mask(&mut self, mask: u32) {
        if self.locks.contains(StateLocks::STENCIL) {
            return;
        }
        sync_axis!(self, stencil_write_mask, mask, |d, v| d
            .set_stencil_write_mask(v));
    }

    pub fn set_stencil_func(&mut self, func: CompareFunction, reference: u32, mask: u32) {
        if self.locks.contains(StateLocks::STENCIL) {
            return;
        }
        sync_axis!(self, stencil_func, (func, reference, mask), |d, v| d
            .set_stencil_func(v.0, v.1, v.2));
    }

    pub fn set_stencil_op(
        &mut self,
        fail: StencilOperation,
        depth_fail: StencilOperation,
        pass: StencilOperation,
    ) {
        if self.locks.contains(StateLocks::STENCIL) {
            return;
        }
        sync_axis!(self, stencil_op, (fail, depth_fail, pass), |d, v| d
            .set_stencil_op(v.0, v.1, v.2));
    }

    pub fn set_clear_stencil(&mut self, value: u32) {
        if self.locks.contains(StateLocks::STENCIL) {
            return;
        }
        sync_axis!(self, clear_stencil, value, |d, v| d.set_clear_stencil(v));
    }

    /// Clears the requested buffers with the current clear values.
    pub fn clear(&mut self, color: bool, depth: bool, stencil: bool) {
        if color || depth || stencil {
            self.driver.clear(color, depth, stencil);
        }
    }

    // --- Textures ---

    pub fn active_texture(&mut self, unit: u32) {
        sync_axis!(self, active_texture, unit, |d, v| d.active_texture(v));
    }

    /// Binds `texture` to `unit`, activating the unit only when needed.
    pub fn bind_texture(&mut self, unit: u32, texture: Option<TextureHandle>) {
        let index = unit as usize;
        if index >= self.shadow.texture_units.len() {
            self.shadow.texture_units.resize(index + 1, None);
        }
        if self.shadow.texture_units[index] == Some(texture) {
            return;
        }
        self.active_texture(unit);
        self.driver.bind_texture(texture);
        self.shadow.texture_units[index] = Some(texture);
    }

    // --- Buffers ---

    pub fn bind_buffer(&mut self, target: BufferTarget, buffer: Option<BufferHandle>) {
        let slot = &mut self.shadow.buffers[target.index()];
        if *slot == Some(buffer) {
            return;
        }
        self.driver.bind_buffer(target, buffer);
        *slot = Some(buffer);
    }

    pub fn bind_vertex_array(&mut self, vertex_array: Option<VertexArrayHandle>) {
        sync_axis!(self, vertex_array, vertex_array, |d, v| d.bind_vertex_array(v));
    }

    #[must_use]
    pub fn current_vertex_array(&self) -> Option<VertexArrayHandle> {
        self.shadow.vertex_array.flatten()
    }

    // --- Material ---

    /// Applies the cull, blend, depth, stencil and offset state of a material.
    ///
    /// `front_face_cw` is set for mirrored (negative determinant) transforms.
    pub fn apply_material(&mut self, material: &Material, front_face_cw: bool) {
        self.set_cull_face(match material.side {
            Side::Double => None,
            Side::Front | Side::Back => Some(Face::Back),
        });
        let flip_sided = (material.side == Side::Back) != front_face_cw;
        self.set_front_face(if flip_sided {
            FrontFace::Cw
        } else {
            FrontFace::Ccw
        });

        let blend = if material.transparent {
            material.blending.resolve(material.premultiplied_alpha)
        } else {
            None
        };
        self.set_blend(blend);

        self.set_depth_func(material.depth_func);
        self.set_depth_test(material.depth_test);
        self.set_depth_write(material.depth_write);
        self.set_color_mask(material.color_write);

        let stencil = &material.stencil;
        self.set_stencil_write_mask(stencil.write_mask);
        self.set_stencil_test(stencil.enabled);
        if stencil.enabled {
            self.set_stencil_func(stencil.func, stencil.reference, stencil.func_mask);
            self.set_stencil_op(stencil.fail, stencil.depth_fail, stencil.pass);
        }

        self.set_polygon_offset(material.polygon_offset);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::driver::{DriverCall, HeadlessDriver};

    fn sync() -> StateSynchronizer<HeadlessDriver> {
        StateSynchronizer::new(HeadlessDriver::new(), 8)
    }

    #[test]
    fn test_equal_request_is_noop() {
        let mut state = sync();
        state.set_depth_test(true);
        state.set_depth_test(true);
        state.set_cull_face(Some(Face::Back));
        state.set_cull_face(Some(Face::Back));
        assert_eq!(state.driver().call_count(), 2);
    }

    #[test]
    fn test_reset_forces_reemit() {
        let mut state = sync();
        state.set_blend(None);
        state.reset();
        state.set_blend(None);
        assert_eq!(state.driver().count(|c| matches!(c, DriverCall::Blend(_))), 2);
    }

    #[test]
    fn test_locked_axis_ignored_until_unlocked() {
        let mut state = sync();
        state.set_depth_write(true);
        state.lock(StateLocks::DEPTH);
        state.set_depth_write(false);
        assert_eq!(state.shadow().depth_write, Some(true));

        state.unlock(StateLocks::DEPTH);
        state.set_depth_write(false);
        assert_eq!(state.shadow().depth_write, Some(false));
        assert_eq!(
            state.driver().calls(),
            &[DriverCall::DepthWrite(true), DriverCall::DepthWrite(false)]
        );
    }

    #[test]
    fn test_texture_binding_activates_unit_once() {
        let mut state = sync();
        state.bind_texture(2, Some(TextureHandle(5)));
        state.bind_texture(2, Some(TextureHandle(5)));
        state.bind_texture(3, Some(TextureHandle(5)));
        assert_eq!(
            state.driver().calls(),
            &[
                DriverCall::ActiveTexture(2),
                DriverCall::BindTexture(Some(TextureHandle(5))),
                DriverCall::ActiveTexture(3),
                DriverCall::BindTexture(Some(TextureHandle(5))),
            ]
        );
    }

    #[test]
    fn test_buffer_targets_are_independent() {
        let mut state = sync();
        state.bind_buffer(BufferTarget::Array, Some(BufferHandle(1)));
        state.bind_buffer(BufferTarget::ElementArray, Some(BufferHandle(1)));
        state.bind_buffer(BufferTarget::Array, Some(BufferHandle(1)));
        assert_eq!(state.driver().call_count(), 2);
    }

    #[test]
    fn test_apply_material_twice_emits_nothing_new() {
        let mut state = sync();
        let material = Material::standard();
        state.apply_material(&material, false);
        let first = state.driver().call_count();
        assert!(first > 0);

        state.apply_material(&material, false);
        assert_eq!(state.driver().call_count(), first);
    }

    #[test]
    fn test_mirrored_transform_flips_front_face() {
        let mut state = sync();
        let material = Material::basic();
        state.apply_material(&material, true);
        assert_eq!(state.shadow().front_face, Some(FrontFace::Cw));

        let mut back = Material::basic();
        back.side = Side::Back;
        state.apply_material(&back, true);
        assert_eq!(state.shadow().front_face, Some(FrontFace::Ccw));
    }
}
