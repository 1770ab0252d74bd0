//! Headless driver.
//!
//! Records every command instead of talking to a GPU. Used by the test suite
//! as a call-counting stub, and by hosts that want to dry-run a frame.
//!
//! Program compilation is simulated: a program stays [`ProgramStatus::Pending`]
//! for `compile_latency` polls, and fails when either source contains the
//! configured failure marker.

use glam::Vec4;
use rustc_hash::FxHashMap;
use wgpu::{BlendState, CompareFunction, Face, FrontFace, IndexFormat, PrimitiveTopology, StencilOperation};

use super::{
    BufferHandle, BufferTarget, DrawSpan, GeometryBuffers, GpuDriver, ProgramHandle,
    ProgramStatus, VertexArrayHandle, Viewport,
};
use crate::renderer::uniforms::UniformSlot;
use crate::resources::{Geometry, GeometryId, TextureHandle, VertexAttribute};

/// One recorded driver command.
#[derive(Debug, Clone, PartialEq)]
pub enum DriverCall {
    CreateProgram { handle: ProgramHandle, label: String },
    DeleteProgram(ProgramHandle),
    UseProgram(Option<ProgramHandle>),
    UploadUniforms { program: ProgramHandle, slot: UniformSlot, bytes: usize },

    CullFace(Option<Face>),
    FrontFace(FrontFace),
    Blend(Option<BlendState>),
    DepthTest(bool),
    DepthWrite(bool),
    DepthFunc(CompareFunction),
    ColorMask(bool),
    StencilTest(bool),
    StencilWriteMask(u32),
    StencilFunc(CompareFunction, u32, u32),
    StencilOp(StencilOperation, StencilOperation, StencilOperation),
    PolygonOffset(Option<(f32, f32)>),
    LineWidth(f32),
    Viewport(Viewport),
    Scissor(Option<Viewport>),
    ClearColor(Vec4),
    ClearDepth(f32),
    ClearStencil(u32),
    Clear { color: bool, depth: bool, stencil: bool },

    ActiveTexture(u32),
    BindTexture(Option<TextureHandle>),
    BindBuffer(BufferTarget, Option<BufferHandle>),
    UpdateGeometry(GeometryId),
    DeleteGeometry(GeometryBuffers),
    CreateIndexBuffer { buffer: BufferHandle, count: usize },
    DeleteBuffer(BufferHandle),
    CreateVertexArray(VertexArrayHandle),
    BindVertexArray(Option<VertexArrayHandle>),
    DeleteVertexArray(VertexArrayHandle),

    DrawArrays { topology: PrimitiveTopology, first: u32, count: u32 },
    DrawElements { topology: PrimitiveTopology, format: IndexFormat, first: u32, count: u32 },
    DrawArraysInstanced { topology: PrimitiveTopology, first: u32, count: u32, instances: u32 },
    DrawElementsInstanced {
        topology: PrimitiveTopology,
        format: IndexFormat,
        first: u32,
        count: u32,
        instances: u32,
    },
    MultiDrawArrays { topology: PrimitiveTopology, spans: Vec<DrawSpan> },
    MultiDrawElements { topology: PrimitiveTopology, format: IndexFormat, spans: Vec<DrawSpan> },
}

impl DriverCall {
    /// Whether the call is one of the draw entry points.
    #[must_use]
    pub fn is_draw(&self) -> bool {
        matches!(
            self,
            Self::DrawArrays { .. }
                | Self::DrawElements { .. }
                | Self::DrawArraysInstanced { .. }
                | Self::DrawElementsInstanced { .. }
                | Self::MultiDrawArrays { .. }
                | Self::MultiDrawElements { .. }
        )
    }

    /// Whether the call mutates fixed-function or binding state.
    #[must_use]
    pub fn is_state_change(&self) -> bool {
        !self.is_draw()
            && !matches!(
                self,
                Self::CreateProgram { .. }
                    | Self::DeleteProgram(_)
                    | Self::UploadUniforms { .. }
                    | Self::UpdateGeometry(_)
                    | Self::DeleteGeometry(_)
                    | Self::CreateIndexBuffer { .. }
                    | Self::DeleteBuffer(_)
                    | Self::CreateVertexArray(_)
                    | Self::DeleteVertexArray(_)
                    | Self::Clear { .. }
            )
    }
}

#[derive(Debug)]
struct SimulatedProgram {
    label: String,
    vertex: String,
    fragment: String,
    polls_left: u32,
    failure: Option<String>,
}

/// Recording driver with simulated compile latency and failures.
#[derive(Debug, Default)]
pub struct HeadlessDriver {
    calls: Vec<DriverCall>,
    programs: FxHashMap<ProgramHandle, SimulatedProgram>,
    geometry_buffers: FxHashMap<GeometryId, GeometryBuffers>,
    next_handle: u64,
    compile_count: usize,

    /// Number of `program_status` polls a new program reports `Pending`.
    pub compile_latency: u32,
    /// Sources containing this marker fail to compile.
    pub failure_marker: Option<String>,
}

impl HeadlessDriver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_compile_latency(mut self, polls: u32) -> Self {
        self.compile_latency = polls;
        self
    }

    #[must_use]
    pub fn with_failure_marker(mut self, marker: impl Into<String>) -> Self {
        self.failure_marker = Some(marker.into());
        self
    }

    #[must_use]
    pub fn calls(&self) -> &[DriverCall] {
        &self.calls
    }

    /// Drains the recorded calls.
    pub fn take_calls(&mut self) -> Vec<DriverCall> {
        std::mem::take(&mut self.calls)
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.len()
    }

    /// Counts recorded calls matching a predicate.
    pub fn count(&self, predicate: impl Fn(&DriverCall) -> bool) -> usize {
        self.calls.iter().filter(|c| predicate(c)).count()
    }

    #[must_use]
    pub fn draw_count(&self) -> usize {
        self.count(DriverCall::is_draw)
    }

    /// Total `create_program` invocations since construction.
    #[must_use]
    pub fn compile_count(&self) -> usize {
        self.compile_count
    }

    /// Programs created and not yet deleted.
    #[must_use]
    pub fn live_programs(&self) -> usize {
        self.programs.len()
    }

    #[must_use]
    pub fn program_label(&self, program: ProgramHandle) -> Option<&str> {
        self.programs.get(&program).map(|p| p.label.as_str())
    }

    /// Vertex and fragment source of a live program.
    #[must_use]
    pub fn program_source(&self, program: ProgramHandle) -> Option<(&str, &str)> {
        self.programs
            .get(&program)
            .map(|p| (p.vertex.as_str(), p.fragment.as_str()))
    }

    fn allocate(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }

    fn failure_line(&self, source: &str) -> Option<usize> {
        let marker = self.failure_marker.as_deref()?;
        source
            .lines()
            .position(|line| line.contains(marker))
            .map(|i| i + 1)
    }
}

impl GpuDriver for HeadlessDriver {
    fn create_program(&mut self, label: &str, vertex: &str, fragment: &str) -> ProgramHandle {
        let handle = ProgramHandle(self.allocate());
        self.compile_count += 1;

        let failure = self
            .failure_line(vertex)
            .map(|line| format!("ERROR: 0:{line}: vertex shader rejected"))
            .or_else(|| {
                self.failure_line(fragment)
                    .map(|line| format!("ERROR: 0:{line}: fragment shader rejected"))
            });

        self.programs.insert(
            handle,
            SimulatedProgram {
                label: label.to_string(),
                vertex: vertex.to_string(),
                fragment: fragment.to_string(),
                polls_left: self.compile_latency,
                failure,
            },
        );
        self.calls.push(DriverCall::CreateProgram {
            handle,
            label: label.to_string(),
        });
        handle
    }

    fn program_status(&mut self, program: ProgramHandle) -> ProgramStatus {
        let Some(state) = self.programs.get_mut(&program) else {
            return ProgramStatus::Failed("unknown program".to_string());
        };
        if state.polls_left > 0 {
            state.polls_left -= 1;
            return ProgramStatus::Pending;
        }
        match &state.failure {
            Some(log) => ProgramStatus::Failed(log.clone()),
            None => ProgramStatus::Ready,
        }
    }

    fn delete_program(&mut self, program: ProgramHandle) {
        self.programs.remove(&program);
        self.calls.push(DriverCall::DeleteProgram(program));
    }

    fn use_program(&mut self, program: Option<ProgramHandle>) {
        self.calls.push(DriverCall::UseProgram(program));
    }

    fn upload_uniforms(&mut self, program: ProgramHandle, slot: &UniformSlot, data: &[u8]) {
        self.calls.push(DriverCall::UploadUniforms {
            program,
            slot: slot.clone(),
            bytes: data.len(),
        });
    }

    fn set_cull_face(&mut self, face: Option<Face>) {
        self.calls.push(DriverCall::CullFace(face));
    }

    fn set_front_face(&mut self, face: FrontFace) {
        self.calls.push(DriverCall::FrontFace(face));
    }

    fn set_blend(&mut self, blend: Option<BlendState>) {
        self.calls.push(DriverCall::Blend(blend));
    }

    fn set_depth_test(&mut self, enabled: bool) {
        self.calls.push(DriverCall::DepthTest(enabled));
    }

    fn set_depth_write(&mut self, enabled: bool) {
        self.calls.push(DriverCall::DepthWrite(enabled));
    }

    fn set_depth_func(&mut self, func: CompareFunction) {
        self.calls.push(DriverCall::DepthFunc(func));
    }

    fn set_color_mask(&mut self, enabled: bool) {
        self.calls.push(DriverCall::ColorMask(enabled));
    }

    fn set_stencil_test(&mut self, enabled: bool) {
        self.calls.push(DriverCall::StencilTest(enabled));
    }

    fn set_stencil_write_mask(&mut self, mask: u32) {
        self.calls.push(DriverCall::StencilWriteMask(mask));
    }

    fn set_stencil_func(&mut self, func: CompareFunction, reference: u32, mask: u32) {
        self.calls.push(DriverCall::StencilFunc(func, reference, mask));
    }

    fn set_stencil_op(
        &mut self,
        fail: StencilOperation,
        depth_fail: StencilOperation,
        pass: StencilOperation,
    ) {
        self.calls.push(DriverCall::StencilOp(fail, depth_fail, pass));
    }

    fn set_polygon_offset(&mut self, offset: Option<(f32, f32)>) {
        self.calls.push(DriverCall::PolygonOffset(offset));
    }

    fn set_line_width(&mut self, width: f32) {
        self.calls.push(DriverCall::LineWidth(width));
    }

    fn set_viewport(&mut self, viewport: Viewport) {
        self.calls.push(DriverCall::Viewport(viewport));
    }

    fn set_scissor(&mut self, scissor: Option<Viewport>) {
        self.calls.push(DriverCall::Scissor(scissor));
    }

    fn set_clear_color(&mut self, color: Vec4) {
        self.calls.push(DriverCall::ClearColor(color));
    }

    fn set_clear_depth(&mut self, depth: f32) {
        self.calls.push(DriverCall::ClearDepth(depth));
    }

    fn set_clear_stencil(&mut self, value: u32) {
        self.calls.push(DriverCall::ClearStencil(value));
    }

    fn clear(&mut self, color: bool, depth: bool, stencil: bool) {
        self.calls.push(DriverCall::Clear {
            color,
            depth,
            stencil,
        });
    }

    fn active_texture(&mut self, unit: u32) {
        self.calls.push(DriverCall::ActiveTexture(unit));
    }

    fn bind_texture(&mut self, texture: Option<TextureHandle>) {
        self.calls.push(DriverCall::BindTexture(texture));
    }

    fn bind_buffer(&mut self, target: BufferTarget, buffer: Option<BufferHandle>) {
        self.calls.push(DriverCall::BindBuffer(target, buffer));
    }

    fn update_geometry_buffers(&mut self, id: GeometryId, geometry: &Geometry) -> GeometryBuffers {
        self.calls.push(DriverCall::UpdateGeometry(id));
        if let Some(existing) = self.geometry_buffers.get(&id).copied() {
            if existing.index.is_some() == geometry.index.is_some() {
                return existing;
            }
        }
        let vertex = BufferHandle(self.allocate());
        let index = geometry.index.map(|_| BufferHandle(self.allocate()));
        let buffers = GeometryBuffers { vertex, index };
        self.geometry_buffers.insert(id, buffers);
        buffers
    }

    fn delete_geometry_buffers(&mut self, buffers: GeometryBuffers) {
        self.geometry_buffers.retain(|_, b| *b != buffers);
        self.calls.push(DriverCall::DeleteGeometry(buffers));
    }

    fn create_index_buffer(&mut self, indices: &[u32]) -> BufferHandle {
        let buffer = BufferHandle(self.allocate());
        self.calls.push(DriverCall::CreateIndexBuffer {
            buffer,
            count: indices.len(),
        });
        buffer
    }

    fn delete_buffer(&mut self, buffer: BufferHandle) {
        self.calls.push(DriverCall::DeleteBuffer(buffer));
    }

    fn create_vertex_array(
        &mut self,
        _program: ProgramHandle,
        _buffers: GeometryBuffers,
        _attributes: &[VertexAttribute],
    ) -> VertexArrayHandle {
        let handle = VertexArrayHandle(self.allocate());
        self.calls.push(DriverCall::CreateVertexArray(handle));
        handle
    }

    fn bind_vertex_array(&mut self, vertex_array: Option<VertexArrayHandle>) {
        self.calls.push(DriverCall::BindVertexArray(vertex_array));
    }

    fn delete_vertex_array(&mut self, vertex_array: VertexArrayHandle) {
        self.calls.push(DriverCall::DeleteVertexArray(vertex_array));
    }

    fn draw_arrays(&mut self, topology: PrimitiveTopology, first: u32, count: u32) {
        self.calls.push(DriverCall::DrawArrays {
            topology,
            first,
            count,
        });
    }

    fn draw_elements(
        &mut self,
        topology: PrimitiveTopology,
        format: IndexFormat,
        first: u32,
        count: u32,
    ) {
        self.calls.push(DriverCall::DrawElements {
            topology,
            format,
            first,
            count,
        });
    }

    fn draw_arrays_instanced(
        &mut self,
        topology: PrimitiveTopology,
        first: u32,
        count: u32,
        instances: u32,
    ) {
        self.calls.push(DriverCall::DrawArraysInstanced {
            topology,
            first,
            count,
            instances,
        });
    }

    fn draw_elements_instanced(
        &mut self,
        topology: PrimitiveTopology,
        format: IndexFormat,
        first: u32,
        count: u32,
        instances: u32,
    ) {
        self.calls.push(DriverCall::DrawElementsInstanced {
            topology,
            format,
            first,
            count,
            instances,
        });
    }

    fn multi_draw_arrays(&mut self, topology: PrimitiveTopology, spans: &[DrawSpan]) {
        self.calls.push(DriverCall::MultiDrawArrays {
            topology,
            spans: spans.to_vec(),
        });
    }

    fn multi_draw_elements(
        &mut self,
        topology: PrimitiveTopology,
        format: IndexFormat,
        spans: &[DrawSpan],
    ) {
        self.calls.push(DriverCall::MultiDrawElements {
            topology,
            format,
            spans: spans.to_vec(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_latency_then_ready() {
        let mut driver = HeadlessDriver::new().with_compile_latency(2);
        let program = driver.create_program("p", "void main() {}", "void main() {}");

        assert_eq!(driver.program_status(program), ProgramStatus::Pending);
        assert_eq!(driver.program_status(program), ProgramStatus::Pending);
        assert_eq!(driver.program_status(program), ProgramStatus::Ready);
        assert_eq!(driver.compile_count(), 1);
    }

    #[test]
    fn test_failure_marker_reports_line() {
        let mut driver = HeadlessDriver::new().with_failure_marker("BROKEN");
        let program = driver.create_program("p", "void main() {}", "line one\nBROKEN\n");

        match driver.program_status(program) {
            ProgramStatus::Failed(log) => assert!(log.contains("0:2:")),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn test_delete_tracks_live_programs() {
        let mut driver = HeadlessDriver::new();
        let a = driver.create_program("a", "", "");
        let _b = driver.create_program("b", "", "");
        assert_eq!(driver.live_programs(), 2);

        driver.delete_program(a);
        assert_eq!(driver.live_programs(), 1);
        assert_eq!(driver.compile_count(), 2);
    }
}
