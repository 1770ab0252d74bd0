//! GPU Driver Interface
//!
//! The narrow, GL-shaped command surface the renderer drives. The driver is
//! single-threaded and synchronous from the renderer's point of view, except
//! that program compilation may complete asynchronously: [`create_program`]
//! returns immediately and [`program_status`] is polled before every use.
//!
//! Implementations must not cache state themselves; redundant-call filtering
//! is the job of [`StateSynchronizer`](super::state::StateSynchronizer), which
//! is the only caller of the state-mutating methods.
//!
//! [`create_program`]: GpuDriver::create_program
//! [`program_status`]: GpuDriver::program_status

pub mod headless;

pub use headless::{DriverCall, HeadlessDriver};

use glam::Vec4;
use wgpu::{BlendState, CompareFunction, Face, FrontFace, IndexFormat, PrimitiveTopology, StencilOperation};

use crate::renderer::uniforms::UniformSlot;
use crate::resources::{Geometry, GeometryId, TextureHandle, VertexAttribute};

/// Driver-side program name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProgramHandle(pub u64);

/// Driver-side buffer name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferHandle(pub u64);

/// Driver-side vertex array (attribute binding set) name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VertexArrayHandle(pub u64);

/// Result of polling a program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgramStatus {
    /// Compilation still running (parallel compile).
    Pending,
    /// Linked and usable.
    Ready,
    /// Compile or link failed; carries the driver info log.
    Failed(String),
}

/// Buffer binding points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferTarget {
    Array,
    ElementArray,
    Uniform,
}

impl BufferTarget {
    pub const COUNT: usize = 3;

    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Array => 0,
            Self::ElementArray => 1,
            Self::Uniform => 2,
        }
    }
}

/// Pixel rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Viewport {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    #[must_use]
    pub const fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

/// Buffers produced by the geometry collaborator for one geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GeometryBuffers {
    pub vertex: BufferHandle,
    pub index: Option<BufferHandle>,
}

/// `(first, count)` element span of a multi-draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DrawSpan {
    pub first: u32,
    pub count: u32,
}

/// Command surface of a GPU context.
pub trait GpuDriver {
    // --- Programs ---

    /// Starts compiling and linking a program; never blocks on completion.
    fn create_program(&mut self, label: &str, vertex: &str, fragment: &str) -> ProgramHandle;
    fn program_status(&mut self, program: ProgramHandle) -> ProgramStatus;
    fn delete_program(&mut self, program: ProgramHandle);
    fn use_program(&mut self, program: Option<ProgramHandle>);
    fn upload_uniforms(&mut self, program: ProgramHandle, slot: &UniformSlot, data: &[u8]);

    // --- Fixed-function state ---

    fn set_cull_face(&mut self, face: Option<Face>);
    fn set_front_face(&mut self, face: FrontFace);
    fn set_blend(&mut self, blend: Option<BlendState>);
    fn set_depth_test(&mut self, enabled: bool);
    fn set_depth_write(&mut self, enabled: bool);
    fn set_depth_func(&mut self, func: CompareFunction);
    fn set_color_mask(&mut self, enabled: bool);
    fn set_stencil_test(&mut self, enabled: bool);
    fn set_stencil_write_mask(&mut self, mask: u32);
    fn set_stencil_func(&mut self, func: CompareFunction, reference: u32, mask: u32);
    fn set_stencil_op(
        &mut self,
        fail: StencilOperation,
        depth_fail: StencilOperation,
        pass: StencilOperation,
    );
    /// `None` disables polygon offset; `Some((factor, units))` enables it.
    fn set_polygon_offset(&mut self, offset: Option<(f32, f32)>);
    fn set_line_width(&mut self, width: f32);
    fn set_viewport(&mut self, viewport: Viewport);
    /// `None` disables the scissor test.
    fn set_scissor(&mut self, scissor: Option<Viewport>);
    fn set_clear_color(&mut self, color: Vec4);
    fn set_clear_depth(&mut self, depth: f32);
    fn set_clear_stencil(&mut self, value: u32);
    fn clear(&mut self, color: bool, depth: bool, stencil: bool);

    // --- Bindings ---

    fn active_texture(&mut self, unit: u32);
    /// Binds to the currently active unit; `None` binds the empty texture.
    fn bind_texture(&mut self, texture: Option<TextureHandle>);
    fn bind_buffer(&mut self, target: BufferTarget, buffer: Option<BufferHandle>);

    /// Uploads (or re-uploads) geometry buffers. Owned by the geometry
    /// collaborator; the renderer only decides *when* it is needed.
    fn update_geometry_buffers(&mut self, id: GeometryId, geometry: &Geometry) -> GeometryBuffers;
    fn delete_geometry_buffers(&mut self, buffers: GeometryBuffers);
    /// Uploads renderer-derived `u32` indices (wireframe lines).
    fn create_index_buffer(&mut self, indices: &[u32]) -> BufferHandle;
    fn delete_buffer(&mut self, buffer: BufferHandle);

    fn create_vertex_array(
        &mut self,
        program: ProgramHandle,
        buffers: GeometryBuffers,
        attributes: &[VertexAttribute],
    ) -> VertexArrayHandle;
    fn bind_vertex_array(&mut self, vertex_array: Option<VertexArrayHandle>);
    fn delete_vertex_array(&mut self, vertex_array: VertexArrayHandle);

    // --- Draws ---

    fn draw_arrays(&mut self, topology: PrimitiveTopology, first: u32, count: u32);
    fn draw_elements(
        &mut self,
        topology: PrimitiveTopology,
        format: IndexFormat,
        first: u32,
        count: u32,
    );
    fn draw_arrays_instanced(
        &mut self,
        topology: PrimitiveTopology,
        first: u32,
        count: u32,
        instances: u32,
    );
    fn draw_elements_instanced(
        &mut self,
        topology: PrimitiveTopology,
        format: IndexFormat,
        first: u32,
        count: u32,
        instances: u32,
    );
    fn multi_draw_arrays(&mut self, topology: PrimitiveTopology, spans: &[DrawSpan]);
    fn multi_draw_elements(
        &mut self,
        topology: PrimitiveTopology,
        format: IndexFormat,
        spans: &[DrawSpan],
    );
}
