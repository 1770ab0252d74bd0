//! Renderable objects.
//!
//! The scene graph computes world transforms; the renderer receives the final
//! model matrix plus the handful of per-object flags that select program
//! features or draw paths.

use glam::Mat4;

use crate::resources::geometry::DrawRange;
use crate::resources::store::{GeometryId, MaterialId};

/// Primitive interpretation of an object's geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ObjectKind {
    #[default]
    Mesh,
    Line,
    LineSegments,
    Points,
}

/// Skinning information consumed from the skeleton system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Skeleton {
    pub bone_count: u32,
}

/// Per-object instancing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Instancing {
    pub count: u32,
    /// Per-instance color attribute present.
    pub color: bool,
}

#[derive(Debug, Clone)]
pub struct RenderObject {
    pub name: String,
    pub kind: ObjectKind,
    pub geometry: Option<GeometryId>,
    /// One material, or one per geometry group (`DrawGroup::material_index`).
    pub materials: Vec<MaterialId>,
    pub model_matrix: Mat4,
    pub visible: bool,
    pub render_order: i32,
    /// Render queue layer the object is pushed into.
    pub layer: i32,
    pub receive_shadow: bool,
    pub cast_shadow: bool,
    pub skeleton: Option<Skeleton>,
    pub instancing: Option<Instancing>,
    /// Ranges drawn with a single multi-draw call.
    pub multi_draw: Option<Vec<DrawRange>>,
}

impl RenderObject {
    #[must_use]
    pub fn new(kind: ObjectKind) -> Self {
        Self {
            name: String::new(),
            kind,
            geometry: None,
            materials: Vec::new(),
            model_matrix: Mat4::IDENTITY,
            visible: true,
            render_order: 0,
            layer: 0,
            receive_shadow: false,
            cast_shadow: false,
            skeleton: None,
            instancing: None,
            multi_draw: None,
        }
    }

    #[must_use]
    pub fn mesh() -> Self {
        Self::new(ObjectKind::Mesh)
    }

    /// Mesh drawing `geometry` with a single material.
    #[must_use]
    pub fn with_mesh(mut self, geometry: GeometryId, material: MaterialId) -> Self {
        self.geometry = Some(geometry);
        self.materials = vec![material];
        self
    }

    #[must_use]
    pub fn with_matrix(mut self, model_matrix: Mat4) -> Self {
        self.model_matrix = model_matrix;
        self
    }

    /// Negative determinant mirrors the winding order.
    #[must_use]
    pub fn is_mirrored(&self) -> bool {
        self.model_matrix.determinant() < 0.0
    }
}

impl Default for RenderObject {
    fn default() -> Self {
        Self::mesh()
    }
}
