//! Resource Store
//!
//! Arena storage for materials, geometries and objects. Each resource gets a
//! stable slotmap key at insertion time; the renderer's caches use these keys
//! for their side-tables (`SecondaryMap`s) instead of storing anything on the
//! resources themselves.
//!
//! Removing a resource from the store does **not** release its GPU-side cache
//! entries. Call [`Renderer::release_material`] / [`Renderer::release_geometry`]
//! with the returned id to drop program references and vertex bindings.
//!
//! [`Renderer::release_material`]: crate::renderer::Renderer::release_material
//! [`Renderer::release_geometry`]: crate::renderer::Renderer::release_geometry

use slotmap::{SlotMap, new_key_type};

use crate::resources::geometry::Geometry;
use crate::resources::material::Material;
use crate::resources::object::RenderObject;

new_key_type! {
    /// Stable material identity; also the secondary sort key of opaque lists.
    pub struct MaterialId;
    /// Stable geometry identity.
    pub struct GeometryId;
    /// Stable object identity.
    pub struct ObjectId;
}

#[derive(Debug, Default)]
pub struct ResourceStore {
    materials: SlotMap<MaterialId, Material>,
    geometries: SlotMap<GeometryId, Geometry>,
    objects: SlotMap<ObjectId, RenderObject>,
}

impl ResourceStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // --- Materials ---

    pub fn add_material(&mut self, material: Material) -> MaterialId {
        self.materials.insert(material)
    }

    #[must_use]
    pub fn material(&self, id: MaterialId) -> Option<&Material> {
        self.materials.get(id)
    }

    pub fn material_mut(&mut self, id: MaterialId) -> Option<&mut Material> {
        self.materials.get_mut(id)
    }

    pub fn remove_material(&mut self, id: MaterialId) -> Option<Material> {
        self.materials.remove(id)
    }

    // --- Geometries ---

    pub fn add_geometry(&mut self, geometry: Geometry) -> GeometryId {
        self.geometries.insert(geometry)
    }

    #[must_use]
    pub fn geometry(&self, id: GeometryId) -> Option<&Geometry> {
        self.geometries.get(id)
    }

    pub fn geometry_mut(&mut self, id: GeometryId) -> Option<&mut Geometry> {
        self.geometries.get_mut(id)
    }

    pub fn remove_geometry(&mut self, id: GeometryId) -> Option<Geometry> {
        self.geometries.remove(id)
    }

    // --- Objects ---

    pub fn add_object(&mut self, object: RenderObject) -> ObjectId {
        self.objects.insert(object)
    }

    #[must_use]
    pub fn object(&self, id: ObjectId) -> Option<&RenderObject> {
        self.objects.get(id)
    }

    pub fn object_mut(&mut self, id: ObjectId) -> Option<&mut RenderObject> {
        self.objects.get_mut(id)
    }

    pub fn remove_object(&mut self, id: ObjectId) -> Option<RenderObject> {
        self.objects.remove(id)
    }

    pub fn objects(&self) -> impl Iterator<Item = (ObjectId, &RenderObject)> {
        self.objects.iter()
    }
}
