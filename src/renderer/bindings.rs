//! Vertex-array bindings.
//!
//! Attribute binding sets are created per (geometry, program, wireframe)
//! triple and reused for as long as the geometry's attribute layout and
//! buffers stay the same. Entries are dropped when either the geometry or the
//! program is released.

use rustc_hash::FxHashMap;

use crate::renderer::driver::{GeometryBuffers, GpuDriver, ProgramHandle, VertexArrayHandle};
use crate::renderer::pipeline::ProgramId;
use crate::renderer::state::StateSynchronizer;
use crate::resources::{Geometry, GeometryId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct BindingKey {
    geometry: GeometryId,
    program: ProgramId,
    wireframe: bool,
}

#[derive(Debug, Clone, Copy)]
struct BindingState {
    vertex_array: VertexArrayHandle,
    layout_version: u64,
    buffers: GeometryBuffers,
}

#[derive(Debug, Default)]
pub struct VertexArrays {
    bindings: FxHashMap<BindingKey, BindingState>,
}

impl VertexArrays {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds the vertex array for this draw, creating or rebuilding it when
    /// the layout or buffers changed.
    pub fn setup<D: GpuDriver>(
        &mut self,
        state: &mut StateSynchronizer<D>,
        program: ProgramId,
        handle: ProgramHandle,
        geometry_id: GeometryId,
        geometry: &Geometry,
        buffers: GeometryBuffers,
        wireframe: bool,
    ) {
        let key = BindingKey {
            geometry: geometry_id,
            program,
            wireframe,
        };
        let layout_version = geometry.layout_version();

        if let Some(binding) = self.bindings.get(&key)
            && binding.layout_version == layout_version
            && binding.buffers == buffers
        {
            state.bind_vertex_array(Some(binding.vertex_array));
            return;
        }

        if let Some(stale) = self.bindings.remove(&key) {
            Self::delete(state, stale.vertex_array);
        }
        let vertex_array = state
            .driver_mut()
            .create_vertex_array(handle, buffers, &geometry.attributes);
        self.bindings.insert(
            key,
            BindingState {
                vertex_array,
                layout_version,
                buffers,
            },
        );
        state.bind_vertex_array(Some(vertex_array));
    }

    /// Drops every binding of a disposed geometry.
    pub fn release_geometry<D: GpuDriver>(&mut self, state: &mut StateSynchronizer<D>, geometry: GeometryId) {
        self.release_where(state, |key| key.geometry == geometry);
    }

    /// Drops every binding of a destroyed program.
    pub fn release_program<D: GpuDriver>(&mut self, state: &mut StateSynchronizer<D>, program: ProgramId) {
        self.release_where(state, |key| key.program == program);
    }

    /// Unbinds the current vertex array; with `force` all bindings are deleted.
    pub fn reset<D: GpuDriver>(&mut self, state: &mut StateSynchronizer<D>, force: bool) {
        state.bind_vertex_array(None);
        if force {
            for (_, binding) in self.bindings.drain() {
                state.driver_mut().delete_vertex_array(binding.vertex_array);
            }
        }
    }

    /// Forgets every binding without driver calls (context loss).
    pub fn clear(&mut self) {
        self.bindings.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    fn release_where<D: GpuDriver>(
        &mut self,
        state: &mut StateSynchronizer<D>,
        predicate: impl Fn(&BindingKey) -> bool,
    ) {
        let doomed: Vec<BindingKey> = self.bindings.keys().filter(|k| predicate(k)).copied().collect();
        for key in doomed {
            if let Some(binding) = self.bindings.remove(&key) {
                Self::delete(state, binding.vertex_array);
            }
        }
    }

    fn delete<D: GpuDriver>(state: &mut StateSynchronizer<D>, vertex_array: VertexArrayHandle) {
        if state.current_vertex_array() == Some(vertex_array) {
            state.bind_vertex_array(None);
        }
        state.driver_mut().delete_vertex_array(vertex_array);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::driver::{BufferHandle, DriverCall, HeadlessDriver};
    use crate::resources::{ResourceStore, VertexAttribute};
    use slotmap::SlotMap;

    fn program_ids() -> (ProgramId, ProgramId) {
        let mut ids: SlotMap<ProgramId, ()> = SlotMap::with_key();
        (ids.insert(()), ids.insert(()))
    }

    fn buffers() -> GeometryBuffers {
        GeometryBuffers {
            vertex: BufferHandle(1),
            index: None,
        }
    }

    fn created(state: &StateSynchronizer<HeadlessDriver>) -> usize {
        state
            .driver()
            .count(|call| matches!(call, DriverCall::CreateVertexArray(_)))
    }

    #[test]
    fn test_binding_reused_per_triple() {
        let mut store = ResourceStore::new();
        let geometry_id = store.add_geometry(Geometry::with_vertices(3));
        let geometry = store.geometry(geometry_id).unwrap();
        let (a, b) = program_ids();
        let mut state = StateSynchronizer::new(HeadlessDriver::new(), 8);
        let mut arrays = VertexArrays::new();

        arrays.setup(&mut state, a, ProgramHandle(1), geometry_id, geometry, buffers(), false);
        arrays.setup(&mut state, a, ProgramHandle(1), geometry_id, geometry, buffers(), false);
        assert_eq!(created(&state), 1);

        arrays.setup(&mut state, a, ProgramHandle(1), geometry_id, geometry, buffers(), true);
        arrays.setup(&mut state, b, ProgramHandle(2), geometry_id, geometry, buffers(), false);
        assert_eq!(created(&state), 3);
        assert_eq!(arrays.len(), 3);
    }

    #[test]
    fn test_layout_change_rebuilds() {
        let mut store = ResourceStore::new();
        let geometry_id = store.add_geometry(Geometry::with_vertices(3));
        let (a, _) = program_ids();
        let mut state = StateSynchronizer::new(HeadlessDriver::new(), 8);
        let mut arrays = VertexArrays::new();

        let geometry = store.geometry(geometry_id).unwrap().clone();
        arrays.setup(&mut state, a, ProgramHandle(1), geometry_id, &geometry, buffers(), false);

        store
            .geometry_mut(geometry_id)
            .unwrap()
            .add_attribute(VertexAttribute::new("color", 4, 3));
        let geometry = store.geometry(geometry_id).unwrap().clone();
        arrays.setup(&mut state, a, ProgramHandle(1), geometry_id, &geometry, buffers(), false);

        assert_eq!(created(&state), 2);
        assert_eq!(arrays.len(), 1);
        assert_eq!(
            state
                .driver()
                .count(|call| matches!(call, DriverCall::DeleteVertexArray(_))),
            1
        );
    }

    #[test]
    fn test_release_program_unbinds_current() {
        let mut store = ResourceStore::new();
        let geometry_id = store.add_geometry(Geometry::with_vertices(3));
        let geometry = store.geometry(geometry_id).unwrap();
        let (a, _) = program_ids();
        let mut state = StateSynchronizer::new(HeadlessDriver::new(), 8);
        let mut arrays = VertexArrays::new();

        arrays.setup(&mut state, a, ProgramHandle(1), geometry_id, geometry, buffers(), false);
        assert!(state.current_vertex_array().is_some());

        arrays.release_program(&mut state, a);
        assert!(state.current_vertex_array().is_none());
        assert!(arrays.is_empty());
    }
}
