//! Geometry buffer tracking.
//!
//! Side-table recording, per geometry, the driver buffers and the content
//! version they were uploaded from. [`GeometryTracker::ensure`] re-uploads only
//! when the geometry's version moved, and does so at most once per pass even
//! when the same geometry is drawn by many items.
//!
//! Wireframe draws use a derived `u32` line index buffer (three edges, six
//! indices per triangle) built from the geometry's CPU index copy, or from the
//! vertex order of non-indexed geometry. It is rebuilt when the content
//! version moves.

use slotmap::SecondaryMap;

use crate::renderer::driver::{BufferHandle, GeometryBuffers, GpuDriver};
use crate::resources::{Geometry, GeometryId};

/// Derived line index buffer of a geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WireframeIndex {
    pub buffer: BufferHandle,
    pub count: u32,
    version: u64,
}

#[derive(Debug, Clone, Copy)]
struct TrackedGeometry {
    buffers: GeometryBuffers,
    version: u64,
    last_pass: u64,
    wireframe: Option<WireframeIndex>,
}

/// Whether line indices can be derived: non-indexed geometry always, indexed
/// geometry only with a CPU copy of its indices.
#[must_use]
pub fn has_wireframe_source(geometry: &Geometry) -> bool {
    geometry.index.is_none() || geometry.indices.is_some()
}

/// Line-list indices covering every triangle edge.
#[must_use]
pub fn wireframe_indices(geometry: &Geometry) -> Option<Vec<u32>> {
    let mut lines = Vec::new();
    match (geometry.index, geometry.indices.as_deref()) {
        (None, _) => {
            let vertices = geometry.vertex_count();
            for a in (0..vertices.saturating_sub(2)).step_by(3) {
                push_triangle(&mut lines, a, a + 1, a + 2);
            }
        }
        (Some(index), Some(data)) => {
            let used = &data[..data.len().min(index.count as usize)];
            for triangle in used.chunks_exact(3) {
                push_triangle(&mut lines, triangle[0], triangle[1], triangle[2]);
            }
        }
        (Some(_), None) => return None,
    }
    Some(lines)
}

fn push_triangle(lines: &mut Vec<u32>, a: u32, b: u32, c: u32) {
    lines.extend_from_slice(&[a, b, b, c, c, a]);
}

#[derive(Debug, Default)]
pub struct GeometryTracker {
    geometries: SecondaryMap<GeometryId, TrackedGeometry>,
}

impl GeometryTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns up-to-date buffers for `geometry`, uploading when needed.
    pub fn ensure<D: GpuDriver>(
        &mut self,
        driver: &mut D,
        id: GeometryId,
        geometry: &Geometry,
        pass: u64,
    ) -> GeometryBuffers {
        if let Some(tracked) = self.geometries.get_mut(id) {
            if tracked.last_pass == pass || tracked.version == geometry.version() {
                tracked.last_pass = pass;
                return tracked.buffers;
            }
            log::debug!(
                "Geometry '{}' changed ({} -> {}), re-uploading",
                geometry.name,
                tracked.version,
                geometry.version()
            );
            tracked.buffers = driver.update_geometry_buffers(id, geometry);
            tracked.version = geometry.version();
            tracked.last_pass = pass;
            return tracked.buffers;
        }

        let buffers = driver.update_geometry_buffers(id, geometry);
        self.geometries.insert(
            id,
            TrackedGeometry {
                buffers,
                version: geometry.version(),
                last_pass: pass,
                wireframe: None,
            },
        );
        buffers
    }

    /// Returns the line index buffer of an already ensured geometry,
    /// (re)building it when the content version moved.
    pub fn ensure_wireframe<D: GpuDriver>(
        &mut self,
        driver: &mut D,
        id: GeometryId,
        geometry: &Geometry,
    ) -> Option<WireframeIndex> {
        let tracked = self.geometries.get_mut(id)?;
        if let Some(wireframe) = tracked.wireframe
            && wireframe.version == geometry.version()
        {
            return Some(wireframe);
        }

        let indices = wireframe_indices(geometry)?;
        if let Some(stale) = tracked.wireframe.take() {
            driver.delete_buffer(stale.buffer);
        }
        let wireframe = WireframeIndex {
            buffer: driver.create_index_buffer(&indices),
            count: u32::try_from(indices.len()).unwrap_or(u32::MAX),
            version: geometry.version(),
        };
        tracked.wireframe = Some(wireframe);
        Some(wireframe)
    }

    /// Deletes the buffers of a disposed geometry.
    pub fn release<D: GpuDriver>(&mut self, driver: &mut D, id: GeometryId) -> bool {
        match self.geometries.remove(id) {
            Some(tracked) => {
                if let Some(wireframe) = tracked.wireframe {
                    driver.delete_buffer(wireframe.buffer);
                }
                driver.delete_geometry_buffers(tracked.buffers);
                true
            }
            None => false,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.geometries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.geometries.is_empty()
    }

    /// Forgets every geometry without driver calls (context loss).
    pub fn clear(&mut self) {
        self.geometries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::driver::{DriverCall, HeadlessDriver};
    use crate::resources::ResourceStore;

    fn uploads(driver: &HeadlessDriver) -> usize {
        driver.count(|call| matches!(call, DriverCall::UpdateGeometry(_)))
    }

    #[test]
    fn test_upload_once_until_version_changes() {
        let mut store = ResourceStore::new();
        let id = store.add_geometry(Geometry::with_vertices(3));
        let mut driver = HeadlessDriver::new();
        let mut tracker = GeometryTracker::new();

        let geometry = store.geometry(id).unwrap().clone();
        tracker.ensure(&mut driver, id, &geometry, 1);
        tracker.ensure(&mut driver, id, &geometry, 1);
        tracker.ensure(&mut driver, id, &geometry, 2);
        assert_eq!(uploads(&driver), 1);

        store.geometry_mut(id).unwrap().mark_dirty();
        let geometry = store.geometry(id).unwrap().clone();
        tracker.ensure(&mut driver, id, &geometry, 3);
        assert_eq!(uploads(&driver), 2);
    }

    #[test]
    fn test_at_most_once_per_pass() {
        let mut store = ResourceStore::new();
        let id = store.add_geometry(Geometry::with_vertices(3));
        let mut driver = HeadlessDriver::new();
        let mut tracker = GeometryTracker::new();

        let geometry = store.geometry(id).unwrap().clone();
        tracker.ensure(&mut driver, id, &geometry, 1);

        store.geometry_mut(id).unwrap().mark_dirty();
        let geometry = store.geometry(id).unwrap().clone();
        tracker.ensure(&mut driver, id, &geometry, 1);
        assert_eq!(uploads(&driver), 1);

        tracker.ensure(&mut driver, id, &geometry, 2);
        assert_eq!(uploads(&driver), 2);
    }

    #[test]
    fn test_wireframe_indices_cover_triangle_edges() {
        let soup = Geometry::with_vertices(6);
        assert_eq!(
            wireframe_indices(&soup),
            Some(vec![0, 1, 1, 2, 2, 0, 3, 4, 4, 5, 5, 3])
        );

        let quad = Geometry::with_vertices(4).with_indices(vec![0, 1, 2, 2, 1, 3]);
        assert_eq!(wireframe_indices(&quad).map(|lines| lines.len()), Some(12));

        let opaque = Geometry::with_vertices(4).with_index(wgpu::IndexFormat::Uint16, 6);
        assert!(!has_wireframe_source(&opaque));
        assert_eq!(wireframe_indices(&opaque), None);
    }

    #[test]
    fn test_wireframe_rebuilt_on_version_change() {
        let mut store = ResourceStore::new();
        let id = store.add_geometry(Geometry::with_vertices(3));
        let mut driver = HeadlessDriver::new();
        let mut tracker = GeometryTracker::new();
        let created = |driver: &HeadlessDriver| {
            driver.count(|call| matches!(call, DriverCall::CreateIndexBuffer { count: 6, .. }))
        };

        let geometry = store.geometry(id).unwrap().clone();
        assert!(tracker.ensure_wireframe(&mut driver, id, &geometry).is_none());
        tracker.ensure(&mut driver, id, &geometry, 1);
        let first = tracker.ensure_wireframe(&mut driver, id, &geometry).unwrap();
        assert_eq!(first.count, 6);
        assert_eq!(tracker.ensure_wireframe(&mut driver, id, &geometry), Some(first));
        assert_eq!(created(&driver), 1);

        store.geometry_mut(id).unwrap().mark_dirty();
        let geometry = store.geometry(id).unwrap().clone();
        tracker.ensure(&mut driver, id, &geometry, 2);
        tracker.ensure_wireframe(&mut driver, id, &geometry).unwrap();
        assert_eq!(created(&driver), 2);
        assert_eq!(driver.count(|call| *call == DriverCall::DeleteBuffer(first.buffer)), 1);

        tracker.release(&mut driver, id);
        assert_eq!(driver.count(|call| matches!(call, DriverCall::DeleteBuffer(_))), 2);
    }

    #[test]
    fn test_release_deletes_buffers() {
        let mut store = ResourceStore::new();
        let id = store.add_geometry(Geometry::with_vertices(3));
        let mut driver = HeadlessDriver::new();
        let mut tracker = GeometryTracker::new();

        let geometry = store.geometry(id).unwrap().clone();
        tracker.ensure(&mut driver, id, &geometry, 1);
        assert!(tracker.release(&mut driver, id));
        assert!(!tracker.release(&mut driver, id));
        assert_eq!(driver.count(|call| matches!(call, DriverCall::DeleteGeometry(_))), 1);
        assert!(tracker.is_empty());
    }
}
