//! Geometry descriptors.
//!
//! Buffer contents are owned by the geometry collaborator; the renderer only
//! needs the attribute layout, index information, draw ranges and a content
//! version to decide whether a re-upload is required before drawing.

use crate::resources::version_tracker::ChangeTracker;

/// One vertex attribute stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VertexAttribute {
    pub name: String,
    /// Components per vertex (1–4).
    pub components: u8,
    pub normalized: bool,
    pub stride: u32,
    pub offset: u32,
    /// Number of elements in the stream.
    pub count: u32,
}

impl VertexAttribute {
    #[must_use]
    pub fn new(name: impl Into<String>, components: u8, count: u32) -> Self {
        Self {
            name: name.into(),
            components,
            normalized: false,
            stride: u32::from(components) * 4,
            offset: 0,
            count,
        }
    }
}

/// Index buffer description.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IndexBuffer {
    pub format: wgpu::IndexFormat,
    pub count: u32,
}

/// Element sub-range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DrawRange {
    pub start: u32,
    /// `None` draws until the end of the data.
    pub count: Option<u32>,
}

impl DrawRange {
    pub const ALL: DrawRange = DrawRange {
        start: 0,
        count: None,
    };

    #[must_use]
    pub const fn new(start: u32, count: u32) -> Self {
        Self {
            start,
            count: Some(count),
        }
    }
}

impl Default for DrawRange {
    fn default() -> Self {
        Self::ALL
    }
}

/// Named sub-range drawn with a specific material of a multi-material object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DrawGroup {
    pub start: u32,
    pub count: u32,
    pub material_index: usize,
}

/// Geometry as seen by the dispatcher.
#[derive(Debug, Clone, Default)]
pub struct Geometry {
    pub name: String,
    pub attributes: Vec<VertexAttribute>,
    pub index: Option<IndexBuffer>,
    /// CPU copy of the index data, needed to derive wireframe line indices.
    pub indices: Option<Vec<u32>>,
    pub draw_range: DrawRange,
    pub groups: Vec<DrawGroup>,
    /// Number of morph targets on `position`.
    pub morph_targets: u32,
    pub morph_normals: bool,
    /// Instance count for instanced buffer geometry.
    pub instance_count: Option<u32>,
    version: ChangeTracker,
    layout_version: ChangeTracker,
}

impl Geometry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            version: ChangeTracker::starting_at(1),
            ..Self::default()
        }
    }

    /// Non-indexed geometry with `position`, `normal` and `uv` streams.
    #[must_use]
    pub fn with_vertices(vertex_count: u32) -> Self {
        let mut geometry = Self::new();
        geometry.add_attribute(VertexAttribute::new("position", 3, vertex_count));
        geometry.add_attribute(VertexAttribute::new("normal", 3, vertex_count));
        geometry.add_attribute(VertexAttribute::new("uv", 2, vertex_count));
        geometry
    }

    #[must_use]
    pub fn with_index(mut self, format: wgpu::IndexFormat, count: u32) -> Self {
        self.index = Some(IndexBuffer { format, count });
        self.layout_version.changed();
        self
    }

    /// Indexed geometry keeping a CPU copy of `indices`. The driver-side
    /// format is the narrowest one that fits the largest index.
    #[must_use]
    pub fn with_indices(mut self, indices: Vec<u32>) -> Self {
        let format = if indices.iter().any(|&i| i > u32::from(u16::MAX)) {
            wgpu::IndexFormat::Uint32
        } else {
            wgpu::IndexFormat::Uint16
        };
        let count = u32::try_from(indices.len()).unwrap_or(u32::MAX);
        self.index = Some(IndexBuffer { format, count });
        self.indices = Some(indices);
        self.layout_version.changed();
        self.version.changed();
        self
    }

    pub fn add_attribute(&mut self, attribute: VertexAttribute) {
        self.attributes.retain(|a| a.name != attribute.name);
        self.attributes.push(attribute);
        self.layout_version.changed();
        self.version.changed();
    }

    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&VertexAttribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    #[must_use]
    pub fn has_attribute(&self, name: &str) -> bool {
        self.attribute(name).is_some()
    }

    /// Number of vertices in the `position` stream.
    #[must_use]
    pub fn vertex_count(&self) -> u32 {
        self.attribute("position").map_or(0, |a| a.count)
    }

    /// Element count used for range clamping: index count, else vertex count.
    #[must_use]
    pub fn element_count(&self) -> u32 {
        self.index.map_or_else(|| self.vertex_count(), |i| i.count)
    }

    /// Signals that buffer contents changed and need re-upload.
    pub fn mark_dirty(&mut self) {
        self.version.changed();
    }

    #[inline]
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version.version()
    }

    /// Version of the attribute/index layout (vertex-array rebuilds).
    #[inline]
    #[must_use]
    pub fn layout_version(&self) -> u64 {
        self.layout_version.version()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_element_count_prefers_index() {
        let geometry = Geometry::with_vertices(24);
        assert_eq!(geometry.element_count(), 24);

        let indexed = Geometry::with_vertices(24).with_index(wgpu::IndexFormat::Uint16, 36);
        assert_eq!(indexed.element_count(), 36);
    }

    #[test]
    fn test_with_indices_picks_narrow_format() {
        let small = Geometry::with_vertices(4).with_indices(vec![0, 1, 2, 2, 1, 3]);
        assert_eq!(small.index.map(|i| (i.format, i.count)), Some((wgpu::IndexFormat::Uint16, 6)));

        let large = Geometry::with_vertices(4).with_indices(vec![0, 70_000, 2]);
        assert_eq!(large.index.map(|i| i.format), Some(wgpu::IndexFormat::Uint32));
    }

    #[test]
    fn test_replacing_attribute_bumps_layout() {
        let mut geometry = Geometry::with_vertices(3);
        let layout = geometry.layout_version();
        geometry.add_attribute(VertexAttribute::new("color", 4, 3));
        assert!(geometry.layout_version() > layout);
        assert!(geometry.has_attribute("color"));
        assert_eq!(geometry.attributes.len(), 4);
    }
}
