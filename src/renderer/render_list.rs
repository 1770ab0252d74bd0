//! Render Lists
//!
//! Per-frame buckets of renderable items. Every layer holds an opaque and a
//! transparent list; layers are kept in ascending id order and render in that
//! order, opaque before transparent.
//!
//! Item records live in a pool that survives across frames: [`RenderLists::begin`]
//! resets the fill counts, [`RenderLists::push`] overwrites pooled records, and
//! [`RenderLists::finish`] trims stale records and sorts.
//!
//! # Sort order
//!
//! | list        | keys (in order)                                             |
//! |-------------|-------------------------------------------------------------|
//! | opaque      | render order ↑, material ↑, depth ↑ (front-to-back), id ↑   |
//! | transparent | render order ↑, depth ↓ (back-to-front), material ↑, id ↑   |

use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::resources::{DrawGroup, GeometryId, MaterialId, ObjectId};

/// Frame-scoped draw record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderItem {
    /// Stable identity; final sort tie-break.
    pub id: ObjectId,
    pub geometry: GeometryId,
    pub material: MaterialId,
    /// View-space depth, positive in front of the camera.
    pub z: f32,
    pub render_order: i32,
    /// Sub-range drawn with `material` for multi-material geometry.
    pub group: Option<DrawGroup>,
}

#[must_use]
pub fn opaque_order(a: &RenderItem, b: &RenderItem) -> Ordering {
    a.render_order
        .cmp(&b.render_order)
        .then_with(|| a.material.cmp(&b.material))
        .then_with(|| a.z.total_cmp(&b.z))
        .then_with(|| a.id.cmp(&b.id))
}

#[must_use]
pub fn transparent_order(a: &RenderItem, b: &RenderItem) -> Ordering {
    a.render_order
        .cmp(&b.render_order)
        .then_with(|| b.z.total_cmp(&a.z))
        .then_with(|| a.material.cmp(&b.material))
        .then_with(|| a.id.cmp(&b.id))
}

/// Opaque and transparent items of one layer.
#[derive(Debug, Default)]
pub struct RenderList {
    pool: Vec<RenderItem>,
    filled: usize,
    opaque: Vec<usize>,
    transparent: Vec<usize>,
}

impl RenderList {
    pub fn begin(&mut self) {
        self.filled = 0;
        self.opaque.clear();
        self.transparent.clear();
    }

    pub fn push(&mut self, item: RenderItem, transparent: bool) {
        let index = self.filled;
        if index < self.pool.len() {
            self.pool[index] = item;
        } else {
            self.pool.push(item);
        }
        self.filled += 1;

        if transparent {
            self.transparent.push(index);
        } else {
            self.opaque.push(index);
        }
    }

    /// Drops records beyond the fill count; capacity is kept.
    pub fn finish(&mut self, sort: bool) {
        self.pool.truncate(self.filled);
        if sort {
            self.sort();
        }
    }

    pub fn sort(&mut self) {
        let pool = &self.pool;
        self.opaque
            .sort_by(|&a, &b| opaque_order(&pool[a], &pool[b]));
        self.transparent
            .sort_by(|&a, &b| transparent_order(&pool[a], &pool[b]));
    }

    pub fn opaque(&self) -> impl Iterator<Item = &RenderItem> {
        self.opaque.iter().map(|&i| &self.pool[i])
    }

    pub fn transparent(&self) -> impl Iterator<Item = &RenderItem> {
        self.transparent.iter().map(|&i| &self.pool[i])
    }

    /// Opaque items followed by transparent items.
    pub fn iter(&self) -> impl Iterator<Item = &RenderItem> {
        self.opaque().chain(self.transparent())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.filled
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.filled == 0
    }

    /// Allocated pool records.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.pool.capacity()
    }
}

/// All layers of a frame.
#[derive(Debug, Default)]
pub struct RenderLists {
    layers: BTreeMap<i32, RenderList>,
}

impl RenderLists {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resets every layer without freeing its storage.
    pub fn begin(&mut self) {
        for list in self.layers.values_mut() {
            list.begin();
        }
    }

    pub fn push(&mut self, layer: i32, item: RenderItem, transparent: bool) {
        self.layers.entry(layer).or_default().push(item, transparent);
    }

    /// Trims (and optionally sorts) every layer.
    pub fn finish(&mut self, sort: bool) {
        for list in self.layers.values_mut() {
            list.finish(sort);
        }
    }

    #[must_use]
    pub fn layer(&self, layer: i32) -> Option<&RenderList> {
        self.layers.get(&layer)
    }

    /// Layers in ascending id order.
    pub fn layers(&self) -> impl Iterator<Item = (i32, &RenderList)> {
        self.layers.iter().map(|(&id, list)| (id, list))
    }

    /// Every item in render order: layers ascending, opaque before transparent.
    pub fn iter(&self) -> impl Iterator<Item = &RenderItem> {
        self.layers.values().flat_map(RenderList::iter)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.layers.values().map(RenderList::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops all layers and their storage.
    pub fn dispose(&mut self) {
        self.layers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;

    struct Ids {
        objects: Vec<ObjectId>,
        geometry: GeometryId,
        material: MaterialId,
    }

    fn ids(count: usize) -> Ids {
        let mut objects: SlotMap<ObjectId, ()> = SlotMap::with_key();
        let mut geometries: SlotMap<GeometryId, ()> = SlotMap::with_key();
        let mut materials: SlotMap<MaterialId, ()> = SlotMap::with_key();
        Ids {
            objects: (0..count).map(|_| objects.insert(())).collect(),
            geometry: geometries.insert(()),
            material: materials.insert(()),
        }
    }

    fn item(ids: &Ids, index: usize, z: f32) -> RenderItem {
        RenderItem {
            id: ids.objects[index],
            geometry: ids.geometry,
            material: ids.material,
            z,
            render_order: 0,
            group: None,
        }
    }

    #[test]
    fn test_opaque_front_to_back_with_id_tiebreak() {
        let ids = ids(3);
        let mut list = RenderList::default();
        list.begin();
        list.push(item(&ids, 0, 5.0), false);
        list.push(item(&ids, 1, 2.0), false);
        list.push(item(&ids, 2, 5.0), false);
        list.finish(true);

        let order: Vec<_> = list.opaque().map(|i| i.id).collect();
        assert_eq!(order, vec![ids.objects[1], ids.objects[0], ids.objects[2]]);
    }

    #[test]
    fn test_transparent_back_to_front_with_id_tiebreak() {
        let ids = ids(3);
        let mut list = RenderList::default();
        list.begin();
        list.push(item(&ids, 0, 5.0), true);
        list.push(item(&ids, 1, 2.0), true);
        list.push(item(&ids, 2, 5.0), true);
        list.finish(true);

        let order: Vec<_> = list.transparent().map(|i| i.id).collect();
        assert_eq!(order, vec![ids.objects[0], ids.objects[2], ids.objects[1]]);
    }

    #[test]
    fn test_render_order_dominates_depth() {
        let ids = ids(2);
        let mut list = RenderList::default();
        let mut late = item(&ids, 0, 1.0);
        late.render_order = 1;
        list.push(late, false);
        list.push(item(&ids, 1, 9.0), false);
        list.finish(true);

        let order: Vec<_> = list.opaque().map(|i| i.id).collect();
        assert_eq!(order, vec![ids.objects[1], ids.objects[0]]);
    }

    #[test]
    fn test_begin_reuses_pool() {
        let ids = ids(4);
        let mut lists = RenderLists::new();
        lists.begin();
        for i in 0..4 {
            lists.push(0, item(&ids, i, i as f32), false);
        }
        lists.finish(true);
        let capacity = lists.layer(0).map(RenderList::capacity);

        lists.begin();
        lists.push(0, item(&ids, 0, 0.0), false);
        lists.finish(true);

        assert_eq!(lists.len(), 1);
        assert_eq!(lists.layer(0).map(RenderList::capacity), capacity);
    }

    #[test]
    fn test_layers_ascending_opaque_first() {
        let ids = ids(3);
        let mut lists = RenderLists::new();
        lists.push(2, item(&ids, 0, 1.0), false);
        lists.push(-1, item(&ids, 1, 1.0), true);
        lists.push(-1, item(&ids, 2, 1.0), false);
        lists.finish(true);

        let order: Vec<_> = lists.iter().map(|i| i.id).collect();
        assert_eq!(order, vec![ids.objects[2], ids.objects[1], ids.objects[0]]);
        let layer_ids: Vec<_> = lists.layers().map(|(id, _)| id).collect();
        assert_eq!(layer_ids, vec![-1, 2]);
    }
}
