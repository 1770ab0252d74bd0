//! Material Program Slots
//!
//! Per-material side-table of recently used program variants, most recent
//! first, bounded by `max_material_programs`. A material that alternates
//! between a few feature combinations (shadow pass vs. color pass, fog on/off)
//! finds its variant here without touching the global cache's usage counts.
//!
//! Each entry also remembers the [`StaleTriggers`] captured when its front
//! variant was resolved. Comparing those few scalars is the cheap path that
//! lets the dispatcher skip the full feature-vector recomputation.

use slotmap::SecondaryMap;
use smallvec::SmallVec;

use crate::renderer::pipeline::cache::ProgramCache;
use crate::renderer::pipeline::parameters::effective_env_map;
use crate::renderer::pipeline::program::{ProgramId, ProgramVariant};
use crate::renderer::render_state::{
    FogKind, LightCounts, PassKind, RenderState, ShadowMapKind, ToneMapping,
};
use crate::resources::{
    ColorEncoding, EnvMapKind, EnvMapMode, Geometry, Material, MaterialId, RenderObject,
};

/// Cheap subset of program-affecting inputs.
#[derive(Debug, Clone, PartialEq)]
pub struct StaleTriggers {
    material_version: u64,
    fog: Option<FogKind>,
    env_map: Option<(EnvMapKind, EnvMapMode, ColorEncoding)>,
    clipping: (u32, u32),
    output_encoding: ColorEncoding,
    tone_mapping: ToneMapping,
    shadow_sampler: Option<(ShadowMapKind, bool)>,
    /// Light counts, clustered and physically-correct flags; lit materials only.
    lighting: Option<(LightCounts, bool, bool)>,
    bones: Option<u32>,
    /// Instancing presence and per-instance color.
    instancing: Option<bool>,
    morph: (u32, bool),
    tangents: bool,
    vertex_alpha: bool,
    multi_draw: bool,
    pass: PassKind,
    draw_buffers: u32,
}

impl StaleTriggers {
    #[must_use]
    pub fn capture(
        material: &Material,
        object: &RenderObject,
        geometry: &Geometry,
        state: &RenderState,
    ) -> Self {
        let lit = material.uses_lights();
        let env_map = effective_env_map(material, state)
            .map(|env| (env.kind, env.mode, env.texture.encoding));
        let shadow_sampler = (lit && state.shadow_map.enabled)
            .then_some((state.shadow_map.kind, object.receive_shadow));

        Self {
            material_version: material.version(),
            fog: if material.fog {
                state.fog.map(|fog| fog.kind)
            } else {
                None
            },
            env_map,
            clipping: (state.clipping.count(), state.clipping.intersection),
            output_encoding: state.effective_output_encoding(),
            tone_mapping: state.effective_tone_mapping(),
            shadow_sampler,
            lighting: lit.then_some((
                state.lights.counts,
                state.lights.clustered,
                state.physically_correct_lights,
            )),
            bones: object.skeleton.map(|skeleton| skeleton.bone_count),
            instancing: object.instancing.map(|instancing| instancing.color),
            morph: (geometry.morph_targets, geometry.morph_normals),
            tangents: geometry.has_attribute("tangent"),
            vertex_alpha: geometry
                .attribute("color")
                .is_some_and(|color| color.components == 4),
            multi_draw: object.multi_draw.is_some(),
            pass: state.pass,
            draw_buffers: state.draw_buffers(),
        }
    }
}

#[derive(Debug, Clone)]
struct MaterialCacheEntry {
    /// Most recently used first.
    programs: SmallVec<[ProgramId; 4]>,
    triggers: Option<StaleTriggers>,
}

/// Outcome of [`MaterialProgramSlots::resolve`].
#[derive(Debug)]
pub struct Resolution {
    pub program: ProgramId,
    /// Variants whose last reference was dropped by the eviction. The caller
    /// unbinds and deletes their driver programs.
    pub destroyed: Vec<ProgramVariant>,
}

#[derive(Debug)]
pub struct MaterialProgramSlots {
    entries: SecondaryMap<MaterialId, MaterialCacheEntry>,
    max_programs: usize,
}

impl MaterialProgramSlots {
    #[must_use]
    pub fn new(max_programs: usize) -> Self {
        Self {
            entries: SecondaryMap::new(),
            max_programs: max_programs.max(1),
        }
    }

    /// Returns the material's current variant if its triggers still match.
    #[must_use]
    pub fn current_if_fresh(&self, material: MaterialId, triggers: &StaleTriggers) -> Option<ProgramId> {
        let entry = self.entries.get(material)?;
        if entry.triggers.as_ref() != Some(triggers) {
            return None;
        }
        entry.programs.first().copied()
    }

    /// Current (front) variant, regardless of staleness.
    #[must_use]
    pub fn current(&self, material: MaterialId) -> Option<ProgramId> {
        self.entries.get(material)?.programs.first().copied()
    }

    /// Finds or acquires the variant for `key` and makes it the front entry.
    ///
    /// `acquire` is called only when the material has no variant with that key;
    /// it must return a reference the slot table now owns.
    pub fn resolve(
        &mut self,
        material: MaterialId,
        key: &str,
        cache: &mut ProgramCache,
        acquire: impl FnOnce(&mut ProgramCache) -> ProgramId,
    ) -> Resolution {
        if !self.entries.contains_key(material) {
            self.entries.insert(
                material,
                MaterialCacheEntry {
                    programs: SmallVec::new(),
                    triggers: None,
                },
            );
        }
        let Some(entry) = self.entries.get_mut(material) else {
            return Resolution {
                program: acquire(cache),
                destroyed: Vec::new(),
            };
        };

        if let Some(position) = entry
            .programs
            .iter()
            .position(|&id| cache.key(id) == Some(key))
        {
            let program = entry.programs.remove(position);
            entry.programs.insert(0, program);
            return Resolution {
                program,
                destroyed: Vec::new(),
            };
        }

        let program = acquire(cache);
        entry.programs.insert(0, program);

        let mut destroyed = Vec::new();
        while entry.programs.len() > self.max_programs {
            let Some(evicted) = entry.programs.pop() else {
                break;
            };
            log::debug!("Evicting program variant {evicted:?} from material {material:?}");
            destroyed.extend(cache.release(evicted));
        }

        Resolution { program, destroyed }
    }

    /// Records the triggers the front variant was resolved with.
    pub fn store_triggers(&mut self, material: MaterialId, triggers: StaleTriggers) {
        if let Some(entry) = self.entries.get_mut(material) {
            entry.triggers = Some(triggers);
        }
    }

    /// Forgets a disposed material, releasing all of its references.
    pub fn release_material(&mut self, material: MaterialId, cache: &mut ProgramCache) -> Vec<ProgramVariant> {
        let Some(entry) = self.entries.remove(material) else {
            return Vec::new();
        };
        entry
            .programs
            .into_iter()
            .filter_map(|id| cache.release(id))
            .collect()
    }

    /// Variants currently remembered for `material`, most recent first.
    pub fn programs(&self, material: MaterialId) -> impl Iterator<Item = ProgramId> + '_ {
        self.entries
            .get(material)
            .into_iter()
            .flat_map(|entry| entry.programs.iter().copied())
    }

    #[must_use]
    pub fn max_programs(&self) -> usize {
        self.max_programs
    }

    /// Drops every entry without touching the cache (context loss).
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
