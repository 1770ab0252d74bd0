//! Renderer Module
//!
//! The [`Renderer`] ties the program-variant pipeline to a [`GpuDriver`]:
//!
//! - [`pipeline`]: feature vectors, shader assembly, program cache, material slots
//! - [`state`]: shadowed GPU state ([`StateSynchronizer`])
//! - [`render_list`]: per-frame opaque / transparent buckets
//! - [`render_state`]: camera, lights, fog and pass inputs
//! - [`uniforms`], [`textures`], [`bindings`], [`geometries`]: per-draw resources
//! - [`driver`]: the driver trait and the recording [`HeadlessDriver`]
//!
//! # Frame flow
//!
//! ```text
//! begin_render ─► project_scene (RenderLists) ─► render_list ─► end_render
//!                                                  │
//!                                                  └─ render_item (per item):
//!                filter ─► override ─► stale check ─► resolve ─► poll
//!                ─► program ─► geometry ─► vertex array ─► uniforms
//!                ─► textures ─► material state ─► viewport ─► draw
//! ```
//!
//! Per-item rendering never fails because of shader problems: an item whose
//! program is still compiling or invalid is skipped for the frame without
//! touching GPU state.

pub mod bindings;
pub mod capabilities;
pub mod driver;
pub mod geometries;
pub mod info;
pub mod pipeline;
pub mod render_list;
pub mod render_state;
pub mod settings;
pub mod state;
pub mod textures;
pub mod uniforms;

pub use capabilities::Capabilities;
pub use driver::{GpuDriver, HeadlessDriver};
pub use info::RenderInfo;
pub use render_list::{RenderItem, RenderList, RenderLists};
pub use render_state::RenderState;
pub use settings::{Precision, RendererSettings, ShaderDialect};
pub use state::{GpuStateShadow, StateLocks, StateSynchronizer};

use glam::Vec4;
use smallvec::SmallVec;
use wgpu::{IndexFormat, PrimitiveTopology};

use crate::errors::{Result, VariantError};
use crate::renderer::bindings::VertexArrays;
use crate::renderer::driver::{DrawSpan, ProgramHandle};
use crate::renderer::geometries::{GeometryTracker, WireframeIndex};
use crate::renderer::pipeline::parameters::effective_env_map;
use crate::renderer::pipeline::{
    ChunkLibrary, CompileOptions, MaterialProgramSlots, ParameterHasher, ProgramCache,
    ProgramCacheStats, ProgramId, ProgramState, ProgramVariant, ShaderAssembler, StaleTriggers,
    TemplateSource,
};
use crate::renderer::textures::TextureUnits;
use crate::renderer::uniforms::{
    CameraUniforms, EnvironmentUniforms, ModelUniforms, SceneUniforms, UniformSlot,
    UniformUploads, UploadStamp,
};
use crate::resources::{
    EnvMapKind, Geometry, GeometryId, Material, MaterialId, ObjectKind, RenderObject,
    ResourceStore, ShaderKind,
};
use crate::utils::WarnOnce;

/// Predicate deciding whether an item is drawn.
pub type ItemFilter = Box<dyn Fn(&RenderItem) -> bool>;

/// Program-variant cache and draw dispatcher over a GPU driver.
pub struct Renderer<D: GpuDriver> {
    state: StateSynchronizer<D>,
    settings: RendererSettings,
    capabilities: Capabilities,

    hasher: ParameterHasher,
    assembler: ShaderAssembler,
    programs: ProgramCache,
    slots: MaterialProgramSlots,

    uniforms: UniformUploads,
    geometries: GeometryTracker,
    vertex_arrays: VertexArrays,
    texture_units: TextureUnits,

    info: RenderInfo,
    warnings: WarnOnce,
    pass: u64,
    filter: Option<ItemFilter>,
}

impl<D: GpuDriver> Renderer<D> {
    /// Creates a renderer over `driver`.
    ///
    /// Fails when the settings are invalid. A requested precision above the
    /// device maximum is clamped with a warning.
    pub fn new(driver: D, capabilities: Capabilities, settings: RendererSettings) -> Result<Self> {
        settings.validate()?;

        let precision = capabilities.clamp_precision(settings.precision);
        if precision != settings.precision {
            log::warn!(
                "{:?} precision not supported, using {:?} instead",
                settings.precision,
                precision
            );
        }

        log::info!(
            "Renderer created: dialect {:?}, precision {:?}, {} texture units",
            settings.dialect,
            precision,
            capabilities.max_texture_units
        );

        Ok(Self {
            state: StateSynchronizer::new(driver, capabilities.max_texture_units),
            hasher: ParameterHasher::new(capabilities.clone(), &settings),
            assembler: ShaderAssembler::new(ChunkLibrary::embedded(), capabilities.clone()),
            programs: ProgramCache::new(),
            slots: MaterialProgramSlots::new(settings.max_material_programs),
            uniforms: UniformUploads::new(),
            geometries: GeometryTracker::new(),
            vertex_arrays: VertexArrays::new(),
            texture_units: TextureUnits::new(capabilities.max_texture_units),
            info: RenderInfo::default(),
            warnings: WarnOnce::new(),
            pass: 0,
            filter: None,
            settings,
            capabilities,
        })
    }

    // ========================================================================
    // Frame
    // ========================================================================

    /// Starts a frame: bumps the pass counter and resets per-frame statistics.
    pub fn begin_render(&mut self) {
        self.pass += 1;
        self.info.frame += 1;
        if self.settings.auto_reset_info {
            self.info.reset();
        }
    }

    /// Ends a frame and records the live program and geometry counts.
    pub fn end_render(&mut self) {
        self.info.programs = self.programs.len();
        self.info.geometries = self.geometries.len();
    }

    /// Fills `lists` with the visible objects of `store` for this frame.
    ///
    /// Multi-material geometries produce one item per draw group.
    pub fn project_scene(&self, store: &ResourceStore, state: &RenderState, lists: &mut RenderLists) {
        lists.begin();
        for (id, object) in store.objects() {
            if !object.visible {
                continue;
            }
            let Some(geometry_id) = object.geometry else {
                continue;
            };
            let Some(geometry) = store.geometry(geometry_id) else {
                continue;
            };
            let z = state.camera.view_depth(object.model_matrix.w_axis.truncate());

            let mut push = |material: MaterialId, group| {
                let Some(descriptor) = store.material(material) else {
                    return;
                };
                if !descriptor.visible {
                    return;
                }
                let item = RenderItem {
                    id,
                    geometry: geometry_id,
                    material,
                    z,
                    render_order: object.render_order,
                    group,
                };
                lists.push(object.layer, item, descriptor.transparent);
            };

            if object.materials.len() > 1 && !geometry.groups.is_empty() {
                for group in &geometry.groups {
                    if let Some(&material) = object.materials.get(group.material_index) {
                        push(material, Some(*group));
                    }
                }
            } else if let Some(&material) = object.materials.first() {
                push(material, None);
            }
        }
        lists.finish(self.settings.sort_objects);
    }

    /// Draws every item of `lists` in render order.
    ///
    /// Items referring to resources missing from `store` are logged, counted
    /// as skipped and dropped; the rest of the frame still draws.
    pub fn render_list(&mut self, store: &ResourceStore, lists: &RenderLists, state: &RenderState) {
        for item in lists.iter() {
            if let Err(error) = self.render_item(store, item, state) {
                log::warn!("Skipping item {:?}: {error}", item.id);
                self.info.skipped += 1;
            }
        }
    }

    /// One complete frame: begin, project, draw, end.
    pub fn render(&mut self, store: &ResourceStore, state: &RenderState, lists: &mut RenderLists) {
        self.begin_render();
        self.project_scene(store, state, lists);
        self.render_list(store, lists, state);
        self.end_render();
    }

    // ========================================================================
    // Dispatch
    // ========================================================================

    /// Draws one item. Returns `true` when a draw was issued.
    ///
    /// Errors only for ids no longer present in `store`. Items whose program
    /// is pending or invalid are counted as skipped and leave GPU state alone.
    pub fn render_item(&mut self, store: &ResourceStore, item: &RenderItem, state: &RenderState) -> Result<bool> {
        if let Some(filter) = &self.filter
            && !filter(item)
        {
            return Ok(false);
        }

        let object = store.object(item.id).ok_or(VariantError::UnknownObject(item.id))?;
        let geometry = store
            .geometry(item.geometry)
            .ok_or(VariantError::UnknownGeometry(item.geometry))?;
        let material_id = state.override_material.unwrap_or(item.material);
        let material = store
            .material(material_id)
            .ok_or(VariantError::UnknownMaterial(material_id))?;
        if !material.visible {
            return Ok(false);
        }

        let wireframe = material.wireframe && object.kind == ObjectKind::Mesh;
        if wireframe && !geometries::has_wireframe_source(geometry) {
            self.warnings.warn("wireframe_source", || {
                format!(
                    "Geometry '{}' has no CPU index copy; wireframe draws of it are skipped",
                    geometry.name
                )
            });
            self.info.skipped += 1;
            return Ok(false);
        }

        let program = self.resolve_program(material_id, material, object, geometry, state);

        let options = self.compile_options();
        let ready = self.programs.poll(self.state.driver_mut(), program, options);
        let handle = match (ready, self.programs.get(program).and_then(ProgramVariant::handle)) {
            (ProgramState::Ready, Some(handle)) => handle,
            _ => {
                self.info.skipped += 1;
                return Ok(false);
            }
        };

        self.state.use_program(Some(handle));

        let mut buffers = self
            .geometries
            .ensure(self.state.driver_mut(), item.geometry, geometry, self.pass);
        let wireframe_index = if wireframe {
            let Some(index) = self
                .geometries
                .ensure_wireframe(self.state.driver_mut(), item.geometry, geometry)
            else {
                self.info.skipped += 1;
                return Ok(false);
            };
            buffers.index = Some(index.buffer);
            Some(index)
        } else {
            None
        };
        self.vertex_arrays.setup(
            &mut self.state,
            program,
            handle,
            item.geometry,
            geometry,
            buffers,
            wireframe,
        );

        self.upload_uniforms(program, handle, material_id, material, object, state);

        self.texture_units
            .bind_material(&mut self.state, material, state, &mut self.warnings);
        self.state.apply_material(material, object.is_mirrored());

        let topology = match object.kind {
            ObjectKind::Mesh if wireframe => PrimitiveTopology::LineList,
            ObjectKind::Mesh => PrimitiveTopology::TriangleList,
            ObjectKind::Line => PrimitiveTopology::LineStrip,
            ObjectKind::LineSegments => PrimitiveTopology::LineList,
            ObjectKind::Points => PrimitiveTopology::PointList,
        };
        if matches!(topology, PrimitiveTopology::LineList | PrimitiveTopology::LineStrip) {
            self.state.set_line_width(material.wireframe_linewidth);
        }

        self.state.set_viewport(state.effective_viewport());
        self.state.set_scissor(state.scissor);

        Ok(self.draw(item, object, geometry, topology, wireframe_index))
    }

    /// Cheap stale check first; full feature vector and MRU resolve otherwise.
    fn resolve_program(
        &mut self,
        material_id: MaterialId,
        material: &Material,
        object: &RenderObject,
        geometry: &Geometry,
        state: &RenderState,
    ) -> ProgramId {
        let triggers = StaleTriggers::capture(material, object, geometry, state);
        if let Some(program) = self.slots.current_if_fresh(material_id, &triggers) {
            return program;
        }

        let parameters = self
            .hasher
            .compute(material, object, geometry, state, &mut self.warnings);
        let key = parameters.cache_key();
        let label = if material.name.is_empty() {
            parameters.shader_name.clone()
        } else {
            format!("{} ({})", material.name, parameters.shader_name)
        };
        let options = self.compile_options();

        let assembler = &self.assembler;
        let driver = self.state.driver_mut();
        let resolution = self.slots.resolve(material_id, &key, &mut self.programs, |cache| {
            cache.get_program(driver, &key, &parameters, &label, options, || {
                let template = match &material.shader {
                    ShaderKind::Custom(custom) | ShaderKind::Raw(custom) => {
                        TemplateSource::Custom(custom)
                    }
                    _ => TemplateSource::Builtin(parameters.template().unwrap_or("meshbasic")),
                };
                assembler.assemble(template, &parameters, &parameters.defines)
            })
        });

        self.slots.store_triggers(material_id, triggers);
        self.destroy_variants(resolution.destroyed);
        resolution.program
    }

    fn upload_uniforms(
        &mut self,
        program: ProgramId,
        handle: ProgramHandle,
        material_id: MaterialId,
        material: &Material,
        object: &RenderObject,
        state: &RenderState,
    ) {
        let uploads = &mut self.uniforms;
        let driver = self.state.driver_mut();

        let model = ModelUniforms::new(object, state.camera.view);
        driver.upload_uniforms(handle, &UniformSlot::ModelMatrix, bytemuck::bytes_of(&model));

        if uploads.needs_upload(program, &UniformSlot::Camera, UploadStamp::camera(state)) {
            let camera = CameraUniforms::new(state);
            driver.upload_uniforms(handle, &UniformSlot::Camera, bytemuck::bytes_of(&camera));
        }
        if uploads.needs_upload(program, &UniformSlot::Scene, UploadStamp::scene(state)) {
            let scene = SceneUniforms::new(state);
            driver.upload_uniforms(handle, &UniformSlot::Scene, bytemuck::bytes_of(&scene));
        }
        if uploads.needs_upload(
            program,
            &UniformSlot::Material,
            UploadStamp::material(material_id, material),
        ) {
            driver.upload_uniforms(handle, &UniformSlot::Material, bytemuck::bytes_of(material.uniforms()));
            for (name, value) in &material.custom_uniforms {
                driver.upload_uniforms(handle, &UniformSlot::Custom(name.clone()), bytemuck::bytes_of(value));
            }
        }
        if let Some(env) = effective_env_map(material, state)
            && uploads.needs_upload(program, &UniformSlot::Environment, UploadStamp::environment(state))
        {
            let max_mip = match env.kind {
                EnvMapKind::CubeUv { height } => height.max(1).ilog2() as f32,
                EnvMapKind::Cube | EnvMapKind::Equirect => 0.0,
            };
            let flip = if env.kind == EnvMapKind::Cube { -1.0 } else { 1.0 };
            let environment = EnvironmentUniforms {
                params: Vec4::new(1.0, flip, max_mip, 0.0),
            };
            driver.upload_uniforms(handle, &UniformSlot::Environment, bytemuck::bytes_of(&environment));
        }
    }

    /// Issues the draw for the item's element range. Returns `false` when
    /// the range is empty.
    ///
    /// Wireframe draws index the derived line buffer, in which every
    /// triangle element maps to two line indices.
    fn draw(
        &mut self,
        item: &RenderItem,
        object: &RenderObject,
        geometry: &Geometry,
        topology: PrimitiveTopology,
        wireframe: Option<WireframeIndex>,
    ) -> bool {
        let (range_factor, data_count, format) = match wireframe {
            Some(index) => (2, index.count, Some(IndexFormat::Uint32)),
            None => (1, geometry.element_count(), geometry.index.map(|index| index.format)),
        };
        let range = geometry.draw_range;

        let mut start = range.start.saturating_mul(range_factor);
        let mut end = range.count.map_or(u32::MAX, |count| {
            start.saturating_add(count.saturating_mul(range_factor))
        });
        if let Some(group) = item.group {
            start = start.max(group.start.saturating_mul(range_factor));
            end = end.min(group.start.saturating_add(group.count).saturating_mul(range_factor));
        }
        end = end.min(data_count);
        if end <= start {
            return false;
        }
        let count = end - start;

        if let Some(ranges) = &object.multi_draw {
            let spans: SmallVec<[DrawSpan; 8]> = ranges
                .iter()
                .filter_map(|range| {
                    let first = range.start.saturating_mul(range_factor).min(data_count);
                    let available = data_count - first;
                    let count = range
                        .count
                        .map_or(available, |c| c.saturating_mul(range_factor).min(available));
                    (count > 0).then_some(DrawSpan { first, count })
                })
                .collect();
            if spans.is_empty() {
                return false;
            }
            self.multi_draw(topology, format, &spans);
            return true;
        }

        let instances = object
            .instancing
            .map(|instancing| instancing.count)
            .or(geometry.instance_count);
        match instances {
            Some(0) => return false,
            Some(instances) if self.capabilities.instancing => {
                let driver = self.state.driver_mut();
                match format {
                    Some(format) => driver.draw_elements_instanced(topology, format, start, count, instances),
                    None => driver.draw_arrays_instanced(topology, start, count, instances),
                }
                self.info.update(topology, count, instances);
            }
            Some(instances) => {
                self.warnings.warn("instancing", || {
                    "Instanced drawing not supported by this device; issuing one draw per instance".to_string()
                });
                for _ in 0..instances {
                    self.draw_once(topology, format, start, count);
                }
            }
            None => self.draw_once(topology, format, start, count),
        }
        true
    }

    fn draw_once(&mut self, topology: PrimitiveTopology, format: Option<IndexFormat>, first: u32, count: u32) {
        let driver = self.state.driver_mut();
        match format {
            Some(format) => driver.draw_elements(topology, format, first, count),
            None => driver.draw_arrays(topology, first, count),
        }
        self.info.update(topology, count, 1);
    }

    fn multi_draw(&mut self, topology: PrimitiveTopology, format: Option<IndexFormat>, spans: &[DrawSpan]) {
        if !self.capabilities.multi_draw {
            self.warnings.warn("multi_draw", || {
                "Multi-draw not supported by this device; issuing one draw per range".to_string()
            });
            for span in spans {
                self.draw_once(topology, format, span.first, span.count);
            }
            return;
        }

        let driver = self.state.driver_mut();
        match format {
            Some(format) => driver.multi_draw_elements(topology, format, spans),
            None => driver.multi_draw_arrays(topology, spans),
        }
        let total = spans.iter().map(|span| span.count).sum();
        self.info.update(topology, total, 1);
    }

    fn compile_options(&self) -> CompileOptions {
        CompileOptions {
            check_errors: self.settings.check_shader_errors,
            debug_source: self.settings.debug_shader_source,
            parallel: self.capabilities.parallel_compile,
        }
    }

    /// Unbinds, deletes and forgets variants whose last reference was dropped.
    fn destroy_variants(&mut self, destroyed: Vec<ProgramVariant>) {
        for variant in destroyed {
            self.vertex_arrays.release_program(&mut self.state, variant.id());
            self.uniforms.forget(variant.id());
            if let Some(handle) = variant.handle() {
                if self.state.current_program() == Some(handle) {
                    self.state.use_program(None);
                }
                self.state.driver_mut().delete_program(handle);
            }
        }
    }

    // ========================================================================
    // Dispose / Reset
    // ========================================================================

    /// Forgets all shadowed GPU state. Required after external code touched
    /// the driver.
    ///
    /// With `force` (context loss and restore) every driver object the
    /// renderer remembers is assumed dead: programs, material slots, geometry
    /// buffers, vertex arrays and upload stamps are dropped without driver
    /// calls and rebuilt on the next draw.
    pub fn reset_state(&mut self, force: bool) {
        self.state.reset();
        if !force {
            return;
        }
        let programs = self.programs.drain().len();
        self.slots.clear();
        self.geometries.clear();
        self.vertex_arrays.clear();
        self.uniforms.clear();
        log::info!("Renderer caches dropped after context loss ({programs} programs)");
    }

    /// Unbinds the current vertex array; with `force` deletes all of them.
    pub fn reset_vertex_bindings(&mut self, force: bool) {
        self.vertex_arrays.reset(&mut self.state, force);
    }

    /// Releases every program reference held for a disposed material.
    pub fn release_material(&mut self, material: MaterialId) {
        let destroyed = self.slots.release_material(material, &mut self.programs);
        log::debug!(
            "Material {material:?} released ({} programs destroyed)",
            destroyed.len()
        );
        self.destroy_variants(destroyed);
    }

    /// Deletes the buffers and vertex arrays of a disposed geometry.
    pub fn release_geometry(&mut self, geometry: GeometryId) {
        self.vertex_arrays.release_geometry(&mut self.state, geometry);
        self.geometries.release(self.state.driver_mut(), geometry);
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn set_item_filter(&mut self, filter: impl Fn(&RenderItem) -> bool + 'static) {
        self.filter = Some(Box::new(filter));
    }

    pub fn clear_item_filter(&mut self) {
        self.filter = None;
    }

    /// Statistics of the current frame with up-to-date resource counts.
    #[must_use]
    pub fn info(&self) -> RenderInfo {
        RenderInfo {
            programs: self.programs.len(),
            geometries: self.geometries.len(),
            ..self.info
        }
    }

    #[must_use]
    pub fn program_stats(&self) -> ProgramCacheStats {
        self.programs.stats()
    }

    #[must_use]
    pub fn programs(&self) -> &ProgramCache {
        &self.programs
    }

    /// Variants remembered for a material, most recently used first.
    pub fn material_programs(&self, material: MaterialId) -> impl Iterator<Item = &ProgramVariant> {
        self.slots
            .programs(material)
            .filter_map(|id| self.programs.get(id))
    }

    #[must_use]
    pub fn state(&self) -> &StateSynchronizer<D> {
        &self.state
    }

    /// Shadowed state access for clear and blit sequences (locks, clears).
    pub fn state_mut(&mut self) -> &mut StateSynchronizer<D> {
        &mut self.state
    }

    #[must_use]
    pub fn driver(&self) -> &D {
        self.state.driver()
    }

    /// Raw driver access; call [`reset_state`](Self::reset_state) after
    /// changing driver state through it.
    pub fn driver_mut(&mut self) -> &mut D {
        self.state.driver_mut()
    }

    #[must_use]
    pub fn settings(&self) -> &RendererSettings {
        &self.settings
    }

    #[must_use]
    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    /// Chunk registry used for new programs. Existing variants keep the
    /// sources they were compiled from.
    pub fn chunk_library_mut(&mut self) -> &mut ChunkLibrary {
        self.assembler.library_mut()
    }

    /// Pass counter, bumped by every `begin_render`.
    #[must_use]
    pub fn pass(&self) -> u64 {
        self.pass
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::driver::DriverCall;
    use crate::resources::{DrawGroup, DrawRange, Instancing};

    fn renderer(capabilities: Capabilities) -> Renderer<HeadlessDriver> {
        Renderer::new(HeadlessDriver::new(), capabilities, RendererSettings::default()).unwrap()
    }

    fn scene(material: Material, geometry: Geometry, object: RenderObject) -> (ResourceStore, RenderItem) {
        let mut store = ResourceStore::new();
        let material = store.add_material(material);
        let geometry = store.add_geometry(geometry);
        let id = store.add_object(object.with_mesh(geometry, material));
        let item = RenderItem {
            id,
            geometry,
            material,
            z: 0.0,
            render_order: 0,
            group: None,
        };
        (store, item)
    }

    fn draws(renderer: &Renderer<HeadlessDriver>) -> Vec<DriverCall> {
        renderer
            .driver()
            .calls()
            .iter()
            .filter(|call| call.is_draw())
            .cloned()
            .collect()
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let settings = RendererSettings {
            max_material_programs: 0,
            ..Default::default()
        };
        assert!(Renderer::new(HeadlessDriver::new(), Capabilities::default(), settings).is_err());
    }

    #[test]
    fn test_draw_range_and_group_intersect() {
        let mut geometry = Geometry::with_vertices(100);
        geometry.draw_range = DrawRange::new(10, 50);
        let (store, mut item) = scene(Material::basic(), geometry, RenderObject::mesh());
        item.group = Some(DrawGroup {
            start: 40,
            count: 40,
            material_index: 0,
        });

        let mut renderer = renderer(Capabilities::default());
        renderer.begin_render();
        assert!(renderer.render_item(&store, &item, &RenderState::default()).unwrap());

        assert_eq!(
            draws(&renderer),
            vec![DriverCall::DrawArrays {
                topology: PrimitiveTopology::TriangleList,
                first: 40,
                count: 20,
            }]
        );
    }

    #[test]
    fn test_instancing_loop_fallback() {
        let mut object = RenderObject::mesh();
        object.instancing = Some(Instancing {
            count: 3,
            color: false,
        });
        let (store, item) = scene(Material::basic(), Geometry::with_vertices(6), object);

        let mut capabilities = Capabilities::default();
        capabilities.instancing = false;
        let mut renderer = renderer(capabilities);
        renderer.begin_render();
        renderer.render_item(&store, &item, &RenderState::default()).unwrap();

        assert_eq!(draws(&renderer).len(), 3);
        assert_eq!(renderer.info().calls, 3);
    }

    #[test]
    fn test_multi_draw_native_and_fallback() {
        let mut object = RenderObject::mesh();
        object.multi_draw = Some(vec![DrawRange::new(0, 3), DrawRange::new(6, 3)]);
        let (store, item) = scene(Material::basic(), Geometry::with_vertices(12), object);

        let mut capabilities = Capabilities::default();
        capabilities.multi_draw = true;
        let mut native = renderer(capabilities);
        native.begin_render();
        native.render_item(&store, &item, &RenderState::default()).unwrap();
        assert!(matches!(
            draws(&native).as_slice(),
            [DriverCall::MultiDrawArrays { spans, .. }] if spans.len() == 2
        ));

        let mut fallback = renderer(Capabilities::default());
        fallback.begin_render();
        fallback.render_item(&store, &item, &RenderState::default()).unwrap();
        assert_eq!(draws(&fallback).len(), 2);
    }

    #[test]
    fn test_wireframe_draws_derived_line_index() {
        let mut material = Material::basic();
        material.wireframe = true;
        let (store, item) = scene(material, Geometry::with_vertices(3), RenderObject::mesh());

        let mut renderer = renderer(Capabilities::default());
        renderer.begin_render();
        assert!(renderer.render_item(&store, &item, &RenderState::default()).unwrap());

        let driver = renderer.driver();
        assert_eq!(
            driver.count(|call| matches!(call, DriverCall::CreateIndexBuffer { count: 6, .. })),
            1
        );
        assert_eq!(
            draws(&renderer),
            vec![DriverCall::DrawElements {
                topology: PrimitiveTopology::LineList,
                format: IndexFormat::Uint32,
                first: 0,
                count: 6,
            }]
        );
    }

    #[test]
    fn test_wireframe_range_maps_to_line_indices() {
        let mut material = Material::basic();
        material.wireframe = true;
        let mut geometry = Geometry::with_vertices(4).with_indices(vec![0, 1, 2, 2, 1, 3]);
        geometry.draw_range = DrawRange::new(3, 3);
        let (store, item) = scene(material, geometry, RenderObject::mesh());

        let mut renderer = renderer(Capabilities::default());
        renderer.begin_render();
        renderer.render_item(&store, &item, &RenderState::default()).unwrap();

        assert_eq!(
            draws(&renderer),
            vec![DriverCall::DrawElements {
                topology: PrimitiveTopology::LineList,
                format: IndexFormat::Uint32,
                first: 6,
                count: 6,
            }]
        );
    }

    #[test]
    fn test_wireframe_without_index_copy_skipped() {
        let mut material = Material::basic();
        material.wireframe = true;
        let geometry = Geometry::with_vertices(4).with_index(IndexFormat::Uint16, 6);
        let (store, item) = scene(material, geometry, RenderObject::mesh());

        let mut renderer = renderer(Capabilities::default());
        renderer.begin_render();
        assert!(!renderer.render_item(&store, &item, &RenderState::default()).unwrap());
        assert!(draws(&renderer).is_empty());
        assert_eq!(renderer.info().skipped, 1);
    }

    #[test]
    fn test_forced_reset_drops_driver_objects() {
        let (store, item) = scene(Material::basic(), Geometry::with_vertices(3), RenderObject::mesh());
        let mut renderer = renderer(Capabilities::default());
        renderer.begin_render();
        renderer.render_item(&store, &item, &RenderState::default()).unwrap();

        renderer.reset_state(false);
        assert_eq!(renderer.programs().len(), 1);

        renderer.reset_state(true);
        assert!(renderer.programs().is_empty());
        assert_eq!(renderer.material_programs(item.material).count(), 0);
        assert_eq!(renderer.info().geometries, 0);

        renderer.driver_mut().clear_calls();
        renderer.begin_render();
        assert!(renderer.render_item(&store, &item, &RenderState::default()).unwrap());
        let driver = renderer.driver();
        assert_eq!(driver.compile_count(), 2);
        assert_eq!(driver.count(|call| matches!(call, DriverCall::UpdateGeometry(_))), 1);
        assert_eq!(driver.count(|call| matches!(call, DriverCall::CreateVertexArray(_))), 1);
        assert_eq!(driver.count(|call| matches!(call, DriverCall::DeleteProgram(_))), 0);
    }

    #[test]
    fn test_filter_and_invisible_material_skip() {
        let (store, item) = scene(Material::basic(), Geometry::with_vertices(3), RenderObject::mesh());
        let mut renderer = renderer(Capabilities::default());
        renderer.begin_render();

        renderer.set_item_filter(|_| false);
        assert!(!renderer.render_item(&store, &item, &RenderState::default()).unwrap());
        renderer.clear_item_filter();
        assert!(renderer.render_item(&store, &item, &RenderState::default()).unwrap());
    }

    #[test]
    fn test_unknown_ids_error() {
        let (mut store, item) = scene(Material::basic(), Geometry::with_vertices(3), RenderObject::mesh());
        store.remove_material(item.material);

        let mut renderer = renderer(Capabilities::default());
        assert_eq!(
            renderer.render_item(&store, &item, &RenderState::default()),
            Err(VariantError::UnknownMaterial(item.material))
        );
    }

    #[test]
    fn test_mirrored_object_flips_front_face() {
        let object = RenderObject::mesh().with_matrix(glam::Mat4::from_scale(glam::Vec3::new(-1.0, 1.0, 1.0)));
        let (store, item) = scene(Material::basic(), Geometry::with_vertices(3), object);

        let mut renderer = renderer(Capabilities::default());
        renderer.begin_render();
        renderer.render_item(&store, &item, &RenderState::default()).unwrap();
        assert_eq!(renderer.state().shadow().front_face, Some(wgpu::FrontFace::Cw));
    }
}
