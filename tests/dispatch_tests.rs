//! Dispatcher and State Tests
//!
//! Tests for:
//! - Redundant state filtering in the synchronizer
//! - Render list ordering through scene projection
//! - Skipping items whose program is pending or invalid
//! - Override material, multi-material groups, dispose hooks

use glam::{Mat4, Vec3};
use wgpu::{BlendState, CompareFunction, Face};

use myth_variants::renderer::driver::DriverCall;
use myth_variants::resources::{CustomShader, DrawGroup, ShaderKind};
use myth_variants::{
    Capabilities, Geometry, HeadlessDriver, Material, ObjectId, RenderItem, RenderLists,
    RenderObject, RenderState, Renderer, RendererSettings, ResourceStore, StateLocks,
};
use myth_variants::renderer::StateSynchronizer;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn renderer_over(driver: HeadlessDriver) -> Renderer<HeadlessDriver> {
    Renderer::new(driver, Capabilities::default(), RendererSettings::default()).unwrap()
}

fn parallel_renderer_over(driver: HeadlessDriver) -> Renderer<HeadlessDriver> {
    let capabilities = Capabilities {
        parallel_compile: true,
        ..Capabilities::default()
    };
    Renderer::new(driver, capabilities, RendererSettings::default()).unwrap()
}

fn single(store: &mut ResourceStore, material: Material) -> RenderItem {
    let geometry = store.add_geometry(Geometry::with_vertices(3));
    let material = store.add_material(material);
    let id = store.add_object(RenderObject::mesh().with_mesh(geometry, material));
    RenderItem {
        id,
        geometry,
        material,
        z: 0.0,
        render_order: 0,
        group: None,
    }
}

// ============================================================================
// State Synchronizer
// ============================================================================

#[test]
fn repeated_state_emits_no_calls() {
    let mut state = StateSynchronizer::new(HeadlessDriver::new(), 8);
    let issue = |state: &mut StateSynchronizer<HeadlessDriver>| {
        state.set_blend(Some(BlendState::ALPHA_BLENDING));
        state.set_depth_test(true);
        state.set_depth_func(CompareFunction::LessEqual);
        state.set_cull_face(Some(Face::Back));
    };

    issue(&mut state);
    let first = state.driver().call_count();
    assert_eq!(first, 4);

    issue(&mut state);
    assert_eq!(state.driver().call_count(), first);
}

#[test]
fn repeated_material_draw_only_uploads_and_draws() {
    let mut store = ResourceStore::new();
    let item = single(&mut store, Material::standard());
    let state = RenderState::default();
    let mut renderer = renderer_over(HeadlessDriver::new());

    renderer.begin_render();
    renderer.render_item(&store, &item, &state).unwrap();
    renderer.driver_mut().clear_calls();
    renderer.render_item(&store, &item, &state).unwrap();

    let calls = renderer.driver().calls();
    assert!(calls.iter().all(|call| !call.is_state_change()), "{calls:?}");
    assert_eq!(renderer.driver().draw_count(), 1);
}

#[test]
fn locked_axis_ignores_requests() {
    let mut state = StateSynchronizer::new(HeadlessDriver::new(), 8);
    state.set_depth_write(false);
    state.lock(StateLocks::DEPTH);
    state.set_depth_write(true);
    assert_eq!(state.shadow().depth_write, Some(false));

    state.unlock(StateLocks::DEPTH);
    state.set_depth_write(true);
    assert_eq!(state.shadow().depth_write, Some(true));
}

#[test]
fn reset_state_forces_reissue() {
    let mut store = ResourceStore::new();
    let item = single(&mut store, Material::basic());
    let state = RenderState::default();
    let mut renderer = renderer_over(HeadlessDriver::new());

    renderer.begin_render();
    renderer.render_item(&store, &item, &state).unwrap();
    renderer.reset_state(false);
    assert_eq!(renderer.state().shadow().depth_test, None);

    renderer.driver_mut().clear_calls();
    renderer.render_item(&store, &item, &state).unwrap();
    assert!(renderer.driver().calls().contains(&DriverCall::DepthTest(true)));
}

// ============================================================================
// Render Lists
// ============================================================================

fn ordered_scene(transparent: bool) -> (ResourceStore, Vec<ObjectId>) {
    let mut store = ResourceStore::new();
    let geometry = store.add_geometry(Geometry::with_vertices(3));
    let mut material = Material::basic();
    material.transparent = transparent;
    let material = store.add_material(material);

    let ids = [5.0, 2.0, 5.0]
        .into_iter()
        .map(|depth| {
            let object = RenderObject::mesh()
                .with_mesh(geometry, material)
                .with_matrix(Mat4::from_translation(Vec3::new(0.0, 0.0, -depth)));
            store.add_object(object)
        })
        .collect();
    (store, ids)
}

#[test]
fn opaque_items_front_to_back() {
    let (store, ids) = ordered_scene(false);
    let renderer = renderer_over(HeadlessDriver::new());
    let mut lists = RenderLists::new();
    renderer.project_scene(&store, &RenderState::default(), &mut lists);

    let order: Vec<_> = lists.iter().map(|item| item.id).collect();
    assert_eq!(order, vec![ids[1], ids[0], ids[2]]);
}

#[test]
fn transparent_items_back_to_front() {
    let (store, ids) = ordered_scene(true);
    let renderer = renderer_over(HeadlessDriver::new());
    let mut lists = RenderLists::new();
    renderer.project_scene(&store, &RenderState::default(), &mut lists);

    let order: Vec<_> = lists.iter().map(|item| item.id).collect();
    assert_eq!(order, vec![ids[0], ids[2], ids[1]]);
}

#[test]
fn multi_material_groups_become_items() {
    let mut store = ResourceStore::new();
    let mut geometry = Geometry::with_vertices(12);
    geometry.groups = vec![
        DrawGroup {
            start: 0,
            count: 6,
            material_index: 0,
        },
        DrawGroup {
            start: 6,
            count: 6,
            material_index: 1,
        },
    ];
    let geometry = store.add_geometry(geometry);
    let red = store.add_material(Material::basic());
    let blue = store.add_material(Material::phong());
    let mut object = RenderObject::mesh();
    object.geometry = Some(geometry);
    object.materials = vec![red, blue];
    store.add_object(object);

    let mut renderer = renderer_over(HeadlessDriver::new());
    let mut lists = RenderLists::new();
    renderer.render(&store, &RenderState::default(), &mut lists);

    assert_eq!(lists.len(), 2);
    let draws: Vec<_> = renderer
        .driver()
        .calls()
        .iter()
        .filter(|call| call.is_draw())
        .cloned()
        .collect();
    assert_eq!(draws.len(), 2);
    assert!(draws.iter().any(|call| matches!(call, DriverCall::DrawArrays { first: 6, count: 6, .. })));
}

// ============================================================================
// Readiness
// ============================================================================

#[test]
fn pending_program_skips_without_state_change() {
    init_logger();
    let mut store = ResourceStore::new();
    let item = single(&mut store, Material::standard());
    let state = RenderState::default();
    let mut renderer = parallel_renderer_over(HeadlessDriver::new().with_compile_latency(2));

    renderer.begin_render();
    let before = renderer.state().shadow().clone();
    assert!(!renderer.render_item(&store, &item, &state).unwrap());
    assert!(!renderer.render_item(&store, &item, &state).unwrap());
    assert_eq!(renderer.state().shadow(), &before);
    assert_eq!(renderer.driver().draw_count(), 0);
    assert_eq!(renderer.info().skipped, 2);

    assert!(renderer.render_item(&store, &item, &state).unwrap());
    assert_eq!(renderer.driver().draw_count(), 1);
    assert_eq!(renderer.driver().compile_count(), 1);
}

#[test]
fn serial_compile_draws_on_first_frame() {
    let mut store = ResourceStore::new();
    let item = single(&mut store, Material::standard());
    let mut renderer = renderer_over(HeadlessDriver::new().with_compile_latency(2));

    renderer.begin_render();
    assert!(renderer.render_item(&store, &item, &RenderState::default()).unwrap());
    assert_eq!(renderer.info().skipped, 0);
}

#[test]
fn missing_material_drops_only_its_item() {
    init_logger();
    let mut store = ResourceStore::new();
    let geometry = store.add_geometry(Geometry::with_vertices(3));
    let doomed = store.add_material(Material::basic());
    let kept = store.add_material(Material::phong());
    store.add_object(RenderObject::mesh().with_mesh(geometry, doomed));
    store.add_object(RenderObject::mesh().with_mesh(geometry, kept));

    let mut renderer = renderer_over(HeadlessDriver::new());
    let mut lists = RenderLists::new();
    renderer.begin_render();
    renderer.project_scene(&store, &RenderState::default(), &mut lists);
    store.remove_material(doomed);
    renderer.render_list(&store, &lists, &RenderState::default());
    renderer.end_render();

    assert_eq!(lists.len(), 2);
    assert_eq!(renderer.driver().draw_count(), 1);
    assert_eq!(renderer.info().skipped, 1);
}

#[test]
fn failed_program_is_not_rebuilt() {
    init_logger();
    let shader = CustomShader {
        name: "broken".to_string(),
        vertex: "void main() { gl_Position = vec4( position, 1.0 ); }\n".to_string(),
        fragment: "void main() {\n\tBROKEN_SYMBOL;\n}\n".to_string(),
    };
    let mut store = ResourceStore::new();
    let item = single(&mut store, Material::new(ShaderKind::Custom(shader)));
    let state = RenderState::default();
    let mut renderer = renderer_over(HeadlessDriver::new().with_failure_marker("BROKEN_SYMBOL"));

    for _ in 0..3 {
        renderer.begin_render();
        assert!(!renderer.render_item(&store, &item, &state).unwrap());
    }

    assert_eq!(renderer.driver().compile_count(), 1);
    assert_eq!(renderer.driver().draw_count(), 0);
    let variant = renderer.material_programs(item.material).next().unwrap();
    assert!(variant.is_invalid());
    assert!(renderer.state().current_program().is_none());
}

#[test]
fn unresolved_include_yields_invalid_variant() {
    let shader = CustomShader {
        name: "missing_chunk".to_string(),
        vertex: "#include <does_not_exist>\nvoid main() {}\n".to_string(),
        fragment: "void main() {}\n".to_string(),
    };
    let mut store = ResourceStore::new();
    let item = single(&mut store, Material::new(ShaderKind::Raw(shader)));
    let mut renderer = renderer_over(HeadlessDriver::new());

    renderer.begin_render();
    assert!(!renderer.render_item(&store, &item, &RenderState::default()).unwrap());
    assert_eq!(renderer.driver().compile_count(), 0);
    assert!(renderer.material_programs(item.material).next().unwrap().is_invalid());
}

// ============================================================================
// Overrides and Dispose
// ============================================================================

#[test]
fn override_material_replaces_item_material() {
    let mut store = ResourceStore::new();
    let item = single(&mut store, Material::standard());
    let depth_material = store.add_material(Material::basic().with_name("depth"));
    let state = RenderState {
        override_material: Some(depth_material),
        ..RenderState::default()
    };
    let mut renderer = renderer_over(HeadlessDriver::new());

    renderer.begin_render();
    renderer.render_item(&store, &item, &state).unwrap();

    assert_eq!(renderer.material_programs(item.material).count(), 0);
    assert_eq!(renderer.material_programs(depth_material).count(), 1);
}

#[test]
fn release_geometry_deletes_buffers_and_bindings() {
    let mut store = ResourceStore::new();
    let item = single(&mut store, Material::basic());
    let mut renderer = renderer_over(HeadlessDriver::new());

    renderer.begin_render();
    renderer.render_item(&store, &item, &RenderState::default()).unwrap();
    renderer.release_geometry(item.geometry);

    let driver = renderer.driver();
    assert_eq!(driver.count(|call| matches!(call, DriverCall::DeleteGeometry(_))), 1);
    assert_eq!(driver.count(|call| matches!(call, DriverCall::DeleteVertexArray(_))), 1);
    assert!(renderer.state().current_vertex_array().is_none());
    assert_eq!(renderer.info().geometries, 0);
}

#[test]
fn reset_vertex_bindings_force_deletes_all() {
    let mut store = ResourceStore::new();
    let first = single(&mut store, Material::basic());
    let second = single(&mut store, Material::basic());
    let mut renderer = renderer_over(HeadlessDriver::new());

    renderer.begin_render();
    renderer.render_item(&store, &first, &RenderState::default()).unwrap();
    renderer.render_item(&store, &second, &RenderState::default()).unwrap();

    renderer.reset_vertex_bindings(false);
    assert_eq!(renderer.driver().count(|call| matches!(call, DriverCall::DeleteVertexArray(_))), 0);
    renderer.reset_vertex_bindings(true);
    assert_eq!(renderer.driver().count(|call| matches!(call, DriverCall::DeleteVertexArray(_))), 2);
}
