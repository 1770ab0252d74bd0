//! Program Parameters
//!
//! [`ParameterHasher::compute`] reduces a (material, object, geometry,
//! render-state) combination to a [`ProgramParameters`] feature vector. Two
//! feature vectors are equal iff every field and every define matches, and
//! equality is the only criterion for program reuse.
//!
//! # Cache key
//!
//! [`ProgramParameters::cache_key`] serializes the feature vector by visiting
//! the fields in a fixed declared order. Material defines are serialized sorted
//! by name, so insertion order never leaks into the key. Custom shader sources
//! contribute an `xxh3_128` digest of their text.
//!
//! Every input that changes generated source must appear here; a missing one
//! silently reuses a wrong program.

use std::fmt::Write as _;

use bitflags::bitflags;
use xxhash_rust::xxh3::xxh3_128;

use crate::renderer::capabilities::Capabilities;
use crate::renderer::render_state::{FogKind, LightCounts, PassKind, RenderState, ShadowMapKind, ToneMapping};
use crate::renderer::settings::{Precision, RendererSettings, ShaderDialect};
use crate::resources::{
    ColorEncoding, EnvMap, EnvMapKind, EnvMapMode, Geometry, MapSlot, Material, RenderObject,
    ShaderDefines, ShaderKind, Side,
};
use crate::utils::WarnOnce;

bitflags! {
    /// Boolean program features, serialized into the key as one bitmask.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ProgramFeatures: u64 {
        const INSTANCING              = 1 << 0;
        const INSTANCING_COLOR        = 1 << 1;
        const SKINNING                = 1 << 2;
        const BONE_TEXTURE            = 1 << 3;
        const MORPH_NORMALS           = 1 << 4;
        const VERTEX_TANGENTS         = 1 << 5;
        const VERTEX_COLORS           = 1 << 6;
        const VERTEX_ALPHAS           = 1 << 7;
        const FLAT_SHADING            = 1 << 8;
        const DOUBLE_SIDED            = 1 << 9;
        const FLIP_SIDED              = 1 << 10;
        const LOGARITHMIC_DEPTH       = 1 << 11;
        const DITHERING               = 1 << 12;
        const RECEIVE_SHADOW          = 1 << 13;
        const PREMULTIPLIED_ALPHA     = 1 << 14;
        const ALPHA_TEST              = 1 << 15;
        const CLUSTERED_LIGHTS        = 1 << 16;
        const PHYSICALLY_CORRECT      = 1 << 17;
        const OBJECT_SPACE_NORMAL_MAP = 1 << 18;
        const MULTI_DRAW              = 1 << 19;
        const RAW_SHADER              = 1 << 20;
    }
}

/// Environment map actually sampled by a material: its own map, else the
/// scene environment for PBR materials.
#[must_use]
pub fn effective_env_map(material: &Material, state: &RenderState) -> Option<EnvMap> {
    material.env_map.or_else(|| {
        if matches!(material.shader, ShaderKind::Standard) {
            state.environment
        } else {
            None
        }
    })
}

/// Shader source identity of a material.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ShaderSourceId {
    /// Built-in template name.
    Template(&'static str),
    /// Digests of custom vertex / fragment text.
    Custom { vertex: u128, fragment: u128 },
}

/// Canonical feature vector of one program variant.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgramParameters {
    pub source: ShaderSourceId,
    pub shader_name: String,
    pub dialect: ShaderDialect,
    pub precision: Precision,

    /// UV channel per map slot, `None` when the slot is empty.
    pub maps: [Option<u8>; MapSlot::COUNT],
    pub map_encoding: ColorEncoding,
    pub emissive_map_encoding: ColorEncoding,
    pub light_map_encoding: ColorEncoding,
    pub env_map: Option<(EnvMapKind, EnvMapMode)>,
    pub env_map_encoding: ColorEncoding,
    pub output_encoding: ColorEncoding,

    pub lights: LightCounts,
    pub shadow_map: Option<ShadowMapKind>,
    pub clipping_planes: u32,
    pub clipping_intersection: u32,
    pub fog: Option<FogKind>,
    pub max_bones: u32,
    pub morph_targets: u32,
    pub tone_mapping: ToneMapping,
    pub pass: PassKind,
    pub draw_buffers: u32,
    pub features: ProgramFeatures,

    /// Material defines, passed through to the prefix unchanged.
    pub defines: ShaderDefines,
    pub custom_cache_key: Option<String>,
}

fn optional_code(value: Option<u32>) -> i64 {
    value.map_or(-1, i64::from)
}

impl ProgramParameters {
    #[must_use]
    pub fn is_raw(&self) -> bool {
        self.features.contains(ProgramFeatures::RAW_SHADER)
    }

    #[must_use]
    pub fn template(&self) -> Option<&'static str> {
        match self.source {
            ShaderSourceId::Template(name) => Some(name),
            ShaderSourceId::Custom { .. } => None,
        }
    }

    /// Serializes the feature vector in declared field order.
    #[must_use]
    pub fn cache_key(&self) -> String {
        let mut key = String::with_capacity(256);

        match &self.source {
            ShaderSourceId::Template(name) => key.push_str(name),
            ShaderSourceId::Custom { vertex, fragment } => {
                let _ = write!(key, "{}:{vertex:032x}{fragment:032x}", self.shader_name);
            }
        }
        key.push(',');
        key.push_str(&self.defines.cache_key_fragment());
        key.push(',');

        let _ = write!(key, "{},{:?},", self.dialect.code(), self.precision);
        for channel in &self.maps {
            let _ = write!(key, "{},", optional_code(channel.map(u32::from)));
        }

        let env = self.env_map.map(|(kind, mode)| {
            let kind = match kind {
                EnvMapKind::Cube => 0,
                EnvMapKind::CubeUv { height } => 1 + (height << 2),
                EnvMapKind::Equirect => 2,
            };
            let mode = match mode {
                EnvMapMode::Reflection => 0,
                EnvMapMode::Refraction => 1,
            };
            (kind << 1) | mode
        });
        let _ = write!(
            key,
            "{},{},{},{},{},{},",
            self.map_encoding.code(),
            self.emissive_map_encoding.code(),
            self.light_map_encoding.code(),
            optional_code(env),
            self.env_map_encoding.code(),
            self.output_encoding.code(),
        );

        let lights = &self.lights;
        let _ = write!(
            key,
            "{},{},{},{},{},{},{},{},",
            lights.directional,
            lights.point,
            lights.spot,
            lights.rect_area,
            lights.hemisphere,
            lights.directional_shadow,
            lights.point_shadow,
            lights.spot_shadow,
        );

        let shadow = self.shadow_map.map(|kind| kind as u32);
        let fog = self.fog.map(|kind| kind as u32);
        let _ = write!(
            key,
            "{},{},{},{},{},{},{},{},{},{}",
            optional_code(shadow),
            self.clipping_planes,
            self.clipping_intersection,
            optional_code(fog),
            self.max_bones,
            self.morph_targets,
            self.tone_mapping.code(),
            self.pass.code(),
            self.draw_buffers,
            self.features.bits(),
        );

        if let Some(custom) = &self.custom_cache_key {
            key.push(',');
            key.push_str(custom);
        }
        key
    }

    /// Feature defines derived from the parameters, in a deterministic order.
    #[must_use]
    pub fn feature_defines(&self) -> ShaderDefines {
        let mut defines = ShaderDefines::new();
        let features = self.features;
        let mut flag = |enabled: bool, name: &str| {
            if enabled {
                defines.set(name, "");
            }
        };

        flag(features.contains(ProgramFeatures::INSTANCING), "USE_INSTANCING");
        flag(features.contains(ProgramFeatures::INSTANCING_COLOR), "USE_INSTANCING_COLOR");
        flag(features.contains(ProgramFeatures::VERTEX_TANGENTS), "USE_TANGENT");
        flag(features.contains(ProgramFeatures::VERTEX_COLORS), "USE_COLOR");
        flag(features.contains(ProgramFeatures::VERTEX_ALPHAS), "USE_COLOR_ALPHA");
        flag(features.contains(ProgramFeatures::FLAT_SHADING), "FLAT_SHADED");
        flag(features.contains(ProgramFeatures::DOUBLE_SIDED), "DOUBLE_SIDED");
        flag(features.contains(ProgramFeatures::FLIP_SIDED), "FLIP_SIDED");
        flag(features.contains(ProgramFeatures::LOGARITHMIC_DEPTH), "USE_LOGDEPTHBUF");
        flag(features.contains(ProgramFeatures::DITHERING), "DITHERING");
        flag(features.contains(ProgramFeatures::PREMULTIPLIED_ALPHA), "PREMULTIPLIED_ALPHA");
        flag(features.contains(ProgramFeatures::ALPHA_TEST), "USE_ALPHATEST");
        flag(features.contains(ProgramFeatures::CLUSTERED_LIGHTS), "USE_CLUSTERED_LIGHTS");
        flag(features.contains(ProgramFeatures::PHYSICALLY_CORRECT), "PHYSICALLY_CORRECT_LIGHTS");
        flag(features.contains(ProgramFeatures::MULTI_DRAW), "USE_MULTIDRAW");
        flag(self.fog.is_some(), "USE_FOG");
        flag(self.fog == Some(FogKind::Exp2), "FOG_EXP2");
        flag(self.pass.is_depth(), "DEPTH_PASS");
        flag(self.tone_mapping != ToneMapping::None, "TONE_MAPPING");

        for slot in MapSlot::ALL {
            if self.maps[slot.index()].is_some() {
                defines.set(slot.define(), "");
            }
        }
        if self.maps[MapSlot::NormalMap.index()].is_some() {
            let space = if features.contains(ProgramFeatures::OBJECT_SPACE_NORMAL_MAP) {
                "OBJECTSPACE_NORMALMAP"
            } else {
                "TANGENTSPACE_NORMALMAP"
            };
            defines.set(space, "");
        }
        for slot in MapSlot::ALL {
            if let Some(channel) = self.maps[slot.index()] {
                let attribute = if channel == 0 {
                    "uv".to_string()
                } else {
                    format!("uv{channel}")
                };
                defines.set(slot.uv_define(), &attribute);
            }
        }

        if let Some((kind, mode)) = self.env_map {
            defines.set("USE_ENVMAP", "");
            let kind_define = match kind {
                EnvMapKind::Cube => "ENVMAP_TYPE_CUBE",
                EnvMapKind::CubeUv { .. } => "ENVMAP_TYPE_CUBE_UV",
                EnvMapKind::Equirect => "ENVMAP_TYPE_EQUIREC",
            };
            defines.set(kind_define, "");
            if let EnvMapKind::CubeUv { height } = kind {
                defines.set("CUBEUV_MAX_MIP", &format!("{}.0", height.max(1).ilog2()));
            }
            let mode_define = match mode {
                EnvMapMode::Reflection => "ENVMAP_MODE_REFLECTION",
                EnvMapMode::Refraction => "ENVMAP_MODE_REFRACTION",
            };
            defines.set(mode_define, "");
        }

        if features.contains(ProgramFeatures::SKINNING) {
            defines.set("USE_SKINNING", "");
            if features.contains(ProgramFeatures::BONE_TEXTURE) {
                defines.set("BONE_TEXTURE", "");
            }
            defines.set("MAX_BONES", &self.max_bones.to_string());
        }
        if self.morph_targets > 0 {
            defines.set("USE_MORPHTARGETS", "");
            defines.set("MORPHTARGETS_COUNT", &self.morph_targets.to_string());
            if features.contains(ProgramFeatures::MORPH_NORMALS) {
                defines.set("USE_MORPHNORMALS", "");
            }
        }

        if let Some(kind) = self.shadow_map {
            defines.set("USE_SHADOWMAP", "");
            defines.set(kind.define(), "");
        }
        if features.contains(ProgramFeatures::RECEIVE_SHADOW) {
            defines.set("RECEIVE_SHADOW", "");
        }

        if let PassKind::Depth(packing) = self.pass {
            defines.set("DEPTH_PACKING", &(packing as u32).to_string());
        }

        defines
    }
}

/// Computes feature vectors from session-stable capabilities and settings.
#[derive(Debug, Clone)]
pub struct ParameterHasher {
    capabilities: Capabilities,
    precision: Precision,
    dialect: ShaderDialect,
    logarithmic_depth: bool,
}

impl ParameterHasher {
    /// `settings.precision` is expected to be clamped already.
    #[must_use]
    pub fn new(capabilities: Capabilities, settings: &RendererSettings) -> Self {
        Self {
            precision: capabilities.clamp_precision(settings.precision),
            logarithmic_depth: settings.logarithmic_depth_buffer,
            dialect: settings.dialect,
            capabilities,
        }
    }

    #[must_use]
    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    #[must_use]
    pub fn precision(&self) -> Precision {
        self.precision
    }

    #[must_use]
    pub fn dialect(&self) -> ShaderDialect {
        self.dialect
    }

    /// Builds the feature vector of one draw.
    ///
    /// Deterministic in its inputs; `warnings` only receives one-time clamp
    /// notices (bone count, draw buffers).
    pub fn compute(
        &self,
        material: &Material,
        object: &RenderObject,
        geometry: &Geometry,
        state: &RenderState,
        warnings: &mut WarnOnce,
    ) -> ProgramParameters {
        let caps = &self.capabilities;
        let mut features = ProgramFeatures::empty();

        let source = match &material.shader {
            ShaderKind::Custom(custom) | ShaderKind::Raw(custom) => ShaderSourceId::Custom {
                vertex: xxh3_128(custom.vertex.as_bytes()),
                fragment: xxh3_128(custom.fragment.as_bytes()),
            },
            builtin => ShaderSourceId::Template(builtin.template().unwrap_or("meshbasic")),
        };
        features.set(ProgramFeatures::RAW_SHADER, material.shader.is_raw());

        // --- Maps ---
        let mut maps = [None; MapSlot::COUNT];
        for (slot, texture) in material.maps() {
            maps[slot.index()] = Some(texture.channel);
        }
        let encoding_of = |slot: MapSlot| {
            material
                .map(slot)
                .map_or(ColorEncoding::Linear, |m| m.texture.encoding)
        };
        let env_map = effective_env_map(material, state);

        // --- Lights ---
        let lit = material.uses_lights();
        let lights = if lit {
            state.lights.counts
        } else {
            LightCounts::default()
        };
        let shadow_lights =
            lights.directional_shadow + lights.point_shadow + lights.spot_shadow;
        let shadow_map = (lit && state.shadow_map.enabled && shadow_lights > 0)
            .then_some(state.shadow_map.kind);
        features.set(
            ProgramFeatures::RECEIVE_SHADOW,
            shadow_map.is_some() && object.receive_shadow,
        );
        features.set(ProgramFeatures::CLUSTERED_LIGHTS, lit && state.lights.clustered);
        features.set(
            ProgramFeatures::PHYSICALLY_CORRECT,
            lit && state.physically_correct_lights,
        );

        // --- Skinning ---
        let max_bones = match object.skeleton {
            Some(skeleton) => {
                features.insert(ProgramFeatures::SKINNING);
                if caps.bone_textures() {
                    features.insert(ProgramFeatures::BONE_TEXTURE);
                    1024
                } else {
                    let max = caps.max_uniform_bones();
                    if skeleton.bone_count > max {
                        warnings.warn("max_bones", || {
                            format!(
                                "Skeleton has {} bones, but this device supports {max}; clamping.",
                                skeleton.bone_count
                            )
                        });
                    }
                    skeleton.bone_count.min(max)
                }
            }
            None => 0,
        };

        // --- Geometry streams ---
        features.set(ProgramFeatures::MORPH_NORMALS, geometry.morph_targets > 0 && geometry.morph_normals);
        features.set(
            ProgramFeatures::VERTEX_TANGENTS,
            geometry.has_attribute("tangent") && material.map(MapSlot::NormalMap).is_some(),
        );
        features.set(ProgramFeatures::VERTEX_COLORS, material.vertex_colors);
        features.set(
            ProgramFeatures::VERTEX_ALPHAS,
            material.vertex_colors
                && geometry
                    .attribute("color")
                    .is_some_and(|color| color.components == 4),
        );

        // --- Object ---
        if let Some(instancing) = object.instancing {
            features.insert(ProgramFeatures::INSTANCING);
            features.set(ProgramFeatures::INSTANCING_COLOR, instancing.color);
        }
        features.set(ProgramFeatures::MULTI_DRAW, object.multi_draw.is_some());

        // --- Material flags ---
        features.set(ProgramFeatures::DOUBLE_SIDED, material.side == Side::Double);
        features.set(ProgramFeatures::FLIP_SIDED, material.side == Side::Back);
        features.set(ProgramFeatures::FLAT_SHADING, material.flat_shading);
        features.set(ProgramFeatures::LOGARITHMIC_DEPTH, self.logarithmic_depth);
        features.set(ProgramFeatures::DITHERING, material.dithering);
        features.set(ProgramFeatures::PREMULTIPLIED_ALPHA, material.premultiplied_alpha);
        features.set(ProgramFeatures::ALPHA_TEST, material.uniforms().alpha_test > 0.0);
        features.set(
            ProgramFeatures::OBJECT_SPACE_NORMAL_MAP,
            material.normal_map_object_space,
        );

        // --- Output ---
        let requested_buffers = state.draw_buffers();
        let draw_buffers = requested_buffers.min(caps.max_draw_buffers.max(1));
        if draw_buffers < requested_buffers {
            warnings.warn("max_draw_buffers", || {
                format!(
                    "Render target uses {requested_buffers} color outputs, device supports {draw_buffers}; clamping."
                )
            });
        }

        ProgramParameters {
            source,
            shader_name: material.shader.shader_name().to_string(),
            dialect: self.dialect,
            precision: self.precision,
            maps,
            map_encoding: encoding_of(MapSlot::Map),
            emissive_map_encoding: encoding_of(MapSlot::EmissiveMap),
            light_map_encoding: encoding_of(MapSlot::LightMap),
            env_map: env_map.map(|env| (env.kind, env.mode)),
            env_map_encoding: env_map.map_or(ColorEncoding::Linear, |env| env.texture.encoding),
            output_encoding: state.effective_output_encoding(),
            lights,
            shadow_map,
            clipping_planes: state.clipping.count(),
            clipping_intersection: state.clipping.intersection.min(state.clipping.count()),
            fog: if material.fog {
                state.fog.map(|fog| fog.kind)
            } else {
                None
            },
            max_bones,
            morph_targets: geometry.morph_targets,
            tone_mapping: state.effective_tone_mapping(),
            pass: state.pass,
            draw_buffers,
            features,
            defines: material.defines.clone(),
            custom_cache_key: material.custom_program_cache_key.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::render_state::{DepthPacking, Fog};
    use crate::resources::{CustomShader, Texture, TextureHandle, TextureSlot};
    use glam::Vec4;

    fn hasher() -> ParameterHasher {
        ParameterHasher::new(Capabilities::default(), &RendererSettings::default())
    }

    fn compute(material: &Material, state: &RenderState) -> ProgramParameters {
        let object = RenderObject::mesh();
        let geometry = Geometry::with_vertices(3);
        hasher().compute(material, &object, &geometry, state, &mut WarnOnce::new())
    }

    #[test]
    fn test_key_is_deterministic() {
        let material = Material::standard();
        let state = RenderState::default();
        assert_eq!(compute(&material, &state).cache_key(), compute(&material, &state).cache_key());
    }

    #[test]
    fn test_define_order_does_not_change_key() {
        let mut a = Material::basic();
        a.defines.set("A", "1");
        a.defines.set("B", "2");
        let mut b = Material::basic();
        b.defines.set("B", "2");
        b.defines.set("A", "1");

        let state = RenderState::default();
        assert_eq!(compute(&a, &state).cache_key(), compute(&b, &state).cache_key());
    }

    #[test]
    fn test_uniform_value_does_not_change_key() {
        let mut material = Material::phong();
        let state = RenderState::default();
        let before = compute(&material, &state).cache_key();

        material.set_color(Vec4::new(0.2, 0.4, 0.6, 1.0));
        material.uniforms_mut().roughness = 0.3;

        assert_eq!(compute(&material, &state).cache_key(), before);
    }

    #[test]
    fn test_shader_affecting_inputs_change_key() {
        let material = Material::standard();
        let base = RenderState::default();
        let base_key = compute(&material, &base).cache_key();

        let fog = RenderState {
            fog: Some(Fog::exp2(Vec4::ONE, 0.1)),
            ..Default::default()
        };
        let depth = RenderState {
            pass: PassKind::Depth(DepthPacking::Rgba),
            ..Default::default()
        };
        let mut lit = RenderState::default();
        lit.lights.counts.point = 2;

        let keys = [
            compute(&material, &fog).cache_key(),
            compute(&material, &depth).cache_key(),
            compute(&material, &lit).cache_key(),
        ];
        for key in &keys {
            assert_ne!(key, &base_key);
        }
        assert_ne!(keys[0], keys[1]);
    }

    #[test]
    fn test_unlit_material_ignores_lights() {
        let material = Material::basic();
        let mut lit = RenderState::default();
        lit.lights.counts.directional = 3;
        assert_eq!(
            compute(&material, &lit).cache_key(),
            compute(&material, &RenderState::default()).cache_key()
        );
    }

    #[test]
    fn test_map_channel_in_key_and_defines() {
        let mut material = Material::basic();
        let texture = Texture::new(TextureHandle(1));
        material.set_map(MapSlot::Map, Some(TextureSlot::new(texture).with_channel(1)));

        let parameters = compute(&material, &RenderState::default());
        let defines = parameters.feature_defines();
        assert!(defines.contains("USE_MAP"));
        assert_eq!(defines.get("MAP_UV"), Some("uv1"));
    }

    #[test]
    fn test_custom_source_text_in_key() {
        let shader = |fragment: &str| {
            Material::new(ShaderKind::Custom(CustomShader {
                name: "Custom".to_string(),
                vertex: "void main() {}".to_string(),
                fragment: fragment.to_string(),
            }))
        };
        let state = RenderState::default();
        let a = compute(&shader("void main() { gl_FragColor = vec4(1.0); }"), &state);
        let b = compute(&shader("void main() { gl_FragColor = vec4(0.0); }"), &state);
        assert_ne!(a.cache_key(), b.cache_key());
    }

    #[test]
    fn test_bones_clamped_without_bone_textures() {
        let hasher = ParameterHasher::new(Capabilities::minimal(), &RendererSettings::default());
        let mut object = RenderObject::mesh();
        object.skeleton = Some(crate::resources::Skeleton { bone_count: 200 });
        let parameters = hasher.compute(
            &Material::basic(),
            &object,
            &Geometry::with_vertices(3),
            &RenderState::default(),
            &mut WarnOnce::new(),
        );
        assert_eq!(parameters.max_bones, Capabilities::minimal().max_uniform_bones());
        assert!(!parameters.features.contains(ProgramFeatures::BONE_TEXTURE));
        assert_eq!(parameters.precision, Precision::Medium);
    }
}
