//! Shader Assembler
//!
//! Expands a program template into final GLSL as a pure text pipeline of
//! independent passes, applied in this order:
//!
//! 1. [`resolve_includes`]: recursive `#include <name>` expansion with cycle
//!    detection. Unknown names and cycles are errors.
//! 2. [`substitute_counts`]: replaces light, shadow and clipping-plane count
//!    identifiers (`NUM_DIR_LIGHTS`, `UNION_CLIPPING_PLANES`, ...) with integer
//!    literals.
//! 3. [`unroll_loops`]: unrolls `for` loops between `#pragma unroll_loop_start`
//!    and `#pragma unroll_loop_end` whose bounds are integer literals.
//! 4. Prefix injection: version line, extension pragmas, precision, the
//!    `SHADER_NAME` marker, feature and material defines, built-in
//!    declarations and, for GLSL ES 3.00, aliasing of legacy entry points.
//!
//! Raw shaders go through passes 1–3 and only receive the version line.
//! Assembling the same inputs twice yields byte-identical output.

use std::borrow::Cow;

use rustc_hash::FxHashMap;

use crate::errors::{Result, VariantError};
use crate::renderer::capabilities::Capabilities;
use crate::renderer::pipeline::chunks::{ChunkLibrary, ShaderStage};
use crate::renderer::pipeline::parameters::{ProgramFeatures, ProgramParameters};
use crate::renderer::render_state::ToneMapping;
use crate::renderer::settings::ShaderDialect;
use crate::resources::{ColorEncoding, CustomShader, MapSlot, ShaderDefines};

/// Generated program sources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledProgram {
    pub vertex: String,
    pub fragment: String,
}

// ============================================================================
// Pass 1: Includes
// ============================================================================

fn parse_include(line: &str) -> Option<std::result::Result<&str, ()>> {
    let rest = line.trim_start().strip_prefix("#include")?;
    let rest = rest.trim();
    let name = rest
        .strip_prefix('<')
        .and_then(|r| r.strip_suffix('>'))
        .map(str::trim)
        .filter(|name| !name.is_empty() && !name.contains(char::is_whitespace));
    Some(name.ok_or(()))
}

struct IncludeResolver<'a> {
    library: &'a ChunkLibrary,
    resolved: FxHashMap<String, String>,
    stack: Vec<String>,
}

impl IncludeResolver<'_> {
    fn expand(&mut self, source: &str, parent: &str) -> Result<String> {
        let mut out = String::with_capacity(source.len());
        for line in source.lines() {
            match parse_include(line) {
                None => {
                    out.push_str(line);
                    out.push('\n');
                }
                Some(Err(())) => {
                    return Err(VariantError::MalformedInclude {
                        line: line.trim().to_string(),
                    });
                }
                Some(Ok(name)) => {
                    let chunk = self.chunk(name, parent)?;
                    out.push_str(&chunk);
                }
            }
        }
        Ok(out)
    }

    fn chunk(&mut self, name: &str, parent: &str) -> Result<String> {
        if let Some(done) = self.resolved.get(name) {
            return Ok(done.clone());
        }
        if self.stack.iter().any(|open| open == name) {
            let mut chain = self.stack.clone();
            chain.push(name.to_string());
            return Err(VariantError::IncludeCycle { chain });
        }
        let source = self
            .library
            .chunk(name)
            .ok_or_else(|| VariantError::UnresolvedInclude {
                name: name.to_string(),
                parent: parent.to_string(),
            })?
            .into_owned();

        self.stack.push(name.to_string());
        let expanded = self.expand(&source, name);
        self.stack.pop();

        let expanded = expanded?;
        self.resolved.insert(name.to_string(), expanded.clone());
        Ok(expanded)
    }
}

/// Recursively expands `#include <name>` directives.
///
/// `source_name` names the root source in error messages.
pub fn resolve_includes(source: &str, source_name: &str, library: &ChunkLibrary) -> Result<String> {
    let mut resolver = IncludeResolver {
        library,
        resolved: FxHashMap::default(),
        stack: vec![source_name.to_string()],
    };
    resolver.expand(source, source_name)
}

// ============================================================================
// Pass 2: Count Substitution
// ============================================================================

fn is_identifier_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Replaces whole identifiers according to `table`; other text is untouched.
#[must_use]
pub fn replace_identifiers(source: &str, table: &[(&str, String)]) -> String {
    let mut out = String::with_capacity(source.len());
    let mut rest = source;
    while let Some(start) = rest.find(|c: char| c.is_ascii_alphabetic() || c == '_') {
        // Digits directly before the token belong to a number literal.
        let preceded_by_digit = rest[..start]
            .chars()
            .next_back()
            .is_some_and(|c| c.is_ascii_digit());
        out.push_str(&rest[..start]);
        rest = &rest[start..];
        let end = rest.find(|c: char| !is_identifier_char(c)).unwrap_or(rest.len());
        let token = &rest[..end];
        match table.iter().find(|(name, _)| *name == token) {
            Some((_, replacement)) if !preceded_by_digit => out.push_str(replacement),
            _ => out.push_str(token),
        }
        rest = &rest[end..];
    }
    out.push_str(rest);
    out
}

/// Substitutes light, shadow and clipping-plane count placeholders.
#[must_use]
pub fn substitute_counts(source: &str, parameters: &ProgramParameters) -> String {
    let lights = &parameters.lights;
    let table = [
        ("NUM_DIR_LIGHTS", lights.directional.to_string()),
        ("NUM_SPOT_LIGHTS", lights.spot.to_string()),
        ("NUM_RECT_AREA_LIGHTS", lights.rect_area.to_string()),
        ("NUM_POINT_LIGHTS", lights.point.to_string()),
        ("NUM_HEMI_LIGHTS", lights.hemisphere.to_string()),
        ("NUM_DIR_LIGHT_SHADOWS", lights.directional_shadow.to_string()),
        ("NUM_SPOT_LIGHT_SHADOWS", lights.spot_shadow.to_string()),
        ("NUM_POINT_LIGHT_SHADOWS", lights.point_shadow.to_string()),
        ("NUM_CLIPPING_PLANES", parameters.clipping_planes.to_string()),
        (
            "UNION_CLIPPING_PLANES",
            parameters
                .clipping_planes
                .saturating_sub(parameters.clipping_intersection)
                .to_string(),
        ),
    ];
    replace_identifiers(source, &table)
}

// ============================================================================
// Pass 3: Loop Unrolling
// ============================================================================

const UNROLL_START: &str = "#pragma unroll_loop_start";
const UNROLL_END: &str = "#pragma unroll_loop_end";

/// Loops with more iterations stay as real loops.
pub const MAX_UNROLL_ITERATIONS: i64 = 256;

/// Why an unroll block was left as written.
enum UnrollSkip {
    Malformed,
    TooLong(i64),
}

struct LoopHeader<'a> {
    variable: &'a str,
    start: i64,
    end: i64,
}

/// Parses `int i = 0; i < 4; i ++`.
fn parse_loop_header(header: &str) -> Option<LoopHeader<'_>> {
    let mut parts = header.split(';');
    let init = parts.next()?.trim().strip_prefix("int")?;
    let condition = parts.next()?.trim();
    let step = parts.next()?.trim();
    if parts.next().is_some() {
        return None;
    }

    let (variable, start) = init.split_once('=')?;
    let variable = variable.trim();
    let start = start.trim().parse().ok()?;

    let (left, end) = condition.split_once('<')?;
    if left.trim() != variable {
        return None;
    }
    let end = end.trim().parse().ok()?;

    let step: String = step.chars().filter(|c| !c.is_whitespace()).collect();
    if step != format!("{variable}++") && step != format!("++{variable}") {
        return None;
    }
    Some(LoopHeader {
        variable,
        start,
        end,
    })
}

/// Returns the index one past the brace matching the `{` at `open`.
fn matching_brace(text: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (i, c) in text[open..].char_indices() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(open + i + 1);
                }
            }
            _ => {}
        }
    }
    None
}

/// Splits an unroll block into its loop header and body.
fn split_loop(block: &str) -> Option<(LoopHeader<'_>, &str)> {
    let block = block.trim();
    let after_for = block.strip_prefix("for")?.trim_start();
    let header_body = after_for.strip_prefix('(')?;
    let header_end = header_body.find(')')?;
    let header = parse_loop_header(&header_body[..header_end])?;

    let rest = &header_body[header_end + 1..];
    let open = rest.find('{')?;
    if !rest[..open].trim().is_empty() {
        return None;
    }
    let close = matching_brace(rest, open)?;
    if !rest[close..].trim().is_empty() {
        return None;
    }
    Some((header, &rest[open + 1..close - 1]))
}

/// Expands one unroll block.
fn unroll_block(block: &str) -> std::result::Result<String, UnrollSkip> {
    let (header, body) = split_loop(block).ok_or(UnrollSkip::Malformed)?;
    let iterations = header.end.saturating_sub(header.start);
    if iterations > MAX_UNROLL_ITERATIONS {
        return Err(UnrollSkip::TooLong(iterations));
    }

    let mut out = String::new();
    for index in header.start..header.end {
        let literal = index.to_string();
        let table = [
            (header.variable, literal.clone()),
            ("UNROLLED_LOOP_INDEX", literal),
        ];
        out.push('{');
        out.push_str(&replace_identifiers(body, &table));
        out.push_str("}\n");
    }
    Ok(out)
}

/// Unrolls `#pragma unroll_loop_start` / `#pragma unroll_loop_end` blocks.
///
/// Blocks whose loop bounds are not integer literals, or that run more than
/// [`MAX_UNROLL_ITERATIONS`] times, are left unchanged.
#[must_use]
pub fn unroll_loops(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    let mut rest = source;
    while let Some(start) = rest.find(UNROLL_START) {
        out.push_str(&rest[..start]);
        let after = &rest[start + UNROLL_START.len()..];
        let Some(end) = after.find(UNROLL_END) else {
            out.push_str(&rest[start..]);
            return out;
        };
        let block = &after[..end];
        match unroll_block(block) {
            Ok(unrolled) => out.push_str(&unrolled),
            Err(skip) => {
                match skip {
                    UnrollSkip::Malformed => {
                        log::debug!("Loop in unroll block has non-literal bounds; left as is");
                    }
                    UnrollSkip::TooLong(iterations) => log::warn!(
                        "Unroll block runs {iterations} iterations (limit {MAX_UNROLL_ITERATIONS}); left as a loop"
                    ),
                }
                out.push_str(&rest[start..start + UNROLL_START.len() + end + UNROLL_END.len()]);
            }
        }
        rest = &after[end + UNROLL_END.len()..];
    }
    out.push_str(rest);
    out
}

// ============================================================================
// Pass 4: Prefix
// ============================================================================

fn encoding_function(name: &str, encoding: ColorEncoding, to_linear: bool) -> String {
    let body = match (encoding, to_linear) {
        (ColorEncoding::Linear, _) => "value".to_string(),
        (other, true) => format!("{}ToLinear( value )", other.glsl_suffix()),
        (other, false) => format!("LinearTo{}( value )", other.glsl_suffix()),
    };
    format!("vec4 {name}( vec4 value ) {{ return {body}; }}\n")
}

fn tone_mapping_function(tone_mapping: ToneMapping) -> String {
    match tone_mapping {
        ToneMapping::None => String::new(),
        other => format!(
            "vec3 toneMapping( vec3 color ) {{ return {}( color ); }}\n",
            other.function_name()
        ),
    }
}

const VERTEX_ALIASES_300: &str = "#define attribute in\n#define varying out\n#define texture2D texture\n";

const FRAGMENT_ALIASES_300: &str = "\
#define varying in
#define gl_FragDepthEXT gl_FragDepth
#define texture2D texture
#define textureCube texture
#define texture2DProj textureProj
#define texture2DLodEXT textureLod
#define texture2DProjLodEXT textureProjLod
#define textureCubeLodEXT textureLod
#define texture2DGradEXT textureGrad
#define texture2DProjGradEXT textureProjGrad
#define textureCubeGradEXT textureGrad
";

const VERTEX_BUILTINS: &str = "\
uniform mat4 modelMatrix;
uniform mat4 modelViewMatrix;
uniform mat4 projectionMatrix;
uniform mat4 viewMatrix;
uniform mat3 normalMatrix;
uniform vec3 cameraPosition;
attribute vec3 position;
attribute vec3 normal;
attribute vec2 uv;
";

const FRAGMENT_BUILTINS: &str = "\
uniform mat4 viewMatrix;
uniform vec3 cameraPosition;
";

/// Rewrites `gl_FragData[N]` to the synthesized `pc_fragDataN` outputs.
fn rewrite_frag_data(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    let mut rest = source;
    while let Some(start) = rest.find("gl_FragData") {
        out.push_str(&rest[..start]);
        let after = &rest[start + "gl_FragData".len()..];
        let parsed = after.trim_start().strip_prefix('[').and_then(|inner| {
            let close = inner.find(']')?;
            let index: u32 = inner[..close].trim().parse().ok()?;
            Some((index, &inner[close + 1..]))
        });
        match parsed {
            Some((index, remaining)) => {
                out.push_str(&format!("pc_fragData{index}"));
                rest = remaining;
            }
            None => {
                out.push_str("gl_FragData");
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

// ============================================================================
// Assembler
// ============================================================================

/// Where the template text of a program comes from.
#[derive(Debug, Clone, Copy)]
pub enum TemplateSource<'a> {
    Builtin(&'static str),
    Custom(&'a CustomShader),
}

/// Turns templates plus a feature vector into program sources.
#[derive(Debug, Clone)]
pub struct ShaderAssembler {
    library: ChunkLibrary,
    capabilities: Capabilities,
}

impl ShaderAssembler {
    #[must_use]
    pub fn new(library: ChunkLibrary, capabilities: Capabilities) -> Self {
        Self {
            library,
            capabilities,
        }
    }

    #[must_use]
    pub fn library(&self) -> &ChunkLibrary {
        &self.library
    }

    pub fn library_mut(&mut self) -> &mut ChunkLibrary {
        &mut self.library
    }

    /// Assembles both stages.
    pub fn assemble(
        &self,
        template: TemplateSource<'_>,
        parameters: &ProgramParameters,
        raw_defines: &ShaderDefines,
    ) -> Result<AssembledProgram> {
        let (vertex, fragment): (Cow<'_, str>, Cow<'_, str>) = match template {
            TemplateSource::Builtin(name) => (
                self.library.template(name, ShaderStage::Vertex)?,
                self.library.template(name, ShaderStage::Fragment)?,
            ),
            TemplateSource::Custom(custom) => (
                Cow::Borrowed(custom.vertex.as_str()),
                Cow::Borrowed(custom.fragment.as_str()),
            ),
        };
        let name = &parameters.shader_name;

        let vertex = self.expand_body(&vertex, &format!("{name}.vert"), parameters)?;
        let mut fragment = self.expand_body(&fragment, &format!("{name}.frag"), parameters)?;

        let dialect = parameters.dialect;
        if dialect == ShaderDialect::Glsl300Es && parameters.draw_buffers > 1 {
            fragment = rewrite_frag_data(&fragment);
        }

        if parameters.is_raw() {
            let version = match dialect {
                ShaderDialect::Glsl300Es => "#version 300 es\n",
                ShaderDialect::Glsl100 => "",
            };
            return Ok(AssembledProgram {
                vertex: format!("{version}{vertex}"),
                fragment: format!("{version}{fragment}"),
            });
        }

        let mut defines = parameters.feature_defines();
        defines.merge(raw_defines);

        Ok(AssembledProgram {
            vertex: format!(
                "{}{vertex}",
                self.vertex_prefix(parameters, &defines)
            ),
            fragment: format!(
                "{}{fragment}",
                self.fragment_prefix(parameters, &defines)?
            ),
        })
    }

    fn expand_body(&self, source: &str, source_name: &str, parameters: &ProgramParameters) -> Result<String> {
        let resolved = resolve_includes(source, source_name, &self.library)?;
        let counted = substitute_counts(&resolved, parameters);
        Ok(unroll_loops(&counted))
    }

    fn common_prefix(parameters: &ProgramParameters, defines: &ShaderDefines, out: &mut String) {
        let precision = parameters.precision.qualifier();
        out.push_str(&format!("precision {precision} float;\nprecision {precision} int;\n"));
        out.push_str(&format!("#define SHADER_NAME {}\n", parameters.shader_name));
        out.push_str(&defines.to_define_block());
    }

    fn vertex_prefix(&self, parameters: &ProgramParameters, defines: &ShaderDefines) -> String {
        let mut out = String::with_capacity(1024);
        if parameters.dialect == ShaderDialect::Glsl300Es {
            out.push_str("#version 300 es\n");
            out.push_str(VERTEX_ALIASES_300);
        }
        Self::common_prefix(parameters, defines, &mut out);
        if parameters.max_bones > 0 && !parameters.features.contains(ProgramFeatures::BONE_TEXTURE) {
            out.push_str("uniform mat4 boneMatrices[ MAX_BONES ];\n");
        }
        if self.capabilities.vertex_textures {
            out.push_str("#define VERTEX_TEXTURES\n");
        }
        out.push_str(VERTEX_BUILTINS);
        out
    }

    fn fragment_prefix(&self, parameters: &ProgramParameters, defines: &ShaderDefines) -> Result<String> {
        let caps = &self.capabilities;
        let mut out = String::with_capacity(2048);
        match parameters.dialect {
            ShaderDialect::Glsl300Es => {
                out.push_str("#version 300 es\n");
                out.push_str(FRAGMENT_ALIASES_300);
                if parameters.draw_buffers > 1 {
                    for location in 0..parameters.draw_buffers {
                        out.push_str(&format!(
                            "layout(location = {location}) out highp vec4 pc_fragData{location};\n"
                        ));
                    }
                } else {
                    out.push_str("layout(location = 0) out highp vec4 pc_fragColor;\n");
                    out.push_str("#define gl_FragColor pc_fragColor\n");
                }
            }
            ShaderDialect::Glsl100 => {
                let features = parameters.features;
                let maps = &parameters.maps;
                let derivatives = features.contains(ProgramFeatures::FLAT_SHADING)
                    || maps[MapSlot::NormalMap.index()].is_some()
                    || maps[MapSlot::BumpMap.index()].is_some()
                    || parameters.clipping_planes > 0;
                if derivatives && caps.standard_derivatives {
                    out.push_str("#extension GL_OES_standard_derivatives : enable\n");
                }
                if features.contains(ProgramFeatures::LOGARITHMIC_DEPTH) && caps.frag_depth {
                    out.push_str("#extension GL_EXT_frag_depth : enable\n");
                }
                if parameters.draw_buffers > 1 {
                    out.push_str("#extension GL_EXT_draw_buffers : require\n");
                }
                if parameters.env_map.is_some() && caps.shader_texture_lod {
                    out.push_str("#extension GL_EXT_shader_texture_lod : enable\n");
                }
            }
        }

        Self::common_prefix(parameters, defines, &mut out);
        if parameters.dialect == ShaderDialect::Glsl100
            && parameters.features.contains(ProgramFeatures::LOGARITHMIC_DEPTH)
            && caps.frag_depth
        {
            out.push_str("#define USE_LOGDEPTHBUF_EXT\n");
        }
        out.push_str(FRAGMENT_BUILTINS);

        if parameters.tone_mapping != ToneMapping::None {
            out.push_str(&resolve_includes(
                "#include <tonemapping_pars_fragment>",
                "fragment prefix",
                &self.library,
            )?);
            out.push_str(&tone_mapping_function(parameters.tone_mapping));
        }
        out.push_str(&resolve_includes(
            "#include <encodings_pars_fragment>",
            "fragment prefix",
            &self.library,
        )?);
        out.push_str(&encoding_function("mapTexelToLinear", parameters.map_encoding, true));
        out.push_str(&encoding_function("emissiveMapTexelToLinear", parameters.emissive_map_encoding, true));
        out.push_str(&encoding_function("lightMapTexelToLinear", parameters.light_map_encoding, true));
        out.push_str(&encoding_function("envMapTexelToLinear", parameters.env_map_encoding, true));
        out.push_str(&encoding_function("linearToOutputTexel", parameters.output_encoding, false));
        Ok(out)
    }
}
