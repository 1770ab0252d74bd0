//! Shader Chunk Library
//!
//! GLSL chunks and program templates embedded at build time with
//! `rust-embed`. Layout of `src/renderer/pipeline/shaders`:
//!
//! ```text
//! chunks/<name>.glsl        resolvable through `#include <name>`
//! templates/<name>.vert     program templates (vertex)
//! templates/<name>.frag     program templates (fragment)
//! ```
//!
//! Applications may register additional chunks or override built-in ones with
//! [`ChunkLibrary::insert`]; overrides take precedence over embedded files.

use std::borrow::Cow;

use rust_embed::RustEmbed;
use rustc_hash::FxHashMap;

use crate::errors::{Result, VariantError};

#[derive(RustEmbed)]
#[folder = "src/renderer/pipeline/shaders"]
struct ShaderAssets;

/// Program stage of a template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Vertex => "vert",
            Self::Fragment => "frag",
        }
    }
}

fn embedded(path: &str) -> Option<Cow<'static, str>> {
    let file = ShaderAssets::get(path)?;
    match file.data {
        Cow::Borrowed(bytes) => std::str::from_utf8(bytes).ok().map(Cow::Borrowed),
        Cow::Owned(bytes) => String::from_utf8(bytes).ok().map(Cow::Owned),
    }
}

/// Registry of includable chunks and program templates.
#[derive(Debug, Clone, Default)]
pub struct ChunkLibrary {
    use_embedded: bool,
    overrides: FxHashMap<String, String>,
}

impl ChunkLibrary {
    /// Library backed by the embedded chunk files.
    #[must_use]
    pub fn embedded() -> Self {
        Self {
            use_embedded: true,
            overrides: FxHashMap::default(),
        }
    }

    /// Library containing only explicitly inserted chunks.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registers or overrides a chunk.
    pub fn insert(&mut self, name: impl Into<String>, source: impl Into<String>) {
        self.overrides.insert(name.into(), source.into());
    }

    #[must_use]
    pub fn with_chunk(mut self, name: impl Into<String>, source: impl Into<String>) -> Self {
        self.insert(name, source);
        self
    }

    /// Looks up a chunk by include name.
    #[must_use]
    pub fn chunk(&self, name: &str) -> Option<Cow<'_, str>> {
        if let Some(source) = self.overrides.get(name) {
            return Some(Cow::Borrowed(source.as_str()));
        }
        if self.use_embedded {
            return embedded(&format!("chunks/{name}.glsl"));
        }
        None
    }

    /// Loads a program template. Overrides are looked up as `<name>.<stage>`.
    pub fn template(&self, name: &str, stage: ShaderStage) -> Result<Cow<'_, str>> {
        let file = format!("{name}.{}", stage.extension());
        if let Some(source) = self.overrides.get(&file) {
            return Ok(Cow::Borrowed(source.as_str()));
        }
        if self.use_embedded
            && let Some(source) = embedded(&format!("templates/{file}"))
        {
            return Ok(source);
        }
        Err(VariantError::TemplateNotFound(file))
    }

    /// Names of all embedded chunks.
    pub fn embedded_chunk_names() -> impl Iterator<Item = String> {
        ShaderAssets::iter().filter_map(|path| {
            path.strip_prefix("chunks/")
                .and_then(|name| name.strip_suffix(".glsl"))
                .map(str::to_string)
        })
    }

    /// Names of all embedded templates (without stage extension, deduplicated).
    pub fn embedded_template_names() -> Vec<String> {
        let mut names: Vec<String> = ShaderAssets::iter()
            .filter_map(|path| {
                let file = path.strip_prefix("templates/")?;
                let (name, _) = file.rsplit_once('.')?;
                Some(name.to_string())
            })
            .collect();
        names.sort();
        names.dedup();
        names
    }
}
