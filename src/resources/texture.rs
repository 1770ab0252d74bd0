//! Texture references as seen by the program-variant pipeline.
//!
//! Texture upload lives outside this crate; materials only carry a driver
//! handle, the color encoding of the data and an upload version. A version of
//! `0` means "not uploaded yet": such textures are still allocated a unit but
//! the empty texture is bound in their place.

use serde::{Deserialize, Serialize};

/// Driver-side texture name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureHandle(pub u64);

/// Color encoding of texel data or of the output target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ColorEncoding {
    #[default]
    Linear,
    Srgb,
    Rgbe,
    LogLuv,
}

impl ColorEncoding {
    /// Stable integer used in program cache keys.
    #[must_use]
    pub const fn code(self) -> u32 {
        match self {
            Self::Linear => 0,
            Self::Srgb => 1,
            Self::Rgbe => 2,
            Self::LogLuv => 3,
        }
    }

    /// Name of the GLSL decode function emitted for this encoding.
    #[must_use]
    pub const fn glsl_suffix(self) -> &'static str {
        match self {
            Self::Linear => "Linear",
            Self::Srgb => "sRGB",
            Self::Rgbe => "RGBE",
            Self::LogLuv => "LogLuv",
        }
    }
}

/// Sampling layout of an environment map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnvMapKind {
    Cube,
    /// Pre-filtered cube-UV atlas with the given texel height.
    CubeUv { height: u32 },
    Equirect,
}

/// How the environment map is sampled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum EnvMapMode {
    #[default]
    Reflection,
    Refraction,
}

/// Copyable texture reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Texture {
    pub handle: TextureHandle,
    pub encoding: ColorEncoding,
    /// Upload version reported by the texture collaborator.
    pub version: u64,
}

impl Texture {
    #[must_use]
    pub fn new(handle: TextureHandle) -> Self {
        Self {
            handle,
            encoding: ColorEncoding::Linear,
            version: 0,
        }
    }

    #[must_use]
    pub fn with_encoding(mut self, encoding: ColorEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Marks the texture as uploaded once (convenience for tests and demos).
    #[must_use]
    pub fn uploaded(mut self) -> Self {
        self.version = self.version.max(1);
        self
    }

    /// Whether texel data is available on the GPU.
    #[inline]
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.version > 0
    }
}

/// A texture bound to a material map slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureSlot {
    pub texture: Texture,
    /// UV set used to sample the map.
    pub channel: u8,
}

impl TextureSlot {
    #[must_use]
    pub fn new(texture: Texture) -> Self {
        Self {
            texture,
            channel: 0,
        }
    }

    #[must_use]
    pub fn with_channel(mut self, channel: u8) -> Self {
        self.channel = channel;
        self
    }
}

/// Environment map reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EnvMap {
    pub texture: Texture,
    pub kind: EnvMapKind,
    pub mode: EnvMapMode,
}

impl EnvMap {
    #[must_use]
    pub fn cube(texture: Texture) -> Self {
        Self {
            texture,
            kind: EnvMapKind::Cube,
            mode: EnvMapMode::Reflection,
        }
    }
}
