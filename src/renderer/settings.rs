//! Renderer Settings
//!
//! Session-level configuration of the variant cache and dispatcher.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use myth_variants::renderer::{RendererSettings, ShaderDialect};
//!
//! let settings = RendererSettings {
//!     dialect: ShaderDialect::Glsl100,
//!     max_material_programs: 8,
//!     ..Default::default()
//! };
//! ```
//!
//! Settings are `serde`-serializable so they can be loaded from the host
//! application's configuration file.

use serde::{Deserialize, Serialize};

use crate::errors::{Result, VariantError};

/// Target shading-language dialect of the generated source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ShaderDialect {
    /// GLSL ES 1.00; extensions are enabled through `#extension` pragmas.
    Glsl100,
    /// GLSL ES 3.00; legacy entry points are aliased to their modern names.
    #[default]
    Glsl300Es,
}

impl ShaderDialect {
    #[must_use]
    pub const fn code(self) -> u32 {
        match self {
            Self::Glsl100 => 100,
            Self::Glsl300Es => 300,
        }
    }
}

/// Float precision qualifier.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub enum Precision {
    Low,
    Medium,
    #[default]
    High,
}

impl Precision {
    #[must_use]
    pub const fn qualifier(self) -> &'static str {
        match self {
            Self::Low => "lowp",
            Self::Medium => "mediump",
            Self::High => "highp",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererSettings {
    /// Upper bound of distinct program variants remembered per material.
    pub max_material_programs: usize,
    /// Requested float precision; clamped to what the driver supports.
    pub precision: Precision,
    pub dialect: ShaderDialect,
    pub logarithmic_depth_buffer: bool,
    /// Reset [`RenderInfo`](super::info::RenderInfo) counters in `begin_render`.
    pub auto_reset_info: bool,
    /// Sort render lists in `RenderLists::finish`.
    pub sort_objects: bool,
    /// Poll program status and log compile failures with source context.
    pub check_shader_errors: bool,
    /// Log generated sources at debug level.
    pub debug_shader_source: bool,
}

impl Default for RendererSettings {
    fn default() -> Self {
        Self {
            max_material_programs: 4,
            precision: Precision::High,
            dialect: ShaderDialect::Glsl300Es,
            logarithmic_depth_buffer: false,
            auto_reset_info: true,
            sort_objects: true,
            check_shader_errors: true,
            debug_shader_source: false,
        }
    }
}

impl RendererSettings {
    /// Validates invariants that cannot be expressed in the type.
    pub fn validate(&self) -> Result<()> {
        if self.max_material_programs == 0 {
            return Err(VariantError::InvalidSettings(
                "max_material_programs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings_are_valid() {
        assert!(RendererSettings::default().validate().is_ok());
    }

    #[test]
    fn test_zero_program_slots_rejected() {
        let settings = RendererSettings {
            max_material_programs: 0,
            ..Default::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(VariantError::InvalidSettings(_))
        ));
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let settings: RendererSettings =
            serde_json::from_str(r#"{ "max_material_programs": 2, "precision": "Medium" }"#)
                .unwrap();
        assert_eq!(settings.max_material_programs, 2);
        assert_eq!(settings.precision, Precision::Medium);
        assert_eq!(settings.dialect, ShaderDialect::Glsl300Es);
        assert!(settings.sort_objects);

        let json = serde_json::to_string(&settings).unwrap();
        let back: RendererSettings = serde_json::from_str(&json).unwrap();
        assert_eq!(back, settings);
    }

    #[test]
    fn test_precision_ordering() {
        assert!(Precision::Low < Precision::Medium);
        assert!(Precision::Medium < Precision::High);
    }
}
