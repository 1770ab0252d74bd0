//! Texture unit allocation.
//!
//! Units are handed out in order for every draw, starting from zero. Running
//! past the device limit warns once and keeps reusing the last unit, which
//! degrades the draw instead of failing it. Textures that are not uploaded yet
//! still take a unit but bind the empty texture.

use crate::renderer::driver::GpuDriver;
use crate::renderer::pipeline::parameters::effective_env_map;
use crate::renderer::render_state::RenderState;
use crate::renderer::state::StateSynchronizer;
use crate::resources::{Material, Texture};
use crate::utils::WarnOnce;

#[derive(Debug)]
pub struct TextureUnits {
    max_units: u32,
    next: u32,
}

impl TextureUnits {
    #[must_use]
    pub fn new(max_units: u32) -> Self {
        Self {
            max_units: max_units.max(1),
            next: 0,
        }
    }

    /// Starts allocation for a new draw.
    pub fn reset(&mut self) {
        self.next = 0;
    }

    /// Next free unit, clamped to the device limit.
    pub fn allocate(&mut self, warnings: &mut WarnOnce) -> u32 {
        let unit = self.next;
        self.next += 1;
        if unit >= self.max_units {
            let max = self.max_units;
            warnings.warn("texture_units", || {
                format!("Trying to use {} texture units while this device supports only {max}", unit + 1)
            });
            return max - 1;
        }
        unit
    }

    /// Units allocated since the last reset.
    #[must_use]
    pub fn used(&self) -> u32 {
        self.next
    }

    /// Binds the material maps, then the environment map, each on its own unit.
    pub fn bind_material<D: GpuDriver>(
        &mut self,
        state: &mut StateSynchronizer<D>,
        material: &Material,
        render_state: &RenderState,
        warnings: &mut WarnOnce,
    ) {
        self.reset();
        for (_, slot) in material.maps() {
            self.bind(state, slot.texture, warnings);
        }
        if let Some(env) = effective_env_map(material, render_state) {
            self.bind(state, env.texture, warnings);
        }
    }

    fn bind<D: GpuDriver>(&mut self, state: &mut StateSynchronizer<D>, texture: Texture, warnings: &mut WarnOnce) {
        let unit = self.allocate(warnings);
        let handle = texture.is_ready().then_some(texture.handle);
        state.bind_texture(unit, handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::driver::{DriverCall, HeadlessDriver};
    use crate::resources::{MapSlot, TextureHandle, TextureSlot};

    #[test]
    fn test_allocation_clamps_at_limit() {
        let mut units = TextureUnits::new(2);
        let mut warnings = WarnOnce::new();
        assert_eq!(units.allocate(&mut warnings), 0);
        assert_eq!(units.allocate(&mut warnings), 1);
        assert_eq!(units.allocate(&mut warnings), 1);
        assert!(!warnings.first("texture_units"));
    }

    #[test]
    fn test_unready_texture_binds_empty() {
        let mut material = Material::basic();
        material.set_map(MapSlot::Map, Some(TextureSlot::new(Texture::new(TextureHandle(5)))));
        material.set_map(
            MapSlot::AlphaMap,
            Some(TextureSlot::new(Texture::new(TextureHandle(6)).uploaded())),
        );

        let mut state = StateSynchronizer::new(HeadlessDriver::new(), 8);
        let mut units = TextureUnits::new(8);
        units.bind_material(&mut state, &material, &RenderState::default(), &mut WarnOnce::new());

        let binds: Vec<_> = state
            .driver()
            .calls()
            .iter()
            .filter_map(|call| match call {
                DriverCall::BindTexture(texture) => Some(*texture),
                _ => None,
            })
            .collect();
        assert_eq!(binds, vec![None, Some(TextureHandle(6))]);
        assert_eq!(units.used(), 2);
    }
}
