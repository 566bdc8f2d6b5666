// RustPixel
// copyright zipxing@hotmail.com 2022～2025

//! Texture and sampler slots of one shader stage.
//!
//! Slots are tracked with a dirty bitmask and pushed lazily by the draw that
//! follows a change.

use crate::backend::GraphicsBackend;
use crate::error::{GfxError, GfxResult};
use crate::graphics::capabilities::MAX_TEXTURE_SLOTS;
use crate::graphics::resource::{ResourceId, Texture};
use crate::graphics::state::{BuiltinSampler, BuiltinStates, DeviceId, DeviceState, SamplerState};
use crate::graphics::types::ShaderStage;
use std::sync::Arc;

fn slot_mask(count: usize) -> u32 {
    if count >= 32 {
        u32::MAX
    } else {
        (1u32 << count) - 1
    }
}

pub struct TextureCollection {
    stage: ShaderStage,
    textures: Vec<Option<Arc<Texture>>>,
    dirty: u32,
}

impl TextureCollection {
    pub fn new(stage: ShaderStage, capacity: usize) -> Self {
        let capacity = capacity.min(MAX_TEXTURE_SLOTS);
        Self {
            stage,
            textures: vec![None; capacity],
            dirty: slot_mask(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.textures.len()
    }

    pub fn get(&self, slot: usize) -> Option<&Arc<Texture>> {
        self.textures.get(slot).and_then(|t| t.as_ref())
    }

    pub fn set(&mut self, slot: usize, texture: Option<Arc<Texture>>) -> GfxResult<()> {
        let capacity = self.textures.len();
        let current = self.textures.get_mut(slot).ok_or_else(|| {
            GfxError::out_of_range(
                "slot",
                format!("{:?} texture slot {} of {}", self.stage, slot, capacity),
            )
        })?;
        if let Some(t) = &texture {
            if t.is_disposed() {
                return Err(GfxError::invalid(format!("texture {:?} is disposed", t.id())));
            }
        }
        let same = match (&*current, &texture) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        };
        if !same {
            *current = texture;
            self.dirty |= 1 << slot;
        }
        Ok(())
    }

    pub fn mark_all_dirty(&mut self) {
        self.dirty = slot_mask(self.textures.len());
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty != 0
    }

    /// Unbind `texture` from every slot holding it.
    pub fn remove(&mut self, texture: ResourceId) {
        for (i, t) in self.textures.iter_mut().enumerate() {
            if t.as_ref().is_some_and(|t| t.id() == texture) {
                *t = None;
                self.dirty |= 1 << i;
            }
        }
    }

    /// Push dirty slots, returns how many textures were bound.
    pub fn apply(&mut self, backend: &mut dyn GraphicsBackend) -> usize {
        let mut bound = 0;
        let mut mask = self.dirty;
        while mask != 0 {
            let slot = mask.trailing_zeros() as usize;
            mask &= mask - 1;
            let texture = self.textures[slot].as_ref().map(|t| (t.handle(), t.kind()));
            backend.bind_texture(self.stage, slot as u32, texture);
            if texture.is_some() {
                bound += 1;
            }
        }
        self.dirty = 0;
        bound
    }

    pub(crate) fn reallocate(&mut self, capacity: usize) {
        *self = TextureCollection::new(self.stage, capacity);
    }
}

pub struct SamplerStateCollection {
    stage: ShaderStage,
    device: DeviceId,
    requested: Vec<Arc<SamplerState>>,
    actual: Vec<Arc<SamplerState>>,
    builtins: BuiltinStates<SamplerState, { BuiltinSampler::COUNT }>,
    dirty: u32,
}

impl SamplerStateCollection {
    pub fn new(stage: ShaderStage, device: DeviceId, capacity: usize) -> Self {
        let capacity = capacity.min(MAX_TEXTURE_SLOTS);
        let mut builtins = BuiltinStates::new();
        let requested = vec![SamplerState::linear_wrap(); capacity];
        let actual = requested.iter().map(|s| builtins.resolve(s)).collect();
        Self {
            stage,
            device,
            requested,
            actual,
            builtins,
            dirty: slot_mask(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.requested.len()
    }

    pub fn get(&self, slot: usize) -> Option<&Arc<SamplerState>> {
        self.requested.get(slot)
    }

    /// The object actually pushed for `slot`, a device clone for presets.
    pub fn actual(&self, slot: usize) -> Option<&Arc<SamplerState>> {
        self.actual.get(slot)
    }

    pub fn set(&mut self, slot: usize, sampler: Arc<SamplerState>) -> GfxResult<()> {
        if slot >= self.requested.len() {
            return Err(GfxError::out_of_range(
                "slot",
                format!("{:?} sampler slot {} of {}", self.stage, slot, self.requested.len()),
            ));
        }
        if Arc::ptr_eq(&self.requested[slot], &sampler) {
            return Ok(());
        }
        let actual = self.builtins.resolve(&sampler);
        actual.meta().bind(self.device, SamplerState::KIND)?;
        self.requested[slot] = sampler;
        self.actual[slot] = actual;
        self.dirty |= 1 << slot;
        Ok(())
    }

    pub fn mark_all_dirty(&mut self) {
        self.dirty = slot_mask(self.requested.len());
    }

    pub fn apply(&mut self, backend: &mut dyn GraphicsBackend) {
        let mut mask = self.dirty;
        while mask != 0 {
            let slot = mask.trailing_zeros() as usize;
            mask &= mask - 1;
            backend.bind_sampler(self.stage, slot as u32, &self.actual[slot]);
        }
        self.dirty = 0;
    }

    pub(crate) fn reallocate(&mut self, capacity: usize) {
        *self = SamplerStateCollection::new(self.stage, self.device, capacity);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendCall, RecordingBackend};

    #[test]
    fn test_out_of_range_slot() {
        let mut t = TextureCollection::new(ShaderStage::Pixel, 4);
        assert!(matches!(
            t.set(4, None),
            Err(GfxError::ArgumentOutOfRange { .. })
        ));
        let mut s = SamplerStateCollection::new(ShaderStage::Pixel, DeviceId::next(), 4);
        assert!(matches!(
            s.set(9, SamplerState::point_clamp()),
            Err(GfxError::ArgumentOutOfRange { .. })
        ));
    }

    #[test]
    fn test_dirty_slots_applied_once() {
        let mut be = RecordingBackend::new();
        let mut t = TextureCollection::new(ShaderStage::Pixel, 3);
        t.apply(&mut be);
        assert_eq!(be.calls().len(), 3);
        be.clear_calls();
        t.apply(&mut be);
        assert!(be.calls().is_empty());
        t.set(1, None).unwrap();
        t.apply(&mut be);
        assert!(be.calls().is_empty());
    }

    #[test]
    fn test_sampler_builtin_clone_pushed() {
        let mut be = RecordingBackend::new();
        let mut s = SamplerStateCollection::new(ShaderStage::Vertex, DeviceId::next(), 2);
        s.apply(&mut be);
        be.clear_calls();
        s.set(0, SamplerState::point_clamp()).unwrap();
        s.set(0, SamplerState::point_clamp()).unwrap();
        s.apply(&mut be);
        let actual = s.actual(0).unwrap().id();
        assert_ne!(actual, SamplerState::point_clamp().id());
        assert_eq!(
            be.calls(),
            &[BackendCall::BindSampler {
                stage: ShaderStage::Vertex,
                slot: 0,
                state: actual,
            }]
        );
    }
}
