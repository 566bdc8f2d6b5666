// RustPixel
// copyright zipxing@hotmail.com 2022～2025

//! # Vertex Attribute Binding Resolver
//!
//! Keeps what was last pushed for every vertex buffer slot and reissues
//! attribute pointers only for slots whose binding changed:
//!
//! ```text
//!  for every bound slot:
//!      same (layout, offset, frequency, buffer) and not forced? ── skip
//!      otherwise ── bind buffer, pointer per element, divisor if instancing
//!  any slot changed or slot count changed?
//!      enabled' = union of element locations of all slots
//!      enable  (enabled' - enabled)
//!      disable (enabled  - enabled')
//! ```

use crate::backend::{AttribPointer, BufferHandle, GraphicsBackend};
use crate::error::{GfxError, GfxResult};
use crate::graphics::capabilities::Capabilities;
use crate::graphics::vertex::AttributeInfo;
use smallvec::SmallVec;
use std::sync::Arc;

/// What is currently applied on one vertex buffer slot.
#[derive(Debug, Clone, Default)]
pub struct BufferBindingInfo {
    pub attribute_info: Option<Arc<AttributeInfo>>,
    pub offset: usize,
    pub instance_frequency: u32,
    pub buffer: Option<BufferHandle>,
}

impl BufferBindingInfo {
    fn matches(&self, slot: &SlotBinding) -> bool {
        self.buffer == Some(slot.buffer)
            && self.offset == slot.base_offset
            && self.instance_frequency == slot.instance_frequency
            && self
                .attribute_info
                .as_ref()
                .is_some_and(|a| Arc::ptr_eq(a, &slot.attribute_info))
    }
}

/// What a draw wants on one slot.
#[derive(Debug, Clone)]
pub struct SlotBinding {
    pub buffer: BufferHandle,
    pub attribute_info: Arc<AttributeInfo>,
    /// Byte offset of the first vertex the draw reads.
    pub base_offset: usize,
    pub instance_frequency: u32,
}

pub struct AttribResolver {
    infos: Vec<BufferBindingInfo>,
    enabled: Vec<bool>,
    scratch: Vec<bool>,
    attribs_dirty: bool,
    last_slot_count: usize,
}

impl AttribResolver {
    pub fn new(max_slots: usize, max_attributes: usize) -> Self {
        Self {
            infos: vec![BufferBindingInfo::default(); max_slots],
            enabled: vec![false; max_attributes],
            scratch: vec![false; max_attributes],
            attribs_dirty: true,
            last_slot_count: 0,
        }
    }

    /// Forget what was applied, used at creation and after a device reset.
    pub fn reallocate(&mut self, max_slots: usize, max_attributes: usize) {
        *self = AttribResolver::new(max_slots, max_attributes);
    }

    /// Force every slot to be reissued on the next apply.
    pub fn mark_dirty(&mut self) {
        self.attribs_dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.attribs_dirty
    }

    pub fn binding_info(&self, slot: usize) -> Option<&BufferBindingInfo> {
        self.infos.get(slot)
    }

    pub fn is_enabled(&self, location: u32) -> bool {
        self.enabled.get(location as usize).copied().unwrap_or(false)
    }

    /// Fails before any backend call when an instanced slot can't be honored.
    pub fn check_instancing(
        caps: &Capabilities,
        frequencies: impl IntoIterator<Item = u32>,
    ) -> GfxResult<()> {
        if !caps.supports_instancing && frequencies.into_iter().any(|f| f > 0) {
            return Err(GfxError::unsupported(
                "instanced geometry drawing requires instancing support (GL 3.3 / ES 3.0)",
            ));
        }
        Ok(())
    }

    /// Push the bindings of the draw, returns the number of slots rebound.
    pub fn apply(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        caps: &Capabilities,
        slots: &[SlotBinding],
    ) -> GfxResult<usize> {
        Self::check_instancing(caps, slots.iter().map(|s| s.instance_frequency))?;
        if slots.len() > self.infos.len() {
            return Err(GfxError::out_of_range(
                "vertex_buffers",
                format!("{} slots bound, {} available", slots.len(), self.infos.len()),
            ));
        }

        let mut rebound = 0;
        for (index, slot) in slots.iter().enumerate() {
            if !self.attribs_dirty && self.infos[index].matches(slot) {
                continue;
            }
            rebound += 1;
            backend.bind_vertex_buffer(index as u32, slot.buffer);
            let info = &slot.attribute_info;
            for e in info.elements.iter() {
                backend.set_attrib_pointer(&AttribPointer {
                    slot: index as u32,
                    location: e.location,
                    components: e.components,
                    ty: e.ty,
                    normalized: e.normalized,
                    stride: info.stride,
                    base_offset: slot.base_offset,
                    element_offset: e.offset as usize,
                });
                if caps.supports_instancing {
                    backend.set_attrib_divisor(e.location, slot.instance_frequency);
                }
            }
            self.infos[index] = BufferBindingInfo {
                attribute_info: Some(info.clone()),
                offset: slot.base_offset,
                instance_frequency: slot.instance_frequency,
                buffer: Some(slot.buffer),
            };
        }

        // slots no longer bound must be reissued when they come back
        if slots.len() < self.last_slot_count {
            for info in &mut self.infos[slots.len()..self.last_slot_count] {
                *info = BufferBindingInfo::default();
            }
        }

        if rebound > 0 || slots.len() != self.last_slot_count {
            self.scratch.iter_mut().for_each(|e| *e = false);
            for slot in slots {
                for e in slot.attribute_info.elements.iter() {
                    if let Some(flag) = self.scratch.get_mut(e.location as usize) {
                        *flag = true;
                    }
                }
            }
            self.apply_enabled(backend);
        }

        self.last_slot_count = slots.len();
        self.attribs_dirty = false;
        Ok(rebound)
    }

    fn apply_enabled(&mut self, backend: &mut dyn GraphicsBackend) {
        let mut toggles: SmallVec<[(u32, bool); 16]> = SmallVec::new();
        for (location, (now, want)) in self.enabled.iter().zip(self.scratch.iter()).enumerate() {
            if now != want {
                toggles.push((location as u32, *want));
            }
        }
        for (location, enable) in toggles {
            if enable {
                backend.enable_attrib(location);
            } else {
                backend.disable_attrib(location);
            }
            self.enabled[location as usize] = enable;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{AttribType, BackendCall, RecordingBackend};
    use crate::graphics::vertex::AttributeElement;
    use smallvec::smallvec;

    fn info(locations: &[u32]) -> Arc<AttributeInfo> {
        Arc::new(AttributeInfo {
            stride: 16,
            elements: locations
                .iter()
                .enumerate()
                .map(|(i, l)| AttributeElement {
                    location: *l,
                    components: 2,
                    ty: AttribType::F32,
                    normalized: false,
                    offset: i as u32 * 8,
                })
                .collect(),
        })
    }

    fn slot(buffer: u32, info: &Arc<AttributeInfo>, offset: usize, freq: u32) -> SlotBinding {
        SlotBinding {
            buffer: BufferHandle(buffer),
            attribute_info: info.clone(),
            base_offset: offset,
            instance_frequency: freq,
        }
    }

    fn count(be: &RecordingBackend, f: impl Fn(&BackendCall) -> bool) -> usize {
        be.calls().iter().filter(|c| f(c)).count()
    }

    #[test]
    fn test_unchanged_binding_is_skipped() {
        let mut be = RecordingBackend::new();
        let caps = Capabilities::default();
        let mut r = AttribResolver::new(4, 16);
        let layout = info(&[0, 1]);
        let slots = [slot(1, &layout, 0, 0)];
        assert_eq!(r.apply(&mut be, &caps, &slots).unwrap(), 1);
        assert_eq!(count(&be, |c| matches!(c, BackendCall::SetAttribPointer(_))), 2);
        be.clear_calls();
        for _ in 0..5 {
            assert_eq!(r.apply(&mut be, &caps, &slots).unwrap(), 0);
        }
        assert!(be.calls().is_empty());
    }

    #[test]
    fn test_offset_change_rebinds_only_that_slot() {
        let mut be = RecordingBackend::new();
        let caps = Capabilities::default();
        let mut r = AttribResolver::new(4, 16);
        let a = info(&[0, 1]);
        let b = info(&[2]);
        r.apply(&mut be, &caps, &[slot(1, &a, 0, 0), slot(2, &b, 0, 1)])
            .unwrap();
        be.clear_calls();
        let n = r
            .apply(&mut be, &caps, &[slot(1, &a, 64, 0), slot(2, &b, 0, 1)])
            .unwrap();
        assert_eq!(n, 1);
        assert_eq!(count(&be, |c| matches!(c, BackendCall::BindVertexBuffer { slot: 0, .. })), 1);
        assert_eq!(count(&be, |c| matches!(c, BackendCall::BindVertexBuffer { slot: 1, .. })), 0);
        // enabled set unchanged, no toggles
        assert_eq!(
            count(&be, |c| matches!(c, BackendCall::EnableAttrib(_) | BackendCall::DisableAttrib(_))),
            0
        );
    }

    #[test]
    fn test_enable_set_is_diffed() {
        let mut be = RecordingBackend::new();
        let caps = Capabilities::default();
        let mut r = AttribResolver::new(4, 16);
        r.apply(&mut be, &caps, &[slot(1, &info(&[0, 1]), 0, 0)]).unwrap();
        be.clear_calls();
        r.apply(&mut be, &caps, &[slot(1, &info(&[1, 3]), 0, 0)]).unwrap();
        let toggles: Vec<_> = be
            .calls()
            .iter()
            .filter(|c| matches!(c, BackendCall::EnableAttrib(_) | BackendCall::DisableAttrib(_)))
            .cloned()
            .collect();
        assert_eq!(
            toggles,
            vec![BackendCall::DisableAttrib(0), BackendCall::EnableAttrib(3)]
        );
        assert!(r.is_enabled(1) && r.is_enabled(3) && !r.is_enabled(0));
    }

    #[test]
    fn test_shrinking_slot_count_disables() {
        let mut be = RecordingBackend::new();
        let caps = Capabilities::default();
        let mut r = AttribResolver::new(4, 16);
        let a = info(&[0]);
        let b = info(&[4]);
        r.apply(&mut be, &caps, &[slot(1, &a, 0, 0), slot(2, &b, 0, 0)])
            .unwrap();
        be.clear_calls();
        assert_eq!(r.apply(&mut be, &caps, &[slot(1, &a, 0, 0)]).unwrap(), 0);
        assert_eq!(be.calls(), &[BackendCall::DisableAttrib(4)]);
        assert!(r.binding_info(1).unwrap().buffer.is_none());
    }

    #[test]
    fn test_divisor_only_with_instancing() {
        let mut be = RecordingBackend::new();
        let mut caps = Capabilities::default();
        caps.supports_instancing = false;
        let mut r = AttribResolver::new(4, 16);
        let a = info(&[0]);
        r.apply(&mut be, &caps, &[slot(1, &a, 0, 0)]).unwrap();
        assert_eq!(count(&be, |c| matches!(c, BackendCall::SetAttribDivisor { .. })), 0);

        be.clear_calls();
        let err = r.apply(&mut be, &caps, &[slot(1, &a, 0, 0), slot(2, &a, 0, 1)]);
        assert!(matches!(err, Err(GfxError::UnsupportedFeature(_))));
        // rejected before any backend call
        assert!(be.calls().is_empty());
    }

    #[test]
    fn test_mark_dirty_forces_reissue() {
        let mut be = RecordingBackend::new();
        let caps = Capabilities::default();
        let mut r = AttribResolver::new(2, 16);
        let a = info(&[0]);
        let slots: SmallVec<[SlotBinding; 2]> = smallvec![slot(1, &a, 0, 0)];
        r.apply(&mut be, &caps, &slots).unwrap();
        r.mark_dirty();
        assert_eq!(r.apply(&mut be, &caps, &slots).unwrap(), 1);
        assert!(!r.is_dirty());
    }
}
