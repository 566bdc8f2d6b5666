// RustPixel
// copyright zipxing@hotmail.com 2022～2025

//! Render target bindings and the value key framebuffers are cached under.

use crate::graphics::capabilities::MAX_RENDER_TARGETS;
use crate::graphics::resource::{RenderTarget, ResourceId};
use smallvec::SmallVec;
use std::sync::Arc;

/// One attachment slot: a target plus the array slice (or cube face) drawn to.
#[derive(Debug, Clone)]
pub struct RenderTargetBinding {
    pub target: Arc<RenderTarget>,
    pub array_slice: u32,
}

impl RenderTargetBinding {
    pub fn new(target: Arc<RenderTarget>) -> Self {
        Self {
            target,
            array_slice: 0,
        }
    }

    pub fn with_slice(target: Arc<RenderTarget>, array_slice: u32) -> Self {
        Self {
            target,
            array_slice,
        }
    }
}

impl PartialEq for RenderTargetBinding {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.target, &other.target) && self.array_slice == other.array_slice
    }
}

impl Eq for RenderTargetBinding {}

pub type RenderTargetSet = SmallVec<[RenderTargetBinding; 4]>;

/// Content key of a binding set.
///
/// A plain value copied out of the bindings, so later changes to the caller's
/// slice can never alias a key already stored in a cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BindingKey {
    entries: [(ResourceId, u32); MAX_RENDER_TARGETS],
    count: u8,
}

impl BindingKey {
    pub fn new(bindings: &[RenderTargetBinding]) -> Self {
        let mut entries = [(ResourceId::default(), 0); MAX_RENDER_TARGETS];
        for (e, b) in entries.iter_mut().zip(bindings) {
            *e = (b.target.id(), b.array_slice);
        }
        Self {
            entries,
            count: bindings.len().min(MAX_RENDER_TARGETS) as u8,
        }
    }

    pub fn len(&self) -> usize {
        self.count as usize
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn entries(&self) -> &[(ResourceId, u32)] {
        &self.entries[..self.count as usize]
    }

    pub fn references(&self, target: ResourceId) -> bool {
        self.entries().iter().any(|(id, _)| *id == target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    fn key_of(entries: &[(u64, u32)]) -> BindingKey {
        let mut k = BindingKey {
            entries: [(ResourceId::default(), 0); MAX_RENDER_TARGETS],
            count: entries.len() as u8,
        };
        for (i, (id, s)) in entries.iter().enumerate() {
            k.entries[i] = (ResourceId(*id), *s);
        }
        k
    }

    fn hash(k: &BindingKey) -> u64 {
        let mut h = DefaultHasher::new();
        k.hash(&mut h);
        h.finish()
    }

    #[test]
    fn test_key_value_semantics() {
        let a = key_of(&[(7, 0), (8, 0)]);
        let b = key_of(&[(7, 0), (8, 0)]);
        assert_eq!(a, b);
        assert_eq!(hash(&a), hash(&b));
        assert_ne!(a, key_of(&[(7, 1), (8, 0)]));
        assert_ne!(a, key_of(&[(8, 0), (7, 0)]));
        assert_ne!(a, key_of(&[(7, 0)]));
        assert!(a.references(ResourceId(8)));
        assert!(!a.references(ResourceId(9)));
        assert_eq!(a.entries().len(), 2);
    }
}
