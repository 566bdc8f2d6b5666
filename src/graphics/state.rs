// RustPixel
// copyright zipxing@hotmail.com 2022～2025

//! # Render State Objects
//!
//! Blend, depth-stencil, rasterizer and sampler states are immutable values
//! shared through `Arc`. The built-in presets (`BlendState::opaque()` etc.)
//! are process-wide singletons that are never bound to a device. When a
//! preset is set on a context it is swapped for a per-device clone kept in a
//! [`BuiltinStates`] arena, so two contexts never share the object they bind.
//!
//! ```text
//!   user sets ──► requested (Arc as given)
//!                    │
//!                    ├─ builtin? ──► arena[preset] clone (created once per device)
//!                    │
//!                    └─ custom   ──► same Arc, bound to the first device using it
//!                    ▼
//!                 actual ──► pushed to the backend on the next apply
//! ```

use crate::error::{GfxError, GfxResult};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

pub mod blend;
pub mod depth_stencil;
pub mod rasterizer;
pub mod sampler;

pub use blend::*;
pub use depth_stencil::*;
pub use rasterizer::*;
pub use sampler::*;

static NEXT_STATE_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_DEVICE_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identity of one state object instance.
///
/// Backends key their native state caches by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StateId(pub u64);

impl StateId {
    pub(crate) fn next() -> Self {
        StateId(NEXT_STATE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Identity of one graphics context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceId(pub u64);

impl DeviceId {
    pub(crate) fn next() -> Self {
        DeviceId(NEXT_DEVICE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Bookkeeping every state object carries next to its description.
#[derive(Debug)]
pub struct StateMeta<B> {
    id: StateId,
    builtin: Option<B>,
    device: OnceLock<DeviceId>,
}

impl<B: Copy> StateMeta<B> {
    pub(crate) fn new(builtin: Option<B>) -> Self {
        Self {
            id: StateId::next(),
            builtin,
            device: OnceLock::new(),
        }
    }

    pub fn id(&self) -> StateId {
        self.id
    }

    pub fn builtin(&self) -> Option<B> {
        self.builtin
    }

    pub fn device(&self) -> Option<DeviceId> {
        self.device.get().copied()
    }

    /// Bind to `device`, a state can only ever belong to one device.
    pub(crate) fn bind(&self, device: DeviceId, kind: &str) -> GfxResult<()> {
        let bound = *self.device.get_or_init(|| device);
        if bound != device {
            return Err(GfxError::invalid(format!(
                "{} {:?} is already bound to graphics device {}",
                kind, self.id, bound.0
            )));
        }
        Ok(())
    }
}

/// Implemented by the four state object types.
pub trait DeviceState: Send + Sync + Sized {
    type Builtin: Copy + Into<usize>;
    const KIND: &'static str;

    fn meta(&self) -> &StateMeta<Self::Builtin>;

    /// A fresh, unbound, non-builtin copy with a new id.
    fn device_clone(&self) -> Self;

    fn id(&self) -> StateId {
        self.meta().id()
    }
}

/// Per-device arena of preset clones indexed by the preset enum.
pub struct BuiltinStates<T, const N: usize> {
    clones: [Option<Arc<T>>; N],
}

impl<T: DeviceState, const N: usize> BuiltinStates<T, N> {
    pub fn new() -> Self {
        Self {
            clones: std::array::from_fn(|_| None),
        }
    }

    /// Map the requested state to the object this device actually binds.
    pub fn resolve(&mut self, requested: &Arc<T>) -> Arc<T> {
        match requested.meta().builtin() {
            Some(b) => self.clones[b.into()]
                .get_or_insert_with(|| Arc::new(requested.device_clone()))
                .clone(),
            None => requested.clone(),
        }
    }

    pub fn clear(&mut self) {
        self.clones.iter_mut().for_each(|c| *c = None);
    }
}

impl<T: DeviceState, const N: usize> Default for BuiltinStates<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Comparison used by depth, stencil and sampler comparison tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareFunction {
    Always,
    Never,
    Less,
    LessEqual,
    Equal,
    GreaterEqual,
    Greater,
    NotEqual,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_resolves_to_device_clone() {
        let mut arena: BuiltinStates<BlendState, { BuiltinBlend::COUNT }> = BuiltinStates::new();
        let opaque = BlendState::opaque();
        let actual = arena.resolve(&opaque);
        assert!(!Arc::ptr_eq(&opaque, &actual));
        assert_ne!(opaque.id(), actual.id());
        assert_eq!(actual.meta().builtin(), None);
        // same clone on second resolve
        let again = arena.resolve(&opaque);
        assert!(Arc::ptr_eq(&actual, &again));
        // singleton itself stays unbound
        actual.meta().bind(DeviceId(900), "BlendState").unwrap();
        assert_eq!(opaque.meta().device(), None);
    }

    #[test]
    fn test_custom_state_binds_once() {
        let state = Arc::new(BlendState::new(BlendDesc::default()));
        let mut arena: BuiltinStates<BlendState, { BuiltinBlend::COUNT }> = BuiltinStates::new();
        let actual = arena.resolve(&state);
        assert!(Arc::ptr_eq(&state, &actual));
        assert!(actual.meta().bind(DeviceId(901), "BlendState").is_ok());
        assert!(actual.meta().bind(DeviceId(901), "BlendState").is_ok());
        let err = actual.meta().bind(DeviceId(902), "BlendState");
        assert!(matches!(err, Err(GfxError::InvalidOperation(_))));
    }

    #[test]
    fn test_two_devices_get_distinct_clones() {
        let mut a: BuiltinStates<RasterizerState, { BuiltinRasterizer::COUNT }> =
            BuiltinStates::new();
        let mut b: BuiltinStates<RasterizerState, { BuiltinRasterizer::COUNT }> =
            BuiltinStates::new();
        let preset = RasterizerState::cull_none();
        let ca = a.resolve(&preset);
        let cb = b.resolve(&preset);
        assert!(!Arc::ptr_eq(&ca, &cb));
        assert!(ca.meta().bind(DeviceId(903), "RasterizerState").is_ok());
        assert!(cb.meta().bind(DeviceId(904), "RasterizerState").is_ok());
    }
}
