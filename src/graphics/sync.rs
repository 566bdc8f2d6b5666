// RustPixel
// copyright zipxing@hotmail.com 2022～2025

//! Lock shared by contexts that drive one immediate device context.
//!
//! It is held only around a group of backend calls that must not interleave
//! with another producer, a present or a back buffer readback, never for a
//! whole frame.

use parking_lot::{Mutex, MutexGuard};
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct SyncHandle(Arc<Mutex<()>>);

impl SyncHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lock(&self) -> MutexGuard<'_, ()> {
        self.0.lock()
    }

    pub fn try_lock(&self) -> Option<MutexGuard<'_, ()>> {
        self.0.try_lock()
    }

    pub fn same_as(&self, other: &SyncHandle) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_lock_excludes() {
        let a = SyncHandle::new();
        let b = a.clone();
        assert!(a.same_as(&b));
        let guard = a.lock();
        assert!(b.try_lock().is_none());
        drop(guard);
        assert!(b.try_lock().is_some());
        assert!(!a.same_as(&SyncHandle::new()));
    }

    #[test]
    fn test_lock_from_other_thread() {
        let a = SyncHandle::new();
        let b = a.clone();
        let t = std::thread::spawn(move || {
            let _g = b.lock();
        });
        t.join().unwrap();
        assert!(a.try_lock().is_some());
    }
}
