//! Per-kind ownership containers for every handle the allocator created.

#[cfg(debug_assertions)]
use std::collections::HashSet;

use crate::backend::DeviceApi;
use crate::kind::ObjectKind;
use crate::object::RegisteredHandle;

/// Insertion-ordered handle lists, one per [`ObjectKind`].
///
/// Handles are stored as raw `u64` values and destroyed in
/// [`ObjectKind::DESTRUCTION_ORDER`].
#[derive(Debug, Default)]
pub struct ResourceRegistry {
    containers: [Vec<u64>; ObjectKind::COUNT],
    // Duplicate detection for debug builds
    #[cfg(debug_assertions)]
    recorded: HashSet<(usize, u64)>,
}

impl ResourceRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of a freshly created handle.
    pub fn record<T: RegisteredHandle>(&mut self, handle: T) {
        self.record_raw(T::KIND, handle.as_raw());
    }

    /// Take ownership of a raw handle of the given kind.
    pub fn record_raw(&mut self, kind: ObjectKind, raw: u64) {
        #[cfg(debug_assertions)]
        {
            let fresh = self.recorded.insert((kind.index(), raw));
            debug_assert!(fresh, "{kind} {raw:#x} registered twice");
        }
        self.containers[kind.index()].push(raw);
    }

    /// Typed handles of one kind, in creation order.
    pub fn handles<T: RegisteredHandle>(&self) -> impl Iterator<Item = T> + '_ {
        self.containers[T::KIND.index()]
            .iter()
            .map(|&raw| T::from_raw(raw))
    }

    /// Raw handles of one kind, in creation order.
    pub fn handles_of(&self, kind: ObjectKind) -> &[u64] {
        &self.containers[kind.index()]
    }

    /// Number of live handles of one kind.
    pub fn count(&self, kind: ObjectKind) -> usize {
        self.containers[kind.index()].len()
    }

    /// Number of live handles across all kinds.
    pub fn total(&self) -> usize {
        self.containers.iter().map(Vec::len).sum()
    }

    /// Whether every container is empty.
    pub fn is_empty(&self) -> bool {
        self.containers.iter().all(Vec::is_empty)
    }

    /// Destroy every handle, kind by kind, and empty the containers.
    ///
    /// Returns the number of handles destroyed.
    ///
    /// # Safety
    /// The device must be valid and none of the handles may be in use.
    pub unsafe fn destroy_all<D: DeviceApi + ?Sized>(&mut self, device: &D) -> usize {
        let mut destroyed = 0;

        for kind in ObjectKind::DESTRUCTION_ORDER {
            let container = std::mem::take(&mut self.containers[kind.index()]);
            if container.is_empty() {
                continue;
            }

            tracing::trace!("Destroying {} {}(s)", container.len(), kind);
            for raw in &container {
                // SAFETY: the handle was created on this device and is owned here
                unsafe { device.destroy_object(kind, *raw) };
            }
            destroyed += container.len();
        }

        #[cfg(debug_assertions)]
        self.recorded.clear();

        destroyed
    }
}
