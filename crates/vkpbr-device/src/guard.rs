//! Set-once slot enforcing a single process-wide instance.

use std::sync::OnceLock;

use crate::error::{AllocatorError, Result};

/// A slot that accepts exactly one value for the lifetime of the process.
///
/// Transitions unset → set once; there is no way back. Later `set` calls are
/// reported and leave the first value in place.
pub struct SingleInstance<T> {
    slot: OnceLock<T>,
    name: &'static str,
}

impl<T> SingleInstance<T> {
    /// Create an empty slot. `name` identifies it in diagnostics.
    pub const fn new(name: &'static str) -> Self {
        Self {
            slot: OnceLock::new(),
            name,
        }
    }

    /// Store the instance.
    ///
    /// Only the first call succeeds. Every later call logs an error and
    /// returns [`AllocatorError::AlreadyInitialized`]; the rejected value is
    /// dropped.
    pub fn set(&self, value: T) -> Result<&T> {
        if self.slot.set(value).is_err() {
            tracing::error!(
                "{} is already initialized; ignoring the new instance",
                self.name
            );
            return Err(AllocatorError::AlreadyInitialized);
        }
        Ok(self.get())
    }

    /// The stored instance.
    ///
    /// # Panics
    /// Panics if called before [`Self::set`].
    pub fn get(&self) -> &T {
        match self.slot.get() {
            Some(value) => value,
            None => panic!("{} accessed before initialization", self.name),
        }
    }

    /// The stored instance, if any.
    pub fn try_get(&self) -> Option<&T> {
        self.slot.get()
    }

    /// Whether an instance has been stored.
    pub fn is_set(&self) -> bool {
        self.slot.get().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_set_keeps_first_instance() {
        let slot = SingleInstance::new("test slot");

        assert_eq!(slot.set(1), Ok(&1));
        assert_eq!(slot.set(2), Err(AllocatorError::AlreadyInitialized));
        assert_eq!(*slot.get(), 1);
    }

    #[test]
    fn unset_slot_is_empty() {
        let slot: SingleInstance<u32> = SingleInstance::new("test slot");
        assert!(!slot.is_set());
        assert!(slot.try_get().is_none());
    }

    #[test]
    #[should_panic(expected = "accessed before initialization")]
    fn get_before_set_panics() {
        let slot: SingleInstance<u32> = SingleInstance::new("test slot");
        let _ = slot.get();
    }

    #[test]
    fn concurrent_sets_store_exactly_one() {
        static SLOT: SingleInstance<usize> = SingleInstance::new("shared slot");

        let successes: usize = std::thread::scope(|scope| {
            let workers: Vec<_> = (0..8)
                .map(|i| scope.spawn(move || usize::from(SLOT.set(i).is_ok())))
                .collect();
            workers.into_iter().filter_map(|w| w.join().ok()).sum()
        });

        assert_eq!(successes, 1);
        assert!(SLOT.is_set());
    }
}
