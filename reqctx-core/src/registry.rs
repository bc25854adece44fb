//! The in-request registry: the memoization table that makes concurrent
//! `request()` calls for the same model+props converge on one in-flight
//! computation rather than each starting their own.

use dashmap::DashMap;
use futures::future::{FutureExt, Shared};

use crate::error::ContextError;
use crate::key::Key;
use crate::model::ModelFuture;

/// A model invocation's outcome, shared across every caller that memoized
/// on the same key.
///
/// [`Shared`] is the async analogue of a settled-once promise: the first
/// poll drives the underlying future, every later clone observes the same
/// polled value without re-running the body.
pub type SharedOutcome = Shared<ModelFuture>;

/// Request-scoped store of in-flight and settled model invocations.
///
/// One `Registry` lives for the lifetime of a single top-level request;
/// every [`crate::context::Ctx`] descended from the same root shares the
/// same instance, which is what makes sibling `request()` calls for the
/// same key observe each other.
#[derive(Default)]
pub struct Registry {
    entries: DashMap<Key, SharedOutcome>,
}

impl Registry {
    pub fn new() -> Self {
        Registry { entries: DashMap::new() }
    }

    /// Returns the in-flight or settled outcome for `key`, constructing one
    /// from `make` the first time the key is seen.
    ///
    /// `make` is only ever invoked for the caller that wins the race to
    /// insert; it must not itself start executing the future (futures are
    /// lazy, so merely boxing one is free) — the winner and every later
    /// caller then drive the same [`Shared`] future independently.
    pub fn get_or_create(&self, key: Key, make: impl FnOnce() -> ModelFuture) -> SharedOutcome {
        self.entries.entry(key).or_insert_with(|| make().shared()).clone()
    }

    /// Directly seed a key with an already-known value, per `set()`.
    ///
    /// Fails with [`ContextError::RegistryConflict`] if the key is already
    /// occupied, mirroring `request()`'s "first writer wins" memoization.
    pub fn set(&self, key: Key, value: serde_json::Value) -> Result<(), ContextError> {
        use dashmap::mapref::entry::Entry;
        match self.entries.entry(key) {
            Entry::Occupied(entry) => Err(ContextError::RegistryConflict { key: entry.key().to_string() }),
            Entry::Vacant(entry) => {
                let ready: ModelFuture = Box::pin(futures::future::ready(Ok(value)));
                entry.insert(ready.shared());
                Ok(())
            }
        }
    }

    /// Drop a key's entry, e.g. after it settled into an error.
    ///
    /// Letting a failed call poison the key for the rest of the request
    /// would turn one transient failure into every later caller's
    /// failure; removing it lets the next (non-concurrent) `request()`
    /// for the same key retry from scratch.
    pub fn forget(&self, key: &Key) {
        self.entries.remove(key);
    }

    pub fn contains(&self, key: &Key) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
