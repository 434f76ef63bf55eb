//! Named deterministic sources shared within a scope.
//!
//! A scope (typically a single test) enters the registry under its name and receives a
//! [`SourceScope`]. Every source handed out by that scope, and by any other scope that enters
//! with the same name while the first is alive, continues one shared stream. When the scope
//! that created the entry is dropped, the entry is removed and the next scope with that name
//! starts again from the beginning of the stream.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

use rand_chacha::ChaCha20Rng;
use rand_core::{CryptoRng, RngCore};
use tracing::debug;

use super::source::deterministic_source;

type SharedRng = Arc<Mutex<ChaCha20Rng>>;

/// Registry of deterministic sources keyed by scope name.
#[derive(Default)]
pub struct SourceRegistry {
    sources: Mutex<HashMap<String, SharedRng>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide registry for callers that have no natural place to own one.
    pub fn global() -> &'static SourceRegistry {
        static GLOBAL: OnceLock<SourceRegistry> = OnceLock::new();
        GLOBAL.get_or_init(SourceRegistry::new)
    }

    /// Enters the scope `name`, creating its source if no live scope owns one.
    pub fn enter(&self, name: &str) -> SourceScope<'_> {
        let mut sources = self.lock();
        let (rng, owner) = match sources.get(name) {
            Some(rng) => (Arc::clone(rng), false),
            None => {
                let rng = Arc::new(Mutex::new(deterministic_source(name)));
                sources.insert(name.to_string(), Arc::clone(&rng));
                debug!("registered deterministic source for {}", name);
                (rng, true)
            }
        };
        SourceScope {
            registry: self,
            name: name.to_string(),
            rng,
            owner,
        }
    }

    /// Returns true if a live scope currently owns a source for `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.lock().contains_key(name)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, SharedRng>> {
        // A poisoned map is still structurally valid.
        self.sources.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Guard tying a registry entry to the lifetime of a scope.
pub struct SourceScope<'a> {
    registry: &'a SourceRegistry,
    name: String,
    rng: SharedRng,
    owner: bool,
}

impl SourceScope<'_> {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns a handle on the scope's stream. Handles are independent of the guard's
    /// lifetime and can be moved into a [`RootAuthority`](crate::RootAuthority).
    pub fn source(&self) -> SharedSource {
        SharedSource {
            rng: Arc::clone(&self.rng),
        }
    }
}

impl Drop for SourceScope<'_> {
    fn drop(&mut self) {
        if !self.owner {
            return;
        }
        let mut sources = self.registry.lock();
        if sources
            .get(&self.name)
            .is_some_and(|rng| Arc::ptr_eq(rng, &self.rng))
        {
            sources.remove(&self.name);
            debug!("released deterministic source for {}", self.name);
        }
    }
}

/// A handle on a shared deterministic stream.
#[derive(Clone)]
pub struct SharedSource {
    rng: SharedRng,
}

impl SharedSource {
    fn with<T>(&self, f: impl FnOnce(&mut ChaCha20Rng) -> T) -> T {
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut rng)
    }
}

impl RngCore for SharedSource {
    fn next_u32(&mut self) -> u32 {
        self.with(|rng| rng.next_u32())
    }

    fn next_u64(&mut self) -> u64 {
        self.with(|rng| rng.next_u64())
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.with(|rng| rng.fill_bytes(dest))
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand_core::Error> {
        self.with(|rng| rng.try_fill_bytes(dest))
    }
}

impl CryptoRng for SharedSource {}

#[cfg(test)]
mod tests {
    use super::*;

    /// Sources drawn from the same live scope continue one stream instead of restarting it.
    #[test]
    fn scope_continues_stream() {
        let registry = SourceRegistry::new();
        let scope = registry.enter("continues");
        let first = scope.source().next_u64();
        let second = scope.source().next_u64();

        let mut fresh = deterministic_source("continues");
        assert_eq!(first, fresh.next_u64());
        assert_eq!(second, fresh.next_u64());
    }

    /// A second scope entering an existing name shares the owner's stream.
    #[test]
    fn nested_scope_shares_stream() {
        let registry = SourceRegistry::new();
        let owner = registry.enter("shared");
        let first = owner.source().next_u64();
        {
            let guest = registry.enter("shared");
            let second = guest.source().next_u64();
            assert_ne!(first, second);
        }
        assert!(registry.contains("shared"));
    }

    /// The process-wide registry is one instance and follows the same scope rules.
    #[test]
    fn global_registry_is_shared() {
        assert!(std::ptr::eq(SourceRegistry::global(), SourceRegistry::global()));

        let name = "registry::tests::global_registry_is_shared";
        let first = {
            let scope = SourceRegistry::global().enter(name);
            assert!(SourceRegistry::global().contains(name));
            scope.source().next_u64()
        };
        assert!(!SourceRegistry::global().contains(name));
        assert_eq!(first, deterministic_source(name).next_u64());
    }

    /// Dropping the owning scope removes the entry, so the stream restarts.
    #[test]
    fn dropping_owner_restarts_stream() {
        let registry = SourceRegistry::new();
        let first = {
            let scope = registry.enter("restart");
            scope.source().next_u64()
        };
        assert!(!registry.contains("restart"));

        let scope = registry.enter("restart");
        assert_eq!(first, scope.source().next_u64());
    }
}
