// ── Stored entity collection ──
//
// One canonical envelope per entity kind, cached lock-free behind an
// `ArcSwap` and persisted best-effort through the storage backend.
// Writes are serialized by a mutex; reads never block and never fail.

use std::sync::{Arc, Mutex, PoisonError};

use arc_swap::ArcSwapOption;
use tracing::{debug, info, warn};

use super::backend::StorageBackend;
use super::envelope::Envelope;
use super::legacy::LegacySource;
use super::StoreEntity;

pub(crate) struct StoredCollection<T: StoreEntity> {
    canonical_key: String,
    legacy_sources: Vec<LegacySource>,
    organization_id: String,
    updated_by: Option<String>,
    backend: Arc<dyn StorageBackend>,
    cached: ArcSwapOption<Envelope<T>>,
    write_lock: Mutex<()>,
}

impl<T: StoreEntity> StoredCollection<T> {
    pub(crate) fn new(
        backend: Arc<dyn StorageBackend>,
        canonical_key: String,
        legacy_sources: Vec<LegacySource>,
        organization_id: String,
        updated_by: Option<String>,
    ) -> Self {
        Self {
            canonical_key,
            legacy_sources,
            organization_id,
            updated_by,
            backend,
            cached: ArcSwapOption::empty(),
            write_lock: Mutex::new(()),
        }
    }

    pub(crate) fn canonical_key(&self) -> &str {
        &self.canonical_key
    }

    pub(crate) fn legacy_keys(&self) -> impl Iterator<Item = &str> {
        self.legacy_sources.iter().map(|s| s.key.as_str())
    }

    // ── Read path ────────────────────────────────────────────────────

    /// Current envelope: cached, else canonical key, else the ordered
    /// legacy-source scan (with self-healing canonical rewrite), else an
    /// empty envelope. Never fails.
    pub(crate) fn envelope(&self) -> Arc<Envelope<T>> {
        if let Some(env) = self.cached.load_full() {
            return env;
        }
        let env = Arc::new(self.read_through());
        self.cached.store(Some(Arc::clone(&env)));
        env
    }

    pub(crate) fn get_all(&self) -> Vec<T> {
        self.envelope().items.clone()
    }

    pub(crate) fn get(&self, id: &str) -> Option<T> {
        self.envelope()
            .items
            .iter()
            .find(|item| item.entity_id() == id)
            .cloned()
    }

    fn read_through(&self) -> Envelope<T> {
        if let Some(raw) = self.backend.read(&self.canonical_key) {
            match serde_json::from_str::<Envelope<T>>(&raw) {
                Ok(env) => return env,
                Err(e) => {
                    warn!(key = %self.canonical_key, error = %e, "canonical envelope unparseable, scanning legacy sources");
                }
            }
        }

        for source in &self.legacy_sources {
            let Some(raw) = self.backend.read(&source.key) else {
                continue;
            };
            let values: Vec<serde_json::Value> = match serde_json::from_str(&raw) {
                Ok(values) => values,
                Err(e) => {
                    debug!(key = %source.key, error = %e, "legacy source unparseable, trying next");
                    continue;
                }
            };

            let items: Vec<T> = values.iter().filter_map(T::from_legacy).collect();
            if items.is_empty() {
                continue;
            }

            // Self-healing warm-up: rewrite the canonical envelope so
            // subsequent reads skip the scan entirely.
            let mut env = Envelope::new(self.organization_id.clone(), items);
            env.touch(self.updated_by.as_deref());
            self.persist(&env);
            info!(
                key = %source.key,
                migrated = env.items.len(),
                "recovered legacy records into canonical envelope"
            );
            return env;
        }

        Envelope::new(self.organization_id.clone(), Vec::new())
    }

    // ── Write path ───────────────────────────────────────────────────

    /// Bump the version, persist best-effort, and publish the new
    /// snapshot. Callers must hold `write_lock`.
    fn commit(&self, mut env: Envelope<T>) {
        env.touch(self.updated_by.as_deref());
        self.persist(&env);
        self.cached.store(Some(Arc::new(env)));
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ()> {
        self.write_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert or replace by id, returning the stored entity.
    pub(crate) fn save(&self, entity: T) -> T {
        let _guard = self.lock();
        let mut env = Envelope::clone(&self.envelope());
        match env
            .items
            .iter_mut()
            .find(|item| item.entity_id() == entity.entity_id())
        {
            Some(slot) => *slot = entity.clone(),
            None => env.items.push(entity.clone()),
        }
        self.commit(env);
        entity
    }

    /// Apply a partial update to one entity. `None` (and no write) if
    /// the id is absent -- an invalid mutation leaves state unchanged.
    pub(crate) fn update(&self, id: &str, patch: impl FnOnce(&mut T)) -> Option<T> {
        let _guard = self.lock();
        let mut env = Envelope::clone(&self.envelope());
        let item = env.items.iter_mut().find(|item| item.entity_id() == id)?;
        patch(item);
        let updated = item.clone();
        self.commit(env);
        Some(updated)
    }

    /// Remove by id. `true` (and a write) only if something matched.
    pub(crate) fn delete(&self, id: &str) -> bool {
        let _guard = self.lock();
        let mut env = Envelope::clone(&self.envelope());
        let before = env.items.len();
        env.items.retain(|item| item.entity_id() != id);
        if env.items.len() == before {
            return false;
        }
        self.commit(env);
        true
    }

    pub(crate) fn replace_all(&self, new_items: Vec<T>) {
        let _guard = self.lock();
        let mut env = Envelope::clone(&self.envelope());
        env.items = new_items;
        self.commit(env);
    }

    /// Write failures are caught and logged; the in-memory result of the
    /// mutation is still returned to the caller. UI responsiveness wins
    /// over durability here.
    fn persist(&self, env: &Envelope<T>) {
        let raw = match serde_json::to_string(env) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(key = %self.canonical_key, error = %e, "envelope serialization failed, keeping in-memory state");
                return;
            }
        };
        if let Err(e) = self.backend.write(&self.canonical_key, &raw) {
            warn!(key = %self.canonical_key, error = %e, "storage write failed, keeping in-memory state");
        }
    }

    // ── External change path ─────────────────────────────────────────

    /// Re-read the canonical envelope after an external change
    /// notification. Returns `true` when the stored envelope actually
    /// differs from the cached one -- echoes of our own writes are
    /// suppressed by the version comparison.
    pub(crate) fn refresh_from_backend(&self) -> bool {
        let _guard = self.lock();

        let fresh = self.read_through();
        let changed = match self.cached.load_full() {
            Some(cached) => {
                cached.version != fresh.version || cached.updated_at != fresh.updated_at
            }
            None => true,
        };
        if changed {
            self.cached.store(Some(Arc::new(fresh)));
        }
        changed
    }
}
