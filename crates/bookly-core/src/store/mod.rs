// ── Entity store ──
//
// Versioned, normalized local cache of domain entities. The store is the
// sole mutable shared resource in the core: all writes go through its
// mutators, which are the only code permitted to bump envelope
// version/updatedAt, and every successful mutation emits the kind's
// `<kind>-updated` event on the bus, synchronously, after the write.

mod backend;
mod collection;
mod envelope;
mod legacy;

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub use backend::{FileBackend, MemoryBackend, StorageBackend};
pub use envelope::Envelope;
pub use legacy::{default_sources, LegacySource};

use crate::bus::{ChangeOrigin, EventBus};
use crate::model::{Activity, Booking, GiftCard, PromoCode};
use crate::observer::ChangeObserver;
use collection::StoredCollection;

// ── Entity kinds ─────────────────────────────────────────────────────

/// The entity kinds the store manages. The `Display` form doubles as the
/// storage-key slug and the event-name stem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum EntityKind {
    #[strum(serialize = "activities")]
    Activities,
    #[strum(serialize = "bookings")]
    Bookings,
    #[strum(serialize = "vouchers")]
    Vouchers,
    #[strum(serialize = "promo-codes")]
    PromoCodes,
}

impl EntityKind {
    pub const ALL: [Self; 4] = [
        Self::Activities,
        Self::Bookings,
        Self::Vouchers,
        Self::PromoCodes,
    ];

    /// The logical event name consumers subscribe to.
    pub fn event_name(self) -> String {
        format!("{self}-updated")
    }

    /// Canonical (versioned-envelope) storage key for an organization.
    pub fn canonical_key(self, organization_id: &str) -> String {
        format!("bookly:{organization_id}:{self}")
    }
}

/// A domain type the store can persist and migrate.
pub trait StoreEntity:
    Clone + Serialize + DeserializeOwned + Send + Sync + 'static
{
    const KIND: EntityKind;

    fn entity_id(&self) -> &str;

    /// Normalize one record from a legacy flat-array payload. `None`
    /// drops the record.
    fn from_legacy(value: &serde_json::Value) -> Option<Self>;
}

// ── Store ────────────────────────────────────────────────────────────

/// Construction-time scope for a store instance.
#[derive(Debug, Clone)]
pub struct StoreScope {
    pub organization_id: String,
    /// Provenance tag stamped into every envelope this instance writes.
    pub updated_by: Option<String>,
}

/// Typed, reactive local cache of all widget entities.
pub struct EntityStore {
    bus: EventBus,
    backend: Arc<dyn StorageBackend>,
    activities: StoredCollection<Activity>,
    bookings: StoredCollection<Booking>,
    vouchers: StoredCollection<GiftCard>,
    promo_codes: StoredCollection<PromoCode>,
}

fn collection<T: StoreEntity>(
    backend: &Arc<dyn StorageBackend>,
    scope: &StoreScope,
) -> StoredCollection<T> {
    StoredCollection::new(
        Arc::clone(backend),
        T::KIND.canonical_key(&scope.organization_id),
        default_sources(T::KIND, &scope.organization_id),
        scope.organization_id.clone(),
        scope.updated_by.clone(),
    )
}

impl EntityStore {
    pub fn new(backend: Arc<dyn StorageBackend>, bus: EventBus, scope: StoreScope) -> Self {
        Self {
            bus,
            activities: collection(&backend, &scope),
            bookings: collection(&backend, &scope),
            vouchers: collection(&backend, &scope),
            promo_codes: collection(&backend, &scope),
            backend,
        }
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// The backend this store persists through, shared with observers.
    pub fn backend(&self) -> &Arc<dyn StorageBackend> {
        &self.backend
    }

    fn emit(&self, kind: EntityKind) {
        self.bus.emit(kind, ChangeOrigin::Local);
    }

    // ── Activities ───────────────────────────────────────────────────

    pub fn activities(&self) -> Vec<Activity> {
        self.activities.get_all()
    }

    pub fn activity(&self, id: &str) -> Option<Activity> {
        self.activities.get(id)
    }

    pub fn save_activity(&self, activity: Activity) -> Activity {
        let saved = self.activities.save(activity);
        self.emit(EntityKind::Activities);
        saved
    }

    pub fn update_activity(&self, id: &str, patch: impl FnOnce(&mut Activity)) -> Option<Activity> {
        let updated = self.activities.update(id, patch);
        if updated.is_some() {
            self.emit(EntityKind::Activities);
        }
        updated
    }

    pub fn delete_activity(&self, id: &str) -> bool {
        let removed = self.activities.delete(id);
        if removed {
            self.emit(EntityKind::Activities);
        }
        removed
    }

    pub fn replace_activities(&self, items: Vec<Activity>) {
        self.activities.replace_all(items);
        self.emit(EntityKind::Activities);
    }

    // ── Bookings ─────────────────────────────────────────────────────

    pub fn bookings(&self) -> Vec<Booking> {
        self.bookings.get_all()
    }

    pub fn booking(&self, id: &str) -> Option<Booking> {
        self.bookings.get(id)
    }

    pub fn save_booking(&self, booking: Booking) -> Booking {
        let saved = self.bookings.save(booking);
        self.emit(EntityKind::Bookings);
        saved
    }

    pub fn update_booking(&self, id: &str, patch: impl FnOnce(&mut Booking)) -> Option<Booking> {
        let updated = self.bookings.update(id, patch);
        if updated.is_some() {
            self.emit(EntityKind::Bookings);
        }
        updated
    }

    pub fn delete_booking(&self, id: &str) -> bool {
        let removed = self.bookings.delete(id);
        if removed {
            self.emit(EntityKind::Bookings);
        }
        removed
    }

    pub fn replace_bookings(&self, items: Vec<Booking>) {
        self.bookings.replace_all(items);
        self.emit(EntityKind::Bookings);
    }

    // ── Gift vouchers ────────────────────────────────────────────────

    pub fn vouchers(&self) -> Vec<GiftCard> {
        self.vouchers.get_all()
    }

    pub fn voucher(&self, id: &str) -> Option<GiftCard> {
        self.vouchers.get(id)
    }

    pub fn voucher_by_code(&self, code: &str) -> Option<GiftCard> {
        self.vouchers
            .get_all()
            .into_iter()
            .find(|card| card.code == code)
    }

    pub fn save_voucher(&self, voucher: GiftCard) -> GiftCard {
        let saved = self.vouchers.save(voucher);
        self.emit(EntityKind::Vouchers);
        saved
    }

    pub fn update_voucher(&self, id: &str, patch: impl FnOnce(&mut GiftCard)) -> Option<GiftCard> {
        let updated = self.vouchers.update(id, patch);
        if updated.is_some() {
            self.emit(EntityKind::Vouchers);
        }
        updated
    }

    pub fn delete_voucher(&self, id: &str) -> bool {
        let removed = self.vouchers.delete(id);
        if removed {
            self.emit(EntityKind::Vouchers);
        }
        removed
    }

    pub fn replace_vouchers(&self, items: Vec<GiftCard>) {
        self.vouchers.replace_all(items);
        self.emit(EntityKind::Vouchers);
    }

    // ── Promo codes ──────────────────────────────────────────────────

    pub fn promo_codes(&self) -> Vec<PromoCode> {
        self.promo_codes.get_all()
    }

    pub fn promo_code(&self, id: &str) -> Option<PromoCode> {
        self.promo_codes.get(id)
    }

    pub fn promo_by_code(&self, code: &str) -> Option<PromoCode> {
        self.promo_codes
            .get_all()
            .into_iter()
            .find(|promo| promo.code == code)
    }

    pub fn save_promo_code(&self, promo: PromoCode) -> PromoCode {
        let saved = self.promo_codes.save(promo);
        self.emit(EntityKind::PromoCodes);
        saved
    }

    pub fn update_promo_code(
        &self,
        id: &str,
        patch: impl FnOnce(&mut PromoCode),
    ) -> Option<PromoCode> {
        let updated = self.promo_codes.update(id, patch);
        if updated.is_some() {
            self.emit(EntityKind::PromoCodes);
        }
        updated
    }

    pub fn delete_promo_code(&self, id: &str) -> bool {
        let removed = self.promo_codes.delete(id);
        if removed {
            self.emit(EntityKind::PromoCodes);
        }
        removed
    }

    pub fn replace_promo_codes(&self, items: Vec<PromoCode>) {
        self.promo_codes.replace_all(items);
        self.emit(EntityKind::PromoCodes);
    }

    // ── External change observation ──────────────────────────────────

    /// Every storage key this store responds to, canonical and legacy --
    /// legacy keys stay watched for backward compatibility.
    pub fn watched_keys(&self) -> Vec<String> {
        let mut keys = Vec::new();
        keys.push(self.activities.canonical_key().to_owned());
        keys.extend(self.activities.legacy_keys().map(str::to_owned));
        keys.push(self.bookings.canonical_key().to_owned());
        keys.extend(self.bookings.legacy_keys().map(str::to_owned));
        keys.push(self.vouchers.canonical_key().to_owned());
        keys.extend(self.vouchers.legacy_keys().map(str::to_owned));
        keys.push(self.promo_codes.canonical_key().to_owned());
        keys.extend(self.promo_codes.legacy_keys().map(str::to_owned));
        keys
    }

    /// Map a storage key (canonical or legacy) back to its kind.
    pub fn kind_for_key(&self, key: &str) -> Option<EntityKind> {
        let matches = |canonical: &str, legacy: &mut dyn Iterator<Item = &str>| {
            if key == canonical {
                return true;
            }
            for k in legacy {
                if k == key {
                    return true;
                }
            }
            false
        };
        if matches(self.activities.canonical_key(), &mut self.activities.legacy_keys()) {
            return Some(EntityKind::Activities);
        }
        if matches(self.bookings.canonical_key(), &mut self.bookings.legacy_keys()) {
            return Some(EntityKind::Bookings);
        }
        if matches(self.vouchers.canonical_key(), &mut self.vouchers.legacy_keys()) {
            return Some(EntityKind::Vouchers);
        }
        if matches(self.promo_codes.canonical_key(), &mut self.promo_codes.legacy_keys()) {
            return Some(EntityKind::PromoCodes);
        }
        None
    }

    /// Handle an external storage-change notification.
    ///
    /// The notification payload is treated as possibly stale: the store
    /// re-derives state from the canonical backend document rather than
    /// trusting it. Echoes of this instance's own writes are suppressed
    /// by the envelope-version comparison, so only genuine external
    /// changes re-emit on the bus.
    pub fn apply_external_change(&self, key: &str) -> Option<EntityKind> {
        let kind = self.kind_for_key(key)?;
        let changed = match kind {
            EntityKind::Activities => self.activities.refresh_from_backend(),
            EntityKind::Bookings => self.bookings.refresh_from_backend(),
            EntityKind::Vouchers => self.vouchers.refresh_from_backend(),
            EntityKind::PromoCodes => self.promo_codes.refresh_from_backend(),
        };
        if !changed {
            debug!(key, "external change was an echo of local state, skipping");
            return None;
        }
        self.bus.emit(kind, ChangeOrigin::External);
        Some(kind)
    }

    /// Bridge an observer's key-change notifications into
    /// [`Self::apply_external_change`] until cancelled.
    pub fn attach_observer(
        self: &Arc<Self>,
        observer: &dyn ChangeObserver,
        cancel: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        let mut rx = observer.changes();
        let store = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    change = rx.recv() => {
                        match change {
                            Ok(change) => {
                                store.apply_external_change(&change.key);
                            }
                            Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                                debug!(skipped, "observer notifications lagged; refreshing all kinds");
                                for key in store.watched_keys() {
                                    store.apply_external_change(&key);
                                }
                            }
                            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                        }
                    }
                }
            }
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::bus::ChangeOrigin;
    use crate::model::{Activity, ScheduleRule};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn backend() -> Arc<MemoryBackend> {
        Arc::new(MemoryBackend::new())
    }

    fn store_over(backend: &Arc<MemoryBackend>) -> EntityStore {
        EntityStore::new(
            Arc::clone(backend) as Arc<dyn StorageBackend>,
            EventBus::new(),
            StoreScope {
                organization_id: "org_1".into(),
                updated_by: Some("widget-test".into()),
            },
        )
    }

    fn activity(id: &str) -> Activity {
        Activity {
            id: id.into(),
            organization_id: "org_1".into(),
            name: "The Vault".into(),
            capacity: 8,
            base_price_cents: 3500,
            duration_minutes: 60,
            schedule: ScheduleRule::default(),
            blocked_dates: Default::default(),
            custom_available_dates: Default::default(),
            timezone: None,
            utc_offset_minutes: None,
            difficulty: Some(3),
            active: true,
            ticket_types: Vec::new(),
        }
    }

    fn canonical_envelope(backend: &MemoryBackend, kind: EntityKind) -> serde_json::Value {
        let raw = backend.read(&kind.canonical_key("org_1")).unwrap();
        serde_json::from_str(&raw).unwrap()
    }

    #[test]
    fn save_then_get_all_round_trips() {
        let backend = backend();
        let store = store_over(&backend);

        let saved = store.save_activity(activity("act_1"));
        assert_eq!(saved.id, "act_1");

        let all = store.activities();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].name, "The Vault");
        assert_eq!(all[0].capacity, 8);

        // The canonical envelope was written with advanced metadata.
        let env = canonical_envelope(&backend, EntityKind::Activities);
        assert_eq!(env["version"], 1);
        assert_eq!(env["organization_id"], "org_1");
        assert_eq!(env["updated_by"], "widget-test");
    }

    #[test]
    fn every_mutator_bumps_the_version() {
        let backend = backend();
        let store = store_over(&backend);

        store.save_activity(activity("act_1"));
        store.update_activity("act_1", |a| a.capacity = 10);
        store.save_activity(activity("act_2"));
        store.delete_activity("act_2");

        let env = canonical_envelope(&backend, EntityKind::Activities);
        assert_eq!(env["version"], 4);
    }

    #[test]
    fn mutators_emit_after_the_write() {
        let backend = backend();
        let store = store_over(&backend);
        let mut rx = store.bus().subscribe();

        store.save_activity(activity("act_1"));

        let event = rx.try_recv().unwrap();
        assert_eq!(event.kind, EntityKind::Activities);
        assert_eq!(event.origin, ChangeOrigin::Local);
        // The post-write state is already observable.
        assert_eq!(store.activities().len(), 1);
    }

    #[test]
    fn update_of_missing_id_changes_nothing_and_emits_nothing() {
        let backend = backend();
        let store = store_over(&backend);
        store.save_activity(activity("act_1"));

        let mut rx = store.bus().subscribe();
        assert!(store.update_activity("ghost", |a| a.capacity = 0).is_none());
        assert!(rx.try_recv().is_err());

        let env = canonical_envelope(&backend, EntityKind::Activities);
        assert_eq!(env["version"], 1, "no write for a miss");
    }

    #[test]
    fn legacy_flat_array_migrates_and_self_heals() {
        let backend = backend();
        backend.seed(
            "activities",
            json!([
                { "_id": 7, "title": "Haunted Manor", "capacity": "6", "price": "29.50" },
                { "name": "no id, dropped" }
            ])
            .to_string(),
        );

        let store = store_over(&backend);
        let all = store.activities();

        assert_eq!(all.len(), 1, "id-less record dropped");
        assert_eq!(all[0].id, "7");
        assert_eq!(all[0].capacity, 6);
        assert_eq!(all[0].base_price_cents, 2950);

        // Recovery rewrote the canonical envelope.
        assert!(backend.contains(&EntityKind::Activities.canonical_key("org_1")));

        // Second read path never re-touches legacy keys: corrupt the
        // legacy source, a fresh store over the same backend still
        // serves the migrated data.
        backend.seed("activities", "not json");
        let second = store_over(&backend);
        assert_eq!(second.activities().len(), 1);
        assert_eq!(second.activities()[0].name, "Haunted Manor");
    }

    #[test]
    fn scoped_legacy_key_is_scanned_after_global() {
        let backend = backend();
        backend.seed(
            "org_1:promo-codes",
            json!([{ "id": "p1", "code": "SAVE15", "rate": 15 }]).to_string(),
        );

        let store = store_over(&backend);
        let promos = store.promo_codes();
        assert_eq!(promos.len(), 1);
        assert_eq!(promos[0].code, "SAVE15");
    }

    #[test]
    fn reads_never_fail_on_garbage() {
        let backend = backend();
        backend.seed(EntityKind::Bookings.canonical_key("org_1"), "{ corrupt");
        backend.seed("bookings", "also corrupt");

        let store = store_over(&backend);
        assert!(store.bookings().is_empty());
    }

    #[test]
    fn write_failure_still_returns_in_memory_result() {
        let backend = backend();
        let store = store_over(&backend);
        backend.set_fail_writes(true);

        let saved = store.save_activity(activity("act_1"));
        assert_eq!(saved.id, "act_1");
        // Mutation is visible in memory despite the failed write.
        assert_eq!(store.activities().len(), 1);
        assert!(!backend.contains(&EntityKind::Activities.canonical_key("org_1")));
    }

    #[test]
    fn replace_all_swaps_the_collection() {
        let backend = backend();
        let store = store_over(&backend);
        store.save_activity(activity("act_1"));

        store.replace_activities(vec![activity("act_2"), activity("act_3")]);

        let ids: Vec<_> = store.activities().into_iter().map(|a| a.id).collect();
        assert_eq!(ids, vec!["act_2", "act_3"]);
    }

    #[test]
    fn external_change_from_another_instance_reemits() {
        let backend = backend();
        let ours = store_over(&backend);
        ours.save_activity(activity("act_1"));

        let key = EntityKind::Activities.canonical_key("org_1");

        // Our own write echoing back is suppressed.
        let mut rx = ours.bus().subscribe();
        assert!(ours.apply_external_change(&key).is_none());
        assert!(rx.try_recv().is_err());

        // Another widget instance writes the same backend.
        let theirs = store_over(&backend);
        theirs.save_activity(activity("act_2"));

        let kind = ours.apply_external_change(&key);
        assert_eq!(kind, Some(EntityKind::Activities));
        let event = rx.try_recv().unwrap();
        assert_eq!(event.origin, ChangeOrigin::External);
        // State was re-derived from the canonical document.
        assert_eq!(ours.activities().len(), 2);
    }

    #[test]
    fn kind_for_key_covers_canonical_and_legacy_keys() {
        let backend = backend();
        let store = store_over(&backend);

        assert_eq!(
            store.kind_for_key("bookly:org_1:activities"),
            Some(EntityKind::Activities)
        );
        assert_eq!(store.kind_for_key("activities"), Some(EntityKind::Activities));
        assert_eq!(
            store.kind_for_key("org_1:vouchers"),
            Some(EntityKind::Vouchers)
        );
        assert_eq!(store.kind_for_key("unrelated"), None);
    }
}
