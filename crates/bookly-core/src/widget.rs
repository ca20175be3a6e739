// ── Widget composition root ──
//
// Full lifecycle management for one widget instance. Owns the store,
// the event bus, the engines, and the background tasks (catalog refresh,
// live change feed, storage observer), and wires them together the way
// the embedding shell expects: construct, connect, consume.

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use chrono::NaiveDate;
use dashmap::DashMap;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use bookly_api::live::{ChangeEvent, LiveFeedHandle, ReconnectConfig, Subscription};
use bookly_api::types::{WireActivity, WireSession};
use bookly_api::BackendClient;

use crate::availability::{AvailabilityEngine, Clock, SystemClock};
use crate::bus::EventBus;
use crate::checkout::CheckoutEngine;
use crate::config::WidgetConfig;
use crate::convert::activity_from_wire;
use crate::error::CoreError;
use crate::model::{Session, Slot, Venue};
use crate::observer::PollingObserver;
use crate::store::{EntityStore, StorageBackend, StoreScope};

// ── ConnectionState ──────────────────────────────────────────────

/// Connection state observable by consumers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// Backend unreachable but cached store data is serving reads.
    Degraded,
    Failed,
}

// ── BookingWidget ────────────────────────────────────────────────

/// The main entry point for consumers.
///
/// Cheaply cloneable via `Arc<WidgetInner>`. Manages the full
/// lifecycle: catalog fetch, background refresh, the live session feed,
/// cross-instance storage observation, and checkout hand-off.
#[derive(Clone)]
pub struct BookingWidget {
    inner: Arc<WidgetInner>,
}

struct WidgetInner {
    config: WidgetConfig,
    api: Arc<BackendClient>,
    store: Arc<EntityStore>,
    bus: EventBus,
    checkout: CheckoutEngine,
    clock: Arc<dyn Clock>,
    venue: ArcSwapOption<Venue>,
    /// Live-session cache per (activity, date). `generation` increments
    /// on every applied feed change so stale refetches can be dropped.
    sessions: DashMap<(String, NaiveDate), SessionCacheEntry>,
    connection_state: watch::Sender<ConnectionState>,
    cancel: CancellationToken,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

#[derive(Debug, Clone)]
struct SessionCacheEntry {
    generation: u64,
    sessions: Vec<Session>,
}

impl BookingWidget {
    /// Create a widget from configuration. Does NOT connect -- call
    /// [`connect()`](Self::connect) to fetch the catalog and start
    /// background tasks.
    pub fn new(config: WidgetConfig, api: BackendClient, backend: Arc<dyn StorageBackend>) -> Self {
        Self::with_clock(config, api, backend, Arc::new(SystemClock))
    }

    /// As [`new`](Self::new) with an injected clock, for deterministic
    /// schedule computation in tests.
    pub fn with_clock(
        config: WidgetConfig,
        api: BackendClient,
        backend: Arc<dyn StorageBackend>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let bus = EventBus::new();
        let scope = StoreScope {
            organization_id: config.organization_id.clone(),
            updated_by: config.updated_by.clone(),
        };
        let store = Arc::new(EntityStore::new(backend, bus.clone(), scope));
        let api = Arc::new(api);
        let checkout = CheckoutEngine::new(Arc::clone(&api), Arc::clone(&store), Arc::clone(&clock));
        let (connection_state, _) = watch::channel(ConnectionState::Disconnected);

        Self {
            inner: Arc::new(WidgetInner {
                config,
                api,
                store,
                bus,
                checkout,
                clock,
                venue: ArcSwapOption::empty(),
                sessions: DashMap::new(),
                connection_state,
                cancel: CancellationToken::new(),
                task_handles: Mutex::new(Vec::new()),
            }),
        }
    }

    // ── Accessors ────────────────────────────────────────────────

    pub fn config(&self) -> &WidgetConfig {
        &self.inner.config
    }

    pub fn store(&self) -> &Arc<EntityStore> {
        &self.inner.store
    }

    pub fn bus(&self) -> &EventBus {
        &self.inner.bus
    }

    pub fn checkout(&self) -> &CheckoutEngine {
        &self.inner.checkout
    }

    pub fn venue(&self) -> Option<Arc<Venue>> {
        self.inner.venue.load_full()
    }

    /// Authoritative fee rate once the venue is fetched, configured
    /// fallback before.
    pub fn fee_rate(&self) -> f64 {
        self.venue()
            .map_or(self.inner.config.fee_rate, |v| v.fee_rate)
    }

    fn venue_offset_minutes(&self) -> i32 {
        self.venue()
            .map_or(self.inner.config.utc_offset_minutes, |v| {
                v.utc_offset_minutes
            })
    }

    /// Subscribe to connection state changes.
    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.connection_state.subscribe()
    }

    // ── Connection lifecycle ─────────────────────────────────────

    /// Connect: fetch the venue and active catalog into the store, then
    /// spawn background tasks. A network failure falls back to cached
    /// store state (Degraded) and only errors when no cached data
    /// exists at all.
    pub async fn connect(&self) -> Result<(), CoreError> {
        let _ = self
            .inner
            .connection_state
            .send(ConnectionState::Connecting);

        match self.refresh_catalog().await {
            Ok(()) => {
                let _ = self.inner.connection_state.send(ConnectionState::Connected);
            }
            Err(e) => {
                let cached = self.inner.store.activities();
                if cached.is_empty() {
                    let _ = self.inner.connection_state.send(ConnectionState::Failed);
                    return Err(e);
                }
                warn!(error = %e, cached = cached.len(), "catalog fetch failed, serving cached data");
                let _ = self.inner.connection_state.send(ConnectionState::Degraded);
            }
        }

        self.spawn_background_tasks().await;
        info!(venue = %self.inner.config.venue_id, "widget connected");
        Ok(())
    }

    /// Disconnect: cancel background tasks and join them.
    pub async fn disconnect(&self) {
        self.inner.cancel.cancel();

        let mut handles = self.inner.task_handles.lock().await;
        for handle in handles.drain(..) {
            let _ = handle.await;
        }

        let _ = self
            .inner
            .connection_state
            .send(ConnectionState::Disconnected);
        debug!("widget disconnected");
    }

    async fn spawn_background_tasks(&self) {
        let mut handles = self.inner.task_handles.lock().await;
        let cancel = self.inner.cancel.clone();

        let interval_secs = self.inner.config.refresh_interval_secs;
        if interval_secs > 0 {
            let widget = self.clone();
            handles.push(tokio::spawn(refresh_task(
                widget,
                interval_secs,
                cancel.clone(),
            )));
        }

        if self.inner.config.live_enabled {
            if let Some(handle) = self.start_live_feed() {
                let widget = self.clone();
                handles.push(tokio::spawn(live_feed_task(widget, handle, cancel.clone())));
            }
        }

        if self.inner.config.polling_interval_secs > 0 {
            let observer = PollingObserver::spawn(
                self.backend_for_observer(),
                self.inner.store.watched_keys(),
                std::time::Duration::from_secs(self.inner.config.polling_interval_secs),
                cancel.clone(),
            );
            handles.push(self.inner.store.attach_observer(&observer, cancel));
        }
    }

    fn backend_for_observer(&self) -> Arc<dyn StorageBackend> {
        // The observer shares the store's backend; the store hands out
        // an owning handle for it.
        Arc::clone(self.inner.store.backend())
    }

    fn start_live_feed(&self) -> Option<LiveFeedHandle> {
        let base = self.inner.api.base_url();
        let mut ws_url = base.clone();
        let scheme = if base.scheme() == "http" { "ws" } else { "wss" };
        if ws_url.set_scheme(scheme).is_err() {
            warn!(url = %base, "cannot derive live feed URL, live updates disabled");
            return None;
        }
        ws_url.set_path("/widget/v1/live");

        let mut subscriptions = vec![
            Subscription::table("activities").filtered("venue_id", &self.inner.config.venue_id),
        ];
        for activity in self.inner.store.activities() {
            subscriptions
                .push(Subscription::table("sessions").filtered("activity_id", &activity.id));
        }

        Some(LiveFeedHandle::connect(
            ws_url,
            subscriptions,
            ReconnectConfig::default(),
            self.inner.cancel.clone(),
        ))
    }

    // ── Catalog ──────────────────────────────────────────────────

    /// Fetch the venue and its active activities into the store.
    pub async fn refresh_catalog(&self) -> Result<(), CoreError> {
        let venue: Venue = self
            .inner
            .api
            .venue(&self.inner.config.venue_id)
            .await
            .map(Into::into)
            .map_err(CoreError::from)?;

        let wires = self
            .inner
            .api
            .activities(&venue.id, true)
            .await
            .map_err(CoreError::from)?;

        let activities: Vec<_> = wires
            .into_iter()
            .map(|w| activity_from_wire(w, &venue))
            .collect();

        debug!(activities = activities.len(), "catalog refresh complete");
        self.inner.venue.store(Some(Arc::new(venue)));
        self.inner.store.replace_activities(activities);
        Ok(())
    }

    // ── Availability ─────────────────────────────────────────────

    /// Ranked bookable slots for (activity, date).
    ///
    /// Live sessions take precedence; any error fetching them triggers
    /// the procedural fallback rather than surfacing.
    pub async fn slots(&self, activity_id: &str, date: NaiveDate) -> Result<Vec<Slot>, CoreError> {
        let activity = self
            .inner
            .store
            .activity(activity_id)
            .ok_or_else(|| CoreError::NotFound {
                entity_kind: "activity".into(),
                identifier: activity_id.to_owned(),
            })?;

        let sessions = self.sessions_for(activity_id, date).await;
        let bookings = self.inner.store.bookings();

        let engine = AvailabilityEngine::new(
            Arc::clone(&self.inner.clock),
            self.venue_offset_minutes(),
        );
        Ok(engine.compute_slots(&activity, date, &bookings, &sessions))
    }

    /// Cached live sessions for (activity, date), fetching on miss.
    /// Fetch failures yield an empty list -- the procedural fallback.
    async fn sessions_for(&self, activity_id: &str, date: NaiveDate) -> Vec<Session> {
        let key = (activity_id.to_owned(), date);
        if let Some(entry) = self.inner.sessions.get(&key) {
            return entry.sessions.clone();
        }

        match self.inner.api.sessions(activity_id, date, date).await {
            Ok(wires) => {
                let sessions: Vec<Session> = wires.into_iter().map(Into::into).collect();
                self.inner.sessions.insert(
                    key,
                    SessionCacheEntry {
                        generation: 0,
                        sessions: sessions.clone(),
                    },
                );
                sessions
            }
            Err(e) => {
                debug!(error = %e, activity = activity_id, "live session fetch failed, using procedural slots");
                Vec::new()
            }
        }
    }

    // ── Live feed handling ───────────────────────────────────────

    async fn handle_live_change(&self, change: &ChangeEvent) {
        match change {
            ChangeEvent::Update { table, record } if table == "sessions" => {
                self.merge_session_update(record.clone());
            }
            ChangeEvent::Insert { table, record } if table == "sessions" => {
                // Inserts carry no guarantee about which cached ranges
                // they affect beyond the activity; refetch them.
                let activity_id = record
                    .get("activity_id")
                    .and_then(serde_json::Value::as_str)
                    .map(str::to_owned);
                if let Some(activity_id) = activity_id {
                    self.refetch_cached_dates(&activity_id).await;
                }
            }
            ChangeEvent::Delete { table, id } if table == "sessions" => {
                let affected: Vec<String> = self
                    .inner
                    .sessions
                    .iter()
                    .filter(|entry| entry.sessions.iter().any(|s| s.id == *id))
                    .map(|entry| entry.key().0.clone())
                    .collect();
                for activity_id in affected {
                    self.refetch_cached_dates(&activity_id).await;
                }
            }
            ChangeEvent::Update { table, record } | ChangeEvent::Insert { table, record }
                if table == "activities" =>
            {
                self.merge_activity_change(record.clone());
            }
            ChangeEvent::Delete { table, id } if table == "activities" => {
                self.inner.store.delete_activity(id);
            }
            _ => {}
        }
    }

    /// Replace the matching session record in place. Entries that don't
    /// hold the session are untouched, so a concurrent local refetch in
    /// the same cycle is not silently discarded.
    fn merge_session_update(&self, record: serde_json::Value) {
        let Ok(wire) = serde_json::from_value::<WireSession>(record) else {
            debug!("undecodable session update from live feed, ignoring");
            return;
        };
        let session = Session::from(wire);

        for mut entry in self.inner.sessions.iter_mut() {
            if entry.key().0 != session.activity_id {
                continue;
            }
            if let Some(existing) = entry
                .sessions
                .iter_mut()
                .find(|s| s.id == session.id)
            {
                *existing = session.clone();
                entry.generation += 1;
            }
        }
    }

    fn merge_activity_change(&self, record: serde_json::Value) {
        let Some(venue) = self.venue() else {
            return;
        };
        let Ok(wire) = serde_json::from_value::<WireActivity>(record) else {
            debug!("undecodable activity change from live feed, ignoring");
            return;
        };
        self.inner
            .store
            .save_activity(activity_from_wire(wire, &venue));
    }

    /// Refetch every cached date range for an activity, dropping any
    /// result that raced a newer feed change (generation moved on).
    async fn refetch_cached_dates(&self, activity_id: &str) {
        let targets: Vec<(NaiveDate, u64)> = self
            .inner
            .sessions
            .iter_mut()
            .filter(|entry| entry.key().0 == activity_id)
            .map(|mut entry| {
                entry.generation += 1;
                (entry.key().1, entry.generation)
            })
            .collect();

        for (date, generation) in targets {
            match self.inner.api.sessions(activity_id, date, date).await {
                Ok(wires) => {
                    let sessions: Vec<Session> = wires.into_iter().map(Into::into).collect();
                    let key = (activity_id.to_owned(), date);
                    if let Some(mut entry) = self.inner.sessions.get_mut(&key) {
                        if entry.generation == generation {
                            entry.sessions = sessions;
                        } else {
                            debug!(activity = activity_id, %date, "dropping stale session refetch");
                        }
                    }
                }
                Err(e) => {
                    warn!(error = %e, activity = activity_id, "session refetch failed");
                }
            }
        }
    }
}

// ── Background tasks ─────────────────────────────────────────────

/// Periodically refresh the catalog.
async fn refresh_task(widget: BookingWidget, interval_secs: u64, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(std::time::Duration::from_secs(interval_secs));
    interval.tick().await; // consume the immediate first tick

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {
                if let Err(e) = widget.refresh_catalog().await {
                    warn!(error = %e, "periodic catalog refresh failed");
                }
            }
        }
    }
}

/// Consume live feed changes until cancelled.
async fn live_feed_task(widget: BookingWidget, feed: LiveFeedHandle, cancel: CancellationToken) {
    let mut rx = feed.subscribe();

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            change = rx.recv() => {
                match change {
                    Ok(change) => widget.handle_live_change(&change).await,
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "live feed lagged, dropping missed changes");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    feed.shutdown();
}
