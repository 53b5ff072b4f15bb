//! Service wiring: store, event bus, reservation manager, expiry reclaimer,
//! and the bus -> broadcast relay behind the SSE endpoint.

use std::{
    convert::Infallible,
    sync::Arc,
    time::{Duration, Instant},
};

use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use tokio::sync::broadcast;
use tokio_stream::{StreamExt, wrappers::BroadcastStream};

use dropshop_core::{DomainError, DomainResult, HolderId, ItemId, ReservationId};
use dropshop_events::{DropEvent, EventBus, InMemoryEventBus};
use dropshop_infra::manager::{ReservationConfig, ReservationManager, ReserveReceipt};
use dropshop_infra::reclaimer::{
    ExpiryReclaimer, ReclaimerConfig, ReclaimerHandle, ReclaimerStats,
};
use dropshop_infra::store::{
    InMemoryReservationStore, PostgresReservationStore, ReservationStore, StoreError,
};
use dropshop_inventory::Item;
use dropshop_reservations::{Purchase, Reservation};

/// Both store backends publish through the same in-process bus.
pub type Notifier = Arc<InMemoryEventBus<DropEvent>>;

pub type InMemoryManager = ReservationManager<InMemoryReservationStore, Notifier>;
pub type PersistentManager = ReservationManager<PostgresReservationStore, Notifier>;

/// Service container injected into every handler via `Extension`.
///
/// The backend is picked once at startup: Postgres when `DATABASE_URL` is
/// set, the in-memory store otherwise. The container also owns the reclaimer
/// handle; dropping it would close the sweep's shutdown channel, so it lives
/// here for the life of the process.
#[derive(Clone)]
pub enum AppServices {
    InMemory {
        manager: Arc<InMemoryManager>,
        store: InMemoryReservationStore,
        realtime_tx: broadcast::Sender<DropEvent>,
        reclaimer: Arc<ReclaimerHandle>,
        started_at: Instant,
    },
    Persistent {
        manager: Arc<PersistentManager>,
        store: PostgresReservationStore,
        realtime_tx: broadcast::Sender<DropEvent>,
        reclaimer: Arc<ReclaimerHandle>,
        started_at: Instant,
    },
}

/// Build services from the environment.
pub async fn build_services() -> AppServices {
    let config = ReservationConfig::default()
        .with_lease_duration(chrono::Duration::seconds(env_secs("RESERVATION_TTL_SECS", 60)));
    let sweep_interval = Duration::from_secs(env_secs("SWEEP_INTERVAL_SECS", 10) as u64);

    match std::env::var("DATABASE_URL") {
        Ok(url) => build_persistent_services(&url, config, sweep_interval).await,
        Err(_) => {
            tracing::info!("DATABASE_URL not set; using the in-memory store");
            build_in_memory_services(config, sweep_interval)
        }
    }
}

pub fn build_in_memory_services(
    config: ReservationConfig,
    sweep_interval: Duration,
) -> AppServices {
    let store = InMemoryReservationStore::new();
    let bus: Notifier = Arc::new(InMemoryEventBus::new());

    let manager = Arc::new(ReservationManager::new(store.clone(), bus.clone(), config));
    let realtime_tx = spawn_realtime_relay(&bus);
    let reclaimer = ExpiryReclaimer::new(store.clone(), bus.clone())
        .spawn(ReclaimerConfig::default().with_sweep_interval(sweep_interval));

    AppServices::InMemory {
        manager,
        store,
        realtime_tx,
        reclaimer: Arc::new(reclaimer),
        started_at: Instant::now(),
    }
}

pub async fn build_persistent_services(
    database_url: &str,
    config: ReservationConfig,
    sweep_interval: Duration,
) -> AppServices {
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(16)
        .connect(database_url)
        .await
        .expect("failed to connect to postgres");

    let store = PostgresReservationStore::new(pool);
    store
        .ensure_schema()
        .await
        .expect("failed to prepare the postgres schema");

    let bus: Notifier = Arc::new(InMemoryEventBus::new());

    let manager = Arc::new(ReservationManager::new(store.clone(), bus.clone(), config));
    let realtime_tx = spawn_realtime_relay(&bus);
    let reclaimer = ExpiryReclaimer::new(store.clone(), bus.clone())
        .spawn(ReclaimerConfig::default().with_sweep_interval(sweep_interval));

    AppServices::Persistent {
        manager,
        store,
        realtime_tx,
        reclaimer: Arc::new(reclaimer),
        started_at: Instant::now(),
    }
}

/// Forward engine events into a lossy broadcast channel for the SSE
/// handlers. A slow or absent listener never slows the engine down.
fn spawn_realtime_relay(bus: &Notifier) -> broadcast::Sender<DropEvent> {
    let (realtime_tx, _) = broadcast::channel::<DropEvent>(256);

    let subscription = bus.subscribe();
    let tx = realtime_tx.clone();
    tokio::task::spawn_blocking(move || {
        loop {
            match subscription.recv() {
                // A send error only means nobody is subscribed right now.
                Ok(event) => {
                    let _ = tx.send(event);
                }
                Err(_) => break,
            }
        }
    });

    realtime_tx
}

/// Live-update stream: one SSE message per engine event, named by its wire
/// kind and carrying the event as JSON.
pub fn live_event_stream(
    services: Arc<AppServices>,
) -> Sse<impl tokio_stream::Stream<Item = Result<SseEvent, Infallible>>> {
    let rx = services.realtime_tx().subscribe();
    let stream = BroadcastStream::new(rx).filter_map(|message| match message {
        Ok(event) => {
            let data = serde_json::to_string(&event).unwrap_or_else(|_| "{}".to_string());
            Some(Ok(SseEvent::default().event(event.kind()).data(data)))
        }
        // A lagged receiver skips the overwritten backlog and keeps going.
        Err(_) => None,
    });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}

fn env_secs(name: &str, default_secs: i64) -> i64 {
    match std::env::var(name) {
        Ok(raw) => match raw.parse::<i64>() {
            Ok(secs) if secs > 0 => secs,
            _ => {
                tracing::warn!("{name}={raw} is not a positive number of seconds; using {default_secs}");
                default_secs
            }
        },
        Err(_) => default_secs,
    }
}

impl AppServices {
    pub fn realtime_tx(&self) -> &broadcast::Sender<DropEvent> {
        match self {
            AppServices::InMemory { realtime_tx, .. } => realtime_tx,
            AppServices::Persistent { realtime_tx, .. } => realtime_tx,
        }
    }

    pub fn reclaimer_stats(&self) -> ReclaimerStats {
        match self {
            AppServices::InMemory { reclaimer, .. } => reclaimer.stats(),
            AppServices::Persistent { reclaimer, .. } => reclaimer.stats(),
        }
    }

    pub fn uptime_secs(&self) -> u64 {
        let started_at = match self {
            AppServices::InMemory { started_at, .. } => started_at,
            AppServices::Persistent { started_at, .. } => started_at,
        };
        started_at.elapsed().as_secs()
    }

    pub async fn create_item(&self, item: &Item) -> DomainResult<()> {
        match self {
            AppServices::InMemory { store, .. } => store.insert_item(item).await,
            AppServices::Persistent { store, .. } => store.insert_item(item).await,
        }
        .map_err(store_error_to_domain)
    }

    pub async fn item(&self, item_id: ItemId) -> DomainResult<Option<Item>> {
        match self {
            AppServices::InMemory { store, .. } => store.get_item(item_id).await,
            AppServices::Persistent { store, .. } => store.get_item(item_id).await,
        }
        .map_err(store_error_to_domain)
    }

    pub async fn items(&self) -> DomainResult<Vec<Item>> {
        match self {
            AppServices::InMemory { store, .. } => store.list_items().await,
            AppServices::Persistent { store, .. } => store.list_items().await,
        }
        .map_err(store_error_to_domain)
    }

    pub async fn recent_purchases(
        &self,
        item_id: ItemId,
        limit: usize,
    ) -> DomainResult<Vec<Purchase>> {
        match self {
            AppServices::InMemory { store, .. } => store.recent_purchases(item_id, limit).await,
            AppServices::Persistent { store, .. } => store.recent_purchases(item_id, limit).await,
        }
        .map_err(store_error_to_domain)
    }

    pub async fn active_reservation(
        &self,
        holder_id: HolderId,
        item_id: ItemId,
    ) -> DomainResult<Option<Reservation>> {
        match self {
            AppServices::InMemory { store, .. } => {
                store.find_active_reservation(holder_id, item_id).await
            }
            AppServices::Persistent { store, .. } => {
                store.find_active_reservation(holder_id, item_id).await
            }
        }
        .map_err(store_error_to_domain)
    }

    pub async fn purchases_for_holder(&self, holder_id: HolderId) -> DomainResult<Vec<Purchase>> {
        match self {
            AppServices::InMemory { store, .. } => store.list_purchases_by_holder(holder_id).await,
            AppServices::Persistent { store, .. } => {
                store.list_purchases_by_holder(holder_id).await
            }
        }
        .map_err(store_error_to_domain)
    }

    pub async fn reserve(
        &self,
        holder_id: HolderId,
        item_id: ItemId,
    ) -> DomainResult<ReserveReceipt> {
        match self {
            AppServices::InMemory { manager, .. } => manager.reserve(holder_id, item_id).await,
            AppServices::Persistent { manager, .. } => manager.reserve(holder_id, item_id).await,
        }
    }

    pub async fn complete_purchase(
        &self,
        holder_id: HolderId,
        reservation_id: ReservationId,
    ) -> DomainResult<Purchase> {
        match self {
            AppServices::InMemory { manager, .. } => {
                manager.complete_purchase(holder_id, reservation_id).await
            }
            AppServices::Persistent { manager, .. } => {
                manager.complete_purchase(holder_id, reservation_id).await
            }
        }
    }
}

fn store_error_to_domain(err: StoreError) -> DomainError {
    match err {
        StoreError::Conflict(message) => DomainError::transient_conflict(message),
        StoreError::NotFound(message) => DomainError::not_found(message),
        StoreError::Constraint(message) | StoreError::Storage(message) => {
            DomainError::storage(message)
        }
    }
}
