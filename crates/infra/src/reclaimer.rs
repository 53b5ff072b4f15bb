//! Expiry reclaimer: the background sweep that returns timed-out leases.
//!
//! The reclaimer is the only writer allowed to expire a lease on time
//! grounds. The purchase path rejects a timed-out lease but never flips it,
//! so exactly one component ever returns a given unit to stock.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use dropshop_events::{DropEvent, EventBus};
use dropshop_reservations::Reservation;

use crate::store::{ItemSection, ReservationStore};

/// Reclaimer tuning.
#[derive(Debug, Clone)]
pub struct ReclaimerConfig {
    /// How often to sweep for timed-out leases.
    pub sweep_interval: Duration,
    /// Name used in logs.
    pub name: String,
}

impl Default for ReclaimerConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(10),
            name: "expiry-reclaimer".to_string(),
        }
    }
}

impl ReclaimerConfig {
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

/// Handle to a running reclaimer.
#[derive(Debug)]
pub struct ReclaimerHandle {
    shutdown: mpsc::Sender<()>,
    join: Option<JoinHandle<()>>,
    stats: Arc<Mutex<ReclaimerStats>>,
}

impl ReclaimerHandle {
    /// Request graceful shutdown and wait for the loop to finish.
    pub async fn shutdown(mut self) {
        let _ = self.shutdown.send(()).await;
        if let Some(join) = self.join.take() {
            let _ = join.await;
        }
    }

    /// Lifetime statistics of the sweep loop.
    pub fn stats(&self) -> ReclaimerStats {
        self.stats.lock().unwrap().clone()
    }
}

/// Lifetime statistics of a reclaimer, surfaced by the health endpoint.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct ReclaimerStats {
    pub sweeps: u64,
    pub reclaimed: u64,
    pub skipped: u64,
    pub failed: u64,
    pub uptime_secs: u64,
}

/// Outcome of a single sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
    /// Candidates returned by the expiry scan.
    pub scanned: usize,
    /// Leases flipped to expired with their unit returned.
    pub reclaimed: usize,
    /// Candidates no longer reclaimable at re-verification.
    pub skipped: usize,
    /// Candidates whose reclaim failed; logged, sweep continued.
    pub failed: usize,
}

/// Background sweep over timed-out leases.
pub struct ExpiryReclaimer<S, N> {
    store: S,
    notifier: N,
}

impl<S, N> ExpiryReclaimer<S, N>
where
    S: ReservationStore + 'static,
    N: EventBus<DropEvent> + 'static,
{
    pub fn new(store: S, notifier: N) -> Self {
        Self { store, notifier }
    }

    /// Spawn the sweep loop on the current runtime.
    pub fn spawn(self, config: ReclaimerConfig) -> ReclaimerHandle {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let stats = Arc::new(Mutex::new(ReclaimerStats::default()));

        let join = tokio::spawn(reclaimer_loop(self, config, shutdown_rx, stats.clone()));

        ReclaimerHandle {
            shutdown: shutdown_tx,
            join: Some(join),
            stats,
        }
    }

    /// Run one sweep against the clock value `now`.
    ///
    /// Public so tests and the loop share one code path. The scan is an
    /// unlocked snapshot; every candidate is re-verified under its item
    /// section before anything is written, and one candidate's failure never
    /// stops the rest of the sweep.
    pub async fn sweep_once(&self, now: DateTime<Utc>) -> SweepStats {
        let candidates = match self.store.find_timed_out(now).await {
            Ok(candidates) => candidates,
            Err(err) => {
                warn!(error = %err, "expiry scan failed");
                return SweepStats::default();
            }
        };

        let mut stats = SweepStats {
            scanned: candidates.len(),
            ..SweepStats::default()
        };

        for candidate in candidates {
            match self.reclaim_one(&candidate, now).await {
                Ok(Some(available_stock)) => {
                    stats.reclaimed += 1;
                    info!(
                        reservation_id = %candidate.id,
                        item_id = %candidate.item_id,
                        available_stock,
                        "lease expired, unit returned"
                    );
                    self.publish(DropEvent::StockChanged {
                        item_id: candidate.item_id,
                        available_stock,
                    });
                    self.publish(DropEvent::ReservationChanged {
                        reservation_id: candidate.id,
                        item_id: candidate.item_id,
                        holder_id: candidate.holder_id,
                        available_stock,
                    });
                }
                Ok(None) => stats.skipped += 1,
                Err(err) => {
                    stats.failed += 1;
                    warn!(
                        reservation_id = %candidate.id,
                        item_id = %candidate.item_id,
                        error = %err,
                        "failed to reclaim lease"
                    );
                }
            }
        }

        stats
    }

    /// Reclaim a single candidate. `Ok(None)` means it was no longer
    /// reclaimable when re-checked under the lock; `Ok(Some(n))` carries the
    /// post-return availability.
    async fn reclaim_one(
        &self,
        candidate: &Reservation,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Option<u32>> {
        let mut section = self.store.enter_item(candidate.item_id).await?;

        // Re-check under the item lock: the holder may have completed the
        // purchase, or a previous sweep may have reclaimed this lease,
        // between the scan and now.
        let Some(mut reservation) = section.reservation(candidate.id).await? else {
            return Ok(None);
        };
        if !reservation.is_active() || !reservation.is_timed_out(now) {
            return Ok(None);
        }

        reservation.expire()?;

        let mut item = section.item().clone();
        if let Err(err) = item.return_unit() {
            // Crediting past total means this unit was already returned
            // through some other path. Alert and leave the store untouched.
            error!(
                reservation_id = %reservation.id,
                item_id = %item.id,
                error = %err,
                "stock accounting overrun during reclaim"
            );
            return Err(err.into());
        }
        let available_stock = item.available_stock();

        section.stage_item(item);
        section.stage_reservation(reservation);
        section.commit().await?;

        Ok(Some(available_stock))
    }

    fn publish(&self, event: DropEvent) {
        let kind = event.kind();
        if let Err(err) = self.notifier.publish(event) {
            warn!(kind, error = ?err, "failed to publish live update");
        }
    }
}

async fn reclaimer_loop<S, N>(
    reclaimer: ExpiryReclaimer<S, N>,
    config: ReclaimerConfig,
    mut shutdown_rx: mpsc::Receiver<()>,
    stats: Arc<Mutex<ReclaimerStats>>,
) where
    S: ReservationStore + 'static,
    N: EventBus<DropEvent> + 'static,
{
    info!(
        reclaimer = %config.name,
        interval_ms = config.sweep_interval.as_millis() as u64,
        "expiry reclaimer started"
    );
    let started = Instant::now();

    let mut ticker = tokio::time::interval(config.sweep_interval);
    // A slow sweep delays the next tick instead of bursting to catch up;
    // sweeps never overlap.
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            _ = ticker.tick() => {
                let sweep = reclaimer.sweep_once(Utc::now()).await;
                if sweep.reclaimed > 0 || sweep.failed > 0 {
                    debug!(
                        reclaimer = %config.name,
                        scanned = sweep.scanned,
                        reclaimed = sweep.reclaimed,
                        skipped = sweep.skipped,
                        failed = sweep.failed,
                        "sweep finished"
                    );
                }

                let mut lifetime = stats.lock().unwrap();
                lifetime.sweeps += 1;
                lifetime.reclaimed += sweep.reclaimed as u64;
                lifetime.skipped += sweep.skipped as u64;
                lifetime.failed += sweep.failed as u64;
                lifetime.uptime_secs = started.elapsed().as_secs();
            }
        }
    }

    info!(reclaimer = %config.name, "expiry reclaimer stopped");
}
