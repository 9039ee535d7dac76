//! Source registry for data-source collectors
//!
//! This module owns the registered collectors, their enable/priority settings and
//! a health record per collector, and dispatches collector runs.
//!
//! # Architecture
//!
//! ```text
//!                    ┌──────────────────┐
//!  run_all(window) ─▶│  select eligible │── every Nth run: + failed collectors
//!                    └────────┬─────────┘
//!                             │ spawn (bounded by semaphore)
//!          ┌──────────────────┼──────────────────┐
//!          ▼                  ▼                  ▼
//!    ┌───────────┐      ┌───────────┐      ┌───────────┐
//!    │ collector │      │ collector │      │ collector │
//!    └─────┬─────┘      └─────┬─────┘      └─────┬─────┘
//!          └──────────── mpsc channel ───────────┘
//!                             │
//!                  join all, partition, update health
//! ```

pub mod health;

pub use health::{HealthRecord, HealthStatus, DEGRADED_AFTER, FAILED_AFTER};

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Semaphore};

use crate::error::AvspotterErrorTrait;
use crate::metrics;
use crate::models::Item;
use crate::services::Collector;
use crate::utils::error::CollectorError;

/// Every Nth run re-admits failed collectors
pub const DEFAULT_RECOVERY_INTERVAL: u64 = 10;

/// One registered collector
struct Registration {
    collector: Arc<dyn Collector>,
    enabled: bool,
    priority: i32,
    seq: u64,
    health: HealthRecord,
}

/// Reporting view of a registration
#[derive(Debug, Clone, Serialize)]
pub struct CollectorStatus {
    pub name: String,
    pub enabled: bool,
    pub priority: i32,
    pub health: HealthRecord,
}

/// Result message sent by a collector task
struct CollectorRun {
    index: usize,
    name: String,
    result: Result<Vec<Item>, CollectorError>,
    elapsed: Duration,
}

/// Registry of collectors with health tracking
///
/// Health records are mutated only inside short, non-async critical sections,
/// so the registry can be shared freely between tasks.
pub struct SourceRegistry {
    registrations: Mutex<HashMap<String, Registration>>,
    next_seq: AtomicU64,
    run_count: AtomicU64,
    recovery_interval: u64,
}

impl Default for SourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::with_recovery_interval(DEFAULT_RECOVERY_INTERVAL)
    }

    /// Create an empty registry re-admitting failed collectors every `interval` runs
    pub fn with_recovery_interval(interval: u64) -> Self {
        Self {
            registrations: Mutex::new(HashMap::new()),
            next_seq: AtomicU64::new(0),
            run_count: AtomicU64::new(0),
            recovery_interval: interval.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Registration>> {
        self.registrations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a collector, replacing any registration with the same name
    ///
    /// The registration starts with a fresh healthy record.
    pub fn register(&self, collector: Arc<dyn Collector>, enabled: bool, priority: i32) {
        let name = collector.name().to_string();
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);

        let replaced = self
            .lock()
            .insert(
                name.clone(),
                Registration {
                    collector,
                    enabled,
                    priority,
                    seq,
                    health: HealthRecord::new(),
                },
            )
            .is_some();

        tracing::info!(collector = %name, enabled, priority, replaced, "Registered collector");
    }

    /// Toggle a collector's eligibility without touching its health
    ///
    /// Returns `false` if no collector with that name is registered.
    pub fn set_enabled(&self, name: &str, enabled: bool) -> bool {
        match self.lock().get_mut(name) {
            Some(registration) => {
                registration.enabled = enabled;
                tracing::info!(collector = name, enabled, "Collector toggled");
                true
            }
            None => false,
        }
    }

    /// Enabled, non-failed collectors ordered by priority then registration order
    pub fn eligible_collectors(&self) -> Vec<Arc<dyn Collector>> {
        self.select(|r| r.enabled && r.health.status.is_eligible())
            .into_iter()
            .map(|(_, collector)| collector)
            .collect()
    }

    /// Enabled collectors currently in the failed state, in dispatch order
    fn recovering_collectors(&self) -> Vec<(String, Arc<dyn Collector>)> {
        self.select(|r| r.enabled && !r.health.status.is_eligible())
    }

    fn select(&self, filter: impl Fn(&Registration) -> bool) -> Vec<(String, Arc<dyn Collector>)> {
        let registrations = self.lock();
        let mut selected: Vec<_> = registrations
            .iter()
            .filter(|(_, r)| filter(r))
            .collect();

        selected.sort_by_key(|(_, r)| (r.priority, r.seq));

        selected
            .into_iter()
            .map(|(name, r)| (name.clone(), Arc::clone(&r.collector)))
            .collect()
    }

    /// Copy of one collector's health record
    pub fn health(&self, name: &str) -> Option<HealthRecord> {
        self.lock().get(name).map(|r| r.health.clone())
    }

    /// Status of every registration in dispatch order
    pub fn health_snapshot(&self) -> Vec<CollectorStatus> {
        let registrations = self.lock();
        let mut statuses: Vec<_> = registrations
            .iter()
            .map(|(name, r)| {
                (
                    (r.priority, r.seq),
                    CollectorStatus {
                        name: name.clone(),
                        enabled: r.enabled,
                        priority: r.priority,
                        health: r.health.clone(),
                    },
                )
            })
            .collect();

        statuses.sort_by_key(|(order, _)| *order);
        statuses.into_iter().map(|(_, status)| status).collect()
    }

    /// Number of registered collectors
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of `run_all` calls so far
    pub fn run_count(&self) -> u64 {
        self.run_count.load(Ordering::Relaxed)
    }

    /// Run every eligible collector and merge their items
    ///
    /// At most `concurrency` collectors run at once. Failed runs contribute no
    /// items and count against the collector's health; this method never fails.
    /// Every `recovery_interval`-th call also dispatches failed collectors so
    /// they can prove recovery.
    pub async fn run_all(&self, window_start: DateTime<Utc>, concurrency: usize) -> Vec<Item> {
        let run = self.run_count.fetch_add(1, Ordering::Relaxed) + 1;

        let mut selected = self.select(|r| r.enabled && r.health.status.is_eligible());

        if run % self.recovery_interval == 0 {
            let recovering = self.recovering_collectors();
            if !recovering.is_empty() {
                tracing::info!(
                    run,
                    collectors = ?recovering.iter().map(|(n, _)| n.as_str()).collect::<Vec<_>>(),
                    "Probing failed collectors for recovery"
                );
            }
            selected.extend(recovering);
        }

        if selected.is_empty() {
            tracing::warn!(run, "No eligible collectors to run");
            return Vec::new();
        }

        tracing::info!(
            run,
            collectors = selected.len(),
            concurrency,
            window_start = %window_start,
            "Dispatching collectors"
        );

        let mut runs = dispatch(selected, window_start, concurrency).await;
        runs.sort_by_key(|run| run.index);

        let mut items = Vec::new();
        let mut failures = 0usize;
        {
            let mut registrations = self.lock();

            for run in runs {
                let elapsed_ms = run.elapsed.as_millis() as u64;

                let Some(registration) = registrations.get_mut(&run.name) else {
                    continue;
                };
                let previous = registration.health.status;

                match run.result {
                    Ok(found) => {
                        registration.health.record_success();
                        metrics::record_collector_run(&run.name, true, found.len());
                        tracing::info!(
                            collector = %run.name,
                            items = found.len(),
                            elapsed_ms,
                            "Collector succeeded"
                        );
                        if previous != HealthStatus::Healthy {
                            tracing::info!(collector = %run.name, from = %previous, "Collector recovered");
                        }
                        items.extend(found);
                    }
                    Err(e) => {
                        failures += 1;
                        registration.health.record_failure(e.to_string());
                        metrics::record_collector_run(&run.name, false, 0);
                        tracing::warn!(
                            collector = %run.name,
                            error = %e,
                            recoverable = e.is_recoverable(),
                            consecutive_failures = registration.health.consecutive_failures,
                            status = %registration.health.status,
                            elapsed_ms,
                            "Collector failed"
                        );
                    }
                }

                metrics::update_collector_health(&run.name, registration.health.status);
            }
        }

        if items.is_empty() {
            tracing::warn!(run, failures, "Collectors returned no items");
        } else {
            tracing::info!(run, items = items.len(), failures, "Collector run complete");
        }

        items
    }
}

/// Run collectors on a bounded worker pool and gather every result
///
/// Each task reports over a channel; tasks that panic never report, so they are
/// detected at join time and turned into failures.
async fn dispatch(
    selected: Vec<(String, Arc<dyn Collector>)>,
    window_start: DateTime<Utc>,
    concurrency: usize,
) -> Vec<CollectorRun> {
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let (tx, mut rx) = mpsc::channel::<CollectorRun>(selected.len());
    let mut handles = Vec::with_capacity(selected.len());

    for (index, (name, collector)) in selected.into_iter().enumerate() {
        let semaphore = Arc::clone(&semaphore);
        let tx = tx.clone();
        let task_name = name.clone();

        let handle = tokio::spawn(async move {
            // The semaphore is never closed
            let _permit = semaphore.acquire_owned().await.ok();
            let started = Instant::now();
            tracing::debug!(collector = %task_name, "Collector started");

            let result = collector.scrape(window_start).await;

            let _ = tx
                .send(CollectorRun {
                    index,
                    name: task_name,
                    result,
                    elapsed: started.elapsed(),
                })
                .await;
        });

        handles.push((index, name, handle));
    }
    drop(tx);

    let joined = join_all(
        handles
            .into_iter()
            .map(|(index, name, handle)| async move { (index, name, handle.await) }),
    )
    .await;

    let mut runs = Vec::with_capacity(joined.len());
    for (index, name, joined) in joined {
        if let Err(e) = joined {
            tracing::error!(collector = %name, error = %e, "Collector task aborted");
            runs.push(CollectorRun {
                index,
                name,
                result: Err(CollectorError::Aborted(e.to_string())),
                elapsed: Duration::ZERO,
            });
        }
    }

    while let Some(run) = rx.recv().await {
        runs.push(run);
    }

    runs
}
