//! Tick scheduler
//!
//! Two periodic tasks drive the engine: the ingestion tick fires every
//! minute on the zero second, the housekeeping tick fires daily at
//! midnight. Both share one process-wide single-flight flag, so overlapping
//! ticks are dropped, never queued, and housekeeping never runs under an
//! active ingestion pass.
//!
//! Per-data-source work fans out onto a bounded worker pool. A failure in
//! one data source is caught at the worker boundary and logged; it neither
//! aborts the other data sources nor leaves the flag stuck.

use chrono::{DateTime, Local, Timelike};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use super::housekeeping;
use super::layout::SourceLayout;
use super::pipeline::Pipeline;
use super::store::IngestStore;
use crate::config::ProcessingConfig;

/// Default worker pool width.
pub const DEFAULT_WORKER_PERMITS: usize = 50;

/// Process-wide single-flight latch.
///
/// `try_acquire` flips the flag atomically and hands back a guard that
/// clears it on drop, so the flag is released on every exit path,
/// including panics unwinding through a tick.
#[derive(Debug, Default)]
pub struct SingleFlight {
    running: Arc<AtomicBool>,
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_acquire(&self) -> Option<FlightGuard> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            Some(FlightGuard {
                running: Arc::clone(&self.running),
            })
        } else {
            None
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// Clears the single-flight flag when dropped.
#[derive(Debug)]
pub struct FlightGuard {
    running: Arc<AtomicBool>,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

/// Handles of the two spawned scheduler loops.
pub struct SchedulerHandle {
    pub ingestion: JoinHandle<()>,
    pub housekeeping: JoinHandle<()>,
}

/// Drives ingestion and housekeeping ticks over all active data sources.
pub struct Scheduler {
    store: Arc<dyn IngestStore>,
    pipeline: Arc<Pipeline>,
    processing_root: PathBuf,
    retain_backup_years: u32,
    retain_log_months: u32,
    flight: SingleFlight,
    workers: Arc<Semaphore>,
}

impl Scheduler {
    pub fn new(
        store: Arc<dyn IngestStore>,
        pipeline: Arc<Pipeline>,
        processing: &ProcessingConfig,
    ) -> Self {
        Self {
            store,
            pipeline,
            processing_root: processing.root.clone(),
            retain_backup_years: processing.retain_backup_years,
            retain_log_months: processing.retain_log_months,
            flight: SingleFlight::new(),
            workers: Arc::new(Semaphore::new(processing.worker_permits)),
        }
    }

    /// Spawn both scheduler loops in the background.
    pub fn start(self: Arc<Self>) -> SchedulerHandle {
        let ingestion_scheduler = Arc::clone(&self);
        let ingestion = tokio::spawn(async move {
            info!("Ingestion scheduler started");
            loop {
                tokio::time::sleep(duration_until_next_minute(Local::now())).await;
                ingestion_scheduler.run_ingestion_tick().await;
            }
        });

        let housekeeping_scheduler = self;
        let housekeeping = tokio::spawn(async move {
            info!("Housekeeping scheduler started");
            loop {
                tokio::time::sleep(duration_until_next_midnight(Local::now())).await;
                housekeeping_scheduler.run_housekeeping_tick().await;
            }
        });

        SchedulerHandle {
            ingestion,
            housekeeping,
        }
    }

    /// One ingestion tick: fan out over all active data sources, bounded by
    /// the worker pool. Skipped entirely when a previous tick still runs.
    pub async fn run_ingestion_tick(&self) {
        let Some(_guard) = self.flight.try_acquire() else {
            debug!("Previous run still in flight; skipping ingestion tick");
            return;
        };

        let data_sources = match self.store.active_data_sources().await {
            Ok(sources) => sources,
            Err(e) => {
                error!(error = %e, "Failed to load data sources");
                return;
            },
        };

        info!(count = data_sources.len(), "Ingestion tick started");

        let mut workers = JoinSet::new();
        for data_source in data_sources {
            let permit = match Arc::clone(&self.workers).acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };
            let store = Arc::clone(&self.store);
            let pipeline = Arc::clone(&self.pipeline);

            workers.spawn(async move {
                let _permit = permit;
                match store.active_folder_paths(data_source.id).await {
                    Ok(folder_paths) => {
                        if let Err(e) = pipeline.run(&data_source, &folder_paths).await {
                            error!(
                                data_source = %data_source.name,
                                error = %e,
                                "Data source processing failed"
                            );
                        }
                    },
                    Err(e) => error!(
                        data_source = %data_source.name,
                        error = %e,
                        "Failed to load folder paths"
                    ),
                }
            });
        }

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Data source worker panicked");
            }
        }

        info!("Ingestion tick finished");
    }

    /// One housekeeping tick: retention sweeps over backups and run logs of
    /// every active data source. Shares the single-flight flag with
    /// ingestion so the two never overlap.
    pub async fn run_housekeeping_tick(&self) {
        let Some(_guard) = self.flight.try_acquire() else {
            info!("Ingestion in flight; skipping housekeeping tick");
            return;
        };

        let data_sources = match self.store.active_data_sources().await {
            Ok(sources) => sources,
            Err(e) => {
                error!(error = %e, "Failed to load data sources for housekeeping");
                return;
            },
        };

        info!(count = data_sources.len(), "Housekeeping tick started");
        let now = Local::now();

        for data_source in data_sources {
            let layout = SourceLayout::new(&self.processing_root, &data_source.name);
            if let Err(e) = layout.ensure() {
                warn!(data_source = %data_source.name, error = %e, "Layout unavailable");
                continue;
            }

            match housekeeping::delete_old_backups(&layout, self.retain_backup_years, now) {
                Ok(deleted) if deleted > 0 => {
                    info!(data_source = %data_source.name, deleted, "Old backups removed");
                },
                Ok(_) => {},
                Err(e) => warn!(
                    data_source = %data_source.name,
                    error = %e,
                    "Backup retention sweep failed"
                ),
            }

            match housekeeping::delete_old_logs(&layout, self.retain_log_months, now) {
                Ok(deleted) if deleted > 0 => {
                    info!(data_source = %data_source.name, deleted, "Old run logs removed");
                },
                Ok(_) => {},
                Err(e) => warn!(
                    data_source = %data_source.name,
                    error = %e,
                    "Log retention sweep failed"
                ),
            }
        }

        info!("Housekeeping tick finished");
    }
}

/// Time left until the next minute boundary.
fn duration_until_next_minute(now: DateTime<Local>) -> Duration {
    let seconds = 60 - u64::from(now.second() % 60);
    Duration::from_secs(seconds).saturating_sub(Duration::from_nanos(u64::from(now.nanosecond())))
}

/// Time left until the next local midnight.
fn duration_until_next_midnight(now: DateTime<Local>) -> Duration {
    let next = now
        .date_naive()
        .succ_opt()
        .and_then(|date| date.and_hms_opt(0, 0, 0));

    match next {
        Some(next) => (next - now.naive_local())
            .to_std()
            .unwrap_or(Duration::from_secs(86_400)),
        None => Duration::from_secs(86_400),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn single_flight_drops_overlapping_acquisitions() {
        let flight = SingleFlight::new();

        let guard = flight.try_acquire();
        assert!(guard.is_some());
        assert!(flight.is_running());
        assert!(flight.try_acquire().is_none());

        drop(guard);
        assert!(!flight.is_running());
        assert!(flight.try_acquire().is_some());
    }

    #[test]
    fn minute_alignment_targets_the_zero_second() {
        let now = Local.with_ymd_and_hms(2026, 8, 1, 10, 15, 42).unwrap();
        assert_eq!(duration_until_next_minute(now), Duration::from_secs(18));

        let on_boundary = Local.with_ymd_and_hms(2026, 8, 1, 10, 15, 0).unwrap();
        assert_eq!(duration_until_next_minute(on_boundary), Duration::from_secs(60));
    }

    #[test]
    fn midnight_alignment_spans_the_rest_of_the_day() {
        let now = Local.with_ymd_and_hms(2026, 8, 1, 23, 0, 0).unwrap();
        assert_eq!(
            duration_until_next_midnight(now),
            Duration::from_secs(3_600)
        );
    }
}
