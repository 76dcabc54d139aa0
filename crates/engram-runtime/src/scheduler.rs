use std::sync::{Arc, Mutex};

use chrono::{DateTime, Datelike, Duration, TimeZone, Utc, Weekday};
use tokio::sync::watch;

use engram_store::Database;
use engram_types::{JobType, Principal};

use crate::config::Config;
use crate::services::consolidation::ConsolidationService;
use crate::summarizer::Summarizer;
use crate::Error;

// NOTE: Scheduled work never shares the request path. The scheduler is the
// only long-lived background state in the service; it is started and stopped
// by the facade lifecycle and runs each due job per tenant, serially within
// a tenant. The running-job check in the consolidation service is the
// advisory lock that keeps overlapping runs of the same job type out.

/// Handle to the running scheduler; dropping it without `shutdown` leaves
/// the task running until the runtime stops.
pub struct SchedulerHandle {
    stop_tx: watch::Sender<bool>,
    join: tokio::task::JoinHandle<()>,
}

impl SchedulerHandle {
    pub async fn shutdown(self) {
        let _ = self.stop_tx.send(true);
        let _ = self.join.await;
    }
}

pub struct ConsolidationScheduler;

impl ConsolidationScheduler {
    /// Spawn the background scheduler. UTC schedule: daily 02:00, weekly
    /// Sunday 03:00, monthly day-1 04:00.
    pub fn start(
        db: Arc<Mutex<Database>>,
        config: Arc<Config>,
        summarizer: Arc<dyn Summarizer>,
    ) -> SchedulerHandle {
        let (stop_tx, mut stop_rx) = watch::channel(false);

        let join = tokio::spawn(async move {
            loop {
                let now = Utc::now();
                let (job_type, due_at) = next_due(now);
                let sleep_for = (due_at - now)
                    .to_std()
                    .unwrap_or(std::time::Duration::from_secs(1));

                tokio::select! {
                    _ = tokio::time::sleep(sleep_for) => {}
                    _ = stop_rx.changed() => {
                        if *stop_rx.borrow() {
                            return;
                        }
                    }
                }

                if !config.consolidation.enabled {
                    continue;
                }

                let db = db.clone();
                let config = config.clone();
                let summarizer = summarizer.clone();
                let result = tokio::task::spawn_blocking(move || {
                    run_for_all_tenants(&db, &config, summarizer.as_ref(), job_type)
                })
                .await;

                if let Err(err) = result {
                    tracing::error!(error = %err, "consolidation scheduler tick panicked");
                }
            }
        });

        SchedulerHandle { stop_tx, join }
    }
}

/// Run one job type for every known tenant. Tenant failures are isolated:
/// a failed or already-running tenant never blocks the rest.
fn run_for_all_tenants(
    db: &Arc<Mutex<Database>>,
    config: &Config,
    summarizer: &dyn Summarizer,
    job_type: JobType,
) {
    let tenants = {
        let db = db.lock().unwrap();
        match db.known_tenants() {
            Ok(tenants) => tenants,
            Err(err) => {
                tracing::error!(error = %err, "cannot enumerate tenants for consolidation");
                return;
            }
        }
    };

    for tenant_id in tenants {
        let principal = Principal::new(tenant_id.clone());
        let mut db = db.lock().unwrap();
        let outcome =
            ConsolidationService::new(&mut db, config, summarizer).run(&principal, job_type, Utc::now());
        match outcome {
            Ok(job) => {
                tracing::info!(
                    tenant = %tenant_id,
                    job_type = job_type.as_str(),
                    affected = job.items_affected,
                    status = job.status.as_str(),
                    "scheduled consolidation finished"
                );
            }
            Err(Error::Conflict(_)) => {
                tracing::debug!(
                    tenant = %tenant_id,
                    job_type = job_type.as_str(),
                    "consolidation already running, skipped"
                );
            }
            Err(err) => {
                tracing::warn!(
                    tenant = %tenant_id,
                    job_type = job_type.as_str(),
                    error = %err,
                    "scheduled consolidation errored"
                );
            }
        }
    }
}

/// The earliest upcoming schedule slot and its job type.
fn next_due(now: DateTime<Utc>) -> (JobType, DateTime<Utc>) {
    let slots = [
        (JobType::Daily, next_daily(now)),
        (JobType::Weekly, next_weekly(now)),
        (JobType::Monthly, next_monthly(now)),
    ];
    slots
        .into_iter()
        .min_by_key(|(_, at)| *at)
        .expect("slots is non-empty")
}

/// Next 02:00 UTC strictly after `now`.
pub fn next_daily(now: DateTime<Utc>) -> DateTime<Utc> {
    let today = Utc
        .with_ymd_and_hms(now.year(), now.month(), now.day(), 2, 0, 0)
        .unwrap();
    if today > now {
        today
    } else {
        today + Duration::days(1)
    }
}

/// Next Sunday 03:00 UTC strictly after `now`.
pub fn next_weekly(now: DateTime<Utc>) -> DateTime<Utc> {
    let today = Utc
        .with_ymd_and_hms(now.year(), now.month(), now.day(), 3, 0, 0)
        .unwrap();
    let days_until_sunday = (7 - now.weekday().num_days_from_sunday()) % 7;
    let candidate = today + Duration::days(i64::from(days_until_sunday));
    if candidate > now && candidate.weekday() == Weekday::Sun {
        candidate
    } else {
        candidate + Duration::days(7)
    }
}

/// Next day-1 04:00 UTC strictly after `now`.
pub fn next_monthly(now: DateTime<Utc>) -> DateTime<Utc> {
    let this_month = Utc
        .with_ymd_and_hms(now.year(), now.month(), 1, 4, 0, 0)
        .unwrap();
    if this_month > now {
        return this_month;
    }
    let (year, month) = if now.month() == 12 {
        (now.year() + 1, 1)
    } else {
        (now.year(), now.month() + 1)
    };
    Utc.with_ymd_and_hms(year, month, 1, 4, 0, 0).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_daily_rolls_over_midnight() {
        let before = Utc.with_ymd_and_hms(2026, 3, 10, 1, 30, 0).unwrap();
        assert_eq!(
            next_daily(before),
            Utc.with_ymd_and_hms(2026, 3, 10, 2, 0, 0).unwrap()
        );

        let after = Utc.with_ymd_and_hms(2026, 3, 10, 2, 0, 0).unwrap();
        assert_eq!(
            next_daily(after),
            Utc.with_ymd_and_hms(2026, 3, 11, 2, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_next_weekly_lands_on_sunday() {
        // 2026-03-10 is a Tuesday
        let tuesday = Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap();
        let next = next_weekly(tuesday);
        assert_eq!(next.weekday(), Weekday::Sun);
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 3, 15, 3, 0, 0).unwrap());

        // on Sunday after 03:00, roll a full week
        let sunday_late = Utc.with_ymd_and_hms(2026, 3, 15, 5, 0, 0).unwrap();
        assert_eq!(
            next_weekly(sunday_late),
            Utc.with_ymd_and_hms(2026, 3, 22, 3, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_next_monthly_handles_year_end() {
        let december = Utc.with_ymd_and_hms(2026, 12, 15, 0, 0, 0).unwrap();
        assert_eq!(
            next_monthly(december),
            Utc.with_ymd_and_hms(2027, 1, 1, 4, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_next_due_picks_earliest() {
        let now = Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap();
        let (job_type, at) = next_due(now);
        // the next daily slot (tomorrow 02:00) precedes Sunday and month-start
        assert_eq!(job_type, JobType::Daily);
        assert_eq!(at, Utc.with_ymd_and_hms(2026, 3, 11, 2, 0, 0).unwrap());
    }
}
