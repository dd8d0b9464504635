use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Datelike, Days, FixedOffset, NaiveDate, NaiveTime, Offset, TimeZone, Utc, Weekday};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::errors::CoreError;

use super::sync_service::MarketSyncService;

/// The recurring synchronizer jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Job {
    CryptoStock,
    Gold,
    Cleanup,
}

impl Job {
    pub const ALL: [Job; 3] = [Job::CryptoStock, Job::Gold, Job::Cleanup];
}

impl std::fmt::Display for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Job::CryptoStock => write!(f, "crypto_stock"),
            Job::Gold => write!(f, "gold"),
            Job::Cleanup => write!(f, "cleanup"),
        }
    }
}

/// When each job runs, in local market time.
///
/// Defaults: crypto/stock every 30 minutes from 09:00 to 21:30, gold daily
/// at 12:00, cleanup Sundays at 02:00, all at UTC+07:00.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleSettings {
    pub utc_offset_minutes: i32,
    pub crypto_stock_interval_minutes: u32,
    /// First hour (inclusive) with crypto/stock runs
    pub market_open_hour: u32,
    /// Last hour (inclusive) with crypto/stock runs
    pub market_close_hour: u32,
    pub gold_hour: u32,
    pub cleanup_weekday: Weekday,
    pub cleanup_hour: u32,
    pub crypto_stock_timeout_secs: u64,
    pub gold_timeout_secs: u64,
    pub cleanup_timeout_secs: u64,
}

impl Default for ScheduleSettings {
    fn default() -> Self {
        Self {
            utc_offset_minutes: 7 * 60,
            crypto_stock_interval_minutes: 30,
            market_open_hour: 9,
            market_close_hour: 21,
            gold_hour: 12,
            cleanup_weekday: Weekday::Sun,
            cleanup_hour: 2,
            crypto_stock_timeout_secs: 300,
            gold_timeout_secs: 180,
            cleanup_timeout_secs: 540,
        }
    }
}

impl ScheduleSettings {
    pub fn validate(&self) -> Result<(), CoreError> {
        if FixedOffset::east_opt(self.utc_offset_minutes * 60).is_none() {
            return Err(CoreError::Config(format!(
                "Invalid UTC offset: {} minutes",
                self.utc_offset_minutes
            )));
        }
        if !(1..=60).contains(&self.crypto_stock_interval_minutes) {
            return Err(CoreError::Config(format!(
                "crypto_stock_interval_minutes must be 1..=60, got {}",
                self.crypto_stock_interval_minutes
            )));
        }
        for (name, hour) in [
            ("market_open_hour", self.market_open_hour),
            ("market_close_hour", self.market_close_hour),
            ("gold_hour", self.gold_hour),
            ("cleanup_hour", self.cleanup_hour),
        ] {
            if hour > 23 {
                return Err(CoreError::Config(format!("{name} must be 0..=23, got {hour}")));
            }
        }
        if self.market_open_hour > self.market_close_hour {
            return Err(CoreError::Config(
                "market_open_hour must not be after market_close_hour".into(),
            ));
        }
        Ok(())
    }

    pub fn offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_minutes * 60).unwrap_or_else(|| Utc.fix())
    }

    pub fn timeout(&self, job: Job) -> Duration {
        Duration::from_secs(match job {
            Job::CryptoStock => self.crypto_stock_timeout_secs,
            Job::Gold => self.gold_timeout_secs,
            Job::Cleanup => self.cleanup_timeout_secs,
        })
    }

    /// Local calendar date of an instant.
    pub fn local_date(&self, at: DateTime<Utc>) -> NaiveDate {
        at.with_timezone(&self.offset()).date_naive()
    }

    fn slots(&self, job: Job, date: NaiveDate) -> Vec<NaiveTime> {
        let at = |h: u32, m: u32| NaiveTime::from_hms_opt(h, m, 0);
        match job {
            Job::CryptoStock => {
                let step = self.crypto_stock_interval_minutes.max(1) as usize;
                (self.market_open_hour..=self.market_close_hour)
                    .flat_map(|h| (0..60).step_by(step).map(move |m| (h, m)))
                    .filter_map(|(h, m)| at(h, m))
                    .collect()
            }
            Job::Gold => at(self.gold_hour, 0).into_iter().collect(),
            Job::Cleanup if date.weekday() == self.cleanup_weekday => {
                at(self.cleanup_hour, 0).into_iter().collect()
            }
            Job::Cleanup => Vec::new(),
        }
    }
}

/// First scheduled run of `job` strictly after `after`.
///
/// `None` only when the settings admit no run at all.
pub fn next_run(job: Job, settings: &ScheduleSettings, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let offset = settings.offset();
    let start = after.with_timezone(&offset).date_naive();

    // A weekly job always has a slot within the next 8 local days.
    for day in 0..=8u64 {
        let date = start.checked_add_days(Days::new(day))?;
        for time in settings.slots(job, date) {
            let Some(local) = offset.from_local_datetime(&date.and_time(time)).single() else {
                continue;
            };
            let utc = local.with_timezone(&Utc);
            if utc > after {
                return Some(utc);
            }
        }
    }
    None
}

/// Earliest slot strictly after `after`, with every job scheduled at it.
///
/// Jobs sharing a slot are returned in `Job::ALL` order.
pub fn due_jobs(settings: &ScheduleSettings, after: DateTime<Utc>) -> Option<(DateTime<Utc>, Vec<Job>)> {
    let runs: Vec<(Job, DateTime<Utc>)> = Job::ALL
        .iter()
        .filter_map(|job| next_run(*job, settings, after).map(|at| (*job, at)))
        .collect();
    let at = runs.iter().map(|(_, at)| *at).min()?;
    let jobs = runs.into_iter().filter(|(_, t)| *t == at).map(|(job, _)| job).collect();
    Some((at, jobs))
}

/// Run one job under its timeout. Returns `false` if it was abandoned.
pub async fn run_job(sync: &MarketSyncService, job: Job, settings: &ScheduleSettings) -> bool {
    let limit = settings.timeout(job);
    info!("Running scheduled job {job}");
    let work = async {
        match job {
            Job::CryptoStock => sync.refresh_crypto_stock_prices().await,
            Job::Gold => sync.refresh_gold_prices().await,
            Job::Cleanup => sync.weekly_cleanup().await,
        }
    };
    match tokio::time::timeout(limit, work).await {
        Ok(()) => {
            debug!("Job {job} finished");
            true
        }
        Err(_) => {
            warn!("Job {job} exceeded its {}s timeout and was abandoned", limit.as_secs());
            false
        }
    }
}

/// Drive all jobs on their schedules until `shutdown` becomes `true`
/// (or its sender is dropped). Jobs run one at a time; every job due at a
/// slot runs before the next slot is looked up. Slots are searched after the
/// previous slot rather than after the clock, so a long run never skips a
/// job that shared its slot.
pub async fn run_scheduler(
    sync: Arc<MarketSyncService>,
    settings: ScheduleSettings,
    mut shutdown: watch::Receiver<bool>,
) {
    info!("Scheduler started (UTC offset {} min)", settings.utc_offset_minutes);
    let mut cursor = Utc::now();
    loop {
        if *shutdown.borrow() {
            break;
        }
        let Some((at, jobs)) = due_jobs(&settings, cursor) else {
            warn!("No job has a future run time, scheduler stopping");
            return;
        };

        let wait = (at - Utc::now()).to_std().unwrap_or_default();
        debug!("Next slot at {at} for {jobs:?} (in {}s)", wait.as_secs());

        tokio::select! {
            _ = tokio::time::sleep(wait) => {
                for job in jobs {
                    run_job(&sync, job, &settings).await;
                }
                cursor = at;
            }
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }
    info!("Scheduler stopped");
}
