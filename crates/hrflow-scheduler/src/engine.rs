//! Scheduler Engine: job slots, the skip-if-running guard and the timer loop.
//! Ticks on `tokio::time::interval` and sleeps between checks.
//!
//! Each job is Idle or Running. A tick that finds its job Running is skipped,
//! never queued. Different jobs run concurrently as separate tokio tasks.
//! A run also holds the job's lease in the store, so another process working
//! the same database skips the job instead of running it a second time.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{Local, NaiveDateTime};
use hrflow_core::mail::MailAdapter;
use hrflow_core::config::SchedulerConfig;
use hrflow_core::{HrFlowConfig, HrFlowError, Result};
use serde::Serialize;
use tokio::task::JoinHandle;

use crate::cron::CronSchedule;
use crate::dispatch::{BatchReport, DispatchSettings, Dispatcher};
use crate::jobs::{self, JobName};
use crate::rules::TransitionEvent;
use crate::store::HrStore;

/// Source of local wall-clock time.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

pub struct LocalClock;

impl Clock for LocalClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// What one job run did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct JobReport {
    pub job: JobName,
    pub intents: usize,
    #[serde(flatten)]
    pub batch: BatchReport,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    Completed(JobReport),
    /// The previous run of this job was still in progress, here or in
    /// another process.
    Skipped,
    Disabled,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct JobStats {
    pub runs: u64,
    pub skipped: u64,
    pub failures: u64,
    pub last_run: Option<NaiveDateTime>,
    pub last_report: Option<JobReport>,
    pub last_error: Option<String>,
}

/// Snapshot of one job for status output.
#[derive(Debug, Clone, Serialize)]
pub struct JobStatus {
    pub job: JobName,
    pub cron: String,
    pub enabled: bool,
    pub running: bool,
    pub next_run: Option<NaiveDateTime>,
    #[serde(flatten)]
    pub stats: JobStats,
}

struct JobSlot {
    schedule: CronSchedule,
    enabled: bool,
    running: AtomicBool,
    next_run: Mutex<Option<NaiveDateTime>>,
    stats: Mutex<JobStats>,
}

impl JobSlot {
    fn new(schedule: CronSchedule, enabled: bool) -> Self {
        Self {
            schedule,
            enabled,
            running: AtomicBool::new(false),
            next_run: Mutex::new(None),
            stats: Mutex::new(JobStats::default()),
        }
    }

    fn stats(&self) -> std::sync::MutexGuard<'_, JobStats> {
        self.stats.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Clears the Running flag when a run ends, including on panic or cancellation.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Releases a job lease when a run ends.
struct LeaseGuard<'a> {
    store: &'a dyn HrStore,
    job: JobName,
    holder: &'a str,
}

impl Drop for LeaseGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.store.release_lease(self.job.as_str(), self.holder) {
            tracing::warn!("⚠️ Could not release the {} lease: {e}", self.job);
        }
    }
}

static NEXT_ENGINE: AtomicU64 = AtomicU64::new(0);

/// The scheduler engine: owns the job slots and the dispatch pipeline.
pub struct SchedulerEngine {
    store: Arc<dyn HrStore>,
    dispatcher: Dispatcher,
    slots: BTreeMap<JobName, JobSlot>,
    /// Lease holder id, unique per engine and process.
    holder: String,
    lease_ttl: Duration,
}

impl SchedulerEngine {
    /// Engine with every job enabled on its default cadence.
    pub fn new(store: Arc<dyn HrStore>, mailer: Arc<dyn MailAdapter>, settings: DispatchSettings) -> Self {
        let slots = JobName::ALL
            .into_iter()
            .filter_map(|job| {
                let schedule = CronSchedule::parse(job.default_cron()).ok()?;
                Some((job, JobSlot::new(schedule, true)))
            })
            .collect();
        Self {
            dispatcher: Dispatcher::new(store.clone(), mailer, settings),
            store,
            slots,
            holder: format!("pid{}-{}", std::process::id(), NEXT_ENGINE.fetch_add(1, Ordering::Relaxed)),
            lease_ttl: Duration::from_secs(SchedulerConfig::default().job_lease_secs),
        }
    }

    /// Engine with `[dispatch]`, `[mail]` and `[jobs.<name>]` applied.
    pub fn from_config(
        config: &HrFlowConfig,
        store: Arc<dyn HrStore>,
        mailer: Arc<dyn MailAdapter>,
    ) -> Result<Self> {
        let mut engine = Self::new(store, mailer, DispatchSettings::from_config(config));
        engine.lease_ttl = Duration::from_secs(config.scheduler.job_lease_secs.max(1));
        for (name, job_config) in &config.jobs {
            let job = JobName::parse(name)
                .ok_or_else(|| HrFlowError::Config(format!("unknown job '{name}' in [jobs]")))?;
            let cron = job_config.cron.as_deref().unwrap_or(job.default_cron());
            engine.set_schedule(job, CronSchedule::parse(cron)?, job_config.enabled);
        }
        Ok(engine)
    }

    pub fn set_schedule(&mut self, job: JobName, schedule: CronSchedule, enabled: bool) {
        tracing::debug!("📅 {job}: '{schedule}' (enabled: {enabled})");
        self.slots.insert(job, JobSlot::new(schedule, enabled));
    }

    /// Run one job now. Safe to call from an external cron: a call that
    /// overlaps a run of the same job returns `Skipped`.
    pub async fn run_job(&self, job: JobName, now: NaiveDateTime) -> Result<TickOutcome> {
        let Some(slot) = self.slots.get(&job) else {
            return Ok(TickOutcome::Disabled);
        };
        if !slot.enabled {
            tracing::debug!("{job} is disabled");
            return Ok(TickOutcome::Disabled);
        }
        if slot
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            slot.stats().skipped += 1;
            tracing::info!("⏭️ {job} is still running, skipping this tick");
            return Ok(TickOutcome::Skipped);
        }
        let _running = RunningGuard(&slot.running);

        if !self.store.acquire_lease(job.as_str(), &self.holder, self.lease_ttl)? {
            slot.stats().skipped += 1;
            tracing::info!("⏭️ {job} is running in another process, skipping this tick");
            return Ok(TickOutcome::Skipped);
        }
        let _lease = LeaseGuard {
            store: self.store.as_ref(),
            job,
            holder: &self.holder,
        };

        tracing::info!("▶️ Running {job}");
        let result = self.execute(job, now).await;

        let mut stats = slot.stats();
        stats.runs += 1;
        stats.last_run = Some(now);
        match &result {
            Ok(report) => {
                tracing::info!(
                    "✅ {job}: {} intent(s), {} sent, {} suppressed, {} failed",
                    report.intents,
                    report.batch.sent,
                    report.batch.suppressed,
                    report.batch.failed
                );
                stats.last_report = Some(*report);
                stats.last_error = None;
            }
            Err(e) => {
                tracing::error!("❌ {job} failed: {e}");
                stats.failures += 1;
                stats.last_error = Some(e.to_string());
            }
        }
        result.map(TickOutcome::Completed)
    }

    async fn execute(&self, job: JobName, now: NaiveDateTime) -> Result<JobReport> {
        let intents = jobs::collect(job, self.store.as_ref(), now)?;
        let batch = self.dispatcher.dispatch_all(&intents, now).await?;
        Ok(JobReport {
            job,
            intents: intents.len(),
            batch,
        })
    }

    /// Feed a state change from the HR application through the pipeline.
    pub async fn on_transition(&self, event: TransitionEvent, now: NaiveDateTime) -> Result<BatchReport> {
        let intents = jobs::collect_transition(event, self.store.as_ref())?;
        tracing::debug!("🔔 {event:?}: {} intent(s)", intents.len());
        self.dispatcher.dispatch_all(&intents, now).await
    }

    /// Set every enabled job's next fire time relative to `now`.
    pub fn prime(&self, now: NaiveDateTime) {
        for slot in self.slots.values() {
            *slot.next_run.lock().unwrap_or_else(|e| e.into_inner()) = slot.schedule.next_after(now);
        }
    }

    /// Jobs whose fire time has passed. Each returned job's next fire time
    /// moves past `now`; ticks missed while the process was down are not
    /// replayed.
    pub fn due_jobs(&self, now: NaiveDateTime) -> Vec<JobName> {
        let mut due = Vec::new();
        for (job, slot) in &self.slots {
            if !slot.enabled {
                continue;
            }
            let mut next = slot.next_run.lock().unwrap_or_else(|e| e.into_inner());
            match *next {
                None => *next = slot.schedule.next_after(now),
                Some(at) if at <= now => {
                    due.push(*job);
                    *next = slot.schedule.next_after(now);
                }
                Some(_) => {}
            }
        }
        due
    }

    pub fn status(&self) -> Vec<JobStatus> {
        self.slots
            .iter()
            .map(|(job, slot)| JobStatus {
                job: *job,
                cron: slot.schedule.expression().to_string(),
                enabled: slot.enabled,
                running: slot.running.load(Ordering::SeqCst),
                next_run: *slot.next_run.lock().unwrap_or_else(|e| e.into_inner()),
                stats: slot.stats().clone(),
            })
            .collect()
    }
}

/// Spawn the scheduler loop as a background tokio task.
/// Every `check_interval` the due jobs are started, each in its own task.
pub fn spawn_scheduler(
    engine: Arc<SchedulerEngine>,
    clock: Arc<dyn Clock>,
    check_interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tracing::info!("⏰ Scheduler started (check every {}s)", check_interval.as_secs());
        engine.prime(clock.now());

        let mut interval = tokio::time::interval(check_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            interval.tick().await;
            let now = clock.now();
            for job in engine.due_jobs(now) {
                let engine = engine.clone();
                tokio::spawn(async move {
                    // Outcome and errors are logged inside run_job
                    let _ = engine.run_job(job, now).await;
                });
            }
        }
    })
}
