//! Dispatch pipeline: turns intents into mails, exactly once per guard.
//!
//! For each intent, under the entity's lock:
//!
//! ```text
//! guard set? ── yes ──► Suppressed
//!     │ no
//! recipients / render ── error ──► failed audit record
//!     │
//! claim in the store ── guarded or held by another worker ──► Suppressed
//!     │ acquired
//! deliver (bounded by timeout) ── error ──► release claim, failed audit record
//!     │ ok
//! commit guard + status + sent record (retried) ── still failing ──► Persistence error, job aborts
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::NaiveDateTime;
use futures::stream::{self, StreamExt};
use hrflow_core::mail::{DeliveryError, MailAdapter, OutgoingMail};
use hrflow_core::{HrFlowConfig, HrFlowError, Result};
use serde::Serialize;

use crate::locks::EntityLocks;
use crate::notify::{AuditRecord, NotificationIntent};
use crate::store::{Claim, Guard, HrStore};

/// Knobs for the pipeline, usually taken from `[dispatch]` and `[mail]`.
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub concurrency: usize,
    pub deliver_timeout: Duration,
    pub commit_retries: u32,
    /// Age after which another worker may take over an unfinished send.
    pub claim_ttl: Duration,
    pub from: String,
    pub html: bool,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self::from_config(&HrFlowConfig::default())
    }
}

impl DispatchSettings {
    pub fn from_config(config: &HrFlowConfig) -> Self {
        Self {
            concurrency: config.dispatch.concurrency.max(1),
            deliver_timeout: Duration::from_secs(config.dispatch.deliver_timeout_secs),
            commit_retries: config.dispatch.commit_retries,
            claim_ttl: Duration::from_secs(config.dispatch.claim_ttl_secs),
            from: config.mail.sender(),
            html: config.mail.html,
        }
    }
}

/// Result of one intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Sent,
    /// Guard already set, nothing done.
    Suppressed,
    /// Recorded as a failed attempt; the guard stays open for the next tick.
    Failed(String),
}

/// Counters for one batch of intents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub sent: usize,
    pub suppressed: usize,
    pub failed: usize,
}

impl BatchReport {
    fn record(&mut self, outcome: &DispatchOutcome) {
        match outcome {
            DispatchOutcome::Sent => self.sent += 1,
            DispatchOutcome::Suppressed => self.suppressed += 1,
            DispatchOutcome::Failed(_) => self.failed += 1,
        }
    }

    pub fn merge(&mut self, other: BatchReport) {
        self.sent += other.sent;
        self.suppressed += other.suppressed;
        self.failed += other.failed;
    }

    pub fn total(&self) -> usize {
        self.sent + self.suppressed + self.failed
    }
}

pub struct Dispatcher {
    store: Arc<dyn HrStore>,
    mailer: Arc<dyn MailAdapter>,
    locks: EntityLocks,
    settings: DispatchSettings,
}

impl Dispatcher {
    pub fn new(store: Arc<dyn HrStore>, mailer: Arc<dyn MailAdapter>, settings: DispatchSettings) -> Self {
        Self {
            store,
            mailer,
            locks: EntityLocks::new(),
            settings,
        }
    }

    pub fn settings(&self) -> &DispatchSettings {
        &self.settings
    }

    /// Run one intent through the pipeline.
    ///
    /// Only a failed commit after a successful delivery is returned as `Err`;
    /// every other problem becomes a `failed` audit record.
    pub async fn dispatch(&self, intent: &NotificationIntent, now: NaiveDateTime) -> Result<DispatchOutcome> {
        let _entity = self.locks.acquire(intent.entity).await;
        let guard = Guard::of(intent);

        match self.store.is_guarded(&guard) {
            Ok(true) => {
                tracing::debug!("⏭️ {} for {} already sent", intent.kind, intent.entity);
                return Ok(DispatchOutcome::Suppressed);
            }
            Ok(false) => {}
            Err(e) => {
                tracing::warn!("⚠️ Guard check for {} {} failed: {e}", intent.kind, intent.entity);
                return Ok(DispatchOutcome::Failed(e.to_string()));
            }
        }

        if intent.recipients.is_empty() {
            return Ok(self.fail(intent, "no recipient address".into()));
        }

        let body = match self.mailer.render(intent.template(), &intent.context) {
            Ok(body) => body,
            Err(e) => return Ok(self.fail(intent, e.to_string())),
        };
        let mail = OutgoingMail {
            subject: intent.subject.clone(),
            body,
            from: self.settings.from.clone(),
            to: intent.recipients.clone(),
            html: self.settings.html,
        };

        match self.store.claim(&guard, self.settings.claim_ttl) {
            Ok(Claim::Acquired) => {}
            Ok(Claim::Guarded) => {
                tracing::debug!("⏭️ {} for {} already sent", intent.kind, intent.entity);
                return Ok(DispatchOutcome::Suppressed);
            }
            Ok(Claim::InFlight) => {
                tracing::info!(
                    "⏭️ {} for {} is being sent by another worker",
                    intent.kind,
                    intent.entity
                );
                return Ok(DispatchOutcome::Suppressed);
            }
            Err(e) => {
                return Ok(self.fail(intent, e.to_string()));
            }
        }

        let timeout = self.settings.deliver_timeout;
        let delivered = tokio::time::timeout(timeout, self.mailer.deliver(&mail))
            .await
            .unwrap_or(Err(DeliveryError::Timeout(timeout)));
        if let Err(e) = delivered {
            if let Err(release) = self.store.release_claim(&guard) {
                tracing::warn!(
                    "⚠️ Could not release claim on {} for {}: {release}",
                    intent.kind,
                    intent.entity
                );
            }
            return Ok(self.fail(intent, HrFlowError::from(e).to_string()));
        }

        self.commit(&guard, intent, now).await?;
        tracing::info!(
            "📧 Sent {} for {} to {} recipient(s) via {}",
            intent.kind,
            intent.entity,
            intent.recipients.len(),
            self.mailer.name()
        );
        Ok(DispatchOutcome::Sent)
    }

    /// Dispatch a batch, up to `concurrency` intents at a time.
    ///
    /// A persistence error stops new intents from starting; those already in
    /// flight finish, then the error is returned.
    pub async fn dispatch_all(&self, intents: &[NotificationIntent], now: NaiveDateTime) -> Result<BatchReport> {
        let aborted = AtomicBool::new(false);

        // Owned intents keep the batch future `Send` for `tokio::spawn`
        let results: Vec<Option<Result<DispatchOutcome>>> = stream::iter(intents.iter().cloned())
            .map(|intent: NotificationIntent| {
                let aborted = &aborted;
                async move {
                    if aborted.load(Ordering::SeqCst) {
                        return None;
                    }
                    let result = self.dispatch(&intent, now).await;
                    if result.is_err() {
                        aborted.store(true, Ordering::SeqCst);
                    }
                    Some(result)
                }
            })
            .buffer_unordered(self.settings.concurrency.max(1))
            .collect()
            .await;

        let mut report = BatchReport::default();
        let mut first_error = None;
        let mut skipped = 0;
        for result in results {
            match result {
                Some(Ok(outcome)) => report.record(&outcome),
                Some(Err(e)) => {
                    first_error.get_or_insert(e);
                }
                None => skipped += 1,
            }
        }

        match first_error {
            Some(e) => {
                tracing::error!(
                    "🛑 Batch aborted after {} sent, {} failed; {skipped} intent(s) not attempted",
                    report.sent,
                    report.failed
                );
                Err(e)
            }
            None => Ok(report),
        }
    }

    fn fail(&self, intent: &NotificationIntent, reason: String) -> DispatchOutcome {
        tracing::warn!("❌ {} for {} failed: {reason}", intent.kind, intent.entity);
        if let Err(e) = self.store.record_failed(&AuditRecord::failed(intent, reason.clone())) {
            tracing::error!("Could not record failed {} for {}: {e}", intent.kind, intent.entity);
        }
        DispatchOutcome::Failed(reason)
    }

    async fn commit(&self, guard: &Guard, intent: &NotificationIntent, now: NaiveDateTime) -> Result<()> {
        let record = AuditRecord::sent(intent);
        let mut attempt = 0;
        loop {
            match self.store.commit_sent(guard, &record, now) {
                Ok(_) => return Ok(()),
                Err(e) if attempt < self.settings.commit_retries => {
                    attempt += 1;
                    tracing::warn!(
                        "⚠️ Commit for {} {} failed (attempt {attempt}): {e}",
                        intent.kind,
                        intent.entity
                    );
                    tokio::time::sleep(Duration::from_millis(50 * u64::from(attempt))).await;
                }
                Err(e) => {
                    tracing::error!(
                        "🚨 {} for {} was delivered but could not be recorded: {e}. It may be sent again.",
                        intent.kind,
                        intent.entity
                    );
                    return Err(HrFlowError::Persistence(format!(
                        "{} for {}: {e}",
                        intent.kind, intent.entity
                    )));
                }
            }
        }
    }
}
