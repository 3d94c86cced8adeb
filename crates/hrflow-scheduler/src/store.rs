//! Persistence seam for the notification engine.
//!
//! Entity reads are filtered to what the jobs need. The write side is narrow:
//! a guard check, a claim taken before delivery, an atomic "sent" commit (flag
//! or stamp + optional status change + audit row + claim release) and an
//! append-only failure record. Job leases keep one run of a job going across
//! every process that shares the store.

use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime};
use hrflow_core::Result;

use crate::model::{
    Appreciation, AttendanceRecord, Employee, Goal, LeaveRequest, LeaveStatus, Offboarding,
    OffboardingChecklistItem, Onboarding, OnboardingChecklistItem, Review, ReviewCycle,
};
use crate::notify::{AuditRecord, EntityRef, NotificationIntent, NotificationKind};
use crate::rules::GuardStyle;

/// What makes a send "already done": one per (entity, kind, period).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Guard {
    pub entity: EntityRef,
    pub kind: NotificationKind,
    pub period: Option<NaiveDate>,
}

impl Guard {
    pub fn of(intent: &NotificationIntent) -> Self {
        Self {
            entity: intent.entity,
            kind: intent.kind,
            period: intent.period,
        }
    }

    pub fn style(&self) -> GuardStyle {
        self.kind.rule().guard
    }
}

/// Result of trying to claim a guarded send before delivering it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Claim {
    /// This worker owns the send until it commits or releases.
    Acquired,
    /// Already sent, or the entity is gone.
    Guarded,
    /// Another worker holds a live claim.
    InFlight,
}

/// Filter for audit listings.
#[derive(Debug, Clone, Default)]
pub struct AuditQuery {
    pub entity: Option<EntityRef>,
    pub kind: Option<NotificationKind>,
    pub limit: usize,
}

/// Storage used by the jobs and the dispatch pipeline.
pub trait HrStore: Send + Sync {
    // ─── Entity reads ───────────────────────────────────────
    fn employees(&self) -> Result<Vec<Employee>>;
    fn attendance_between(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<AttendanceRecord>>;
    fn leaves_with_status(&self, status: LeaveStatus) -> Result<Vec<LeaveRequest>>;
    fn leave(&self, id: i64) -> Result<Option<LeaveRequest>>;
    fn onboardings(&self) -> Result<Vec<Onboarding>>;
    fn onboarding_for_employee(&self, employee_id: i64) -> Result<Option<Onboarding>>;
    fn onboarding_items(&self) -> Result<Vec<OnboardingChecklistItem>>;
    fn offboarding(&self, id: i64) -> Result<Option<Offboarding>>;
    fn offboarding_items(&self, offboarding_id: i64) -> Result<Vec<OffboardingChecklistItem>>;
    fn review_cycles(&self) -> Result<Vec<ReviewCycle>>;
    fn review_cycle(&self, id: i64) -> Result<Option<ReviewCycle>>;
    fn reviews(&self) -> Result<Vec<Review>>;
    fn goals(&self) -> Result<Vec<Goal>>;
    fn appreciation(&self, id: i64) -> Result<Option<Appreciation>>;

    // ─── Guards and audit ───────────────────────────────────

    /// True when the guarded send has already succeeded, or the entity is gone.
    fn is_guarded(&self, guard: &Guard) -> Result<bool>;

    /// Atomically re-check the guard and claim the send. A claim older than
    /// `ttl` is treated as abandoned and taken over.
    fn claim(&self, guard: &Guard, ttl: Duration) -> Result<Claim>;

    /// Drop a claim without sending, e.g. after a delivery failure.
    fn release_claim(&self, guard: &Guard) -> Result<()>;

    /// Apply the guard, the kind's status transition, insert the `sent`
    /// record and drop the claim in one transaction. `now` stamps time-based
    /// guards.
    fn commit_sent(&self, guard: &Guard, record: &AuditRecord, now: NaiveDateTime) -> Result<i64>;

    /// Append a `failed` record. Never touches the guard.
    fn record_failed(&self, record: &AuditRecord) -> Result<i64>;

    /// Newest first.
    fn audit_log(&self, query: &AuditQuery) -> Result<Vec<AuditRecord>>;

    // ─── Job leases ─────────────────────────────────────────

    /// Take the lease on `job` for `ttl`. False while another holder's lease
    /// is live.
    fn acquire_lease(&self, job: &str, holder: &str, ttl: Duration) -> Result<bool>;

    fn release_lease(&self, job: &str, holder: &str) -> Result<()>;
}
