//! Notification rule evaluator.
//!
//! One declarative table ([`rule`]) says, for every [`NotificationKind`],
//! what triggers it, how duplicates are suppressed, which template renders it
//! and which status change (if any) follows a successful send. The submodules
//! hold the pure time conditions: each takes "today" plus an entity snapshot
//! and returns the intents that are due. They never touch the store.
//!
//! ```text
//! Job tick / transition event
//!   → load snapshot (jobs.rs)
//!     → rules::<area>::evaluate(today, snapshot)   ← pure, this module
//!       → Vec<NotificationIntent>
//!         → Dispatcher (guard check under entity lock → render → deliver → record)
//! ```
//!
//! Matching is exact-day: a reminder due "1 day before" is only produced when
//! the difference is exactly one day. A missed tick is not caught up.

pub mod attendance;
pub mod leave;
pub mod onboarding;
pub mod performance;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::jobs::JobName;
use crate::model::ReviewStatus;
use crate::notify::{EntityKind, NotificationKind};

/// What produces intents of a kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// A recurring job scan.
    Job(JobName),
    /// A state change reported by the application.
    Transition,
    /// Both: sent on the transition, or later by the job if still unsent.
    JobOrTransition(JobName),
}

/// How "already sent" is decided for a kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardStyle {
    /// Boolean column on the entity's own row.
    Flag(&'static str),
    /// `reviews.last_quarterly_goal_reminder` falls inside the intent's quarter.
    QuarterStamp,
    /// A `sent` audit record exists for (entity, kind, period).
    AuditLog,
}

/// One row of the rule table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rule {
    pub kind: NotificationKind,
    pub entity: EntityKind,
    pub trigger: Trigger,
    pub guard: GuardStyle,
    pub template: &'static str,
    /// Review status applied in the same commit as the guard.
    pub on_success: Option<ReviewStatus>,
}

/// The rule table.
pub fn rule(kind: NotificationKind) -> Rule {
    use EntityKind as E;
    use GuardStyle::{AuditLog, Flag, QuarterStamp};
    use JobName as J;
    use NotificationKind as K;
    use Trigger::{Job, JobOrTransition, Transition};

    let (entity, trigger, guard, on_success) = match kind {
        K::CheckinReminder => (E::Employee, Job(J::MorningCheckin), AuditLog, None),
        K::LateCheckin => (E::Attendance, Job(J::LateCheckin), AuditLog, None),
        K::CheckoutReminder => (E::Attendance, Job(J::MissingCheckout), AuditLog, None),
        K::WeeklyReport => (E::Employee, Job(J::WeeklyReport), AuditLog, None),
        K::MonthlyReport => (E::Employee, Job(J::MonthlyReport), AuditLog, None),
        K::LeaveSubmitted => (E::Leave, Transition, AuditLog, None),
        K::LeaveApproved => (E::Leave, Transition, AuditLog, None),
        K::LeaveRejected => (E::Leave, Transition, AuditLog, None),
        K::LeaveReminderBefore => (E::Leave, Job(J::LeaveReminders), AuditLog, None),
        K::LeaveReminderAfter => (E::Leave, Job(J::LeaveReminders), AuditLog, None),
        K::Welcome => (E::Onboarding, Transition, Flag("welcome_email_sent"), None),
        K::OnboardingDay3 => (E::Onboarding, Job(J::OnboardingChecklists), Flag("day_3_checklist_sent"), None),
        K::OnboardingDay5 => (E::Onboarding, Job(J::OnboardingChecklists), Flag("day_5_checklist_sent"), None),
        K::OnboardingDay7 => (E::Onboarding, Job(J::OnboardingChecklists), Flag("day_7_checklist_sent"), None),
        K::ExitProcess => (E::Offboarding, Transition, Flag("exit_email_sent"), None),
        K::Farewell => (E::Offboarding, Transition, Flag("farewell_email_sent"), None),
        K::CycleAnnouncement => (E::ReviewCycle, Transition, Flag("announcement_sent"), None),
        K::CycleGuidelines => (E::ReviewCycle, Transition, Flag("guidelines_sent"), None),
        K::CycleSelfAssessment => (
            E::ReviewCycle,
            JobOrTransition(J::ReviewNotifications),
            Flag("self_assessment_sent"),
            None,
        ),
        K::CycleUpcoming => (E::ReviewCycle, Job(J::ReviewNotifications), Flag("upcoming_notification_sent"), None),
        K::ReviewReminder7 => (E::Review, Job(J::ReviewNotifications), Flag("reminder_7_sent"), None),
        K::ReviewReminder3 => (E::Review, Job(J::ReviewNotifications), Flag("reminder_3_sent"), None),
        K::ReviewReminder1 => (E::Review, Job(J::ReviewNotifications), Flag("reminder_1_sent"), None),
        K::ReviewOverdue => (
            E::Review,
            Job(J::ReviewNotifications),
            Flag("overdue_notice_sent"),
            Some(ReviewStatus::Overdue),
        ),
        K::MeetingConfirmation => (
            E::Review,
            Job(J::ReviewNotifications),
            Flag("meeting_confirmation_sent"),
            Some(ReviewStatus::Meeting),
        ),
        K::ReviewSummary => (E::Review, Job(J::ReviewNotifications), Flag("summary_shared"), None),
        K::GoalSetting => (E::Review, Job(J::ReviewNotifications), Flag("goals_shared"), None),
        K::GoalAchievement => (E::Goal, Job(J::GoalNotifications), Flag("achievement_notified"), None),
        K::CourseCorrection => (E::Goal, Job(J::GoalNotifications), Flag("course_correction_notified"), None),
        K::QuarterlyGoalReminder => (E::Review, Job(J::QuarterlyGoalReminders), QuarterStamp, None),
        K::Appreciation => (E::Appreciation, Transition, AuditLog, None),
    };

    Rule {
        kind,
        entity,
        trigger,
        guard,
        template: kind.as_str(),
        on_success,
    }
}

/// All rules, in kind order.
pub fn table() -> Vec<Rule> {
    NotificationKind::ALL.iter().map(|k| rule(*k)).collect()
}

/// Kinds a job can emit.
pub fn kinds_for_job(job: JobName) -> Vec<NotificationKind> {
    table()
        .into_iter()
        .filter(|r| matches!(r.trigger, Trigger::Job(j) | Trigger::JobOrTransition(j) if j == job))
        .map(|r| r.kind)
        .collect()
}

/// A state change in the HR application that may warrant a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TransitionEvent {
    LeaveSubmitted { leave_id: i64 },
    /// Approved or rejected; the current status picks the notification.
    LeaveDecided { leave_id: i64 },
    OnboardingStarted { employee_id: i64 },
    OffboardingStarted { offboarding_id: i64 },
    OffboardingFarewell { offboarding_id: i64 },
    CycleLaunched { cycle_id: i64 },
    AppreciationRecorded { appreciation_id: i64 },
}

impl TransitionEvent {
    /// Parse a CLI-style event name plus id, e.g. `leave-submitted 12`.
    pub fn parse(name: &str, id: i64) -> Option<Self> {
        let event = match name.replace('_', "-").as_str() {
            "leave-submitted" => Self::LeaveSubmitted { leave_id: id },
            "leave-decided" => Self::LeaveDecided { leave_id: id },
            "onboarding-started" => Self::OnboardingStarted { employee_id: id },
            "offboarding-started" => Self::OffboardingStarted { offboarding_id: id },
            "offboarding-farewell" => Self::OffboardingFarewell { offboarding_id: id },
            "cycle-launched" => Self::CycleLaunched { cycle_id: id },
            "appreciation-recorded" => Self::AppreciationRecorded { appreciation_id: id },
            _ => return None,
        };
        Some(event)
    }
}

/// First day of the quarter containing `date`.
pub fn quarter_start(date: NaiveDate) -> NaiveDate {
    let month = ((date.month() - 1) / 3) * 3 + 1;
    NaiveDate::from_ymd_opt(date.year(), month, 1).unwrap_or(date)
}
