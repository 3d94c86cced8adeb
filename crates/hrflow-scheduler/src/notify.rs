//! Notification kinds, intents and audit records.
//!
//! An intent is the in-memory decision "send kind K about entity E to these
//! people"; it lives for one evaluation pass. An audit record is the durable
//! trace of one attempt to act on an intent.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::model::text_enum;
use crate::rules::Rule;

/// Which table an entity reference points into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Employee,
    Attendance,
    Leave,
    Onboarding,
    Offboarding,
    ReviewCycle,
    Review,
    Goal,
    Appreciation,
}

text_enum!(EntityKind {
    Employee => "employee",
    Attendance => "attendance",
    Leave => "leave",
    Onboarding => "onboarding",
    Offboarding => "offboarding",
    ReviewCycle => "review_cycle",
    Review => "review",
    Goal => "goal",
    Appreciation => "appreciation",
});

impl EntityKind {
    /// Backing SQLite table.
    pub fn table(&self) -> &'static str {
        match self {
            Self::Employee => "employees",
            Self::Attendance => "attendance_records",
            Self::Leave => "leave_requests",
            Self::Onboarding => "onboardings",
            Self::Offboarding => "offboardings",
            Self::ReviewCycle => "review_cycles",
            Self::Review => "reviews",
            Self::Goal => "goals",
            Self::Appreciation => "appreciations",
        }
    }
}

/// Reference to one entity, e.g. `review#12`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    pub kind: EntityKind,
    pub id: i64,
}

impl EntityRef {
    pub fn new(kind: EntityKind, id: i64) -> Self {
        Self { kind, id }
    }

    /// Parse `kind:id` or `kind#id`.
    pub fn parse(s: &str) -> Option<Self> {
        let (kind, id) = s.split_once([':', '#'])?;
        Some(Self {
            kind: EntityKind::parse(kind)?,
            id: id.parse().ok()?,
        })
    }
}

impl std::fmt::Display for EntityRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.kind, self.id)
    }
}

/// Every notification the engine can emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    CheckinReminder,
    LateCheckin,
    CheckoutReminder,
    WeeklyReport,
    MonthlyReport,
    LeaveSubmitted,
    LeaveApproved,
    LeaveRejected,
    LeaveReminderBefore,
    LeaveReminderAfter,
    Welcome,
    OnboardingDay3,
    OnboardingDay5,
    OnboardingDay7,
    ExitProcess,
    Farewell,
    CycleAnnouncement,
    CycleGuidelines,
    CycleSelfAssessment,
    CycleUpcoming,
    ReviewReminder7,
    ReviewReminder3,
    ReviewReminder1,
    ReviewOverdue,
    MeetingConfirmation,
    ReviewSummary,
    GoalSetting,
    GoalAchievement,
    CourseCorrection,
    QuarterlyGoalReminder,
    Appreciation,
}

text_enum!(NotificationKind {
    CheckinReminder => "checkin_reminder",
    LateCheckin => "late_checkin",
    CheckoutReminder => "checkout_reminder",
    WeeklyReport => "weekly_report",
    MonthlyReport => "monthly_report",
    LeaveSubmitted => "leave_submitted",
    LeaveApproved => "leave_approved",
    LeaveRejected => "leave_rejected",
    LeaveReminderBefore => "leave_reminder_before",
    LeaveReminderAfter => "leave_reminder_after",
    Welcome => "welcome",
    OnboardingDay3 => "onboarding_day_3",
    OnboardingDay5 => "onboarding_day_5",
    OnboardingDay7 => "onboarding_day_7",
    ExitProcess => "exit_process",
    Farewell => "farewell",
    CycleAnnouncement => "cycle_announcement",
    CycleGuidelines => "cycle_guidelines",
    CycleSelfAssessment => "cycle_self_assessment",
    CycleUpcoming => "cycle_upcoming",
    ReviewReminder7 => "review_reminder_7",
    ReviewReminder3 => "review_reminder_3",
    ReviewReminder1 => "review_reminder_1",
    ReviewOverdue => "review_overdue",
    MeetingConfirmation => "meeting_confirmation",
    ReviewSummary => "review_summary",
    GoalSetting => "goal_setting",
    GoalAchievement => "goal_achievement",
    CourseCorrection => "course_correction",
    QuarterlyGoalReminder => "quarterly_goal_reminder",
    Appreciation => "appreciation",
});

impl NotificationKind {
    pub const ALL: [NotificationKind; 31] = [
        Self::CheckinReminder,
        Self::LateCheckin,
        Self::CheckoutReminder,
        Self::WeeklyReport,
        Self::MonthlyReport,
        Self::LeaveSubmitted,
        Self::LeaveApproved,
        Self::LeaveRejected,
        Self::LeaveReminderBefore,
        Self::LeaveReminderAfter,
        Self::Welcome,
        Self::OnboardingDay3,
        Self::OnboardingDay5,
        Self::OnboardingDay7,
        Self::ExitProcess,
        Self::Farewell,
        Self::CycleAnnouncement,
        Self::CycleGuidelines,
        Self::CycleSelfAssessment,
        Self::CycleUpcoming,
        Self::ReviewReminder7,
        Self::ReviewReminder3,
        Self::ReviewReminder1,
        Self::ReviewOverdue,
        Self::MeetingConfirmation,
        Self::ReviewSummary,
        Self::GoalSetting,
        Self::GoalAchievement,
        Self::CourseCorrection,
        Self::QuarterlyGoalReminder,
        Self::Appreciation,
    ];

    /// This kind's entry in the rule table.
    pub fn rule(self) -> Rule {
        crate::rules::rule(self)
    }
}

/// A decision to send one notification. Not persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationIntent {
    pub entity: EntityRef,
    pub kind: NotificationKind,
    /// Occurrence date for kinds that may repeat on the same entity
    /// (the day, week start, month start or quarter start).
    pub period: Option<NaiveDate>,
    pub recipients: Vec<String>,
    pub subject: String,
    pub context: serde_json::Value,
}

impl NotificationIntent {
    pub fn new(
        entity: EntityRef,
        kind: NotificationKind,
        recipients: Vec<String>,
        subject: impl Into<String>,
        context: serde_json::Value,
    ) -> Self {
        Self {
            entity,
            kind,
            period: None,
            recipients,
            subject: subject.into(),
            context,
        }
    }

    pub fn for_period(mut self, period: NaiveDate) -> Self {
        self.period = Some(period);
        self
    }

    /// Template id used to render the body.
    pub fn template(&self) -> &'static str {
        self.kind.rule().template
    }
}

/// Outcome of one dispatch attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditStatus {
    Sent,
    Failed,
}

text_enum!(AuditStatus {
    Sent => "sent",
    Failed => "failed",
});

/// Append-only record of a dispatch attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Row id; 0 until stored.
    pub id: i64,
    /// `None` once the entity has been deleted by the application.
    pub entity: Option<EntityRef>,
    pub kind: NotificationKind,
    pub period: Option<NaiveDate>,
    pub subject: String,
    pub recipients: Vec<String>,
    pub status: AuditStatus,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl AuditRecord {
    pub fn sent(intent: &NotificationIntent) -> Self {
        Self::from_intent(intent, AuditStatus::Sent, None)
    }

    pub fn failed(intent: &NotificationIntent, error: impl Into<String>) -> Self {
        Self::from_intent(intent, AuditStatus::Failed, Some(error.into()))
    }

    fn from_intent(intent: &NotificationIntent, status: AuditStatus, error: Option<String>) -> Self {
        Self {
            id: 0,
            entity: Some(intent.entity),
            kind: intent.kind,
            period: intent.period,
            subject: intent.subject.clone(),
            recipients: intent.recipients.clone(),
            status,
            error,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_ref_parse_and_display() {
        let r = EntityRef::parse("review:12").unwrap();
        assert_eq!(r, EntityRef::new(EntityKind::Review, 12));
        assert_eq!(r.to_string(), "review#12");
        assert_eq!(EntityRef::parse("review#12"), Some(r));
        assert!(EntityRef::parse("nope:1").is_none());
        assert!(EntityRef::parse("review:x").is_none());
    }

    #[test]
    fn test_kind_names_are_unique() {
        let mut names: Vec<&str> = NotificationKind::ALL.iter().map(|k| k.as_str()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), NotificationKind::ALL.len());
        for kind in NotificationKind::ALL {
            assert_eq!(NotificationKind::parse(kind.as_str()), Some(kind));
        }
    }

    #[test]
    fn test_audit_record_from_intent() {
        let intent = NotificationIntent::new(
            EntityRef::new(EntityKind::Leave, 7),
            NotificationKind::LeaveReminderBefore,
            vec!["a@example.com".into()],
            "Leave Starts Tomorrow",
            serde_json::json!({}),
        );
        let sent = AuditRecord::sent(&intent);
        assert_eq!(sent.status, AuditStatus::Sent);
        assert!(sent.error.is_none());

        let failed = AuditRecord::failed(&intent, "timeout");
        assert_eq!(failed.status, AuditStatus::Failed);
        assert_eq!(failed.error.as_deref(), Some("timeout"));
        assert_eq!(failed.entity, Some(intent.entity));
    }
}
