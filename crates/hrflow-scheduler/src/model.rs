//! Entity definitions: the records whose dates and flags drive notification timing.
//!
//! Entities are owned by the surrounding HR application. The engine only reads
//! them and flips their "already notified" flags (false → true, never back).

use std::collections::HashMap;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Parse/format helpers for the text-encoded status columns.
macro_rules! text_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)+
                }
            }

            pub fn parse(s: &str) -> Option<Self> {
                match s {
                    $($text => Some(Self::$variant),)+
                    _ => None,
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

pub(crate) use text_enum;

/// Employee role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Employee,
    Manager,
    Hr,
    Admin,
}

text_enum!(Role {
    Employee => "employee",
    Manager => "manager",
    Hr => "hr",
    Admin => "admin",
});

/// A person known to the HR system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Employee {
    pub id: i64,
    pub username: String,
    pub full_name: String,
    pub email: String,
    pub role: Role,
    pub manager_id: Option<i64>,
}

impl Employee {
    pub fn new(id: i64, username: &str, email: &str, role: Role) -> Self {
        Self {
            id,
            username: username.to_string(),
            full_name: String::new(),
            email: email.to_string(),
            role,
            manager_id: None,
        }
    }

    /// Full name, falling back to the username.
    pub fn display_name(&self) -> &str {
        if self.full_name.trim().is_empty() {
            &self.username
        } else {
            &self.full_name
        }
    }

    /// Email address, if one is on file.
    pub fn address(&self) -> Option<&str> {
        let email = self.email.trim();
        if email.is_empty() { None } else { Some(email) }
    }
}

/// Attendance status for a day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttendanceStatus {
    Present,
    Late,
    Absent,
    HalfDay,
}

text_enum!(AttendanceStatus {
    Present => "present",
    Late => "late",
    Absent => "absent",
    HalfDay => "half_day",
});

/// One employee's attendance on one date.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub id: i64,
    pub employee_id: i64,
    pub attendance_date: NaiveDate,
    /// Local wall-clock time.
    pub check_in: Option<NaiveDateTime>,
    pub check_out: Option<NaiveDateTime>,
    pub status: AttendanceStatus,
}

/// Leave request status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaveStatus {
    Pending,
    Approved,
    Rejected,
    Cancelled,
}

text_enum!(LeaveStatus {
    Pending => "pending",
    Approved => "approved",
    Rejected => "rejected",
    Cancelled => "cancelled",
});

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaveRequest {
    pub id: i64,
    pub employee_id: i64,
    pub leave_type: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub reason: String,
    pub status: LeaveStatus,
    pub approved_by: Option<i64>,
    pub rejection_reason: String,
}

impl LeaveRequest {
    /// Inclusive length in days.
    pub fn duration_days(&self) -> i64 {
        (self.end_date - self.start_date).num_days() + 1
    }
}

/// Onboarding/offboarding progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessStatus {
    InProgress,
    Completed,
}

text_enum!(ProcessStatus {
    InProgress => "in_progress",
    Completed => "completed",
});

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Onboarding {
    pub id: i64,
    pub employee_id: i64,
    pub start_date: NaiveDate,
    pub status: ProcessStatus,
    pub welcome_email_sent: bool,
    pub day_3_checklist_sent: bool,
    pub day_5_checklist_sent: bool,
    pub day_7_checklist_sent: bool,
}

impl Onboarding {
    /// The "already sent" flag for the day-N checklist.
    pub fn checklist_sent(&self, day: u32) -> bool {
        match day {
            3 => self.day_3_checklist_sent,
            5 => self.day_5_checklist_sent,
            7 => self.day_7_checklist_sent,
            _ => true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OnboardingChecklistItem {
    pub id: i64,
    pub onboarding_id: i64,
    pub task: String,
    pub day: u32,
    pub is_completed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Offboarding {
    pub id: i64,
    pub employee_id: i64,
    pub last_working_day: NaiveDate,
    pub status: ProcessStatus,
    pub exit_email_sent: bool,
    pub farewell_email_sent: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OffboardingChecklistItem {
    pub id: i64,
    pub offboarding_id: i64,
    pub task: String,
    pub is_completed: bool,
}

/// A performance review period.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewCycle {
    pub id: i64,
    pub name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub submission_deadline: NaiveDate,
    pub self_assessment_link: String,
    pub guidelines: String,
    pub announcement_sent: bool,
    pub upcoming_notification_sent: bool,
    pub self_assessment_sent: bool,
    pub guidelines_sent: bool,
}

/// Review status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    Pending,
    Submitted,
    Review,
    Meeting,
    Completed,
    Overdue,
}

text_enum!(ReviewStatus {
    Pending => "pending",
    Submitted => "submitted",
    Review => "review",
    Meeting => "meeting",
    Completed => "completed",
    Overdue => "overdue",
});

/// One employee's review within a cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Review {
    pub id: i64,
    pub cycle_id: i64,
    pub employee_id: i64,
    pub manager_id: Option<i64>,
    pub status: ReviewStatus,
    pub submission_deadline: NaiveDate,
    pub self_assessment_submitted: bool,
    pub meeting_scheduled_for: Option<NaiveDateTime>,
    pub meeting_confirmation_sent: bool,
    pub review_summary: String,
    pub summary_shared: bool,
    pub goals_next_period: String,
    pub goals_shared: bool,
    pub reminder_7_sent: bool,
    pub reminder_3_sent: bool,
    pub reminder_1_sent: bool,
    pub overdue_notice_sent: bool,
    pub last_quarterly_goal_reminder: Option<NaiveDateTime>,
}

impl Review {
    /// Signed days from `today` to the submission deadline.
    pub fn days_until_deadline(&self, today: NaiveDate) -> i64 {
        (self.submission_deadline - today).num_days()
    }

    /// The "already sent" flag for the N-days-left reminder.
    pub fn reminder_sent(&self, days: i64) -> bool {
        match days {
            7 => self.reminder_7_sent,
            3 => self.reminder_3_sent,
            1 => self.reminder_1_sent,
            _ => true,
        }
    }
}

/// Goal status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalStatus {
    OnTrack,
    AtRisk,
    OffTrack,
    Completed,
}

text_enum!(GoalStatus {
    OnTrack => "on_track",
    AtRisk => "at_risk",
    OffTrack => "off_track",
    Completed => "completed",
});

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Goal {
    pub id: i64,
    pub review_id: i64,
    pub title: String,
    pub status: GoalStatus,
    pub progress_percent: u8,
    pub achievement_notified: bool,
    pub course_correction_notified: bool,
}

/// A manager's appreciation note for an employee.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appreciation {
    pub id: i64,
    pub manager_id: i64,
    pub employee_id: i64,
    pub subject: String,
    pub message: String,
    pub cc_team: bool,
    pub cc_hr: bool,
}

/// Employee lookup used by the rule evaluators.
#[derive(Debug, Clone, Default)]
pub struct Directory {
    by_id: HashMap<i64, Employee>,
}

impl Directory {
    pub fn new(employees: Vec<Employee>) -> Self {
        Self {
            by_id: employees.into_iter().map(|e| (e.id, e)).collect(),
        }
    }

    pub fn get(&self, id: i64) -> Option<&Employee> {
        self.by_id.get(&id)
    }

    pub fn manager_of(&self, employee: &Employee) -> Option<&Employee> {
        employee.manager_id.and_then(|id| self.get(id))
    }

    /// All people with a role, ordered by id.
    pub fn with_role(&self, role: Role) -> Vec<&Employee> {
        let mut out: Vec<&Employee> = self.by_id.values().filter(|e| e.role == role).collect();
        out.sort_by_key(|e| e.id);
        out
    }

    /// Employees reporting directly to `manager_id`, ordered by id.
    pub fn reports_of(&self, manager_id: i64) -> Vec<&Employee> {
        let mut out: Vec<&Employee> = self
            .by_id
            .values()
            .filter(|e| e.role == Role::Employee && e.manager_id == Some(manager_id))
            .collect();
        out.sort_by_key(|e| e.id);
        out
    }

    /// Everyone managed by `manager_id`, whatever their role, ordered by id.
    pub fn team_of(&self, manager_id: i64) -> Vec<&Employee> {
        let mut out: Vec<&Employee> = self
            .by_id
            .values()
            .filter(|e| e.manager_id == Some(manager_id))
            .collect();
        out.sort_by_key(|e| e.id);
        out
    }

    /// Display name for an id, or `fallback` when unknown.
    pub fn name_of(&self, id: Option<i64>, fallback: &str) -> String {
        id.and_then(|id| self.get(id))
            .map(|e| e.display_name().to_string())
            .unwrap_or_else(|| fallback.to_string())
    }

    /// Addresses for a list of people, skipping unknown ids and empty emails,
    /// de-duplicated in order.
    pub fn addresses(&self, ids: impl IntoIterator<Item = Option<i64>>) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for id in ids.into_iter().flatten() {
            if let Some(addr) = self.get(id).and_then(|e| e.address()) {
                if !out.iter().any(|a| a == addr) {
                    out.push(addr.to_string());
                }
            }
        }
        out
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn people() -> Directory {
        let boss = Employee::new(1, "boss", "boss@example.com", Role::Manager);
        let mut alice = Employee::new(2, "alice", "alice@example.com", Role::Employee);
        alice.full_name = "Alice Nguyen".into();
        alice.manager_id = Some(1);
        let mut bob = Employee::new(3, "bob", "", Role::Employee);
        bob.manager_id = Some(1);
        let hr = Employee::new(4, "hr", "hr@example.com", Role::Hr);
        Directory::new(vec![boss, alice, bob, hr])
    }

    #[test]
    fn test_display_name_fallback() {
        let dir = people();
        assert_eq!(dir.get(2).unwrap().display_name(), "Alice Nguyen");
        assert_eq!(dir.get(3).unwrap().display_name(), "bob");
    }

    #[test]
    fn test_reports_and_roles() {
        let dir = people();
        let reports: Vec<i64> = dir.reports_of(1).iter().map(|e| e.id).collect();
        assert_eq!(reports, vec![2, 3]);
        assert_eq!(dir.with_role(Role::Hr).len(), 1);
    }

    #[test]
    fn test_addresses_skip_missing_and_dedupe() {
        let dir = people();
        let addrs = dir.addresses([Some(2), Some(3), None, Some(99), Some(2), Some(1)]);
        assert_eq!(addrs, vec!["alice@example.com", "boss@example.com"]);
    }

    #[test]
    fn test_status_text_roundtrip_for_storage() {
        assert_eq!(ReviewStatus::parse("overdue"), Some(ReviewStatus::Overdue));
        assert_eq!(GoalStatus::OffTrack.as_str(), "off_track");
        assert_eq!(LeaveStatus::parse("bogus"), None);
    }

    #[test]
    fn test_review_days_until_deadline() {
        let review = Review {
            id: 1,
            cycle_id: 1,
            employee_id: 2,
            manager_id: Some(1),
            status: ReviewStatus::Pending,
            submission_deadline: NaiveDate::from_ymd_opt(2024, 6, 17).unwrap(),
            self_assessment_submitted: false,
            meeting_scheduled_for: None,
            meeting_confirmation_sent: false,
            review_summary: String::new(),
            summary_shared: false,
            goals_next_period: String::new(),
            goals_shared: false,
            reminder_7_sent: false,
            reminder_3_sent: false,
            reminder_1_sent: false,
            overdue_notice_sent: false,
            last_quarterly_goal_reminder: None,
        };
        let today = NaiveDate::from_ymd_opt(2024, 6, 10).unwrap();
        assert_eq!(review.days_until_deadline(today), 7);
        assert_eq!(review.days_until_deadline(today + chrono::Duration::days(8)), -1);
    }
}
