//! Recurring jobs and transition events: load a snapshot, evaluate the rules.

use chrono::NaiveDateTime;
use hrflow_core::Result;
use serde::{Deserialize, Serialize};

use crate::model::{Directory, LeaveStatus, text_enum};
use crate::notify::NotificationIntent;
use crate::rules::attendance::{previous_month, previous_week};
use crate::rules::{TransitionEvent, attendance, leave, onboarding, performance};
use crate::store::HrStore;

/// The recurring scans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobName {
    MorningCheckin,
    LateCheckin,
    MissingCheckout,
    WeeklyReport,
    MonthlyReport,
    LeaveReminders,
    OnboardingChecklists,
    ReviewNotifications,
    GoalNotifications,
    QuarterlyGoalReminders,
}

text_enum!(JobName {
    MorningCheckin => "morning_checkin",
    LateCheckin => "late_checkin",
    MissingCheckout => "missing_checkout",
    WeeklyReport => "weekly_report",
    MonthlyReport => "monthly_report",
    LeaveReminders => "leave_reminders",
    OnboardingChecklists => "onboarding_checklists",
    ReviewNotifications => "review_notifications",
    GoalNotifications => "goal_notifications",
    QuarterlyGoalReminders => "quarterly_goal_reminders",
});

impl JobName {
    pub const ALL: [JobName; 10] = [
        Self::MorningCheckin,
        Self::LateCheckin,
        Self::MissingCheckout,
        Self::WeeklyReport,
        Self::MonthlyReport,
        Self::LeaveReminders,
        Self::OnboardingChecklists,
        Self::ReviewNotifications,
        Self::GoalNotifications,
        Self::QuarterlyGoalReminders,
    ];

    /// Built-in cadence, local wall-clock time.
    pub fn default_cron(&self) -> &'static str {
        match self {
            Self::MorningCheckin => "0 9 * * *",
            Self::LateCheckin => "30 9 * * *",
            Self::MissingCheckout => "0 18 * * *",
            Self::WeeklyReport => "0 8 * * 1",
            Self::MonthlyReport => "0 9 1 * *",
            Self::LeaveReminders => "0 8 * * *",
            Self::OnboardingChecklists => "0 9 * * *",
            Self::ReviewNotifications => "0 7 * * *",
            Self::GoalNotifications => "0 * * * *",
            Self::QuarterlyGoalReminders => "0 9 1 1,4,7,10 *",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::MorningCheckin => "Remind employees who have not checked in",
            Self::LateCheckin => "Alert on check-ins after 09:30",
            Self::MissingCheckout => "Remind employees who have not checked out",
            Self::WeeklyReport => "Previous week's attendance to each manager",
            Self::MonthlyReport => "Previous month's attendance summary to HR",
            Self::LeaveReminders => "Day-before and welcome-back leave reminders",
            Self::OnboardingChecklists => "Day 3/5/7 onboarding checklists",
            Self::ReviewNotifications => "Review cycle notices, deadline reminders and follow-ups",
            Self::GoalNotifications => "Goal achievement and course correction mails",
            Self::QuarterlyGoalReminders => "Quarterly goal progress nudge",
        }
    }
}

/// Evaluate one job against the current store contents.
pub fn collect(job: JobName, store: &dyn HrStore, now: NaiveDateTime) -> Result<Vec<NotificationIntent>> {
    let today = now.date();
    let dir = Directory::new(store.employees()?);

    let intents = match job {
        JobName::MorningCheckin => {
            attendance::checkin_reminders(today, &dir, &store.attendance_between(today, today)?)
        }
        JobName::LateCheckin => {
            attendance::late_checkins(today, &dir, &store.attendance_between(today, today)?)
        }
        JobName::MissingCheckout => {
            attendance::checkout_reminders(today, &dir, &store.attendance_between(today, today)?)
        }
        JobName::WeeklyReport => {
            let (start, end) = previous_week(today);
            attendance::weekly_reports(today, &dir, &store.attendance_between(start, end)?)
        }
        JobName::MonthlyReport => {
            let (start, end) = previous_month(today);
            attendance::monthly_reports(today, &dir, &store.attendance_between(start, end)?)
        }
        JobName::LeaveReminders => {
            leave::reminders(today, &dir, &store.leaves_with_status(LeaveStatus::Approved)?)
        }
        JobName::OnboardingChecklists => {
            onboarding::checklists(today, &dir, &store.onboardings()?, &store.onboarding_items()?)
        }
        JobName::ReviewNotifications => {
            let cycles = store.review_cycles()?;
            let reviews = store.reviews()?;
            let mut out = performance::cycle_notifications(today, &dir, &cycles, &reviews);
            out.extend(performance::review_notifications(today, &dir, &cycles, &reviews));
            out
        }
        JobName::GoalNotifications => {
            performance::goal_notifications(&dir, &store.reviews()?, &store.goals()?)
        }
        JobName::QuarterlyGoalReminders => {
            performance::quarterly_reminders(today, &dir, &store.review_cycles()?, &store.reviews()?)
        }
    };
    Ok(intents)
}

/// Evaluate a state change. A missing entity yields no intents.
pub fn collect_transition(event: TransitionEvent, store: &dyn HrStore) -> Result<Vec<NotificationIntent>> {
    let dir = Directory::new(store.employees()?);

    let intents = match event {
        TransitionEvent::LeaveSubmitted { leave_id } => store
            .leave(leave_id)?
            .map(|l| leave::submitted(&dir, &l)),
        TransitionEvent::LeaveDecided { leave_id } => store
            .leave(leave_id)?
            .map(|l| leave::decided(&dir, &l)),
        TransitionEvent::OnboardingStarted { employee_id } => store
            .onboarding_for_employee(employee_id)?
            .map(|o| onboarding::welcome(&dir, &o)),
        TransitionEvent::OffboardingStarted { offboarding_id } => match store.offboarding(offboarding_id)? {
            Some(o) => Some(onboarding::exit_process(&dir, &o, &store.offboarding_items(o.id)?)),
            None => None,
        },
        TransitionEvent::OffboardingFarewell { offboarding_id } => store
            .offboarding(offboarding_id)?
            .map(|o| onboarding::farewell(&dir, &o)),
        TransitionEvent::CycleLaunched { cycle_id } => match store.review_cycle(cycle_id)? {
            Some(c) => Some(performance::cycle_launch(&dir, &c, &store.reviews()?)),
            None => None,
        },
        TransitionEvent::AppreciationRecorded { appreciation_id } => store
            .appreciation(appreciation_id)?
            .map(|a| performance::appreciation(&dir, &a)),
    };

    Ok(intents.unwrap_or_else(|| {
        tracing::warn!("⚠️ {event:?}: entity not found, nothing to send");
        Vec::new()
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cron::CronSchedule;
    use crate::model::{LeaveRequest, Onboarding, ProcessStatus};
    use crate::notify::NotificationKind;
    use crate::rules::kinds_for_job;
    use crate::testing::{at, d, seeded_store};

    #[test]
    fn test_default_crons_parse() {
        for job in JobName::ALL {
            assert!(CronSchedule::parse(job.default_cron()).is_ok(), "{job}");
            assert_eq!(JobName::parse(job.as_str()), Some(job));
            assert!(!kinds_for_job(job).is_empty(), "{job} emits nothing");
        }
    }

    #[test]
    fn test_collect_checkin_reminders() {
        let store = seeded_store();
        let intents = collect(JobName::MorningCheckin, &*store, at(d(2024, 6, 10), 9, 0)).unwrap();
        let kinds: Vec<_> = intents.iter().map(|i| i.kind).collect();
        assert_eq!(kinds, vec![NotificationKind::CheckinReminder; 2]);
    }

    #[test]
    fn test_collect_leave_reminders() {
        let store = seeded_store();
        store
            .save_leave(&LeaveRequest {
                id: 0,
                employee_id: 2,
                leave_type: "Vacation".into(),
                start_date: d(2024, 6, 11),
                end_date: d(2024, 6, 12),
                reason: String::new(),
                status: LeaveStatus::Approved,
                approved_by: Some(1),
                rejection_reason: String::new(),
            })
            .unwrap();
        let intents = collect(JobName::LeaveReminders, &*store, at(d(2024, 6, 10), 8, 0)).unwrap();
        assert_eq!(intents.len(), 1);
        assert_eq!(intents[0].kind, NotificationKind::LeaveReminderBefore);
    }

    #[test]
    fn test_transition_for_missing_entity_is_empty() {
        let store = seeded_store();
        let intents =
            collect_transition(TransitionEvent::LeaveSubmitted { leave_id: 77 }, &*store).unwrap();
        assert!(intents.is_empty());
    }

    #[test]
    fn test_onboarding_started_finds_by_employee() {
        let store = seeded_store();
        store
            .save_onboarding(&Onboarding {
                id: 0,
                employee_id: 3,
                start_date: d(2024, 6, 10),
                status: ProcessStatus::InProgress,
                welcome_email_sent: false,
                day_3_checklist_sent: false,
                day_5_checklist_sent: false,
                day_7_checklist_sent: false,
            })
            .unwrap();
        let intents =
            collect_transition(TransitionEvent::OnboardingStarted { employee_id: 3 }, &*store).unwrap();
        assert_eq!(intents.len(), 1);
        assert_eq!(intents[0].kind, NotificationKind::Welcome);
        assert_eq!(intents[0].recipients, vec!["bob@example.com"]);
    }
}
