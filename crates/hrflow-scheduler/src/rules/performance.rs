//! Performance review notifications: cycle announcements, review reminders,
//! meeting and summary mails, goal status mails, quarterly nudges and
//! appreciation notes.

use std::collections::HashMap;

use chrono::{Datelike, NaiveDate};
use serde_json::{Value, json};

use super::quarter_start;
use crate::model::{
    Appreciation, Directory, Goal, GoalStatus, Review, ReviewCycle, ReviewStatus, Role,
};
use crate::notify::{EntityKind, EntityRef, NotificationIntent, NotificationKind};

/// Days before a cycle starts that the "starts soon" notice goes out.
pub const UPCOMING_DAYS: i64 = 14;

/// Deadline reminders: days left and the subject used.
const REMINDERS: [(i64, NotificationKind, &str); 3] = [
    (7, NotificationKind::ReviewReminder7, "Performance Review Reminder: 7 Days Left"),
    (3, NotificationKind::ReviewReminder3, "Performance Review Reminder: 3 Days Left"),
    (1, NotificationKind::ReviewReminder1, "Urgent: Performance Review Due Tomorrow"),
];

/// Review statuses that still get the quarterly goal nudge.
const QUARTERLY_STATUSES: [ReviewStatus; 3] =
    [ReviewStatus::Pending, ReviewStatus::Submitted, ReviewStatus::Review];

fn cycle_context(cycle: &ReviewCycle) -> Value {
    json!({
        "cycle_name": cycle.name,
        "start_date": cycle.start_date.to_string(),
        "end_date": cycle.end_date.to_string(),
        "submission_deadline": cycle.submission_deadline.to_string(),
        "self_assessment_link": cycle.self_assessment_link,
        "guidelines": cycle.guidelines,
    })
}

/// Every reviewee in the cycle with an address on file.
fn cycle_recipients(dir: &Directory, cycle: &ReviewCycle, reviews: &[Review]) -> Vec<String> {
    dir.addresses(
        reviews
            .iter()
            .filter(|r| r.cycle_id == cycle.id)
            .map(|r| Some(r.employee_id)),
    )
}

fn cycle_intent(
    dir: &Directory,
    cycle: &ReviewCycle,
    reviews: &[Review],
    kind: NotificationKind,
    subject: String,
) -> NotificationIntent {
    NotificationIntent::new(
        EntityRef::new(EntityKind::ReviewCycle, cycle.id),
        kind,
        cycle_recipients(dir, cycle, reviews),
        subject,
        cycle_context(cycle),
    )
}

/// Mails sent when a cycle is launched: announcement, guidelines and the
/// self-assessment link, each only once and only when it has content.
pub fn cycle_launch(dir: &Directory, cycle: &ReviewCycle, reviews: &[Review]) -> Vec<NotificationIntent> {
    let mut out = Vec::new();
    if !cycle.announcement_sent {
        out.push(cycle_intent(
            dir,
            cycle,
            reviews,
            NotificationKind::CycleAnnouncement,
            format!("{} Performance Review Kick-off", cycle.name),
        ));
    }
    if !cycle.guidelines.trim().is_empty() && !cycle.guidelines_sent {
        out.push(cycle_intent(
            dir,
            cycle,
            reviews,
            NotificationKind::CycleGuidelines,
            format!("{} Review Guidelines & Criteria", cycle.name),
        ));
    }
    if !cycle.self_assessment_link.trim().is_empty() && !cycle.self_assessment_sent {
        out.push(cycle_intent(
            dir,
            cycle,
            reviews,
            NotificationKind::CycleSelfAssessment,
            format!("{} Self-Assessment Form", cycle.name),
        ));
    }
    out
}

/// Daily cycle scan: "starts soon" and "deadline today" notices.
pub fn cycle_notifications(
    today: NaiveDate,
    dir: &Directory,
    cycles: &[ReviewCycle],
    reviews: &[Review],
) -> Vec<NotificationIntent> {
    let mut out = Vec::new();
    for cycle in cycles {
        if (cycle.start_date - today).num_days() == UPCOMING_DAYS && !cycle.upcoming_notification_sent {
            out.push(cycle_intent(
                dir,
                cycle,
                reviews,
                NotificationKind::CycleUpcoming,
                format!("{} Review Period Starts Soon", cycle.name),
            ));
        }
        if today == cycle.submission_deadline
            && !cycle.self_assessment_sent
            && !cycle.self_assessment_link.trim().is_empty()
        {
            out.push(cycle_intent(
                dir,
                cycle,
                reviews,
                NotificationKind::CycleSelfAssessment,
                format!("{} Submission Deadline Today", cycle.name),
            ));
        }
    }
    out
}

/// Daily review scan. Several kinds may be due for one review in one pass.
pub fn review_notifications(
    today: NaiveDate,
    dir: &Directory,
    cycles: &[ReviewCycle],
    reviews: &[Review],
) -> Vec<NotificationIntent> {
    let names = cycle_names(cycles);
    let mut out = Vec::new();

    for review in reviews {
        let entity = EntityRef::new(EntityKind::Review, review.id);
        let ctx = review_context(dir, review, &names);
        let employee_only = dir.addresses([Some(review.employee_id)]);
        let both = dir.addresses([Some(review.employee_id), review.manager_id]);
        let mut push = |kind, to: &Vec<String>, subject: &str| {
            out.push(NotificationIntent::new(entity, kind, to.clone(), subject, ctx.clone()));
        };

        if !review.self_assessment_submitted {
            let days = review.days_until_deadline(today);
            for (left, kind, subject) in REMINDERS {
                if days == left && !review.reminder_sent(left) {
                    push(kind, &employee_only, subject);
                }
            }
            if days < 0 && !review.overdue_notice_sent {
                push(NotificationKind::ReviewOverdue, &employee_only, "Performance Review Overdue");
            }
        }
        if review.meeting_scheduled_for.is_some() && !review.meeting_confirmation_sent {
            push(
                NotificationKind::MeetingConfirmation,
                &both,
                "Performance Review Meeting Scheduled",
            );
        }
        if !review.review_summary.trim().is_empty() && !review.summary_shared {
            push(NotificationKind::ReviewSummary, &both, "Performance Review Summary");
        }
        if !review.goals_next_period.trim().is_empty() && !review.goals_shared {
            push(NotificationKind::GoalSetting, &both, "Goals for Next Review Period");
        }
    }
    out
}

/// Completed goals get a congratulation, off-track goals a course correction.
pub fn goal_notifications(dir: &Directory, reviews: &[Review], goals: &[Goal]) -> Vec<NotificationIntent> {
    let by_id: HashMap<i64, &Review> = reviews.iter().map(|r| (r.id, r)).collect();
    let mut out = Vec::new();

    for goal in goals {
        let due = match goal.status {
            GoalStatus::Completed if !goal.achievement_notified => {
                (NotificationKind::GoalAchievement, format!("Goal Achieved: {}", goal.title))
            }
            GoalStatus::OffTrack if !goal.course_correction_notified => (
                NotificationKind::CourseCorrection,
                format!("Course Correction Needed: {}", goal.title),
            ),
            _ => continue,
        };
        let Some(review) = by_id.get(&goal.review_id) else {
            tracing::warn!("goal#{} references missing review#{}", goal.id, goal.review_id);
            continue;
        };
        let (kind, subject) = due;
        out.push(NotificationIntent::new(
            EntityRef::new(EntityKind::Goal, goal.id),
            kind,
            dir.addresses([Some(review.employee_id), review.manager_id]),
            subject,
            json!({
                "employee_name": dir.name_of(Some(review.employee_id), "there"),
                "manager_name": dir.name_of(review.manager_id, "your manager"),
                "goal_title": goal.title,
                "progress": goal.progress_percent,
            }),
        ));
    }
    out
}

/// Quarterly nudge for open reviews not yet reminded this quarter.
pub fn quarterly_reminders(
    today: NaiveDate,
    dir: &Directory,
    cycles: &[ReviewCycle],
    reviews: &[Review],
) -> Vec<NotificationIntent> {
    let quarter = quarter_start(today);
    let names = cycle_names(cycles);
    let label = format!("Q{} {}", (quarter.month() - 1) / 3 + 1, quarter.year());

    reviews
        .iter()
        .filter(|r| QUARTERLY_STATUSES.contains(&r.status))
        .filter(|r| !reminded_in_quarter(r, quarter))
        .map(|r| {
            let mut ctx = review_context(dir, r, &names);
            ctx["quarter"] = json!(label);
            NotificationIntent::new(
                EntityRef::new(EntityKind::Review, r.id),
                NotificationKind::QuarterlyGoalReminder,
                dir.addresses([Some(r.employee_id), r.manager_id]),
                "Quarterly Goal Progress Reminder",
                ctx,
            )
            .for_period(quarter)
        })
        .collect()
}

/// Whether the review's quarterly stamp falls inside the quarter starting at `quarter`.
pub fn reminded_in_quarter(review: &Review, quarter: NaiveDate) -> bool {
    review
        .last_quarterly_goal_reminder
        .is_some_and(|at| quarter_start(at.date()) == quarter)
}

/// Appreciation note to the employee, optionally copying the team and HR.
pub fn appreciation(dir: &Directory, record: &Appreciation) -> Vec<NotificationIntent> {
    let mut ids = vec![Some(record.employee_id)];
    if record.cc_team {
        ids.extend(
            dir.team_of(record.manager_id)
                .into_iter()
                .filter(|e| e.id != record.employee_id)
                .map(|e| Some(e.id)),
        );
    }
    if record.cc_hr {
        ids.extend(dir.with_role(Role::Hr).into_iter().map(|e| Some(e.id)));
    }

    vec![NotificationIntent::new(
        EntityRef::new(EntityKind::Appreciation, record.id),
        NotificationKind::Appreciation,
        dir.addresses(ids),
        record.subject.clone(),
        json!({
            "employee_name": dir.name_of(Some(record.employee_id), "there"),
            "manager_name": dir.name_of(Some(record.manager_id), "Your manager"),
            "subject": record.subject,
            "message": record.message,
        }),
    )]
}

fn cycle_names(cycles: &[ReviewCycle]) -> HashMap<i64, &str> {
    cycles.iter().map(|c| (c.id, c.name.as_str())).collect()
}

fn review_context(dir: &Directory, review: &Review, names: &HashMap<i64, &str>) -> Value {
    json!({
        "employee_name": dir.name_of(Some(review.employee_id), "there"),
        "manager_name": dir.name_of(review.manager_id, "your manager"),
        "cycle_name": names.get(&review.cycle_id).copied().unwrap_or("performance"),
        "deadline": review.submission_deadline.to_string(),
        "meeting_at": review
            .meeting_scheduled_for
            .map(|at| at.format("%Y-%m-%d %H:%M").to_string()),
        "review_summary": review.review_summary,
        "goals_next_period": review.goals_next_period,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Employee;
    use chrono::Duration;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn people() -> Directory {
        let boss = Employee::new(1, "boss", "boss@example.com", Role::Manager);
        let mut alice = Employee::new(2, "alice", "alice@example.com", Role::Employee);
        alice.manager_id = Some(1);
        let mut bob = Employee::new(3, "bob", "bob@example.com", Role::Employee);
        bob.manager_id = Some(1);
        let hr = Employee::new(4, "hr", "hr@example.com", Role::Hr);
        let mut carol = Employee::new(6, "carol", "alice@example.com", Role::Employee);
        carol.manager_id = Some(1);
        Directory::new(vec![boss, alice, bob, hr, carol])
    }

    fn cycle() -> ReviewCycle {
        ReviewCycle {
            id: 1,
            name: "H1 2024".into(),
            start_date: d(2024, 7, 1),
            end_date: d(2024, 7, 31),
            submission_deadline: d(2024, 7, 20),
            self_assessment_link: "https://forms.example.com/h1".into(),
            guidelines: String::new(),
            announcement_sent: false,
            upcoming_notification_sent: false,
            self_assessment_sent: false,
            guidelines_sent: false,
        }
    }

    fn review(id: i64, employee_id: i64, deadline: NaiveDate) -> Review {
        Review {
            id,
            cycle_id: 1,
            employee_id,
            manager_id: Some(1),
            status: ReviewStatus::Pending,
            submission_deadline: deadline,
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
        }
    }

    fn kinds(intents: &[NotificationIntent]) -> Vec<NotificationKind> {
        intents.iter().map(|i| i.kind).collect()
    }

    #[test]
    fn test_reminders_are_exact_day() {
        let deadline = d(2024, 6, 17);
        let reviews = vec![review(1, 2, deadline)];
        let dir = people();
        let at = |days_before: i64| {
            kinds(&review_notifications(deadline - Duration::days(days_before), &dir, &[cycle()], &reviews))
        };
        assert_eq!(at(7), vec![NotificationKind::ReviewReminder7]);
        assert!(at(6).is_empty());
        assert!(at(8).is_empty());
        assert_eq!(at(3), vec![NotificationKind::ReviewReminder3]);
        assert_eq!(at(1), vec![NotificationKind::ReviewReminder1]);
        assert!(at(0).is_empty());
        assert_eq!(at(-1), vec![NotificationKind::ReviewOverdue]);
        assert_eq!(at(-30), vec![NotificationKind::ReviewOverdue]);
    }

    #[test]
    fn test_reminders_respect_flags_and_submission() {
        let deadline = d(2024, 6, 17);
        let mut sent = review(1, 2, deadline);
        sent.reminder_7_sent = true;
        let mut submitted = review(2, 3, deadline);
        submitted.self_assessment_submitted = true;
        let today = deadline - Duration::days(7);
        assert!(review_notifications(today, &people(), &[], &[sent, submitted]).is_empty());
    }

    #[test]
    fn test_several_kinds_due_in_one_pass() {
        let mut r = review(1, 2, d(2024, 6, 1));
        r.meeting_scheduled_for = Some(d(2024, 6, 20).and_hms_opt(14, 0, 0).unwrap());
        r.review_summary = "Strong half".into();
        let intents = review_notifications(d(2024, 6, 10), &people(), &[cycle()], &[r]);
        assert_eq!(
            kinds(&intents),
            vec![
                NotificationKind::ReviewOverdue,
                NotificationKind::MeetingConfirmation,
                NotificationKind::ReviewSummary,
            ]
        );
        assert_eq!(intents[0].recipients, vec!["alice@example.com"]);
        assert_eq!(intents[1].recipients, vec!["alice@example.com", "boss@example.com"]);
        assert_eq!(intents[1].context["meeting_at"], "2024-06-20 14:00");
        assert_eq!(intents[1].context["cycle_name"], "H1 2024");
    }

    #[test]
    fn test_cycle_launch() {
        let reviews = vec![review(1, 2, d(2024, 7, 20)), review(2, 3, d(2024, 7, 20))];
        let intents = cycle_launch(&people(), &cycle(), &reviews);
        assert_eq!(
            kinds(&intents),
            vec![NotificationKind::CycleAnnouncement, NotificationKind::CycleSelfAssessment]
        );
        assert_eq!(intents[0].recipients, vec!["alice@example.com", "bob@example.com"]);

        let mut with_guidelines = cycle();
        with_guidelines.guidelines = "Be specific.".into();
        with_guidelines.self_assessment_link = String::new();
        let intents = cycle_launch(&people(), &with_guidelines, &reviews);
        assert_eq!(
            kinds(&intents),
            vec![NotificationKind::CycleAnnouncement, NotificationKind::CycleGuidelines]
        );
    }

    #[test]
    fn test_cycle_upcoming_and_deadline_day() {
        let c = cycle();
        assert_eq!(
            kinds(&cycle_notifications(d(2024, 6, 17), &people(), &[c.clone()], &[])),
            vec![NotificationKind::CycleUpcoming]
        );
        assert!(cycle_notifications(d(2024, 6, 16), &people(), &[c.clone()], &[]).is_empty());
        assert_eq!(
            kinds(&cycle_notifications(d(2024, 7, 20), &people(), &[c.clone()], &[])),
            vec![NotificationKind::CycleSelfAssessment]
        );

        let mut no_link = c;
        no_link.self_assessment_link = String::new();
        assert!(cycle_notifications(d(2024, 7, 20), &people(), &[no_link], &[]).is_empty());
    }

    #[test]
    fn test_goal_notifications() {
        let reviews = vec![review(1, 2, d(2024, 7, 20))];
        let goal = |id, status, notified| Goal {
            id,
            review_id: 1,
            title: format!("Goal {id}"),
            status,
            progress_percent: 40,
            achievement_notified: notified,
            course_correction_notified: notified,
        };
        let goals = vec![
            goal(1, GoalStatus::Completed, false),
            goal(2, GoalStatus::OffTrack, false),
            goal(3, GoalStatus::OnTrack, false),
            goal(4, GoalStatus::Completed, true),
        ];
        let intents = goal_notifications(&people(), &reviews, &goals);
        assert_eq!(
            kinds(&intents),
            vec![NotificationKind::GoalAchievement, NotificationKind::CourseCorrection]
        );
        assert_eq!(intents[0].subject, "Goal Achieved: Goal 1");
        assert_eq!(intents[1].recipients, vec!["alice@example.com", "boss@example.com"]);
    }

    #[test]
    fn test_quarterly_reminders_once_per_quarter() {
        let today = d(2024, 7, 1);
        let mut fresh = review(1, 2, d(2024, 7, 20));
        fresh.last_quarterly_goal_reminder = Some(d(2024, 4, 1).and_hms_opt(9, 0, 0).unwrap());
        let mut reminded = review(2, 3, d(2024, 7, 20));
        reminded.last_quarterly_goal_reminder = Some(d(2024, 7, 1).and_hms_opt(9, 0, 0).unwrap());
        let mut done = review(3, 2, d(2024, 7, 20));
        done.status = ReviewStatus::Completed;

        let intents = quarterly_reminders(today, &people(), &[cycle()], &[fresh, reminded, done]);
        assert_eq!(intents.len(), 1);
        assert_eq!(intents[0].entity, EntityRef::new(EntityKind::Review, 1));
        assert_eq!(intents[0].period, Some(today));
        assert_eq!(intents[0].context["quarter"], "Q3 2024");
    }

    #[test]
    fn test_appreciation_recipients_deduplicated_in_order() {
        let record = Appreciation {
            id: 1,
            manager_id: 1,
            employee_id: 2,
            subject: "Great launch".into(),
            message: "Thank you!".into(),
            cc_team: true,
            cc_hr: true,
        };
        let intents = appreciation(&people(), &record);
        // carol shares alice's address and collapses into it
        assert_eq!(
            intents[0].recipients,
            vec!["alice@example.com", "bob@example.com", "hr@example.com"]
        );
        assert_eq!(intents[0].subject, "Great launch");

        let quiet = Appreciation { cc_team: false, cc_hr: false, ..record };
        assert_eq!(appreciation(&people(), &quiet)[0].recipients, vec!["alice@example.com"]);
    }
}
