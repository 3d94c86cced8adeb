//! Onboarding and offboarding notifications.

use chrono::NaiveDate;
use serde_json::json;

use crate::model::{
    Directory, Offboarding, OffboardingChecklistItem, Onboarding, OnboardingChecklistItem,
    ProcessStatus,
};
use crate::notify::{EntityKind, EntityRef, NotificationIntent, NotificationKind};

/// Days after the start date on which a checklist is sent.
pub const CHECKLIST_DAYS: [(u32, NotificationKind); 3] = [
    (3, NotificationKind::OnboardingDay3),
    (5, NotificationKind::OnboardingDay5),
    (7, NotificationKind::OnboardingDay7),
];

pub const FIRST_DAY_INFO: &str = "Please report at 9:00 AM on your first day.";

/// Welcome mail for a new hire, unless already sent.
pub fn welcome(dir: &Directory, onboarding: &Onboarding) -> Vec<NotificationIntent> {
    if onboarding.welcome_email_sent {
        return Vec::new();
    }
    let Some(employee) = dir.get(onboarding.employee_id) else {
        return Vec::new();
    };
    vec![NotificationIntent::new(
        EntityRef::new(EntityKind::Onboarding, onboarding.id),
        NotificationKind::Welcome,
        dir.addresses([Some(employee.id)]),
        "Welcome to Our Company!",
        json!({
            "employee_name": employee.display_name(),
            "username": employee.username,
            "first_day_info": FIRST_DAY_INFO,
        }),
    )]
}

/// Day-N checklists for in-progress onboardings started exactly N days ago.
pub fn checklists(
    today: NaiveDate,
    dir: &Directory,
    onboardings: &[Onboarding],
    items: &[OnboardingChecklistItem],
) -> Vec<NotificationIntent> {
    let mut out = Vec::new();
    for ob in onboardings.iter().filter(|o| o.status == ProcessStatus::InProgress) {
        let elapsed = (today - ob.start_date).num_days();
        for (day, kind) in CHECKLIST_DAYS {
            if elapsed != i64::from(day) || ob.checklist_sent(day) {
                continue;
            }
            let Some(employee) = dir.get(ob.employee_id) else {
                continue;
            };
            let tasks: Vec<&str> = items
                .iter()
                .filter(|i| i.onboarding_id == ob.id && i.day == day)
                .map(|i| i.task.as_str())
                .collect();
            out.push(NotificationIntent::new(
                EntityRef::new(EntityKind::Onboarding, ob.id),
                kind,
                dir.addresses([Some(employee.id)]),
                format!("Day {day} Onboarding Checklist"),
                json!({
                    "employee_name": employee.display_name(),
                    "day": day,
                    "checklist_items": tasks,
                }),
            ));
        }
    }
    out
}

/// Exit-process information with the offboarding checklist.
pub fn exit_process(
    dir: &Directory,
    offboarding: &Offboarding,
    items: &[OffboardingChecklistItem],
) -> Vec<NotificationIntent> {
    if offboarding.exit_email_sent {
        return Vec::new();
    }
    let Some(employee) = dir.get(offboarding.employee_id) else {
        return Vec::new();
    };
    let tasks: Vec<&str> = items
        .iter()
        .filter(|i| i.offboarding_id == offboarding.id)
        .map(|i| i.task.as_str())
        .collect();
    vec![NotificationIntent::new(
        EntityRef::new(EntityKind::Offboarding, offboarding.id),
        NotificationKind::ExitProcess,
        dir.addresses([Some(employee.id)]),
        "Exit Process Information",
        json!({
            "employee_name": employee.display_name(),
            "last_working_day": offboarding.last_working_day.to_string(),
            "checklist_items": tasks,
        }),
    )]
}

pub fn farewell(dir: &Directory, offboarding: &Offboarding) -> Vec<NotificationIntent> {
    if offboarding.farewell_email_sent {
        return Vec::new();
    }
    let Some(employee) = dir.get(offboarding.employee_id) else {
        return Vec::new();
    };
    vec![NotificationIntent::new(
        EntityRef::new(EntityKind::Offboarding, offboarding.id),
        NotificationKind::Farewell,
        dir.addresses([Some(employee.id)]),
        "Farewell - Best Wishes for Your Future!",
        json!({
            "employee_name": employee.display_name(),
            "last_working_day": offboarding.last_working_day.to_string(),
        }),
    )]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Employee, Role};

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn people() -> Directory {
        let mut newbie = Employee::new(5, "newbie", "newbie@example.com", Role::Employee);
        newbie.full_name = "New Bie".into();
        Directory::new(vec![newbie])
    }

    fn onboarding(start: NaiveDate) -> Onboarding {
        Onboarding {
            id: 1,
            employee_id: 5,
            start_date: start,
            status: ProcessStatus::InProgress,
            welcome_email_sent: false,
            day_3_checklist_sent: false,
            day_5_checklist_sent: false,
            day_7_checklist_sent: false,
        }
    }

    fn item(id: i64, day: u32, task: &str) -> OnboardingChecklistItem {
        OnboardingChecklistItem {
            id,
            onboarding_id: 1,
            task: task.into(),
            day,
            is_completed: false,
        }
    }

    #[test]
    fn test_checklist_day_is_exact() {
        let ob = onboarding(d(2024, 6, 1));
        let items = vec![item(1, 3, "Meet the team"), item(2, 5, "Set up laptop")];
        let dir = people();
        let kinds = |today| -> Vec<NotificationKind> {
            checklists(today, &dir, std::slice::from_ref(&ob), &items)
                .into_iter()
                .map(|i| i.kind)
                .collect()
        };
        assert!(kinds(d(2024, 6, 3)).is_empty());
        assert_eq!(kinds(d(2024, 6, 4)), vec![NotificationKind::OnboardingDay3]);
        assert_eq!(kinds(d(2024, 6, 6)), vec![NotificationKind::OnboardingDay5]);
        assert_eq!(kinds(d(2024, 6, 8)), vec![NotificationKind::OnboardingDay7]);
        assert!(kinds(d(2024, 6, 9)).is_empty());
    }

    #[test]
    fn test_checklist_lists_only_that_days_tasks() {
        let ob = onboarding(d(2024, 6, 1));
        let items = vec![item(1, 3, "Meet the team"), item(2, 5, "Set up laptop")];
        let intents = checklists(d(2024, 6, 4), &people(), &[ob], &items);
        assert_eq!(intents[0].context["checklist_items"], json!(["Meet the team"]));
        assert_eq!(intents[0].subject, "Day 3 Onboarding Checklist");
    }

    #[test]
    fn test_checklist_skips_sent_and_completed() {
        let mut sent = onboarding(d(2024, 6, 1));
        sent.day_3_checklist_sent = true;
        assert!(checklists(d(2024, 6, 4), &people(), &[sent], &[]).is_empty());

        let mut done = onboarding(d(2024, 6, 1));
        done.status = ProcessStatus::Completed;
        assert!(checklists(d(2024, 6, 4), &people(), &[done], &[]).is_empty());
    }

    #[test]
    fn test_welcome_has_no_password() {
        let intents = welcome(&people(), &onboarding(d(2024, 6, 1)));
        assert_eq!(intents.len(), 1);
        assert_eq!(intents[0].context["employee_name"], "New Bie");
        assert!(intents[0].context.get("temp_password").is_none());

        let mut sent = onboarding(d(2024, 6, 1));
        sent.welcome_email_sent = true;
        assert!(welcome(&people(), &sent).is_empty());
    }

    #[test]
    fn test_offboarding_mails() {
        let off = Offboarding {
            id: 9,
            employee_id: 5,
            last_working_day: d(2024, 6, 28),
            status: ProcessStatus::InProgress,
            exit_email_sent: false,
            farewell_email_sent: true,
        };
        let items = vec![OffboardingChecklistItem {
            id: 1,
            offboarding_id: 9,
            task: "Return badge".into(),
            is_completed: false,
        }];
        let exit = exit_process(&people(), &off, &items);
        assert_eq!(exit.len(), 1);
        assert_eq!(exit[0].context["checklist_items"], json!(["Return badge"]));
        assert!(farewell(&people(), &off).is_empty());
    }
}
