//! Attendance notifications: check-in and check-out nudges, weekly and monthly reports.

use chrono::{Datelike, Duration, NaiveDate, NaiveTime, Timelike};
use serde_json::json;

use crate::model::{AttendanceRecord, AttendanceStatus, Directory, Role};
use crate::notify::{EntityKind, EntityRef, NotificationIntent, NotificationKind};

/// Check-ins at or after this wall-clock time are late.
pub const LATE_AFTER: (u32, u32) = (9, 30);

pub fn is_late(check_in: NaiveTime) -> bool {
    (check_in.hour(), check_in.minute()) >= LATE_AFTER
}

/// The Monday–Sunday week before the one containing `today`.
pub fn previous_week(today: NaiveDate) -> (NaiveDate, NaiveDate) {
    let offset = i64::from(today.weekday().num_days_from_monday()) + 7;
    let start = today - Duration::days(offset);
    (start, start + Duration::days(6))
}

/// The calendar month before the one containing `today`.
pub fn previous_month(today: NaiveDate) -> (NaiveDate, NaiveDate) {
    let first_of_this = today.with_day(1).unwrap_or(today);
    let end = first_of_this - Duration::days(1);
    let start = end.with_day(1).unwrap_or(end);
    (start, end)
}

/// Employees with no check-in recorded for `today`.
pub fn checkin_reminders(
    today: NaiveDate,
    dir: &Directory,
    records: &[AttendanceRecord],
) -> Vec<NotificationIntent> {
    dir.with_role(Role::Employee)
        .into_iter()
        .filter(|emp| {
            !records.iter().any(|r| {
                r.employee_id == emp.id && r.attendance_date == today && r.check_in.is_some()
            })
        })
        .map(|emp| {
            NotificationIntent::new(
                EntityRef::new(EntityKind::Employee, emp.id),
                NotificationKind::CheckinReminder,
                dir.addresses([Some(emp.id)]),
                "Morning Check-in Reminder",
                json!({
                    "employee_name": emp.display_name(),
                    "date": today.to_string(),
                }),
            )
            .for_period(today)
        })
        .collect()
}

/// Today's records whose check-in was late. The manager is copied.
pub fn late_checkins(
    today: NaiveDate,
    dir: &Directory,
    records: &[AttendanceRecord],
) -> Vec<NotificationIntent> {
    records
        .iter()
        .filter(|r| r.attendance_date == today)
        .filter_map(|r| {
            let check_in = r.check_in?;
            if !is_late(check_in.time()) {
                return None;
            }
            let employee = dir.get(r.employee_id)?;
            Some(NotificationIntent::new(
                EntityRef::new(EntityKind::Attendance, r.id),
                NotificationKind::LateCheckin,
                dir.addresses([Some(employee.id), employee.manager_id]),
                format!("Late Check-in Alert - {}", r.attendance_date),
                json!({
                    "employee_name": employee.display_name(),
                    "date": r.attendance_date.to_string(),
                    "check_in_time": check_in.format("%H:%M").to_string(),
                }),
            ))
        })
        .collect()
}

/// Today's records with a check-in but no check-out.
pub fn checkout_reminders(
    today: NaiveDate,
    dir: &Directory,
    records: &[AttendanceRecord],
) -> Vec<NotificationIntent> {
    records
        .iter()
        .filter(|r| r.attendance_date == today && r.check_out.is_none())
        .filter_map(|r| {
            let check_in = r.check_in?;
            let employee = dir.get(r.employee_id)?;
            Some(NotificationIntent::new(
                EntityRef::new(EntityKind::Attendance, r.id),
                NotificationKind::CheckoutReminder,
                dir.addresses([Some(employee.id)]),
                "Missing Check-out Reminder",
                json!({
                    "employee_name": employee.display_name(),
                    "check_in_time": check_in.format("%H:%M").to_string(),
                }),
            ))
        })
        .collect()
}

/// One report per manager whose direct reports have records in the previous week.
pub fn weekly_reports(
    today: NaiveDate,
    dir: &Directory,
    records: &[AttendanceRecord],
) -> Vec<NotificationIntent> {
    let (start, end) = previous_week(today);
    let mut out = Vec::new();

    for manager in dir.with_role(Role::Manager) {
        let Some(address) = manager.address() else {
            continue;
        };
        let team: Vec<i64> = dir.reports_of(manager.id).iter().map(|e| e.id).collect();
        let window = in_window(records, start, end, |r| team.contains(&r.employee_id));
        if window.is_empty() {
            continue;
        }
        out.push(
            NotificationIntent::new(
                EntityRef::new(EntityKind::Employee, manager.id),
                NotificationKind::WeeklyReport,
                vec![address.to_string()],
                format!("Weekly Attendance Report - {start} to {end}"),
                json!({
                    "manager_name": manager.display_name(),
                    "week_start": start.to_string(),
                    "week_end": end.to_string(),
                    "total": window.len(),
                    "records": lines(dir, &window),
                }),
            )
            .for_period(start),
        );
    }
    out
}

/// One report per HR user covering every employee's records in the previous month.
pub fn monthly_reports(
    today: NaiveDate,
    dir: &Directory,
    records: &[AttendanceRecord],
) -> Vec<NotificationIntent> {
    let (start, end) = previous_month(today);
    let window = in_window(records, start, end, |r| {
        dir.get(r.employee_id).is_some_and(|e| e.role == Role::Employee)
    });
    if window.is_empty() {
        return Vec::new();
    }

    let count = |status: AttendanceStatus| window.iter().filter(|r| r.status == status).count();
    let month = start.format("%B %Y").to_string();
    let present = count(AttendanceStatus::Present);
    let late = count(AttendanceStatus::Late);
    let absent = count(AttendanceStatus::Absent);
    let summary = lines(dir, &window);

    dir.with_role(Role::Hr)
        .into_iter()
        .filter_map(|hr| {
            let address = hr.address()?;
            Some(
                NotificationIntent::new(
                    EntityRef::new(EntityKind::Employee, hr.id),
                    NotificationKind::MonthlyReport,
                    vec![address.to_string()],
                    format!("Monthly Attendance Report - {month}"),
                    json!({
                        "hr_name": hr.display_name(),
                        "month": month,
                        "month_start": start.to_string(),
                        "month_end": end.to_string(),
                        "total": window.len(),
                        "present": present,
                        "late": late,
                        "absent": absent,
                        "records": summary,
                    }),
                )
                .for_period(start),
            )
        })
        .collect()
}

/// Records inside `[start, end]`, newest first.
fn in_window<'a>(
    records: &'a [AttendanceRecord],
    start: NaiveDate,
    end: NaiveDate,
    keep: impl Fn(&AttendanceRecord) -> bool,
) -> Vec<&'a AttendanceRecord> {
    let mut out: Vec<&AttendanceRecord> = records
        .iter()
        .filter(|r| r.attendance_date >= start && r.attendance_date <= end && keep(r))
        .collect();
    out.sort_by(|a, b| {
        b.attendance_date
            .cmp(&a.attendance_date)
            .then(a.employee_id.cmp(&b.employee_id))
    });
    out
}

fn lines(dir: &Directory, records: &[&AttendanceRecord]) -> Vec<String> {
    records
        .iter()
        .map(|r| {
            format!(
                "{} {}: {}",
                r.attendance_date,
                dir.name_of(Some(r.employee_id), "unknown"),
                r.status
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Employee;

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
        Directory::new(vec![boss, alice, bob, hr])
    }

    fn record(id: i64, employee_id: i64, date: NaiveDate, check_in: Option<(u32, u32)>) -> AttendanceRecord {
        AttendanceRecord {
            id,
            employee_id,
            attendance_date: date,
            check_in: check_in.map(|(h, m)| date.and_hms_opt(h, m, 0).unwrap()),
            check_out: None,
            status: AttendanceStatus::Present,
        }
    }

    #[test]
    fn test_late_threshold() {
        assert!(!is_late(NaiveTime::from_hms_opt(9, 29, 59).unwrap()));
        assert!(is_late(NaiveTime::from_hms_opt(9, 30, 0).unwrap()));
        assert!(is_late(NaiveTime::from_hms_opt(10, 0, 0).unwrap()));
        assert!(!is_late(NaiveTime::from_hms_opt(8, 45, 0).unwrap()));
    }

    #[test]
    fn test_previous_week_window() {
        // Monday
        assert_eq!(previous_week(d(2024, 6, 10)), (d(2024, 6, 3), d(2024, 6, 9)));
        // Run late on a Wednesday: still the week before the current one
        assert_eq!(previous_week(d(2024, 6, 12)), (d(2024, 6, 3), d(2024, 6, 9)));
    }

    #[test]
    fn test_previous_month_window() {
        assert_eq!(previous_month(d(2024, 3, 1)), (d(2024, 2, 1), d(2024, 2, 29)));
        assert_eq!(previous_month(d(2025, 1, 1)), (d(2024, 12, 1), d(2024, 12, 31)));
    }

    #[test]
    fn test_checkin_reminder_only_for_missing_employees() {
        let today = d(2024, 6, 10);
        let records = vec![record(1, 2, today, Some((8, 55)))];
        let intents = checkin_reminders(today, &people(), &records);
        assert_eq!(intents.len(), 1);
        assert_eq!(intents[0].entity, EntityRef::new(EntityKind::Employee, 3));
        assert_eq!(intents[0].period, Some(today));
        assert_eq!(intents[0].recipients, vec!["bob@example.com"]);
    }

    #[test]
    fn test_late_checkin_copies_manager() {
        let today = d(2024, 6, 10);
        let records = vec![
            record(1, 2, today, Some((9, 30))),
            record(2, 3, today, Some((9, 29))),
        ];
        let intents = late_checkins(today, &people(), &records);
        assert_eq!(intents.len(), 1);
        assert_eq!(intents[0].recipients, vec!["alice@example.com", "boss@example.com"]);
        assert_eq!(intents[0].context["check_in_time"], "09:30");
    }

    #[test]
    fn test_checkout_reminder() {
        let today = d(2024, 6, 10);
        let mut done = record(2, 3, today, Some((9, 0)));
        done.check_out = Some(today.and_hms_opt(17, 0, 0).unwrap());
        let records = vec![record(1, 2, today, Some((9, 0))), done, record(3, 3, today, None)];
        let intents = checkout_reminders(today, &people(), &records);
        assert_eq!(intents.len(), 1);
        assert_eq!(intents[0].entity, EntityRef::new(EntityKind::Attendance, 1));
    }

    #[test]
    fn test_weekly_report_window_and_emptiness() {
        let today = d(2024, 6, 10);
        let records = vec![
            record(1, 2, d(2024, 6, 3), Some((9, 0))),
            record(2, 3, d(2024, 6, 9), Some((9, 0))),
            record(3, 2, d(2024, 6, 2), Some((9, 0))),
            record(4, 2, d(2024, 6, 10), Some((9, 0))),
        ];
        let intents = weekly_reports(today, &people(), &records);
        assert_eq!(intents.len(), 1);
        let report = &intents[0];
        assert_eq!(report.entity, EntityRef::new(EntityKind::Employee, 1));
        assert_eq!(report.period, Some(d(2024, 6, 3)));
        assert_eq!(report.context["total"], 2);
        assert_eq!(report.context["week_start"], "2024-06-03");
        assert_eq!(report.context["week_end"], "2024-06-09");

        assert!(weekly_reports(d(2024, 7, 1), &people(), &records).is_empty());
    }

    #[test]
    fn test_monthly_report_counts() {
        let today = d(2024, 3, 1);
        let mut late = record(2, 3, d(2024, 2, 29), Some((10, 0)));
        late.status = AttendanceStatus::Late;
        let records = vec![
            record(1, 2, d(2024, 2, 1), Some((9, 0))),
            late,
            record(3, 2, d(2024, 3, 1), Some((9, 0))),
        ];
        let intents = monthly_reports(today, &people(), &records);
        assert_eq!(intents.len(), 1);
        let ctx = &intents[0].context;
        assert_eq!(ctx["month"], "February 2024");
        assert_eq!(ctx["total"], 2);
        assert_eq!(ctx["present"], 1);
        assert_eq!(ctx["late"], 1);
        assert_eq!(ctx["absent"], 0);
        assert_eq!(intents[0].period, Some(d(2024, 2, 1)));
    }
}
