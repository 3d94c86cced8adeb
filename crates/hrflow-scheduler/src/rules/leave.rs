//! Leave notifications: request workflow and day-before / day-after reminders.

use chrono::NaiveDate;
use serde_json::{Value, json};

use crate::model::{Directory, Employee, LeaveRequest, LeaveStatus};
use crate::notify::{EntityKind, EntityRef, NotificationIntent, NotificationKind};

fn context(leave: &LeaveRequest, employee: &Employee) -> Value {
    json!({
        "employee_name": employee.display_name(),
        "leave_type": leave.leave_type,
        "start_date": leave.start_date.to_string(),
        "end_date": leave.end_date.to_string(),
        "duration": leave.duration_days(),
        "reason": leave.reason,
    })
}

fn entity(leave: &LeaveRequest) -> EntityRef {
    EntityRef::new(EntityKind::Leave, leave.id)
}

/// Approved leave starting tomorrow or ended yesterday.
pub fn reminders(today: NaiveDate, dir: &Directory, leaves: &[LeaveRequest]) -> Vec<NotificationIntent> {
    let mut out = Vec::new();
    for leave in leaves.iter().filter(|l| l.status == LeaveStatus::Approved) {
        let Some(employee) = dir.get(leave.employee_id) else {
            continue;
        };
        let to = dir.addresses([Some(employee.id)]);

        if (leave.start_date - today).num_days() == 1 {
            out.push(NotificationIntent::new(
                entity(leave),
                NotificationKind::LeaveReminderBefore,
                to.clone(),
                "Leave Starts Tomorrow",
                context(leave, employee),
            ));
        }
        if (today - leave.end_date).num_days() == 1 {
            out.push(NotificationIntent::new(
                entity(leave),
                NotificationKind::LeaveReminderAfter,
                to,
                "Welcome Back!",
                context(leave, employee),
            ));
        }
    }
    out
}

/// A new request goes to the employee's manager.
pub fn submitted(dir: &Directory, leave: &LeaveRequest) -> Vec<NotificationIntent> {
    let Some(employee) = dir.get(leave.employee_id) else {
        return Vec::new();
    };
    let Some(manager) = dir.manager_of(employee) else {
        tracing::debug!("leave#{}: employee has no manager, nothing to notify", leave.id);
        return Vec::new();
    };

    let mut ctx = context(leave, employee);
    ctx["manager_name"] = json!(manager.display_name());
    vec![NotificationIntent::new(
        entity(leave),
        NotificationKind::LeaveSubmitted,
        dir.addresses([Some(manager.id)]),
        format!("New Leave Request from {}", employee.display_name()),
        ctx,
    )]
}

/// The decision goes back to the employee. Pending or cancelled requests produce nothing.
pub fn decided(dir: &Directory, leave: &LeaveRequest) -> Vec<NotificationIntent> {
    let Some(employee) = dir.get(leave.employee_id) else {
        return Vec::new();
    };
    let mut ctx = context(leave, employee);
    let (kind, subject) = match leave.status {
        LeaveStatus::Approved => {
            ctx["approved_by"] = json!(dir.name_of(leave.approved_by, "your manager"));
            (NotificationKind::LeaveApproved, "Your Leave Request Has Been Approved")
        }
        LeaveStatus::Rejected => {
            ctx["rejection_reason"] = json!(leave.rejection_reason);
            (NotificationKind::LeaveRejected, "Your Leave Request Has Been Rejected")
        }
        LeaveStatus::Pending | LeaveStatus::Cancelled => return Vec::new(),
    };
    vec![NotificationIntent::new(
        entity(leave),
        kind,
        dir.addresses([Some(employee.id)]),
        subject,
        ctx,
    )]
}
