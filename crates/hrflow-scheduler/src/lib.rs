//! # HRFlow Scheduler
//!
//! Turns HR records into emails, each at most once.
//!
//! ## Architecture
//! ```text
//! Scheduler (tokio interval)          HR application
//!   ├── morning_checkin  "0 9 * * *"    ├── leave-submitted
//!   ├── weekly_report    "0 8 * * 1"    ├── offboarding-started
//!   └── ...                             └── appreciation-recorded
//!          │                                   │
//!          └──────────► rules ◄────────────────┘
//!                         │ NotificationIntent
//!                         ▼
//!                     Dispatcher
//!                       ├── entity lock + guard check
//!                       ├── render + deliver (MailAdapter)
//!                       └── commit: guard + audit row, one transaction
//! ```
//!
//! A job tick that finds the previous run of the same job still going is
//! skipped. Failed deliveries leave the guard open so the next tick retries.

pub mod cron;
pub mod dispatch;
pub mod engine;
pub mod jobs;
pub mod locks;
pub mod model;
pub mod notify;
pub mod persistence;
pub mod rules;
pub mod store;

#[cfg(test)]
mod testing;

pub use cron::CronSchedule;
pub use dispatch::{BatchReport, DispatchOutcome, DispatchSettings, Dispatcher};
pub use engine::{Clock, JobReport, JobStatus, LocalClock, SchedulerEngine, TickOutcome, spawn_scheduler};
pub use jobs::JobName;
pub use notify::{AuditRecord, AuditStatus, EntityKind, EntityRef, NotificationIntent, NotificationKind};
pub use persistence::SqliteStore;
pub use rules::TransitionEvent;
pub use store::{AuditQuery, HrStore};
