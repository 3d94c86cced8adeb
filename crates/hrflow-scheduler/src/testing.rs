//! Test doubles and fixtures shared by the scheduler tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use hrflow_channels::Templates;
use hrflow_core::mail::{DeliveryError, MailAdapter, OutgoingMail};
use hrflow_core::{HrFlowError, Result};

use crate::engine::Clock;
use crate::model::{Employee, Role};
use crate::persistence::SqliteStore;

/// Records every delivered mail. Can fail the next N deliveries, delay each
/// delivery or refuse to render.
#[derive(Default)]
pub struct RecordingMailer {
    templates: Templates,
    sent: Mutex<Vec<OutgoingMail>>,
    attempts: AtomicUsize,
    fail_next: AtomicUsize,
    delay: Option<Duration>,
    broken_render: bool,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(n: usize) -> Self {
        let mailer = Self::new();
        mailer.fail_next.store(n, Ordering::SeqCst);
        mailer
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn broken_render() -> Self {
        Self {
            broken_render: true,
            ..Self::default()
        }
    }

    pub fn fail_next(&self, n: usize) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<OutgoingMail> {
        self.sent.lock().unwrap().clone()
    }

    pub fn subjects(&self) -> Vec<String> {
        self.sent().into_iter().map(|m| m.subject).collect()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MailAdapter for RecordingMailer {
    fn name(&self) -> &str {
        "recording"
    }

    fn render(&self, template_id: &str, context: &serde_json::Value) -> Result<String> {
        if self.broken_render {
            return Err(HrFlowError::Render(format!("cannot render '{template_id}'")));
        }
        self.templates.render(template_id, context)
    }

    async fn deliver(&self, mail: &OutgoingMail) -> std::result::Result<(), DeliveryError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let failing = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(DeliveryError::Transport("connection refused".into()));
        }
        self.sent.lock().unwrap().push(mail.clone());
        Ok(())
    }
}

pub fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

pub fn at(date: NaiveDate, h: u32, m: u32) -> NaiveDateTime {
    date.and_hms_opt(h, m, 0).unwrap()
}

/// In-memory store with a manager (1), two reports (2, 3) and an HR user (4).
pub fn seeded_store() -> Arc<SqliteStore> {
    let store = SqliteStore::open_in_memory().unwrap();
    seed(&store);
    Arc::new(store)
}

/// Two handles on one seeded database file, standing in for two processes.
pub fn shared_file_stores() -> (tempfile::TempDir, Arc<SqliteStore>, Arc<SqliteStore>) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("hrflow.db");
    let first = SqliteStore::open(&path).unwrap();
    seed(&first);
    let second = SqliteStore::open(&path).unwrap();
    (dir, Arc::new(first), Arc::new(second))
}

fn seed(store: &SqliteStore) {
    let mut boss = Employee::new(1, "boss", "boss@example.com", Role::Manager);
    boss.full_name = "Bea Boss".into();
    let mut alice = Employee::new(2, "alice", "alice@example.com", Role::Employee);
    alice.full_name = "Alice Nguyen".into();
    alice.manager_id = Some(1);
    let mut bob = Employee::new(3, "bob", "bob@example.com", Role::Employee);
    bob.manager_id = Some(1);
    let hr = Employee::new(4, "hr", "hr@example.com", Role::Hr);
    for e in [boss, alice, bob, hr] {
        store.save_employee(&e).unwrap();
    }
}

/// A clock that only moves when told to.
pub struct FixedClock(Mutex<NaiveDateTime>);

impl FixedClock {
    pub fn new(at: NaiveDateTime) -> Self {
        Self(Mutex::new(at))
    }

    pub fn set(&self, at: NaiveDateTime) {
        *self.0.lock().unwrap() = at;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        *self.0.lock().unwrap()
    }
}
