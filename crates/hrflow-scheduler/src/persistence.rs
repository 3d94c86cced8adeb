//! SQLite-backed [`HrStore`].
//!
//! Dates are stored as `YYYY-MM-DD` text, wall-clock datetimes as
//! `YYYY-MM-DD HH:MM:SS`, audit timestamps as RFC 3339. A partial unique index
//! on `audit_log` allows one `sent` row per (entity, kind, period).
//!
//! Several processes may share one database file. Sends are claimed in
//! `dispatch_claims` under `BEGIN IMMEDIATE` before delivery, and job runs
//! hold a row in `job_leases`.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, TimeDelta, Utc};
use hrflow_core::{HrFlowError, Result};
use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior, params};

use crate::model::{
    Appreciation, AttendanceRecord, AttendanceStatus, Employee, Goal, GoalStatus, LeaveRequest,
    LeaveStatus, Offboarding, OffboardingChecklistItem, Onboarding, OnboardingChecklistItem,
    ProcessStatus, Review, ReviewCycle, ReviewStatus, Role,
};
use crate::notify::{AuditRecord, AuditStatus, EntityKind, EntityRef, NotificationKind};
use crate::rules::{GuardStyle, quarter_start};
use crate::store::{AuditQuery, Claim, Guard, HrStore};

pub const DATE_FMT: &str = "%Y-%m-%d";
pub const DATETIME_FMT: &str = "%Y-%m-%d %H:%M:%S";

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS employees (
        id INTEGER PRIMARY KEY,
        username TEXT NOT NULL,
        full_name TEXT NOT NULL DEFAULT '',
        email TEXT NOT NULL DEFAULT '',
        role TEXT NOT NULL DEFAULT 'employee',    -- employee, manager, hr, admin
        manager_id INTEGER
    );

    CREATE TABLE IF NOT EXISTS attendance_records (
        id INTEGER PRIMARY KEY,
        employee_id INTEGER NOT NULL,
        attendance_date TEXT NOT NULL,
        check_in TEXT,
        check_out TEXT,
        status TEXT NOT NULL DEFAULT 'present'
    );
    CREATE INDEX IF NOT EXISTS attendance_by_date ON attendance_records(attendance_date);

    CREATE TABLE IF NOT EXISTS leave_requests (
        id INTEGER PRIMARY KEY,
        employee_id INTEGER NOT NULL,
        leave_type TEXT NOT NULL,
        start_date TEXT NOT NULL,
        end_date TEXT NOT NULL,
        reason TEXT NOT NULL DEFAULT '',
        status TEXT NOT NULL DEFAULT 'pending',
        approved_by INTEGER,
        rejection_reason TEXT NOT NULL DEFAULT ''
    );

    CREATE TABLE IF NOT EXISTS onboardings (
        id INTEGER PRIMARY KEY,
        employee_id INTEGER NOT NULL UNIQUE,
        start_date TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'in_progress',
        welcome_email_sent INTEGER NOT NULL DEFAULT 0,
        day_3_checklist_sent INTEGER NOT NULL DEFAULT 0,
        day_5_checklist_sent INTEGER NOT NULL DEFAULT 0,
        day_7_checklist_sent INTEGER NOT NULL DEFAULT 0
    );

    CREATE TABLE IF NOT EXISTS onboarding_checklist_items (
        id INTEGER PRIMARY KEY,
        onboarding_id INTEGER NOT NULL,
        task TEXT NOT NULL,
        day INTEGER NOT NULL,
        is_completed INTEGER NOT NULL DEFAULT 0
    );

    CREATE TABLE IF NOT EXISTS offboardings (
        id INTEGER PRIMARY KEY,
        employee_id INTEGER NOT NULL UNIQUE,
        last_working_day TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'in_progress',
        exit_email_sent INTEGER NOT NULL DEFAULT 0,
        farewell_email_sent INTEGER NOT NULL DEFAULT 0
    );

    CREATE TABLE IF NOT EXISTS offboarding_checklist_items (
        id INTEGER PRIMARY KEY,
        offboarding_id INTEGER NOT NULL,
        task TEXT NOT NULL,
        is_completed INTEGER NOT NULL DEFAULT 0
    );

    CREATE TABLE IF NOT EXISTS review_cycles (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL,
        start_date TEXT NOT NULL,
        end_date TEXT NOT NULL,
        submission_deadline TEXT NOT NULL,
        self_assessment_link TEXT NOT NULL DEFAULT '',
        guidelines TEXT NOT NULL DEFAULT '',
        announcement_sent INTEGER NOT NULL DEFAULT 0,
        upcoming_notification_sent INTEGER NOT NULL DEFAULT 0,
        self_assessment_sent INTEGER NOT NULL DEFAULT 0,
        guidelines_sent INTEGER NOT NULL DEFAULT 0
    );

    CREATE TABLE IF NOT EXISTS reviews (
        id INTEGER PRIMARY KEY,
        cycle_id INTEGER NOT NULL,
        employee_id INTEGER NOT NULL,
        manager_id INTEGER,
        status TEXT NOT NULL DEFAULT 'pending',
        submission_deadline TEXT NOT NULL,
        self_assessment_submitted INTEGER NOT NULL DEFAULT 0,
        meeting_scheduled_for TEXT,
        meeting_confirmation_sent INTEGER NOT NULL DEFAULT 0,
        review_summary TEXT NOT NULL DEFAULT '',
        summary_shared INTEGER NOT NULL DEFAULT 0,
        goals_next_period TEXT NOT NULL DEFAULT '',
        goals_shared INTEGER NOT NULL DEFAULT 0,
        reminder_7_sent INTEGER NOT NULL DEFAULT 0,
        reminder_3_sent INTEGER NOT NULL DEFAULT 0,
        reminder_1_sent INTEGER NOT NULL DEFAULT 0,
        overdue_notice_sent INTEGER NOT NULL DEFAULT 0,
        last_quarterly_goal_reminder TEXT
    );

    CREATE TABLE IF NOT EXISTS goals (
        id INTEGER PRIMARY KEY,
        review_id INTEGER NOT NULL,
        title TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'on_track',
        progress_percent INTEGER NOT NULL DEFAULT 0,
        achievement_notified INTEGER NOT NULL DEFAULT 0,
        course_correction_notified INTEGER NOT NULL DEFAULT 0
    );

    CREATE TABLE IF NOT EXISTS appreciations (
        id INTEGER PRIMARY KEY,
        manager_id INTEGER NOT NULL,
        employee_id INTEGER NOT NULL,
        subject TEXT NOT NULL,
        message TEXT NOT NULL DEFAULT '',
        cc_team INTEGER NOT NULL DEFAULT 0,
        cc_hr INTEGER NOT NULL DEFAULT 0
    );

    -- One row per dispatch attempt, append-only
    CREATE TABLE IF NOT EXISTS audit_log (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        entity_type TEXT,
        entity_id INTEGER,
        kind TEXT NOT NULL,
        period_key TEXT NOT NULL DEFAULT '',   -- '' when the kind has no period
        subject TEXT NOT NULL,
        recipients TEXT NOT NULL,              -- JSON array
        status TEXT NOT NULL,                  -- sent, failed
        error TEXT,
        created_at TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS audit_by_entity ON audit_log(entity_type, entity_id);
    CREATE UNIQUE INDEX IF NOT EXISTS audit_sent_once
        ON audit_log(entity_type, entity_id, kind, period_key) WHERE status = 'sent';

    -- Sends being delivered right now, one row per (entity, kind, period)
    CREATE TABLE IF NOT EXISTS dispatch_claims (
        entity_type TEXT NOT NULL,
        entity_id INTEGER NOT NULL,
        kind TEXT NOT NULL,
        period_key TEXT NOT NULL,
        claimed_at TEXT NOT NULL,
        PRIMARY KEY (entity_type, entity_id, kind, period_key)
    );

    CREATE TABLE IF NOT EXISTS job_leases (
        job TEXT PRIMARY KEY,
        holder TEXT NOT NULL,
        expires_at TEXT NOT NULL
    );
";

/// Wait this long for another connection's write lock before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const EMPLOYEE_COLS: &str = "id, username, full_name, email, role, manager_id";
const ATTENDANCE_COLS: &str = "id, employee_id, attendance_date, check_in, check_out, status";
const LEAVE_COLS: &str = "id, employee_id, leave_type, start_date, end_date, reason, status, approved_by, rejection_reason";
const ONBOARDING_COLS: &str = "id, employee_id, start_date, status, welcome_email_sent, day_3_checklist_sent, day_5_checklist_sent, day_7_checklist_sent";
const OFFBOARDING_COLS: &str =
    "id, employee_id, last_working_day, status, exit_email_sent, farewell_email_sent";
const CYCLE_COLS: &str = "id, name, start_date, end_date, submission_deadline, self_assessment_link, guidelines, announcement_sent, upcoming_notification_sent, self_assessment_sent, guidelines_sent";
const REVIEW_COLS: &str = "id, cycle_id, employee_id, manager_id, status, submission_deadline, self_assessment_submitted, meeting_scheduled_for, meeting_confirmation_sent, review_summary, summary_shared, goals_next_period, goals_shared, reminder_7_sent, reminder_3_sent, reminder_1_sent, overdue_notice_sent, last_quarterly_goal_reminder";
const GOAL_COLS: &str = "id, review_id, title, status, progress_percent, achievement_notified, course_correction_notified";
const APPRECIATION_COLS: &str = "id, manager_id, employee_id, subject, message, cc_team, cc_hr";
const AUDIT_COLS: &str =
    "id, entity_type, entity_id, kind, period_key, subject, recipients, status, error, created_at";

/// SQLite store for HR entities and the notification audit log.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create the database file.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path).map_err(db("DB open"))?;
        Self::with_connection(conn)
    }

    /// Fresh in-memory database, used by tests and dry runs.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db("DB open"))?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA journal_mode=WAL;").ok();
        conn.busy_timeout(BUSY_TIMEOUT).map_err(db("DB open"))?;
        conn.execute_batch(SCHEMA).map_err(db("Migration"))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    #[cfg(test)]
    pub(crate) fn execute_batch(&self, sql: &str) {
        self.conn().execute_batch(sql).unwrap();
    }

    // ─── Application-side writes ─────────────────────────────
    //
    // The HR application owns these rows; the upserts below exist for seeding,
    // the CLI and tests. An id of 0 lets SQLite assign one.

    pub fn save_employee(&self, e: &Employee) -> Result<i64> {
        let conn = self.conn();
        conn.execute(
            &format!("INSERT OR REPLACE INTO employees ({EMPLOYEE_COLS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)"),
            params![row_id(e.id), e.username, e.full_name, e.email, e.role.as_str(), e.manager_id],
        )
        .map_err(db("Save employee"))?;
        Ok(conn.last_insert_rowid())
    }

    pub fn save_attendance(&self, r: &AttendanceRecord) -> Result<i64> {
        let conn = self.conn();
        conn.execute(
            &format!("INSERT OR REPLACE INTO attendance_records ({ATTENDANCE_COLS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)"),
            params![
                row_id(r.id),
                r.employee_id,
                fmt_date(r.attendance_date),
                r.check_in.map(fmt_datetime),
                r.check_out.map(fmt_datetime),
                r.status.as_str(),
            ],
        )
        .map_err(db("Save attendance"))?;
        Ok(conn.last_insert_rowid())
    }

    pub fn save_leave(&self, l: &LeaveRequest) -> Result<i64> {
        let conn = self.conn();
        conn.execute(
            &format!("INSERT OR REPLACE INTO leave_requests ({LEAVE_COLS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"),
            params![
                row_id(l.id),
                l.employee_id,
                l.leave_type,
                fmt_date(l.start_date),
                fmt_date(l.end_date),
                l.reason,
                l.status.as_str(),
                l.approved_by,
                l.rejection_reason,
            ],
        )
        .map_err(db("Save leave"))?;
        Ok(conn.last_insert_rowid())
    }

    pub fn save_onboarding(&self, o: &Onboarding) -> Result<i64> {
        let conn = self.conn();
        conn.execute(
            &format!("INSERT OR REPLACE INTO onboardings ({ONBOARDING_COLS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"),
            params![
                row_id(o.id),
                o.employee_id,
                fmt_date(o.start_date),
                o.status.as_str(),
                o.welcome_email_sent,
                o.day_3_checklist_sent,
                o.day_5_checklist_sent,
                o.day_7_checklist_sent,
            ],
        )
        .map_err(db("Save onboarding"))?;
        Ok(conn.last_insert_rowid())
    }

    pub fn save_onboarding_item(&self, i: &OnboardingChecklistItem) -> Result<i64> {
        let conn = self.conn();
        conn.execute(
            "INSERT OR REPLACE INTO onboarding_checklist_items (id, onboarding_id, task, day, is_completed)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![row_id(i.id), i.onboarding_id, i.task, i.day, i.is_completed],
        )
        .map_err(db("Save onboarding item"))?;
        Ok(conn.last_insert_rowid())
    }

    pub fn save_offboarding(&self, o: &Offboarding) -> Result<i64> {
        let conn = self.conn();
        conn.execute(
            &format!("INSERT OR REPLACE INTO offboardings ({OFFBOARDING_COLS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)"),
            params![
                row_id(o.id),
                o.employee_id,
                fmt_date(o.last_working_day),
                o.status.as_str(),
                o.exit_email_sent,
                o.farewell_email_sent,
            ],
        )
        .map_err(db("Save offboarding"))?;
        Ok(conn.last_insert_rowid())
    }

    pub fn save_offboarding_item(&self, i: &OffboardingChecklistItem) -> Result<i64> {
        let conn = self.conn();
        conn.execute(
            "INSERT OR REPLACE INTO offboarding_checklist_items (id, offboarding_id, task, is_completed)
             VALUES (?1, ?2, ?3, ?4)",
            params![row_id(i.id), i.offboarding_id, i.task, i.is_completed],
        )
        .map_err(db("Save offboarding item"))?;
        Ok(conn.last_insert_rowid())
    }

    pub fn save_review_cycle(&self, c: &ReviewCycle) -> Result<i64> {
        let conn = self.conn();
        conn.execute(
            &format!("INSERT OR REPLACE INTO review_cycles ({CYCLE_COLS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"),
            params![
                row_id(c.id),
                c.name,
                fmt_date(c.start_date),
                fmt_date(c.end_date),
                fmt_date(c.submission_deadline),
                c.self_assessment_link,
                c.guidelines,
                c.announcement_sent,
                c.upcoming_notification_sent,
                c.self_assessment_sent,
                c.guidelines_sent,
            ],
        )
        .map_err(db("Save review cycle"))?;
        Ok(conn.last_insert_rowid())
    }

    pub fn save_review(&self, r: &Review) -> Result<i64> {
        let conn = self.conn();
        conn.execute(
            &format!(
                "INSERT OR REPLACE INTO reviews ({REVIEW_COLS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)"
            ),
            params![
                row_id(r.id),
                r.cycle_id,
                r.employee_id,
                r.manager_id,
                r.status.as_str(),
                fmt_date(r.submission_deadline),
                r.self_assessment_submitted,
                r.meeting_scheduled_for.map(fmt_datetime),
                r.meeting_confirmation_sent,
                r.review_summary,
                r.summary_shared,
                r.goals_next_period,
                r.goals_shared,
                r.reminder_7_sent,
                r.reminder_3_sent,
                r.reminder_1_sent,
                r.overdue_notice_sent,
                r.last_quarterly_goal_reminder.map(fmt_datetime),
            ],
        )
        .map_err(db("Save review"))?;
        Ok(conn.last_insert_rowid())
    }

    pub fn save_goal(&self, g: &Goal) -> Result<i64> {
        let conn = self.conn();
        conn.execute(
            &format!("INSERT OR REPLACE INTO goals ({GOAL_COLS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"),
            params![
                row_id(g.id),
                g.review_id,
                g.title,
                g.status.as_str(),
                g.progress_percent,
                g.achievement_notified,
                g.course_correction_notified,
            ],
        )
        .map_err(db("Save goal"))?;
        Ok(conn.last_insert_rowid())
    }

    pub fn save_appreciation(&self, a: &Appreciation) -> Result<i64> {
        let conn = self.conn();
        conn.execute(
            &format!("INSERT OR REPLACE INTO appreciations ({APPRECIATION_COLS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"),
            params![row_id(a.id), a.manager_id, a.employee_id, a.subject, a.message, a.cc_team, a.cc_hr],
        )
        .map_err(db("Save appreciation"))?;
        Ok(conn.last_insert_rowid())
    }

    /// Single review by id.
    pub fn review(&self, id: i64) -> Result<Option<Review>> {
        query_one(
            &self.conn(),
            &format!("SELECT {REVIEW_COLS} FROM reviews WHERE id = ?1"),
            [id],
            review_row,
        )
    }

    pub fn onboarding(&self, id: i64) -> Result<Option<Onboarding>> {
        query_one(
            &self.conn(),
            &format!("SELECT {ONBOARDING_COLS} FROM onboardings WHERE id = ?1"),
            [id],
            onboarding_row,
        )
    }
}

impl HrStore for SqliteStore {
    fn employees(&self) -> Result<Vec<Employee>> {
        query_all(
            &self.conn(),
            "employees",
            &format!("SELECT {EMPLOYEE_COLS} FROM employees ORDER BY id"),
            [],
            employee_row,
        )
    }

    fn attendance_between(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<AttendanceRecord>> {
        query_all(
            &self.conn(),
            "attendance_records",
            &format!(
                "SELECT {ATTENDANCE_COLS} FROM attendance_records
                 WHERE attendance_date >= ?1 AND attendance_date <= ?2
                 ORDER BY attendance_date DESC, id"
            ),
            params![fmt_date(start), fmt_date(end)],
            attendance_row,
        )
    }

    fn leaves_with_status(&self, status: LeaveStatus) -> Result<Vec<LeaveRequest>> {
        query_all(
            &self.conn(),
            "leave_requests",
            &format!("SELECT {LEAVE_COLS} FROM leave_requests WHERE status = ?1 ORDER BY id"),
            [status.as_str()],
            leave_row,
        )
    }

    fn leave(&self, id: i64) -> Result<Option<LeaveRequest>> {
        query_one(
            &self.conn(),
            &format!("SELECT {LEAVE_COLS} FROM leave_requests WHERE id = ?1"),
            [id],
            leave_row,
        )
    }

    fn onboardings(&self) -> Result<Vec<Onboarding>> {
        query_all(
            &self.conn(),
            "onboardings",
            &format!("SELECT {ONBOARDING_COLS} FROM onboardings ORDER BY id"),
            [],
            onboarding_row,
        )
    }

    fn onboarding_for_employee(&self, employee_id: i64) -> Result<Option<Onboarding>> {
        query_one(
            &self.conn(),
            &format!("SELECT {ONBOARDING_COLS} FROM onboardings WHERE employee_id = ?1"),
            [employee_id],
            onboarding_row,
        )
    }

    fn onboarding_items(&self) -> Result<Vec<OnboardingChecklistItem>> {
        query_all(
            &self.conn(),
            "onboarding_checklist_items",
            "SELECT id, onboarding_id, task, day, is_completed
             FROM onboarding_checklist_items ORDER BY onboarding_id, day, id",
            [],
            |row| {
                Ok(OnboardingChecklistItem {
                    id: row.get(0)?,
                    onboarding_id: row.get(1)?,
                    task: row.get(2)?,
                    day: row.get(3)?,
                    is_completed: row.get(4)?,
                })
            },
        )
    }

    fn offboarding(&self, id: i64) -> Result<Option<Offboarding>> {
        query_one(
            &self.conn(),
            &format!("SELECT {OFFBOARDING_COLS} FROM offboardings WHERE id = ?1"),
            [id],
            |row| {
                Ok(Offboarding {
                    id: row.get(0)?,
                    employee_id: row.get(1)?,
                    last_working_day: get_date(row, 2)?,
                    status: get_enum(row, 3, ProcessStatus::parse)?,
                    exit_email_sent: row.get(4)?,
                    farewell_email_sent: row.get(5)?,
                })
            },
        )
    }

    fn offboarding_items(&self, offboarding_id: i64) -> Result<Vec<OffboardingChecklistItem>> {
        query_all(
            &self.conn(),
            "offboarding_checklist_items",
            "SELECT id, offboarding_id, task, is_completed
             FROM offboarding_checklist_items WHERE offboarding_id = ?1 ORDER BY id",
            [offboarding_id],
            |row| {
                Ok(OffboardingChecklistItem {
                    id: row.get(0)?,
                    offboarding_id: row.get(1)?,
                    task: row.get(2)?,
                    is_completed: row.get(3)?,
                })
            },
        )
    }

    fn review_cycles(&self) -> Result<Vec<ReviewCycle>> {
        query_all(
            &self.conn(),
            "review_cycles",
            &format!("SELECT {CYCLE_COLS} FROM review_cycles ORDER BY id"),
            [],
            cycle_row,
        )
    }

    fn review_cycle(&self, id: i64) -> Result<Option<ReviewCycle>> {
        query_one(
            &self.conn(),
            &format!("SELECT {CYCLE_COLS} FROM review_cycles WHERE id = ?1"),
            [id],
            cycle_row,
        )
    }

    fn reviews(&self) -> Result<Vec<Review>> {
        query_all(
            &self.conn(),
            "reviews",
            &format!("SELECT {REVIEW_COLS} FROM reviews ORDER BY id"),
            [],
            review_row,
        )
    }

    fn goals(&self) -> Result<Vec<Goal>> {
        query_all(
            &self.conn(),
            "goals",
            &format!("SELECT {GOAL_COLS} FROM goals ORDER BY id"),
            [],
            |row| {
                Ok(Goal {
                    id: row.get(0)?,
                    review_id: row.get(1)?,
                    title: row.get(2)?,
                    status: get_enum(row, 3, GoalStatus::parse)?,
                    progress_percent: row.get(4)?,
                    achievement_notified: row.get(5)?,
                    course_correction_notified: row.get(6)?,
                })
            },
        )
    }

    fn appreciation(&self, id: i64) -> Result<Option<Appreciation>> {
        query_one(
            &self.conn(),
            &format!("SELECT {APPRECIATION_COLS} FROM appreciations WHERE id = ?1"),
            [id],
            |row| {
                Ok(Appreciation {
                    id: row.get(0)?,
                    manager_id: row.get(1)?,
                    employee_id: row.get(2)?,
                    subject: row.get(3)?,
                    message: row.get(4)?,
                    cc_team: row.get(5)?,
                    cc_hr: row.get(6)?,
                })
            },
        )
    }

    fn is_guarded(&self, guard: &Guard) -> Result<bool> {
        guard_set(&self.conn(), guard)
    }

    fn claim(&self, guard: &Guard, ttl: Duration) -> Result<Claim> {
        let mut conn = self.conn();
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(db("Claim"))?;
        if guard_set(&tx, guard)? {
            return Ok(Claim::Guarded);
        }

        let now = Utc::now();
        let ttl = TimeDelta::from_std(ttl).unwrap_or(TimeDelta::MAX);
        let stale_before = now.checked_sub_signed(ttl).unwrap_or(DateTime::<Utc>::MIN_UTC);
        let key = claim_key(guard);
        let reclaimed = tx
            .execute(
                "DELETE FROM dispatch_claims
                 WHERE entity_type = ?1 AND entity_id = ?2 AND kind = ?3 AND period_key = ?4
                   AND claimed_at < ?5",
                params![key.0, key.1, key.2, key.3, fmt_utc(stale_before)],
            )
            .map_err(db("Claim"))?;
        if reclaimed > 0 {
            tracing::warn!("⚠️ Taking over an abandoned claim on {} for {}", guard.kind, guard.entity);
        }
        let inserted = tx
            .execute(
                "INSERT OR IGNORE INTO dispatch_claims
                 (entity_type, entity_id, kind, period_key, claimed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![key.0, key.1, key.2, key.3, fmt_utc(now)],
            )
            .map_err(db("Claim"))?;
        tx.commit().map_err(db("Claim"))?;

        Ok(if inserted == 1 { Claim::Acquired } else { Claim::InFlight })
    }

    fn release_claim(&self, guard: &Guard) -> Result<()> {
        delete_claim(&self.conn(), guard).map_err(db("Release claim"))
    }

    fn commit_sent(&self, guard: &Guard, record: &AuditRecord, now: NaiveDateTime) -> Result<i64> {
        let mut conn = self.conn();
        let tx = conn.transaction().map_err(db("Commit sent"))?;
        let table = guard.entity.kind.table();
        let rule = guard.kind.rule();

        match rule.guard {
            GuardStyle::Flag(column) => {
                tx.execute(
                    &format!("UPDATE {table} SET {column} = 1 WHERE id = ?1"),
                    [guard.entity.id],
                )
                .map_err(db("Commit sent"))?;
            }
            GuardStyle::QuarterStamp => {
                tx.execute(
                    &format!("UPDATE {table} SET last_quarterly_goal_reminder = ?1 WHERE id = ?2"),
                    params![fmt_datetime(now), guard.entity.id],
                )
                .map_err(db("Commit sent"))?;
            }
            GuardStyle::AuditLog => {}
        }

        if let Some(status) = rule.on_success {
            if guard.entity.kind == EntityKind::Review {
                tx.execute(
                    "UPDATE reviews SET status = ?1 WHERE id = ?2",
                    params![status.as_str(), guard.entity.id],
                )
                .map_err(db("Commit sent"))?;
            }
        }

        let id = insert_audit(&tx, record).map_err(db("Commit sent"))?;
        delete_claim(&tx, guard).map_err(db("Commit sent"))?;
        tx.commit().map_err(db("Commit sent"))?;
        Ok(id)
    }

    fn record_failed(&self, record: &AuditRecord) -> Result<i64> {
        insert_audit(&self.conn(), record).map_err(db("Record failure"))
    }

    fn audit_log(&self, query: &AuditQuery) -> Result<Vec<AuditRecord>> {
        let limit = if query.limit == 0 { -1 } else { query.limit as i64 };
        query_all(
            &self.conn(),
            "audit_log",
            &format!(
                "SELECT {AUDIT_COLS} FROM audit_log
                 WHERE (?1 IS NULL OR entity_type = ?1)
                   AND (?2 IS NULL OR entity_id = ?2)
                   AND (?3 IS NULL OR kind = ?3)
                 ORDER BY id DESC LIMIT ?4"
            ),
            params![
                query.entity.map(|e| e.kind.as_str()),
                query.entity.map(|e| e.id),
                query.kind.map(|k| k.as_str()),
                limit,
            ],
            audit_row,
        )
    }

    fn acquire_lease(&self, job: &str, holder: &str, ttl: Duration) -> Result<bool> {
        let now = Utc::now();
        let ttl = TimeDelta::from_std(ttl).unwrap_or(TimeDelta::MAX);
        let expires_at = now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC);
        let changed = self
            .conn()
            .execute(
                "INSERT INTO job_leases (job, holder, expires_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(job) DO UPDATE SET holder = excluded.holder, expires_at = excluded.expires_at
                 WHERE job_leases.holder = excluded.holder OR job_leases.expires_at < ?4",
                params![job, holder, fmt_utc(expires_at), fmt_utc(now)],
            )
            .map_err(db("Acquire lease"))?;
        Ok(changed > 0)
    }

    fn release_lease(&self, job: &str, holder: &str) -> Result<()> {
        self.conn()
            .execute(
                "DELETE FROM job_leases WHERE job = ?1 AND holder = ?2",
                params![job, holder],
            )
            .map_err(db("Release lease"))?;
        Ok(())
    }
}

// ─── Helpers ─────────────────────────────────────────────────

fn guard_set(conn: &Connection, guard: &Guard) -> Result<bool> {
    let table = guard.entity.kind.table();

    let guarded = match guard.style() {
        GuardStyle::Flag(column) => {
            let flag: Option<bool> = conn
                .query_row(
                    &format!("SELECT {column} FROM {table} WHERE id = ?1"),
                    [guard.entity.id],
                    |row| row.get(0),
                )
                .optional()
                .map_err(db("Guard check"))?;
            // A deleted entity is never notified about
            flag.unwrap_or(true)
        }
        GuardStyle::QuarterStamp => {
            let stamp: Option<Option<String>> = conn
                .query_row(
                    &format!("SELECT last_quarterly_goal_reminder FROM {table} WHERE id = ?1"),
                    [guard.entity.id],
                    |row| row.get(0),
                )
                .optional()
                .map_err(db("Guard check"))?;
            match stamp {
                None => true,
                Some(None) => false,
                Some(Some(text)) => {
                    let at = parse_datetime(&text).map_err(|e| {
                        HrFlowError::Validation(format!("{}: bad quarterly stamp: {e}", guard.entity))
                    })?;
                    match guard.period {
                        Some(period) => quarter_start(at.date()) == quarter_start(period),
                        None => true,
                    }
                }
            }
        }
        GuardStyle::AuditLog => {
            let exists: Option<i64> = conn
                .query_row(
                    &format!("SELECT 1 FROM {table} WHERE id = ?1"),
                    [guard.entity.id],
                    |row| row.get(0),
                )
                .optional()
                .map_err(db("Guard check"))?;
            exists.is_none()
        }
    };
    if guarded {
        return Ok(true);
    }

    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM audit_log
          WHERE entity_type = ?1 AND entity_id = ?2 AND kind = ?3
            AND period_key = ?4 AND status = 'sent')",
        params![
            guard.entity.kind.as_str(),
            guard.entity.id,
            guard.kind.as_str(),
            period_key(guard.period),
        ],
        |row| row.get(0),
    )
    .map_err(db("Guard check"))
}

type ClaimKey = (&'static str, i64, &'static str, String);

fn claim_key(guard: &Guard) -> ClaimKey {
    (
        guard.entity.kind.as_str(),
        guard.entity.id,
        guard.kind.as_str(),
        period_key(guard.period),
    )
}

fn delete_claim(conn: &Connection, guard: &Guard) -> rusqlite::Result<()> {
    let key = claim_key(guard);
    conn.execute(
        "DELETE FROM dispatch_claims
         WHERE entity_type = ?1 AND entity_id = ?2 AND kind = ?3 AND period_key = ?4",
        params![key.0, key.1, key.2, key.3],
    )?;
    Ok(())
}

/// Fixed-width UTC timestamp, so text comparison orders correctly.
fn fmt_utc(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn db(context: &'static str) -> impl FnOnce(rusqlite::Error) -> HrFlowError {
    move |e| HrFlowError::Store(format!("{context}: {e}"))
}

fn row_id(id: i64) -> Option<i64> {
    (id != 0).then_some(id)
}

fn fmt_date(d: NaiveDate) -> String {
    d.format(DATE_FMT).to_string()
}

fn fmt_datetime(dt: NaiveDateTime) -> String {
    dt.format(DATETIME_FMT).to_string()
}

fn parse_datetime(s: &str) -> std::result::Result<NaiveDateTime, chrono::ParseError> {
    NaiveDateTime::parse_from_str(s, DATETIME_FMT)
}

fn period_key(period: Option<NaiveDate>) -> String {
    period.map(fmt_date).unwrap_or_default()
}

fn conversion(idx: usize, e: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, e.into())
}

fn get_date(row: &Row<'_>, idx: usize) -> rusqlite::Result<NaiveDate> {
    let text: String = row.get(idx)?;
    NaiveDate::parse_from_str(&text, DATE_FMT).map_err(|e| conversion(idx, e))
}

fn get_datetime_opt(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<NaiveDateTime>> {
    let text: Option<String> = row.get(idx)?;
    text.map(|t| parse_datetime(&t).map_err(|e| conversion(idx, e)))
        .transpose()
}

fn get_enum<T>(row: &Row<'_>, idx: usize, parse: fn(&str) -> Option<T>) -> rusqlite::Result<T> {
    let text: String = row.get(idx)?;
    parse(&text).ok_or_else(|| conversion(idx, format!("unknown value '{text}'")))
}

fn query_all<T, P: rusqlite::Params>(
    conn: &Connection,
    table: &str,
    sql: &str,
    params: P,
    map: impl FnMut(&Row<'_>) -> rusqlite::Result<T>,
) -> Result<Vec<T>> {
    let mut stmt = conn.prepare(sql).map_err(db("Query"))?;
    let rows = stmt.query_map(params, map).map_err(db("Query"))?;
    let mut out = Vec::new();
    for row in rows {
        match row {
            Ok(item) => out.push(item),
            Err(e) => tracing::warn!("⚠️ Skipping malformed {table} row: {e}"),
        }
    }
    Ok(out)
}

fn query_one<T, P: rusqlite::Params>(
    conn: &Connection,
    sql: &str,
    params: P,
    map: impl FnOnce(&Row<'_>) -> rusqlite::Result<T>,
) -> Result<Option<T>> {
    conn.query_row(sql, params, map).optional().map_err(db("Query"))
}

fn insert_audit(conn: &Connection, record: &AuditRecord) -> rusqlite::Result<i64> {
    let recipients = serde_json::to_string(&record.recipients)
        .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
    conn.execute(
        &format!("INSERT INTO audit_log ({AUDIT_COLS}) VALUES (NULL, ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"),
        params![
            record.entity.map(|e| e.kind.as_str()),
            record.entity.map(|e| e.id),
            record.kind.as_str(),
            period_key(record.period),
            record.subject,
            recipients,
            record.status.as_str(),
            record.error,
            record.created_at.to_rfc3339(),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

fn employee_row(row: &Row<'_>) -> rusqlite::Result<Employee> {
    Ok(Employee {
        id: row.get(0)?,
        username: row.get(1)?,
        full_name: row.get(2)?,
        email: row.get(3)?,
        role: get_enum(row, 4, Role::parse)?,
        manager_id: row.get(5)?,
    })
}

fn attendance_row(row: &Row<'_>) -> rusqlite::Result<AttendanceRecord> {
    Ok(AttendanceRecord {
        id: row.get(0)?,
        employee_id: row.get(1)?,
        attendance_date: get_date(row, 2)?,
        check_in: get_datetime_opt(row, 3)?,
        check_out: get_datetime_opt(row, 4)?,
        status: get_enum(row, 5, AttendanceStatus::parse)?,
    })
}

fn leave_row(row: &Row<'_>) -> rusqlite::Result<LeaveRequest> {
    Ok(LeaveRequest {
        id: row.get(0)?,
        employee_id: row.get(1)?,
        leave_type: row.get(2)?,
        start_date: get_date(row, 3)?,
        end_date: get_date(row, 4)?,
        reason: row.get(5)?,
        status: get_enum(row, 6, LeaveStatus::parse)?,
        approved_by: row.get(7)?,
        rejection_reason: row.get(8)?,
    })
}

fn onboarding_row(row: &Row<'_>) -> rusqlite::Result<Onboarding> {
    Ok(Onboarding {
        id: row.get(0)?,
        employee_id: row.get(1)?,
        start_date: get_date(row, 2)?,
        status: get_enum(row, 3, ProcessStatus::parse)?,
        welcome_email_sent: row.get(4)?,
        day_3_checklist_sent: row.get(5)?,
        day_5_checklist_sent: row.get(6)?,
        day_7_checklist_sent: row.get(7)?,
    })
}

fn cycle_row(row: &Row<'_>) -> rusqlite::Result<ReviewCycle> {
    Ok(ReviewCycle {
        id: row.get(0)?,
        name: row.get(1)?,
        start_date: get_date(row, 2)?,
        end_date: get_date(row, 3)?,
        submission_deadline: get_date(row, 4)?,
        self_assessment_link: row.get(5)?,
        guidelines: row.get(6)?,
        announcement_sent: row.get(7)?,
        upcoming_notification_sent: row.get(8)?,
        self_assessment_sent: row.get(9)?,
        guidelines_sent: row.get(10)?,
    })
}

fn review_row(row: &Row<'_>) -> rusqlite::Result<Review> {
    Ok(Review {
        id: row.get(0)?,
        cycle_id: row.get(1)?,
        employee_id: row.get(2)?,
        manager_id: row.get(3)?,
        status: get_enum(row, 4, ReviewStatus::parse)?,
        submission_deadline: get_date(row, 5)?,
        self_assessment_submitted: row.get(6)?,
        meeting_scheduled_for: get_datetime_opt(row, 7)?,
        meeting_confirmation_sent: row.get(8)?,
        review_summary: row.get(9)?,
        summary_shared: row.get(10)?,
        goals_next_period: row.get(11)?,
        goals_shared: row.get(12)?,
        reminder_7_sent: row.get(13)?,
        reminder_3_sent: row.get(14)?,
        reminder_1_sent: row.get(15)?,
        overdue_notice_sent: row.get(16)?,
        last_quarterly_goal_reminder: get_datetime_opt(row, 17)?,
    })
}

fn audit_row(row: &Row<'_>) -> rusqlite::Result<AuditRecord> {
    let entity_type: Option<String> = row.get(1)?;
    let entity_id: Option<i64> = row.get(2)?;
    let entity = match (entity_type, entity_id) {
        (Some(kind), Some(id)) => EntityKind::parse(&kind).map(|k| EntityRef::new(k, id)),
        _ => None,
    };
    let period_text: String = row.get(4)?;
    let period = if period_text.is_empty() {
        None
    } else {
        Some(NaiveDate::parse_from_str(&period_text, DATE_FMT).map_err(|e| conversion(4, e))?)
    };
    let recipients_text: String = row.get(6)?;
    let created_text: String = row.get(9)?;

    Ok(AuditRecord {
        id: row.get(0)?,
        entity,
        kind: get_enum(row, 3, NotificationKind::parse)?,
        period,
        subject: row.get(5)?,
        recipients: serde_json::from_str(&recipients_text).map_err(|e| conversion(6, e))?,
        status: get_enum(row, 7, AuditStatus::parse)?,
        error: row.get(8)?,
        created_at: DateTime::parse_from_rfc3339(&created_text)
            .map(|d| d.with_timezone(&Utc))
            .map_err(|e| conversion(9, e))?,
    })
}
