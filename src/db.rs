use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use std::path::{Path, PathBuf};

use crate::models::{ContactMessage, JobApplication, Status, StoredContactMessage};

pub struct Database {
    conn: Connection,
    path: PathBuf,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database at {}", path.display()))?;
        Ok(Self {
            conn,
            path: path.to_path_buf(),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn,
            path: PathBuf::from(":memory:"),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn default_path() -> PathBuf {
        // Use XDG data directory or fallback
        if let Some(proj_dirs) = directories::ProjectDirs::from("", "", "jobtrack") {
            proj_dirs.data_dir().join("jobtrack.db")
        } else {
            PathBuf::from("jobtrack.db")
        }
    }

    pub fn init(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS job_applications (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                company_name TEXT NOT NULL CHECK (length(company_name) <= 100),
                job_title TEXT NOT NULL CHECK (length(job_title) <= 100),
                status TEXT NOT NULL,
                applied_date TEXT NOT NULL,
                notes TEXT CHECK (notes IS NULL OR length(notes) <= 500),
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS contact_messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                email TEXT NOT NULL,
                message TEXT NOT NULL,
                submitted_at TEXT NOT NULL,
                delivered INTEGER NOT NULL DEFAULT 0
            );

            CREATE INDEX IF NOT EXISTS idx_applications_status ON job_applications(status);
            "#,
        )?;
        Ok(())
    }

    // --- Job application operations ---

    /// All rows in creation order.
    pub fn list_applications(&self) -> Result<Vec<JobApplication>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, company_name, job_title, status, applied_date, notes
             FROM job_applications ORDER BY id",
        )?;
        let rows = stmt.query_map([], Self::row_to_application)?;
        rows.collect::<Result<Vec<_>, _>>()
            .context("Failed to list job applications")
    }

    pub fn get_application(&self, id: i64) -> Result<Option<JobApplication>> {
        self.conn
            .query_row(
                "SELECT id, company_name, job_title, status, applied_date, notes
                 FROM job_applications WHERE id = ?1",
                [id],
                Self::row_to_application,
            )
            .optional()
            .with_context(|| format!("Failed to load job application #{id}"))
    }

    /// Inserts `job` ignoring any id it carries and returns the stored row.
    pub fn create_application(&self, job: &JobApplication) -> Result<JobApplication> {
        self.conn.execute(
            "INSERT INTO job_applications (company_name, job_title, status, applied_date, notes)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                job.company_name,
                job.job_title,
                job.status.as_str(),
                job.applied_date,
                job.notes
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        Ok(JobApplication {
            id: Some(id),
            ..job.clone()
        })
    }

    /// Returns `false` when no row has this id.
    pub fn update_application(&self, id: i64, job: &JobApplication) -> Result<bool> {
        let changed = self.conn.execute(
            "UPDATE job_applications
             SET company_name = ?1, job_title = ?2, status = ?3, applied_date = ?4,
                 notes = ?5, updated_at = datetime('now')
             WHERE id = ?6",
            params![
                job.company_name,
                job.job_title,
                job.status.as_str(),
                job.applied_date,
                job.notes,
                id
            ],
        )?;
        Ok(changed > 0)
    }

    pub fn delete_application(&self, id: i64) -> Result<bool> {
        let changed = self
            .conn
            .execute("DELETE FROM job_applications WHERE id = ?1", [id])?;
        Ok(changed > 0)
    }

    fn row_to_application(row: &rusqlite::Row) -> rusqlite::Result<JobApplication> {
        let status: String = row.get(3)?;
        Ok(JobApplication {
            id: Some(row.get(0)?),
            company_name: row.get(1)?,
            job_title: row.get(2)?,
            status: Status::from(status),
            applied_date: row.get(4)?,
            notes: row.get(5)?,
        })
    }

    // --- Contact message operations ---

    /// Stores a message and trims the log down to `retain` rows, oldest first.
    pub fn record_contact(&self, msg: &ContactMessage, retain: usize) -> Result<StoredContactMessage> {
        let submitted_at = Utc::now();
        self.conn.execute(
            "INSERT INTO contact_messages (name, email, message, submitted_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![msg.name.trim(), msg.email.trim(), msg.message.trim(), submitted_at],
        )?;
        let id = self.conn.last_insert_rowid();

        let retain = i64::try_from(retain.max(1)).unwrap_or(i64::MAX);
        self.conn.execute(
            "DELETE FROM contact_messages WHERE id NOT IN
                (SELECT id FROM contact_messages ORDER BY id DESC LIMIT ?1)",
            [retain],
        )?;

        Ok(StoredContactMessage {
            id,
            name: msg.name.trim().to_string(),
            email: msg.email.trim().to_string(),
            message: msg.message.trim().to_string(),
            submitted_at,
            delivered: false,
        })
    }

    pub fn mark_contact_delivered(&self, id: i64) -> Result<()> {
        self.conn.execute(
            "UPDATE contact_messages SET delivered = 1 WHERE id = ?1",
            [id],
        )?;
        Ok(())
    }

    /// Newest first.
    pub fn recent_contacts(&self, limit: usize) -> Result<Vec<StoredContactMessage>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut stmt = self.conn.prepare(
            "SELECT id, name, email, message, submitted_at, delivered
             FROM contact_messages ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map([limit], |row| {
            Ok(StoredContactMessage {
                id: row.get(0)?,
                name: row.get(1)?,
                email: row.get(2)?,
                message: row.get(3)?,
                submitted_at: row.get(4)?,
                delivered: row.get(5)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>()
            .context("Failed to list contact messages")
    }

    /// Test hook for rows that predate the closed status list.
    #[cfg(test)]
    pub(crate) fn insert_raw_status(&self, company: &str, status: &str) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO job_applications (company_name, job_title, status, applied_date)
             VALUES (?1, 'Engineer', ?2, '2024-06-01')",
            params![company, status],
        )?;
        Ok(self.conn.last_insert_rowid())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.init().unwrap();
        db
    }

    fn job(company: &str) -> JobApplication {
        JobApplication {
            id: None,
            company_name: company.to_string(),
            job_title: "Engineer".to_string(),
            status: Status::Applied,
            applied_date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            notes: Some("via referral".to_string()),
        }
    }

    #[test]
    fn create_assigns_ids_in_order() {
        let db = db();
        let a = db.create_application(&job("Acme")).unwrap();
        let b = db.create_application(&job("Globex")).unwrap();
        assert!(a.id.unwrap() < b.id.unwrap());

        let all = db.list_applications().unwrap();
        assert_eq!(all, vec![a, b]);
    }

    #[test]
    fn update_and_delete_report_missing_rows() {
        let db = db();
        let created = db.create_application(&job("Acme")).unwrap();
        let id = created.id.unwrap();

        let mut changed = created.clone();
        changed.status = Status::GotOffer;
        changed.notes = None;
        assert!(db.update_application(id, &changed).unwrap());
        assert_eq!(db.get_application(id).unwrap(), Some(changed));

        assert!(!db.update_application(id + 100, &created).unwrap());
        assert!(db.delete_application(id).unwrap());
        assert!(!db.delete_application(id).unwrap());
        assert_eq!(db.get_application(id).unwrap(), None);
    }

    #[test]
    fn legacy_status_text_is_preserved() {
        let db = db();
        let id = db.insert_raw_status("Initech", "Updated Status").unwrap();
        let row = db.get_application(id).unwrap().unwrap();
        assert_eq!(row.status, Status::Legacy("Updated Status".to_string()));
    }

    #[test]
    fn contact_log_is_bounded() {
        let db = db();
        for i in 0..5 {
            let msg = ContactMessage {
                name: format!("sender {i}"),
                email: "a@example.com".into(),
                message: "hello".into(),
            };
            db.record_contact(&msg, 3).unwrap();
        }
        let kept = db.recent_contacts(10).unwrap();
        assert_eq!(kept.len(), 3);
        assert_eq!(kept[0].name, "sender 4");
        assert_eq!(kept[2].name, "sender 2");
    }

    #[test]
    fn delivered_flag_sticks() {
        let db = db();
        let msg = ContactMessage {
            name: "Ann".into(),
            email: "ann@example.com".into(),
            message: "hi".into(),
        };
        let stored = db.record_contact(&msg, 10).unwrap();
        assert!(!stored.delivered);
        db.mark_contact_delivered(stored.id).unwrap();
        assert!(db.recent_contacts(1).unwrap()[0].delivered);
    }

    #[test]
    fn opens_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("jobtrack.db");
        {
            let db = Database::open(&path).unwrap();
            db.init().unwrap();
            db.create_application(&job("Acme")).unwrap();
        }
        let db = Database::open(&path).unwrap();
        assert_eq!(db.path(), path.as_path());
        assert_eq!(db.list_applications().unwrap().len(), 1);
    }
}
