//! The persistence collaborator seen by the rest of the crate.
//!
//! [`EntityStore`] is implemented twice: [`SqliteStore`] owns the database on
//! the server side, and [`crate::client::ApiClient`] talks to that server over
//! HTTP. Sessions and handlers only ever see the trait.

use async_trait::async_trait;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

use crate::db::Database;
use crate::models::{ContactMessage, JobApplication, StoredContactMessage};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("job application #{0} not found")]
    NotFound(i64),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("storage error: {0}")]
    Storage(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait EntityStore: Send + Sync {
    async fn list(&self) -> StoreResult<Vec<JobApplication>>;
    async fn get(&self, id: i64) -> StoreResult<JobApplication>;
    /// Persists `job` and returns it with the assigned id.
    async fn create(&self, job: &JobApplication) -> StoreResult<JobApplication>;
    async fn update(&self, id: i64, job: &JobApplication) -> StoreResult<()>;
    async fn delete(&self, id: i64) -> StoreResult<()>;
}

/// Shares one sqlite connection across async tasks. Every call runs on the
/// blocking pool behind the mutex.
#[derive(Clone)]
pub struct SqliteStore {
    db: Arc<Mutex<Database>>,
}

impl SqliteStore {
    pub fn new(db: Database) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
        }
    }

    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let db = Database::open(path)?;
        db.init()?;
        info!(path = %path.display(), "database ready");
        Ok(Self::new(db))
    }

    pub fn in_memory() -> anyhow::Result<Self> {
        let db = Database::open_in_memory()?;
        db.init()?;
        Ok(Self::new(db))
    }

    async fn with_db<T, F>(&self, op: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || {
            let guard = db
                .lock()
                .map_err(|_| StoreError::Storage("database lock poisoned".to_string()))?;
            op(&*guard).map_err(classify)
        })
        .await
        .map_err(|e| StoreError::Storage(format!("database task failed: {e}")))?
    }

    pub async fn record_contact(
        &self,
        msg: ContactMessage,
        retain: usize,
    ) -> StoreResult<StoredContactMessage> {
        self.with_db(move |db| db.record_contact(&msg, retain)).await
    }

    pub async fn mark_contact_delivered(&self, id: i64) -> StoreResult<()> {
        self.with_db(move |db| db.mark_contact_delivered(id)).await
    }

    pub async fn recent_contacts(&self, limit: usize) -> StoreResult<Vec<StoredContactMessage>> {
        self.with_db(move |db| db.recent_contacts(limit)).await
    }
}

/// Constraint violations and lock contention mean another writer got there
/// first; everything else is a storage fault.
fn classify(err: anyhow::Error) -> StoreError {
    if let Some(rusqlite::Error::SqliteFailure(failure, detail)) = err.downcast_ref::<rusqlite::Error>() {
        match failure.code {
            rusqlite::ErrorCode::ConstraintViolation
            | rusqlite::ErrorCode::DatabaseBusy
            | rusqlite::ErrorCode::DatabaseLocked => {
                return StoreError::Conflict(
                    detail.clone().unwrap_or_else(|| failure.to_string()),
                );
            }
            _ => {}
        }
    }
    StoreError::Storage(format!("{err:#}"))
}

#[async_trait]
impl EntityStore for SqliteStore {
    async fn list(&self) -> StoreResult<Vec<JobApplication>> {
        self.with_db(|db| db.list_applications()).await
    }

    async fn get(&self, id: i64) -> StoreResult<JobApplication> {
        self.with_db(move |db| db.get_application(id))
            .await?
            .ok_or(StoreError::NotFound(id))
    }

    async fn create(&self, job: &JobApplication) -> StoreResult<JobApplication> {
        let job = job.clone();
        let created = self.with_db(move |db| db.create_application(&job)).await?;
        debug!(id = ?created.id, company = %created.company_name, "job application created");
        Ok(created)
    }

    async fn update(&self, id: i64, job: &JobApplication) -> StoreResult<()> {
        let job = job.clone();
        let found = self
            .with_db(move |db| db.update_application(id, &job))
            .await?;
        if !found {
            return Err(StoreError::NotFound(id));
        }
        debug!(id, "job application updated");
        Ok(())
    }

    async fn delete(&self, id: i64) -> StoreResult<()> {
        let found = self.with_db(move |db| db.delete_application(id)).await?;
        if !found {
            return Err(StoreError::NotFound(id));
        }
        debug!(id, "job application deleted");
        Ok(())
    }
}
