//! One user's working copy: the canonical collection, its [`ViewState`], and
//! the write path back to the [`EntityStore`].
//!
//! Writes are split into a `begin_*` step that checks the draft and marks the
//! session busy, the store call itself, and a `finish_*` step that reconciles
//! or records the failure. A UI can run the middle step in the background and
//! keep handling filter or paging intents; a second write while one is in
//! flight is refused with [`SubmitError::InFlight`].

use std::time::Duration;

use thiserror::Error;
use tracing::{info, warn};

use crate::models::{Draft, JobApplication, Status, ValidationError};
use crate::reconcile;
use crate::store::{EntityStore, StoreError, StoreResult};
use crate::view::{ListView, SortColumn, SortDirection, ViewState, compute_view};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    #[error("another change is still being saved")]
    InFlight,
    #[error("no job application #{0} in this session")]
    UnknownId(i64),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// The four user-facing failure classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Validation,
    NotFound,
    Conflict,
    Transport,
}

impl FailureKind {
    /// Whether the collection may be out of date and should be refetched.
    pub fn wants_reload(self) -> bool {
        matches!(self, FailureKind::NotFound | FailureKind::Conflict)
    }
}

impl From<&StoreError> for FailureKind {
    fn from(err: &StoreError) -> Self {
        match err {
            StoreError::Validation(_) => FailureKind::Validation,
            StoreError::NotFound(_) => FailureKind::NotFound,
            StoreError::Conflict(_) => FailureKind::Conflict,
            StoreError::Transport(_) | StoreError::Timeout(_) | StoreError::Storage(_) => {
                FailureKind::Transport
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub kind: FailureKind,
    pub message: String,
}

impl Failure {
    fn from_submit(err: &SubmitError) -> Self {
        let kind = match err {
            SubmitError::Invalid(_) => FailureKind::Validation,
            SubmitError::InFlight => FailureKind::Conflict,
            SubmitError::UnknownId(_) => FailureKind::NotFound,
            SubmitError::Store(e) => FailureKind::from(e),
        };
        let message = match (kind, err) {
            (FailureKind::Transport, SubmitError::Store(e)) => {
                format!("Could not reach the server ({e}). Please try again.")
            }
            _ => err.to_string(),
        };
        Self { kind, message }
    }
}

/// A write that passed validation and is waiting on the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    Create(JobApplication),
    Update(JobApplication),
}

/// What the store confirmed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Saved {
    Created(JobApplication),
    Updated(JobApplication),
}

impl Submission {
    /// Runs the store call under `timeout`. Updates echo the sent entity
    /// back since the store does not return a body for them.
    pub async fn send(self, store: &dyn EntityStore, timeout: Duration) -> StoreResult<Saved> {
        match self {
            Submission::Create(job) => {
                let created = with_timeout(timeout, store.create(&job)).await?;
                Ok(Saved::Created(created))
            }
            Submission::Update(job) => {
                let id = job
                    .id
                    .ok_or_else(|| StoreError::Validation("update without id".into()))?;
                with_timeout(timeout, store.update(id, &job)).await?;
                Ok(Saved::Updated(job))
            }
        }
    }
}

pub async fn with_timeout<T>(
    timeout: Duration,
    fut: impl Future<Output = StoreResult<T>>,
) -> StoreResult<T> {
    tokio::time::timeout(timeout, fut)
        .await
        .map_err(|_| StoreError::Timeout(timeout))?
}

pub struct Session {
    collection: Vec<JobApplication>,
    view: ViewState,
    page_size: usize,
    timeout: Duration,
    in_flight: bool,
    /// The draft as it was when the in-flight write was sent.
    submitted: Option<Draft>,
    stale: bool,
    failure: Option<Failure>,
}

impl Session {
    pub fn new(collection: Vec<JobApplication>, page_size: usize, timeout: Duration) -> Self {
        // drafts never enter the canonical collection
        let collection = collection.into_iter().filter(|j| j.id.is_some()).collect();
        Self {
            collection,
            view: ViewState::new(),
            page_size: page_size.max(1),
            timeout,
            in_flight: false,
            submitted: None,
            stale: false,
            failure: None,
        }
    }

    pub async fn load(
        store: &dyn EntityStore,
        page_size: usize,
        timeout: Duration,
    ) -> StoreResult<Self> {
        let collection = with_timeout(timeout, store.list()).await?;
        info!(count = collection.len(), "loaded job applications");
        Ok(Self::new(collection, page_size, timeout))
    }

    pub async fn reload(&mut self, store: &dyn EntityStore) -> StoreResult<()> {
        let outcome = with_timeout(self.timeout, store.list()).await;
        self.finish_reload(outcome)
    }

    /// Applies a fetched collection, or records why fetching failed. The
    /// stale flag survives a failed reload.
    pub fn finish_reload(&mut self, outcome: StoreResult<Vec<JobApplication>>) -> StoreResult<()> {
        match outcome {
            Ok(collection) => {
                info!(count = collection.len(), "reloaded job applications");
                self.replace_collection(collection);
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "reload failed");
                self.failure = Some(Failure::from_submit(&SubmitError::Store(e.clone())));
                Err(e)
            }
        }
    }

    /// Swaps in a freshly fetched collection, keeping view settings.
    pub fn replace_collection(&mut self, collection: Vec<JobApplication>) {
        self.collection = collection.into_iter().filter(|j| j.id.is_some()).collect();
        self.stale = false;
        self.failure = None;
        self.clamp_page();
    }

    pub fn view(&self) -> ListView<'_> {
        compute_view(&self.collection, &self.view, self.page_size)
    }

    pub fn collection(&self) -> &[JobApplication] {
        &self.collection
    }

    pub fn view_state(&self) -> &ViewState {
        &self.view
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn draft(&self) -> &Draft {
        self.view.draft()
    }

    pub fn draft_mut(&mut self) -> &mut Draft {
        self.view.draft_mut()
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight
    }

    /// Set after a not-found or conflict; the caller should [`reload`](Self::reload).
    pub fn is_stale(&self) -> bool {
        self.stale
    }

    pub fn failure(&self) -> Option<&Failure> {
        self.failure.as_ref()
    }

    pub fn dismiss_failure(&mut self) {
        self.failure = None;
    }

    pub fn get(&self, id: i64) -> Option<&JobApplication> {
        self.collection.iter().find(|j| j.id == Some(id))
    }

    // --- view intents ---

    pub fn set_filter_text(&mut self, text: impl Into<String>) {
        self.view.set_filter_text(text);
    }

    pub fn set_filter_status(&mut self, status: Option<Status>) {
        self.view.set_filter_status(status);
    }

    pub fn click_sort(&mut self, column: SortColumn) {
        self.view.click_sort(column);
    }

    pub fn set_sort(&mut self, column: Option<SortColumn>, direction: SortDirection) {
        self.view.set_sort(column, direction);
    }

    pub fn request_page(&mut self, page: usize) -> bool {
        self.view.request_page(page, &self.collection, self.page_size)
    }

    pub fn next_page(&mut self) -> bool {
        self.request_page(self.view.current_page() + 1)
    }

    pub fn prev_page(&mut self) -> bool {
        match self.view.current_page().checked_sub(1) {
            Some(p) => self.request_page(p),
            None => false,
        }
    }

    // --- edit intents ---

    pub fn begin_create(&mut self) {
        self.view.reset_draft();
    }

    pub fn begin_edit(&mut self, id: i64) -> Result<(), SubmitError> {
        let job = self
            .collection
            .iter()
            .find(|j| j.id == Some(id))
            .ok_or(SubmitError::UnknownId(id))?;
        self.view.begin_edit(job);
        Ok(())
    }

    pub fn cancel_edit(&mut self) {
        self.view.reset_draft();
    }

    /// Validates the draft and claims the in-flight slot. On error nothing
    /// changes except the recorded failure.
    pub fn begin_submit(&mut self) -> Result<Submission, SubmitError> {
        if self.in_flight {
            return Err(SubmitError::InFlight);
        }
        let job = match self.view.draft().to_application() {
            Ok(job) => job,
            Err(e) => {
                let err = SubmitError::Invalid(e);
                self.failure = Some(Failure::from_submit(&err));
                return Err(err);
            }
        };
        self.in_flight = true;
        self.submitted = Some(self.view.draft().clone());
        self.failure = None;
        Ok(if job.id.is_some() {
            Submission::Update(job)
        } else {
            Submission::Create(job)
        })
    }

    /// Releases the in-flight slot and applies the store's answer. On
    /// failure the draft is left as it was so the user can retry. On success
    /// the draft is cleared only if it still matches what was sent.
    pub fn finish_submit(&mut self, outcome: StoreResult<Saved>) -> Result<JobApplication, SubmitError> {
        self.in_flight = false;
        let submitted = self.submitted.take();
        let saved = outcome.map_err(|e| self.record_store_failure(e))?;

        let (job, reconciled) = match saved {
            Saved::Created(job) => {
                let r = reconcile::apply_create(&mut self.collection, job.clone());
                (job, r)
            }
            Saved::Updated(job) => {
                let r = reconcile::apply_update(&mut self.collection, job.clone());
                (job, r)
            }
        };
        if let Err(e) = reconciled {
            // the store has it, our copy does not; a reload fixes that
            warn!(error = %e, "saved entity could not be reconciled");
            self.stale = true;
            self.failure = Some(Failure {
                kind: FailureKind::NotFound,
                message: format!("{e}; reloading"),
            });
        }

        if submitted.as_ref() == Some(self.view.draft()) {
            self.view.reset_draft();
        }
        self.clamp_page();
        Ok(job)
    }

    pub async fn submit(&mut self, store: &dyn EntityStore) -> Result<JobApplication, SubmitError> {
        let submission = self.begin_submit()?;
        let outcome = submission.send(store, self.timeout).await;
        self.finish_submit(outcome)
    }

    pub fn begin_delete(&mut self, id: i64) -> Result<i64, SubmitError> {
        if self.in_flight {
            return Err(SubmitError::InFlight);
        }
        self.in_flight = true;
        self.failure = None;
        Ok(id)
    }

    /// A not-found answer still drops the row locally: it is gone either way.
    pub fn finish_delete(&mut self, id: i64, outcome: StoreResult<()>) -> Result<(), SubmitError> {
        self.in_flight = false;
        let result = match outcome {
            Ok(()) => Ok(()),
            Err(e @ StoreError::NotFound(_)) => Err(self.record_store_failure(e)),
            Err(e) => return Err(self.record_store_failure(e)),
        };
        reconcile::apply_delete(&mut self.collection, id);
        if self.view.draft().id == Some(id) {
            self.view.reset_draft();
        }
        self.clamp_page();
        result
    }

    pub async fn delete(&mut self, store: &dyn EntityStore, id: i64) -> Result<(), SubmitError> {
        let id = self.begin_delete(id)?;
        let outcome = with_timeout(self.timeout, store.delete(id)).await;
        self.finish_delete(id, outcome)
    }

    fn record_store_failure(&mut self, e: StoreError) -> SubmitError {
        let err = SubmitError::Store(e);
        let failure = Failure::from_submit(&err);
        if failure.kind.wants_reload() {
            self.stale = true;
        }
        warn!(error = %err, "store call failed");
        self.failure = Some(failure);
        err
    }

    fn clamp_page(&mut self) {
        let pages = self.view().page_count;
        self.view.clamp_page(pages);
    }
}
