//! Folds confirmed store mutations back into the in-memory collection so the
//! next view computation sees them without a refetch. Callers only invoke
//! these after the store has acknowledged the write.

use thiserror::Error;
use tracing::{debug, warn};

use crate::models::JobApplication;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReconcileError {
    #[error("entity has no id; unsaved drafts never enter the collection")]
    MissingId,
    #[error("job application #{0} is not in the collection")]
    NotFound(i64),
}

/// Appends a freshly created entity. An id that is somehow already present
/// is replaced in place instead, so ids stay unique.
pub fn apply_create(
    collection: &mut Vec<JobApplication>,
    created: JobApplication,
) -> Result<(), ReconcileError> {
    let id = created.id.ok_or(ReconcileError::MissingId)?;
    if let Some(slot) = collection.iter_mut().find(|job| job.id == Some(id)) {
        warn!(id, "created entity already in collection, replacing");
        *slot = created;
    } else {
        collection.push(created);
    }
    debug!(id, "reconciled create");
    Ok(())
}

/// Replaces the entity with the same id, keeping its position.
pub fn apply_update(
    collection: &mut [JobApplication],
    updated: JobApplication,
) -> Result<(), ReconcileError> {
    let id = updated.id.ok_or(ReconcileError::MissingId)?;
    match collection.iter_mut().find(|job| job.id == Some(id)) {
        Some(slot) => {
            *slot = updated;
            debug!(id, "reconciled update");
            Ok(())
        }
        None => {
            warn!(id, "updated entity missing from collection");
            Err(ReconcileError::NotFound(id))
        }
    }
}

/// Removes the entity if present. Returns whether anything was removed;
/// an absent id leaves the collection untouched.
pub fn apply_delete(collection: &mut Vec<JobApplication>, id: i64) -> bool {
    let before = collection.len();
    collection.retain(|job| job.id != Some(id));
    let removed = collection.len() != before;
    if removed {
        debug!(id, "reconciled delete");
    }
    removed
}
