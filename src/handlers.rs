use axum::{
    Json,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::{StatusCode, header},
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::{
    error::{AppError, AppResult},
    models::{ContactMessage, ContactReceipt, JobApplication, StoredContactMessage},
    state::AppState,
    store::EntityStore,
};

pub const DEFAULT_CONTACT_LIMIT: usize = 50;
pub const MAX_CONTACT_LIMIT: usize = 500;

#[derive(Debug, Deserialize)]
pub struct ContactListQuery {
    pub limit: Option<usize>,
}

pub async fn healthcheck() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn list_applications(
    State(state): State<AppState>,
) -> AppResult<Json<Vec<JobApplication>>> {
    let jobs = state.store.list().await?;
    Ok(Json(jobs))
}

pub async fn get_application(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
) -> AppResult<Json<JobApplication>> {
    let Path(id) = path?;
    let job = state.store.get(id).await?;
    Ok(Json(job))
}

pub async fn create_application(
    State(state): State<AppState>,
    payload: Result<Json<JobApplication>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let Json(job) = payload?;
    if job.id.is_some() {
        return Err(AppError::validation("id is assigned by the server and must not be sent"));
    }
    job.validate()?;

    let created = state.store.create(&job).await?;
    let location = format!("/api/JobApplications/{}", created.id.unwrap_or_default());
    info!(id = ?created.id, company = %created.company_name, "job application created");

    Ok((StatusCode::CREATED, [(header::LOCATION, location)], Json(created)))
}

pub async fn update_application(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
    payload: Result<Json<JobApplication>, JsonRejection>,
) -> AppResult<StatusCode> {
    let Path(id) = path?;
    let Json(job) = payload?;
    match job.id {
        None => return Err(AppError::validation("id is required in the request body")),
        Some(body_id) if body_id != id => {
            return Err(AppError::validation(format!(
                "id mismatch: path has {id}, body has {body_id}"
            )));
        }
        Some(_) => {}
    }
    job.validate()?;

    state.store.update(id, &job).await?;
    info!(id, "job application updated");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn delete_application(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
) -> AppResult<StatusCode> {
    let Path(id) = path?;
    state.store.delete(id).await?;
    info!(id, "job application deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// Stores the message first so it survives a delivery failure, then mails it.
pub async fn submit_contact(
    State(state): State<AppState>,
    payload: Result<Json<ContactMessage>, JsonRejection>,
) -> AppResult<(StatusCode, Json<ContactReceipt>)> {
    let Json(msg) = payload?;
    msg.validate()?;

    let stored = state
        .store
        .record_contact(msg.clone(), state.contact_retention)
        .await?;

    match state.mailer.send(&msg).await {
        Ok(()) => {
            if let Err(err) = state.store.mark_contact_delivered(stored.id).await {
                warn!(id = stored.id, error = %err, "failed to mark contact message delivered");
            }
            info!(id = stored.id, "contact message delivered");
            Ok((
                StatusCode::OK,
                Json(ContactReceipt {
                    success: true,
                    message: "Message sent successfully".to_string(),
                }),
            ))
        }
        Err(err) => {
            warn!(id = stored.id, error = %err, "contact message delivery failed");
            Ok((
                StatusCode::BAD_GATEWAY,
                Json(ContactReceipt {
                    success: false,
                    message: "Failed to send message".to_string(),
                }),
            ))
        }
    }
}

pub async fn list_contacts(
    State(state): State<AppState>,
    query: Result<Query<ContactListQuery>, QueryRejection>,
) -> AppResult<Json<Vec<StoredContactMessage>>> {
    let Query(query) = query?;
    let limit = query.limit.unwrap_or(DEFAULT_CONTACT_LIMIT);
    if limit == 0 || limit > MAX_CONTACT_LIMIT {
        return Err(AppError::validation(format!(
            "limit must be between 1 and {MAX_CONTACT_LIMIT}"
        )));
    }
    let messages = state.store.recent_contacts(limit).await?;
    Ok(Json(messages))
}
