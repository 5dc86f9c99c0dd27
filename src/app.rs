use axum::{
    Router,
    http::Method,
    routing::{get, post},
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{
    handlers::{
        create_application, delete_application, get_application, healthcheck, list_applications,
        list_contacts, submit_contact, update_application,
    },
    state::AppState,
};

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(healthcheck))
        .route(
            "/api/JobApplications",
            get(list_applications).post(create_application),
        )
        .route(
            "/api/JobApplications/{id}",
            get(get_application)
                .put(update_application)
                .delete(delete_application),
        )
        .route("/api/contact", post(submit_contact))
        .route("/api/contact/messages", get(list_contacts))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_headers(Any)
                .allow_methods([
                    Method::GET,
                    Method::POST,
                    Method::PUT,
                    Method::DELETE,
                    Method::OPTIONS,
                ]),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
