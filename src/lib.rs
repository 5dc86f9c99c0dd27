pub mod app;
pub mod client;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod mailer;
pub mod models;
pub mod reconcile;
pub mod session;
pub mod state;
pub mod store;
pub mod tui;
pub mod view;

pub use app::build_router;
