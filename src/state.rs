use std::sync::Arc;

use crate::config::DEFAULT_CONTACT_RETENTION;
use crate::mailer::Mailer;
use crate::store::SqliteStore;

#[derive(Clone)]
pub struct AppState {
    pub store: SqliteStore,
    pub mailer: Arc<dyn Mailer>,
    pub contact_retention: usize,
}

impl AppState {
    pub fn new(store: SqliteStore, mailer: Arc<dyn Mailer>) -> Self {
        Self {
            store,
            mailer,
            contact_retention: DEFAULT_CONTACT_RETENTION,
        }
    }

    pub fn with_contact_retention(mut self, retain: usize) -> Self {
        self.contact_retention = retain.max(1);
        self
    }
}
