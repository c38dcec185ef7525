use std::sync::Arc;

use crate::account::AccountStore;
use crate::cache::ReadCache;
use crate::db::Database;
use crate::notification::NotificationDispatcher;
use crate::transfer::TransferCoordinator;

/// Gateway shared state
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<TransferCoordinator>,
    /// Account reads for the query endpoints
    pub accounts: Arc<dyn AccountStore>,
    pub notifications: Arc<NotificationDispatcher>,
    /// TTL cache of read views; also the coordinator's invalidation hook
    pub cache: Arc<ReadCache>,
    /// `None` in standalone mode
    pub database: Option<Database>,
}

impl AppState {
    pub fn new(
        coordinator: Arc<TransferCoordinator>,
        accounts: Arc<dyn AccountStore>,
        notifications: Arc<NotificationDispatcher>,
        cache: Arc<ReadCache>,
        database: Option<Database>,
    ) -> Self {
        Self {
            coordinator,
            accounts,
            notifications,
            cache,
            database,
        }
    }
}
