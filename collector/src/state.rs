use sqlx::SqlitePool;
use std::sync::Arc;

use crate::services::ingestion::IngestionService;
use crate::services::notifier::Notifier;
use crate::services::token_authority::TokenAuthority;

// App state
pub struct AppState {
    pub pool: SqlitePool,
    pub authority: Arc<TokenAuthority>,
    pub ingestion: IngestionService,
    pub admin_api_key: Option<String>,
}

impl AppState {
    pub fn new(
        pool: SqlitePool,
        authority: Arc<TokenAuthority>,
        notifier: Arc<dyn Notifier>,
        admin_api_key: Option<String>,
    ) -> Self {
        let ingestion = IngestionService::new(pool.clone(), Arc::clone(&authority), notifier);
        Self {
            pool,
            authority,
            ingestion,
            admin_api_key,
        }
    }
}
