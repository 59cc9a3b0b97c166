use crate::audit::AuditLogger;
use crate::core::config::AppConfig;
use crate::core::shared::utils::DbPool;
use crate::jobs::JobQueue;
use crate::security::JwtManager;
use crate::sharepoint::GraphClient;
use redis::Client as RedisClient;
use std::sync::Arc;

pub struct AppState {
    pub config: AppConfig,
    pub conn: DbPool,
    pub cache: Option<Arc<RedisClient>>,
    pub jwt: Arc<JwtManager>,
    pub audit: Arc<AuditLogger>,
    /// `None` when Redis is unreachable at startup; async features degrade
    /// to inline processing.
    pub job_queue: Option<JobQueue>,
    pub graph: Arc<GraphClient>,
}

impl Clone for AppState {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            conn: self.conn.clone(),
            cache: self.cache.clone(),
            jwt: Arc::clone(&self.jwt),
            audit: Arc::clone(&self.audit),
            job_queue: self.job_queue.clone(),
            graph: Arc::clone(&self.graph),
        }
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("cache", &self.cache.is_some())
            .field("job_queue", &self.job_queue.is_some())
            .field("audit_mode", &self.audit.mode())
            .finish()
    }
}
