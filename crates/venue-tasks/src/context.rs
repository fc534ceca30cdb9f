use std::sync::Arc;

use sqlx::PgPool;
use venue_core::{AppConfig, PointsPolicy, VerificationCodec};
use venue_scraper::ForumClient;

use crate::error::TaskError;
use crate::ranking::{RankingEvent, RankingSender};

/// Shared handles every task needs. Cheap to clone.
#[derive(Debug, Clone)]
pub struct TaskContext {
    pub pool: PgPool,
    pub client: ForumClient,
    pub config: Arc<AppConfig>,
    pub codec: Arc<VerificationCodec>,
    ranking_tx: Option<RankingSender>,
}

impl TaskContext {
    /// # Errors
    ///
    /// Returns [`TaskError::Scraper`] if the HTTP client cannot be built.
    pub fn new(pool: PgPool, config: AppConfig) -> Result<Self, TaskError> {
        let client = ForumClient::from_app_config(&config)?;
        let codec = VerificationCodec::for_profiles(&config.secret_key);
        Ok(Self {
            pool,
            client,
            config: Arc::new(config),
            codec: Arc::new(codec),
            ranking_tx: None,
        })
    }

    /// Route ranking events from write paths to a ranking worker.
    #[must_use]
    pub fn with_ranking_events(mut self, tx: RankingSender) -> Self {
        self.ranking_tx = Some(tx);
        self
    }

    /// A copy that sends no ranking events, for work that ranks inline.
    pub(crate) fn without_ranking_events(&self) -> Self {
        Self {
            ranking_tx: None,
            ..self.clone()
        }
    }

    #[must_use]
    pub fn points_policy(&self) -> PointsPolicy {
        self.config.points_policy()
    }

    /// Ask the ranking worker for a recomputation. Without a worker attached
    /// the event is dropped.
    pub fn notify_ranking(&self, event: RankingEvent) {
        if let Some(tx) = &self.ranking_tx {
            tx.notify(event);
        }
    }
}
