pub mod app_config;
pub mod config;
pub mod forums;
pub mod links;
pub mod points;
pub mod profile;
pub mod ranking;
pub mod rate;
pub mod task;
pub mod vcode;

pub use app_config::{AppConfig, Environment};
pub use config::{load_app_config, load_app_config_from_env};
pub use forums::{
    load_forums, ForumSiteConfig, ForumsFile, RankConfig, ScraperKind, SignatureConfig,
};
pub use links::{
    expected_links, inject_verification_code, strip_verification_code, LinkCheck, StrippedLink,
};
pub use points::{round_points, PointsPolicy, PostPoints, Settlement, SignatureState};
pub use profile::{parse_forum_user_id, push_page_status, PageStatus, PAGE_STATUS_HISTORY};
pub use ranking::{assign_ranks, token_allocation, RankedUser, UserPoints};
pub use rate::ScrapeRate;
pub use task::TaskStage;
pub use vcode::{VerificationCodec, MIN_CODE_LENGTH};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },

    #[error("failed to read forums file {path}: {source}")]
    ForumsFileIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse forums file: {0}")]
    ForumsFileParse(#[from] serde_yaml::Error),

    #[error("forums file validation failed: {0}")]
    Validation(String),
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid forum user id: {0:?}")]
    InvalidForumUserId(String),

    #[error("unknown task stage: {0}")]
    UnknownTaskStage(String),

    #[error("unknown scraper: {0}")]
    UnknownScraper(String),
}
