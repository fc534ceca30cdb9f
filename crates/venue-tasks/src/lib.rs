//! Background work of the venue pipeline: scraping forum profiles, verifying
//! signatures, crediting points and ranking users.

pub mod context;
pub mod error;
pub mod pipeline;
pub mod points;
pub mod position;
pub mod profiles;
pub mod ranking;
pub mod scrape;
pub mod verify;

pub use context::TaskContext;
pub use error::TaskError;
pub use pipeline::{run_data_update, scrape_batch, scraping_rate, BatchTally, DataUpdateReport};
pub use points::{compute_points, PointsSummary};
pub use position::{check_profile, ExistingProfile, ProfileCheck};
pub use profiles::{
    create_forum_profile, signature_code_for, verification_code_for, NewProfileRequest,
};
pub use ranking::{
    ranking_channel, recompute_rankings, run_ranking_worker, RankingEvent, RankingOutcome,
    RankingSender,
};
pub use scrape::{scrape_forum_profile, ScrapeOutcome};
pub use verify::{verify_profile_signature, VerificationOutcome};
