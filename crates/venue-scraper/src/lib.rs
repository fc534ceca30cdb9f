pub mod client;
pub mod error;
pub mod forums;
mod rate_limit;
pub mod signature;
pub mod types;

pub use client::{FetchedPage, ForumClient};
pub use error::ScraperError;
pub use forums::{ForumAdapter, ForumScraper, MAX_POST_PAGES};
pub use signature::{verify_signature, ProfileIdentity, SignatureVerification};
pub use types::{PostListing, ProfilePage, ScrapedPost, SignatureBlock};
