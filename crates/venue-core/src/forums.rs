use std::collections::HashSet;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{ConfigError, CoreError};

/// Which site adapter scrapes a forum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScraperKind {
    Bitcointalk,
    BitcoinForum,
}

impl ScraperKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ScraperKind::Bitcointalk => "bitcointalk",
            ScraperKind::BitcoinForum => "bitcoin_forum",
        }
    }
}

impl std::fmt::Display for ScraperKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScraperKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bitcointalk" => Ok(ScraperKind::Bitcointalk),
            "bitcoin_forum" => Ok(ScraperKind::BitcoinForum),
            other => Err(CoreError::UnknownScraper(other.to_string())),
        }
    }
}

/// A named position on a forum ("Sr. Member", "Hero Member", ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankConfig {
    pub name: String,
    #[serde(default)]
    pub allowed: bool,
    /// Whole-number percentage added on top of base post points.
    #[serde(default)]
    pub bonus_percentage: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignatureConfig {
    pub name: String,
    /// BBCode the user pastes, before the verification code is injected.
    pub code: String,
    pub test_signature: Option<String>,
    /// Ranks this signature is offered to.
    #[serde(default)]
    pub ranks: Vec<String>,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForumSiteConfig {
    pub name: String,
    pub address: String,
    pub scraper: ScraperKind,
    #[serde(default)]
    pub ranks: Vec<RankConfig>,
    #[serde(default)]
    pub signatures: Vec<SignatureConfig>,
}

impl ForumSiteConfig {
    #[must_use]
    pub fn rank(&self, name: &str) -> Option<&RankConfig> {
        self.ranks.iter().find(|r| r.name == name)
    }
}

#[derive(Debug, Deserialize)]
pub struct ForumsFile {
    pub sites: Vec<ForumSiteConfig>,
}

/// Load and validate the forum sites seed file.
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be read, parsed, or fails validation.
pub fn load_forums(path: &Path) -> Result<ForumsFile, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ForumsFileIo {
        path: path.display().to_string(),
        source: e,
    })?;

    let forums_file: ForumsFile =
        serde_yaml::from_str(&content).map_err(ConfigError::ForumsFileParse)?;

    validate_forums(&forums_file)?;

    Ok(forums_file)
}

fn validate_forums(forums_file: &ForumsFile) -> Result<(), ConfigError> {
    let mut seen_sites = HashSet::new();

    for site in &forums_file.sites {
        if site.name.trim().is_empty() {
            return Err(ConfigError::Validation(
                "forum site name must be non-empty".to_string(),
            ));
        }

        if !seen_sites.insert(site.name.to_lowercase()) {
            return Err(ConfigError::Validation(format!(
                "duplicate forum site: '{}'",
                site.name
            )));
        }

        if !site.address.starts_with("http://") && !site.address.starts_with("https://") {
            return Err(ConfigError::Validation(format!(
                "forum site '{}' has invalid address '{}'",
                site.name, site.address
            )));
        }

        let mut seen_ranks = HashSet::new();
        for rank in &site.ranks {
            if rank.bonus_percentage > 100 {
                return Err(ConfigError::Validation(format!(
                    "rank '{}' on '{}' has bonus {}%; must be at most 100",
                    rank.name, site.name, rank.bonus_percentage
                )));
            }
            if !seen_ranks.insert(rank.name.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "duplicate rank '{}' on '{}'",
                    rank.name, site.name
                )));
            }
        }

        let mut seen_signatures = HashSet::new();
        for signature in &site.signatures {
            if !seen_signatures.insert(signature.name.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "duplicate signature '{}' on '{}'",
                    signature.name, site.name
                )));
            }
            if let Some(unknown) = signature.ranks.iter().find(|r| !seen_ranks.contains(r.as_str())) {
                return Err(ConfigError::Validation(format!(
                    "signature '{}' on '{}' references unknown rank '{}'",
                    signature.name, site.name, unknown
                )));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
#[path = "forums_test.rs"]
mod tests;
