use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::CoreError;

/// Stages of one data update batch.
///
/// A batch walks [`TaskStage::ORDER`] front to back. `Failed` is terminal and
/// reachable from any non-terminal stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStage {
    Pending,
    Scraping,
    Aggregating,
    CalculatingPoints,
    Completing,
    Ranking,
    Cleanup,
    Done,
    Failed,
}

impl TaskStage {
    pub const ORDER: [TaskStage; 8] = [
        TaskStage::Pending,
        TaskStage::Scraping,
        TaskStage::Aggregating,
        TaskStage::CalculatingPoints,
        TaskStage::Completing,
        TaskStage::Ranking,
        TaskStage::Cleanup,
        TaskStage::Done,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStage::Pending => "PENDING",
            TaskStage::Scraping => "SCRAPING",
            TaskStage::Aggregating => "AGGREGATING",
            TaskStage::CalculatingPoints => "CALCULATING_POINTS",
            TaskStage::Completing => "COMPLETING",
            TaskStage::Ranking => "RANKING",
            TaskStage::Cleanup => "CLEANUP",
            TaskStage::Done => "DONE",
            TaskStage::Failed => "FAILED",
        }
    }

    /// The stage that follows this one, `None` for terminal stages.
    #[must_use]
    pub fn next(self) -> Option<TaskStage> {
        let position = Self::ORDER.iter().position(|s| *s == self)?;
        Self::ORDER.get(position + 1).copied()
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStage::Done | TaskStage::Failed)
    }

    /// Whether a batch may move from `self` to `to`.
    #[must_use]
    pub fn can_transition_to(self, to: TaskStage) -> bool {
        if self.is_terminal() {
            return false;
        }
        to == TaskStage::Failed || self.next() == Some(to)
    }
}

impl std::fmt::Display for TaskStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStage {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskStage::ORDER
            .iter()
            .chain(std::iter::once(&TaskStage::Failed))
            .find(|stage| stage.as_str() == s)
            .copied()
            .ok_or_else(|| CoreError::UnknownTaskStage(s.to_string()))
    }
}
