//! Analysis run lifecycle.
//!
//! ```text
//! pending → working → success
//!                   → failed
//! pending → success | failed   (forced)
//! ```
//!
//! SUCCESS and FAILED are terminal. Outputs of a run, including the findings it
//! produced, are only safe to read once the run is in a final state.

use crate::error::{RunStatusError, UnknownVariant};
use crate::util::unix_now;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Pending,
    Working,
    Success,
    Failed,
}

impl RunStatus {
    pub const fn allowed_next_states(self) -> &'static [Self] {
        match self {
            Self::Pending => &[Self::Working, Self::Success, Self::Failed],
            Self::Working => &[Self::Success, Self::Failed],
            Self::Success | Self::Failed => &[],
        }
    }

    pub fn can_transition_to(self, next: Self) -> bool {
        self.allowed_next_states().contains(&next)
    }

    pub const fn is_in_final_state(self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Working => "WORKING",
            Self::Success => "SUCCESS",
            Self::Failed => "FAILED",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "WORKING" => Ok(Self::Working),
            "SUCCESS" => Ok(Self::Success),
            "FAILED" => Ok(Self::Failed),
            other => Err(UnknownVariant::new("run status", other)),
        }
    }
}

/// One submitted analysis report and where it is in its lifecycle.
///
/// Created on submission, mutated only by the executor processing it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnalysisRun {
    pub id: i64,
    pub project_key: String,
    pub status: RunStatus,
    pub snapshot_id: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
    pub started_at: Option<i64>,
    pub finished_at: Option<i64>,
}

impl AnalysisRun {
    pub fn new(id: i64, project_key: impl Into<String>, created_at: i64) -> Self {
        Self {
            id,
            project_key: project_key.into(),
            status: RunStatus::Pending,
            snapshot_id: None,
            created_at,
            updated_at: created_at,
            started_at: None,
            finished_at: None,
        }
    }

    pub fn is_in_final_state(&self) -> bool {
        self.status.is_in_final_state()
    }

    /// Pick the run up for processing.
    pub fn start(&mut self) -> Result<(), RunStatusError> {
        self.transition(RunStatus::Working)?;
        self.started_at = Some(self.updated_at);
        Ok(())
    }

    pub fn mark_succeeded(&mut self) -> Result<(), RunStatusError> {
        self.transition(RunStatus::Success)?;
        self.finished_at = Some(self.updated_at);
        Ok(())
    }

    pub fn mark_failed(&mut self) -> Result<(), RunStatusError> {
        self.transition(RunStatus::Failed)?;
        self.finished_at = Some(self.updated_at);
        Ok(())
    }

    fn transition(&mut self, next: RunStatus) -> Result<(), RunStatusError> {
        if self.status.is_in_final_state() {
            return Err(RunStatusError::AlreadyFinal {
                id: self.id,
                status: self.status,
            });
        }
        if !self.status.can_transition_to(next) {
            return Err(RunStatusError::InvalidTransition {
                id: self.id,
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.updated_at = unix_now().max(self.updated_at);
        Ok(())
    }
}
