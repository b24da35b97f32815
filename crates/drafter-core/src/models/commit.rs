use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::branch::BranchId;
use super::{ProjectId, UserId};

/// Unique identifier for a commit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommitId(pub Uuid);

impl CommitId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for CommitId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An immutable point in a branch's history.
///
/// Commits form a singly linked chain through `parent_commit_id`; history
/// is read by walking backward from a branch head. Once written, a commit
/// and its snapshots never change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Commit {
    pub id: CommitId,
    pub project_id: ProjectId,
    pub branch_id: BranchId,
    pub parent_commit_id: Option<CommitId>,
    pub user_id: UserId,
    pub message: String,
    /// Fingerprint of the commit's full file set.
    pub hash: String,
    /// Sequential per branch; `None` for remote audit commits.
    pub version_number: Option<u32>,
    /// Marks the audit record written after a push to a linked repository.
    pub is_remote: bool,
    pub created_at: DateTime<Utc>,
}

