use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::branch::BranchId;
use super::commit::CommitId;
use super::file::{FileId, FileKind, FolderId};

/// Unique identifier for a file snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SnapshotId(pub Uuid);

impl SnapshotId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How a snapshot relates to the parent commit's file set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Added,
    Modified,
    Deleted,
}

impl std::fmt::Display for ChangeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChangeType::Added => write!(f, "added"),
            ChangeType::Modified => write!(f, "modified"),
            ChangeType::Deleted => write!(f, "deleted"),
        }
    }
}

impl std::str::FromStr for ChangeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "added" => Ok(ChangeType::Added),
            "modified" => Ok(ChangeType::Modified),
            "deleted" => Ok(ChangeType::Deleted),
            _ => Err(format!("unknown change type: {s}")),
        }
    }
}

/// One file's state within a commit.
///
/// A commit's snapshot set is its complete file listing: every live file
/// gets a row with full content, and `deleted` rows (NULL content and hash)
/// record files the parent commit had that are gone now.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileSnapshot {
    pub id: SnapshotId,
    pub commit_id: CommitId,
    /// Worktree file this snapshot was taken from. Informational; diffs key
    /// on path and kind, not on this id.
    pub working_file_id: FileId,
    pub folder_id: Option<FolderId>,
    pub name: String,
    pub kind: FileKind,
    pub content: Option<String>,
    pub content_hash: Option<String>,
    pub change_type: ChangeType,
}

/// Unique identifier for a pending-change row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PendingChangeId(pub Uuid);

impl PendingChangeId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for PendingChangeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a journal entry records about an edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingChangeKind {
    Create,
    Update,
    Delete,
}

impl std::fmt::Display for PendingChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PendingChangeKind::Create => write!(f, "create"),
            PendingChangeKind::Update => write!(f, "update"),
            PendingChangeKind::Delete => write!(f, "delete"),
        }
    }
}

impl std::str::FromStr for PendingChangeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(PendingChangeKind::Create),
            "update" => Ok(PendingChangeKind::Update),
            "delete" => Ok(PendingChangeKind::Delete),
            _ => Err(format!("unknown pending change kind: {s}")),
        }
    }
}

/// Append-only journal row written alongside every tracked edit.
///
/// Dirty detection never reads this table; it exists for operators asking
/// "what happened on this branch since the last commit".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingChange {
    pub id: PendingChangeId,
    pub branch_id: BranchId,
    pub working_file_id: FileId,
    pub change_type: PendingChangeKind,
    pub previous_content_hash: Option<String>,
    pub new_content_hash: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl PendingChange {
    pub fn new(
        branch_id: BranchId,
        working_file_id: FileId,
        change_type: PendingChangeKind,
        previous_content_hash: Option<String>,
        new_content_hash: Option<String>,
    ) -> Self {
        Self {
            id: PendingChangeId::new(),
            branch_id,
            working_file_id,
            change_type,
            previous_content_hash,
            new_content_hash,
            created_at: Utc::now(),
        }
    }
}
