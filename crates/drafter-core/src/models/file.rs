use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::hash;

use super::branch::BranchId;
use super::ProjectId;

/// Unique identifier for a working file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileId(pub Uuid);

impl FileId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for FileId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a working folder.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FolderId(pub Uuid);

impl FolderId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for FolderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The kind of process-model document a file holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileKind {
    Bpmn,
    Dmn,
}

impl FileKind {
    /// File extension used when the file is written to a git tree.
    pub fn extension(&self) -> &'static str {
        match self {
            FileKind::Bpmn => ".bpmn",
            FileKind::Dmn => ".dmn",
        }
    }
}

impl std::fmt::Display for FileKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileKind::Bpmn => write!(f, "bpmn"),
            FileKind::Dmn => write!(f, "dmn"),
        }
    }
}

impl std::str::FromStr for FileKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "bpmn" => Ok(FileKind::Bpmn),
            "dmn" => Ok(FileKind::Dmn),
            _ => Err(format!("unknown file kind: {s}")),
        }
    }
}

/// A mutable file in a branch's worktree.
///
/// Edits land here directly; commits copy the state out into immutable
/// snapshots. Removal is logical (`is_deleted`) so history stays diffable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkingFile {
    pub id: FileId,
    pub branch_id: BranchId,
    pub project_id: ProjectId,
    pub folder_id: Option<FolderId>,
    pub name: String,
    pub kind: FileKind,
    pub content: String,
    pub content_hash: String,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkingFile {
    pub fn new(
        branch_id: BranchId,
        project_id: ProjectId,
        folder_id: Option<FolderId>,
        name: String,
        kind: FileKind,
        content: String,
    ) -> Self {
        let now = Utc::now();
        let content_hash = hash::hash_content(&content);
        Self {
            id: FileId::new(),
            branch_id,
            project_id,
            folder_id,
            name,
            kind,
            content,
            content_hash,
            is_deleted: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Replace the content, recomputing the stored hash.
    pub fn set_content(&mut self, content: String) {
        self.content_hash = hash::hash_content(&content);
        self.content = content;
        self.updated_at = Utc::now();
    }
}

/// A mutable folder in a branch's worktree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkingFolder {
    pub id: FolderId,
    pub branch_id: BranchId,
    pub project_id: ProjectId,
    pub parent_id: Option<FolderId>,
    pub name: String,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkingFolder {
    pub fn new(
        branch_id: BranchId,
        project_id: ProjectId,
        parent_id: Option<FolderId>,
        name: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: FolderId::new(),
            branch_id,
            project_id,
            parent_id,
            name,
            is_deleted: false,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_file_hashes_its_content() {
        let file = WorkingFile::new(
            BranchId::new(),
            ProjectId::new(),
            None,
            "Order flow".to_string(),
            FileKind::Bpmn,
            "test content".to_string(),
        );
        assert_eq!(
            file.content_hash,
            "6ae8a75555209fd6c44157c0aed8016e763ff435a19cf186f76863140143ff72"
        );
        assert!(!file.is_deleted);
    }

    #[test]
    fn test_set_content_updates_hash() {
        let mut file = WorkingFile::new(
            BranchId::new(),
            ProjectId::new(),
            None,
            "Rates".to_string(),
            FileKind::Dmn,
            "v1".to_string(),
        );
        let before = file.content_hash.clone();
        file.set_content("v2".to_string());
        assert_ne!(file.content_hash, before);
        assert_eq!(file.content, "v2");
    }

    #[test]
    fn test_file_kind_parses_case_insensitively() {
        assert_eq!("BPMN".parse::<FileKind>().unwrap(), FileKind::Bpmn);
        assert_eq!("dmn".parse::<FileKind>().unwrap(), FileKind::Dmn);
        assert!("xml".parse::<FileKind>().is_err());
    }
}
