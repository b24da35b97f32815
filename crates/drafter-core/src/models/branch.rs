use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::commit::CommitId;
use super::{ProjectId, UserId};

/// Name of the shared default branch every project has exactly one of.
pub const MAIN_BRANCH: &str = "main";

/// Name of a user's draft branch.
pub fn draft_name(user_id: &UserId) -> String {
    format!("draft/{user_id}")
}

/// Unique identifier for a branch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BranchId(pub Uuid);

impl BranchId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for BranchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A line of history within a project.
///
/// Every project has one `main` branch (`is_default`, no owner) and at most
/// one draft branch per user. Branches are created lazily and survive until
/// the project itself is torn down.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Branch {
    pub id: BranchId,
    pub project_id: ProjectId,
    pub name: String,
    /// Owner of a draft branch; `None` for main.
    pub user_id: Option<UserId>,
    /// Main's head at the moment this draft was forked. Informational.
    pub base_commit_id: Option<CommitId>,
    /// Newest commit reachable on this branch.
    pub head_commit_id: Option<CommitId>,
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Branch {
    /// The shared main branch of a project.
    pub fn main(project_id: ProjectId) -> Self {
        let now = Utc::now();
        Self {
            id: BranchId::new(),
            project_id,
            name: MAIN_BRANCH.to_string(),
            user_id: None,
            base_commit_id: None,
            head_commit_id: None,
            is_default: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// A user's draft branch, forked from the given main head.
    pub fn draft(project_id: ProjectId, user_id: UserId, main_head: Option<CommitId>) -> Self {
        let now = Utc::now();
        Self {
            id: BranchId::new(),
            project_id,
            name: draft_name(&user_id),
            user_id: Some(user_id),
            base_commit_id: main_head.clone(),
            head_commit_id: main_head,
            is_default: false,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_draft_name_embeds_user_id() {
        let user = UserId::new();
        assert_eq!(draft_name(&user), format!("draft/{}", user.0));
    }

    #[test]
    fn test_draft_forks_from_main_head() {
        let head = CommitId::new();
        let branch = Branch::draft(ProjectId::new(), UserId::new(), Some(head.clone()));
        assert_eq!(branch.base_commit_id, Some(head.clone()));
        assert_eq!(branch.head_commit_id, Some(head));
        assert!(!branch.is_default);
    }
}
