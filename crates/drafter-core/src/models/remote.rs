use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

use super::branch::BranchId;
use super::commit::CommitId;
use super::ProjectId;

/// Canonical resource path mapped to content hash; the unit of comparison
/// for the push reconciler. `BTreeMap` keeps serialization order stable so
/// two equal manifests are byte-equal as JSON.
pub type Manifest = BTreeMap<String, String>;

/// Unique identifier for a remote-sync row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RemoteSyncId(pub Uuid);

impl RemoteSyncId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for RemoteSyncId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where a branch stands relative to its remote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Synced,
    Ahead,
    Behind,
    Diverged,
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncStatus::Synced => write!(f, "synced"),
            SyncStatus::Ahead => write!(f, "ahead"),
            SyncStatus::Behind => write!(f, "behind"),
            SyncStatus::Diverged => write!(f, "diverged"),
        }
    }
}

impl std::str::FromStr for SyncStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "synced" => Ok(SyncStatus::Synced),
            "ahead" => Ok(SyncStatus::Ahead),
            "behind" => Ok(SyncStatus::Behind),
            "diverged" => Ok(SyncStatus::Diverged),
            _ => Err(format!("unknown sync status: {s}")),
        }
    }
}

/// Push/pull bookkeeping for one branch against one remote.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteSyncState {
    pub id: RemoteSyncId,
    pub project_id: ProjectId,
    pub branch_id: BranchId,
    pub remote_url: String,
    pub remote_branch: String,
    /// Local commit that was head at the last successful push.
    pub last_push_commit_id: Option<CommitId>,
    pub last_pull_commit_id: Option<CommitId>,
    pub last_push_at: Option<DateTime<Utc>>,
    pub last_pull_at: Option<DateTime<Utc>>,
    pub sync_status: SyncStatus,
}

impl RemoteSyncState {
    pub fn new(
        project_id: ProjectId,
        branch_id: BranchId,
        remote_url: String,
        remote_branch: String,
    ) -> Self {
        Self {
            id: RemoteSyncId::new(),
            project_id,
            branch_id,
            remote_url,
            remote_branch,
            last_push_commit_id: None,
            last_pull_commit_id: None,
            last_push_at: None,
            last_pull_at: None,
            sync_status: SyncStatus::Ahead,
        }
    }
}

/// The kind of git hosting service a project pushes to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    GitHub,
    GitLab,
    Gitea,
    Bitbucket,
    AzureDevOps,
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderKind::GitHub => write!(f, "github"),
            ProviderKind::GitLab => write!(f, "gitlab"),
            ProviderKind::Gitea => write!(f, "gitea"),
            ProviderKind::Bitbucket => write!(f, "bitbucket"),
            ProviderKind::AzureDevOps => write!(f, "azure_devops"),
        }
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "github" => Ok(ProviderKind::GitHub),
            "gitlab" => Ok(ProviderKind::GitLab),
            "gitea" => Ok(ProviderKind::Gitea),
            "bitbucket" => Ok(ProviderKind::Bitbucket),
            "azure_devops" | "azure-devops" | "azuredevops" => Ok(ProviderKind::AzureDevOps),
            _ => Err(format!("unknown provider kind: {s}")),
        }
    }
}

impl ProviderKind {
    /// Default API URL for this provider kind.
    pub fn default_api_url(&self) -> Url {
        match self {
            ProviderKind::GitHub => Url::parse("https://api.github.com").unwrap(),
            ProviderKind::GitLab => Url::parse("https://gitlab.com/api/v4").unwrap(),
            ProviderKind::Gitea => Url::parse("https://gitea.com/api/v1").unwrap(),
            ProviderKind::Bitbucket => Url::parse("https://api.bitbucket.org/2.0").unwrap(),
            ProviderKind::AzureDevOps => Url::parse("https://dev.azure.com").unwrap(),
        }
    }
}

/// Unique identifier for a linked repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LinkedRepoId(pub Uuid);

impl LinkedRepoId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for LinkedRepoId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The git repository a project's main branch pushes to.
///
/// `last_pushed_manifest` holds the manifest of the previous push as
/// canonical JSON; comparing against it is what makes a repeat push with
/// no edits a no-op.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkedRepo {
    pub id: LinkedRepoId,
    pub project_id: ProjectId,
    pub provider: ProviderKind,
    pub full_name: String,
    pub default_branch: String,
    pub last_pushed_manifest: Option<String>,
    pub last_commit_sha: Option<String>,
    pub connected_at: DateTime<Utc>,
    pub last_push_at: Option<DateTime<Utc>>,
}

impl LinkedRepo {
    pub fn new(
        project_id: ProjectId,
        provider: ProviderKind,
        full_name: String,
        default_branch: String,
    ) -> Self {
        Self {
            id: LinkedRepoId::new(),
            project_id,
            provider,
            full_name,
            default_branch,
            last_pushed_manifest: None,
            last_commit_sha: None,
            connected_at: Utc::now(),
            last_push_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_status_roundtrip() {
        for status in [
            SyncStatus::Synced,
            SyncStatus::Ahead,
            SyncStatus::Behind,
            SyncStatus::Diverged,
        ] {
            let parsed: SyncStatus = status.to_string().parse().unwrap();
            assert_eq!(parsed, status);
        }
    }

    #[test]
    fn test_provider_kind_roundtrip() {
        let parsed: ProviderKind = ProviderKind::AzureDevOps.to_string().parse().unwrap();
        assert_eq!(parsed, ProviderKind::AzureDevOps);
        assert!("svn".parse::<ProviderKind>().is_err());
    }

    #[test]
    fn test_manifest_serializes_sorted() {
        let mut manifest = Manifest::new();
        manifest.insert("b.bpmn".to_string(), "2".to_string());
        manifest.insert("a.bpmn".to_string(), "1".to_string());
        let json = serde_json::to_string(&manifest).unwrap();
        assert_eq!(json, r#"{"a.bpmn":"1","b.bpmn":"2"}"#);
    }
}
