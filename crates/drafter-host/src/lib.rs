pub mod github;

use async_trait::async_trait;

use drafter_core::error::DrafterError;
use drafter_core::models::remote::ProviderKind;

/// A file staged for a provider push, addressed by its canonical
/// resource path within the repository.
#[derive(Debug, Clone)]
pub struct PushFile {
    pub path: String,
    pub content: String,
}

/// Receipt of a completed push: the commit the provider created.
#[derive(Debug, Clone)]
pub struct PushReceipt {
    pub sha: String,
}

/// One blob of a repository's tree listing.
#[derive(Debug, Clone)]
pub struct TreeEntry {
    pub path: String,
    pub sha: String,
}

/// The generic push contract a hosting provider must satisfy.
///
/// The reconciler never needs provider-specific semantics beyond this:
/// write a set of files as one commit, read the current tree, check that
/// the stored token still works.
#[async_trait]
pub trait GitProvider: Send + Sync {
    /// Validate that the stored credentials are valid.
    async fn validate_credentials(&self) -> Result<bool, DrafterError>;

    /// Push the given files to a branch as a single commit and return it.
    async fn push_files(
        &self,
        repo_full_name: &str,
        branch: &str,
        files: &[PushFile],
        message: &str,
    ) -> Result<PushReceipt, DrafterError>;

    /// List every blob reachable from a branch head.
    async fn get_tree(
        &self,
        repo_full_name: &str,
        branch: &str,
    ) -> Result<Vec<TreeEntry>, DrafterError>;

    /// The kind of provider this client talks to.
    fn kind(&self) -> ProviderKind;
}

/// Create a GitProvider for the given provider kind.
pub fn create_provider(
    kind: &ProviderKind,
    api_url: &url::Url,
    token: &str,
) -> Result<Box<dyn GitProvider>, DrafterError> {
    match kind {
        ProviderKind::GitHub => Ok(Box::new(github::GitHubProvider::new(
            api_url.clone(),
            token.to_string(),
        ))),
        other => Err(DrafterError::ProviderNotImplemented {
            kind: other.to_string(),
        }),
    }
}
