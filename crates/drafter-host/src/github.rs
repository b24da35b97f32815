use async_trait::async_trait;
use reqwest::header::{self, HeaderMap, HeaderValue};
use serde::Deserialize;
use serde_json::json;

use drafter_core::error::DrafterError;
use drafter_core::models::remote::ProviderKind;

use crate::{GitProvider, PushFile, PushReceipt, TreeEntry};

/// GitHub adapter built on the Git Data API: blobs are inlined as tree
/// entries, then create tree, create commit, update ref.
pub struct GitHubProvider {
    client: reqwest::Client,
    api_url: url::Url,
}

impl GitHubProvider {
    pub fn new(api_url: url::Url, token: String) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            "X-GitHub-Api-Version",
            HeaderValue::from_static("2022-11-28"),
        );
        if let Ok(val) = HeaderValue::from_str(&format!("Bearer {token}")) {
            headers.insert(header::AUTHORIZATION, val);
        }
        headers.insert(header::USER_AGENT, HeaderValue::from_static("drafter/0.1.0"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .expect("failed to build reqwest client");

        Self { client, api_url }
    }

    fn url(&self, path: &str) -> String {
        let base = self.api_url.as_str().trim_end_matches('/');
        format!("{base}{path}")
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
    ) -> Result<Option<T>, DrafterError> {
        let resp = self
            .client
            .get(self.url(path))
            .send()
            .await
            .map_err(|e| DrafterError::ApiError {
                status: 0,
                message: e.to_string(),
            })?;

        let status = resp.status().as_u16();
        if status == 404 {
            return Ok(None);
        }
        if status == 403 || status == 429 {
            return Err(DrafterError::RateLimited {
                host: "github.com".to_string(),
                retry_after_secs: 60,
            });
        }
        if !resp.status().is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(DrafterError::ApiError {
                status,
                message: body,
            });
        }

        let parsed: T = resp.json().await.map_err(|e| DrafterError::ApiError {
            status: 0,
            message: format!("JSON parse error: {e}"),
        })?;
        Ok(Some(parsed))
    }

    async fn post_json<T: for<'de> Deserialize<'de>>(
        &self,
        method: reqwest::Method,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<T, DrafterError> {
        let resp = self
            .client
            .request(method, self.url(path))
            .json(body)
            .send()
            .await
            .map_err(|e| DrafterError::ApiError {
                status: 0,
                message: e.to_string(),
            })?;

        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(DrafterError::ApiError {
                status,
                message: body,
            });
        }

        resp.json().await.map_err(|e| DrafterError::ApiError {
            status: 0,
            message: format!("JSON parse error: {e}"),
        })
    }
}

#[derive(Deserialize)]
struct GhRef {
    object: GhObject,
}

#[derive(Deserialize)]
struct GhObject {
    sha: String,
}

#[derive(Deserialize)]
struct GhCommit {
    sha: String,
    tree: GhObject,
}

#[derive(Deserialize)]
struct GhNewCommit {
    sha: String,
}

#[derive(Deserialize)]
struct GhTree {
    sha: String,
    #[serde(default)]
    tree: Vec<GhTreeEntry>,
}

#[derive(Deserialize)]
struct GhTreeEntry {
    path: String,
    sha: String,
    #[serde(rename = "type")]
    entry_type: String,
}

#[async_trait]
impl GitProvider for GitHubProvider {
    async fn validate_credentials(&self) -> Result<bool, DrafterError> {
        let resp = self
            .client
            .get(self.url("/user"))
            .send()
            .await
            .map_err(|e| DrafterError::ApiError {
                status: 0,
                message: e.to_string(),
            })?;
        Ok(resp.status().is_success())
    }

    async fn push_files(
        &self,
        repo_full_name: &str,
        branch: &str,
        files: &[PushFile],
        message: &str,
    ) -> Result<PushReceipt, DrafterError> {
        tracing::debug!(repo = repo_full_name, branch, files = files.len(), "pushing files");

        // Head of the branch, if it has one. A missing ref means an empty
        // repository: the commit is created without a parent and the ref
        // with POST instead of PATCH.
        let head: Option<GhRef> = self
            .get_json(&format!("/repos/{repo_full_name}/git/ref/heads/{branch}"))
            .await?;

        let (parent_sha, base_tree) = match &head {
            Some(r) => {
                let commit: GhCommit = self
                    .get_json(&format!(
                        "/repos/{repo_full_name}/git/commits/{}",
                        r.object.sha
                    ))
                    .await?
                    .ok_or_else(|| DrafterError::ApiError {
                        status: 404,
                        message: format!("commit {} not found", r.object.sha),
                    })?;
                (Some(commit.sha), Some(commit.tree.sha))
            }
            None => (None, None),
        };

        let entries: Vec<serde_json::Value> = files
            .iter()
            .map(|f| {
                json!({
                    "path": f.path,
                    "mode": "100644",
                    "type": "blob",
                    "content": f.content,
                })
            })
            .collect();

        let mut tree_body = json!({ "tree": entries });
        if let Some(base) = &base_tree {
            tree_body["base_tree"] = json!(base);
        }
        let tree: GhTree = self
            .post_json(
                reqwest::Method::POST,
                &format!("/repos/{repo_full_name}/git/trees"),
                &tree_body,
            )
            .await?;

        let parents: Vec<String> = parent_sha.into_iter().collect();
        let commit: GhNewCommit = self
            .post_json(
                reqwest::Method::POST,
                &format!("/repos/{repo_full_name}/git/commits"),
                &json!({ "message": message, "tree": tree.sha, "parents": parents }),
            )
            .await?;

        if head.is_some() {
            let _: GhObject = self
                .post_json(
                    reqwest::Method::PATCH,
                    &format!("/repos/{repo_full_name}/git/refs/heads/{branch}"),
                    &json!({ "sha": commit.sha }),
                )
                .await?;
        } else {
            let _: GhObject = self
                .post_json(
                    reqwest::Method::POST,
                    &format!("/repos/{repo_full_name}/git/refs"),
                    &json!({ "ref": format!("refs/heads/{branch}"), "sha": commit.sha }),
                )
                .await?;
        }

        Ok(PushReceipt { sha: commit.sha })
    }

    async fn get_tree(
        &self,
        repo_full_name: &str,
        branch: &str,
    ) -> Result<Vec<TreeEntry>, DrafterError> {
        let tree: Option<GhTree> = self
            .get_json(&format!(
                "/repos/{repo_full_name}/git/trees/{branch}?recursive=1"
            ))
            .await?;

        Ok(tree
            .map(|t| {
                t.tree
                    .into_iter()
                    .filter(|e| e.entry_type == "blob")
                    .map(|e| TreeEntry {
                        path: e.path,
                        sha: e.sha,
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::GitHub
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_joins_without_double_slash() {
        let provider = GitHubProvider::new(
            url::Url::parse("https://api.github.com/").unwrap(),
            "tok".to_string(),
        );
        assert_eq!(
            provider.url("/repos/acme/models/git/trees"),
            "https://api.github.com/repos/acme/models/git/trees"
        );
    }

    #[test]
    fn test_tree_entry_type_field_parses() {
        let entry: GhTreeEntry = serde_json::from_str(
            r#"{"path":"claims/intake.bpmn","sha":"abc","type":"blob"}"#,
        )
        .unwrap();
        assert_eq!(entry.entry_type, "blob");
        assert_eq!(entry.path, "claims/intake.bpmn");
    }
}
