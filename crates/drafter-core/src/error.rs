/// Central error type for the Drafter system.
#[derive(Debug, thiserror::Error)]
pub enum DrafterError {
    #[error("branch not found: {id}")]
    BranchNotFound { id: String },

    #[error("no main branch for project {project}")]
    MainBranchNotFound { project: String },

    #[error("commit not found: {id}")]
    CommitNotFound { id: String },

    #[error("file not found: {id}")]
    FileNotFound { id: String },

    #[error("lock not found: {id}")]
    LockNotFound { id: String },

    #[error("no repository linked to project {project}")]
    RepoNotLinked { project: String },

    #[error("remote sync not configured for project {project}")]
    RemoteNotConfigured { project: String },

    #[error("nothing to commit on branch {branch}")]
    NothingToCommit { branch: String },

    #[error("no files to push")]
    NoFilesToPush,

    #[error("authentication failed for {host}: {message}")]
    AuthFailed { host: String, message: String },

    #[error("API error ({status}): {message}")]
    ApiError { status: u16, message: String },

    #[error("rate limited by {host}: retry after {retry_after_secs}s")]
    RateLimited { host: String, retry_after_secs: u64 },

    #[error("provider not implemented: {kind}")]
    ProviderNotImplemented { kind: String },

    #[error("credential error: {message}")]
    CredentialError { message: String },

    #[error("config error: {message}")]
    Config { message: String },

    #[error("database error: {0}")]
    Database(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<rusqlite::Error> for DrafterError {
    fn from(e: rusqlite::Error) -> Self {
        DrafterError::Database(e.to_string())
    }
}

impl From<serde_json::Error> for DrafterError {
    fn from(e: serde_json::Error) -> Self {
        DrafterError::Serialization(e.to_string())
    }
}
