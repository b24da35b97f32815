/// SQL statements for creating the Drafter database schema.

pub const CREATE_SCHEMA_VERSION: &str = "
CREATE TABLE IF NOT EXISTS schema_version (
    version     INTEGER PRIMARY KEY,
    applied_at  TEXT NOT NULL
)";

pub const CREATE_BRANCHES: &str = "
CREATE TABLE IF NOT EXISTS branches (
    id              TEXT PRIMARY KEY,
    project_id      TEXT NOT NULL,
    name            TEXT NOT NULL,
    user_id         TEXT,
    base_commit_id  TEXT,
    head_commit_id  TEXT,
    is_default      INTEGER NOT NULL DEFAULT 0,
    created_at      TEXT NOT NULL,
    updated_at      TEXT NOT NULL
)";

/// One main branch per project, at most one draft per user and project.
pub const CREATE_BRANCH_INDEXES: &str = "
CREATE INDEX IF NOT EXISTS idx_branches_project
    ON branches(project_id);
CREATE UNIQUE INDEX IF NOT EXISTS idx_branches_main
    ON branches(project_id) WHERE is_default = 1;
CREATE UNIQUE INDEX IF NOT EXISTS idx_branches_user
    ON branches(project_id, user_id) WHERE user_id IS NOT NULL;
";

pub const CREATE_COMMITS: &str = "
CREATE TABLE IF NOT EXISTS commits (
    id                TEXT PRIMARY KEY,
    project_id        TEXT NOT NULL,
    branch_id         TEXT NOT NULL,
    parent_commit_id  TEXT,
    user_id           TEXT NOT NULL,
    message           TEXT NOT NULL,
    hash              TEXT NOT NULL,
    version_number    INTEGER,
    is_remote         INTEGER NOT NULL DEFAULT 0,
    created_at        TEXT NOT NULL,
    FOREIGN KEY (branch_id) REFERENCES branches(id) ON DELETE CASCADE
)";

pub const CREATE_COMMIT_INDEXES: &str = "
CREATE INDEX IF NOT EXISTS idx_commits_branch ON commits(branch_id);
";

pub const CREATE_FILE_SNAPSHOTS: &str = "
CREATE TABLE IF NOT EXISTS file_snapshots (
    id               TEXT PRIMARY KEY,
    commit_id        TEXT NOT NULL,
    working_file_id  TEXT NOT NULL,
    folder_id        TEXT,
    name             TEXT NOT NULL,
    kind             TEXT NOT NULL,
    content          TEXT,
    content_hash     TEXT,
    change_type      TEXT NOT NULL,
    FOREIGN KEY (commit_id) REFERENCES commits(id) ON DELETE CASCADE
)";

pub const CREATE_SNAPSHOT_INDEXES: &str = "
CREATE INDEX IF NOT EXISTS idx_snapshots_commit ON file_snapshots(commit_id);
";

pub const CREATE_WORKING_FILES: &str = "
CREATE TABLE IF NOT EXISTS working_files (
    id            TEXT PRIMARY KEY,
    branch_id     TEXT NOT NULL,
    project_id    TEXT NOT NULL,
    folder_id     TEXT,
    name          TEXT NOT NULL,
    kind          TEXT NOT NULL,
    content       TEXT NOT NULL,
    content_hash  TEXT NOT NULL,
    is_deleted    INTEGER NOT NULL DEFAULT 0,
    created_at    TEXT NOT NULL,
    updated_at    TEXT NOT NULL,
    FOREIGN KEY (branch_id) REFERENCES branches(id) ON DELETE CASCADE
)";

pub const CREATE_WORKING_FILE_INDEXES: &str = "
CREATE INDEX IF NOT EXISTS idx_working_files_branch ON working_files(branch_id);
CREATE INDEX IF NOT EXISTS idx_working_files_project ON working_files(project_id);
";

pub const CREATE_WORKING_FOLDERS: &str = "
CREATE TABLE IF NOT EXISTS working_folders (
    id          TEXT PRIMARY KEY,
    branch_id   TEXT NOT NULL,
    project_id  TEXT NOT NULL,
    parent_id   TEXT,
    name        TEXT NOT NULL,
    is_deleted  INTEGER NOT NULL DEFAULT 0,
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL,
    FOREIGN KEY (branch_id) REFERENCES branches(id) ON DELETE CASCADE
)";

pub const CREATE_WORKING_FOLDER_INDEXES: &str = "
CREATE INDEX IF NOT EXISTS idx_working_folders_branch ON working_folders(branch_id);
";

pub const CREATE_REMOTE_SYNC_STATE: &str = "
CREATE TABLE IF NOT EXISTS remote_sync_state (
    id                   TEXT PRIMARY KEY,
    project_id           TEXT NOT NULL,
    branch_id            TEXT NOT NULL,
    remote_url           TEXT NOT NULL,
    remote_branch        TEXT NOT NULL DEFAULT 'main',
    last_push_commit_id  TEXT,
    last_pull_commit_id  TEXT,
    last_push_at         TEXT,
    last_pull_at         TEXT,
    sync_status          TEXT NOT NULL DEFAULT 'ahead',
    UNIQUE (project_id, branch_id),
    FOREIGN KEY (branch_id) REFERENCES branches(id) ON DELETE CASCADE
)";

pub const CREATE_LINKED_REPOS: &str = "
CREATE TABLE IF NOT EXISTS linked_repos (
    id                    TEXT PRIMARY KEY,
    project_id            TEXT NOT NULL UNIQUE,
    provider              TEXT NOT NULL,
    full_name             TEXT NOT NULL,
    default_branch        TEXT NOT NULL DEFAULT 'main',
    last_pushed_manifest  TEXT,
    last_commit_sha       TEXT,
    connected_at          TEXT NOT NULL,
    last_push_at          TEXT
)";

pub const CREATE_PENDING_CHANGES: &str = "
CREATE TABLE IF NOT EXISTS pending_changes (
    id                     TEXT PRIMARY KEY,
    branch_id              TEXT NOT NULL,
    working_file_id        TEXT NOT NULL,
    change_type            TEXT NOT NULL,
    previous_content_hash  TEXT,
    new_content_hash       TEXT,
    created_at             TEXT NOT NULL,
    FOREIGN KEY (branch_id) REFERENCES branches(id) ON DELETE CASCADE
)";

pub const CREATE_PENDING_CHANGE_INDEXES: &str = "
CREATE INDEX IF NOT EXISTS idx_pending_changes_branch ON pending_changes(branch_id);
";

// Lock rows survive project teardown as an audit trail, so no foreign key.
pub const CREATE_FILE_LOCKS: &str = "
CREATE TABLE IF NOT EXISTS file_locks (
    id            TEXT PRIMARY KEY,
    file_id       TEXT NOT NULL,
    user_id       TEXT NOT NULL,
    acquired_at   TEXT NOT NULL,
    expires_at    TEXT NOT NULL,
    heartbeat_at  TEXT NOT NULL,
    released      INTEGER NOT NULL DEFAULT 0,
    released_at   TEXT
)";

/// The partial unique index is what makes concurrent acquisition safe: two
/// inserts for the same file with `released = 0` cannot both succeed, no
/// matter how the callers interleave.
pub const CREATE_FILE_LOCK_INDEXES: &str = "
CREATE UNIQUE INDEX IF NOT EXISTS idx_file_locks_active
    ON file_locks(file_id) WHERE released = 0;
CREATE INDEX IF NOT EXISTS idx_file_locks_expiry
    ON file_locks(expires_at) WHERE released = 0;
CREATE INDEX IF NOT EXISTS idx_file_locks_user
    ON file_locks(user_id) WHERE released = 0;
";

/// All table creation statements in order.
pub const ALL_TABLES: &[&str] = &[
    CREATE_SCHEMA_VERSION,
    CREATE_BRANCHES,
    CREATE_COMMITS,
    CREATE_FILE_SNAPSHOTS,
    CREATE_WORKING_FILES,
    CREATE_WORKING_FOLDERS,
    CREATE_REMOTE_SYNC_STATE,
    CREATE_LINKED_REPOS,
    CREATE_PENDING_CHANGES,
    CREATE_FILE_LOCKS,
];

/// All index creation statements in order.
pub const ALL_INDEXES: &[&str] = &[
    CREATE_BRANCH_INDEXES,
    CREATE_COMMIT_INDEXES,
    CREATE_SNAPSHOT_INDEXES,
    CREATE_WORKING_FILE_INDEXES,
    CREATE_WORKING_FOLDER_INDEXES,
    CREATE_PENDING_CHANGE_INDEXES,
    CREATE_FILE_LOCK_INDEXES,
];

#[cfg(test)]
mod tests {
    use rusqlite::Connection;

    use super::*;

    #[test]
    fn test_schema_applies_to_fresh_database() {
        let conn = Connection::open_in_memory().unwrap();
        for stmt in ALL_TABLES {
            conn.execute_batch(stmt).unwrap();
        }
        for stmt in ALL_INDEXES {
            conn.execute_batch(stmt).unwrap();
        }
    }
}
