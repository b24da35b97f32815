use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::file::FileId;
use super::UserId;

/// Unique identifier for a file lock.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LockId(pub Uuid);

impl LockId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for LockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An exclusive editing lease on one working file.
///
/// At most one unreleased, unexpired row may exist per file. Rows are
/// never hard-deleted: `released` flips on release or sweep and the row
/// stays behind as the audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileLock {
    pub id: LockId,
    pub file_id: FileId,
    pub user_id: UserId,
    pub acquired_at: DateTime<Utc>,
    /// Hard deadline; past this instant the lease counts as free even if
    /// `released` is still 0.
    pub expires_at: DateTime<Utc>,
    pub heartbeat_at: DateTime<Utc>,
    pub released: bool,
    pub released_at: Option<DateTime<Utc>>,
}

impl FileLock {
    pub fn new(file_id: FileId, user_id: UserId, now: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            id: LockId::new(),
            file_id,
            user_id,
            acquired_at: now,
            expires_at: now + ttl,
            heartbeat_at: now,
            released: false,
            released_at: None,
        }
    }

    /// Whether the lease still excludes other users at `now`.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        !self.released && self.expires_at > now
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_lock_is_active_until_expiry() {
        let now = Utc::now();
        let lock = FileLock::new(FileId::new(), UserId::new(), now, Duration::minutes(30));
        assert!(lock.is_active(now));
        assert!(lock.is_active(now + Duration::minutes(29)));
        assert!(!lock.is_active(now + Duration::minutes(30)));
    }

    #[test]
    fn test_released_lock_is_inactive() {
        let now = Utc::now();
        let mut lock = FileLock::new(FileId::new(), UserId::new(), now, Duration::minutes(30));
        lock.released = true;
        lock.released_at = Some(now);
        assert!(!lock.is_active(now));
    }
}
