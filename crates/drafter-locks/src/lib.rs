pub mod directory;

pub use directory::{display_name, StaticDirectory, UserDirectory, UserProfile};

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{Duration, Utc};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use drafter_core::config::DrafterConfig;
use drafter_core::error::DrafterError;
use drafter_core::models::file::FileId;
use drafter_core::models::lock::{FileLock, LockId};
use drafter_core::models::{ProjectId, UserId};
use drafter_db::{ops, Db};

/// Timing knobs for the lock manager.
#[derive(Debug, Clone)]
pub struct LockConfig {
    /// Lease length granted on acquire and on every renewal.
    pub lock_ttl: Duration,
    /// How often a held lock's heartbeat task renews the lease.
    pub heartbeat_interval: std::time::Duration,
    /// How often the background sweep releases lapsed leases.
    pub sweep_interval: std::time::Duration,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            lock_ttl: Duration::minutes(30),
            heartbeat_interval: std::time::Duration::from_secs(30),
            sweep_interval: std::time::Duration::from_secs(300),
        }
    }
}

impl LockConfig {
    pub fn from_config(config: &DrafterConfig) -> Self {
        Self {
            lock_ttl: Duration::minutes(config.lock_ttl_minutes as i64),
            heartbeat_interval: std::time::Duration::from_secs(config.heartbeat_secs),
            sweep_interval: std::time::Duration::from_secs(config.sweep_minutes * 60),
        }
    }
}

/// Who holds a lock, resolved for display.
#[derive(Debug, Clone)]
pub struct LockHolder {
    pub user_id: UserId,
    pub display_name: String,
}

/// One active lock in a project listing.
#[derive(Debug, Clone)]
pub struct ProjectLock {
    pub lock: FileLock,
    pub file_name: String,
    pub holder_name: String,
}

/// Pessimistic per-file lock manager.
///
/// The database row is the source of truth: the partial unique index on
/// active rows makes concurrent acquisition deterministic, and expiry is
/// judged from the stored `expires_at`. The in-process heartbeat tasks
/// are a convenience that keeps a held lease fresh; losing them (or the
/// whole process) only means the lease lapses and the sweep frees it.
#[derive(Clone)]
pub struct LockManager {
    db: Db,
    config: LockConfig,
    directory: Arc<dyn UserDirectory>,
    heartbeats: Arc<Mutex<HashMap<LockId, JoinHandle<()>>>>,
}

impl LockManager {
    pub fn new(db: Db, config: LockConfig, directory: Arc<dyn UserDirectory>) -> Self {
        Self {
            db,
            config,
            directory,
            heartbeats: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn config(&self) -> &LockConfig {
        &self.config
    }

    /// Try to take the lock on a file.
    ///
    /// Returns the lock when the caller now holds it (fresh, or their own
    /// lease extended), and `None` when another user holds it. Holding by
    /// another user is a normal outcome, not an error. Expired rows for
    /// the file are lazily released inside the same transaction, so a
    /// lapsed lease never blocks a new acquire.
    pub async fn acquire(
        &self,
        file_id: &FileId,
        user_id: &UserId,
    ) -> Result<Option<FileLock>, DrafterError> {
        let mut guard = self.db.conn().await;
        let tx = guard.transaction()?;
        let now = Utc::now();

        ops::release_expired_for_file(&tx, file_id, &now)?;

        if let Some(existing) = ops::active_lock_for_file(&tx, file_id, &now)? {
            if &existing.user_id == user_id {
                let expires_at = now + self.config.lock_ttl;
                ops::renew_lock(&tx, &existing.id, &now, &expires_at)?;
                tx.commit()?;
                let mut renewed = existing;
                renewed.heartbeat_at = now;
                renewed.expires_at = expires_at;
                return Ok(Some(renewed));
            }
            tx.commit()?;
            return Ok(None);
        }

        let lock = FileLock::new(file_id.clone(), user_id.clone(), now, self.config.lock_ttl);
        if !ops::try_insert_lock(&tx, &lock)? {
            // Lost the race to another connection: the index rejected the
            // insert, so someone else holds the file now.
            tx.commit()?;
            return Ok(None);
        }
        tx.commit()?;
        tracing::info!(file = %file_id, user = %user_id, lock = %lock.id, "lock acquired");
        Ok(Some(lock))
    }

    /// Release a lock and stop its heartbeat. The row stays behind as the
    /// audit trail. Releasing an already-released lock is a no-op.
    pub async fn release(&self, lock_id: &LockId) -> Result<(), DrafterError> {
        self.stop_heartbeat(lock_id).await;

        let conn = self.db.conn().await;
        let existing = ops::get_lock(&conn, lock_id)?.ok_or_else(|| DrafterError::LockNotFound {
            id: lock_id.to_string(),
        })?;
        if !existing.released {
            ops::release_lock(&conn, lock_id, &Utc::now())?;
            tracing::info!(lock = %lock_id, "lock released");
        }
        Ok(())
    }

    /// Renew a lease: fresh heartbeat, extended expiry. Returns whether a
    /// row was actually updated; a released lock is never revived.
    pub async fn touch(&self, lock_id: &LockId) -> Result<bool, DrafterError> {
        let conn = self.db.conn().await;
        let now = Utc::now();
        ops::renew_lock(&conn, lock_id, &now, &(now + self.config.lock_ttl))
    }

    /// Start the periodic renewal task for a held lock. The task stops
    /// itself the first time a renewal fails or finds the lock gone.
    pub async fn start_heartbeat(&self, lock_id: &LockId) {
        let db = self.db.clone();
        let ttl = self.config.lock_ttl;
        let interval = self.config.heartbeat_interval;
        let id = lock_id.clone();

        let task = tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                let now = Utc::now();
                let conn = db.conn().await;
                match ops::renew_lock(&conn, &id, &now, &(now + ttl)) {
                    Ok(true) => {}
                    Ok(false) => {
                        tracing::info!(lock = %id, "lock released or expired, stopping heartbeat");
                        break;
                    }
                    Err(e) => {
                        tracing::warn!(lock = %id, error = %e, "heartbeat failed, stopping");
                        break;
                    }
                }
            }
        });

        let mut heartbeats = self.heartbeats.lock().await;
        if let Some(previous) = heartbeats.insert(lock_id.clone(), task) {
            previous.abort();
        }
    }

    /// Abort the renewal task for a lock, if one is running.
    pub async fn stop_heartbeat(&self, lock_id: &LockId) {
        let mut heartbeats = self.heartbeats.lock().await;
        if let Some(task) = heartbeats.remove(lock_id) {
            task.abort();
        }
    }

    /// The unreleased, unexpired lock on a file, if any.
    pub async fn active_lock(&self, file_id: &FileId) -> Result<Option<FileLock>, DrafterError> {
        let conn = self.db.conn().await;
        ops::active_lock_for_file(&conn, file_id, &Utc::now())
    }

    /// Who currently holds a file, with a display name for the UI.
    pub async fn holder(&self, file_id: &FileId) -> Result<Option<LockHolder>, DrafterError> {
        let lock = match self.active_lock(file_id).await? {
            Some(l) => l,
            None => return Ok(None),
        };
        let profiles = self.directory.lookup(std::slice::from_ref(&lock.user_id)).await?;
        Ok(Some(LockHolder {
            display_name: display_name(&lock.user_id, profiles.get(&lock.user_id)),
            user_id: lock.user_id,
        }))
    }

    /// All active locks on a project's files: one join query for the
    /// locks, one batched directory lookup for the holder names.
    pub async fn project_locks(
        &self,
        project_id: &ProjectId,
    ) -> Result<Vec<ProjectLock>, DrafterError> {
        let rows = {
            let conn = self.db.conn().await;
            ops::project_locks(&conn, project_id, &Utc::now())?
        };

        let user_ids: Vec<UserId> = rows
            .iter()
            .map(|(lock, _)| lock.user_id.clone())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let profiles = self.directory.lookup(&user_ids).await?;

        Ok(rows
            .into_iter()
            .map(|(lock, file_name)| ProjectLock {
                holder_name: display_name(&lock.user_id, profiles.get(&lock.user_id)),
                file_name,
                lock,
            })
            .collect())
    }

    /// Release every active lock a user holds, e.g. on logout.
    pub async fn release_all_user_locks(&self, user_id: &UserId) -> Result<usize, DrafterError> {
        let released: Vec<LockId> = {
            let conn = self.db.conn().await;
            let now = Utc::now();
            let locks = ops::active_locks_for_user(&conn, user_id, &now)?;
            for lock in &locks {
                ops::release_lock(&conn, &lock.id, &now)?;
            }
            locks.into_iter().map(|l| l.id).collect()
        };
        for id in &released {
            self.stop_heartbeat(id).await;
        }
        if !released.is_empty() {
            tracing::info!(user = %user_id, count = released.len(), "released all user locks");
        }
        Ok(released.len())
    }

    /// Release every lapsed lease. Runs periodically from the sweeper but
    /// can be invoked directly.
    pub async fn sweep_once(&self) -> Result<usize, DrafterError> {
        let conn = self.db.conn().await;
        let swept = ops::release_expired_locks(&conn, &Utc::now())?;
        if swept > 0 {
            tracing::info!(count = swept, "swept expired locks");
        }
        Ok(swept)
    }

    /// Spawn the background expiration sweep.
    pub fn spawn_sweeper(&self) -> JoinHandle<()> {
        let manager = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(manager.config.sweep_interval).await;
                if let Err(e) = manager.sweep_once().await {
                    tracing::warn!(error = %e, "lock sweep failed");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn named_directory(entries: &[(&UserId, &str, &str)]) -> Arc<dyn UserDirectory> {
        let mut dir = StaticDirectory::new();
        for (id, first, last) in entries {
            dir.insert(
                (*id).clone(),
                UserProfile {
                    first_name: Some((*first).to_string()),
                    last_name: Some((*last).to_string()),
                    email: None,
                },
            );
        }
        Arc::new(dir)
    }

    fn manager(db: &Db, directory: Arc<dyn UserDirectory>) -> LockManager {
        LockManager::new(db.clone(), LockConfig::default(), directory)
    }

    #[tokio::test]
    async fn test_lock_exclusivity_and_holder() {
        let db = Db::open_memory().unwrap();
        let file = FileId::new();
        let alice = UserId::new();
        let bob = UserId::new();
        let locks = manager(&db, named_directory(&[(&alice, "Alice", "Ames")]));

        let held = locks.acquire(&file, &alice).await.unwrap().unwrap();
        assert_eq!(held.user_id, alice);

        // Bob is refused without an error.
        assert!(locks.acquire(&file, &bob).await.unwrap().is_none());

        let holder = locks.holder(&file).await.unwrap().unwrap();
        assert_eq!(holder.user_id, alice);
        assert_eq!(holder.display_name, "Alice Ames");

        // After release, Bob gets in.
        locks.release(&held.id).await.unwrap();
        assert!(locks.acquire(&file, &bob).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_reacquire_extends_own_lease() {
        let db = Db::open_memory().unwrap();
        let file = FileId::new();
        let user = UserId::new();
        let locks = manager(&db, Arc::new(StaticDirectory::new()));

        let first = locks.acquire(&file, &user).await.unwrap().unwrap();
        let second = locks.acquire(&file, &user).await.unwrap().unwrap();
        assert_eq!(first.id, second.id);
        assert!(second.expires_at >= first.expires_at);
        assert!(second.heartbeat_at >= first.heartbeat_at);
    }

    #[tokio::test]
    async fn test_expired_lease_is_reacquirable() {
        let db = Db::open_memory().unwrap();
        let file = FileId::new();
        let alice = UserId::new();
        let bob = UserId::new();
        let locks = manager(&db, Arc::new(StaticDirectory::new()));

        // A lease that lapsed the moment it was granted.
        let stale = FileLock::new(file.clone(), alice.clone(), Utc::now() - Duration::hours(1), Duration::minutes(30));
        {
            let conn = db.conn().await;
            ops::insert_lock(&conn, &stale).unwrap();
        }

        assert!(locks.active_lock(&file).await.unwrap().is_none());
        let fresh = locks.acquire(&file, &bob).await.unwrap().unwrap();
        assert_eq!(fresh.user_id, bob);

        // The stale row was lazily released, not deleted.
        let conn = db.conn().await;
        let audited = ops::get_lock(&conn, &stale.id).unwrap().unwrap();
        assert!(audited.released);
    }

    #[tokio::test]
    async fn test_sweep_releases_lapsed_rows() {
        let db = Db::open_memory().unwrap();
        let locks = manager(&db, Arc::new(StaticDirectory::new()));

        let lapsed = FileLock::new(
            FileId::new(),
            UserId::new(),
            Utc::now() - Duration::hours(1),
            Duration::minutes(30),
        );
        {
            let conn = db.conn().await;
            ops::insert_lock(&conn, &lapsed).unwrap();
        }
        let live = locks.acquire(&FileId::new(), &UserId::new()).await.unwrap().unwrap();

        assert_eq!(locks.sweep_once().await.unwrap(), 1);
        assert_eq!(locks.sweep_once().await.unwrap(), 0);
        assert!(locks.active_lock(&live.file_id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_spawned_sweeper_releases_lapsed_lock() {
        let db = Db::open_memory().unwrap();
        let config = LockConfig {
            lock_ttl: Duration::minutes(30),
            heartbeat_interval: std::time::Duration::from_secs(30),
            sweep_interval: std::time::Duration::from_millis(10),
        };
        let locks = LockManager::new(db.clone(), config, Arc::new(StaticDirectory::new()));

        let lapsed = FileLock::new(
            FileId::new(),
            UserId::new(),
            Utc::now() - Duration::hours(1),
            Duration::minutes(30),
        );
        {
            let conn = db.conn().await;
            ops::insert_lock(&conn, &lapsed).unwrap();
        }

        let sweeper = locks.spawn_sweeper();
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        sweeper.abort();

        let conn = db.conn().await;
        let swept = ops::get_lock(&conn, &lapsed.id).unwrap().unwrap();
        assert!(swept.released);
    }

    #[tokio::test]
    async fn test_touch_never_revives_released_lock() {
        let db = Db::open_memory().unwrap();
        let file = FileId::new();
        let user = UserId::new();
        let locks = manager(&db, Arc::new(StaticDirectory::new()));

        let lock = locks.acquire(&file, &user).await.unwrap().unwrap();
        assert!(locks.touch(&lock.id).await.unwrap());

        locks.release(&lock.id).await.unwrap();
        assert!(!locks.touch(&lock.id).await.unwrap());
        assert!(locks.active_lock(&file).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_release_unknown_lock_errors() {
        let db = Db::open_memory().unwrap();
        let locks = manager(&db, Arc::new(StaticDirectory::new()));
        let result = locks.release(&LockId::new()).await;
        assert!(matches!(result, Err(DrafterError::LockNotFound { .. })));
    }

    #[tokio::test]
    async fn test_release_all_user_locks() {
        let db = Db::open_memory().unwrap();
        let user = UserId::new();
        let other = UserId::new();
        let locks = manager(&db, Arc::new(StaticDirectory::new()));

        locks.acquire(&FileId::new(), &user).await.unwrap().unwrap();
        locks.acquire(&FileId::new(), &user).await.unwrap().unwrap();
        let kept = locks.acquire(&FileId::new(), &other).await.unwrap().unwrap();

        assert_eq!(locks.release_all_user_locks(&user).await.unwrap(), 2);
        assert_eq!(locks.release_all_user_locks(&user).await.unwrap(), 0);
        assert!(locks.active_lock(&kept.file_id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_heartbeat_keeps_lease_fresh_until_stopped() {
        let db = Db::open_memory().unwrap();
        let file = FileId::new();
        let user = UserId::new();
        let config = LockConfig {
            lock_ttl: Duration::minutes(30),
            heartbeat_interval: std::time::Duration::from_millis(10),
            sweep_interval: std::time::Duration::from_secs(300),
        };
        let locks = LockManager::new(db.clone(), config, Arc::new(StaticDirectory::new()));

        let lock = locks.acquire(&file, &user).await.unwrap().unwrap();
        locks.start_heartbeat(&lock.id).await;
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let renewed = locks.active_lock(&file).await.unwrap().unwrap();
        assert!(renewed.heartbeat_at > lock.heartbeat_at);

        locks.stop_heartbeat(&lock.id).await;
        let after_stop = locks.active_lock(&file).await.unwrap().unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        let later = locks.active_lock(&file).await.unwrap().unwrap();
        assert_eq!(after_stop.heartbeat_at, later.heartbeat_at);
    }

    #[tokio::test]
    async fn test_project_locks_resolves_holder_names() {
        use drafter_core::models::branch::Branch;
        use drafter_core::models::file::{FileKind, WorkingFile};

        let db = Db::open_memory().unwrap();
        let alice = UserId::new();
        let bob = UserId::new();
        let locks = manager(
            &db,
            named_directory(&[(&alice, "Alice", "Ames"), (&bob, "Bob", "Burns")]),
        );

        let branch = Branch::main(ProjectId::new());
        let file_a = WorkingFile::new(
            branch.id.clone(),
            branch.project_id.clone(),
            None,
            "Order flow".to_string(),
            FileKind::Bpmn,
            "<xml/>".to_string(),
        );
        let file_b = WorkingFile::new(
            branch.id.clone(),
            branch.project_id.clone(),
            None,
            "Rates".to_string(),
            FileKind::Dmn,
            "<xml/>".to_string(),
        );
        {
            let conn = db.conn().await;
            ops::insert_branch(&conn, &branch).unwrap();
            ops::insert_file(&conn, &file_a).unwrap();
            ops::insert_file(&conn, &file_b).unwrap();
        }

        locks.acquire(&file_a.id, &alice).await.unwrap().unwrap();
        locks.acquire(&file_b.id, &bob).await.unwrap().unwrap();

        let mut listed = locks.project_locks(&branch.project_id).await.unwrap();
        listed.sort_by(|a, b| a.file_name.cmp(&b.file_name));
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].file_name, "Order flow");
        assert_eq!(listed[0].holder_name, "Alice Ames");
        assert_eq!(listed[1].file_name, "Rates");
        assert_eq!(listed[1].holder_name, "Bob Burns");

        // Locks on another project's files are not listed.
        assert!(locks.project_locks(&ProjectId::new()).await.unwrap().is_empty());
    }
}
