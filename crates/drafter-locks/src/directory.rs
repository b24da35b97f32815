use std::collections::HashMap;

use async_trait::async_trait;

use drafter_core::error::DrafterError;
use drafter_core::models::UserId;

/// What the surrounding platform knows about a user. Only used to render
/// lock-holder names; the lock manager itself keys everything by id.
#[derive(Debug, Clone, Default)]
pub struct UserProfile {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
}

/// Batched lookup into the platform's user records.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn lookup(&self, ids: &[UserId]) -> Result<HashMap<UserId, UserProfile>, DrafterError>;
}

/// Human-readable name for a lock holder: full name, else the local part
/// of the email, else a truncated user id.
pub fn display_name(user_id: &UserId, profile: Option<&UserProfile>) -> String {
    if let Some(profile) = profile {
        let full = match (&profile.first_name, &profile.last_name) {
            (Some(first), Some(last)) => format!("{first} {last}"),
            (Some(first), None) => first.clone(),
            (None, Some(last)) => last.clone(),
            (None, None) => String::new(),
        };
        if !full.trim().is_empty() {
            return full;
        }
        if let Some(email) = &profile.email {
            if let Some(local) = email.split('@').next() {
                if !local.is_empty() {
                    return local.to_string();
                }
            }
        }
    }
    user_id.to_string().chars().take(8).collect()
}

/// In-memory directory for tests and the operator CLI.
#[derive(Default)]
pub struct StaticDirectory {
    users: HashMap<UserId, UserProfile>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: UserId, profile: UserProfile) {
        self.users.insert(id, profile);
    }
}

#[async_trait]
impl UserDirectory for StaticDirectory {
    async fn lookup(&self, ids: &[UserId]) -> Result<HashMap<UserId, UserProfile>, DrafterError> {
        Ok(ids
            .iter()
            .filter_map(|id| self.users.get(id).map(|p| (id.clone(), p.clone())))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(first: Option<&str>, last: Option<&str>, email: Option<&str>) -> UserProfile {
        UserProfile {
            first_name: first.map(String::from),
            last_name: last.map(String::from),
            email: email.map(String::from),
        }
    }

    #[test]
    fn test_display_name_prefers_full_name() {
        let user = UserId::new();
        let p = profile(Some("Ada"), Some("Lovelace"), Some("ada@example.com"));
        assert_eq!(display_name(&user, Some(&p)), "Ada Lovelace");

        let first_only = profile(Some("Ada"), None, None);
        assert_eq!(display_name(&user, Some(&first_only)), "Ada");
    }

    #[test]
    fn test_display_name_falls_back_to_email_local_part() {
        let user = UserId::new();
        let p = profile(None, None, Some("ada.lovelace@example.com"));
        assert_eq!(display_name(&user, Some(&p)), "ada.lovelace");
    }

    #[test]
    fn test_display_name_falls_back_to_truncated_id() {
        let user = UserId::new();
        let expected: String = user.to_string().chars().take(8).collect();
        assert_eq!(display_name(&user, None), expected);

        let empty = profile(None, None, None);
        assert_eq!(display_name(&user, Some(&empty)), expected);
    }

    #[tokio::test]
    async fn test_static_directory_only_returns_known_users() {
        let known = UserId::new();
        let unknown = UserId::new();
        let mut dir = StaticDirectory::new();
        dir.insert(known.clone(), profile(Some("Ada"), None, None));

        let found = dir.lookup(&[known.clone(), unknown]).await.unwrap();
        assert_eq!(found.len(), 1);
        assert!(found.contains_key(&known));
    }
}
