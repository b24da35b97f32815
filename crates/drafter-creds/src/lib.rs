use drafter_core::error::DrafterError;
use drafter_core::models::remote::ProviderKind;

/// Key under which a token for one linked repository is stored, e.g.
/// `github:acme/process-models`.
pub fn repo_key(provider: &ProviderKind, full_name: &str) -> String {
    format!("{}:{}", provider, full_name)
}

/// Key for a provider-wide token that covers every repository on that
/// host, e.g. `github`.
pub fn provider_key(provider: &ProviderKind) -> String {
    provider.to_string()
}

/// Trait for credential storage backends.
pub trait CredentialStore: Send + Sync {
    /// Store a token under the given key.
    fn store(&self, key: &str, token: &str) -> Result<(), DrafterError>;

    /// Retrieve a token by key.
    fn get(&self, key: &str) -> Result<Option<String>, DrafterError>;

    /// Delete a stored token. Deleting an absent key is not an error.
    fn delete(&self, key: &str) -> Result<(), DrafterError>;
}

/// Token for pushing to one repository: the repo-scoped entry wins,
/// the provider-wide entry is the fallback.
pub fn token_for_repo(
    store: &dyn CredentialStore,
    provider: &ProviderKind,
    full_name: &str,
) -> Result<Option<String>, DrafterError> {
    if let Some(token) = store.get(&repo_key(provider, full_name))? {
        return Ok(Some(token));
    }
    store.get(&provider_key(provider))
}

/// OS keychain-backed credential store using the `keyring` crate.
pub struct KeyringStore {
    service: String,
}

impl KeyringStore {
    pub fn new() -> Self {
        Self {
            service: "drafter".to_string(),
        }
    }

    fn entry(&self, key: &str) -> Result<keyring::Entry, DrafterError> {
        keyring::Entry::new(&self.service, key).map_err(|e| DrafterError::CredentialError {
            message: e.to_string(),
        })
    }
}

impl Default for KeyringStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialStore for KeyringStore {
    fn store(&self, key: &str, token: &str) -> Result<(), DrafterError> {
        self.entry(key)?
            .set_password(token)
            .map_err(|e| DrafterError::CredentialError {
                message: e.to_string(),
            })
    }

    fn get(&self, key: &str) -> Result<Option<String>, DrafterError> {
        match self.entry(key)?.get_password() {
            Ok(token) => Ok(Some(token)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(DrafterError::CredentialError {
                message: e.to_string(),
            }),
        }
    }

    fn delete(&self, key: &str) -> Result<(), DrafterError> {
        match self.entry(key)?.delete_credential() {
            Ok(()) => Ok(()),
            Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(DrafterError::CredentialError {
                message: e.to_string(),
            }),
        }
    }
}

/// In-memory credential store for testing.
pub struct MemoryStore {
    store: std::sync::Mutex<std::collections::HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            store: std::sync::Mutex::new(std::collections::HashMap::new()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialStore for MemoryStore {
    fn store(&self, key: &str, token: &str) -> Result<(), DrafterError> {
        self.store
            .lock()
            .unwrap()
            .insert(key.to_string(), token.to_string());
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<String>, DrafterError> {
        Ok(self.store.lock().unwrap().get(key).cloned())
    }

    fn delete(&self, key: &str) -> Result<(), DrafterError> {
        self.store.lock().unwrap().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_crud() {
        let store = MemoryStore::new();
        assert_eq!(store.get("test-key").unwrap(), None);
        store.store("test-key", "secret-token").unwrap();
        assert_eq!(store.get("test-key").unwrap(), Some("secret-token".to_string()));
        store.delete("test-key").unwrap();
        assert_eq!(store.get("test-key").unwrap(), None);
    }

    #[test]
    fn test_memory_store_delete_nonexistent() {
        let store = MemoryStore::new();
        store.delete("no-such-key").unwrap();
    }

    #[test]
    fn test_repo_key_layout() {
        assert_eq!(
            repo_key(&ProviderKind::GitHub, "acme/process-models"),
            "github:acme/process-models"
        );
        assert_eq!(provider_key(&ProviderKind::GitLab), "gitlab");
    }

    #[test]
    fn test_token_for_repo_prefers_repo_scoped_entry() {
        let store = MemoryStore::new();
        assert_eq!(
            token_for_repo(&store, &ProviderKind::GitHub, "acme/models").unwrap(),
            None
        );

        store.store(&provider_key(&ProviderKind::GitHub), "org-token").unwrap();
        assert_eq!(
            token_for_repo(&store, &ProviderKind::GitHub, "acme/models").unwrap(),
            Some("org-token".to_string())
        );

        store
            .store(&repo_key(&ProviderKind::GitHub, "acme/models"), "repo-token")
            .unwrap();
        assert_eq!(
            token_for_repo(&store, &ProviderKind::GitHub, "acme/models").unwrap(),
            Some("repo-token".to_string())
        );
        // Other repos on the host still fall back to the provider entry.
        assert_eq!(
            token_for_repo(&store, &ProviderKind::GitHub, "acme/other").unwrap(),
            Some("org-token".to_string())
        );
    }
}
