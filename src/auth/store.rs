// In-memory credential store

use tokio::sync::RwLock;

use super::types::{Credential, Snapshot};

/// Holds the current snapshot.
///
/// The lock guards only the swap itself. Network and file I/O always happen
/// outside of it, so readers never wait on a refresh in progress.
#[derive(Debug, Default)]
pub struct CredentialStore {
    current: RwLock<Snapshot>,
}

impl CredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_credential(credential: Credential) -> Self {
        Self {
            current: RwLock::new(Some(credential)),
        }
    }

    /// Current snapshot, possibly empty
    pub async fn read(&self) -> Snapshot {
        self.current.read().await.clone()
    }

    /// Swap in a new credential; the previous one is dropped
    pub async fn replace(&self, credential: Credential) {
        *self.current.write().await = Some(credential);
    }
}
