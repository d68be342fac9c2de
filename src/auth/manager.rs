use anyhow::Result;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use super::persistence::TokenFile;
use super::policy::FreshnessPolicy;
use super::refresh::IssuerClient;
use super::renewer::Renewer;
use super::status::TokenStatus;
use super::store::CredentialStore;
use super::types::{ClientIdentity, Credential, Snapshot};
use crate::config::Config;
use crate::error::AuthError;

/// Credential manager
/// Owns the bearer token lifecycle: startup load, on-demand and proactive
/// refresh, persistence, and stale-token fallback when the issuer is down
pub struct CredentialManager {
    store: CredentialStore,

    token_file: TokenFile,

    issuer: IssuerClient,

    identity: ClientIdentity,

    policy: FreshnessPolicy,

    /// At most one background loop
    renewer: Mutex<Option<Renewer>>,
}

impl CredentialManager {
    pub fn new(
        identity: ClientIdentity,
        issuer: IssuerClient,
        token_file: TokenFile,
        policy: FreshnessPolicy,
    ) -> Self {
        Self {
            store: CredentialStore::new(),
            token_file,
            issuer,
            identity,
            policy,
            renewer: Mutex::new(None),
        }
    }

    /// Build the manager from loaded configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        let policy = FreshnessPolicy::new(
            config.token_min_validity,
            config.token_refresh_buffer,
            config.token_lifetime,
        );

        let issuer = IssuerClient::new(
            config.oauth_url.clone(),
            config.oauth_scope.clone(),
            Duration::from_secs(config.token_request_timeout),
            config.token_lifetime,
        )?;

        let token_file = TokenFile::new(config.token_file.clone(), policy.min_validity());

        let identity = ClientIdentity::new(
            config.client_id.clone().unwrap_or_default(),
            config.client_secret.clone().unwrap_or_default(),
        );

        Ok(Self::new(identity, issuer, token_file, policy))
    }

    /// Manager whose store starts out holding `credential`
    #[cfg(test)]
    pub(crate) fn with_credential(
        identity: ClientIdentity,
        issuer: IssuerClient,
        token_file: TokenFile,
        policy: FreshnessPolicy,
        credential: Credential,
    ) -> Self {
        Self {
            store: CredentialStore::with_credential(credential),
            ..Self::new(identity, issuer, token_file, policy)
        }
    }

    pub fn policy(&self) -> &FreshnessPolicy {
        &self.policy
    }

    /// Current snapshot, without any refresh
    pub async fn snapshot(&self) -> Snapshot {
        self.store.read().await
    }

    /// Startup: reuse a persisted token if it is still good, otherwise fetch one.
    /// Returns true when a usable token is held afterwards.
    pub async fn initialize(&self) -> bool {
        tracing::info!("Initializing vAMSYS token system...");

        if let Some(credential) = self.token_file.load(Utc::now()).await {
            let remaining = credential.remaining(Utc::now());
            self.store.replace(credential).await;
            tracing::info!(
                "Using saved token (valid for {:.1} more days)",
                remaining.num_seconds() as f64 / 86_400.0
            );
            return true;
        }

        tracing::info!("No valid saved token found, requesting new token...");
        self.refresh().await.is_ok()
    }

    /// Get the bearer token to send upstream.
    ///
    /// Serves the held token while it is usable. Otherwise refreshes; if that
    /// fails, the previously held token is served anyway (possibly expired).
    /// Empty only when no token has ever been obtained.
    pub async fn get_token(&self) -> String {
        let current = self.store.read().await;
        let now = Utc::now();

        if let Some(credential) = &current {
            if self.policy.is_usable(Some(credential), now) {
                return credential.access_token().to_string();
            }
            tracing::info!(
                "Token expiring soon ({:.1} hours), refreshing...",
                credential.remaining(now).num_seconds() as f64 / 3600.0
            );
        }

        if let Ok(credential) = self.refresh().await {
            return credential.access_token().to_string();
        }

        match self.store.read().await {
            Some(stale) => {
                tracing::warn!(
                    token = %stale.token_hint(),
                    expires_at = %stale.expires_at().to_rfc3339(),
                    "Using potentially expired token as fallback"
                );
                stale.access_token().to_string()
            }
            None => String::new(),
        }
    }

    /// Fetch a new token from the issuer, store it, and persist it.
    ///
    /// The store is updated before the file is written; a failed save is
    /// logged and does not fail the refresh.
    pub async fn refresh(&self) -> Result<Credential, AuthError> {
        tracing::info!("Refreshing vAMSYS Bearer token...");

        let credential = match self.issuer.request_token(&self.identity).await {
            Ok(credential) => credential,
            Err(e) => {
                self.log_refresh_failure(&e);
                return Err(e);
            }
        };

        self.store.replace(credential.clone()).await;

        if let Err(e) = self.token_file.save(&credential).await {
            tracing::error!(kind = e.kind(), "Failed to save token to file: {}", e);
        }

        let lifetime = credential.expires_at() - credential.refreshed_at();
        tracing::info!(
            token = %credential.token_hint(),
            "✅ Token refreshed, expires at {} (valid for {:.1} days)",
            credential.expires_at().to_rfc3339(),
            lifetime.num_seconds() as f64 / 86_400.0
        );

        Ok(credential)
    }

    /// Refresh only when the renewal buffer has been reached.
    /// Returns true when a refresh was attempted and succeeded.
    pub async fn refresh_if_needed(&self) -> bool {
        let current = self.store.read().await;
        if !self
            .policy
            .needs_proactive_refresh(current.as_ref(), Utc::now())
        {
            tracing::debug!("Background refresh: token still fresh");
            return false;
        }

        tracing::info!("Background refresh: Token expiring soon, refreshing...");
        self.refresh().await.is_ok()
    }

    fn log_refresh_failure(&self, err: &AuthError) {
        match err {
            AuthError::Configuration(msg) => tracing::error!(
                kind = err.kind(),
                "vAMSYS OAuth credentials not configured: {}. Set VAMSYS_CLIENT_ID and VAMSYS_CLIENT_SECRET.",
                msg
            ),
            _ => tracing::error!(
                kind = err.kind(),
                url = %self.issuer.token_url(),
                client_id = %self.identity.id_hint(),
                "Token refresh failed: {}",
                err
            ),
        }
    }

    /// Start the background renewer. A second start while one is running
    /// is ignored with a warning; returns whether a new loop was started.
    /// A zero interval is refused, since a failing issuer would then be
    /// retried back to back.
    pub async fn start_background_refresh(self: &Arc<Self>, interval: Duration) -> bool {
        if interval.is_zero() {
            tracing::warn!("Background refresh interval must be positive, not starting");
            return false;
        }

        let mut renewer = self.renewer.lock().await;

        if renewer.as_ref().is_some_and(Renewer::is_running) {
            tracing::warn!("Background refresh already running");
            return false;
        }

        *renewer = Some(Renewer::spawn(self, interval));
        true
    }

    /// Stop the background renewer and wait for it to exit
    pub async fn stop_background_refresh(&self) {
        let renewer = self.renewer.lock().await.take();
        if let Some(renewer) = renewer {
            renewer.stop().await;
            tracing::info!("Background refresh thread stopped");
        }
    }

    pub async fn is_background_refresh_running(&self) -> bool {
        self.renewer
            .lock()
            .await
            .as_ref()
            .is_some_and(Renewer::is_running)
    }

    /// Status record for the debug endpoint, computed on demand
    pub async fn get_status(&self) -> TokenStatus {
        let current = self.store.read().await;
        TokenStatus::compute(current.as_ref(), &self.policy, Utc::now())
    }
}
