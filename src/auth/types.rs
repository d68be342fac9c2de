// Authentication types

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A complete bearer credential.
///
/// There is no partially-filled credential: a store either holds one of these
/// or nothing at all, and holding one means `expires_at > refreshed_at`.
#[derive(Debug, Clone, PartialEq)]
pub struct Credential {
    access_token: String,
    expires_at: DateTime<Utc>,
    refreshed_at: DateTime<Utc>,
}

/// The unit of state held by the store: empty or a complete credential
pub type Snapshot = Option<Credential>;

impl Credential {
    /// Credential issued at `now`, valid for `lifetime_secs`
    pub fn issued(access_token: String, lifetime_secs: u64, now: DateTime<Utc>) -> Self {
        let lifetime = i64::try_from(lifetime_secs).unwrap_or(i64::MAX).max(1);
        let expires_at = now
            .checked_add_signed(Duration::seconds(lifetime.min(i64::MAX / 1_000)))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self {
            access_token,
            expires_at,
            refreshed_at: now,
        }
    }

    /// Rebuild a credential from stored parts, rejecting anything incomplete
    pub fn from_parts(
        access_token: String,
        expires_at: DateTime<Utc>,
        refreshed_at: DateTime<Utc>,
    ) -> Option<Self> {
        if access_token.is_empty() || expires_at <= refreshed_at {
            return None;
        }
        Some(Self {
            access_token,
            expires_at,
            refreshed_at,
        })
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn refreshed_at(&self) -> DateTime<Utc> {
        self.refreshed_at
    }

    /// Lifetime left at `now`; negative once expired
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        self.expires_at - now
    }

    /// Short token prefix that is safe to log
    pub fn token_hint(&self) -> String {
        let prefix: String = self.access_token.chars().take(8).collect();
        format!("{}...", prefix)
    }
}

/// OAuth client identity used for the client-credentials exchange
#[derive(Clone, Default)]
pub struct ClientIdentity {
    pub client_id: String,
    pub client_secret: String,
}

impl ClientIdentity {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    pub fn is_complete(&self) -> bool {
        !self.client_id.is_empty() && !self.client_secret.is_empty()
    }

    /// Client id prefix that is safe to log
    pub fn id_hint(&self) -> String {
        self.client_id.chars().take(8).collect()
    }
}

impl fmt::Debug for ClientIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientIdentity")
            .field("client_id", &self.id_hint())
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

/// Token endpoint response body
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    #[serde(default)]
    pub access_token: Option<String>,
    /// Token lifetime in seconds. Any JSON number or numeric string is
    /// accepted; anything else reads as absent.
    #[serde(default, deserialize_with = "lenient_secs")]
    pub expires_in: Option<f64>,
}

fn lenient_secs<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.as_f64(),
        Some(serde_json::Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    })
}

/// On-disk snapshot: `{access_token, expires_at, refreshed_at}` in epoch seconds
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct PersistedToken {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub expires_at: Option<f64>,
    #[serde(default)]
    pub refreshed_at: Option<f64>,
}

impl PersistedToken {
    /// Convert back into a credential; `None` when fields are missing or inconsistent
    pub fn into_credential(self) -> Option<Credential> {
        let access_token = self.access_token.filter(|t| !t.is_empty())?;
        let expires_at = from_epoch_secs(self.expires_at?)?;
        let refreshed_at = from_epoch_secs(self.refreshed_at?)?;
        Credential::from_parts(access_token, expires_at, refreshed_at)
    }
}

impl From<&Credential> for PersistedToken {
    fn from(credential: &Credential) -> Self {
        Self {
            access_token: Some(credential.access_token.clone()),
            expires_at: Some(to_epoch_secs(credential.expires_at)),
            refreshed_at: Some(to_epoch_secs(credential.refreshed_at)),
        }
    }
}

fn to_epoch_secs(dt: DateTime<Utc>) -> f64 {
    dt.timestamp_millis() as f64 / 1000.0
}

fn from_epoch_secs(secs: f64) -> Option<DateTime<Utc>> {
    if !secs.is_finite() {
        return None;
    }
    DateTime::from_timestamp_millis((secs * 1000.0).round() as i64)
}
