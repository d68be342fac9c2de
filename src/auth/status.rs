// Read-only token status for operational visibility

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::policy::FreshnessPolicy;
use super::types::Credential;

/// Token health as reported by the debug status endpoint
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TokenStatus {
    /// A token is held and has not expired yet
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usable: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refreshed_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hours_remaining: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub days_remaining: Option<f64>,
    pub needs_refresh: bool,
}

impl TokenStatus {
    pub fn compute(
        snapshot: Option<&Credential>,
        policy: &FreshnessPolicy,
        now: DateTime<Utc>,
    ) -> Self {
        let needs_refresh = policy.needs_proactive_refresh(snapshot, now);

        let Some(credential) = snapshot else {
            return Self {
                valid: false,
                usable: None,
                message: Some("No token available".to_string()),
                expires_at: None,
                refreshed_at: None,
                hours_remaining: None,
                days_remaining: None,
                needs_refresh,
            };
        };

        let remaining_secs = credential.remaining(now).num_milliseconds().max(0) as f64 / 1000.0;

        Self {
            valid: credential.expires_at() > now,
            usable: Some(policy.is_usable(snapshot, now)),
            message: None,
            expires_at: Some(credential.expires_at().to_rfc3339()),
            refreshed_at: Some(credential.refreshed_at().to_rfc3339()),
            hours_remaining: Some(round2(remaining_secs / 3600.0)),
            days_remaining: Some(round2(remaining_secs / 86_400.0)),
            needs_refresh,
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
