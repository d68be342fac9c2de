// Client-credentials exchange with the OAuth token endpoint

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use std::time::Duration;

use super::types::{ClientIdentity, Credential, TokenResponse};
use crate::error::{truncate_body, AuthError, ProtocolError};

/// Default vAMSYS token endpoint
pub const DEFAULT_TOKEN_URL: &str = "https://vamsys.io/oauth/token";

/// Default requested scope (everything the client is allowed)
pub const DEFAULT_SCOPE: &str = "*";

/// Upper bound on a single token request
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Performs the client-credentials grant. No retries here: the renewer and
/// the synchronous refresh path decide when to try again.
#[derive(Debug, Clone)]
pub struct IssuerClient {
    client: Client,
    token_url: String,
    scope: String,
    default_lifetime_secs: u64,
}

impl IssuerClient {
    pub fn new(
        token_url: impl Into<String>,
        scope: impl Into<String>,
        timeout: Duration,
        default_lifetime_secs: u64,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            token_url: token_url.into(),
            scope: scope.into(),
            default_lifetime_secs,
        })
    }

    pub fn token_url(&self) -> &str {
        &self.token_url
    }

    /// Exchange the client identity for a fresh credential
    pub async fn request_token(&self, identity: &ClientIdentity) -> Result<Credential, AuthError> {
        if identity.client_id.is_empty() {
            return Err(AuthError::Configuration(
                "VAMSYS_CLIENT_ID is not set".to_string(),
            ));
        }
        if identity.client_secret.is_empty() {
            return Err(AuthError::Configuration(
                "VAMSYS_CLIENT_SECRET is not set".to_string(),
            ));
        }

        tracing::debug!(
            "OAuth token request: url={}, client_id={}...",
            self.token_url,
            identity.id_hint()
        );

        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", identity.client_id.as_str()),
            ("client_secret", identity.client_secret.as_str()),
            ("scope", self.scope.as_str()),
        ];

        let response = self
            .client
            .post(&self.token_url)
            .header("Accept", "application/json")
            .form(&form)
            .send()
            .await
            .map_err(AuthError::transport)?;

        let status = response.status();
        let body = response.text().await.map_err(AuthError::transport)?;

        if status != StatusCode::OK {
            return Err(ProtocolError::Status {
                status: status.as_u16(),
                body: truncate_body(&body),
            }
            .into());
        }

        Ok(parse_token_response(
            &body,
            self.default_lifetime_secs,
            Utc::now(),
        )?)
    }
}

/// Turn a 200 response body into a credential issued at `now`
pub fn parse_token_response(
    body: &str,
    default_lifetime_secs: u64,
    now: DateTime<Utc>,
) -> Result<Credential, ProtocolError> {
    let data: TokenResponse =
        serde_json::from_str(body).map_err(|e| ProtocolError::MalformedBody(e.to_string()))?;

    let access_token = data
        .access_token
        .filter(|t| !t.is_empty())
        .ok_or(ProtocolError::MissingAccessToken)?;

    let lifetime = data
        .expires_in
        .filter(|secs| secs.is_finite() && *secs > 0.0)
        .map(|secs| secs.round().min(u64::MAX as f64) as u64)
        .unwrap_or(default_lifetime_secs);

    Ok(Credential::issued(access_token, lifetime, now))
}
