use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

use crate::auth::{
    DEFAULT_CHECK_INTERVAL_SECS, DEFAULT_MIN_VALIDITY_SECS, DEFAULT_REFRESH_BUFFER_SECS,
    DEFAULT_REQUEST_TIMEOUT_SECS, DEFAULT_SCOPE, DEFAULT_TOKEN_LIFETIME_SECS, DEFAULT_TOKEN_URL,
};

/// Flight Proxy - vAMSYS API proxy with managed OAuth credentials
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Server host address
    #[arg(short = 'H', long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Server port
    #[arg(short, long, env = "PORT", default_value = "20591")]
    pub port: u16,

    /// vAMSYS OAuth client ID
    #[arg(long, env = "VAMSYS_CLIENT_ID")]
    pub client_id: Option<String>,

    /// vAMSYS OAuth client secret
    #[arg(long, env = "VAMSYS_CLIENT_SECRET", hide_env_values = true)]
    pub client_secret: Option<String>,

    /// OAuth token endpoint
    #[arg(long, env = "VAMSYS_OAUTH_URL", default_value = DEFAULT_TOKEN_URL)]
    pub oauth_url: String,

    /// Where the token snapshot is persisted between restarts
    #[arg(long, env = "VAMSYS_TOKEN_FILE", default_value = "vamsys_token.json")]
    pub token_file: String,

    /// Seconds between background token checks
    #[arg(long, env = "TOKEN_CHECK_INTERVAL", default_value_t = DEFAULT_CHECK_INTERVAL_SECS)]
    pub check_interval: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Debug mode (enables the token status endpoint)
    #[arg(long, env = "DEBUG", default_value = "false")]
    pub debug: String,
}

#[derive(Clone, Debug)]
pub struct Config {
    // Server settings
    pub server_host: String,
    pub server_port: u16,

    // vAMSYS OAuth client
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub oauth_url: String,
    pub oauth_scope: String,
    pub token_request_timeout: u64,

    // Token lifecycle
    pub token_file: PathBuf,
    pub token_check_interval: u64,
    pub token_min_validity: u64,
    pub token_refresh_buffer: u64,
    pub token_lifetime: u64,

    // Debug
    pub debug: bool,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_host: "0.0.0.0".to_string(),
            server_port: 20591,
            client_id: None,
            client_secret: None,
            oauth_url: DEFAULT_TOKEN_URL.to_string(),
            oauth_scope: DEFAULT_SCOPE.to_string(),
            token_request_timeout: DEFAULT_REQUEST_TIMEOUT_SECS,
            token_file: PathBuf::from("vamsys_token.json"),
            token_check_interval: DEFAULT_CHECK_INTERVAL_SECS,
            token_min_validity: DEFAULT_MIN_VALIDITY_SECS,
            token_refresh_buffer: DEFAULT_REFRESH_BUFFER_SECS,
            token_lifetime: DEFAULT_TOKEN_LIFETIME_SECS,
            debug: false,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from all sources with priority: CLI > ENV > defaults
    pub fn load() -> Result<Self> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        let args = CliArgs::parse();
        Ok(Self::from_args(args))
    }

    fn from_args(args: CliArgs) -> Self {
        let defaults = Config::default();

        Config {
            server_host: args.host,
            server_port: args.port,

            client_id: args.client_id.filter(|s| !s.is_empty()),
            client_secret: args.client_secret.filter(|s| !s.is_empty()),
            oauth_url: args.oauth_url,
            oauth_scope: std::env::var("VAMSYS_OAUTH_SCOPE")
                .ok()
                .filter(|s| !s.is_empty())
                .unwrap_or(defaults.oauth_scope),
            token_request_timeout: env_u64("TOKEN_REQUEST_TIMEOUT")
                .unwrap_or(defaults.token_request_timeout),

            token_file: expand_tilde(&args.token_file),
            token_check_interval: args.check_interval,
            token_min_validity: env_u64("TOKEN_MIN_VALIDITY")
                .unwrap_or(defaults.token_min_validity),
            token_refresh_buffer: env_u64("TOKEN_REFRESH_BUFFER")
                .unwrap_or(defaults.token_refresh_buffer),
            token_lifetime: env_u64("TOKEN_LIFETIME").unwrap_or(defaults.token_lifetime),

            debug: parse_bool(&args.debug),
            log_level: args.log_level,
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.oauth_url.trim().is_empty() {
            anyhow::bail!("VAMSYS_OAUTH_URL cannot be empty");
        }

        reqwest::Url::parse(&self.oauth_url)
            .with_context(|| format!("VAMSYS_OAUTH_URL is not a valid URL: {}", self.oauth_url))?;

        if self.token_refresh_buffer <= self.token_min_validity {
            anyhow::bail!(
                "TOKEN_REFRESH_BUFFER ({}s) must be greater than TOKEN_MIN_VALIDITY ({}s)",
                self.token_refresh_buffer,
                self.token_min_validity
            );
        }

        if self.token_check_interval == 0 {
            anyhow::bail!("TOKEN_CHECK_INTERVAL must be at least 1 second");
        }

        if self.token_request_timeout == 0 {
            anyhow::bail!("TOKEN_REQUEST_TIMEOUT must be at least 1 second");
        }

        Ok(())
    }

    /// Both halves of the client identity are present
    pub fn has_client_identity(&self) -> bool {
        self.client_id.is_some() && self.client_secret.is_some()
    }
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

/// Expand tilde (~) in file paths to user's home directory
fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

/// Parse a boolean flag the way the deployment environment writes them
fn parse_bool(s: &str) -> bool {
    matches!(s.trim().to_lowercase().as_str(), "true" | "1" | "yes" | "on")
}
