// Authentication module
// Manages the vAMSYS bearer token lifecycle

mod manager;
mod persistence;
mod policy;
mod refresh;
mod renewer;
mod status;
mod store;
mod types;

pub use manager::CredentialManager;
pub use persistence::{LoadRejection, TokenFile};
pub use policy::{
    FreshnessPolicy, DEFAULT_MIN_VALIDITY_SECS, DEFAULT_REFRESH_BUFFER_SECS,
    DEFAULT_TOKEN_LIFETIME_SECS,
};
pub use refresh::{
    parse_token_response, IssuerClient, DEFAULT_REQUEST_TIMEOUT_SECS, DEFAULT_SCOPE,
    DEFAULT_TOKEN_URL,
};
pub use renewer::DEFAULT_CHECK_INTERVAL_SECS;
pub use status::TokenStatus;
pub use store::CredentialStore;
pub use types::{ClientIdentity, Credential, Snapshot};
