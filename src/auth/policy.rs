// Freshness policy: when a held credential may be served and when to renew it

use chrono::{DateTime, Duration, Utc};

use super::types::Credential;

/// Shortest remaining lifetime a served token may have (1 hour)
pub const DEFAULT_MIN_VALIDITY_SECS: u64 = 3600;

/// Remaining lifetime at which the renewer steps in (1 day)
pub const DEFAULT_REFRESH_BUFFER_SECS: u64 = 86_400;

/// Lifetime assumed when the issuer does not report one (7 days)
pub const DEFAULT_TOKEN_LIFETIME_SECS: u64 = 604_800;

/// Thresholds deciding whether a credential is usable or due for renewal.
///
/// `refresh_buffer` is always larger than `min_validity`, so the background
/// renewer replaces a token well before consumers would have to block on a
/// synchronous refresh.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FreshnessPolicy {
    min_validity: Duration,
    refresh_buffer: Duration,
    default_lifetime_secs: u64,
}

impl Default for FreshnessPolicy {
    fn default() -> Self {
        Self::new(
            DEFAULT_MIN_VALIDITY_SECS,
            DEFAULT_REFRESH_BUFFER_SECS,
            DEFAULT_TOKEN_LIFETIME_SECS,
        )
    }
}

impl FreshnessPolicy {
    pub fn new(min_validity_secs: u64, refresh_buffer_secs: u64, default_lifetime_secs: u64) -> Self {
        Self {
            min_validity: secs(min_validity_secs),
            refresh_buffer: secs(refresh_buffer_secs),
            default_lifetime_secs,
        }
    }

    pub fn min_validity(&self) -> Duration {
        self.min_validity
    }

    pub fn refresh_buffer(&self) -> Duration {
        self.refresh_buffer
    }

    pub fn default_lifetime_secs(&self) -> u64 {
        self.default_lifetime_secs
    }

    /// True iff a credential is held and it outlives `min_validity` (strictly)
    pub fn is_usable(&self, snapshot: Option<&Credential>, now: DateTime<Utc>) -> bool {
        match snapshot {
            None => false,
            Some(credential) => credential.remaining(now) > self.min_validity,
        }
    }

    /// True iff nothing is held or less than `refresh_buffer` remains
    pub fn needs_proactive_refresh(&self, snapshot: Option<&Credential>, now: DateTime<Utc>) -> bool {
        match snapshot {
            None => true,
            Some(credential) => credential.remaining(now) < self.refresh_buffer,
        }
    }
}

fn secs(value: u64) -> Duration {
    Duration::seconds(i64::try_from(value).unwrap_or(i64::MAX).min(i64::MAX / 1_000))
}
