//! Token record: the OAuth access/refresh pair and its expiry rules.

use std::fmt;

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::time::Timestamp;

/// Tokens are treated as expired this long before their actual expiry.
pub const REFRESH_MARGIN: TimeDelta = TimeDelta::minutes(5);

/// Lifetime granted to a refresh token each time it is used.
pub const DEFAULT_REFRESH_TOKEN_LIFETIME: TimeDelta = TimeDelta::days(30);

/// Lifetime assumed for a bootstrap access token whose expiry is unknown.
pub const DEFAULT_ACCESS_TOKEN_LIFETIME: TimeDelta = TimeDelta::hours(24);

/// Upper bound applied to every granted lifetime. Keeps expiry timestamps
/// inside the range storage can encode.
pub const MAX_TOKEN_LIFETIME: TimeDelta = TimeDelta::days(3650);

/// The single credential pair the bridge authorizes remote calls with.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: Timestamp,
    pub refresh_token_expires_at: Timestamp,
}

impl fmt::Debug for TokenRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenRecord")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .field("refresh_token_expires_at", &self.refresh_token_expires_at)
            .finish()
    }
}

impl TokenRecord {
    /// Build a record from a successful token exchange.
    ///
    /// When the grant does not rotate the refresh token, `previous_refresh`
    /// is kept. The refresh token lifetime restarts at `now`.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::EmptyToken`] when neither the grant nor
    /// `previous_refresh` carries a refresh token, or the access token is
    /// empty.
    pub fn from_grant(
        grant: TokenGrant,
        previous_refresh: Option<&str>,
        now: Timestamp,
        refresh_lifetime: TimeDelta,
    ) -> Result<Self, ValidationError> {
        let refresh_token = grant
            .refresh_token
            .filter(|t| !t.is_empty())
            .or_else(|| previous_refresh.map(ToString::to_string))
            .ok_or(ValidationError::EmptyToken("refresh_token"))?;
        let record = Self {
            access_token: grant.access_token,
            refresh_token,
            expires_at: expiry(now, access_lifetime(grant.expires_in)),
            refresh_token_expires_at: expiry(now, refresh_lifetime),
        };
        record.validate()?;
        Ok(record)
    }

    /// Build a record from an out-of-band bootstrap credential whose expiry
    /// is unknown.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::EmptyToken`] when a token is empty.
    pub fn bootstrap(
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        now: Timestamp,
    ) -> Result<Self, ValidationError> {
        let record = Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            expires_at: now + DEFAULT_ACCESS_TOKEN_LIFETIME,
            refresh_token_expires_at: now + DEFAULT_REFRESH_TOKEN_LIFETIME,
        };
        record.validate()?;
        Ok(record)
    }

    /// Check domain invariants.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::EmptyToken`] when a token is empty.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.access_token.is_empty() {
            return Err(ValidationError::EmptyToken("access_token"));
        }
        if self.refresh_token.is_empty() {
            return Err(ValidationError::EmptyToken("refresh_token"));
        }
        Ok(())
    }

    /// `now < expires_at - margin`.
    #[must_use]
    pub fn is_access_token_valid_at(&self, now: Timestamp) -> bool {
        now < self.expires_at - REFRESH_MARGIN
    }

    /// `now < refresh_token_expires_at - margin`.
    #[must_use]
    pub fn is_refresh_token_valid_at(&self, now: Timestamp) -> bool {
        now < self.refresh_token_expires_at - REFRESH_MARGIN
    }
}

fn access_lifetime(expires_in: u64) -> TimeDelta {
    i64::try_from(expires_in)
        .ok()
        .and_then(TimeDelta::try_seconds)
        .unwrap_or(MAX_TOKEN_LIFETIME)
}

fn expiry(now: Timestamp, lifetime: TimeDelta) -> Timestamp {
    let lifetime = lifetime.clamp(TimeDelta::zero(), MAX_TOKEN_LIFETIME);
    now.checked_add_signed(lifetime).unwrap_or(now)
}

/// Successful response of the token endpoint.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Access token lifetime in seconds.
    pub expires_in: u64,
}

impl fmt::Debug for TokenGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenGrant")
            .field("expires_in", &self.expires_in)
            .finish_non_exhaustive()
    }
}
