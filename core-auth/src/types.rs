use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Seconds before the recorded expiry at which a token stops being used.
pub const EXPIRY_BUFFER_SECS: i64 = 60;

/// Expiry assumed when the token endpoint omits `expires_in`.
const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;

/// Longest lifetime accepted from a token endpoint (one year).
const MAX_EXPIRES_IN_SECS: i64 = 365 * 24 * 3600;

/// Usability of a credential at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialState {
    /// Not expired: the access token may be sent.
    Valid,
    /// Expired, but a refresh token can mint a new access token.
    Refreshable,
    /// Expired with no refresh token. Must never be used for a request.
    Invalid,
}

/// Access/refresh token pair with expiry.
///
/// This is also the persisted JSON layout:
/// `{"access_token", "refresh_token", "expiry", "scopes"}` with an RFC 3339
/// expiry. `token` is accepted as an alias of `access_token` and unknown keys
/// (`client_id`, `token_uri`, ...) are ignored when loading.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    #[serde(alias = "token")]
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub expiry: DateTime<Utc>,
    #[serde(default)]
    pub scopes: Vec<String>,
}

impl Credential {
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        expiry: DateTime<Utc>,
        scopes: Vec<String>,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token,
            expiry,
            scopes,
        }
    }

    /// Build a credential from a token endpoint reply.
    ///
    /// Refresh replies usually omit the refresh token; the previous one is
    /// kept in that case.
    pub fn from_grant(
        grant: TokenGrant,
        previous_refresh_token: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        let expires_in = grant
            .expires_in
            .unwrap_or(DEFAULT_EXPIRES_IN_SECS)
            .clamp(0, MAX_EXPIRES_IN_SECS);
        let scopes = grant
            .scope
            .as_deref()
            .map(|scope| scope.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default();

        Self {
            access_token: grant.access_token,
            refresh_token: grant.refresh_token.or(previous_refresh_token),
            expiry: now
                .checked_add_signed(Duration::seconds(expires_in))
                .unwrap_or(now),
            scopes,
        }
    }

    pub fn state_at(&self, now: DateTime<Utc>) -> CredentialState {
        let usable_until = self
            .expiry
            .checked_sub_signed(Duration::seconds(EXPIRY_BUFFER_SECS))
            .unwrap_or(self.expiry);
        if now < usable_until {
            CredentialState::Valid
        } else if self.has_refresh_token() {
            CredentialState::Refreshable
        } else {
            CredentialState::Invalid
        }
    }

    /// The access token, only while the credential is valid.
    pub fn usable_token(&self, now: DateTime<Utc>) -> Option<&str> {
        match self.state_at(now) {
            CredentialState::Valid => Some(&self.access_token),
            CredentialState::Refreshable | CredentialState::Invalid => None,
        }
    }

    pub fn has_refresh_token(&self) -> bool {
        self.refresh_token
            .as_deref()
            .is_some_and(|token| !token.is_empty())
    }
}

// Custom Debug implementation to avoid logging tokens
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"[REDACTED]")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("expiry", &self.expiry)
            .field("scopes", &self.scopes)
            .finish()
    }
}

/// JSON reply of the token endpoint.
#[derive(Clone, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
}

impl fmt::Debug for TokenGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenGrant")
            .field("access_token", &"[REDACTED]")
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("expires_in", &self.expires_in)
            .field("scope", &self.scope)
            .finish()
    }
}
