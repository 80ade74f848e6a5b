//! Credential and token-lifecycle state for the upstream session.

use std::time::Instant;

/// Bearer-token credentials for the upstream venue session.
///
/// Invariant: if `authenticated` is `true`, `token_expiry` is meaningful and
/// `refresh_token` is `Some`.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub api_key: String,
    pub api_secret: String,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub token_expiry: Option<Instant>,
    pub authenticated: bool,
}

impl Credentials {
    /// Creates fresh, unauthenticated credentials from an API key/secret pair.
    pub fn new(api_key: impl Into<String>, api_secret: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_secret: api_secret.into(),
            access_token: None,
            refresh_token: None,
            token_expiry: None,
            authenticated: false,
        }
    }

    /// Records a successful auth/refresh grant.
    pub fn apply_grant(
        &mut self,
        access_token: String,
        refresh_token: String,
        expires_in_secs: u64,
    ) {
        self.access_token = Some(access_token);
        self.refresh_token = Some(refresh_token);
        self.token_expiry = Some(Instant::now() + std::time::Duration::from_secs(expires_in_secs));
        self.authenticated = true;
    }

    /// Marks the session unauthenticated, e.g. after a failed refresh.
    pub fn invalidate(&mut self) {
        self.authenticated = false;
    }

    /// Whether the current access token has passed its expiry instant.
    pub fn is_expired(&self) -> bool {
        match self.token_expiry {
            Some(expiry) => Instant::now() >= expiry,
            None => true,
        }
    }
}
