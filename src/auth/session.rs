//! In-process session state
//!
//! Holds the uid (and identity-service tokens) of the currently signed-in
//! user. The session lives only as long as the process: it is established
//! by a successful login or registration and cleared on logout. Writers are
//! the gateway's login paths and the reconciler's compensating logout; any
//! thread may read.

use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};

/// Tokens returned by the identity service alongside a sign-in
#[derive(Debug, Clone, Default)]
pub struct SessionTokens {
    pub id_token: Option<String>,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl SessionTokens {
    /// Build from an `expiresIn` seconds value as the identity service
    /// reports it
    pub fn new(
        id_token: Option<String>,
        refresh_token: Option<String>,
        expires_in_secs: Option<i64>,
    ) -> Self {
        let expires_at = expires_in_secs.map(|secs| Utc::now() + chrono::Duration::seconds(secs));
        Self {
            id_token,
            refresh_token,
            expires_at,
        }
    }

    /// Check if the id token is expired or about to expire
    ///
    /// Returns true if the token expires within the next 5 minutes
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(expires) => {
                let buffer = chrono::Duration::minutes(5);
                Utc::now() + buffer >= expires
            }
            None => false,
        }
    }
}

/// State of an active session
#[derive(Debug, Clone)]
pub struct SessionState {
    pub uid: String,
    pub tokens: SessionTokens,
}

impl SessionState {
    pub fn new(uid: impl Into<String>, tokens: SessionTokens) -> Self {
        Self {
            uid: uid.into(),
            tokens,
        }
    }
}

/// Shared handle to the session slot
///
/// Cheap to clone; all clones observe the same session.
#[derive(Clone, Default)]
pub struct SessionHandle {
    inner: Arc<Mutex<Option<SessionState>>>,
}

impl SessionHandle {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<SessionState>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Install the session for a freshly signed-in user
    pub fn establish(&self, state: SessionState) {
        tracing::debug!(uid = %state.uid, "session established");
        *self.lock() = Some(state);
    }

    /// Drop the session. Idempotent.
    pub fn clear(&self) {
        let mut slot = self.lock();
        if slot.is_some() {
            tracing::debug!("session cleared");
        }
        *slot = None;
    }

    /// Uid of the signed-in user, if any
    pub fn current_uid(&self) -> Option<String> {
        self.lock().as_ref().map(|s| s.uid.clone())
    }

    pub fn is_signed_in(&self) -> bool {
        self.lock().is_some()
    }
}
