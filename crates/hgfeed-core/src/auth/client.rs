// ── AuthClient ──
//
// Owns the credential lifecycle for one account. States:
//
//   Unauthenticated --login--> Authenticated --expiry--> RefreshPending
//        ^                          ^                        |
//        |                          +-------- ok ------------+
//        +---- logout ----- ReauthRequired <-- token dead ---+
//
// Refresh is single-flight: the refresh lock is held across the network
// call and the caller's observed credential generation is re-checked after
// acquiring it, so concurrent callers that saw the same expired token
// issue one request between them.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tokio::sync::{Mutex, watch};
use tracing::{debug, info, warn};

use hgfeed_api::FeederClient;
use hgfeed_api::models::TokenGrant;

use super::credential::{Credential, PersistedSession, TokenStore};
use crate::error::CoreError;

/// Credential lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AuthState {
    /// No credential; `authenticate` or `restore` first.
    Unauthenticated,
    /// A credential is installed (its access token may be near expiry).
    Authenticated,
    /// A refresh request is in flight.
    RefreshPending,
    /// The refresh token was rejected; only a password login recovers.
    ReauthRequired,
}

pub struct AuthClient {
    api: FeederClient,
    store: TokenStore,
    state: watch::Sender<AuthState>,
    persisted: watch::Sender<Option<PersistedSession>>,
    refresh_lock: Mutex<()>,
    safety_margin: TimeDelta,
    default_lifetime: TimeDelta,
}

impl AuthClient {
    pub fn new(api: FeederClient, safety_margin: Duration, default_lifetime: Duration) -> Self {
        let (state, _) = watch::channel(AuthState::Unauthenticated);
        let (persisted, _) = watch::channel(None);
        Self {
            api,
            store: TokenStore::new(),
            state,
            persisted,
            refresh_lock: Mutex::new(()),
            safety_margin: to_delta(safety_margin),
            default_lifetime: to_delta(default_lifetime),
        }
    }

    // ── Observation ──────────────────────────────────────────────────

    pub fn state(&self) -> AuthState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<AuthState> {
        self.state.subscribe()
    }

    /// Yields the persistable part of every newly installed credential,
    /// and `None` when the store is cleared.
    pub fn subscribe_persisted(&self) -> watch::Receiver<Option<PersistedSession>> {
        self.persisted.subscribe()
    }

    pub fn store(&self) -> &TokenStore {
        &self.store
    }

    pub fn persisted_session(&self) -> Option<PersistedSession> {
        self.store.current().map(|c| c.persisted())
    }

    // ── Transitions ──────────────────────────────────────────────────

    /// Exchange username and password for a token pair.
    ///
    /// The password is dropped when this returns, success or failure.
    pub async fn authenticate(
        &self,
        username: &str,
        password: SecretString,
    ) -> Result<Arc<Credential>, CoreError> {
        let _guard = self.refresh_lock.lock().await;

        let grant = self
            .api
            .login(username, &password)
            .await
            .map_err(login_error)?;
        drop(password);

        let credential = self.install(username.to_owned(), grant);
        self.state.send_replace(AuthState::Authenticated);
        info!(username, "logged in to HGSmart cloud");
        Ok(credential)
    }

    /// Seed the store from a persisted session.
    ///
    /// No access token is known, so the first call performs a refresh.
    pub fn restore(&self, session: PersistedSession) {
        debug!(username = %session.username, "restoring persisted session");
        self.install_parts(
            session.username,
            SecretString::from(String::new()),
            session.refresh_token,
            Utc::now(),
        );
        self.state.send_replace(AuthState::Authenticated);
    }

    /// Drop the credential and return to `Unauthenticated`.
    pub async fn logout(&self) {
        let _guard = self.refresh_lock.lock().await;
        self.store.clear();
        self.persisted.send_replace(None);
        self.state.send_replace(AuthState::Unauthenticated);
        info!("logged out");
    }

    /// A valid access token, refreshing first if the stored one is within
    /// the safety margin of expiry.
    pub async fn ensure_valid_token(&self) -> Result<SecretString, CoreError> {
        Ok(self.valid_credential().await?.access_token.clone())
    }

    /// Unconditionally exchange the current refresh token.
    pub async fn refresh(&self) -> Result<Arc<Credential>, CoreError> {
        let observed = self.current()?;
        self.refresh_from(observed.generation()).await
    }

    pub(crate) async fn valid_credential(&self) -> Result<Arc<Credential>, CoreError> {
        let credential = self.current()?;
        if credential.is_fresh(Utc::now(), self.safety_margin) {
            return Ok(credential);
        }
        debug!("access token at or near expiry, refreshing");
        self.refresh_from(credential.generation()).await
    }

    /// Refresh unless the credential with `observed_generation` has already
    /// been replaced, in which case the replacement is returned.
    pub(crate) async fn refresh_from(
        &self,
        observed_generation: u64,
    ) -> Result<Arc<Credential>, CoreError> {
        let _guard = self.refresh_lock.lock().await;

        let current = self.current()?;
        if current.generation() != observed_generation {
            debug!("credential already renewed by a concurrent caller");
            return Ok(current);
        }

        self.state.send_replace(AuthState::RefreshPending);

        let access = Some(&current.access_token).filter(|t| !t.expose_secret().is_empty());
        match self.api.refresh(access, &current.refresh_token).await {
            Ok(grant) => {
                let renewed = self.install(current.username.clone(), grant);
                self.state.send_replace(AuthState::Authenticated);
                info!(username = %current.username, "access token refreshed");
                Ok(renewed)
            }
            Err(e) if refresh_token_rejected(&e) => {
                warn!(error = %e, "refresh token rejected, re-authentication required");
                self.store.clear();
                self.persisted.send_replace(None);
                self.state.send_replace(AuthState::ReauthRequired);
                Err(CoreError::ReauthenticationRequired)
            }
            Err(e) => {
                // The old pair is still valid as far as we know.
                warn!(error = %e, "token refresh failed");
                self.state.send_replace(AuthState::Authenticated);
                Err(CoreError::NetworkError {
                    message: format!("token refresh failed: {e}"),
                })
            }
        }
    }

    // ── Private helpers ──────────────────────────────────────────────

    fn current(&self) -> Result<Arc<Credential>, CoreError> {
        self.store.current().ok_or_else(|| match self.state() {
            AuthState::ReauthRequired => CoreError::ReauthenticationRequired,
            _ => CoreError::NotAuthenticated,
        })
    }

    fn install(&self, username: String, grant: TokenGrant) -> Arc<Credential> {
        let lifetime = grant
            .expires_in
            .and_then(TimeDelta::try_seconds)
            .unwrap_or(self.default_lifetime);
        let expiry = Utc::now()
            .checked_add_signed(lifetime)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        self.install_parts(username, grant.access_token, grant.refresh_token, expiry)
    }

    fn install_parts(
        &self,
        username: String,
        access_token: SecretString,
        refresh_token: SecretString,
        access_expiry: DateTime<Utc>,
    ) -> Arc<Credential> {
        let credential = self
            .store
            .install(username, access_token, refresh_token, access_expiry);
        self.persisted.send_replace(Some(credential.persisted()));
        credential
    }
}

/// The cloud refused the refresh token itself, as opposed to being
/// unreachable or failing internally.
fn refresh_token_rejected(err: &hgfeed_api::Error) -> bool {
    match err {
        hgfeed_api::Error::Unauthorized { .. } => true,
        hgfeed_api::Error::Vendor { .. } => !err.is_transient(),
        hgfeed_api::Error::Http { status, .. } => matches!(status, 400 | 401 | 403),
        _ => false,
    }
}

fn login_error(err: hgfeed_api::Error) -> CoreError {
    if err.is_transient() {
        return CoreError::NetworkError {
            message: err.to_string(),
        };
    }
    match err {
        hgfeed_api::Error::Unauthorized { message }
        | hgfeed_api::Error::Vendor { message, .. } => CoreError::InvalidCredentials { message },
        hgfeed_api::Error::Http { status, message } if (400..500).contains(&status) => {
            CoreError::InvalidCredentials {
                message: format!("HTTP {status}: {message}"),
            }
        }
        other => other.into(),
    }
}

fn to_delta(duration: Duration) -> TimeDelta {
    TimeDelta::from_std(duration).unwrap_or(TimeDelta::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refresh_rejection_classification() {
        assert!(refresh_token_rejected(&hgfeed_api::Error::Unauthorized {
            message: String::new()
        }));
        assert!(refresh_token_rejected(&hgfeed_api::Error::Vendor {
            code: 10_002,
            message: "refresh token invalid".into(),
        }));
        assert!(!refresh_token_rejected(&hgfeed_api::Error::Vendor {
            code: 503,
            message: "busy".into(),
        }));
        assert!(!refresh_token_rejected(&hgfeed_api::Error::Http {
            status: 502,
            message: String::new(),
        }));
    }

    #[test]
    fn login_rejections_are_invalid_credentials() {
        let err = login_error(hgfeed_api::Error::Vendor {
            code: 500_101,
            message: "wrong password".into(),
        });
        assert!(matches!(err, CoreError::InvalidCredentials { .. }));

        let err = login_error(hgfeed_api::Error::Http {
            status: 504,
            message: String::new(),
        });
        assert!(matches!(err, CoreError::NetworkError { .. }));
    }

    #[test]
    fn state_names_are_snake_case() {
        assert_eq!(AuthState::ReauthRequired.to_string(), "reauth_required");
    }
}
