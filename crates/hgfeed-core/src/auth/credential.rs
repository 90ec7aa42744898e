// ── Credential storage ──
//
// The credential is replaced as a whole, never edited in place: readers
// get an `Arc<Credential>` that stays internally consistent even while a
// refresh installs its successor.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use arc_swap::ArcSwapOption;
use chrono::{DateTime, TimeDelta, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// The token pair for one account.
///
/// The password is never part of it.
#[derive(Debug)]
pub struct Credential {
    pub username: String,
    pub access_token: SecretString,
    pub refresh_token: SecretString,
    pub access_expiry: DateTime<Utc>,
    generation: u64,
}

impl Credential {
    /// Whether the access token may still be used at `now`.
    ///
    /// An empty token (restored session) is never fresh.
    pub fn is_fresh(&self, now: DateTime<Utc>, safety_margin: TimeDelta) -> bool {
        !self.access_token.expose_secret().is_empty()
            && self
                .access_expiry
                .checked_sub_signed(safety_margin)
                .is_some_and(|deadline| now < deadline)
    }

    /// Monotonic install counter; a refresh only proceeds if the stored
    /// credential still has the generation the caller saw.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// The part of the credential that may be written to disk.
    pub fn persisted(&self) -> PersistedSession {
        PersistedSession {
            username: self.username.clone(),
            refresh_token: self.refresh_token.clone(),
        }
    }
}

// ── Persisted session ────────────────────────────────────────────────

/// What survives a restart: the account and its refresh token.
#[derive(Debug, Clone)]
pub struct PersistedSession {
    pub username: String,
    pub refresh_token: SecretString,
}

#[derive(Serialize)]
struct PersistedRef<'a> {
    username: &'a str,
    refresh_token: &'a str,
}

#[derive(Deserialize)]
struct PersistedOwned {
    username: String,
    refresh_token: String,
}

impl Serialize for PersistedSession {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        PersistedRef {
            username: &self.username,
            refresh_token: self.refresh_token.expose_secret(),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for PersistedSession {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = PersistedOwned::deserialize(deserializer)?;
        Ok(Self {
            username: raw.username,
            refresh_token: SecretString::from(raw.refresh_token),
        })
    }
}

// ── Token store ──────────────────────────────────────────────────────

/// Holds at most one credential; swaps are atomic.
pub struct TokenStore {
    current: ArcSwapOption<Credential>,
    generation: AtomicU64,
}

impl TokenStore {
    pub fn new() -> Self {
        Self {
            current: ArcSwapOption::empty(),
            generation: AtomicU64::new(0),
        }
    }

    /// The stored credential, if any.
    pub fn current(&self) -> Option<Arc<Credential>> {
        self.current.load_full()
    }

    pub fn is_empty(&self) -> bool {
        self.current.load().is_none()
    }

    /// Replace the stored credential with a new token pair.
    pub(crate) fn install(
        &self,
        username: String,
        access_token: SecretString,
        refresh_token: SecretString,
        access_expiry: DateTime<Utc>,
    ) -> Arc<Credential> {
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let credential = Arc::new(Credential {
            username,
            access_token,
            refresh_token,
            access_expiry,
            generation,
        });
        self.current.store(Some(Arc::clone(&credential)));
        credential
    }

    pub(crate) fn clear(&self) {
        self.current.store(None);
    }
}

impl Default for TokenStore {
    fn default() -> Self {
        Self::new()
    }
}
