// ── Persisted session storage ──
//
// Only `{username, refresh_token}` is ever written. The system keyring is
// the default; a TOML file (mode 0600 on Unix) is the fallback for
// headless hosts without a secret service.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::debug;

use hgfeed_core::PersistedSession;

use crate::{ConfigError, Defaults, Profile, default_session_file};

const KEYRING_SERVICE: &str = "hgfeed";

/// Where a profile's refresh token is kept.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionBackend {
    #[default]
    Keyring,
    File,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStore {
    Keyring { account: String },
    File(PathBuf),
}

impl SessionStore {
    /// The store configured for `profile_name`.
    pub fn for_profile(profile_name: &str, profile: &Profile, defaults: &Defaults) -> Self {
        match profile.session_store.unwrap_or(defaults.session_store) {
            SessionBackend::Keyring => Self::Keyring {
                account: format!("{profile_name}/session"),
            },
            SessionBackend::File => Self::File(
                profile
                    .session_file
                    .clone()
                    .unwrap_or_else(|| default_session_file(profile_name)),
            ),
        }
    }

    /// The stored session, or `None` if nothing was saved.
    pub fn load(&self) -> Result<Option<PersistedSession>, ConfigError> {
        let raw = match self {
            Self::Keyring { account } => match keyring::Entry::new(KEYRING_SERVICE, account)?
                .get_password()
            {
                Ok(raw) => raw,
                Err(keyring::Error::NoEntry) => return Ok(None),
                Err(e) => return Err(e.into()),
            },
            Self::File(path) => match std::fs::read_to_string(path) {
                Ok(raw) => raw,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
                Err(e) => return Err(e.into()),
            },
        };
        Ok(Some(toml::from_str(&raw)?))
    }

    pub fn save(&self, session: &PersistedSession) -> Result<(), ConfigError> {
        let raw = toml::to_string(session)?;
        match self {
            Self::Keyring { account } => {
                keyring::Entry::new(KEYRING_SERVICE, account)?.set_password(&raw)?;
            }
            Self::File(path) => {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                write_private(path, &raw)?;
            }
        }
        debug!(username = %session.username, "session saved");
        Ok(())
    }

    /// Remove the stored session. Clearing an empty store is not an error.
    pub fn clear(&self) -> Result<(), ConfigError> {
        match self {
            Self::Keyring { account } => {
                match keyring::Entry::new(KEYRING_SERVICE, account)?.delete_credential() {
                    Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
                    Err(e) => Err(e.into()),
                }
            }
            Self::File(path) => match std::fs::remove_file(path) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(e.into()),
            },
        }
    }
}

#[cfg(unix)]
fn write_private(path: &std::path::Path, contents: &str) -> std::io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
    file.write_all(contents.as_bytes())
}

#[cfg(not(unix))]
fn write_private(path: &std::path::Path, contents: &str) -> std::io::Result<()> {
    std::fs::write(path, contents)
}
