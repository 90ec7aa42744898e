//! Profile resolution and session bootstrap.
//!
//! Turns the config file, the active profile, and global flag overrides
//! into a `hgfeed_core::SessionConfig`, then resumes the profile's stored
//! session so commands run without asking for a password.

use std::time::Duration;

use tracing::debug;

use hgfeed_config::{
    Config, ConfigError, DEFAULT_PROFILE, Profile, SessionStore, load_config,
    profile_to_session_config,
};
use hgfeed_core::{AuthState, PollInterval, Session, SessionConfig};

use crate::cli::GlobalOpts;
use crate::error::CliError;

/// Name of the profile selected by `--profile`, the config, or the default.
pub fn active_profile_name(global: &GlobalOpts, cfg: &Config) -> String {
    global
        .profile
        .clone()
        .or_else(|| cfg.default_profile.clone())
        .unwrap_or_else(|| DEFAULT_PROFILE.into())
}

/// Build a `SessionConfig` from a profile with CLI flag overrides applied.
pub fn build_session_config(
    profile: &Profile,
    cfg: &Config,
    global: &GlobalOpts,
) -> Result<SessionConfig, CliError> {
    let mut profile = profile.clone();
    if let Some(ref base_url) = global.base_url {
        profile.base_url = Some(base_url.clone());
    }
    if global.insecure {
        profile.insecure = Some(true);
    }
    if let Some(timeout) = global.timeout {
        profile.timeout = Some(timeout);
    }
    Ok(profile_to_session_config(&profile, &cfg.defaults)?)
}

// ── Connected context ────────────────────────────────────────────────

/// A restored session plus where its refresh token is persisted.
pub struct CliContext {
    pub profile: String,
    pub session: Session,
    store: SessionStore,
}

impl CliContext {
    /// Load the active profile, resume its stored session, and make sure
    /// the access token is usable. `poll_secs` overrides the profile's
    /// poll interval.
    pub async fn connect(global: &GlobalOpts, poll_secs: Option<u64>) -> Result<Self, CliError> {
        let config = load_config()?;
        let profile_name = active_profile_name(global, &config);
        let profile = match config.profile(Some(&profile_name)) {
            Ok((_, profile)) => profile.clone(),
            Err(ConfigError::UnknownProfile { profile }) => {
                return Err(CliError::NotLoggedIn { profile });
            }
            Err(e) => return Err(e.into()),
        };

        let store = SessionStore::for_profile(&profile_name, &profile, &config.defaults);
        let persisted = store.load()?.ok_or_else(|| CliError::NotLoggedIn {
            profile: profile_name.clone(),
        })?;

        let mut session_config = build_session_config(&profile, &config, global)?;
        if let Some(secs) = poll_secs {
            session_config.poll_interval = PollInterval::from_secs(secs);
        }
        let session = Session::new(session_config)?;
        session.restore(persisted);

        let ctx = Self {
            profile: profile_name,
            session,
            store,
        };

        if let Err(e) = ctx.session.auth().ensure_valid_token().await {
            ctx.finish()?;
            return Err(CliError::from_core(e, &ctx.profile));
        }
        // The refresh rotates the token; persist it before doing anything else.
        ctx.finish()?;
        debug!(profile = %ctx.profile, "session restored");
        Ok(ctx)
    }

    /// Persist the current refresh token, or forget it if it was rejected.
    pub fn finish(&self) -> Result<(), CliError> {
        if self.session.auth().state() == AuthState::ReauthRequired {
            self.store.clear()?;
            return Ok(());
        }
        if let Some(persisted) = self.session.persisted_session() {
            self.store.save(&persisted)?;
        }
        Ok(())
    }

    /// Fill in the profile name on login hints.
    pub fn refine(&self, err: CliError) -> CliError {
        match err {
            CliError::ReauthRequired { .. } => CliError::ReauthRequired {
                profile: self.profile.clone(),
            },
            CliError::NotLoggedIn { .. } => CliError::NotLoggedIn {
                profile: self.profile.clone(),
            },
            other => other,
        }
    }

    /// Effective background poll interval.
    pub fn poll_interval(&self) -> Duration {
        self.session.config().poll_interval.get()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use clap::Parser;

    use super::*;
    use crate::cli::Cli;

    fn global(args: &[&str]) -> GlobalOpts {
        let mut argv = vec!["hgfeed"];
        argv.extend_from_slice(args);
        argv.push("devices");
        Cli::try_parse_from(argv).unwrap().global
    }

    #[test]
    fn profile_name_prefers_flag_then_config() {
        let mut cfg = Config::default();
        assert_eq!(active_profile_name(&global(&[]), &cfg), DEFAULT_PROFILE);

        cfg.default_profile = Some("home".into());
        assert_eq!(active_profile_name(&global(&[]), &cfg), "home");
        assert_eq!(active_profile_name(&global(&["-p", "work"]), &cfg), "work");
    }

    #[test]
    fn flags_override_profile_settings() {
        let cfg = Config::default();
        let profile = Profile {
            timeout: Some(30),
            ..Profile::default()
        };
        let session = build_session_config(
            &profile,
            &cfg,
            &global(&["--timeout", "3", "--insecure", "--base-url", "http://127.0.0.1:9/hsapi"]),
        )
        .unwrap();
        assert_eq!(session.operation_timeout, Duration::from_secs(3));
        assert_eq!(session.base_url, "http://127.0.0.1:9/hsapi");
        assert_eq!(session.tls, hgfeed_core::TlsVerification::DangerAcceptInvalid);
    }
}
