//! Login / logout handlers.

use std::io::BufRead;

use secrecy::SecretString;
use tracing::info;

use hgfeed_config::{SessionStore, load_config_or_default, save_config};
use hgfeed_core::Session;

use crate::cli::{GlobalOpts, LoginArgs};
use crate::context::{active_profile_name, build_session_config};
use crate::error::CliError;
use crate::output;

pub async fn login(args: LoginArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let mut cfg = load_config_or_default();
    let profile_name = active_profile_name(global, &cfg);
    let mut profile = cfg.profiles.get(&profile_name).cloned().unwrap_or_default();

    let username = args
        .username
        .filter(|u| !u.trim().is_empty())
        .or_else(|| Some(profile.username.clone()).filter(|u| !u.is_empty()))
        .ok_or_else(|| CliError::Validation {
            field: "username".into(),
            reason: "pass --username (or set it on the profile)".into(),
        })?;

    let password = read_password(args.password_stdin)?;

    let session = Session::new(build_session_config(&profile, &cfg, global)?)?;
    session
        .authenticate(&username, password)
        .await
        .map_err(|e| CliError::from_core(e, &profile_name))?;

    let persisted = session
        .persisted_session()
        .ok_or_else(|| CliError::Internal("login produced no session".into()))?;
    SessionStore::for_profile(&profile_name, &profile, &cfg.defaults).save(&persisted)?;

    profile.username.clone_from(&username);
    cfg.profiles.insert(profile_name.clone(), profile);
    if cfg.default_profile.is_none() {
        cfg.default_profile = Some(profile_name.clone());
    }
    save_config(&cfg)?;

    info!(profile = %profile_name, "logged in");
    output::print_output(
        &format!("Logged in as {username} (profile '{profile_name}')"),
        global.quiet,
    );
    Ok(())
}

pub fn logout(global: &GlobalOpts) -> Result<(), CliError> {
    let cfg = load_config_or_default();
    let profile_name = active_profile_name(global, &cfg);
    let Some(profile) = cfg.profiles.get(&profile_name) else {
        return Err(CliError::NotLoggedIn {
            profile: profile_name,
        });
    };

    SessionStore::for_profile(&profile_name, profile, &cfg.defaults).clear()?;
    output::print_output(
        &format!("Stored session for '{profile_name}' removed"),
        global.quiet,
    );
    Ok(())
}

fn read_password(from_stdin: bool) -> Result<SecretString, CliError> {
    let password = if from_stdin {
        let mut line = String::new();
        std::io::stdin().lock().read_line(&mut line)?;
        line.trim_end_matches(['\r', '\n']).to_owned()
    } else {
        rpassword::prompt_password("Password: ")?
    };

    if password.is_empty() {
        return Err(CliError::Validation {
            field: "password".into(),
            reason: "must not be empty".into(),
        });
    }
    Ok(SecretString::from(password))
}
