//! Config subcommand handlers. None of these touch the network.

use serde::Serialize;
use tabled::Tabled;

use hgfeed_config::{ConfigError, Profile, SessionStore, config_path, load_config};

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts, OutputFormat};
use crate::context::active_profile_name;
use crate::error::CliError;
use crate::output;

#[derive(Serialize)]
struct ProfileSummary {
    name: String,
    username: String,
    active: bool,
    session_store: String,
}

#[derive(Tabled)]
struct ProfileRow {
    #[tabled(rename = "")]
    marker: String,
    #[tabled(rename = "Profile")]
    name: String,
    #[tabled(rename = "Username")]
    username: String,
    #[tabled(rename = "Session")]
    session_store: String,
}

fn store_label(store: &SessionStore) -> String {
    match store {
        SessionStore::Keyring { .. } => "keyring".into(),
        SessionStore::File(path) => path.display().to_string(),
    }
}

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Path => {
            output::print_output(&config_path().display().to_string(), global.quiet);
            Ok(())
        }

        ConfigCommand::Show => {
            let cfg = load_config()?;
            let rendered = match global.output {
                OutputFormat::Table | OutputFormat::Plain => {
                    toml::to_string_pretty(&cfg).map_err(ConfigError::from)?
                }
                ref format => output::render_single(format, &cfg, |_| String::new(), |_| String::new()),
            };
            output::print_output(&rendered, global.quiet);
            Ok(())
        }

        ConfigCommand::Profiles => {
            let cfg = load_config()?;
            let active = active_profile_name(global, &cfg);
            let mut names: Vec<(&String, &Profile)> = cfg.profiles.iter().collect();
            names.sort_by(|a, b| a.0.cmp(b.0));

            let summaries: Vec<ProfileSummary> = names
                .into_iter()
                .map(|(name, profile)| ProfileSummary {
                    name: name.clone(),
                    username: profile.username.clone(),
                    active: *name == active,
                    session_store: store_label(&SessionStore::for_profile(
                        name,
                        profile,
                        &cfg.defaults,
                    )),
                })
                .collect();

            let out = output::render_list(
                &global.output,
                &summaries,
                |s| ProfileRow {
                    marker: if s.active { "*".into() } else { String::new() },
                    name: s.name.clone(),
                    username: s.username.clone(),
                    session_store: s.session_store.clone(),
                },
                |s| s.name.clone(),
            );
            output::print_output(&out, global.quiet);
            Ok(())
        }
    }
}
