//! Config subcommand handlers.

use ringalarm_config::{Profile, load_config_or_default, save_config, store_password};

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts, InitArgs};
use crate::config::{self, active_profile_name};
use crate::error::CliError;

/// Map an interactive I/O failure into CliError.
fn prompt_err(e: impl std::fmt::Display) -> CliError {
    CliError::Validation {
        field: "interactive".into(),
        reason: format!("prompt failed: {e}"),
    }
}

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Path => {
            println!("{}", config::config_path().display());
            Ok(())
        }

        ConfigCommand::Show => {
            let mut cfg = load_config_or_default();
            for profile in cfg.profiles.values_mut() {
                if profile.password.is_some() {
                    profile.password = Some("<redacted>".into());
                }
            }
            let rendered = toml::to_string_pretty(&cfg).map_err(|e| CliError::Config(e.to_string()))?;
            print!("{rendered}");
            Ok(())
        }

        ConfigCommand::Init(init) => init_profile(init, global),

        ConfigCommand::SetPassword => {
            let cfg = load_config_or_default();
            let profile_name = active_profile_name(global, &cfg);
            let password = rpassword::prompt_password(format!("Ring password for '{profile_name}': "))
                .map_err(prompt_err)?;
            if password.is_empty() {
                return Err(CliError::Validation {
                    field: "password".into(),
                    reason: "password cannot be empty".into(),
                });
            }
            store_password(&profile_name, &password)?;
            eprintln!("Password for '{profile_name}' stored in system keyring");
            Ok(())
        }
    }
}

fn init_profile(init: InitArgs, global: &GlobalOpts) -> Result<(), CliError> {
    if init.username.trim().is_empty() {
        return Err(CliError::Validation {
            field: "username".into(),
            reason: "username cannot be empty".into(),
        });
    }

    let mut cfg = load_config_or_default();
    let profile_name = global.profile.clone().unwrap_or_else(|| "default".into());

    let profile = cfg.profiles.entry(profile_name.clone()).or_insert_with(Profile::default);
    profile.username = Some(init.username);
    profile.password_env = init.password_env;

    if init.default || cfg.profiles.len() == 1 {
        cfg.default_profile = Some(profile_name.clone());
    }

    let path = save_config(&cfg)?;
    eprintln!("Profile '{profile_name}' written to {}", path.display());
    if cfg.profiles.get(&profile_name).is_some_and(|p| p.password_env.is_none()) {
        eprintln!("Store the password with: ringalarm config set-password --profile {profile_name}");
    }
    Ok(())
}
