//! CLI-side configuration: merges the profile file with global flags and
//! builds the client.

use std::path::PathBuf;
use std::time::Duration;

use tracing::debug;

use ringalarm_api::{RingClient, SessionConfig};
use ringalarm_config::{Config, Profile};

use crate::cli::GlobalOpts;
use crate::error::CliError;

pub use ringalarm_config::{config_path, load_config_or_default};

/// Profile selected by `--profile`, the file's default, or "default".
pub fn active_profile_name(global: &GlobalOpts, cfg: &Config) -> String {
    ringalarm_config::active_profile_name(cfg, global.profile.as_deref())
}

/// Everything needed to start a client.
pub struct Resolved {
    pub profile_name: String,
    pub session: SessionConfig,
    pub cache_dir: PathBuf,
}

/// Resolve the active profile (or env-only credentials) plus flag overrides.
pub fn resolve(global: &GlobalOpts) -> Result<Resolved, CliError> {
    let cfg = load_config_or_default();
    let profile_name = active_profile_name(global, &cfg);

    // No profile: fall back to RINGALARM_USERNAME / RINGALARM_PASSWORD.
    let profile = cfg.profiles.get(&profile_name).cloned().unwrap_or_else(|| {
        debug!(profile = %profile_name, "profile not in config, using environment only");
        Profile::default()
    });

    let mut session =
        ringalarm_config::profile_to_session_config(&profile, &profile_name, &cfg.defaults)?;
    if let Some(timeout) = global.timeout {
        if timeout == 0 {
            return Err(CliError::Validation {
                field: "timeout".into(),
                reason: "must be greater than zero".into(),
            });
        }
        session.timeout = Duration::from_secs(timeout);
    }
    if let Some(retries) = global.retries {
        session.retries = retries;
    }

    let cache_dir = global
        .cache_dir
        .clone()
        .unwrap_or_else(|| ringalarm_config::cache_dir(&profile, &cfg.defaults));

    Ok(Resolved {
        profile_name,
        session,
        cache_dir,
    })
}

/// Build a client for the active profile.
pub fn build_client(global: &GlobalOpts) -> Result<RingClient, CliError> {
    let resolved = resolve(global)?;
    debug!(
        profile = %resolved.profile_name,
        cache_dir = %resolved.cache_dir.display(),
        "starting client"
    );
    RingClient::with_file_cache(resolved.session, resolved.cache_dir).map_err(CliError::from)
}
