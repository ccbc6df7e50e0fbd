//! Command-line arguments for the `palaver` binary.
//!
//! Priority resolution: CLI args > env vars > config file > defaults.

use clap::Parser;
use std::path::PathBuf;

/// Palaver: a slash-command chat console with topic-scoped history.
#[derive(Parser, Debug)]
#[command(name = "palaver", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Data directory for topic histories and user records.
    #[arg(short = 'd', long = "data-dir")]
    pub data_dir: Option<PathBuf>,

    /// User id whose history this session reads and writes.
    #[arg(short = 'u', long = "user", default_value = "local")]
    pub user: String,

    /// Display name stored for a newly registered user.
    #[arg(long = "username")]
    pub username: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level")]
    pub log_level: Option<String>,

    /// Do not write the heartbeat file.
    #[arg(long = "no-heartbeat")]
    pub no_heartbeat: bool,
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > PALAVER_CONFIG env var > ~/.palaver/config.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("PALAVER_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// Data directory override, if given.
    pub fn resolve_data_dir(&self) -> Option<String> {
        self.data_dir
            .as_ref()
            .map(|p| p.to_string_lossy().to_string())
    }

    /// Log level override, if given.
    pub fn resolve_log_level(&self) -> Option<String> {
        self.log_level.clone()
    }

    /// Username to register, falling back to the user id.
    pub fn resolve_username(&self) -> &str {
        self.username.as_deref().unwrap_or(&self.user)
    }
}

/// Default config file path for the current platform.
fn default_config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    if let Ok(home) = std::env::var("USERPROFILE") {
        return PathBuf::from(home).join(".palaver").join("config.toml");
    }
    #[cfg(not(target_os = "windows"))]
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".palaver").join("config.toml");
    }
    PathBuf::from("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = CliArgs::try_parse_from(["palaver"]).unwrap();
        assert_eq!(args.user, "local");
        assert_eq!(args.resolve_username(), "local");
        assert!(args.resolve_data_dir().is_none());
        assert!(args.resolve_log_level().is_none());
        assert!(!args.no_heartbeat);
    }

    #[test]
    fn test_config_flag_wins() {
        let args = CliArgs::try_parse_from(["palaver", "-c", "/tmp/p.toml"]).unwrap();
        assert_eq!(args.resolve_config_path(), PathBuf::from("/tmp/p.toml"));
    }

    #[test]
    fn test_overrides() {
        let args = CliArgs::try_parse_from([
            "palaver",
            "--data-dir",
            "/srv/palaver",
            "--user",
            "42",
            "--username",
            "ada",
            "-l",
            "debug",
            "--no-heartbeat",
        ])
        .unwrap();
        assert_eq!(args.resolve_data_dir().as_deref(), Some("/srv/palaver"));
        assert_eq!(args.user, "42");
        assert_eq!(args.resolve_username(), "ada");
        assert_eq!(args.resolve_log_level().as_deref(), Some("debug"));
        assert!(args.no_heartbeat);
    }
}
