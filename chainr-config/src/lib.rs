//! Shared configuration loading for all four services: a YAML file merged
//! over built-in defaults, itself overridable by environment variables,
//! plus the `tracing` initialization every binary runs at startup.

use std::env;

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use tracing::level_filters::LevelFilter;
use tracing::warn;
use tracing_subscriber::EnvFilter;

pub use chainr_store::{RedisConfig, RedisTarget};

/// The env var naming a config file to merge over the built-in defaults.
/// Absent or unreadable, the defaults (and any environment overrides)
/// stand alone — a missing file is not a startup error.
pub const CONFIG_FILE_ENV: &str = "CONFIG_FILE";

/// The subset of configuration every chainr service recognizes (spec §6):
/// an HTTP port (only meaningful to the scheduler, but kept uniform across
/// binaries the way the original's four services each read the same
/// environment-driven settings independently), and the logging knobs every
/// binary uses to initialize `tracing`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub pretty_logging: bool,
}

fn default_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            log_level: default_log_level(),
            pretty_logging: false,
        }
    }
}

const DEFAULT_CONFIG: &str = r#"
port: 8080
log_level: info
pretty_logging: false
"#;

impl ServiceConfig {
    /// Merges the built-in defaults, the file named by `CONFIG_FILE` (if
    /// set and present), and `CHAINR_`-prefixed environment variables, in
    /// that order. A malformed-but-present file is a startup error; a
    /// missing one is not.
    pub fn load() -> Result<Self> {
        let mut figment = Figment::new().merge(Yaml::string(DEFAULT_CONFIG));

        if let Ok(path) = env::var(CONFIG_FILE_ENV) {
            figment = figment.merge(Yaml::file(&path));
        }

        figment = figment.merge(Env::prefixed("CHAINR_").split("__"));

        figment
            .extract()
            .context("failed to load service configuration")
    }
}

/// Initializes the global `tracing` subscriber: an `EnvFilter` seeded from
/// `log_level`, noisy dependency crates quieted, compact or JSON output
/// depending on `pretty`.
pub fn init_logger(log_level: &str, pretty: bool) -> Result<()> {
    let level: LevelFilter = log_level
        .parse()
        .context("could not parse 'log_level' configuration")?;

    let filter = EnvFilter::from_default_env()
        .add_directive("hyper=off".parse().expect("invalid directive"))
        .add_directive("rustls=off".parse().expect("invalid directive"))
        .add_directive("redis=off".parse().expect("invalid directive"))
        .add_directive("kube=off".parse().expect("invalid directive"))
        .add_directive("tower_http=off".parse().expect("invalid directive"))
        .add_directive(level.into());

    if pretty {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .compact()
            .init();
        warn!("pretty logging activated due to config value 'pretty_logging'");
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .json()
            .init();
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    #[test]
    #[serial]
    fn defaults_apply_with_no_file_or_env() {
        std::env::remove_var(CONFIG_FILE_ENV);
        let config = ServiceConfig::load().unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.log_level, "info");
        assert!(!config.pretty_logging);
    }

    #[test]
    #[serial]
    fn file_overrides_the_default_port() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "port: 9090").unwrap();
        std::env::set_var(CONFIG_FILE_ENV, file.path());
        let config = ServiceConfig::load().unwrap();
        assert_eq!(config.port, 9090);
        std::env::remove_var(CONFIG_FILE_ENV);
    }

    #[test]
    #[serial]
    fn missing_file_falls_back_to_defaults() {
        std::env::set_var(CONFIG_FILE_ENV, "/nonexistent/path/chainr.yaml");
        let config = ServiceConfig::load().unwrap();
        assert_eq!(config.port, 8080);
        std::env::remove_var(CONFIG_FILE_ENV);
    }
}
