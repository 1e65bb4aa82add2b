use anyhow::{Context, Result};
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

const DEFAULT_CONFIG_FILE: &str = "ipam.toml";

/// Runtime configuration, layered as defaults < TOML file < `IPAM_*` environment.
///
/// The TOML file is `ipam.toml` in the working directory unless `IPAM_CONFIG` names another
/// one. Parent directories are not searched, and a missing file is not an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding record and lock files.
    pub data_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
        }
    }
}

impl Config {
    pub fn figment() -> Figment {
        let file = env::var("IPAM_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());

        Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file_exact(file))
            .merge(Env::prefixed("IPAM_").ignore(&["config"]))
    }

    pub fn load() -> Result<Self> {
        Self::figment()
            .extract()
            .context("Failed to load configuration")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn defaults_to_relative_data_dir() {
        Jail::expect_with(|_jail| {
            assert_eq!(Config::load().expect("config"), Config::default());
            Ok(())
        });
    }

    #[test]
    fn file_then_environment_override_defaults() {
        Jail::expect_with(|jail| {
            jail.create_file("ipam.toml", r#"data_dir = "/var/lib/ipam""#)?;
            assert_eq!(
                Config::load().expect("config").data_dir,
                PathBuf::from("/var/lib/ipam")
            );

            jail.set_env("IPAM_DATA_DIR", "/run/ipam");
            assert_eq!(
                Config::load().expect("config").data_dir,
                PathBuf::from("/run/ipam")
            );
            Ok(())
        });
    }

    #[test]
    fn parent_directory_config_is_ignored() {
        Jail::expect_with(|jail| {
            jail.create_file("ipam.toml", r#"data_dir = "from-parent""#)?;
            std::fs::create_dir("sub").expect("subdirectory");
            jail.change_dir("sub")?;
            assert_eq!(Config::load().expect("config"), Config::default());
            Ok(())
        });
    }

    #[test]
    fn config_file_location_can_be_overridden() {
        Jail::expect_with(|jail| {
            jail.create_file("other.toml", r#"data_dir = "elsewhere""#)?;
            jail.set_env("IPAM_CONFIG", "other.toml");
            assert_eq!(
                Config::load().expect("config").data_dir,
                PathBuf::from("elsewhere")
            );
            Ok(())
        });
    }
}
