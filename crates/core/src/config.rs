use crate::report::OutputFormat;
use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Defaults read from `config.toml`. Command-line flags and environment variables can only
/// switch these on.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AppConfig {
    pub dryrun: bool,
    pub silent: bool,
    pub null_separator: bool,
    pub verbose: bool,
    pub output: OutputFormat,
}

#[derive(Debug, Clone)]
pub struct AppPaths {
    pub config_dir: PathBuf,
    pub config_path: PathBuf,
}

pub fn app_paths() -> Result<AppPaths> {
    let proj = ProjectDirs::from("", "", "tmplmv")
        .context("cannot determine the user config directory")?;
    let config_dir = proj.config_dir().to_path_buf();
    Ok(AppPaths {
        config_path: config_dir.join("config.toml"),
        config_dir,
    })
}

/// Loads `explicit` if given (it must exist), otherwise the per-user config file if present.
pub fn load_config(explicit: Option<&Path>) -> Result<AppConfig> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => {
            let Ok(paths) = app_paths() else {
                return Ok(AppConfig::default());
            };
            if !paths.config_path.exists() {
                return Ok(AppConfig::default());
            }
            paths.config_path
        }
    };

    let raw = fs::read_to_string(&path)
        .with_context(|| format!("cannot read config file: {}", path.display()))?;
    parse_config(&raw).with_context(|| format!("invalid config file: {}", path.display()))
}

pub fn parse_config(raw: &str) -> Result<AppConfig> {
    let config = toml::from_str::<AppConfig>(raw).context("cannot parse config TOML")?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::{load_config, parse_config, AppConfig};
    use crate::report::OutputFormat;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn parse_config_fills_missing_keys_with_defaults() {
        let config = parse_config("dryrun = true\noutput = \"json\"\n").expect("parse");
        assert_eq!(
            config,
            AppConfig {
                dryrun: true,
                output: OutputFormat::Json,
                ..AppConfig::default()
            }
        );
    }

    #[test]
    fn parse_config_rejects_bad_values() {
        assert!(parse_config("output = \"xml\"").is_err());
        assert!(parse_config("silent = 3").is_err());
    }

    #[test]
    fn load_config_reads_explicit_file() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("tmplmv.toml");
        fs::write(&path, "null_separator = true\n").expect("write");

        let config = load_config(Some(&path)).expect("load");
        assert!(config.null_separator);
        assert!(!config.silent);
    }

    #[test]
    fn load_config_fails_for_missing_explicit_file() {
        let temp = tempdir().expect("tempdir");
        let err = load_config(Some(&temp.path().join("nope.toml"))).expect_err("must fail");
        assert!(err.to_string().contains("cannot read config file"));
    }
}
