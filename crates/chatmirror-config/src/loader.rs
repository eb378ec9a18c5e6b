//! Configuration loader.

use std::fs;
use std::path::{Path, PathBuf};

use regex::{Captures, Regex};

use crate::error::ConfigError;
use crate::schema::Config;

/// Reads `chatmirror.toml`, substituting `${VAR}` from the environment and
/// resolving `~` in path settings.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Read and parse the file at `path`.
    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        if !path.is_file() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        Self::load_str(&fs::read_to_string(path)?)
    }

    /// Parse TOML text.
    pub fn load_str(content: &str) -> Result<Config, ConfigError> {
        let substituted = Self::substitute_env(content)?;
        let mut config: Config = toml::from_str(&substituted)?;
        Self::expand_paths(&mut config);
        Ok(config)
    }

    /// Load `path` if it exists, otherwise fall back to defaults.
    ///
    /// Only used for the implicit default path; a path the user named
    /// explicitly goes through [`ConfigLoader::load`] so a typo is reported.
    pub fn load_or_default(path: &Path) -> Result<Config, ConfigError> {
        match Self::load(path) {
            Err(ConfigError::NotFound(_)) => Ok(Config::default()),
            other => other,
        }
    }

    /// Replace every `${VAR}` with the variable's value. The first unset
    /// variable fails the whole substitution.
    fn substitute_env(content: &str) -> Result<String, ConfigError> {
        let pattern = Regex::new(r"\$\{([^}]+)\}")
            .map_err(|e| ConfigError::InvalidFormat(e.to_string()))?;

        let mut missing = None;
        let substituted = pattern.replace_all(content, |caps: &Captures| {
            let name = &caps[1];
            std::env::var(name).unwrap_or_else(|_| {
                missing.get_or_insert_with(|| name.to_string());
                String::new()
            })
        });

        match missing {
            Some(name) => Err(ConfigError::EnvVarNotSet(name)),
            None => Ok(substituted.into_owned()),
        }
    }

    fn expand_paths(config: &mut Config) {
        let expand = |path: &mut Option<PathBuf>| {
            if let Some(p) = path.as_mut() {
                *p = PathBuf::from(Self::expand_path(&p.to_string_lossy()));
            }
        };
        expand(&mut config.sync.capture_script);
        expand(&mut config.logging.directory);
    }

    /// Resolve a leading `~` to the home directory.
    pub fn expand_path(path: &str) -> String {
        shellexpand::tilde(path).into_owned()
    }
}
