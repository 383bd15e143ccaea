//! Configuration sources.
//!
//! Each provider yields a [`Figment`]; [`crate::NetAutoTestConfig`] extracts
//! and validates the result.

use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};

use crate::{ConfigError, NetAutoTestConfig};

/// Prefix for environment overrides. Nested keys are separated by `__`.
pub const ENV_PREFIX: &str = "NETAUTOTEST_";

/// Selects the environment-specific overlay file.
pub const ENV_SELECTOR: &str = "NETAUTOTEST_ENV";

/// Trait for loading configuration from different sources.
pub trait ConfigProvider {
    /// Loads the configuration and returns a Figment instance.
    fn load(&self) -> Result<Figment, ConfigError>;
}

/// Defaults, then `<dir>/netautotest.yaml`, then `<dir>/<env>.yaml`, then
/// `NETAUTOTEST_*` variables. Missing files are skipped.
#[derive(Debug, Clone)]
pub struct LayeredProvider {
    dir: PathBuf,
}

impl LayeredProvider {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl Default for LayeredProvider {
    fn default() -> Self {
        Self::new("config")
    }
}

impl ConfigProvider for LayeredProvider {
    fn load(&self) -> Result<Figment, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(NetAutoTestConfig::default()));

        let base = self.dir.join("netautotest.yaml");
        if base.exists() {
            figment = figment.merge(Yaml::file(base));
        }

        let env = std::env::var(ENV_SELECTOR).unwrap_or_else(|_| "production".into());
        let env_file = self.dir.join(format!("{env}.yaml"));
        if env_file.exists() {
            figment = figment.merge(Yaml::file(env_file));
        }

        Ok(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
    }
}

/// A single YAML file over the defaults, then environment overrides.
/// The file must exist.
#[derive(Debug, Clone)]
pub struct FileProvider {
    path: PathBuf,
}

impl FileProvider {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl ConfigProvider for FileProvider {
    fn load(&self) -> Result<Figment, ConfigError> {
        if !self.path.exists() {
            return Err(ConfigError::FileNotFound(self.path.clone()));
        }

        Ok(
            Figment::from(Serialized::defaults(NetAutoTestConfig::default()))
                .merge(Yaml::file(&self.path))
                .merge(Env::prefixed(ENV_PREFIX).split("__")),
        )
    }
}
