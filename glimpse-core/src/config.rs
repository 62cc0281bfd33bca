use std::{
    env::{self, VarError},
    fs::File,
    io,
    path::{Path, PathBuf},
    time::Duration,
};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{error::Error, playback::PlaybackConfig};

const APP_NAME: &str = "Glimpse";
const CONFIG_FILENAME: &str = "config.json";
const BASE_URL_ENV_VAR: &str = "GLIMPSE_BASE_URL";
const TOKEN_ENV_VAR: &str = "GLIMPSE_TOKEN";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub base_url: String,
    pub token: Option<String>,
    pub advance_interval_ms: u64,
    pub fetch_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000".to_string(),
            token: None,
            advance_interval_ms: 3000,
            fetch_timeout_ms: 5000,
        }
    }
}

impl Config {
    fn project_dirs() -> Option<ProjectDirs> {
        ProjectDirs::from("", "", APP_NAME)
    }

    pub fn config_dir() -> Option<PathBuf> {
        Self::project_dirs().map(|dirs| dirs.config_dir().to_path_buf())
    }

    fn config_path() -> Option<PathBuf> {
        Self::config_dir().map(|dir| dir.join(CONFIG_FILENAME))
    }

    /// Load the config from the user config directory, falling back to the
    /// defaults, and apply the environment overrides on top.
    pub fn load() -> Result<Config, Error> {
        let config = match Self::config_path() {
            Some(path) => Self::load_from(&path)?,
            None => {
                log::warn!("no config directory available, using defaults");
                Config::default()
            }
        };
        Ok(config.with_overrides(env_var(BASE_URL_ENV_VAR), env_var(TOKEN_ENV_VAR)))
    }

    /// Read a config file.  A missing file is not an error.
    pub fn load_from(path: &Path) -> Result<Config, Error> {
        match File::open(path) {
            Ok(file) => {
                log::info!("loading config: {:?}", path);
                let config: Config = serde_json::from_reader(file)?;
                config.validate()?;
                Ok(config)
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(Config::default()),
            Err(err) => Err(err.into()),
        }
    }

    pub fn with_overrides(mut self, base_url: Option<String>, token: Option<String>) -> Self {
        if let Some(base_url) = base_url {
            self.base_url = base_url;
        }
        if token.is_some() {
            self.token = token;
        }
        self
    }

    fn validate(&self) -> Result<(), Error> {
        self.base_url()?;
        if self.advance_interval_ms == 0 {
            return Err(Error::ConfigError("advance_interval_ms must be positive".into()));
        }
        if self.fetch_timeout_ms == 0 {
            return Err(Error::ConfigError("fetch_timeout_ms must be positive".into()));
        }
        Ok(())
    }

    pub fn base_url(&self) -> Result<Url, Error> {
        Ok(Url::parse(&self.base_url)?)
    }

    /// Resolve a server-relative media path for display.  Absolute URLs are
    /// returned untouched.
    pub fn media_url(&self, path: &str) -> Result<Url, Error> {
        if let Ok(absolute) = Url::parse(path) {
            return Ok(absolute);
        }
        let joined = format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        Ok(Url::parse(&joined)?)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    pub fn playback(&self) -> PlaybackConfig {
        PlaybackConfig {
            advance_interval: Duration::from_millis(self.advance_interval_ms),
            fetch_timeout: self.fetch_timeout(),
        }
    }
}

fn env_var(name: &str) -> Option<String> {
    env::var(name).map_or_else(
        |err| match err {
            VarError::NotPresent => None,
            VarError::NotUnicode(_) => {
                log::error!("{} is not a valid unicode", name);
                None
            }
        },
        Some,
    )
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join(CONFIG_FILENAME)).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.playback(), PlaybackConfig::default());
    }

    #[test]
    fn written_config_loads_back_with_partial_fields_defaulted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILENAME);
        let config = Config {
            token: Some("secret".into()),
            advance_interval_ms: 1500,
            ..Config::default()
        };
        fs::write(&path, serde_json::to_vec_pretty(&config).unwrap()).unwrap();
        assert_eq!(Config::load_from(&path).unwrap(), config);

        fs::write(&path, r#"{"base_url":"https://glimpse.example"}"#).unwrap();
        let partial = Config::load_from(&path).unwrap();
        assert_eq!(partial.base_url, "https://glimpse.example");
        assert_eq!(partial.fetch_timeout_ms, 5000);
    }

    #[test]
    fn rejects_invalid_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILENAME);
        fs::write(&path, r#"{"base_url":"not a url"}"#).unwrap();
        assert!(matches!(
            Config::load_from(&path),
            Err(Error::ConfigError(_))
        ));
        fs::write(&path, r#"{"advance_interval_ms":0}"#).unwrap();
        assert!(matches!(
            Config::load_from(&path),
            Err(Error::ConfigError(_))
        ));
    }

    #[test]
    fn overrides_replace_file_values() {
        let config = Config::default()
            .with_overrides(Some("http://10.0.0.2:5000".into()), Some("tok".into()));
        assert_eq!(config.base_url, "http://10.0.0.2:5000");
        assert_eq!(config.token.as_deref(), Some("tok"));

        let untouched = config.clone().with_overrides(None, None);
        assert_eq!(untouched, config);
    }

    #[test]
    fn media_paths_resolve_against_base() {
        let config = Config {
            base_url: "http://localhost:5000/".into(),
            ..Config::default()
        };
        assert_eq!(
            config.media_url("/uploads/moments/a.png").unwrap().as_str(),
            "http://localhost:5000/uploads/moments/a.png"
        );
        assert_eq!(
            config.media_url("https://cdn.example/a.png").unwrap().as_str(),
            "https://cdn.example/a.png"
        );
    }
}
