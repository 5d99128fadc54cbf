//! Application-level configuration loading: scoring endpoint and sync tuning.

use std::{
    env, fs,
    io::ErrorKind,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;
use serde_with::{DurationSeconds, serde_as};
use tracing::{info, warn};

use crate::{dao::scoring::graphql::ScoringConfig, state::sync::DEFAULT_SUBSCRIBER_BUFFER};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "QUALIFIER_COORD_CONFIG_PATH";
/// How long a websocket client may take to identify itself.
const DEFAULT_IDENT_TIMEOUT: Duration = Duration::from_secs(10);

/// Tuning of the match synchronisation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Messages buffered per subscriber before it is evicted.
    pub subscriber_buffer: usize,
    /// Deadline for the identification frame of a websocket client.
    pub ident_timeout: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            subscriber_buffer: DEFAULT_SUBSCRIBER_BUFFER,
            ident_timeout: DEFAULT_IDENT_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, Default)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    /// Remote scoring authority settings.
    pub scoring: ScoringConfig,
    /// Match synchronisation settings.
    pub sync: SyncConfig,
}

impl AppConfig {
    /// Load the configuration from the resolved path, falling back to defaults.
    pub fn load() -> Self {
        Self::load_from(&resolve_config_path())
    }

    /// Load the configuration from `path`, falling back to defaults when the
    /// file is missing or unreadable.
    pub fn load_from(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let app_config: Self = raw.into();
                    info!(
                        path = %path.display(),
                        endpoint = %app_config.scoring.endpoint,
                        "loaded configuration"
                    );
                    app_config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    scoring: RawScoring,
    sync: RawSync,
}

#[serde_as]
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawScoring {
    endpoint: Option<String>,
    #[serde_as(as = "Option<DurationSeconds<u64>>")]
    request_timeout_secs: Option<Duration>,
}

#[serde_as]
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawSync {
    subscriber_buffer: Option<usize>,
    #[serde_as(as = "Option<DurationSeconds<u64>>")]
    ident_timeout_secs: Option<Duration>,
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        let mut scoring = value
            .scoring
            .endpoint
            .map(ScoringConfig::new)
            .unwrap_or_default();
        if let Some(timeout) = value.scoring.request_timeout_secs {
            scoring = scoring.with_request_timeout(timeout);
        }

        let defaults = SyncConfig::default();
        let sync = SyncConfig {
            subscriber_buffer: value
                .sync
                .subscriber_buffer
                .filter(|buffer| *buffer > 0)
                .unwrap_or(defaults.subscriber_buffer),
            ident_timeout: value.sync.ident_timeout_secs.unwrap_or(defaults.ident_timeout),
        };

        Self { scoring, sync }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}
