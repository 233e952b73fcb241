use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

use crate::controller::ControllerTiming;
use crate::device::default_device_name;
use crate::restriction::{RestrictionTable, RestrictionWindow};
use crate::supervisor::BackoffPolicy;

pub const SERVER_ENV: &str = "HEADSET_REMOTE_SERVER";
pub const DEVICE_NAME_ENV: &str = "HEADSET_REMOTE_DEVICE_NAME";
pub const RESTRICTIONS_ENV: &str = "HEADSET_REMOTE_RESTRICTIONS";
pub const MAX_ATTEMPTS_ENV: &str = "HEADSET_REMOTE_MAX_ATTEMPTS";

const DEFAULT_SERVER: &str = "ws://127.0.0.1:8080";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("window for {video} starts after it ends ({start}s > {end}s)")]
    InvalidWindow { video: String, start: f64, end: f64 },
    #[error("invalid value {value:?} for {var}")]
    InvalidEnv { var: &'static str, value: String },
}

/// Session loop timings.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionTiming {
    pub tick: Duration,
    pub probe_interval: Duration,
    pub connect_timeout: Duration,
    pub close_grace: Duration,
    pub controller: ControllerTiming,
}

impl Default for SessionTiming {
    fn default() -> Self {
        Self {
            tick: Duration::from_millis(100),
            probe_interval: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(5),
            close_grace: Duration::from_secs(1),
            controller: ControllerTiming::default(),
        }
    }
}

/// Client configuration, environment first with CLI overrides applied on top.
#[derive(Debug, Clone)]
pub struct Config {
    pub server: String,
    pub device_name: String,
    pub restrictions_path: Option<PathBuf>,
    pub backoff: BackoffPolicy,
    pub timing: SessionTiming,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: DEFAULT_SERVER.to_string(),
            device_name: default_device_name(),
            restrictions_path: default_restrictions_path(),
            backoff: BackoffPolicy::default(),
            timing: SessionTiming::default(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Ok(server) = env::var(SERVER_ENV) {
            config.server = normalize_server(&server);
        }
        if let Ok(name) = env::var(DEVICE_NAME_ENV) {
            if !name.trim().is_empty() {
                config.device_name = name.trim().to_string();
            }
        }
        if let Ok(path) = env::var(RESTRICTIONS_ENV) {
            config.restrictions_path = Some(PathBuf::from(path));
        }
        if let Ok(raw) = env::var(MAX_ATTEMPTS_ENV) {
            config.backoff.max_attempts = parse_attempts(&raw).ok_or(ConfigError::InvalidEnv {
                var: MAX_ATTEMPTS_ENV,
                value: raw,
            })?;
        }
        Ok(config)
    }

    pub fn with_server(mut self, server: &str) -> Self {
        self.server = normalize_server(server);
        self
    }
}

fn parse_attempts(raw: &str) -> Option<u32> {
    raw.trim().parse::<u32>().ok().filter(|n| *n > 0)
}

/// Adds the `ws://` scheme when missing and pins `localhost` to IPv4.
pub fn normalize_server(server: &str) -> String {
    let server = server.trim();
    let with_scheme = if server.contains("://") {
        server.to_string()
    } else {
        format!("ws://{server}")
    };
    // Avoid IPv6 (::1) preference for localhost on some platforms.
    with_scheme.replacen("://localhost", "://127.0.0.1", 1)
}

fn default_restrictions_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "headset-remote")
        .map(|dirs| dirs.config_dir().join("restrictions.toml"))
}

#[derive(Debug, Deserialize)]
struct RestrictionFile {
    #[serde(default)]
    video: Vec<VideoEntry>,
}

#[derive(Debug, Deserialize)]
struct VideoEntry {
    id: String,
    #[serde(default)]
    window: Vec<WindowEntry>,
}

#[derive(Debug, Deserialize)]
struct WindowEntry {
    start: f64,
    end: f64,
    #[serde(default)]
    max_angle: f64,
}

/// Loads restriction windows. A missing file means no restrictions.
pub fn load_restrictions(path: &Path) -> Result<RestrictionTable, ConfigError> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            warn!(
                target = "headset_remote::config",
                path = %path.display(),
                "restriction file not found; rotation is unrestricted"
            );
            return Ok(RestrictionTable::default());
        }
        Err(source) => {
            return Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    parse_restrictions(&raw).map_err(|err| match err {
        ParseFailure::Toml(source) => ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        },
        ParseFailure::Invalid(err) => err,
    })
}

enum ParseFailure {
    Toml(toml::de::Error),
    Invalid(ConfigError),
}

fn parse_restrictions(raw: &str) -> Result<RestrictionTable, ParseFailure> {
    let file: RestrictionFile = toml::from_str(raw).map_err(ParseFailure::Toml)?;
    let mut windows = Vec::new();
    for video in file.video {
        for window in video.window {
            if !(window.start <= window.end) {
                return Err(ParseFailure::Invalid(ConfigError::InvalidWindow {
                    video: video.id.clone(),
                    start: window.start,
                    end: window.end,
                }));
            }
            windows.push(RestrictionWindow {
                video_id: video.id.clone(),
                start_seconds: window.start,
                end_seconds: window.end,
                max_angle_degrees: window.max_angle,
            });
        }
    }
    Ok(RestrictionTable::new(windows))
}
