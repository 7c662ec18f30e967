use std::collections::HashMap;
use std::time::Duration;
use std::{env, fmt, fs, io, path};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;
use url::Url;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        path: path::PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse config {}: {source}", path.display())]
    Parse {
        path: path::PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("failed to write config {}: {source}", path.display())]
    Write {
        path: path::PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("config path unavailable: neither XDG_CONFIG_HOME nor a home directory is set")]
    ConfigPathUnavailable,
    #[error("endpoints {first:?} and {second:?} share the url {url}")]
    DuplicateUrl { url: String, first: String, second: String },
    #[error("endpoint {name:?} has an invalid url {url:?}: {reason}")]
    InvalidUrl { name: String, url: String, reason: String },
    #[error("{field} of {owner:?} must be greater than zero")]
    ZeroDuration { owner: String, field: &'static str },
    #[error("{field} of {owner:?} must not exceed {}", humantime::format_duration(*max))]
    DurationTooLong { owner: String, field: &'static str, max: Duration },
}

/// Upper bound for every schedule and timeout in the configuration
pub const MAX_DURATION: Duration = Duration::from_secs(365 * 24 * 60 * 60);

fn check_duration(owner: &str, field: &'static str, value: Duration) -> Result<(), ConfigError> {
    if value.is_zero() {
        return Err(ConfigError::ZeroDuration { owner: owner.to_string(), field });
    }
    if value > MAX_DURATION {
        return Err(ConfigError::DurationTooLong { owner: owner.to_string(), field, max: MAX_DURATION });
    }
    Ok(())
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub logging: LogConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: path::PathBuf,
}

/// The part of the configuration the monitoring service reconciles against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorConfig {
    #[serde(default)]
    pub endpoints: Vec<Endpoint>,
    #[serde(with = "duration", default = "default_config_check_interval")]
    pub config_check_interval: Duration,
}

/// One monitored target. Values are never mutated once loaded; a changed
/// endpoint in a reloaded config is a different value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub name: String,
    pub url: String,
    #[serde(with = "duration")]
    pub interval: Duration,
    #[serde(with = "duration")]
    pub timeout: Duration,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<path::PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

fn default_config_check_interval() -> Duration {
    Duration::from_secs(180)
}

fn default_enabled() -> bool {
    true
}

fn default_log_level() -> String {
    "info".into()
}

/// Durations are written as humantime strings and read from either a
/// humantime string (`"1m 30s"`) or an integer number of seconds.
mod duration {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer, de::Error as _};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Seconds(u64),
        Text(String),
    }

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*value).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        match Raw::deserialize(deserializer)? {
            Raw::Seconds(seconds) => Ok(Duration::from_secs(seconds)),
            Raw::Text(text) => humantime::parse_duration(text.trim()).map_err(D::Error::custom),
        }
    }
}

impl Endpoint {
    pub fn new(
        name: impl Into<String>,
        url: impl Into<String>,
        interval: Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            interval,
            timeout,
            description: None,
            tags: Vec::new(),
            enabled: true,
        }
    }

    pub fn with_tags<I, T>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Whether a running monitor for `self` can keep running for `other`.
    ///
    /// Only the fields that shape probing count; `description` does not.
    pub fn probes_like(&self, other: &Endpoint) -> bool {
        self.url == other.url
            && self.name == other.name
            && self.interval == other.interval
            && self.timeout == other.timeout
            && self.tags == other.tags
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let invalid_url = |reason: String| ConfigError::InvalidUrl {
            name: self.name.clone(),
            url: self.url.clone(),
            reason,
        };
        let url = Url::parse(&self.url).map_err(|e| invalid_url(e.to_string()))?;
        match url.scheme() {
            "http" | "https" => {}
            other => return Err(invalid_url(format!("unsupported scheme {other}"))),
        }

        check_duration(&self.name, "interval", self.interval)?;
        check_duration(&self.name, "timeout", self.timeout)?;

        if self.timeout > self.interval {
            warn!(
                "Endpoint {} timeout ({:?}) exceeds its interval ({:?})",
                self.url, self.timeout, self.interval
            );
        }

        Ok(())
    }
}

impl MonitorConfig {
    pub fn new(endpoints: Vec<Endpoint>, config_check_interval: Duration) -> Self {
        Self { endpoints, config_check_interval }
    }

    pub fn enabled_endpoints(&self) -> impl Iterator<Item = &Endpoint> {
        self.endpoints.iter().filter(|endpoint| endpoint.enabled)
    }

    /// Reject configurations the service cannot run unambiguously.
    ///
    /// Monitors are keyed by url, so two endpoints sharing one are refused
    /// instead of silently replacing each other.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_duration("monitor", "config_check_interval", self.config_check_interval)?;

        let mut seen: HashMap<&str, &str> = HashMap::new();
        for endpoint in &self.endpoints {
            endpoint.validate()?;
            if let Some(first) = seen.insert(endpoint.url.as_str(), endpoint.name.as_str()) {
                return Err(ConfigError::DuplicateUrl {
                    url: endpoint.url.clone(),
                    first: first.to_string(),
                    second: endpoint.name.clone(),
                });
            }
        }

        Ok(())
    }
}

/// Used to ensure we are actually reading a toml file
fn normalize_toml_path(path: &path::Path) -> path::PathBuf {
    let mut path = path.to_path_buf();
    if path.extension().map(|ext| ext != "toml").unwrap_or(true) {
        path.set_extension("toml");
    }
    path
}

/// Get default config path ($XDG_CONFIG_HOME/monitord/config.toml or
/// $HOME/.config/...)
pub fn default_config_path() -> Result<path::PathBuf, ConfigError> {
    let path = if let Ok(config_home) = env::var("XDG_CONFIG_HOME") {
        path::PathBuf::from(config_home)
    } else if let Some(home_dir) = env::home_dir() {
        home_dir.join(".config")
    } else {
        return Err(ConfigError::ConfigPathUnavailable);
    };

    Ok(path.join("monitord/config.toml"))
}

/// Relative data and log paths are anchored at the home directory so the
/// daemon behaves the same regardless of its working directory.
fn resolve_home_relative(path: &mut path::PathBuf) {
    if path.is_absolute() {
        return;
    }
    if let Some(home_dir) = env::home_dir() {
        *path = home_dir.join(&*path);
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: ".local/share/monitord/monitord.db".into() }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self { level: default_log_level(), path: None, format: None }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            endpoints: vec![
                Endpoint::new(
                    "Example",
                    "https://example.com",
                    Duration::from_secs(60),
                    Duration::from_secs(10),
                )
                .with_description("Example website")
                .with_tags(["production", "external"]),
            ],
            config_check_interval: default_config_check_interval(),
        }
    }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let write_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str, value: &dyn fmt::Display| {
                writeln!(f, "  {:indent$}{}: {}", "", label, value, indent = level * 2)
            }
        };
        let write_title_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str| {
                writeln!(f, "{:indent$}{}", "", label, indent = level * 2)
            }
        };

        let write_title_1 = write_title_indented(1);
        let write_1 = write_indented(1);
        let write_2 = write_indented(2);

        writeln!(f, "Current Configuration State:")?;
        write_title_1(f, "Database")?;
        write_1(f, "Path", &self.database.path.display())?;

        write_title_1(f, "Monitor")?;
        write_1(
            f,
            "Config Check Interval",
            &humantime::format_duration(self.monitor.config_check_interval),
        )?;
        write_1(f, "Endpoints", &self.monitor.endpoints.len())?;
        for endpoint in &self.monitor.endpoints {
            let schedule = format!(
                "{} every {} (timeout {}){}",
                endpoint.url,
                humantime::format_duration(endpoint.interval),
                humantime::format_duration(endpoint.timeout),
                if endpoint.enabled { "" } else { " [disabled]" },
            );
            write_2(f, &endpoint.name, &schedule)?;
        }

        write_title_1(f, "Logging")?;
        write_1(f, "Level", &self.logging.level)?;
        match &self.logging.path {
            Some(path) => write_1(f, "Path", &path.display())?,
            None => write_1(f, "Path", &"stdout")?,
        }

        Ok(())
    }
}

impl Config {
    /// Generate Config structure from file
    ///
    /// Creates a default config in ~/.config/monitord/config.toml
    ///  or the specified path, with the name config.toml if one does not exist
    ///
    /// ```no_run
    /// let cfg = monitord::Config::from_config(None::<&std::path::Path>)?;
    /// println!("{}", cfg);
    /// # Ok::<(), monitord::ConfigError>(())
    /// ```
    pub fn from_config(optional_path: Option<impl AsRef<path::Path>>) -> Result<Self, ConfigError> {
        let config_path: path::PathBuf = if let Some(path) = optional_path {
            normalize_toml_path(path.as_ref())
        } else {
            default_config_path()?
        };

        let mut config = if config_path.exists() {
            Self::read_from(&config_path)?
        } else {
            let config = Self::default();
            config.write_config(&config_path)?;
            config
        };

        resolve_home_relative(&mut config.database.path);
        if let Some(log_path) = config.logging.path.as_mut() {
            resolve_home_relative(log_path);
        }

        config.monitor.validate()?;
        Ok(config)
    }

    fn read_from(path: &path::Path) -> Result<Self, ConfigError> {
        let raw_string = fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
        toml::from_str(raw_string.as_str())
            .map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })
    }

    /// Serialize and write a config to a file
    pub fn write_config(&self, path: &path::Path) -> Result<(), ConfigError> {
        let config_str: String = toml::to_string_pretty(self)?;
        let write_error = |source| ConfigError::Write { path: path.to_path_buf(), source };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(write_error)?;
        }

        fs::write(path, config_str).map_err(write_error)
    }
}
