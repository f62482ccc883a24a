use crate::scheduler::Interval;
use envconfig::Envconfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// File name searched for in each configuration directory.
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Top-level configuration loaded from config.toml.
///
/// Scalar fields come before the tables so the TOML serializer can emit them.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct InfraConfig {
    pub log_level: String,
    pub log_format: LogFormat,
    pub docker: DockerConfig,
    pub kubernetes: KubernetesConfig,
    pub sampler: SamplerConfig,
    pub shutdown: ShutdownConfig,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format {other:?}")),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct DockerConfig {
    pub registry: String,
    pub username: String,
    pub password: String,
    pub default_tag: String,
    pub build_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct KubernetesConfig {
    pub context: String,
    pub namespace: String,
    pub kubeconfig: PathBuf,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct SamplerConfig {
    pub interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Default)]
#[serde(default)]
pub struct ShutdownConfig {
    pub second_interrupt: SecondInterrupt,
}

/// What to do when another interrupt arrives while shutdown is in progress.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SecondInterrupt {
    /// Exit immediately without waiting for the worker.
    #[default]
    Force,
    /// Log and discard it; shutdown continues gracefully.
    Ignore,
}

// --- Default implementations ---

impl Default for InfraConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::default(),
            docker: DockerConfig::default(),
            kubernetes: KubernetesConfig::default(),
            sampler: SamplerConfig::default(),
            shutdown: ShutdownConfig::default(),
        }
    }
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self {
            registry: "docker.io".to_string(),
            username: String::new(),
            password: String::new(),
            default_tag: "latest".to_string(),
            build_timeout_secs: 300,
        }
    }
}

impl Default for KubernetesConfig {
    fn default() -> Self {
        let kubeconfig = home_dir()
            .map(|home| home.join(".kube").join("config"))
            .unwrap_or_default();
        Self {
            context: String::new(),
            namespace: "default".to_string(),
            kubeconfig,
        }
    }
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self { interval_secs: 1 }
    }
}

/// Errors that can occur while loading, validating or writing configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to read the config file.
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Config file is not valid TOML for this schema.
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    /// Failed to render configuration as TOML.
    Serialize { source: toml::ser::Error },
    /// Failed to create the config file or its directory.
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Refusing to overwrite an existing config file.
    AlreadyExists { path: PathBuf },
    /// No home directory to derive the default config location from.
    NoHomeDir,
    /// Sampling interval must be at least one second.
    InvalidInterval { secs: u64 },
    /// An `INFRA_*` environment override could not be parsed.
    Env { source: envconfig::Error },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Read { path, source } => {
                write!(f, "error reading config file {}: {}", path.display(), source)
            }
            ConfigError::Parse { path, source } => {
                write!(f, "error parsing config file {}: {}", path.display(), source)
            }
            ConfigError::Serialize { source } => {
                write!(f, "error formatting configuration: {}", source)
            }
            ConfigError::Write { path, source } => {
                write!(f, "error saving configuration to {}: {}", path.display(), source)
            }
            ConfigError::AlreadyExists { path } => {
                write!(f, "configuration file already exists: {}", path.display())
            }
            ConfigError::NoHomeDir => write!(f, "error getting home directory"),
            ConfigError::InvalidInterval { secs } => {
                write!(f, "interval must be a positive number of seconds, got {}", secs)
            }
            ConfigError::Env { source } => {
                write!(f, "invalid environment override: {}", source)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Read { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
            ConfigError::Serialize { source } => Some(source),
            ConfigError::Write { source, .. } => Some(source),
            ConfigError::Env { source } => Some(source),
            _ => None,
        }
    }
}

/// Resolved configuration plus the file it came from, if any.
#[derive(Debug)]
pub struct LoadedConfig {
    pub config: InfraConfig,
    pub path: Option<PathBuf>,
}

impl InfraConfig {
    /// Parse a config file. Missing sections and keys fall back to defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        toml::from_str(&contents).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Overlay environment overrides. Unset variables leave the file value alone.
    pub fn apply_env(&mut self, overrides: EnvOverrides) {
        if let Some(level) = overrides.log_level {
            self.log_level = level;
        }
        if let Some(format) = overrides.log_format {
            self.log_format = format;
        }
        if let Some(registry) = overrides.docker_registry {
            self.docker.registry = registry;
        }
        if let Some(tag) = overrides.docker_default_tag {
            self.docker.default_tag = tag;
        }
        if let Some(namespace) = overrides.kubernetes_namespace {
            self.kubernetes.namespace = namespace;
        }
        if let Some(secs) = overrides.sampler_interval_secs {
            self.sampler.interval_secs = secs;
        }
    }

    /// Resolve the sampling interval: CLI flag first, then config.
    pub fn sampler_interval(&self, cli_override: Option<u64>) -> Result<Interval, ConfigError> {
        Interval::from_secs(cli_override.unwrap_or(self.sampler.interval_secs))
    }
}

/// `INFRA_*` environment overrides, applied on top of the config file.
#[derive(Envconfig, Debug, Default)]
pub struct EnvOverrides {
    #[envconfig(from = "INFRA_LOG_LEVEL")]
    pub log_level: Option<String>,

    #[envconfig(from = "INFRA_LOG_FORMAT")]
    pub log_format: Option<LogFormat>,

    #[envconfig(from = "INFRA_DOCKER_REGISTRY")]
    pub docker_registry: Option<String>,

    #[envconfig(from = "INFRA_DOCKER_DEFAULT_TAG")]
    pub docker_default_tag: Option<String>,

    #[envconfig(from = "INFRA_KUBERNETES_NAMESPACE")]
    pub kubernetes_namespace: Option<String>,

    #[envconfig(from = "INFRA_SAMPLER_INTERVAL_SECS")]
    pub sampler_interval_secs: Option<u64>,
}

/// The user's home directory, if one can be determined.
pub fn home_dir() -> Option<PathBuf> {
    dirs::home_dir()
}

/// Directories searched for `config.toml`, in priority order.
pub fn search_paths() -> Vec<PathBuf> {
    let mut dirs = vec![PathBuf::from(".")];
    if let Some(home) = home_dir() {
        dirs.push(home.join(".infra"));
    }
    dirs.push(PathBuf::from("/etc/infra"));
    dirs.into_iter().map(|d| d.join(CONFIG_FILE_NAME)).collect()
}

/// Load configuration once at startup.
///
/// An explicit path must exist. Without one, the first file found in
/// [`search_paths`] is used, or defaults if none exists. Environment
/// overrides are applied last.
pub fn load(explicit: Option<&Path>) -> Result<LoadedConfig, ConfigError> {
    let path = match explicit {
        Some(p) => Some(p.to_path_buf()),
        None => search_paths().into_iter().find(|p| p.is_file()),
    };

    let mut config = match &path {
        Some(p) => InfraConfig::from_file(p)?,
        None => InfraConfig::default(),
    };
    let overrides = EnvOverrides::init_from_env().map_err(|e| ConfigError::Env { source: e })?;
    config.apply_env(overrides);

    Ok(LoadedConfig { config, path })
}

/// Default location for `config init`: `~/.infra/config.toml`.
pub fn default_init_path() -> Result<PathBuf, ConfigError> {
    let home = home_dir().ok_or(ConfigError::NoHomeDir)?;
    Ok(home.join(".infra").join(CONFIG_FILE_NAME))
}

/// Write `config` as TOML to `path`, creating parent directories.
///
/// Never overwrites an existing file.
pub fn save(config: &InfraConfig, path: &Path) -> Result<(), ConfigError> {
    if path.exists() {
        return Err(ConfigError::AlreadyExists {
            path: path.to_path_buf(),
        });
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }
    let contents =
        toml::to_string_pretty(config).map_err(|e| ConfigError::Serialize { source: e })?;
    std::fs::write(path, contents).map_err(|e| ConfigError::Write {
        path: path.to_path_buf(),
        source: e,
    })
}
