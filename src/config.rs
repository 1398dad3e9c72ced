use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use crate::extract::{DEFAULT_QUEUE_CAPACITY, DEFAULT_WORKERS};
use crate::sampler::DEFAULT_EXCLUDE_RECENT;
use crate::source::DEFAULT_API_BASE;
use crate::walker::DEFAULT_EXTENSIONS;

const ONE_WEEK_SECS: u64 = 7 * 24 * 60 * 60;

/// Contents of `random-source.toml`. Every field is optional; CLI flags
/// override what the file sets.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RandomSourceConfig {
    /// Owner whose public repositories are indexed
    pub user: Option<String>,
    pub listen: Option<String>,
    /// Directory holding the database and the blob directory
    pub base: Option<PathBuf>,
    /// Where ephemeral clones are placed (defaults to the system temp dir)
    pub scratch: Option<PathBuf>,
    pub api_base: Option<String>,
    pub workers: Option<usize>,
    pub queue_capacity: Option<usize>,
    pub exclude_recent: Option<u32>,
    pub extensions: Option<Vec<String>>,
    pub sync_interval_secs: Option<u64>,
}

/// Fully resolved settings
#[derive(Debug, Clone)]
pub struct Settings {
    pub user: Option<String>,
    pub listen: SocketAddr,
    pub base: PathBuf,
    pub scratch: Option<PathBuf>,
    pub api_base: String,
    pub workers: usize,
    pub queue_capacity: usize,
    pub exclude_recent: u32,
    pub extensions: Vec<String>,
    pub sync_interval: Duration,
}

impl Settings {
    /// The configured owner; required by anything that syncs
    pub fn owner(&self) -> anyhow::Result<&str> {
        match self.user.as_deref() {
            Some(user) if !user.trim().is_empty() => Ok(user),
            _ => anyhow::bail!("no user configured (pass --user or set `user` in the config file)"),
        }
    }

    pub fn database_path(&self) -> PathBuf {
        self.base.join("random-source.sqlite.db")
    }

    pub fn blob_dir(&self) -> PathBuf {
        self.base.join("indexes")
    }
}

impl RandomSourceConfig {
    /// Fields set in `other` win
    pub fn merge(self, other: RandomSourceConfig) -> RandomSourceConfig {
        RandomSourceConfig {
            user: other.user.or(self.user),
            listen: other.listen.or(self.listen),
            base: other.base.or(self.base),
            scratch: other.scratch.or(self.scratch),
            api_base: other.api_base.or(self.api_base),
            workers: other.workers.or(self.workers),
            queue_capacity: other.queue_capacity.or(self.queue_capacity),
            exclude_recent: other.exclude_recent.or(self.exclude_recent),
            extensions: other.extensions.or(self.extensions),
            sync_interval_secs: other.sync_interval_secs.or(self.sync_interval_secs),
        }
    }

    pub fn resolve(self) -> anyhow::Result<Settings> {
        let listen = parse_listen(self.listen.as_deref().unwrap_or(":8080"))?;
        let workers = self.workers.unwrap_or(DEFAULT_WORKERS);
        if workers == 0 {
            anyhow::bail!("workers must be at least 1");
        }

        Ok(Settings {
            user: self.user,
            listen,
            base: self.base.unwrap_or_else(|| PathBuf::from(".")),
            scratch: self.scratch,
            api_base: self.api_base.unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            workers,
            queue_capacity: self.queue_capacity.unwrap_or(DEFAULT_QUEUE_CAPACITY),
            exclude_recent: self.exclude_recent.unwrap_or(DEFAULT_EXCLUDE_RECENT),
            extensions: self
                .extensions
                .unwrap_or_else(|| DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect()),
            sync_interval: Duration::from_secs(self.sync_interval_secs.unwrap_or(ONE_WEEK_SECS)),
        })
    }
}

/// Accepts `host:port` or a bare `:port`, which binds every interface
pub fn parse_listen(listen: &str) -> anyhow::Result<SocketAddr> {
    let full = if listen.starts_with(':') {
        format!("0.0.0.0{listen}")
    } else {
        listen.to_string()
    };
    full.parse::<SocketAddr>()
        .map_err(|e| anyhow::anyhow!("invalid listen address {listen:?}: {e}"))
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from("random-source.toml")
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<Option<RandomSourceConfig>> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
    if !path.exists() {
        return Ok(None);
    }

    let contents = std::fs::read_to_string(&path)?;
    let config: RandomSourceConfig = toml::from_str(&contents)?;
    Ok(Some(config))
}

/// Create the base and blob directories
pub fn ensure_dirs(settings: &Settings) -> anyhow::Result<()> {
    std::fs::create_dir_all(&settings.base)?;
    std::fs::create_dir_all(settings.blob_dir())?;
    Ok(())
}
