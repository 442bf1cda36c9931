//! Configuration for mixtape-merge
//!
//! Two layers, resolved in priority order:
//! 1. Command-line arguments / `MIXTAPE_*` environment variables (via clap)
//! 2. TOML bootstrap file (`mixtape-merge.toml`)
//! 3. Built-in defaults (code constants below)

use mixtape_common::config::LoggingConfig;
use mixtape_common::{Error, Result};
use reqwest::Url;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Config file name looked up in the standard locations
pub const CONFIG_FILE_NAME: &str = "mixtape-merge.toml";

/// Upper bound on transcoder threads regardless of configuration
pub const MAX_THREADS: usize = 16;

/// Longest accepted session TTL (one year)
pub const MAX_SESSION_TTL_HOURS: u64 = 24 * 365;

/// Longest accepted fetch or merge timeout (one week)
pub const MAX_TIMEOUT_SECS: u64 = 7 * 24 * 3600;

/// Longest accepted snapshot or eviction interval (one day)
pub const MAX_INTERVAL_SECS: u64 = 24 * 3600;

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Deserialize)]
pub struct MergeConfig {
    /// Shared local-storage root; every local reference must resolve inside it
    #[serde(default)]
    pub storage_root: Option<PathBuf>,

    /// Folder for the session snapshot, private work files and the outbox
    #[serde(default)]
    pub data_folder: Option<PathBuf>,

    /// Idle-session TTL measured from last activity
    #[serde(default = "default_session_ttl_hours")]
    pub session_ttl_hours: u64,

    /// Debounce interval of the session snapshot writer
    #[serde(default = "default_snapshot_interval_secs")]
    pub snapshot_interval_secs: u64,

    /// How often the idle-eviction sweep runs
    #[serde(default = "default_eviction_interval_secs")]
    pub eviction_interval_secs: u64,

    /// Deadline for one remote acquisition
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,

    /// Maximum queued items per session
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Thread count handed to the transcoder
    #[serde(default = "default_threads")]
    pub threads: usize,

    /// Optional ceiling for the merge step; `None` means no ceiling
    #[serde(default)]
    pub merge_timeout_secs: Option<u64>,

    /// URL of the local-storage file server; URLs on this endpoint are local references
    #[serde(default)]
    pub local_endpoint: Option<String>,

    /// Hosts served by the video-platform downloader instead of a plain HTTP fetch
    #[serde(default)]
    pub platform_hosts: Vec<String>,

    /// External audio downloader for platform hosts
    #[serde(default = "default_platform_downloader")]
    pub platform_downloader: PathBuf,

    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: PathBuf,

    #[serde(default = "default_ffprobe_path")]
    pub ffprobe_path: PathBuf,

    /// HTTP port
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_session_ttl_hours() -> u64 {
    24
}

fn default_snapshot_interval_secs() -> u64 {
    30
}

fn default_eviction_interval_secs() -> u64 {
    600
}

fn default_fetch_timeout_secs() -> u64 {
    300
}

fn default_queue_capacity() -> usize {
    20
}

fn default_threads() -> usize {
    2
}

fn default_platform_downloader() -> PathBuf {
    PathBuf::from("yt-dlp")
}

fn default_ffmpeg_path() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_ffprobe_path() -> PathBuf {
    PathBuf::from("ffprobe")
}

fn default_port() -> u16 {
    5780
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            storage_root: None,
            data_folder: None,
            session_ttl_hours: default_session_ttl_hours(),
            snapshot_interval_secs: default_snapshot_interval_secs(),
            eviction_interval_secs: default_eviction_interval_secs(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            queue_capacity: default_queue_capacity(),
            threads: default_threads(),
            merge_timeout_secs: None,
            local_endpoint: None,
            platform_hosts: Vec::new(),
            platform_downloader: default_platform_downloader(),
            ffmpeg_path: default_ffmpeg_path(),
            ffprobe_path: default_ffprobe_path(),
            port: default_port(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Command-line / environment overrides (highest priority)
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub storage_root: Option<PathBuf>,
    pub data_folder: Option<PathBuf>,
    pub port: Option<u16>,
    pub threads: Option<usize>,
}

impl MergeConfig {
    /// Apply overrides on top of the TOML values
    pub fn with_overrides(mut self, overrides: ConfigOverrides) -> Self {
        if overrides.storage_root.is_some() {
            self.storage_root = overrides.storage_root;
        }
        if overrides.data_folder.is_some() {
            self.data_folder = overrides.data_folder;
        }
        if let Some(port) = overrides.port {
            self.port = port;
        }
        if let Some(threads) = overrides.threads {
            self.threads = threads;
        }
        self
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.queue_capacity < 2 {
            return Err(Error::Config(format!(
                "queue_capacity must be at least 2 (a merge needs 2 items), got {}",
                self.queue_capacity
            )));
        }
        check_range("session_ttl_hours", self.session_ttl_hours, MAX_SESSION_TTL_HOURS)?;
        check_range("snapshot_interval_secs", self.snapshot_interval_secs, MAX_INTERVAL_SECS)?;
        check_range("eviction_interval_secs", self.eviction_interval_secs, MAX_INTERVAL_SECS)?;
        check_range("fetch_timeout_secs", self.fetch_timeout_secs, MAX_TIMEOUT_SECS)?;
        if let Some(secs) = self.merge_timeout_secs {
            check_range("merge_timeout_secs", secs, MAX_TIMEOUT_SECS)?;
        }
        self.local_endpoint_url()?;
        Ok(())
    }

    /// Storage root, required at runtime
    pub fn storage_root(&self) -> Result<&Path> {
        self.storage_root.as_deref().ok_or_else(|| {
            Error::Config(
                "storage_root not configured (use --storage-root, MIXTAPE_STORAGE_ROOT or TOML)"
                    .to_string(),
            )
        })
    }

    /// Parsed `local_endpoint`
    pub fn local_endpoint_url(&self) -> Result<Option<Url>> {
        self.local_endpoint
            .as_deref()
            .map(|raw| {
                Url::parse(raw)
                    .map_err(|e| Error::Config(format!("Invalid local_endpoint {}: {}", raw, e)))
            })
            .transpose()
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_hours.saturating_mul(3600))
    }

    pub fn snapshot_interval(&self) -> Duration {
        Duration::from_secs(self.snapshot_interval_secs)
    }

    pub fn eviction_interval(&self) -> Duration {
        Duration::from_secs(self.eviction_interval_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn merge_timeout(&self) -> Option<Duration> {
        self.merge_timeout_secs.map(Duration::from_secs)
    }

    /// Transcoder thread count clamped to `1..=MAX_THREADS`
    pub fn effective_threads(&self) -> usize {
        self.threads.clamp(1, MAX_THREADS)
    }
}

fn check_range(key: &str, value: u64, max: u64) -> Result<()> {
    if value == 0 || value > max {
        return Err(Error::Config(format!(
            "{} must be in 1..={}, got {}",
            key, max, value
        )));
    }
    Ok(())
}

/// On-disk layout under the data folder
#[derive(Debug, Clone)]
pub struct DataPaths {
    pub root: PathBuf,
}

impl DataPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Durable session snapshot
    pub fn snapshot_file(&self) -> PathBuf {
        self.root.join("sessions.json")
    }

    /// Private per-handle work directories
    pub fn work_dir(&self) -> PathBuf {
        self.root.join("work")
    }

    /// Delivered outputs served to clients
    pub fn outbox_dir(&self) -> PathBuf {
        self.root.join("outbox")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = MergeConfig::default();
        assert_eq!(config.queue_capacity, 20);
        assert_eq!(config.session_ttl(), Duration::from_secs(24 * 3600));
        assert_eq!(config.snapshot_interval(), Duration::from_secs(30));
        assert_eq!(config.fetch_timeout(), Duration::from_secs(300));
        assert_eq!(config.merge_timeout(), None);
        assert_eq!(config.effective_threads(), 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_partial_uses_defaults() {
        let config: MergeConfig = toml::from_str(
            r#"
            storage_root = "/srv/files"
            merge_timeout_secs = 900
            platform_hosts = ["www.youtube.com", "youtu.be"]
            "#,
        )
        .unwrap();

        assert_eq!(config.storage_root.as_deref(), Some(Path::new("/srv/files")));
        assert_eq!(config.merge_timeout(), Some(Duration::from_secs(900)));
        assert_eq!(config.platform_hosts.len(), 2);
        assert_eq!(config.queue_capacity, 20);
        assert_eq!(config.port, 5780);
    }

    #[test]
    fn test_overrides_take_priority() {
        let config = MergeConfig {
            storage_root: Some(PathBuf::from("/toml")),
            ..Default::default()
        }
        .with_overrides(ConfigOverrides {
            storage_root: Some(PathBuf::from("/cli")),
            port: Some(9000),
            ..Default::default()
        });

        assert_eq!(config.storage_root().unwrap(), Path::new("/cli"));
        assert_eq!(config.port, 9000);
    }

    #[test]
    fn test_threads_clamped() {
        let config = MergeConfig {
            threads: 0,
            ..Default::default()
        };
        assert_eq!(config.effective_threads(), 1);

        let config = MergeConfig {
            threads: 64,
            ..Default::default()
        };
        assert_eq!(config.effective_threads(), MAX_THREADS);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let config = MergeConfig {
            queue_capacity: 1,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = MergeConfig {
            local_endpoint: Some("not a url".to_string()),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = MergeConfig {
            merge_timeout_secs: Some(0),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_oversized_durations() {
        let config = MergeConfig {
            session_ttl_hours: u64::MAX,
            ..Default::default()
        };
        assert!(config.validate().is_err());
        assert_eq!(config.session_ttl(), Duration::from_secs(u64::MAX));

        let config = MergeConfig {
            merge_timeout_secs: Some(u64::MAX),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = MergeConfig {
            fetch_timeout_secs: MAX_TIMEOUT_SECS + 1,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = MergeConfig {
            eviction_interval_secs: MAX_INTERVAL_SECS + 1,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = MergeConfig {
            session_ttl_hours: MAX_SESSION_TTL_HOURS,
            fetch_timeout_secs: MAX_TIMEOUT_SECS,
            merge_timeout_secs: Some(MAX_TIMEOUT_SECS),
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_storage_root_is_config_error() {
        let config = MergeConfig::default();
        assert!(matches!(config.storage_root(), Err(Error::Config(_))));
    }

    #[test]
    fn test_data_paths_layout() {
        let paths = DataPaths::new("/var/lib/mixtape");
        assert_eq!(paths.snapshot_file(), PathBuf::from("/var/lib/mixtape/sessions.json"));
        assert_eq!(paths.work_dir(), PathBuf::from("/var/lib/mixtape/work"));
        assert_eq!(paths.outbox_dir(), PathBuf::from("/var/lib/mixtape/outbox"));
    }
}
