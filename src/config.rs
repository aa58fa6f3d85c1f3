//! Configuration for likevault.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (LIKEVAULT_HOME)
//! 2. Config file (.likevault/config.yaml)
//! 3. Defaults (~/.likevault)
//!
//! Config file discovery:
//! - Searches current directory and parents for .likevault/config.yaml
//! - Paths in config file are relative to the directory containing .likevault/

pub mod paths;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;

pub use paths::OutputLayout;

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<ResolvedConfig, String>> = OnceLock::new();

/// Upper bound on concurrent media downloads
pub const MAX_MEDIA_WORKERS: usize = 32;

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    pub version: String,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub feed: FeedSettings,
    #[serde(default)]
    pub sync: SyncSettings,
    #[serde(default)]
    pub media: MediaSettings,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// Output directory (relative to the project root)
    pub output: Option<String>,
}

/// Upstream feed request settings
#[derive(Debug, Clone, Deserialize)]
pub struct FeedSettings {
    /// Likes query endpoint
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Account whose likes are harvested
    #[serde(default)]
    pub user_id: String,

    /// Headers sent with every page request (auth, cookies, csrf)
    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    /// Extra query variables merged into `variables`
    #[serde(default)]
    pub variables: serde_json::Map<String, Value>,

    /// Feature flags sent as `features`
    #[serde(default)]
    pub features: serde_json::Map<String, Value>,

    /// JSON pointer to the entry list inside a response
    #[serde(default = "default_entries_pointer")]
    pub entries_pointer: String,

    /// Per-page request timeout
    #[serde(default = "default_feed_timeout")]
    pub request_timeout_seconds: u64,
}

fn default_endpoint() -> String {
    "https://api.twitter.com/graphql/QK8AVO3RpcnbLPKXLAiVog/Likes".to_string()
}
fn default_entries_pointer() -> String {
    "/data/user/result/timeline_v2/timeline/instructions/0/entries".to_string()
}
fn default_feed_timeout() -> u64 {
    15
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            user_id: String::new(),
            headers: BTreeMap::new(),
            variables: serde_json::Map::new(),
            features: serde_json::Map::new(),
            entries_pointer: default_entries_pointer(),
            request_timeout_seconds: default_feed_timeout(),
        }
    }
}

impl FeedSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

/// Harvest settings
#[derive(Debug, Clone, Deserialize)]
pub struct SyncSettings {
    /// Consecutive already-known records that end a harvest
    #[serde(default = "default_seen_limit")]
    pub consecutive_seen_limit: usize,

    /// Records requested per page
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

fn default_seen_limit() -> usize {
    50
}
fn default_page_size() -> u32 {
    100
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            consecutive_seen_limit: default_seen_limit(),
            page_size: default_page_size(),
        }
    }
}

/// Media cache settings
#[derive(Debug, Clone, Deserialize)]
pub struct MediaSettings {
    /// Download media at all (when false URLs are passed through)
    #[serde(default = "default_download")]
    pub download: bool,

    /// Concurrent downloads (defaults to 4x available parallelism, capped at 32)
    #[serde(default)]
    pub max_workers: Option<usize>,

    /// Per-file request timeout
    #[serde(default = "default_media_timeout")]
    pub request_timeout_seconds: u64,

    /// Extensions normalized to WebP on store
    #[serde(default = "default_convert_extensions")]
    pub convert_extensions: Vec<String>,

    /// Lossy WebP quality (0-100) for normalized images
    #[serde(default = "default_webp_quality")]
    pub webp_quality: u8,
}

fn default_download() -> bool {
    true
}
fn default_media_timeout() -> u64 {
    10
}
fn default_convert_extensions() -> Vec<String> {
    vec![".jpg".to_string(), ".jpeg".to_string(), ".png".to_string()]
}
fn default_webp_quality() -> u8 {
    crate::media::DEFAULT_WEBP_QUALITY
}

impl Default for MediaSettings {
    fn default() -> Self {
        Self {
            download: default_download(),
            max_workers: None,
            request_timeout_seconds: default_media_timeout(),
            convert_extensions: default_convert_extensions(),
            webp_quality: default_webp_quality(),
        }
    }
}

impl MediaSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    /// Effective worker count, always within 1..=MAX_MEDIA_WORKERS
    pub fn workers(&self) -> usize {
        let requested = self.max_workers.unwrap_or_else(|| {
            let cpus = std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1);
            cpus * 4
        });
        requested.clamp(1, MAX_MEDIA_WORKERS)
    }
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Output directory (corpus, indices, media)
    pub output: PathBuf,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
    pub feed: FeedSettings,
    pub sync: SyncSettings,
    pub media: MediaSettings,
}

impl ResolvedConfig {
    /// File layout under the output directory
    pub fn layout(&self) -> OutputLayout {
        OutputLayout::new(&self.output)
    }
}

/// Find config file by searching current directory and parents
fn find_config_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(".likevault").join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to the project root
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
            .canonicalize()
            .unwrap_or_else(|_| base.join(path_str))
    }
}

/// Load configuration from all sources
fn load_config() -> Result<ResolvedConfig> {
    let default_output = dirs::home_dir()
        .context("Failed to determine home directory")?
        .join(".likevault");

    let env_output = std::env::var("LIKEVAULT_HOME").ok().map(PathBuf::from);

    let config_file = find_config_file();

    let resolved = if let Some(ref config_path) = config_file {
        let config = load_config_file(config_path)?;

        // Base directory is the parent of .likevault/
        let base_dir = config_path
            .parent()
            .and_then(|p| p.parent())
            .unwrap_or(Path::new("."));

        let output = match (env_output, config.paths.output.as_deref()) {
            (Some(env), _) => env,
            (None, Some(path)) => resolve_path(base_dir, path),
            (None, None) => default_output,
        };

        ResolvedConfig {
            output,
            config_file: config_file.clone(),
            feed: config.feed,
            sync: config.sync,
            media: config.media,
        }
    } else {
        ResolvedConfig {
            output: env_output.unwrap_or(default_output),
            config_file: None,
            feed: FeedSettings::default(),
            sync: SyncSettings::default(),
            media: MediaSettings::default(),
        }
    };

    Ok(resolved)
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| e.to_string()));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}

/// Force reload configuration (useful for testing)
pub fn reload_config() -> Result<ResolvedConfig> {
    load_config()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_config_file_parsing() {
        let temp = TempDir::new().unwrap();
        let config_dir = temp.path().join(".likevault");
        std::fs::create_dir_all(&config_dir).unwrap();

        let config_path = config_dir.join("config.yaml");
        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(
            file,
            r#"
version: "1.0"
paths:
  output: ./output
feed:
  user_id: "12345"
  headers:
    Authorization: Bearer token
  variables:
    withV2Timeline: true
sync:
  consecutive_seen_limit: 10
media:
  download: false
  max_workers: 8
"#
        )
        .unwrap();

        let config = load_config_file(&config_path).unwrap();
        assert_eq!(config.version, "1.0");
        assert_eq!(config.paths.output, Some("./output".to_string()));
        assert_eq!(config.feed.user_id, "12345");
        assert_eq!(
            config.feed.headers.get("Authorization"),
            Some(&"Bearer token".to_string())
        );
        assert_eq!(config.feed.variables.get("withV2Timeline"), Some(&Value::Bool(true)));
        assert_eq!(config.feed.request_timeout_seconds, 15);
        assert_eq!(config.sync.consecutive_seen_limit, 10);
        assert_eq!(config.sync.page_size, 100);
        assert!(!config.media.download);
        assert_eq!(config.media.workers(), 8);
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config: ConfigFile = serde_yaml::from_str("version: \"1.0\"\n").unwrap();
        assert!(config.paths.output.is_none());
        assert_eq!(config.sync.consecutive_seen_limit, 50);
        assert!(config.media.download);
        assert_eq!(config.media.request_timeout_seconds, 10);
        assert_eq!(
            config.media.convert_extensions,
            vec![".jpg", ".jpeg", ".png"]
        );
        assert_eq!(config.media.webp_quality, 60);
        assert!(config.feed.entries_pointer.starts_with("/data/user"));
    }

    #[test]
    fn test_worker_count_is_capped() {
        let media = MediaSettings {
            max_workers: Some(500),
            ..Default::default()
        };
        assert_eq!(media.workers(), MAX_MEDIA_WORKERS);

        let media = MediaSettings {
            max_workers: Some(0),
            ..Default::default()
        };
        assert_eq!(media.workers(), 1);

        let media = MediaSettings::default();
        assert!((1..=MAX_MEDIA_WORKERS).contains(&media.workers()));
    }

    #[test]
    fn test_resolve_relative_path() {
        let base = PathBuf::from("/home/user/project");

        assert_eq!(
            resolve_path(&base, "./subdir"),
            PathBuf::from("/home/user/project/subdir")
        );
        assert_eq!(
            resolve_path(&base, "/absolute/path"),
            PathBuf::from("/absolute/path")
        );
    }
}
