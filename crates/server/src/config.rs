use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub const CONFIG_VERSION: u32 = 2;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LibraryConfig {
    pub name: String,
    pub path: String,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            name: "Music".to_string(),
            path: String::new(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub version: u32,
    /// Pre-v2 single-root key; migrated into `libraries` on load.
    #[serde(skip_serializing)]
    pub music_root: String,
    pub libraries: Vec<LibraryConfig>,
    pub index_path: String,
    pub port: u16,
    pub watch_music: bool,
    pub watch_debounce_secs: u64,
    pub scan_on_start: bool,
    pub scan_workers: usize,
    pub scan_batch_size: usize,
    pub scan_batch_timeout_secs: u64,
    pub missing_retention_days: u64,
    pub extractor: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            music_root: String::new(),
            libraries: Vec::new(),
            index_path: "library.redb".to_string(),
            port: 3000,
            watch_music: true,
            watch_debounce_secs: 2,
            scan_on_start: true,
            scan_workers: 4,
            scan_batch_size: 100,
            scan_batch_timeout_secs: 60,
            missing_retention_days: 30,
            extractor: "lofty".to_string(),
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Yaml(serde_yaml::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(err) => write!(f, "io error: {}", err),
            ConfigError::Yaml(err) => write!(f, "yaml error: {}", err),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::Io(err)
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        ConfigError::Yaml(err)
    }
}

pub fn config_path_from_env() -> PathBuf {
    match env::var("CLINKSTONE_CONFIG") {
        Ok(value) if !value.trim().is_empty() => PathBuf::from(value),
        _ => default_config_path(),
    }
}

fn default_config_path() -> PathBuf {
    match env::current_exe() {
        Ok(exe) => exe
            .parent()
            .map(|dir| dir.join("config.yaml"))
            .unwrap_or_else(|| PathBuf::from("config.yaml")),
        Err(_) => PathBuf::from("config.yaml"),
    }
}

pub fn load_or_create_config(path: &Path) -> Result<(ServerConfig, bool), ConfigError> {
    if path.exists() {
        let contents = fs::read_to_string(path)?;
        let mut config: ServerConfig = serde_yaml::from_str(&contents)?;
        let legacy_root = config.music_root.trim().to_string();
        if config.libraries.is_empty() && !legacy_root.is_empty() {
            config.libraries.push(LibraryConfig {
                name: "Music".to_string(),
                path: legacy_root,
            });
        }
        if config.version < CONFIG_VERSION {
            config.version = CONFIG_VERSION;
        }
        if config.index_path.trim().is_empty() {
            config.index_path = "library.redb".to_string();
        }
        if config.port == 0 {
            config.port = 3000;
        }
        if config.scan_workers == 0 {
            config.scan_workers = 4;
        }
        if config.scan_batch_size == 0 {
            config.scan_batch_size = 100;
        }
        if config.scan_batch_timeout_secs == 0 {
            config.scan_batch_timeout_secs = 60;
        }
        if config.extractor.trim().is_empty() {
            config.extractor = "lofty".to_string();
        }
        return Ok((config, false));
    }

    let config = ServerConfig::default();
    save_config(path, &config)?;
    Ok((config, true))
}

pub fn save_config(path: &Path, config: &ServerConfig) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let contents = serde_yaml::to_string(config)?;
    fs::write(path, contents)?;
    Ok(())
}

pub fn resolve_path(config_path: &Path, value: &str) -> PathBuf {
    let raw = PathBuf::from(value);
    if raw.is_absolute() {
        return raw;
    }
    let base = config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    base.join(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_round_trip_through_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        let (created, was_new) = load_or_create_config(&path).unwrap();
        assert!(was_new);
        let (loaded, was_new) = load_or_create_config(&path).unwrap();
        assert!(!was_new);
        assert_eq!(created.port, loaded.port);
        assert_eq!(loaded.scan_workers, 4);
        assert_eq!(loaded.extractor, "lofty");
    }

    #[test]
    fn legacy_music_root_migrates_into_libraries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "version: 1\nmusic_root: /srv/music\n").unwrap();
        let (config, _) = load_or_create_config(&path).unwrap();
        assert_eq!(config.libraries.len(), 1);
        assert_eq!(config.libraries[0].path, "/srv/music");
        assert_eq!(config.version, CONFIG_VERSION);
    }

    #[test]
    fn relative_paths_resolve_against_config_dir() {
        let config_path = Path::new("/etc/clinkstone/config.yaml");
        assert_eq!(
            resolve_path(config_path, "library.redb"),
            Path::new("/etc/clinkstone/library.redb")
        );
        assert_eq!(
            resolve_path(config_path, "/data/x.redb"),
            Path::new("/data/x.redb")
        );
    }
}
