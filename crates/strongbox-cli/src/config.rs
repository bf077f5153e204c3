use std::{
    fs,
    path::{Path, PathBuf},
};

use color_eyre::Result;
use dirs::config_dir;
use serde::{Deserialize, Serialize};

pub const DEFAULT_SERVICE: &str = "strongboxSecureStorage";
pub const DEFAULT_NAMESPACE: &str = "group.strongbox";

/// User-level configuration loaded from `~/.config/strongbox/config.toml` (platform-specific).
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Override for the record store directory.
    pub data_dir: Option<PathBuf>,
    /// Keyring service that scopes all key material.
    pub service: String,
    /// Record store namespace.
    pub namespace: String,
    /// Access group for new key material (not every backend supports it).
    pub access_group: Option<String>,
    /// Fail writes when key material cannot be saved to the keyring.
    pub require_key_persistence: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: None,
            service: DEFAULT_SERVICE.to_string(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            access_group: None,
            require_key_persistence: false,
        }
    }
}

/// Load config from the default path; if missing, return defaults.
pub fn load() -> Result<Config> {
    let path = default_path()?;
    load_from_path(path)
}

/// Load config from a given path; if missing or empty, return defaults.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<Config> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(Config::default());
    }
    let contents = fs::read_to_string(path)?;
    if contents.trim().is_empty() {
        return Ok(Config::default());
    }
    let cfg: Config = toml::from_str(&contents)?;
    Ok(cfg)
}

/// Resolve the default config path (platform aware).
pub fn default_path() -> Result<PathBuf> {
    let base = config_dir().ok_or_else(|| color_eyre::eyre::eyre!("no config dir available"))?;
    Ok(base.join("strongbox").join("config.toml"))
}

/// Write the given config to disk unless a file already exists there.
pub fn write_default_if_missing(config: &Config) -> Result<PathBuf> {
    let path = default_path()?;
    write_if_missing(config, &path)?;
    Ok(path)
}

fn write_if_missing(config: &Config, path: &Path) -> Result<()> {
    if path.exists() {
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let body = toml::to_string_pretty(config)?;
    fs::write(path, body)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn returns_default_when_missing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cfg = load_from_path(dir.path().join("config.toml")).expect("load");
        assert_eq!(cfg, Config::default());
        assert_eq!(cfg.service, DEFAULT_SERVICE);
    }

    #[test]
    fn parses_partial_config_with_defaults() {
        let contents = r#"
            data_dir = "/tmp/strongbox-data"
            access_group = "TEAM.com.example.shared"
            require_key_persistence = true
        "#;
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        fs::write(&path, contents).expect("write temp config");

        let cfg = load_from_path(&path).expect("load");
        assert_eq!(
            cfg,
            Config {
                data_dir: Some(PathBuf::from("/tmp/strongbox-data")),
                service: DEFAULT_SERVICE.into(),
                namespace: DEFAULT_NAMESPACE.into(),
                access_group: Some("TEAM.com.example.shared".into()),
                require_key_persistence: true,
            }
        );
    }

    #[test]
    fn write_creates_file_once() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("config.toml");
        let cfg = Config {
            namespace: "group.custom".into(),
            ..Config::default()
        };

        write_if_missing(&cfg, &path).expect("write should succeed");
        write_if_missing(&Config::default(), &path).expect("second write ok");
        let loaded = load_from_path(&path).expect("load");
        assert_eq!(loaded, cfg);
    }
}
