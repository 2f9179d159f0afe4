use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::{SettingsStore, StoreError};

const CONFIG_DIR: &str = ".config/alarm-bridge";
const SETTINGS_FILE: &str = "settings.toml";
/// Environment variable that overrides the settings file location.
pub const SETTINGS_PATH_ENV: &str = "ALARM_BRIDGE_SETTINGS";

/// Settings kept as a flat TOML table. Every change is written through.
#[derive(Debug)]
pub struct TomlFileStore {
    path: PathBuf,
    values: BTreeMap<String, String>,
}

impl TomlFileStore {
    /// `$ALARM_BRIDGE_SETTINGS`, else `~/.config/alarm-bridge/settings.toml`.
    pub fn default_path() -> PathBuf {
        if let Some(path) = std::env::var_os(SETTINGS_PATH_ENV).filter(|p| !p.is_empty()) {
            return PathBuf::from(path);
        }
        let mut path = get_home_dir();
        path.push(CONFIG_DIR);
        path.push(SETTINGS_FILE);
        path
    }

    /// Loads the file at `path`. A missing file gives an empty store.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let values = if tokio::fs::try_exists(&path).await? {
            let content = tokio::fs::read_to_string(&path).await?;
            let values = parse_table(&content)?;
            info!("Loaded {} setting(s) from {}", values.len(), path.display());
            values
        } else {
            warn!(
                "Settings file {} does not exist, using defaults",
                path.display()
            );
            BTreeMap::new()
        };
        Ok(Self { path, values })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(&self.values).map_err(|e| StoreError::Serialize(e.to_string()))?;
        let tmp = self.path.with_extension("toml.tmp");
        std::fs::write(&tmp, content)?;
        std::fs::rename(&tmp, &self.path)?;
        debug!("Settings written to {}", self.path.display());
        Ok(())
    }
}

impl SettingsStore for TomlFileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        if self.values.get(key).map(String::as_str) == Some(value) {
            return Ok(());
        }
        self.values.insert(key.to_string(), value.to_string());
        self.persist()
    }

    fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        if self.values.remove(key).is_some() {
            self.persist()?;
        }
        Ok(())
    }
}

/// Reads a flat table. Scalars are kept as their textual form so hand-edited
/// files may write `tls = true` or `qos = 1`; nested values are skipped.
fn parse_table(content: &str) -> Result<BTreeMap<String, String>, StoreError> {
    let table: toml::Table = content
        .parse()
        .map_err(|e: toml::de::Error| StoreError::Parse(e.to_string()))?;

    let mut values = BTreeMap::new();
    for (key, value) in table {
        let text = match value {
            toml::Value::String(s) => s,
            toml::Value::Boolean(b) => b.to_string(),
            toml::Value::Integer(i) => i.to_string(),
            toml::Value::Float(f) => f.to_string(),
            other => {
                warn!("Ignoring setting '{}': unsupported {} value", key, other.type_str());
                continue;
            }
        };
        values.insert(key, text);
    }
    Ok(values)
}

fn get_home_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| {
        warn!("Could not determine home directory, using current directory");
        PathBuf::from(".")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = TomlFileStore::open(dir.path().join("nope.toml")).await.unwrap();
        assert_eq!(store.get("brokerUrl"), None);
    }

    #[tokio::test]
    async fn writes_through_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.toml");

        let mut store = TomlFileStore::open(&path).await.unwrap();
        store.set("brokerUrl", "mqtt://10.0.0.2:1883").unwrap();
        store.set("sensor.door.name", "Front door").unwrap();
        store.set("qos", "1").unwrap();
        store.remove("qos").unwrap();

        let reopened = TomlFileStore::open(&path).await.unwrap();
        assert_eq!(reopened.path(), path.as_path());
        assert_eq!(
            reopened.get("brokerUrl").as_deref(),
            Some("mqtt://10.0.0.2:1883")
        );
        assert_eq!(reopened.get("sensor.door.name").as_deref(), Some("Front door"));
        assert_eq!(reopened.get("qos"), None);
    }

    #[tokio::test]
    async fn hand_written_scalars_are_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        tokio::fs::write(&path, "tls = true\nqos = 2\nbrokerUrl = \"mqtts://b\"\n[nested]\nx = 1\n")
            .await
            .unwrap();

        let store = TomlFileStore::open(&path).await.unwrap();
        assert_eq!(store.get("tls").as_deref(), Some("true"));
        assert_eq!(store.get("qos").as_deref(), Some("2"));
        assert_eq!(store.get("nested"), None);
    }

    #[tokio::test]
    async fn garbage_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        tokio::fs::write(&path, "this is = = not toml").await.unwrap();
        assert!(matches!(
            TomlFileStore::open(&path).await,
            Err(StoreError::Parse(_))
        ));
    }
}
