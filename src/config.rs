use serde::Deserialize;
use std::{fs, path::Path};
use toml_edit::{DocumentMut, value};

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: String,
    /// How many summaries the list view keeps.
    #[serde(default = "default_list_limit")]
    pub list_limit: usize,
    #[serde(default)]
    pub capture: CaptureConfig,
}

fn default_db_path() -> String {
    "einvoice/invoices.db".to_string()
}

fn default_list_limit() -> usize {
    200
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CaptureConfig {
    /// Quiet period after a capture during which new triggers are ignored.
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,
}

fn default_cooldown_ms() -> u64 {
    600
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            cooldown_ms: default_cooldown_ms(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            list_limit: default_list_limit(),
            capture: CaptureConfig::default(),
        }
    }
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Box<dyn std::error::Error>> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Like [`Config::load`], but a missing file yields the defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, Box<dyn std::error::Error>> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Rewrite `db_path` in place, keeping the rest of the file as written.
    pub fn update_db_path(
        path: impl AsRef<Path>,
        new_path: &str,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let content = if path.as_ref().exists() {
            fs::read_to_string(&path)?
        } else {
            String::new()
        };
        let mut doc = content.parse::<DocumentMut>()?;

        doc["db_path"] = value(new_path);

        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, doc.to_string())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_missing_fields() {
        let cfg: Config = toml::from_str("list_limit = 20").unwrap();
        assert_eq!(cfg.db_path, "einvoice/invoices.db");
        assert_eq!(cfg.list_limit, 20);
        assert_eq!(cfg.capture.cooldown_ms, 600);
    }

    #[test]
    fn test_capture_section() {
        let cfg: Config = toml::from_str("[capture]\ncooldown_ms = 0\n").unwrap();
        assert_eq!(cfg.capture.cooldown_ms, 0);
        assert_eq!(cfg.list_limit, 200);
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        assert!(Config::load(&path).is_err());
        assert_eq!(Config::load_or_default(&path).unwrap(), Config::default());
    }

    #[test]
    fn test_update_db_path_keeps_comments() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("einvoice.toml");
        fs::write(&path, "# scanner settings\ndb_path = \"old.db\"\n\n[capture]\ncooldown_ms = 250\n")
            .unwrap();

        Config::update_db_path(&path, "new.db").unwrap();

        let written = fs::read_to_string(&path).unwrap();
        assert!(written.starts_with("# scanner settings"));
        let cfg = Config::load(&path).unwrap();
        assert_eq!(cfg.db_path, "new.db");
        assert_eq!(cfg.capture.cooldown_ms, 250);
    }
}
