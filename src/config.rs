use crate::errors::AppResult;
use crate::models::BoardsSettings;
use anyhow::Context;
use std::path::Path;

pub const SETTINGS_ENV: &str = "OPEN_BOARDS_CONFIG";

impl BoardsSettings {
    /// Reads settings from a YAML file. A missing file yields the defaults;
    /// keys absent from the file keep their default values.
    pub fn load(path: &Path) -> AppResult<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.to_string_lossy(), "settings file not found; using defaults");
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading settings from {}", path.to_string_lossy()))?;
        Self::from_yaml(&raw)
    }

    pub fn from_yaml(raw: &str) -> AppResult<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(raw)?)
    }

    /// Loads from `$OPEN_BOARDS_CONFIG` when set, defaults otherwise.
    pub fn from_env() -> AppResult<Self> {
        match std::env::var_os(SETTINGS_ENV) {
            Some(path) => Self::load(Path::new(&path)),
            None => Ok(Self::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::models::BoardsSettings;

    #[test]
    fn partial_yaml_keeps_defaults() {
        let settings = BoardsSettings::from_yaml(
            "collection: TeamBoards\ngrid:\n  reconcileDefaultW: 8\n",
        )
        .expect("parse settings");
        assert_eq!(settings.collection, "TeamBoards");
        assert_eq!(settings.grid.reconcile_default_w, 8);
        assert_eq!(settings.grid.reconcile_default_h, 4);
        assert_eq!(settings.entity_widget.w, 7);
        assert_eq!(settings.log_filter, "info");
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let settings = BoardsSettings::load(&dir.path().join("absent.yaml")).expect("defaults");
        assert_eq!(settings, BoardsSettings::default());
    }

    #[test]
    fn malformed_yaml_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("settings.yaml");
        std::fs::write(&path, "grid: [unbalanced").expect("write");
        assert!(BoardsSettings::load(&path).is_err());
    }
}
