//! Startup settings.
//!
//! [`Settings`] is read once from a JSON file before the window exists and is then
//! handed by reference to the components that need it. Reading is lenient: a missing
//! file, malformed JSON or a wrongly typed field never aborts startup, the affected
//! values simply keep their defaults.

use std::path::Path;

use serde::Serialize;
use serde_json::{Map, Value};

/// Errors raised while reading the settings file.
///
/// All of them are recoverable; [`Settings::load`] logs them and falls back to
/// [`Settings::default`].
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("could not read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("config is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("config root must be a JSON object")]
    NotAnObject,
}

/// Window, presentation and scene settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Settings {
    pub screen_width: u32,
    pub screen_height: u32,
    pub fullscreen: bool,
    pub vsync: bool,
    pub win_title: String,
    /// Path of the scene file to import. Empty means no scene.
    pub scene: String,
    /// Frame pacing target for the render loop.
    pub target_fps: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            screen_width: 800,
            screen_height: 600,
            fullscreen: false,
            vsync: false,
            win_title: "Whatever".to_string(),
            scene: String::new(),
            target_fps: 60,
        }
    }
}

impl Settings {
    /// Read settings from `path`, falling back to defaults on any error.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match Self::try_load(path) {
            Ok(settings) => settings,
            Err(e) => {
                log::warn!("{e}; using default settings");
                Self::default()
            }
        }
    }

    pub fn try_load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    /// Parse a settings document. Only fields with the expected JSON type are applied.
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let doc: Value = serde_json::from_str(text)?;
        let fields = doc.as_object().ok_or(ConfigError::NotAnObject)?;

        let mut settings = Self::default();
        apply(fields, "screen_width", as_u32, &mut settings.screen_width);
        apply(fields, "screen_height", as_u32, &mut settings.screen_height);
        apply(fields, "fullscreen", Value::as_bool, &mut settings.fullscreen);
        apply(fields, "vsync", Value::as_bool, &mut settings.vsync);
        apply(fields, "win_title", as_string, &mut settings.win_title);
        apply(fields, "scene", as_string, &mut settings.scene);
        apply(fields, "target_fps", as_u32, &mut settings.target_fps);
        Ok(settings)
    }
}

fn apply<T>(
    fields: &Map<String, Value>,
    key: &str,
    extract: impl Fn(&Value) -> Option<T>,
    slot: &mut T,
) {
    let Some(value) = fields.get(key) else {
        return;
    };
    match extract(value) {
        Some(v) => *slot = v,
        None => log::warn!("config field `{key}` has an unexpected type ({value}); keeping default"),
    }
}

fn as_u32(value: &Value) -> Option<u32> {
    value.as_u64().and_then(|v| u32::try_from(v).ok())
}

fn as_string(value: &Value) -> Option<String> {
    value.as_str().map(str::to_owned)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrongly_typed_fields_keep_defaults() {
        let settings =
            Settings::from_json_str(r#"{"screen_height": "tall", "fullscreen": 1, "win_title": "Demo"}"#)
                .unwrap();
        assert_eq!(settings.screen_height, 600);
        assert!(!settings.fullscreen);
        assert_eq!(settings.win_title, "Demo");
    }

    #[test]
    fn negative_and_oversized_sizes_are_ignored() {
        let settings =
            Settings::from_json_str(r#"{"screen_width": -5, "screen_height": 99999999999}"#).unwrap();
        assert_eq!(settings.screen_width, 800);
        assert_eq!(settings.screen_height, 600);
    }

    #[test]
    fn non_object_root_is_an_error() {
        assert!(matches!(
            Settings::from_json_str("[1, 2]"),
            Err(ConfigError::NotAnObject)
        ));
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let settings = Settings::load("definitely/not/here/config.json");
        assert_eq!(settings, Settings::default());
    }
}
