//! Runtime settings.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Deserialize;

use crate::error::Error;

/// Environment variable toggling [`Settings::debug_authorization`].
pub const DEBUG_AUTHORIZATION_ENV: &str = "TILE_DEBUG_AUTHORIZATION";

/// Settings read by the registry at render time.
///
/// ```
/// use tile_core::Settings;
///
/// let settings = Settings::from_toml_str(r#"
///     debug_authorization = true
///
///     [templates]
///     myapp = "templates"
/// "#).unwrap();
///
/// assert!(settings.debug_authorization);
/// assert_eq!(settings.templates["myapp"].to_str(), Some("templates"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Log consumed authorization failures of lenient tiles.
    pub debug_authorization: bool,
    /// Template directory per namespace.
    pub templates: BTreeMap<String, PathBuf>,
}

impl Settings {
    /// Parses settings from TOML.
    ///
    /// # Errors
    ///
    /// Returns `Error::Settings` if the document is malformed.
    pub fn from_toml_str(source: &str) -> Result<Self, Error> {
        toml::from_str(source).map_err(|e| Error::Settings(e.to_string()))
    }

    /// Default settings overridden from the process environment.
    pub fn from_env() -> Self {
        let mut settings = Self::default();
        if let Ok(value) = std::env::var(DEBUG_AUTHORIZATION_ENV) {
            settings.debug_authorization = parse_flag(&value);
        }
        settings
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
