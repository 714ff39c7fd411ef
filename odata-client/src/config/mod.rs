//! Client settings
//!
//! Settings are read from a TOML file (by default
//! `<config_dir>/odata-client/config.toml`), after `.env` has been loaded;
//! `ODATA_SERVICE_ROOT_URL` overrides the service root. [`SettingsBuilder`]
//! builds the same structure in code.

use crate::api::error::{ODataError, Result};
use crate::api::metadata::{SchemaConfig, TypeRegistry};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Environment variable overriding the service root URL
pub const SERVICE_ROOT_ENV: &str = "ODATA_SERVICE_ROOT_URL";

/// `odata.metadata` level requested through the Accept header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AcceptMetadata {
    Minimal,
    Full,
    None,
}

impl AcceptMetadata {
    pub fn as_str(&self) -> &'static str {
        match self {
            AcceptMetadata::Minimal => "minimal",
            AcceptMetadata::Full => "full",
            AcceptMetadata::None => "none",
        }
    }

    pub fn header_value(&self) -> String {
        format!(
            "application/json;odata.metadata={}, text/plain, */*",
            self.as_str()
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub service_root_url: String,
    /// Query parameters sent with every request
    #[serde(default)]
    pub params: BTreeMap<String, String>,
    /// Headers sent with every request
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub with_credentials: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accept_metadata: Option<AcceptMetadata>,
    /// Render enum literals as plain strings
    #[serde(default)]
    pub string_as_enum: bool,
    #[serde(default)]
    pub schemas: Vec<SchemaConfig>,
}

impl Settings {
    pub fn builder(service_root_url: impl Into<String>) -> SettingsBuilder {
        SettingsBuilder::new(service_root_url)
    }

    /// Validate and normalize: no query string, trailing slash
    pub fn normalized(mut self) -> Result<Self> {
        if self.service_root_url.contains('?') {
            return Err(ODataError::configuration(format!(
                "service root URL must not contain a query string: {}",
                self.service_root_url
            )));
        }
        if self.service_root_url.trim().is_empty() {
            return Err(ODataError::configuration("service root URL is empty"));
        }
        if !self.service_root_url.ends_with('/') {
            self.service_root_url.push('/');
        }
        Ok(self)
    }

    pub fn metadata_url(&self) -> String {
        format!("{}$metadata", self.service_root_url)
    }

    pub fn registry(&self) -> TypeRegistry {
        TypeRegistry::new(self.schemas.clone()).with_string_as_enum(self.string_as_enum)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let settings: Settings = toml::from_str(content)?;
        Ok(settings.normalized()?)
    }

    /// `<config_dir>/odata-client/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("odata-client").join("config.toml"))
    }

    /// Load settings from `path` (or the default location), applying the
    /// environment override
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        use anyhow::Context;

        let path = match path {
            Some(path) => path.to_path_buf(),
            None => Self::default_path().context("Could not determine config directory")?,
        };
        log::debug!("Loading settings from {}", path.display());

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read settings file: {}", path.display()))?;
        let mut settings: Settings = toml::from_str(&content)
            .with_context(|| format!("Failed to parse settings file: {}", path.display()))?;

        if let Ok(url) = std::env::var(SERVICE_ROOT_ENV) {
            log::debug!("Service root overridden by {}", SERVICE_ROOT_ENV);
            settings.service_root_url = url;
        }

        Ok(settings.normalized()?)
    }
}

/// Fluent construction of [`Settings`]
#[derive(Debug, Clone)]
pub struct SettingsBuilder {
    settings: Settings,
}

impl SettingsBuilder {
    pub fn new(service_root_url: impl Into<String>) -> Self {
        Self {
            settings: Settings {
                service_root_url: service_root_url.into(),
                params: BTreeMap::new(),
                headers: BTreeMap::new(),
                with_credentials: false,
                accept_metadata: None,
                string_as_enum: false,
                schemas: Vec::new(),
            },
        }
    }

    pub fn param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.settings.params.insert(name.into(), value.into());
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.settings.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_credentials(mut self, with_credentials: bool) -> Self {
        self.settings.with_credentials = with_credentials;
        self
    }

    pub fn accept_metadata(mut self, level: AcceptMetadata) -> Self {
        self.settings.accept_metadata = Some(level);
        self
    }

    pub fn string_as_enum(mut self, enabled: bool) -> Self {
        self.settings.string_as_enum = enabled;
        self
    }

    pub fn schema(mut self, schema: SchemaConfig) -> Self {
        self.settings.schemas.push(schema);
        self
    }

    pub fn build(self) -> Result<Settings> {
        self.settings.normalized()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_normalizes_trailing_slash() {
        let settings = Settings::builder("https://services.example.org/V4/TripPin")
            .build()
            .unwrap();
        assert_eq!(settings.service_root_url, "https://services.example.org/V4/TripPin/");
        assert_eq!(
            settings.metadata_url(),
            "https://services.example.org/V4/TripPin/$metadata"
        );
    }

    #[test]
    fn test_rejects_query_string() {
        let err = Settings::builder("https://example.org/svc?x=1").build().unwrap_err();
        assert!(matches!(err, ODataError::Configuration(_)));
    }

    #[test]
    fn test_accept_header_value() {
        assert_eq!(
            AcceptMetadata::Minimal.header_value(),
            "application/json;odata.metadata=minimal, text/plain, */*"
        );
    }

    #[test]
    fn test_from_toml() {
        let settings = Settings::from_toml_str(
            r#"
            service_root_url = "https://example.org/svc"
            accept_metadata = "full"

            [headers]
            "OData-Version" = "4.0"

            [[schemas]]
            namespace = "Demo"

            [[schemas.entities]]
            name = "Product"
            set = "Products"
            fields = [{ name = "ID", type = "Edm.Int32", key = true }]
            "#,
        )
        .unwrap();

        assert_eq!(settings.accept_metadata, Some(AcceptMetadata::Full));
        assert_eq!(settings.headers["OData-Version"], "4.0");
        assert_eq!(settings.registry().type_for_set("Products").as_deref(), Some("Demo.Product"));
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!("odata-settings-{}.toml", uuid::Uuid::new_v4()));
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "service_root_url = \"https://example.org/odata\"").unwrap();
        drop(file);

        let settings = Settings::load(Some(&path)).unwrap();
        let _ = std::fs::remove_file(&path);
        if std::env::var(SERVICE_ROOT_ENV).is_err() {
            assert_eq!(settings.service_root_url, "https://example.org/odata/");
        }
    }

    #[test]
    fn test_load_missing_file_fails() {
        let path = std::env::temp_dir().join("odata-settings-does-not-exist.toml");
        assert!(Settings::load(Some(&path)).is_err());
    }
}
