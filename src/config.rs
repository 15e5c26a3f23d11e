use std::fs;
use std::io;
use std::path::Path;

use failure::Fail;
use log::info;
use serde::{Deserialize, Serialize};

use super::filter_engine::RentBounds;
use super::listing_repo::{ColumnMap, SourceConfig};
use super::map_layer::MapSettings;

#[derive(Debug, Fail)]
pub enum ConfigError {
    #[fail(display = "I/O error: {}", _0)]
    Io(io::Error),
    #[fail(display = "Invalid config: {}", _0)]
    Json(serde_json::Error),
}

/// Everything the CLI can also set, loaded from a JSON file. Missing keys take defaults.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub source: SourceConfig,
    pub rent_bounds: RentBounds,
    pub map: MapSettings,
    pub columns: ColumnMap,
}

impl AppConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<AppConfig, ConfigError> {
        info!("Reading config from '{}'", path.as_ref().display());
        let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
        AppConfig::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<AppConfig, ConfigError> {
        serde_json::from_str(content).map_err(ConfigError::Json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listing_repo::SourceFormat;
    use assert_matches::assert_matches;

    #[test]
    fn it_should_default_everything_for_an_empty_object() {
        let config = AppConfig::from_json("{}").unwrap();

        assert_eq!(config, AppConfig::default());
        assert_eq!(config.rent_bounds.ceiling, 1_000_000);
        assert_eq!(config.map.style.color, [200, 30, 0, 160]);
        assert_eq!(config.map.view.zoom, 11.0);
        assert!(!config.map.recenter);
    }

    #[test]
    fn it_should_merge_partial_sections_with_defaults() {
        let config = AppConfig::from_json(
            r#"{
                "source": { "location": "https://example.com/listings", "format": "geojson" },
                "rent_bounds": { "ceiling": 300000 },
                "map": { "view": { "latitude": 35.68, "longitude": 139.76 }, "recenter": true },
                "columns": { "rent": ["monthly_rent"] }
            }"#,
        )
        .unwrap();

        assert_eq!(config.source.format, Some(SourceFormat::GeoJson));
        assert_eq!(config.source.delimiter, ',');
        assert_eq!(config.rent_bounds.floor, 0);
        assert_eq!(config.rent_bounds.ceiling, 300000);
        assert_eq!(config.map.view.latitude, 35.68);
        assert_eq!(config.map.view.pitch, 50.0);
        assert_eq!(config.columns.rent, vec!["monthly_rent".to_owned()]);
        assert_eq!(config.columns.name, ColumnMap::default().name);
    }

    #[test]
    fn it_should_reject_malformed_config() {
        assert_matches!(
            AppConfig::from_json(r#"{"rent_bounds": {"ceiling": "lots"}}"#),
            Err(ConfigError::Json(_))
        );
    }

    #[test]
    fn it_should_fail_on_a_missing_file() {
        assert_matches!(
            AppConfig::load("/nonexistent/listing-search.json"),
            Err(ConfigError::Io(_))
        );
    }
}
