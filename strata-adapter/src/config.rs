//! Adapter configuration: filter thresholds and category-id remapping.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

/// Excluded-category sentinel produced by the remapping table.
pub const EXCLUDED_ID: i64 = -1;

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read id map: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse id map: {0}")]
    Json(#[from] serde_json::Error),

    #[error("id map key `{0}` is not an integer")]
    BadKey(String),
}

/// Read-only configuration captured once at pipeline construction.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AdapterConfig {
    /// Optional category-id remapping. A present, non-empty table acts as
    /// an allow-list: unmapped ids become [`EXCLUDED_ID`] and are dropped.
    /// `None` or an empty table is identity passthrough.
    pub category_id_remapping: Option<HashMap<i64, i64>>,
    /// Keep objects whose 2D box area is strictly greater than this.
    pub min_2d_area: f32,
    /// Keep objects whose camera-frame depth is at least this (inclusive).
    pub min_depth: f32,
    /// Keep objects whose camera-frame depth is at most this (inclusive).
    pub max_depth: f32,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            category_id_remapping: None,
            min_2d_area: 100.0,
            min_depth: 0.3,
            max_depth: 5.0,
        }
    }
}

impl AdapterConfig {
    /// Default thresholds with a remapping table loaded from a JSON file
    /// (string keys, integer values).
    pub fn with_id_map_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        Ok(Self {
            category_id_remapping: Some(load_id_map(path)?),
            ..Default::default()
        })
    }

    /// Remap one raw id through the table.
    pub fn remap(&self, id: i64) -> i64 {
        match &self.category_id_remapping {
            Some(map) if !map.is_empty() => map.get(&id).copied().unwrap_or(EXCLUDED_ID),
            _ => id,
        }
    }
}

/// Load an id→id map from JSON with string keys, e.g. `{"5": 2}`.
pub fn load_id_map<P: AsRef<Path>>(path: P) -> Result<HashMap<i64, i64>, ConfigError> {
    let raw: HashMap<String, i64> = serde_json::from_str(&fs::read_to_string(path)?)?;
    raw.into_iter()
        .map(|(k, v)| {
            let k = k.parse::<i64>().map_err(|_| ConfigError::BadKey(k))?;
            Ok((k, v))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AdapterConfig::default();
        assert_eq!(config.min_2d_area, 100.0);
        assert_eq!(config.min_depth, 0.3);
        assert_eq!(config.max_depth, 5.0);
        assert!(config.category_id_remapping.is_none());
    }

    #[test]
    fn test_remap_table_is_an_allow_list() {
        let config = AdapterConfig {
            category_id_remapping: Some([(5, 2)].into_iter().collect()),
            ..Default::default()
        };
        let kept: Vec<bool> = [5i64, 7].iter().map(|&id| config.remap(id) >= 0).collect();
        assert_eq!(kept, vec![true, false]);
        assert_eq!(config.remap(5), 2);
        assert_eq!(config.remap(7), EXCLUDED_ID);
    }

    #[test]
    fn test_missing_or_empty_table_is_passthrough() {
        let none = AdapterConfig::default();
        assert_eq!(none.remap(42), 42);

        let empty = AdapterConfig {
            category_id_remapping: Some(HashMap::new()),
            ..Default::default()
        };
        assert_eq!(empty.remap(42), 42);
    }

    #[test]
    fn test_config_deserializes_with_defaults() {
        let config: AdapterConfig = serde_json::from_str(r#"{"max_depth": 10.0}"#).unwrap();
        assert_eq!(config.max_depth, 10.0);
        assert_eq!(config.min_2d_area, 100.0);
    }
}
