//! Binding configuration.
//!
//! [`BindingConfig`] collects the behaviour switches of the table and tree
//! bindings. It deserializes from TOML or JSON; every field is optional and
//! falls back to its default.
//!
//! ```ignore
//! let config = BindingConfig::from_toml_str(r#"
//! drop_edge_fraction = 0.25
//! allow_drop_to_index = true
//! multi_select = false
//! "#)?;
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use trellis_core::logging::targets;
use trellis_core::{BindingError, Result};

use crate::view::drag_drop::DEFAULT_EDGE_FRACTION;

/// Behaviour switches shared by the table and tree bindings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BindingConfig {
    /// Fraction of an item's extent at each edge that selects a before/after
    /// drop. Must lie in `0.0..0.5`.
    pub drop_edge_fraction: f32,
    /// Trees accept drops between nodes, not just onto them.
    pub allow_drop_to_index: bool,
    /// Scroll a selection that is entirely off screen into view.
    pub force_selection_display: bool,
    /// Restore selection and scroll position after a transaction.
    pub restore_on_transaction: bool,
    /// Allow more than one selected item.
    pub multi_select: bool,
    /// Disallow edits and drops.
    pub read_only: bool,
    /// Tree levels to expand on bind, in addition to nodes that ask for it.
    pub initial_expand_depth: usize,
    /// Scale user-set column widths to fill the view.
    pub smart_column_sizing: bool,
}

impl Default for BindingConfig {
    fn default() -> Self {
        Self {
            drop_edge_fraction: DEFAULT_EDGE_FRACTION,
            allow_drop_to_index: false,
            force_selection_display: true,
            restore_on_transaction: true,
            multi_select: true,
            read_only: false,
            initial_expand_depth: 0,
            smart_column_sizing: false,
        }
    }
}

impl BindingConfig {
    /// Parses and validates a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Parses and validates a JSON document.
    pub fn from_json_str(s: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(s)
            .map_err(|e| BindingError::InvalidConfig(format!("JSON: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a configuration file. `.json` files are read as JSON, anything
    /// else as TOML.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| BindingError::io(path, e))?;
        let config = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json_str(&content)?,
            _ => Self::from_toml_str(&content)?,
        };
        tracing::debug!(target: targets::CONFIG, path = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// Serializes to TOML.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string(self).map_err(|e| BindingError::InvalidConfig(e.to_string()))
    }

    /// Checks every field against its allowed range.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..0.5).contains(&self.drop_edge_fraction) {
            return Err(BindingError::InvalidConfig(format!(
                "drop_edge_fraction must be in 0.0..0.5, got {}",
                self.drop_edge_fraction
            )));
        }
        Ok(())
    }

    /// Sets `multi_select` (builder style).
    pub fn with_multi_select(mut self, multi_select: bool) -> Self {
        self.multi_select = multi_select;
        self
    }

    /// Sets `read_only` (builder style).
    pub fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// Sets `allow_drop_to_index` (builder style).
    pub fn with_drop_to_index(mut self, allow: bool) -> Self {
        self.allow_drop_to_index = allow;
        self
    }

    /// Sets `initial_expand_depth` (builder style).
    pub fn with_initial_expand_depth(mut self, depth: usize) -> Self {
        self.initial_expand_depth = depth;
        self
    }

    /// Sets `smart_column_sizing` (builder style).
    pub fn with_smart_column_sizing(mut self, enabled: bool) -> Self {
        self.smart_column_sizing = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = BindingConfig::default();
        assert_eq!(config.drop_edge_fraction, 0.2);
        assert!(config.force_selection_display);
        assert!(config.restore_on_transaction);
        assert!(config.multi_select);
        assert!(!config.allow_drop_to_index);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml() {
        let config = BindingConfig::from_toml_str(
            r#"
            allow_drop_to_index = true
            initial_expand_depth = 2
            "#,
        )
        .unwrap();
        assert!(config.allow_drop_to_index);
        assert_eq!(config.initial_expand_depth, 2);
        assert!(config.multi_select);
    }

    #[test]
    fn test_json() {
        let config = BindingConfig::from_json_str(r#"{ "read_only": true }"#).unwrap();
        assert!(config.read_only);
        assert!(matches!(
            BindingConfig::from_json_str("{"),
            Err(BindingError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_validation() {
        assert!(matches!(
            BindingConfig::from_toml_str("drop_edge_fraction = 0.7"),
            Err(BindingError::InvalidConfig(_))
        ));
        assert!(matches!(
            BindingConfig::from_toml_str("multi_select = 3"),
            Err(BindingError::ConfigParse(_))
        ));
    }

    #[test]
    fn test_from_file_round_trip() {
        let config = BindingConfig::default().with_smart_column_sizing(true);
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(config.to_toml_string().unwrap().as_bytes())
            .unwrap();
        assert_eq!(BindingConfig::from_file(file.path()).unwrap(), config);

        let mut json = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        json.write_all(br#"{ "multi_select": false }"#).unwrap();
        assert!(!BindingConfig::from_file(json.path()).unwrap().multi_select);

        assert!(matches!(
            BindingConfig::from_file("/definitely/not/here.toml"),
            Err(BindingError::Io { .. })
        ));
    }
}
