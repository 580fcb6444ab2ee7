//! Consumer configuration.

use serde::{Deserialize, Serialize};

/// How a [`CollectionViewDataSource`](crate::sink::CollectionViewDataSource)
/// forwards changes to its view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    /// Forward individual item changes. When off, every change reloads.
    pub animate_changes: bool,
    /// Reload the whole view after each animated batch.
    pub reload_after_animation: bool,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            animate_changes: true,
            reload_after_animation: false,
        }
    }
}

impl SinkConfig {
    /// Parse from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Never animate; reload on every change.
    pub fn reload_only() -> Self {
        Self {
            animate_changes: false,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_animate_without_reload() {
        let config = SinkConfig::default();
        assert!(config.animate_changes);
        assert!(!config.reload_after_animation);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config = SinkConfig::from_json(r#"{ "reload_after_animation": true }"#).unwrap();
        assert_eq!(
            config,
            SinkConfig {
                animate_changes: true,
                reload_after_animation: true
            }
        );

        assert_eq!(SinkConfig::from_json("{}").unwrap(), SinkConfig::default());
    }

    #[test]
    fn malformed_json_is_rejected() {
        assert!(SinkConfig::from_json(r#"{ "animate_changes": "yes" }"#).is_err());
        assert!(SinkConfig::from_json("42").is_err());
        assert!(SinkConfig::from_json("{").is_err());
    }
}
