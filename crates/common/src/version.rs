use serde::{Deserialize, Serialize};

/// Build metadata baked in at compile time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BuildInfo {
    pub version: String,
    pub build_timestamp: String,
    /// Comma separated cargo features, or `none`.
    pub build_features: String,
}

impl BuildInfo {
    pub fn new() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            build_timestamp: option_env!("BUILD_TIMESTAMP")
                .unwrap_or("unknown")
                .to_string(),
            build_features: option_env!("BUILD_FEATURES").unwrap_or("none").to_string(),
        }
    }

    pub fn has_feature(&self, feature: &str) -> bool {
        self.build_features.split(',').any(|f| f == feature)
    }
}

impl Default for BuildInfo {
    fn default() -> Self {
        Self::new()
    }
}
