//! Demo node configuration loaded from environment variables.
//!
//! Everything has a default so the node runs with zero configuration.

use std::path::PathBuf;

/// Node configuration.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Directory holding one SQLite database per demo identity. Without it
    /// all state lives in memory.
    /// Env: `MURMUR_DATA_DIR`
    /// Default: unset
    pub data_dir: Option<PathBuf>,

    /// Contents size of a loopback frame.
    /// Env: `MURMUR_MAX_CONTENTS`
    /// Default: `2048`
    pub max_contents: usize,

    /// Env: `MURMUR_NICKNAME_A`
    /// Default: `"alice"`
    pub nickname_a: String,

    /// Env: `MURMUR_NICKNAME_B`
    /// Default: `"bob"`
    pub nickname_b: String,
}

/// Smallest contents field that still fits a short DM.
const MIN_MAX_CONTENTS: usize = 256;

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            max_contents: 2048,
            nickname_a: "alice".to_string(),
            nickname_b: "bob".to_string(),
        }
    }
}

impl NodeConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(dir) = lookup("MURMUR_DATA_DIR") {
            if !dir.is_empty() {
                config.data_dir = Some(PathBuf::from(dir));
            }
        }

        if let Some(val) = lookup("MURMUR_MAX_CONTENTS") {
            match val.parse::<usize>() {
                Ok(n) if n >= MIN_MAX_CONTENTS => config.max_contents = n,
                _ => tracing::warn!(
                    value = %val,
                    "Invalid MURMUR_MAX_CONTENTS, using default"
                ),
            }
        }

        if let Some(nick) = lookup("MURMUR_NICKNAME_A") {
            config.nickname_a = nick;
        }
        if let Some(nick) = lookup("MURMUR_NICKNAME_B") {
            config.nickname_b = nick;
        }

        config
    }
}
