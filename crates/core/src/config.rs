//! Configuration types shared across crates.
//!
//! Backend selection happens exactly once, at process start, from an explicit
//! configuration value handed to the store constructor. There are no
//! module-level singletons and no runtime backend sniffing.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Storage backend configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BackendConfig {
    /// Single-document backend: every collection lives in one versioned
    /// document, rewritten whole on each mutation. Simplest substrate, used
    /// for local development and contract conformance testing.
    Flat {
        /// Document path. `None` keeps the document in memory only.
        #[serde(default)]
        path: Option<PathBuf>,
    },
    /// SQLite backend.
    Sqlite {
        /// Database file path.
        path: PathBuf,
        /// Maximum connections in the pool.
        #[serde(default = "default_max_connections")]
        max_connections: u32,
    },
}

fn default_max_connections() -> u32 {
    // SQLite permits limited write concurrency; a single connection avoids
    // "database is locked" failures under concurrent facade calls.
    1
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self::Flat {
            path: Some(PathBuf::from("./data/updraft.json")),
        }
    }
}

impl BackendConfig {
    /// Validate backend configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            BackendConfig::Flat { .. } => Ok(()),
            BackendConfig::Sqlite {
                path,
                max_connections,
            } => {
                if path.as_os_str().is_empty() {
                    return Err("sqlite config requires a non-empty 'path'".to_string());
                }
                if *max_connections == 0 {
                    return Err("sqlite config requires max_connections >= 1".to_string());
                }
                Ok(())
            }
        }
    }
}

/// Metadata store configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Backend selection.
    #[serde(default)]
    pub backend: BackendConfig,
    /// Per-backend-call timeout in milliseconds. An elapsed budget surfaces
    /// as an `Unavailable` error rather than hanging the caller.
    #[serde(default = "default_op_timeout_ms")]
    pub op_timeout_ms: u64,
    /// How many times a history append retries its read-modify-write after
    /// losing an optimistic-concurrency race.
    #[serde(default = "default_history_append_attempts")]
    pub history_append_attempts: u32,
    /// How many fresh deployment keys to try when key generation collides
    /// with an existing key before surfacing a conflict.
    #[serde(default = "default_key_generation_attempts")]
    pub key_generation_attempts: u32,
}

fn default_op_timeout_ms() -> u64 {
    5_000
}

fn default_history_append_attempts() -> u32 {
    5
}

fn default_key_generation_attempts() -> u32 {
    3
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: BackendConfig::default(),
            op_timeout_ms: default_op_timeout_ms(),
            history_append_attempts: default_history_append_attempts(),
            key_generation_attempts: default_key_generation_attempts(),
        }
    }
}

impl StoreConfig {
    /// Create a test configuration: in-memory flat backend, short timeouts.
    ///
    /// **For testing only.**
    pub fn for_testing() -> Self {
        Self {
            backend: BackendConfig::Flat { path: None },
            op_timeout_ms: 2_000,
            history_append_attempts: default_history_append_attempts(),
            key_generation_attempts: default_key_generation_attempts(),
        }
    }

    /// Get the per-call timeout as a Duration.
    pub fn op_timeout(&self) -> Duration {
        Duration::from_millis(self.op_timeout_ms)
    }

    /// Validate store configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        self.backend.validate()?;
        if self.op_timeout_ms == 0 {
            return Err("op_timeout_ms cannot be 0; backend calls must have a bounded, non-zero budget".to_string());
        }
        if self.history_append_attempts == 0 {
            return Err("history_append_attempts must be >= 1".to_string());
        }
        if self.key_generation_attempts == 0 {
            return Err("key_generation_attempts must be >= 1".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(StoreConfig::default().validate().is_ok());
        assert!(StoreConfig::for_testing().validate().is_ok());
    }

    #[test]
    fn test_rejects_zero_timeout() {
        let mut config = StoreConfig::for_testing();
        config.op_timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_backend_deserialize_tagged() {
        let json = r#"{"type":"sqlite","path":"./data/updraft.db"}"#;
        let config: BackendConfig = serde_json::from_str(json).unwrap();
        match config {
            BackendConfig::Sqlite {
                path,
                max_connections,
            } => {
                assert_eq!(path, PathBuf::from("./data/updraft.db"));
                assert_eq!(max_connections, 1, "max_connections should default to 1");
            }
            _ => panic!("expected sqlite config"),
        }
    }

    #[test]
    fn test_flat_memory_only() {
        let json = r#"{"type":"flat"}"#;
        let config: BackendConfig = serde_json::from_str(json).unwrap();
        match config {
            BackendConfig::Flat { ref path } => assert!(path.is_none()),
            _ => panic!("expected flat config"),
        }
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_sqlite_rejects_empty_path() {
        let config = BackendConfig::Sqlite {
            path: PathBuf::new(),
            max_connections: 1,
        };
        assert!(config.validate().is_err());
    }
}
