//! # Decode Configuration
//!
//! Timing and buffering knobs for the buffer-exchange loop.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Where decoded PCM is held until the WAV container is written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PcmSpool {
    /// Keep PCM in memory.
    #[default]
    Memory,
    /// Spool to a scratch file under the runtime's cache directory.
    CacheDir,
    /// Spool to a scratch file under the given directory.
    Directory(PathBuf),
}

/// Decode loop configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecodeConfig {
    /// How long each slot poll may block inside the decoder.
    ///
    /// Default: 10 ms.
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout: Duration,

    /// Consecutive loop iterations with no input submitted and no output
    /// received before the operation fails with `StallTimeout`.
    ///
    /// Default: 2000.
    #[serde(default = "default_stall_poll_limit")]
    pub stall_poll_limit: u32,

    /// Output polls per loop iteration before going back to the input side.
    ///
    /// Default: 16.
    #[serde(default = "default_max_drain_polls")]
    pub max_drain_polls: u32,

    /// Upper bound of the sleep between idle iterations.
    ///
    /// Default: 10 ms.
    #[serde(default = "default_max_backoff")]
    pub max_backoff: Duration,

    /// PCM buffering strategy.
    ///
    /// Default: memory.
    #[serde(default)]
    pub spool: PcmSpool,

    /// Publish per-percent progress events on the event bus.
    ///
    /// Default: true.
    #[serde(default = "default_emit_progress")]
    pub emit_progress: bool,
}

impl Default for DecodeConfig {
    fn default() -> Self {
        Self {
            poll_timeout: default_poll_timeout(),
            stall_poll_limit: default_stall_poll_limit(),
            max_drain_polls: default_max_drain_polls(),
            max_backoff: default_max_backoff(),
            spool: PcmSpool::default(),
            emit_progress: default_emit_progress(),
        }
    }
}

impl DecodeConfig {
    /// Short polls and short sleeps, for decoders that answer quickly.
    pub fn low_latency() -> Self {
        Self {
            poll_timeout: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
            max_drain_polls: 32,
            ..Default::default()
        }
    }

    /// Spool PCM to `dir` instead of holding it in memory.
    pub fn spooled(dir: impl Into<PathBuf>) -> Self {
        Self {
            spool: PcmSpool::Directory(dir.into()),
            ..Default::default()
        }
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.stall_poll_limit == 0 {
            return Err("stall_poll_limit must be > 0".to_string());
        }

        if self.max_drain_polls == 0 {
            return Err("max_drain_polls must be > 0".to_string());
        }

        if self.poll_timeout > Duration::from_secs(1) {
            return Err("poll_timeout cannot exceed 1 second".to_string());
        }

        if self.max_backoff > Duration::from_secs(1) {
            return Err("max_backoff cannot exceed 1 second".to_string());
        }

        if let PcmSpool::Directory(dir) = &self.spool {
            if dir.as_os_str().is_empty() {
                return Err("spool directory cannot be empty".to_string());
            }
        }

        Ok(())
    }
}

fn default_poll_timeout() -> Duration {
    Duration::from_millis(10)
}

fn default_stall_poll_limit() -> u32 {
    2000
}

fn default_max_drain_polls() -> u32 {
    16
}

fn default_max_backoff() -> Duration {
    Duration::from_millis(10)
}

fn default_emit_progress() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = DecodeConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.poll_timeout, Duration::from_millis(10));
        assert_eq!(config.spool, PcmSpool::Memory);
    }

    #[test]
    fn test_presets_are_valid() {
        assert!(DecodeConfig::low_latency().validate().is_ok());
        let spooled = DecodeConfig::spooled("/tmp/pcm");
        assert!(spooled.validate().is_ok());
        assert_eq!(spooled.spool, PcmSpool::Directory(PathBuf::from("/tmp/pcm")));
    }

    #[test]
    fn test_validation_rejects_zero_limits() {
        let config = DecodeConfig {
            stall_poll_limit: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = DecodeConfig {
            max_drain_polls: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_empty_spool_dir() {
        let config = DecodeConfig::spooled("");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_fields_take_defaults() {
        let config: DecodeConfig =
            serde_json::from_str(r#"{"stall_poll_limit": 5, "spool": "cache_dir"}"#).unwrap();
        assert_eq!(config.stall_poll_limit, 5);
        assert_eq!(config.max_drain_polls, 16);
        assert_eq!(config.spool, PcmSpool::CacheDir);
        assert!(config.emit_progress);
    }
}
