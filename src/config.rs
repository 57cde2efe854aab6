// fetch-core - Media Fetch Core
// Copyright (C) 2025 Henning Berge
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


//! Configuration for the dispatcher and its strategies
//!
//! One `FetchConfig` value is handed to the [`Dispatcher`](crate::strategy::Dispatcher)
//! at construction time. It carries the temp root for working directories and
//! every tunable the strategies use; nothing is read from process-wide state.
//!
//! Durations are stored as plain integers so the config round-trips through
//! JSON unchanged.

use crate::error::{FetchError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Upper bound for range-fetch parallelism
pub const MAX_PARALLELISM: u32 = 20;

/// Worker count for playlist segment downloads
pub const PLAYLIST_WORKERS: usize = 10;

/// Throughput below this is "slow" (bytes per second)
pub const DEFAULT_SLOW_SPEED: u64 = 100_000;

/// Consecutive slow samples before the watchdog cancels
pub const DEFAULT_SLOW_SAMPLES: u32 = 30;

/// Smallest body accepted from the scraped hosts (5 MiB)
pub const MIN_MEDIA_SIZE: u64 = 5 * 1024 * 1024;

const DEFAULT_SAMPLE_INTERVAL_MS: u64 = 1_000;
const DEFAULT_CANCEL_GRACE_MS: u64 = 10_000;
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Settings for the scraped drive host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriveHostConfig {
    /// Scheme and host every drive URL is built from
    pub base_url: String,
    /// Domain seeded cookies are rewritten to
    pub cookie_domain: String,
    /// Domain used instead for the stream cookies
    pub stream_cookie_domain: String,
    /// Cookie names that belong to the stream subdomain
    pub stream_cookie_names: Vec<String>,
    /// Forward expiry given to seeded cookies
    pub cookie_lifetime_days: i64,
}

impl Default for DriveHostConfig {
    fn default() -> Self {
        Self {
            base_url: "https://drive.google.com".to_string(),
            cookie_domain: ".google.com".to_string(),
            stream_cookie_domain: ".drive.google.com".to_string(),
            stream_cookie_names: vec!["DRIVE_STREAM".to_string(), "S".to_string()],
            cookie_lifetime_days: 30,
        }
    }
}

/// Settings for the scraped video host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoHostConfig {
    /// Quality labels, best first
    pub quality_preference: Vec<String>,
    /// Query parameter carrying the quality label
    pub quality_param: String,
    /// Selector for the player's source element
    pub source_selector: String,
}

impl Default for VideoHostConfig {
    fn default() -> Self {
        Self {
            quality_preference: ["720p", "480p", "360p", "240p"]
                .iter()
                .map(|q| q.to_string())
                .collect(),
            quality_param: "q".to_string(),
            source_selector: "#videojs > source".to_string(),
        }
    }
}

/// Dispatcher-wide configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Directory under which per-invocation working directories are created
    pub temp_root: PathBuf,

    /// Cap applied to descriptor parallelism
    pub max_parallelism: u32,

    /// Worker count handed to the playlist fetch service
    pub playlist_workers: usize,

    /// Watchdog low-speed threshold in bytes per second
    pub slow_speed_threshold: u64,

    /// Consecutive low samples before the watchdog cancels
    pub slow_sample_limit: u32,

    /// Interval between throughput samples
    pub sample_interval_ms: u64,

    /// How long a cancelled transfer may take to stop
    pub cancel_grace_ms: u64,

    /// Connect timeout for every session
    pub connect_timeout_secs: u64,

    /// Minimum accepted size for scraped downloads
    pub min_file_size: u64,

    pub drive: DriveHostConfig,

    pub video: VideoHostConfig,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            temp_root: std::env::temp_dir().join("download"),
            max_parallelism: MAX_PARALLELISM,
            playlist_workers: PLAYLIST_WORKERS,
            slow_speed_threshold: DEFAULT_SLOW_SPEED,
            slow_sample_limit: DEFAULT_SLOW_SAMPLES,
            sample_interval_ms: DEFAULT_SAMPLE_INTERVAL_MS,
            cancel_grace_ms: DEFAULT_CANCEL_GRACE_MS,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            min_file_size: MIN_MEDIA_SIZE,
            drive: DriveHostConfig::default(),
            video: VideoHostConfig::default(),
        }
    }
}

impl FetchConfig {
    pub fn builder() -> FetchConfigBuilder {
        FetchConfigBuilder::new()
    }

    /// Load and validate a JSON config file; missing fields take defaults
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make a strategy misbehave
    pub fn validate(&self) -> Result<()> {
        if self.max_parallelism == 0 {
            return Err(FetchError::InvalidConfiguration(
                "max_parallelism must be at least 1".to_string(),
            ));
        }
        if self.playlist_workers == 0 {
            return Err(FetchError::InvalidConfiguration(
                "playlist_workers must be at least 1".to_string(),
            ));
        }
        if self.slow_sample_limit == 0 {
            return Err(FetchError::InvalidConfiguration(
                "slow_sample_limit must be at least 1".to_string(),
            ));
        }
        if self.sample_interval_ms == 0 {
            return Err(FetchError::InvalidConfiguration(
                "sample_interval_ms must be positive".to_string(),
            ));
        }
        if self.video.quality_param.is_empty() {
            return Err(FetchError::InvalidConfiguration(
                "video.quality_param must not be empty".to_string(),
            ));
        }
        if self.video.quality_preference.is_empty() {
            return Err(FetchError::InvalidConfiguration(
                "video.quality_preference must not be empty".to_string(),
            ));
        }
        url::Url::parse(&self.drive.base_url)
            .map_err(|e| FetchError::InvalidConfiguration(format!("drive.base_url: {}", e)))?;
        Ok(())
    }

    /// Clamp a descriptor's parallelism into `1..=max_parallelism`
    pub fn normalize_parallelism(&self, requested: Option<i64>) -> u32 {
        let requested = requested.unwrap_or(1).max(1);
        requested.min(i64::from(self.max_parallelism.max(1))) as u32
    }

    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }

    pub fn cancel_grace(&self) -> Duration {
        Duration::from_millis(self.cancel_grace_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// Builder for FetchConfig
#[derive(Debug)]
pub struct FetchConfigBuilder {
    config: FetchConfig,
}

impl FetchConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: FetchConfig::default(),
        }
    }

    pub fn temp_root<P: Into<PathBuf>>(mut self, temp_root: P) -> Self {
        self.config.temp_root = temp_root.into();
        self
    }

    pub fn max_parallelism(mut self, max_parallelism: u32) -> Self {
        self.config.max_parallelism = max_parallelism;
        self
    }

    pub fn playlist_workers(mut self, workers: usize) -> Self {
        self.config.playlist_workers = workers;
        self
    }

    pub fn slow_speed(mut self, threshold: u64, samples: u32) -> Self {
        self.config.slow_speed_threshold = threshold;
        self.config.slow_sample_limit = samples;
        self
    }

    /// Sub-millisecond remainders round up; a zero interval fails validation
    pub fn sample_interval(mut self, interval: Duration) -> Self {
        self.config.sample_interval_ms = millis_rounded_up(interval);
        self
    }

    pub fn cancel_grace(mut self, grace: Duration) -> Self {
        self.config.cancel_grace_ms = millis_rounded_up(grace);
        self
    }

    pub fn min_file_size(mut self, bytes: u64) -> Self {
        self.config.min_file_size = bytes;
        self
    }

    pub fn drive_base_url<S: Into<String>>(mut self, base_url: S) -> Self {
        self.config.drive.base_url = base_url.into();
        self
    }

    pub fn build(self) -> FetchConfig {
        self.config
    }
}

fn millis_rounded_up(duration: Duration) -> u64 {
    let millis = duration.as_micros().div_ceil(1_000);
    u64::try_from(millis).unwrap_or(u64::MAX)
}

impl Default for FetchConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_parallelism() {
        let config = FetchConfig::default();
        assert_eq!(config.normalize_parallelism(None), 1);
        assert_eq!(config.normalize_parallelism(Some(0)), 1);
        assert_eq!(config.normalize_parallelism(Some(-4)), 1);
        assert_eq!(config.normalize_parallelism(Some(8)), 8);
        assert_eq!(config.normalize_parallelism(Some(500)), MAX_PARALLELISM);
    }

    #[test]
    fn test_partial_json_takes_defaults() {
        let config: FetchConfig =
            serde_json::from_str(r#"{"temp_root": "/var/tmp/fetch", "slow_sample_limit": 5}"#)
                .unwrap();
        assert_eq!(config.temp_root, PathBuf::from("/var/tmp/fetch"));
        assert_eq!(config.slow_sample_limit, 5);
        assert_eq!(config.slow_speed_threshold, DEFAULT_SLOW_SPEED);
        assert_eq!(config.drive, DriveHostConfig::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_limits() {
        let config = FetchConfig::builder().slow_speed(100_000, 0).build();
        assert!(matches!(
            config.validate(),
            Err(FetchError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_builder_keeps_sub_second_durations() {
        let config = FetchConfig::builder()
            .sample_interval(Duration::from_micros(500))
            .cancel_grace(Duration::from_millis(500))
            .build();
        assert_eq!(config.sample_interval(), Duration::from_millis(1));
        assert_eq!(config.cancel_grace(), Duration::from_millis(500));
        assert!(config.validate().is_ok());

        let zero = FetchConfig::builder().sample_interval(Duration::ZERO).build();
        assert!(matches!(zero.validate(), Err(FetchError::InvalidConfiguration(_))));
    }

    #[test]
    fn test_from_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fetch.json");
        std::fs::write(&path, r#"{"playlist_workers": 4}"#).unwrap();

        let config = FetchConfig::from_json_file(&path).unwrap();
        assert_eq!(config.playlist_workers, 4);
        assert_eq!(config.max_parallelism, MAX_PARALLELISM);
    }
}
