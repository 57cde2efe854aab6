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


//! Throughput sampling
//!
//! A running transfer reports [`ThroughputSample`]s at a fixed interval. The
//! speed in a sample is a moving average over a short window so a single
//! late chunk does not look like a stall.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// One periodic report from a running transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThroughputSample {
    /// Bytes written so far
    pub downloaded: u64,

    /// Current speed in bytes per second
    pub speed: u64,

    /// Total size if the server announced one
    pub total: Option<u64>,
}

impl ThroughputSample {
    pub fn new(downloaded: u64, speed: u64, total: Option<u64>) -> Self {
        Self {
            downloaded,
            speed,
            total,
        }
    }

    /// Percentage complete (0.0 - 100.0), if the total is known
    pub fn percent_complete(&self) -> Option<f64> {
        match self.total {
            Some(total) if total > 0 => Some(self.downloaded as f64 / total as f64 * 100.0),
            _ => None,
        }
    }
}

/// Speed tracker with moving average
///
/// Uses a sliding window approach to smooth out network fluctuations
#[derive(Debug)]
pub struct SpeedTracker {
    /// Samples within the time window
    samples: VecDeque<PositionSample>,

    /// Time window for averaging
    window_duration: Duration,
}

#[derive(Debug, Clone)]
struct PositionSample {
    timestamp: Instant,
    position: u64,
}

impl SpeedTracker {
    /// Create new speed tracker with default 10-second window
    pub fn new() -> Self {
        Self::with_window(Duration::from_secs(10))
    }

    /// Create new speed tracker with custom window
    pub fn with_window(window_duration: Duration) -> Self {
        Self {
            samples: VecDeque::new(),
            window_duration,
        }
    }

    /// Add a position sample (total bytes downloaded so far)
    pub fn add_position(&mut self, position: u64) {
        self.add_position_at(position, Instant::now());
    }

    fn add_position_at(&mut self, position: u64, now: Instant) {
        self.samples.push_back(PositionSample {
            timestamp: now,
            position,
        });

        // Keep at least two samples so a long gap still yields a speed
        while self.samples.len() > 2 {
            match self.samples.front() {
                Some(sample) if now.duration_since(sample.timestamp) > self.window_duration => {
                    self.samples.pop_front();
                }
                _ => break,
            }
        }
    }

    /// Get current average speed in bytes per second
    pub fn average_speed(&self) -> f64 {
        let (Some(first), Some(last)) = (self.samples.front(), self.samples.back()) else {
            return 0.0;
        };

        let bytes_delta = last.position.saturating_sub(first.position);
        let time_delta = last.timestamp.duration_since(first.timestamp).as_secs_f64();

        if time_delta > 0.0 {
            bytes_delta as f64 / time_delta
        } else {
            0.0
        }
    }
}

impl Default for SpeedTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_speed_tracker() {
        let mut tracker = SpeedTracker::new();
        let start = Instant::now();

        tracker.add_position_at(0, start);
        tracker.add_position_at(100_000, start + Duration::from_millis(100));

        let speed = tracker.average_speed();
        assert!(speed > 999_000.0 && speed < 1_001_000.0);
    }

    #[test]
    fn test_single_sample_is_zero_speed() {
        let mut tracker = SpeedTracker::new();
        tracker.add_position(4096);
        assert_eq!(tracker.average_speed(), 0.0);
    }

    #[test]
    fn test_window_drops_old_samples() {
        let mut tracker = SpeedTracker::with_window(Duration::from_secs(2));
        let start = Instant::now();

        tracker.add_position_at(0, start);
        tracker.add_position_at(10_000_000, start + Duration::from_secs(1));
        // Transfer stalls afterwards
        tracker.add_position_at(10_000_000, start + Duration::from_secs(4));
        tracker.add_position_at(10_000_000, start + Duration::from_secs(5));

        assert_eq!(tracker.average_speed(), 0.0);
    }

    #[test]
    fn test_percent_complete() {
        assert_eq!(ThroughputSample::new(250, 0, Some(1000)).percent_complete(), Some(25.0));
        assert_eq!(ThroughputSample::new(250, 0, None).percent_complete(), None);
    }
}
