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


//! Speed watchdog
//!
//! Watches the throughput samples of one transfer and cancels the
//! invocation's scope after too many consecutive slow samples. The watchdog
//! stops on the first of:
//! - the limit being reached (the scope is cancelled once)
//! - the transfer's completion token, or the sample channel closing
//! - the scope being cancelled by someone else

use crate::config::FetchConfig;
use crate::download::ThroughputSample;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{trace, warn};

/// Consecutive low-sample counter
///
/// A sample below `threshold` increments the count, any other sample resets
/// it. Units are bytes per second.
#[derive(Debug, Clone)]
pub struct LowSpeedCounter {
    threshold: u64,
    limit: u32,
    count: u32,
}

impl LowSpeedCounter {
    pub fn new(threshold: u64, limit: u32) -> Self {
        Self {
            threshold,
            limit: limit.max(1),
            count: 0,
        }
    }

    /// Record one sample; returns `true` once the limit is reached
    pub fn record(&mut self, speed: u64) -> bool {
        if speed < self.threshold {
            self.count = self.count.saturating_add(1);
        } else {
            self.count = 0;
        }
        self.count >= self.limit
    }

    pub fn count(&self) -> u32 {
        self.count
    }
}

/// How a watch ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogVerdict {
    /// Too slow; the scope was cancelled by the watchdog
    Tripped,
    /// Transfer signalled completion or stopped sending samples
    TransferFinished,
    /// Scope was cancelled elsewhere
    ScopeClosed,
}

#[derive(Debug, Clone, Copy)]
pub struct SpeedWatchdog {
    threshold: u64,
    limit: u32,
}

impl SpeedWatchdog {
    pub fn new(threshold: u64, limit: u32) -> Self {
        Self { threshold, limit }
    }

    pub fn from_config(config: &FetchConfig) -> Self {
        Self::new(config.slow_speed_threshold, config.slow_sample_limit)
    }

    pub fn threshold(&self) -> u64 {
        self.threshold
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Consume samples until one of the stop conditions holds
    pub async fn watch(
        &self,
        mut samples: mpsc::Receiver<ThroughputSample>,
        completion: CancellationToken,
        scope: CancellationToken,
    ) -> WatchdogVerdict {
        let mut counter = LowSpeedCounter::new(self.threshold, self.limit);

        loop {
            tokio::select! {
                biased;

                _ = completion.cancelled() => return WatchdogVerdict::TransferFinished,
                _ = scope.cancelled() => return WatchdogVerdict::ScopeClosed,
                sample = samples.recv() => {
                    let Some(sample) = sample else {
                        return WatchdogVerdict::TransferFinished;
                    };

                    if counter.record(sample.speed) {
                        warn!(
                            threshold = self.threshold,
                            samples = counter.count(),
                            downloaded = sample.downloaded,
                            "transfer too slow, cancelling"
                        );
                        scope.cancel();
                        return WatchdogVerdict::Tripped;
                    }

                    trace!(
                        speed = sample.speed,
                        percent = ?sample.percent_complete(),
                        low = counter.count(),
                        "throughput sample"
                    );
                }
            }
        }
    }
}
