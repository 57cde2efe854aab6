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


//! Parallel fetch service contract and its default implementation
//!
//! The Direct strategy only talks to [`ParallelFetch`]. A fetch reports
//! progress on a sample channel, observes a cancellation token, and returns
//! the remote file name and final size. The channel closing is the
//! transfer's completion signal.
//!
//! [`HttpRangeFetcher`] is the built-in implementation: concurrent HTTP byte
//! ranges written at their own offsets.

pub mod progress;
pub mod range;
pub mod stream;

use crate::error::Result;
use async_trait::async_trait;
use reqwest::header::HeaderMap;
use std::path::Path;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

// Re-export commonly used types
pub use progress::{SpeedTracker, ThroughputSample};
pub use range::HttpRangeFetcher;

/// What the parallel fetch service should retrieve
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub url: url::Url,
    /// Sent with every range request, cookies included
    pub headers: HeaderMap,
    /// Already normalized to at least 1
    pub parallelism: u32,
    pub proxy: Option<String>,
}

/// Outcome of a completed fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchSummary {
    /// Name announced by the server, or derived from the URL
    pub name: String,
    /// Bytes written to the destination
    pub size: u64,
}

/// Parallel fetch service
#[async_trait]
pub trait ParallelFetch: Send + Sync {
    /// Fetch `request` into the existing file at `destination`
    ///
    /// Implementations send samples on `samples` while running and drop it
    /// when done. Once `cancel` fires they must stop promptly and return
    /// [`FetchError::Cancelled`](crate::error::FetchError::Cancelled).
    async fn run(
        &self,
        request: &FetchRequest,
        destination: &Path,
        samples: mpsc::Sender<ThroughputSample>,
        cancel: CancellationToken,
    ) -> Result<FetchSummary>;
}
