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


//! Direct URL strategy
//!
//! Hands the URL to the parallel fetch service and races it against the
//! speed watchdog:
//!
//! ```text
//!  fetch service ──samples──► SpeedWatchdog
//!        ▲                        │
//!        └──── scope.cancel() ◄───┘ (too slow)
//! ```
//!
//! The completion token tells the watchdog the transfer is over. When the
//! scope is cancelled the transfer gets `cancel_grace` to return before it
//! is dropped. Both tokens are also cancelled when the invocation itself is
//! dropped, so the watchdog task never outlives it.

use crate::config::FetchConfig;
use crate::download::{FetchRequest, ParallelFetch};
use crate::error::{FetchError, Result};
use crate::file::paths::{extension_of, with_missing_extension};
use crate::file::{file_name_or, WorkingDir};
use crate::source::{SourceDescriptor, TransferResult};
use crate::strategy::{request_headers, Download};
use crate::watchdog::{SpeedWatchdog, WatchdogVerdict};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::File;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

const SAMPLE_BUFFER: usize = 64;

pub struct DirectStrategy {
    id: String,
    descriptor: SourceDescriptor,
    config: Arc<FetchConfig>,
    fetcher: Arc<dyn ParallelFetch>,
    request: Option<FetchRequest>,
}

impl DirectStrategy {
    pub fn new(
        id: String,
        descriptor: SourceDescriptor,
        config: Arc<FetchConfig>,
        fetcher: Arc<dyn ParallelFetch>,
    ) -> Self {
        Self {
            id,
            descriptor,
            config,
            fetcher,
            request: None,
        }
    }

    /// Run the fetch with the watchdog attached
    async fn transfer(&self, request: &FetchRequest, destination: &Path) -> Result<String> {
        let (samples, receiver) = mpsc::channel(SAMPLE_BUFFER);
        let scope = CancellationToken::new();
        let completion = CancellationToken::new();
        // Dropping this future mid-transfer fires both tokens
        let _scope_guard = scope.clone().drop_guard();
        let _completion_guard = completion.clone().drop_guard();

        let watchdog = SpeedWatchdog::from_config(&self.config);
        let watch = tokio::spawn({
            let completion = completion.clone();
            let scope = scope.clone();
            async move { watchdog.watch(receiver, completion, scope).await }
        });

        let outcome = {
            let fetch = self.fetcher.run(request, destination, samples, scope.clone());
            tokio::pin!(fetch);

            let finished = tokio::select! {
                outcome = &mut fetch => Some(outcome),
                _ = scope.cancelled() => None,
            };
            match finished {
                Some(outcome) => outcome,
                None => match tokio::time::timeout(self.config.cancel_grace(), &mut fetch).await {
                    Ok(outcome) => outcome,
                    Err(_) => {
                        warn!(id = %self.id, "transfer ignored cancellation, abandoning it");
                        Err(FetchError::Cancelled)
                    }
                },
            }
        };

        completion.cancel();
        let verdict = watch.await?;

        match outcome {
            Ok(summary) => {
                info!(
                    id = %self.id,
                    name = %summary.name,
                    size = summary.size,
                    "direct transfer finished"
                );
                Ok(summary.name)
            }
            Err(e) if verdict == WatchdogVerdict::Tripped && e.is_cancelled() => {
                Err(FetchError::SlowTransfer {
                    threshold: watchdog.threshold(),
                    samples: watchdog.limit(),
                })
            }
            Err(e) => Err(e),
        }
    }
}

/// Give `path` the remote file's extension when it has none
async fn fix_extension(path: PathBuf, remote_name: &str) -> PathBuf {
    let Some(renamed) = extension_of(remote_name).and_then(|ext| with_missing_extension(&path, ext))
    else {
        return path;
    };

    match tokio::fs::rename(&path, &renamed).await {
        Ok(()) => {
            debug!(from = %path.display(), to = %renamed.display(), "added remote extension");
            renamed
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "could not add remote extension");
            path
        }
    }
}

#[async_trait]
impl Download for DirectStrategy {
    async fn parse(&mut self) -> Result<()> {
        if self.request.is_some() {
            return Ok(());
        }

        let value = self.descriptor.value.trim();
        let url = Url::parse(value).map_err(|e| FetchError::invalid_url(value, e))?;
        let parallelism = self.config.normalize_parallelism(self.descriptor.parallelism);
        debug!(id = %self.id, url = %url, parallelism, "resolved direct source");

        self.request = Some(FetchRequest {
            url,
            headers: request_headers(&self.descriptor)?,
            parallelism,
            proxy: self.descriptor.proxy.clone(),
        });
        Ok(())
    }

    async fn execute(&mut self) -> Result<TransferResult> {
        self.parse().await?;
        let request = self
            .request
            .clone()
            .ok_or_else(|| FetchError::internal("direct request missing after parse"))?;

        info!(
            id = %self.id,
            url = %request.url,
            parallelism = request.parallelism,
            "starting direct transfer"
        );

        let dir = WorkingDir::create(&self.config.temp_root).await?;
        let destination = dir.join(file_name_or(&self.id, "download"));
        File::create(&destination).await?;

        let remote_name = self.transfer(&request, &destination).await?;
        let path = fix_extension(destination, &remote_name).await;

        Ok(TransferResult::new(self.id.clone(), path, dir.keep()))
    }
}
