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


//! Multi-part HTTP range fetcher
//!
//! # Transfer Plan
//! 1. With parallelism above 1, probe the URL with HEAD for size,
//!    `Accept-Ranges` and a `Content-Disposition` name
//! 2. Size known and ranges supported: preallocate the file and fetch
//!    `parallelism` byte ranges concurrently, each written at its offset
//! 3. Otherwise: one streamed GET written from the start
//! 4. A sampler task reports throughput every `sample_interval` until the
//!    transfer ends, then drops the sample sender
//!
//! Every network await also waits on the cancellation token.

use crate::config::FetchConfig;
use crate::download::{FetchRequest, FetchSummary, ParallelFetch, SpeedTracker, ThroughputSample};
use crate::error::{FetchError, Result};
use crate::http::{build_client, file_name_from_headers};
use async_trait::async_trait;
use futures_util::future::try_join_all;
use futures_util::StreamExt;
use reqwest::header::{ACCEPT_RANGES, CONTENT_LENGTH, RANGE};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use std::io::SeekFrom;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncSeekExt, AsyncWriteExt, BufWriter};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use url::Url;

const PART_BUFF_SZ: usize = 64 * 1024;
const MIN_SAMPLE_INTERVAL: Duration = Duration::from_millis(1);

/// What a HEAD request told us about the remote file
#[derive(Debug, Clone, Default)]
struct Probe {
    size: Option<u64>,
    ranges: bool,
    name: Option<String>,
}

/// Byte counters shared between the parts and the sampler
#[derive(Debug, Default)]
struct Counters {
    downloaded: AtomicU64,
    /// 0 while unknown
    total: AtomicU64,
}

/// Default [`ParallelFetch`] implementation over reqwest
#[derive(Debug, Clone)]
pub struct HttpRangeFetcher {
    sample_interval: Duration,
    connect_timeout: Duration,
}

impl HttpRangeFetcher {
    /// `sample_interval` is raised to at least one millisecond
    pub fn new(sample_interval: Duration, connect_timeout: Duration) -> Self {
        Self {
            sample_interval: sample_interval.max(MIN_SAMPLE_INTERVAL),
            connect_timeout,
        }
    }

    pub fn from_config(config: &FetchConfig) -> Self {
        Self::new(config.sample_interval(), config.connect_timeout())
    }

    async fn probe(&self, client: &Client, url: &Url, cancel: &CancellationToken) -> Result<Probe> {
        let response = match send(client.head(url.clone()), cancel).await {
            Ok(response) if response.status().is_success() => response,
            Ok(response) => {
                debug!(
                    status = %response.status(),
                    "HEAD rejected, falling back to a single stream"
                );
                return Ok(Probe::default());
            }
            Err(FetchError::Cancelled) => return Err(FetchError::Cancelled),
            Err(e) => {
                debug!(error = %e, "HEAD failed, falling back to a single stream");
                return Ok(Probe::default());
            }
        };

        // Read the header itself: a HEAD body is empty whatever its declared length
        let headers = response.headers();
        Ok(Probe {
            size: headers
                .get(CONTENT_LENGTH)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok()),
            ranges: headers
                .get(ACCEPT_RANGES)
                .and_then(|v| v.to_str().ok())
                .map(|v| v.eq_ignore_ascii_case("bytes"))
                .unwrap_or(false),
            name: file_name_from_headers(headers),
        })
    }

    async fn transfer(
        &self,
        client: &Client,
        request: &FetchRequest,
        destination: &Path,
        probe: &Probe,
        counters: &Counters,
        cancel: &CancellationToken,
    ) -> Result<(Option<u64>, Option<String>)> {
        match probe.size {
            Some(size) if probe.ranges && request.parallelism > 1 && size > 0 => {
                let file = OpenOptions::new()
                    .write(true)
                    .create(true)
                    .open(destination)
                    .await?;
                file.set_len(size).await?;
                drop(file);

                let ranges = plan_ranges(size, request.parallelism);
                debug!(parts = ranges.len(), size, "starting ranged transfer");
                try_join_all(ranges.into_iter().map(|range| {
                    fetch_range(client, &request.url, destination, range, counters, cancel)
                }))
                .await?;

                Ok((Some(size), probe.name.clone()))
            }
            _ => {
                let (total, name) =
                    fetch_single(client, &request.url, destination, counters, cancel).await?;
                Ok((total, name.or_else(|| probe.name.clone())))
            }
        }
    }
}

#[async_trait]
impl ParallelFetch for HttpRangeFetcher {
    async fn run(
        &self,
        request: &FetchRequest,
        destination: &Path,
        samples: mpsc::Sender<ThroughputSample>,
        cancel: CancellationToken,
    ) -> Result<FetchSummary> {
        let client = build_client(
            request.headers.clone(),
            request.proxy.as_deref(),
            self.connect_timeout,
            None,
        )?;

        let counters = Arc::new(Counters::default());
        let stop = CancellationToken::new();
        // Stops the sampler even when this future is dropped mid-transfer
        let _stop_guard = stop.clone().drop_guard();
        let sampler = tokio::spawn(sample_loop(
            counters.clone(),
            self.sample_interval,
            samples,
            stop.clone(),
        ));

        let outcome = async {
            let probe = if request.parallelism > 1 {
                self.probe(&client, &request.url, &cancel).await?
            } else {
                Probe::default()
            };
            if let Some(size) = probe.size {
                counters.total.store(size, Ordering::Relaxed);
            }
            self.transfer(&client, request, destination, &probe, &counters, &cancel)
                .await
        }
        .await;

        // Stopping the sampler drops the sender: the completion signal
        stop.cancel();
        sampler.await?;

        let (total, name) = outcome?;
        let written = counters.downloaded.load(Ordering::Relaxed);
        if let Some(expected) = total {
            if written != expected {
                return Err(FetchError::IncompleteTransfer { written, expected });
            }
        }

        let name = name
            .or_else(|| name_from_url(&request.url))
            .unwrap_or_else(|| "download".to_string());
        info!(name = %name, size = written, "range fetch finished");

        Ok(FetchSummary {
            name,
            size: written,
        })
    }
}

/// Split `size` bytes into at most `parts` inclusive ranges
pub fn plan_ranges(size: u64, parts: u32) -> Vec<(u64, u64)> {
    if size == 0 {
        return Vec::new();
    }

    let parts = u64::from(parts.max(1)).min(size);
    let chunk = size / parts;
    (0..parts)
        .map(|i| {
            let start = i * chunk;
            let end = if i == parts - 1 { size - 1 } else { start + chunk - 1 };
            (start, end)
        })
        .collect()
}

fn name_from_url(url: &Url) -> Option<String> {
    let segment = url.path_segments()?.filter(|s| !s.is_empty()).last()?;
    urlencoding::decode(segment).ok().map(|s| s.into_owned())
}

async fn send(request: RequestBuilder, cancel: &CancellationToken) -> Result<Response> {
    tokio::select! {
        _ = cancel.cancelled() => Err(FetchError::Cancelled),
        response = request.send() => Ok(response?),
    }
}

async fn fetch_single(
    client: &Client,
    url: &Url,
    destination: &Path,
    counters: &Counters,
    cancel: &CancellationToken,
) -> Result<(Option<u64>, Option<String>)> {
    let response = send(client.get(url.clone()), cancel).await?;
    if !response.status().is_success() {
        return Err(FetchError::status(response.status(), url.as_str()));
    }

    let total = response.content_length();
    if let Some(total) = total {
        counters.total.store(total, Ordering::Relaxed);
    }
    let name = file_name_from_headers(response.headers());

    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(destination)
        .await?;
    write_body(response, file, &counters.downloaded, cancel, None).await?;

    Ok((total, name))
}

async fn fetch_range(
    client: &Client,
    url: &Url,
    destination: &Path,
    (start, end): (u64, u64),
    counters: &Counters,
    cancel: &CancellationToken,
) -> Result<()> {
    let request = client
        .get(url.clone())
        .header(RANGE, format!("bytes={}-{}", start, end));
    let response = send(request, cancel).await?;
    if response.status() != StatusCode::PARTIAL_CONTENT {
        return Err(FetchError::status(response.status(), url.as_str()));
    }

    let mut file = OpenOptions::new().write(true).open(destination).await?;
    file.seek(SeekFrom::Start(start)).await?;

    let expected = end - start + 1;
    let written = write_body(response, file, &counters.downloaded, cancel, Some(expected)).await?;
    if written != expected {
        return Err(FetchError::IncompleteTransfer { written, expected });
    }
    Ok(())
}

/// Stream a body into `file`, never writing past `limit` bytes
async fn write_body(
    response: Response,
    file: File,
    downloaded: &AtomicU64,
    cancel: &CancellationToken,
    limit: Option<u64>,
) -> Result<u64> {
    let mut writer = BufWriter::with_capacity(PART_BUFF_SZ, file);
    let mut stream = response.bytes_stream();
    let mut written = 0u64;

    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => return Err(FetchError::Cancelled),
            next = stream.next() => next,
        };
        let Some(chunk) = next else {
            break;
        };
        let mut chunk = chunk?;

        if let Some(limit) = limit {
            let room = limit - written;
            if chunk.len() as u64 > room {
                chunk.truncate(room as usize);
            }
        }

        writer.write_all(&chunk).await?;
        written += chunk.len() as u64;
        downloaded.fetch_add(chunk.len() as u64, Ordering::Relaxed);

        if limit == Some(written) {
            break;
        }
    }

    writer.flush().await?;
    Ok(written)
}

async fn sample_loop(
    counters: Arc<Counters>,
    interval: Duration,
    samples: mpsc::Sender<ThroughputSample>,
    stop: CancellationToken,
) {
    let mut tracker = SpeedTracker::with_window(interval * 2);
    tracker.add_position(0);

    let mut ticker = tokio::time::interval(interval);
    // First tick completes immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = stop.cancelled() => break,
            _ = ticker.tick() => {
                let downloaded = counters.downloaded.load(Ordering::Relaxed);
                let total = match counters.total.load(Ordering::Relaxed) {
                    0 => None,
                    total => Some(total),
                };
                tracker.add_position(downloaded);
                let speed = tracker.average_speed() as u64;
                let sample = ThroughputSample::new(downloaded, speed, total);

                // A lagging consumer loses samples; the transfer never waits on it
                if let Err(mpsc::error::TrySendError::Closed(_)) = samples.try_send(sample) {
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use httpmock::Method::HEAD;

    #[test]
    fn test_plan_ranges_covers_file() {
        let ranges = plan_ranges(100, 3);
        assert_eq!(ranges, vec![(0, 32), (33, 65), (66, 99)]);

        assert_eq!(plan_ranges(10, 1), vec![(0, 9)]);
        // Never more parts than bytes
        assert_eq!(plan_ranges(2, 20), vec![(0, 0), (1, 1)]);
        assert!(plan_ranges(0, 4).is_empty());
    }

    #[test]
    fn test_name_from_url() {
        let url = Url::parse("https://cdn.example.com/media/My%20Clip.mp4?token=1").unwrap();
        assert_eq!(name_from_url(&url).as_deref(), Some("My Clip.mp4"));

        let bare = Url::parse("https://cdn.example.com/").unwrap();
        assert_eq!(name_from_url(&bare), None);
    }

    fn request(url: &str, parallelism: u32) -> FetchRequest {
        FetchRequest {
            url: Url::parse(url).unwrap(),
            headers: Default::default(),
            parallelism,
            proxy: None,
        }
    }

    #[test]
    fn test_zero_sample_interval_is_raised() {
        let fetcher = HttpRangeFetcher::new(Duration::ZERO, Duration::from_secs(5));
        assert_eq!(fetcher.sample_interval, MIN_SAMPLE_INTERVAL);
    }

    #[tokio::test]
    async fn test_single_stream_fetch() {
        let server = MockServer::start_async().await;
        let body = vec![42u8; 300_000];
        server.mock(|when, then| {
            when.method(GET).path("/file.bin");
            then.status(200)
                .header("Content-Disposition", "attachment; filename=\"file.bin\"")
                .body(&body);
        });

        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("out");
        File::create(&destination).await.unwrap();

        let fetcher = HttpRangeFetcher::new(Duration::from_millis(50), Duration::from_secs(5));
        let (tx, mut rx) = mpsc::channel(64);
        let summary = fetcher
            .run(&request(&server.url("/file.bin"), 1), &destination, tx, CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(summary, FetchSummary { name: "file.bin".into(), size: 300_000 });
        assert_eq!(std::fs::read(&destination).unwrap(), body);

        // Sender is gone once the fetch returns
        while rx.recv().await.is_some() {}
    }

    #[tokio::test]
    async fn test_head_failure_falls_back_to_single_stream() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(HEAD).path("/clip.mp4");
            then.status(405);
        });
        server.mock(|when, then| {
            when.method(GET).path("/clip.mp4");
            then.status(200).body(vec![1u8; 4096]);
        });

        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("out");
        File::create(&destination).await.unwrap();

        let fetcher = HttpRangeFetcher::new(Duration::from_millis(50), Duration::from_secs(5));
        let (tx, _rx) = mpsc::channel(64);
        let summary = fetcher
            .run(&request(&server.url("/clip.mp4"), 8), &destination, tx, CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(summary.name, "clip.mp4");
        assert_eq!(summary.size, 4096);
    }

    #[tokio::test]
    async fn test_error_status_is_reported() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(GET).path("/gone");
            then.status(404);
        });

        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("out");
        File::create(&destination).await.unwrap();

        let fetcher = HttpRangeFetcher::new(Duration::from_millis(50), Duration::from_secs(5));
        let (tx, _rx) = mpsc::channel(64);
        let err = fetcher
            .run(&request(&server.url("/gone"), 1), &destination, tx, CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::UnexpectedStatus { status_code: 404, .. }));
    }

    #[tokio::test]
    async fn test_cancelled_before_response() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(GET).path("/slow");
            then.status(200).delay(Duration::from_secs(5)).body("late");
        });

        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("out");
        File::create(&destination).await.unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();

        let fetcher = HttpRangeFetcher::new(Duration::from_millis(50), Duration::from_secs(5));
        let (tx, _rx) = mpsc::channel(64);
        let err = fetcher
            .run(&request(&server.url("/slow"), 1), &destination, tx, cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::Cancelled));
    }

    #[tokio::test]
    async fn test_dropped_run_stops_sampler() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(GET).path("/stalled");
            then.status(200).delay(Duration::from_secs(60)).body("late");
        });

        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("out");
        File::create(&destination).await.unwrap();

        let fetcher = HttpRangeFetcher::new(Duration::from_millis(20), Duration::from_secs(5));
        let request = request(&server.url("/stalled"), 1);
        let (tx, mut rx) = mpsc::channel(64);
        let run = fetcher.run(&request, &destination, tx, CancellationToken::new());
        assert!(tokio::time::timeout(Duration::from_millis(200), run).await.is_err());

        // The sampler held the only sender; the channel drains to None once it stops
        let drained = tokio::time::timeout(Duration::from_secs(2), async {
            while rx.recv().await.is_some() {}
        })
        .await;
        assert!(drained.is_ok());
    }
}
