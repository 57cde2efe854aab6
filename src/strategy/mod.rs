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


//! Strategy selection and the common strategy contract
//!
//! # Invocation
//! ```text
//! Dispatcher::select ──► Strategy::parse ──► Strategy::execute
//!     (pure)              (network only)      (network + filesystem)
//!                                                  │
//!                         TransferResult ◄─────────┴────► FetchError
//!                      (working dir kept)          (working dir removed)
//! ```
//!
//! Every strategy owns a fresh HTTP session; nothing is shared between
//! invocations except the configuration and the two fetch services.

pub mod direct;
pub mod drive;
pub mod playlist;
pub mod video;

use crate::config::FetchConfig;
use crate::download::{HttpRangeFetcher, ParallelFetch};
use crate::error::{FetchError, Result};
use crate::http::{cookie_header, header_map};
use crate::playlist::{HlsDownloader, PlaylistFetch};
use crate::source::{SourceDescriptor, SourceKind, TransferResult};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, COOKIE};
use std::fmt;
use std::sync::Arc;
use tracing::{error, info};

pub use direct::DirectStrategy;
pub use drive::DriveStrategy;
pub use playlist::PlaylistStrategy;
pub use video::VideoStrategy;

/// Two-phase download contract
///
/// `parse` resolves everything that needs the network but not the disk and
/// may be called any number of times. `execute` runs `parse` first when it
/// has not succeeded yet.
#[async_trait]
pub trait Download: Send {
    async fn parse(&mut self) -> Result<()>;

    async fn execute(&mut self) -> Result<TransferResult>;
}

/// Fallback for kinds without a strategy
#[derive(Debug, Clone)]
pub struct UnsupportedStrategy {
    tag: String,
}

impl UnsupportedStrategy {
    pub fn new<S: Into<String>>(tag: S) -> Self {
        Self { tag: tag.into() }
    }
}

#[async_trait]
impl Download for UnsupportedStrategy {
    async fn parse(&mut self) -> Result<()> {
        Ok(())
    }

    async fn execute(&mut self) -> Result<TransferResult> {
        Err(FetchError::UnsupportedKind(self.tag.clone()))
    }
}

/// The strategy chosen for one descriptor
pub enum Strategy {
    Direct(DirectStrategy),
    SegmentedPlaylist(PlaylistStrategy),
    ScrapedDriveHost(DriveStrategy),
    ScrapedVideoHost(VideoStrategy),
    Unsupported(UnsupportedStrategy),
}

impl Strategy {
    /// Kind tag this strategy serves
    pub fn kind(&self) -> SourceKind {
        match self {
            Strategy::Direct(_) => SourceKind::Direct,
            Strategy::SegmentedPlaylist(_) => SourceKind::SegmentedPlaylist,
            Strategy::ScrapedDriveHost(_) => SourceKind::ScrapedDriveHost,
            Strategy::ScrapedVideoHost(_) => SourceKind::ScrapedVideoHost,
            Strategy::Unsupported(s) => SourceKind::Unsupported(s.tag.clone()),
        }
    }

    fn inner(&mut self) -> &mut dyn Download {
        match self {
            Strategy::Direct(s) => s,
            Strategy::SegmentedPlaylist(s) => s,
            Strategy::ScrapedDriveHost(s) => s,
            Strategy::ScrapedVideoHost(s) => s,
            Strategy::Unsupported(s) => s,
        }
    }
}

impl fmt::Debug for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Strategy").field(&self.kind()).finish()
    }
}

#[async_trait]
impl Download for Strategy {
    async fn parse(&mut self) -> Result<()> {
        self.inner().parse().await
    }

    async fn execute(&mut self) -> Result<TransferResult> {
        self.inner().execute().await
    }
}

/// Picks and runs strategies
#[derive(Clone)]
pub struct Dispatcher {
    config: Arc<FetchConfig>,
    fetcher: Arc<dyn ParallelFetch>,
    playlist: Arc<dyn PlaylistFetch>,
}

impl Dispatcher {
    /// Dispatcher with the built-in fetch services
    pub fn new(config: FetchConfig) -> Result<Self> {
        let fetcher = Arc::new(HttpRangeFetcher::from_config(&config));
        let playlist = Arc::new(HlsDownloader::from_config(&config));
        Self::with_services(config, fetcher, playlist)
    }

    /// Dispatcher with caller-supplied fetch services
    ///
    /// Fails with `InvalidConfiguration` when `config` does not validate.
    pub fn with_services(
        config: FetchConfig,
        fetcher: Arc<dyn ParallelFetch>,
        playlist: Arc<dyn PlaylistFetch>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config: Arc::new(config),
            fetcher,
            playlist,
        })
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// Map a descriptor to its strategy; performs no I/O
    pub fn select<S: Into<String>>(&self, id: S, descriptor: SourceDescriptor) -> Strategy {
        let id = id.into();
        let config = self.config.clone();

        match descriptor.kind.clone() {
            SourceKind::Direct => Strategy::Direct(DirectStrategy::new(
                id,
                descriptor,
                config,
                self.fetcher.clone(),
            )),
            SourceKind::SegmentedPlaylist => Strategy::SegmentedPlaylist(PlaylistStrategy::new(
                id,
                descriptor,
                config,
                self.playlist.clone(),
            )),
            SourceKind::ScrapedDriveHost => {
                Strategy::ScrapedDriveHost(DriveStrategy::new(id, descriptor, config))
            }
            SourceKind::ScrapedVideoHost => {
                Strategy::ScrapedVideoHost(VideoStrategy::new(id, descriptor, config))
            }
            SourceKind::Unsupported(tag) => Strategy::Unsupported(UnsupportedStrategy::new(tag)),
        }
    }

    /// Select, parse and execute in one call
    pub async fn fetch<S: Into<String>>(
        &self,
        id: S,
        descriptor: SourceDescriptor,
    ) -> Result<TransferResult> {
        let id = id.into();
        let mut strategy = self.select(id.clone(), descriptor);
        info!(id = %id, kind = %strategy.kind(), "dispatching");

        let outcome = match strategy.parse().await {
            Ok(()) => strategy.execute().await,
            Err(e) => Err(e),
        };
        if let Err(e) = &outcome {
            error!(id = %id, kind = %strategy.kind(), error = %e, "transfer failed");
        }
        outcome
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Descriptor headers plus a `Cookie` header for the descriptor's cookies
pub(crate) fn request_headers(descriptor: &SourceDescriptor) -> Result<HeaderMap> {
    let mut headers = header_map(&descriptor.headers)?;
    if !descriptor.cookies.is_empty() {
        let value = HeaderValue::from_str(&cookie_header(&descriptor.cookies)).map_err(|e| {
            FetchError::InvalidHeader {
                name: COOKIE.to_string(),
                reason: e.to_string(),
            }
        })?;
        headers.insert(COOKIE, value);
    }
    Ok(headers)
}
