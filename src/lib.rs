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


//! Media fetch core
//!
//! Retrieves a media file from a [`SourceDescriptor`] into a fresh working
//! directory. Four delivery strategies are supported: direct URLs with
//! parallel ranges and a speed watchdog, a drive-hosting service behind a
//! confirmation page, a video-hosting page with quality selection, and HLS
//! playlists.
//!
//! # Example
//! ```no_run
//! use fetch_core::{Dispatcher, FetchConfig, SourceDescriptor, SourceKind};
//!
//! # async fn run() -> fetch_core::Result<()> {
//! let dispatcher = Dispatcher::new(FetchConfig::default())?;
//! let descriptor = SourceDescriptor::new(SourceKind::Direct, "https://cdn.example.com/a.mp4")
//!     .with_parallelism(8);
//! let result = dispatcher.fetch("item-42", descriptor).await?;
//! println!("{}", result.path.display());
//! result.dispose().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod download;
pub mod error;
pub mod file;
pub mod http;
pub mod playlist;
pub mod scrape;
pub mod source;
pub mod strategy;
pub mod watchdog;

// Re-export commonly used types
pub use config::FetchConfig;
pub use download::{FetchRequest, FetchSummary, HttpRangeFetcher, ParallelFetch, ThroughputSample};
pub use error::{ErrorCategory, FetchError, Result};
pub use playlist::{HlsDownloader, PlaylistFetch, PlaylistRequest};
pub use source::{Cookie, SourceDescriptor, SourceKind, TransferResult};
pub use strategy::{Dispatcher, Download, Strategy};
pub use watchdog::{SpeedWatchdog, WatchdogVerdict};
