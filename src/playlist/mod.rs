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


//! Playlist fetch service contract
//!
//! The SegmentedPlaylist strategy hands a [`PlaylistRequest`] to a
//! [`PlaylistFetch`] and gets back the path of the assembled file, which
//! must lie inside `destination_dir`.

pub mod hls;

use crate::error::Result;
use async_trait::async_trait;
use reqwest::header::HeaderMap;
use std::path::PathBuf;
use url::Url;

pub use hls::HlsDownloader;

/// What the playlist fetch service should retrieve
#[derive(Debug, Clone)]
pub struct PlaylistRequest {
    pub url: Url,
    pub headers: HeaderMap,
    /// Existing directory the output is written into
    pub destination_dir: PathBuf,
    /// Segments fetched concurrently
    pub workers: usize,
    pub proxy: Option<String>,
}

#[async_trait]
pub trait PlaylistFetch: Send + Sync {
    /// Download every segment and return the produced file
    async fn download(&self, request: &PlaylistRequest) -> Result<PathBuf>;
}
