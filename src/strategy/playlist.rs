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


//! Segmented playlist strategy

use crate::config::FetchConfig;
use crate::error::{FetchError, Result};
use crate::file::WorkingDir;
use crate::playlist::{PlaylistFetch, PlaylistRequest};
use crate::source::{SourceDescriptor, TransferResult};
use crate::strategy::{request_headers, Download};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};
use url::Url;

pub struct PlaylistStrategy {
    id: String,
    descriptor: SourceDescriptor,
    config: Arc<FetchConfig>,
    service: Arc<dyn PlaylistFetch>,
    /// Request with `destination_dir` still unset
    request: Option<PlaylistRequest>,
}

impl PlaylistStrategy {
    pub fn new(
        id: String,
        descriptor: SourceDescriptor,
        config: Arc<FetchConfig>,
        service: Arc<dyn PlaylistFetch>,
    ) -> Self {
        Self {
            id,
            descriptor,
            config,
            service,
            request: None,
        }
    }
}

#[async_trait]
impl Download for PlaylistStrategy {
    async fn parse(&mut self) -> Result<()> {
        if self.request.is_some() {
            return Ok(());
        }

        let value = self.descriptor.value.trim();
        let url = Url::parse(value).map_err(|e| FetchError::invalid_url(value, e))?;
        debug!(id = %self.id, url = %url, "resolved playlist source");

        self.request = Some(PlaylistRequest {
            url,
            headers: request_headers(&self.descriptor)?,
            destination_dir: Default::default(),
            workers: self.config.playlist_workers,
            proxy: self.descriptor.proxy.clone(),
        });
        Ok(())
    }

    async fn execute(&mut self) -> Result<TransferResult> {
        self.parse().await?;
        let mut request = self
            .request
            .clone()
            .ok_or_else(|| FetchError::internal("playlist request missing after parse"))?;

        let dir = WorkingDir::create(&self.config.temp_root).await?;
        request.destination_dir = dir.path().to_path_buf();
        info!(
            id = %self.id,
            url = %request.url,
            workers = request.workers,
            "starting playlist transfer"
        );

        let path = self.service.download(&request).await?;
        if !path.starts_with(dir.path()) {
            return Err(FetchError::internal(format!(
                "playlist output {} is outside the working directory",
                path.display()
            )));
        }

        info!(id = %self.id, path = %path.display(), "playlist transfer finished");
        Ok(TransferResult::new(self.id.clone(), path, dir.keep()))
    }
}
