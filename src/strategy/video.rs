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


//! Video-hosting page strategy
//!
//! `parse` reads the page, picks the best offered quality and reads that
//! quality's page for the title and the player source. `execute` downloads
//! the source with browser headers, named after the title.

use crate::config::FetchConfig;
use crate::download::stream::{copy_response, ensure_min_size};
use crate::error::{FetchError, Result};
use crate::file::{file_name_or, WorkingDir};
use crate::http::{browser_headers, cookie_header, Session};
use crate::scrape::{collect_qualities, page_title, pick_quality, select_attr};
use crate::source::{SourceDescriptor, TransferResult};
use crate::strategy::Download;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, COOKIE};
use std::sync::Arc;
use tokio::fs::File;
use tracing::{debug, info};
use url::Url;

pub struct VideoStrategy {
    id: String,
    descriptor: SourceDescriptor,
    config: Arc<FetchConfig>,
    resolved: Option<ResolvedVideo>,
}

/// Everything `execute` needs
#[derive(Debug)]
struct ResolvedVideo {
    session: Session,
    title: String,
    source: Url,
    referer: Url,
}

impl VideoStrategy {
    pub fn new(id: String, descriptor: SourceDescriptor, config: Arc<FetchConfig>) -> Self {
        Self {
            id,
            descriptor,
            config,
            resolved: None,
        }
    }

    /// Browser headers plus the descriptor's cookies
    fn page_headers(&self, referer: &Url) -> Result<HeaderMap> {
        let mut headers = browser_headers(Some(referer.as_str()));
        if !self.descriptor.cookies.is_empty() {
            let cookies = cookie_header(&self.descriptor.cookies);
            let value = HeaderValue::from_str(&cookies).map_err(|e| FetchError::InvalidHeader {
                name: COOKIE.to_string(),
                reason: e.to_string(),
            })?;
            headers.insert(COOKIE, value);
        }
        Ok(headers)
    }

    async fn resolve(&self) -> Result<ResolvedVideo> {
        let value = self.descriptor.value.trim();
        let page = Url::parse(value).map_err(|e| FetchError::invalid_url(value, e))?;
        let session = Session::new(
            &self.descriptor.headers,
            self.descriptor.proxy.as_deref(),
            self.config.connect_timeout(),
        )?;
        let video = &self.config.video;

        let html = session
            .get_ok(page.as_str(), self.page_headers(&page)?)
            .await
            .map_err(|e| e.in_stage("video page"))?
            .text()
            .await?;
        let offered = collect_qualities(&html, &page, &video.quality_param);
        let quality = pick_quality(&offered, &video.quality_preference, value)?;
        debug!(
            id = %self.id,
            offered = offered.len(),
            quality = %quality.label,
            "selected video quality"
        );

        let quality_url = quality.url.clone();
        let html = session
            .get_ok(quality_url.as_str(), self.page_headers(&page)?)
            .await
            .map_err(|e| e.in_stage("video quality page"))?
            .text()
            .await?;

        let title = page_title(&html).unwrap_or_default();
        let src = select_attr(&html, &video.source_selector, "src")?
            .ok_or_else(|| FetchError::MissingSource(quality_url.to_string()))?;
        let source = quality_url.join(&src)?;
        debug!(id = %self.id, title = %title, source = %source, "resolved video source");

        Ok(ResolvedVideo {
            session,
            title,
            source,
            referer: quality_url,
        })
    }
}

#[async_trait]
impl Download for VideoStrategy {
    async fn parse(&mut self) -> Result<()> {
        if self.resolved.is_none() {
            self.resolved = Some(self.resolve().await?);
        }
        Ok(())
    }

    async fn execute(&mut self) -> Result<TransferResult> {
        self.parse().await?;
        let resolved = self
            .resolved
            .as_ref()
            .ok_or_else(|| FetchError::internal("video source missing after parse"))?;

        info!(id = %self.id, source = %resolved.source, "starting video transfer");

        let response = resolved
            .session
            .get_ok(resolved.source.as_str(), self.page_headers(&resolved.referer)?)
            .await
            .map_err(|e| e.in_stage("video download"))?;

        let dir = WorkingDir::create(&self.config.temp_root).await?;
        let destination = dir.join(file_name_or(&resolved.title, &self.id));
        let written = copy_response(response, File::create(&destination).await?).await?;
        ensure_min_size(written, self.config.min_file_size)?;

        info!(id = %self.id, size = written, "video transfer finished");
        Ok(TransferResult::new(self.id.clone(), destination, dir.keep()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SourceKind;

    #[test]
    fn test_page_headers_carry_cookies_and_referer() {
        let descriptor =
            SourceDescriptor::new(SourceKind::ScrapedVideoHost, "https://v.example.com/v/1")
                .with_cookie("session", "abc");
        let video = VideoStrategy::new("id".into(), descriptor, Arc::new(FetchConfig::default()));

        let referer = Url::parse("https://v.example.com/v/1").unwrap();
        let headers = video.page_headers(&referer).unwrap();
        assert_eq!(headers.get(COOKIE).unwrap(), "session=abc");
        assert_eq!(headers.get("referer").unwrap(), "https://v.example.com/v/1");
        assert_eq!(headers.get("accept-encoding").unwrap(), "identity;q=1, *;q=0");
    }
}
