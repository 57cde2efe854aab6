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


//! Drive-hosted file strategy
//!
//! # Resolution
//! 1. Seed the descriptor's cookies for the drive domains
//! 2. GET the item's view page (establishes the session)
//! 3. GET the export endpoint
//!    - named attachment: that response is the file
//!    - otherwise a gating page: follow its confirmation link or form
//!
//! The chosen response is kept unread until `execute` streams it to disk.

use crate::config::{DriveHostConfig, FetchConfig};
use crate::download::stream::{copy_response, ensure_min_size};
use crate::error::{FetchError, Result};
use crate::file::{file_name_or, WorkingDir};
use crate::http::{file_name_from_headers, Session, BROWSER_USER_AGENT};
use crate::scrape::DriveGate;
use crate::source::{SourceDescriptor, TransferResult};
use crate::strategy::Download;
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest::Response;
use std::sync::Arc;
use tokio::fs::File;
use tracing::{debug, info};
use url::Url;

pub struct DriveStrategy {
    id: String,
    descriptor: SourceDescriptor,
    config: Arc<FetchConfig>,
    pending: Option<Pending>,
}

/// Resolved download, body not yet read
struct Pending {
    response: Response,
    file_name: String,
}

impl DriveStrategy {
    pub fn new(id: String, descriptor: SourceDescriptor, config: Arc<FetchConfig>) -> Self {
        Self {
            id,
            descriptor,
            config,
            pending: None,
        }
    }
}

/// Cookie domain for a seeded cookie
fn cookie_domain(drive: &DriveHostConfig, name: &str) -> String {
    if drive.stream_cookie_names.iter().any(|n| n == name) {
        drive.stream_cookie_domain.clone()
    } else {
        drive.cookie_domain.clone()
    }
}

/// Find the response carrying the file
async fn resolve(
    id: &str,
    descriptor: &SourceDescriptor,
    config: &FetchConfig,
) -> Result<Response> {
    let drive = &config.drive;
    let root = drive.base_url.trim_end_matches('/');
    let base = Url::parse(root)?;
    let session = Session::new(
        &descriptor.headers,
        descriptor.proxy.as_deref(),
        config.connect_timeout(),
    )?;

    let expires = Utc::now() + ChronoDuration::days(drive.cookie_lifetime_days);
    session.seed_cookies(&descriptor.cookies, &base, expires, |name| {
        cookie_domain(drive, name)
    });

    let item = urlencoding::encode(descriptor.value.trim()).into_owned();
    let view_url = format!("{}/file/d/{}/view", root, item);
    session
        .get_ok(&view_url, user_agent())
        .await
        .map_err(|e| e.in_stage("drive view page"))?;

    let export_url = format!("{}/uc?id={}&export=download", root, item);
    let export = session
        .get_ok(&export_url, user_agent())
        .await
        .map_err(|e| e.in_stage("drive export page"))?;

    if file_name_from_headers(export.headers()).is_some() {
        debug!(id = %id, "export endpoint served the file directly");
        return Ok(export);
    }

    let page = export.text().await?;
    let confirm = DriveGate::parse(&page)
        .confirm_url(&base, &export_url)
        .map_err(|e| e.in_stage("drive confirmation"))?;
    debug!(id = %id, url = %confirm, "following drive confirmation");

    session
        .get_ok(confirm.as_str(), user_agent())
        .await
        .map_err(|e| e.in_stage("drive download"))
}

fn user_agent() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
    headers
}

#[async_trait]
impl Download for DriveStrategy {
    async fn parse(&mut self) -> Result<()> {
        if self.pending.is_some() {
            return Ok(());
        }

        let response = resolve(&self.id, &self.descriptor, &self.config).await?;
        let file_name = file_name_from_headers(response.headers())
            .map(|name| file_name_or(&name, &self.id))
            .unwrap_or_else(|| file_name_or(&self.id, "download"));

        self.pending = Some(Pending {
            response,
            file_name,
        });
        Ok(())
    }

    async fn execute(&mut self) -> Result<TransferResult> {
        self.parse().await?;
        let Pending {
            response,
            file_name,
        } = self
            .pending
            .take()
            .ok_or_else(|| FetchError::internal("drive response missing after parse"))?;

        info!(id = %self.id, file = %file_name, "starting drive transfer");

        let dir = WorkingDir::create(&self.config.temp_root).await?;
        let destination = dir.join(&file_name);
        let written = copy_response(response, File::create(&destination).await?).await?;
        ensure_min_size(written, self.config.min_file_size)?;

        info!(id = %self.id, size = written, "drive transfer finished");
        Ok(TransferResult::new(self.id.clone(), destination, dir.keep()))
    }
}
