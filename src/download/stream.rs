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


//! Buffered streaming of a response body to disk
//!
//! Used by the scraped strategies, which get one plain response and copy it
//! to the destination file. Writes go through a 32KB buffer and are flushed
//! once at the end.

use crate::error::{FetchError, Result};
use futures_util::StreamExt;
use reqwest::Response;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};

const COPY_BUFF_SZ: usize = 32 * 1024;

/// Copy the whole response body into `file`, returning the bytes written
pub async fn copy_response(response: Response, file: File) -> Result<u64> {
    let mut writer = BufWriter::with_capacity(COPY_BUFF_SZ, file);
    let mut stream = response.bytes_stream();
    let mut written = 0u64;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        writer.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }

    writer.flush().await?;
    Ok(written)
}

/// Reject bodies that are too small to be media
///
/// A mis-parsed gating page yields a short HTML document; keeping it would
/// silently save garbage.
pub fn ensure_min_size(written: u64, minimum: u64) -> Result<()> {
    if written < minimum {
        return Err(FetchError::Undersized {
            actual: written,
            minimum,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MIN_MEDIA_SIZE;

    #[test]
    fn test_min_size_boundary() {
        assert!(matches!(
            ensure_min_size(4 * 1024 * 1024, MIN_MEDIA_SIZE),
            Err(FetchError::Undersized { actual: 4194304, .. })
        ));
        assert!(ensure_min_size(MIN_MEDIA_SIZE, MIN_MEDIA_SIZE).is_ok());
        assert!(ensure_min_size(MIN_MEDIA_SIZE + 1, MIN_MEDIA_SIZE).is_ok());
    }

    #[tokio::test]
    async fn test_copy_response_writes_body() {
        let server = httpmock::MockServer::start_async().await;
        let body = vec![7u8; 100_000];
        server.mock(|when, then| {
            when.method(httpmock::Method::GET).path("/blob");
            then.status(200).body(&body);
        });

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blob.bin");
        let file = File::create(&path).await.unwrap();

        let response = reqwest::get(server.url("/blob")).await.unwrap();
        let written = copy_response(response, file).await.unwrap();

        assert_eq!(written, 100_000);
        assert_eq!(std::fs::read(&path).unwrap(), body);
    }
}
