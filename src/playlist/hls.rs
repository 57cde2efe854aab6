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


//! HLS playlist downloader
//!
//! # Download Flow
//! 1. Fetch the playlist; a master playlist is followed to its
//!    highest-bandwidth variant
//! 2. Resolve every segment URI and the key in effect for it
//! 3. Fetch each distinct AES-128 key once
//! 4. Fetch segments `workers` at a time, decrypting as they arrive
//! 5. Append them in playlist order to `<dir>/<playlist stem>.ts`
//!
//! The IV is the tag's `IV` attribute when present, otherwise the segment's
//! media sequence number as a big-endian 128-bit value.

use crate::config::FetchConfig;
use crate::error::{FetchError, Result};
use crate::file::file_name_or;
use crate::http::build_client;
use crate::playlist::{PlaylistFetch, PlaylistRequest};
use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, KeyIvInit};
use async_trait::async_trait;
use futures_util::{stream, FutureExt, StreamExt};
use m3u8_rs::{KeyMethod, MediaPlaylist, Playlist};
use reqwest::Client;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info};
use url::Url;

type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;

const MAX_MASTER_HOPS: usize = 4;
const KEY_LEN: usize = 16;

/// A segment with everything needed to fetch and decrypt it
#[derive(Debug, Clone, PartialEq, Eq)]
struct SegmentJob {
    url: Url,
    key: Option<SegmentKey>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct SegmentKey {
    url: Url,
    iv: [u8; 16],
}

/// Default [`PlaylistFetch`] implementation
#[derive(Debug, Clone)]
pub struct HlsDownloader {
    connect_timeout: Duration,
}

impl HlsDownloader {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }

    pub fn from_config(config: &FetchConfig) -> Self {
        Self::new(config.connect_timeout())
    }
}

#[async_trait]
impl PlaylistFetch for HlsDownloader {
    async fn download(&self, request: &PlaylistRequest) -> Result<PathBuf> {
        let client = build_client(
            request.headers.clone(),
            request.proxy.as_deref(),
            self.connect_timeout,
            None,
        )?;

        let (media_url, media) = resolve_media(&client, &request.url).await?;
        let jobs = plan_segments(&media_url, &media)?;
        let keys = fetch_keys(&client, &jobs).await?;

        let output = request
            .destination_dir
            .join(format!("{}.ts", output_stem(&request.url)));
        info!(
            segments = jobs.len(),
            workers = request.workers,
            output = %output.display(),
            "downloading playlist"
        );

        let written = write_segments(&client, &jobs, &keys, request.workers.max(1), &output).await?;
        info!(size = written, "playlist assembled");

        Ok(output)
    }
}

async fn fetch_bytes(client: &Client, url: &Url) -> Result<Vec<u8>> {
    let response = client.get(url.clone()).send().await?;
    if !response.status().is_success() {
        return Err(FetchError::status(response.status(), url.as_str()));
    }
    Ok(response.bytes().await?.to_vec())
}

/// Follow master playlists until a media playlist is reached
async fn resolve_media(client: &Client, url: &Url) -> Result<(Url, MediaPlaylist)> {
    let mut current = url.clone();

    for _ in 0..MAX_MASTER_HOPS {
        let body = fetch_bytes(client, &current).await?;
        let next = match m3u8_rs::parse_playlist_res(&body) {
            Ok(Playlist::MediaPlaylist(media)) => return Ok((current, media)),
            Ok(Playlist::MasterPlaylist(master)) => {
                let variant = master
                    .variants
                    .iter()
                    .filter(|v| !v.is_i_frame)
                    .max_by_key(|v| v.bandwidth)
                    .ok_or_else(|| {
                        FetchError::InvalidPlaylist(format!("{} lists no variants", current))
                    })?;
                debug!(bandwidth = variant.bandwidth, uri = %variant.uri, "selected variant");
                current.join(&variant.uri)?
            }
            Err(_) => {
                return Err(FetchError::InvalidPlaylist(format!(
                    "{} is not an HLS playlist",
                    current
                )))
            }
        };
        current = next;
    }

    Err(FetchError::InvalidPlaylist(format!(
        "{} nests more than {} master playlists",
        url, MAX_MASTER_HOPS
    )))
}

/// Resolve segment URIs and carry each key forward until replaced
fn plan_segments(base: &Url, media: &MediaPlaylist) -> Result<Vec<SegmentJob>> {
    if media.segments.is_empty() {
        return Err(FetchError::InvalidPlaylist(format!("{} has no segments", base)));
    }

    let mut current = None;
    let mut jobs = Vec::with_capacity(media.segments.len());

    for (index, segment) in media.segments.iter().enumerate() {
        if let Some(key) = &segment.key {
            current = Some(key.clone());
        }

        let sequence = media.media_sequence + index as u64;
        let key = match &current {
            None => None,
            Some(key) => match &key.method {
                KeyMethod::None => None,
                KeyMethod::AES128 => {
                    let uri = key.uri.as_deref().ok_or_else(|| {
                        FetchError::InvalidPlaylist("AES-128 key without URI".to_string())
                    })?;
                    Some(SegmentKey {
                        url: base.join(uri)?,
                        iv: segment_iv(key.iv.as_deref(), sequence)?,
                    })
                }
                other => {
                    return Err(FetchError::InvalidPlaylist(format!(
                        "unsupported encryption method {:?}",
                        other
                    )))
                }
            },
        };

        jobs.push(SegmentJob {
            url: base.join(&segment.uri)?,
            key,
        });
    }

    Ok(jobs)
}

fn segment_iv(explicit: Option<&str>, sequence: u64) -> Result<[u8; 16]> {
    let mut iv = [0u8; 16];
    match explicit {
        Some(text) => {
            let digits = text
                .strip_prefix("0x")
                .or_else(|| text.strip_prefix("0X"))
                .unwrap_or(text);
            let bytes = hex::decode(digits)
                .map_err(|e| FetchError::InvalidPlaylist(format!("bad IV '{}': {}", text, e)))?;
            if bytes.len() != iv.len() {
                return Err(FetchError::InvalidPlaylist(format!(
                    "IV '{}' is not 16 bytes",
                    text
                )));
            }
            iv.copy_from_slice(&bytes);
        }
        None => iv[8..].copy_from_slice(&sequence.to_be_bytes()),
    }
    Ok(iv)
}

async fn fetch_keys(client: &Client, jobs: &[SegmentJob]) -> Result<HashMap<Url, Vec<u8>>> {
    let mut keys = HashMap::new();
    for key in jobs.iter().filter_map(|j| j.key.as_ref()) {
        if keys.contains_key(&key.url) {
            continue;
        }
        let bytes = fetch_bytes(client, &key.url).await?;
        if bytes.len() != KEY_LEN {
            return Err(FetchError::Decryption(format!(
                "key at {} is {} bytes",
                key.url,
                bytes.len()
            )));
        }
        debug!(url = %key.url, "fetched segment key");
        keys.insert(key.url.clone(), bytes);
    }
    Ok(keys)
}

fn decrypt_segment(data: &[u8], key: &[u8], iv: &[u8; 16]) -> Result<Vec<u8>> {
    Aes128CbcDec::new_from_slices(key, iv)
        .map_err(|e| FetchError::Decryption(e.to_string()))?
        .decrypt_padded_vec_mut::<Pkcs7>(data)
        .map_err(|e| FetchError::Decryption(e.to_string()))
}

async fn fetch_segment(
    client: &Client,
    job: &SegmentJob,
    keys: &HashMap<Url, Vec<u8>>,
) -> Result<Vec<u8>> {
    let data = fetch_bytes(client, &job.url).await?;
    match &job.key {
        None => Ok(data),
        Some(key) => {
            let secret = keys
                .get(&key.url)
                .ok_or_else(|| FetchError::internal(format!("key {} was not fetched", key.url)))?;
            decrypt_segment(&data, secret, &key.iv)
        }
    }
}

/// Fetch with bounded concurrency, append in order
async fn write_segments(
    client: &Client,
    jobs: &[SegmentJob],
    keys: &HashMap<Url, Vec<u8>>,
    workers: usize,
    output: &Path,
) -> Result<u64> {
    let mut writer = BufWriter::new(File::create(output).await?);
    // Built eagerly: a lazily mapped stream is not provably Send inside `download`
    let fetches: Vec<_> = jobs
        .iter()
        .map(|job| fetch_segment(client, job, keys).boxed())
        .collect();
    let mut segments = stream::iter(fetches).buffered(workers);

    let mut written = 0u64;
    while let Some(data) = segments.next().await {
        let data = data?;
        writer.write_all(&data).await?;
        written += data.len() as u64;
    }
    writer.flush().await?;
    Ok(written)
}

fn output_stem(url: &Url) -> String {
    let last = url
        .path_segments()
        .and_then(|mut s| s.next_back())
        .unwrap_or_default();
    let stem = Path::new(last)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default();
    file_name_or(stem, "playlist")
}

#[cfg(test)]
mod tests {
    use super::*;
    use aes::cipher::BlockEncryptMut;
    use httpmock::prelude::*;

    type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;

    const MEDIA: &str = "#EXTM3U
#EXT-X-VERSION:3
#EXT-X-TARGETDURATION:10
#EXT-X-MEDIA-SEQUENCE:7
#EXT-X-KEY:METHOD=AES-128,URI=\"key.bin\"
#EXTINF:10.0,
seg0.ts
#EXTINF:10.0,
seg1.ts
#EXT-X-KEY:METHOD=NONE
#EXTINF:10.0,
seg2.ts
#EXT-X-ENDLIST
";

    #[test]
    fn test_plan_carries_key_forward() {
        let base = Url::parse("https://cdn.example.com/show/index.m3u8").unwrap();
        let media = m3u8_rs::parse_media_playlist_res(MEDIA.as_bytes()).unwrap();
        let jobs = plan_segments(&base, &media).unwrap();

        assert_eq!(jobs.len(), 3);
        assert_eq!(jobs[0].url.as_str(), "https://cdn.example.com/show/seg0.ts");

        let first = jobs[0].key.as_ref().unwrap();
        let second = jobs[1].key.as_ref().unwrap();
        assert_eq!(first.url.as_str(), "https://cdn.example.com/show/key.bin");
        assert_eq!(first.iv[15], 7);
        assert_eq!(second.iv[15], 8);
        assert!(jobs[2].key.is_none());
    }

    #[test]
    fn test_segment_iv() {
        let iv = segment_iv(Some("0x000102030405060708090A0B0C0D0E0F"), 99).unwrap();
        assert_eq!(iv[0], 0x00);
        assert_eq!(iv[15], 0x0F);

        let iv = segment_iv(None, 0x0102).unwrap();
        assert_eq!(&iv[..14], &[0u8; 14]);
        assert_eq!(&iv[14..], &[0x01, 0x02]);

        assert!(segment_iv(Some("0xABCD"), 0).is_err());
    }

    #[test]
    fn test_output_stem() {
        let url = Url::parse("https://cdn.example.com/show/episode-1.m3u8?token=x").unwrap();
        assert_eq!(output_stem(&url), "episode-1");

        let bare = Url::parse("https://cdn.example.com/").unwrap();
        assert_eq!(output_stem(&bare), "playlist");
    }

    fn request(url: String, dir: &Path) -> PlaylistRequest {
        PlaylistRequest {
            url: Url::parse(&url).unwrap(),
            headers: Default::default(),
            destination_dir: dir.to_path_buf(),
            workers: 2,
            proxy: None,
        }
    }

    #[tokio::test]
    async fn test_master_to_encrypted_media() {
        let server = MockServer::start_async().await;
        let key = [7u8; 16];
        let plain: Vec<Vec<u8>> = vec![vec![1u8; 1000], vec![2u8; 2000], vec![3u8; 500]];

        let master = "#EXTM3U
#EXT-X-STREAM-INF:BANDWIDTH=800000,RESOLUTION=640x360
low/index.m3u8
#EXT-X-STREAM-INF:BANDWIDTH=2400000,RESOLUTION=1280x720
high/index.m3u8
";
        server.mock(|when, then| {
            when.method(GET).path("/show/master.m3u8");
            then.status(200).body(master);
        });
        server.mock(|when, then| {
            when.method(GET).path("/show/high/index.m3u8");
            then.status(200).body(MEDIA);
        });
        server.mock(|when, then| {
            when.method(GET).path("/show/high/key.bin");
            then.status(200).body(key.to_vec());
        });

        for (index, data) in plain.iter().enumerate() {
            let body = if index < 2 {
                let iv = segment_iv(None, 7 + index as u64).unwrap();
                Aes128CbcEnc::new_from_slices(&key, &iv)
                    .unwrap()
                    .encrypt_padded_vec_mut::<Pkcs7>(data)
            } else {
                data.clone()
            };
            server.mock(|when, then| {
                when.method(GET).path(format!("/show/high/seg{}.ts", index));
                then.status(200).body(body);
            });
        }

        let dir = tempfile::tempdir().unwrap();
        let output = HlsDownloader::new(Duration::from_secs(5))
            .download(&request(server.url("/show/master.m3u8"), dir.path()))
            .await
            .unwrap();

        assert_eq!(output, dir.path().join("master.ts"));
        assert_eq!(std::fs::read(&output).unwrap(), plain.concat());
    }

    #[tokio::test]
    async fn test_not_a_playlist() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(GET).path("/page.m3u8");
            then.status(200).body("<html>login required</html>");
        });

        let dir = tempfile::tempdir().unwrap();
        let err = HlsDownloader::new(Duration::from_secs(5))
            .download(&request(server.url("/page.m3u8"), dir.path()))
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::InvalidPlaylist(_)));
    }

    #[tokio::test]
    async fn test_segment_status_error() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(GET).path("/v/index.m3u8");
            then.status(200)
                .body("#EXTM3U\n#EXT-X-TARGETDURATION:4\n#EXTINF:4.0,\na.ts\n#EXT-X-ENDLIST\n");
        });
        server.mock(|when, then| {
            when.method(GET).path("/v/a.ts");
            then.status(403);
        });

        let dir = tempfile::tempdir().unwrap();
        let err = HlsDownloader::new(Duration::from_secs(5))
            .download(&request(server.url("/v/index.m3u8"), dir.path()))
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::UnexpectedStatus { status_code: 403, .. }));
    }
}
