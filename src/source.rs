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


//! Source descriptors and transfer results
//!
//! A [`SourceDescriptor`] is built by the caller and never mutated here; a
//! [`TransferResult`] is created once, at the successful end of a strategy's
//! `execute`.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Delivery strategy requested by a descriptor
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SourceKind {
    /// Plain HTTP(S) URL fetched with parallel byte ranges
    Direct,
    /// HLS playlist URL
    SegmentedPlaylist,
    /// Drive-hosting item identifier
    ScrapedDriveHost,
    /// Video-hosting page URL
    ScrapedVideoHost,
    /// Anything else; kept so the dispatcher can report it
    Unsupported(String),
}

impl SourceKind {
    pub fn as_str(&self) -> &str {
        match self {
            SourceKind::Direct => "direct",
            SourceKind::SegmentedPlaylist => "playlist",
            SourceKind::ScrapedDriveHost => "drive",
            SourceKind::ScrapedVideoHost => "video",
            SourceKind::Unsupported(tag) => tag,
        }
    }

    pub fn parse(tag: &str) -> Self {
        match tag.trim().to_ascii_lowercase().as_str() {
            "direct" | "direct_url" => SourceKind::Direct,
            "playlist" | "m3u8" | "hls" => SourceKind::SegmentedPlaylist,
            "drive" => SourceKind::ScrapedDriveHost,
            "video" | "rapid" => SourceKind::ScrapedVideoHost,
            _ => SourceKind::Unsupported(tag.to_string()),
        }
    }
}

impl From<String> for SourceKind {
    fn from(tag: String) -> Self {
        SourceKind::parse(&tag)
    }
}

impl From<SourceKind> for String {
    fn from(kind: SourceKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A `(name, value)` cookie pair seeded before any request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cookie {
    pub name: String,
    pub value: String,
}

impl Cookie {
    pub fn new<N: Into<String>, V: Into<String>>(name: N, value: V) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// What to fetch and how
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    /// Selects the strategy
    pub kind: SourceKind,

    /// URL or host-specific identifier, depending on `kind`
    pub value: String,

    /// Applied to all outbound requests
    #[serde(default)]
    pub headers: HashMap<String, String>,

    /// Seeded into the session in order
    #[serde(default)]
    pub cookies: Vec<Cookie>,

    /// Requested range-fetch parallelism; normalized by the config
    #[serde(default)]
    pub parallelism: Option<i64>,

    /// Upstream proxy address
    #[serde(default)]
    pub proxy: Option<String>,
}

impl SourceDescriptor {
    pub fn new<V: Into<String>>(kind: SourceKind, value: V) -> Self {
        Self {
            kind,
            value: value.into(),
            headers: HashMap::new(),
            cookies: Vec::new(),
            parallelism: None,
            proxy: None,
        }
    }

    pub fn with_header<K: Into<String>, V: Into<String>>(mut self, name: K, value: V) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_cookie<N: Into<String>, V: Into<String>>(mut self, name: N, value: V) -> Self {
        self.cookies.push(Cookie::new(name, value));
        self
    }

    pub fn with_parallelism(mut self, parallelism: i64) -> Self {
        self.parallelism = Some(parallelism);
        self
    }

    pub fn with_proxy<P: Into<String>>(mut self, proxy: P) -> Self {
        self.proxy = Some(proxy.into());
        self
    }
}

/// The produced file and the directory that owns it
///
/// The caller owns `working_dir` and must eventually remove it, for example
/// with [`TransferResult::dispose`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferResult {
    /// Caller-supplied correlation id
    pub id: String,

    /// Absolute path of the produced file
    pub path: PathBuf,

    /// Directory containing `path`
    pub working_dir: PathBuf,
}

impl TransferResult {
    pub fn new(id: String, path: PathBuf, working_dir: PathBuf) -> Self {
        Self {
            id,
            path,
            working_dir,
        }
    }

    /// Size of the produced file as it is on disk now
    pub async fn size_on_disk(&self) -> Result<u64> {
        Ok(tokio::fs::metadata(&self.path).await?.len())
    }

    /// File name component of `path`
    pub fn file_name(&self) -> Option<&str> {
        self.path.file_name().and_then(|n| n.to_str())
    }

    /// Check that `path` lives inside `working_dir`
    pub fn is_contained(&self) -> bool {
        self.path.starts_with(&self.working_dir)
    }

    /// Remove the working directory and everything in it
    pub async fn dispose(self) -> Result<()> {
        remove_dir_if_exists(&self.working_dir).await
    }
}

async fn remove_dir_if_exists(dir: &Path) -> Result<()> {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_tags() {
        assert_eq!(SourceKind::parse("direct"), SourceKind::Direct);
        assert_eq!(SourceKind::parse("M3U8"), SourceKind::SegmentedPlaylist);
        assert_eq!(SourceKind::parse("rapid"), SourceKind::ScrapedVideoHost);
        assert_eq!(SourceKind::parse("drive"), SourceKind::ScrapedDriveHost);
        assert_eq!(
            SourceKind::parse("redirect"),
            SourceKind::Unsupported("redirect".to_string())
        );
    }

    #[test]
    fn test_descriptor_from_json() {
        let json = r#"{
            "kind": "drive",
            "value": "1AbCdEf",
            "cookies": [{"name": "SID", "value": "abc"}, {"name": "S", "value": "xyz"}],
            "parallelism": 0
        }"#;
        let descriptor: SourceDescriptor = serde_json::from_str(json).unwrap();

        assert_eq!(descriptor.kind, SourceKind::ScrapedDriveHost);
        assert_eq!(descriptor.cookies[1], Cookie::new("S", "xyz"));
        assert_eq!(descriptor.parallelism, Some(0));
        assert!(descriptor.headers.is_empty());
        assert!(descriptor.proxy.is_none());
    }

    #[test]
    fn test_unknown_kind_round_trips_its_tag() {
        let descriptor: SourceDescriptor =
            serde_json::from_str(r#"{"kind": "uploadgig", "value": "x"}"#).unwrap();
        assert_eq!(descriptor.kind, SourceKind::Unsupported("uploadgig".to_string()));

        let json = serde_json::to_value(&descriptor).unwrap();
        assert_eq!(json["kind"], "uploadgig");
    }

    #[tokio::test]
    async fn test_dispose_removes_working_dir() {
        let root = tempfile::tempdir().unwrap();
        let working_dir = root.path().join("job");
        std::fs::create_dir(&working_dir).unwrap();
        let path = working_dir.join("media.mp4");
        std::fs::write(&path, b"data").unwrap();

        let result = TransferResult::new("job".into(), path, working_dir.clone());
        assert!(result.is_contained());
        assert_eq!(result.size_on_disk().await.unwrap(), 4);

        result.dispose().await.unwrap();
        assert!(!working_dir.exists());
    }
}
