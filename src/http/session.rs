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


//! Session construction and header helpers
//!
//! # Client Structure
//! - Descriptor headers become the client's default headers
//! - Optional upstream proxy applies to every request
//! - Cookie jar is owned by the session; seeded cookies carry an explicit
//!   domain and expiry
//! - Redirects are followed (consent pages bounce through several hops)

use crate::error::{FetchError, Result};
use crate::source::Cookie;
use chrono::{DateTime, Utc};
use reqwest::cookie::Jar;
use reqwest::header::{
    HeaderMap, HeaderName, HeaderValue, ACCEPT, ACCEPT_ENCODING, ACCEPT_LANGUAGE, CACHE_CONTROL,
    CONTENT_DISPOSITION, PRAGMA, REFERER, USER_AGENT,
};
use reqwest::{Client, Response, StatusCode};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Browser identity sent to hosts that gate on it
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_13_3) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/64.0.3282.167 Safari/537.36";

/// Convert descriptor headers into a header map
pub fn header_map(headers: &HashMap<String, String>) -> Result<HeaderMap> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let header_name =
            HeaderName::from_bytes(name.trim().as_bytes()).map_err(|e| FetchError::InvalidHeader {
                name: name.clone(),
                reason: e.to_string(),
            })?;
        let header_value =
            HeaderValue::from_str(value.trim()).map_err(|e| FetchError::InvalidHeader {
                name: name.clone(),
                reason: e.to_string(),
            })?;
        map.insert(header_name, header_value);
    }
    Ok(map)
}

/// Serialize cookies the way a `Cookie` request header carries them
pub fn cookie_header(cookies: &[Cookie]) -> String {
    cookies
        .iter()
        .map(|c| format!("{}={}", c.name, c.value))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Fixed header set identifying as a desktop browser
pub fn browser_headers(referer: Option<&str>) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
    headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
    headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9,vi;q=0.8"));
    headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("identity;q=1, *;q=0"));
    if let Some(referer) = referer.and_then(|r| HeaderValue::from_str(r).ok()) {
        headers.insert(REFERER, referer);
    }
    headers
}

/// File name announced by a `Content-Disposition` header
///
/// Prefers the RFC 5987 `filename*` form. Empty names, names ending in `/`
/// and names containing NUL are rejected.
pub fn file_name_from_headers(headers: &HeaderMap) -> Option<String> {
    let disposition = headers.get(CONTENT_DISPOSITION)?.to_str().ok()?;

    let mut plain = None;
    let mut extended = None;
    for param in disposition.split(';').skip(1) {
        let Some((key, value)) = param.split_once('=') else {
            continue;
        };
        let value = value.trim().trim_matches('"');
        match key.trim().to_ascii_lowercase().as_str() {
            "filename*" => {
                // charset'language'percent-encoded
                let encoded = value.splitn(3, '\'').nth(2).unwrap_or(value);
                extended = urlencoding::decode(encoded).ok().map(|s| s.into_owned());
            }
            "filename" => plain = Some(value.to_string()),
            _ => {}
        }
    }

    extended
        .or(plain)
        .filter(|name| !name.is_empty() && !name.ends_with('/') && !name.contains('\0'))
}

/// Build a client with default headers, optional proxy and optional jar
pub fn build_client(
    headers: HeaderMap,
    proxy: Option<&str>,
    connect_timeout: Duration,
    jar: Option<Arc<Jar>>,
) -> Result<Client> {
    let mut builder = Client::builder()
        .default_headers(headers)
        .connect_timeout(connect_timeout)
        .pool_idle_timeout(Duration::from_secs(90));

    if let Some(jar) = jar {
        builder = builder.cookie_provider(jar);
    }

    if let Some(proxy) = proxy.filter(|p| !p.trim().is_empty()) {
        let proxy = reqwest::Proxy::all(proxy).map_err(|e| FetchError::invalid_url(proxy, e))?;
        builder = builder.proxy(proxy);
    }

    Ok(builder.build()?)
}

/// Per-invocation HTTP session
#[derive(Debug)]
pub struct Session {
    /// Underlying HTTP client
    client: Client,
    /// Cookie jar shared only with `client`
    jar: Arc<Jar>,
}

impl Session {
    /// Create a session carrying the descriptor's headers and proxy
    pub fn new(
        headers: &HashMap<String, String>,
        proxy: Option<&str>,
        connect_timeout: Duration,
    ) -> Result<Self> {
        let jar = Arc::new(Jar::default());
        let client = build_client(header_map(headers)?, proxy, connect_timeout, Some(jar.clone()))?;
        Ok(Self { client, jar })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Put cookies into the jar as if `url` had set them
    ///
    /// `domain_for` picks the cookie's Domain attribute by name.
    pub fn seed_cookies<F>(
        &self,
        cookies: &[Cookie],
        url: &Url,
        expires: DateTime<Utc>,
        domain_for: F,
    )
    where
        F: Fn(&str) -> String,
    {
        let expires = expires.format("%a, %d %b %Y %H:%M:%S GMT");
        for cookie in cookies {
            let set_cookie = format!(
                "{}={}; Domain={}; Path=/; Expires={}",
                cookie.name,
                cookie.value,
                domain_for(&cookie.name),
                expires
            );
            self.jar.add_cookie_str(&set_cookie, url);
        }
        debug!(count = cookies.len(), url = %url, "seeded session cookies");
    }

    /// GET `url` with extra headers
    pub async fn get(&self, url: &str, headers: HeaderMap) -> Result<Response> {
        Ok(self.client.get(url).headers(headers).send().await?)
    }

    /// GET `url`, failing on anything but 200
    pub async fn get_ok(&self, url: &str, headers: HeaderMap) -> Result<Response> {
        let response = self.get(url, headers).await?;
        if response.status() != StatusCode::OK {
            return Err(FetchError::status(response.status(), url));
        }
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use reqwest::cookie::CookieStore;

    #[test]
    fn test_cookie_header_keeps_order() {
        let cookies = vec![Cookie::new("SID", "1"), Cookie::new("HSID", "2")];
        assert_eq!(cookie_header(&cookies), "SID=1; HSID=2");
        assert_eq!(cookie_header(&[]), "");
    }

    #[test]
    fn test_header_map_rejects_bad_names() {
        let mut headers = HashMap::new();
        headers.insert("Bad Header".to_string(), "x".to_string());
        assert!(matches!(header_map(&headers), Err(FetchError::InvalidHeader { .. })));
    }

    #[test]
    fn test_file_name_from_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_DISPOSITION,
            HeaderValue::from_static("attachment; filename=\"movie.mp4\""),
        );
        assert_eq!(file_name_from_headers(&headers).as_deref(), Some("movie.mp4"));

        headers.insert(
            CONTENT_DISPOSITION,
            HeaderValue::from_static(
                "attachment; filename=\"x.mp4\"; filename*=UTF-8''T%E1%BA%ADp%201.mp4",
            ),
        );
        assert_eq!(file_name_from_headers(&headers).as_deref(), Some("Tập 1.mp4"));

        headers.insert(
            CONTENT_DISPOSITION,
            HeaderValue::from_static("attachment; filename=\"dir/\""),
        );
        assert_eq!(file_name_from_headers(&headers), None);

        headers.insert(CONTENT_DISPOSITION, HeaderValue::from_static("inline"));
        assert_eq!(file_name_from_headers(&headers), None);
    }

    #[test]
    fn test_seed_cookies_uses_domain() {
        let session = Session::new(&HashMap::new(), None, Duration::from_secs(5)).unwrap();
        let url = Url::parse("https://drive.google.com/file/d/abc/view").unwrap();
        let cookies = vec![Cookie::new("SID", "one"), Cookie::new("S", "two")];

        session.seed_cookies(&cookies, &url, Utc::now() + ChronoDuration::days(30), |name| {
            if name == "S" {
                ".drive.google.com".to_string()
            } else {
                ".google.com".to_string()
            }
        });

        let sent = session.jar.cookies(&url).unwrap();
        let sent = sent.to_str().unwrap();
        assert!(sent.contains("SID=one"));
        assert!(sent.contains("S=two"));

        // Only the primary-domain cookie reaches sibling hosts
        let other = Url::parse("https://accounts.google.com/").unwrap();
        let sent = session.jar.cookies(&other).unwrap();
        assert_eq!(sent.to_str().unwrap(), "SID=one");
    }

    #[test]
    fn test_browser_headers_referer() {
        let headers = browser_headers(Some("https://host/e/1"));
        assert_eq!(headers.get(REFERER).unwrap(), "https://host/e/1");
        assert!(browser_headers(None).get(REFERER).is_none());
    }
}
