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


//! Page scraping for the hosted-media strategies
//!
//! `scraper::Html` is not `Send`, so every function here takes the page
//! as text and returns owned data. Strategies call them between awaits.

use crate::error::{FetchError, Result};
use scraper::{Html, Selector};
use url::Url;

const DRIVE_LINK: &str = "#uc-download-link";
const DRIVE_FORM: &str = "form#download-form";
const DRIVE_FORM_FIELDS: &str = "form#download-form input[type=hidden]";
const DRIVE_ERROR: &str = ".uc-error-subcaption";

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css)
        .map_err(|e| FetchError::InvalidConfiguration(format!("bad selector '{}': {:?}", css, e)))
}

/// First value of `attr` on an element matching `css`
pub fn select_attr(html: &str, css: &str, attr: &str) -> Result<Option<String>> {
    let sel = selector(css)?;
    let doc = Html::parse_document(html);
    Ok(doc
        .select(&sel)
        .filter_map(|el| el.value().attr(attr))
        .map(|v| v.trim().to_string())
        .find(|v| !v.is_empty()))
}

/// Trimmed text of the first element matching `css`
pub fn select_text(html: &str, css: &str) -> Result<Option<String>> {
    let sel = selector(css)?;
    let doc = Html::parse_document(html);
    Ok(doc
        .select(&sel)
        .map(|el| el.text().collect::<String>().trim().to_string())
        .find(|t| !t.is_empty()))
}

/// Contents of `<title>`
pub fn page_title(html: &str) -> Option<String> {
    select_text(html, "title").ok().flatten()
}

/// A quality offered by a video page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualityLink {
    pub label: String,
    pub url: Url,
}

/// Quality links that point back at `page` with a quality parameter
///
/// Anchors are resolved against the page first. The label is the value of
/// `param`, or the text after the last `=` of whatever follows the page URL.
/// Labels are distinct, first occurrence wins.
pub fn collect_qualities(html: &str, page: &Url, param: &str) -> Vec<QualityLink> {
    let mut found: Vec<QualityLink> = Vec::new();
    let Ok(sel) = Selector::parse("a[href]") else {
        return found;
    };

    let doc = Html::parse_document(html);
    let prefix = page.as_str();
    for el in doc.select(&sel) {
        let Some(href) = el.value().attr("href") else {
            continue;
        };
        let Ok(url) = page.join(href.trim()) else {
            continue;
        };
        let Some(rest) = url.as_str().strip_prefix(prefix) else {
            continue;
        };

        let label = url
            .query_pairs()
            .find(|(k, _)| k == param)
            .map(|(_, v)| v.into_owned())
            .or_else(|| rest.rsplit_once('=').map(|(_, v)| v.to_string()));

        if let Some(label) = label.filter(|l| !l.is_empty()) {
            if !found.iter().any(|q| q.label == label) {
                found.push(QualityLink { label, url });
            }
        }
    }
    found
}

/// Best offered quality according to `preference` (best first)
pub fn pick_quality<'a>(
    offered: &'a [QualityLink],
    preference: &[String],
    page: &str,
) -> Result<&'a QualityLink> {
    preference
        .iter()
        .find_map(|wanted| offered.iter().find(|q| &q.label == wanted))
        .ok_or_else(|| FetchError::NoUsableQuality(page.to_string()))
}

/// What the drive host's gating page offers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriveGate {
    /// Confirmation anchor
    Link(String),
    /// Confirmation form: action and hidden fields
    Form {
        action: String,
        fields: Vec<(String, String)>,
    },
    /// Error text shown by the host
    HostError(String),
    /// Nothing recognizable
    Unresolved,
}

impl DriveGate {
    /// Read a gating page
    pub fn parse(html: &str) -> Self {
        let doc = Html::parse_document(html);

        if let Ok(sel) = Selector::parse(DRIVE_LINK) {
            let href = doc
                .select(&sel)
                .filter_map(|el| el.value().attr("href"))
                .find(|h| !h.trim().is_empty());
            if let Some(href) = href {
                return DriveGate::Link(href.trim().to_string());
            }
        }

        if let Ok(sel) = Selector::parse(DRIVE_FORM) {
            let action = doc
                .select(&sel)
                .filter_map(|el| el.value().attr("action"))
                .find(|a| !a.trim().is_empty());
            if let Some(action) = action {
                let mut fields = Vec::new();
                if let Ok(inputs) = Selector::parse(DRIVE_FORM_FIELDS) {
                    for el in doc.select(&inputs) {
                        if let Some(name) = el.value().attr("name") {
                            let value = el.value().attr("value").unwrap_or_default();
                            fields.push((name.to_string(), value.to_string()));
                        }
                    }
                }
                return DriveGate::Form {
                    action: action.trim().to_string(),
                    fields,
                };
            }
        }

        if let Ok(sel) = Selector::parse(DRIVE_ERROR) {
            let text = doc
                .select(&sel)
                .map(|el| el.text().collect::<String>().trim().to_string())
                .find(|t| !t.is_empty());
            if let Some(text) = text {
                return DriveGate::HostError(text);
            }
        }

        DriveGate::Unresolved
    }

    /// Confirmation URL resolved against the host
    ///
    /// `page` names the gating page in the error when nothing usable was found.
    pub fn confirm_url(&self, base: &Url, page: &str) -> Result<Url> {
        match self {
            DriveGate::Link(href) => Ok(base.join(href)?),
            DriveGate::Form { action, fields } => {
                let mut url = base.join(action)?;
                if !fields.is_empty() {
                    url.query_pairs_mut()
                        .extend_pairs(fields.iter().map(|(k, v)| (k.as_str(), v.as_str())));
                }
                Ok(url)
            }
            DriveGate::HostError(text) => Err(FetchError::HostError(text.clone())),
            DriveGate::Unresolved => Err(FetchError::MissingDirectLink(page.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prefs() -> Vec<String> {
        ["720p", "480p", "360p", "240p"].iter().map(|s| s.to_string()).collect()
    }

    fn offered(labels: &[&str]) -> Vec<QualityLink> {
        labels
            .iter()
            .map(|l| QualityLink {
                label: l.to_string(),
                url: Url::parse(&format!("https://v.example.com/v/abc?q={}", l)).unwrap(),
            })
            .collect()
    }

    #[test]
    fn test_pick_quality_preference() {
        let offers = offered(&["240p", "480p"]);
        let picked = pick_quality(&offers, &prefs(), "p").unwrap();
        assert_eq!(picked.label, "480p");

        let offers = offered(&["720p", "240p"]);
        let picked = pick_quality(&offers, &prefs(), "p").unwrap();
        assert_eq!(picked.label, "720p");

        let err = pick_quality(&offered(&[]), &prefs(), "p").unwrap_err();
        assert!(matches!(err, FetchError::NoUsableQuality(_)));

        let err = pick_quality(&offered(&["1080p"]), &prefs(), "p").unwrap_err();
        assert!(matches!(err, FetchError::NoUsableQuality(_)));
    }

    #[test]
    fn test_collect_qualities_only_self_links() {
        let page = Url::parse("https://v.example.com/v/abc").unwrap();
        let html = r#"
            <a href="https://v.example.com/v/abc&q=480p">480p</a>
            <a href="/v/abc?q=720p">720p</a>
            <a href="https://v.example.com/v/abc&q=480p">480p again</a>
            <a href="https://v.example.com/v/other?q=360p">other video</a>
            <a href="https://elsewhere.example.com/?q=240p">ad</a>
            <a>no href</a>
        "#;

        let labels: Vec<_> = collect_qualities(html, &page, "q")
            .into_iter()
            .map(|q| q.label)
            .collect();
        assert_eq!(labels, vec!["480p", "720p"]);
    }

    #[test]
    fn test_select_title_and_source() {
        let html = r#"<html><head><title> My Video </title></head>
            <body><video id="videojs">
              <source src="https://cdn.example.com/a.mp4" type="video/mp4">
            </video></body></html>"#;

        assert_eq!(page_title(html).as_deref(), Some("My Video"));
        assert_eq!(
            select_attr(html, "#videojs > source", "src").unwrap().as_deref(),
            Some("https://cdn.example.com/a.mp4")
        );
        assert_eq!(select_attr(html, "#player > source", "src").unwrap(), None);
    }

    #[test]
    fn test_bad_selector_is_config_error() {
        assert!(matches!(
            select_attr("<p></p>", "##", "src"),
            Err(FetchError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_drive_gate_link() {
        let html = r#"<a id="uc-download-link"
            href="/uc?export=download&amp;confirm=AbC&amp;id=xyz">Download anyway</a>"#;
        let gate = DriveGate::parse(html);
        assert_eq!(gate, DriveGate::Link("/uc?export=download&confirm=AbC&id=xyz".into()));

        let base = Url::parse("https://drive.google.com").unwrap();
        let url = gate.confirm_url(&base, "gate").unwrap();
        assert_eq!(url.as_str(), "https://drive.google.com/uc?export=download&confirm=AbC&id=xyz");
    }

    #[test]
    fn test_drive_gate_form() {
        let html = r#"
            <form id="download-form" action="https://drive.usercontent.google.com/download" method="get">
              <input type="submit" value="Download anyway">
              <input type="hidden" name="id" value="xyz">
              <input type="hidden" name="export" value="download">
              <input type="hidden" name="confirm" value="t">
            </form>"#;
        let gate = DriveGate::parse(html);
        let base = Url::parse("https://drive.google.com").unwrap();
        let url = gate.confirm_url(&base, "gate").unwrap();
        assert_eq!(
            url.as_str(),
            "https://drive.usercontent.google.com/download?id=xyz&export=download&confirm=t"
        );
    }

    #[test]
    fn test_drive_gate_errors() {
        let base = Url::parse("https://drive.google.com").unwrap();

        let gate = DriveGate::parse(r#"<p class="uc-error-subcaption">Quota exceeded</p>"#);
        let err = gate.confirm_url(&base, "gate").unwrap_err();
        assert_eq!(err.to_string(), "Quota exceeded");

        let gate = DriveGate::parse("<html><body>nothing here</body></html>");
        assert_eq!(gate, DriveGate::Unresolved);
        assert!(matches!(
            gate.confirm_url(&base, "gate"),
            Err(FetchError::MissingDirectLink(_))
        ));
    }
}
