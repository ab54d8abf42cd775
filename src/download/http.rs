// Multiget - Resumable Chunked Downloads for Mobile
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


//! HTTP requests for probing and ranged fetches
//!
//! Every request carries the same browser-like header set; ranged fetches add
//! `Range: bytes=<start>-<end>`. The probe is a plain GET whose body is never
//! read: only status, `Content-Length`, `Content-Disposition` and
//! `Last-Modified` matter.

use crate::download::config::EngineConfig;
use crate::download::partition::WorkerRange;
use crate::error::{DownloadError, Result};
use lazy_static::lazy_static;
use regex::Regex;
use reqwest::header::{
    HeaderMap, ACCEPT, ACCEPT_LANGUAGE, CONNECTION, CONTENT_DISPOSITION, CONTENT_LENGTH,
    LAST_MODIFIED, RANGE, REFERER,
};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use tracing::debug;
use url::Url;
use uuid::Uuid;

pub const USER_AGENT: &str = "Mozilla/4.0 (compatible; MSIE 8.0; Windows NT 5.2; Trident/4.0; \
     .NET CLR 1.1.4322; .NET CLR 2.0.50727; .NET CLR 3.0.04506.30; .NET CLR 3.0.4506.2152; \
     .NET CLR 3.5.30729)";

const ACCEPT_VALUE: &str = "image/gif, image/jpeg, image/pjpeg, application/x-shockwave-flash, \
     application/xaml+xml, application/vnd.ms-xpsdocument, application/x-ms-xbap, \
     application/x-ms-application, application/vnd.ms-excel, application/vnd.ms-powerpoint, \
     application/msword, */*";

const ACCEPT_LANGUAGE_VALUE: &str = "zh-CN";

lazy_static! {
    static ref DISPOSITION_EXTENDED: Regex =
        Regex::new(r#"(?i)filename\*\s*=\s*[^']*'[^']*'([^;]+)"#).expect("valid regex");
    static ref DISPOSITION_QUOTED: Regex =
        Regex::new(r#"(?i)filename\s*=\s*"([^"]*)""#).expect("valid regex");
    static ref DISPOSITION_BARE: Regex =
        Regex::new(r#"(?i)filename\s*=\s*([^;"]+)"#).expect("valid regex");
}

/// What the metadata probe learned about the remote file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeInfo {
    /// URL after redirects; workers fetch from here
    pub final_url: Url,

    /// Content-Length, if the server sent one
    pub content_length: Option<u64>,

    /// Target file name derived from headers or URL
    pub file_name: String,

    /// Raw Last-Modified header value
    pub last_modified: Option<String>,
}

/// HTTP client shared by the probe and every worker
#[derive(Debug, Clone)]
pub struct TransferClient {
    client: Client,
}

impl TransferClient {
    pub fn new(config: &EngineConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout())
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self { client })
    }

    fn request(&self, url: &Url) -> RequestBuilder {
        self.client
            .get(url.clone())
            .header(ACCEPT, ACCEPT_VALUE)
            .header(ACCEPT_LANGUAGE, ACCEPT_LANGUAGE_VALUE)
            .header(REFERER, url.as_str())
            .header("Charset", "UTF-8")
            .header(CONNECTION, "keep-alive")
    }

    /// Metadata probe: GET, require 200, read headers only
    pub async fn probe(&self, url: &Url) -> Result<ProbeInfo> {
        let response = self.request(url).send().await?;
        let status = response.status();
        if status != StatusCode::OK {
            return Err(DownloadError::ProbeFailed {
                status_code: status.as_u16(),
                host: url.host_str().unwrap_or_default().to_string(),
            });
        }

        let headers = response.headers();
        for (name, value) in headers {
            debug!(header = %name, value = ?value, "probe response header");
        }

        let final_url = response.url().clone();
        let info = ProbeInfo {
            content_length: content_length(headers).or_else(|| response.content_length()),
            file_name: resolve_file_name(headers, url),
            last_modified: last_modified(headers),
            final_url,
        };
        // Dropping the response closes the connection without reading the body
        Ok(info)
    }

    /// Ranged GET for a worker resuming at `offset` inside `range`
    pub async fn fetch_range(&self, url: &Url, range: &WorkerRange, offset: u64) -> Result<Response> {
        let start = range.position(offset);
        let response = self
            .request(url)
            .header(RANGE, range.header_value(offset))
            .send()
            .await?;

        match response.status() {
            StatusCode::PARTIAL_CONTENT => Ok(response),
            // Whole entity is only usable when we asked from the first byte
            StatusCode::OK if start == 0 => Ok(response),
            StatusCode::OK => Err(DownloadError::RangeNotSupported { start }),
            status => Err(DownloadError::network_error(
                format!("HTTP {} for range starting at {}", status.as_u16(), start),
                status.is_server_error(),
            )),
        }
    }
}

fn content_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

/// Raw Last-Modified header, compared verbatim between probe and workers
pub fn last_modified(headers: &HeaderMap) -> Option<String> {
    headers
        .get(LAST_MODIFIED)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_string())
}

/// File name from Content-Disposition, then the URL, then a random name
pub fn resolve_file_name(headers: &HeaderMap, url: &Url) -> String {
    headers
        .get(CONTENT_DISPOSITION)
        .and_then(|v| v.to_str().ok())
        .and_then(file_name_from_disposition)
        .or_else(|| file_name_from_url(url))
        .unwrap_or_else(|| format!("{}.bin", Uuid::new_v4()))
}

pub fn file_name_from_disposition(value: &str) -> Option<String> {
    if let Some(caps) = DISPOSITION_EXTENDED.captures(value) {
        let raw = caps[1].trim();
        let decoded = urlencoding::decode(raw)
            .map(|s| s.into_owned())
            .unwrap_or_else(|_| raw.to_string());
        if let Some(name) = sanitize_file_name(&decoded) {
            return Some(name);
        }
    }
    DISPOSITION_QUOTED
        .captures(value)
        .or_else(|| DISPOSITION_BARE.captures(value))
        .and_then(|caps| sanitize_file_name(&caps[1]))
}

pub fn file_name_from_url(url: &Url) -> Option<String> {
    let segment = url.path_segments()?.filter(|s| !s.is_empty()).last()?;
    let decoded = urlencoding::decode(segment)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| segment.to_string());
    sanitize_file_name(&decoded)
}

/// Keep only the last path component of a server-provided name
pub fn sanitize_file_name(raw: &str) -> Option<String> {
    let name = raw.rsplit(&['/', '\\'][..]).next()?.trim();
    match name {
        "" | "." | ".." => None,
        _ => Some(name.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_disposition_forms() {
        assert_eq!(
            file_name_from_disposition("attachment; filename=\"report final.pdf\""),
            Some("report final.pdf".to_string())
        );
        assert_eq!(
            file_name_from_disposition("attachment; filename=data.csv; size=10"),
            Some("data.csv".to_string())
        );
        assert_eq!(
            file_name_from_disposition("attachment; filename*=UTF-8''na%C3%AFve%20file.txt"),
            Some("naïve file.txt".to_string())
        );
        assert_eq!(file_name_from_disposition("inline"), None);
    }

    #[test]
    fn test_disposition_strips_paths() {
        assert_eq!(
            file_name_from_disposition("attachment; filename=\"../../etc/passwd\""),
            Some("passwd".to_string())
        );
        assert_eq!(file_name_from_disposition("attachment; filename=\"..\""), None);
    }

    #[test]
    fn test_file_name_from_url() {
        let url = Url::parse("https://cdn.example.com/files/My%20Song.mp3?sig=abc").unwrap();
        assert_eq!(file_name_from_url(&url), Some("My Song.mp3".to_string()));

        let url = Url::parse("https://cdn.example.com/files/archive.zip/").unwrap();
        assert_eq!(file_name_from_url(&url), Some("archive.zip".to_string()));

        let url = Url::parse("https://cdn.example.com/").unwrap();
        assert_eq!(file_name_from_url(&url), None);
    }

    #[test]
    fn test_resolve_prefers_disposition_then_falls_back() {
        let url = Url::parse("https://cdn.example.com/").unwrap();
        let mut headers = HeaderMap::new();
        let generated = resolve_file_name(&headers, &url);
        assert!(generated.ends_with(".bin"));
        assert_eq!(generated.len(), 36 + 4);

        headers.insert(CONTENT_DISPOSITION, HeaderValue::from_static("attachment; filename=a.iso"));
        assert_eq!(resolve_file_name(&headers, &url), "a.iso");
    }

    #[tokio::test]
    async fn test_probe_sends_browser_headers() {
        use wiremock::matchers::{header, method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let mock_server = MockServer::start().await;
        let url = Url::parse(&format!("{}/pkg/tool.tar.gz", mock_server.uri())).unwrap();

        Mock::given(method("GET"))
            .and(path("/pkg/tool.tar.gz"))
            .and(header("Accept-Language", ACCEPT_LANGUAGE_VALUE))
            .and(header("Referer", url.as_str()))
            .and(header("Charset", "UTF-8"))
            .and(header("User-Agent", USER_AGENT))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(vec![7u8; 64])
                    .insert_header("Last-Modified", "Mon, 01 Jan 2024 00:00:00 GMT"),
            )
            .mount(&mock_server)
            .await;

        let client = TransferClient::new(&EngineConfig::default()).unwrap();
        let info = client.probe(&url).await.unwrap();
        assert_eq!(info.content_length, Some(64));
        assert_eq!(info.file_name, "tool.tar.gz");
        assert_eq!(info.last_modified.as_deref(), Some("Mon, 01 Jan 2024 00:00:00 GMT"));
        assert_eq!(info.final_url, url);
    }

    #[tokio::test]
    async fn test_probe_rejects_non_ok() {
        use wiremock::matchers::method;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        let url = Url::parse(&format!("{}/missing", mock_server.uri())).unwrap();
        let client = TransferClient::new(&EngineConfig::default()).unwrap();
        let err = client.probe(&url).await.unwrap_err();
        assert!(matches!(err, DownloadError::ProbeFailed { status_code: 404, .. }));
    }

    #[tokio::test]
    async fn test_fetch_range_rejects_ignored_range() {
        use wiremock::matchers::method;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 100]))
            .mount(&mock_server)
            .await;

        let url = Url::parse(&format!("{}/f", mock_server.uri())).unwrap();
        let client = TransferClient::new(&EngineConfig::default()).unwrap();

        let first = WorkerRange::new(1, 50, 100);
        assert!(client.fetch_range(&url, &first, 0).await.is_ok());

        let second = WorkerRange::new(2, 50, 100);
        let err = client.fetch_range(&url, &second, 0).await.unwrap_err();
        assert!(matches!(err, DownloadError::RangeNotSupported { start: 50 }));
    }
}
