//! Blocking HTTP client for the migration ingest handshake.

use std::thread;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{CONTENT_LENGTH, ETAG};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{RemoteError, Result};

const POLL_INTERVAL: Duration = Duration::from_secs(2);
const MAX_POLLS: usize = 60;

/// Connection settings for the control-plane API.
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    /// API root, e.g. `https://api.calljmp.com/v1`.
    pub base_url: String,
    /// Bearer token for the project.
    pub token: String,
}

/// Blocking client for the remote migration endpoints.
///
/// The migration core is single-threaded and synchronous; the transport
/// follows suit, so a push is an ordinary function call from the CLI.
pub struct RemoteClient {
    client: Client,
    config: RemoteConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AnnounceRequest<'a> {
    etag: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnnounceResponse {
    #[serde(default)]
    completed: bool,
    upload_url: Option<String>,
    filename: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CommitRequest<'a> {
    etag: &'a str,
    filename: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommitResponse {
    #[serde(default)]
    completed: bool,
    bookmark: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusRequest<'a> {
    bookmark: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusResponse {
    #[serde(default)]
    completed: bool,
}

/// Computes the lowercase-hex MD5 ETag of a SQL body.
pub fn content_etag(sql: &str) -> String {
    format!("{:x}", md5::compute(sql.as_bytes()))
}

/// Strips one layer of surrounding double quotes from an ETag header.
fn unquote_etag(raw: &str) -> &str {
    raw.trim().trim_matches('"')
}

impl RemoteClient {
    /// Builds a client with a request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::Http`] if the underlying client cannot be
    /// constructed.
    pub fn new(config: RemoteConfig) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn auth(&self, req: reqwest::blocking::RequestBuilder) -> reqwest::blocking::RequestBuilder {
        req.bearer_auth(&self.config.token)
    }

    /// Pushes a schema migration to the control plane.
    ///
    /// Announces the content by ETag; when the server already holds it
    /// the push completes immediately. Otherwise the SQL body is
    /// uploaded to the returned URL, the upload's echoed ETag is
    /// verified, the migration is committed, and the ingest job is
    /// polled until it reports completion.
    ///
    /// # Errors
    ///
    /// Any non-2xx response, ETag mismatch, malformed handshake
    /// response, or polling timeout aborts the push. Local state is
    /// never touched.
    pub fn push_schema(&self, sql: &str) -> Result<()> {
        let etag = content_etag(sql);
        debug!(%etag, bytes = sql.len(), "announcing migration");

        let announce: AnnounceResponse = self.json(
            self.auth(self.client.post(self.url("/database/migrate")))
                .json(&AnnounceRequest { etag: &etag }),
        )?;

        if announce.completed {
            info!("migration content already present remotely");
            return Ok(());
        }

        let upload_url = announce
            .upload_url
            .ok_or_else(|| RemoteError::Protocol("missing uploadUrl in response".into()))?;
        let filename = announce
            .filename
            .ok_or_else(|| RemoteError::Protocol("missing filename in response".into()))?;

        debug!(%filename, "uploading migration body");
        let response = self
            .client
            .put(&upload_url)
            .header(CONTENT_LENGTH, sql.len())
            .body(sql.to_string())
            .send()?;
        if !response.status().is_success() {
            return Err(RemoteError::Api {
                status: response.status().as_u16(),
                message: response.text().unwrap_or_default(),
            });
        }
        let echoed = response
            .headers()
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .map(unquote_etag)
            .unwrap_or_default()
            .to_string();
        if echoed != etag {
            return Err(RemoteError::EtagMismatch {
                expected: etag,
                actual: echoed,
            });
        }

        let commit: CommitResponse = self.json(
            self.auth(self.client.put(self.url("/database/migrate"))).json(&CommitRequest {
                etag: &etag,
                filename: &filename,
            }),
        )?;
        if commit.completed {
            info!("migration ingested");
            return Ok(());
        }

        let bookmark = commit
            .bookmark
            .ok_or_else(|| RemoteError::Protocol("missing bookmark in response".into()))?;
        self.poll_status(&bookmark)
    }

    fn poll_status(&self, bookmark: &str) -> Result<()> {
        for attempt in 1..=MAX_POLLS {
            let status: StatusResponse = self.json(
                self.auth(self.client.post(self.url("/database/migration/status")))
                    .json(&StatusRequest { bookmark }),
            )?;
            if status.completed {
                info!(attempts = attempt, "migration ingested");
                return Ok(());
            }
            thread::sleep(POLL_INTERVAL);
        }
        Err(RemoteError::Timeout(MAX_POLLS))
    }

    fn json<T: serde::de::DeserializeOwned>(
        &self,
        req: reqwest::blocking::RequestBuilder,
    ) -> Result<T> {
        let response = req.send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(RemoteError::Api {
                status: status.as_u16(),
                message: response.text().unwrap_or_default(),
            });
        }
        Ok(response.json()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_etag_is_lowercase_md5_hex() {
        // echo -n "hello" | md5sum
        assert_eq!(content_etag("hello"), "5d41402abc4b2a76b9719d911017c592");
    }

    #[test]
    fn test_unquote_etag() {
        assert_eq!(unquote_etag("\"abc\""), "abc");
        assert_eq!(unquote_etag("abc"), "abc");
        assert_eq!(unquote_etag(" \"abc\" "), "abc");
    }

    #[test]
    fn test_announce_response_shapes() {
        let done: AnnounceResponse = serde_json::from_str(r#"{"completed": true}"#).unwrap();
        assert!(done.completed);
        assert!(done.upload_url.is_none());

        let pending: AnnounceResponse = serde_json::from_str(
            r#"{"uploadUrl": "https://bucket/put", "filename": "m-1.sql"}"#,
        )
        .unwrap();
        assert!(!pending.completed);
        assert_eq!(pending.upload_url.as_deref(), Some("https://bucket/put"));
        assert_eq!(pending.filename.as_deref(), Some("m-1.sql"));
    }

    #[test]
    fn test_commit_response_shapes() {
        let async_ingest: CommitResponse =
            serde_json::from_str(r#"{"completed": false, "bookmark": "bk-77"}"#).unwrap();
        assert!(!async_ingest.completed);
        assert_eq!(async_ingest.bookmark.as_deref(), Some("bk-77"));
    }
}
