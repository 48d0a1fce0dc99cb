//! Remote search client for the Splunk job API
//!
//! This module provides the four remote operations the export pipeline needs:
//! - Submitting a search job
//! - Polling job status
//! - Fetching one page of results
//! - Deleting the job (best effort)
//!
//! HTTP failures are translated into typed [`ExportError`] variants. The
//! pipeline talks to the service through the [`SearchApi`] trait so it can be
//! driven by an in-memory implementation in tests.

pub mod models;

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use url::Url;

use crate::error::{ExportError, Result};
use crate::record::EventRecord;

pub use models::{DispatchState, SearchJob};
use models::{JobStatusResponse, MessagesResponse, ResultsResponse, SubmitResponse};

/// Authorization scheme required by the search API.
///
/// The service rejects `Bearer`; this literal is part of the wire contract.
pub const AUTH_SCHEME: &str = "Splunk";

/// Path segments of the search jobs collection.
const JOBS_PATH: [&str; 3] = ["services", "search", "jobs"];

/// Default request timeout for a single API call.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Validated connection parameters supplied by the CLI/config layer.
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    /// Management endpoint, e.g. `https://splunk.example.com:8089`
    pub base_url: String,
    /// Authentication token
    pub token: String,
    /// Accept invalid TLS certificates
    pub insecure: bool,
    /// Per-request timeout
    pub timeout: Duration,
}

impl ConnectionSettings {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: token.into(),
            insecure: false,
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

/// Remote operations consumed by the export pipeline.
#[async_trait]
pub trait SearchApi: Send + Sync {
    /// Submit a search and return its sid.
    async fn submit(&self, query: &str, earliest: &str, latest: &str) -> Result<String>;

    /// Fetch the current status of a job.
    async fn status(&self, sid: &str) -> Result<SearchJob>;

    /// Fetch `count` results starting at `offset`.
    ///
    /// Returns an empty vec once `offset` reaches the end of the result set.
    async fn fetch_page(
        &self,
        sid: &str,
        offset: u64,
        count: u64,
        fields: Option<&[String]>,
    ) -> Result<Vec<EventRecord>>;

    /// Delete a job. Failures are logged, never returned.
    async fn delete_job(&self, sid: &str);
}

/// Build the `Authorization` header value for a token.
pub fn authorization_value(token: &str) -> String {
    format!("{AUTH_SCHEME} {token}")
}

/// Normalize query text for submission.
///
/// Prefixes `search ` unless the query already starts with `search ` or is a
/// `|` pipe-continuation, which the service accepts verbatim.
pub fn normalize_query(query: &str) -> String {
    let trimmed = query.trim_start();
    let has_search_prefix = trimmed
        .get(..7)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("search "));

    if has_search_prefix || trimmed.starts_with('|') {
        trimmed.to_string()
    } else {
        format!("search {trimmed}")
    }
}

/// HTTP implementation of [`SearchApi`].
#[derive(Debug, Clone)]
pub struct SearchClient {
    http: Client,
    base_url: Url,
}

impl SearchClient {
    /// Create a new search client
    ///
    /// # Arguments
    /// * `settings` - Connection parameters
    ///
    /// # Returns
    /// * `Result<Self>` - Client, or `Configuration` for a malformed URL or token
    pub fn new(settings: &ConnectionSettings) -> Result<Self> {
        let base_url = parse_base_url(&settings.base_url)?;

        let mut auth = HeaderValue::from_str(&authorization_value(&settings.token)).map_err(|_| {
            ExportError::Configuration("token contains characters not allowed in a header".into())
        })?;
        auth.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);

        let http = Client::builder()
            .default_headers(headers)
            .timeout(settings.timeout)
            .danger_accept_invalid_certs(settings.insecure)
            .user_agent(concat!("splunk-export/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ExportError::Configuration(format!("failed to build HTTP client: {e}")))?;

        if settings.insecure {
            warn!("TLS certificate verification is disabled");
        }

        Ok(Self { http, base_url })
    }

    /// Build `services/search/jobs[/extra...]` under the base URL.
    fn jobs_url(&self, extra: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                ExportError::Configuration(format!("URL cannot be a base: {}", self.base_url))
            })?
            .pop_if_empty()
            .extend(JOBS_PATH)
            .extend(extra);
        Ok(url)
    }

    async fn try_delete(&self, sid: &str) -> Result<()> {
        let url = self.jobs_url(&[sid])?;
        let response = self
            .http
            .delete(url)
            .send()
            .await
            .map_err(|e| ExportError::transport("delete", e))?;
        check_status(response, "delete").await?;
        Ok(())
    }
}

#[async_trait]
impl SearchApi for SearchClient {
    async fn submit(&self, query: &str, earliest: &str, latest: &str) -> Result<String> {
        let search = normalize_query(query);
        debug!(search = %search, earliest, latest, "Submitting search job");

        let url = self.jobs_url(&[])?;
        let response = self
            .http
            .post(url)
            .form(&[
                ("search", search.as_str()),
                ("earliest_time", earliest),
                ("latest_time", latest),
                ("output_mode", "json"),
            ])
            .send()
            .await
            .map_err(|e| ExportError::transport("submit", e))?;

        let body: SubmitResponse = decode(response, "submit").await?;
        body.sid
            .filter(|sid| !sid.is_empty())
            .ok_or_else(|| ExportError::Protocol("submit response did not contain a sid".into()))
    }

    async fn status(&self, sid: &str) -> Result<SearchJob> {
        let url = self.jobs_url(&[sid])?;
        let response = self
            .http
            .get(url)
            .query(&[("output_mode", "json")])
            .send()
            .await
            .map_err(|e| ExportError::transport("status", e))?;

        let body: JobStatusResponse = decode(response, "status").await?;
        let entry = body
            .entry
            .into_iter()
            .next()
            .ok_or_else(|| ExportError::NotFound(format!("job {sid} missing from status response")))?;

        entry.content.into_job(sid)
    }

    async fn fetch_page(
        &self,
        sid: &str,
        offset: u64,
        count: u64,
        fields: Option<&[String]>,
    ) -> Result<Vec<EventRecord>> {
        let url = self.jobs_url(&[sid, "results"])?;

        let mut params: Vec<(&str, String)> = vec![
            ("output_mode", "json".to_string()),
            ("offset", offset.to_string()),
            ("count", count.to_string()),
        ];
        if let Some(fields) = fields {
            params.extend(fields.iter().map(|f| ("f", f.clone())));
        }

        let response = self
            .http
            .get(url)
            .query(&params)
            .send()
            .await
            .map_err(|e| ExportError::transport("fetch results", e))?;

        let body: ResultsResponse = decode(response, "fetch results").await?;
        debug!(sid, offset, count, returned = body.results.len(), "Fetched results page");

        Ok(body.results.iter().map(EventRecord::from_json).collect())
    }

    async fn delete_job(&self, sid: &str) {
        match self.try_delete(sid).await {
            Ok(()) => debug!(sid, "Deleted search job"),
            Err(e) => warn!(sid, error = %e, "Failed to delete search job"),
        }
    }
}

/// Parse and sanity-check the management URL.
fn parse_base_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw.trim())
        .map_err(|e| ExportError::Configuration(format!("invalid server URL '{raw}': {e}")))?;

    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(ExportError::Configuration(format!(
                "unsupported URL scheme '{other}' in '{raw}'"
            )));
        }
    }
    if url.cannot_be_a_base() || url.host_str().is_none() {
        return Err(ExportError::Configuration(format!(
            "server URL '{raw}' has no host"
        )));
    }

    Ok(url)
}

/// Pass successful responses through; map failures onto the error taxonomy.
async fn check_status(response: Response, operation: &'static str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(map_status_error(status.as_u16(), &body, operation))
}

/// Map a non-success status code and body to an [`ExportError`].
pub(crate) fn map_status_error(status: u16, body: &str, operation: &str) -> ExportError {
    let service_text = MessagesResponse::error_text(body);
    match status {
        401 => ExportError::Authentication(service_text.unwrap_or_else(|| {
            format!("the service rejected the token during {operation}")
        })),
        403 => ExportError::Authorization(
            service_text.unwrap_or_else(|| format!("permission denied during {operation}")),
        ),
        404 => ExportError::NotFound(format!("resource not found during {operation}")),
        400 => ExportError::Protocol(service_text.unwrap_or_else(|| body.to_string())),
        other => ExportError::Protocol(format!(
            "unexpected HTTP status {other} during {operation}: {body}"
        )),
    }
}

/// Check the status, then decode a JSON body.
async fn decode<T: DeserializeOwned>(response: Response, operation: &'static str) -> Result<T> {
    let response = check_status(response, operation).await?;
    let text = response
        .text()
        .await
        .map_err(|e| ExportError::transport(operation, e))?;
    serde_json::from_str(&text)
        .map_err(|e| ExportError::Protocol(format!("invalid {operation} response: {e}")))
}
