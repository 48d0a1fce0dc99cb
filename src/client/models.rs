//! Search job models for the Splunk search API.
//!
//! Wire types mirror the JSON bodies returned by `services/search/jobs`;
//! [`SearchJob`] is the parsed, validated view the pipeline works with.

use std::fmt;

use serde::de::{self, Deserializer};
use serde::Deserialize;
use serde_json::Value as JsonValue;

use crate::error::{ExportError, Result};

/// Job lifecycle state as reported by `dispatchState`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    Queued,
    Parsing,
    Running,
    Finalizing,
    Done,
    Failed,
    Paused,
}

impl DispatchState {
    /// Parse a wire `dispatchState` value.
    ///
    /// Server-side cancellation states are folded into `Failed` since the job
    /// will never produce results.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "QUEUED" => Some(Self::Queued),
            "PARSING" => Some(Self::Parsing),
            "RUNNING" => Some(Self::Running),
            "FINALIZING" => Some(Self::Finalizing),
            "DONE" => Some(Self::Done),
            "FAILED" | "USER_CANCEL" | "INTERNAL_CANCEL" | "BAD_INPUT_CANCEL" | "QUIT" => {
                Some(Self::Failed)
            }
            "PAUSED" => Some(Self::Paused),
            _ => None,
        }
    }

    /// Done and Failed are terminal; everything else keeps polling.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

impl fmt::Display for DispatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Queued => "QUEUED",
            Self::Parsing => "PARSING",
            Self::Running => "RUNNING",
            Self::Finalizing => "FINALIZING",
            Self::Done => "DONE",
            Self::Failed => "FAILED",
            Self::Paused => "PAUSED",
        };
        f.write_str(name)
    }
}

/// Snapshot of a search job's status.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchJob {
    /// Search identifier issued on submission
    pub sid: String,
    /// Lifecycle state
    pub state: DispatchState,
    /// Number of events scanned
    pub event_count: u64,
    /// Number of result rows available
    pub result_count: u64,
    /// Fractional completion, clamped to 0.0..=1.0
    pub done_progress: f64,
    /// First ERROR message reported by the service, if any
    pub failure_reason: Option<String>,
}

impl SearchJob {
    pub fn is_done(&self) -> bool {
        self.state == DispatchState::Done
    }

    pub fn is_failed(&self) -> bool {
        self.state == DispatchState::Failed
    }
}

/// Response body of `POST services/search/jobs`.
#[derive(Debug, Deserialize)]
pub(crate) struct SubmitResponse {
    #[serde(default)]
    pub sid: Option<String>,
}

/// Response body of `GET services/search/jobs/{sid}`.
#[derive(Debug, Deserialize)]
pub(crate) struct JobStatusResponse {
    #[serde(default)]
    pub entry: Vec<JobEntry>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct JobEntry {
    pub content: JobContent,
}

#[derive(Debug, Deserialize)]
pub(crate) struct JobContent {
    #[serde(rename = "dispatchState", default)]
    pub dispatch_state: Option<String>,
    #[serde(
        rename = "eventCount",
        default,
        deserialize_with = "u64_from_string_or_number"
    )]
    pub event_count: u64,
    #[serde(
        rename = "resultCount",
        default,
        deserialize_with = "u64_from_string_or_number"
    )]
    pub result_count: u64,
    #[serde(
        rename = "doneProgress",
        default,
        deserialize_with = "f64_from_string_or_number"
    )]
    pub done_progress: f64,
    #[serde(default)]
    pub messages: Vec<ServiceMessage>,
}

impl JobContent {
    /// Validate the raw content into a [`SearchJob`].
    pub fn into_job(self, sid: &str) -> Result<SearchJob> {
        let raw_state = self.dispatch_state.unwrap_or_default();
        let state = DispatchState::parse(&raw_state).ok_or_else(|| {
            ExportError::Protocol(format!(
                "unrecognized dispatch state '{raw_state}' for job {sid}"
            ))
        })?;

        let failure_reason = self
            .messages
            .into_iter()
            .find(|m| m.is_error())
            .map(|m| m.text);

        Ok(SearchJob {
            sid: sid.to_string(),
            state,
            event_count: self.event_count,
            result_count: self.result_count,
            done_progress: self.done_progress.clamp(0.0, 1.0),
            failure_reason,
        })
    }
}

/// A `{ "type", "text" }` message as used in job status and error bodies.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ServiceMessage {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub text: String,
}

impl ServiceMessage {
    pub fn is_error(&self) -> bool {
        self.kind.eq_ignore_ascii_case("ERROR")
    }
}

/// Error body returned with 4xx responses.
#[derive(Debug, Deserialize)]
pub(crate) struct MessagesResponse {
    #[serde(default)]
    pub messages: Vec<ServiceMessage>,
}

impl MessagesResponse {
    /// Extract the service's own error text from a response body.
    ///
    /// Prefers the first ERROR message, then the first message of any type.
    pub fn error_text(body: &str) -> Option<String> {
        let parsed: MessagesResponse = serde_json::from_str(body).ok()?;
        let message = parsed
            .messages
            .iter()
            .find(|m| m.is_error())
            .or_else(|| parsed.messages.first())?;
        (!message.text.is_empty()).then(|| message.text.clone())
    }
}

/// Response body of `GET services/search/jobs/{sid}/results`.
#[derive(Debug, Deserialize)]
pub(crate) struct ResultsResponse {
    #[serde(default)]
    pub results: Vec<JsonValue>,
}

fn u64_from_string_or_number<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    match JsonValue::deserialize(deserializer)? {
        JsonValue::Null => Ok(0),
        JsonValue::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
            .ok_or_else(|| de::Error::custom(format!("invalid count: {n}"))),
        JsonValue::String(s) => s.trim().parse().map_err(de::Error::custom),
        other => Err(de::Error::custom(format!("expected a count, got {other}"))),
    }
}

fn f64_from_string_or_number<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    match JsonValue::deserialize(deserializer)? {
        JsonValue::Null => Ok(0.0),
        JsonValue::Number(n) => n
            .as_f64()
            .ok_or_else(|| de::Error::custom(format!("invalid number: {n}"))),
        JsonValue::String(s) => s.trim().parse().map_err(de::Error::custom),
        other => Err(de::Error::custom(format!("expected a number, got {other}"))),
    }
}
