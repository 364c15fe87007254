//! Storage-change event gate.
//!
//! One transition per invocation, no persisted state: decode the
//! base64-encoded JSON event, read the affected bucket's labels through an
//! injected [`BucketStore`], and either skip (bucket carries the exception
//! label) or submit the fixed scan-trigger configuration through an
//! injected [`TriggerService`].
//!
//! [`decode_event`] and [`evaluate_labels`] are pure so the whole gate is
//! unit-testable without a cloud connection. Decode and parse failures are
//! plain errors for the caller to log; they must never take the hosting
//! runtime down.

use std::collections::HashMap;
use std::fmt;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::Deserialize;
use tracing::info;

use crate::contract::{BucketStore, ClientError, TriggerService};
use crate::dlp;

/// Label key whose value exempts a bucket from automatic trigger creation.
pub const EXCEPTION_LABEL: &str = "exception";
pub const EXEMPT_VALUE: &str = "dlp";

/// Decoded storage-change notification.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageEvent {
    pub resource: EventResource,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventResource {
    pub labels: ResourceLabels,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResourceLabels {
    pub bucket_name: String,
    pub project_id: String,
}

#[derive(Debug)]
pub enum EventError {
    Decode(base64::DecodeError),
    Utf8(std::string::FromUtf8Error),
    Json(serde_json::Error),
    Store(ClientError),
    Trigger(ClientError),
}

impl fmt::Display for EventError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventError::Decode(e) => write!(f, "invalid base64 payload: {e}"),
            EventError::Utf8(e) => write!(f, "payload is not UTF-8: {e}"),
            EventError::Json(e) => write!(f, "invalid event JSON: {e}"),
            EventError::Store(e) => write!(f, "bucket label fetch failed: {e}"),
            EventError::Trigger(e) => write!(f, "trigger submission failed: {e}"),
        }
    }
}

impl std::error::Error for EventError {}

impl From<base64::DecodeError> for EventError {
    fn from(e: base64::DecodeError) -> Self {
        EventError::Decode(e)
    }
}

impl From<std::string::FromUtf8Error> for EventError {
    fn from(e: std::string::FromUtf8Error) -> Self {
        EventError::Utf8(e)
    }
}

impl From<serde_json::Error> for EventError {
    fn from(e: serde_json::Error) -> Self {
        EventError::Json(e)
    }
}

/// Decode a base64-encoded, JSON-encoded storage-change event. Pure.
pub fn decode_event(raw: &[u8]) -> Result<StorageEvent, EventError> {
    let bytes = BASE64.decode(raw)?;
    let text = String::from_utf8(bytes)?;
    let event: StorageEvent = serde_json::from_str(&text)?;
    Ok(event)
}

/// Outcome of inspecting a bucket's labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// The bucket carries `exception=dlp`; take no action.
    Exempt,
    /// Submit a scan trigger.
    Scan,
}

/// Decide from a label snapshot whether the bucket is exempt. Pure.
pub fn evaluate_labels(labels: &HashMap<String, String>) -> GateDecision {
    match labels.get(EXCEPTION_LABEL) {
        Some(value) if value == EXEMPT_VALUE => GateDecision::Exempt,
        _ => GateDecision::Scan,
    }
}

/// What one invocation did.
#[derive(Debug)]
pub struct GateReport {
    pub bucket_name: String,
    pub project_id: String,
    pub decision: GateDecision,
    /// Name of the created trigger; `None` when the bucket was exempt.
    pub trigger_name: Option<String>,
}

/// Handle one encoded storage-change event end to end.
pub async fn handle_event<S, T>(
    raw: &[u8],
    store: &S,
    triggers: &T,
) -> Result<GateReport, EventError>
where
    S: BucketStore + ?Sized,
    T: TriggerService + ?Sized,
{
    let event = decode_event(raw)?;
    process_event(event, store, triggers).await
}

/// Run the gate for an already-decoded event.
pub async fn process_event<S, T>(
    event: StorageEvent,
    store: &S,
    triggers: &T,
) -> Result<GateReport, EventError>
where
    S: BucketStore + ?Sized,
    T: TriggerService + ?Sized,
{
    let bucket_name = event.resource.labels.bucket_name;
    let project_id = event.resource.labels.project_id;

    let labels = store
        .bucket_labels(&bucket_name)
        .await
        .map_err(EventError::Store)?;
    info!(bucket = %bucket_name, labels = ?labels, "Fetched bucket labels");

    match evaluate_labels(&labels) {
        GateDecision::Exempt => {
            info!(bucket = %bucket_name, "Bucket exception label found, skipping trigger creation");
            Ok(GateReport {
                bucket_name,
                project_id,
                decision: GateDecision::Exempt,
                trigger_name: None,
            })
        }
        GateDecision::Scan => {
            info!(bucket = %bucket_name, "No exception label, creating DLP job trigger");
            let trigger = dlp::build_job_trigger(&bucket_name);
            let created = triggers
                .create_job_trigger(&project_id, &trigger)
                .await
                .map_err(EventError::Trigger)?;
            Ok(GateReport {
                bucket_name,
                project_id,
                decision: GateDecision::Scan,
                trigger_name: Some(created.name),
            })
        }
    }
}
