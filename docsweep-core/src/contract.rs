//! Contracts for external collaborators.
//!
//! Every networked or process-spawning dependency sits behind one of the
//! traits below: [`BucketStore`] for storage-bucket label reads,
//! [`TriggerService`] for DLP job-trigger submission, and [`PageRenderer`]
//! for headless-browser print-to-PDF. All methods are async and return a
//! boxed error type.
//!
//! The traits are annotated for `mockall`, so consumers can generate
//! deterministic mocks for unit and integration tests. Real implementations
//! live in [`crate::storage`], [`crate::dlp`] and [`crate::render`].

use std::collections::HashMap;

use async_trait::async_trait;

use mockall::{automock, predicate::*};

use crate::dlp::{CreatedTrigger, JobTrigger};
use crate::render::PrintOptions;

/// Error type shared across collaborator traits (simple boxed error).
pub type ClientError = Box<dyn std::error::Error + Send + Sync>;

/// Environment variable holding the bearer token used by the real cloud
/// clients.
pub const ACCESS_TOKEN_ENV: &str = "GCP_ACCESS_TOKEN";

/// Read access to storage-bucket metadata.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait BucketStore: Send + Sync {
    /// Fetch the current label mapping of a bucket. A bucket without labels
    /// yields an empty map.
    async fn bucket_labels(
        &self,
        bucket_name: &str,
    ) -> Result<HashMap<String, String>, ClientError>;
}

/// Submission of scheduled DLP inspection job triggers.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait TriggerService: Send + Sync {
    /// Create a job trigger under `projects/{project_id}`. Ownership of the
    /// created trigger passes to the DLP service; only its name is returned.
    async fn create_job_trigger(
        &self,
        project_id: &str,
        trigger: &JobTrigger,
    ) -> Result<CreatedTrigger, ClientError>;
}

/// Print-to-PDF rendering of a single web page.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait PageRenderer: Send + Sync {
    /// Navigate to `url` and return the rendered PDF bytes.
    async fn render_pdf(
        &self,
        url: &str,
        options: &PrintOptions,
    ) -> Result<Vec<u8>, ClientError>;
}
