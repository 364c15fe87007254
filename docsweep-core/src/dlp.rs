//! DLP job-trigger configuration and submission.
//!
//! [`build_job_trigger`] is pure configuration assembly: the schedule,
//! action, sampling and file-type constants are fixed, and only the bucket
//! name varies between invocations. The resulting [`JobTrigger`] serializes
//! to the DLP REST API's camelCase wire format and is submitted through the
//! [`TriggerService`] contract; ownership of the created trigger passes to
//! the DLP service.

use std::env;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::contract::{ClientError, TriggerService, ACCESS_TOKEN_ENV};

pub const DLP_API_BASE: &str = "https://dlp.googleapis.com/v2";

/// Monthly recurrence, expressed in seconds.
pub const RECURRENCE_PERIOD: &str = "2592000s";
pub const MIN_LIKELIHOOD: &str = "POSSIBLE";
pub const INSPECT_TEMPLATE_NAME: &str =
    "projects/cloudsec-1/locations/global/inspectTemplates/zee-dlp";
pub const FILES_LIMIT_PERCENT: i32 = 70;
pub const SAMPLE_METHOD: &str = "RANDOM_START";
/// Per-file scan cap (25 GiB), an int64 carried as a string on the wire.
pub const BYTES_LIMIT_PER_FILE: &str = "26843545600";
pub const FILE_TYPES: [&str; 10] = [
    "BINARY_FILE",
    "TEXT_FILE",
    "IMAGE",
    "WORD",
    "PDF",
    "AVRO",
    "CSV",
    "TSV",
    "EXCEL",
    "POWERPOINT",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobTrigger {
    pub triggers: Vec<Trigger>,
    pub inspect_job: InspectJob,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trigger {
    pub schedule: Schedule,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schedule {
    pub recurrence_period_duration: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InspectJob {
    pub actions: Vec<Action>,
    pub inspect_config: InspectConfig,
    pub inspect_template_name: String,
    pub storage_config: StorageConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    pub publish_summary_to_cscc: PublishSummaryToCscc,
}

/// Empty message; presence alone selects the action.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PublishSummaryToCscc {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InspectConfig {
    /// Empty means the service's default detectors.
    pub info_types: Vec<InfoType>,
    pub min_likelihood: String,
    pub custom_info_types: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InfoType {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageConfig {
    pub cloud_storage_options: CloudStorageOptions,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudStorageOptions {
    pub files_limit_percent: i32,
    pub sample_method: String,
    pub bytes_limit_per_file: String,
    pub file_types: Vec<String>,
    pub file_set: FileSet,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileSet {
    pub regex_file_set: RegexFileSet,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegexFileSet {
    pub bucket_name: String,
    pub include_regex: Vec<String>,
    pub exclude_regex: Vec<String>,
}

/// The created trigger, as returned by the service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatedTrigger {
    pub name: String,
}

/// Build the fixed scan-trigger configuration for a bucket. Pure: the same
/// bucket name always yields the same value.
pub fn build_job_trigger(bucket_name: &str) -> JobTrigger {
    JobTrigger {
        triggers: vec![Trigger {
            schedule: Schedule {
                recurrence_period_duration: RECURRENCE_PERIOD.to_string(),
            },
        }],
        inspect_job: InspectJob {
            actions: vec![Action {
                publish_summary_to_cscc: PublishSummaryToCscc {},
            }],
            inspect_config: InspectConfig {
                info_types: Vec::new(),
                min_likelihood: MIN_LIKELIHOOD.to_string(),
                custom_info_types: Vec::new(),
            },
            inspect_template_name: INSPECT_TEMPLATE_NAME.to_string(),
            storage_config: StorageConfig {
                cloud_storage_options: CloudStorageOptions {
                    files_limit_percent: FILES_LIMIT_PERCENT,
                    sample_method: SAMPLE_METHOD.to_string(),
                    bytes_limit_per_file: BYTES_LIMIT_PER_FILE.to_string(),
                    file_types: FILE_TYPES.iter().map(|t| t.to_string()).collect(),
                    file_set: FileSet {
                        regex_file_set: RegexFileSet {
                            bucket_name: bucket_name.to_string(),
                            include_regex: Vec::new(),
                            exclude_regex: Vec::new(),
                        },
                    },
                },
            },
        },
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateJobTriggerRequest<'a> {
    job_trigger: &'a JobTrigger,
}

/// Real [`TriggerService`] over the DLP REST API.
pub struct HttpDlpClient {
    http: reqwest::Client,
    token: String,
    base_url: String,
}

impl HttpDlpClient {
    /// Construct from the environment (bearer token).
    pub fn new_from_env() -> Result<Self, ClientError> {
        match env::var(ACCESS_TOKEN_ENV) {
            Ok(token) => Ok(Self::new(token, DLP_API_BASE.to_string())),
            Err(e) => {
                error!(error = ?e, var = ACCESS_TOKEN_ENV, "Access token missing in environment");
                Err(Box::new(e))
            }
        }
    }

    pub fn new(token: String, base_url: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            token,
            base_url,
        }
    }
}

#[async_trait]
impl TriggerService for HttpDlpClient {
    async fn create_job_trigger(
        &self,
        project_id: &str,
        trigger: &JobTrigger,
    ) -> Result<CreatedTrigger, ClientError> {
        let parent = format!("projects/{project_id}");
        let url = format!("{}/{}/jobTriggers", self.base_url, parent);
        let bucket = &trigger
            .inspect_job
            .storage_config
            .cloud_storage_options
            .file_set
            .regex_file_set
            .bucket_name;
        info!(parent = %parent, bucket = %bucket, "Submitting DLP job trigger");

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .json(&CreateJobTriggerRequest { job_trigger: trigger })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(status = %status, body = %body, "DLP API rejected job trigger");
            return Err(format!("DLP API error: {status}: {body}").into());
        }

        let created = response.json::<CreatedTrigger>().await?;
        info!(trigger = %created.name, "DLP job trigger created");
        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trigger_matches_fixed_template() {
        let value = serde_json::to_value(build_job_trigger("test-bucket")).unwrap();
        assert_eq!(
            value["triggers"][0]["schedule"]["recurrencePeriodDuration"],
            "2592000s"
        );
        assert_eq!(value["inspectJob"]["inspectConfig"]["minLikelihood"], "POSSIBLE");
        assert_eq!(
            value["inspectJob"]["inspectConfig"]["infoTypes"]
                .as_array()
                .unwrap()
                .len(),
            0
        );
        assert_eq!(
            value["inspectJob"]["inspectTemplateName"],
            INSPECT_TEMPLATE_NAME
        );
        let options = &value["inspectJob"]["storageConfig"]["cloudStorageOptions"];
        assert_eq!(options["filesLimitPercent"], 70);
        assert_eq!(options["sampleMethod"], "RANDOM_START");
        assert_eq!(options["bytesLimitPerFile"], "26843545600");
        assert_eq!(options["fileTypes"].as_array().unwrap().len(), 10);
        assert_eq!(options["fileSet"]["regexFileSet"]["bucketName"], "test-bucket");
        assert_eq!(
            options["fileSet"]["regexFileSet"]["includeRegex"]
                .as_array()
                .unwrap()
                .len(),
            0
        );
    }

    #[test]
    fn construction_is_pure() {
        let a = serde_json::to_string(&build_job_trigger("bucket-a")).unwrap();
        let b = serde_json::to_string(&build_job_trigger("bucket-a")).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn only_bucket_name_differs_between_inputs() {
        let mut a = serde_json::to_value(build_job_trigger("bucket-a")).unwrap();
        let b = serde_json::to_value(build_job_trigger("bucket-b")).unwrap();
        a["inspectJob"]["storageConfig"]["cloudStorageOptions"]["fileSet"]["regexFileSet"]
            ["bucketName"] = serde_json::json!("bucket-b");
        assert_eq!(a, b);
    }

    #[test]
    fn action_serializes_to_empty_message() {
        let value = serde_json::to_value(build_job_trigger("b")).unwrap();
        assert_eq!(
            value["inspectJob"]["actions"][0]["publishSummaryToCscc"],
            serde_json::json!({})
        );
    }
}
