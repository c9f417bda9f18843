//! Batch request and long-running operation types.

use serde::{Deserialize, Serialize};

/// One Cloud Storage input for a batch request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GcsDocument {
    pub gcs_uri: String,
    pub mime_type: String,
}

/// Inputs plus the Cloud Storage directory results are written under.
#[derive(Debug, Clone)]
pub struct BatchRequest {
    pub documents: Vec<GcsDocument>,
    pub output_uri: String,
}

impl BatchRequest {
    /// Results land under `{output_bucket}/{output_prefix}/`.
    pub fn new(documents: Vec<GcsDocument>, output_bucket: &str, output_prefix: &str) -> Self {
        let output_uri = format!(
            "{}/{}/",
            output_bucket.trim_end_matches('/'),
            output_prefix.trim_matches('/')
        );
        Self {
            documents,
            output_uri,
        }
    }

    pub(crate) fn to_body(&self) -> serde_json::Value {
        serde_json::json!({
            "inputDocuments": {
                "gcsDocuments": { "documents": self.documents }
            },
            "documentOutputConfig": {
                "gcsOutputConfig": { "gcsUri": self.output_uri }
            }
        })
    }
}

/// `google.longrunning.Operation` as returned by `batchProcess`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Operation {
    pub name: String,
    #[serde(default)]
    pub done: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<BatchProcessMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Status>,
}

impl Operation {
    pub fn state(&self) -> BatchState {
        self.metadata
            .as_ref()
            .map(|m| m.state)
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchProcessMetadata {
    #[serde(default)]
    pub state: BatchState,
    #[serde(default)]
    pub state_message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub individual_process_statuses: Vec<IndividualProcessStatus>,
}

/// Per-input outcome; `output_gcs_destination` has the form
/// `gs://BUCKET/PREFIX/OPERATION_NUMBER/INPUT_FILE_NUMBER/`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndividualProcessStatus {
    #[serde(default)]
    pub input_gcs_source: String,
    #[serde(default)]
    pub output_gcs_destination: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BatchState {
    #[default]
    StateUnspecified,
    Waiting,
    Running,
    Succeeded,
    Cancelling,
    Cancelled,
    Failed,
}

/// `google.rpc.Status`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Status {
    #[serde(default)]
    pub code: i32,
    #[serde(default)]
    pub message: String,
}

/// Terminal failures of a batch operation.
#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    #[error("Batch Process Failed: {0}")]
    Failed(String),
    #[error("Timed out after {waited_secs}s waiting for operation {name}")]
    TimedOut { name: String, waited_secs: u64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_uri_joins_bucket_and_prefix() {
        let req = BatchRequest::new(Vec::new(), "gs://my-bucket/", "/results/");
        assert_eq!(req.output_uri, "gs://my-bucket/results/");
    }

    #[test]
    fn test_request_body_shape() {
        let req = BatchRequest::new(
            vec![GcsDocument {
                gcs_uri: "gs://in/W9.pdf".to_string(),
                mime_type: "application/pdf".to_string(),
            }],
            "gs://out",
            "results",
        );
        let body = req.to_body();
        assert_eq!(
            body["inputDocuments"]["gcsDocuments"]["documents"][0]["gcsUri"],
            "gs://in/W9.pdf"
        );
        assert_eq!(
            body["documentOutputConfig"]["gcsOutputConfig"]["gcsUri"],
            "gs://out/results/"
        );
    }

    #[test]
    fn test_parse_operation() {
        let op: Operation = serde_json::from_str(
            r#"{
                "name": "projects/123/locations/us/operations/456",
                "done": true,
                "metadata": {
                    "@type": "type.googleapis.com/google.cloud.documentai.v1.BatchProcessMetadata",
                    "state": "SUCCEEDED",
                    "stateMessage": "Processed 1 document(s) successfully",
                    "individualProcessStatuses": [{
                        "inputGcsSource": "gs://in/W9.pdf",
                        "status": {},
                        "outputGcsDestination": "gs://out/results/456/0"
                    }]
                }
            }"#,
        )
        .unwrap();

        assert!(op.done);
        assert_eq!(op.state(), BatchState::Succeeded);
        let meta = op.metadata.unwrap();
        assert_eq!(meta.individual_process_statuses[0].output_gcs_destination, "gs://out/results/456/0");
    }

    #[test]
    fn test_pending_operation_has_unspecified_state() {
        let op: Operation = serde_json::from_str(r#"{"name": "operations/1"}"#).unwrap();
        assert!(!op.done);
        assert_eq!(op.state(), BatchState::StateUnspecified);
    }
}
