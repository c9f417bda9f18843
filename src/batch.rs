//! Batch processing over Cloud Storage.
//!
//! Submits a `batchProcess` request, waits for the long-running operation,
//! then collects the `Document` JSON files written for each input. Document AI
//! may split one input across several files; they are returned in listing
//! order, which carries no guarantee.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{info, warn};

use crate::documentai::document::Document;
use crate::documentai::operation::{BatchError, BatchRequest, BatchState};
use crate::documentai::DocumentAiClient;
use crate::storage::{parse_gcs_uri, ObjectStore};

/// A result file fetched from Cloud Storage.
#[derive(Debug, Clone, Serialize)]
pub struct BatchDocument {
    pub input: String,
    pub object: String,
    pub document: Document,
}

/// An output location or object that was not turned into a document.
#[derive(Debug, Clone, Serialize)]
pub struct SkippedOutput {
    pub input: String,
    pub location: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchOutcome {
    pub operation: String,
    pub state_message: String,
    pub documents: Vec<BatchDocument>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<SkippedOutput>,
}

/// Drives one batch request from submission to fetched results.
pub struct BatchProcessor {
    client: DocumentAiClient,
    store: Arc<dyn ObjectStore>,
    timeout: Duration,
    poll_interval: Duration,
}

impl BatchProcessor {
    pub fn new(client: DocumentAiClient, store: Arc<dyn ObjectStore>) -> Self {
        Self {
            client,
            store,
            timeout: Duration::from_secs(300),
            poll_interval: Duration::from_secs(5),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub async fn run(&self, processor_id: &str, request: &BatchRequest) -> Result<BatchOutcome> {
        let operation = self
            .client
            .batch_process_documents(processor_id, request)
            .await?;

        // Format: projects/PROJECT_NUMBER/locations/LOCATION/operations/OPERATION_ID
        info!("Waiting for operation {} to complete...", operation.name);
        let operation = self
            .client
            .wait_for_operation(&operation.name, self.timeout, self.poll_interval)
            .await?;

        let metadata = operation.metadata.clone().unwrap_or_default();
        if metadata.state != BatchState::Succeeded {
            return Err(BatchError::Failed(metadata.state_message).into());
        }

        let mut outcome = BatchOutcome {
            operation: operation.name.clone(),
            state_message: metadata.state_message.clone(),
            documents: Vec::new(),
            skipped: Vec::new(),
        };

        for process in &metadata.individual_process_statuses {
            let destination = &process.output_gcs_destination;
            let Some((bucket, prefix)) = parse_gcs_uri(destination) else {
                warn!("Could not parse output GCS destination: {}", destination);
                outcome.skipped.push(SkippedOutput {
                    input: process.input_gcs_source.clone(),
                    location: destination.clone(),
                    reason: "unparsable output destination".to_string(),
                });
                continue;
            };

            let objects = self.store.list_objects(&bucket, &prefix).await?;
            for object in objects {
                if !object.is_json() {
                    let content_type = object.content_type.as_deref().unwrap_or("unknown");
                    warn!(
                        "Skipping non-supported file: {} - Mimetype: {}",
                        object.name, content_type
                    );
                    outcome.skipped.push(SkippedOutput {
                        input: process.input_gcs_source.clone(),
                        location: format!("gs://{}/{}", bucket, object.name),
                        reason: format!("non-JSON output ({})", content_type),
                    });
                    continue;
                }

                info!("Fetching {}", object.name);
                let bytes = self.store.download(&bucket, &object.name).await?;
                let document = Document::from_json(&bytes)
                    .with_context(|| format!("Failed to parse Document from gs://{}/{}", bucket, object.name))?;

                outcome.documents.push(BatchDocument {
                    input: process.input_gcs_source.clone(),
                    object: format!("gs://{}/{}", bucket, object.name),
                    document,
                });
            }
        }

        info!(
            "Batch {} produced {} document file(s), skipped {}",
            outcome.operation,
            outcome.documents.len(),
            outcome.skipped.len()
        );
        Ok(outcome)
    }
}
