//! Document AI REST client.
//!
//! Wraps the three calls the service needs: synchronous `process`,
//! `batchProcess`, and polling the long-running operation it returns.

pub mod document;
pub mod operation;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::auth::TokenProvider;
use document::Document;
use operation::{BatchError, BatchRequest, Operation};

/// Client bound to one project and location.
#[derive(Clone)]
pub struct DocumentAiClient {
    http: reqwest::Client,
    tokens: Arc<dyn TokenProvider>,
    project_id: String,
    location: String,
    endpoint: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ProcessRequest<'a> {
    raw_document: RawDocument<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RawDocument<'a> {
    content: String,
    mime_type: &'a str,
}

#[derive(Deserialize)]
struct ProcessResponse {
    document: serde_json::Value,
}

/// Result of online processing: the typed model plus the response's
/// `document` object exactly as the service returned it.
#[derive(Debug, Clone)]
pub struct ProcessedDocument {
    pub document: Document,
    pub raw: serde_json::Value,
}

impl DocumentAiClient {
    /// Locations other than `us` need their regional endpoint, which this
    /// derives from `location`.
    pub fn new(
        http: reqwest::Client,
        tokens: Arc<dyn TokenProvider>,
        project_id: impl Into<String>,
        location: impl Into<String>,
    ) -> Self {
        let location = location.into();
        let endpoint = format!("https://{}-documentai.googleapis.com", location);
        Self {
            http,
            tokens,
            project_id: project_id.into(),
            location,
            endpoint,
        }
    }

    /// Point the client at a different endpoint (private endpoints, mock servers).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into().trim_end_matches('/').to_string();
        self
    }

    /// Full resource name: `projects/{project}/locations/{location}/processors/{id}`.
    pub fn processor_path(&self, processor_id: &str) -> String {
        format!(
            "projects/{}/locations/{}/processors/{}",
            self.project_id, self.location, processor_id
        )
    }

    /// Online processing of an in-memory document.
    pub async fn process_document(
        &self,
        processor_id: &str,
        content: &[u8],
        mime_type: &str,
    ) -> Result<ProcessedDocument> {
        let name = self.processor_path(processor_id);
        let url = format!("{}/v1/{}:process", self.endpoint, name);

        info!(
            "Processing {} bytes ({}) with {}",
            content.len(),
            mime_type,
            name
        );

        let body = ProcessRequest {
            raw_document: RawDocument {
                content: BASE64.encode(content),
                mime_type,
            },
        };

        let resp: ProcessResponse = self
            .send_json(self.http.post(&url).json(&body), "process")
            .await?;

        let document: Document = serde_json::from_value(resp.document.clone())
            .context("Failed to parse Document AI process response")?;

        info!(
            "Document AI returned {} page(s), {} entities, {} chars",
            document.pages.len(),
            document.entities.len(),
            document.text.len()
        );
        Ok(ProcessedDocument {
            document,
            raw: resp.document,
        })
    }

    /// Start asynchronous processing of Cloud Storage inputs.
    pub async fn batch_process_documents(
        &self,
        processor_id: &str,
        request: &BatchRequest,
    ) -> Result<Operation> {
        let name = self.processor_path(processor_id);
        let url = format!("{}/v1/{}:batchProcess", self.endpoint, name);

        info!(
            "Submitting batch of {} document(s) to {} (output: {})",
            request.documents.len(),
            name,
            request.output_uri
        );

        self.send_json(self.http.post(&url).json(&request.to_body()), "batchProcess")
            .await
    }

    /// Fetch the current state of a long-running operation.
    pub async fn get_operation(&self, name: &str) -> Result<Operation> {
        let url = format!("{}/v1/{}", self.endpoint, name);
        self.send_json(self.http.get(&url), "operations.get").await
    }

    /// Poll an operation until it completes or `timeout` elapses.
    pub async fn wait_for_operation(
        &self,
        name: &str,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Result<Operation> {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            let op = self.get_operation(name).await?;
            if op.done {
                if let Some(err) = &op.error {
                    return Err(BatchError::Failed(format!("{} (code {})", err.message, err.code)).into());
                }
                info!("Operation {} is done ({:?})", name, op.state());
                return Ok(op);
            }

            debug!("Operation {} is {:?}... waiting", name, op.state());

            if tokio::time::Instant::now() >= deadline {
                return Err(BatchError::TimedOut {
                    name: name.to_string(),
                    waited_secs: timeout.as_secs(),
                }
                .into());
            }

            tokio::time::sleep(poll_interval).await;
        }
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        call: &str,
    ) -> Result<T> {
        let token = self.tokens.access_token().await?;

        let resp = request
            .bearer_auth(&token)
            .send()
            .await
            .with_context(|| format!("Failed to send Document AI {} request", call))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("Document AI {} error ({}): {}", call, status, text);
        }

        resp.json()
            .await
            .with_context(|| format!("Failed to parse Document AI {} response", call))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticToken;
    use super::operation::{BatchState, GcsDocument};
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const PROCESSOR: &str = "projects/test-project/locations/us/processors/abc123";

    fn client(server: &MockServer) -> DocumentAiClient {
        DocumentAiClient::new(
            reqwest::Client::new(),
            Arc::new(StaticToken::new("test-token")),
            "test-project",
            "us",
        )
        .with_endpoint(server.uri())
    }

    #[test]
    fn test_processor_path_and_regional_endpoint() {
        let client = DocumentAiClient::new(
            reqwest::Client::new(),
            Arc::new(StaticToken::new("t")),
            "my-project",
            "eu",
        );
        assert_eq!(
            client.processor_path("p1"),
            "projects/my-project/locations/eu/processors/p1"
        );
        assert_eq!(client.endpoint, "https://eu-documentai.googleapis.com");
    }

    #[tokio::test]
    async fn test_process_document_sends_base64_content() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(format!("/v1/{}:process", PROCESSOR)))
            .and(header("authorization", "Bearer test-token"))
            .and(body_json(serde_json::json!({
                "rawDocument": {"content": "JVBERi0=", "mimeType": "application/pdf"}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "document": {
                    "text": "Hello world",
                    "pages": [{"pageNumber": 1}]
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let processed = client(&server)
            .process_document("abc123", b"%PDF-", "application/pdf")
            .await
            .unwrap();

        assert_eq!(processed.document.text, "Hello world");
        assert_eq!(processed.document.pages.len(), 1);
    }

    #[tokio::test]
    async fn test_process_document_keeps_raw_response() {
        let server = MockServer::start().await;
        let raw = serde_json::json!({
            "text": "Hi",
            "pages": [{
                "pageNumber": 1,
                "layout": {
                    "textAnchor": {"textSegments": [{"endIndex": "2"}]},
                    "boundingPoly": {"normalizedVertices": [{"x": 0.1, "y": 0.2}]},
                    "orientation": "PAGE_UP"
                }
            }],
            "entities": [{"type": "Name", "pageAnchor": {"pageRefs": [{"page": "0"}]}}]
        });

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "document": raw.clone()
            })))
            .mount(&server)
            .await;

        let processed = client(&server)
            .process_document("abc123", b"data", "application/pdf")
            .await
            .unwrap();

        assert_eq!(processed.raw, raw);
        assert_eq!(processed.document.text, "Hi");
        assert_eq!(processed.document.entities[0].entity_type, "Name");
    }

    #[tokio::test]
    async fn test_process_document_error_status() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403).set_body_string("permission denied"))
            .mount(&server)
            .await;

        let err = client(&server)
            .process_document("abc123", b"data", "application/pdf")
            .await
            .unwrap_err();

        let msg = err.to_string();
        assert!(msg.contains("403"), "{}", msg);
        assert!(msg.contains("permission denied"), "{}", msg);
    }

    #[tokio::test]
    async fn test_batch_process_returns_operation() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(format!("/v1/{}:batchProcess", PROCESSOR)))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "name": "projects/test-project/locations/us/operations/42"
            })))
            .mount(&server)
            .await;

        let request = BatchRequest::new(
            vec![GcsDocument {
                gcs_uri: "gs://in/W9.pdf".to_string(),
                mime_type: "application/pdf".to_string(),
            }],
            "gs://out",
            "results",
        );
        let op = client(&server)
            .batch_process_documents("abc123", &request)
            .await
            .unwrap();

        assert_eq!(op.name, "projects/test-project/locations/us/operations/42");
        assert!(!op.done);
    }

    #[tokio::test]
    async fn test_wait_for_operation_polls_until_done() {
        let server = MockServer::start().await;
        let op_path = "/v1/projects/test-project/locations/us/operations/42";

        Mock::given(method("GET"))
            .and(path(op_path))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "name": "projects/test-project/locations/us/operations/42",
                "metadata": {"state": "RUNNING"}
            })))
            .up_to_n_times(2)
            .with_priority(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path(op_path))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "name": "projects/test-project/locations/us/operations/42",
                "done": true,
                "metadata": {"state": "SUCCEEDED"}
            })))
            .with_priority(2)
            .mount(&server)
            .await;

        let op = client(&server)
            .wait_for_operation(
                "projects/test-project/locations/us/operations/42",
                Duration::from_secs(5),
                Duration::from_millis(10),
            )
            .await
            .unwrap();

        assert!(op.done);
        assert_eq!(op.state(), BatchState::Succeeded);
    }

    #[tokio::test]
    async fn test_wait_for_operation_times_out() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "name": "operations/7",
                "metadata": {"state": "RUNNING"}
            })))
            .mount(&server)
            .await;

        let err = client(&server)
            .wait_for_operation("operations/7", Duration::from_millis(30), Duration::from_millis(10))
            .await
            .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<BatchError>(),
            Some(BatchError::TimedOut { .. })
        ));
    }

    #[tokio::test]
    async fn test_wait_for_operation_surfaces_error_status() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "name": "operations/8",
                "done": true,
                "error": {"code": 3, "message": "Invalid input"}
            })))
            .mount(&server)
            .await;

        let err = client(&server)
            .wait_for_operation("operations/8", Duration::from_secs(1), Duration::from_millis(10))
            .await
            .unwrap_err();

        assert!(err.to_string().contains("Invalid input"));
    }
}
