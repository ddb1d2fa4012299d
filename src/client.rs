//! Completion backends and the classification client.
//!
//! [`CompletionBackend`] is the one seam between the pipeline and the network:
//! it takes a prompt and returns raw completion text. [`AzureOpenAIBackend`]
//! talks to the Azure OpenAI REST API and [`CohereBackend`] to Cohere's
//! `/v1/generate`; tests substitute their own backend.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::{ApiMode, GenerationParams, LabelSet, ResolvedCohere, ResolvedEndpoint};
use crate::error::{PipelineError, Result};

pub const AZURE_API_KEY_HEADER: &str = "api-key";

/// Sends one prompt and returns the raw generated text.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn send(&self, prompt: &str, params: &GenerationParams) -> Result<String>;
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "lowercase")]
enum MessageRole {
    User,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: MessageRole,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct CompletionRequestBody<'a> {
    prompt: &'a str,
    max_tokens: u32,
    temperature: f64,
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    stop: &'a [String],
}

#[derive(Debug, Serialize)]
struct ChatRequestBody<'a> {
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f64,
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    stop: &'a [String],
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    text: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

/// Only the text is read; the role the service reports is ignored.
#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Serialize)]
struct CohereRequestBody<'a> {
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    max_tokens: u32,
    temperature: f64,
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    stop_sequences: &'a [String],
}

#[derive(Debug, Deserialize)]
struct CohereResponse {
    generations: Vec<CohereGeneration>,
}

#[derive(Debug, Deserialize)]
struct CohereGeneration {
    text: String,
}

/// Posts `body` as JSON with the per-request timeout and returns the status
/// and the raw response text.
async fn post_json(
    request: reqwest::RequestBuilder,
    body: &Value,
    params: &GenerationParams,
) -> Result<(reqwest::StatusCode, String)> {
    let response = request
        .header("Content-Type", "application/json")
        .timeout(Duration::from_secs(params.timeout_secs))
        .json(body)
        .send()
        .await?;
    let status = response.status();
    let text = response.text().await?;
    info!(status = status.as_u16(), "completion endpoint responded");
    Ok((status, text))
}

/// Azure OpenAI deployment reached over HTTPS, in completion or chat mode.
pub struct AzureOpenAIBackend {
    client: reqwest::Client,
    endpoint: ResolvedEndpoint,
}

impl AzureOpenAIBackend {
    pub fn new(endpoint: ResolvedEndpoint) -> Result<Self> {
        let client = reqwest::Client::builder().build()?;
        Ok(AzureOpenAIBackend { client, endpoint })
    }

    pub fn endpoint(&self) -> &ResolvedEndpoint {
        &self.endpoint
    }

    fn request_body(&self, prompt: &str, params: &GenerationParams) -> Result<Value> {
        let body = match self.endpoint.mode {
            ApiMode::Completion => serde_json::to_value(CompletionRequestBody {
                prompt,
                max_tokens: params.max_tokens,
                temperature: params.temperature,
                stop: &params.stop,
            }),
            ApiMode::Chat => serde_json::to_value(ChatRequestBody {
                messages: vec![ChatMessage {
                    role: MessageRole::User,
                    content: prompt,
                }],
                max_tokens: params.max_tokens,
                temperature: params.temperature,
                stop: &params.stop,
            }),
        };
        body.map_err(|e| PipelineError::service(format!("could not encode request body: {e}")))
    }

    fn extract_text(&self, body: &str) -> Result<String> {
        let value: Value = serde_json::from_str(body)
            .map_err(|e| PipelineError::service(format!("malformed response body: {e}")))?;
        if let Some(error) = value.get("error") {
            return Err(PipelineError::service(format!(
                "API call failed: {}",
                describe_api_error(error)
            )));
        }
        let text = match self.endpoint.mode {
            ApiMode::Completion => {
                let response: CompletionResponse = serde_json::from_value(value).map_err(|e| {
                    PipelineError::service(format!("malformed response body: {e}"))
                })?;
                response.choices.into_iter().next().map(|choice| choice.text)
            }
            ApiMode::Chat => {
                let response: ChatResponse = serde_json::from_value(value).map_err(|e| {
                    PipelineError::service(format!("malformed response body: {e}"))
                })?;
                response
                    .choices
                    .into_iter()
                    .next()
                    .and_then(|choice| choice.message.content)
            }
        };
        text.ok_or_else(|| PipelineError::service("malformed response body: no choices returned"))
    }
}

#[async_trait]
impl CompletionBackend for AzureOpenAIBackend {
    async fn send(&self, prompt: &str, params: &GenerationParams) -> Result<String> {
        let url = self.endpoint.url();
        let body = self.request_body(prompt, params)?;
        debug!(%url, mode = ?self.endpoint.mode, "sending completion request");
        let request = self
            .client
            .post(&url)
            .header(AZURE_API_KEY_HEADER, &self.endpoint.api_key);
        let (status, text) = post_json(request, &body, params).await?;
        if !status.is_success() {
            return Err(PipelineError::service(format!(
                "request to Azure OpenAI API failed ({status}): {}",
                error_message(&text)
            )));
        }
        self.extract_text(&text)
    }
}

/// Cohere's generate endpoint, authenticated with a bearer token.
pub struct CohereBackend {
    client: reqwest::Client,
    endpoint: ResolvedCohere,
}

impl CohereBackend {
    pub fn new(endpoint: ResolvedCohere) -> Result<Self> {
        let client = reqwest::Client::builder().build()?;
        Ok(CohereBackend { client, endpoint })
    }

    pub fn endpoint(&self) -> &ResolvedCohere {
        &self.endpoint
    }

    fn extract_text(body: &str) -> Result<String> {
        let value: Value = serde_json::from_str(body)
            .map_err(|e| PipelineError::service(format!("malformed response body: {e}")))?;
        // Cohere reports failures as a top-level `message`.
        if let Some(message) = value.get("message") {
            return Err(PipelineError::service(format!(
                "API call failed: {}",
                message.as_str().map(String::from).unwrap_or_else(|| message.to_string())
            )));
        }
        let response: CohereResponse = serde_json::from_value(value)
            .map_err(|e| PipelineError::service(format!("malformed response body: {e}")))?;
        response
            .generations
            .into_iter()
            .next()
            .map(|generation| generation.text)
            .ok_or_else(|| PipelineError::service("malformed response body: no generations returned"))
    }
}

#[async_trait]
impl CompletionBackend for CohereBackend {
    async fn send(&self, prompt: &str, params: &GenerationParams) -> Result<String> {
        let url = self.endpoint.url();
        let body = serde_json::to_value(CohereRequestBody {
            prompt,
            model: self.endpoint.model.as_deref(),
            max_tokens: params.max_tokens,
            temperature: params.temperature,
            stop_sequences: &params.stop,
        })
        .map_err(|e| PipelineError::service(format!("could not encode request body: {e}")))?;
        debug!(%url, model = ?self.endpoint.model, "sending generate request");
        let request = self
            .client
            .post(&url)
            .header("Accept", "application/json")
            .bearer_auth(&self.endpoint.api_key);
        let (status, text) = post_json(request, &body, params).await?;
        if !status.is_success() {
            let message = match serde_json::from_str::<Value>(&text) {
                Ok(value) => value
                    .get("message")
                    .and_then(Value::as_str)
                    .map(String::from)
                    .unwrap_or_else(|| value.to_string()),
                Err(_) => text.trim().to_string(),
            };
            return Err(PipelineError::service(format!(
                "request to Cohere API failed ({status}): {message}"
            )));
        }
        Self::extract_text(&text)
    }
}

/// The `error.message` of an error body, or the body itself.
fn error_message(body: &str) -> String {
    match serde_json::from_str::<Value>(body) {
        Ok(value) => match value.get("error") {
            Some(error) => describe_api_error(error),
            None => value.to_string(),
        },
        Err(_) => body.trim().to_string(),
    }
}

fn describe_api_error(error: &Value) -> String {
    error
        .get("message")
        .and_then(Value::as_str)
        .map(String::from)
        .unwrap_or_else(|| error.to_string())
}

/// Outcome of one classification.
///
/// `valid` is false when the completion matched none of the configured
/// labels; `label` is then the trimmed completion and `raw` keeps it verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassificationResult {
    pub label: String,
    pub valid: bool,
    pub raw: String,
}

impl ClassificationResult {
    pub fn from_completion(raw: &str, labels: &LabelSet) -> Self {
        match labels.find(raw) {
            Some(label) => ClassificationResult {
                label: label.to_string(),
                valid: true,
                raw: raw.to_string(),
            },
            None => ClassificationResult {
                label: raw.trim().to_string(),
                valid: false,
                raw: raw.to_string(),
            },
        }
    }
}

/// Sends assembled prompts to a backend and checks the answer against the label set.
pub struct ClassificationClient<B> {
    backend: B,
    labels: LabelSet,
    params: GenerationParams,
}

impl<B: CompletionBackend> ClassificationClient<B> {
    pub fn new(backend: B, labels: LabelSet, params: GenerationParams) -> Self {
        ClassificationClient {
            backend,
            labels,
            params,
        }
    }

    /// One round-trip, no retries.
    pub async fn classify(&self, prompt: &str) -> Result<ClassificationResult> {
        let raw = self.backend.send(prompt, &self.params).await?;
        let result = ClassificationResult::from_completion(&raw, &self.labels);
        if result.valid {
            debug!(label = %result.label, "completion matched a label");
        } else {
            warn!(raw = %result.raw, labels = %self.labels, "completion matched no label");
        }
        Ok(result)
    }
}
