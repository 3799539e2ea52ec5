//! `reqwest`-backed oracle implementation, grounded on `legalis-llm`'s
//! `OpenAiClient` (`providers.rs`): a JSON chat/responses endpoint taking a
//! model name, messages, and (here) a caller-supplied response schema.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use std::time::Duration;

use super::{parse_structured, Oracle, OracleError, OracleResult, TokenUsage};
use crate::schema::{DocumentAnalysis, EmailAnalysis, EntityMatchDecision, ExecutiveSummary, ImageAnalysis, LegalPatterns};

/// Talks to a single structured-output endpoint (spec §4.4). Holds no
/// retry/backoff logic of its own; wrap in `RetryingOracle` for that.
pub struct HttpOracle {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    model_revision: String,
}

#[derive(Serialize)]
struct StructuredRequest<'a> {
    model: &'a str,
    input: Value,
    temperature: f64,
    response_schema: &'a Value,
}

#[derive(serde::Deserialize)]
struct StructuredResponse {
    output: Value,
    #[serde(default)]
    usage: Option<UsageBlock>,
    #[serde(default)]
    refusal: Option<String>,
    #[serde(default)]
    incomplete_reason: Option<String>,
}

#[derive(serde::Deserialize)]
struct UsageBlock {
    #[serde(default)]
    input_tokens: Option<u32>,
    #[serde(default)]
    output_tokens: Option<u32>,
}

impl HttpOracle {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>, model_revision: impl Into<String>, timeout: Duration) -> Self {
        HttpOracle {
            client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: api_key.into(),
            model: model.into(),
            model_revision: model_revision.into(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn model_revision(&self) -> &str {
        &self.model_revision
    }

    pub fn model_name(&self) -> &str {
        &self.model
    }

    /// Temperature 0, per spec §4.4 contracts: "The oracle is treated as a
    /// pure function of (prompt, schema, content) for audit purposes".
    async fn call(&self, input: Value, schema: &Value) -> OracleResult<(Value, TokenUsage)> {
        let request = StructuredRequest {
            model: &self.model,
            input,
            temperature: 0.0,
            response_schema: schema,
        };

        let response = self
            .client
            .post(format!("{}/responses", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(OracleError::RateLimited);
        }
        if status.is_server_error() {
            return Err(OracleError::ServerError(format!("http {status}")));
        }
        if !status.is_success() {
            return Err(OracleError::SchemaInvalid(format!("unexpected status {status}")));
        }

        let body: StructuredResponse = response
            .json()
            .await
            .map_err(|e| OracleError::SchemaInvalid(format!("malformed response body: {e}")))?;

        if let Some(reason) = body.refusal {
            return Err(OracleError::Refusal(reason));
        }
        if let Some(reason) = body.incomplete_reason {
            return Err(OracleError::Incomplete(reason));
        }

        let usage = body.usage.map(|u| TokenUsage {
            input_tokens: u.input_tokens,
            output_tokens: u.output_tokens,
        });

        Ok((body.output, usage.unwrap_or_default()))
    }
}

/// Rewrites the oracle's raw `risk_flags` strings into the canonical
/// vocabulary before typed parsing (spec §4.5: "Post-processing normalizes
/// risk-flag synonyms to the canonical set"). Unrecognized flags are
/// dropped rather than failing the whole response.
fn normalize_image_risk_flags(raw: &mut Value) {
    let Some(flags) = raw.get_mut("risk_flags") else {
        return;
    };
    let Some(array) = flags.as_array() else {
        return;
    };
    let normalized: Vec<Value> = array
        .iter()
        .filter_map(|v| v.as_str())
        .filter_map(crate::schema::normalize_image_risk_flag)
        .filter_map(|f| serde_json::to_value(f).ok())
        .collect();
    *flags = Value::Array(normalized);
}

fn classify_transport_error(err: reqwest::Error) -> OracleError {
    if err.is_timeout() {
        OracleError::Timeout
    } else {
        OracleError::Transport(err.to_string())
    }
}

#[async_trait]
impl Oracle for HttpOracle {
    async fn analyze_document(&self, text: &str, prompt: &str, schema: &Value) -> OracleResult<(DocumentAnalysis, TokenUsage)> {
        let input = json!({"prompt": prompt, "document_text": text});
        let (raw, usage) = self.call(input, schema).await?;
        Ok((parse_structured(&raw)?, usage))
    }

    async fn analyze_email(&self, thread_text: &str, prompt: &str, schema: &Value) -> OracleResult<(EmailAnalysis, TokenUsage)> {
        let input = json!({"prompt": prompt, "thread_text": thread_text});
        let (raw, usage) = self.call(input, schema).await?;
        Ok((parse_structured(&raw)?, usage))
    }

    async fn analyze_image(&self, bytes: &[u8], mime: &str, prompt: &str, schema: &Value) -> OracleResult<(ImageAnalysis, TokenUsage)> {
        let encoded = hex::encode(bytes);
        let input = json!({"prompt": prompt, "image_mime": mime, "image_hex": encoded});
        let (mut raw, usage) = self.call(input, schema).await?;
        normalize_image_risk_flags(&mut raw);
        Ok((parse_structured(&raw)?, usage))
    }

    async fn resolve_entity_pair(
        &self,
        a: &str,
        b: &str,
        contexts: &[String],
        prompt: &str,
        schema: &Value,
    ) -> OracleResult<(EntityMatchDecision, TokenUsage)> {
        let input = json!({"prompt": prompt, "entity_a": a, "entity_b": b, "contexts": contexts});
        let (raw, usage) = self.call(input, schema).await?;
        Ok((parse_structured(&raw)?, usage))
    }

    async fn summarize_case(&self, correlation_input: &Value, prompt: &str, schema: &Value) -> OracleResult<(ExecutiveSummary, TokenUsage)> {
        let input = json!({"prompt": prompt, "correlation": correlation_input});
        let (raw, usage) = self.call(input, schema).await?;
        Ok((parse_structured(&raw)?, usage))
    }

    async fn detect_legal_patterns(&self, correlation_input: &Value, prompt: &str, schema: &Value) -> OracleResult<(LegalPatterns, TokenUsage)> {
        let input = json!({"prompt": prompt, "correlation": correlation_input});
        let (raw, usage) = self.call(input, schema).await?;
        Ok((parse_structured(&raw)?, usage))
    }
}
