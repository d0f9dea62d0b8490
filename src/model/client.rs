use async_trait::async_trait;
use reqwest::{Client, header::CONTENT_TYPE};
use serde_json::Value;

use crate::{
    config::normalize_base_url,
    error::RelayError,
    model::{GenerationRequest, GenerationResult},
};

/// Anything that can turn a prompt into generated text.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResult, RelayError>;
}

/// Calls `POST {base_url}/generate` once per request. No retries and no
/// client-side timeout; the body is read in full before parsing.
#[derive(Debug, Clone)]
pub struct HttpGenerator {
    client: Client,
    endpoint: String,
}

impl HttpGenerator {
    pub fn new(base_url: &str) -> Result<Self, RelayError> {
        let client = Client::builder()
            .build()
            .map_err(|e| RelayError::Internal(format!("failed to build http client: {e}")))?;
        Ok(Self::with_client(client, base_url))
    }

    pub fn with_client(client: Client, base_url: &str) -> Self {
        Self {
            client,
            endpoint: format!("{}/generate", normalize_base_url(base_url)),
        }
    }

    #[cfg(test)]
    fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl TextGenerator for HttpGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResult, RelayError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "application/json")
            .json(request)
            .send()
            .await?;

        let status = response.status();
        let raw = response.bytes().await?;
        if !status.is_success() {
            return Err(RelayError::Upstream(format!(
                "upstream returned status {status}"
            )));
        }

        parse_generation(&raw)
    }
}

fn parse_generation(raw: &[u8]) -> Result<GenerationResult, RelayError> {
    let value: Value = serde_json::from_slice(raw)
        .map_err(|e| RelayError::Upstream(format!("response is not valid JSON: {e}")))?;

    match value.get("generated_text") {
        Some(Value::String(text)) => Ok(GenerationResult {
            generated_text: text.clone(),
        }),
        Some(_) => Err(RelayError::Upstream(
            "field 'generated_text' is not a string".into(),
        )),
        None => Err(RelayError::Upstream(
            "response is missing field 'generated_text'".into(),
        )),
    }
}
