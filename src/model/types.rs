use serde::{Deserialize, Serialize};

pub const MAX_NEW_TOKENS: u32 = 512;
pub const TEMPERATURE: f64 = 0.7;
pub const TOP_P: f64 = 0.9;
pub const DO_SAMPLE: bool = true;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One message of a conversation. History order is chronological.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Payload posted to the upstream `/generate` endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationRequest {
    pub prompt: String,
    pub max_new_tokens: u32,
    pub temperature: f64,
    pub top_p: f64,
    pub do_sample: bool,
}

impl GenerationRequest {
    /// The prompt is sent as-is with the fixed sampling settings.
    pub fn for_prompt(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            max_new_tokens: MAX_NEW_TOKENS,
            temperature: TEMPERATURE,
            top_p: TOP_P,
            do_sample: DO_SAMPLE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GenerationResult {
    pub generated_text: String,
}
