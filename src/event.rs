//! Gateway-shaped request and response objects.
//!
//! The handler speaks the proxy-integration format: a JSON body carried as a
//! string plus optional authorizer claims in, and `statusCode`, `headers` and
//! a string body out.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Headers attached to every handler response, success or failure.
pub const RESPONSE_HEADERS: [(&str, &str); 4] = [
    ("Content-Type", "application/json"),
    ("Access-Control-Allow-Origin", "*"),
    (
        "Access-Control-Allow-Headers",
        "Content-Type,X-Amz-Date,Authorization,X-Api-Key,X-Amz-Security-Token",
    ),
    ("Access-Control-Allow-Methods", "OPTIONS,POST"),
];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundEvent {
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_context: Option<RequestContext>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorizer: Option<Authorizer>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Authorizer {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claims: Option<Map<String, Value>>,
}

impl InboundEvent {
    pub fn from_body(body: impl Into<String>) -> Self {
        Self {
            body: Some(body.into()),
            request_context: None,
        }
    }

    pub fn with_claims(mut self, claims: Map<String, Value>) -> Self {
        self.request_context = Some(RequestContext {
            authorizer: Some(Authorizer {
                claims: Some(claims),
            }),
        });
        self
    }

    pub fn caller_identity(&self) -> Option<CallerIdentity> {
        self.request_context
            .as_ref()?
            .authorizer
            .as_ref()?
            .claims
            .clone()
            .map(CallerIdentity)
    }
}

/// Claims supplied by an upstream authorizer. Informational only.
#[derive(Debug, Clone, PartialEq)]
pub struct CallerIdentity(pub Map<String, Value>);

impl CallerIdentity {
    pub fn claim(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(Value::as_str)
    }

    /// `email`, falling back to `cognito:username`.
    pub fn display_name(&self) -> Option<&str> {
        self.claim("email").or_else(|| self.claim("cognito:username"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyResponse {
    pub status_code: u16,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

impl ProxyResponse {
    pub fn new(status_code: u16, body: String) -> Self {
        let headers = RESPONSE_HEADERS
            .iter()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect();
        Self {
            status_code,
            headers,
            body,
        }
    }
}
