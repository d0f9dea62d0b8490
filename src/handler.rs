use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info};

use crate::{
    config::AppConfig,
    error::RelayError,
    event::{InboundEvent, ProxyResponse},
    model::{GenerationRequest, HttpGenerator, TextGenerator, Turn},
};

/// Validated inbound chat body.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatInput {
    pub message: String,
    /// Prior turns exactly as the caller sent them.
    pub history: Vec<Value>,
}

/// Successful outcome of one invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatReply {
    pub response: String,
    pub conversation_history: Vec<Value>,
}

/// JSON envelope returned for every invocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_history: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl OutboundResponse {
    /// Maps a handler outcome onto the external contract: 200 for success,
    /// 500 for every failure kind.
    pub fn from_result(result: Result<ChatReply, RelayError>) -> (u16, Self) {
        match result {
            Ok(reply) => (
                200,
                Self {
                    success: true,
                    response: Some(reply.response),
                    conversation_history: Some(reply.conversation_history),
                    error: None,
                },
            ),
            Err(err) => (
                500,
                Self {
                    success: false,
                    response: None,
                    conversation_history: None,
                    error: Some(err.to_string()),
                },
            ),
        }
    }

    fn into_proxy_response(self, status_code: u16) -> ProxyResponse {
        let body = serde_json::to_string(&self).unwrap_or_else(|_| {
            r#"{"success":false,"error":"failed to encode response"}"#.to_string()
        });
        ProxyResponse::new(status_code, body)
    }
}

/// Stateless chat request handler. Holds only the upstream generator.
#[derive(Clone)]
pub struct ChatHandler {
    generator: Arc<dyn TextGenerator>,
}

impl ChatHandler {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, RelayError> {
        let generator = HttpGenerator::new(&config.upstream_base_url)?;
        Ok(Self::new(Arc::new(generator)))
    }

    pub async fn handle(&self, event: &InboundEvent) -> ProxyResponse {
        debug!(?event, "received event");

        if let Some(identity) = event.caller_identity() {
            info!(
                caller = identity.display_name().unwrap_or("unknown"),
                "authenticated caller"
            );
        }

        let result = self.process(event.body.as_deref()).await;
        if let Err(err) = &result {
            error!(kind = err.kind(), error = %err, ?event, "chat request failed");
        }

        let (status_code, envelope) = OutboundResponse::from_result(result);
        envelope.into_proxy_response(status_code)
    }

    /// Failure envelope for requests that never became an [`InboundEvent`].
    pub fn reject(err: RelayError) -> ProxyResponse {
        error!(kind = err.kind(), error = %err, "chat request rejected");
        let (status_code, envelope) = OutboundResponse::from_result(Err(err));
        envelope.into_proxy_response(status_code)
    }

    pub async fn process(&self, body: Option<&str>) -> Result<ChatReply, RelayError> {
        let ChatInput {
            message,
            mut history,
        } = parse_input(body)?;

        let request = GenerationRequest::for_prompt(message.as_str());
        debug!(prompt_len = request.prompt.len(), "sending prompt upstream");
        let result = self.generator.generate(&request).await?;

        history.push(turn_value(Turn::user(message))?);
        history.push(turn_value(Turn::assistant(result.generated_text.as_str()))?);

        Ok(ChatReply {
            response: result.generated_text,
            conversation_history: history,
        })
    }
}

pub fn parse_input(body: Option<&str>) -> Result<ChatInput, RelayError> {
    let body = body
        .filter(|raw| !raw.trim().is_empty())
        .ok_or_else(|| RelayError::Client("request body is missing".into()))?;

    let value: Value = serde_json::from_str(body)
        .map_err(|e| RelayError::Client(format!("request body is not valid JSON: {e}")))?;
    let Value::Object(mut fields) = value else {
        return Err(RelayError::Client(
            "request body must be a JSON object".into(),
        ));
    };

    let message = match fields.remove("message") {
        Some(Value::String(message)) => message,
        None | Some(Value::Null) => {
            return Err(RelayError::Client("missing field 'message'".into()));
        }
        Some(_) => return Err(RelayError::Client("field 'message' must be a string".into())),
    };

    // Entries are not inspected; only the container has to be a list.
    let history = match fields.remove("conversationHistory") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(turns)) => turns,
        Some(_) => {
            return Err(RelayError::Internal(
                "conversation history cannot be merged: expected a list".into(),
            ));
        }
    };

    Ok(ChatInput { message, history })
}

fn turn_value(turn: Turn) -> Result<Value, RelayError> {
    serde_json::to_value(turn)
        .map_err(|e| RelayError::Internal(format!("failed to encode turn: {e}")))
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::{event::RESPONSE_HEADERS, model::GenerationResult};

    struct EchoGenerator {
        reply: String,
        seen: Mutex<Vec<GenerationRequest>>,
    }

    impl EchoGenerator {
        fn new(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: reply.to_string(),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl TextGenerator for EchoGenerator {
        async fn generate(
            &self,
            request: &GenerationRequest,
        ) -> Result<GenerationResult, RelayError> {
            self.seen.lock().unwrap().push(request.clone());
            Ok(GenerationResult {
                generated_text: self.reply.clone(),
            })
        }
    }

    struct FailingGenerator;

    #[async_trait]
    impl TextGenerator for FailingGenerator {
        async fn generate(&self, _: &GenerationRequest) -> Result<GenerationResult, RelayError> {
            Err(RelayError::Upstream("upstream returned status 503".into()))
        }
    }

    fn body_json(response: &ProxyResponse) -> Value {
        serde_json::from_str(&response.body).unwrap()
    }

    #[tokio::test]
    async fn hello_scenario() {
        let generator = EchoGenerator::new("hi there");
        let handler = ChatHandler::new(generator.clone());

        let event = InboundEvent::from_body(r#"{"message":"hello","conversationHistory":[]}"#);
        let response = handler.handle(&event).await;

        assert_eq!(response.status_code, 200);
        assert_eq!(
            body_json(&response),
            json!({
                "success": true,
                "response": "hi there",
                "conversationHistory": [
                    {"role": "user", "content": "hello"},
                    {"role": "assistant", "content": "hi there"}
                ]
            })
        );

        let seen = generator.seen.lock().unwrap();
        assert_eq!(seen.as_slice(), &[GenerationRequest::for_prompt("hello")]);
    }

    #[tokio::test]
    async fn prior_history_is_kept_in_order() {
        let handler = ChatHandler::new(EchoGenerator::new("third answer"));
        let body = json!({
            "message": "third question",
            "conversationHistory": [
                {"role": "user", "content": "first"},
                {"role": "assistant", "content": "second"}
            ]
        })
        .to_string();

        let reply = handler.process(Some(&body)).await.unwrap();

        assert_eq!(
            reply.conversation_history,
            vec![
                json!({"role": "user", "content": "first"}),
                json!({"role": "assistant", "content": "second"}),
                json!({"role": "user", "content": "third question"}),
                json!({"role": "assistant", "content": "third answer"}),
            ]
        );
    }

    #[tokio::test]
    async fn prior_turns_pass_through_untouched() {
        let handler = ChatHandler::new(EchoGenerator::new("sure"));
        let prior = r#"[{"role":"system","content":"be nice"},{"role":"user","content":"a","timestamp":123},{"role":"assistant","content":"b","meta":{"model":"x"}}]"#;
        let event = InboundEvent::from_body(format!(
            r#"{{"message":"next","conversationHistory":{prior}}}"#
        ));

        let response = handler.handle(&event).await;

        assert_eq!(response.status_code, 200);
        let expected_prefix = format!(r#""conversationHistory":{}"#, &prior[..prior.len() - 1]);
        assert!(
            response.body.contains(&expected_prefix),
            "{}",
            response.body
        );
        let history = body_json(&response)["conversationHistory"].clone();
        assert_eq!(history.as_array().unwrap().len(), 5);
        assert_eq!(history[1]["timestamp"], json!(123));
        assert_eq!(history[4], json!({"role": "assistant", "content": "sure"}));
    }

    #[test]
    fn reject_produces_failure_envelope() {
        let response =
            ChatHandler::reject(RelayError::Client("request body is not valid UTF-8".into()));

        assert_eq!(response.status_code, 500);
        assert_eq!(response, ProxyResponse::new(500, response.body.clone()));
        let body = body_json(&response);
        assert_eq!(body["success"], json!(false));
        assert!(body["error"].as_str().unwrap().contains("UTF-8"));
    }

    #[tokio::test]
    async fn only_latest_message_goes_upstream() {
        let generator = EchoGenerator::new("ok");
        let handler = ChatHandler::new(generator.clone());
        let body = json!({
            "message": "latest",
            "conversationHistory": [{"role": "user", "content": "earlier"}]
        })
        .to_string();

        handler.process(Some(&body)).await.unwrap();

        let seen = generator.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].prompt, "latest");
    }

    #[tokio::test]
    async fn missing_message_is_reported_as_500() {
        let generator = EchoGenerator::new("unused");
        let handler = ChatHandler::new(generator.clone());

        let response = handler.handle(&InboundEvent::from_body("{}")).await;

        assert_eq!(response.status_code, 500);
        let body = body_json(&response);
        assert_eq!(body["success"], json!(false));
        assert!(!body["error"].as_str().unwrap().is_empty());
        assert!(generator.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn upstream_failure_omits_history() {
        let handler = ChatHandler::new(Arc::new(FailingGenerator));
        let event = InboundEvent::from_body(
            r#"{"message":"hello","conversationHistory":[{"role":"user","content":"x"}]}"#,
        );

        let response = handler.handle(&event).await;

        assert_eq!(response.status_code, 500);
        let body = body_json(&response);
        assert_eq!(body["success"], json!(false));
        assert!(body.get("conversationHistory").is_none());
        assert!(body.get("response").is_none());
        assert!(body["error"].as_str().unwrap().contains("503"));
    }

    #[tokio::test]
    async fn headers_identical_on_success_and_failure() {
        let ok = ChatHandler::new(EchoGenerator::new("a"))
            .handle(&InboundEvent::from_body(r#"{"message":"q"}"#))
            .await;
        let failed = ChatHandler::new(EchoGenerator::new("a"))
            .handle(&InboundEvent::default())
            .await;

        assert_eq!(ok.headers, failed.headers);
        for (name, value) in RESPONSE_HEADERS {
            assert_eq!(ok.headers.get(name).map(String::as_str), Some(value));
        }
    }

    #[tokio::test]
    async fn repeated_calls_produce_identical_envelopes() {
        let handler = ChatHandler::new(EchoGenerator::new("same"));
        let event = InboundEvent::from_body(r#"{"message":"again"}"#);

        let first = handler.handle(&event).await;
        let second = handler.handle(&event).await;

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn claims_do_not_change_the_response() {
        let handler = ChatHandler::new(EchoGenerator::new("reply"));
        let plain = InboundEvent::from_body(r#"{"message":"m"}"#);
        let Value::Object(claims) = json!({"email": "someone@example.com"}) else {
            unreachable!()
        };
        let with_claims = plain.clone().with_claims(claims);

        assert_eq!(handler.handle(&plain).await, handler.handle(&with_claims).await);
    }

    #[test]
    fn classifies_bad_input() {
        assert!(matches!(parse_input(None), Err(RelayError::Client(_))));
        assert!(matches!(parse_input(Some("  ")), Err(RelayError::Client(_))));
        assert!(matches!(parse_input(Some("{not json")), Err(RelayError::Client(_))));
        assert!(matches!(parse_input(Some("[1,2]")), Err(RelayError::Client(_))));
        assert!(matches!(
            parse_input(Some(r#"{"message":7}"#)),
            Err(RelayError::Client(_))
        ));
        assert!(matches!(
            parse_input(Some(r#"{"message":"hi","conversationHistory":"nope"}"#)),
            Err(RelayError::Internal(_))
        ));
        assert!(matches!(
            parse_input(Some(r#"{"message":"hi","conversationHistory":{"role":"user"}}"#)),
            Err(RelayError::Internal(_))
        ));
    }

    #[test]
    fn null_history_is_empty() {
        let input = parse_input(Some(r#"{"message":"hi","conversationHistory":null}"#)).unwrap();
        assert_eq!(
            input,
            ChatInput {
                message: "hi".into(),
                history: Vec::new(),
            }
        );
    }
}
