use axum::{
    Json, Router,
    body::{Body, Bytes},
    extract::State,
    http::{HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::{
    error::RelayError,
    event::{InboundEvent, ProxyResponse},
    handler::ChatHandler,
};

#[derive(Clone)]
pub struct AppState {
    pub handler: ChatHandler,
}

pub fn build_router(handler: ChatHandler) -> Router {
    let state = AppState { handler };

    Router::new()
        .route("/health", get(health))
        .route("/chat", post(chat).options(preflight))
        .route("/invoke", post(invoke))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn health() -> &'static str {
    "ok"
}

/// Hands the raw HTTP body to the handler. Bytes rather than `String` so a
/// bad encoding still ends up in the failure envelope instead of a 400.
async fn chat(State(state): State<AppState>, body: Bytes) -> Response {
    let body = match String::from_utf8(body.to_vec()) {
        Ok(body) => body,
        Err(err) => {
            return into_http(ChatHandler::reject(RelayError::Client(format!(
                "request body is not valid UTF-8: {err}"
            ))));
        }
    };
    let event = InboundEvent {
        body: (!body.is_empty()).then_some(body),
        request_context: None,
    };
    into_http(state.handler.handle(&event).await)
}

/// Accepts a full proxy event and returns the proxy response object as JSON.
/// Events that do not deserialize still get the failure envelope.
async fn invoke(State(state): State<AppState>, body: Bytes) -> Json<ProxyResponse> {
    let response = match serde_json::from_slice::<InboundEvent>(&body) {
        Ok(event) => state.handler.handle(&event).await,
        Err(err) => ChatHandler::reject(RelayError::Client(format!(
            "invalid gateway event: {err}"
        ))),
    };
    Json(response)
}

async fn preflight() -> Response {
    into_http(ProxyResponse::new(200, String::new()))
}

fn into_http(proxy: ProxyResponse) -> Response {
    let status =
        StatusCode::from_u16(proxy.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut response = (status, Body::from(proxy.body)).into_response();

    let headers = response.headers_mut();
    for (name, value) in &proxy.headers {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            headers.insert(name, value);
        }
    }
    response
}
