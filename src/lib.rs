pub mod config;
pub mod error;
pub mod event;
pub mod handler;
pub mod model;
pub mod server;

pub use config::AppConfig;
pub use error::RelayError;
pub use event::{CallerIdentity, InboundEvent, ProxyResponse};
pub use handler::{ChatHandler, ChatReply, OutboundResponse};
pub use model::{GenerationRequest, GenerationResult, HttpGenerator, TextGenerator, Turn};
pub use server::build_router;
