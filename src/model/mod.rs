mod client;
mod types;

pub use client::{HttpGenerator, TextGenerator};
pub use types::{
    DO_SAMPLE, GenerationRequest, GenerationResult, MAX_NEW_TOKENS, Role, TEMPERATURE, TOP_P,
    Turn,
};
