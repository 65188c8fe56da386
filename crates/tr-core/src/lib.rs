pub mod context;
pub mod error;
pub mod generation;
pub mod prefill;
pub mod tokenizer;

pub use context::LlmContext;
pub use error::{LlmError, Result};
pub use generation::{
    GenerationOutcome, GenerationResult, StopReason, HARD_TOKEN_CAP, NEWLINE_STOP_MIN_TOKENS,
};
pub use tokenizer::GENERATION_HEADROOM;

#[cfg(test)]
pub(crate) mod testing;
