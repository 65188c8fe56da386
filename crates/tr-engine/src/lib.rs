pub mod engine;
pub mod script;
pub mod stub;

pub use engine::{
    ContextParams, DecodeState, Engine, Model, ModelOptions, Vocab, DEFAULT_DECODE_THREADS,
};

/// Integer token identifier, indexing into the model vocabulary.
pub type TokenId = u32;
