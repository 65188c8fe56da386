use thiserror::Error;

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("model load failed: {0}")]
    ModelLoad(String),
    #[error("model carries no vocabulary")]
    Vocab,
    #[error("decode context allocation failed")]
    ContextAlloc,
    #[error("tokenization produced no tokens")]
    EmptyTokenization,
    #[error("tokenization failed with code {0}")]
    Tokenization(i32),
    #[error("decode step failed with status {code}")]
    Decode { code: i32 },
}

pub type Result<T> = std::result::Result<T, LlmError>;
