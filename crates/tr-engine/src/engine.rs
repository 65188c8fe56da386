use std::path::Path;

use crate::TokenId;

/// Worker threads used for intra-step matrix work. Sized for the efficiency
/// cores of the target device, not for concurrent requests.
pub const DEFAULT_DECODE_THREADS: u32 = 4;

/// Options applied when loading model weights.
#[derive(Debug, Clone)]
pub struct ModelOptions {
    /// Memory-map the weights instead of reading them into anonymous memory.
    pub use_mmap: bool,
    /// Number of layers to offload to a GPU. 0 keeps the whole model on CPU.
    pub gpu_layers: u32,
}

impl Default for ModelOptions {
    fn default() -> Self {
        Self {
            use_mmap: true,
            gpu_layers: 0,
        }
    }
}

/// Sizing of a decode context.
#[derive(Debug, Clone)]
pub struct ContextParams {
    /// Context window capacity, in tokens.
    pub n_ctx: u32,
    /// Maximum tokens submitted in one decode step.
    pub n_batch: u32,
    /// Worker threads for intra-step parallelism.
    pub n_threads: u32,
}

impl ContextParams {
    /// Parameters for a context of `n_ctx` tokens: the batch width matches
    /// the context size so the whole prompt fits in one prefill step.
    pub fn for_context_size(n_ctx: u32) -> Self {
        Self {
            n_ctx,
            n_batch: n_ctx,
            n_threads: DEFAULT_DECODE_THREADS,
        }
    }
}

/// Process-wide model engine. Implementations wrap the numeric backend
/// (weights, kernels, tokenizer tables); this crate only defines the
/// boundary the orchestration core calls through.
pub trait Engine: Send + Sync {
    /// Initialize process-wide backend state. Paired with
    /// [`Engine::backend_shutdown`]; both bracket all model usage.
    fn backend_init(&self);

    /// Tear down process-wide backend state.
    fn backend_shutdown(&self);

    /// Load model weights from disk. Returns `None` when the weights cannot
    /// be read or parsed.
    fn load_model(&self, path: &Path, options: &ModelOptions) -> Option<Box<dyn Model>>;
}

/// Loaded model weights plus the vocabulary derived from them.
pub trait Model: Send {
    /// The model's token vocabulary, or `None` when the weights carry none.
    fn vocab(&self) -> Option<std::sync::Arc<dyn Vocab>>;

    /// Allocate mutable decode state bound to this model. Returns `None`
    /// when the allocation fails.
    fn new_decode_state(&self, params: &ContextParams) -> Option<Box<dyn DecodeState>>;
}

/// Read-only token <-> text mapping.
pub trait Vocab: Send + Sync {
    /// Number of tokens in the vocabulary.
    fn n_tokens(&self) -> usize;

    /// Encode `text` into token IDs.
    ///
    /// With an empty `out` this is a capacity probe: the return value is the
    /// negated token count the full encoding requires (0 when the text
    /// encodes to no tokens). With a non-empty `out` it writes up to
    /// `out.len()` tokens and returns the count written, or a negative error
    /// code if encoding fails.
    ///
    /// `add_bos` prepends the model's beginning-of-sequence token;
    /// `parse_special` lets control-token text in the input encode to its
    /// special token.
    fn tokenize(&self, text: &str, out: &mut [TokenId], add_bos: bool, parse_special: bool)
        -> i32;

    /// Write the text fragment for one token into `out` and return its byte
    /// length. A result <= 0 means the token has no visible text (control
    /// tokens) or `out` was too small (negated needed length).
    fn detokenize(&self, token: TokenId, out: &mut [u8]) -> i32;

    /// Whether `token` marks end of generation.
    fn is_end_marker(&self, token: TokenId) -> bool;
}

/// Mutable inference state bound 1:1 to a model, including the incremental
/// attention cache. Calls must be strictly sequential.
pub trait DecodeState: Send {
    /// Clear the incremental cache back to an empty context.
    fn clear(&mut self);

    /// Feed `tokens` through the model, advancing the cache. Returns 0 on
    /// success; any nonzero status leaves the state unsuitable for further
    /// decoding in the current request.
    fn decode(&mut self, tokens: &[TokenId]) -> i32;

    /// Logits over the vocabulary for the last decoded position.
    fn logits(&self) -> &[f32];
}
