use std::mem::ManuallyDrop;
use std::path::Path;
use std::sync::Arc;

use tracing::info;

use tr_engine::{ContextParams, DecodeState, Engine, Model, ModelOptions, Vocab};

use crate::error::{LlmError, Result};
use crate::generation::{self, GenerationOutcome};
use crate::prefill;
use crate::tokenizer;

/// Owns one loaded model, its vocabulary, and the single decode state bound
/// to it.
///
/// Calls on one context must not overlap; the context takes `&mut self` for
/// generation and relies on the caller (or a lock around it) for
/// serialization. Teardown is ordered: decode state first, then the model
/// weights, then process-wide engine shutdown.
pub struct LlmContext {
    // Field drops are ordered manually in `Drop`; these two must not be
    // dropped by the compiler-generated glue as well.
    state: ManuallyDrop<Box<dyn DecodeState>>,
    model: ManuallyDrop<Box<dyn Model>>,
    vocab: Arc<dyn Vocab>,
    engine: Arc<dyn Engine>,
    max_context_tokens: usize,
}

impl LlmContext {
    /// Load a model and allocate its decode state.
    ///
    /// The weights are memory-mapped and kept on CPU; the decode state gets a
    /// batch width equal to `context_size` so the whole prompt fits in one
    /// prefill step. Every failure path releases whatever was constructed
    /// before it, including the process-wide backend state.
    pub fn init(engine: Arc<dyn Engine>, model_path: &Path, context_size: u32) -> Result<Self> {
        engine.backend_init();
        info!(path = %model_path.display(), context_size, "loading model");

        let model = match engine.load_model(model_path, &ModelOptions::default()) {
            Some(m) => m,
            None => {
                engine.backend_shutdown();
                return Err(LlmError::ModelLoad(format!(
                    "cannot load model at {}",
                    model_path.display()
                )));
            }
        };

        let vocab = match model.vocab() {
            Some(v) => v,
            None => {
                drop(model);
                engine.backend_shutdown();
                return Err(LlmError::Vocab);
            }
        };
        info!(n_tokens = vocab.n_tokens(), "vocabulary ready");

        let params = ContextParams::for_context_size(context_size);
        let state = match model.new_decode_state(&params) {
            Some(s) => s,
            None => {
                drop(vocab);
                drop(model);
                engine.backend_shutdown();
                return Err(LlmError::ContextAlloc);
            }
        };
        info!(context_size, "decode context created");

        Ok(Self {
            state: ManuallyDrop::new(state),
            model: ManuallyDrop::new(model),
            vocab,
            engine,
            max_context_tokens: context_size as usize,
        })
    }

    /// Context window capacity, in tokens.
    pub fn max_context_tokens(&self) -> usize {
        self.max_context_tokens
    }

    /// Run one synchronous generation call: tokenize the prompt, prefill the
    /// (freshly cleared) decode state, then sample greedily until a stop
    /// condition fires. Tokenization and prefill errors leave the context
    /// reusable for a later call.
    pub fn generate(&mut self, prompt: &str, max_tokens: usize) -> Result<GenerationOutcome> {
        let tokens = tokenizer::tokenize_prompt(self.vocab.as_ref(), prompt, self.max_context_tokens)?;
        prefill::prefill(self.state.as_mut(), &tokens)?;
        Ok(generation::run(
            self.state.as_mut(),
            self.vocab.as_ref(),
            max_tokens,
        ))
    }

    /// Release all engine resources now instead of at scope exit.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for LlmContext {
    fn drop(&mut self) {
        // Decode state goes before the model weights it is bound to, and
        // process-wide engine teardown comes last.
        unsafe {
            ManuallyDrop::drop(&mut self.state);
            ManuallyDrop::drop(&mut self.model);
        }
        self.engine.backend_shutdown();
        info!("llm context released");
    }
}
