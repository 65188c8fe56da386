//! Deterministic scripted engine.
//!
//! Used by the test suites across the workspace, and doubles as the wiring
//! reference for hooking a real llama-style backend behind the [`Engine`]
//! traits: every boundary call a real backend must answer is answered here
//! with scripted data instead of numeric kernels.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::engine::{ContextParams, DecodeState, Engine, Model, ModelOptions, Vocab};
use crate::TokenId;

/// Lifecycle events recorded by [`ScriptEngine`], in the order they happen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineEvent {
    BackendInit,
    BackendShutdown,
    ModelLoad,
    ModelFree,
    ContextCreate,
    ContextFree,
    CacheClear,
}

type EventLog = Arc<Mutex<Vec<EngineEvent>>>;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Vocabulary with scripted prompt encodings.
///
/// Token pieces are given by position (`pieces[id]`); prompt encodings are
/// registered explicitly with [`ScriptVocab::prompt`]. Unregistered text
/// encodes to zero tokens.
pub struct ScriptVocab {
    pieces: Vec<String>,
    bos_id: TokenId,
    eos_id: TokenId,
    prompts: HashMap<String, Vec<TokenId>>,
}

impl ScriptVocab {
    pub fn new(pieces: &[&str], bos_id: TokenId, eos_id: TokenId) -> Self {
        Self {
            pieces: pieces.iter().map(|p| p.to_string()).collect(),
            bos_id,
            eos_id,
            prompts: HashMap::new(),
        }
    }

    /// Register the token sequence `text` encodes to (before the BOS token).
    pub fn prompt(mut self, text: &str, tokens: &[TokenId]) -> Self {
        self.prompts.insert(text.to_string(), tokens.to_vec());
        self
    }

    pub fn bos_id(&self) -> TokenId {
        self.bos_id
    }

    pub fn eos_id(&self) -> TokenId {
        self.eos_id
    }
}

impl Vocab for ScriptVocab {
    fn n_tokens(&self) -> usize {
        self.pieces.len()
    }

    fn tokenize(
        &self,
        text: &str,
        out: &mut [TokenId],
        add_bos: bool,
        _parse_special: bool,
    ) -> i32 {
        let Some(scripted) = self.prompts.get(text) else {
            return 0;
        };
        let mut seq = Vec::with_capacity(scripted.len() + 1);
        if add_bos {
            seq.push(self.bos_id);
        }
        seq.extend_from_slice(scripted);

        if out.is_empty() {
            return -(seq.len() as i32);
        }
        let n = seq.len().min(out.len());
        out[..n].copy_from_slice(&seq[..n]);
        n as i32
    }

    fn detokenize(&self, token: TokenId, out: &mut [u8]) -> i32 {
        let Some(piece) = self.pieces.get(token as usize) else {
            return 0;
        };
        let bytes = piece.as_bytes();
        if bytes.len() > out.len() {
            return -(bytes.len() as i32);
        }
        out[..bytes.len()].copy_from_slice(bytes);
        bytes.len() as i32
    }

    fn is_end_marker(&self, token: TokenId) -> bool {
        token == self.eos_id
    }
}

/// Behavior script for one registered model.
pub struct ScriptModelSpec {
    /// Vocabulary; `None` makes vocabulary derivation fail.
    pub vocab: Option<Arc<ScriptVocab>>,
    /// Tokens the decode state steers the sampler toward, one per decode
    /// step. When the script runs out, the last entry repeats.
    pub script: Vec<TokenId>,
    /// Fail decode-state allocation when true.
    pub fail_context: bool,
    /// Decode call index that returns a nonzero status. The prefill step is
    /// call 0; the n-th single-token feedback step is call n.
    pub fail_decode_at: Option<usize>,
}

impl Default for ScriptModelSpec {
    fn default() -> Self {
        Self {
            vocab: None,
            script: Vec::new(),
            fail_context: false,
            fail_decode_at: None,
        }
    }
}

/// Engine whose models, vocabularies, and decode results are scripted.
pub struct ScriptEngine {
    models: Mutex<HashMap<PathBuf, Arc<ScriptModelSpec>>>,
    events: EventLog,
}

impl ScriptEngine {
    pub fn new() -> Self {
        Self {
            models: Mutex::new(HashMap::new()),
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Make `spec` loadable at `path`. Loads from unregistered paths fail.
    pub fn register_model(&self, path: impl Into<PathBuf>, spec: ScriptModelSpec) {
        lock(&self.models).insert(path.into(), Arc::new(spec));
    }

    /// Snapshot of the lifecycle events recorded so far.
    pub fn events(&self) -> Vec<EngineEvent> {
        lock(&self.events).clone()
    }
}

impl Default for ScriptEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine for ScriptEngine {
    fn backend_init(&self) {
        lock(&self.events).push(EngineEvent::BackendInit);
    }

    fn backend_shutdown(&self) {
        lock(&self.events).push(EngineEvent::BackendShutdown);
    }

    fn load_model(&self, path: &Path, _options: &ModelOptions) -> Option<Box<dyn Model>> {
        let spec = lock(&self.models).get(path).cloned()?;
        lock(&self.events).push(EngineEvent::ModelLoad);
        Some(Box::new(ScriptModel {
            spec,
            events: self.events.clone(),
        }))
    }
}

struct ScriptModel {
    spec: Arc<ScriptModelSpec>,
    events: EventLog,
}

impl Model for ScriptModel {
    fn vocab(&self) -> Option<Arc<dyn Vocab>> {
        self.spec.vocab.clone().map(|v| v as Arc<dyn Vocab>)
    }

    fn new_decode_state(&self, params: &ContextParams) -> Option<Box<dyn DecodeState>> {
        if self.spec.fail_context {
            return None;
        }
        let n_vocab = self
            .spec
            .vocab
            .as_ref()
            .map(|v| v.n_tokens())
            .unwrap_or(1)
            .max(1);
        lock(&self.events).push(EngineEvent::ContextCreate);
        Some(Box::new(ScriptState {
            script: self.spec.script.clone(),
            fail_decode_at: self.spec.fail_decode_at,
            logits: vec![0.0; n_vocab],
            step: 0,
            calls: 0,
            used: 0,
            capacity: params.n_ctx as usize,
            events: self.events.clone(),
        }))
    }
}

impl Drop for ScriptModel {
    fn drop(&mut self) {
        lock(&self.events).push(EngineEvent::ModelFree);
    }
}

struct ScriptState {
    script: Vec<TokenId>,
    fail_decode_at: Option<usize>,
    logits: Vec<f32>,
    /// Position in the script; reset by `clear`.
    step: usize,
    /// Total decode calls over the state's lifetime; never reset.
    calls: usize,
    used: usize,
    capacity: usize,
    events: EventLog,
}

impl DecodeState for ScriptState {
    fn clear(&mut self) {
        self.step = 0;
        self.used = 0;
        self.logits.fill(0.0);
        lock(&self.events).push(EngineEvent::CacheClear);
    }

    fn decode(&mut self, tokens: &[TokenId]) -> i32 {
        let call = self.calls;
        self.calls += 1;
        if self.fail_decode_at == Some(call) {
            return 1;
        }
        if tokens.is_empty() || self.used + tokens.len() > self.capacity {
            return -1;
        }
        self.used += tokens.len();

        let target = self.script.get(self.step).or(self.script.last()).copied();
        self.step += 1;
        self.logits.fill(0.0);
        if let Some(t) = target {
            if let Some(logit) = self.logits.get_mut(t as usize) {
                *logit = 1.0;
            }
        }
        0
    }

    fn logits(&self) -> &[f32] {
        &self.logits
    }
}

impl Drop for ScriptState {
    fn drop(&mut self) {
        lock(&self.events).push(EngineEvent::ContextFree);
    }
}
