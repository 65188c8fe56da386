//! Shared fixtures for the crate's test modules, built on the scripted
//! engine from `tr-engine`.

use std::sync::Arc;

use tr_engine::script::{ScriptEngine, ScriptModelSpec, ScriptVocab};
use tr_engine::TokenId;

pub const BOS: TokenId = 1;
pub const EOS: TokenId = 2;

/// Vocabulary where "Hello" encodes to two visible pieces ("Hel" + "lo").
/// Token 5 is a newline piece, token 6 an invisible (empty) piece.
pub fn hello_vocab() -> ScriptVocab {
    ScriptVocab::new(&["<pad>", "", "", "Hel", "lo", "\n", "", "!", "a", "b"], BOS, EOS)
        .prompt("Hello", &[3, 4])
}

/// Vocabulary where `text` encodes to `n` copies of one filler token.
pub fn long_prompt_vocab(text: &str, n: usize) -> ScriptVocab {
    ScriptVocab::new(&["<pad>", "", "", "x"], BOS, EOS).prompt(text, &vec![3; n])
}

/// Engine with one model at `path` that answers "Hello" and then produces
/// `script` during generation.
pub fn engine_with_model(path: &str, script: Vec<TokenId>) -> Arc<ScriptEngine> {
    let engine = Arc::new(ScriptEngine::new());
    engine.register_model(
        path,
        ScriptModelSpec {
            vocab: Some(Arc::new(hello_vocab())),
            script,
            ..Default::default()
        },
    );
    engine
}
