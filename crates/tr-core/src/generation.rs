use tracing::{debug, info, warn};

use tr_engine::{DecodeState, Vocab};
use tr_sampler::{GreedySampler, Sampler};

/// Hard per-call token cap. Bounds worst-case latency regardless of what the
/// caller asks for.
pub const HARD_TOKEN_CAP: usize = 128;

/// Minimum generated tokens before a newline is honored as end-of-turn, so a
/// leading newline artifact cannot end the call early.
pub const NEWLINE_STOP_MIN_TOKENS: usize = 4;

/// Scratch capacity for one detokenized piece.
const PIECE_BUF_LEN: usize = 256;

/// Why the generation loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The sampler produced the vocabulary's end-of-generation marker.
    EndMarker,
    /// The per-call token budget was exhausted.
    TokenCap,
    /// Output contains a line break after the minimum token count.
    Newline,
    /// A mid-loop decode step failed; the accumulated text is partial.
    DecodeFailure,
}

/// Accumulated output of one generation call. Text is append-only while the
/// loop runs and immutable afterwards.
#[derive(Debug)]
pub struct GenerationResult {
    pub text: String,
    pub tokens_generated: usize,
    pub stop: StopReason,
}

/// Terminal state of a generation call.
#[derive(Debug)]
pub enum GenerationOutcome {
    /// The loop terminated without any visible output. Distinguished from an
    /// empty string so callers can present "nothing generated" as its own
    /// state.
    Empty,
    Text(GenerationResult),
}

/// Run the autoregressive loop against a prefilled decode state.
///
/// Each iteration: greedy-sample the next token, stop before accepting it if
/// it is the end marker, accept it, append its text fragment, feed it back
/// through one decode step, then check the hard stops (token cap, then the
/// newline heuristic). A failed mid-loop decode step stops the loop and the
/// partial text is returned, not an error.
pub fn run(state: &mut dyn DecodeState, vocab: &dyn Vocab, max_tokens: usize) -> GenerationOutcome {
    // Scoped to this call: created at loop entry, dropped on every exit path.
    let mut sampler = GreedySampler::new();

    let budget = max_tokens.min(HARD_TOKEN_CAP);
    let mut out: Vec<u8> = Vec::new();
    let mut generated = 0usize;
    let mut piece = [0u8; PIECE_BUF_LEN];
    let mut stop = StopReason::TokenCap;

    while generated < budget {
        let token = match sampler.select(state.logits()) {
            Some(t) => t,
            None => {
                warn!(generated, "sampler had nothing to select from");
                stop = StopReason::DecodeFailure;
                break;
            }
        };

        if vocab.is_end_marker(token) {
            debug!(generated, "end marker sampled");
            stop = StopReason::EndMarker;
            break;
        }
        sampler.accept(token);

        // Pieces can split multi-byte characters, so bytes accumulate and
        // become a string only once the loop is done. A length <= 0 means no
        // visible text for this token.
        let len = vocab.detokenize(token, &mut piece);
        if len > 0 {
            out.extend_from_slice(&piece[..len as usize]);
        }

        let status = state.decode(&[token]);
        if status != 0 {
            warn!(status, generated, "decode step failed, returning partial output");
            stop = StopReason::DecodeFailure;
            break;
        }
        generated += 1;

        if generated >= NEWLINE_STOP_MIN_TOKENS && out.contains(&b'\n') {
            debug!(generated, "newline stop");
            stop = StopReason::Newline;
            break;
        }
    }

    info!(generated, ?stop, "generation finished");

    if out.is_empty() {
        return GenerationOutcome::Empty;
    }
    let text = String::from_utf8_lossy(&out).into_owned();
    GenerationOutcome::Text(GenerationResult {
        text,
        tokens_generated: generated,
        stop,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prefill::prefill;
    use crate::testing::hello_vocab;
    use std::sync::Arc;
    use tr_engine::script::{ScriptEngine, ScriptModelSpec, ScriptVocab};
    use tr_engine::{ContextParams, Engine, ModelOptions, TokenId};

    const EOS: TokenId = 2;

    fn prefilled_state(vocab: Arc<ScriptVocab>, spec: ScriptModelSpec) -> Box<dyn DecodeState> {
        let engine = ScriptEngine::new();
        engine.register_model("/m.gguf", spec);
        let model = engine
            .load_model(std::path::Path::new("/m.gguf"), &ModelOptions::default())
            .unwrap();
        let mut state = model
            .new_decode_state(&ContextParams::for_context_size(512))
            .unwrap();
        let mut prompt = [0 as TokenId; 8];
        let n = vocab.tokenize("Hello", &mut prompt, true, true);
        prefill(state.as_mut(), &prompt[..n as usize]).unwrap();
        state
    }

    fn run_script(script: Vec<TokenId>, max_tokens: usize) -> GenerationOutcome {
        let vocab = Arc::new(hello_vocab());
        let mut state = prefilled_state(
            vocab.clone(),
            ScriptModelSpec {
                vocab: Some(vocab.clone()),
                script,
                ..Default::default()
            },
        );
        run(state.as_mut(), vocab.as_ref(), max_tokens)
    }

    fn expect_text(outcome: GenerationOutcome) -> GenerationResult {
        match outcome {
            GenerationOutcome::Text(r) => r,
            GenerationOutcome::Empty => panic!("expected text, got empty outcome"),
        }
    }

    #[test]
    fn stops_on_end_marker_and_returns_the_text_so_far() {
        // "Hel" "lo" "!" then EOS.
        let result = expect_text(run_script(vec![3, 4, 7, EOS], 50));
        assert_eq!(result.text, "Hello!");
        assert_eq!(result.tokens_generated, 3);
        assert_eq!(result.stop, StopReason::EndMarker);
    }

    #[test]
    fn end_marker_as_first_token_yields_the_empty_outcome() {
        assert!(matches!(run_script(vec![EOS], 50), GenerationOutcome::Empty));
    }

    #[test]
    fn never_exceeds_the_hard_cap() {
        // Script repeats its last token forever; only the cap can stop it.
        let result = expect_text(run_script(vec![8], 10_000));
        assert_eq!(result.tokens_generated, HARD_TOKEN_CAP);
        assert_eq!(result.stop, StopReason::TokenCap);
    }

    #[test]
    fn respects_a_caller_budget_below_the_cap() {
        let result = expect_text(run_script(vec![8], 5));
        assert_eq!(result.tokens_generated, 5);
        assert_eq!(result.stop, StopReason::TokenCap);
    }

    #[test]
    fn newline_stop_waits_for_the_minimum_token_count() {
        // "a" "\n" "b" "b" ...: the newline lands at token 2 but generation
        // must continue until four tokens exist, then stop at once.
        let result = expect_text(run_script(vec![8, 5, 9, 9, 9, 9, 9], 50));
        assert_eq!(result.tokens_generated, 4);
        assert_eq!(result.stop, StopReason::Newline);
        assert_eq!(result.text, "a\nbb");
    }

    #[test]
    fn newline_already_present_at_token_four_stops_immediately() {
        // "a" "\n" "b" plus one more piece reaches the minimum with the
        // break already in the buffer.
        let result = expect_text(run_script(vec![8, 5, 9, 8, 8, 8], 50));
        assert_eq!(result.tokens_generated, 4);
        assert_eq!(result.stop, StopReason::Newline);
    }

    #[test]
    fn mid_loop_decode_failure_returns_partial_text() {
        let vocab = Arc::new(hello_vocab());
        let mut state = prefilled_state(
            vocab.clone(),
            ScriptModelSpec {
                vocab: Some(vocab.clone()),
                script: vec![3, 4, 7, 7],
                // Call 0 is the prefill; fail on the second feedback step.
                fail_decode_at: Some(2),
                ..Default::default()
            },
        );
        let result = expect_text(run(state.as_mut(), vocab.as_ref(), 50));
        // The failing token's piece was already appended.
        assert_eq!(result.text, "Hello");
        assert_eq!(result.tokens_generated, 1);
        assert_eq!(result.stop, StopReason::DecodeFailure);
    }

    #[test]
    fn invisible_pieces_are_skipped_silently() {
        // Token 6 has an empty piece; it must not error or emit text.
        let result = expect_text(run_script(vec![6, 3, 4, EOS], 50));
        assert_eq!(result.text, "Hello");
        assert_eq!(result.tokens_generated, 3);
    }

    #[test]
    fn only_invisible_pieces_yield_the_empty_outcome() {
        assert!(matches!(
            run_script(vec![6, 6, EOS], 50),
            GenerationOutcome::Empty
        ));
    }

    #[test]
    fn zero_budget_generates_nothing() {
        assert!(matches!(run_script(vec![3, 4], 0), GenerationOutcome::Empty));
    }

    #[test]
    fn hello_scenario_produces_clean_single_line_text() {
        // Small prompt, prefill ok, end marker within the budget, output free
        // of control characters.
        let result = expect_text(run_script(vec![3, 4, 7, EOS], 50));
        assert!(!result.text.is_empty());
        assert!(result.tokens_generated < 50);
        assert!(!result.text.chars().any(|c| c.is_control()));
    }
}
