use tracing::{debug, warn};

use tr_engine::{TokenId, Vocab};

use crate::error::{LlmError, Result};

/// Tokens held back from the prompt budget so generation has room to run.
pub const GENERATION_HEADROOM: usize = 64;

/// Encode a prompt into a token sequence bounded by the context window.
///
/// Two-phase: an empty-buffer probe reports the needed capacity (negated),
/// then a sized pass performs the real encode with the model's BOS token
/// prepended. Prompts needing `max_context_tokens` or more are capped at
/// `max_context_tokens - GENERATION_HEADROOM`; truncation is logged, never
/// silent.
pub fn tokenize_prompt(
    vocab: &dyn Vocab,
    text: &str,
    max_context_tokens: usize,
) -> Result<Vec<TokenId>> {
    let probe = vocab.tokenize(text, &mut [], true, true);
    if probe == 0 {
        return Err(LlmError::EmptyTokenization);
    }

    let mut needed = probe.unsigned_abs() as usize;
    if needed >= max_context_tokens {
        let cap = max_context_tokens.saturating_sub(GENERATION_HEADROOM);
        warn!(needed, cap, "prompt too long, truncating");
        needed = cap;
    }

    let mut tokens = vec![0 as TokenId; needed];
    let written = vocab.tokenize(text, &mut tokens, true, true);
    if written < 0 {
        return Err(LlmError::Tokenization(written));
    }
    tokens.truncate(written as usize);
    debug!(count = tokens.len(), "prompt tokenized");
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{hello_vocab, long_prompt_vocab, EOS};

    #[test]
    fn small_prompt_keeps_every_token() {
        let vocab = hello_vocab();
        let tokens = tokenize_prompt(&vocab, "Hello", 512).unwrap();
        // BOS plus the two scripted tokens, untouched.
        assert_eq!(tokens, vec![1, 3, 4]);
    }

    #[test]
    fn prompt_below_the_headroom_boundary_is_not_truncated() {
        let n = 512 - GENERATION_HEADROOM - 1;
        let vocab = long_prompt_vocab("almost", n);
        let tokens = tokenize_prompt(&vocab, "almost", 512).unwrap();
        assert_eq!(tokens.len(), n + 1); // + BOS
    }

    #[test]
    fn oversized_prompt_is_capped_at_context_minus_headroom() {
        let vocab = long_prompt_vocab("oversized", 600);
        let tokens = tokenize_prompt(&vocab, "oversized", 512).unwrap();
        assert_eq!(tokens.len(), 512 - GENERATION_HEADROOM);
    }

    #[test]
    fn prompt_exactly_at_capacity_is_truncated() {
        // The policy triggers at >= max_context_tokens, not just above it.
        let vocab = long_prompt_vocab("edge", 511); // 511 + BOS = 512
        let tokens = tokenize_prompt(&vocab, "edge", 512).unwrap();
        assert_eq!(tokens.len(), 512 - GENERATION_HEADROOM);
    }

    #[test]
    fn zero_token_probe_is_an_error() {
        let vocab = hello_vocab();
        assert!(matches!(
            tokenize_prompt(&vocab, "never registered", 512),
            Err(LlmError::EmptyTokenization)
        ));
    }

    #[test]
    fn round_trip_drops_no_visible_fragment() {
        let vocab = hello_vocab();
        let tokens = tokenize_prompt(&vocab, "Hello", 512).unwrap();
        let mut buf = [0u8; 64];
        let mut text = Vec::new();
        for &t in &tokens {
            assert_ne!(t, EOS);
            let len = vocab.detokenize(t, &mut buf);
            if len > 0 {
                text.extend_from_slice(&buf[..len as usize]);
            }
        }
        // BOS has an empty piece; the visible fragments rebuild the prompt.
        assert_eq!(text, b"Hello");
    }
}
