use tracing::{debug, info};

use tr_engine::{DecodeState, TokenId};

use crate::error::{LlmError, Result};

/// Prime the decode state with the full prompt as a single decode step.
///
/// The incremental cache is cleared first, unconditionally, so nothing from
/// a prior request can influence this one. A nonzero decode status is fatal
/// for the current call; the state is only presumed consistent on success
/// and there is no retry.
pub fn prefill(state: &mut dyn DecodeState, tokens: &[TokenId]) -> Result<()> {
    state.clear();
    debug!("decode cache cleared");

    let status = state.decode(tokens);
    if status != 0 {
        return Err(LlmError::Decode { code: status });
    }
    info!(tokens = tokens.len(), "prompt prefilled");
    Ok(())
}
