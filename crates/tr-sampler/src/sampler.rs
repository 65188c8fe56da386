/// Trait for strategies that select the next token from raw logits.
///
/// A sampler instance lives for exactly one generation call: create it at
/// loop entry, drop it at loop exit.
pub trait Sampler: Send {
    /// Returns the name of this sampler.
    fn name(&self) -> &str;

    /// Select the next token from `logits`, where `logits[i]` scores token
    /// id `i`. Returns `None` when there is nothing to select from.
    fn select(&self, logits: &[f32]) -> Option<u32>;

    /// Record a token the caller committed to. Part of the sampler contract
    /// so stateful strategies can track their own output.
    fn accept(&mut self, token: u32);

    /// Reset any internal state. Default implementation does nothing.
    fn reset(&mut self) {}
}
