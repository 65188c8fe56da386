use crate::sampler::Sampler;

/// Greedy sampler: deterministic arg-max over the logits.
///
/// Accepted tokens are tracked but do not change future selections; the
/// history exists to honor the accept contract and for inspection.
pub struct GreedySampler {
    accepted: Vec<u32>,
}

impl GreedySampler {
    pub fn new() -> Self {
        Self {
            accepted: Vec::new(),
        }
    }

    /// Tokens accepted so far, in order.
    pub fn accepted(&self) -> &[u32] {
        &self.accepted
    }
}

impl Default for GreedySampler {
    fn default() -> Self {
        Self::new()
    }
}

impl Sampler for GreedySampler {
    fn name(&self) -> &str {
        "greedy"
    }

    fn select(&self, logits: &[f32]) -> Option<u32> {
        let mut best: Option<(u32, f32)> = None;
        for (id, &logit) in logits.iter().enumerate() {
            if logit.is_nan() {
                continue;
            }
            match best {
                // Strict comparison keeps the lowest token id on ties.
                Some((_, top)) if logit <= top => {}
                _ => best = Some((id as u32, logit)),
            }
        }
        best.map(|(id, _)| id)
    }

    fn accept(&mut self, token: u32) {
        self.accepted.push(token);
    }

    fn reset(&mut self) {
        self.accepted.clear();
    }
}
