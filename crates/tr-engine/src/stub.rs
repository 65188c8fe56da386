use std::path::Path;

use tracing::warn;

use crate::engine::{Engine, Model, ModelOptions};

/// Engine used when no numeric backend is linked into the build. Every model
/// load fails, so callers fall back to their "model unavailable" path.
pub struct StubEngine;

impl Engine for StubEngine {
    fn backend_init(&self) {}

    fn backend_shutdown(&self) {}

    fn load_model(&self, path: &Path, _options: &ModelOptions) -> Option<Box<dyn Model>> {
        warn!(path = %path.display(), "no model engine linked, model loading skipped");
        None
    }
}
