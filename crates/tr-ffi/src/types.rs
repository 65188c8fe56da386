/// Status codes returned by the C surface.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrStatus {
    Ok = 0,
    /// The call succeeded but generation produced no visible output; no
    /// string was written.
    OkEmpty = 1,
    ErrorInvalidArgument = 2,
    /// The handle is 0, stale, or was already released.
    ErrorInvalidHandle = 3,
    ErrorGenerate = 4,
    ErrorInternal = 5,
}

// Model-load failure has no status of its own: `tr_init` reports it with a
// 0 handle and the message behind `tr_last_error`.

/// Opaque handle to one loaded model/context pair. 0 is never valid and is
/// returned by `tr_init` on failure.
pub type TrHandle = u64;
