use std::sync::{Arc, Mutex, PoisonError};

use tr_core::LlmContext;

use crate::types::TrHandle;

/// One table slot. The generation counter is bumped on every release so a
/// stale handle stops resolving instead of aliasing whatever context reuses
/// the slot later.
struct Slot {
    generation: u32,
    ctx: Option<Arc<Mutex<LlmContext>>>,
}

/// Table mapping opaque integer handles to live contexts.
///
/// A handle packs a slot index (low 32 bits, offset by 1 so 0 stays the null
/// sentinel) with the slot's generation counter (high 32 bits). Each context
/// sits behind its own mutex, which also enforces the one-in-flight-call-
/// per-handle contract.
pub struct HandleTable {
    slots: Mutex<Vec<Slot>>,
}

impl HandleTable {
    pub const fn new() -> Self {
        Self {
            slots: Mutex::new(Vec::new()),
        }
    }

    /// Insert a context and hand out its packed handle.
    pub fn insert(&self, ctx: LlmContext) -> TrHandle {
        let ctx = Arc::new(Mutex::new(ctx));
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(index) = slots.iter().position(|s| s.ctx.is_none()) {
            slots[index].ctx = Some(ctx);
            return pack(index, slots[index].generation);
        }
        slots.push(Slot {
            generation: 1,
            ctx: Some(ctx),
        });
        pack(slots.len() - 1, 1)
    }

    /// Resolve a handle to its context, or `None` when the handle is null,
    /// stale, or already released.
    pub fn resolve(&self, handle: TrHandle) -> Option<Arc<Mutex<LlmContext>>> {
        let (index, generation) = unpack(handle)?;
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        let slot = slots.get(index)?;
        if slot.generation != generation {
            return None;
        }
        slot.ctx.clone()
    }

    /// Remove a handle's context from the table. The context is freed once
    /// the last outstanding reference (an in-flight call, at most) drops.
    pub fn remove(&self, handle: TrHandle) -> Option<Arc<Mutex<LlmContext>>> {
        let (index, generation) = unpack(handle)?;
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        let slot = slots.get_mut(index)?;
        if slot.generation != generation {
            return None;
        }
        let ctx = slot.ctx.take()?;
        slot.generation = slot.generation.wrapping_add(1).max(1);
        Some(ctx)
    }
}

fn pack(index: usize, generation: u32) -> TrHandle {
    ((generation as u64) << 32) | (index as u64 + 1)
}

fn unpack(handle: TrHandle) -> Option<(usize, u32)> {
    let index = (handle & 0xFFFF_FFFF) as usize;
    if index == 0 {
        return None;
    }
    Some((index - 1, (handle >> 32) as u32))
}
