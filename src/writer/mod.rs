//! Serialization: incremental updates and full rewrites

pub mod incremental;
pub mod rewrite;

use crate::parser::ObjectId;

/// A pending object revision: the full new body for `id`, not a delta.
#[derive(Debug, Clone)]
pub struct Patch {
    pub id: ObjectId,
    pub body: Vec<u8>,
}

/// Collapse repeated writes to the same reference, last write wins. The
/// surviving patch keeps the position of its last occurrence so queue order
/// is preserved.
pub fn dedup_last_wins(patches: Vec<Patch>) -> Vec<Patch> {
    let mut survivors: Vec<Patch> = Vec::with_capacity(patches.len());
    for patch in patches {
        survivors.retain(|existing| existing.id != patch.id);
        survivors.push(patch);
    }
    survivors
}
