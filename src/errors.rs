/// Heap error types.
///
/// Only one variant here is ever returned to a caller for local recovery:
/// `OutOfMemory`, which reflects the host allocator refusing to hand back
/// the backing buffer for a space. Every other variant models a fatal,
/// unrecoverable condition — it is still a well-typed value so the panic
/// site can format a precise message, but the only sanctioned use is
/// `.expect(...)` or a direct `panic!` built from its `Display`.
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HeapError {
    #[error("out of memory: failed to reserve {requested} bytes for space '{space}'")]
    OutOfMemory { space: &'static str, requested: usize },

    #[error(
        "unsatisfiable allocation: space '{space}' needs {requested} bytes but only \
         {available} are free after collection"
    )]
    Unsatisfiable {
        space: &'static str,
        requested: usize,
        available: usize,
    },

    #[error("address {address:#x} not present in {set} set of space '{space}'")]
    NotInSet {
        space: &'static str,
        set: &'static str,
        address: usize,
    },
}

/// Terminates the process after formatting `err`. Used when an allocation
/// is still unsatisfiable after a collection has run, since there is no
/// well-defined heap state to return to at that point.
pub fn fatal(err: HeapError) -> ! {
    panic!("{err}");
}
