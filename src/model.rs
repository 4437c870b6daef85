/// The three capabilities the core requires from external collaborators:
/// an object header, a value tag, and root enumeration. Expressed as
/// traits so `Space`/`Evacuator`/`Heap` are generic over whatever object
/// and value representation an embedding language picks, rather than the
/// collector hard-coding one particular header or tagging scheme.
use std::fmt;

/// Object header capability. Every method is a stateless function over a
/// raw address in a `Space`'s buffer — there is no `&self`, because the
/// object model does not own any state of its own; it only knows how to
/// interpret bytes the GC already owns.
///
/// # Safety
/// Implementors may assume `header` always points at the first word of a
/// live, properly aligned object previously written by the same model.
pub trait ObjectModel {
    /// Bytes occupied by the header before a fixed-layout object's first
    /// payload word. Must be a multiple of the machine word size.
    const HEADER_BYTES: usize;

    /// Total size in bytes of the object (including its header).
    /// Precondition: `!is_forwarding(header)`.
    unsafe fn size_in_bytes(header: *const u8) -> usize;

    /// Whether the header currently encodes a forwarding reference.
    unsafe fn is_forwarding(header: *const u8) -> bool;

    /// The forwarding address. Precondition: `is_forwarding(header)`.
    unsafe fn forwarding_address(header: *const u8) -> usize;

    /// Overwrite the header with a forwarding reference to `target`.
    unsafe fn set_forwarding_address(header: *mut u8, target: usize);

    /// Run the object's finalizer, if it has one. Called at most once per
    /// object, only for addresses the heap's finalization set names.
    unsafe fn finalize(header: *mut u8);

    /// Size in bytes of a byte-array object starting at `header`. Byte
    /// arrays carry no forwarding header, so this is a separate, simpler
    /// read than `size_in_bytes`.
    unsafe fn bytes_size(header: *const u8) -> usize;
}

/// Value tag capability: test whether a machine word encodes a heap
/// reference, extract its address, and rebuild a word from an address.
/// Generalized over whatever tagging scheme an embedding chooses (NaN
/// boxing, low-bit pointer tagging, …) rather than hard-coding one.
pub trait ValueModel {
    fn is_reference(word: u64) -> bool;
    fn address(word: u64) -> usize;
    fn from_address(addr: usize) -> u64;
}

/// Root enumeration capability: an activation stack exposing, per
/// activation, a single root reference the GC may read and overwrite.
/// A real call stack carries far more per frame than this; the trait
/// exposes only the one root slot per activation the collector needs
/// to touch.
pub trait ActivationStack {
    /// Number of live activations.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read activation `index`'s root reference (a raw `ValueModel` word).
    fn root(&self, index: usize) -> u64;

    /// Overwrite activation `index`'s root reference, e.g. after the GC
    /// relocates the object it refers to.
    fn set_root(&mut self, index: usize, value: u64);
}

impl fmt::Debug for dyn ActivationStack + '_ {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ActivationStack(len={})", self.len())
    }
}
