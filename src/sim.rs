/// A ready-made implementation of the three capability traits in
/// `model`. Used by this crate's own tests and available to any
/// embedding that doesn't need a custom object layout.
///
/// ## Word encoding (`SimValue`)
///
/// One tag bit, not a full NaN box: bit 0 clear means the word *is* a
/// heap address (addresses are always word-aligned, so bit 0 is free);
/// bit 0 set means an immediate (nil, or a signed 63-bit integer). This
/// is the classic Smalltalk/Self tagged-pointer scheme — simpler than
/// NaN-boxing because there is no need to also tag floats here, just
/// tell references apart from everything else.
///
/// ## Object layout (`SimObjectModel`)
///
/// 16-byte header:
///   word 0 — control word: bit 63 set means "forwarding", and the
///     remaining 63 bits are the forwarding address; bit 63 clear means
///     the remaining bits are `size_in_bytes` (header + payload).
///   word 1 — finalizer tag: 0 means no finalizer; any other value is
///     recorded into a thread-local log when `finalize` runs, so tests
///     can assert exactly-once finalization without a real interpreter.
///
/// Byte arrays carry only an 8-byte size header: no forwarding bit, no
/// finalizer slot.
use crate::model::{ActivationStack, ObjectModel, ValueModel};
use std::cell::RefCell;

const FORWARD_BIT: u64 = 1 << 63;

pub struct SimObjectModel;

impl ObjectModel for SimObjectModel {
    const HEADER_BYTES: usize = 16;

    unsafe fn size_in_bytes(header: *const u8) -> usize {
        let word = *(header as *const u64);
        debug_assert!(word & FORWARD_BIT == 0, "size_in_bytes on a forwarded object");
        word as usize
    }

    unsafe fn is_forwarding(header: *const u8) -> bool {
        (*(header as *const u64)) & FORWARD_BIT != 0
    }

    unsafe fn forwarding_address(header: *const u8) -> usize {
        let word = *(header as *const u64);
        debug_assert!(word & FORWARD_BIT != 0, "forwarding_address on a non-forwarded object");
        (word & !FORWARD_BIT) as usize
    }

    unsafe fn set_forwarding_address(header: *mut u8, target: usize) {
        *(header as *mut u64) = FORWARD_BIT | (target as u64);
    }

    unsafe fn finalize(header: *mut u8) {
        let tag = *((header as *mut u64).add(1));
        if tag != 0 {
            FINALIZED.with(|log| log.borrow_mut().push(tag));
        }
    }

    unsafe fn bytes_size(header: *const u8) -> usize {
        *(header as *const u64) as usize
    }
}

thread_local! {
    static FINALIZED: RefCell<Vec<u64>> = RefCell::new(Vec::new());
}

/// Addresses whose finalizer has run so far, in call order, without
/// clearing the log.
pub fn finalized_log() -> Vec<u64> {
    FINALIZED.with(|log| log.borrow().clone())
}

pub fn clear_finalized_log() {
    FINALIZED.with(|log| log.borrow_mut().clear());
}

/// Write a fresh (non-forwarded) object header + payload at `addr`.
/// `payload` words are written verbatim after the header; `finalizer_tag`
/// of 0 means "no finalizer".
///
/// # Safety
/// `addr` must be a writable region at least
/// `SimObjectModel::HEADER_BYTES + payload.len() * 8` bytes long.
pub unsafe fn write_object(addr: usize, payload: &[u64], finalizer_tag: u64) {
    let base = addr as *mut u64;
    let total = SimObjectModel::HEADER_BYTES + payload.len() * 8;
    *base = total as u64;
    *base.add(1) = finalizer_tag;
    let slots = base.add(2);
    for (i, word) in payload.iter().enumerate() {
        *slots.add(i) = *word;
    }
}

/// Read one payload slot (0-indexed, after the 16-byte header) back out.
///
/// # Safety
/// `addr` must point at a live, non-forwarded `SimObjectModel` object
/// with at least `slot + 1` payload words.
pub unsafe fn read_slot(addr: usize, slot: usize) -> u64 {
    let base = addr as *const u64;
    *base.add(2 + slot)
}

/// Write a byte array's size header (no payload copy — callers may write
/// the bytes themselves after the header if they need specific content).
///
/// # Safety
/// `addr` must be writable for at least 8 bytes.
pub unsafe fn write_bytes_header(addr: usize, total_size: usize) {
    *(addr as *mut u64) = total_size as u64;
}

/// Tagged-pointer word encoding used by the simulation model.
pub struct SimValue;

impl SimValue {
    pub const NIL: u64 = 1;

    pub fn int(n: i64) -> u64 {
        ((n as u64) << 1) | 1
    }

    pub fn int_value(word: u64) -> i64 {
        (word as i64) >> 1
    }

    pub fn is_int(word: u64) -> bool {
        word & 1 == 1 && word != Self::NIL
    }
}

impl ValueModel for SimValue {
    fn is_reference(word: u64) -> bool {
        word & 1 == 0 && word != 0
    }

    fn address(word: u64) -> usize {
        word as usize
    }

    fn from_address(addr: usize) -> u64 {
        addr as u64
    }
}

/// A flat `Vec<u64>` activation stack, one root word per activation.
#[derive(Debug, Default)]
pub struct SimActivationStack(pub Vec<u64>);

impl SimActivationStack {
    pub fn new() -> Self {
        SimActivationStack(Vec::new())
    }

    pub fn push(&mut self, root: u64) {
        self.0.push(root);
    }
}

impl ActivationStack for SimActivationStack {
    fn len(&self) -> usize {
        self.0.len()
    }

    fn root(&self, index: usize) -> u64 {
        self.0[index]
    }

    fn set_root(&mut self, index: usize, value: u64) {
        self.0[index] = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sim_value_tagging_round_trips() {
        assert!(SimValue::is_reference(0x1000));
        assert!(!SimValue::is_reference(SimValue::NIL));
        assert!(!SimValue::is_reference(SimValue::int(42)));
        assert_eq!(SimValue::int_value(SimValue::int(-7)), -7);
        assert_eq!(SimValue::from_address(0x2000), 0x2000);
        assert_eq!(SimValue::address(0x2000), 0x2000);
    }

    #[test]
    fn object_header_round_trips() {
        let mut buf = vec![0u8; 64];
        let addr = buf.as_mut_ptr() as usize;
        unsafe {
            write_object(addr, &[SimValue::int(1), SimValue::NIL], 0);
            assert!(!SimObjectModel::is_forwarding(addr as *const u8));
            assert_eq!(SimObjectModel::size_in_bytes(addr as *const u8), 16 + 16);
            assert_eq!(read_slot(addr, 0), SimValue::int(1));

            SimObjectModel::set_forwarding_address(addr as *mut u8, 0xABCD);
            assert!(SimObjectModel::is_forwarding(addr as *const u8));
            assert_eq!(SimObjectModel::forwarding_address(addr as *const u8), 0xABCD);
        }
    }

    #[test]
    fn finalizer_runs_and_is_logged() {
        clear_finalized_log();
        let mut buf = vec![0u8; 32];
        let addr = buf.as_mut_ptr() as usize;
        unsafe {
            write_object(addr, &[], 99);
            SimObjectModel::finalize(addr as *mut u8);
        }
        assert_eq!(finalized_log(), vec![99]);
        clear_finalized_log();
    }
}
