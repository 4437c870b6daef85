/// A contiguous byte region with two bump pointers growing toward each
/// other: an object segment from the low end, a byte-array segment from
/// the high end. Owns its remembered set, finalization set, and tracked
/// set.
use crate::errors::HeapError;
use crate::model::ObjectModel;
use std::alloc::{alloc, dealloc, Layout};
use std::collections::{HashMap, HashSet};
use std::marker::PhantomData;

/// Fill byte used to scrub freshly bump-allocated memory in debug builds,
/// so an uninitialized read shows up as an obviously wrong value rather
/// than whatever bytes happened to be left over.
pub const SCRUB_BYTE: u8 = 0xAB;

const ALIGN: usize = 8;

/// The part of a `Space` that migrates wholesale during a swap.
/// Isolated into its own struct so `swap_with` is a single
/// `mem::swap` rather than nine field-by-field swaps that could drift out
/// of sync if a new auxiliary set is ever added.
struct Memory {
    ptr: *mut u8,
    layout: Layout,
    start: usize,
    end: usize,
    object_cursor: usize,
    byte_array_cursor: usize,
    remembered_set: HashMap<usize, usize>,
    finalization_set: HashSet<usize>,
    tracked_set: HashSet<usize>,
}

impl Memory {
    fn new(space_name: &'static str, capacity: usize) -> Result<Self, HeapError> {
        assert!(capacity % ALIGN == 0, "space capacity must be word-aligned");
        let layout = Layout::from_size_align(capacity.max(1), ALIGN)
            .expect("capacity + alignment must form a valid layout");
        let ptr = unsafe { alloc(layout) };
        if ptr.is_null() {
            return Err(HeapError::OutOfMemory {
                space: space_name,
                requested: capacity,
            });
        }
        let start = ptr as usize;
        let end = start + capacity;
        Ok(Memory {
            ptr,
            layout,
            start,
            end,
            object_cursor: start,
            byte_array_cursor: end,
            remembered_set: HashMap::new(),
            finalization_set: HashSet::new(),
            tracked_set: HashSet::new(),
        })
    }
}

impl Drop for Memory {
    fn drop(&mut self) {
        unsafe { dealloc(self.ptr, self.layout) };
    }
}

pub struct Space<O, V> {
    name: &'static str,
    scavenge_target: Option<usize>,
    tenure_target: Option<usize>,
    scrub_on_alloc: bool,
    mem: Memory,
    _marker: PhantomData<(O, V)>,
}

impl<O: ObjectModel, V> Space<O, V> {
    pub fn new(name: &'static str, capacity: usize, scrub_on_alloc: bool) -> Result<Self, HeapError> {
        Ok(Space {
            name,
            scavenge_target: None,
            tenure_target: None,
            scrub_on_alloc,
            mem: Memory::new(name, capacity)?,
            _marker: PhantomData,
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn scavenge_target(&self) -> Option<usize> {
        self.scavenge_target
    }

    pub fn set_scavenge_target(&mut self, target: Option<usize>) {
        self.scavenge_target = target;
    }

    pub fn tenure_target(&self) -> Option<usize> {
        self.tenure_target
    }

    pub fn set_tenure_target(&mut self, target: Option<usize>) {
        self.tenure_target = target;
    }

    pub fn capacity(&self) -> usize {
        self.mem.end - self.mem.start
    }

    pub fn free(&self) -> usize {
        self.mem.byte_array_cursor - self.mem.object_cursor
    }

    pub fn used(&self) -> usize {
        self.capacity() - self.free()
    }

    pub fn object_cursor(&self) -> usize {
        self.mem.object_cursor
    }

    pub fn byte_array_cursor(&self) -> usize {
        self.mem.byte_array_cursor
    }

    pub fn start(&self) -> usize {
        self.mem.start
    }

    pub fn end(&self) -> usize {
        self.mem.end
    }

    pub fn object_segment_contains(&self, addr: usize) -> bool {
        addr >= self.mem.start && addr < self.mem.object_cursor
    }

    pub fn byte_array_segment_contains(&self, addr: usize) -> bool {
        addr >= self.mem.byte_array_cursor && addr < self.mem.end
    }

    pub fn contains(&self, addr: usize) -> bool {
        self.object_segment_contains(addr) || self.byte_array_segment_contains(addr)
    }

    /// Bump-allocate `size` bytes in the object segment without
    /// triggering garbage collection. `None` means "ask the heap to
    /// collect and retry".
    pub fn try_allocate_object(&mut self, size: usize) -> Option<usize> {
        debug_assert!(size > 0 && size % ALIGN == 0, "allocation size must be a positive multiple of 8");
        if self.free() < size {
            return None;
        }
        let addr = self.mem.object_cursor;
        if self.scrub_on_alloc {
            unsafe { std::ptr::write_bytes(addr as *mut u8, SCRUB_BYTE, size) };
        }
        self.mem.object_cursor += size;
        Some(addr)
    }

    /// Bump-allocate `size` bytes in the byte-array segment (grows
    /// downward from the high end). Same contract as
    /// `try_allocate_object` otherwise.
    pub fn try_allocate_bytes(&mut self, size: usize) -> Option<usize> {
        debug_assert!(size > 0 && size % ALIGN == 0, "allocation size must be a positive multiple of 8");
        if self.free() < size {
            return None;
        }
        let addr = self.mem.byte_array_cursor - size;
        if self.scrub_on_alloc {
            unsafe { std::ptr::write_bytes(addr as *mut u8, SCRUB_BYTE, size) };
        }
        self.mem.byte_array_cursor = addr;
        Some(addr)
    }

    // -- remembered set ----------------------------------------------------

    pub fn remember(&mut self, addr: usize, size: usize) {
        self.mem.remembered_set.insert(addr, size);
    }

    pub fn forget(&mut self, addr: usize) -> Result<(), HeapError> {
        self.mem
            .remembered_set
            .remove(&addr)
            .map(|_| ())
            .ok_or(HeapError::NotInSet { space: self.name, set: "remembered", address: addr })
    }

    pub fn remembered_size(&self, addr: usize) -> Option<usize> {
        self.mem.remembered_set.get(&addr).copied()
    }

    pub fn remembered_iter(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.mem.remembered_set.iter().map(|(&a, &s)| (a, s))
    }

    pub fn remembered_snapshot(&self) -> Vec<(usize, usize)> {
        self.remembered_iter().collect()
    }

    // -- finalization set ---------------------------------------------------

    pub fn mark_finalizable(&mut self, addr: usize) {
        self.mem.finalization_set.insert(addr);
    }

    pub fn unmark_finalizable(&mut self, addr: usize) -> Result<(), HeapError> {
        if self.mem.finalization_set.remove(&addr) {
            Ok(())
        } else {
            Err(HeapError::NotInSet { space: self.name, set: "finalization", address: addr })
        }
    }

    pub fn needs_finalization(&self, addr: usize) -> bool {
        self.mem.finalization_set.contains(&addr)
    }

    pub fn finalization_snapshot(&self) -> Vec<usize> {
        self.mem.finalization_set.iter().copied().collect()
    }

    // -- tracked set (external handles) -------------------------------------

    pub fn track(&mut self, addr: usize) {
        self.mem.tracked_set.insert(addr);
    }

    pub fn untrack(&mut self, addr: usize) -> Result<(), HeapError> {
        if self.mem.tracked_set.remove(&addr) {
            Ok(())
        } else {
            Err(HeapError::NotInSet { space: self.name, set: "tracked", address: addr })
        }
    }

    pub fn tracked_snapshot(&self) -> Vec<usize> {
        self.mem.tracked_set.iter().copied().collect()
    }

    /// Exchange all identity-following-memory state with `other`: buffer,
    /// both cursors, and all three auxiliary sets. Names and targets stay
    /// put — "this is eden" is a property of the `Space` value, not of
    /// whichever buffer it currently owns.
    pub fn swap_with(&mut self, other: &mut Self) {
        std::mem::swap(&mut self.mem, &mut other.mem);
    }

    /// Zero both cursors and clear all three auxiliary sets, retaining
    /// their allocated capacity. Called once a collection has fully
    /// evacuated this space.
    pub fn reset(&mut self) {
        self.mem.object_cursor = self.mem.start;
        self.mem.byte_array_cursor = self.mem.end;
        self.mem.remembered_set.clear();
        self.mem.finalization_set.clear();
        self.mem.tracked_set.clear();
    }
}
