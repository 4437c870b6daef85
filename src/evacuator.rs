/// The Cheney-style copying algorithm: evacuates a source space's live
/// objects into a target space's object and byte-array segments,
/// breadth-first, fixing up every reference that points into the source
/// as it goes. Structured the same way any copying collector's scavenge
/// routine is: seed the target from roots, drain a scan cursor across
/// it, reset the source — generalized here to an arbitrary source/target
/// pair plus the newer-generation fixups a full four-space graph needs.
use crate::errors::{fatal, HeapError};
use crate::heap::Heap;
use crate::model::{ObjectModel, ValueModel};

impl<'a, O: ObjectModel, V: ValueModel> Heap<'a, O, V> {
    /// Evacuates every live object reachable from `s`'s roots into `t`,
    /// then resets `s`. `newer_links` are spaces strictly younger than
    /// `s` whose object segments may still hold raw (barrier-exempt)
    /// references into `s` that must be rewritten in place.
    pub(crate) fn evacuate(&mut self, s: usize, t: usize, newer_links: &[usize]) {
        if self.spaces[s].used() > self.spaces[t].free() {
            let mut links = newer_links.to_vec();
            links.push(s);
            self.collect_garbage(t, self.spaces[s].used(), &links);
            if self.spaces[s].used() > self.spaces[t].free() {
                fatal(HeapError::Unsatisfiable {
                    space: self.spaces[t].name(),
                    requested: self.spaces[s].used(),
                    available: self.spaces[t].free(),
                });
            }
        }

        if self.config.gc_verbose {
            eprintln!(
                "[gc] evacuating {} -> {} ({} bytes live)",
                self.spaces[s].name(),
                self.spaces[t].name(),
                self.spaces[s].used()
            );
        }

        self.evacuate_roots_from_activation_stack(s, t);
        self.evacuate_roots_from_tracked_handles(s, t);
        self.evacuate_remembered_set(s, t);
        self.evacuate_newer_generation_links(s, t, newer_links);
        self.cheney_scan(s, t);
        self.run_finalizers_for_the_dead(s);
        self.fixup_remembered_sets_in_newer_generations(s, newer_links);

        self.spaces[s].reset();
    }

    /// Roots held one-per-activation on the mutator's call stack. Taken
    /// out of `self` for the duration so `evacuate_word` can still
    /// borrow `self` mutably.
    fn evacuate_roots_from_activation_stack(&mut self, s: usize, t: usize) {
        let mut stack = self.activation_stack.take();
        if let Some(stack) = stack.as_deref_mut() {
            for i in 0..stack.len() {
                let word = stack.root(i);
                let new_word = self.evacuate_word(s, t, word);
                stack.set_root(i, new_word);
            }
        }
        self.activation_stack = stack;
    }

    /// External roots pinned via the handle table. Each surviving cell
    /// is re-registered in `t`'s tracked set under the same cell id.
    fn evacuate_roots_from_tracked_handles(&mut self, s: usize, t: usize) {
        for id in self.spaces[s].tracked_snapshot() {
            let current = self.handles.get(id);
            let new_value = self.evacuate_word(s, t, current);
            self.handles.set(id, new_value);
            self.spaces[t].track(id);
        }
    }

    /// Objects in other spaces recorded as referencing into `s` by the
    /// write barrier. Every entry must still name at least one live
    /// reference into `s` — a barrier entry with none is a bookkeeping
    /// bug, not a runtime condition to absorb.
    fn evacuate_remembered_set(&mut self, s: usize, t: usize) {
        for (addr, size) in self.spaces[s].remembered_snapshot() {
            let mut found_reference_into_source = false;
            let payload_words = (size - O::HEADER_BYTES) / 8;
            let payload_start = addr + O::HEADER_BYTES;
            for i in 0..payload_words {
                let word_ptr = (payload_start + i * 8) as *mut u64;
                let word = unsafe { *word_ptr };
                if self.word_points_into(s, word) {
                    found_reference_into_source = true;
                    let new_word = self.evacuate_word(s, t, word);
                    unsafe { *word_ptr = new_word };
                }
            }
            assert!(
                found_reference_into_source,
                "stale remembered-set entry: object at {addr:#x} in {} names no reference into {}",
                self.spaces[t].name(),
                self.spaces[s].name(),
            );
            self.spaces[t].remember(addr, size);
        }
    }

    /// Spaces strictly younger than `s` may hold raw references into `s`
    /// that the write barrier never recorded, because younger→older
    /// references need no barrier. Their entire object segments are
    /// scanned word by word and rewritten.
    fn evacuate_newer_generation_links(&mut self, s: usize, t: usize, newer_links: &[usize]) {
        for &link in newer_links {
            let mut addr = self.spaces[link].start();
            let end = self.spaces[link].object_cursor();
            while addr < end {
                let word_ptr = addr as *mut u64;
                let word = unsafe { *word_ptr };
                let new_word = self.evacuate_word(s, t, word);
                if new_word != word {
                    unsafe { *word_ptr = new_word };
                }
                addr += 8;
            }
        }
    }

    /// The Cheney breadth-first scan loop. Walks `t`'s object segment
    /// starting from wherever the earlier root/remembered-set phases
    /// left it, evacuating any reference into `s` found along the way;
    /// newly copied objects extend the scan bound, so the loop drains
    /// until nothing new has been appended.
    fn cheney_scan(&mut self, s: usize, t: usize) {
        let mut scan = self.spaces[t].object_cursor();
        while scan < self.spaces[t].object_cursor() {
            let word_ptr = scan as *mut u64;
            let word = unsafe { *word_ptr };
            let new_word = self.evacuate_word(s, t, word);
            if new_word != word {
                unsafe { *word_ptr = new_word };
            }
            scan += 8;
        }
    }

    /// Anything still in `s`'s finalization set once every earlier phase
    /// has run never got forwarded, so it's dead; run its finalizer now.
    /// Entries for survivors were already moved to `t`'s finalization
    /// set by `evacuate_object`.
    fn run_finalizers_for_the_dead(&mut self, s: usize) {
        for addr in self.spaces[s].finalization_snapshot() {
            unsafe { O::finalize(addr as *mut u8) };
        }
    }

    /// Remembered-set entries in newer generations may key off an
    /// address that lived in `s` and has now moved or died; rewrite
    /// survivors to their new address, drop entries for the dead.
    fn fixup_remembered_sets_in_newer_generations(&mut self, s: usize, newer_links: &[usize]) {
        for &link in newer_links {
            for (addr, size) in self.spaces[link].remembered_snapshot() {
                if !self.spaces[s].object_segment_contains(addr) {
                    continue;
                }
                let forwarded = unsafe { O::is_forwarding(addr as *const u8) };
                self.spaces[link]
                    .forget(addr)
                    .expect("entry just came from this space's own snapshot");
                if forwarded {
                    let new_addr = unsafe { O::forwarding_address(addr as *const u8) };
                    self.spaces[link].remember(new_addr, size);
                }
            }
        }
    }

    /// Evacuates a single machine word if it is a reference into `s`;
    /// otherwise returns it unchanged. The segment-containment check
    /// also protects against the scans above, which read raw memory
    /// without regard to object boundaries: a header or finalizer tag
    /// word that happens to satisfy `ValueModel::is_reference` is
    /// harmless unless its bit pattern also falls inside `s`'s buffer.
    fn evacuate_word(&mut self, s: usize, t: usize, word: u64) -> u64 {
        if !V::is_reference(word) {
            return word;
        }
        let addr = V::address(word);
        if self.spaces[s].object_segment_contains(addr) {
            V::from_address(self.evacuate_object(s, t, addr))
        } else if self.spaces[s].byte_array_segment_contains(addr) {
            V::from_address(self.evacuate_bytes(t, addr))
        } else {
            word
        }
    }

    fn word_points_into(&self, s: usize, word: u64) -> bool {
        V::is_reference(word) && self.spaces[s].contains(V::address(word))
    }

    /// Evacuates the object at `addr` in `s` into `t`, or returns its
    /// existing forwarding address if another reference already copied
    /// it.
    fn evacuate_object(&mut self, s: usize, t: usize, addr: usize) -> usize {
        unsafe {
            if O::is_forwarding(addr as *const u8) {
                return O::forwarding_address(addr as *const u8);
            }

            let size = O::size_in_bytes(addr as *const u8);
            let new_addr = self.spaces[t].try_allocate_object(size).unwrap_or_else(|| {
                fatal(HeapError::Unsatisfiable {
                    space: self.spaces[t].name(),
                    requested: size,
                    available: self.spaces[t].free(),
                })
            });
            std::ptr::copy_nonoverlapping(addr as *const u8, new_addr as *mut u8, size);
            O::set_forwarding_address(addr as *mut u8, new_addr);

            if self.spaces[s].needs_finalization(addr) {
                self.spaces[s]
                    .unmark_finalizable(addr)
                    .expect("address was just confirmed present");
                self.spaces[t].mark_finalizable(new_addr);
            }

            new_addr
        }
    }

    /// Evacuates the byte array at `addr` in `s` into `t`. Byte arrays
    /// carry no forwarding header, so a reference discovered a second
    /// time is copied again rather than deduplicated — an accepted
    /// consequence of the minimal size-only header.
    fn evacuate_bytes(&mut self, t: usize, addr: usize) -> usize {
        unsafe {
            let size = O::bytes_size(addr as *const u8);
            let new_addr = self.spaces[t].try_allocate_bytes(size).unwrap_or_else(|| {
                fatal(HeapError::Unsatisfiable {
                    space: self.spaces[t].name(),
                    requested: size,
                    available: self.spaces[t].free(),
                })
            });
            std::ptr::copy_nonoverlapping(addr as *const u8, new_addr as *mut u8, size);
            new_addr
        }
    }
}
