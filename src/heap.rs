/// The top-level composition of eden, from-space, to-space, old-space,
/// and the handle table. Chooses which space to allocate into, wires the
/// scavenge/tenure target graph, and services mutator requests — the
/// object a VM embeds and calls into for every allocation, collection,
/// and root-tracking request.
use crate::config::HeapConfig;
use crate::errors::{fatal, HeapError};
use crate::handles::{HandleArena, Tracked};
use crate::model::{ActivationStack, ObjectModel, ValueModel};
use crate::space::Space;
use std::marker::PhantomData;

pub(crate) const EDEN: usize = 0;
pub(crate) const FROM: usize = 1;
pub(crate) const TO: usize = 2;
pub(crate) const OLD: usize = 3;

pub struct Heap<'a, O: ObjectModel, V: ValueModel> {
    pub(crate) spaces: [Space<O, V>; 4],
    pub(crate) handles: HandleArena,
    pub(crate) activation_stack: Option<&'a mut dyn ActivationStack>,
    pub(crate) config: HeapConfig,
    _marker: PhantomData<(O, V)>,
}

impl<'a, O: ObjectModel, V: ValueModel> Heap<'a, O, V> {
    /// Builds all four spaces in construction order old → from → to →
    /// eden, then wires the scavenge/tenure target graph for the
    /// canonical three-space generation shape.
    pub fn new(config: HeapConfig) -> Result<Self, HeapError> {
        let old = Space::new("old", config.old_space_capacity, config.scrub_on_alloc)?;
        let from = Space::new("from", config.semispace_capacity, config.scrub_on_alloc)?;
        let to = Space::new("to", config.semispace_capacity, config.scrub_on_alloc)?;
        let eden = Space::new("eden", config.eden_capacity, config.scrub_on_alloc)?;

        let mut spaces = [eden, from, to, old];
        spaces[EDEN].set_tenure_target(Some(FROM));
        spaces[FROM].set_scavenge_target(Some(TO));
        spaces[FROM].set_tenure_target(Some(OLD));

        Ok(Heap {
            spaces,
            handles: HandleArena::new(),
            activation_stack: None,
            config,
            _marker: PhantomData,
        })
    }

    pub fn eden(&self) -> &Space<O, V> {
        &self.spaces[EDEN]
    }

    pub fn from_space(&self) -> &Space<O, V> {
        &self.spaces[FROM]
    }

    pub fn to_space(&self) -> &Space<O, V> {
        &self.spaces[TO]
    }

    pub fn old_space(&self) -> &Space<O, V> {
        &self.spaces[OLD]
    }

    pub fn config(&self) -> &HeapConfig {
        &self.config
    }

    pub fn set_activation_stack(&mut self, stack: Option<&'a mut dyn ActivationStack>) {
        self.activation_stack = stack;
    }

    /// Allocate an object in eden, collecting first if eden cannot
    /// satisfy the request.
    pub fn allocate_object(&mut self, size_bytes: usize) -> usize {
        assert!(size_bytes > 0 && size_bytes % 8 == 0, "allocate_object: size must be a positive multiple of 8");
        if let Some(addr) = self.spaces[EDEN].try_allocate_object(size_bytes) {
            return addr;
        }
        self.collect_garbage(EDEN, size_bytes, &[]);
        self.spaces[EDEN]
            .try_allocate_object(size_bytes)
            .expect("eden must satisfy the request immediately after a successful collection")
    }

    /// Allocate a byte array in eden's byte-array segment, same contract
    /// as `allocate_object` otherwise.
    pub fn allocate_bytes(&mut self, size_bytes: usize) -> usize {
        assert!(size_bytes > 0 && size_bytes % 8 == 0, "allocate_bytes: size must be a positive multiple of 8");
        if let Some(addr) = self.spaces[EDEN].try_allocate_bytes(size_bytes) {
            return addr;
        }
        self.collect_garbage(EDEN, size_bytes, &[]);
        self.spaces[EDEN]
            .try_allocate_bytes(size_bytes)
            .expect("eden must satisfy the request immediately after a successful collection")
    }

    /// Force a collection now if eden cannot satisfy `size_bytes`, so a
    /// following sequence of allocations is guaranteed not to collect
    /// mid-sequence.
    pub fn ensure_space_in_eden(&mut self, size_bytes: usize) {
        self.collect_garbage(EDEN, size_bytes, &[]);
    }

    /// Marks `address` — which must still be in eden's object segment —
    /// as requiring a finalizer callback if it does not survive the next
    /// collection.
    pub fn mark_needs_finalization(&mut self, address: usize) {
        debug_assert!(
            self.spaces[EDEN].object_segment_contains(address),
            "mark_needs_finalization: address {address:#x} is not in eden's object segment"
        );
        self.spaces[EDEN].mark_finalizable(address);
    }

    /// Registers `value` as an external root. Literals are copied inline
    /// and need no cell; references get a fresh arena cell registered in
    /// whichever space currently owns the address.
    pub fn track(&mut self, value: u64) -> Tracked {
        if !V::is_reference(value) {
            return Tracked::Literal(value);
        }
        let addr = V::address(value);
        let owner = self
            .find_space_any(addr)
            .expect("track: address is not located in any known space");
        let id = self.handles.alloc(value);
        self.spaces[owner].track(id);
        Tracked::Reference(id)
    }

    /// Releases an external root. No-op for literals.
    pub fn untrack(&mut self, tracked: Tracked) {
        if let Tracked::Reference(id) = tracked {
            let addr = V::address(self.handles.get(id));
            let owner = self
                .find_space_any(addr)
                .expect("untrack: address is not located in any known space");
            self.spaces[owner]
                .untrack(id)
                .expect("untrack: handle cell was not registered in its owning space's tracked set");
        }
    }

    /// Dereferences a tracked value: the literal, or the cell's current
    /// address for a reference.
    pub fn read(&self, tracked: &Tracked) -> u64 {
        match *tracked {
            Tracked::Literal(word) => word,
            Tracked::Reference(id) => self.handles.get(id),
        }
    }

    /// Write barrier: record that `referrer` (which must be a reference)
    /// holds a slot containing `target`, if that crosses from an
    /// older-or-equal generation into a strictly younger one.
    /// Older→older and younger→older references need no record.
    pub fn remember_object_reference(&mut self, referrer: u64, target: u64) {
        if !V::is_reference(target) {
            return;
        }
        assert!(V::is_reference(referrer), "barrier precondition violated: referrer is not a reference");

        let referrer_addr = V::address(referrer);
        let target_addr = V::address(target);
        let referrer_space = self
            .find_space_for_barrier(referrer_addr)
            .expect("barrier precondition violated: referrer is not located in eden, from-space, or old-space");
        let target_space = self
            .find_space_for_barrier(target_addr)
            .expect("barrier precondition violated: target is not located in eden, from-space, or old-space");

        if generation_rank(referrer_space) >= generation_rank(target_space) {
            return;
        }

        let size = unsafe { O::size_in_bytes(referrer_addr as *const u8) };
        self.spaces[target_space].remember(referrer_addr, size);
    }

    /// Collection policy: try a scavenge into the scavenge target first,
    /// then a tenure into the tenure target, failing fatally if neither
    /// frees enough room. `newer_links` names spaces younger than `s`
    /// whose object segments may hold references into `s` that must be
    /// fixed up as `s`'s survivors move — populated by recursive calls
    /// from `evacuate` (evacuator.rs), empty for a top-level request.
    pub(crate) fn collect_garbage(&mut self, s: usize, required: usize, newer_links: &[usize]) {
        if self.spaces[s].free() >= required {
            return;
        }

        if let Some(scavenge_target) = self.spaces[s].scavenge_target() {
            self.evacuate(s, scavenge_target, newer_links);
            self.swap_spaces(s, scavenge_target);
            if self.spaces[s].free() >= required {
                return;
            }
        }

        if let Some(tenure_target) = self.spaces[s].tenure_target() {
            self.evacuate(s, tenure_target, newer_links);
            if self.spaces[s].free() >= required {
                return;
            }
            fatal(HeapError::Unsatisfiable {
                space: self.spaces[s].name(),
                requested: required,
                available: self.spaces[s].free(),
            });
        }

        // No targets: the space would need to grow, which is unimplemented.
        fatal(HeapError::Unsatisfiable {
            space: self.spaces[s].name(),
            requested: required,
            available: self.spaces[s].free(),
        });
    }

    pub(crate) fn swap_spaces(&mut self, a: usize, b: usize) {
        let (lo, hi) = if a < b { (a, b) } else { (b, a) };
        let (left, right) = self.spaces.split_at_mut(hi);
        left[lo].swap_with(&mut right[0]);
    }

    fn find_space_any(&self, addr: usize) -> Option<usize> {
        [EDEN, FROM, TO, OLD].into_iter().find(|&idx| self.spaces[idx].contains(addr))
    }

    fn find_space_for_barrier(&self, addr: usize) -> Option<usize> {
        [EDEN, FROM, OLD]
            .into_iter()
            .find(|&idx| self.spaces[idx].object_segment_contains(addr))
    }
}

/// Generational order: eden is youngest, old-space is oldest. To-space
/// is never a barrier endpoint during ordinary mutation (it only ever
/// holds scavenge-in-flight copies), so it shares from-space's rank.
fn generation_rank(space_idx: usize) -> u8 {
    match space_idx {
        EDEN => 0,
        FROM | TO => 1,
        OLD => 2,
        _ => unreachable!("no such space index"),
    }
}

impl<'a, O: ObjectModel, V: ValueModel> Drop for Heap<'a, O, V> {
    /// Runs every finalizer still outstanding at teardown, space by
    /// space in reverse construction order: eden, to, from, old.
    fn drop(&mut self) {
        for &idx in &[EDEN, TO, FROM, OLD] {
            for addr in self.spaces[idx].finalization_snapshot() {
                unsafe { O::finalize(addr as *mut u8) };
            }
        }
    }
}
