use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::object::{ObjRef, Object, HEADER_SIZE};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HeapStats {
    pub live_objects: usize,
    pub live_bytes: usize,
    pub limit: usize,
    pub collections: u64,
    pub total_allocated: u64,
    pub total_freed: u64,
}

/// Object arena. A handle is the arena index plus one, freed indices are
/// recycled through `free_list`.
pub struct Heap {
    objects: Vec<Option<Object>>,
    free_list: Vec<usize>,
    used_bytes: usize,
    limit: usize,
    gc_threshold: usize,
    allocated_since_gc: usize,
    gc_stress: Option<u32>,
    allocs_since_gc: u32,
    /// Objects allocated since the interpreter last started an instruction.
    pending: Vec<ObjRef>,
    pinned: HashMap<ObjRef, u32>,
    rng: StdRng,
    collections: u64,
    total_allocated: u64,
    total_freed: u64,
}

impl Heap {
    pub fn new(limit: usize, gc_threshold: usize, gc_stress: Option<u32>, hash_seed: u64) -> Self {
        Self {
            objects: Vec::new(),
            free_list: Vec::new(),
            used_bytes: 0,
            limit,
            gc_threshold,
            allocated_since_gc: 0,
            gc_stress: gc_stress.filter(|n| *n > 0),
            allocs_since_gc: 0,
            pending: Vec::new(),
            pinned: HashMap::new(),
            rng: StdRng::seed_from_u64(hash_seed),
            collections: 0,
            total_allocated: 0,
            total_freed: 0,
        }
    }

    /// Byte size charged for an object with a `payload` byte body.
    #[inline]
    pub fn object_size(payload: usize) -> Option<usize> {
        payload.checked_add(HEADER_SIZE)
    }

    pub fn next_hash(&mut self) -> i32 {
        self.rng.gen_range(1..=i32::MAX)
    }

    /// Whether a collection should run before allocating `size` bytes.
    pub fn wants_collection(&self, size: usize) -> bool {
        if let Some(every) = self.gc_stress {
            if self.allocs_since_gc >= every {
                return true;
            }
        }
        self.allocated_since_gc.saturating_add(size) > self.gc_threshold
    }

    #[inline]
    pub fn fits(&self, size: usize) -> bool {
        self.used_bytes
            .checked_add(size)
            .map_or(false, |total| total <= self.limit)
    }

    pub fn insert(&mut self, object: Object) -> ObjRef {
        let size = object.size();
        self.used_bytes += size;
        self.allocated_since_gc = self.allocated_since_gc.saturating_add(size);
        self.allocs_since_gc = self.allocs_since_gc.saturating_add(1);
        self.total_allocated += 1;
        let index = match self.free_list.pop() {
            Some(index) => {
                self.objects[index] = Some(object);
                index
            }
            None => {
                self.objects.push(Some(object));
                self.objects.len() - 1
            }
        };
        let obj = ObjRef::from_index(index);
        self.pending.push(obj);
        obj
    }

    #[inline]
    pub fn get(&self, obj: ObjRef) -> Option<&Object> {
        self.objects.get(obj.index()).and_then(|o| o.as_ref())
    }

    #[inline]
    pub fn get_mut(&mut self, obj: ObjRef) -> Option<&mut Object> {
        self.objects.get_mut(obj.index()).and_then(|o| o.as_mut())
    }

    #[inline]
    pub fn contains(&self, obj: ObjRef) -> bool {
        self.get(obj).is_some()
    }

    /// Sticky objects are permanent roots: interned strings, class mirrors
    /// and the preallocated `OutOfMemoryError`.
    pub fn set_sticky(&mut self, obj: ObjRef) {
        if let Some(object) = self.get_mut(obj) {
            object.header.sticky = true;
        }
    }

    /// Keeps `obj` alive until the next instruction starts.
    pub fn protect(&mut self, obj: ObjRef) {
        self.pending.push(obj);
    }

    #[inline]
    pub fn clear_pending(&mut self) {
        self.pending.clear();
    }

    pub fn pin(&mut self, obj: ObjRef) {
        *self.pinned.entry(obj).or_insert(0) += 1;
    }

    pub fn unpin(&mut self, obj: ObjRef) {
        if let Some(count) = self.pinned.get_mut(&obj) {
            *count -= 1;
            if *count == 0 {
                self.pinned.remove(&obj);
            }
        }
    }

    /// Visits the roots owned by the heap itself.
    pub(crate) fn trace_roots(&self, visitor: &mut dyn FnMut(ObjRef)) {
        self.pending.iter().for_each(|obj| visitor(*obj));
        self.pinned.keys().for_each(|obj| visitor(*obj));
        for (index, object) in self.objects.iter().enumerate() {
            if matches!(object, Some(o) if o.header.sticky) {
                visitor(ObjRef::from_index(index));
            }
        }
    }

    /// Frees every unmarked object and clears the marks of survivors.
    /// Returns `(freed objects, freed bytes)`.
    pub(crate) fn sweep(&mut self) -> (usize, usize) {
        let mut freed = 0;
        let mut freed_bytes = 0;
        for (index, slot) in self.objects.iter_mut().enumerate() {
            let Some(object) = slot else {
                continue;
            };
            if object.header.marked || object.header.sticky {
                object.header.marked = false;
                continue;
            }
            freed += 1;
            freed_bytes += object.size();
            *slot = None;
            self.free_list.push(index);
        }
        self.used_bytes -= freed_bytes;
        self.allocated_since_gc = 0;
        self.allocs_since_gc = 0;
        self.collections += 1;
        self.total_freed += freed as u64;
        (freed, freed_bytes)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ObjRef, &Object)> {
        self.objects
            .iter()
            .enumerate()
            .filter_map(|(index, o)| o.as_ref().map(|o| (ObjRef::from_index(index), o)))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Object> {
        self.objects.iter_mut().flatten()
    }

    pub fn live_objects(&self) -> usize {
        self.objects.len() - self.free_list.len()
    }

    #[inline]
    pub fn used_bytes(&self) -> usize {
        self.used_bytes
    }

    pub fn stats(&self) -> HeapStats {
        HeapStats {
            live_objects: self.live_objects(),
            live_bytes: self.used_bytes,
            limit: self.limit,
            collections: self.collections,
            total_allocated: self.total_allocated,
            total_freed: self.total_freed,
        }
    }
}
