use crate::object::prelude::{JDouble, JFloat, JInt, JLong, ObjRef, Slot};
use crate::value::JValue;

/// One bit per stack slot, set when the slot holds an object reference.
#[derive(Default, Clone)]
pub struct RefBitSet {
    words: Vec<u64>,
}

impl RefBitSet {
    #[inline]
    pub fn get(&self, index: usize) -> bool {
        self.words
            .get(index / 64)
            .map_or(false, |word| word & (1 << (index % 64)) != 0)
    }

    #[inline]
    pub fn set(&mut self, index: usize, is_ref: bool) {
        let word = index / 64;
        if word >= self.words.len() {
            if !is_ref {
                return;
            }
            self.words.resize(word + 1, 0);
        }
        if is_ref {
            self.words[word] |= 1 << (index % 64);
        } else {
            self.words[word] &= !(1 << (index % 64));
        }
    }

    pub fn clear_range(&mut self, from: usize, to: usize) {
        for index in from..to {
            self.set(index, false);
        }
    }

    /// Set bits in `from..to`, ascending.
    pub fn ones(&self, from: usize, to: usize) -> impl Iterator<Item = usize> + '_ {
        (from..to).filter(move |index| self.get(*index))
    }
}

/// Primitive values that travel on the slot stack. Wide values take two
/// slots, low word at the lower index.
pub trait StackPrimitiveValue: Copy {
    const SLOTS: usize;

    fn write(self, slots: &mut [Slot]);

    fn read(slots: &[Slot]) -> Self;
}

impl StackPrimitiveValue for JInt {
    const SLOTS: usize = 1;

    #[inline(always)]
    fn write(self, slots: &mut [Slot]) {
        slots[0] = self;
    }

    #[inline(always)]
    fn read(slots: &[Slot]) -> Self {
        slots[0]
    }
}

impl StackPrimitiveValue for JFloat {
    const SLOTS: usize = 1;

    #[inline(always)]
    fn write(self, slots: &mut [Slot]) {
        slots[0] = self.to_bits() as Slot;
    }

    #[inline(always)]
    fn read(slots: &[Slot]) -> Self {
        f32::from_bits(slots[0] as u32)
    }
}

impl StackPrimitiveValue for JLong {
    const SLOTS: usize = 2;

    #[inline(always)]
    fn write(self, slots: &mut [Slot]) {
        slots[0] = self as Slot;
        slots[1] = (self >> 32) as Slot;
    }

    #[inline(always)]
    fn read(slots: &[Slot]) -> Self {
        ((slots[1] as u32 as u64) << 32 | slots[0] as u32 as u64) as JLong
    }
}

impl StackPrimitiveValue for JDouble {
    const SLOTS: usize = 2;

    #[inline(always)]
    fn write(self, slots: &mut [Slot]) {
        (self.to_bits() as JLong).write(slots)
    }

    #[inline(always)]
    fn read(slots: &[Slot]) -> Self {
        f64::from_bits(JLong::read(slots) as u64)
    }
}

/// Unified operand stack and locals of one execution. `sp` is the index of
/// the first free slot. Frame context slots live in the same array.
pub struct Stack {
    slots: Vec<Slot>,
    tags: RefBitSet,
    sp: usize,
    limit: usize,
}

impl Stack {
    pub fn new(limit: usize) -> Stack {
        Stack {
            slots: Vec::with_capacity(limit.min(1024)),
            tags: RefBitSet::default(),
            sp: 0,
            limit,
        }
    }

    #[inline]
    pub fn sp(&self) -> usize {
        self.sp
    }

    #[inline]
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Moves the stack top. Slots above the new top lose their ref tags.
    pub fn set_sp(&mut self, sp: usize) {
        if sp < self.sp {
            self.tags.clear_range(sp, self.sp);
        } else {
            self.ensure(sp);
        }
        self.sp = sp;
    }

    #[inline]
    fn ensure(&mut self, len: usize) {
        if self.slots.len() < len {
            self.slots.resize(len, 0);
        }
    }

    /// Zeroes `from..to` as scalar slots, growing the stack as needed.
    pub fn zero(&mut self, from: usize, to: usize) {
        self.ensure(to);
        self.slots[from..to].iter_mut().for_each(|slot| *slot = 0);
        self.tags.clear_range(from, to);
    }

    /// Raw slot read. Reads beyond the stack return `0`.
    #[inline]
    pub fn raw(&self, index: usize) -> Slot {
        self.slots.get(index).copied().unwrap_or(0)
    }

    #[inline]
    pub fn set_raw(&mut self, index: usize, value: Slot) {
        self.ensure(index + 1);
        self.slots[index] = value;
        self.tags.set(index, false);
    }

    #[inline]
    pub fn is_ref(&self, index: usize) -> bool {
        self.tags.get(index)
    }

    pub fn push<T: StackPrimitiveValue>(&mut self, val: T) {
        let sp = self.sp;
        self.ensure(sp + T::SLOTS);
        val.write(&mut self.slots[sp..sp + T::SLOTS]);
        for index in sp..sp + T::SLOTS {
            self.tags.set(index, false);
        }
        self.sp += T::SLOTS;
    }

    pub fn pop<T: StackPrimitiveValue>(&mut self) -> T {
        let sp = self.sp.saturating_sub(T::SLOTS);
        let val = self.load::<T>(sp);
        self.set_sp(sp);
        val
    }

    /// Reads a value at an absolute slot index.
    pub fn load<T: StackPrimitiveValue>(&self, index: usize) -> T {
        match self.slots.get(index..index + T::SLOTS) {
            Some(slots) => T::read(slots),
            None => T::read(&[0, 0]),
        }
    }

    pub fn store<T: StackPrimitiveValue>(&mut self, val: T, index: usize) {
        self.ensure(index + T::SLOTS);
        val.write(&mut self.slots[index..index + T::SLOTS]);
        for index in index..index + T::SLOTS {
            self.tags.set(index, false);
        }
    }

    pub fn push_ref(&mut self, obj: Option<ObjRef>) {
        let sp = self.sp;
        self.ensure(sp + 1);
        self.slots[sp] = ObjRef::to_slot(obj);
        self.tags.set(sp, true);
        self.sp += 1;
    }

    pub fn pop_ref(&mut self) -> Option<ObjRef> {
        let sp = self.sp.saturating_sub(1);
        let obj = self.load_ref(sp);
        self.set_sp(sp);
        obj
    }

    #[inline]
    pub fn load_ref(&self, index: usize) -> Option<ObjRef> {
        ObjRef::from_slot(self.raw(index))
    }

    pub fn store_ref(&mut self, obj: Option<ObjRef>, index: usize) {
        self.ensure(index + 1);
        self.slots[index] = ObjRef::to_slot(obj);
        self.tags.set(index, true);
    }

    /// Reference `depth` slots below the top, `0` being the top slot.
    #[inline]
    pub fn peek_ref(&self, depth: usize) -> Option<ObjRef> {
        self.sp
            .checked_sub(depth + 1)
            .and_then(|index| self.load_ref(index))
    }

    #[inline]
    pub fn peek_int(&self, depth: usize) -> JInt {
        self.sp
            .checked_sub(depth + 1)
            .map_or(0, |index| self.raw(index))
    }

    pub fn push_value(&mut self, val: JValue) {
        match val {
            JValue::Void => {}
            JValue::Int(v) => self.push(v),
            JValue::Long(v) => self.push(v),
            JValue::Float(v) => self.push(v),
            JValue::Double(v) => self.push(v),
            JValue::Object(v) => self.push_ref(v),
        }
    }

    /// Discards `n` slots.
    pub fn discard(&mut self, n: usize) {
        self.set_sp(self.sp.saturating_sub(n));
    }

    pub fn iinc(&mut self, index: usize, const_val: JInt) {
        let val = self.load::<JInt>(index);
        self.store::<JInt>(val.wrapping_add(const_val), index);
    }

    pub fn swap(&mut self) {
        if self.sp < 2 {
            return;
        }
        let (a, b) = (self.sp - 2, self.sp - 1);
        self.slots.swap(a, b);
        let (tag_a, tag_b) = (self.tags.get(a), self.tags.get(b));
        self.tags.set(a, tag_b);
        self.tags.set(b, tag_a);
    }

    /// Copies the top `n` slots and inserts the copy below the top
    /// `n + skip` slots. Covers the whole `dup*` family.
    pub fn dup(&mut self, n: usize, skip: usize) {
        if self.sp < n + skip {
            return;
        }
        let base = self.sp - n - skip;
        let copy: Vec<(Slot, bool)> = (self.sp - n..self.sp)
            .map(|index| (self.slots[index], self.tags.get(index)))
            .collect();
        self.ensure(self.sp + n);
        for index in (base..self.sp).rev() {
            self.slots[index + n] = self.slots[index];
            let tag = self.tags.get(index);
            self.tags.set(index + n, tag);
        }
        for (offset, (value, tag)) in copy.into_iter().enumerate() {
            self.slots[base + offset] = value;
            self.tags.set(base + offset, tag);
        }
        self.sp += n;
    }

    /// Moves the `count` slots starting at `from` up by `by` slots, tags
    /// included. Used to make room for a frame context below arguments.
    pub fn shift_up(&mut self, from: usize, count: usize, by: usize) {
        self.ensure(from + count + by);
        for index in (from..from + count).rev() {
            self.slots[index + by] = self.slots[index];
            let tag = self.tags.get(index);
            self.tags.set(index + by, tag);
        }
        self.tags.clear_range(from, from + by);
    }

    /// Copies `count` slots starting at `from`, for handing arguments to
    /// natives.
    pub fn slots(&self, from: usize, count: usize) -> Vec<Slot> {
        (from..from + count).map(|index| self.raw(index)).collect()
    }

    /// Reference-tagged slots in `from..to`.
    pub fn refs_in(&self, from: usize, to: usize) -> impl Iterator<Item = ObjRef> + '_ {
        self.tags
            .ones(from, to.min(self.slots.len()))
            .filter_map(move |index| self.load_ref(index))
    }

    pub fn reset(&mut self) {
        self.tags.clear_range(0, self.sp);
        self.sp = 0;
    }
}
