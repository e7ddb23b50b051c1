use super::class::ClassId;
use super::field::ValueKind;
use super::prelude::*;
use crate::native::NativeMethod;

#[repr(u16)]
pub enum MethodAccessFlags {
    AccPublic = 0x0001,
    AccPrivate = 0x0002,
    AccProtected = 0x0004,
    AccStatic = 0x0008,
    AccFinal = 0x0010,
    AccSynchronized = 0x0020,
    AccBridge = 0x0040,
    AccVarargs = 0x0080,
    AccNative = 0x0100,
    AccAbstract = 0x0400,
    AccStrict = 0x0800,
    AccSynthetic = 0x1000,
}

/// Index of a method inside its declaring class. Fits in one stack slot
/// as `class << 16 | index`, which is how frames record their method.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, PartialOrd, Ord)]
pub struct MethodId {
    pub class: ClassId,
    pub index: u16,
}

impl MethodId {
    pub fn new(class: ClassId, index: u16) -> Self {
        Self { class, index }
    }

    #[inline]
    pub fn to_slot(self) -> Slot {
        ((self.class.0 as Slot) << 16) | self.index as Slot
    }

    #[inline]
    pub fn from_slot(slot: Slot) -> Option<MethodId> {
        if slot < 0 {
            return None;
        }
        Some(MethodId {
            class: ClassId((slot >> 16) as u32),
            index: (slot & 0xffff) as u16,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExceptionTable {
    pub start_pc: u16,
    pub end_pc: u16,
    pub handler_pc: u16,
    /// Constant pool class index, `0` catches everything.
    pub catch_type: u16,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LineNumber {
    pub start_pc: u16,
    pub line: u16,
}

#[derive(Clone, Debug, Default)]
pub struct Code {
    pub max_stack: u16,
    pub max_locals: u16,
    pub bytecode: Vec<u8>,
    pub exception_table: Vec<ExceptionTable>,
    pub line_numbers: Vec<LineNumber>,
}

impl Code {
    pub fn line_of(&self, pc: u32) -> Option<u16> {
        self.line_numbers
            .iter()
            .filter(|entry| entry.start_pc as u32 <= pc)
            .max_by_key(|entry| entry.start_pc)
            .map(|entry| entry.line)
    }
}

pub struct Method {
    pub class: ClassId,
    pub name: Symbol,
    pub descriptor: Symbol,
    pub access_flags: u16,
    pub params: Vec<ValueKind>,
    /// `None` for `void`.
    pub ret: Option<ValueKind>,
    /// Argument slots, receiver excluded.
    pub arg_slots: u16,
    pub code: Option<Code>,
    pub native: Option<NativeMethod>,
}

impl Method {
    #[inline]
    fn has_flag(&self, flag: MethodAccessFlags) -> bool {
        self.access_flags & flag as u16 != 0
    }

    #[inline]
    pub fn is_static(&self) -> bool {
        self.has_flag(MethodAccessFlags::AccStatic)
    }

    #[inline]
    pub fn is_native(&self) -> bool {
        self.has_flag(MethodAccessFlags::AccNative)
    }

    #[inline]
    pub fn is_abstract(&self) -> bool {
        self.has_flag(MethodAccessFlags::AccAbstract)
    }

    #[inline]
    pub fn is_synchronized(&self) -> bool {
        self.has_flag(MethodAccessFlags::AccSynchronized)
    }

    #[inline]
    pub fn is_private(&self) -> bool {
        self.has_flag(MethodAccessFlags::AccPrivate)
    }

    /// Slots taken by the arguments including the receiver.
    #[inline]
    pub fn frame_arg_slots(&self) -> u16 {
        self.arg_slots + if self.is_static() { 0 } else { 1 }
    }

    #[inline]
    pub fn ret_slots(&self) -> usize {
        self.ret.map_or(0, |kind| kind.slots())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_id_fits_a_slot() {
        let id = MethodId::new(ClassId(300), 17);
        assert_eq!(MethodId::from_slot(id.to_slot()), Some(id));
        assert_eq!(MethodId::from_slot(-1), None);
    }

    #[test]
    fn line_lookup_takes_closest_preceding_entry() {
        let code = Code {
            line_numbers: vec![
                LineNumber { start_pc: 0, line: 10 },
                LineNumber { start_pc: 6, line: 12 },
                LineNumber { start_pc: 3, line: 11 },
            ],
            ..Default::default()
        };
        assert_eq!(code.line_of(0), Some(10));
        assert_eq!(code.line_of(4), Some(11));
        assert_eq!(code.line_of(9), Some(12));
    }
}
