use super::prelude::*;

#[repr(u16)]
pub enum FieldAccessFlags {
    AccPublic = 0x0001,
    AccPrivate = 0x0002,
    AccProtected = 0x0004,
    AccStatic = 0x0008,
    AccFinal = 0x0010,
    AccVolatile = 0x0040,
    AccTransient = 0x0080,
    AccSynthetic = 0x1000,
    AccEnum = 0x4000,
}

/// Storage kind of a value, selected by the first descriptor character.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ValueKind {
    Boolean,
    Byte,
    Char,
    Short,
    Int,
    Float,
    Long,
    Double,
    Reference,
}

impl ValueKind {
    pub fn from_descriptor_char(c: u8) -> Option<ValueKind> {
        Some(match c {
            b'Z' => ValueKind::Boolean,
            b'B' => ValueKind::Byte,
            b'C' => ValueKind::Char,
            b'S' => ValueKind::Short,
            b'I' => ValueKind::Int,
            b'F' => ValueKind::Float,
            b'J' => ValueKind::Long,
            b'D' => ValueKind::Double,
            b'L' | b'[' => ValueKind::Reference,
            _ => return None,
        })
    }

    pub fn from_descriptor(descriptor: &str) -> Option<ValueKind> {
        descriptor
            .as_bytes()
            .first()
            .and_then(|c| Self::from_descriptor_char(*c))
    }

    /// Stack and field slots taken by a value of this kind.
    #[inline]
    pub fn slots(self) -> usize {
        match self {
            ValueKind::Long | ValueKind::Double => 2,
            _ => 1,
        }
    }

    /// Element size inside a primitive array.
    pub fn size(self) -> usize {
        match self {
            ValueKind::Boolean | ValueKind::Byte => 1,
            ValueKind::Char | ValueKind::Short => 2,
            ValueKind::Int | ValueKind::Float => 4,
            ValueKind::Long | ValueKind::Double => 8,
            ValueKind::Reference => std::mem::size_of::<Slot>(),
        }
    }

    #[inline]
    pub fn is_reference(self) -> bool {
        self == ValueKind::Reference
    }

    pub fn descriptor_char(self) -> char {
        match self {
            ValueKind::Boolean => 'Z',
            ValueKind::Byte => 'B',
            ValueKind::Char => 'C',
            ValueKind::Short => 'S',
            ValueKind::Int => 'I',
            ValueKind::Float => 'F',
            ValueKind::Long => 'J',
            ValueKind::Double => 'D',
            ValueKind::Reference => 'L',
        }
    }
}

pub struct Field {
    pub name: Symbol,
    pub descriptor: Symbol,
    pub access_flags: u16,
    pub kind: ValueKind,
    /// First slot inside the instance or statics block.
    pub slot: u16,
    /// Constant pool index of a `ConstantValue` attribute.
    pub constant_value: Option<u16>,
}

impl Field {
    #[inline]
    pub fn is_static(&self) -> bool {
        self.access_flags & FieldAccessFlags::AccStatic as u16 != 0
    }
}

/// Slot block of an instance or of a class's statics. Wide values take
/// two contiguous slots, low word first.
#[derive(Clone)]
pub struct FieldsData {
    slots: Box<[Slot]>,
}

impl FieldsData {
    pub fn new(len: usize) -> Self {
        Self {
            slots: vec![0; len].into_boxed_slice(),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    #[inline]
    pub fn get_int(&self, slot: usize) -> JInt {
        self.slots.get(slot).copied().unwrap_or(0)
    }

    #[inline]
    pub fn set_int(&mut self, slot: usize, value: JInt) {
        if let Some(s) = self.slots.get_mut(slot) {
            *s = value;
        }
    }

    pub fn get_long(&self, slot: usize) -> JLong {
        let lo = self.get_int(slot) as u32 as u64;
        let hi = self.get_int(slot + 1) as u32 as u64;
        ((hi << 32) | lo) as JLong
    }

    pub fn set_long(&mut self, slot: usize, value: JLong) {
        self.set_int(slot, value as i32);
        self.set_int(slot + 1, (value >> 32) as i32);
    }

    #[inline]
    pub fn get_float(&self, slot: usize) -> JFloat {
        f32::from_bits(self.get_int(slot) as u32)
    }

    #[inline]
    pub fn get_double(&self, slot: usize) -> JDouble {
        f64::from_bits(self.get_long(slot) as u64)
    }

    #[inline]
    pub fn get_ref(&self, slot: usize) -> Option<ObjRef> {
        ObjRef::from_slot(self.get_int(slot))
    }

    #[inline]
    pub fn set_ref(&mut self, slot: usize, value: Option<ObjRef>) {
        self.set_int(slot, ObjRef::to_slot(value));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wide_values_span_two_slots() {
        let mut fields = FieldsData::new(4);
        fields.set_long(1, -2);
        assert_eq!(fields.get_long(1), -2);
        assert_eq!(fields.get_int(1), -2);
        assert_eq!(fields.get_int(2), -1);
        assert_eq!(fields.get_int(0), 0);
        assert_eq!(fields.get_int(3), 0);
    }

    #[test]
    fn descriptor_kinds() {
        assert_eq!(ValueKind::from_descriptor("J"), Some(ValueKind::Long));
        assert_eq!(ValueKind::from_descriptor("[I"), Some(ValueKind::Reference));
        assert_eq!(ValueKind::from_descriptor("Ljava/lang/String;"), Some(ValueKind::Reference));
        assert_eq!(ValueKind::from_descriptor("V"), None);
        assert_eq!(ValueKind::Double.slots(), 2);
        assert_eq!(ValueKind::Char.size(), 2);
    }
}
