use super::field::ValueKind;
use super::prelude::*;

/// `atype` operand of `newarray`.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(u8)]
pub enum ArrayType {
    Boolean = 4,
    Char = 5,
    Float = 6,
    Double = 7,
    Byte = 8,
    Short = 9,
    Int = 10,
    Long = 11,
}

impl ArrayType {
    pub fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            4 => ArrayType::Boolean,
            5 => ArrayType::Char,
            6 => ArrayType::Float,
            7 => ArrayType::Double,
            8 => ArrayType::Byte,
            9 => ArrayType::Short,
            10 => ArrayType::Int,
            11 => ArrayType::Long,
            _ => return None,
        })
    }

    pub fn kind(self) -> ValueKind {
        match self {
            ArrayType::Boolean => ValueKind::Boolean,
            ArrayType::Char => ValueKind::Char,
            ArrayType::Float => ValueKind::Float,
            ArrayType::Double => ValueKind::Double,
            ArrayType::Byte => ValueKind::Byte,
            ArrayType::Short => ValueKind::Short,
            ArrayType::Int => ValueKind::Int,
            ArrayType::Long => ValueKind::Long,
        }
    }

    /// Name of the one-dimensional array class, e.g. `[I`.
    pub fn class_name(self) -> String {
        format!("[{}", self.kind().descriptor_char())
    }
}

/// Element storage of an array. Boolean arrays share the byte layout.
#[derive(Clone, Debug, PartialEq)]
pub enum ArrayData {
    Byte(Box<[JByte]>),
    Char(Box<[JChar]>),
    Short(Box<[JShort]>),
    Int(Box<[JInt]>),
    Long(Box<[JLong]>),
    Float(Box<[JFloat]>),
    Double(Box<[JDouble]>),
    Ref(Box<[Option<ObjRef>]>),
}

impl ArrayData {
    pub fn new(kind: ValueKind, len: usize) -> Self {
        match kind {
            ValueKind::Boolean | ValueKind::Byte => ArrayData::Byte(vec![0; len].into()),
            ValueKind::Char => ArrayData::Char(vec![0; len].into()),
            ValueKind::Short => ArrayData::Short(vec![0; len].into()),
            ValueKind::Int => ArrayData::Int(vec![0; len].into()),
            ValueKind::Long => ArrayData::Long(vec![0; len].into()),
            ValueKind::Float => ArrayData::Float(vec![0.0; len].into()),
            ValueKind::Double => ArrayData::Double(vec![0.0; len].into()),
            ValueKind::Reference => ArrayData::Ref(vec![None; len].into()),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ArrayData::Byte(v) => v.len(),
            ArrayData::Char(v) => v.len(),
            ArrayData::Short(v) => v.len(),
            ArrayData::Int(v) => v.len(),
            ArrayData::Long(v) => v.len(),
            ArrayData::Float(v) => v.len(),
            ArrayData::Double(v) => v.len(),
            ArrayData::Ref(v) => v.len(),
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn element_size(&self) -> usize {
        match self {
            ArrayData::Byte(_) => 1,
            ArrayData::Char(_) | ArrayData::Short(_) => 2,
            ArrayData::Int(_) | ArrayData::Float(_) | ArrayData::Ref(_) => 4,
            ArrayData::Long(_) | ArrayData::Double(_) => 8,
        }
    }

    #[inline]
    pub fn byte_size(&self) -> usize {
        self.len() * self.element_size()
    }

    /// Reads one element widened to its stack representation.
    pub fn get(&self, index: usize) -> Option<crate::value::JValue> {
        use crate::value::JValue;
        Some(match self {
            ArrayData::Byte(v) => JValue::Int(*v.get(index)? as JInt),
            ArrayData::Char(v) => JValue::Int(*v.get(index)? as JInt),
            ArrayData::Short(v) => JValue::Int(*v.get(index)? as JInt),
            ArrayData::Int(v) => JValue::Int(*v.get(index)?),
            ArrayData::Long(v) => JValue::Long(*v.get(index)?),
            ArrayData::Float(v) => JValue::Float(*v.get(index)?),
            ArrayData::Double(v) => JValue::Double(*v.get(index)?),
            ArrayData::Ref(v) => JValue::Object(*v.get(index)?),
        })
    }

    /// Copies `len` elements between arrays of the same storage kind.
    /// Returns `false` when the kinds differ.
    pub fn copy_from(
        &mut self,
        dst_pos: usize,
        src: &ArrayData,
        src_pos: usize,
        len: usize,
    ) -> bool {
        macro_rules! copy_slice {
            ($($variant:ident),*) => {
                match (self, src) {
                    $(
                        (ArrayData::$variant(dst), ArrayData::$variant(src)) => {
                            dst[dst_pos..dst_pos + len].copy_from_slice(&src[src_pos..src_pos + len]);
                            true
                        }
                    )*
                    _ => false,
                }
            };
        }
        copy_slice!(Byte, Char, Short, Int, Long, Float, Double, Ref)
    }

    /// Moves `len` elements inside one array, handling overlap.
    pub fn copy_within(&mut self, src_pos: usize, dst_pos: usize, len: usize) {
        macro_rules! copy_inner {
            ($($variant:ident),*) => {
                match self {
                    $(ArrayData::$variant(v) => v.copy_within(src_pos..src_pos + len, dst_pos),)*
                }
            };
        }
        copy_inner!(Byte, Char, Short, Int, Long, Float, Double, Ref)
    }
}

/// Element size for a primitive descriptor character, pointer width
/// otherwise.
pub fn get_primitive_type_size(c: u8) -> usize {
    ValueKind::from_descriptor_char(c).map_or(std::mem::size_of::<Slot>(), |k| k.size())
}

#[inline]
pub fn is_prim_type(c: u8) -> bool {
    matches!(c, b'Z' | b'B' | b'C' | b'S' | b'I' | b'F' | b'J' | b'D')
}
