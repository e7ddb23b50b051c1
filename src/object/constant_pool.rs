use super::class::ClassId;
use super::field::ValueKind;
use super::method::MethodId;
use super::prelude::*;
use crate::classfile::ClassLoadErr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConstantTag {
    Invalid = 0,
    Utf8 = 1,
    Integer = 3,
    Float = 4,
    Long = 5,
    Double = 6,
    Class = 7,
    String = 8,
    Fieldref = 9,
    Methodref = 10,
    InterfaceMethodref = 11,
    NameAndType = 12,
    MethodHandle = 15,
    MethodType = 16,
    Dynamic = 17,
    InvokeDynamic = 18,
    Module = 19,
    Package = 20,
}

impl ConstantTag {
    pub fn from_u8(tag: u8) -> Option<Self> {
        Some(match tag {
            1 => ConstantTag::Utf8,
            3 => ConstantTag::Integer,
            4 => ConstantTag::Float,
            5 => ConstantTag::Long,
            6 => ConstantTag::Double,
            7 => ConstantTag::Class,
            8 => ConstantTag::String,
            9 => ConstantTag::Fieldref,
            10 => ConstantTag::Methodref,
            11 => ConstantTag::InterfaceMethodref,
            12 => ConstantTag::NameAndType,
            15 => ConstantTag::MethodHandle,
            16 => ConstantTag::MethodType,
            17 => ConstantTag::Dynamic,
            18 => ConstantTag::InvokeDynamic,
            19 => ConstantTag::Module,
            20 => ConstantTag::Package,
            _ => return None,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResolvedField {
    pub class: ClassId,
    pub slot: u16,
    pub kind: ValueKind,
    pub is_static: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResolvedMethod {
    pub method: MethodId,
    /// Argument slots including the receiver.
    pub arg_slots: u16,
    pub is_static: bool,
}

/// One constant pool slot. Symbolic references are rewritten in place to
/// their `Resolved*` form on first use.
#[derive(Clone, Debug)]
pub enum ConstPoolEntry {
    Empty,
    Utf8(Symbol),
    Integer(JInt),
    Float(JFloat),
    Long(JLong),
    Double(JDouble),
    Class { name_index: u16 },
    String { utf8_index: u16 },
    FieldRef { class_index: u16, nat_index: u16 },
    MethodRef { class_index: u16, nat_index: u16 },
    InterfaceMethodRef { class_index: u16, nat_index: u16 },
    NameAndType { name_index: u16, descriptor_index: u16 },
    MethodHandle { kind: u8, index: u16 },
    MethodType { descriptor_index: u16 },
    Dynamic { bootstrap_index: u16, nat_index: u16 },
    InvokeDynamic { bootstrap_index: u16, nat_index: u16 },
    Module { name_index: u16 },
    Package { name_index: u16 },
    ResolvedClass(ClassId),
    ResolvedString(ObjRef),
    ResolvedField(ResolvedField),
    ResolvedMethod(ResolvedMethod),
}

impl ConstPoolEntry {
    pub fn tag(&self) -> ConstantTag {
        match self {
            ConstPoolEntry::Empty => ConstantTag::Invalid,
            ConstPoolEntry::Utf8(_) => ConstantTag::Utf8,
            ConstPoolEntry::Integer(_) => ConstantTag::Integer,
            ConstPoolEntry::Float(_) => ConstantTag::Float,
            ConstPoolEntry::Long(_) => ConstantTag::Long,
            ConstPoolEntry::Double(_) => ConstantTag::Double,
            ConstPoolEntry::Class { .. } | ConstPoolEntry::ResolvedClass(_) => ConstantTag::Class,
            ConstPoolEntry::String { .. } | ConstPoolEntry::ResolvedString(_) => {
                ConstantTag::String
            }
            ConstPoolEntry::FieldRef { .. } | ConstPoolEntry::ResolvedField(_) => {
                ConstantTag::Fieldref
            }
            ConstPoolEntry::MethodRef { .. } | ConstPoolEntry::ResolvedMethod(_) => {
                ConstantTag::Methodref
            }
            ConstPoolEntry::InterfaceMethodRef { .. } => ConstantTag::InterfaceMethodref,
            ConstPoolEntry::NameAndType { .. } => ConstantTag::NameAndType,
            ConstPoolEntry::MethodHandle { .. } => ConstantTag::MethodHandle,
            ConstPoolEntry::MethodType { .. } => ConstantTag::MethodType,
            ConstPoolEntry::Dynamic { .. } => ConstantTag::Dynamic,
            ConstPoolEntry::InvokeDynamic { .. } => ConstantTag::InvokeDynamic,
            ConstPoolEntry::Module { .. } => ConstantTag::Module,
            ConstPoolEntry::Package { .. } => ConstantTag::Package,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct ConstantPool {
    entries: Vec<ConstPoolEntry>,
}

impl ConstantPool {
    /// Pool with `count` slots; index 0 stays empty.
    pub fn new(count: u16) -> Self {
        Self {
            entries: vec![ConstPoolEntry::Empty; count as usize],
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.len() <= 1
    }

    pub fn get(&self, index: u16) -> Result<&ConstPoolEntry, ClassLoadErr> {
        match self.entries.get(index as usize) {
            Some(ConstPoolEntry::Empty) | None => Err(ClassLoadErr::InvalidFormat(format!(
                "invalid constant pool index {}",
                index
            ))),
            Some(entry) => Ok(entry),
        }
    }

    pub fn set(&mut self, index: u16, entry: ConstPoolEntry) {
        if let Some(slot) = self.entries.get_mut(index as usize) {
            *slot = entry;
        }
    }

    pub fn get_tag(&self, index: u16) -> ConstantTag {
        self.entries
            .get(index as usize)
            .map_or(ConstantTag::Invalid, |entry| entry.tag())
    }

    pub fn get_utf8(&self, index: u16) -> Result<&Symbol, ClassLoadErr> {
        match self.get(index)? {
            ConstPoolEntry::Utf8(symbol) => Ok(symbol),
            other => Err(Self::unexpected(index, "Utf8", other)),
        }
    }

    pub fn get_int32(&self, index: u16) -> Result<JInt, ClassLoadErr> {
        match self.get(index)? {
            ConstPoolEntry::Integer(v) => Ok(*v),
            other => Err(Self::unexpected(index, "Integer", other)),
        }
    }

    pub fn get_float(&self, index: u16) -> Result<JFloat, ClassLoadErr> {
        match self.get(index)? {
            ConstPoolEntry::Float(v) => Ok(*v),
            other => Err(Self::unexpected(index, "Float", other)),
        }
    }

    pub fn get_long(&self, index: u16) -> Result<JLong, ClassLoadErr> {
        match self.get(index)? {
            ConstPoolEntry::Long(v) => Ok(*v),
            other => Err(Self::unexpected(index, "Long", other)),
        }
    }

    pub fn get_double(&self, index: u16) -> Result<JDouble, ClassLoadErr> {
        match self.get(index)? {
            ConstPoolEntry::Double(v) => Ok(*v),
            other => Err(Self::unexpected(index, "Double", other)),
        }
    }

    /// Name of an unresolved `Class` entry.
    pub fn get_class_name(&self, index: u16) -> Result<&Symbol, ClassLoadErr> {
        match self.get(index)? {
            ConstPoolEntry::Class { name_index } => self.get_utf8(*name_index),
            other => Err(Self::unexpected(index, "Class", other)),
        }
    }

    pub fn get_name_and_type(&self, index: u16) -> Result<(&Symbol, &Symbol), ClassLoadErr> {
        match self.get(index)? {
            ConstPoolEntry::NameAndType {
                name_index,
                descriptor_index,
            } => Ok((self.get_utf8(*name_index)?, self.get_utf8(*descriptor_index)?)),
            other => Err(Self::unexpected(index, "NameAndType", other)),
        }
    }

    /// `(class_index, name, descriptor)` of an unresolved member reference.
    pub fn get_member_ref(&self, index: u16) -> Result<(u16, &Symbol, &Symbol), ClassLoadErr> {
        match self.get(index)? {
            ConstPoolEntry::FieldRef {
                class_index,
                nat_index,
            }
            | ConstPoolEntry::MethodRef {
                class_index,
                nat_index,
            }
            | ConstPoolEntry::InterfaceMethodRef {
                class_index,
                nat_index,
            } => {
                let (name, descriptor) = self.get_name_and_type(*nat_index)?;
                Ok((*class_index, name, descriptor))
            }
            other => Err(Self::unexpected(index, "member reference", other)),
        }
    }

    fn unexpected(index: u16, expected: &str, found: &ConstPoolEntry) -> ClassLoadErr {
        ClassLoadErr::InvalidFormat(format!(
            "constant pool #{} is {:?}, expected {}",
            index,
            found.tag(),
            expected
        ))
    }
}
