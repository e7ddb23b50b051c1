pub use super::array::{ArrayData, ArrayType};
pub use super::class::{Class, ClassAccessFlags, ClassId, InitState};
pub use super::constant_pool::{ConstPoolEntry, ConstantPool, ConstantTag, ResolvedField};
pub use super::field::{Field, FieldAccessFlags, ValueKind};
pub use super::method::{Method, MethodAccessFlags, MethodId};
pub use super::symbol::{Symbol, SymbolTable};
pub use super::{Monitor, ObjRef, Object};

pub type JChar = u16;
pub type JByte = i8;
pub type JBoolean = JByte;
pub type JShort = i16;
pub type JInt = i32;
pub type JLong = i64;

pub type JFloat = f32;
pub type JDouble = f64;

/// One 32-bit cell of an execution stack or a fields block.
pub type Slot = i32;
