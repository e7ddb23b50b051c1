use super::constant_pool::ConstantPool;
use super::field::{Field, FieldsData, ValueKind};
use super::method::{Method, MethodId};
use super::prelude::*;
use super::Monitor;

#[repr(u16)]
pub enum ClassAccessFlags {
    AccPublic = 0x0001,
    AccFinal = 0x0010,
    AccSuper = 0x0020,
    AccInterface = 0x0200,
    AccAbstract = 0x0400,
    AccSynthetic = 0x1000,
    AccAnnotation = 0x2000,
    AccEnum = 0x4000,
}

impl ClassAccessFlags {
    #[inline]
    pub fn is_interface(flags: u16) -> bool {
        flags & ClassAccessFlags::AccInterface as u16 != 0
    }

    #[inline]
    pub fn is_abstract(flags: u16) -> bool {
        flags & ClassAccessFlags::AccAbstract as u16 != 0
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, PartialOrd, Ord)]
pub struct ClassId(pub u32);

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum InitState {
    Uninitialized,
    Initializing,
    Initialized,
    /// `<clinit>` completed abruptly.
    Failed,
}

#[derive(Clone, Copy, Debug)]
pub struct ArrayInfo {
    pub dimensions: u8,
    /// Storage kind of the elements.
    pub element: ValueKind,
    /// Class of reference elements (a class or a nested array class).
    pub component: Option<ClassId>,
}

pub struct Class {
    pub id: ClassId,
    pub name: Symbol,
    pub access_flags: u16,
    pub super_class: Option<ClassId>,
    pub interfaces: Vec<ClassId>,
    pub constant_pool: ConstantPool,
    pub fields: Vec<Field>,
    pub methods: Vec<Method>,
    /// Instance slots including inherited ones.
    pub instance_slots: u16,
    /// Reference-holding instance slots including inherited ones.
    pub ref_slots: Vec<u16>,
    pub static_slots: u16,
    pub static_ref_slots: Vec<u16>,
    pub statics: Option<FieldsData>,
    pub init_state: InitState,
    pub mirror: Option<ObjRef>,
    pub monitor: Monitor,
    pub array: Option<ArrayInfo>,
    pub source_file: Option<Symbol>,
}

impl Class {
    #[inline]
    pub fn is_interface(&self) -> bool {
        ClassAccessFlags::is_interface(self.access_flags)
    }

    #[inline]
    pub fn is_abstract(&self) -> bool {
        ClassAccessFlags::is_abstract(self.access_flags)
    }

    #[inline]
    pub fn is_array(&self) -> bool {
        self.array.is_some()
    }

    /// Name with dots, as Java code sees it.
    pub fn java_name(&self) -> String {
        self.name.replace('/', ".")
    }

    pub fn find_declared_method(&self, name: &str, descriptor: &str) -> Option<MethodId> {
        self.methods
            .iter()
            .position(|m| m.name.as_str() == name && m.descriptor.as_str() == descriptor)
            .map(|index| MethodId::new(self.id, index as u16))
    }

    pub fn find_declared_field(&self, name: &str, descriptor: Option<&str>) -> Option<&Field> {
        self.fields.iter().find(|f| {
            f.name.as_str() == name && descriptor.map_or(true, |d| f.descriptor.as_str() == d)
        })
    }

    pub fn method(&self, index: u16) -> Option<&Method> {
        self.methods.get(index as usize)
    }

    /// Traces the static reference slots, once the statics block exists.
    pub fn trace_statics(&self, visitor: &mut dyn FnMut(ObjRef)) {
        if let Some(statics) = &self.statics {
            for &slot in &self.static_ref_slots {
                if let Some(obj) = statics.get_ref(slot as usize) {
                    visitor(obj);
                }
            }
        }
        if let Some(mirror) = self.mirror {
            visitor(mirror);
        }
    }
}
