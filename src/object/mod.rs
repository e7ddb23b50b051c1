pub mod array;
pub mod class;
pub mod constant_pool;
pub mod field;
pub mod method;
pub mod prelude;
pub mod string;
pub mod symbol;

use std::fmt;
use std::num::NonZeroU32;

use self::array::ArrayData;
use self::class::ClassId;
use self::field::FieldsData;
use self::prelude::Slot;

/// Header bytes charged to every object for heap accounting.
pub const HEADER_SIZE: usize = 16;

/// Handle of a heap object. A stack or field slot holds the raw handle
/// value, `0` is `null`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjRef(NonZeroU32);

impl ObjRef {
    #[inline]
    pub(crate) fn from_index(index: usize) -> ObjRef {
        ObjRef(NonZeroU32::new(index as u32 + 1).unwrap_or(NonZeroU32::MIN))
    }

    #[inline]
    pub(crate) fn index(self) -> usize {
        self.0.get() as usize - 1
    }

    #[inline]
    pub fn to_slot(obj: Option<ObjRef>) -> Slot {
        obj.map_or(0, |obj| obj.0.get() as Slot)
    }

    #[inline]
    pub fn from_slot(slot: Slot) -> Option<ObjRef> {
        NonZeroU32::new(slot as u32).map(ObjRef)
    }
}

impl fmt::Debug for ObjRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

#[derive(Default, Clone, Copy, Debug)]
pub struct Monitor {
    pub owner: u32,
    pub count: u32,
}

impl Monitor {
    /// Returns `false` when another execution holds the monitor.
    pub fn enter(&mut self, exec_id: u32) -> bool {
        if self.count == 0 || self.owner == exec_id {
            self.owner = exec_id;
            self.count += 1;
            true
        } else {
            false
        }
    }

    /// Returns `false` when `exec_id` does not own the monitor.
    pub fn exit(&mut self, exec_id: u32) -> bool {
        if self.count == 0 || self.owner != exec_id {
            return false;
        }
        self.count -= 1;
        if self.count == 0 {
            self.owner = 0;
        }
        true
    }
}

pub struct Header {
    pub class: ClassId,
    pub hash: i32,
    pub(crate) marked: bool,
    pub(crate) sticky: bool,
    pub(crate) monitor: Monitor,
}

pub enum ObjectBody {
    Instance(FieldsData),
    Array(ArrayData),
}

pub struct Object {
    pub header: Header,
    pub body: ObjectBody,
}

impl Object {
    pub fn new_instance(class: ClassId, slots: usize, hash: i32) -> Self {
        Self::with_body(class, ObjectBody::Instance(FieldsData::new(slots)), hash)
    }

    /// Instance that takes over an existing field block.
    pub fn with_fields(class: ClassId, fields: FieldsData, hash: i32) -> Self {
        Self::with_body(class, ObjectBody::Instance(fields), hash)
    }

    pub fn new_array(class: ClassId, data: ArrayData, hash: i32) -> Self {
        Self::with_body(class, ObjectBody::Array(data), hash)
    }

    fn with_body(class: ClassId, body: ObjectBody, hash: i32) -> Self {
        Self {
            header: Header {
                class,
                hash,
                marked: false,
                sticky: false,
                monitor: Monitor::default(),
            },
            body,
        }
    }

    #[inline]
    pub fn class(&self) -> ClassId {
        self.header.class
    }

    pub fn size(&self) -> usize {
        HEADER_SIZE
            + match &self.body {
                ObjectBody::Instance(fields) => fields.len() * std::mem::size_of::<Slot>(),
                ObjectBody::Array(data) => data.byte_size(),
            }
    }

    #[inline]
    pub fn is_array(&self) -> bool {
        matches!(self.body, ObjectBody::Array(_))
    }

    pub fn fields(&self) -> Option<&FieldsData> {
        match &self.body {
            ObjectBody::Instance(fields) => Some(fields),
            ObjectBody::Array(_) => None,
        }
    }

    pub fn fields_mut(&mut self) -> Option<&mut FieldsData> {
        match &mut self.body {
            ObjectBody::Instance(fields) => Some(fields),
            ObjectBody::Array(_) => None,
        }
    }

    pub fn array(&self) -> Option<&ArrayData> {
        match &self.body {
            ObjectBody::Array(data) => Some(data),
            ObjectBody::Instance(_) => None,
        }
    }

    pub fn array_mut(&mut self) -> Option<&mut ArrayData> {
        match &mut self.body {
            ObjectBody::Array(data) => Some(data),
            ObjectBody::Instance(_) => None,
        }
    }
}

/// Reference tracing used by the collector's mark phase.
pub trait Trace {
    /// `ref_slots` lists the reference-holding field slots of the object's
    /// class; arrays ignore it.
    fn trace(&self, ref_slots: &[u16], visitor: &mut dyn FnMut(ObjRef));
}

impl Trace for Object {
    fn trace(&self, ref_slots: &[u16], visitor: &mut dyn FnMut(ObjRef)) {
        match &self.body {
            ObjectBody::Instance(fields) => {
                for &slot in ref_slots {
                    if let Some(obj) = fields.get_ref(slot as usize) {
                        visitor(obj);
                    }
                }
            }
            ObjectBody::Array(ArrayData::Ref(elements)) => {
                elements.iter().flatten().for_each(|obj| visitor(*obj));
            }
            ObjectBody::Array(_) => {}
        }
    }
}
