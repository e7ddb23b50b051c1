use crate::object::array::ArrayData;
use crate::object::prelude::*;
use crate::object::string;
use crate::object::ObjectBody;
use crate::runtime::exception::ExceptionKind;
use crate::runtime::{Throw, ThrowResult};
use crate::vm::{VMError, VM};

use super::heap::Heap;

impl VM {
    /// Allocates an object whose body takes `payload` bytes. Collects first
    /// when the threshold is crossed, and once more when the heap is full.
    fn alloc(&mut self, payload: usize, make: impl FnOnce(i32) -> Object) -> ThrowResult<ObjRef> {
        let Some(size) = Heap::object_size(payload) else {
            return Err(self.out_of_memory_error());
        };
        if self.heap.wants_collection(size) {
            self.collect_garbage();
        }
        if !self.heap.fits(size) {
            log::debug!("{} bytes do not fit, collecting before retry", size);
            self.collect_garbage();
            if !self.heap.fits(size) {
                log::debug!("allocation of {} bytes failed after collection", size);
                return Err(self.out_of_memory_error());
            }
        }
        let hash = self.heap.next_hash();
        Ok(self.heap.insert(make(hash)))
    }

    /// The preallocated `OutOfMemoryError`, or a fatal error while the VM
    /// is still bootstrapping.
    pub(crate) fn out_of_memory_error(&self) -> Throw {
        match self.out_of_memory {
            Some(obj) => Throw::Exception(obj),
            None => Throw::Fatal(VMError::OutOfMemory),
        }
    }

    /// Instance of `class` with every field zeroed. The constructor is not
    /// run.
    pub(crate) fn new_instance(&mut self, class: ClassId) -> ThrowResult<ObjRef> {
        let slots = self.registry.class(class).instance_slots as usize;
        self.alloc(slots * std::mem::size_of::<Slot>(), |hash| {
            Object::new_instance(class, slots, hash)
        })
    }

    /// Array of `array_class` with `len` zeroed elements.
    pub(crate) fn new_array(&mut self, array_class: ClassId, len: JInt) -> ThrowResult<ObjRef> {
        if len < 0 {
            return Err(self.throw_new(ExceptionKind::NegativeArraySizeException, Some(len.to_string())));
        }
        let element = self
            .registry
            .class(array_class)
            .array
            .map(|info| info.element)
            .ok_or_else(|| {
                VMError::InvalidState(format!(
                    "{} is not an array class",
                    self.registry.class(array_class).name
                ))
            })?;
        let len = len as usize;
        let Some(payload) = len.checked_mul(element.size()) else {
            return Err(self.out_of_memory_error());
        };
        self.alloc(payload, |hash| {
            Object::new_array(array_class, ArrayData::new(element, len), hash)
        })
    }

    /// `int[]` holding `values`.
    pub fn new_int_array(&mut self, values: &[JInt]) -> Result<ObjRef, VMError> {
        let class = self
            .registry
            .load("[I", &mut self.symbols)
            .map_err(VMError::ClassLoaderErr)?;
        let array = self.new_array(class, values.len() as JInt).map_err(|e| self.host_error(e))?;
        if let Some(ArrayData::Int(elements)) = self.heap.get_mut(array).and_then(Object::array_mut) {
            elements.copy_from_slice(values);
        }
        Ok(array)
    }

    pub(crate) fn new_java_string(&mut self, text: &str) -> ThrowResult<ObjRef> {
        let (bytes, coder) = string::encode(text);
        self.new_string_from(bytes, coder)
    }

    pub(crate) fn new_string_from_utf16(&mut self, units: &[JChar]) -> ThrowResult<ObjRef> {
        let (bytes, coder) = string::encode_utf16(units);
        self.new_string_from(bytes, coder)
    }

    fn new_string_from(&mut self, bytes: Vec<JByte>, coder: JByte) -> ThrowResult<ObjRef> {
        let value = self.new_array(self.well_known.byte_array, bytes.len() as JInt)?;
        if let Some(ArrayData::Byte(elements)) = self.heap.get_mut(value).and_then(Object::array_mut) {
            elements.copy_from_slice(&bytes);
        }
        // `value` is still pending, so it survives a collection here
        let obj = self.new_instance(self.well_known.string)?;
        let (value_slot, coder_slot) = (self.well_known.string_value, self.well_known.string_coder);
        if let Some(fields) = self.heap.get_mut(obj).and_then(Object::fields_mut) {
            fields.set_ref(value_slot, Some(value));
            fields.set_int(coder_slot, coder as JInt);
        }
        Ok(obj)
    }

    /// UTF-16 code units of a `java/lang/String`.
    pub(crate) fn string_utf16(&self, obj: ObjRef) -> Option<Vec<JChar>> {
        let object = self.heap.get(obj)?;
        if object.class() != self.well_known.string {
            return None;
        }
        let fields = object.fields()?;
        let coder = fields.get_int(self.well_known.string_coder) as JByte;
        let value = fields.get_ref(self.well_known.string_value)?;
        match self.heap.get(value)?.array()? {
            ArrayData::Byte(bytes) => Some(string::to_utf16(bytes, coder)),
            _ => None,
        }
    }

    /// Content of a `java/lang/String`, `None` for anything else.
    pub fn string_value(&self, obj: ObjRef) -> Option<String> {
        self.string_utf16(obj).map(|units| String::from_utf16_lossy(&units))
    }

    /// The canonical string object for `text`, created on first use and
    /// never collected.
    pub(crate) fn intern_string(&mut self, text: &str) -> ThrowResult<ObjRef> {
        if let Some(obj) = self.strings.get(text) {
            return Ok(obj);
        }
        let obj = self.new_java_string(text)?;
        self.heap.set_sticky(obj);
        self.strings.insert(text.to_string(), obj);
        Ok(obj)
    }

    /// `String.intern`: the canonical copy of `obj`'s content, which is
    /// `obj` itself when the content was not interned yet.
    pub(crate) fn intern_object(&mut self, obj: ObjRef) -> Option<ObjRef> {
        let text = self.string_value(obj)?;
        if let Some(canonical) = self.strings.get(&text) {
            return Some(canonical);
        }
        self.heap.set_sticky(obj);
        self.strings.insert(text, obj);
        Some(obj)
    }

    /// The `java/lang/Class` object of `class`. Mirrors are created once and
    /// live as long as the VM.
    pub(crate) fn class_mirror(&mut self, class: ClassId) -> ThrowResult<ObjRef> {
        if let Some(mirror) = self.registry.class(class).mirror {
            return Ok(mirror);
        }
        let mirror = self.new_instance(self.well_known.class)?;
        let slot = self.well_known.class_id;
        if let Some(fields) = self.heap.get_mut(mirror).and_then(Object::fields_mut) {
            fields.set_int(slot, class.0 as JInt);
        }
        self.heap.set_sticky(mirror);
        self.registry.class_mut(class).mirror = Some(mirror);
        Ok(mirror)
    }

    /// Class represented by a `java/lang/Class` object.
    pub(crate) fn mirror_class(&self, mirror: ObjRef) -> Option<ClassId> {
        let object = self.heap.get(mirror)?;
        if object.class() != self.well_known.class {
            return None;
        }
        let id = ClassId(object.fields()?.get_int(self.well_known.class_id) as u32);
        self.registry
            .get_class(id)
            .filter(|class| class.mirror == Some(mirror))
            .map(|class| class.id)
    }

    /// Shallow copy for `Object.clone`. Instances must be `Cloneable`.
    pub(crate) fn clone_object(&mut self, obj: ObjRef) -> ThrowResult<ObjRef> {
        let (class, body) = {
            let object = self
                .heap
                .get(obj)
                .ok_or_else(|| VMError::InvalidState(format!("clone of dead {:?}", obj)))?;
            let body = match &object.body {
                ObjectBody::Array(data) => ObjectBody::Array(data.clone()),
                ObjectBody::Instance(fields) => ObjectBody::Instance(fields.clone()),
            };
            (object.class(), body)
        };
        match body {
            ObjectBody::Array(data) => {
                self.alloc(data.byte_size(), |hash| Object::new_array(class, data, hash))
            }
            ObjectBody::Instance(fields) => {
                let cloneable = self.well_known.cloneable;
                if !self.registry.is_assignable(class, cloneable) {
                    let message = self.registry.class(class).java_name();
                    return Err(self.throw_new(ExceptionKind::CloneNotSupportedException, Some(message)));
                }
                let payload = fields.len() * std::mem::size_of::<Slot>();
                self.alloc(payload, move |hash| Object::with_fields(class, fields, hash))
            }
        }
    }

    #[inline]
    pub(crate) fn identity_hash(&self, obj: ObjRef) -> JInt {
        self.heap.get(obj).map_or(0, |object| object.header.hash)
    }
}

#[cfg(test)]
mod tests {
    use crate::object::array::ArrayData;
    use crate::object::prelude::*;
    use crate::runtime::Throw;
    use crate::test::TestVm;
    use crate::vm::VMConfig;

    #[test]
    fn strings_keep_their_encoding() {
        let mut vm = TestVm::bootstrap();
        let latin = vm.new_java_string("plain").ok().unwrap();
        let wide = vm.new_java_string("Grüße ∑").ok().unwrap();
        assert_eq!(vm.string_value(latin).as_deref(), Some("plain"));
        assert_eq!(vm.string_value(wide).as_deref(), Some("Grüße ∑"));
        assert_eq!(vm.string_utf16(latin).unwrap().len(), 5);
    }

    #[test]
    fn interning_returns_one_object() {
        let mut vm = TestVm::bootstrap();
        let a = vm.intern_string("same").ok().unwrap();
        let b = vm.intern_string("same").ok().unwrap();
        assert_eq!(a, b);
        let fresh = vm.new_java_string("other").ok().unwrap();
        assert_eq!(vm.intern_object(fresh), Some(fresh));
        let again = vm.new_java_string("other").ok().unwrap();
        assert_eq!(vm.intern_object(again), Some(fresh));
        vm.heap.clear_pending();
        vm.collect_garbage();
        assert!(vm.heap.contains(a) && vm.heap.contains(fresh));
        assert!(!vm.heap.contains(again));
    }

    #[test]
    fn mirrors_are_unique_per_class() {
        let mut vm = TestVm::bootstrap();
        let string = vm.well_known.string;
        let m1 = vm.class_mirror(string).ok().unwrap();
        let m2 = vm.class_mirror(string).ok().unwrap();
        assert_eq!(m1, m2);
        assert_eq!(vm.mirror_class(m1), Some(string));
        let not_a_mirror = vm.new_java_string("x").ok().unwrap();
        assert_eq!(vm.mirror_class(not_a_mirror), None);
    }

    #[test]
    fn array_clone_is_a_copy() {
        let mut vm = TestVm::bootstrap();
        let array = vm.new_int_array(&[1, 2, 3]).unwrap();
        let copy = vm.clone_object(array).ok().unwrap();
        assert_ne!(array, copy);
        if let Some(ArrayData::Int(elements)) = vm.heap.get_mut(copy).and_then(Object::array_mut) {
            elements[0] = 9;
        }
        assert_eq!(vm.read_array(array, 0).unwrap(), crate::value::JValue::Int(1));
        assert_eq!(vm.read_array(copy, 0).unwrap(), crate::value::JValue::Int(9));
    }

    #[test]
    fn cloned_instances_are_charged_in_full() {
        let mut vm = TestVm::bootstrap();
        let class = vm.load_test_class("demo/Pair", |w| {
            w.implements("java/lang/Cloneable");
            w.field(0, "a", "I");
            w.field(0, "b", "J");
        });
        vm.heap.clear_pending();
        vm.collect_garbage();
        let baseline = vm.heap_stats().live_bytes;

        let original = vm.new_instance(class).ok().unwrap();
        let after_new = vm.heap_stats().live_bytes;
        let copy = vm.clone_object(original).ok().unwrap();
        let per_object = after_new - baseline;
        assert_eq!(vm.heap_stats().live_bytes, after_new + per_object);
        assert_eq!(vm.heap.get(copy).map(Object::size), Some(per_object));

        for _ in 0..20 {
            vm.clone_object(original).ok().unwrap();
        }
        vm.heap.clear_pending();
        vm.collect_garbage();
        assert_eq!(vm.heap_stats().live_bytes, baseline);
        assert!(vm.new_int_array(&[1]).is_ok());
    }

    #[test]
    fn exhausted_heap_raises_out_of_memory() {
        let mut vm = TestVm::with_config(VMConfig::default().set_heap_limit(256 * 1024));
        let big = vm.load_class("[J").ok().unwrap();
        match vm.new_array(big, 1 << 20) {
            Err(Throw::Exception(obj)) => {
                assert_eq!(Some(obj), vm.out_of_memory);
            }
            other => panic!("expected OutOfMemoryError, got {:?}", other.map(|_| ())),
        }
        let negative = vm.new_array(big, -1);
        assert!(matches!(negative, Err(Throw::Exception(_))));
    }
}
