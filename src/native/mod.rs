pub(crate) mod builtin_natives;
#[allow(non_snake_case)]
mod java_io_PrintStream;
#[allow(non_snake_case)]
mod java_lang_Class;
#[allow(non_snake_case)]
mod java_lang_Double;
#[allow(non_snake_case)]
mod java_lang_Float;
#[allow(non_snake_case)]
mod java_lang_Math;
#[allow(non_snake_case)]
mod java_lang_Object;
#[allow(non_snake_case)]
mod java_lang_String;
#[allow(non_snake_case)]
mod java_lang_System;
#[allow(non_snake_case)]
mod java_lang_Thread;

use std::collections::HashMap;

use crate::object::prelude::*;
use crate::runtime::stack::StackPrimitiveValue;
use crate::runtime::Throw;
use crate::value::JValue;
use crate::vm::VM;

/// Calling convention shared by built-in and embedder natives. The
/// result is pushed by the caller; `Void` pushes nothing.
pub type NativeMethod = fn(&mut VM, &NativeArgs) -> Result<JValue, Throw>;

/// Argument slots of a native call, laid out like interpreted locals:
/// receiver first for instance methods, wide values in two slots.
pub struct NativeArgs {
    slots: Vec<Slot>,
}

impl NativeArgs {
    pub fn new(slots: Vec<Slot>) -> Self {
        Self { slots }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn read<T: StackPrimitiveValue>(&self, index: usize) -> T {
        match self.slots.get(index..index + T::SLOTS) {
            Some(slots) => T::read(slots),
            None => T::read(&[0, 0]),
        }
    }

    pub fn int(&self, index: usize) -> JInt {
        self.read(index)
    }

    pub fn long(&self, index: usize) -> JLong {
        self.read(index)
    }

    pub fn float(&self, index: usize) -> JFloat {
        self.read(index)
    }

    pub fn double(&self, index: usize) -> JDouble {
        self.read(index)
    }

    pub fn obj(&self, index: usize) -> Option<ObjRef> {
        self.slots.get(index).and_then(|slot| ObjRef::from_slot(*slot))
    }

    /// Receiver of an instance native.
    #[inline]
    pub fn this(&self) -> Option<ObjRef> {
        self.obj(0)
    }
}

/// `NullPointerException` unless `obj` is set.
pub(crate) fn non_null(vm: &mut VM, obj: Option<ObjRef>, what: &str) -> Result<ObjRef, Throw> {
    match obj {
        Some(obj) => Ok(obj),
        None => Err(vm.null_pointer(format!("{} is null", what))),
    }
}

/// Natives by `class.name+descriptor`, e.g. `java/lang/Math.sqrt(D)D`.
pub struct NativeTable {
    fns: HashMap<String, NativeMethod>,
}

impl NativeTable {
    fn key(class_name: &str, name: &str, descriptor: &str) -> String {
        format!("{}.{}{}", class_name, name, descriptor)
    }

    pub fn empty() -> Self {
        Self { fns: HashMap::new() }
    }

    /// Table holding every built-in native.
    pub fn with_builtins() -> Self {
        let mut table = Self::empty();
        builtin_natives::register_all(&mut table);
        table
    }

    /// Adds or replaces a native. Returns the one it replaced.
    pub fn register(
        &mut self,
        class_name: &str,
        name: &str,
        descriptor: &str,
        native: NativeMethod,
    ) -> Option<NativeMethod> {
        self.fns.insert(Self::key(class_name, name, descriptor), native)
    }

    pub fn lookup(&self, class_name: &str, name: &str, descriptor: &str) -> Option<NativeMethod> {
        self.fns.get(&Self::key(class_name, name, descriptor)).copied()
    }

    pub fn len(&self) -> usize {
        self.fns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fns.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn forty_two(_vm: &mut VM, _args: &NativeArgs) -> Result<JValue, Throw> {
        Ok(JValue::Int(42))
    }

    #[test]
    fn args_follow_slot_layout() {
        let mut slots = vec![ObjRef::to_slot(Some(ObjRef::from_index(4))), 7];
        let mut wide = [0; 2];
        (-3i64).write(&mut wide);
        slots.extend_from_slice(&wide);
        slots.push(2.5f32.to_bits() as Slot);
        let args = NativeArgs::new(slots);
        assert_eq!(args.this(), Some(ObjRef::from_index(4)));
        assert_eq!(args.int(1), 7);
        assert_eq!(args.long(2), -3);
        assert_eq!(args.float(4), 2.5);
        assert_eq!(args.obj(9), None);
        assert_eq!(args.int(9), 0);
    }

    #[test]
    fn lookup_is_exact_on_descriptor() {
        let mut table = NativeTable::empty();
        assert!(table.register("demo/N", "f", "()I", forty_two).is_none());
        assert!(table.lookup("demo/N", "f", "()I").is_some());
        assert!(table.lookup("demo/N", "f", "()J").is_none());
        assert!(table.register("demo/N", "f", "()I", forty_two).is_some());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn builtins_cover_the_bootstrap_natives() {
        let table = NativeTable::with_builtins();
        for (class, name, desc) in [
            ("java/lang/Object", "hashCode", "()I"),
            ("java/lang/String", "intern", "()Ljava/lang/String;"),
            ("java/lang/System", "arraycopy", "(Ljava/lang/Object;ILjava/lang/Object;II)V"),
            ("java/lang/Math", "sqrt", "(D)D"),
            ("java/lang/Double", "doubleToRawLongBits", "(D)J"),
            ("java/io/PrintStream", "println", "(Ljava/lang/String;)V"),
        ] {
            assert!(table.lookup(class, name, desc).is_some(), "{}.{}{}", class, name, desc);
        }
    }
}
