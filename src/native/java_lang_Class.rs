use crate::classfile::ClassLoadErr;
use crate::object::prelude::*;
use crate::runtime::exception::ExceptionKind;
use crate::runtime::{Throw, ThrowResult};
use crate::value::JValue;
use crate::vm::{VMError, VM};

use super::{non_null, NativeArgs};

fn this_class(vm: &mut VM, args: &NativeArgs) -> ThrowResult<ClassId> {
    let this = non_null(vm, args.this(), "this")?;
    vm.mirror_class(this)
        .ok_or_else(|| VMError::InvalidState(format!("{:?} is not a class mirror", this)).into())
}

pub fn Java_java_lang_Class_getName(vm: &mut VM, args: &NativeArgs) -> Result<JValue, Throw> {
    let class = this_class(vm, args)?;
    let name = vm.registry.class(class).java_name();
    Ok(JValue::Object(Some(vm.new_java_string(&name)?)))
}

/// Loads and links the class, but does not run its initializer.
pub fn Java_java_lang_Class_forName(vm: &mut VM, args: &NativeArgs) -> Result<JValue, Throw> {
    let name_ref = non_null(vm, args.obj(0), "className")?;
    let name = vm
        .string_value(name_ref)
        .ok_or_else(|| VMError::InvalidState(format!("{:?} is not a string", name_ref)))?;
    if name.contains('/') {
        return Err(vm.throw_new(ExceptionKind::ClassNotFoundException, Some(name)));
    }
    let class = match vm.registry.load(&name.replace('.', "/"), &mut vm.symbols) {
        Ok(class) => class,
        Err(ClassLoadErr::NotFound(_)) => {
            return Err(vm.throw_new(ExceptionKind::ClassNotFoundException, Some(name)));
        }
        Err(e) => return Err(e.into()),
    };
    Ok(JValue::Object(Some(vm.class_mirror(class)?)))
}

pub fn Java_java_lang_Class_isInstance(vm: &mut VM, args: &NativeArgs) -> Result<JValue, Throw> {
    let class = this_class(vm, args)?;
    let instance = match args.obj(1) {
        Some(obj) => {
            let of = vm.class_of(obj)?;
            vm.registry.is_assignable(of, class)
        }
        None => false,
    };
    Ok(JValue::Int(instance as JInt))
}

pub fn Java_java_lang_Class_isArray(vm: &mut VM, args: &NativeArgs) -> Result<JValue, Throw> {
    let class = this_class(vm, args)?;
    Ok(JValue::Int(vm.registry.class(class).is_array() as JInt))
}

pub fn Java_java_lang_Class_isInterface(vm: &mut VM, args: &NativeArgs) -> Result<JValue, Throw> {
    let class = this_class(vm, args)?;
    Ok(JValue::Int(vm.registry.class(class).is_interface() as JInt))
}

pub fn Java_java_lang_Class_getSuperclass(vm: &mut VM, args: &NativeArgs) -> Result<JValue, Throw> {
    let class = this_class(vm, args)?;
    let class = vm.registry.class(class);
    let super_class = if class.is_interface() { None } else { class.super_class };
    match super_class {
        Some(super_class) => Ok(JValue::Object(Some(vm.class_mirror(super_class)?))),
        None => Ok(JValue::Object(None)),
    }
}
