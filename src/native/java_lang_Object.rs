use crate::object::prelude::*;
use crate::runtime::exception::ExceptionKind;
use crate::runtime::Throw;
use crate::value::JValue;
use crate::vm::VM;

use super::{non_null, NativeArgs};

pub fn Java_java_lang_Object_hashCode(vm: &mut VM, args: &NativeArgs) -> Result<JValue, Throw> {
    let this = non_null(vm, args.this(), "this")?;
    Ok(JValue::Int(vm.identity_hash(this)))
}

pub fn Java_java_lang_Object_getClass(vm: &mut VM, args: &NativeArgs) -> Result<JValue, Throw> {
    let this = non_null(vm, args.this(), "this")?;
    let class = vm.class_of(this)?;
    let mirror = vm.class_mirror(class)?;
    Ok(JValue::Object(Some(mirror)))
}

pub fn Java_java_lang_Object_clone(vm: &mut VM, args: &NativeArgs) -> Result<JValue, Throw> {
    let this = non_null(vm, args.this(), "this")?;
    let copy = vm.clone_object(this)?;
    Ok(JValue::Object(Some(copy)))
}

pub fn Java_java_lang_Object_toString(vm: &mut VM, args: &NativeArgs) -> Result<JValue, Throw> {
    let this = non_null(vm, args.this(), "this")?;
    let class = vm.class_of(this)?;
    let text = format!(
        "{}@{:x}",
        vm.registry.class(class).java_name(),
        vm.identity_hash(this)
    );
    Ok(JValue::Object(Some(vm.new_java_string(&text)?)))
}

/// `notify` and `notifyAll`. Executions never wait, so only ownership is
/// checked.
pub fn Java_java_lang_Object_notify(vm: &mut VM, args: &NativeArgs) -> Result<JValue, Throw> {
    let this = non_null(vm, args.this(), "this")?;
    let owner = vm.exec.id;
    let owned = vm
        .heap
        .get(this)
        .map_or(false, |object| object.header.monitor.count > 0 && object.header.monitor.owner == owner);
    if !owned {
        let message = "current thread is not owner".to_string();
        return Err(vm.throw_new(ExceptionKind::IllegalMonitorStateException, Some(message)));
    }
    Ok(JValue::Void)
}
