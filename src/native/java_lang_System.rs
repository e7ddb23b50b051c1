use std::sync::OnceLock;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use crate::object::prelude::*;
use crate::runtime::exception::ExceptionKind;
use crate::runtime::{Throw, ThrowResult};
use crate::value::JValue;
use crate::vm::VM;

use super::{non_null, NativeArgs};

fn array_store(vm: &mut VM, message: String) -> Throw {
    vm.throw_new(ExceptionKind::ArrayStoreException, Some(format!("arraycopy: {}", message)))
}

fn array_len(vm: &mut VM, array: ObjRef, role: &str) -> ThrowResult<usize> {
    if let Some(data) = vm.heap.get(array).and_then(Object::array) {
        return Ok(data.len());
    }
    let class = vm.class_of(array)?;
    let message = format!("{} type {} is not an array", role, vm.registry.class(class).java_name());
    Err(array_store(vm, message))
}

/// Elements of `src` that may not go into `dst`. `None` when the element
/// types are compatible as a whole.
fn needs_element_checks(vm: &VM, src: ObjRef, dst: ObjRef) -> ThrowResult<Option<ClassId>> {
    let src_class = vm.class_of(src)?;
    let dst_class = vm.class_of(dst)?;
    if vm.registry.is_assignable(src_class, dst_class) {
        return Ok(None);
    }
    Ok(vm.registry.class(dst_class).array.and_then(|info| info.component))
}

pub fn Java_java_lang_System_arraycopy(vm: &mut VM, args: &NativeArgs) -> Result<JValue, Throw> {
    let src = non_null(vm, args.obj(0), "src")?;
    let src_pos = args.int(1);
    let dst = non_null(vm, args.obj(2), "dest")?;
    let dst_pos = args.int(3);
    let length = args.int(4);

    let src_len = array_len(vm, src, "source")?;
    let dst_len = array_len(vm, dst, "destination")?;
    let (src_class, dst_class) = (vm.class_of(src)?, vm.class_of(dst)?);
    let element = |class| vm.registry.class(class).array.map(|info| info.element);
    let (src_kind, dst_kind) = (element(src_class), element(dst_class));
    if src_kind != dst_kind {
        let (s, d) = (src_class, dst_class);
        let message = format!(
            "type mismatch: can not copy {} into {}",
            vm.registry.class(s).java_name(),
            vm.registry.class(d).java_name()
        );
        return Err(array_store(vm, message));
    }
    for (pos, len, role) in [(src_pos, src_len, "source"), (dst_pos, dst_len, "destination")] {
        let out_of_bounds = pos < 0 || length < 0 || pos as i64 + length as i64 > len as i64;
        if out_of_bounds {
            let message = if pos < 0 {
                format!("arraycopy: {} index {} out of bounds for length {}", role, pos, len)
            } else if length < 0 {
                format!("arraycopy: length {} is negative", length)
            } else {
                format!(
                    "arraycopy: last {} index {} out of bounds for length {}",
                    role,
                    pos as i64 + length as i64,
                    len
                )
            };
            return Err(vm.throw_new(ExceptionKind::ArrayIndexOutOfBoundsException, Some(message)));
        }
    }
    let (src_pos, dst_pos, length) = (src_pos as usize, dst_pos as usize, length as usize);
    if length == 0 {
        return Ok(JValue::Void);
    }

    if src == dst {
        if let Some(data) = vm.heap.get_mut(dst).and_then(Object::array_mut) {
            data.copy_within(src_pos, dst_pos, length);
        }
        return Ok(JValue::Void);
    }

    let checked = match dst_kind {
        Some(ValueKind::Reference) => needs_element_checks(vm, src, dst)?,
        _ => None,
    };
    if let Some(component) = checked {
        let elements: Vec<Option<ObjRef>> = match vm.heap.get(src).and_then(Object::array) {
            Some(ArrayData::Ref(elements)) => elements[src_pos..src_pos + length].to_vec(),
            _ => Vec::new(),
        };
        for (offset, element) in elements.into_iter().enumerate() {
            if let Some(obj) = element {
                let class = vm.class_of(obj)?;
                if !vm.registry.is_assignable(class, component) {
                    let message = format!(
                        "element type mismatch: can not cast one of the elements of {}[] to the type of the destination array, {}",
                        vm.registry.class(class).java_name(),
                        vm.registry.class(component).java_name()
                    );
                    return Err(array_store(vm, message));
                }
            }
            if let Some(ArrayData::Ref(target)) = vm.heap.get_mut(dst).and_then(Object::array_mut) {
                target[dst_pos + offset] = element;
            }
        }
        return Ok(JValue::Void);
    }

    // the destination storage is moved out so both arrays can be borrowed
    let Some(mut target) = vm
        .heap
        .get_mut(dst)
        .and_then(Object::array_mut)
        .map(|data| std::mem::replace(data, ArrayData::Byte(Box::default())))
    else {
        return Ok(JValue::Void);
    };
    if let Some(source) = vm.heap.get(src).and_then(Object::array) {
        target.copy_from(dst_pos, source, src_pos, length);
    }
    if let Some(data) = vm.heap.get_mut(dst).and_then(Object::array_mut) {
        *data = target;
    }
    Ok(JValue::Void)
}

pub fn Java_java_lang_System_identityHashCode(vm: &mut VM, args: &NativeArgs) -> Result<JValue, Throw> {
    Ok(JValue::Int(args.obj(0).map_or(0, |obj| vm.identity_hash(obj))))
}

pub fn Java_java_lang_System_currentTimeMillis(_vm: &mut VM, _args: &NativeArgs) -> Result<JValue, Throw> {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_millis() as JLong);
    Ok(JValue::Long(millis))
}

pub fn Java_java_lang_System_nanoTime(_vm: &mut VM, _args: &NativeArgs) -> Result<JValue, Throw> {
    static ORIGIN: OnceLock<Instant> = OnceLock::new();
    let origin = ORIGIN.get_or_init(Instant::now);
    Ok(JValue::Long(origin.elapsed().as_nanos() as JLong))
}

pub fn Java_java_lang_System_gc(vm: &mut VM, _args: &NativeArgs) -> Result<JValue, Throw> {
    vm.collect_garbage();
    Ok(JValue::Void)
}
