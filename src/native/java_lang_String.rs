use crate::object::prelude::*;
use crate::object::string;
use crate::runtime::exception::ExceptionKind;
use crate::runtime::{Throw, ThrowResult};
use crate::value::JValue;
use crate::vm::{VMError, VM};

use super::{non_null, NativeArgs};

fn units_of(vm: &mut VM, obj: Option<ObjRef>) -> ThrowResult<Vec<JChar>> {
    let obj = non_null(vm, obj, "string")?;
    vm.string_utf16(obj)
        .ok_or_else(|| VMError::InvalidState(format!("{:?} is not a string", obj)).into())
}

fn string_result(vm: &mut VM, text: &str) -> Result<JValue, Throw> {
    Ok(JValue::Object(Some(vm.new_java_string(text)?)))
}

pub fn Java_java_lang_String_length(vm: &mut VM, args: &NativeArgs) -> Result<JValue, Throw> {
    let units = units_of(vm, args.this())?;
    Ok(JValue::Int(units.len() as JInt))
}

pub fn Java_java_lang_String_isEmpty(vm: &mut VM, args: &NativeArgs) -> Result<JValue, Throw> {
    let units = units_of(vm, args.this())?;
    Ok(JValue::Int(units.is_empty() as JInt))
}

pub fn Java_java_lang_String_charAt(vm: &mut VM, args: &NativeArgs) -> Result<JValue, Throw> {
    let units = units_of(vm, args.this())?;
    let index = args.int(1);
    match usize::try_from(index).ok().and_then(|i| units.get(i)) {
        Some(unit) => Ok(JValue::Int(*unit as JInt)),
        None => {
            let message = format!("Index {} out of bounds for length {}", index, units.len());
            Err(vm.throw_new(ExceptionKind::StringIndexOutOfBoundsException, Some(message)))
        }
    }
}

pub fn Java_java_lang_String_equals(vm: &mut VM, args: &NativeArgs) -> Result<JValue, Throw> {
    let this = non_null(vm, args.this(), "this")?;
    let equal = match args.obj(1) {
        Some(other) if other == this => true,
        // anything that is not a string compares unequal
        Some(other) => match (vm.string_utf16(this), vm.string_utf16(other)) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        },
        None => false,
    };
    Ok(JValue::Int(equal as JInt))
}

/// Computed on first use and cached in the `hash` field.
pub fn Java_java_lang_String_hashCode(vm: &mut VM, args: &NativeArgs) -> Result<JValue, Throw> {
    let this = non_null(vm, args.this(), "this")?;
    let slot = vm.well_known.string_hash;
    let cached = vm
        .heap
        .get(this)
        .and_then(Object::fields)
        .map_or(0, |fields| fields.get_int(slot));
    if cached != 0 {
        return Ok(JValue::Int(cached));
    }
    let hash = string::java_hash(&units_of(vm, Some(this))?);
    if let Some(fields) = vm.heap.get_mut(this).and_then(Object::fields_mut) {
        fields.set_int(slot, hash);
    }
    Ok(JValue::Int(hash))
}

pub fn Java_java_lang_String_intern(vm: &mut VM, args: &NativeArgs) -> Result<JValue, Throw> {
    let this = non_null(vm, args.this(), "this")?;
    let canonical = vm
        .intern_object(this)
        .ok_or_else(|| VMError::InvalidState(format!("{:?} is not a string", this)))?;
    Ok(JValue::Object(Some(canonical)))
}

pub fn Java_java_lang_String_concat(vm: &mut VM, args: &NativeArgs) -> Result<JValue, Throw> {
    let mut units = units_of(vm, args.this())?;
    let tail = units_of(vm, args.obj(1))?;
    if tail.is_empty() {
        return Ok(JValue::Object(args.this()));
    }
    units.extend_from_slice(&tail);
    Ok(JValue::Object(Some(vm.new_string_from_utf16(&units)?)))
}

pub fn Java_java_lang_String_valueOfInt(vm: &mut VM, args: &NativeArgs) -> Result<JValue, Throw> {
    string_result(vm, &args.int(0).to_string())
}

pub fn Java_java_lang_String_valueOfLong(vm: &mut VM, args: &NativeArgs) -> Result<JValue, Throw> {
    string_result(vm, &args.long(0).to_string())
}

pub fn Java_java_lang_String_valueOfFloat(vm: &mut VM, args: &NativeArgs) -> Result<JValue, Throw> {
    string_result(vm, &string::format_float(args.float(0) as JDouble, true))
}

pub fn Java_java_lang_String_valueOfDouble(vm: &mut VM, args: &NativeArgs) -> Result<JValue, Throw> {
    string_result(vm, &string::format_float(args.double(0), false))
}

pub fn Java_java_lang_String_valueOfBoolean(vm: &mut VM, args: &NativeArgs) -> Result<JValue, Throw> {
    string_result(vm, if args.int(0) != 0 { "true" } else { "false" })
}

pub fn Java_java_lang_String_valueOfChar(vm: &mut VM, args: &NativeArgs) -> Result<JValue, Throw> {
    let unit = args.int(0) as JChar;
    Ok(JValue::Object(Some(vm.new_string_from_utf16(&[unit])?)))
}
