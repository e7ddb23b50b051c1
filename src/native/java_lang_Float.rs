use crate::object::prelude::*;
use crate::runtime::Throw;
use crate::value::JValue;
use crate::vm::VM;

use super::NativeArgs;

/// Bits of the canonical NaN `floatToIntBits` collapses every NaN to.
const CANONICAL_NAN: JInt = 0x7fc0_0000;

pub fn Java_java_lang_Float_floatToRawIntBits(_vm: &mut VM, args: &NativeArgs) -> Result<JValue, Throw> {
    Ok(JValue::Int(args.float(0).to_bits() as JInt))
}

pub fn Java_java_lang_Float_floatToIntBits(_vm: &mut VM, args: &NativeArgs) -> Result<JValue, Throw> {
    let value = args.float(0);
    if value.is_nan() {
        return Ok(JValue::Int(CANONICAL_NAN));
    }
    Ok(JValue::Int(value.to_bits() as JInt))
}

pub fn Java_java_lang_Float_intBitsToFloat(_vm: &mut VM, args: &NativeArgs) -> Result<JValue, Throw> {
    Ok(JValue::Float(JFloat::from_bits(args.int(0) as u32)))
}

pub fn Java_java_lang_Float_isNaN(_vm: &mut VM, args: &NativeArgs) -> Result<JValue, Throw> {
    Ok(JValue::Int(args.float(0).is_nan() as JInt))
}
