use crate::object::prelude::*;
use crate::runtime::Throw;
use crate::value::JValue;
use crate::vm::VM;

use super::NativeArgs;

const CANONICAL_NAN: JLong = 0x7ff8_0000_0000_0000;

pub fn Java_java_lang_Double_doubleToRawLongBits(_vm: &mut VM, args: &NativeArgs) -> Result<JValue, Throw> {
    Ok(JValue::Long(args.double(0).to_bits() as JLong))
}

pub fn Java_java_lang_Double_doubleToLongBits(_vm: &mut VM, args: &NativeArgs) -> Result<JValue, Throw> {
    let value = args.double(0);
    if value.is_nan() {
        return Ok(JValue::Long(CANONICAL_NAN));
    }
    Ok(JValue::Long(value.to_bits() as JLong))
}

pub fn Java_java_lang_Double_longBitsToDouble(_vm: &mut VM, args: &NativeArgs) -> Result<JValue, Throw> {
    Ok(JValue::Double(JDouble::from_bits(args.long(0) as u64)))
}

pub fn Java_java_lang_Double_isNaN(_vm: &mut VM, args: &NativeArgs) -> Result<JValue, Throw> {
    Ok(JValue::Int(args.double(0).is_nan() as JInt))
}
