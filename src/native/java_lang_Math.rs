use paste::paste;

use crate::object::prelude::*;
use crate::runtime::Throw;
use crate::value::JValue;
use crate::vm::VM;

use super::NativeArgs;

macro_rules! unary_math {
    ($($name:ident => $f:expr),* $(,)?) => {
        paste! {
            $(
                pub fn [<Java_java_lang_Math_ $name>](_vm: &mut VM, args: &NativeArgs) -> Result<JValue, Throw> {
                    let f: fn(JDouble) -> JDouble = $f;
                    Ok(JValue::Double(f(args.double(0))))
                }
            )*
        }
    };
}

macro_rules! binary_math {
    ($($name:ident => $f:expr),* $(,)?) => {
        paste! {
            $(
                pub fn [<Java_java_lang_Math_ $name>](_vm: &mut VM, args: &NativeArgs) -> Result<JValue, Throw> {
                    let f: fn(JDouble, JDouble) -> JDouble = $f;
                    Ok(JValue::Double(f(args.double(0), args.double(2))))
                }
            )*
        }
    };
}

unary_math! {
    sin => f64::sin,
    cos => f64::cos,
    tan => f64::tan,
    asin => f64::asin,
    acos => f64::acos,
    atan => f64::atan,
    exp => f64::exp,
    log => f64::ln,
    log10 => f64::log10,
    sqrt => f64::sqrt,
    cbrt => f64::cbrt,
    floor => f64::floor,
    ceil => f64::ceil,
    rint => f64::round_ties_even,
    absDouble => f64::abs,
}

binary_math! {
    atan2 => f64::atan2,
    pow => java_pow,
    hypot => f64::hypot,
    maxDouble => java_max,
    minDouble => java_min,
}

/// A NaN exponent gives NaN, and so does a base of magnitude one raised to
/// an infinite power. `powf` returns `1.0` for both.
fn java_pow(base: JDouble, exponent: JDouble) -> JDouble {
    if exponent.is_nan() || (base.abs() == 1.0 && exponent.is_infinite()) {
        return JDouble::NAN;
    }
    base.powf(exponent)
}

/// NaN wins, and `-0.0` is smaller than `0.0`.
fn java_max(a: JDouble, b: JDouble) -> JDouble {
    if a.is_nan() || b.is_nan() {
        JDouble::NAN
    } else if a == b {
        if a.is_sign_negative() { b } else { a }
    } else {
        a.max(b)
    }
}

fn java_min(a: JDouble, b: JDouble) -> JDouble {
    if a.is_nan() || b.is_nan() {
        JDouble::NAN
    } else if a == b {
        if a.is_sign_negative() { a } else { b }
    } else {
        a.min(b)
    }
}

pub fn Java_java_lang_Math_absInt(_vm: &mut VM, args: &NativeArgs) -> Result<JValue, Throw> {
    Ok(JValue::Int(args.int(0).wrapping_abs()))
}

pub fn Java_java_lang_Math_absLong(_vm: &mut VM, args: &NativeArgs) -> Result<JValue, Throw> {
    Ok(JValue::Long(args.long(0).wrapping_abs()))
}

pub fn Java_java_lang_Math_absFloat(_vm: &mut VM, args: &NativeArgs) -> Result<JValue, Throw> {
    Ok(JValue::Float(args.float(0).abs()))
}

pub fn Java_java_lang_Math_maxInt(_vm: &mut VM, args: &NativeArgs) -> Result<JValue, Throw> {
    Ok(JValue::Int(args.int(0).max(args.int(1))))
}

pub fn Java_java_lang_Math_minInt(_vm: &mut VM, args: &NativeArgs) -> Result<JValue, Throw> {
    Ok(JValue::Int(args.int(0).min(args.int(1))))
}

pub fn Java_java_lang_Math_maxLong(_vm: &mut VM, args: &NativeArgs) -> Result<JValue, Throw> {
    Ok(JValue::Long(args.long(0).max(args.long(2))))
}

pub fn Java_java_lang_Math_minLong(_vm: &mut VM, args: &NativeArgs) -> Result<JValue, Throw> {
    Ok(JValue::Long(args.long(0).min(args.long(2))))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_min_follow_java_rules() {
        assert!(java_max(1.0, JDouble::NAN).is_nan());
        assert!(java_min(-0.0, 0.0).is_sign_negative());
        assert!(java_max(-0.0, 0.0).is_sign_positive());
        assert_eq!(java_max(2.0, 3.0), 3.0);
        assert_eq!(java_min(2.0, 3.0), 2.0);
    }

    #[test]
    fn pow_edge_cases() {
        assert_eq!(java_pow(JDouble::NAN, 0.0), 1.0);
        assert!(java_pow(1.0, JDouble::INFINITY).is_nan());
        assert!(java_pow(2.0, JDouble::NAN).is_nan());
        assert_eq!(java_pow(2.0, 10.0), 1024.0);
    }

    #[test]
    fn rint_rounds_half_to_even() {
        assert_eq!(f64::round_ties_even(2.5), 2.0);
        assert_eq!(f64::round_ties_even(3.5), 4.0);
        assert_eq!(f64::round_ties_even(-2.5), -2.0);
    }
}
