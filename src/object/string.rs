use std::collections::HashMap;

use super::prelude::*;

pub const CODER_LATIN1: JByte = 0;
pub const CODER_UTF16: JByte = 1;

/// Encodes text into the byte payload of a `java/lang/String`. Latin-1
/// when every char fits a byte, UTF-16LE otherwise.
pub fn encode(text: &str) -> (Vec<JByte>, JByte) {
    if text.chars().all(|c| (c as u32) <= 0xff) {
        (text.chars().map(|c| c as u32 as u8 as JByte).collect(), CODER_LATIN1)
    } else {
        let bytes = text
            .encode_utf16()
            .flat_map(|unit| unit.to_le_bytes())
            .map(|b| b as JByte)
            .collect();
        (bytes, CODER_UTF16)
    }
}

pub fn encode_utf16(units: &[JChar]) -> (Vec<JByte>, JByte) {
    if units.iter().all(|&u| u <= 0xff) {
        (units.iter().map(|&u| u as u8 as JByte).collect(), CODER_LATIN1)
    } else {
        let bytes = units
            .iter()
            .flat_map(|unit| unit.to_le_bytes())
            .map(|b| b as JByte)
            .collect();
        (bytes, CODER_UTF16)
    }
}

pub fn to_utf16(bytes: &[JByte], coder: JByte) -> Vec<JChar> {
    if coder == CODER_LATIN1 {
        bytes.iter().map(|&b| b as u8 as JChar).collect()
    } else {
        bytes
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0] as u8, pair[1] as u8]))
            .collect()
    }
}

pub fn decode(bytes: &[JByte], coder: JByte) -> String {
    String::from_utf16_lossy(&to_utf16(bytes, coder))
}

/// `String.hashCode`: `s[0]*31^(n-1) + ... + s[n-1]`.
pub fn java_hash(units: &[JChar]) -> JInt {
    units
        .iter()
        .fold(0i32, |h, &c| h.wrapping_mul(31).wrapping_add(c as i32))
}

/// `Double.toString` / `Float.toString` formatting: plain decimal for
/// magnitudes in `[1e-3, 1e7)`, computerized scientific notation
/// otherwise. `single` formats the shortest `float` representation.
pub fn format_float(value: JDouble, single: bool) -> String {
    if value.is_nan() {
        return "NaN".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if value == 0.0 {
        return if value.is_sign_negative() { "-0.0" } else { "0.0" }.to_string();
    }
    if (1e-3..1e7).contains(&value.abs()) {
        let text = if single {
            format!("{}", value as JFloat)
        } else {
            format!("{}", value)
        };
        if text.contains('.') {
            text
        } else {
            format!("{}.0", text)
        }
    } else {
        let text = if single {
            format!("{:e}", value as JFloat)
        } else {
            format!("{:e}", value)
        };
        let (mantissa, exponent) = text.split_once('e').unwrap_or((text.as_str(), "0"));
        if mantissa.contains('.') {
            format!("{}E{}", mantissa, exponent)
        } else {
            format!("{}.0E{}", mantissa, exponent)
        }
    }
}

/// Interned `java/lang/String` objects by content. Entries are sticky
/// roots and never collected.
#[derive(Default)]
pub struct StringTable {
    table: HashMap<String, ObjRef>,
}

impl StringTable {
    pub fn get(&self, text: &str) -> Option<ObjRef> {
        self.table.get(text).copied()
    }

    pub fn insert(&mut self, text: String, obj: ObjRef) {
        self.table.insert(text, obj);
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn trace(&self, visitor: &mut dyn FnMut(ObjRef)) {
        self.table.values().for_each(|obj| visitor(*obj));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latin1_and_utf16_round_trip() {
        let (bytes, coder) = encode("héllo");
        assert_eq!(coder, CODER_LATIN1);
        assert_eq!(bytes.len(), 5);
        assert_eq!(decode(&bytes, coder), "héllo");

        let (bytes, coder) = encode("π≈3");
        assert_eq!(coder, CODER_UTF16);
        assert_eq!(bytes.len(), 6);
        assert_eq!(decode(&bytes, coder), "π≈3");
    }

    #[test]
    fn floats_format_like_java() {
        assert_eq!(format_float(1.0, false), "1.0");
        assert_eq!(format_float(0.1, false), "0.1");
        assert_eq!(format_float(-2.5, false), "-2.5");
        assert_eq!(format_float(1e10, false), "1.0E10");
        assert_eq!(format_float(1.5e-5, false), "1.5E-5");
        assert_eq!(format_float(0.1f32 as f64, true), "0.1");
        assert_eq!(format_float(-0.0, false), "-0.0");
        assert_eq!(format_float(f64::NAN, true), "NaN");
        assert_eq!(format_float(f64::NEG_INFINITY, false), "-Infinity");
    }

    #[test]
    fn hash_matches_java() {
        let units: Vec<u16> = "hello".encode_utf16().collect();
        assert_eq!(java_hash(&units), 99162322);
        assert_eq!(java_hash(&[]), 0);
    }
}
