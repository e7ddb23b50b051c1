use super::ClassLoadErr;
use crate::object::field::ValueKind;

/// One element of a field or method descriptor.
#[derive(PartialEq, Debug, Clone, Copy)]
pub enum Descriptor<'a> {
    Primitive(ValueKind),
    Void,
    /// Class name without the `L`/`;` wrapping.
    Object(&'a str),
    /// Full array descriptor, e.g. `[[I` or `[Ljava/lang/Object;`.
    Array(&'a str),
    OpenParenthesis,
    CloseParenthesis,
}

impl<'a> Descriptor<'a> {
    pub fn kind(&self) -> Option<ValueKind> {
        match self {
            Descriptor::Primitive(kind) => Some(*kind),
            Descriptor::Object(_) | Descriptor::Array(_) => Some(ValueKind::Reference),
            _ => None,
        }
    }

    /// Registry name of the type: `java/lang/String`, `[I`, or `None` for
    /// primitives and `void`.
    pub fn class_name(&self) -> Option<&'a str> {
        match self {
            Descriptor::Object(name) | Descriptor::Array(name) => Some(name),
            _ => None,
        }
    }
}

pub struct DescriptorParser<'a> {
    value: &'a str,
    offset: usize,
}

impl<'a> DescriptorParser<'a> {
    pub fn new(value: &'a str) -> DescriptorParser<'a> {
        Self { value, offset: 0 }
    }

    fn invalid(&self) -> ClassLoadErr {
        ClassLoadErr::InvalidFormat(format!(
            "invalid descriptor {:?} at {}",
            self.value, self.offset
        ))
    }

    fn next_descriptor(&mut self) -> Result<Descriptor<'a>, ClassLoadErr> {
        let bytes = self.value.as_bytes();
        let start = self.offset;
        let prefix = bytes[start];
        self.offset += 1;
        match prefix {
            b'(' => Ok(Descriptor::OpenParenthesis),
            b')' => Ok(Descriptor::CloseParenthesis),
            b'V' => Ok(Descriptor::Void),
            b'L' => {
                let end = self.value[start..]
                    .find(';')
                    .map(|i| start + i)
                    .ok_or_else(|| self.invalid())?;
                if end == start + 1 {
                    return Err(self.invalid());
                }
                self.offset = end + 1;
                Ok(Descriptor::Object(&self.value[start + 1..end]))
            }
            b'[' => {
                while self.offset < bytes.len() && bytes[self.offset] == b'[' {
                    self.offset += 1;
                }
                if self.offset - start > 255 || self.offset >= bytes.len() {
                    return Err(self.invalid());
                }
                match self.next_descriptor()? {
                    Descriptor::Primitive(_) | Descriptor::Object(_) => {
                        Ok(Descriptor::Array(&self.value[start..self.offset]))
                    }
                    _ => Err(self.invalid()),
                }
            }
            c => ValueKind::from_descriptor_char(c)
                .map(Descriptor::Primitive)
                .ok_or_else(|| self.invalid()),
        }
    }
}

impl<'a> Iterator for DescriptorParser<'a> {
    type Item = Result<Descriptor<'a>, ClassLoadErr>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset >= self.value.len() {
            return None;
        }
        Some(self.next_descriptor())
    }
}

/// Parses a single field type such as `I` or `[Ljava/lang/String;`.
pub fn parse_field_type(descriptor: &str) -> Result<Descriptor<'_>, ClassLoadErr> {
    let mut parser = DescriptorParser::new(descriptor);
    let result = match parser.next() {
        Some(Ok(d @ (Descriptor::Primitive(_) | Descriptor::Object(_) | Descriptor::Array(_)))) => d,
        Some(Err(e)) => return Err(e),
        _ => return Err(parser.invalid()),
    };
    if parser.next().is_some() {
        return Err(parser.invalid());
    }
    Ok(result)
}

#[derive(Debug, Clone, PartialEq)]
pub struct MethodDescriptor {
    pub params: Vec<ValueKind>,
    /// `None` for `void`.
    pub ret: Option<ValueKind>,
    /// Argument slots, `long` and `double` counting twice.
    pub arg_slots: u16,
}

impl MethodDescriptor {
    pub fn parse(descriptor: &str) -> Result<MethodDescriptor, ClassLoadErr> {
        let mut parser = DescriptorParser::new(descriptor);
        if parser.next().transpose()? != Some(Descriptor::OpenParenthesis) {
            return Err(parser.invalid());
        }
        let mut params = vec![];
        let mut arg_slots = 0u16;
        loop {
            match parser.next().transpose()? {
                Some(Descriptor::CloseParenthesis) => break,
                Some(d) => {
                    let kind = d.kind().ok_or_else(|| parser.invalid())?;
                    arg_slots += kind.slots() as u16;
                    params.push(kind);
                }
                None => return Err(parser.invalid()),
            }
        }
        let ret = match parser.next().transpose()? {
            Some(Descriptor::Void) => None,
            Some(d) => Some(d.kind().ok_or_else(|| parser.invalid())?),
            None => return Err(parser.invalid()),
        };
        if parser.next().is_some() {
            return Err(parser.invalid());
        }
        Ok(MethodDescriptor {
            params,
            ret,
            arg_slots,
        })
    }

    /// Parameter type descriptors in declaration order.
    pub fn param_types(descriptor: &str) -> Result<Vec<Descriptor<'_>>, ClassLoadErr> {
        DescriptorParser::new(descriptor)
            .skip(1)
            .take_while(|d| !matches!(d, Ok(Descriptor::CloseParenthesis)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_primitive_descriptor() {
        let mut descriptor = DescriptorParser::new("IIJ");
        assert_eq!(Some(Ok(Descriptor::Primitive(ValueKind::Int))), descriptor.next());
        assert_eq!(Some(Ok(Descriptor::Primitive(ValueKind::Int))), descriptor.next());
        assert_eq!(Some(Ok(Descriptor::Primitive(ValueKind::Long))), descriptor.next());
        assert_eq!(None, descriptor.next());
    }

    #[test]
    fn parse_ref_descriptor() {
        let parsed: Vec<_> = DescriptorParser::new(
            "ILjava/lang/String;[Ljava/lang/Object;[[[Ljava/lang/Object;[[ZD",
        )
        .collect::<Result<_, _>>()
        .unwrap();
        assert_eq!(
            parsed,
            vec![
                Descriptor::Primitive(ValueKind::Int),
                Descriptor::Object("java/lang/String"),
                Descriptor::Array("[Ljava/lang/Object;"),
                Descriptor::Array("[[[Ljava/lang/Object;"),
                Descriptor::Array("[[Z"),
                Descriptor::Primitive(ValueKind::Double),
            ]
        );
    }

    #[test]
    fn parse_method_descriptor_counts_wide_slots() {
        let desc = MethodDescriptor::parse("(IJLjava/lang/String;D)V").unwrap();
        assert_eq!(desc.arg_slots, 6);
        assert_eq!(desc.ret, None);
        assert_eq!(
            desc.params,
            vec![ValueKind::Int, ValueKind::Long, ValueKind::Reference, ValueKind::Double]
        );

        let desc = MethodDescriptor::parse("([[IZ)Ljava/lang/Object;").unwrap();
        assert_eq!(desc.arg_slots, 2);
        assert_eq!(desc.ret, Some(ValueKind::Reference));
        assert_eq!(MethodDescriptor::parse("()J").unwrap().arg_slots, 0);
    }

    #[test]
    fn malformed_descriptors_are_rejected() {
        for bad in ["(I", "I)V", "(Ljava/lang/String)V", "(V)V", "(I)", "(I)VV", "([)V", "(Q)V", "(L;)V"] {
            assert!(MethodDescriptor::parse(bad).is_err(), "{}", bad);
        }
        assert!(parse_field_type("V").is_err());
        assert!(parse_field_type("II").is_err());
        assert_eq!(parse_field_type("[J").unwrap(), Descriptor::Array("[J"));
    }

    #[test]
    fn param_types_in_order() {
        let params = MethodDescriptor::param_types("(J[ILFoo;)V").unwrap();
        assert_eq!(
            params,
            vec![
                Descriptor::Primitive(ValueKind::Long),
                Descriptor::Array("[I"),
                Descriptor::Object("Foo"),
            ]
        );
    }
}
