use super::descriptor::{parse_field_type, MethodDescriptor};
use super::reader::ClassReader;
use super::{ClassFile, ClassLoadErr, FieldInfo, MethodInfo};
use crate::object::constant_pool::{ConstPoolEntry, ConstantPool, ConstantTag};
use crate::object::method::{Code, ExceptionTable, LineNumber};
use crate::object::symbol::{Symbol, SymbolTable};

const CLASS_FILE_MAGIC: u32 = 0xCAFEBABE;

pub struct ClassParser<'a> {
    reader: Box<dyn ClassReader + 'a>,
    symbols: &'a mut SymbolTable,
}

impl<'a> ClassParser<'a> {
    pub fn new(reader: Box<dyn ClassReader + 'a>, symbols: &'a mut SymbolTable) -> Self {
        ClassParser { reader, symbols }
    }

    pub fn parse_class(&mut self) -> Result<ClassFile, ClassLoadErr> {
        let magic = self.reader.read_ubyte4()?;
        if magic != CLASS_FILE_MAGIC {
            return Err(ClassLoadErr::InvalidFormat(
                "cannot identify the magic number".to_string(),
            ));
        }
        let _minor_version = self.reader.read_ubyte2()?;
        let major_version = self.reader.read_ubyte2()?;
        if !Self::major_version_is_support(major_version) {
            return Err(ClassLoadErr::InvalidFormat(format!(
                "unsupported class file version {}",
                major_version
            )));
        }
        let cp = self.parse_constant_pool()?;
        let access_flags = self.reader.read_ubyte2()?;
        let this_class = cp.get_class_name(self.reader.read_ubyte2()?)?.clone();
        let super_class_index = self.reader.read_ubyte2()?;
        let super_class = if super_class_index != 0 {
            Some(cp.get_class_name(super_class_index)?.clone())
        } else {
            None
        };
        let interfaces = self.parse_interfaces(&cp)?;
        let fields = self.parse_fields(&cp)?;
        let methods = self.parse_methods(&cp)?;
        let source_file = self.parse_class_attrs(&cp)?;
        log::trace!(
            "ClassParser parsed: {}, {} fields, {} methods",
            this_class,
            fields.len(),
            methods.len()
        );
        Ok(ClassFile {
            major_version,
            constant_pool: cp,
            access_flags,
            this_class,
            super_class,
            interfaces,
            fields,
            methods,
            source_file,
        })
    }

    /// jvms-4.4
    fn parse_constant_pool(&mut self) -> Result<ConstantPool, ClassLoadErr> {
        let cp_count = self.reader.read_ubyte2()?;
        // The constant_pool table is indexed from 1 to constant_pool_count - 1.
        let mut cp = ConstantPool::new(cp_count);
        let mut index = 1;
        while index < cp_count {
            let tag_u8 = self.reader.read_ubyte1()?;
            let tag = ConstantTag::from_u8(tag_u8).ok_or_else(|| {
                ClassLoadErr::InvalidFormat(format!("invalid constant tag {} at #{}", tag_u8, index))
            })?;
            let entry = match tag {
                ConstantTag::Utf8 => {
                    let length = usize::from(self.reader.read_ubyte2()?);
                    let bytes = self.reader.read_nbytes(length)?;
                    let text = decode_modified_utf8(&bytes).ok_or_else(|| {
                        ClassLoadErr::InvalidFormat(format!("invalid CONSTANT_Utf8 at #{}", index))
                    })?;
                    ConstPoolEntry::Utf8(self.symbols.get_or_insert(&text))
                }
                ConstantTag::Integer => ConstPoolEntry::Integer(self.reader.read_ubyte4()? as i32),
                ConstantTag::Float => ConstPoolEntry::Float(f32::from_bits(self.reader.read_ubyte4()?)),
                ConstantTag::Long | ConstantTag::Double => {
                    let high_bytes = (self.reader.read_ubyte4()? as u64) << 32;
                    let bits = high_bytes | self.reader.read_ubyte4()? as u64;
                    let entry = if tag == ConstantTag::Long {
                        ConstPoolEntry::Long(bits as i64)
                    } else {
                        ConstPoolEntry::Double(f64::from_bits(bits))
                    };
                    cp.set(index, entry);
                    // 8-byte constants take two entries.
                    index += 2;
                    continue;
                }
                ConstantTag::Class => ConstPoolEntry::Class {
                    name_index: self.reader.read_ubyte2()?,
                },
                ConstantTag::String => ConstPoolEntry::String {
                    utf8_index: self.reader.read_ubyte2()?,
                },
                ConstantTag::Fieldref => ConstPoolEntry::FieldRef {
                    class_index: self.reader.read_ubyte2()?,
                    nat_index: self.reader.read_ubyte2()?,
                },
                ConstantTag::Methodref => ConstPoolEntry::MethodRef {
                    class_index: self.reader.read_ubyte2()?,
                    nat_index: self.reader.read_ubyte2()?,
                },
                ConstantTag::InterfaceMethodref => ConstPoolEntry::InterfaceMethodRef {
                    class_index: self.reader.read_ubyte2()?,
                    nat_index: self.reader.read_ubyte2()?,
                },
                ConstantTag::NameAndType => ConstPoolEntry::NameAndType {
                    name_index: self.reader.read_ubyte2()?,
                    descriptor_index: self.reader.read_ubyte2()?,
                },
                ConstantTag::MethodHandle => ConstPoolEntry::MethodHandle {
                    kind: self.reader.read_ubyte1()?,
                    index: self.reader.read_ubyte2()?,
                },
                ConstantTag::MethodType => ConstPoolEntry::MethodType {
                    descriptor_index: self.reader.read_ubyte2()?,
                },
                ConstantTag::Dynamic => ConstPoolEntry::Dynamic {
                    bootstrap_index: self.reader.read_ubyte2()?,
                    nat_index: self.reader.read_ubyte2()?,
                },
                ConstantTag::InvokeDynamic => ConstPoolEntry::InvokeDynamic {
                    bootstrap_index: self.reader.read_ubyte2()?,
                    nat_index: self.reader.read_ubyte2()?,
                },
                ConstantTag::Module => ConstPoolEntry::Module {
                    name_index: self.reader.read_ubyte2()?,
                },
                ConstantTag::Package => ConstPoolEntry::Package {
                    name_index: self.reader.read_ubyte2()?,
                },
                ConstantTag::Invalid => unreachable!(),
            };
            cp.set(index, entry);
            index += 1;
        }
        Ok(cp)
    }

    fn parse_interfaces(&mut self, cp: &ConstantPool) -> Result<Vec<Symbol>, ClassLoadErr> {
        let length = self.reader.read_ubyte2()?;
        let mut interfaces = Vec::with_capacity(length as usize);
        for _ in 0..length {
            interfaces.push(cp.get_class_name(self.reader.read_ubyte2()?)?.clone());
        }
        Ok(interfaces)
    }

    fn parse_fields(&mut self, cp: &ConstantPool) -> Result<Vec<FieldInfo>, ClassLoadErr> {
        let fields_count = self.reader.read_ubyte2()?;
        let mut fields = Vec::with_capacity(fields_count as usize);
        for _ in 0..fields_count {
            let access_flags = self.reader.read_ubyte2()?;
            let name = cp.get_utf8(self.reader.read_ubyte2()?)?.clone();
            let descriptor = cp.get_utf8(self.reader.read_ubyte2()?)?.clone();
            parse_field_type(&descriptor)?;
            let mut constant_value = None;
            let attrs_count = self.reader.read_ubyte2()?;
            for _ in 0..attrs_count {
                let attr_name = cp.get_utf8(self.reader.read_ubyte2()?)?.clone();
                let attr_length = self.reader.read_ubyte4()? as usize;
                match attr_name.as_str() {
                    "ConstantValue" => constant_value = Some(self.reader.read_ubyte2()?),
                    _ => self.reader.skip(attr_length),
                }
            }
            fields.push(FieldInfo {
                access_flags,
                name,
                descriptor,
                constant_value,
            });
        }
        Ok(fields)
    }

    fn parse_methods(&mut self, cp: &ConstantPool) -> Result<Vec<MethodInfo>, ClassLoadErr> {
        let methods_count = self.reader.read_ubyte2()?;
        let mut methods = Vec::with_capacity(methods_count as usize);
        for _ in 0..methods_count {
            let access_flags = self.reader.read_ubyte2()?;
            let name = cp.get_utf8(self.reader.read_ubyte2()?)?.clone();
            let descriptor = cp.get_utf8(self.reader.read_ubyte2()?)?.clone();
            MethodDescriptor::parse(&descriptor)?;
            let mut code = None;
            let attrs_count = self.reader.read_ubyte2()?;
            for _ in 0..attrs_count {
                let attr_name = cp.get_utf8(self.reader.read_ubyte2()?)?.clone();
                let attr_length = self.reader.read_ubyte4()? as usize;
                match attr_name.as_str() {
                    "Code" => code = Some(self.parse_code(cp)?),
                    _ => self.reader.skip(attr_length),
                }
            }
            methods.push(MethodInfo {
                access_flags,
                name,
                descriptor,
                code,
            });
        }
        Ok(methods)
    }

    /// jvms-4.7.3
    fn parse_code(&mut self, cp: &ConstantPool) -> Result<Code, ClassLoadErr> {
        let max_stack = self.reader.read_ubyte2()?;
        let max_locals = self.reader.read_ubyte2()?;
        let code_length = self.reader.read_ubyte4()? as usize;
        if code_length == 0 || code_length > u16::MAX as usize {
            return Err(ClassLoadErr::InvalidFormat(format!(
                "invalid code length {}",
                code_length
            )));
        }
        let bytecode = self.reader.read_nbytes(code_length)?;
        let ex_tab_length = self.reader.read_ubyte2()?;
        let mut exception_table = Vec::with_capacity(ex_tab_length as usize);
        for _ in 0..ex_tab_length {
            exception_table.push(ExceptionTable {
                start_pc: self.reader.read_ubyte2()?,
                end_pc: self.reader.read_ubyte2()?,
                handler_pc: self.reader.read_ubyte2()?,
                catch_type: self.reader.read_ubyte2()?,
            });
        }
        let mut line_numbers = vec![];
        let attrs_count = self.reader.read_ubyte2()?;
        for _ in 0..attrs_count {
            let attr_name = cp.get_utf8(self.reader.read_ubyte2()?)?.clone();
            let attr_length = self.reader.read_ubyte4()? as usize;
            match attr_name.as_str() {
                "LineNumberTable" => {
                    let count = self.reader.read_ubyte2()?;
                    for _ in 0..count {
                        line_numbers.push(LineNumber {
                            start_pc: self.reader.read_ubyte2()?,
                            line: self.reader.read_ubyte2()?,
                        });
                    }
                }
                _ => self.reader.skip(attr_length),
            }
        }
        Ok(Code {
            max_stack,
            max_locals,
            bytecode,
            exception_table,
            line_numbers,
        })
    }

    fn parse_class_attrs(&mut self, cp: &ConstantPool) -> Result<Option<Symbol>, ClassLoadErr> {
        let mut source_file = None;
        let attrs_count = self.reader.read_ubyte2()?;
        for _ in 0..attrs_count {
            let attr_name = cp.get_utf8(self.reader.read_ubyte2()?)?.clone();
            let attr_length = self.reader.read_ubyte4()? as usize;
            match attr_name.as_str() {
                "SourceFile" => source_file = Some(cp.get_utf8(self.reader.read_ubyte2()?)?.clone()),
                _ => self.reader.skip(attr_length),
            }
        }
        if !self.reader.available_bytes().is_empty() {
            return Err(ClassLoadErr::InvalidFormat(
                "extra bytes at the end of the class file".to_string(),
            ));
        }
        Ok(source_file)
    }

    #[inline]
    fn major_version_is_support(major_version: u16) -> bool {
        (45..=65).contains(&major_version)
    }
}

/// Decodes the class file flavour of UTF-8: `0xC0 0x80` for NUL and
/// surrogate pairs encoded as two three-byte sequences.
fn decode_modified_utf8(bytes: &[u8]) -> Option<String> {
    if let Ok(s) = std::str::from_utf8(bytes) {
        return Some(s.to_string());
    }
    let mut units = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if b & 0x80 == 0 {
            units.push(b as u16);
            i += 1;
        } else if b & 0xe0 == 0xc0 {
            let b2 = *bytes.get(i + 1)?;
            units.push((((b & 0x1f) as u16) << 6) | (b2 & 0x3f) as u16);
            i += 2;
        } else if b & 0xf0 == 0xe0 {
            let b2 = *bytes.get(i + 1)?;
            let b3 = *bytes.get(i + 2)?;
            units.push((((b & 0x0f) as u16) << 12) | (((b2 & 0x3f) as u16) << 6) | (b3 & 0x3f) as u16);
            i += 3;
        } else {
            return None;
        }
    }
    Some(String::from_utf16_lossy(&units))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classfile::reader::OwnedBytesClassReader;
    use crate::classfile::writer::{ClassWriter, Constant};
    use crate::runtime::opcode::Opcode;

    #[test]
    fn parses_written_class() {
        let mut class = ClassWriter::new("demo/Point", Some("java/lang/Object"));
        class.field(0, "x", "I");
        class.field_with_constant(0x18, "ORIGIN", "I", Constant::Int(7));
        class.method(0x09, "twice", "(I)I", |code| {
            code.iload(0).iconst(2).op(Opcode::IMul).op(Opcode::IReturn);
        });
        let bytes = class.to_bytes().unwrap();

        let mut symbols = SymbolTable::new();
        let mut parser = ClassParser::new(Box::new(OwnedBytesClassReader::new(bytes)), &mut symbols);
        let parsed = parser.parse_class().unwrap();
        assert_eq!(parsed.this_class.as_str(), "demo/Point");
        assert_eq!(parsed.super_class.as_ref().map(|s| s.as_str()), Some("java/lang/Object"));
        assert_eq!(parsed.fields.len(), 2);
        let origin = &parsed.fields[1];
        let value_index = origin.constant_value.unwrap();
        assert_eq!(parsed.constant_pool.get_int32(value_index).unwrap(), 7);
        let code = parsed.methods[0].code.as_ref().unwrap();
        assert_eq!(code.max_locals, 1);
        assert_eq!(code.bytecode, vec![0x1a, 0x05, 0x68, 0xac]);
    }

    #[test]
    fn rejects_bad_magic_and_truncation() {
        let mut symbols = SymbolTable::new();
        {
            let mut parser = ClassParser::new(
                Box::new(OwnedBytesClassReader::new(vec![0xca, 0xfe, 0xba, 0xbf, 0, 0, 0, 52])),
                &mut symbols,
            );
            assert!(matches!(parser.parse_class(), Err(ClassLoadErr::InvalidFormat(_))));
        }

        let mut bytes = ClassWriter::new("demo/Empty", Some("java/lang/Object"))
            .to_bytes()
            .unwrap();
        bytes.truncate(bytes.len() - 3);
        let mut parser = ClassParser::new(Box::new(OwnedBytesClassReader::new(bytes)), &mut symbols);
        assert!(parser.parse_class().is_err());
    }

    #[test]
    fn modified_utf8_nul() {
        assert_eq!(decode_modified_utf8(&[0x61, 0xc0, 0x80]).unwrap(), "a\u{0}");
    }
}
