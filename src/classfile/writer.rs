//! Class file assembler. Builds the VM's bootstrap classes and lets
//! embedders and tests produce bytecode without an external compiler.

use std::collections::HashMap;

use super::descriptor::MethodDescriptor;
use super::ClassLoadErr;
use crate::object::array::ArrayType;
use crate::object::class::ClassAccessFlags;
use crate::object::method::MethodAccessFlags;
use crate::runtime::opcode::Opcode;

const CLASS_FILE_VERSION: u16 = 52;

#[derive(Clone, PartialEq, Eq, Hash)]
enum PoolItem {
    Utf8(String),
    Integer(i32),
    Float(u32),
    Long(i64),
    Double(u64),
    Class(u16),
    String(u16),
    FieldRef(u16, u16),
    MethodRef(u16, u16),
    InterfaceMethodRef(u16, u16),
    NameAndType(u16, u16),
}

#[derive(Default)]
struct PoolBuilder {
    items: Vec<PoolItem>,
    index: HashMap<PoolItem, u16>,
    next: u16,
}

impl PoolBuilder {
    fn add(&mut self, item: PoolItem) -> u16 {
        if let Some(index) = self.index.get(&item) {
            return *index;
        }
        if self.next == 0 {
            self.next = 1;
        }
        let index = self.next;
        self.next += match item {
            PoolItem::Long(_) | PoolItem::Double(_) => 2,
            _ => 1,
        };
        self.index.insert(item.clone(), index);
        self.items.push(item);
        index
    }

    fn utf8(&mut self, s: &str) -> u16 {
        self.add(PoolItem::Utf8(s.to_string()))
    }

    fn class(&mut self, name: &str) -> u16 {
        let name = self.utf8(name);
        self.add(PoolItem::Class(name))
    }

    fn string(&mut self, s: &str) -> u16 {
        let utf8 = self.utf8(s);
        self.add(PoolItem::String(utf8))
    }

    fn name_and_type(&mut self, name: &str, descriptor: &str) -> u16 {
        let name = self.utf8(name);
        let descriptor = self.utf8(descriptor);
        self.add(PoolItem::NameAndType(name, descriptor))
    }

    fn field_ref(&mut self, class: &str, name: &str, descriptor: &str) -> u16 {
        let class = self.class(class);
        let nat = self.name_and_type(name, descriptor);
        self.add(PoolItem::FieldRef(class, nat))
    }

    fn method_ref(&mut self, class: &str, name: &str, descriptor: &str) -> u16 {
        let class = self.class(class);
        let nat = self.name_and_type(name, descriptor);
        self.add(PoolItem::MethodRef(class, nat))
    }

    fn interface_method_ref(&mut self, class: &str, name: &str, descriptor: &str) -> u16 {
        let class = self.class(class);
        let nat = self.name_and_type(name, descriptor);
        self.add(PoolItem::InterfaceMethodRef(class, nat))
    }

    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.next.max(1).to_be_bytes());
        for item in &self.items {
            match item {
                PoolItem::Utf8(s) => {
                    out.push(1);
                    out.extend_from_slice(&(s.len() as u16).to_be_bytes());
                    out.extend_from_slice(s.as_bytes());
                }
                PoolItem::Integer(v) => {
                    out.push(3);
                    out.extend_from_slice(&v.to_be_bytes());
                }
                PoolItem::Float(bits) => {
                    out.push(4);
                    out.extend_from_slice(&bits.to_be_bytes());
                }
                PoolItem::Long(v) => {
                    out.push(5);
                    out.extend_from_slice(&v.to_be_bytes());
                }
                PoolItem::Double(bits) => {
                    out.push(6);
                    out.extend_from_slice(&bits.to_be_bytes());
                }
                PoolItem::Class(name) => {
                    out.push(7);
                    out.extend_from_slice(&name.to_be_bytes());
                }
                PoolItem::String(utf8) => {
                    out.push(8);
                    out.extend_from_slice(&utf8.to_be_bytes());
                }
                PoolItem::FieldRef(class, nat) => encode_pair(out, 9, *class, *nat),
                PoolItem::MethodRef(class, nat) => encode_pair(out, 10, *class, *nat),
                PoolItem::InterfaceMethodRef(class, nat) => encode_pair(out, 11, *class, *nat),
                PoolItem::NameAndType(name, descriptor) => encode_pair(out, 12, *name, *descriptor),
            }
        }
    }
}

fn encode_pair(out: &mut Vec<u8>, tag: u8, a: u16, b: u16) {
    out.push(tag);
    out.extend_from_slice(&a.to_be_bytes());
    out.extend_from_slice(&b.to_be_bytes());
}

/// Value of a `ConstantValue` attribute.
pub enum Constant<'a> {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(&'a str),
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Label(usize);

struct Fixup {
    instr_pc: usize,
    at: usize,
    label: Label,
    wide: bool,
}

struct Handler {
    start: Label,
    end: Label,
    handler: Label,
    catch_type: u16,
}

pub struct CodeWriter<'a> {
    pool: &'a mut PoolBuilder,
    code: Vec<u8>,
    labels: Vec<Option<usize>>,
    fixups: Vec<Fixup>,
    handlers: Vec<Handler>,
    lines: Vec<(u16, u16)>,
    max_stack: u16,
    max_locals: u16,
}

impl<'a> CodeWriter<'a> {
    const DEFAULT_MAX_STACK: u16 = 16;

    fn new(pool: &'a mut PoolBuilder, arg_slots: u16) -> Self {
        Self {
            pool,
            code: vec![],
            labels: vec![],
            fixups: vec![],
            handlers: vec![],
            lines: vec![],
            max_stack: Self::DEFAULT_MAX_STACK,
            max_locals: arg_slots,
        }
    }

    /// Current bytecode offset.
    pub fn pc(&self) -> usize {
        self.code.len()
    }

    pub fn max_stack(&mut self, max_stack: u16) -> &mut Self {
        self.max_stack = max_stack;
        self
    }

    pub fn op(&mut self, op: Opcode) -> &mut Self {
        self.code.push(op as u8);
        self
    }

    pub fn u1(&mut self, v: u8) -> &mut Self {
        self.code.push(v);
        self
    }

    pub fn u2(&mut self, v: u16) -> &mut Self {
        self.code.extend_from_slice(&v.to_be_bytes());
        self
    }

    fn i4(&mut self, v: i32) -> &mut Self {
        self.code.extend_from_slice(&v.to_be_bytes());
        self
    }

    pub fn line(&mut self, line: u16) -> &mut Self {
        self.lines.push((self.code.len() as u16, line));
        self
    }

    pub fn iconst(&mut self, v: i32) -> &mut Self {
        match v {
            -1..=5 => self.u1((Opcode::IConst0 as i32 + v) as u8),
            -128..=127 => self.op(Opcode::BIPush).u1(v as i8 as u8),
            -32768..=32767 => self.op(Opcode::SIPush).u2(v as i16 as u16),
            _ => {
                let index = self.pool.add(PoolItem::Integer(v));
                self.ldc_index(index)
            }
        }
    }

    pub fn lconst(&mut self, v: i64) -> &mut Self {
        match v {
            0 => self.op(Opcode::LConst0),
            1 => self.op(Opcode::LConst1),
            _ => {
                let index = self.pool.add(PoolItem::Long(v));
                self.op(Opcode::Ldc2W).u2(index)
            }
        }
    }

    pub fn fconst(&mut self, v: f32) -> &mut Self {
        if v == 0.0 && v.is_sign_positive() {
            self.op(Opcode::FConst0)
        } else if v == 1.0 {
            self.op(Opcode::FConst1)
        } else if v == 2.0 {
            self.op(Opcode::FConst2)
        } else {
            let index = self.pool.add(PoolItem::Float(v.to_bits()));
            self.ldc_index(index)
        }
    }

    pub fn dconst(&mut self, v: f64) -> &mut Self {
        if v == 0.0 && v.is_sign_positive() {
            self.op(Opcode::DConst0)
        } else if v == 1.0 {
            self.op(Opcode::DConst1)
        } else {
            let index = self.pool.add(PoolItem::Double(v.to_bits()));
            self.op(Opcode::Ldc2W).u2(index)
        }
    }

    fn ldc_index(&mut self, index: u16) -> &mut Self {
        if index <= u8::MAX as u16 {
            self.op(Opcode::Ldc).u1(index as u8)
        } else {
            self.op(Opcode::LdcW).u2(index)
        }
    }

    pub fn ldc_string(&mut self, s: &str) -> &mut Self {
        let index = self.pool.string(s);
        self.ldc_index(index)
    }

    pub fn ldc_class(&mut self, name: &str) -> &mut Self {
        let index = self.pool.class(name);
        self.ldc_index(index)
    }

    fn touch_local(&mut self, index: u16, width: u16) {
        self.max_locals = self.max_locals.max(index + width);
    }

    fn local_op(&mut self, base: Opcode, short_base: Opcode, index: u16, width: u16) -> &mut Self {
        self.touch_local(index, width);
        if index <= 3 {
            self.u1(short_base as u8 + index as u8)
        } else if index <= u8::MAX as u16 {
            self.op(base).u1(index as u8)
        } else {
            self.op(Opcode::Wide).op(base).u2(index)
        }
    }

    pub fn iload(&mut self, index: u16) -> &mut Self {
        self.local_op(Opcode::ILoad, Opcode::ILoad0, index, 1)
    }

    pub fn lload(&mut self, index: u16) -> &mut Self {
        self.local_op(Opcode::LLoad, Opcode::LLoad0, index, 2)
    }

    pub fn fload(&mut self, index: u16) -> &mut Self {
        self.local_op(Opcode::FLoad, Opcode::FLoad0, index, 1)
    }

    pub fn dload(&mut self, index: u16) -> &mut Self {
        self.local_op(Opcode::DLoad, Opcode::DLoad0, index, 2)
    }

    pub fn aload(&mut self, index: u16) -> &mut Self {
        self.local_op(Opcode::ALoad, Opcode::ALoad0, index, 1)
    }

    pub fn istore(&mut self, index: u16) -> &mut Self {
        self.local_op(Opcode::IStore, Opcode::IStore0, index, 1)
    }

    pub fn lstore(&mut self, index: u16) -> &mut Self {
        self.local_op(Opcode::LStore, Opcode::LStore0, index, 2)
    }

    pub fn fstore(&mut self, index: u16) -> &mut Self {
        self.local_op(Opcode::FStore, Opcode::FStore0, index, 1)
    }

    pub fn dstore(&mut self, index: u16) -> &mut Self {
        self.local_op(Opcode::DStore, Opcode::DStore0, index, 2)
    }

    pub fn astore(&mut self, index: u16) -> &mut Self {
        self.local_op(Opcode::AStore, Opcode::AStore0, index, 1)
    }

    pub fn iinc(&mut self, index: u16, delta: i16) -> &mut Self {
        self.touch_local(index, 1);
        if index <= u8::MAX as u16 && (-128..=127).contains(&delta) {
            self.op(Opcode::IInc).u1(index as u8).u1(delta as i8 as u8)
        } else {
            self.op(Opcode::Wide).op(Opcode::IInc).u2(index).u2(delta as u16)
        }
    }

    pub fn new_object(&mut self, class: &str) -> &mut Self {
        let index = self.pool.class(class);
        self.op(Opcode::New).u2(index)
    }

    pub fn newarray(&mut self, atype: ArrayType) -> &mut Self {
        self.op(Opcode::NewArray).u1(atype as u8)
    }

    pub fn anewarray(&mut self, class: &str) -> &mut Self {
        let index = self.pool.class(class);
        self.op(Opcode::ANewArray).u2(index)
    }

    pub fn multianewarray(&mut self, class: &str, dimensions: u8) -> &mut Self {
        let index = self.pool.class(class);
        self.op(Opcode::MultiANewArray).u2(index).u1(dimensions)
    }

    pub fn checkcast(&mut self, class: &str) -> &mut Self {
        let index = self.pool.class(class);
        self.op(Opcode::CheckCast).u2(index)
    }

    pub fn instanceof(&mut self, class: &str) -> &mut Self {
        let index = self.pool.class(class);
        self.op(Opcode::InstanceOf).u2(index)
    }

    pub fn field_op(&mut self, op: Opcode, class: &str, name: &str, descriptor: &str) -> &mut Self {
        let index = self.pool.field_ref(class, name, descriptor);
        self.op(op).u2(index)
    }

    pub fn getstatic(&mut self, class: &str, name: &str, descriptor: &str) -> &mut Self {
        self.field_op(Opcode::GetStatic, class, name, descriptor)
    }

    pub fn putstatic(&mut self, class: &str, name: &str, descriptor: &str) -> &mut Self {
        self.field_op(Opcode::PutStatic, class, name, descriptor)
    }

    pub fn getfield(&mut self, class: &str, name: &str, descriptor: &str) -> &mut Self {
        self.field_op(Opcode::GetField, class, name, descriptor)
    }

    pub fn putfield(&mut self, class: &str, name: &str, descriptor: &str) -> &mut Self {
        self.field_op(Opcode::PutField, class, name, descriptor)
    }

    pub fn invokevirtual(&mut self, class: &str, name: &str, descriptor: &str) -> &mut Self {
        let index = self.pool.method_ref(class, name, descriptor);
        self.op(Opcode::InvokeVirtual).u2(index)
    }

    pub fn invokespecial(&mut self, class: &str, name: &str, descriptor: &str) -> &mut Self {
        let index = self.pool.method_ref(class, name, descriptor);
        self.op(Opcode::InvokeSpecial).u2(index)
    }

    pub fn invokestatic(&mut self, class: &str, name: &str, descriptor: &str) -> &mut Self {
        let index = self.pool.method_ref(class, name, descriptor);
        self.op(Opcode::InvokeStatic).u2(index)
    }

    pub fn invokeinterface(&mut self, class: &str, name: &str, descriptor: &str) -> &mut Self {
        let count = MethodDescriptor::parse(descriptor).map_or(1, |d| d.arg_slots + 1);
        let index = self.pool.interface_method_ref(class, name, descriptor);
        self.op(Opcode::InvokeInterface).u2(index).u1(count as u8).u1(0)
    }

    pub fn new_label(&mut self) -> Label {
        self.labels.push(None);
        Label(self.labels.len() - 1)
    }

    pub fn bind(&mut self, label: Label) -> &mut Self {
        self.labels[label.0] = Some(self.code.len());
        self
    }

    /// Conditional branch or `goto` with a 16-bit offset.
    pub fn branch(&mut self, op: Opcode, label: Label) -> &mut Self {
        let instr_pc = self.code.len();
        self.op(op);
        self.fixups.push(Fixup {
            instr_pc,
            at: self.code.len(),
            label,
            wide: false,
        });
        self.u2(0)
    }

    pub fn goto_w(&mut self, label: Label) -> &mut Self {
        let instr_pc = self.code.len();
        self.op(Opcode::GotoW);
        self.fixups.push(Fixup {
            instr_pc,
            at: self.code.len(),
            label,
            wide: true,
        });
        self.i4(0)
    }

    fn wide_target(&mut self, instr_pc: usize, label: Label) {
        self.fixups.push(Fixup {
            instr_pc,
            at: self.code.len(),
            label,
            wide: true,
        });
        self.i4(0);
    }

    fn switch_padding(&mut self) {
        while self.code.len() % 4 != 0 {
            self.code.push(0);
        }
    }

    pub fn tableswitch(&mut self, low: i32, default: Label, targets: &[Label]) -> &mut Self {
        let instr_pc = self.code.len();
        self.op(Opcode::TableSwitch);
        self.switch_padding();
        self.wide_target(instr_pc, default);
        self.i4(low).i4(low + targets.len() as i32 - 1);
        for target in targets {
            self.wide_target(instr_pc, *target);
        }
        self
    }

    pub fn lookupswitch(&mut self, default: Label, pairs: &[(i32, Label)]) -> &mut Self {
        let instr_pc = self.code.len();
        self.op(Opcode::LookupSwitch);
        self.switch_padding();
        self.wide_target(instr_pc, default);
        self.i4(pairs.len() as i32);
        let mut sorted = pairs.to_vec();
        sorted.sort_by_key(|(key, _)| *key);
        for (key, target) in sorted {
            self.i4(key);
            self.wide_target(instr_pc, target);
        }
        self
    }

    /// Exception handler for `[start, end)`. `None` catches everything.
    pub fn try_catch(
        &mut self,
        start: Label,
        end: Label,
        handler: Label,
        catch_type: Option<&str>,
    ) -> &mut Self {
        let catch_type = catch_type.map_or(0, |name| self.pool.class(name));
        self.handlers.push(Handler {
            start,
            end,
            handler,
            catch_type,
        });
        self
    }

    fn label_pc(&self, label: Label) -> Result<usize, ClassLoadErr> {
        self.labels
            .get(label.0)
            .copied()
            .flatten()
            .ok_or_else(|| ClassLoadErr::VerifyFailed(format!("unbound label {}", label.0)))
    }

    fn finish(mut self) -> Result<Vec<u8>, ClassLoadErr> {
        for fixup in &self.fixups {
            let offset = self.label_pc(fixup.label)? as i64 - fixup.instr_pc as i64;
            if fixup.wide {
                self.code[fixup.at..fixup.at + 4].copy_from_slice(&(offset as i32).to_be_bytes());
            } else {
                let offset = i16::try_from(offset).map_err(|_| {
                    ClassLoadErr::VerifyFailed(format!("branch offset {} too far", offset))
                })?;
                self.code[fixup.at..fixup.at + 2].copy_from_slice(&offset.to_be_bytes());
            }
        }
        if self.code.is_empty() || self.code.len() > u16::MAX as usize {
            return Err(ClassLoadErr::VerifyFailed(format!(
                "invalid code length {}",
                self.code.len()
            )));
        }

        let code_name = self.pool.utf8("Code");
        let lines_name = if self.lines.is_empty() {
            None
        } else {
            Some(self.pool.utf8("LineNumberTable"))
        };
        let mut body = vec![];
        body.extend_from_slice(&self.max_stack.to_be_bytes());
        body.extend_from_slice(&self.max_locals.to_be_bytes());
        body.extend_from_slice(&(self.code.len() as u32).to_be_bytes());
        body.extend_from_slice(&self.code);
        body.extend_from_slice(&(self.handlers.len() as u16).to_be_bytes());
        for handler in &self.handlers {
            for label in [handler.start, handler.end, handler.handler] {
                body.extend_from_slice(&(self.label_pc(label)? as u16).to_be_bytes());
            }
            body.extend_from_slice(&handler.catch_type.to_be_bytes());
        }
        match lines_name {
            Some(name) => {
                body.extend_from_slice(&1u16.to_be_bytes());
                body.extend_from_slice(&name.to_be_bytes());
                body.extend_from_slice(&(2 + 4 * self.lines.len() as u32).to_be_bytes());
                body.extend_from_slice(&(self.lines.len() as u16).to_be_bytes());
                for (pc, line) in &self.lines {
                    body.extend_from_slice(&pc.to_be_bytes());
                    body.extend_from_slice(&line.to_be_bytes());
                }
            }
            None => body.extend_from_slice(&0u16.to_be_bytes()),
        }

        let mut attr = vec![];
        attr.extend_from_slice(&code_name.to_be_bytes());
        attr.extend_from_slice(&(body.len() as u32).to_be_bytes());
        attr.extend_from_slice(&body);
        Ok(attr)
    }
}

pub struct ClassWriter {
    name: String,
    pool: PoolBuilder,
    access_flags: u16,
    this_class: u16,
    super_class: u16,
    interfaces: Vec<u16>,
    fields: Vec<Vec<u8>>,
    methods: Vec<Vec<u8>>,
    source_file: Option<(u16, u16)>,
    error: Option<ClassLoadErr>,
}

impl ClassWriter {
    pub fn new(name: &str, super_class: Option<&str>) -> Self {
        let mut pool = PoolBuilder::default();
        let this_class = pool.class(name);
        let super_class = super_class.map_or(0, |s| pool.class(s));
        Self {
            name: name.to_string(),
            pool,
            access_flags: ClassAccessFlags::AccPublic as u16 | ClassAccessFlags::AccSuper as u16,
            this_class,
            super_class,
            interfaces: vec![],
            fields: vec![],
            methods: vec![],
            source_file: None,
            error: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn interface(name: &str) -> Self {
        let mut writer = Self::new(name, Some("java/lang/Object"));
        writer.access_flags = ClassAccessFlags::AccPublic as u16
            | ClassAccessFlags::AccInterface as u16
            | ClassAccessFlags::AccAbstract as u16;
        writer
    }

    pub fn access_flags(&mut self, flags: u16) -> &mut Self {
        self.access_flags = flags;
        self
    }

    pub fn implements(&mut self, interface: &str) -> &mut Self {
        let index = self.pool.class(interface);
        self.interfaces.push(index);
        self
    }

    pub fn source_file(&mut self, file: &str) -> &mut Self {
        let name = self.pool.utf8("SourceFile");
        let value = self.pool.utf8(file);
        self.source_file = Some((name, value));
        self
    }

    fn member_header(&mut self, flags: u16, name: &str, descriptor: &str) -> Vec<u8> {
        let mut out = vec![];
        out.extend_from_slice(&flags.to_be_bytes());
        out.extend_from_slice(&self.pool.utf8(name).to_be_bytes());
        out.extend_from_slice(&self.pool.utf8(descriptor).to_be_bytes());
        out
    }

    pub fn field(&mut self, flags: u16, name: &str, descriptor: &str) -> &mut Self {
        let mut out = self.member_header(flags, name, descriptor);
        out.extend_from_slice(&0u16.to_be_bytes());
        self.fields.push(out);
        self
    }

    pub fn field_with_constant(
        &mut self,
        flags: u16,
        name: &str,
        descriptor: &str,
        value: Constant,
    ) -> &mut Self {
        let mut out = self.member_header(flags, name, descriptor);
        let attr_name = self.pool.utf8("ConstantValue");
        let value_index = match value {
            Constant::Int(v) => self.pool.add(PoolItem::Integer(v)),
            Constant::Long(v) => self.pool.add(PoolItem::Long(v)),
            Constant::Float(v) => self.pool.add(PoolItem::Float(v.to_bits())),
            Constant::Double(v) => self.pool.add(PoolItem::Double(v.to_bits())),
            Constant::String(s) => self.pool.string(s),
        };
        out.extend_from_slice(&1u16.to_be_bytes());
        out.extend_from_slice(&attr_name.to_be_bytes());
        out.extend_from_slice(&2u32.to_be_bytes());
        out.extend_from_slice(&value_index.to_be_bytes());
        self.fields.push(out);
        self
    }

    /// Adds a method with a `Code` attribute produced by `body`.
    pub fn method<F: FnOnce(&mut CodeWriter)>(
        &mut self,
        flags: u16,
        name: &str,
        descriptor: &str,
        body: F,
    ) -> &mut Self {
        let mut out = self.member_header(flags, name, descriptor);
        let arg_slots = match MethodDescriptor::parse(descriptor) {
            Ok(desc) => desc.arg_slots,
            Err(e) => {
                self.error.get_or_insert(e);
                return self;
            }
        };
        let is_static = flags & MethodAccessFlags::AccStatic as u16 != 0;
        let mut code = CodeWriter::new(&mut self.pool, arg_slots + if is_static { 0 } else { 1 });
        body(&mut code);
        match code.finish() {
            Ok(attr) => {
                out.extend_from_slice(&1u16.to_be_bytes());
                out.extend_from_slice(&attr);
                self.methods.push(out);
            }
            Err(e) => {
                self.error.get_or_insert(e);
            }
        }
        self
    }

    /// Adds a method without code (`native` or `abstract`).
    pub fn method_without_code(&mut self, flags: u16, name: &str, descriptor: &str) -> &mut Self {
        let mut out = self.member_header(flags, name, descriptor);
        out.extend_from_slice(&0u16.to_be_bytes());
        self.methods.push(out);
        self
    }

    pub fn native_method(&mut self, flags: u16, name: &str, descriptor: &str) -> &mut Self {
        self.method_without_code(flags | MethodAccessFlags::AccNative as u16, name, descriptor)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, ClassLoadErr> {
        if let Some(e) = &self.error {
            return Err(e.clone());
        }
        let mut out = vec![];
        out.extend_from_slice(&0xCAFEBABEu32.to_be_bytes());
        out.extend_from_slice(&0u16.to_be_bytes());
        out.extend_from_slice(&CLASS_FILE_VERSION.to_be_bytes());
        self.pool.encode(&mut out);
        out.extend_from_slice(&self.access_flags.to_be_bytes());
        out.extend_from_slice(&self.this_class.to_be_bytes());
        out.extend_from_slice(&self.super_class.to_be_bytes());
        out.extend_from_slice(&(self.interfaces.len() as u16).to_be_bytes());
        for interface in &self.interfaces {
            out.extend_from_slice(&interface.to_be_bytes());
        }
        for members in [&self.fields, &self.methods] {
            out.extend_from_slice(&(members.len() as u16).to_be_bytes());
            members.iter().for_each(|m| out.extend_from_slice(m));
        }
        match self.source_file {
            Some((name, value)) => {
                out.extend_from_slice(&1u16.to_be_bytes());
                out.extend_from_slice(&name.to_be_bytes());
                out.extend_from_slice(&2u32.to_be_bytes());
                out.extend_from_slice(&value.to_be_bytes());
            }
            None => out.extend_from_slice(&0u16.to_be_bytes()),
        }
        Ok(out)
    }
}
