use std::collections::{HashMap, VecDeque};

use crate::classfile::descriptor::MethodDescriptor;
use crate::classfile::parser::ClassParser;
use crate::classfile::reader::OwnedBytesClassReader;
use crate::classfile::{ClassFile, ClassLoadErr, ClassLoader};
use crate::object::class::ArrayInfo;
use crate::object::constant_pool::{ResolvedField, ResolvedMethod};
use crate::object::field::FieldsData;
use crate::object::prelude::*;
use crate::value::JValue;
use crate::vm::VM;

use super::exception::ExceptionKind;
use super::{Throw, ThrowResult};

const OBJECT_CLASS: &str = "java/lang/Object";

/// Loaded classes by id and by name. Classes are never unloaded.
pub struct ClassRegistry {
    classes: Vec<Class>,
    by_name: HashMap<String, ClassId>,
    loader: Box<dyn ClassLoader>,
    /// Names currently being linked, for circularity detection.
    loading: Vec<String>,
    vcache: HashMap<(ClassId, MethodId), MethodId>,
}

impl ClassRegistry {
    pub fn new(loader: Box<dyn ClassLoader>) -> Self {
        Self {
            classes: Vec::new(),
            by_name: HashMap::new(),
            loader,
            loading: Vec::new(),
            vcache: HashMap::new(),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    #[inline]
    pub fn classes(&self) -> &[Class] {
        &self.classes
    }

    pub(crate) fn classes_mut(&mut self) -> &mut [Class] {
        &mut self.classes
    }

    /// Ids handed out by this registry are always valid indices.
    #[inline]
    pub fn class(&self, id: ClassId) -> &Class {
        &self.classes[id.0 as usize]
    }

    #[inline]
    pub fn class_mut(&mut self, id: ClassId) -> &mut Class {
        &mut self.classes[id.0 as usize]
    }

    pub fn get_class(&self, id: ClassId) -> Option<&Class> {
        self.classes.get(id.0 as usize)
    }

    #[inline]
    pub fn method(&self, id: MethodId) -> &Method {
        &self.class(id.class).methods[id.index as usize]
    }

    #[inline]
    pub fn method_mut(&mut self, id: MethodId) -> &mut Method {
        &mut self.class_mut(id.class).methods[id.index as usize]
    }

    pub fn find(&self, name: &str) -> Option<ClassId> {
        self.by_name.get(name).copied()
    }

    /// Looks up or loads and links a class or array class by internal name.
    pub fn load(&mut self, name: &str, symbols: &mut SymbolTable) -> Result<ClassId, ClassLoadErr> {
        if let Some(id) = self.find(name) {
            return Ok(id);
        }
        if name.starts_with('[') {
            return self.define_array(name, symbols);
        }
        if self.loading.iter().any(|n| n == name) {
            return Err(ClassLoadErr::ClassCircularity(name.to_string()));
        }
        self.loading.push(name.to_string());
        let result = self
            .loader
            .load(name, symbols)
            .and_then(|class_file| self.define(class_file, symbols));
        self.loading.pop();
        result
    }

    /// Parses and links a class from raw class file bytes, bypassing the
    /// class path. Fails if a class of the same name is already loaded.
    pub fn define_class(&mut self, bytes: Vec<u8>, symbols: &mut SymbolTable) -> Result<ClassId, ClassLoadErr> {
        let reader = OwnedBytesClassReader::new(bytes);
        let class_file = ClassParser::new(Box::new(reader), symbols).parse_class()?;
        let name = class_file.this_class.as_str().to_string();
        if self.find(&name).is_some() {
            return Err(ClassLoadErr::InvalidFormat(format!("duplicate class definition: {}", name)));
        }
        self.loading.push(name);
        let result = self.define(class_file, symbols);
        self.loading.pop();
        result
    }

    fn define(&mut self, cf: ClassFile, symbols: &mut SymbolTable) -> Result<ClassId, ClassLoadErr> {
        let name = cf.this_class.clone();
        let super_class = match &cf.super_class {
            Some(super_name) => {
                let super_id = self.load(super_name.as_str(), symbols)?;
                if self.class(super_id).is_interface() {
                    return Err(ClassLoadErr::VerifyFailed(format!(
                        "class {} has interface {} as super class",
                        name, super_name
                    )));
                }
                Some(super_id)
            }
            None if name.as_str() == OBJECT_CLASS => None,
            None => {
                return Err(ClassLoadErr::InvalidFormat(format!(
                    "class {} has no super class",
                    name
                )))
            }
        };
        let mut interfaces = Vec::with_capacity(cf.interfaces.len());
        for iface_name in &cf.interfaces {
            let iface = self.load(iface_name.as_str(), symbols)?;
            if !self.class(iface).is_interface() {
                return Err(ClassLoadErr::VerifyFailed(format!(
                    "class {} implements non-interface {}",
                    name, iface_name
                )));
            }
            interfaces.push(iface);
        }

        let id = ClassId(self.classes.len() as u32);
        let (mut instance_slots, mut ref_slots) = match super_class {
            Some(super_id) => {
                let super_class = self.class(super_id);
                (super_class.instance_slots, super_class.ref_slots.clone())
            }
            None => (0, vec![]),
        };
        let mut static_slots = 0u16;
        let mut static_ref_slots = vec![];
        let mut fields = Vec::with_capacity(cf.fields.len());
        for info in cf.fields {
            let kind = ValueKind::from_descriptor(info.descriptor.as_str()).ok_or_else(|| {
                ClassLoadErr::InvalidFormat(format!("bad field descriptor {}", info.descriptor))
            })?;
            let is_static = info.access_flags & FieldAccessFlags::AccStatic as u16 != 0;
            let (next, refs) = if is_static {
                (&mut static_slots, &mut static_ref_slots)
            } else {
                (&mut instance_slots, &mut ref_slots)
            };
            let slot = *next;
            *next += kind.slots() as u16;
            if kind.is_reference() {
                refs.push(slot);
            }
            fields.push(Field {
                name: info.name,
                descriptor: info.descriptor,
                access_flags: info.access_flags,
                kind,
                slot,
                constant_value: info.constant_value,
            });
        }

        let mut methods = Vec::with_capacity(cf.methods.len());
        for info in cf.methods {
            let desc = MethodDescriptor::parse(info.descriptor.as_str())?;
            methods.push(Method {
                class: id,
                name: info.name,
                descriptor: info.descriptor,
                access_flags: info.access_flags,
                params: desc.params,
                ret: desc.ret,
                arg_slots: desc.arg_slots,
                code: info.code,
                native: None,
            });
        }

        log::debug!(
            "linked class {} as {:?}: {} fields, {} methods, {} instance slots",
            name,
            id,
            fields.len(),
            methods.len(),
            instance_slots
        );
        self.classes.push(Class {
            id,
            name: name.clone(),
            access_flags: cf.access_flags,
            super_class,
            interfaces,
            constant_pool: cf.constant_pool,
            fields,
            methods,
            instance_slots,
            ref_slots,
            static_slots,
            static_ref_slots,
            statics: None,
            init_state: InitState::Uninitialized,
            mirror: None,
            monitor: Default::default(),
            array: None,
            source_file: cf.source_file,
        });
        self.by_name.insert(name.as_str().to_string(), id);
        Ok(id)
    }

    /// Synthesizes an array class such as `[I` or `[[Ljava/lang/String;`.
    fn define_array(&mut self, name: &str, symbols: &mut SymbolTable) -> Result<ClassId, ClassLoadErr> {
        let dimensions = name.bytes().take_while(|c| *c == b'[').count();
        if dimensions > 255 {
            return Err(ClassLoadErr::InvalidFormat(format!("too many dimensions in {}", name)));
        }
        let component_name = &name[1..];
        let (element, component) = if dimensions > 1 {
            (ValueKind::Reference, Some(self.load(component_name, symbols)?))
        } else if let Some(class_name) = component_name
            .strip_prefix('L')
            .and_then(|n| n.strip_suffix(';'))
        {
            (ValueKind::Reference, Some(self.load(class_name, symbols)?))
        } else {
            let kind = match component_name.as_bytes() {
                [c] => ValueKind::from_descriptor_char(*c).filter(|k| !k.is_reference()),
                _ => None,
            };
            let kind = kind.ok_or_else(|| {
                ClassLoadErr::InvalidFormat(format!("bad array class name {}", name))
            })?;
            (kind, None)
        };
        let object = self.load(OBJECT_CLASS, symbols)?;
        let mut interfaces = vec![];
        for iface in ["java/lang/Cloneable", "java/io/Serializable"] {
            interfaces.push(self.load(iface, symbols)?);
        }

        let id = ClassId(self.classes.len() as u32);
        let symbol = symbols.get_or_insert(name);
        log::debug!("created array class {} as {:?}", name, id);
        self.classes.push(Class {
            id,
            name: symbol,
            access_flags: ClassAccessFlags::AccPublic as u16
                | ClassAccessFlags::AccFinal as u16
                | ClassAccessFlags::AccAbstract as u16,
            super_class: Some(object),
            interfaces,
            constant_pool: ConstantPool::default(),
            fields: vec![],
            methods: vec![],
            instance_slots: 0,
            ref_slots: vec![],
            static_slots: 0,
            static_ref_slots: vec![],
            statics: None,
            init_state: InitState::Initialized,
            mirror: None,
            monitor: Default::default(),
            array: Some(ArrayInfo {
                dimensions: dimensions as u8,
                element,
                component,
            }),
            source_file: None,
        });
        self.by_name.insert(name.to_string(), id);
        Ok(id)
    }

    /// Array class whose component is `component`.
    pub fn array_of(&mut self, component: ClassId, symbols: &mut SymbolTable) -> Result<ClassId, ClassLoadErr> {
        let component_class = self.class(component);
        let name = if component_class.is_array() {
            format!("[{}", component_class.name)
        } else {
            format!("[L{};", component_class.name)
        };
        self.load(&name, symbols)
    }

    /// Superclass chain starting at `class` itself.
    pub fn super_chain(&self, class: ClassId) -> impl Iterator<Item = ClassId> + '_ {
        std::iter::successors(Some(class), move |c| self.class(*c).super_class)
    }

    /// Every interface `class` implements, directly or inherited,
    /// breadth first.
    pub fn all_interfaces(&self, class: ClassId) -> Vec<ClassId> {
        let mut result: Vec<ClassId> = vec![];
        let mut queue: VecDeque<ClassId> = self
            .super_chain(class)
            .flat_map(|c| self.class(c).interfaces.iter().copied())
            .collect();
        while let Some(iface) = queue.pop_front() {
            if result.contains(&iface) {
                continue;
            }
            result.push(iface);
            queue.extend(self.class(iface).interfaces.iter().copied());
        }
        result
    }

    /// Method lookup through the class chain, then superinterfaces with
    /// concrete (default) methods preferred over abstract ones.
    pub fn lookup_method(&self, class: ClassId, name: &str, descriptor: &str) -> Option<MethodId> {
        for c in self.super_chain(class) {
            if let Some(method) = self.class(c).find_declared_method(name, descriptor) {
                return Some(method);
            }
        }
        let mut abstract_match = None;
        for iface in self.all_interfaces(class) {
            if let Some(method) = self.class(iface).find_declared_method(name, descriptor) {
                if !self.method(method).is_abstract() {
                    return Some(method);
                }
                abstract_match.get_or_insert(method);
            }
        }
        abstract_match
    }

    /// Field lookup: the class, its superinterfaces, then its superclass.
    pub fn lookup_field(&self, class: ClassId, name: &str, descriptor: &str) -> Option<(ClassId, &Field)> {
        for c in self.super_chain(class) {
            let current = self.class(c);
            if let Some(field) = current.find_declared_field(name, Some(descriptor)) {
                return Some((c, field));
            }
            for iface in self.all_interfaces(c) {
                if let Some(field) = self.class(iface).find_declared_field(name, Some(descriptor)) {
                    return Some((iface, field));
                }
            }
        }
        None
    }

    /// Selects the implementation of `resolved` for a receiver of class
    /// `receiver`.
    pub fn resolve_virtual(&mut self, receiver: ClassId, resolved: MethodId) -> Option<MethodId> {
        if let Some(target) = self.vcache.get(&(receiver, resolved)) {
            return Some(*target);
        }
        let method = self.method(resolved);
        let target = if method.is_private() || method.name.as_str() == "<init>" {
            Some(resolved)
        } else {
            let (name, descriptor) = (method.name.clone(), method.descriptor.clone());
            self.lookup_method(receiver, name.as_str(), descriptor.as_str())
        };
        if let Some(target) = target {
            self.vcache.insert((receiver, resolved), target);
        }
        target
    }

    pub fn is_subclass_of(&self, class: ClassId, of: ClassId) -> bool {
        self.super_chain(class).any(|c| c == of)
    }

    pub fn implements(&self, class: ClassId, iface: ClassId) -> bool {
        self.all_interfaces(class).contains(&iface)
    }

    /// Whether a value of class `from` may be stored in a variable of type
    /// `to`.
    pub fn is_assignable(&self, from: ClassId, to: ClassId) -> bool {
        if from == to {
            return true;
        }
        let target = self.class(to);
        if target.name.as_str() == OBJECT_CLASS {
            return true;
        }
        let source = self.class(from);
        if let Some(source_array) = source.array {
            return match target.array {
                Some(target_array) => match (source_array.component, target_array.component) {
                    (Some(sc), Some(tc)) => self.is_assignable(sc, tc),
                    (None, None) => source_array.element == target_array.element,
                    _ => false,
                },
                None => matches!(
                    target.name.as_str(),
                    "java/lang/Cloneable" | "java/io/Serializable"
                ),
            };
        }
        if target.is_interface() {
            self.implements(from, to)
        } else {
            self.is_subclass_of(from, to)
        }
    }
}

impl VM {
    /// Class named by constant `index` of `class`'s pool, loaded and cached
    /// on first use. Never allocates.
    pub(crate) fn link_class_ref(&mut self, class: ClassId, index: u16) -> Result<ClassId, ClassLoadErr> {
        let entry = self.registry.class(class).constant_pool.get(index)?.clone();
        match entry {
            ConstPoolEntry::ResolvedClass(id) => Ok(id),
            ConstPoolEntry::Class { name_index } => {
                let name = self
                    .registry
                    .class(class)
                    .constant_pool
                    .get_utf8(name_index)?
                    .clone();
                let id = self.registry.load(name.as_str(), &mut self.symbols)?;
                self.registry
                    .class_mut(class)
                    .constant_pool
                    .set(index, ConstPoolEntry::ResolvedClass(id));
                log::trace!("resolved class #{} of {:?} to {}", index, class, name);
                Ok(id)
            }
            other => Err(ClassLoadErr::InvalidFormat(format!(
                "constant #{} is {:?}, expected a class",
                index, other
            ))),
        }
    }

    pub(crate) fn resolve_class(&mut self, class: ClassId, index: u16) -> ThrowResult<ClassId> {
        match self.link_class_ref(class, index) {
            Ok(id) => Ok(id),
            Err(e) => Err(self.linkage_failure(e)),
        }
    }

    /// Loads a class by internal name, turning a missing class file into
    /// `NoClassDefFoundError`.
    pub(crate) fn load_class(&mut self, name: &str) -> ThrowResult<ClassId> {
        match self.registry.load(name, &mut self.symbols) {
            Ok(id) => Ok(id),
            Err(e) => Err(self.linkage_failure(e)),
        }
    }

    /// One-dimensional array class of `component`.
    pub(crate) fn array_class_of(&mut self, component: ClassId) -> ThrowResult<ClassId> {
        match self.registry.array_of(component, &mut self.symbols) {
            Ok(id) => Ok(id),
            Err(e) => Err(self.linkage_failure(e)),
        }
    }

    fn linkage_failure(&mut self, e: ClassLoadErr) -> Throw {
        match e {
            ClassLoadErr::NotFound(name) => {
                self.throw_new(ExceptionKind::NoClassDefFoundError, Some(name))
            }
            other => other.into(),
        }
    }

    pub(crate) fn resolve_field(&mut self, class: ClassId, index: u16) -> ThrowResult<ResolvedField> {
        let entry = self.registry.class(class).constant_pool.get(index)?.clone();
        let nat_index = match entry {
            ConstPoolEntry::ResolvedField(field) => return Ok(field),
            ConstPoolEntry::FieldRef { nat_index, .. } => nat_index,
            other => {
                return Err(ClassLoadErr::InvalidFormat(format!(
                    "constant #{} is {:?}, expected a field reference",
                    index, other
                ))
                .into())
            }
        };
        let (class_index, name, descriptor) = {
            let pool = &self.registry.class(class).constant_pool;
            let (name, descriptor) = pool.get_name_and_type(nat_index)?;
            let (class_index, _, _) = pool.get_member_ref(index)?;
            (class_index, name.clone(), descriptor.clone())
        };
        let owner = self.resolve_class(class, class_index)?;
        let resolved = match self
            .registry
            .lookup_field(owner, name.as_str(), descriptor.as_str())
        {
            Some((declaring, field)) => ResolvedField {
                class: declaring,
                slot: field.slot,
                kind: field.kind,
                is_static: field.is_static(),
            },
            None => {
                let message = format!("{}.{}", self.registry.class(owner).java_name(), name);
                return Err(self.throw_new(ExceptionKind::NoSuchFieldError, Some(message)));
            }
        };
        self.registry
            .class_mut(class)
            .constant_pool
            .set(index, ConstPoolEntry::ResolvedField(resolved));
        log::trace!("resolved field #{} of {:?}: {}", index, class, name);
        Ok(resolved)
    }

    pub(crate) fn resolve_method(&mut self, class: ClassId, index: u16) -> ThrowResult<ResolvedMethod> {
        let entry = self.registry.class(class).constant_pool.get(index)?.clone();
        match entry {
            ConstPoolEntry::ResolvedMethod(method) => return Ok(method),
            ConstPoolEntry::MethodRef { .. } | ConstPoolEntry::InterfaceMethodRef { .. } => {}
            other => {
                return Err(ClassLoadErr::InvalidFormat(format!(
                    "constant #{} is {:?}, expected a method reference",
                    index, other
                ))
                .into())
            }
        }
        let (class_index, name, descriptor) = {
            let (class_index, name, descriptor) =
                self.registry.class(class).constant_pool.get_member_ref(index)?;
            (class_index, name.clone(), descriptor.clone())
        };
        let owner = self.resolve_class(class, class_index)?;
        let resolved = match self
            .registry
            .lookup_method(owner, name.as_str(), descriptor.as_str())
        {
            Some(method_id) => {
                let method = self.registry.method(method_id);
                ResolvedMethod {
                    method: method_id,
                    arg_slots: method.frame_arg_slots(),
                    is_static: method.is_static(),
                }
            }
            None => {
                let message = format!(
                    "'{} {}.{}'",
                    descriptor,
                    self.registry.class(owner).java_name(),
                    name
                );
                return Err(self.throw_new(ExceptionKind::NoSuchMethodError, Some(message)));
            }
        };
        self.registry
            .class_mut(class)
            .constant_pool
            .set(index, ConstPoolEntry::ResolvedMethod(resolved));
        log::trace!("resolved method #{} of {:?}: {}{}", index, class, name, descriptor);
        Ok(resolved)
    }

    /// Interned string for a `String` constant.
    pub(crate) fn resolve_string(&mut self, class: ClassId, index: u16) -> ThrowResult<ObjRef> {
        let entry = self.registry.class(class).constant_pool.get(index)?.clone();
        let utf8_index = match entry {
            ConstPoolEntry::ResolvedString(obj) => return Ok(obj),
            ConstPoolEntry::String { utf8_index } => utf8_index,
            other => {
                return Err(ClassLoadErr::InvalidFormat(format!(
                    "constant #{} is {:?}, expected a string",
                    index, other
                ))
                .into())
            }
        };
        let text = self
            .registry
            .class(class)
            .constant_pool
            .get_utf8(utf8_index)?
            .clone();
        let obj = self.intern_string(text.as_str())?;
        self.registry
            .class_mut(class)
            .constant_pool
            .set(index, ConstPoolEntry::ResolvedString(obj));
        Ok(obj)
    }

    /// Starts static initialization of `class` and its superclasses.
    ///
    /// Returns `true` when `<clinit>` frames were pushed; the instruction at
    /// `pc` then runs again once they return. A class that is initializing
    /// or initialized counts as satisfied.
    pub(crate) fn ensure_class_initialized(&mut self, class: ClassId, pc: u32) -> ThrowResult<bool> {
        match self.registry.class(class).init_state {
            InitState::Initialized | InitState::Initializing => return Ok(false),
            InitState::Failed => {
                let message = format!(
                    "Could not initialize class {}",
                    self.registry.class(class).java_name()
                );
                return Err(self.throw_new(ExceptionKind::NoClassDefFoundError, Some(message)));
            }
            InitState::Uninitialized => {}
        }
        self.prepare_statics(class)?;
        let current = self.registry.class_mut(class);
        current.init_state = InitState::Initializing;
        log::debug!("initializing class {}", current.name);

        let clinit = current.find_declared_method("<clinit>", "()V");
        let pushed = match clinit {
            Some(method) => {
                if let Err(e) = self.push_frame(method, pc, pc) {
                    self.registry.class_mut(class).init_state = InitState::Failed;
                    return Err(e);
                }
                true
            }
            None => false,
        };
        let super_pushed = match self.registry.class(class).super_class {
            Some(super_class) => {
                match self.ensure_class_initialized(super_class, if pushed { 0 } else { pc }) {
                    Ok(super_pushed) => super_pushed,
                    Err(e) => {
                        if !pushed {
                            self.registry.class_mut(class).init_state = InitState::Failed;
                        }
                        return Err(e);
                    }
                }
            }
            None => false,
        };
        // without a <clinit> of its own the class follows its superclass
        if !pushed && !super_pushed {
            self.registry.class_mut(class).init_state = InitState::Initialized;
        }
        Ok(pushed || super_pushed)
    }

    /// Allocates the statics block and applies `ConstantValue` initializers.
    fn prepare_statics(&mut self, class: ClassId) -> ThrowResult<()> {
        let current = self.registry.class_mut(class);
        current.statics = Some(FieldsData::new(current.static_slots as usize));
        let constants: Vec<(usize, ValueKind, u16)> = current
            .fields
            .iter()
            .filter(|f| f.is_static())
            .filter_map(|f| f.constant_value.map(|index| (f.slot as usize, f.kind, index)))
            .collect();
        for (slot, kind, index) in constants {
            let value = {
                let pool = &self.registry.class(class).constant_pool;
                match kind {
                    ValueKind::Long => JValue::Long(pool.get_long(index)?),
                    ValueKind::Double => JValue::Double(pool.get_double(index)?),
                    ValueKind::Float => JValue::Float(pool.get_float(index)?),
                    ValueKind::Reference => JValue::Object(None),
                    _ => JValue::Int(pool.get_int32(index)?),
                }
            };
            let value = match value {
                JValue::Object(_) => JValue::Object(Some(self.resolve_string(class, index)?)),
                other => other,
            };
            if let Some(statics) = self.registry.class_mut(class).statics.as_mut() {
                write_slot_value(statics, slot, value);
            }
        }
        Ok(())
    }

    /// Marks the class whose `<clinit>` just returned, and the subclasses
    /// without a `<clinit>` that were waiting on it.
    pub(crate) fn finish_class_init(&mut self, class: ClassId, ok: bool) {
        let state = if ok {
            InitState::Initialized
        } else {
            InitState::Failed
        };
        let mut finished = vec![class];
        while let Some(class) = finished.pop() {
            let current = self.registry.class_mut(class);
            current.init_state = state;
            log::debug!(
                "class {} {}",
                current.name,
                if ok { "initialized" } else { "failed to initialize" }
            );
            finished.extend(
                self.registry
                    .classes()
                    .iter()
                    .enumerate()
                    .filter(|(_, c)| {
                        c.super_class == Some(class)
                            && c.init_state == InitState::Initializing
                            && c.find_declared_method("<clinit>", "()V").is_none()
                    })
                    .map(|(index, _)| ClassId(index as u32)),
            );
        }
    }
}

/// Stores `value` into a fields block at `slot`.
pub(crate) fn write_slot_value(fields: &mut FieldsData, slot: usize, value: JValue) {
    match value {
        JValue::Void => {}
        JValue::Int(v) => fields.set_int(slot, v),
        JValue::Long(v) => fields.set_long(slot, v),
        JValue::Float(v) => fields.set_int(slot, v.to_bits() as JInt),
        JValue::Double(v) => fields.set_long(slot, v.to_bits() as JLong),
        JValue::Object(v) => fields.set_ref(slot, v),
    }
}

/// Reads a slot of a fields block as a value of `kind`.
pub(crate) fn read_slot_value(fields: &FieldsData, slot: usize, kind: ValueKind) -> JValue {
    match kind {
        ValueKind::Long => JValue::Long(fields.get_long(slot)),
        ValueKind::Double => JValue::Double(fields.get_double(slot)),
        ValueKind::Float => JValue::Float(fields.get_float(slot)),
        ValueKind::Reference => JValue::Object(fields.get_ref(slot)),
        _ => JValue::Int(fields.get_int(slot)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classfile::class_loader::MemoryClassPath;
    use crate::classfile::writer::ClassWriter;
    use crate::classfile::ClassPathLoader;

    fn registry() -> (ClassRegistry, SymbolTable) {
        let mut entry = MemoryClassPath::new();
        let mut add = |w: ClassWriter| {
            let name = w.name().to_string();
            entry.add_class(&name, w.to_bytes().unwrap());
        };
        add(ClassWriter::new("java/lang/Object", None));
        add(ClassWriter::interface("java/lang/Cloneable"));
        add(ClassWriter::interface("java/io/Serializable"));
        add(ClassWriter::interface("demo/Shape"));
        let mut base = ClassWriter::new("demo/Base", Some("java/lang/Object"));
        base.field(0, "id", "I").field(0, "next", "Ldemo/Base;");
        base.method(0x0001, "area", "()I", |code| {
            code.iconst(1).op(crate::runtime::opcode::Opcode::IReturn);
        });
        add(base);
        let mut sub = ClassWriter::new("demo/Sub", Some("demo/Base"));
        sub.implements("demo/Shape")
            .field(0, "size", "J")
            .field(0, "peer", "Ljava/lang/Object;")
            .field(0x0008, "COUNT", "I");
        sub.method(0x0001, "area", "()I", |code| {
            code.iconst(2).op(crate::runtime::opcode::Opcode::IReturn);
        });
        add(sub);
        let mut loader = ClassPathLoader::new();
        loader.add_entry(Box::new(entry));
        (ClassRegistry::new(Box::new(loader)), SymbolTable::new())
    }

    #[test]
    fn instance_layout_extends_super_layout() {
        let (mut registry, mut symbols) = registry();
        let sub = registry.load("demo/Sub", &mut symbols).unwrap();
        let class = registry.class(sub);
        assert_eq!(class.instance_slots, 2 + 2 + 1);
        assert_eq!(class.ref_slots, vec![1, 4]);
        assert_eq!(class.static_slots, 1);
        assert!(class.static_ref_slots.is_empty());
        assert_eq!(registry.load("demo/Sub", &mut symbols).unwrap(), sub);
    }

    #[test]
    fn virtual_dispatch_picks_override() {
        let (mut registry, mut symbols) = registry();
        let base = registry.load("demo/Base", &mut symbols).unwrap();
        let sub = registry.load("demo/Sub", &mut symbols).unwrap();
        let base_area = registry.lookup_method(base, "area", "()I").unwrap();
        assert_eq!(base_area.class, base);
        let target = registry.resolve_virtual(sub, base_area).unwrap();
        assert_eq!(target.class, sub);
        assert_eq!(registry.resolve_virtual(base, base_area), Some(base_area));
    }

    #[test]
    fn assignability_rules() {
        let (mut registry, mut symbols) = registry();
        let object = registry.load("java/lang/Object", &mut symbols).unwrap();
        let base = registry.load("demo/Base", &mut symbols).unwrap();
        let sub = registry.load("demo/Sub", &mut symbols).unwrap();
        let shape = registry.load("demo/Shape", &mut symbols).unwrap();
        let cloneable = registry.load("java/lang/Cloneable", &mut symbols).unwrap();
        assert!(registry.is_assignable(sub, base));
        assert!(!registry.is_assignable(base, sub));
        assert!(registry.is_assignable(sub, shape));
        assert!(!registry.is_assignable(base, shape));
        assert!(registry.is_assignable(shape, object));

        let sub_arr = registry.load("[Ldemo/Sub;", &mut symbols).unwrap();
        let base_arr = registry.load("[Ldemo/Base;", &mut symbols).unwrap();
        let int_arr = registry.load("[I", &mut symbols).unwrap();
        let byte_arr = registry.load("[B", &mut symbols).unwrap();
        let int_arr2 = registry.load("[[I", &mut symbols).unwrap();
        assert!(registry.is_assignable(sub_arr, base_arr));
        assert!(!registry.is_assignable(base_arr, sub_arr));
        assert!(!registry.is_assignable(int_arr, byte_arr));
        assert!(!registry.is_assignable(int_arr2, int_arr));
        assert!(registry.is_assignable(int_arr, cloneable));
        assert!(registry.is_assignable(int_arr2, object));
        assert_eq!(registry.class(int_arr2).array.unwrap().component, Some(int_arr));
        assert_eq!(registry.array_of(base, &mut symbols).unwrap(), base_arr);
        assert_eq!(registry.array_of(int_arr, &mut symbols).unwrap(), int_arr2);
    }

    #[test]
    fn missing_class_is_not_found() {
        let (mut registry, mut symbols) = registry();
        assert!(matches!(
            registry.load("demo/Missing", &mut symbols),
            Err(ClassLoadErr::NotFound(_))
        ));
        assert!(registry.load("[Q", &mut symbols).is_err());
    }
}
