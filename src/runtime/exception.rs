use crate::object::prelude::*;
use crate::vm::{VMError, VM};

use super::frame::FrameContext;
use super::{Throw, ThrowResult};

macro_rules! exception_kinds {
    ($($kind:ident => $class:literal extends $super:literal),* $(,)?) => {
        /// Exceptions the VM itself raises.
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
        pub enum ExceptionKind {
            $($kind,)*
        }

        impl ExceptionKind {
            pub const ALL: &'static [ExceptionKind] = &[$(ExceptionKind::$kind,)*];

            pub fn class_name(self) -> &'static str {
                match self {
                    $(ExceptionKind::$kind => $class,)*
                }
            }

            pub fn super_class_name(self) -> &'static str {
                match self {
                    $(ExceptionKind::$kind => $super,)*
                }
            }
        }
    };
}

exception_kinds! {
    Exception => "java/lang/Exception" extends "java/lang/Throwable",
    RuntimeException => "java/lang/RuntimeException" extends "java/lang/Exception",
    Error => "java/lang/Error" extends "java/lang/Throwable",
    NullPointerException => "java/lang/NullPointerException" extends "java/lang/RuntimeException",
    ArithmeticException => "java/lang/ArithmeticException" extends "java/lang/RuntimeException",
    IndexOutOfBoundsException => "java/lang/IndexOutOfBoundsException" extends "java/lang/RuntimeException",
    ArrayIndexOutOfBoundsException => "java/lang/ArrayIndexOutOfBoundsException" extends "java/lang/IndexOutOfBoundsException",
    StringIndexOutOfBoundsException => "java/lang/StringIndexOutOfBoundsException" extends "java/lang/IndexOutOfBoundsException",
    ClassCastException => "java/lang/ClassCastException" extends "java/lang/RuntimeException",
    NegativeArraySizeException => "java/lang/NegativeArraySizeException" extends "java/lang/RuntimeException",
    ArrayStoreException => "java/lang/ArrayStoreException" extends "java/lang/RuntimeException",
    IllegalArgumentException => "java/lang/IllegalArgumentException" extends "java/lang/RuntimeException",
    IllegalThreadStateException => "java/lang/IllegalThreadStateException" extends "java/lang/IllegalArgumentException",
    IllegalMonitorStateException => "java/lang/IllegalMonitorStateException" extends "java/lang/RuntimeException",
    CloneNotSupportedException => "java/lang/CloneNotSupportedException" extends "java/lang/Exception",
    ClassNotFoundException => "java/lang/ClassNotFoundException" extends "java/lang/Exception",
    LinkageError => "java/lang/LinkageError" extends "java/lang/Error",
    NoClassDefFoundError => "java/lang/NoClassDefFoundError" extends "java/lang/LinkageError",
    UnsatisfiedLinkError => "java/lang/UnsatisfiedLinkError" extends "java/lang/LinkageError",
    IncompatibleClassChangeError => "java/lang/IncompatibleClassChangeError" extends "java/lang/LinkageError",
    NoSuchFieldError => "java/lang/NoSuchFieldError" extends "java/lang/IncompatibleClassChangeError",
    NoSuchMethodError => "java/lang/NoSuchMethodError" extends "java/lang/IncompatibleClassChangeError",
    AbstractMethodError => "java/lang/AbstractMethodError" extends "java/lang/IncompatibleClassChangeError",
    InstantiationError => "java/lang/InstantiationError" extends "java/lang/IncompatibleClassChangeError",
    VirtualMachineError => "java/lang/VirtualMachineError" extends "java/lang/Error",
    OutOfMemoryError => "java/lang/OutOfMemoryError" extends "java/lang/VirtualMachineError",
    StackOverflowError => "java/lang/StackOverflowError" extends "java/lang/VirtualMachineError",
}

impl VM {
    /// Allocates an exception of `kind` and wraps it for propagation. A
    /// failure while allocating it propagates in its place.
    pub(crate) fn throw_new(&mut self, kind: ExceptionKind, message: Option<String>) -> Throw {
        log::debug!(
            "throwing {}: {}",
            kind.class_name(),
            message.as_deref().unwrap_or("")
        );
        match self.new_throwable(kind.class_name(), message.as_deref()) {
            Ok(obj) => Throw::Exception(obj),
            Err(e) => e,
        }
    }

    /// Instance of a `Throwable` subclass with its detail message set. The
    /// constructor is not run.
    pub(crate) fn new_throwable(&mut self, class_name: &str, message: Option<&str>) -> ThrowResult<ObjRef> {
        let class = self.registry.load(class_name, &mut self.symbols)?;
        let obj = self.new_instance(class)?;
        if let Some(message) = message {
            let text = self.new_java_string(message)?;
            let slot = self.well_known.throwable_message;
            if let Some(fields) = self.heap.get_mut(obj).and_then(Object::fields_mut) {
                fields.set_ref(slot, Some(text));
            }
        }
        Ok(obj)
    }

    pub(crate) fn null_pointer(&mut self, message: String) -> Throw {
        self.throw_new(ExceptionKind::NullPointerException, Some(message))
    }

    pub(crate) fn index_out_of_bounds(&mut self, index: JInt, len: usize) -> Throw {
        self.throw_new(
            ExceptionKind::ArrayIndexOutOfBoundsException,
            Some(format!("Index {} out of bounds for length {}", index, len)),
        )
    }

    /// `detailMessage` of a throwable, if it is a string.
    pub fn throwable_message(&self, throwable: ObjRef) -> Option<String> {
        let slot = self.well_known.throwable_message;
        let message = self.heap.get(throwable)?.fields()?.get_ref(slot)?;
        self.string_value(message)
    }

    /// Transfers control to the nearest handler for `exception`, popping
    /// frames that have none. With no handler left the execution is reset
    /// and the exception reported to the host.
    pub(crate) fn unwind(&mut self, exception: ObjRef) -> Result<(), VMError> {
        let exception_class = self
            .heap
            .get(exception)
            .map(Object::class)
            .ok_or_else(|| VMError::InvalidState(format!("thrown {:?} is not live", exception)))?;
        let mut trace = Vec::new();
        while let Some(method) = self.exec.method {
            let pc = self.exec.pc;
            trace.push((method, pc));
            if let Some(handler_pc) = self.find_handler(method, pc, exception_class) {
                let top = self.exec.start_sp + 1 + self.frame_locals(method);
                self.exec.stack.set_sp(top);
                self.exec.stack.push_ref(Some(exception));
                self.exec.pc = handler_pc;
                log::debug!(
                    "caught {} in {} at pc {}",
                    self.registry.class(exception_class).name,
                    self.method_label(method),
                    handler_pc
                );
                return Ok(());
            }
            self.pop_frame_abruptly(method);
        }
        Err(self.uncaught(exception, exception_class, &trace))
    }

    fn find_handler(&mut self, method: MethodId, pc: u32, exception_class: ClassId) -> Option<u32> {
        let table = self
            .registry
            .method(method)
            .code
            .as_ref()
            .map(|code| code.exception_table.clone())?;
        for entry in table {
            if pc < entry.start_pc as u32 || pc >= entry.end_pc as u32 {
                continue;
            }
            if entry.catch_type == 0 {
                return Some(entry.handler_pc as u32);
            }
            match self.link_class_ref(method.class, entry.catch_type) {
                Ok(catch_class) => {
                    if self.registry.is_assignable(exception_class, catch_class) {
                        return Some(entry.handler_pc as u32);
                    }
                }
                Err(e) => log::warn!(
                    "catch type #{} of {} does not load: {}",
                    entry.catch_type,
                    self.method_label(method),
                    e
                ),
            }
        }
        None
    }

    /// Pops the current frame without a return value.
    fn pop_frame_abruptly(&mut self, method_id: MethodId) {
        let method = self.registry.method(method_id);
        let (synchronized, is_static) = (method.is_synchronized(), method.is_static());
        let is_clinit = method.name.as_str() == "<clinit>";
        if synchronized {
            let target = if is_static {
                Some(MonitorTarget::Class(method_id.class))
            } else {
                MonitorTarget::from_ref(self.exec.stack.load_ref(self.exec.start_sp + 1))
            };
            if let Some(target) = target {
                self.monitor_exit(target);
            }
        }
        if is_clinit {
            self.finish_class_init(method_id.class, false);
        }
        let ctx = FrameContext::read(&self.exec.stack, self.exec.start_sp);
        self.exec.stack.set_sp(FrameContext::base(self.exec.start_sp));
        self.exec.method = ctx.caller;
        self.exec.pc = ctx.caller_pc;
        self.exec.start_sp = ctx.caller_start_sp;
    }

    fn uncaught(&mut self, exception: ObjRef, class: ClassId, trace: &[(MethodId, u32)]) -> VMError {
        let class_name = self.registry.class(class).java_name();
        let message = self.throwable_message(exception);
        let stack_trace = trace
            .iter()
            .map(|(method, pc)| self.describe_frame(*method, *pc))
            .collect();
        log::debug!("uncaught {}: {}", class_name, message.as_deref().unwrap_or(""));
        self.exec.reset();
        VMError::UncaughtException {
            class_name,
            message,
            stack_trace,
        }
    }

    /// `demo.Main.run(Main.java:12)` style location of a frame.
    pub fn describe_frame(&self, method_id: MethodId, pc: u32) -> String {
        let class = self.registry.class(method_id.class);
        let method = self.registry.method(method_id);
        let location = match (&class.source_file, method.code.as_ref().and_then(|c| c.line_of(pc))) {
            (Some(file), Some(line)) => format!("{}:{}", file, line),
            (Some(file), None) => file.to_string(),
            (None, _) if method.is_native() => "Native Method".to_string(),
            (None, _) => "Unknown Source".to_string(),
        };
        format!("{}.{}({})", class.java_name(), method.name, location)
    }

    pub(crate) fn method_label(&self, method_id: MethodId) -> String {
        let method = self.registry.method(method_id);
        format!(
            "{}.{}{}",
            self.registry.class(method_id.class).name,
            method.name,
            method.descriptor
        )
    }
}

/// What a `synchronized` method or block locks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum MonitorTarget {
    Object(ObjRef),
    Class(ClassId),
}

impl MonitorTarget {
    pub(crate) fn from_ref(obj: Option<ObjRef>) -> Option<MonitorTarget> {
        obj.map(MonitorTarget::Object)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::opcode::Opcode;
    use crate::test::TestVm;
    use crate::value::JValue;

    #[test]
    fn every_kind_has_a_throwable_super_chain() {
        let names: Vec<_> = ExceptionKind::ALL.iter().map(|k| k.class_name()).collect();
        for kind in ExceptionKind::ALL {
            let parent = kind.super_class_name();
            assert!(parent == "java/lang/Throwable" || names.contains(&parent), "{:?}", kind);
        }
    }

    #[test]
    fn handler_inside_the_faulting_method() {
        let mut vm = TestVm::bootstrap();
        vm.load_test_class("demo/Safe", |w| {
            w.method(0x0009, "div", "(II)I", |code| {
                let start = code.new_label();
                let end = code.new_label();
                let handler = code.new_label();
                code.bind(start)
                    .iload(0)
                    .iload(1)
                    .op(Opcode::IDiv)
                    .bind(end)
                    .op(Opcode::IReturn);
                code.bind(handler).op(Opcode::Pop).iconst(-1).op(Opcode::IReturn);
                code.try_catch(start, end, handler, Some("java/lang/ArithmeticException"));
            });
        });
        let div = |vm: &mut TestVm, a, b| vm.invoke_static("demo/Safe", "div", "(II)I", &[JValue::Int(a), JValue::Int(b)]);
        assert_eq!(div(&mut vm, 9, 3).unwrap(), JValue::Int(3));
        assert_eq!(div(&mut vm, 9, 0).unwrap(), JValue::Int(-1));
        assert_eq!(vm.exec.stack.sp(), 0);
    }

    #[test]
    fn uncaught_exception_reports_the_frames_it_left() {
        let mut vm = TestVm::bootstrap();
        vm.load_test_class("demo/Deep", |w| {
            w.source_file("Deep.java");
            w.method(0x0009, "outer", "()V", |code| {
                code.line(3).invokestatic("demo/Deep", "inner", "()V").op(Opcode::Return);
            });
            w.method(0x0009, "inner", "()V", |code| {
                code.line(7).op(Opcode::AConstNull).op(Opcode::AThrow);
            });
        });
        let err = vm.invoke_static("demo/Deep", "outer", "()V", &[]).unwrap_err();
        match err {
            VMError::UncaughtException {
                class_name,
                stack_trace,
                ..
            } => {
                assert_eq!(class_name, "java.lang.NullPointerException");
                assert_eq!(
                    stack_trace,
                    vec!["demo.Deep.inner(Deep.java:7)", "demo.Deep.outer(Deep.java:3)"]
                );
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(vm.exec.is_idle());
        assert_eq!(vm.exec.stack.sp(), 0);
    }
}
