use std::collections::HashMap;
use std::fmt;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use crate::classfile::class_loader::ClassPathLoader;
use crate::classfile::ClassLoadErr;
use crate::debugger::Debugger;
use crate::global::{bootstrap_class_path, WellKnown};
use crate::memory::{Heap, HeapStats, MB};
use crate::native::{NativeMethod, NativeTable};
use crate::object::array::ArrayData;
use crate::object::prelude::*;
use crate::object::string::StringTable;
use crate::object::Object;
use crate::runtime::linker::{read_slot_value, ClassRegistry};
use crate::runtime::{SliceOutcome, Throw};
use crate::thread::{ExecId, Execution, TerminateHandle, MAIN_EXECUTION};
use crate::value::JValue;

const MAIN_DESCRIPTOR: &str = "([Ljava/lang/String;)V";

/// Tunables of a [`VM`]. Every setter consumes and returns the config so
/// they chain off `VMConfig::default()`.
#[derive(Debug, Clone)]
pub struct VMConfig {
    pub class_path: Vec<PathBuf>,
    /// Slots of each execution stack. Exceeding them raises
    /// `StackOverflowError`.
    pub stack_slots: usize,
    pub heap_limit: usize,
    /// Bytes allocated between two collections.
    pub gc_threshold: usize,
    /// Collect on every n-th allocation.
    pub gc_stress: Option<u32>,
    /// Instructions an execution runs before it yields.
    pub slice_budget: usize,
    pub hash_seed: u64,
}

impl Default for VMConfig {
    fn default() -> Self {
        VMConfig {
            class_path: Vec::new(),
            stack_slots: 64 * 1024,
            heap_limit: 64 * MB,
            gc_threshold: MB,
            gc_stress: None,
            slice_budget: 10_000,
            hash_seed: 0x9e37_79b9_7f4a_7c15,
        }
    }
}

impl VMConfig {
    /// Replaces the class path with the entries of a platform path list
    /// such as `classes:lib/app.jar`.
    pub fn set_class_path(mut self, class_path: &str) -> Self {
        self.class_path = std::env::split_paths(class_path)
            .filter(|p| !p.as_os_str().is_empty())
            .collect();
        self
    }

    pub fn add_class_path<P: Into<PathBuf>>(mut self, entry: P) -> Self {
        self.class_path.push(entry.into());
        self
    }

    pub fn set_stack_slots(mut self, slots: usize) -> Self {
        self.stack_slots = slots;
        self
    }

    pub fn set_heap_limit(mut self, bytes: usize) -> Self {
        self.heap_limit = bytes;
        self
    }

    pub fn set_gc_threshold(mut self, bytes: usize) -> Self {
        self.gc_threshold = bytes;
        self
    }

    pub fn set_gc_stress(mut self, every: Option<u32>) -> Self {
        self.gc_stress = every;
        self
    }

    pub fn set_slice_budget(mut self, instructions: usize) -> Self {
        self.slice_budget = instructions.max(1);
        self
    }

    pub fn set_hash_seed(mut self, seed: u64) -> Self {
        self.hash_seed = seed;
        self
    }
}

/// Errors surfaced to the embedder.
#[derive(Debug, Clone, PartialEq)]
pub enum VMError {
    ClassLoaderErr(ClassLoadErr),
    InvalidDescriptor(String),
    UnknownOpcode {
        opcode: u8,
        method: String,
        pc: u32,
    },
    Unsupported(String),
    InvalidState(String),
    /// The heap was exhausted before the VM could preallocate its
    /// `OutOfMemoryError`.
    OutOfMemory,
    MethodNotFound {
        class: String,
        name: String,
        descriptor: String,
    },
    /// A Java exception reached the host. `stack_trace` lists the frames it
    /// unwound, innermost first.
    UncaughtException {
        class_name: String,
        message: Option<String>,
        stack_trace: Vec<String>,
    },
    Terminated,
}

impl fmt::Display for VMError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VMError::ClassLoaderErr(e) => write!(f, "{}", e),
            VMError::InvalidDescriptor(desc) => write!(f, "invalid descriptor {}", desc),
            VMError::UnknownOpcode { opcode, method, pc } => {
                write!(f, "unknown opcode 0x{:02x} in {} at pc {}", opcode, method, pc)
            }
            VMError::Unsupported(what) => write!(f, "unsupported: {}", what),
            VMError::InvalidState(msg) => write!(f, "invalid state: {}", msg),
            VMError::OutOfMemory => write!(f, "out of memory"),
            VMError::MethodNotFound {
                class,
                name,
                descriptor,
            } => write!(f, "no method {}.{}{}", class, name, descriptor),
            VMError::UncaughtException {
                class_name,
                message,
                stack_trace,
            } => {
                write!(f, "Exception {}", class_name)?;
                if let Some(message) = message {
                    write!(f, ": {}", message)?;
                }
                for frame in stack_trace {
                    write!(f, "\n\tat {}", frame)?;
                }
                Ok(())
            }
            VMError::Terminated => write!(f, "execution terminated"),
        }
    }
}

impl std::error::Error for VMError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            VMError::ClassLoaderErr(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ClassLoadErr> for VMError {
    fn from(e: ClassLoadErr) -> Self {
        VMError::ClassLoaderErr(e)
    }
}

/// One embedded virtual machine. Everything it owns, heap and classes
/// included, is dropped with it.
pub struct VM {
    pub(crate) config: VMConfig,
    pub(crate) heap: Heap,
    pub(crate) symbols: SymbolTable,
    pub(crate) strings: StringTable,
    pub(crate) registry: ClassRegistry,
    pub(crate) natives: NativeTable,
    pub(crate) well_known: WellKnown,
    /// The execution the interpreter is running.
    pub(crate) exec: Execution,
    /// Executions waiting for their next slice.
    pub(crate) parked: HashMap<ExecId, Execution>,
    /// Results of executions that finished while being prepared.
    pub(crate) completed: HashMap<ExecId, JValue>,
    /// Executions started by `Thread.start` that no driver has picked up.
    pub(crate) guest_threads: Vec<ExecId>,
    /// Set by `Thread.yield` and `Thread.sleep` to end the current slice.
    pub(crate) yield_requested: bool,
    /// Instructions run so far, across executions.
    pub(crate) executed: u64,
    next_exec_id: ExecId,
    pub(crate) out_of_memory: Option<ObjRef>,
    pub(crate) debugger: Option<Arc<Debugger>>,
    /// Original opcodes under patched breakpoints.
    pub(crate) breakpoints: HashMap<(MethodId, u32), u8>,
    console: Box<dyn Write + Send>,
    error_console: Box<dyn Write + Send>,
    pub(crate) terminate: TerminateHandle,
}

impl VM {
    pub fn new(config: VMConfig) -> Result<VM, VMError> {
        let mut loader = ClassPathLoader::from_paths(&config.class_path)?;
        loader.prepend_entry(Box::new(bootstrap_class_path()?));

        let mut symbols = SymbolTable::new();
        let mut registry = ClassRegistry::new(Box::new(loader));
        let well_known = WellKnown::resolve(&mut registry, &mut symbols)?;
        let heap = Heap::new(
            config.heap_limit,
            config.gc_threshold,
            config.gc_stress,
            config.hash_seed,
        );
        let exec = Execution::new(MAIN_EXECUTION, config.stack_slots);

        let mut vm = VM {
            config,
            heap,
            symbols,
            strings: StringTable::default(),
            registry,
            natives: NativeTable::with_builtins(),
            well_known,
            exec,
            parked: HashMap::new(),
            completed: HashMap::new(),
            guest_threads: Vec::new(),
            yield_requested: false,
            executed: 0,
            next_exec_id: MAIN_EXECUTION + 1,
            out_of_memory: None,
            debugger: None,
            breakpoints: HashMap::new(),
            console: Box::new(std::io::stdout()),
            error_console: Box::new(std::io::stderr()),
            terminate: TerminateHandle::default(),
        };

        let oom = vm
            .new_throwable("java/lang/OutOfMemoryError", Some("Java heap space"))
            .map_err(|e| vm.host_error(e))?;
        vm.heap.set_sticky(oom);
        vm.out_of_memory = Some(oom);

        log::info!(
            "ejvm started: {} classes linked, {} class path entries, heap limit {} bytes, {} stack slots",
            vm.registry.len(),
            vm.config.class_path.len(),
            vm.config.heap_limit,
            vm.config.stack_slots
        );
        Ok(vm)
    }

    pub fn config(&self) -> &VMConfig {
        &self.config
    }

    /// Converts a throw that escaped to the host.
    pub(crate) fn host_error(&self, throw: Throw) -> VMError {
        match throw {
            Throw::Fatal(e) => e,
            Throw::Exception(exception) => VMError::UncaughtException {
                class_name: self.class_name_of(exception).unwrap_or_default(),
                message: self.throwable_message(exception),
                stack_trace: Vec::new(),
            },
        }
    }

    /// Runs `public static void main(String[])` of `main_class`, then
    /// waits for the threads it started.
    pub fn run(&mut self, main_class: &str, args: &[&str]) -> Result<(), VMError> {
        let method = self.find_static(main_class, "main", MAIN_DESCRIPTOR)?;
        let argv = self.new_string_array(args)?;
        self.heap.pin(argv);
        let result = self.invoke_method(method, &[JValue::Object(Some(argv))]);
        self.heap.unpin(argv);
        let joined = self.join_guest_threads();
        result.and(joined).map(|_| ())
    }

    /// Calls a static method and runs it to completion. The class is
    /// loaded and initialized first.
    pub fn invoke_static(
        &mut self,
        class_name: &str,
        method_name: &str,
        descriptor: &str,
        args: &[JValue],
    ) -> Result<JValue, VMError> {
        let method = self.find_static(class_name, method_name, descriptor)?;
        self.invoke_method(method, args)
    }

    /// Calls an instance method on `receiver`, dispatching on its runtime
    /// class. `args` exclude the receiver.
    pub fn invoke_virtual(
        &mut self,
        receiver: ObjRef,
        method_name: &str,
        descriptor: &str,
        args: &[JValue],
    ) -> Result<JValue, VMError> {
        let class = self
            .heap
            .get(receiver)
            .map(Object::class)
            .ok_or_else(|| VMError::InvalidState(format!("{:?} is not a live object", receiver)))?;
        let resolved = self
            .registry
            .lookup_method(class, method_name, descriptor)
            .ok_or_else(|| self.method_not_found(class, method_name, descriptor))?;
        let method = self.registry.method(resolved);
        if method.is_static() {
            return Err(VMError::InvalidState(format!(
                "{} is static",
                self.method_label(resolved)
            )));
        }
        let target = if method.is_private() || method.name.as_str() == "<init>" {
            resolved
        } else {
            self.registry.resolve_virtual(class, resolved).unwrap_or(resolved)
        };
        let mut full_args = Vec::with_capacity(args.len() + 1);
        full_args.push(JValue::Object(Some(receiver)));
        full_args.extend_from_slice(args);
        self.invoke_method(target, &full_args)
    }

    /// Links a class from class file bytes without going through the class
    /// path. Its initializer runs on first use.
    pub fn define_class(&mut self, bytes: Vec<u8>) -> Result<ClassId, VMError> {
        Ok(self.registry.define_class(bytes, &mut self.symbols)?)
    }

    fn invoke_method(&mut self, method: MethodId, args: &[JValue]) -> Result<JValue, VMError> {
        match self.enter_method(method, args)? {
            Some(value) => Ok(value),
            None => self.run_to_completion(),
        }
    }

    fn find_static(&mut self, class_name: &str, method_name: &str, descriptor: &str) -> Result<MethodId, VMError> {
        let class = self.registry.load(class_name, &mut self.symbols)?;
        let method = self
            .registry
            .lookup_method(class, method_name, descriptor)
            .ok_or_else(|| self.method_not_found(class, method_name, descriptor))?;
        if !self.registry.method(method).is_static() {
            return Err(VMError::InvalidState(format!(
                "{} is not static",
                self.method_label(method)
            )));
        }
        Ok(method)
    }

    fn method_not_found(&self, class: ClassId, name: &str, descriptor: &str) -> VMError {
        VMError::MethodNotFound {
            class: self.registry.class(class).java_name(),
            name: name.to_string(),
            descriptor: descriptor.to_string(),
        }
    }

    /// New `java/lang/String`. It stays reachable until the next instruction
    /// runs; pin it to hold it longer.
    pub fn new_string(&mut self, text: &str) -> Result<ObjRef, VMError> {
        self.new_java_string(text).map_err(|e| self.host_error(e))
    }

    fn new_string_array(&mut self, values: &[&str]) -> Result<ObjRef, VMError> {
        let class = self.registry.load("[Ljava/lang/String;", &mut self.symbols)?;
        let array = self
            .new_array(class, values.len() as JInt)
            .map_err(|e| self.host_error(e))?;
        for (index, value) in values.iter().enumerate() {
            let text = self.new_java_string(value).map_err(|e| self.host_error(e))?;
            if let Some(ArrayData::Ref(elements)) = self.heap.get_mut(array).and_then(Object::array_mut) {
                elements[index] = Some(text);
            }
        }
        Ok(array)
    }

    /// Value of a static field, searched from `class_name` up its super
    /// classes. Initializes the class first.
    pub fn get_static(&mut self, class_name: &str, field_name: &str) -> Result<JValue, VMError> {
        let class = self.registry.load(class_name, &mut self.symbols)?;
        self.initialize_class(class)?;
        let found = self.registry.super_chain(class).find_map(|c| {
            self.registry
                .class(c)
                .find_declared_field(field_name, None)
                .filter(|f| f.is_static())
                .map(|f| (c, f.slot as usize, f.kind))
        });
        let Some((owner, slot, kind)) = found else {
            return Err(VMError::InvalidState(format!(
                "no static field {} in {}",
                field_name, class_name
            )));
        };
        self.registry
            .class(owner)
            .statics
            .as_ref()
            .map(|statics| read_slot_value(statics, slot, kind))
            .ok_or_else(|| VMError::InvalidState(format!("statics of {} are not prepared", class_name)))
    }

    /// Java name of the object's class, such as `java.lang.String`.
    pub fn class_name_of(&self, obj: ObjRef) -> Option<String> {
        let object = self.heap.get(obj)?;
        self.registry.get_class(object.class()).map(|c| c.java_name())
    }

    pub fn heap_stats(&self) -> HeapStats {
        self.heap.stats()
    }

    pub fn is_live(&self, obj: ObjRef) -> bool {
        self.heap.contains(obj)
    }

    /// Keeps `obj` alive across collections until unpinned. Pins nest.
    pub fn pin(&mut self, obj: ObjRef) {
        self.heap.pin(obj);
    }

    pub fn unpin(&mut self, obj: ObjRef) {
        self.heap.unpin(obj);
    }

    /// Destination of `System.out`.
    pub fn set_console(&mut self, console: Box<dyn Write + Send>) {
        self.console = console;
    }

    /// Destination of `System.err`.
    pub fn set_error_console(&mut self, console: Box<dyn Write + Send>) {
        self.error_console = console;
    }

    fn console_for(&mut self, fd: JInt) -> &mut (dyn Write + Send) {
        if fd == 2 {
            self.error_console.as_mut()
        } else {
            self.console.as_mut()
        }
    }

    pub(crate) fn console_write(&mut self, fd: JInt, text: &str) {
        if let Err(e) = self.console_for(fd).write_all(text.as_bytes()) {
            log::warn!("console write to fd {} failed: {}", fd, e);
        }
    }

    pub(crate) fn console_flush(&mut self, fd: JInt) {
        if let Err(e) = self.console_for(fd).flush() {
            log::warn!("console flush of fd {} failed: {}", fd, e);
        }
    }

    /// Binds a native for `class_name.name descriptor`, replacing any
    /// earlier binding. Applies to classes already loaded too.
    pub fn register_native(
        &mut self,
        class_name: &str,
        name: &str,
        descriptor: &str,
        native: NativeMethod,
    ) -> Option<NativeMethod> {
        if let Some(class) = self.registry.find(class_name) {
            if let Some(method) = self.registry.class(class).find_declared_method(name, descriptor) {
                self.registry.method_mut(method).native = Some(native);
            }
        }
        self.natives.register(class_name, name, descriptor, native)
    }

    pub fn terminate_handle(&self) -> TerminateHandle {
        self.terminate.clone()
    }

    /// Creates a parked execution that will run a static method. Natives
    /// complete right away and their result is kept for the first slice.
    pub fn prepare_execution(
        &mut self,
        class_name: &str,
        method_name: &str,
        descriptor: &str,
        args: &[JValue],
    ) -> Result<ExecId, VMError> {
        let method = self.find_static(class_name, method_name, descriptor)?;
        self.prepare_method_execution(method, args)
    }

    pub(crate) fn prepare_method_execution(&mut self, method: MethodId, args: &[JValue]) -> Result<ExecId, VMError> {
        let id = self.next_exec_id;
        self.next_exec_id += 1;

        let fresh = Execution::new(id, self.config.stack_slots);
        let main = std::mem::replace(&mut self.exec, fresh);
        let main_id = main.id;
        self.parked.insert(main_id, main);
        let entered = self.enter_method(method, args);
        let exec = self.swap_back(main_id);

        match entered? {
            Some(value) => {
                self.completed.insert(id, value);
            }
            None => {
                self.parked.insert(id, exec);
            }
        }
        log::debug!("prepared execution {} for {}", id, self.method_label(method));
        Ok(id)
    }

    /// Drops a parked execution without running it further.
    pub(crate) fn discard_execution(&mut self, id: ExecId) {
        self.completed.remove(&id);
        if let Some(exec) = self.parked.remove(&id) {
            let current = std::mem::replace(&mut self.exec, exec);
            let current_id = current.id;
            self.parked.insert(current_id, current);
            self.abandon_execution();
            self.swap_back(current_id);
        }
    }

    /// Hands the executions started by guest code over to the caller, which
    /// becomes responsible for driving them.
    pub(crate) fn take_guest_threads(&mut self) -> Vec<ExecId> {
        std::mem::take(&mut self.guest_threads)
    }

    /// Reports how a guest thread ended, the way `java` prints an uncaught
    /// exception.
    pub(crate) fn report_thread_death(&mut self, id: ExecId, error: &VMError) {
        match error {
            VMError::Terminated => log::debug!("execution {} terminated", id),
            VMError::UncaughtException {
                class_name,
                message,
                stack_trace,
            } => {
                log::warn!("execution {} died with {}", id, class_name);
                let mut text = format!("Exception in thread \"Thread-{}\" {}", id, class_name);
                if let Some(message) = message {
                    text.push_str(": ");
                    text.push_str(message);
                }
                text.push('\n');
                for frame in stack_trace {
                    text.push_str("\tat ");
                    text.push_str(frame);
                    text.push('\n');
                }
                self.console_write(2, &text);
                self.console_flush(2);
            }
            other => log::error!("execution {} failed: {}", id, other),
        }
    }

    /// Runs one slice of a parked execution.
    pub fn run_parked_slice(&mut self, id: ExecId) -> Result<SliceOutcome, VMError> {
        if let Some(value) = self.completed.remove(&id) {
            return Ok(SliceOutcome::Finished(value));
        }
        let exec = self
            .parked
            .remove(&id)
            .ok_or_else(|| VMError::InvalidState(format!("no parked execution {}", id)))?;
        let main = std::mem::replace(&mut self.exec, exec);
        let main_id = main.id;
        self.parked.insert(main_id, main);

        let outcome = if self.terminate.is_terminated() {
            self.abandon_execution();
            Err(VMError::Terminated)
        } else {
            self.run_slice(self.config.slice_budget)
        };
        let exec = self.swap_back(main_id);
        match outcome {
            Ok(SliceOutcome::Finished(value)) => Ok(SliceOutcome::Finished(value)),
            Ok(other) => {
                self.parked.insert(id, exec);
                Ok(other)
            }
            Err(e) => {
                log::debug!("execution {} ended: {}", id, e);
                Err(e)
            }
        }
    }

    /// Restores the execution parked under `id` as current and returns the
    /// one it replaces.
    fn swap_back(&mut self, id: ExecId) -> Execution {
        match self.parked.remove(&id) {
            Some(previous) => std::mem::replace(&mut self.exec, previous),
            None => std::mem::replace(&mut self.exec, Execution::new(id, self.config.stack_slots)),
        }
    }

    /// Ids of executions waiting for a slice.
    pub fn parked_executions(&self) -> Vec<ExecId> {
        let mut ids: Vec<ExecId> = self.parked.keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults_and_setters() {
        let config = VMConfig::default();
        assert_eq!(config.stack_slots, 65536);
        assert_eq!(config.heap_limit, 64 * MB);
        assert_eq!(config.gc_threshold, MB);
        assert_eq!(config.slice_budget, 10_000);
        assert!(config.gc_stress.is_none());

        let config = VMConfig::default()
            .set_class_path("classes:lib/app.jar")
            .set_slice_budget(0)
            .set_gc_stress(Some(3));
        assert_eq!(config.class_path, vec![PathBuf::from("classes"), PathBuf::from("lib/app.jar")]);
        assert_eq!(config.slice_budget, 1);
        assert_eq!(config.gc_stress, Some(3));
    }

    #[test]
    fn uncaught_exception_display_lists_frames() {
        let e = VMError::UncaughtException {
            class_name: "java.lang.ArithmeticException".into(),
            message: Some("/ by zero".into()),
            stack_trace: vec!["demo.Main.main(Main.java:4)".into()],
        };
        assert_eq!(
            e.to_string(),
            "Exception java.lang.ArithmeticException: / by zero\n\tat demo.Main.main(Main.java:4)"
        );
    }
}
