#![allow(dead_code)]

use std::io::Write;
use std::sync::Arc;

use ejvm::{ClassId, ClassWriter, JValue, VMConfig, VMError, VM};
use parking_lot::Mutex;

pub const PUBLIC_STATIC: u16 = 0x0009;
pub const PUBLIC: u16 = 0x0001;
pub const STATIC: u16 = 0x0008;
pub const SYNCHRONIZED: u16 = 0x0020;

#[derive(Clone, Default)]
pub struct Console(Arc<Mutex<Vec<u8>>>);

impl Console {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }
}

impl Write for Console {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

pub fn new_vm(config: VMConfig) -> (VM, Console) {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut vm = VM::new(config).unwrap();
    let console = Console::default();
    vm.set_console(Box::new(console.clone()));
    (vm, console)
}

pub fn define(vm: &mut VM, name: &str, build: impl FnOnce(&mut ClassWriter)) -> ClassId {
    define_extending(vm, name, "java/lang/Object", build)
}

pub fn define_extending(
    vm: &mut VM,
    name: &str,
    super_class: &str,
    build: impl FnOnce(&mut ClassWriter),
) -> ClassId {
    let mut writer = ClassWriter::new(name, Some(super_class));
    build(&mut writer);
    vm.define_class(writer.to_bytes().unwrap()).unwrap()
}

pub fn uncaught(result: Result<JValue, VMError>) -> (String, Option<String>, Vec<String>) {
    match result {
        Err(VMError::UncaughtException {
            class_name,
            message,
            stack_trace,
        }) => (class_name, message, stack_trace),
        other => panic!("expected an uncaught exception, got {:?}", other),
    }
}

pub fn string_of(vm: &VM, value: JValue) -> Option<String> {
    match value {
        JValue::Object(Some(obj)) => vm.string_value(obj),
        _ => None,
    }
}
