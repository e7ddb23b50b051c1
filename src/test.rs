use std::io::Write;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::classfile::writer::ClassWriter;
use crate::object::prelude::ClassId;
use crate::vm::{VMConfig, VM};

/// Console sink whose contents tests can read back.
#[derive(Clone, Default)]
pub struct CapturedConsole(Arc<Mutex<Vec<u8>>>);

impl CapturedConsole {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }
}

impl Write for CapturedConsole {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// A VM with only the bootstrap library on its class path and its console
/// captured.
pub struct TestVm {
    vm: VM,
    pub out: CapturedConsole,
    pub err: CapturedConsole,
}

impl TestVm {
    pub fn bootstrap() -> Self {
        Self::with_config(VMConfig::default())
    }

    pub fn with_stack_slots(slots: usize) -> Self {
        Self::with_config(VMConfig::default().set_stack_slots(slots))
    }

    pub fn with_config(config: VMConfig) -> Self {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut vm = VM::new(config).unwrap();
        let out = CapturedConsole::default();
        let err = CapturedConsole::default();
        vm.set_console(Box::new(out.clone()));
        vm.set_error_console(Box::new(err.clone()));
        vm.heap.clear_pending();
        TestVm { vm, out, err }
    }

    /// Writes a class extending `java/lang/Object` and links it.
    pub fn load_test_class(&mut self, name: &str, build: impl FnOnce(&mut ClassWriter)) -> ClassId {
        let mut writer = ClassWriter::new(name, Some("java/lang/Object"));
        build(&mut writer);
        self.load_written(writer)
    }

    pub fn load_written(&mut self, writer: ClassWriter) -> ClassId {
        let bytes = writer.to_bytes().unwrap();
        self.vm.define_class(bytes).unwrap()
    }
}

impl Deref for TestVm {
    type Target = VM;

    fn deref(&self) -> &VM {
        &self.vm
    }
}

impl DerefMut for TestVm {
    fn deref_mut(&mut self) -> &mut VM {
        &mut self.vm
    }
}
