//! An embeddable Java virtual machine core: class loading and linking, a
//! bytecode interpreter, a mark-and-sweep heap, cooperative executions and
//! a debugger interface.
//!
//! ```no_run
//! use ejvm::{VMConfig, VM};
//!
//! let mut vm = VM::new(VMConfig::default().set_class_path("classes"))?;
//! vm.run("demo/Main", &["hello"])?;
//! # Ok::<(), ejvm::VMError>(())
//! ```

pub mod classfile;
pub mod debugger;
pub mod global;
pub mod memory;
pub mod native;
pub mod object;
pub mod runtime;
pub mod thread;
pub mod value;
pub mod vm;

#[cfg(test)]
mod test;

pub use classfile::writer::{ClassWriter, CodeWriter};
pub use classfile::ClassLoadErr;
pub use debugger::{Debugger, StepMode, StopEvent, StopReason};
pub use memory::{GcReport, HeapStats};
pub use native::{NativeArgs, NativeMethod};
pub use object::prelude::{ClassId, MethodId, ObjRef};
pub use runtime::frame::FrameInfo;
pub use runtime::opcode::Opcode;
pub use runtime::SliceOutcome;
pub use thread::{ExecId, SharedVm, TerminateHandle, MAIN_EXECUTION};
pub use value::JValue;
pub use vm::{VMConfig, VMError, VM};
