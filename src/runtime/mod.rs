pub mod exception;
pub mod frame;
pub mod interpreter;
pub mod invoke;
pub mod linker;
pub mod opcode;
pub mod stack;

use std::time::Instant;

use crate::classfile::ClassLoadErr;
use crate::object::prelude::ObjRef;
use crate::value::JValue;
use crate::vm::VMError;

/// Outcome of one interpreted instruction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Step {
    Next,
    /// The bottom frame returned to the host.
    Returned(JValue),
    /// A monitor is held elsewhere; the instruction runs again later.
    Blocked,
    /// A debugger stop; the instruction runs again on resume.
    Suspend,
}

/// Abrupt completion of an instruction or native.
#[derive(Debug)]
pub enum Throw {
    Exception(ObjRef),
    Fatal(VMError),
}

impl From<VMError> for Throw {
    fn from(e: VMError) -> Self {
        Throw::Fatal(e)
    }
}

impl From<ClassLoadErr> for Throw {
    fn from(e: ClassLoadErr) -> Self {
        Throw::Fatal(VMError::ClassLoaderErr(e))
    }
}

pub type ThrowResult<T> = Result<T, Throw>;

/// How a scheduling slice ended.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SliceOutcome {
    Finished(JValue),
    Yield,
    Blocked,
    Suspended,
    /// `Thread.sleep`; nothing to run before the deadline.
    Sleeping(Instant),
}
