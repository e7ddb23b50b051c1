use std::time::Instant;

use crate::object::array::ArrayData;
use crate::object::prelude::*;
use crate::value::JValue;
use crate::vm::{VMError, VM};

use super::exception::{ExceptionKind, MonitorTarget};
use super::linker::{read_slot_value, write_slot_value};
use super::opcode::Opcode;
use super::stack::StackPrimitiveValue;
use super::{SliceOutcome, Step, Throw, ThrowResult};

macro_rules! num_arithmetic {
    ($vm:ident, $ty:ty, |$a:ident, $b:ident| $body:expr) => {{
        let $b = $vm.exec.stack.pop::<$ty>();
        let $a = $vm.exec.stack.pop::<$ty>();
        $vm.exec.stack.push::<$ty>($body);
    }};
}

macro_rules! num_unary {
    ($vm:ident, $ty:ty => $to:ty, |$a:ident| $body:expr) => {{
        let $a = $vm.exec.stack.pop::<$ty>();
        $vm.exec.stack.push::<$to>($body);
    }};
}

macro_rules! num_divide {
    ($vm:ident, $ty:ty, $op:ident) => {{
        let b = $vm.exec.stack.pop::<$ty>();
        let a = $vm.exec.stack.pop::<$ty>();
        if b == 0 {
            return Err($vm.throw_new(ExceptionKind::ArithmeticException, Some("/ by zero".into())));
        }
        $vm.exec.stack.push::<$ty>(a.$op(b));
    }};
}

macro_rules! num_shift {
    ($vm:ident, $ty:ty, $mask:expr, |$v:ident, $s:ident| $body:expr) => {{
        let $s = ($vm.exec.stack.pop::<JInt>() & $mask) as u32;
        let $v = $vm.exec.stack.pop::<$ty>();
        $vm.exec.stack.push::<$ty>($body);
    }};
}

macro_rules! num_compare {
    ($vm:ident, $ty:ty, $nan:expr) => {{
        let b = $vm.exec.stack.pop::<$ty>();
        let a = $vm.exec.stack.pop::<$ty>();
        $vm.exec.stack.push::<JInt>(op_val_cmp(a, b, $nan));
    }};
}

macro_rules! num_if {
    ($vm:ident, $next:ident, $method:ident, $pc:ident, |$v:ident| $cond:expr) => {{
        let $v = $vm.exec.stack.pop::<JInt>();
        if $cond {
            $next = branch_target($pc, $vm.code_i2($method, $pc + 1)? as i32);
        } else {
            $next = $pc + 3;
        }
    }};
}

macro_rules! num_if_cmp {
    ($vm:ident, $next:ident, $method:ident, $pc:ident, $op:tt) => {{
        let b = $vm.exec.stack.pop::<JInt>();
        let a = $vm.exec.stack.pop::<JInt>();
        if a $op b {
            $next = branch_target($pc, $vm.code_i2($method, $pc + 1)? as i32);
        } else {
            $next = $pc + 3;
        }
    }};
}

/// `fcmp<op>`/`dcmp<op>`: `nan` is the result when either side is NaN.
fn op_val_cmp<T: PartialOrd>(a: T, b: T, nan: JInt) -> JInt {
    if a > b {
        1
    } else if a == b {
        0
    } else if a < b {
        -1
    } else {
        nan
    }
}

#[inline]
fn branch_target(pc: u32, offset: i32) -> u32 {
    (pc as i64 + offset as i64) as u32
}

/// Narrows an int to the storage width of a sub-int field or element.
fn narrow(kind: ValueKind, v: JInt) -> JInt {
    match kind {
        ValueKind::Boolean => v & 1,
        ValueKind::Byte => v as i8 as JInt,
        ValueKind::Char => v as u16 as JInt,
        ValueKind::Short => v as i16 as JInt,
        _ => v,
    }
}

impl VM {
    /// Runs up to `budget` instructions of the current execution.
    pub(crate) fn run_slice(&mut self, budget: usize) -> Result<SliceOutcome, VMError> {
        if self.exec.is_idle() {
            return Err(VMError::InvalidState(format!(
                "execution {} has nothing to run",
                self.exec.id
            )));
        }
        if let Some(wake_at) = self.exec.wake_at {
            if Instant::now() < wake_at {
                return Ok(SliceOutcome::Sleeping(wake_at));
            }
            self.exec.wake_at = None;
        }
        self.yield_requested = false;
        for _ in 0..budget {
            self.heap.clear_pending();
            if let Some(exception) = self.exec.pending_exception.take() {
                self.unwind(exception)?;
                continue;
            }
            let step = self.step();
            if !matches!(step, Ok(Step::Blocked)) {
                self.executed = self.executed.wrapping_add(1);
            }
            match step {
                Ok(Step::Next) if self.yield_requested => {
                    self.yield_requested = false;
                    return Ok(match self.exec.wake_at {
                        Some(wake_at) => SliceOutcome::Sleeping(wake_at),
                        None => SliceOutcome::Yield,
                    });
                }
                Ok(Step::Next) => {}
                Ok(Step::Returned(value)) => {
                    if let JValue::Object(Some(obj)) = value {
                        self.heap.protect(obj);
                    }
                    return Ok(SliceOutcome::Finished(value));
                }
                Ok(Step::Blocked) => return Ok(SliceOutcome::Blocked),
                Ok(Step::Suspend) => return Ok(SliceOutcome::Suspended),
                Err(Throw::Exception(exception)) => {
                    if self.break_on_exception(exception) {
                        return Ok(SliceOutcome::Suspended);
                    }
                    self.unwind(exception)?;
                }
                Err(Throw::Fatal(e)) => {
                    log::error!("execution {} aborted: {}", self.exec.id, e);
                    self.abandon_execution();
                    return Err(e);
                }
            }
        }
        Ok(SliceOutcome::Yield)
    }

    fn code_u1(&self, method: MethodId, at: u32) -> ThrowResult<u8> {
        self.registry
            .method(method)
            .code
            .as_ref()
            .and_then(|code| code.bytecode.get(at as usize).copied())
            .ok_or_else(|| self.pc_out_of_range(method, at))
    }

    fn code_bytes<const N: usize>(&self, method: MethodId, at: u32) -> ThrowResult<[u8; N]> {
        self.registry
            .method(method)
            .code
            .as_ref()
            .and_then(|code| code.bytecode.get(at as usize..at as usize + N))
            .and_then(|bytes| bytes.try_into().ok())
            .ok_or_else(|| self.pc_out_of_range(method, at))
    }

    fn code_u2(&self, method: MethodId, at: u32) -> ThrowResult<u16> {
        self.code_bytes::<2>(method, at).map(u16::from_be_bytes)
    }

    fn code_i2(&self, method: MethodId, at: u32) -> ThrowResult<i16> {
        self.code_bytes::<2>(method, at).map(i16::from_be_bytes)
    }

    fn code_i4(&self, method: MethodId, at: u32) -> ThrowResult<i32> {
        self.code_bytes::<4>(method, at).map(i32::from_be_bytes)
    }

    fn pc_out_of_range(&self, method: MethodId, at: u32) -> Throw {
        VMError::InvalidState(format!("pc {} outside the code of {}", at, self.method_label(method))).into()
    }

    #[inline]
    fn local(&self, index: usize) -> usize {
        self.exec.start_sp + 1 + index
    }

    fn load_local<T: StackPrimitiveValue>(&mut self, index: usize) {
        let at = self.local(index);
        let v = self.exec.stack.load::<T>(at);
        self.exec.stack.push(v);
    }

    fn store_local<T: StackPrimitiveValue>(&mut self, index: usize) {
        let at = self.local(index);
        let v = self.exec.stack.pop::<T>();
        self.exec.stack.store(v, at);
    }

    fn load_local_ref(&mut self, index: usize) {
        let at = self.local(index);
        let obj = self.exec.stack.load_ref(at);
        self.exec.stack.push_ref(obj);
    }

    fn store_local_ref(&mut self, index: usize) {
        let at = self.local(index);
        let obj = self.exec.stack.pop_ref();
        self.exec.stack.store_ref(obj, at);
    }

    fn pop_value(&mut self, kind: ValueKind) -> JValue {
        let stack = &mut self.exec.stack;
        match kind {
            ValueKind::Long => JValue::Long(stack.pop()),
            ValueKind::Double => JValue::Double(stack.pop()),
            ValueKind::Float => JValue::Float(stack.pop()),
            ValueKind::Reference => JValue::Object(stack.pop_ref()),
            _ => JValue::Int(narrow(kind, stack.pop())),
        }
    }

    /// Executes the instruction at the current pc.
    pub(crate) fn step(&mut self) -> ThrowResult<Step> {
        let method = self
            .exec
            .method
            .ok_or_else(|| VMError::InvalidState("execution has no frame".into()))?;
        let pc = self.exec.pc;
        let class = method.class;
        let mut op_byte = self.code_u1(method, pc)?;

        // set when the last stop happened at this very instruction
        let resumed = self.exec.skip_breakpoint.take() == Some((method, pc));
        if !resumed {
            if let Some(debugger) = self.debugger.clone() {
                if debugger.is_armed() && self.debug_stop_check(&debugger, method, pc) {
                    return Ok(Step::Suspend);
                }
            }
        }
        if op_byte == Opcode::Breakpoint as u8 {
            match self.breakpoint_original(method, pc, resumed)? {
                Some(original) => op_byte = original,
                None => return Ok(Step::Suspend),
            }
        }
        let opcode = Opcode::from_u8(op_byte).ok_or_else(|| VMError::UnknownOpcode {
            opcode: op_byte,
            method: self.method_label(method),
            pc,
        })?;
        if log::log_enabled!(log::Level::Trace) {
            log::trace!("{} {} @ {}", self.method_label(method), opcode.mnemonic(), pc);
        }

        let mut next = pc + 1;
        match opcode {
            Opcode::Nop => {}
            Opcode::AConstNull => self.exec.stack.push_ref(None),
            Opcode::IConstM1
            | Opcode::IConst0
            | Opcode::IConst1
            | Opcode::IConst2
            | Opcode::IConst3
            | Opcode::IConst4
            | Opcode::IConst5 => self
                .exec
                .stack
                .push::<JInt>(op_byte as JInt - Opcode::IConst0 as JInt),
            Opcode::LConst0 | Opcode::LConst1 => self
                .exec
                .stack
                .push::<JLong>((op_byte - Opcode::LConst0 as u8) as JLong),
            Opcode::FConst0 | Opcode::FConst1 | Opcode::FConst2 => self
                .exec
                .stack
                .push::<JFloat>((op_byte - Opcode::FConst0 as u8) as JFloat),
            Opcode::DConst0 | Opcode::DConst1 => self
                .exec
                .stack
                .push::<JDouble>((op_byte - Opcode::DConst0 as u8) as JDouble),
            Opcode::BIPush => {
                let v = self.code_u1(method, pc + 1)? as i8;
                self.exec.stack.push::<JInt>(v as JInt);
                next = pc + 2;
            }
            Opcode::SIPush => {
                let v = self.code_i2(method, pc + 1)?;
                self.exec.stack.push::<JInt>(v as JInt);
                next = pc + 3;
            }
            Opcode::Ldc => {
                let index = self.code_u1(method, pc + 1)? as u16;
                self.ldc(class, index)?;
                next = pc + 2;
            }
            Opcode::LdcW | Opcode::Ldc2W => {
                let index = self.code_u2(method, pc + 1)?;
                self.ldc(class, index)?;
                next = pc + 3;
            }

            Opcode::ILoad | Opcode::FLoad => {
                let index = self.code_u1(method, pc + 1)? as usize;
                self.load_local::<JInt>(index);
                next = pc + 2;
            }
            Opcode::LLoad | Opcode::DLoad => {
                let index = self.code_u1(method, pc + 1)? as usize;
                self.load_local::<JLong>(index);
                next = pc + 2;
            }
            Opcode::ALoad => {
                let index = self.code_u1(method, pc + 1)? as usize;
                self.load_local_ref(index);
                next = pc + 2;
            }
            Opcode::ILoad0 | Opcode::ILoad1 | Opcode::ILoad2 | Opcode::ILoad3 => {
                self.load_local::<JInt>((op_byte - Opcode::ILoad0 as u8) as usize)
            }
            Opcode::LLoad0 | Opcode::LLoad1 | Opcode::LLoad2 | Opcode::LLoad3 => {
                self.load_local::<JLong>((op_byte - Opcode::LLoad0 as u8) as usize)
            }
            Opcode::FLoad0 | Opcode::FLoad1 | Opcode::FLoad2 | Opcode::FLoad3 => {
                self.load_local::<JFloat>((op_byte - Opcode::FLoad0 as u8) as usize)
            }
            Opcode::DLoad0 | Opcode::DLoad1 | Opcode::DLoad2 | Opcode::DLoad3 => {
                self.load_local::<JDouble>((op_byte - Opcode::DLoad0 as u8) as usize)
            }
            Opcode::ALoad0 | Opcode::ALoad1 | Opcode::ALoad2 | Opcode::ALoad3 => {
                self.load_local_ref((op_byte - Opcode::ALoad0 as u8) as usize)
            }

            Opcode::IALoad
            | Opcode::LALoad
            | Opcode::FALoad
            | Opcode::DALoad
            | Opcode::AALoad
            | Opcode::BALoad
            | Opcode::CALoad
            | Opcode::SALoad => self.array_load()?,

            Opcode::IStore | Opcode::FStore => {
                let index = self.code_u1(method, pc + 1)? as usize;
                self.store_local::<JInt>(index);
                next = pc + 2;
            }
            Opcode::LStore | Opcode::DStore => {
                let index = self.code_u1(method, pc + 1)? as usize;
                self.store_local::<JLong>(index);
                next = pc + 2;
            }
            Opcode::AStore => {
                let index = self.code_u1(method, pc + 1)? as usize;
                self.store_local_ref(index);
                next = pc + 2;
            }
            Opcode::IStore0 | Opcode::IStore1 | Opcode::IStore2 | Opcode::IStore3 => {
                self.store_local::<JInt>((op_byte - Opcode::IStore0 as u8) as usize)
            }
            Opcode::LStore0 | Opcode::LStore1 | Opcode::LStore2 | Opcode::LStore3 => {
                self.store_local::<JLong>((op_byte - Opcode::LStore0 as u8) as usize)
            }
            Opcode::FStore0 | Opcode::FStore1 | Opcode::FStore2 | Opcode::FStore3 => {
                self.store_local::<JFloat>((op_byte - Opcode::FStore0 as u8) as usize)
            }
            Opcode::DStore0 | Opcode::DStore1 | Opcode::DStore2 | Opcode::DStore3 => {
                self.store_local::<JDouble>((op_byte - Opcode::DStore0 as u8) as usize)
            }
            Opcode::AStore0 | Opcode::AStore1 | Opcode::AStore2 | Opcode::AStore3 => {
                self.store_local_ref((op_byte - Opcode::AStore0 as u8) as usize)
            }

            Opcode::IAStore => self.array_store(ValueKind::Int)?,
            Opcode::LAStore => self.array_store(ValueKind::Long)?,
            Opcode::FAStore => self.array_store(ValueKind::Float)?,
            Opcode::DAStore => self.array_store(ValueKind::Double)?,
            Opcode::AAStore => self.array_store(ValueKind::Reference)?,
            Opcode::BAStore => self.array_store(ValueKind::Byte)?,
            Opcode::CAStore => self.array_store(ValueKind::Char)?,
            Opcode::SAStore => self.array_store(ValueKind::Short)?,

            Opcode::Pop => self.exec.stack.discard(1),
            Opcode::Pop2 => self.exec.stack.discard(2),
            Opcode::Dup => self.exec.stack.dup(1, 0),
            Opcode::DupX1 => self.exec.stack.dup(1, 1),
            Opcode::DupX2 => self.exec.stack.dup(1, 2),
            Opcode::Dup2 => self.exec.stack.dup(2, 0),
            Opcode::Dup2X1 => self.exec.stack.dup(2, 1),
            Opcode::Dup2X2 => self.exec.stack.dup(2, 2),
            Opcode::Swap => self.exec.stack.swap(),

            Opcode::IAdd => num_arithmetic!(self, JInt, |a, b| a.wrapping_add(b)),
            Opcode::LAdd => num_arithmetic!(self, JLong, |a, b| a.wrapping_add(b)),
            Opcode::FAdd => num_arithmetic!(self, JFloat, |a, b| a + b),
            Opcode::DAdd => num_arithmetic!(self, JDouble, |a, b| a + b),
            Opcode::ISub => num_arithmetic!(self, JInt, |a, b| a.wrapping_sub(b)),
            Opcode::LSub => num_arithmetic!(self, JLong, |a, b| a.wrapping_sub(b)),
            Opcode::FSub => num_arithmetic!(self, JFloat, |a, b| a - b),
            Opcode::DSub => num_arithmetic!(self, JDouble, |a, b| a - b),
            Opcode::IMul => num_arithmetic!(self, JInt, |a, b| a.wrapping_mul(b)),
            Opcode::LMul => num_arithmetic!(self, JLong, |a, b| a.wrapping_mul(b)),
            Opcode::FMul => num_arithmetic!(self, JFloat, |a, b| a * b),
            Opcode::DMul => num_arithmetic!(self, JDouble, |a, b| a * b),
            Opcode::IDiv => num_divide!(self, JInt, wrapping_div),
            Opcode::LDiv => num_divide!(self, JLong, wrapping_div),
            Opcode::FDiv => num_arithmetic!(self, JFloat, |a, b| a / b),
            Opcode::DDiv => num_arithmetic!(self, JDouble, |a, b| a / b),
            Opcode::IRem => num_divide!(self, JInt, wrapping_rem),
            Opcode::LRem => num_divide!(self, JLong, wrapping_rem),
            Opcode::FRem => num_arithmetic!(self, JFloat, |a, b| a % b),
            Opcode::DRem => num_arithmetic!(self, JDouble, |a, b| a % b),
            Opcode::INeg => num_unary!(self, JInt => JInt, |a| a.wrapping_neg()),
            Opcode::LNeg => num_unary!(self, JLong => JLong, |a| a.wrapping_neg()),
            Opcode::FNeg => num_unary!(self, JFloat => JFloat, |a| -a),
            Opcode::DNeg => num_unary!(self, JDouble => JDouble, |a| -a),
            Opcode::IShl => num_shift!(self, JInt, 0x1f, |v, s| v.wrapping_shl(s)),
            Opcode::LShl => num_shift!(self, JLong, 0x3f, |v, s| v.wrapping_shl(s)),
            Opcode::IShr => num_shift!(self, JInt, 0x1f, |v, s| v >> s),
            Opcode::LShr => num_shift!(self, JLong, 0x3f, |v, s| v >> s),
            Opcode::IUShr => num_shift!(self, JInt, 0x1f, |v, s| ((v as u32) >> s) as JInt),
            Opcode::LUShr => num_shift!(self, JLong, 0x3f, |v, s| ((v as u64) >> s) as JLong),
            Opcode::IAnd => num_arithmetic!(self, JInt, |a, b| a & b),
            Opcode::LAnd => num_arithmetic!(self, JLong, |a, b| a & b),
            Opcode::IOr => num_arithmetic!(self, JInt, |a, b| a | b),
            Opcode::LOr => num_arithmetic!(self, JLong, |a, b| a | b),
            Opcode::IXor => num_arithmetic!(self, JInt, |a, b| a ^ b),
            Opcode::LXor => num_arithmetic!(self, JLong, |a, b| a ^ b),
            Opcode::IInc => {
                let index = self.code_u1(method, pc + 1)? as usize;
                let delta = self.code_u1(method, pc + 2)? as i8;
                let at = self.local(index);
                self.exec.stack.iinc(at, delta as JInt);
                next = pc + 3;
            }

            Opcode::I2L => num_unary!(self, JInt => JLong, |a| a as JLong),
            Opcode::I2F => num_unary!(self, JInt => JFloat, |a| a as JFloat),
            Opcode::I2D => num_unary!(self, JInt => JDouble, |a| a as JDouble),
            Opcode::L2I => num_unary!(self, JLong => JInt, |a| a as JInt),
            Opcode::L2F => num_unary!(self, JLong => JFloat, |a| a as JFloat),
            Opcode::L2D => num_unary!(self, JLong => JDouble, |a| a as JDouble),
            Opcode::F2I => num_unary!(self, JFloat => JInt, |a| a as JInt),
            Opcode::F2L => num_unary!(self, JFloat => JLong, |a| a as JLong),
            Opcode::F2D => num_unary!(self, JFloat => JDouble, |a| a as JDouble),
            Opcode::D2I => num_unary!(self, JDouble => JInt, |a| a as JInt),
            Opcode::D2L => num_unary!(self, JDouble => JLong, |a| a as JLong),
            Opcode::D2F => num_unary!(self, JDouble => JFloat, |a| a as JFloat),
            Opcode::I2B => num_unary!(self, JInt => JInt, |a| a as i8 as JInt),
            Opcode::I2C => num_unary!(self, JInt => JInt, |a| a as u16 as JInt),
            Opcode::I2S => num_unary!(self, JInt => JInt, |a| a as i16 as JInt),

            Opcode::LCmp => {
                let b = self.exec.stack.pop::<JLong>();
                let a = self.exec.stack.pop::<JLong>();
                self.exec.stack.push::<JInt>(a.cmp(&b) as JInt);
            }
            Opcode::FCmpL => num_compare!(self, JFloat, -1),
            Opcode::FCmpG => num_compare!(self, JFloat, 1),
            Opcode::DCmpL => num_compare!(self, JDouble, -1),
            Opcode::DCmpG => num_compare!(self, JDouble, 1),

            Opcode::IfEq => num_if!(self, next, method, pc, |v| v == 0),
            Opcode::IfNe => num_if!(self, next, method, pc, |v| v != 0),
            Opcode::IfLt => num_if!(self, next, method, pc, |v| v < 0),
            Opcode::IfGe => num_if!(self, next, method, pc, |v| v >= 0),
            Opcode::IfGt => num_if!(self, next, method, pc, |v| v > 0),
            Opcode::IfLe => num_if!(self, next, method, pc, |v| v <= 0),
            Opcode::IfICmpEq => num_if_cmp!(self, next, method, pc, ==),
            Opcode::IfICmpNe => num_if_cmp!(self, next, method, pc, !=),
            Opcode::IfICmpLt => num_if_cmp!(self, next, method, pc, <),
            Opcode::IfICmpGe => num_if_cmp!(self, next, method, pc, >=),
            Opcode::IfICmpGt => num_if_cmp!(self, next, method, pc, >),
            Opcode::IfICmpLe => num_if_cmp!(self, next, method, pc, <=),
            Opcode::IfACmpEq | Opcode::IfACmpNe => {
                let b = self.exec.stack.pop_ref();
                let a = self.exec.stack.pop_ref();
                let taken = (a == b) == (opcode == Opcode::IfACmpEq);
                next = if taken {
                    branch_target(pc, self.code_i2(method, pc + 1)? as i32)
                } else {
                    pc + 3
                };
            }
            Opcode::IfNull | Opcode::IfNonNull => {
                let obj = self.exec.stack.pop_ref();
                let taken = obj.is_none() == (opcode == Opcode::IfNull);
                next = if taken {
                    branch_target(pc, self.code_i2(method, pc + 1)? as i32)
                } else {
                    pc + 3
                };
            }
            Opcode::Goto => next = branch_target(pc, self.code_i2(method, pc + 1)? as i32),
            Opcode::GotoW => next = branch_target(pc, self.code_i4(method, pc + 1)?),
            Opcode::Jsr => {
                self.exec.stack.push::<JInt>((pc + 3) as JInt);
                next = branch_target(pc, self.code_i2(method, pc + 1)? as i32);
            }
            Opcode::JsrW => {
                self.exec.stack.push::<JInt>((pc + 5) as JInt);
                next = branch_target(pc, self.code_i4(method, pc + 1)?);
            }
            Opcode::Ret => {
                let index = self.code_u1(method, pc + 1)? as usize;
                next = self.exec.stack.load::<JInt>(self.local(index)) as u32;
            }
            Opcode::TableSwitch => {
                let table = (pc + 4) & !3;
                let key = self.exec.stack.pop::<JInt>();
                let default = self.code_i4(method, table)?;
                let low = self.code_i4(method, table + 4)?;
                let high = self.code_i4(method, table + 8)?;
                let offset = if key < low || key > high {
                    default
                } else {
                    let entry = (key as i64 - low as i64) as u32;
                    self.code_i4(method, table + 12 + entry * 4)?
                };
                next = branch_target(pc, offset);
            }
            Opcode::LookupSwitch => {
                let table = (pc + 4) & !3;
                let key = self.exec.stack.pop::<JInt>();
                let default = self.code_i4(method, table)?;
                let pairs = self.code_i4(method, table + 4)?.max(0) as u32;
                let mut offset = default;
                for i in 0..pairs {
                    let at = table + 8 + i * 8;
                    if self.code_i4(method, at)? == key {
                        offset = self.code_i4(method, at + 4)?;
                        break;
                    }
                }
                next = branch_target(pc, offset);
            }

            Opcode::IReturn => {
                let v = self.exec.stack.pop::<JInt>();
                return self.return_from_frame(JValue::Int(v));
            }
            Opcode::LReturn => {
                let v = self.exec.stack.pop::<JLong>();
                return self.return_from_frame(JValue::Long(v));
            }
            Opcode::FReturn => {
                let v = self.exec.stack.pop::<JFloat>();
                return self.return_from_frame(JValue::Float(v));
            }
            Opcode::DReturn => {
                let v = self.exec.stack.pop::<JDouble>();
                return self.return_from_frame(JValue::Double(v));
            }
            Opcode::AReturn => {
                let v = self.exec.stack.pop_ref();
                return self.return_from_frame(JValue::Object(v));
            }
            Opcode::Return => return self.return_from_frame(JValue::Void),

            Opcode::GetStatic | Opcode::PutStatic => {
                let index = self.code_u2(method, pc + 1)?;
                let field = self.resolve_field(class, index)?;
                if !field.is_static {
                    let message = format!("Expected static field {}", self.field_label(field));
                    return Err(self.throw_new(ExceptionKind::IncompatibleClassChangeError, Some(message)));
                }
                if self.ensure_class_initialized(field.class, pc)? {
                    return Ok(Step::Next);
                }
                let slot = field.slot as usize;
                if opcode == Opcode::GetStatic {
                    let value = self
                        .registry
                        .class(field.class)
                        .statics
                        .as_ref()
                        .map(|statics| read_slot_value(statics, slot, field.kind))
                        .ok_or_else(|| VMError::InvalidState("class has no statics".into()))?;
                    self.exec.stack.push_value(value);
                } else {
                    let value = self.pop_value(field.kind);
                    let statics = self
                        .registry
                        .class_mut(field.class)
                        .statics
                        .as_mut()
                        .ok_or_else(|| VMError::InvalidState("class has no statics".into()))?;
                    write_slot_value(statics, slot, value);
                }
                next = pc + 3;
            }
            Opcode::GetField => {
                let index = self.code_u2(method, pc + 1)?;
                let field = self.resolve_field(class, index)?;
                self.expect_instance_field(field)?;
                let obj = self.exec.stack.pop_ref();
                let Some(obj) = obj else {
                    let message = format!(
                        "Cannot read field \"{}\" because value is null",
                        self.field_name(field)
                    );
                    return Err(self.null_pointer(message));
                };
                let value = self
                    .heap
                    .get(obj)
                    .and_then(Object::fields)
                    .map(|fields| read_slot_value(fields, field.slot as usize, field.kind))
                    .ok_or_else(|| VMError::InvalidState(format!("getfield on non-instance {:?}", obj)))?;
                self.exec.stack.push_value(value);
                next = pc + 3;
            }
            Opcode::PutField => {
                let index = self.code_u2(method, pc + 1)?;
                let field = self.resolve_field(class, index)?;
                self.expect_instance_field(field)?;
                let value = self.pop_value(field.kind);
                let Some(obj) = self.exec.stack.pop_ref() else {
                    let message = format!(
                        "Cannot assign field \"{}\" because value is null",
                        self.field_name(field)
                    );
                    return Err(self.null_pointer(message));
                };
                let fields = self
                    .heap
                    .get_mut(obj)
                    .and_then(Object::fields_mut)
                    .ok_or_else(|| VMError::InvalidState(format!("putfield on non-instance {:?}", obj)))?;
                write_slot_value(fields, field.slot as usize, value);
                next = pc + 3;
            }

            Opcode::InvokeVirtual | Opcode::InvokeSpecial | Opcode::InvokeInterface => {
                let index = self.code_u2(method, pc + 1)?;
                let return_pc = pc + if opcode == Opcode::InvokeInterface { 5 } else { 3 };
                let resolved = self.resolve_method(class, index)?;
                if resolved.is_static {
                    let message = format!("Expecting non-static method {}", self.method_label(resolved.method));
                    return Err(self.throw_new(ExceptionKind::IncompatibleClassChangeError, Some(message)));
                }
                let receiver_depth = (resolved.arg_slots as usize).saturating_sub(1);
                let Some(receiver) = self.exec.stack.peek_ref(receiver_depth) else {
                    let target = self.registry.method(resolved.method);
                    let message = format!(
                        "Cannot invoke \"{}.{}()\" because value is null",
                        self.registry.class(resolved.method.class).java_name(),
                        target.name
                    );
                    return Err(self.null_pointer(message));
                };
                let target = if opcode == Opcode::InvokeSpecial {
                    resolved.method
                } else {
                    let receiver_class = self
                        .heap
                        .get(receiver)
                        .map(Object::class)
                        .ok_or_else(|| VMError::InvalidState(format!("receiver {:?} is not live", receiver)))?;
                    match self.registry.resolve_virtual(receiver_class, resolved.method) {
                        Some(target) => target,
                        None => {
                            let message = self.method_label(resolved.method);
                            return Err(self.throw_new(ExceptionKind::AbstractMethodError, Some(message)));
                        }
                    }
                };
                return self.invoke(target, pc, return_pc);
            }
            Opcode::InvokeStatic => {
                let index = self.code_u2(method, pc + 1)?;
                let resolved = self.resolve_method(class, index)?;
                if !resolved.is_static {
                    let message = format!("Expected static method {}", self.method_label(resolved.method));
                    return Err(self.throw_new(ExceptionKind::IncompatibleClassChangeError, Some(message)));
                }
                if self.ensure_class_initialized(resolved.method.class, pc)? {
                    return Ok(Step::Next);
                }
                return self.invoke(resolved.method, pc, pc + 3);
            }
            Opcode::InvokeDynamic => {
                let message = "Invokedynamic instructions are not supported".to_string();
                return Err(self.throw_new(ExceptionKind::IncompatibleClassChangeError, Some(message)));
            }

            Opcode::New => {
                let index = self.code_u2(method, pc + 1)?;
                let target = self.resolve_class(class, index)?;
                let target_class = self.registry.class(target);
                if target_class.is_interface() || target_class.is_abstract() {
                    let message = target_class.java_name();
                    return Err(self.throw_new(ExceptionKind::InstantiationError, Some(message)));
                }
                if self.ensure_class_initialized(target, pc)? {
                    return Ok(Step::Next);
                }
                let obj = self.new_instance(target)?;
                self.exec.stack.push_ref(Some(obj));
                next = pc + 3;
            }
            Opcode::NewArray => {
                let atype = self.code_u1(method, pc + 1)?;
                let array_type = ArrayType::from_u8(atype)
                    .ok_or_else(|| VMError::InvalidState(format!("bad newarray type {}", atype)))?;
                let count = self.exec.stack.pop::<JInt>();
                let array_class = self.load_class(&array_type.class_name())?;
                let array = self.new_array(array_class, count)?;
                self.exec.stack.push_ref(Some(array));
                next = pc + 2;
            }
            Opcode::ANewArray => {
                let index = self.code_u2(method, pc + 1)?;
                let component = self.resolve_class(class, index)?;
                let count = self.exec.stack.pop::<JInt>();
                let array_class = self.array_class_of(component)?;
                let array = self.new_array(array_class, count)?;
                self.exec.stack.push_ref(Some(array));
                next = pc + 3;
            }
            Opcode::MultiANewArray => {
                let index = self.code_u2(method, pc + 1)?;
                let dimensions = self.code_u1(method, pc + 3)? as usize;
                if dimensions == 0 {
                    let label = self.method_label(method);
                    return Err(VMError::InvalidState(format!(
                        "multianewarray with zero dimensions in {} at pc {}",
                        label, pc
                    ))
                    .into());
                }
                let array_class = self.resolve_class(class, index)?;
                let mut counts = vec![0; dimensions];
                for count in counts.iter_mut().rev() {
                    *count = self.exec.stack.pop::<JInt>();
                }
                if let Some(negative) = counts.iter().find(|c| **c < 0) {
                    let message = negative.to_string();
                    return Err(self.throw_new(ExceptionKind::NegativeArraySizeException, Some(message)));
                }
                let array = self.new_multi_array(array_class, &counts)?;
                self.exec.stack.push_ref(Some(array));
                next = pc + 4;
            }
            Opcode::ArrayLength => {
                let Some(array) = self.exec.stack.pop_ref() else {
                    return Err(self.null_pointer("Cannot read the array length because value is null".into()));
                };
                let len = self
                    .heap
                    .get(array)
                    .and_then(Object::array)
                    .map(ArrayData::len)
                    .ok_or_else(|| VMError::InvalidState(format!("arraylength on non-array {:?}", array)))?;
                self.exec.stack.push::<JInt>(len as JInt);
            }
            Opcode::AThrow => {
                return Err(match self.exec.stack.pop_ref() {
                    Some(exception) => Throw::Exception(exception),
                    None => self.null_pointer("Cannot throw exception because value is null".into()),
                });
            }
            Opcode::CheckCast => {
                let index = self.code_u2(method, pc + 1)?;
                let target = self.resolve_class(class, index)?;
                if let Some(obj) = self.exec.stack.peek_ref(0) {
                    let from = self.class_of(obj)?;
                    if !self.registry.is_assignable(from, target) {
                        let message = format!(
                            "class {} cannot be cast to class {}",
                            self.registry.class(from).java_name(),
                            self.registry.class(target).java_name()
                        );
                        return Err(self.throw_new(ExceptionKind::ClassCastException, Some(message)));
                    }
                }
                next = pc + 3;
            }
            Opcode::InstanceOf => {
                let index = self.code_u2(method, pc + 1)?;
                let target = self.resolve_class(class, index)?;
                let result = match self.exec.stack.pop_ref() {
                    Some(obj) => {
                        let from = self.class_of(obj)?;
                        self.registry.is_assignable(from, target) as JInt
                    }
                    None => 0,
                };
                self.exec.stack.push::<JInt>(result);
                next = pc + 3;
            }
            Opcode::MonitorEnter => {
                let Some(obj) = self.exec.stack.peek_ref(0) else {
                    self.exec.stack.discard(1);
                    return Err(self.null_pointer("Cannot enter synchronized block because value is null".into()));
                };
                if !self.monitor_enter(MonitorTarget::Object(obj)) {
                    return Ok(Step::Blocked);
                }
                self.exec.stack.discard(1);
            }
            Opcode::MonitorExit => {
                let Some(obj) = self.exec.stack.pop_ref() else {
                    return Err(self.null_pointer("Cannot exit synchronized block because value is null".into()));
                };
                if !self.monitor_exit(MonitorTarget::Object(obj)) {
                    return Err(self.throw_new(ExceptionKind::IllegalMonitorStateException, None));
                }
            }
            Opcode::Wide => next = self.wide(method, pc)?,

            Opcode::Breakpoint | Opcode::ImpDep1 | Opcode::ImpDep2 => {
                return Err(VMError::UnknownOpcode {
                    opcode: op_byte,
                    method: self.method_label(method),
                    pc,
                }
                .into())
            }
        }
        self.exec.pc = next;
        Ok(Step::Next)
    }

    /// `wide` prefix: 16-bit local index, and a 16-bit increment for `iinc`.
    fn wide(&mut self, method: MethodId, pc: u32) -> ThrowResult<u32> {
        let op_byte = self.code_u1(method, pc + 1)?;
        let index = self.code_u2(method, pc + 2)? as usize;
        let opcode = Opcode::from_u8(op_byte).ok_or_else(|| VMError::UnknownOpcode {
            opcode: op_byte,
            method: self.method_label(method),
            pc: pc + 1,
        })?;
        match opcode {
            Opcode::ILoad | Opcode::FLoad => self.load_local::<JInt>(index),
            Opcode::LLoad | Opcode::DLoad => self.load_local::<JLong>(index),
            Opcode::ALoad => self.load_local_ref(index),
            Opcode::IStore | Opcode::FStore => self.store_local::<JInt>(index),
            Opcode::LStore | Opcode::DStore => self.store_local::<JLong>(index),
            Opcode::AStore => self.store_local_ref(index),
            Opcode::Ret => return Ok(self.exec.stack.load::<JInt>(self.local(index)) as u32),
            Opcode::IInc => {
                let delta = self.code_i2(method, pc + 4)?;
                let at = self.local(index);
                self.exec.stack.iinc(at, delta as JInt);
                return Ok(pc + 6);
            }
            other => {
                return Err(VMError::InvalidState(format!(
                    "wide cannot modify {}",
                    other.mnemonic()
                ))
                .into())
            }
        }
        Ok(pc + 4)
    }

    fn ldc(&mut self, class: ClassId, index: u16) -> ThrowResult<()> {
        let entry = self.registry.class(class).constant_pool.get(index)?.clone();
        match entry {
            ConstPoolEntry::Integer(v) => self.exec.stack.push::<JInt>(v),
            ConstPoolEntry::Float(v) => self.exec.stack.push::<JFloat>(v),
            ConstPoolEntry::Long(v) => self.exec.stack.push::<JLong>(v),
            ConstPoolEntry::Double(v) => self.exec.stack.push::<JDouble>(v),
            ConstPoolEntry::String { .. } | ConstPoolEntry::ResolvedString(_) => {
                let obj = self.resolve_string(class, index)?;
                self.exec.stack.push_ref(Some(obj));
            }
            ConstPoolEntry::Class { .. } | ConstPoolEntry::ResolvedClass(_) => {
                let target = self.resolve_class(class, index)?;
                let mirror = self.class_mirror(target)?;
                self.exec.stack.push_ref(Some(mirror));
            }
            other => {
                return Err(VMError::Unsupported(format!("ldc of {:?}", other.tag())).into());
            }
        }
        Ok(())
    }

    /// Pops `arrayref, index` after the null and bounds checks pass.
    fn array_operands(&mut self, action: &str) -> ThrowResult<(ObjRef, usize)> {
        let index = self.exec.stack.pop::<JInt>();
        let Some(array) = self.exec.stack.pop_ref() else {
            let message = format!("Cannot {} array because value is null", action);
            return Err(self.null_pointer(message));
        };
        let len = self
            .heap
            .get(array)
            .and_then(Object::array)
            .map(ArrayData::len)
            .ok_or_else(|| VMError::InvalidState(format!("{:?} is not an array", array)))?;
        if index < 0 || index as usize >= len {
            return Err(self.index_out_of_bounds(index, len));
        }
        Ok((array, index as usize))
    }

    fn array_load(&mut self) -> ThrowResult<()> {
        let (array, index) = self.array_operands("load from")?;
        let value = self
            .heap
            .get(array)
            .and_then(Object::array)
            .and_then(|data| data.get(index))
            .ok_or_else(|| VMError::InvalidState(format!("{:?} is not an array", array)))?;
        self.exec.stack.push_value(value);
        Ok(())
    }

    fn array_store(&mut self, kind: ValueKind) -> ThrowResult<()> {
        let value = match kind {
            ValueKind::Reference => JValue::Object(self.exec.stack.pop_ref()),
            ValueKind::Long => JValue::Long(self.exec.stack.pop()),
            ValueKind::Float => JValue::Float(self.exec.stack.pop()),
            ValueKind::Double => JValue::Double(self.exec.stack.pop()),
            _ => JValue::Int(self.exec.stack.pop()),
        };
        let (array, index) = self.array_operands("store to")?;
        let array_class = self.class_of(array)?;
        let element = self.registry.class(array_class).array.map(|info| info.element);

        if let JValue::Object(Some(obj)) = value {
            let component = self.registry.class(array_class).array.and_then(|info| info.component);
            let from = self.class_of(obj)?;
            if let Some(component) = component {
                if !self.registry.is_assignable(from, component) {
                    let message = self.registry.class(from).java_name();
                    return Err(self.throw_new(ExceptionKind::ArrayStoreException, Some(message)));
                }
            }
        }

        let data = self
            .heap
            .get_mut(array)
            .and_then(Object::array_mut)
            .ok_or_else(|| VMError::InvalidState(format!("{:?} is not an array", array)))?;
        let stored = match (data, value) {
            (ArrayData::Byte(elements), JValue::Int(v)) => {
                let v = narrow(element.unwrap_or(ValueKind::Byte), v);
                elements[index] = v as JByte;
                true
            }
            (ArrayData::Char(elements), JValue::Int(v)) => {
                elements[index] = v as JChar;
                true
            }
            (ArrayData::Short(elements), JValue::Int(v)) => {
                elements[index] = v as JShort;
                true
            }
            (ArrayData::Int(elements), JValue::Int(v)) => {
                elements[index] = v;
                true
            }
            (ArrayData::Long(elements), JValue::Long(v)) => {
                elements[index] = v;
                true
            }
            (ArrayData::Float(elements), JValue::Float(v)) => {
                elements[index] = v;
                true
            }
            (ArrayData::Double(elements), JValue::Double(v)) => {
                elements[index] = v;
                true
            }
            (ArrayData::Ref(elements), JValue::Object(v)) => {
                elements[index] = v;
                true
            }
            _ => false,
        };
        if !stored {
            return Err(VMError::InvalidState(format!(
                "{:?} store into an incompatible array {:?}",
                kind, array
            ))
            .into());
        }
        Ok(())
    }

    /// Builds a `counts.len()`-dimensional array. Depth is bounded by the
    /// 255 dimensions a class file can name.
    fn new_multi_array(&mut self, array_class: ClassId, counts: &[JInt]) -> ThrowResult<ObjRef> {
        let Some((&count, inner)) = counts.split_first() else {
            return Err(VMError::InvalidState("multianewarray without dimensions".into()).into());
        };
        let array = self.new_array(array_class, count)?;
        if !inner.is_empty() {
            let component = self
                .registry
                .class(array_class)
                .array
                .and_then(|info| info.component)
                .ok_or_else(|| VMError::InvalidState("multianewarray with too many dimensions".into()))?;
            for i in 0..count as usize {
                let sub = self.new_multi_array(component, inner)?;
                if let Some(ArrayData::Ref(elements)) = self.heap.get_mut(array).and_then(Object::array_mut) {
                    elements[i] = Some(sub);
                }
            }
        }
        Ok(array)
    }

    pub(crate) fn class_of(&self, obj: ObjRef) -> ThrowResult<ClassId> {
        self.heap
            .get(obj)
            .map(Object::class)
            .ok_or_else(|| VMError::InvalidState(format!("{:?} is not live", obj)).into())
    }

    fn expect_instance_field(&mut self, field: ResolvedField) -> ThrowResult<()> {
        if field.is_static {
            let message = format!("Expected non-static field {}", self.field_label(field));
            return Err(self.throw_new(ExceptionKind::IncompatibleClassChangeError, Some(message)));
        }
        Ok(())
    }

    fn field_name(&self, field: ResolvedField) -> String {
        self.registry
            .class(field.class)
            .fields
            .iter()
            .find(|f| f.slot == field.slot && f.is_static() == field.is_static)
            .map_or_else(|| format!("#{}", field.slot), |f| f.name.to_string())
    }

    fn field_label(&self, field: ResolvedField) -> String {
        format!(
            "{}.{}",
            self.registry.class(field.class).java_name(),
            self.field_name(field)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classfile::writer::ClassWriter;
    use crate::test::TestVm;

    fn run_int(build: impl FnOnce(&mut crate::classfile::writer::CodeWriter)) -> Result<JValue, VMError> {
        let mut vm = TestVm::bootstrap();
        vm.load_test_class("demo/Snippet", |w: &mut ClassWriter| {
            w.method(0x0009, "run", "()I", build);
        });
        vm.invoke_static("demo/Snippet", "run", "()I", &[])
    }

    fn uncaught_class(result: Result<JValue, VMError>) -> (String, Option<String>) {
        match result {
            Err(VMError::UncaughtException { class_name, message, .. }) => (class_name, message),
            other => panic!("expected an exception, got {:?}", other),
        }
    }

    #[test]
    fn comparisons_treat_nan_by_variant() {
        assert_eq!(op_val_cmp(f32::NAN, 1.0, -1), -1);
        assert_eq!(op_val_cmp(f32::NAN, 1.0, 1), 1);
        assert_eq!(op_val_cmp(f64::NAN, f64::NAN, -1), -1);
        assert_eq!(op_val_cmp(2.0f64, 1.0, -1), 1);
        assert_eq!(op_val_cmp(1.0f32, 1.0, 1), 0);

        let fcmpg = run_int(|code| {
            code.fconst(f32::NAN).fconst(1.0).op(Opcode::FCmpG).op(Opcode::IReturn);
        });
        assert_eq!(fcmpg.unwrap(), JValue::Int(1));
        let dcmpl = run_int(|code| {
            code.dconst(f64::NAN).dconst(1.0).op(Opcode::DCmpL).op(Opcode::IReturn);
        });
        assert_eq!(dcmpl.unwrap(), JValue::Int(-1));
    }

    #[test]
    fn shifts_mask_their_distance() {
        let shl = run_int(|code| {
            code.iconst(1).iconst(33).op(Opcode::IShl).op(Opcode::IReturn);
        });
        assert_eq!(shl.unwrap(), JValue::Int(2));
        let ushr = run_int(|code| {
            code.iconst(-1).iconst(60).op(Opcode::IUShr).op(Opcode::IReturn);
        });
        assert_eq!(ushr.unwrap(), JValue::Int(0xf));
        let lshr = run_int(|code| {
            code.lconst(-256).iconst(68).op(Opcode::LShr).op(Opcode::L2I).op(Opcode::IReturn);
        });
        assert_eq!(lshr.unwrap(), JValue::Int(-16));
    }

    #[test]
    fn integer_division_edges() {
        let overflow = run_int(|code| {
            code.iconst(i32::MIN).iconst(-1).op(Opcode::IDiv).op(Opcode::IReturn);
        });
        assert_eq!(overflow.unwrap(), JValue::Int(i32::MIN));
        let rem = run_int(|code| {
            code.iconst(-7).iconst(2).op(Opcode::IRem).op(Opcode::IReturn);
        });
        assert_eq!(rem.unwrap(), JValue::Int(-1));
        let (class, message) = uncaught_class(run_int(|code| {
            code.lconst(5).lconst(0).op(Opcode::LRem).op(Opcode::L2I).op(Opcode::IReturn);
        }));
        assert_eq!(class, "java.lang.ArithmeticException");
        assert_eq!(message.as_deref(), Some("/ by zero"));
    }

    #[test]
    fn conversions_saturate_and_narrow() {
        let f2i = run_int(|code| {
            code.fconst(f32::NAN).op(Opcode::F2I).op(Opcode::IReturn);
        });
        assert_eq!(f2i.unwrap(), JValue::Int(0));
        let d2i = run_int(|code| {
            code.dconst(1e20).op(Opcode::D2I).op(Opcode::IReturn);
        });
        assert_eq!(d2i.unwrap(), JValue::Int(i32::MAX));
        let i2b = run_int(|code| {
            code.iconst(200).op(Opcode::I2B).op(Opcode::IReturn);
        });
        assert_eq!(i2b.unwrap(), JValue::Int(-56));
        let i2c = run_int(|code| {
            code.iconst(-1).op(Opcode::I2C).op(Opcode::IReturn);
        });
        assert_eq!(i2c.unwrap(), JValue::Int(0xffff));
    }

    #[test]
    fn switches_pick_targets() {
        let pick = |key: i32| {
            run_int(move |code| {
                let one = code.new_label();
                let two = code.new_label();
                let far = code.new_label();
                let other = code.new_label();
                code.iconst(key).tableswitch(1, other, &[one, two]);
                code.bind(one).iconst(10).op(Opcode::IReturn);
                code.bind(two).iconst(20).op(Opcode::IReturn);
                code.bind(other).iconst(key).lookupswitch(far, &[(-5, one), (1000, two)]);
                code.bind(far).iconst(-1).op(Opcode::IReturn);
            })
            .unwrap()
        };
        assert_eq!(pick(1), JValue::Int(10));
        assert_eq!(pick(2), JValue::Int(20));
        assert_eq!(pick(-5), JValue::Int(10));
        assert_eq!(pick(1000), JValue::Int(20));
        assert_eq!(pick(3), JValue::Int(-1));
    }

    #[test]
    fn array_checks() {
        let (class, message) = uncaught_class(run_int(|code| {
            code.iconst(3)
                .newarray(ArrayType::Int)
                .iconst(5)
                .iconst(1)
                .op(Opcode::IAStore)
                .iconst(0)
                .op(Opcode::IReturn);
        }));
        assert_eq!(class, "java.lang.ArrayIndexOutOfBoundsException");
        assert_eq!(message.as_deref(), Some("Index 5 out of bounds for length 3"));

        let (class, message) = uncaught_class(run_int(|code| {
            code.iconst(-2).newarray(ArrayType::Byte).op(Opcode::ArrayLength).op(Opcode::IReturn);
        }));
        assert_eq!(class, "java.lang.NegativeArraySizeException");
        assert_eq!(message.as_deref(), Some("-2"));

        let (class, _) = uncaught_class(run_int(|code| {
            code.op(Opcode::AConstNull).iconst(0).op(Opcode::IALoad).op(Opcode::IReturn);
        }));
        assert_eq!(class, "java.lang.NullPointerException");

        let (class, _) = uncaught_class(run_int(|code| {
            code.iconst(1)
                .anewarray("java/lang/String")
                .iconst(0)
                .iconst(1)
                .newarray(ArrayType::Int)
                .op(Opcode::AAStore)
                .iconst(0)
                .op(Opcode::IReturn);
        }));
        assert_eq!(class, "java.lang.ArrayStoreException");
    }

    #[test]
    fn sub_int_arrays_narrow_and_widen() {
        let chars = run_int(|code| {
            code.iconst(1)
                .newarray(ArrayType::Char)
                .op(Opcode::Dup)
                .iconst(0)
                .iconst(-1)
                .op(Opcode::CAStore)
                .iconst(0)
                .op(Opcode::CALoad)
                .op(Opcode::IReturn);
        });
        assert_eq!(chars.unwrap(), JValue::Int(0xffff));
        let booleans = run_int(|code| {
            code.iconst(1)
                .newarray(ArrayType::Boolean)
                .op(Opcode::Dup)
                .iconst(0)
                .iconst(3)
                .op(Opcode::BAStore)
                .iconst(0)
                .op(Opcode::BALoad)
                .op(Opcode::IReturn);
        });
        assert_eq!(booleans.unwrap(), JValue::Int(1));
    }

    #[test]
    fn multi_arrays_have_every_dimension() {
        let len = run_int(|code| {
            code.iconst(2)
                .iconst(3)
                .multianewarray("[[J", 2)
                .iconst(1)
                .op(Opcode::AALoad)
                .op(Opcode::ArrayLength)
                .op(Opcode::IReturn);
        });
        assert_eq!(len.unwrap(), JValue::Int(3));
    }

    #[test]
    fn multi_array_without_dimensions_is_fatal() {
        let result = run_int(|code| {
            code.multianewarray("[[I", 0).op(Opcode::ArrayLength).op(Opcode::IReturn);
        });
        assert!(matches!(result, Err(VMError::InvalidState(_))));
    }

    #[test]
    fn invokedynamic_raises_a_catchable_error() {
        let (class, message) = uncaught_class(run_int(|code| {
            code.op(Opcode::InvokeDynamic).u2(0).u2(0).op(Opcode::IReturn);
        }));
        assert_eq!(class, "java.lang.IncompatibleClassChangeError");
        assert_eq!(message.as_deref(), Some("Invokedynamic instructions are not supported"));

        let caught = run_int(|code| {
            let start = code.new_label();
            let end = code.new_label();
            let handler = code.new_label();
            code.bind(start)
                .op(Opcode::InvokeDynamic)
                .u2(0)
                .u2(0)
                .op(Opcode::IReturn)
                .bind(end)
                .bind(handler)
                .op(Opcode::Pop)
                .iconst(3)
                .op(Opcode::IReturn);
            code.try_catch(start, end, handler, Some("java/lang/LinkageError"));
        });
        assert_eq!(caught.unwrap(), JValue::Int(3));
    }

    #[test]
    fn wide_locals_and_iinc() {
        let result = run_int(|code| {
            code.iconst(7).istore(300).iinc(300, 1000).iload(300).op(Opcode::IReturn);
        });
        assert_eq!(result.unwrap(), JValue::Int(1007));
    }

    #[test]
    fn checkcast_and_instanceof() {
        let is_string = run_int(|code| {
            code.ldc_string("x").instanceof("java/lang/Object").op(Opcode::IReturn);
        });
        assert_eq!(is_string.unwrap(), JValue::Int(1));
        let null_check = run_int(|code| {
            code.op(Opcode::AConstNull)
                .checkcast("java/lang/String")
                .instanceof("java/lang/String")
                .op(Opcode::IReturn);
        });
        assert_eq!(null_check.unwrap(), JValue::Int(0));
        let (class, message) = uncaught_class(run_int(|code| {
            code.ldc_string("x")
                .checkcast("java/lang/Class")
                .op(Opcode::Pop)
                .iconst(0)
                .op(Opcode::IReturn);
        }));
        assert_eq!(class, "java.lang.ClassCastException");
        assert_eq!(
            message.as_deref(),
            Some("class java.lang.String cannot be cast to class java.lang.Class")
        );
    }

    #[test]
    fn unknown_opcode_is_fatal() {
        let result = run_int(|code| {
            code.u1(0xcb).iconst(0).op(Opcode::IReturn);
        });
        assert!(matches!(result, Err(VMError::UnknownOpcode { opcode: 0xcb, pc: 0, .. })));
    }
}
