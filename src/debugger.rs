//! Breakpoints, stepping and inspection of suspended executions.
//!
//! A [`Debugger`] is shared between the thread driving the VM and a
//! controlling thread. Executions stop at instruction boundaries; while one
//! is stopped its frames can be inspected through the VM.

use std::collections::hash_map::Entry;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::object::prelude::*;
use crate::runtime::frame::FrameInfo;
use crate::runtime::linker::read_slot_value;
use crate::runtime::opcode::Opcode;
use crate::runtime::ThrowResult;
use crate::thread::{ExecId, Execution};
use crate::value::JValue;
use crate::vm::{VMError, VM};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepMode {
    /// Stop at the next line, entering calls.
    Into,
    /// Stop at the next line of the same or an outer frame.
    Over,
    /// Stop once the current frame has returned.
    Out,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StopReason {
    Requested,
    Breakpoint,
    Step,
    Exception {
        class_name: String,
        message: Option<String>,
    },
}

/// Where and why an execution stopped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StopEvent {
    pub exec: ExecId,
    pub reason: StopReason,
    pub method: MethodId,
    /// `class.name(descriptor)` of the stopped method.
    pub location: String,
    pub line: Option<u32>,
    pub pc: u32,
    /// Frames on the stopped execution, the current one included.
    pub depth: usize,
}

#[derive(Clone, Copy, Debug)]
struct StepRequest {
    mode: StepMode,
    exec: ExecId,
    depth: usize,
    method: MethodId,
    line: Option<u32>,
    pc: u32,
}

impl StepRequest {
    fn same_line(&self, method: MethodId, line: Option<u32>, pc: u32) -> bool {
        method == self.method
            && match (line, self.line) {
                (Some(line), Some(from)) => line == from,
                _ => pc == self.pc,
            }
    }

    fn reached(&self, method: MethodId, line: Option<u32>, pc: u32, depth: usize) -> bool {
        match self.mode {
            StepMode::Into => depth != self.depth || !self.same_line(method, line, pc),
            StepMode::Over => {
                depth < self.depth || (depth == self.depth && !self.same_line(method, line, pc))
            }
            StepMode::Out => depth < self.depth,
        }
    }
}

#[derive(Default)]
struct DebugState {
    stopped: Option<StopEvent>,
    stop_requested: bool,
    step: Option<StepRequest>,
    exception_break: bool,
}

pub struct Debugger {
    state: Mutex<DebugState>,
    stopped_cv: Condvar,
    resumed_cv: Condvar,
    /// Set while a stop request or a step is outstanding, so the
    /// interpreter checks in on every instruction.
    armed: AtomicBool,
}

impl Debugger {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(DebugState::default()),
            stopped_cv: Condvar::new(),
            resumed_cv: Condvar::new(),
            armed: AtomicBool::new(false),
        })
    }

    fn rearm(&self, state: &DebugState) {
        self.armed
            .store(state.stop_requested || state.step.is_some(), Ordering::SeqCst);
    }

    /// Stops whichever execution runs the next instruction.
    pub fn request_stop(&self) {
        let mut state = self.state.lock();
        state.stop_requested = true;
        self.rearm(&state);
    }

    /// Stop when an exception is thrown, before any handler runs.
    pub fn set_exception_break(&self, enabled: bool) {
        self.state.lock().exception_break = enabled;
    }

    pub(crate) fn exception_break(&self) -> bool {
        self.state.lock().exception_break
    }

    /// Lets the stopped execution continue. Returns `false` when nothing
    /// was stopped.
    pub fn resume(&self) -> bool {
        let mut state = self.state.lock();
        let resumed = state.stopped.take().is_some();
        state.step = None;
        self.rearm(&state);
        self.resumed_cv.notify_all();
        resumed
    }

    /// Resumes the stopped execution until it reaches the next stop the
    /// mode describes.
    pub fn step(&self, mode: StepMode) -> Result<(), VMError> {
        let mut state = self.state.lock();
        let stop = state
            .stopped
            .take()
            .ok_or_else(|| VMError::InvalidState("no execution is stopped".into()))?;
        state.step = Some(StepRequest {
            mode,
            exec: stop.exec,
            depth: stop.depth,
            method: stop.method,
            line: stop.line,
            pc: stop.pc,
        });
        self.rearm(&state);
        self.resumed_cv.notify_all();
        Ok(())
    }

    /// Blocks until an execution stops or `timeout` passes.
    pub fn wait_for_stop(&self, timeout: Duration) -> Option<StopEvent> {
        let mut state = self.state.lock();
        if state.stopped.is_none() {
            let result = self
                .stopped_cv
                .wait_while_for(&mut state, |state| state.stopped.is_none(), timeout);
            if result.timed_out() && state.stopped.is_none() {
                return None;
            }
        }
        state.stopped.clone()
    }

    /// Blocks the driving thread while an execution is stopped.
    pub fn wait_while_stopped(&self) {
        let mut state = self.state.lock();
        self.resumed_cv
            .wait_while(&mut state, |state| state.stopped.is_some());
    }

    pub fn is_stopped(&self) -> bool {
        self.state.lock().stopped.is_some()
    }

    pub fn stop_event(&self) -> Option<StopEvent> {
        self.state.lock().stopped.clone()
    }

    #[inline]
    pub(crate) fn is_armed(&self) -> bool {
        self.armed.load(Ordering::Relaxed)
    }

    /// Decides whether `exec` stops before the instruction at `pc`.
    pub(crate) fn should_stop(
        &self,
        exec: ExecId,
        method: MethodId,
        line: Option<u32>,
        pc: u32,
        depth: usize,
    ) -> Option<StopReason> {
        let mut state = self.state.lock();
        if state.stopped.is_some() {
            return None;
        }
        let reason = if state.stop_requested {
            state.stop_requested = false;
            Some(StopReason::Requested)
        } else {
            match state.step {
                Some(step) if step.exec == exec && step.reached(method, line, pc, depth) => {
                    state.step = None;
                    Some(StopReason::Step)
                }
                _ => None,
            }
        };
        self.rearm(&state);
        reason
    }

    /// Records a stop and wakes threads waiting for one. A second stop while
    /// one is pending is dropped.
    pub(crate) fn report_stop(&self, event: StopEvent) -> bool {
        let mut state = self.state.lock();
        if state.stopped.is_some() {
            return false;
        }
        log::debug!("execution {} stopped at {} pc {}: {:?}", event.exec, event.location, event.pc, event.reason);
        state.stopped = Some(event);
        self.stopped_cv.notify_all();
        true
    }
}

impl VM {
    pub fn attach_debugger(&mut self, debugger: Arc<Debugger>) {
        self.debugger = Some(debugger);
    }

    pub fn detach_debugger(&mut self) -> Option<Arc<Debugger>> {
        self.debugger.take()
    }

    pub fn debugger(&self) -> Option<Arc<Debugger>> {
        self.debugger.clone()
    }

    fn stop_event(&self, reason: StopReason, method: MethodId, pc: u32) -> StopEvent {
        StopEvent {
            exec: self.exec.id,
            reason,
            method,
            location: self.method_label(method),
            line: self.line_of(method, pc),
            pc,
            depth: self.exec.depth(),
        }
    }

    /// Asks the debugger whether to stop before `pc`. On a stop the
    /// instruction is marked so it runs once the execution resumes.
    pub(crate) fn debug_stop_check(&mut self, debugger: &Debugger, method: MethodId, pc: u32) -> bool {
        let line = self.line_of(method, pc);
        let depth = self.exec.depth();
        let Some(reason) = debugger.should_stop(self.exec.id, method, line, pc, depth) else {
            return false;
        };
        if !debugger.report_stop(self.stop_event(reason, method, pc)) {
            return false;
        }
        self.exec.skip_breakpoint = Some((method, pc));
        true
    }

    /// Handles a patched instruction. `None` suspends before it; otherwise
    /// the original opcode is returned for execution.
    pub(crate) fn breakpoint_original(&mut self, method: MethodId, pc: u32, resumed: bool) -> ThrowResult<Option<u8>> {
        let Some(original) = self.breakpoints.get(&(method, pc)).copied() else {
            log::warn!("breakpoint opcode without a breakpoint in {} at {}", self.method_label(method), pc);
            return Err(VMError::UnknownOpcode {
                opcode: Opcode::Breakpoint as u8,
                method: self.method_label(method),
                pc,
            }
            .into());
        };
        let Some(debugger) = self.debugger.clone() else {
            return Ok(Some(original));
        };
        if resumed || !debugger.report_stop(self.stop_event(StopReason::Breakpoint, method, pc)) {
            return Ok(Some(original));
        }
        self.exec.skip_breakpoint = Some((method, pc));
        Ok(None)
    }

    /// Reports a thrown exception when the debugger breaks on exceptions.
    /// The exception is kept on the execution and unwound on resume.
    pub(crate) fn break_on_exception(&mut self, exception: ObjRef) -> bool {
        let Some(debugger) = self.debugger.clone() else {
            return false;
        };
        let Some(method) = self.exec.method else {
            return false;
        };
        if !debugger.exception_break() {
            return false;
        }
        let class_name = match self.heap.get(exception) {
            Some(object) => self.registry.class(object.class()).java_name(),
            None => return false,
        };
        let reason = StopReason::Exception {
            class_name,
            message: self.throwable_message(exception),
        };
        let pc = self.exec.pc;
        if !debugger.report_stop(self.stop_event(reason, method, pc)) {
            return false;
        }
        self.exec.pending_exception = Some(exception);
        true
    }

    fn code_method(&mut self, class_name: &str, method_name: &str, descriptor: &str) -> Result<MethodId, VMError> {
        let class = self.registry.load(class_name, &mut self.symbols)?;
        let method = self
            .registry
            .class(class)
            .find_declared_method(method_name, descriptor)
            .ok_or_else(|| VMError::MethodNotFound {
                class: class_name.to_string(),
                name: method_name.to_string(),
                descriptor: descriptor.to_string(),
            })?;
        if self.registry.method(method).code.is_none() {
            return Err(VMError::InvalidState(format!(
                "{} has no bytecode",
                self.method_label(method)
            )));
        }
        Ok(method)
    }

    /// First pc of `line` in the method, or `None` when the method has no
    /// code on that line.
    pub fn pc_of_line(&self, method: MethodId, line: u32) -> Option<u32> {
        let code = self.registry.method(method).code.as_ref()?;
        code.line_numbers
            .iter()
            .filter(|entry| entry.line as u32 == line)
            .map(|entry| entry.start_pc as u32)
            .min()
    }

    pub fn line_of(&self, method: MethodId, pc: u32) -> Option<u32> {
        self.registry
            .method(method)
            .code
            .as_ref()
            .and_then(|code| code.line_of(pc))
            .map(u32::from)
    }

    /// Patches a breakpoint at `pc` and returns the method it was set in.
    /// Setting the same breakpoint twice is a no-op.
    pub fn set_breakpoint(
        &mut self,
        class_name: &str,
        method_name: &str,
        descriptor: &str,
        pc: u32,
    ) -> Result<MethodId, VMError> {
        let method = self.code_method(class_name, method_name, descriptor)?;
        let label = self.method_label(method);
        let Entry::Vacant(slot) = self.breakpoints.entry((method, pc)) else {
            return Ok(method);
        };
        let op = self
            .registry
            .method_mut(method)
            .code
            .as_mut()
            .and_then(|code| code.bytecode.get_mut(pc as usize))
            .ok_or_else(|| VMError::InvalidState(format!("pc {} is outside {}", pc, label)))?;
        slot.insert(*op);
        *op = Opcode::Breakpoint as u8;
        log::debug!("breakpoint set in {} at pc {}", label, pc);
        Ok(method)
    }

    /// Sets a breakpoint on the first instruction of `line`.
    pub fn set_line_breakpoint(
        &mut self,
        class_name: &str,
        method_name: &str,
        descriptor: &str,
        line: u32,
    ) -> Result<MethodId, VMError> {
        let method = self.code_method(class_name, method_name, descriptor)?;
        let pc = self.pc_of_line(method, line).ok_or_else(|| {
            VMError::InvalidState(format!("{} has no code on line {}", self.method_label(method), line))
        })?;
        self.set_breakpoint(class_name, method_name, descriptor, pc)
    }

    /// Restores the original instruction. Returns `false` when no breakpoint
    /// was set there.
    pub fn clear_breakpoint(&mut self, method: MethodId, pc: u32) -> bool {
        let Some(original) = self.breakpoints.remove(&(method, pc)) else {
            return false;
        };
        if let Some(op) = self
            .registry
            .method_mut(method)
            .code
            .as_mut()
            .and_then(|code| code.bytecode.get_mut(pc as usize))
        {
            *op = original;
        }
        true
    }

    pub fn clear_all_breakpoints(&mut self) {
        let all: Vec<(MethodId, u32)> = self.breakpoints.keys().copied().collect();
        for (method, pc) in all {
            self.clear_breakpoint(method, pc);
        }
    }

    fn execution(&self, exec: ExecId) -> Option<&Execution> {
        if self.exec.id == exec {
            Some(&self.exec)
        } else {
            self.parked.get(&exec)
        }
    }

    /// Frame `index` of an execution, innermost first.
    pub fn stack_frame(&self, exec: ExecId, index: usize) -> Option<FrameInfo> {
        self.execution(exec)?.frame(index)
    }

    pub fn stack_depth(&self, exec: ExecId) -> usize {
        self.execution(exec).map_or(0, Execution::depth)
    }

    /// One local slot of a frame: `Object` when the slot holds a
    /// reference, its raw bits as `Int` otherwise.
    pub fn read_local(&self, exec: ExecId, frame: usize, local: usize) -> Option<JValue> {
        let execution = self.execution(exec)?;
        let frame = execution.frame(frame)?;
        let index = frame.locals() + local;
        if index >= frame.top {
            return None;
        }
        let stack = &execution.stack;
        if stack.is_ref(index) {
            Some(JValue::Object(stack.load_ref(index)))
        } else {
            Some(JValue::Int(stack.raw(index)))
        }
    }

    /// A `long` or `double` local as its raw 64 bits.
    pub fn read_local_wide(&self, exec: ExecId, frame: usize, local: usize) -> Option<JLong> {
        let execution = self.execution(exec)?;
        let frame = execution.frame(frame)?;
        let index = frame.locals() + local;
        if index + 1 >= frame.top {
            return None;
        }
        Some(execution.stack.load::<JLong>(index))
    }

    /// Instance field `name` of `obj`, searching superclasses.
    pub fn read_field(&self, obj: ObjRef, name: &str) -> Option<JValue> {
        let object = self.heap.get(obj)?;
        let fields = object.fields()?;
        self.registry.super_chain(object.class()).find_map(|class| {
            self.registry
                .class(class)
                .fields
                .iter()
                .find(|f| !f.is_static() && f.name.as_str() == name)
                .map(|f| read_slot_value(fields, f.slot as usize, f.kind))
        })
    }

    /// Element `index` of an array, `None` when out of range.
    pub fn read_array(&self, array: ObjRef, index: usize) -> Option<JValue> {
        self.heap.get(array)?.array()?.get(index)
    }

    pub fn array_length(&self, array: ObjRef) -> Option<usize> {
        self.heap.get(array)?.array().map(|data| data.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(method: MethodId, line: u32, pc: u32, depth: usize) -> (MethodId, Option<u32>, u32, usize) {
        (method, Some(line), pc, depth)
    }

    #[test]
    fn step_modes_pick_their_stops() {
        let m = MethodId::new(ClassId(1), 0);
        let callee = MethodId::new(ClassId(1), 1);
        let request = |mode| StepRequest {
            mode,
            exec: 1,
            depth: 2,
            method: m,
            line: Some(10),
            pc: 4,
        };
        let cases = [
            (StepMode::Into, at(m, 10, 6, 2), false),
            (StepMode::Into, at(m, 11, 9, 2), true),
            (StepMode::Into, at(callee, 20, 0, 3), true),
            (StepMode::Over, at(callee, 20, 0, 3), false),
            (StepMode::Over, at(m, 11, 9, 2), true),
            (StepMode::Over, at(m, 10, 7, 2), false),
            (StepMode::Out, at(m, 11, 9, 2), false),
            (StepMode::Out, at(m, 3, 12, 1), true),
        ];
        for (mode, (method, line, pc, depth), expected) in cases {
            assert_eq!(
                request(mode).reached(method, line, pc, depth),
                expected,
                "{:?} at line {:?} depth {}",
                mode,
                line,
                depth
            );
        }
    }

    #[test]
    fn without_lines_steps_compare_pcs() {
        let m = MethodId::new(ClassId(1), 0);
        let step = StepRequest {
            mode: StepMode::Into,
            exec: 1,
            depth: 1,
            method: m,
            line: None,
            pc: 4,
        };
        assert!(!step.reached(m, None, 4, 1));
        assert!(step.reached(m, None, 5, 1));
    }

    #[test]
    fn requested_stop_is_reported_once() {
        let debugger = Debugger::new();
        let m = MethodId::new(ClassId(1), 0);
        assert!(!debugger.is_armed());
        debugger.request_stop();
        assert!(debugger.is_armed());
        assert_eq!(debugger.should_stop(1, m, None, 0, 1), Some(StopReason::Requested));
        assert!(!debugger.is_armed());
        assert_eq!(debugger.should_stop(1, m, None, 0, 1), None);
    }

    #[test]
    fn resume_wakes_the_waiting_thread() {
        let debugger = Debugger::new();
        let event = StopEvent {
            exec: 1,
            reason: StopReason::Requested,
            method: MethodId::new(ClassId(0), 0),
            location: "demo.Main.main()V".into(),
            line: None,
            pc: 0,
            depth: 1,
        };
        assert!(debugger.report_stop(event.clone()));
        assert!(!debugger.report_stop(event.clone()));
        let waiter = {
            let debugger = debugger.clone();
            std::thread::spawn(move || debugger.wait_while_stopped())
        };
        assert_eq!(debugger.wait_for_stop(Duration::from_millis(10)), Some(event));
        assert!(debugger.resume());
        waiter.join().unwrap();
        assert!(!debugger.is_stopped());
        assert_eq!(debugger.wait_for_stop(Duration::from_millis(10)), None);
    }

    #[test]
    fn step_needs_a_stopped_execution() {
        let debugger = Debugger::new();
        assert!(matches!(debugger.step(StepMode::Over), Err(VMError::InvalidState(_))));
    }
}
