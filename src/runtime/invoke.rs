use std::time::Instant;

use crate::native::NativeArgs;
use crate::object::prelude::*;
use crate::value::JValue;
use crate::vm::{VMError, VM};

use super::exception::{ExceptionKind, MonitorTarget};
use super::frame::{FrameContext, FRAME_CONTEXT_SLOTS};
use super::{SliceOutcome, Step, Throw, ThrowResult};

impl VM {
    /// Local slots of a frame of `method`: never fewer than its arguments.
    pub(crate) fn frame_locals(&self, method: MethodId) -> usize {
        let method = self.registry.method(method);
        let args = method.frame_arg_slots() as usize;
        method
            .code
            .as_ref()
            .map_or(args, |code| (code.max_locals as usize).max(args))
    }

    /// Turns the arguments on top of the stack into the locals of a new
    /// frame for `method_id`. The caller is whatever method is current.
    pub(crate) fn push_frame(&mut self, method_id: MethodId, caller_pc: u32, return_pc: u32) -> ThrowResult<()> {
        let (argc, max_locals, max_stack) = {
            let method = self.registry.method(method_id);
            let Some(code) = method.code.as_ref() else {
                return Err(VMError::InvalidState(format!(
                    "{} has no code",
                    self.method_label(method_id)
                ))
                .into());
            };
            let argc = method.frame_arg_slots() as usize;
            (argc, (code.max_locals as usize).max(argc), code.max_stack as usize)
        };
        let sp = self.exec.stack.sp();
        let base = sp.checked_sub(argc).ok_or_else(|| {
            VMError::InvalidState(format!("operand stack underflow calling {}", self.method_label(method_id)))
        })?;
        let needed = sp + FRAME_CONTEXT_SLOTS + (max_locals - argc) + max_stack;
        if needed > self.exec.stack.limit() {
            return Err(self.throw_new(ExceptionKind::StackOverflowError, None));
        }

        let stack = &mut self.exec.stack;
        stack.shift_up(base, argc, FRAME_CONTEXT_SLOTS);
        FrameContext {
            caller: self.exec.method,
            caller_pc,
            return_pc,
            caller_start_sp: self.exec.start_sp,
        }
        .write(stack, base);
        let locals = base + FRAME_CONTEXT_SLOTS;
        stack.zero(locals + argc, locals + max_locals);
        stack.set_sp(locals + max_locals);

        self.exec.method = Some(method_id);
        self.exec.pc = 0;
        self.exec.start_sp = locals - 1;
        log::trace!("push frame {} at {}", self.method_label(method_id), base);
        Ok(())
    }

    /// Calls `method_id` with its arguments on the stack. Bytecode gets a
    /// new frame; natives run to completion and leave their result pushed.
    pub(crate) fn invoke(&mut self, method_id: MethodId, caller_pc: u32, return_pc: u32) -> ThrowResult<Step> {
        let method = self.registry.method(method_id);
        let (is_abstract, is_native, synchronized, is_static) = (
            method.is_abstract(),
            method.is_native(),
            method.is_synchronized(),
            method.is_static(),
        );
        let argc = method.frame_arg_slots() as usize;
        if is_abstract {
            let message = self.method_label(method_id);
            return Err(self.throw_new(ExceptionKind::AbstractMethodError, Some(message)));
        }

        let lock = if !synchronized {
            None
        } else if is_static {
            Some(MonitorTarget::Class(method_id.class))
        } else {
            MonitorTarget::from_ref(self.exec.stack.peek_ref(argc.saturating_sub(1)))
        };
        if let Some(target) = lock {
            if !self.monitor_enter(target) {
                return Ok(Step::Blocked);
            }
        }

        if is_native {
            let result = self.call_native(method_id);
            if let Some(target) = lock {
                self.monitor_exit(target);
            }
            self.exec.stack.push_value(result?);
            self.exec.pc = return_pc;
            return Ok(Step::Next);
        }
        if let Err(e) = self.push_frame(method_id, caller_pc, return_pc) {
            if let Some(target) = lock {
                self.monitor_exit(target);
            }
            return Err(e);
        }
        Ok(Step::Next)
    }

    /// Runs a native with the arguments on top of the stack and pops them.
    /// Natives are bound lazily by name on first call.
    pub(crate) fn call_native(&mut self, method_id: MethodId) -> ThrowResult<JValue> {
        let native = match self.registry.method(method_id).native {
            Some(native) => native,
            None => {
                let method = self.registry.method(method_id);
                let class_name = self.registry.class(method_id.class).name.clone();
                match self
                    .natives
                    .lookup(class_name.as_str(), method.name.as_str(), method.descriptor.as_str())
                {
                    Some(native) => {
                        self.registry.method_mut(method_id).native = Some(native);
                        native
                    }
                    None => {
                        let message = format!(
                            "'{} {}.{}'",
                            method.descriptor,
                            self.registry.class(method_id.class).java_name(),
                            method.name
                        );
                        return Err(self.throw_new(ExceptionKind::UnsatisfiedLinkError, Some(message)));
                    }
                }
            }
        };
        let argc = self.registry.method(method_id).frame_arg_slots() as usize;
        let base = self.exec.stack.sp().checked_sub(argc).ok_or_else(|| {
            VMError::InvalidState(format!("operand stack underflow calling {}", self.method_label(method_id)))
        })?;
        let args = NativeArgs::new(self.exec.stack.slots(base, argc));
        log::trace!("native {}", self.method_label(method_id));
        let value = native(self, &args)?;
        self.exec.stack.set_sp(base);
        Ok(value)
    }

    /// Pops the current frame and hands `value` to its caller.
    pub(crate) fn return_from_frame(&mut self, value: JValue) -> ThrowResult<Step> {
        let method_id = self
            .exec
            .method
            .ok_or_else(|| VMError::InvalidState("return without a frame".into()))?;
        let method = self.registry.method(method_id);
        let (synchronized, is_static) = (method.is_synchronized(), method.is_static());
        let is_clinit = method.name.as_str() == "<clinit>";
        let start_sp = self.exec.start_sp;

        if synchronized {
            let target = if is_static {
                Some(MonitorTarget::Class(method_id.class))
            } else {
                MonitorTarget::from_ref(self.exec.stack.load_ref(start_sp + 1))
            };
            if let Some(target) = target {
                if !self.monitor_exit(target) {
                    return Err(self.throw_new(ExceptionKind::IllegalMonitorStateException, None));
                }
            }
        }
        if is_clinit {
            self.finish_class_init(method_id.class, true);
        }

        let ctx = FrameContext::read(&self.exec.stack, start_sp);
        self.exec.stack.set_sp(FrameContext::base(start_sp));
        log::trace!("pop frame {}", self.method_label(method_id));
        match ctx.caller {
            None => {
                self.exec.method = None;
                self.exec.pc = 0;
                self.exec.start_sp = 0;
                Ok(Step::Returned(value))
            }
            Some(caller) => {
                self.exec.method = Some(caller);
                self.exec.pc = ctx.return_pc;
                self.exec.start_sp = ctx.caller_start_sp;
                self.exec.stack.push_value(value);
                Ok(Step::Next)
            }
        }
    }

    fn monitor_of(&mut self, target: MonitorTarget) -> Option<&mut Monitor> {
        match target {
            MonitorTarget::Object(obj) => self.heap.get_mut(obj).map(|o| &mut o.header.monitor),
            MonitorTarget::Class(class) => Some(&mut self.registry.class_mut(class).monitor),
        }
    }

    /// Returns `false` when another execution owns the monitor.
    pub(crate) fn monitor_enter(&mut self, target: MonitorTarget) -> bool {
        let owner = self.exec.id;
        self.monitor_of(target).map_or(true, |m| m.enter(owner))
    }

    /// Returns `false` when the current execution does not own the monitor.
    pub(crate) fn monitor_exit(&mut self, target: MonitorTarget) -> bool {
        let owner = self.exec.id;
        let released = self.monitor_of(target).map_or(false, |m| m.exit(owner));
        if !released {
            log::warn!("execution {} exits monitor {:?} it does not own", owner, target);
        }
        released
    }

    /// Drops every monitor held by an execution that is going away.
    pub(crate) fn release_monitors(&mut self, owner: u32) {
        let free = |monitor: &mut Monitor| {
            if monitor.count > 0 && monitor.owner == owner {
                *monitor = Monitor::default();
            }
        };
        self.heap.iter_mut().for_each(|o| free(&mut o.header.monitor));
        self.registry
            .classes_mut()
            .iter_mut()
            .for_each(|c| free(&mut c.monitor));
    }

    /// Stages a call from the host on the current, idle execution.
    ///
    /// Natives run immediately and their result is returned. For bytecode
    /// the frame is pushed, together with the `<clinit>` frames its class
    /// still needs, and `None` tells the caller to run the execution.
    pub(crate) fn enter_method(&mut self, method_id: MethodId, args: &[JValue]) -> Result<Option<JValue>, VMError> {
        if !self.exec.is_idle() {
            return Err(VMError::InvalidState(format!(
                "execution {} is already running",
                self.exec.id
            )));
        }
        self.check_host_args(method_id, args)?;
        self.exec.reset();
        let is_native = self.registry.method(method_id).is_native();

        let pinned: Vec<ObjRef> = args.iter().filter_map(|a| a.as_obj_val().flatten()).collect();
        pinned.iter().for_each(|obj| self.heap.pin(*obj));
        let result = self.stage_call(method_id, args, is_native);
        pinned.iter().for_each(|obj| self.heap.unpin(*obj));
        result
    }

    fn stage_call(&mut self, method_id: MethodId, args: &[JValue], is_native: bool) -> Result<Option<JValue>, VMError> {
        if is_native {
            self.initialize_class(method_id.class)?;
            args.iter().for_each(|arg| self.exec.stack.push_value(*arg));
            let result = self.call_native(method_id);
            return match result {
                Ok(value) => {
                    self.exec.reset();
                    Ok(Some(value))
                }
                Err(Throw::Exception(exception)) => self.unwind(exception).map(|_| None),
                Err(Throw::Fatal(e)) => {
                    self.exec.reset();
                    Err(e)
                }
            };
        }

        args.iter().for_each(|arg| self.exec.stack.push_value(*arg));
        let staged = self.invoke(method_id, 0, 0).and_then(|step| {
            if step == Step::Blocked {
                let label = self.method_label(method_id);
                return Err(VMError::InvalidState(format!("monitor of {} is held by another execution", label)).into());
            }
            self.ensure_class_initialized(method_id.class, 0)
        });
        match staged {
            Ok(_) => Ok(None),
            // frames already pushed unwind like any other throw
            Err(Throw::Exception(exception)) => self.unwind(exception).map(|_| None),
            Err(Throw::Fatal(e)) => {
                self.exec.reset();
                Err(e)
            }
        }
    }

    /// Runs the static initializers `class` still needs on the idle
    /// execution, to completion.
    pub(crate) fn initialize_class(&mut self, class: ClassId) -> Result<(), VMError> {
        let pushed = match self.ensure_class_initialized(class, 0) {
            Ok(pushed) => pushed,
            Err(Throw::Exception(exception)) => {
                self.unwind(exception)?;
                true
            }
            Err(Throw::Fatal(e)) => {
                self.exec.reset();
                return Err(e);
            }
        };
        if pushed {
            self.run_to_completion()?;
        }
        Ok(())
    }

    /// Drives the current execution until its bottom frame returns. Guest
    /// threads started along the way get a slice after each of its slices.
    pub(crate) fn run_to_completion(&mut self) -> Result<JValue, VMError> {
        let budget = self.config.slice_budget;
        loop {
            if self.terminate.is_terminated() {
                self.abandon_execution();
                return Err(VMError::Terminated);
            }
            let before = self.executed;
            let (blocked, wake_at) = match self.run_slice(budget)? {
                SliceOutcome::Finished(value) => return Ok(value),
                SliceOutcome::Yield => (false, None),
                SliceOutcome::Blocked => (true, None),
                SliceOutcome::Sleeping(wake_at) => (false, Some(wake_at)),
                SliceOutcome::Suspended => {
                    if let Some(debugger) = self.debugger.clone() {
                        debugger.wait_while_stopped();
                    }
                    continue;
                }
            };
            if self.guest_threads.is_empty() {
                if blocked {
                    self.abandon_execution();
                    return Err(VMError::InvalidState(
                        "monitor held by another execution; use SharedVm to run executions concurrently".into(),
                    ));
                }
                if let Some(wake_at) = wake_at {
                    crate::thread::sleep_until(wake_at);
                }
                continue;
            }
            let round = self.run_guest_slices();
            if self.executed != before || round.ended {
                continue;
            }
            match earliest(wake_at, round.earliest_wake) {
                Some(wake_at) => crate::thread::sleep_until(wake_at),
                None if blocked => {
                    self.abandon_execution();
                    return Err(VMError::InvalidState("every execution is blocked on a monitor".into()));
                }
                None => {}
            }
        }
    }

    /// Runs one slice of every guest thread, forgetting the ones that end.
    pub(crate) fn run_guest_slices(&mut self) -> GuestRound {
        let mut round = GuestRound::default();
        for id in self.guest_threads.clone() {
            let ended = match self.run_parked_slice(id) {
                Ok(SliceOutcome::Finished(_)) => true,
                Ok(SliceOutcome::Sleeping(wake_at)) => {
                    round.earliest_wake = earliest(round.earliest_wake, Some(wake_at));
                    false
                }
                Ok(SliceOutcome::Suspended) => {
                    if let Some(debugger) = self.debugger.clone() {
                        debugger.wait_while_stopped();
                    }
                    false
                }
                Ok(SliceOutcome::Yield | SliceOutcome::Blocked) => false,
                Err(e) => {
                    self.report_thread_death(id, &e);
                    true
                }
            };
            if ended {
                round.ended = true;
                self.guest_threads.retain(|t| *t != id);
            }
        }
        round
    }

    /// Runs the guest threads still alive after the main method returned.
    pub(crate) fn join_guest_threads(&mut self) -> Result<(), VMError> {
        while !self.guest_threads.is_empty() {
            let before = self.executed;
            let round = self.run_guest_slices();
            if self.executed != before || round.ended {
                continue;
            }
            match round.earliest_wake {
                Some(wake_at) => crate::thread::sleep_until(wake_at),
                None => {
                    let stuck = std::mem::take(&mut self.guest_threads);
                    stuck.iter().for_each(|id| self.discard_execution(*id));
                    return Err(VMError::InvalidState(format!(
                        "threads {:?} are blocked on monitors nobody releases",
                        stuck
                    )));
                }
            }
        }
        if self.terminate.is_terminated() {
            return Err(VMError::Terminated);
        }
        Ok(())
    }

    /// Resets the current execution and frees what it held.
    pub(crate) fn abandon_execution(&mut self) {
        let id = self.exec.id;
        self.release_monitors(id);
        // initializers that never finished cannot be resumed
        let frames: Vec<MethodId> = self.exec.frames().map(|f| f.method).collect();
        for method in frames {
            if self.registry.method(method).name.as_str() == "<clinit>" {
                self.finish_class_init(method.class, false);
            }
        }
        self.exec.reset();
    }

    fn check_host_args(&self, method_id: MethodId, args: &[JValue]) -> Result<(), VMError> {
        let method = self.registry.method(method_id);
        let receiver = if method.is_static() { None } else { Some(ValueKind::Reference) };
        let expected: Vec<ValueKind> = receiver.into_iter().chain(method.params.iter().copied()).collect();
        let matches = expected.len() == args.len()
            && expected.iter().zip(args).all(|(kind, arg)| {
                matches!(
                    (kind, arg),
                    (ValueKind::Long, JValue::Long(_))
                        | (ValueKind::Float, JValue::Float(_))
                        | (ValueKind::Double, JValue::Double(_))
                        | (ValueKind::Reference, JValue::Object(_))
                        | (
                            ValueKind::Boolean
                                | ValueKind::Byte
                                | ValueKind::Char
                                | ValueKind::Short
                                | ValueKind::Int,
                            JValue::Int(_)
                        )
                )
            });
        if matches {
            Ok(())
        } else {
            Err(VMError::InvalidState(format!(
                "arguments {:?} do not match {}",
                args,
                self.method_label(method_id)
            )))
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct GuestRound {
    pub(crate) ended: bool,
    pub(crate) earliest_wake: Option<Instant>,
}

fn earliest(a: Option<Instant>, b: Option<Instant>) -> Option<Instant> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

#[cfg(test)]
mod tests {
    use crate::runtime::opcode::Opcode;
    use crate::test::TestVm;
    use crate::value::JValue;
    use crate::vm::VMError;

    #[test]
    fn balanced_calls_restore_the_stack() {
        let mut vm = TestVm::bootstrap();
        vm.load_test_class("demo/Calls", |w| {
            w.method(0x0009, "twice", "(J)J", |code| {
                code.lload(0).lload(0).op(Opcode::LAdd).op(Opcode::LReturn);
            });
            w.method(0x0009, "sum", "(I)J", |code| {
                code.iload(0)
                    .op(Opcode::I2L)
                    .invokestatic("demo/Calls", "twice", "(J)J")
                    .iload(0)
                    .op(Opcode::I2L)
                    .invokestatic("demo/Calls", "twice", "(J)J")
                    .op(Opcode::LAdd)
                    .op(Opcode::LReturn);
            });
        });
        let result = vm.invoke_static("demo/Calls", "sum", "(I)J", &[JValue::Int(21)]);
        assert_eq!(result.unwrap(), JValue::Long(84));
        assert_eq!(vm.exec.stack.sp(), 0);
        assert!(vm.exec.is_idle());
    }

    #[test]
    fn runaway_recursion_overflows() {
        let mut vm = TestVm::with_stack_slots(256);
        vm.load_test_class("demo/Forever", |w| {
            w.method(0x0009, "spin", "(I)I", |code| {
                code.iload(0).invokestatic("demo/Forever", "spin", "(I)I").op(Opcode::IReturn);
            });
        });
        match vm.invoke_static("demo/Forever", "spin", "(I)I", &[JValue::Int(1)]) {
            Err(VMError::UncaughtException { class_name, .. }) => {
                assert_eq!(class_name, "java.lang.StackOverflowError")
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(vm.exec.stack.sp(), 0);
    }

    #[test]
    fn host_arguments_are_checked() {
        let mut vm = TestVm::bootstrap();
        vm.load_test_class("demo/Args", |w| {
            w.method(0x0009, "id", "(I)I", |code| {
                code.iload(0).op(Opcode::IReturn);
            });
        });
        let err = vm.invoke_static("demo/Args", "id", "(I)I", &[JValue::Long(1)]);
        assert!(matches!(err, Err(VMError::InvalidState(_))));
        let missing = vm.invoke_static("demo/Args", "nope", "()V", &[]);
        assert!(matches!(missing, Err(VMError::MethodNotFound { .. })));
    }

    #[test]
    fn missing_native_is_unsatisfied_link() {
        let mut vm = TestVm::bootstrap();
        vm.load_test_class("demo/Linked", |w| {
            w.native_method(0x0009, "absent", "()I");
            w.method(0x0009, "call", "()I", |code| {
                code.invokestatic("demo/Linked", "absent", "()I").op(Opcode::IReturn);
            });
        });
        match vm.invoke_static("demo/Linked", "call", "()I", &[]) {
            Err(VMError::UncaughtException { class_name, message, .. }) => {
                assert_eq!(class_name, "java.lang.UnsatisfiedLinkError");
                assert_eq!(message.as_deref(), Some("'()I demo.Linked.absent'"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
