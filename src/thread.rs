use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Mutex, MutexGuard};

use crate::object::prelude::{MethodId, ObjRef};
use crate::runtime::frame::{FrameInfo, FrameIter};
use crate::runtime::stack::Stack;
use crate::runtime::SliceOutcome;
use crate::value::JValue;
use crate::vm::{VMError, VM};

pub type ExecId = u32;

/// Id of the execution driven by `VM::run` and the `invoke_*` calls.
pub const MAIN_EXECUTION: ExecId = 1;

/// Interpreter registers plus the slot stack of one logical thread.
pub struct Execution {
    pub(crate) id: ExecId,
    pub(crate) stack: Stack,
    pub(crate) method: Option<MethodId>,
    pub(crate) pc: u32,
    pub(crate) start_sp: usize,
    /// Exception held across a debugger stop, unwound on resume.
    pub(crate) pending_exception: Option<ObjRef>,
    /// Breakpoint to execute through once after a resume.
    pub(crate) skip_breakpoint: Option<(MethodId, u32)>,
    /// Set by `Thread.sleep`.
    pub(crate) wake_at: Option<Instant>,
    /// The `java/lang/Thread` this execution runs as, once known.
    pub(crate) thread_object: Option<ObjRef>,
}

impl Execution {
    pub fn new(id: ExecId, stack_slots: usize) -> Self {
        Self {
            id,
            stack: Stack::new(stack_slots),
            method: None,
            pc: 0,
            start_sp: 0,
            pending_exception: None,
            skip_breakpoint: None,
            wake_at: None,
            thread_object: None,
        }
    }

    #[inline]
    pub fn id(&self) -> ExecId {
        self.id
    }

    #[inline]
    pub fn is_idle(&self) -> bool {
        self.method.is_none()
    }

    pub fn frames(&self) -> FrameIter<'_> {
        FrameIter::new(&self.stack, self.method, self.pc, self.start_sp)
    }

    pub fn frame(&self, index: usize) -> Option<FrameInfo> {
        self.frames().nth(index)
    }

    pub fn depth(&self) -> usize {
        self.frames().count()
    }

    /// Visits every reference-tagged slot below the stack top: frame locals,
    /// operands and arguments staged by the host.
    pub(crate) fn trace_roots(&self, visitor: &mut dyn FnMut(ObjRef)) {
        self.stack
            .refs_in(0, self.stack.sp())
            .for_each(|obj| visitor(obj));
        if let Some(exception) = self.pending_exception {
            visitor(exception);
        }
        if let Some(thread) = self.thread_object {
            visitor(thread);
        }
    }

    pub(crate) fn reset(&mut self) {
        self.stack.reset();
        self.method = None;
        self.pc = 0;
        self.start_sp = 0;
        self.pending_exception = None;
        self.skip_breakpoint = None;
        self.wake_at = None;
    }
}

/// Cooperative stop flag, polled between scheduling slices.
#[derive(Clone, Default)]
pub struct TerminateHandle(Arc<AtomicBool>);

impl TerminateHandle {
    pub fn terminate(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[inline]
    pub fn is_terminated(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// A VM shared by several OS threads. Each execution holds the lock for one
/// slice at a time.
#[derive(Clone)]
pub struct SharedVm(Arc<Mutex<VM>>);

impl SharedVm {
    pub fn new(vm: VM) -> Self {
        SharedVm(Arc::new(Mutex::new(vm)))
    }

    pub fn lock(&self) -> MutexGuard<'_, VM> {
        self.0.lock()
    }

    pub fn terminate_handle(&self) -> TerminateHandle {
        self.lock().terminate_handle()
    }

    /// Starts a static method on a new OS thread with its own execution.
    pub fn spawn_static(
        &self,
        class_name: &str,
        method_name: &str,
        descriptor: &str,
        args: Vec<JValue>,
    ) -> Result<std::thread::JoinHandle<Result<JValue, VMError>>, VMError> {
        let id = self
            .lock()
            .prepare_execution(class_name, method_name, descriptor, &args)?;
        let vm = self.clone();
        std::thread::Builder::new()
            .name(format!("ejvm-exec-{}", id))
            .stack_size(4 * 1024 * 1024)
            .spawn(move || vm.drive(id))
            .map_err(|e| VMError::InvalidState(format!("cannot spawn execution thread: {}", e)))
    }

    /// Runs a static method on the calling thread, releasing the lock
    /// between slices.
    pub fn invoke_static(
        &self,
        class_name: &str,
        method_name: &str,
        descriptor: &str,
        args: &[JValue],
    ) -> Result<JValue, VMError> {
        let id = self
            .lock()
            .prepare_execution(class_name, method_name, descriptor, args)?;
        self.drive(id)
    }

    fn drive(&self, id: ExecId) -> Result<JValue, VMError> {
        loop {
            let (outcome, debugger, started) = {
                let mut vm = self.lock();
                let outcome = vm.run_parked_slice(id);
                (outcome, vm.debugger(), vm.take_guest_threads())
            };
            for guest in started {
                self.spawn_guest(guest);
            }
            match outcome? {
                SliceOutcome::Finished(value) => return Ok(value),
                SliceOutcome::Yield | SliceOutcome::Blocked => std::thread::yield_now(),
                SliceOutcome::Suspended => {
                    if let Some(debugger) = debugger {
                        debugger.wait_while_stopped();
                    }
                }
                SliceOutcome::Sleeping(wake_at) => sleep_until(wake_at),
            }
        }
    }

    /// Gives an execution started by `Thread.start` its own OS thread. An
    /// uncaught exception is reported on the error console.
    fn spawn_guest(&self, id: ExecId) {
        let vm = self.clone();
        let spawned = std::thread::Builder::new()
            .name(format!("ejvm-thread-{}", id))
            .stack_size(4 * 1024 * 1024)
            .spawn(move || {
                if let Err(e) = vm.drive(id) {
                    vm.lock().report_thread_death(id, &e);
                }
            });
        if let Err(e) = spawned {
            log::error!("cannot spawn a thread for execution {}: {}", id, e);
            let mut vm = self.lock();
            vm.discard_execution(id);
        }
    }
}

pub(crate) fn sleep_until(wake_at: Instant) {
    let now = Instant::now();
    if wake_at > now {
        std::thread::sleep(wake_at - now);
    }
}
