use std::time::{Duration, Instant};

use crate::object::prelude::*;
use crate::runtime::exception::ExceptionKind;
use crate::runtime::{Throw, ThrowResult};
use crate::thread::ExecId;
use crate::value::JValue;
use crate::vm::VM;

use super::{non_null, NativeArgs};

fn execution_of(vm: &VM, thread: ObjRef) -> ExecId {
    let slot = vm.well_known.thread_eetop;
    vm.heap
        .get(thread)
        .and_then(Object::fields)
        .map_or(0, |fields| fields.get_int(slot) as ExecId)
}

fn set_execution_of(vm: &mut VM, thread: ObjRef, id: ExecId) {
    let slot = vm.well_known.thread_eetop;
    if let Some(fields) = vm.heap.get_mut(thread).and_then(Object::fields_mut) {
        fields.set_int(slot, id as JInt);
    }
}

/// Creates an execution for `run()` and queues it for whoever drives this
/// one.
pub fn Java_java_lang_Thread_start(vm: &mut VM, args: &NativeArgs) -> Result<JValue, Throw> {
    let this = non_null(vm, args.this(), "this")?;
    if execution_of(vm, this) != 0 {
        return Err(vm.throw_new(ExceptionKind::IllegalThreadStateException, None));
    }
    let class = vm.class_of(this)?;
    let run = match vm.registry.lookup_method(class, "run", "()V") {
        Some(run) => run,
        None => {
            let message = format!("{}.run()V", vm.registry.class(class).java_name());
            return Err(vm.throw_new(ExceptionKind::AbstractMethodError, Some(message)));
        }
    };
    let id = vm.prepare_method_execution(run, &[JValue::Object(Some(this))])?;
    set_execution_of(vm, this, id);
    if let Some(exec) = vm.parked.get_mut(&id) {
        exec.thread_object = Some(this);
    }
    vm.guest_threads.push(id);
    log::debug!("execution {} started thread {}", vm.exec.id, id);
    Ok(JValue::Void)
}

pub fn Java_java_lang_Thread_isAlive(vm: &mut VM, args: &NativeArgs) -> Result<JValue, Throw> {
    let this = non_null(vm, args.this(), "this")?;
    let id = execution_of(vm, this);
    let alive = id != 0 && (vm.exec.id == id || vm.parked.contains_key(&id) || vm.completed.contains_key(&id));
    Ok(JValue::Int(alive as JInt))
}

/// Ends the slice; the execution gets no further slice before the deadline.
pub fn Java_java_lang_Thread_sleep(vm: &mut VM, args: &NativeArgs) -> Result<JValue, Throw> {
    let millis = args.long(0);
    if millis < 0 {
        let message = "timeout value is negative".to_string();
        return Err(vm.throw_new(ExceptionKind::IllegalArgumentException, Some(message)));
    }
    vm.exec.wake_at = Some(Instant::now() + Duration::from_millis(millis as u64));
    vm.yield_requested = true;
    Ok(JValue::Void)
}

pub fn Java_java_lang_Thread_yieldNow(vm: &mut VM, _args: &NativeArgs) -> Result<JValue, Throw> {
    vm.yield_requested = true;
    Ok(JValue::Void)
}

/// The `Thread` of the running execution. Executions the host started get
/// one on first request, without running a constructor.
pub fn Java_java_lang_Thread_currentThread(vm: &mut VM, _args: &NativeArgs) -> Result<JValue, Throw> {
    if let Some(thread) = vm.exec.thread_object {
        return Ok(JValue::Object(Some(thread)));
    }
    let thread = current_thread_object(vm)?;
    Ok(JValue::Object(Some(thread)))
}

fn current_thread_object(vm: &mut VM) -> ThrowResult<ObjRef> {
    let class = vm.well_known.thread;
    let thread = vm.new_instance(class)?;
    let id = vm.exec.id;
    set_execution_of(vm, thread, id);
    vm.exec.thread_object = Some(thread);
    Ok(thread)
}
