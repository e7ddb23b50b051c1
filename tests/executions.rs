mod common;

use std::time::Duration;

use common::*;
use ejvm::{Debugger, JValue, Opcode, SharedVm, StepMode, StopReason, VMConfig, VMError};

const COUNTER: &str = "demo/Counter";

#[test]
fn executions_take_turns_on_a_class_monitor() {
    let (mut vm, _) = new_vm(VMConfig::default().set_slice_budget(7));
    define(&mut vm, COUNTER, |w| {
        w.field(STATIC, "count", "I");
        w.method(PUBLIC_STATIC | SYNCHRONIZED, "add", "(I)V", |code| {
            let top = code.new_label();
            let done = code.new_label();
            code.bind(top)
                .iload(0)
                .branch(Opcode::IfLe, done)
                .getstatic(COUNTER, "count", "I")
                .iconst(1)
                .op(Opcode::IAdd)
                .putstatic(COUNTER, "count", "I")
                .iinc(0, -1)
                .branch(Opcode::Goto, top)
                .bind(done)
                .op(Opcode::Return);
        });
        w.method(PUBLIC_STATIC, "work", "(I)V", |code| {
            code.iload(0).invokestatic(COUNTER, "add", "(I)V").op(Opcode::Return);
        });
        w.method(PUBLIC_STATIC, "read", "()I", |code| {
            code.getstatic(COUNTER, "count", "I").op(Opcode::IReturn);
        });
    });
    let shared = SharedVm::new(vm);
    let workers: Vec<_> = (0..2)
        .map(|_| {
            shared
                .spawn_static(COUNTER, "work", "(I)V", vec![JValue::Int(500)])
                .unwrap()
        })
        .collect();
    for worker in workers {
        assert_eq!(worker.join().unwrap().unwrap(), JValue::Void);
    }
    assert_eq!(shared.invoke_static(COUNTER, "read", "()I", &[]).unwrap(), JValue::Int(1000));
    assert_eq!(shared.lock().get_static(COUNTER, "count").unwrap(), JValue::Int(1000));
    assert!(shared.lock().parked_executions().is_empty());
}

#[test]
fn terminate_stops_a_spinning_execution() {
    let (mut vm, _) = new_vm(VMConfig::default().set_slice_budget(100));
    define(&mut vm, "demo/Spin", |w| {
        w.method(PUBLIC_STATIC, "spin", "()V", |code| {
            let top = code.new_label();
            code.bind(top).branch(Opcode::Goto, top);
        });
    });
    let shared = SharedVm::new(vm);
    let terminate = shared.terminate_handle();
    let spinner = shared.spawn_static("demo/Spin", "spin", "()V", vec![]).unwrap();
    std::thread::sleep(Duration::from_millis(20));
    terminate.terminate();
    assert!(matches!(spinner.join().unwrap(), Err(VMError::Terminated)));
}

fn define_calc(vm: &mut ejvm::VM) {
    define(vm, "demo/Calc", |w| {
        w.source_file("Calc.java");
        w.method(PUBLIC_STATIC, "compute", "(I)I", |code| {
            code.line(10)
                .iload(0)
                .iconst(2)
                .op(Opcode::IMul)
                .istore(1)
                .line(11)
                .iload(1)
                .iconst(1)
                .op(Opcode::IAdd)
                .op(Opcode::IReturn);
        });
    });
}

#[test]
fn breakpoint_stops_and_exposes_locals() {
    let (mut vm, _) = new_vm(VMConfig::default());
    define_calc(&mut vm);
    let debugger = Debugger::new();
    vm.attach_debugger(debugger.clone());
    let method = vm.set_line_breakpoint("demo/Calc", "compute", "(I)I", 11).unwrap();

    let shared = SharedVm::new(vm);
    let handle = shared
        .spawn_static("demo/Calc", "compute", "(I)I", vec![JValue::Int(21)])
        .unwrap();
    let event = debugger.wait_for_stop(Duration::from_secs(10)).expect("no stop");
    assert_eq!(event.reason, StopReason::Breakpoint);
    assert_eq!(event.method, method);
    assert_eq!(event.line, Some(11));
    assert_eq!(event.location, "demo/Calc.compute(I)I");
    {
        let vm = shared.lock();
        assert_eq!(vm.stack_depth(event.exec), 1);
        assert_eq!(vm.read_local(event.exec, 0, 0), Some(JValue::Int(21)));
        assert_eq!(vm.read_local(event.exec, 0, 1), Some(JValue::Int(42)));
    }
    assert!(debugger.resume());
    assert_eq!(handle.join().unwrap().unwrap(), JValue::Int(43));
}

#[test]
fn step_over_moves_to_the_next_line() {
    let (mut vm, _) = new_vm(VMConfig::default());
    define_calc(&mut vm);
    let debugger = Debugger::new();
    vm.attach_debugger(debugger.clone());
    vm.set_line_breakpoint("demo/Calc", "compute", "(I)I", 10).unwrap();

    let shared = SharedVm::new(vm);
    let handle = shared
        .spawn_static("demo/Calc", "compute", "(I)I", vec![JValue::Int(5)])
        .unwrap();
    let first = debugger.wait_for_stop(Duration::from_secs(10)).expect("no breakpoint stop");
    assert_eq!(first.line, Some(10));
    debugger.step(StepMode::Over).unwrap();
    let second = debugger.wait_for_stop(Duration::from_secs(10)).expect("no step stop");
    assert_eq!(second.reason, StopReason::Step);
    assert_eq!(second.line, Some(11));
    assert_eq!(shared.lock().read_local(second.exec, 0, 1), Some(JValue::Int(10)));
    debugger.resume();
    assert_eq!(handle.join().unwrap().unwrap(), JValue::Int(11));
}

const WORKER: &str = "demo/Worker";
const THREAD: &str = "java/lang/Thread";

/// `run()` sleeps, then stores 42 if `currentThread()` is the worker itself.
fn define_worker(vm: &mut ejvm::VM) {
    define_extending(vm, WORKER, THREAD, |w| {
        w.field(PUBLIC, "result", "I");
        w.method(PUBLIC, "<init>", "()V", |code| {
            code.aload(0).invokespecial(THREAD, "<init>", "()V").op(Opcode::Return);
        });
        w.method(PUBLIC, "run", "()V", |code| {
            let other = code.new_label();
            let store = code.new_label();
            code.lconst(5)
                .invokestatic(THREAD, "sleep", "(J)V")
                .aload(0)
                .invokestatic(THREAD, "currentThread", "()Ljava/lang/Thread;")
                .aload(0)
                .branch(Opcode::IfACmpNe, other)
                .iconst(42)
                .branch(Opcode::Goto, store)
                .bind(other)
                .iconst(-1)
                .bind(store)
                .putfield(WORKER, "result", "I")
                .op(Opcode::Return);
        });
        w.method(PUBLIC_STATIC, "compute", "()I", |code| {
            code.new_object(WORKER)
                .op(Opcode::Dup)
                .invokespecial(WORKER, "<init>", "()V")
                .astore(0)
                .aload(0)
                .invokevirtual(WORKER, "start", "()V")
                .aload(0)
                .invokevirtual(WORKER, "join", "()V")
                .aload(0)
                .getfield(WORKER, "result", "I")
                .op(Opcode::IReturn);
        });
    });
}

#[test]
fn started_thread_runs_alongside_its_starter() {
    let (mut vm, _) = new_vm(VMConfig::default().set_slice_budget(50));
    define_worker(&mut vm);
    assert_eq!(vm.invoke_static(WORKER, "compute", "()I", &[]).unwrap(), JValue::Int(42));
    assert!(vm.parked_executions().is_empty());
}

#[test]
fn started_thread_gets_its_own_os_thread_under_shared_vm() {
    let (mut vm, _) = new_vm(VMConfig::default().set_slice_budget(50));
    define_worker(&mut vm);
    let shared = SharedVm::new(vm);
    let handle = shared.spawn_static(WORKER, "compute", "()I", vec![]).unwrap();
    assert_eq!(handle.join().unwrap().unwrap(), JValue::Int(42));
    assert!(shared.lock().parked_executions().is_empty());
}

#[test]
fn run_waits_for_started_threads_and_reports_their_deaths() {
    let (mut vm, console) = new_vm(VMConfig::default());
    let errors = Console::default();
    vm.set_error_console(Box::new(errors.clone()));
    define_extending(&mut vm, "demo/Boom", THREAD, |w| {
        w.method(PUBLIC, "<init>", "()V", |code| {
            code.aload(0).invokespecial(THREAD, "<init>", "()V").op(Opcode::Return);
        });
        w.method(PUBLIC, "run", "()V", |code| {
            code.getstatic("java/lang/System", "out", "Ljava/io/PrintStream;")
                .ldc_string("guest")
                .invokevirtual("java/io/PrintStream", "println", "(Ljava/lang/String;)V")
                .iconst(1)
                .iconst(0)
                .op(Opcode::IDiv)
                .op(Opcode::Pop)
                .op(Opcode::Return);
        });
    });
    define(&mut vm, "demo/Launch", |w| {
        w.method(PUBLIC_STATIC, "main", "([Ljava/lang/String;)V", |code| {
            code.new_object("demo/Boom")
                .op(Opcode::Dup)
                .invokespecial("demo/Boom", "<init>", "()V")
                .invokevirtual("demo/Boom", "start", "()V")
                .getstatic("java/lang/System", "out", "Ljava/io/PrintStream;")
                .ldc_string("main")
                .invokevirtual("java/io/PrintStream", "println", "(Ljava/lang/String;)V")
                .op(Opcode::Return);
        });
    });
    vm.run("demo/Launch", &[]).unwrap();
    assert_eq!(console.text(), "main\nguest\n");
    let report = errors.text();
    assert!(
        report.starts_with("Exception in thread \"Thread-2\" java.lang.ArithmeticException: / by zero\n"),
        "{}",
        report
    );
    assert!(report.contains("\tat demo.Boom.run"), "{}", report);
    assert!(vm.parked_executions().is_empty());
}

#[test]
fn starting_a_thread_twice_is_illegal() {
    let (mut vm, _) = new_vm(VMConfig::default());
    define(&mut vm, "demo/Twice", |w| {
        w.method(PUBLIC_STATIC, "go", "()V", |code| {
            code.new_object(THREAD)
                .op(Opcode::Dup)
                .invokespecial(THREAD, "<init>", "()V")
                .astore(0)
                .aload(0)
                .invokevirtual(THREAD, "start", "()V")
                .aload(0)
                .invokevirtual(THREAD, "start", "()V")
                .op(Opcode::Return);
        });
        w.method(PUBLIC_STATIC, "nap", "(J)V", |code| {
            code.lload(0).invokestatic(THREAD, "sleep", "(J)V").op(Opcode::Return);
        });
    });
    let (class, _, _) = uncaught(vm.invoke_static("demo/Twice", "go", "()V", &[]));
    assert_eq!(class, "java.lang.IllegalThreadStateException");

    let (class, message, _) = uncaught(vm.invoke_static("demo/Twice", "nap", "(J)V", &[JValue::Long(-1)]));
    assert_eq!(class, "java.lang.IllegalArgumentException");
    assert_eq!(message.as_deref(), Some("timeout value is negative"));
}
