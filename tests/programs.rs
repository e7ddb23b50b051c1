mod common;

use common::*;
use ejvm::{JValue, Opcode, VMConfig, VMError, MAIN_EXECUTION};

const OUT: &str = "Ljava/io/PrintStream;";
const PRINT_STREAM: &str = "java/io/PrintStream";
const BUILDER: &str = "java/lang/StringBuilder";

#[test]
fn main_prints_its_arguments() {
    let (mut vm, console) = new_vm(VMConfig::default());
    define(&mut vm, "demo/Hello", |w| {
        w.method(PUBLIC_STATIC, "main", "([Ljava/lang/String;)V", |code| {
            code.getstatic("java/lang/System", "out", OUT)
                .new_object(BUILDER)
                .op(Opcode::Dup)
                .invokespecial(BUILDER, "<init>", "()V")
                .ldc_string("hello, ")
                .invokevirtual(BUILDER, "append", "(Ljava/lang/String;)Ljava/lang/StringBuilder;")
                .aload(0)
                .iconst(0)
                .op(Opcode::AALoad)
                .invokevirtual(BUILDER, "append", "(Ljava/lang/String;)Ljava/lang/StringBuilder;")
                .iconst(42)
                .invokevirtual(BUILDER, "append", "(I)Ljava/lang/StringBuilder;")
                .invokevirtual(BUILDER, "toString", "()Ljava/lang/String;")
                .invokevirtual(PRINT_STREAM, "println", "(Ljava/lang/String;)V")
                .op(Opcode::Return);
        });
    });
    vm.run("demo/Hello", &["world"]).unwrap();
    assert_eq!(console.text(), "hello, world42\n");
    assert_eq!(vm.stack_depth(MAIN_EXECUTION), 0);
}

#[test]
fn uncaught_division_by_zero_reports_location() {
    let (mut vm, _) = new_vm(VMConfig::default());
    define(&mut vm, "demo/Crash", |w| {
        w.source_file("Crash.java");
        w.method(PUBLIC_STATIC, "main", "([Ljava/lang/String;)V", |code| {
            code.line(3)
                .iconst(1)
                .iconst(0)
                .op(Opcode::IDiv)
                .op(Opcode::Pop)
                .op(Opcode::Return);
        });
        w.method(PUBLIC_STATIC, "fine", "()I", |code| {
            code.iconst(5).op(Opcode::IReturn);
        });
    });
    match vm.run("demo/Crash", &[]) {
        Err(VMError::UncaughtException {
            class_name,
            message,
            stack_trace,
        }) => {
            assert_eq!(class_name, "java.lang.ArithmeticException");
            assert_eq!(message.as_deref(), Some("/ by zero"));
            assert_eq!(stack_trace, vec!["demo.Crash.main(Crash.java:3)"]);
        }
        other => panic!("unexpected {:?}", other),
    }
    // the VM stays usable
    assert_eq!(vm.invoke_static("demo/Crash", "fine", "()I", &[]).unwrap(), JValue::Int(5));
}

#[test]
fn array_index_message_names_index_and_length() {
    let (mut vm, _) = new_vm(VMConfig::default());
    define(&mut vm, "demo/Bounds", |w| {
        w.method(PUBLIC_STATIC, "read", "(I)I", |code| {
            code.iconst(4)
                .newarray(ejvm::object::array::ArrayType::Int)
                .iload(0)
                .op(Opcode::IALoad)
                .op(Opcode::IReturn);
        });
    });
    assert_eq!(
        vm.invoke_static("demo/Bounds", "read", "(I)I", &[JValue::Int(3)]).unwrap(),
        JValue::Int(0)
    );
    let (class, message, _) = uncaught(vm.invoke_static("demo/Bounds", "read", "(I)I", &[JValue::Int(-1)]));
    assert_eq!(class, "java.lang.ArrayIndexOutOfBoundsException");
    assert_eq!(message.as_deref(), Some("Index -1 out of bounds for length 4"));
}

#[test]
fn superclass_initializes_first_and_once() {
    let (mut vm, console) = new_vm(VMConfig::default());
    define(&mut vm, "demo/Base", |w| {
        w.field(STATIC, "ready", "I");
        w.method(STATIC, "<clinit>", "()V", |code| {
            code.getstatic("java/lang/System", "out", OUT)
                .ldc_string("Base init")
                .invokevirtual(PRINT_STREAM, "println", "(Ljava/lang/String;)V")
                .iconst(1)
                .putstatic("demo/Base", "ready", "I")
                .op(Opcode::Return);
        });
    });
    define_extending(&mut vm, "demo/Derived", "demo/Base", |w| {
        w.field(STATIC, "copy", "I");
        w.method(STATIC, "<clinit>", "()V", |code| {
            code.getstatic("java/lang/System", "out", OUT)
                .ldc_string("Derived init")
                .invokevirtual(PRINT_STREAM, "println", "(Ljava/lang/String;)V")
                .getstatic("demo/Base", "ready", "I")
                .putstatic("demo/Derived", "copy", "I")
                .op(Opcode::Return);
        });
        w.method(PUBLIC_STATIC, "touch", "()I", |code| {
            code.getstatic("demo/Derived", "copy", "I").op(Opcode::IReturn);
        });
    });
    assert_eq!(vm.invoke_static("demo/Derived", "touch", "()I", &[]).unwrap(), JValue::Int(1));
    assert_eq!(vm.invoke_static("demo/Derived", "touch", "()I", &[]).unwrap(), JValue::Int(1));
    assert_eq!(console.text(), "Base init\nDerived init\n");
    assert_eq!(vm.get_static("demo/Derived", "ready").unwrap(), JValue::Int(1));
}

#[test]
fn mutually_dependent_initializers_run_once() {
    let (mut vm, console) = new_vm(VMConfig::default());
    define(&mut vm, "demo/Ping", |w| {
        w.field(STATIC, "value", "I");
        w.method(STATIC, "<clinit>", "()V", |code| {
            code.getstatic("java/lang/System", "out", OUT)
                .ldc_string("Ping init")
                .invokevirtual(PRINT_STREAM, "println", "(Ljava/lang/String;)V")
                // reads its own static while initializing
                .getstatic("demo/Ping", "value", "I")
                .getstatic("demo/Pong", "value", "I")
                .op(Opcode::IAdd)
                .iconst(1)
                .op(Opcode::IAdd)
                .putstatic("demo/Ping", "value", "I")
                .op(Opcode::Return);
        });
        w.method(PUBLIC_STATIC, "get", "()I", |code| {
            code.getstatic("demo/Ping", "value", "I").op(Opcode::IReturn);
        });
    });
    define(&mut vm, "demo/Pong", |w| {
        w.field(STATIC, "value", "I");
        w.method(STATIC, "<clinit>", "()V", |code| {
            code.getstatic("java/lang/System", "out", OUT)
                .ldc_string("Pong init")
                .invokevirtual(PRINT_STREAM, "println", "(Ljava/lang/String;)V")
                .getstatic("demo/Ping", "value", "I")
                .iconst(10)
                .op(Opcode::IAdd)
                .putstatic("demo/Pong", "value", "I")
                .op(Opcode::Return);
        });
    });
    assert_eq!(vm.invoke_static("demo/Ping", "get", "()I", &[]).unwrap(), JValue::Int(11));
    assert_eq!(vm.invoke_static("demo/Ping", "get", "()I", &[]).unwrap(), JValue::Int(11));
    assert_eq!(vm.get_static("demo/Pong", "value").unwrap(), JValue::Int(10));
    assert_eq!(console.text(), "Ping init\nPong init\n");
}

#[test]
fn failed_superclass_init_fails_the_subclass() {
    let (mut vm, _) = new_vm(VMConfig::default());
    define(&mut vm, "demo/Broken", |w| {
        w.field(STATIC, "base", "I");
        w.method(STATIC, "<clinit>", "()V", |code| {
            code.iconst(1)
                .iconst(0)
                .op(Opcode::IDiv)
                .putstatic("demo/Broken", "base", "I")
                .op(Opcode::Return);
        });
    });
    define_extending(&mut vm, "demo/Leaf", "demo/Broken", |w| {
        w.field(STATIC, "count", "I");
        w.method(PUBLIC_STATIC, "touch", "()I", |code| {
            code.getstatic("demo/Leaf", "count", "I").op(Opcode::IReturn);
        });
    });
    let (class, _, _) = uncaught(vm.invoke_static("demo/Leaf", "touch", "()I", &[]));
    assert_eq!(class, "java.lang.ArithmeticException");
    let (class, message, _) = uncaught(vm.invoke_static("demo/Leaf", "touch", "()I", &[]));
    assert_eq!(class, "java.lang.NoClassDefFoundError");
    assert_eq!(message.as_deref(), Some("Could not initialize class demo.Leaf"));
}

#[test]
fn class_for_name_returns_one_mirror() {
    let (mut vm, _) = new_vm(VMConfig::default());
    define(&mut vm, "demo/Target", |_| {});
    define(&mut vm, "demo/Lookup", |w| {
        w.method(PUBLIC_STATIC, "same", "(Ljava/lang/String;)Z", |code| {
            let equal = code.new_label();
            code.aload(0)
                .invokestatic("java/lang/Class", "forName", "(Ljava/lang/String;)Ljava/lang/Class;")
                .aload(0)
                .invokestatic("java/lang/Class", "forName", "(Ljava/lang/String;)Ljava/lang/Class;")
                .branch(Opcode::IfACmpEq, equal)
                .iconst(0)
                .op(Opcode::IReturn)
                .bind(equal)
                .iconst(1)
                .op(Opcode::IReturn);
        });
        w.method(PUBLIC_STATIC, "name", "(Ljava/lang/String;)Ljava/lang/String;", |code| {
            code.aload(0)
                .invokestatic("java/lang/Class", "forName", "(Ljava/lang/String;)Ljava/lang/Class;")
                .invokevirtual("java/lang/Class", "getName", "()Ljava/lang/String;")
                .op(Opcode::AReturn);
        });
    });
    let name = vm.new_string("demo.Target").unwrap();
    let result = vm.invoke_static("demo/Lookup", "same", "(Ljava/lang/String;)Z", &[JValue::Object(Some(name))]);
    assert_eq!(result.unwrap(), JValue::Int(1));

    let name = vm.new_string("demo.Target").unwrap();
    let result = vm.invoke_static(
        "demo/Lookup",
        "name",
        "(Ljava/lang/String;)Ljava/lang/String;",
        &[JValue::Object(Some(name))],
    );
    assert_eq!(string_of(&vm, result.unwrap()).as_deref(), Some("demo.Target"));

    let missing = vm.new_string("demo.Missing").unwrap();
    let (class, message, _) = uncaught(vm.invoke_static(
        "demo/Lookup",
        "same",
        "(Ljava/lang/String;)Z",
        &[JValue::Object(Some(missing))],
    ));
    assert_eq!(class, "java.lang.ClassNotFoundException");
    assert_eq!(message.as_deref(), Some("demo.Missing"));
}

#[test]
fn overrides_win_virtual_dispatch() {
    let (mut vm, _) = new_vm(VMConfig::default());
    define(&mut vm, "demo/Animal", |w| {
        w.method(PUBLIC, "<init>", "()V", |code| {
            code.aload(0)
                .invokespecial("java/lang/Object", "<init>", "()V")
                .op(Opcode::Return);
        });
        w.method(PUBLIC, "speak", "()Ljava/lang/String;", |code| {
            code.ldc_string("...").op(Opcode::AReturn);
        });
        w.method(PUBLIC, "describe", "()Ljava/lang/String;", |code| {
            code.aload(0)
                .invokevirtual("demo/Animal", "speak", "()Ljava/lang/String;")
                .op(Opcode::AReturn);
        });
    });
    define_extending(&mut vm, "demo/Dog", "demo/Animal", |w| {
        w.method(PUBLIC, "<init>", "()V", |code| {
            code.aload(0)
                .invokespecial("demo/Animal", "<init>", "()V")
                .op(Opcode::Return);
        });
        w.method(PUBLIC, "speak", "()Ljava/lang/String;", |code| {
            code.ldc_string("woof").op(Opcode::AReturn);
        });
        w.method(PUBLIC_STATIC, "make", "()Ldemo/Animal;", |code| {
            code.new_object("demo/Dog")
                .op(Opcode::Dup)
                .invokespecial("demo/Dog", "<init>", "()V")
                .op(Opcode::AReturn);
        });
    });
    let JValue::Object(Some(dog)) = vm.invoke_static("demo/Dog", "make", "()Ldemo/Animal;", &[]).unwrap() else {
        panic!("make returned null");
    };
    vm.pin(dog);
    assert_eq!(vm.class_name_of(dog).as_deref(), Some("demo.Dog"));
    let said = vm.invoke_virtual(dog, "describe", "()Ljava/lang/String;", &[]).unwrap();
    assert_eq!(string_of(&vm, said).as_deref(), Some("woof"));
    vm.unpin(dog);
}

#[test]
fn wide_arguments_take_two_slots() {
    let (mut vm, _) = new_vm(VMConfig::default());
    define(&mut vm, "demo/Mix", |w| {
        w.method(PUBLIC_STATIC, "mix", "(IJDLjava/lang/String;)I", |code| {
            code.iload(0)
                .lload(1)
                .op(Opcode::L2I)
                .op(Opcode::IAdd)
                .dload(3)
                .op(Opcode::D2I)
                .op(Opcode::IAdd)
                .aload(5)
                .invokevirtual("java/lang/String", "length", "()I")
                .op(Opcode::IAdd)
                .op(Opcode::IReturn);
        });
        w.method(PUBLIC_STATIC, "call", "()I", |code| {
            code.iconst(1)
                .lconst(10)
                .dconst(100.9)
                .ldc_string("four")
                .invokestatic("demo/Mix", "mix", "(IJDLjava/lang/String;)I")
                .op(Opcode::IReturn);
        });
    });
    assert_eq!(vm.invoke_static("demo/Mix", "call", "()I", &[]).unwrap(), JValue::Int(115));

    let text = vm.new_string("seven!!").unwrap();
    let direct = vm.invoke_static(
        "demo/Mix",
        "mix",
        "(IJDLjava/lang/String;)I",
        &[JValue::Int(2), JValue::Long(20), JValue::Double(-0.5), JValue::Object(Some(text))],
    );
    assert_eq!(direct.unwrap(), JValue::Int(29));
}

#[test]
fn exceptions_unwind_to_an_outer_handler() {
    let (mut vm, _) = new_vm(VMConfig::default());
    define(&mut vm, "demo/Thrower", |w| {
        w.method(PUBLIC_STATIC, "fail", "()V", |code| {
            code.new_object("java/lang/IllegalArgumentException")
                .op(Opcode::Dup)
                .ldc_string("bad")
                .invokespecial("java/lang/IllegalArgumentException", "<init>", "(Ljava/lang/String;)V")
                .op(Opcode::AThrow);
        });
        w.method(PUBLIC_STATIC, "middle", "()V", |code| {
            code.invokestatic("demo/Thrower", "fail", "()V").op(Opcode::Return);
        });
        w.method(PUBLIC_STATIC, "guard", "()Ljava/lang/String;", |code| {
            let start = code.new_label();
            let end = code.new_label();
            let handler = code.new_label();
            code.bind(start)
                .invokestatic("demo/Thrower", "middle", "()V")
                .bind(end)
                .op(Opcode::AConstNull)
                .op(Opcode::AReturn);
            code.bind(handler)
                .invokevirtual("java/lang/Throwable", "getMessage", "()Ljava/lang/String;")
                .op(Opcode::AReturn);
            code.try_catch(start, end, handler, Some("java/lang/RuntimeException"));
        });
    });
    let message = vm.invoke_static("demo/Thrower", "guard", "()Ljava/lang/String;", &[]).unwrap();
    assert_eq!(string_of(&vm, message).as_deref(), Some("bad"));
    assert_eq!(vm.stack_depth(MAIN_EXECUTION), 0);

    let (class, message, trace) = uncaught(vm.invoke_static("demo/Thrower", "middle", "()V", &[]));
    assert_eq!(class, "java.lang.IllegalArgumentException");
    assert_eq!(message.as_deref(), Some("bad"));
    assert_eq!(trace.len(), 2);
}

#[test]
fn string_literals_are_interned() {
    let (mut vm, _) = new_vm(VMConfig::default());
    define(&mut vm, "demo/Strings", |w| {
        w.method(PUBLIC_STATIC, "internedConcat", "()I", |code| {
            let same = code.new_label();
            code.ldc_string("ab")
                .ldc_string("a")
                .ldc_string("b")
                .invokevirtual("java/lang/String", "concat", "(Ljava/lang/String;)Ljava/lang/String;")
                .invokevirtual("java/lang/String", "intern", "()Ljava/lang/String;")
                .branch(Opcode::IfACmpEq, same)
                .iconst(0)
                .op(Opcode::IReturn)
                .bind(same)
                .iconst(1)
                .op(Opcode::IReturn);
        });
        w.method(PUBLIC_STATIC, "freshConcat", "()I", |code| {
            let differ = code.new_label();
            code.ldc_string("ab")
                .ldc_string("a")
                .ldc_string("b")
                .invokevirtual("java/lang/String", "concat", "(Ljava/lang/String;)Ljava/lang/String;")
                .branch(Opcode::IfACmpNe, differ)
                .iconst(0)
                .op(Opcode::IReturn)
                .bind(differ)
                .iconst(1)
                .op(Opcode::IReturn);
        });
        w.method(PUBLIC_STATIC, "literal", "()Ljava/lang/String;", |code| {
            code.ldc_string("ab").op(Opcode::AReturn);
        });
    });
    define(&mut vm, "demo/Other", |w| {
        w.method(PUBLIC_STATIC, "literal", "()Ljava/lang/String;", |code| {
            code.ldc_string("ab").op(Opcode::AReturn);
        });
    });
    assert_eq!(vm.invoke_static("demo/Strings", "internedConcat", "()I", &[]).unwrap(), JValue::Int(1));
    assert_eq!(vm.invoke_static("demo/Strings", "freshConcat", "()I", &[]).unwrap(), JValue::Int(1));
    let a = vm.invoke_static("demo/Strings", "literal", "()Ljava/lang/String;", &[]).unwrap();
    let b = vm.invoke_static("demo/Other", "literal", "()Ljava/lang/String;", &[]).unwrap();
    assert_eq!(a, b);
}

#[test]
fn floating_point_prints_like_java() {
    let (mut vm, console) = new_vm(VMConfig::default());
    define(&mut vm, "demo/Floats", |w| {
        w.method(PUBLIC_STATIC, "show", "()V", |code| {
            code.getstatic("java/lang/System", "out", OUT)
                .dconst(0.1)
                .dconst(0.2)
                .op(Opcode::DAdd)
                .invokevirtual(PRINT_STREAM, "println", "(D)V")
                .getstatic("java/lang/System", "out", OUT)
                .fconst(1.0)
                .invokevirtual(PRINT_STREAM, "println", "(F)V")
                .getstatic("java/lang/System", "out", OUT)
                .dconst(1e10)
                .invokevirtual(PRINT_STREAM, "println", "(D)V")
                .getstatic("java/lang/System", "out", OUT)
                .dconst(0.0)
                .dconst(0.0)
                .op(Opcode::DDiv)
                .invokevirtual(PRINT_STREAM, "println", "(D)V")
                .op(Opcode::Return);
        });
    });
    vm.invoke_static("demo/Floats", "show", "()V", &[]).unwrap();
    assert_eq!(console.text(), "0.30000000000000004\n1.0\n1.0E10\nNaN\n");

    let sqrt = vm.invoke_static("java/lang/Math", "sqrt", "(D)D", &[JValue::Double(-1.0)]).unwrap();
    assert!(matches!(sqrt, JValue::Double(d) if d.is_nan()));
    let bits = vm
        .invoke_static(
            "java/lang/Float",
            "floatToIntBits",
            "(F)I",
            &[JValue::Float(f32::from_bits(0x7fc0_1234))],
        )
        .unwrap();
    assert_eq!(bits, JValue::Int(0x7fc0_0000));
}

#[test]
fn monitors_nest_and_check_ownership() {
    let (mut vm, _) = new_vm(VMConfig::default());
    define(&mut vm, "demo/Locks", |w| {
        w.method(PUBLIC_STATIC, "twice", "()I", |code| {
            code.new_object("java/lang/Object")
                .op(Opcode::Dup)
                .invokespecial("java/lang/Object", "<init>", "()V")
                .astore(0)
                .aload(0)
                .op(Opcode::MonitorEnter)
                .aload(0)
                .op(Opcode::MonitorEnter)
                .aload(0)
                .op(Opcode::MonitorExit)
                .aload(0)
                .op(Opcode::MonitorExit)
                .iconst(7)
                .op(Opcode::IReturn);
        });
        w.method(PUBLIC_STATIC, "unowned", "()V", |code| {
            code.new_object("java/lang/Object")
                .op(Opcode::Dup)
                .invokespecial("java/lang/Object", "<init>", "()V")
                .op(Opcode::MonitorExit)
                .op(Opcode::Return);
        });
        w.method(PUBLIC_STATIC, "null", "()V", |code| {
            code.op(Opcode::AConstNull).op(Opcode::MonitorEnter).op(Opcode::Return);
        });
    });
    assert_eq!(vm.invoke_static("demo/Locks", "twice", "()I", &[]).unwrap(), JValue::Int(7));
    let (class, _, _) = uncaught(vm.invoke_static("demo/Locks", "unowned", "()V", &[]));
    assert_eq!(class, "java.lang.IllegalMonitorStateException");
    let (class, _, _) = uncaught(vm.invoke_static("demo/Locks", "null", "()V", &[]));
    assert_eq!(class, "java.lang.NullPointerException");
}

#[test]
fn missing_class_is_a_host_error() {
    let (mut vm, _) = new_vm(VMConfig::default());
    match vm.run("demo/Nowhere", &[]) {
        Err(VMError::ClassLoaderErr(ejvm::ClassLoadErr::NotFound(name))) => assert_eq!(name, "demo/Nowhere"),
        other => panic!("unexpected {:?}", other),
    }
}
