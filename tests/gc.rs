mod common;

use common::*;
use ejvm::memory::KB;
use ejvm::object::array::ArrayType;
use ejvm::{JValue, Opcode, VMConfig, VM};

const OBJECT: &str = "java/lang/Object";

/// `keep[i] = String.valueOf(i)` for i in 0..100, with an `int[16]` of
/// garbage per iteration, then the summed lengths of everything kept.
fn define_churn(vm: &mut VM) {
    define(vm, "demo/Churn", |w| {
        w.method(PUBLIC_STATIC, "run", "()I", |code| {
            let fill = code.new_label();
            let filled = code.new_label();
            let sum = code.new_label();
            let summed = code.new_label();
            code.iconst(100)
                .anewarray(OBJECT)
                .astore(0)
                .iconst(0)
                .istore(1)
                .bind(fill)
                .iload(1)
                .iconst(100)
                .branch(Opcode::IfICmpGe, filled)
                .iconst(16)
                .newarray(ArrayType::Int)
                .op(Opcode::Pop)
                .aload(0)
                .iload(1)
                .iload(1)
                .invokestatic("java/lang/String", "valueOf", "(I)Ljava/lang/String;")
                .op(Opcode::AAStore)
                .iinc(1, 1)
                .branch(Opcode::Goto, fill)
                .bind(filled)
                .iconst(0)
                .istore(2)
                .iconst(0)
                .istore(1)
                .bind(sum)
                .iload(1)
                .iconst(100)
                .branch(Opcode::IfICmpGe, summed)
                .iload(2)
                .aload(0)
                .iload(1)
                .op(Opcode::AALoad)
                .checkcast("java/lang/String")
                .invokevirtual("java/lang/String", "length", "()I")
                .op(Opcode::IAdd)
                .istore(2)
                .iinc(1, 1)
                .branch(Opcode::Goto, sum)
                .bind(summed)
                .iload(2)
                .op(Opcode::IReturn);
        });
    });
}

#[test]
fn collecting_on_every_allocation_keeps_reachable_objects() {
    let (mut vm, _) = new_vm(VMConfig::default().set_gc_stress(Some(1)));
    define_churn(&mut vm);
    assert_eq!(vm.invoke_static("demo/Churn", "run", "()I", &[]).unwrap(), JValue::Int(190));
    assert!(vm.heap_stats().collections > 100);
}

#[test]
fn garbage_is_reclaimed_under_a_small_threshold() {
    let (mut vm, _) = new_vm(VMConfig::default().set_gc_threshold(4 * KB));
    define_churn(&mut vm);
    for _ in 0..5 {
        assert_eq!(vm.invoke_static("demo/Churn", "run", "()I", &[]).unwrap(), JValue::Int(190));
    }
    let stats = vm.heap_stats();
    assert!(stats.collections > 0);
    assert!(stats.total_freed > 0);
    assert!(stats.live_bytes <= stats.limit);
}

#[test]
fn out_of_memory_is_catchable() {
    let (mut vm, _) = new_vm(
        VMConfig::default()
            .set_heap_limit(1024 * KB)
            .set_gc_threshold(256 * KB),
    );
    define(&mut vm, "demo/Hog", |w| {
        w.method(PUBLIC_STATIC, "hog", "()I", |code| {
            let start = code.new_label();
            let end = code.new_label();
            let handler = code.new_label();
            code.op(Opcode::AConstNull)
                .astore(0)
                .bind(start)
                .iconst(2)
                .anewarray(OBJECT)
                .op(Opcode::Dup)
                .iconst(0)
                .aload(0)
                .op(Opcode::AAStore)
                .op(Opcode::Dup)
                .iconst(1)
                .iconst(64 * 1024)
                .newarray(ArrayType::Int)
                .op(Opcode::AAStore)
                .astore(0)
                .branch(Opcode::Goto, start)
                .bind(end);
            code.bind(handler)
                .op(Opcode::Pop)
                .op(Opcode::AConstNull)
                .astore(0)
                .iconst(7)
                .op(Opcode::IReturn);
            code.try_catch(start, end, handler, Some("java/lang/OutOfMemoryError"));
        });
    });
    assert_eq!(vm.invoke_static("demo/Hog", "hog", "()I", &[]).unwrap(), JValue::Int(7));
    vm.collect_garbage();
    assert!(vm.heap_stats().live_bytes < 256 * KB);
}

#[test]
fn pinned_host_objects_survive_collection() {
    let (mut vm, _) = new_vm(VMConfig::default());
    define(&mut vm, "demo/Tick", |w| {
        w.method(PUBLIC_STATIC, "tick", "()V", |code| {
            code.op(Opcode::Return);
        });
    });
    let kept = vm.new_string("kept").unwrap();
    let dropped = vm.new_string("dropped").unwrap();
    vm.pin(kept);
    // running any bytecode ends the grace period of fresh host objects
    vm.invoke_static("demo/Tick", "tick", "()V", &[]).unwrap();
    vm.collect_garbage();
    assert!(vm.is_live(kept));
    assert!(!vm.is_live(dropped));
    assert_eq!(vm.string_value(kept).as_deref(), Some("kept"));

    vm.unpin(kept);
    vm.collect_garbage();
    assert!(!vm.is_live(kept));
}

#[test]
fn deep_recursion_leaves_a_clean_stack() {
    let (mut vm, _) = new_vm(VMConfig::default());
    define(&mut vm, "demo/Depth", |w| {
        w.method(PUBLIC_STATIC, "down", "(I)I", |code| {
            let bottom = code.new_label();
            code.iload(0)
                .branch(Opcode::IfEq, bottom)
                .iload(0)
                .iconst(1)
                .op(Opcode::ISub)
                .invokestatic("demo/Depth", "down", "(I)I")
                .iconst(1)
                .op(Opcode::IAdd)
                .op(Opcode::IReturn)
                .bind(bottom)
                .iconst(0)
                .op(Opcode::IReturn);
        });
    });
    let result = vm.invoke_static("demo/Depth", "down", "(I)I", &[JValue::Int(2000)]);
    assert_eq!(result.unwrap(), JValue::Int(2000));
    assert_eq!(vm.stack_depth(ejvm::MAIN_EXECUTION), 0);
}
