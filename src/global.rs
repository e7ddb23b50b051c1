//! The bootstrap library: the handful of `java/lang` and `java/io` classes
//! every program needs, assembled in memory and searched before the user
//! class path.

use crate::classfile::class_loader::MemoryClassPath;
use crate::classfile::writer::{ClassWriter, CodeWriter};
use crate::classfile::ClassLoadErr;
use crate::object::array::ArrayType;
use crate::object::prelude::*;
use crate::runtime::exception::ExceptionKind;
use crate::runtime::linker::ClassRegistry;
use crate::runtime::opcode::Opcode;
use crate::vm::VMError;

const PUBLIC: u16 = 0x0001;
const PRIVATE: u16 = 0x0002;
const PROTECTED: u16 = 0x0004;
const STATIC: u16 = 0x0008;
const FINAL: u16 = 0x0010;
const ABSTRACT: u16 = 0x0400;

const OBJECT: &str = "java/lang/Object";
const STRING: &str = "java/lang/String";
const PRINT_STREAM: &str = "java/io/PrintStream";
const THREAD: &str = "java/lang/Thread";
const RUNNABLE: &str = "java/lang/Runnable";

macro_rules! bootstrap_classes {
    ($($name:literal => $build:ident),* $(,)?) => {
        /// Names of the classes assembled at startup, exceptions excluded.
        pub const BOOTSTRAP_CLASSES: &[&str] = &[$($name),*];

        fn build_core_classes(path: &mut MemoryClassPath) -> Result<(), ClassLoadErr> {
            $(
                let mut writer = $build();
                path.add_class($name, writer_bytes(&mut writer)?);
            )*
            Ok(())
        }
    };
}

bootstrap_classes! {
    "java/lang/Object" => object_class,
    "java/lang/Class" => class_class,
    "java/lang/String" => string_class,
    "java/lang/StringBuilder" => string_builder_class,
    "java/lang/Cloneable" => cloneable_interface,
    "java/io/Serializable" => serializable_interface,
    "java/lang/Throwable" => throwable_class,
    "java/lang/System" => system_class,
    "java/lang/Math" => math_class,
    "java/lang/Float" => float_class,
    "java/lang/Double" => double_class,
    "java/lang/Runnable" => runnable_interface,
    "java/lang/Thread" => thread_class,
    "java/io/PrintStream" => print_stream_class,
}

fn writer_bytes(writer: &mut ClassWriter) -> Result<Vec<u8>, ClassLoadErr> {
    writer.source_file("<bootstrap>");
    writer.to_bytes()
}

/// Class path entry holding the bootstrap library.
pub fn bootstrap_class_path() -> Result<MemoryClassPath, ClassLoadErr> {
    let mut path = MemoryClassPath::new();
    build_core_classes(&mut path)?;
    for kind in ExceptionKind::ALL {
        let mut writer = exception_class(kind.class_name(), kind.super_class_name());
        path.add_class(kind.class_name(), writer_bytes(&mut writer)?);
    }
    log::debug!(
        "bootstrap library: {} classes",
        BOOTSTRAP_CLASSES.len() + ExceptionKind::ALL.len()
    );
    Ok(path)
}

fn return_self_init(code: &mut CodeWriter, super_class: &str) {
    code.aload(0)
        .invokespecial(super_class, "<init>", "()V")
        .op(Opcode::Return);
}

fn object_class() -> ClassWriter {
    let mut w = ClassWriter::new(OBJECT, None);
    w.method(PUBLIC, "<init>", "()V", |code| {
        code.op(Opcode::Return);
    });
    w.method(PUBLIC, "equals", "(Ljava/lang/Object;)Z", |code| {
        let differ = code.new_label();
        code.aload(0)
            .aload(1)
            .branch(Opcode::IfACmpNe, differ)
            .iconst(1)
            .op(Opcode::IReturn)
            .bind(differ)
            .iconst(0)
            .op(Opcode::IReturn);
    });
    w.native_method(PUBLIC, "hashCode", "()I")
        .native_method(PUBLIC | FINAL, "getClass", "()Ljava/lang/Class;")
        .native_method(PROTECTED, "clone", "()Ljava/lang/Object;")
        .native_method(PUBLIC, "toString", "()Ljava/lang/String;")
        .native_method(PUBLIC | FINAL, "notify", "()V")
        .native_method(PUBLIC | FINAL, "notifyAll", "()V");
    w
}

fn class_class() -> ClassWriter {
    let mut w = ClassWriter::new("java/lang/Class", Some(OBJECT));
    w.access_flags(PUBLIC | FINAL)
        .field(PRIVATE | FINAL, "classId", "I")
        .native_method(PUBLIC, "getName", "()Ljava/lang/String;")
        .native_method(PUBLIC | STATIC, "forName", "(Ljava/lang/String;)Ljava/lang/Class;")
        .native_method(PUBLIC, "isInstance", "(Ljava/lang/Object;)Z")
        .native_method(PUBLIC, "isArray", "()Z")
        .native_method(PUBLIC, "isInterface", "()Z")
        .native_method(PUBLIC, "getSuperclass", "()Ljava/lang/Class;");
    w
}

fn string_class() -> ClassWriter {
    let mut w = ClassWriter::new(STRING, Some(OBJECT));
    w.access_flags(PUBLIC | FINAL)
        .implements("java/io/Serializable")
        .field(PRIVATE | FINAL, "value", "[B")
        .field(PRIVATE | FINAL, "coder", "B")
        .field(PRIVATE, "hash", "I");
    w.method(PUBLIC, "<init>", "()V", |code| {
        code.aload(0)
            .invokespecial(OBJECT, "<init>", "()V")
            .aload(0)
            .iconst(0)
            .newarray(ArrayType::Byte)
            .putfield(STRING, "value", "[B")
            .op(Opcode::Return);
    });
    w.method(PUBLIC, "toString", "()Ljava/lang/String;", |code| {
        code.aload(0).op(Opcode::AReturn);
    });
    w.method(PUBLIC | STATIC, "valueOf", "(Ljava/lang/Object;)Ljava/lang/String;", |code| {
        let present = code.new_label();
        code.aload(0)
            .branch(Opcode::IfNonNull, present)
            .ldc_string("null")
            .op(Opcode::AReturn)
            .bind(present)
            .aload(0)
            .invokevirtual(OBJECT, "toString", "()Ljava/lang/String;")
            .op(Opcode::AReturn);
    });
    w.native_method(PUBLIC, "length", "()I")
        .native_method(PUBLIC, "isEmpty", "()Z")
        .native_method(PUBLIC, "charAt", "(I)C")
        .native_method(PUBLIC, "equals", "(Ljava/lang/Object;)Z")
        .native_method(PUBLIC, "hashCode", "()I")
        .native_method(PUBLIC, "intern", "()Ljava/lang/String;")
        .native_method(PUBLIC, "concat", "(Ljava/lang/String;)Ljava/lang/String;");
    for primitive in ["I", "J", "F", "D", "Z", "C"] {
        let descriptor = format!("({})Ljava/lang/String;", primitive);
        w.native_method(PUBLIC | STATIC, "valueOf", &descriptor);
    }
    w
}

/// Appends go through `String.valueOf` and `String.concat`, so the class
/// needs no natives of its own.
fn string_builder_class() -> ClassWriter {
    const BUILDER: &str = "java/lang/StringBuilder";
    const SELF: &str = "Ljava/lang/StringBuilder;";
    let mut w = ClassWriter::new(BUILDER, Some(OBJECT));
    w.access_flags(PUBLIC | FINAL)
        .field(PRIVATE, "text", "Ljava/lang/String;");
    w.method(PUBLIC, "<init>", "()V", |code| {
        code.aload(0)
            .invokespecial(OBJECT, "<init>", "()V")
            .aload(0)
            .ldc_string("")
            .putfield(BUILDER, "text", "Ljava/lang/String;")
            .op(Opcode::Return);
    });
    w.method(PUBLIC, "<init>", "(Ljava/lang/String;)V", |code| {
        code.aload(0)
            .invokespecial(BUILDER, "<init>", "()V")
            .aload(0)
            .aload(1)
            .invokevirtual(BUILDER, "append", &format!("(Ljava/lang/String;){}", SELF))
            .op(Opcode::Pop)
            .op(Opcode::Return);
    });
    w.method(PUBLIC, "append", &format!("(Ljava/lang/String;){}", SELF), |code| {
        code.aload(0)
            .aload(0)
            .getfield(BUILDER, "text", "Ljava/lang/String;")
            .aload(1)
            .invokestatic(STRING, "valueOf", "(Ljava/lang/Object;)Ljava/lang/String;")
            .invokevirtual(STRING, "concat", "(Ljava/lang/String;)Ljava/lang/String;")
            .putfield(BUILDER, "text", "Ljava/lang/String;")
            .aload(0)
            .op(Opcode::AReturn);
    });
    w.method(PUBLIC, "append", &format!("(Ljava/lang/Object;){}", SELF), |code| {
        code.aload(0)
            .aload(1)
            .invokestatic(STRING, "valueOf", "(Ljava/lang/Object;)Ljava/lang/String;")
            .invokevirtual(BUILDER, "append", &format!("(Ljava/lang/String;){}", SELF))
            .op(Opcode::AReturn);
    });
    for (primitive, load) in [
        ("I", Opcode::ILoad1),
        ("C", Opcode::ILoad1),
        ("Z", Opcode::ILoad1),
        ("J", Opcode::LLoad1),
        ("F", Opcode::FLoad1),
        ("D", Opcode::DLoad1),
    ] {
        w.method(PUBLIC, "append", &format!("({}){}", primitive, SELF), |code| {
            code.aload(0)
                .op(load)
                .invokestatic(STRING, "valueOf", &format!("({})Ljava/lang/String;", primitive))
                .invokevirtual(BUILDER, "append", &format!("(Ljava/lang/String;){}", SELF))
                .op(Opcode::AReturn);
        });
    }
    w.method(PUBLIC, "length", "()I", |code| {
        code.aload(0)
            .getfield(BUILDER, "text", "Ljava/lang/String;")
            .invokevirtual(STRING, "length", "()I")
            .op(Opcode::IReturn);
    });
    w.method(PUBLIC, "toString", "()Ljava/lang/String;", |code| {
        code.aload(0)
            .getfield(BUILDER, "text", "Ljava/lang/String;")
            .op(Opcode::AReturn);
    });
    w
}

fn cloneable_interface() -> ClassWriter {
    ClassWriter::interface("java/lang/Cloneable")
}

fn serializable_interface() -> ClassWriter {
    ClassWriter::interface("java/io/Serializable")
}

fn throwable_class() -> ClassWriter {
    const THROWABLE: &str = "java/lang/Throwable";
    let mut w = ClassWriter::new(THROWABLE, Some(OBJECT));
    w.implements("java/io/Serializable")
        .field(PRIVATE, "detailMessage", "Ljava/lang/String;");
    w.method(PUBLIC, "<init>", "()V", |code| return_self_init(code, OBJECT));
    w.method(PUBLIC, "<init>", "(Ljava/lang/String;)V", |code| {
        code.aload(0)
            .invokespecial(OBJECT, "<init>", "()V")
            .aload(0)
            .aload(1)
            .putfield(THROWABLE, "detailMessage", "Ljava/lang/String;")
            .op(Opcode::Return);
    });
    w.method(PUBLIC, "getMessage", "()Ljava/lang/String;", |code| {
        code.aload(0)
            .getfield(THROWABLE, "detailMessage", "Ljava/lang/String;")
            .op(Opcode::AReturn);
    });
    w
}

fn exception_class(name: &str, super_class: &str) -> ClassWriter {
    let mut w = ClassWriter::new(name, Some(super_class));
    w.method(PUBLIC, "<init>", "()V", |code| return_self_init(code, super_class));
    w.method(PUBLIC, "<init>", "(Ljava/lang/String;)V", |code| {
        code.aload(0)
            .aload(1)
            .invokespecial(super_class, "<init>", "(Ljava/lang/String;)V")
            .op(Opcode::Return);
    });
    w
}

fn system_class() -> ClassWriter {
    const SYSTEM: &str = "java/lang/System";
    let mut w = ClassWriter::new(SYSTEM, Some(OBJECT));
    w.access_flags(PUBLIC | FINAL)
        .field(PUBLIC | STATIC | FINAL, "out", "Ljava/io/PrintStream;")
        .field(PUBLIC | STATIC | FINAL, "err", "Ljava/io/PrintStream;");
    w.method(STATIC, "<clinit>", "()V", |code| {
        for (name, fd) in [("out", 1), ("err", 2)] {
            code.new_object(PRINT_STREAM)
                .op(Opcode::Dup)
                .iconst(fd)
                .invokespecial(PRINT_STREAM, "<init>", "(I)V")
                .putstatic(SYSTEM, name, "Ljava/io/PrintStream;");
        }
        code.op(Opcode::Return);
    });
    w.native_method(PUBLIC | STATIC, "arraycopy", "(Ljava/lang/Object;ILjava/lang/Object;II)V")
        .native_method(PUBLIC | STATIC, "identityHashCode", "(Ljava/lang/Object;)I")
        .native_method(PUBLIC | STATIC, "currentTimeMillis", "()J")
        .native_method(PUBLIC | STATIC, "nanoTime", "()J")
        .native_method(PUBLIC | STATIC, "gc", "()V");
    w
}

fn math_class() -> ClassWriter {
    let mut w = ClassWriter::new("java/lang/Math", Some(OBJECT));
    w.access_flags(PUBLIC | FINAL);
    for name in [
        "sin", "cos", "tan", "asin", "acos", "atan", "exp", "log", "log10", "sqrt", "cbrt", "floor",
        "ceil", "rint",
    ] {
        w.native_method(PUBLIC | STATIC, name, "(D)D");
    }
    for name in ["atan2", "pow", "hypot"] {
        w.native_method(PUBLIC | STATIC, name, "(DD)D");
    }
    for t in ["I", "J", "F", "D"] {
        w.native_method(PUBLIC | STATIC, "abs", &format!("({}){}", t, t));
    }
    for t in ["I", "J", "D"] {
        w.native_method(PUBLIC | STATIC, "max", &format!("({}{}){}", t, t, t));
        w.native_method(PUBLIC | STATIC, "min", &format!("({}{}){}", t, t, t));
    }
    w
}

fn float_class() -> ClassWriter {
    let mut w = ClassWriter::new("java/lang/Float", Some(OBJECT));
    w.access_flags(PUBLIC | FINAL)
        .native_method(PUBLIC | STATIC, "floatToRawIntBits", "(F)I")
        .native_method(PUBLIC | STATIC, "floatToIntBits", "(F)I")
        .native_method(PUBLIC | STATIC, "intBitsToFloat", "(I)F")
        .native_method(PUBLIC | STATIC, "isNaN", "(F)Z");
    w
}

fn double_class() -> ClassWriter {
    let mut w = ClassWriter::new("java/lang/Double", Some(OBJECT));
    w.access_flags(PUBLIC | FINAL)
        .native_method(PUBLIC | STATIC, "doubleToRawLongBits", "(D)J")
        .native_method(PUBLIC | STATIC, "doubleToLongBits", "(D)J")
        .native_method(PUBLIC | STATIC, "longBitsToDouble", "(J)D")
        .native_method(PUBLIC | STATIC, "isNaN", "(D)Z");
    w
}

fn print_stream_class() -> ClassWriter {
    let mut w = ClassWriter::new(PRINT_STREAM, Some(OBJECT));
    w.field(PRIVATE | FINAL, "fd", "I");
    w.method(PUBLIC, "<init>", "(I)V", |code| {
        code.aload(0)
            .invokespecial(OBJECT, "<init>", "()V")
            .aload(0)
            .iload(1)
            .putfield(PRINT_STREAM, "fd", "I")
            .op(Opcode::Return);
    });
    for name in ["print", "println"] {
        w.method(PUBLIC, name, "(Ljava/lang/Object;)V", |code| {
            code.aload(0)
                .aload(1)
                .invokestatic(STRING, "valueOf", "(Ljava/lang/Object;)Ljava/lang/String;")
                .invokevirtual(PRINT_STREAM, name, "(Ljava/lang/String;)V")
                .op(Opcode::Return);
        });
        for t in ["Ljava/lang/String;", "I", "J", "F", "D", "Z", "C"] {
            w.native_method(PUBLIC, name, &format!("({})V", t));
        }
    }
    w.native_method(PUBLIC, "println", "()V")
        .native_method(PUBLIC, "flush", "()V");
    w
}

fn runnable_interface() -> ClassWriter {
    let mut w = ClassWriter::interface(RUNNABLE);
    w.method_without_code(PUBLIC | ABSTRACT, "run", "()V");
    w
}

/// A started thread is an execution of its `run()`. `eetop` holds that
/// execution's id, zero before `start`.
fn thread_class() -> ClassWriter {
    const TARGET: &str = "Ljava/lang/Runnable;";
    let mut w = ClassWriter::new(THREAD, Some(OBJECT));
    w.implements(RUNNABLE)
        .field(PRIVATE, "target", TARGET)
        .field(PRIVATE, "eetop", "I");
    w.method(PUBLIC, "<init>", "()V", |code| return_self_init(code, OBJECT));
    w.method(PUBLIC, "<init>", "(Ljava/lang/Runnable;)V", |code| {
        code.aload(0)
            .invokespecial(OBJECT, "<init>", "()V")
            .aload(0)
            .aload(1)
            .putfield(THREAD, "target", TARGET)
            .op(Opcode::Return);
    });
    w.method(PUBLIC, "run", "()V", |code| {
        let done = code.new_label();
        code.aload(0)
            .getfield(THREAD, "target", TARGET)
            .branch(Opcode::IfNull, done)
            .aload(0)
            .getfield(THREAD, "target", TARGET)
            .invokeinterface(RUNNABLE, "run", "()V")
            .bind(done)
            .op(Opcode::Return);
    });
    // polls, since there is no wait()
    w.method(PUBLIC | FINAL, "join", "()V", |code| {
        let top = code.new_label();
        let done = code.new_label();
        code.bind(top)
            .aload(0)
            .invokevirtual(THREAD, "isAlive", "()Z")
            .branch(Opcode::IfEq, done)
            .lconst(1)
            .invokestatic(THREAD, "sleep", "(J)V")
            .branch(Opcode::Goto, top)
            .bind(done)
            .op(Opcode::Return);
    });
    w.native_method(PUBLIC, "start", "()V")
        .native_method(PUBLIC | FINAL, "isAlive", "()Z")
        .native_method(PUBLIC | STATIC, "sleep", "(J)V")
        .native_method(PUBLIC | STATIC, "yield", "()V")
        .native_method(PUBLIC | STATIC, "currentThread", "()Ljava/lang/Thread;");
    w
}

/// Classes and field slots the runtime touches directly.
#[derive(Clone, Copy, Debug)]
pub struct WellKnown {
    pub object: ClassId,
    pub class: ClassId,
    pub string: ClassId,
    pub byte_array: ClassId,
    pub cloneable: ClassId,
    pub throwable: ClassId,
    pub thread: ClassId,
    pub string_value: usize,
    pub string_coder: usize,
    pub string_hash: usize,
    pub class_id: usize,
    pub throwable_message: usize,
    pub print_stream_fd: usize,
    pub thread_eetop: usize,
}

impl WellKnown {
    /// Loads the core classes and records their layout.
    pub fn resolve(registry: &mut ClassRegistry, symbols: &mut SymbolTable) -> Result<Self, VMError> {
        let mut load = |name: &str| registry.load(name, symbols);
        let object = load(OBJECT)?;
        let class = load("java/lang/Class")?;
        let string = load(STRING)?;
        let byte_array = load("[B")?;
        let cloneable = load("java/lang/Cloneable")?;
        let throwable = load("java/lang/Throwable")?;
        let print_stream = load(PRINT_STREAM)?;
        let thread = load(THREAD)?;

        let slot = |class: ClassId, name: &str, descriptor: &str| {
            registry
                .lookup_field(class, name, descriptor)
                .map(|(_, field)| field.slot as usize)
                .ok_or_else(|| {
                    VMError::InvalidState(format!(
                        "bootstrap class {} lacks field {}",
                        registry.class(class).name,
                        name
                    ))
                })
        };
        Ok(Self {
            object,
            class,
            string,
            byte_array,
            cloneable,
            throwable,
            thread,
            string_value: slot(string, "value", "[B")?,
            string_coder: slot(string, "coder", "B")?,
            string_hash: slot(string, "hash", "I")?,
            class_id: slot(class, "classId", "I")?,
            throwable_message: slot(throwable, "detailMessage", "Ljava/lang/String;")?,
            print_stream_fd: slot(print_stream, "fd", "I")?,
            thread_eetop: slot(thread, "eetop", "I")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classfile::ClassPathLoader;

    #[test]
    fn every_bootstrap_class_parses() {
        let path = bootstrap_class_path().unwrap();
        for name in BOOTSTRAP_CLASSES {
            assert!(path.contains(name), "{}", name);
        }
        let mut loader = ClassPathLoader::new();
        loader.add_entry(Box::new(path));
        let mut registry = ClassRegistry::new(Box::new(loader));
        let mut symbols = SymbolTable::new();
        for name in BOOTSTRAP_CLASSES
            .iter()
            .copied()
            .chain(ExceptionKind::ALL.iter().map(|k| k.class_name()))
        {
            registry.load(name, &mut symbols).unwrap();
        }
        let known = WellKnown::resolve(&mut registry, &mut symbols).unwrap();
        assert_ne!(known.string_value, known.string_coder);
        let npe = registry.find("java/lang/NullPointerException").unwrap();
        assert!(registry.is_assignable(npe, known.throwable));
    }
}
