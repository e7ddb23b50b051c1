use paste::paste;

use super::{
    java_io_PrintStream, java_lang_Class, java_lang_Double, java_lang_Float, java_lang_Math,
    java_lang_Object, java_lang_String, java_lang_System, java_lang_Thread, NativeTable,
};

macro_rules! builtin_native_functions {
    ($(
        {$cls_name:ident, $method_name:literal, $descriptor:literal, $native_fn_name:ident}
    ),* $(,)?) => {
        /// Registers every built-in native. The class name is derived from
        /// the module name, e.g. `java_lang_Object` serves `java/lang/Object`.
        pub(crate) fn register_all(table: &mut NativeTable) {
            paste! {
                $(
                    table.register(
                        &stringify!($cls_name).replace('_', "/"),
                        $method_name,
                        $descriptor,
                        $cls_name::[<Java_ $cls_name _ $native_fn_name>],
                    );
                )*
            }
            log::trace!("registered {} builtin natives", num_of_natives());
        }

        const fn num_of_natives() -> usize {
            [$(stringify!($native_fn_name)),*].len()
        }
    };
}

builtin_native_functions!(
    {java_lang_Object, "hashCode", "()I", hashCode},
    {java_lang_Object, "getClass", "()Ljava/lang/Class;", getClass},
    {java_lang_Object, "clone", "()Ljava/lang/Object;", clone},
    {java_lang_Object, "toString", "()Ljava/lang/String;", toString},
    {java_lang_Object, "notify", "()V", notify},
    {java_lang_Object, "notifyAll", "()V", notify},

    {java_lang_String, "length", "()I", length},
    {java_lang_String, "isEmpty", "()Z", isEmpty},
    {java_lang_String, "charAt", "(I)C", charAt},
    {java_lang_String, "equals", "(Ljava/lang/Object;)Z", equals},
    {java_lang_String, "hashCode", "()I", hashCode},
    {java_lang_String, "intern", "()Ljava/lang/String;", intern},
    {java_lang_String, "concat", "(Ljava/lang/String;)Ljava/lang/String;", concat},
    {java_lang_String, "valueOf", "(I)Ljava/lang/String;", valueOfInt},
    {java_lang_String, "valueOf", "(J)Ljava/lang/String;", valueOfLong},
    {java_lang_String, "valueOf", "(F)Ljava/lang/String;", valueOfFloat},
    {java_lang_String, "valueOf", "(D)Ljava/lang/String;", valueOfDouble},
    {java_lang_String, "valueOf", "(Z)Ljava/lang/String;", valueOfBoolean},
    {java_lang_String, "valueOf", "(C)Ljava/lang/String;", valueOfChar},

    {java_lang_Class, "getName", "()Ljava/lang/String;", getName},
    {java_lang_Class, "forName", "(Ljava/lang/String;)Ljava/lang/Class;", forName},
    {java_lang_Class, "isInstance", "(Ljava/lang/Object;)Z", isInstance},
    {java_lang_Class, "isArray", "()Z", isArray},
    {java_lang_Class, "isInterface", "()Z", isInterface},
    {java_lang_Class, "getSuperclass", "()Ljava/lang/Class;", getSuperclass},

    {java_lang_System, "arraycopy", "(Ljava/lang/Object;ILjava/lang/Object;II)V", arraycopy},
    {java_lang_System, "identityHashCode", "(Ljava/lang/Object;)I", identityHashCode},
    {java_lang_System, "currentTimeMillis", "()J", currentTimeMillis},
    {java_lang_System, "nanoTime", "()J", nanoTime},
    {java_lang_System, "gc", "()V", gc},

    {java_lang_Thread, "start", "()V", start},
    {java_lang_Thread, "isAlive", "()Z", isAlive},
    {java_lang_Thread, "sleep", "(J)V", sleep},
    {java_lang_Thread, "yield", "()V", yieldNow},
    {java_lang_Thread, "currentThread", "()Ljava/lang/Thread;", currentThread},

    {java_lang_Math, "sin", "(D)D", sin},
    {java_lang_Math, "cos", "(D)D", cos},
    {java_lang_Math, "tan", "(D)D", tan},
    {java_lang_Math, "asin", "(D)D", asin},
    {java_lang_Math, "acos", "(D)D", acos},
    {java_lang_Math, "atan", "(D)D", atan},
    {java_lang_Math, "exp", "(D)D", exp},
    {java_lang_Math, "log", "(D)D", log},
    {java_lang_Math, "log10", "(D)D", log10},
    {java_lang_Math, "sqrt", "(D)D", sqrt},
    {java_lang_Math, "cbrt", "(D)D", cbrt},
    {java_lang_Math, "floor", "(D)D", floor},
    {java_lang_Math, "ceil", "(D)D", ceil},
    {java_lang_Math, "rint", "(D)D", rint},
    {java_lang_Math, "atan2", "(DD)D", atan2},
    {java_lang_Math, "pow", "(DD)D", pow},
    {java_lang_Math, "hypot", "(DD)D", hypot},
    {java_lang_Math, "abs", "(I)I", absInt},
    {java_lang_Math, "abs", "(J)J", absLong},
    {java_lang_Math, "abs", "(F)F", absFloat},
    {java_lang_Math, "abs", "(D)D", absDouble},
    {java_lang_Math, "max", "(II)I", maxInt},
    {java_lang_Math, "min", "(II)I", minInt},
    {java_lang_Math, "max", "(JJ)J", maxLong},
    {java_lang_Math, "min", "(JJ)J", minLong},
    {java_lang_Math, "max", "(DD)D", maxDouble},
    {java_lang_Math, "min", "(DD)D", minDouble},

    {java_lang_Float, "floatToRawIntBits", "(F)I", floatToRawIntBits},
    {java_lang_Float, "floatToIntBits", "(F)I", floatToIntBits},
    {java_lang_Float, "intBitsToFloat", "(I)F", intBitsToFloat},
    {java_lang_Float, "isNaN", "(F)Z", isNaN},
    {java_lang_Double, "doubleToRawLongBits", "(D)J", doubleToRawLongBits},
    {java_lang_Double, "doubleToLongBits", "(D)J", doubleToLongBits},
    {java_lang_Double, "longBitsToDouble", "(J)D", longBitsToDouble},
    {java_lang_Double, "isNaN", "(D)Z", isNaN},

    {java_io_PrintStream, "print", "(Ljava/lang/String;)V", printString},
    {java_io_PrintStream, "println", "(Ljava/lang/String;)V", printlnString},
    {java_io_PrintStream, "print", "(I)V", printInt},
    {java_io_PrintStream, "println", "(I)V", printlnInt},
    {java_io_PrintStream, "print", "(J)V", printLong},
    {java_io_PrintStream, "println", "(J)V", printlnLong},
    {java_io_PrintStream, "print", "(F)V", printFloat},
    {java_io_PrintStream, "println", "(F)V", printlnFloat},
    {java_io_PrintStream, "print", "(D)V", printDouble},
    {java_io_PrintStream, "println", "(D)V", printlnDouble},
    {java_io_PrintStream, "print", "(Z)V", printBoolean},
    {java_io_PrintStream, "println", "(Z)V", printlnBoolean},
    {java_io_PrintStream, "print", "(C)V", printChar},
    {java_io_PrintStream, "println", "(C)V", printlnChar},
    {java_io_PrintStream, "println", "()V", println},
    {java_io_PrintStream, "flush", "()V", flush},
);
