use paste::paste;

use crate::object::prelude::*;
use crate::object::string;
use crate::runtime::{Throw, ThrowResult};
use crate::value::JValue;
use crate::vm::VM;

use super::{non_null, NativeArgs};

/// File descriptor the receiving stream writes to.
fn stream_fd(vm: &mut VM, args: &NativeArgs) -> ThrowResult<JInt> {
    let this = non_null(vm, args.this(), "this")?;
    let slot = vm.well_known.print_stream_fd;
    Ok(vm
        .heap
        .get(this)
        .and_then(Object::fields)
        .map_or(1, |fields| fields.get_int(slot)))
}

fn write(vm: &mut VM, args: &NativeArgs, text: &str, newline: bool) -> Result<JValue, Throw> {
    let fd = stream_fd(vm, args)?;
    if newline {
        vm.console_write(fd, &format!("{}\n", text));
    } else {
        vm.console_write(fd, text);
    }
    Ok(JValue::Void)
}

fn text_of_string(vm: &VM, args: &NativeArgs) -> String {
    args.obj(1)
        .and_then(|obj| vm.string_value(obj))
        .unwrap_or_else(|| "null".to_string())
}

fn text_of_int(_vm: &VM, args: &NativeArgs) -> String {
    args.int(1).to_string()
}

fn text_of_long(_vm: &VM, args: &NativeArgs) -> String {
    args.long(1).to_string()
}

fn text_of_float(_vm: &VM, args: &NativeArgs) -> String {
    string::format_float(args.float(1) as JDouble, true)
}

fn text_of_double(_vm: &VM, args: &NativeArgs) -> String {
    string::format_float(args.double(1), false)
}

fn text_of_boolean(_vm: &VM, args: &NativeArgs) -> String {
    (args.int(1) != 0).to_string()
}

fn text_of_char(_vm: &VM, args: &NativeArgs) -> String {
    String::from_utf16_lossy(&[args.int(1) as JChar])
}

macro_rules! print_natives {
    ($($kind:ident),*) => {
        paste! {
            $(
                pub fn [<Java_java_io_PrintStream_print $kind>](vm: &mut VM, args: &NativeArgs) -> Result<JValue, Throw> {
                    let text = [<text_of_ $kind:lower>](vm, args);
                    write(vm, args, &text, false)
                }

                pub fn [<Java_java_io_PrintStream_println $kind>](vm: &mut VM, args: &NativeArgs) -> Result<JValue, Throw> {
                    let text = [<text_of_ $kind:lower>](vm, args);
                    write(vm, args, &text, true)
                }
            )*
        }
    };
}

print_natives!(String, Int, Long, Float, Double, Boolean, Char);

pub fn Java_java_io_PrintStream_println(vm: &mut VM, args: &NativeArgs) -> Result<JValue, Throw> {
    write(vm, args, "", true)
}

pub fn Java_java_io_PrintStream_flush(vm: &mut VM, args: &NativeArgs) -> Result<JValue, Throw> {
    let fd = stream_fd(vm, args)?;
    vm.console_flush(fd);
    Ok(JValue::Void)
}
