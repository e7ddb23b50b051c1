use crate::object::{ObjRef, Trace};
use crate::value::JValue;
use crate::vm::VM;

/// Result of one stop-the-world collection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GcReport {
    pub marked: usize,
    pub freed: usize,
    pub live: usize,
    pub freed_bytes: usize,
    pub live_bytes: usize,
}

/// Mark phase state. Children are pushed on an explicit worklist so deep
/// object graphs never recurse on the native stack.
struct Marker {
    worklist: Vec<ObjRef>,
    marked: usize,
}

impl Marker {
    fn new() -> Self {
        Self {
            worklist: Vec::with_capacity(64),
            marked: 0,
        }
    }

    #[inline]
    fn push(&mut self, obj: ObjRef) {
        self.worklist.push(obj);
    }

    fn drain(&mut self, vm: &mut VM) {
        let mut children = Vec::new();
        while let Some(obj) = self.worklist.pop() {
            let Some(object) = vm.heap.get_mut(obj) else {
                log::warn!("gc: dangling reference {:?}", obj);
                continue;
            };
            if object.header.marked {
                continue;
            }
            object.header.marked = true;
            self.marked += 1;

            let object = match vm.heap.get(obj) {
                Some(object) => object,
                None => continue,
            };
            let ref_slots = match vm.registry.get_class(object.class()) {
                Some(class) => class.ref_slots.as_slice(),
                None => &[],
            };
            children.clear();
            object.trace(ref_slots, &mut |child| children.push(child));
            // reversed so the first child is visited first
            self.worklist.extend(children.iter().rev());
        }
    }
}

impl VM {
    /// Runs a full mark and sweep over every root the VM knows about.
    pub fn collect_garbage(&mut self) -> GcReport {
        let mut marker = Marker::new();
        self.heap.trace_roots(&mut |obj| marker.push(obj));
        self.strings.trace(&mut |obj| marker.push(obj));
        for class in self.registry.classes() {
            class.trace_statics(&mut |obj| marker.push(obj));
        }
        if let Some(obj) = self.out_of_memory {
            marker.push(obj);
        }
        self.exec.trace_roots(&mut |obj| marker.push(obj));
        for exec in self.parked.values() {
            exec.trace_roots(&mut |obj| marker.push(obj));
        }
        for value in self.completed.values() {
            if let JValue::Object(Some(obj)) = value {
                marker.push(*obj);
            }
        }
        marker.drain(self);

        let (freed, freed_bytes) = self.heap.sweep();
        let report = GcReport {
            marked: marker.marked,
            freed,
            live: self.heap.live_objects(),
            freed_bytes,
            live_bytes: self.heap.used_bytes(),
        };
        log::debug!(
            "gc: marked {}, freed {} ({} bytes), live {} ({} bytes)",
            report.marked,
            report.freed,
            report.freed_bytes,
            report.live,
            report.live_bytes
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use crate::runtime::opcode::Opcode;
    use crate::test::TestVm;
    use crate::value::JValue;

    #[test]
    fn unreachable_objects_are_freed() {
        let mut vm = TestVm::bootstrap();
        let before = vm.collect_garbage().live;
        for _ in 0..10 {
            vm.new_string("garbage").unwrap();
        }
        vm.heap.clear_pending();
        let report = vm.collect_garbage();
        assert!(report.freed >= 10);
        assert_eq!(report.live, before);
    }

    #[test]
    fn protected_and_pinned_objects_survive() {
        let mut vm = TestVm::bootstrap();
        let kept = vm.new_string("kept").unwrap();
        vm.heap.clear_pending();
        vm.heap.pin(kept);
        vm.collect_garbage();
        assert_eq!(vm.string_value(kept).as_deref(), Some("kept"));
        vm.heap.unpin(kept);

        let array = vm.new_int_array(&[1, 2, 3]).unwrap();
        vm.heap.clear_pending();
        vm.heap.protect(array);
        vm.collect_garbage();
        assert!(vm.heap.contains(array));
        vm.heap.clear_pending();
        vm.collect_garbage();
        assert!(!vm.heap.contains(array));
    }

    #[test]
    fn statics_keep_their_graph_alive() {
        let mut vm = TestVm::bootstrap();
        vm.load_test_class("demo/Holder", |w| {
            w.field(0x0008, "held", "[Ljava/lang/Object;");
            w.method(0x0009, "fill", "()V", |code| {
                code.iconst(2)
                    .anewarray("java/lang/Object")
                    .op(Opcode::Dup)
                    .iconst(0)
                    .ldc_string("first")
                    .op(Opcode::AAStore)
                    .putstatic("demo/Holder", "held", "[Ljava/lang/Object;")
                    .op(Opcode::Return);
            });
        });
        vm.invoke_static("demo/Holder", "fill", "()V", &[]).unwrap();
        vm.heap.clear_pending();
        vm.collect_garbage();
        let held = vm.get_static("demo/Holder", "held").unwrap();
        let JValue::Object(Some(array)) = held else {
            panic!("held was not set");
        };
        let first = vm.read_array(array, 0).unwrap();
        let JValue::Object(Some(text)) = first else {
            panic!("element 0 is null");
        };
        assert_eq!(vm.string_value(text).as_deref(), Some("first"));
    }
}
