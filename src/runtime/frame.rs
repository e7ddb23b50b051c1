use crate::object::prelude::{MethodId, Slot};

use super::stack::Stack;

/// Slots pushed below a callee's locals: caller method, pc of the invoking
/// instruction, return pc, caller `start_sp`.
pub const FRAME_CONTEXT_SLOTS: usize = 4;

const CTX_METHOD: usize = 0;
const CTX_CALLER_PC: usize = 1;
const CTX_RETURN_PC: usize = 2;
const CTX_START_SP: usize = 3;

/// Method slot of the bottom frame: returning from it hands the result to
/// the host.
pub const HOST_FRAME: Slot = -1;

/// Saved caller state of one frame, read back from its context slots.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameContext {
    pub caller: Option<MethodId>,
    pub caller_pc: u32,
    pub return_pc: u32,
    pub caller_start_sp: usize,
}

impl FrameContext {
    /// First context slot of the frame whose `start_sp` is given.
    #[inline]
    pub fn base(start_sp: usize) -> usize {
        start_sp + 1 - FRAME_CONTEXT_SLOTS
    }

    pub fn write(&self, stack: &mut Stack, base: usize) {
        let caller = self.caller.map_or(HOST_FRAME, MethodId::to_slot);
        stack.set_raw(base + CTX_METHOD, caller);
        stack.set_raw(base + CTX_CALLER_PC, self.caller_pc as Slot);
        stack.set_raw(base + CTX_RETURN_PC, self.return_pc as Slot);
        stack.set_raw(base + CTX_START_SP, self.caller_start_sp as Slot);
    }

    pub fn read(stack: &Stack, start_sp: usize) -> FrameContext {
        let base = Self::base(start_sp);
        FrameContext {
            caller: MethodId::from_slot(stack.raw(base + CTX_METHOD)),
            caller_pc: stack.raw(base + CTX_CALLER_PC) as u32,
            return_pc: stack.raw(base + CTX_RETURN_PC) as u32,
            caller_start_sp: stack.raw(base + CTX_START_SP) as usize,
        }
    }
}

/// One live frame as seen by the collector and the debugger.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameInfo {
    pub method: MethodId,
    /// Pc of the current instruction, or of the pending invoke for callers.
    pub pc: u32,
    pub start_sp: usize,
    /// Exclusive top of the frame's slots.
    pub top: usize,
}

impl FrameInfo {
    #[inline]
    pub fn locals(&self) -> usize {
        self.start_sp + 1
    }
}

/// Walks frames innermost first by following the saved `start_sp` chain.
pub struct FrameIter<'a> {
    stack: &'a Stack,
    next: Option<FrameInfo>,
}

impl<'a> FrameIter<'a> {
    pub fn new(stack: &'a Stack, method: Option<MethodId>, pc: u32, start_sp: usize) -> Self {
        let next = method.map(|method| FrameInfo {
            method,
            pc,
            start_sp,
            top: stack.sp(),
        });
        FrameIter { stack, next }
    }
}

impl<'a> Iterator for FrameIter<'a> {
    type Item = FrameInfo;

    fn next(&mut self) -> Option<FrameInfo> {
        let frame = self.next.take()?;
        let ctx = FrameContext::read(self.stack, frame.start_sp);
        // a corrupt chain must not loop
        if ctx.caller_start_sp < frame.start_sp {
            self.next = ctx.caller.map(|method| FrameInfo {
                method,
                pc: ctx.caller_pc,
                start_sp: ctx.caller_start_sp,
                top: FrameContext::base(frame.start_sp),
            });
        }
        Some(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::prelude::{ClassId, JInt, ObjRef};

    #[test]
    fn walks_the_context_chain() {
        let outer = MethodId::new(ClassId(1), 0);
        let inner = MethodId::new(ClassId(2), 3);
        let mut stack = Stack::new(64);

        // outer frame: context at 0..4, two locals
        FrameContext {
            caller: None,
            caller_pc: 0,
            return_pc: 0,
            caller_start_sp: 0,
        }
        .write(&mut stack, 0);
        stack.set_sp(4);
        stack.push_ref(Some(ObjRef::from_index(0)));
        stack.push::<JInt>(7);

        // inner frame called from outer at pc 5
        let base = stack.sp();
        FrameContext {
            caller: Some(outer),
            caller_pc: 5,
            return_pc: 8,
            caller_start_sp: 3,
        }
        .write(&mut stack, base);
        stack.set_sp(base + 4 + 1);

        let frames: Vec<_> = FrameIter::new(&stack, Some(inner), 2, base + 3).collect();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].method, inner);
        assert_eq!(frames[0].locals(), base + 4);
        assert_eq!(frames[1].method, outer);
        assert_eq!(frames[1].pc, 5);
        assert_eq!(frames[1].top, base);
        assert_eq!(stack.refs_in(frames[1].locals(), frames[1].top).count(), 1);

        let ctx = FrameContext::read(&stack, base + 3);
        assert_eq!(ctx.return_pc, 8);
        assert_eq!(FrameContext::read(&stack, 3).caller, None);
    }
}
