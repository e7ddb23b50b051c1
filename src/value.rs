use crate::object::prelude::{JDouble, JFloat, JInt, JLong, ObjRef};
use paste::paste;

macro_rules! jval_members {
    ($(($variant:ident, $member_name:ident, $member_type:ty)),*) => {
        /// A Java value as seen by the host: method arguments, return values,
        /// field and array reads. Sub-int primitives are widened to `Int`.
        #[derive(Clone, Copy, Debug, PartialEq, Default)]
        pub enum JValue {
            #[default]
            Void,
            $($variant($member_type),)*
        }

        impl JValue {
            paste! {
                $(
                    #[allow(unused)]
                    #[inline(always)]
                    pub fn [<with_ $member_name>]($member_name: $member_type) -> Self {
                        JValue::$variant($member_name)
                    }

                    #[allow(unused)]
                    #[inline(always)]
                    pub fn [<as_ $member_name>](&self) -> Option<$member_type> {
                        match self {
                            JValue::$variant(v) => Some(*v),
                            _ => None,
                        }
                    }
                )*
            }
        }
    };
}

jval_members!(
    (Int, int_val, JInt),
    (Long, long_val, JLong),
    (Float, float_val, JFloat),
    (Double, double_val, JDouble),
    (Object, obj_val, Option<ObjRef>)
);

impl JValue {
    #[inline(always)]
    pub fn with_obj_null() -> Self {
        JValue::Object(None)
    }

    /// Slots the value occupies on an execution stack.
    pub fn slots(&self) -> usize {
        match self {
            JValue::Void => 0,
            JValue::Long(_) | JValue::Double(_) => 2,
            _ => 1,
        }
    }
}
