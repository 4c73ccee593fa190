//! Type directed argument marshaling.
//!
//! A method's parameters and results are tuples. [`ArgList`] is
//! implemented for the empty tuple and for tuples of up to ten elements
//! whose members are dbus arguments, and derives from the tuple type both
//! the wire signatures of every slot and the order in which the slots are
//! read from and appended to a message.

use crate::error::MethodError;
use dbus::{
    arg::{Append, Arg, ArgType, Get, IterAppend},
    strings::Signature,
    Message,
};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    In,
    Out,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::In => write!(f, "in"),
            Direction::Out => write!(f, "out"),
        }
    }
}

/// One formal parameter or result slot, as reported by introspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgDescriptor {
    pub direction: Direction,
    pub name: String,
    pub signature: Signature<'static>,
}

pub trait ArgList: Sized {
    const LEN: usize;

    fn signatures() -> Vec<Signature<'static>>;

    /// Unpack the body of `msg`. Fails on a type mismatch and on a body
    /// with too few or too many arguments.
    fn read_from(msg: &Message) -> Result<Self, MethodError>;

    fn append_to(self, msg: &mut Message);

    /// Slots are named `arg_N` when `direction` is `In` and `out_N` when
    /// it is `Out`.
    fn descriptors(direction: Direction) -> Vec<ArgDescriptor> {
        let prefix = match direction {
            Direction::In => "arg",
            Direction::Out => "out",
        };
        Self::signatures()
            .into_iter()
            .enumerate()
            .map(|(i, signature)| ArgDescriptor {
                direction,
                name: format!("{}_{}", prefix, i),
                signature,
            })
            .collect()
    }
}

// The empty list reads and appends nothing, it only checks the body is empty.
impl ArgList for () {
    const LEN: usize = 0;

    fn signatures() -> Vec<Signature<'static>> {
        Vec::new()
    }

    fn read_from(msg: &Message) -> Result<Self, MethodError> {
        if msg.iter_init().arg_type() != ArgType::Invalid {
            return Err(MethodError::InvalidArgs("expected no arguments".into()));
        }
        Ok(())
    }

    fn append_to(self, _: &mut Message) {}
}

macro_rules! arg_list {
    ($len:expr; $($t:ident $v:ident),+) => {
        impl<$($t),+> ArgList for ($($t,)+)
        where
            $($t: Arg + Append + for<'z> Get<'z>),+
        {
            const LEN: usize = $len;

            fn signatures() -> Vec<Signature<'static>> {
                vec![$(<$t as Arg>::signature()),+]
            }

            fn read_from(msg: &Message) -> Result<Self, MethodError> {
                let mut i = msg.iter_init();
                $(let $v: $t = i.read()?;)+
                if i.arg_type() != ArgType::Invalid {
                    return Err(MethodError::InvalidArgs(format!(
                        "expected {} arguments, got more",
                        $len
                    )));
                }
                Ok(($($v,)+))
            }

            fn append_to(self, msg: &mut Message) {
                let ($($v,)+) = self;
                let mut i = IterAppend::new(msg);
                $(i.append($v);)+
            }
        }
    };
}

arg_list!(1; A a);
arg_list!(2; A a, B b);
arg_list!(3; A a, B b, C c);
arg_list!(4; A a, B b, C c, D d);
arg_list!(5; A a, B b, C c, D d, E e);
arg_list!(6; A a, B b, C c, D d, E e, F f);
arg_list!(7; A a, B b, C c, D d, E e, F f, G g);
arg_list!(8; A a, B b, C c, D d, E e, F f, G g, H h);
arg_list!(9; A a, B b, C c, D d, E e, F f, G g, H h, I i_);
arg_list!(10; A a, B b, C c, D d, E e, F f, G g, H h, I i_, J j);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{properties::PropertyMap, value::Value};

    fn call() -> Message {
        Message::new_method_call("com.example", "/a", "com.example.Iface", "Foo").unwrap()
    }

    fn sigs<T: ArgList>() -> Vec<String> {
        T::signatures().iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn signatures() {
        assert!(sigs::<()>().is_empty());
        assert_eq!(sigs::<(String, u32)>(), vec!["s", "u"]);
        assert_eq!(sigs::<(Value, Vec<String>, PropertyMap)>(), vec!["v", "as", "a{sv}"]);
        assert_eq!(<(u8, bool, i64) as ArgList>::LEN, 3);
    }

    #[test]
    fn descriptors_are_named_by_direction() {
        let d = <(String, i32)>::descriptors(Direction::In);
        assert_eq!(d.len(), 2);
        assert_eq!(d[0].name, "arg_0");
        assert_eq!(d[1].name, "arg_1");
        assert_eq!(&*d[1].signature, "i");
        assert_eq!(d[0].direction, Direction::In);
        let d = <(bool,)>::descriptors(Direction::Out);
        assert_eq!(d[0].name, "out_0");
        assert_eq!(d[0].direction.to_string(), "out");
    }

    #[test]
    fn pack_then_unpack() {
        let mut m = call();
        (String::from("iface"), 7u32, Value::from(-3i16)).append_to(&mut m);
        let (s, u, v) = <(String, u32, Value)>::read_from(&m).unwrap();
        assert_eq!(s, "iface");
        assert_eq!(u, 7);
        assert_eq!(v, Value::I16(-3));
    }

    #[test]
    fn empty_list_accepts_only_an_empty_body() {
        let mut m = call();
        ().append_to(&mut m);
        assert!(m.iter_init().arg_type() == ArgType::Invalid);
        assert!(<()>::read_from(&m).is_ok());
        let m = call().append1(1u32);
        match <()>::read_from(&m) {
            Err(MethodError::InvalidArgs(_)) => (),
            r => panic!("expected invalid args, got {:?}", r),
        }
    }

    #[test]
    fn mismatch_is_invalid_args() {
        let m = call().append1(1u32);
        match <(String,)>::read_from(&m) {
            Err(MethodError::InvalidArgs(_)) => (),
            r => panic!("unexpected {:?}", r.map(|_| ())),
        }
        let m = call().append2(1u32, 2u32);
        assert!(matches!(<(u32,)>::read_from(&m), Err(MethodError::InvalidArgs(_))));
        let m = call().append1(1u32);
        assert!(matches!(<(u32, u32)>::read_from(&m), Err(MethodError::InvalidArgs(_))));
    }
}
