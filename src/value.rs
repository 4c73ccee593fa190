use dbus::{
    arg::{Append, Arg, ArgType, Get, Iter, IterAppend, Variant},
    strings::{Path, Signature},
};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValueError {
    #[error("array element {index} has signature {found}, expected {expected}")]
    ElementMismatch {
        index: usize,
        expected: String,
        found: String,
    },
    #[error("invalid signature {0}")]
    InvalidSignature(String),
}

/// A homogeneous array. The element signature is fixed when the array is
/// built, so an empty array still knows its wire type.
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayValue {
    element: Signature<'static>,
    signature: Signature<'static>,
    items: Vec<Value>,
}

impl ArrayValue {
    pub fn new(element: Signature<'static>, items: Vec<Value>) -> Result<Self, ValueError> {
        for (index, item) in items.iter().enumerate() {
            let found = item.signature();
            if found != element {
                return Err(ValueError::ElementMismatch {
                    index,
                    expected: element.to_string(),
                    found: found.to_string(),
                });
            }
        }
        let signature = Signature::new(format!("a{}", &*element))
            .map_err(|_| ValueError::InvalidSignature(format!("a{}", &*element)))?;
        Ok(ArrayValue { element, signature, items })
    }

    pub fn element_signature(&self) -> &Signature<'static> {
        &self.element
    }

    pub fn items(&self) -> &[Value] {
        &self.items
    }
}

/// A dynamically typed property or argument value. The set of tags is
/// closed: every variant has exactly one wire signature.
///
/// Equality is equality of the encoded payload, so doubles compare by
/// bit pattern: a `NaN` equals the same `NaN` and `0.0` differs from
/// `-0.0`.
#[derive(Debug, Clone)]
pub enum Value {
    Byte(u8),
    Bool(bool),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    F64(f64),
    Str(String),
    ObjectPath(Path<'static>),
    Signature(Signature<'static>),
    Array(ArrayValue),
}

impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Byte(a), Value::Byte(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::I16(a), Value::I16(b)) => a == b,
            (Value::U16(a), Value::U16(b)) => a == b,
            (Value::I32(a), Value::I32(b)) => a == b,
            (Value::U32(a), Value::U32(b)) => a == b,
            (Value::I64(a), Value::I64(b)) => a == b,
            (Value::U64(a), Value::U64(b)) => a == b,
            (Value::F64(a), Value::F64(b)) => a.to_bits() == b.to_bits(),
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::ObjectPath(a), Value::ObjectPath(b)) => a == b,
            (Value::Signature(a), Value::Signature(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (_, _) => false,
        }
    }
}

impl Value {
    /// The wire signature of the payload, not of the enclosing variant.
    pub fn signature(&self) -> Signature<'static> {
        match self {
            Value::Byte(_) => u8::signature(),
            Value::Bool(_) => bool::signature(),
            Value::I16(_) => i16::signature(),
            Value::U16(_) => u16::signature(),
            Value::I32(_) => i32::signature(),
            Value::U32(_) => u32::signature(),
            Value::I64(_) => i64::signature(),
            Value::U64(_) => u64::signature(),
            Value::F64(_) => f64::signature(),
            Value::Str(_) => String::signature(),
            Value::ObjectPath(_) => Path::signature(),
            Value::Signature(_) => Signature::signature(),
            Value::Array(a) => a.signature.clone(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s.as_str()),
            Value::ObjectPath(p) => Some(&**p),
            Value::Signature(s) => Some(&**s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Byte(v) => Some(*v as i64),
            Value::I16(v) => Some(*v as i64),
            Value::U16(v) => Some(*v as i64),
            Value::I32(v) => Some(*v as i64),
            Value::U32(v) => Some(*v as i64),
            Value::I64(v) => Some(*v),
            Value::U64(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }

    fn append_bare(&self, i: &mut IterAppend) {
        match self {
            Value::Byte(v) => v.append_by_ref(i),
            Value::Bool(v) => v.append_by_ref(i),
            Value::I16(v) => v.append_by_ref(i),
            Value::U16(v) => v.append_by_ref(i),
            Value::I32(v) => v.append_by_ref(i),
            Value::U32(v) => v.append_by_ref(i),
            Value::I64(v) => v.append_by_ref(i),
            Value::U64(v) => v.append_by_ref(i),
            Value::F64(v) => v.append_by_ref(i),
            Value::Str(v) => v.append_by_ref(i),
            Value::ObjectPath(v) => v.append_by_ref(i),
            Value::Signature(v) => v.append_by_ref(i),
            Value::Array(a) => i.append_array(&a.element, |s| {
                for item in &a.items {
                    item.append_bare(s)
                }
            }),
        }
    }

    fn read_bare(i: &mut Iter) -> Option<Value> {
        Some(match i.arg_type() {
            ArgType::Byte => Value::Byte(i.get()?),
            ArgType::Boolean => Value::Bool(i.get()?),
            ArgType::Int16 => Value::I16(i.get()?),
            ArgType::UInt16 => Value::U16(i.get()?),
            ArgType::Int32 => Value::I32(i.get()?),
            ArgType::UInt32 => Value::U32(i.get()?),
            ArgType::Int64 => Value::I64(i.get()?),
            ArgType::UInt64 => Value::U64(i.get()?),
            ArgType::Double => Value::F64(i.get()?),
            ArgType::String => Value::Str(i.get::<String>()?),
            ArgType::ObjectPath => Value::ObjectPath(i.get::<Path>()?.into_static()),
            ArgType::Signature => Value::Signature(i.get::<Signature>()?.into_static()),
            ArgType::Array => {
                let sig = i.signature();
                let element = Signature::new(sig.get(1..)?.to_owned()).ok()?;
                let mut sub = i.recurse(ArgType::Array)?;
                let mut items = Vec::new();
                while sub.arg_type() != ArgType::Invalid {
                    items.push(Value::read_bare(&mut sub)?);
                    sub.next();
                }
                Value::Array(ArrayValue::new(element, items).ok()?)
            }
            ArgType::Variant
            | ArgType::Struct
            | ArgType::DictEntry
            | ArgType::UnixFd
            | ArgType::Invalid => return None,
        })
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Byte(v) => write!(f, "{}", v),
            Value::Bool(v) => write!(f, "{}", v),
            Value::I16(v) => write!(f, "{}", v),
            Value::U16(v) => write!(f, "{}", v),
            Value::I32(v) => write!(f, "{}", v),
            Value::U32(v) => write!(f, "{}", v),
            Value::I64(v) => write!(f, "{}", v),
            Value::U64(v) => write!(f, "{}", v),
            Value::F64(v) => write!(f, "{}", v),
            Value::Str(v) => write!(f, "{:?}", v),
            Value::ObjectPath(v) => write!(f, "{}", &**v),
            Value::Signature(v) => write!(f, "{}", &**v),
            Value::Array(a) => {
                write!(f, "[")?;
                for (i, item) in a.items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
        }
    }
}

// On the wire a Value is always wrapped in a variant.
impl Arg for Value {
    const ARG_TYPE: ArgType = ArgType::Variant;

    fn signature() -> Signature<'static> {
        <Variant<u8> as Arg>::signature()
    }
}

impl Append for Value {
    fn append_by_ref(&self, i: &mut IterAppend) {
        i.append_variant(&self.signature(), |s| self.append_bare(s))
    }
}

impl<'a> Get<'a> for Value {
    fn get(i: &mut Iter<'a>) -> Option<Self> {
        let mut inner = i.recurse(ArgType::Variant)?;
        Value::read_bare(&mut inner)
    }
}

macro_rules! from_scalar {
    ($($t:ty => $tag:ident),+) => {
        $(
            impl From<$t> for Value {
                fn from(v: $t) -> Self {
                    Value::$tag(v)
                }
            }
        )+
    };
}

from_scalar!(
    u8 => Byte,
    bool => Bool,
    i16 => I16,
    u16 => U16,
    i32 => I32,
    u32 => U32,
    i64 => I64,
    u64 => U64,
    f64 => F64,
    String => Str,
    Path<'static> => ObjectPath,
    Signature<'static> => Signature,
    ArrayValue => Array
);

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_owned())
    }
}
