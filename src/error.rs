use dbus::{arg::TypeMismatchError, strings::ErrorName, Message};
use std::ffi::CString;
use thiserror::Error;

/// A fault raised while handling a method call. Every variant maps to
/// one of the standard `org.freedesktop.DBus.Error.*` names and is
/// sent back to the caller as an error reply.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MethodError {
    #[error("unknown interface {0}")]
    UnknownInterface(String),
    #[error("unknown property {0}")]
    UnknownProperty(String),
    #[error("unknown method {0}")]
    UnknownMethod(String),
    #[error("unknown object {0}")]
    UnknownObject(String),
    #[error("invalid arguments: {0}")]
    InvalidArgs(String),
    #[error("{0}")]
    Failed(String),
}

impl MethodError {
    pub fn error_name(&self) -> &'static str {
        match self {
            MethodError::UnknownInterface(_) => "org.freedesktop.DBus.Error.UnknownInterface",
            MethodError::UnknownProperty(_) => "org.freedesktop.DBus.Error.UnknownProperty",
            MethodError::UnknownMethod(_) => "org.freedesktop.DBus.Error.UnknownMethod",
            MethodError::UnknownObject(_) => "org.freedesktop.DBus.Error.UnknownObject",
            MethodError::InvalidArgs(_) => "org.freedesktop.DBus.Error.InvalidArgs",
            MethodError::Failed(_) => "org.freedesktop.DBus.Error.Failed",
        }
    }

    /// Build the error reply to `call`.
    pub fn to_reply(&self, call: &Message) -> Option<Message> {
        error_reply(call, self.error_name(), &self.to_string())
    }
}

/// An error reply to `call` named `name`. `None` if `name` is not a valid
/// error name or `text` contains a nul byte.
pub(crate) fn error_reply(call: &Message, name: &str, text: &str) -> Option<Message> {
    let name = ErrorName::new(name).ok()?;
    let text = CString::new(text).ok()?;
    Some(call.error(&name, &text))
}

impl From<TypeMismatchError> for MethodError {
    fn from(e: TypeMismatchError) -> Self {
        MethodError::InvalidArgs(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_names() {
        assert_eq!(
            MethodError::UnknownProperty("Foo".into()).error_name(),
            "org.freedesktop.DBus.Error.UnknownProperty"
        );
        assert_eq!(
            MethodError::InvalidArgs("x".into()).to_string(),
            "invalid arguments: x"
        );
    }

    #[test]
    fn reply_carries_name() {
        let mut call =
            Message::new_method_call("com.example", "/a", "com.example.Iface", "Foo").unwrap();
        call.set_serial(3);
        let mut reply = MethodError::UnknownInterface("com.example.Nope".into())
            .to_reply(&call)
            .unwrap();
        assert_eq!(reply.get_reply_serial(), Some(3));
        let err = reply.as_result().unwrap_err();
        assert_eq!(err.name(), Some("org.freedesktop.DBus.Error.UnknownInterface"));
        assert_eq!(err.message(), Some("unknown interface com.example.Nope"));
    }

    #[test]
    fn malformed_error_names_build_nothing() {
        let mut call =
            Message::new_method_call("com.example", "/a", "com.example.Iface", "Foo").unwrap();
        call.set_serial(4);
        assert!(error_reply(&call, "not an error name", "x").is_none());
        assert!(error_reply(&call, "org.freedesktop.DBus.Error.Failed", "a\0b").is_none());
        let reply = error_reply(&call, "org.freedesktop.DBus.Error.FileNotFound", "gone").unwrap();
        assert_eq!(reply.get_reply_serial(), Some(4));
    }
}
