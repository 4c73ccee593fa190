use crate::{
    error::MethodError,
    marshal::{ArgDescriptor, ArgList, Direction},
    Bus,
};
use dbus::Message;
use log::{error, warn};
use std::{
    marker::PhantomData,
    panic::{self, AssertUnwindSafe},
};

/// A callable bound to a method name. `call` consumes the method call
/// and produces the reply to send back.
pub trait Method: Send + Sync {
    fn call(&self, msg: &Message) -> Result<Message, MethodError>;

    /// In slots followed by out slots, derived on every call.
    fn args(&self) -> Vec<ArgDescriptor>;
}

/// Adapts a closure taking a parameter tuple and returning a result
/// tuple.
pub struct TypedMethod<IA, OA, F> {
    handler: F,
    _args: PhantomData<fn(IA) -> OA>,
}

impl<IA, OA, F> TypedMethod<IA, OA, F>
where
    IA: ArgList,
    OA: ArgList,
    F: Fn(IA) -> Result<OA, MethodError> + Send + Sync,
{
    pub fn new(handler: F) -> Self {
        TypedMethod { handler, _args: PhantomData }
    }
}

impl<IA, OA, F> Method for TypedMethod<IA, OA, F>
where
    IA: ArgList,
    OA: ArgList,
    F: Fn(IA) -> Result<OA, MethodError> + Send + Sync,
{
    fn call(&self, msg: &Message) -> Result<Message, MethodError> {
        let input = IA::read_from(msg)?;
        let output = (self.handler)(input)?;
        let mut reply = msg.method_return();
        output.append_to(&mut reply);
        Ok(reply)
    }

    fn args(&self) -> Vec<ArgDescriptor> {
        let mut args = IA::descriptors(Direction::In);
        args.extend(OA::descriptors(Direction::Out));
        args
    }
}

/// Run `method` against `msg` and send the reply, or the error reply,
/// without waiting for the send to complete. A panicking handler is
/// answered with `org.freedesktop.DBus.Error.Failed`.
pub(crate) fn dispatch(bus: &Bus, name: &str, method: &dyn Method, msg: &Message) {
    let res = match panic::catch_unwind(AssertUnwindSafe(|| method.call(msg))) {
        Ok(res) => res,
        Err(_) => {
            error!("method {} panicked", name);
            Err(MethodError::Failed(format!("method {} failed", name)))
        }
    };
    let reply = match res {
        Ok(reply) => Some(reply),
        Err(e) => {
            warn!("method {} returned an error: {}", name, e);
            e.to_reply(msg)
        }
    };
    match reply {
        Some(_) if msg.get_no_reply() => (),
        Some(reply) => crate::send(bus, reply, name),
        None => warn!("could not build the reply to {}", name),
    }
}
