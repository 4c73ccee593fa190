//! Expose a tree of objects on a dbus connection.
//!
//! An [`ObjectServer`] owns a set of [`Object`]s addressed by object
//! path. Each object carries named [`Interface`]s with typed methods,
//! declared signals and a property store. The server answers
//! `org.freedesktop.DBus.Introspectable`, `org.freedesktop.DBus.Properties`,
//! `org.freedesktop.DBus.ObjectManager` and `org.freedesktop.DBus.Peer`
//! on behalf of every registered object.
//!
//! ```no_run
//! use dbus_objects::ObjectServer;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let (resource, conn) = dbus_tokio::connection::new_session_sync()?;
//! tokio::spawn(resource);
//! let server = ObjectServer::new(conn.clone());
//! let obj = server.add_object("/com/example/thing")?;
//! let iface = obj.add_interface("com.example.Thing")?;
//! iface.register_method("Add", |(a, b): (u32, u32)| Ok((a + b,)));
//! iface.set_property("Name", "thing", Default::default());
//! let serving = server.serve(&*conn);
//! serving.wait().await;
//! # Ok(())
//! # }
//! ```

#[macro_use]
extern crate serde_derive;

pub mod error;
pub mod interface;
pub mod introspect;
pub mod marshal;
pub mod method;
pub mod object;
pub mod object_manager;
pub mod properties;
pub mod server;
pub mod value;
pub mod xml;

#[cfg(test)]
mod testing;

use dbus::{channel::Sender, Message};
use log::warn;
use std::sync::Arc;

pub use error::MethodError;
pub use interface::{Interface, SignalDescriptor};
pub use marshal::{ArgDescriptor, ArgList, Direction};
pub use method::Method;
pub use object::Object;
pub use properties::{PropertyMap, PropertyStore, UpdateMode};
pub use server::{MessageSource, ObjectServer, Serving};
pub use value::{ArrayValue, Value};

pub const PROPERTIES_INTERFACE: &str = "org.freedesktop.DBus.Properties";
pub const INTROSPECTABLE_INTERFACE: &str = "org.freedesktop.DBus.Introspectable";
pub const OBJECT_MANAGER_INTERFACE: &str = "org.freedesktop.DBus.ObjectManager";
pub const PEER_INTERFACE: &str = "org.freedesktop.DBus.Peer";

/// The shared handle every interface and object sends through.
pub type Bus = Arc<dyn Sender + Send + Sync>;

/// Fire and forget. A failed send is logged, never retried, the
/// connection is gone when `Sender::send` fails.
pub(crate) fn send(bus: &Bus, msg: Message, what: &str) {
    if let Err(()) = bus.send(msg) {
        warn!("failed to send {}", what)
    }
}
