use crate::{
    introspect,
    object::Object,
    object_manager::{self, ManagedObjects},
    Bus, INTROSPECTABLE_INTERFACE, OBJECT_MANAGER_INTERFACE, PEER_INTERFACE,
};
use anyhow::{anyhow, Result};
use dbus::{
    channel::MatchingReceiver, message::MatchRule, nonblock::SyncConnection, strings, Message,
    MessageType,
};
use futures::{
    channel::mpsc::{self, UnboundedReceiver},
    prelude::*,
};
use log::{debug, error, info, warn};
use parking_lot::RwLock;
use std::{
    fs, mem,
    panic::{self, AssertUnwindSafe},
    sync::Arc,
};
use tokio::task::{self, JoinHandle};

const MACHINE_ID_FILES: [&str; 2] = ["/etc/machine-id", "/var/lib/dbus/machine-id"];

/// Where standing subscriptions get their messages from. When several
/// subscriptions match a message, the one subscribed first receives it.
pub trait MessageSource {
    fn subscribe(&self, rule: MatchRule<'static>) -> UnboundedReceiver<Message>;
}

impl MessageSource for SyncConnection {
    fn subscribe(&self, rule: MatchRule<'static>) -> UnboundedReceiver<Message> {
        let (tx, rx) = mpsc::unbounded();
        self.start_receive(rule, Box::new(move |msg: Message, _: &SyncConnection| {
            tx.unbounded_send(msg).is_ok()
        }));
        rx
    }
}

/// The running dispatch loop.
pub struct Serving {
    tasks: Vec<JoinHandle<()>>,
}

impl Serving {
    /// Wait until every subscription has ended, which only happens when
    /// the connection goes away.
    pub async fn wait(self) {
        for t in self.tasks {
            let _: std::result::Result<_, _> = t.await;
        }
    }

    pub fn abort(&self) {
        for t in &self.tasks {
            t.abort()
        }
    }
}

struct ServerInner {
    bus: Bus,
    machine_id: Option<String>,
    objects: RwLock<Vec<Object>>,
}

fn read_machine_id() -> Option<String> {
    MACHINE_ID_FILES
        .iter()
        .find_map(|f| fs::read_to_string(f).ok())
        .map(|s| s.trim().to_owned())
        .filter(|s| !s.is_empty())
}

/// The object registry. Cloning is cheap, clones share the registry.
#[derive(Clone)]
pub struct ObjectServer(Arc<ServerInner>);

impl ObjectServer {
    /// The machine id answered to `Peer.GetMachineId` is read here, once.
    pub fn new(bus: Bus) -> Self {
        Self::with_machine_id(bus, read_machine_id())
    }

    fn with_machine_id(bus: Bus, machine_id: Option<String>) -> Self {
        if machine_id.is_none() {
            warn!("no machine id found in {:?}", MACHINE_ID_FILES)
        }
        ObjectServer(Arc::new(ServerInner {
            bus,
            machine_id,
            objects: RwLock::new(Vec::new()),
        }))
    }

    pub fn connection(&self) -> &Bus {
        &self.0.bus
    }

    /// Create an object at `path` and register it.
    pub fn add_object(&self, path: &str) -> Result<Object> {
        let path = strings::Path::new(path).map_err(|e| anyhow!("invalid object path {}", e))?;
        let obj = Object::new(self.0.bus.clone(), path)?;
        self.register_object(obj.clone());
        Ok(obj)
    }

    /// Append `obj` to the registry. An object already registered at the
    /// same path is replaced in place, and its interfaces that `obj` does
    /// not carry are announced with `InterfacesRemoved`.
    pub fn register_object(&self, obj: Object) {
        let replaced = {
            let mut objects = self.0.objects.write();
            match objects.iter_mut().find(|o| o.path() == obj.path()) {
                Some(o) => Some((mem::replace(o, obj.clone()), obj)),
                None => {
                    objects.push(obj);
                    None
                }
            }
        };
        if let Some((old, new)) = replaced {
            warn!("object {} replaced", &**old.path());
            let dropped = old
                .interfaces()
                .iter()
                .map(|i| i.name().to_owned())
                .filter(|n| new.interface(n).is_none())
                .collect::<Vec<_>>();
            if !dropped.is_empty() {
                self.interfaces_removed(&old, dropped)
            }
        }
    }

    fn interfaces_removed(&self, obj: &Object, names: Vec<String>) {
        match object_manager::interfaces_removed(obj.path(), names) {
            Ok(msg) => crate::send(&self.0.bus, msg, "InterfacesRemoved"),
            Err(e) => warn!("{}: {}", &**obj.path(), e),
        }
    }

    /// Remove the object at `path`, announcing its interfaces with
    /// `InterfacesRemoved`.
    pub fn remove_object(&self, path: &str) -> Option<Object> {
        let obj = {
            let mut objects = self.0.objects.write();
            let i = objects.iter().position(|o| &**o.path() == path)?;
            objects.remove(i)
        };
        let names = obj.interfaces().iter().map(|i| i.name().to_owned()).collect();
        self.interfaces_removed(&obj, names);
        Some(obj)
    }

    pub fn object(&self, path: &str) -> Option<Object> {
        self.0.objects.read().iter().find(|o| &**o.path() == path).cloned()
    }

    /// Objects in registration order.
    pub fn objects(&self) -> Vec<Object> {
        self.0.objects.read().clone()
    }

    pub fn introspect(&self, path: &str) -> String {
        introspect::introspect(path, &self.0.objects.read())
    }

    pub fn managed_objects(&self) -> ManagedObjects {
        object_manager::managed_objects(&self.0.objects.read())
    }

    fn reply(&self, msg: &Message, reply: Message, what: &str) {
        if !msg.get_no_reply() {
            crate::send(&self.0.bus, reply, what)
        }
    }

    pub fn handle_introspect(&self, msg: &Message) {
        let path = msg.path().map(|p| p.to_string()).unwrap_or_else(|| "/".into());
        debug!("introspect {}", path);
        let xml = self.introspect(&path);
        self.reply(msg, msg.method_return().append1(xml), "Introspect reply")
    }

    pub fn handle_get_managed_objects(&self, msg: &Message) {
        debug!("get managed objects");
        let objects = self.managed_objects();
        self.reply(msg, msg.method_return().append1(objects), "GetManagedObjects reply")
    }

    fn handle_peer(&self, msg: &Message) {
        match msg.member().as_deref() {
            Some("Ping") => self.reply(msg, msg.method_return(), "Ping reply"),
            Some("GetMachineId") => {
                let reply = match &self.0.machine_id {
                    Some(id) => Some(msg.method_return().append1(id.as_str())),
                    None => crate::error::error_reply(
                        msg,
                        "org.freedesktop.DBus.Error.FileNotFound",
                        "no machine id",
                    ),
                };
                if let Some(reply) = reply {
                    self.reply(msg, reply, "GetMachineId reply")
                }
            }
            m => debug!("no peer method {:?}", m),
        }
    }

    /// Route a method call to the object at its path. Calls to unknown
    /// paths, interfaces or methods get no reply.
    pub fn handle_method_call(&self, msg: &Message) {
        if msg.interface().as_deref() == Some(PEER_INTERFACE) {
            return self.handle_peer(msg);
        }
        let obj = msg.path().and_then(|p| self.object(&p));
        match obj {
            Some(obj) => {
                obj.call(msg);
            }
            None => debug!("method call for unknown object {:?}", msg.path()),
        }
    }

    /// Start the three standing subscriptions: `Introspect` calls,
    /// `GetManagedObjects` calls, and every other method call. Each is a
    /// task handling one message at a time in arrival order.
    pub fn serve<S: MessageSource + ?Sized>(&self, source: &S) -> Serving {
        let introspect_calls = source.subscribe(
            MatchRule::new()
                .with_type(MessageType::MethodCall)
                .with_interface(INTROSPECTABLE_INTERFACE)
                .with_member("Introspect"),
        );
        let managed_calls = source.subscribe(
            MatchRule::new()
                .with_type(MessageType::MethodCall)
                .with_interface(OBJECT_MANAGER_INTERFACE)
                .with_member("GetManagedObjects"),
        );
        let calls = source.subscribe(MatchRule::new().with_type(MessageType::MethodCall));
        let tasks = vec![
            self.spawn_loop("introspect", introspect_calls, ObjectServer::handle_introspect),
            self.spawn_loop(
                "object manager",
                managed_calls,
                ObjectServer::handle_get_managed_objects,
            ),
            self.spawn_loop("method call", calls, ObjectServer::handle_method_call),
        ];
        info!("serving {} objects", self.0.objects.read().len());
        Serving { tasks }
    }

    fn spawn_loop(
        &self,
        name: &'static str,
        mut rx: UnboundedReceiver<Message>,
        handle: fn(&ObjectServer, &Message),
    ) -> JoinHandle<()> {
        let server = self.clone();
        task::spawn(async move {
            while let Some(msg) = rx.next().await {
                if panic::catch_unwind(AssertUnwindSafe(|| handle(&server, &msg))).is_err() {
                    error!("{} handler panicked on {:?}", name, msg)
                }
            }
            debug!("{} subscription ended", name)
        })
    }
}
