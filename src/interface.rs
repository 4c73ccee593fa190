use crate::{
    error::MethodError,
    marshal::{ArgDescriptor, ArgList, Direction},
    method::{self, Method, TypedMethod},
    properties::{PropertyMap, PropertyStore, UpdateMode},
    value::Value,
    Bus, PROPERTIES_INTERFACE,
};
use anyhow::{anyhow, Result};
use dbus::{strings, Message};
use log::{debug, warn};
use parking_lot::{Mutex, RwLock};
use std::{collections::BTreeMap, sync::Arc};

/// A declared signal. Signals are listed by introspection, sending them
/// is up to the owner of the interface, see [`Interface::emit_signal`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalDescriptor {
    pub name: String,
    pub args: Vec<ArgDescriptor>,
}

impl SignalDescriptor {
    pub fn new<A: ArgList>(name: &str) -> Self {
        let args = A::descriptors(Direction::Out)
            .into_iter()
            .enumerate()
            .map(|(i, mut arg)| {
                arg.name = format!("arg_{}", i);
                arg
            })
            .collect();
        SignalDescriptor { name: name.to_owned(), args }
    }
}

fn valid_member(name: &str) -> bool {
    strings::Member::new(name).is_ok()
}

struct InterfaceInner {
    name: String,
    path: strings::Path<'static>,
    bus: Bus,
    methods: RwLock<BTreeMap<String, Arc<dyn Method>>>,
    signals: RwLock<BTreeMap<String, SignalDescriptor>>,
    properties: Mutex<PropertyStore>,
}

/// A named bundle of methods, signals and properties living at one
/// object path. Cloning is cheap, clones share the same state.
#[derive(Clone)]
pub struct Interface(Arc<InterfaceInner>);

impl Interface {
    pub fn new(name: &str, path: strings::Path<'static>, bus: Bus) -> Result<Self> {
        strings::Interface::new(name).map_err(|e| anyhow!("invalid interface name {}: {}", name, e))?;
        Ok(Interface(Arc::new(InterfaceInner {
            name: name.to_owned(),
            path,
            bus,
            methods: RwLock::new(BTreeMap::new()),
            signals: RwLock::new(BTreeMap::new()),
            properties: Mutex::new(PropertyStore::new()),
        })))
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn path(&self) -> &strings::Path<'static> {
        &self.0.path
    }

    pub fn connection(&self) -> &Bus {
        &self.0.bus
    }

    /// Bind `handler` to `name`. The argument and result signatures are
    /// taken from the handler's tuple types. A method already registered
    /// under `name` is replaced.
    pub fn register_method<IA, OA, F>(&self, name: &str, handler: F)
    where
        IA: ArgList + 'static,
        OA: ArgList + 'static,
        F: Fn(IA) -> Result<OA, MethodError> + Send + Sync + 'static,
    {
        self.register(name, Arc::new(TypedMethod::new(handler)))
    }

    /// Invalid member names are refused and logged.
    pub fn register(&self, name: &str, method: Arc<dyn Method>) {
        if !valid_member(name) {
            warn!("{} {}: invalid method name {:?}", &*self.0.path, self.0.name, name);
            return;
        }
        if self.0.methods.write().insert(name.to_owned(), method).is_some() {
            warn!("{} {}: method {} replaced", &*self.0.path, self.0.name, name)
        }
    }

    pub fn method(&self, name: &str) -> Option<Arc<dyn Method>> {
        self.0.methods.read().get(name).cloned()
    }

    /// Registered methods ordered by name.
    pub fn methods(&self) -> Vec<(String, Arc<dyn Method>)> {
        self.0.methods.read().iter().map(|(n, m)| (n.clone(), m.clone())).collect()
    }

    pub fn register_signal<A: ArgList>(&self, name: &str) {
        if !valid_member(name) {
            warn!("{} {}: invalid signal name {:?}", &*self.0.path, self.0.name, name);
            return;
        }
        let sig = SignalDescriptor::new::<A>(name);
        if self.0.signals.write().insert(name.to_owned(), sig).is_some() {
            warn!("{} {}: signal {} replaced", &*self.0.path, self.0.name, name)
        }
    }

    pub fn signals(&self) -> Vec<SignalDescriptor> {
        self.0.signals.read().values().cloned().collect()
    }

    pub fn property(&self, name: &str) -> Option<Value> {
        self.0.properties.lock().get(name).cloned()
    }

    /// A snapshot of the current property values.
    pub fn properties(&self) -> PropertyMap {
        self.0.properties.lock().snapshot()
    }

    pub fn set_property<V: Into<Value>>(&self, name: &str, value: V, mode: UpdateMode) {
        self.set_properties([(name.to_owned(), value.into())], mode)
    }

    /// Write `updates` to the store and announce them with
    /// `PropertiesChanged`. In the default mode only new or changed
    /// values are written and announced, and nothing is sent when nothing
    /// changed. Entries whose name is not a valid member name are dropped.
    pub fn set_properties<I>(&self, updates: I, mode: UpdateMode)
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        let updates = updates.into_iter().filter(|(name, _)| {
            let valid = valid_member(name);
            if !valid {
                warn!("{} {}: invalid property name {:?}", &*self.0.path, self.0.name, name)
            }
            valid
        });
        let changed = self.0.properties.lock().apply(updates, mode);
        if changed.is_empty() && mode == UpdateMode::ValueChangeOnly {
            return;
        }
        match Message::new_signal(&*self.0.path, PROPERTIES_INTERFACE, "PropertiesChanged") {
            Err(e) => warn!("{} {}: can't build PropertiesChanged {}", &*self.0.path, self.0.name, e),
            Ok(msg) => {
                let msg = msg.append3(self.0.name.as_str(), changed, Vec::<String>::new());
                crate::send(&self.0.bus, msg, "PropertiesChanged")
            }
        }
    }

    /// Send signal `name` from this interface's path.
    pub fn emit_signal<A: ArgList>(&self, name: &str, args: A) -> Result<()> {
        if !self.0.signals.read().contains_key(name) {
            debug!("{} {}: emitting undeclared signal {}", &*self.0.path, self.0.name, name)
        }
        let mut msg = Message::new_signal(&*self.0.path, self.0.name.as_str(), name)
            .map_err(|e| anyhow!("invalid signal {}: {}", name, e))?;
        args.append_to(&mut msg);
        crate::send(&self.0.bus, msg, name);
        Ok(())
    }

    /// Dispatch a method call by member name. Returns false, and sends
    /// nothing, when no method of that name is registered.
    pub fn call(&self, msg: &Message) -> bool {
        let member = match msg.member() {
            Some(m) => m.to_string(),
            None => return false,
        };
        match self.method(&member) {
            None => {
                debug!("{} {}: no method {}", &*self.0.path, self.0.name, member);
                false
            }
            Some(m) => {
                method::dispatch(&self.0.bus, &member, &*m, msg);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingBus;

    fn iface() -> (Interface, crate::testing::Recorded) {
        let (bus, sent) = RecordingBus::new();
        let path = strings::Path::new("/a").unwrap();
        (Interface::new("com.example.Iface", path, bus).unwrap(), sent)
    }

    #[test]
    fn invalid_names_are_refused() {
        let (bus, _) = RecordingBus::new();
        let path = strings::Path::new("/a").unwrap();
        assert!(Interface::new("not an interface", path, bus).is_err());
    }

    #[test]
    fn invalid_member_names_are_refused() {
        let (i, sent) = iface();
        i.register_method("Bad\"/>", |()| Ok(()));
        i.register_signal::<()>("also bad");
        i.set_properties(
            [("x\" y=\"".to_owned(), Value::U32(1)), ("Good".to_owned(), Value::U32(2))],
            UpdateMode::ValueChangeOnly,
        );
        assert!(i.methods().is_empty());
        assert!(i.signals().is_empty());
        assert_eq!(i.properties().names().collect::<Vec<_>>(), vec!["Good"]);
        let (_, changed, _): (String, PropertyMap, Vec<String>) =
            sent.signals("PropertiesChanged")[0].read3().unwrap();
        assert_eq!(changed.names().collect::<Vec<_>>(), vec!["Good"]);
    }

    #[test]
    fn unchanged_value_is_announced_once() {
        let (i, sent) = iface();
        i.set_property("Foo", 42i32, UpdateMode::ValueChangeOnly);
        i.set_property("Foo", 42i32, UpdateMode::ValueChangeOnly);
        let signals = sent.signals("PropertiesChanged");
        assert_eq!(signals.len(), 1);
        let (name, changed, invalidated): (String, PropertyMap, Vec<String>) =
            signals[0].read3().unwrap();
        assert_eq!(name, "com.example.Iface");
        assert_eq!(changed.get("Foo"), Some(&Value::I32(42)));
        assert!(invalidated.is_empty());
        assert_eq!(signals[0].path().as_deref(), Some("/a"));
        assert_eq!(signals[0].interface().as_deref(), Some(PROPERTIES_INTERFACE));
        assert_eq!(i.property("Foo"), Some(Value::I32(42)));
    }

    #[test]
    fn forced_value_is_always_announced() {
        let (i, sent) = iface();
        i.set_property("Foo", 1u8, UpdateMode::Force);
        i.set_property("Foo", 1u8, UpdateMode::Force);
        assert_eq!(sent.signals("PropertiesChanged").len(), 2);
    }

    #[test]
    fn only_the_diff_is_announced() {
        let (i, sent) = iface();
        i.set_properties(
            [("A".to_owned(), Value::U32(1)), ("B".to_owned(), Value::U32(2))],
            UpdateMode::ValueChangeOnly,
        );
        i.set_properties(
            [("A".to_owned(), Value::U32(1)), ("B".to_owned(), Value::U32(3))],
            UpdateMode::ValueChangeOnly,
        );
        let signals = sent.signals("PropertiesChanged");
        assert_eq!(signals.len(), 2);
        let (_, changed, _): (String, PropertyMap, Vec<String>) = signals[1].read3().unwrap();
        assert_eq!(changed.names().collect::<Vec<_>>(), vec!["B"]);
    }

    #[test]
    fn last_registration_wins() {
        let (i, sent) = iface();
        i.register_method("Get", |()| Ok((1u32,)));
        i.register_method("Get", |()| Ok((2u32,)));
        assert_eq!(i.methods().len(), 1);
        let mut call =
            Message::new_method_call("com.example", "/a", "com.example.Iface", "Get").unwrap();
        call.set_serial(1);
        assert!(i.call(&call));
        assert_eq!(sent.take()[0].read1::<u32>().unwrap(), 2);
    }

    #[test]
    fn unknown_method_is_dropped() {
        let (i, sent) = iface();
        i.register_method("Get", |()| Ok((1u32,)));
        let mut call =
            Message::new_method_call("com.example", "/a", "com.example.Iface", "Nope").unwrap();
        call.set_serial(1);
        assert!(!i.call(&call));
        assert!(sent.take().is_empty());
    }

    #[test]
    fn signals_are_declared_and_emitted() {
        let (i, sent) = iface();
        i.register_signal::<(String, u32)>("Changed");
        let s = &i.signals()[0];
        assert_eq!(s.name, "Changed");
        assert_eq!(s.args[1].name, "arg_1");
        assert_eq!(&*s.args[1].signature, "u");
        i.emit_signal("Changed", (String::from("x"), 3u32)).unwrap();
        let signals = sent.signals("Changed");
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].interface().as_deref(), Some("com.example.Iface"));
        assert_eq!(signals[0].read2::<String, u32>().unwrap(), (String::from("x"), 3));
    }
}
