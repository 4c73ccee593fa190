use crate::{
    error::MethodError,
    interface::Interface,
    object_manager,
    properties::{PropertyMap, UpdateMode},
    value::Value,
    Bus, PROPERTIES_INTERFACE,
};
use anyhow::{bail, Result};
use dbus::{strings, Message};
use log::{debug, warn};
use parking_lot::RwLock;
use std::{
    collections::BTreeMap,
    sync::{Arc, Weak},
};

struct ObjectInner {
    path: strings::Path<'static>,
    bus: Bus,
    interfaces: RwLock<BTreeMap<String, Interface>>,
}

/// An addressable node. Every object carries a built-in
/// `org.freedesktop.DBus.Properties` interface forwarding to the
/// property stores of its other interfaces.
#[derive(Clone)]
pub struct Object(Arc<ObjectInner>);

fn upgrade(obj: &Weak<ObjectInner>) -> Result<Object, MethodError> {
    obj.upgrade()
        .map(Object)
        .ok_or_else(|| MethodError::Failed("object was removed".into()))
}

impl Object {
    pub fn new(bus: Bus, path: strings::Path<'static>) -> Result<Self> {
        let properties = Interface::new(PROPERTIES_INTERFACE, path.clone(), bus.clone())?;
        let obj = Arc::new_cyclic(|weak: &Weak<ObjectInner>| {
            let w = weak.clone();
            properties.register_method(
                "Get",
                move |(interface_name, property_name): (String, String)| {
                    let iface = upgrade(&w)?.find(&interface_name)?;
                    match iface.property(&property_name) {
                        Some(v) => Ok((v,)),
                        None => Err(MethodError::UnknownProperty(property_name)),
                    }
                },
            );
            let w = weak.clone();
            properties.register_method("GetAll", move |(interface_name,): (String,)| {
                let iface = upgrade(&w)?.find(&interface_name)?;
                Ok((iface.properties(),))
            });
            let w = weak.clone();
            properties.register_method(
                "Set",
                move |(interface_name, property_name, value): (String, String, Value)| {
                    let iface = upgrade(&w)?.find(&interface_name)?;
                    if strings::Member::new(property_name.as_str()).is_err() {
                        return Err(MethodError::InvalidArgs(format!(
                            "invalid property name {:?}",
                            property_name
                        )));
                    }
                    iface.set_properties([(property_name, value)], UpdateMode::ValueChangeOnly);
                    Ok(())
                },
            );
            ObjectInner { path, bus, interfaces: RwLock::new(BTreeMap::new()) }
        });
        let obj = Object(obj);
        obj.register_interface(properties)?;
        Ok(obj)
    }

    pub fn path(&self) -> &strings::Path<'static> {
        &self.0.path
    }

    pub fn connection(&self) -> &Bus {
        &self.0.bus
    }

    fn find(&self, name: &str) -> Result<Interface, MethodError> {
        self.interface(name)
            .ok_or_else(|| MethodError::UnknownInterface(name.to_owned()))
    }

    /// Create an interface on this object and register it.
    pub fn add_interface(&self, name: &str) -> Result<Interface> {
        let iface = Interface::new(name, self.0.path.clone(), self.0.bus.clone())?;
        self.register_interface(iface.clone())?;
        Ok(iface)
    }

    /// Add `iface` to the object, replacing any interface of the same
    /// name, and announce it with `InterfacesAdded` carrying its current
    /// properties.
    pub fn register_interface(&self, iface: Interface) -> Result<()> {
        if iface.path() != &self.0.path {
            bail!(
                "interface {} belongs to {}, not {}",
                iface.name(),
                &**iface.path(),
                &*self.0.path
            )
        }
        let props = iface.properties();
        let name = iface.name().to_owned();
        if self.0.interfaces.write().insert(name.clone(), iface).is_some() {
            warn!("{}: interface {} replaced", &*self.0.path, name)
        }
        match object_manager::interfaces_added(&self.0.path, vec![(name, props)]) {
            Ok(msg) => crate::send(&self.0.bus, msg, "InterfacesAdded"),
            Err(e) => warn!("{}: {}", &*self.0.path, e),
        }
        Ok(())
    }

    /// Remove interface `name` and announce it with `InterfacesRemoved`.
    pub fn remove_interface(&self, name: &str) -> Option<Interface> {
        let iface = self.0.interfaces.write().remove(name)?;
        match object_manager::interfaces_removed(&self.0.path, vec![name.to_owned()]) {
            Ok(msg) => crate::send(&self.0.bus, msg, "InterfacesRemoved"),
            Err(e) => warn!("{}: {}", &*self.0.path, e),
        }
        Some(iface)
    }

    pub fn interface(&self, name: &str) -> Option<Interface> {
        self.0.interfaces.read().get(name).cloned()
    }

    /// Interfaces ordered by name.
    pub fn interfaces(&self) -> Vec<Interface> {
        self.0.interfaces.read().values().cloned().collect()
    }

    pub(crate) fn interface_properties(&self) -> Vec<(String, PropertyMap)> {
        self.0
            .interfaces
            .read()
            .iter()
            .map(|(n, i)| (n.clone(), i.properties()))
            .collect()
    }

    /// Dispatch a method call to the interface it names. Returns false,
    /// and sends nothing, if the interface or the method is unknown.
    pub fn call(&self, msg: &Message) -> bool {
        let iface = match msg.interface() {
            Some(name) => self.interface(&name),
            None => None,
        };
        match iface {
            Some(iface) => iface.call(msg),
            None => {
                debug!("{}: no interface for {:?}", &*self.0.path, msg.interface());
                false
            }
        }
    }
}
