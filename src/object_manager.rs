//! `org.freedesktop.DBus.ObjectManager` payloads.

use crate::{object::Object, properties::PropertyMap, OBJECT_MANAGER_INTERFACE};
use anyhow::{anyhow, Result};
use dbus::{
    arg::{Append, Arg, ArgType, Get, Iter, IterAppend},
    strings::{Path, Signature},
    Message,
};

/// Interface name to properties, `a{sa{sv}}` on the wire.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InterfaceMap(pub Vec<(String, PropertyMap)>);

impl InterfaceMap {
    pub fn get(&self, name: &str) -> Option<&PropertyMap> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, p)| p)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(n, _)| n.as_str())
    }
}

impl Arg for InterfaceMap {
    const ARG_TYPE: ArgType = ArgType::Array;

    fn signature() -> Signature<'static> {
        Signature::from("a{sa{sv}}")
    }
}

impl Append for InterfaceMap {
    fn append_by_ref(&self, i: &mut IterAppend) {
        i.append_dict(&String::signature(), &PropertyMap::signature(), |s| {
            for (name, props) in &self.0 {
                s.append_dict_entry(|e| {
                    e.append(name.as_str());
                    props.append_by_ref(e);
                })
            }
        })
    }
}

impl<'a> Get<'a> for InterfaceMap {
    fn get(i: &mut Iter<'a>) -> Option<Self> {
        let mut entries = i.recurse(ArgType::Array)?;
        let mut map = Vec::new();
        while entries.arg_type() != ArgType::Invalid {
            let mut entry = entries.recurse(ArgType::DictEntry)?;
            let name: String = entry.read().ok()?;
            let props: PropertyMap = entry.get()?;
            map.push((name, props));
            entries.next();
        }
        Some(InterfaceMap(map))
    }
}

/// Object path to interfaces, the reply to `GetManagedObjects`,
/// `a{oa{sa{sv}}}` on the wire.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ManagedObjects(pub Vec<(Path<'static>, InterfaceMap)>);

impl ManagedObjects {
    pub fn get(&self, path: &str) -> Option<&InterfaceMap> {
        self.0.iter().find(|(p, _)| &**p == path).map(|(_, i)| i)
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(p, _)| &**p)
    }
}

impl Arg for ManagedObjects {
    const ARG_TYPE: ArgType = ArgType::Array;

    fn signature() -> Signature<'static> {
        Signature::from("a{oa{sa{sv}}}")
    }
}

impl Append for ManagedObjects {
    fn append_by_ref(&self, i: &mut IterAppend) {
        i.append_dict(&Path::signature(), &InterfaceMap::signature(), |s| {
            for (path, ifaces) in &self.0 {
                s.append_dict_entry(|e| {
                    path.append_by_ref(e);
                    ifaces.append_by_ref(e);
                })
            }
        })
    }
}

impl<'a> Get<'a> for ManagedObjects {
    fn get(i: &mut Iter<'a>) -> Option<Self> {
        let mut entries = i.recurse(ArgType::Array)?;
        let mut objects = Vec::new();
        while entries.arg_type() != ArgType::Invalid {
            let mut entry = entries.recurse(ArgType::DictEntry)?;
            let path: Path = entry.read().ok()?;
            let ifaces: InterfaceMap = entry.get()?;
            objects.push((path.into_static(), ifaces));
            entries.next();
        }
        Some(ManagedObjects(objects))
    }
}

/// Every object in registry order, with the current properties of each
/// of its interfaces.
pub fn managed_objects(objects: &[Object]) -> ManagedObjects {
    ManagedObjects(
        objects
            .iter()
            .map(|o| (o.path().clone(), InterfaceMap(o.interface_properties())))
            .collect(),
    )
}

pub fn interfaces_added(path: &Path<'static>, ifaces: Vec<(String, PropertyMap)>) -> Result<Message> {
    let msg = Message::new_signal(&**path, OBJECT_MANAGER_INTERFACE, "InterfacesAdded")
        .map_err(|e| anyhow!("can't build InterfacesAdded {}", e))?;
    Ok(msg.append2(path.clone(), InterfaceMap(ifaces)))
}

pub fn interfaces_removed(path: &Path<'static>, ifaces: Vec<String>) -> Result<Message> {
    let msg = Message::new_signal(&**path, OBJECT_MANAGER_INTERFACE, "InterfacesRemoved")
        .map_err(|e| anyhow!("can't build InterfacesRemoved {}", e))?;
    Ok(msg.append2(path.clone(), ifaces))
}
