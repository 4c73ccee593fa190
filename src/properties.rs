use crate::value::Value;
use dbus::{
    arg::{Append, Arg, ArgType, Get, Iter, IterAppend},
    strings::Signature,
};
use fxhash::FxHashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpdateMode {
    /// Only entries that are new or differ from the stored value are
    /// written and announced.
    #[default]
    ValueChangeOnly,
    /// Every entry is written and the whole update is announced.
    Force,
}

/// An ordered property name to value mapping. Enumeration follows
/// insertion order, inserting an existing name keeps its position. On
/// the wire this is `a{sv}`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropertyMap(Vec<(String, Value)>);

impl PropertyMap {
    pub fn new() -> Self {
        PropertyMap(Vec::new())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn insert(&mut self, name: String, value: Value) {
        match self.0.iter_mut().find(|(n, _)| *n == name) {
            Some((_, v)) => *v = value,
            None => self.0.push((name, value)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(n, _)| n.as_str())
    }
}

impl FromIterator<(String, Value)> for PropertyMap {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        let mut map = PropertyMap::new();
        for (n, v) in iter {
            map.insert(n, v)
        }
        map
    }
}

impl IntoIterator for PropertyMap {
    type Item = (String, Value);
    type IntoIter = std::vec::IntoIter<(String, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl Arg for PropertyMap {
    const ARG_TYPE: ArgType = ArgType::Array;

    fn signature() -> Signature<'static> {
        Signature::from("a{sv}")
    }
}

impl Append for PropertyMap {
    fn append_by_ref(&self, i: &mut IterAppend) {
        i.append_dict(&String::signature(), &<Value as Arg>::signature(), |s| {
            for (name, value) in &self.0 {
                s.append_dict_entry(|e| {
                    e.append(name.as_str());
                    value.append_by_ref(e);
                })
            }
        })
    }
}

impl<'a> Get<'a> for PropertyMap {
    fn get(i: &mut Iter<'a>) -> Option<Self> {
        let mut entries = i.recurse(ArgType::Array)?;
        let mut map = PropertyMap::new();
        while entries.arg_type() != ArgType::Invalid {
            let mut entry = entries.recurse(ArgType::DictEntry)?;
            let name: String = entry.read().ok()?;
            let value: Value = entry.get()?;
            map.insert(name, value);
            entries.next();
        }
        Some(map)
    }
}

/// The property values of one interface.
#[derive(Debug, Default)]
pub struct PropertyStore {
    values: PropertyMap,
    index: FxHashMap<String, usize>,
}

impl PropertyStore {
    pub fn new() -> Self {
        PropertyStore::default()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.index.get(name).map(|i| &self.values.0[*i].1)
    }

    pub fn snapshot(&self) -> PropertyMap {
        self.values.clone()
    }

    fn write(&mut self, name: String, value: Value) {
        match self.index.get(&name) {
            Some(i) => self.values.0[*i].1 = value,
            None => {
                self.index.insert(name.clone(), self.values.0.len());
                self.values.0.push((name, value));
            }
        }
    }

    /// Apply `updates` and return what has to be announced. In
    /// `ValueChangeOnly` mode unchanged entries are neither written nor
    /// returned. Values with different tags always compare unequal. In
    /// `Force` mode every update is returned, repeated names included.
    pub fn apply<I>(&mut self, updates: I, mode: UpdateMode) -> PropertyMap
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        let mut changed = PropertyMap::new();
        for (name, value) in updates {
            match mode {
                // repeated names are announced as often as they were given
                UpdateMode::Force => {
                    self.write(name.clone(), value.clone());
                    changed.0.push((name, value));
                }
                UpdateMode::ValueChangeOnly => {
                    if self.get(&name) != Some(&value) {
                        self.write(name.clone(), value.clone());
                        changed.insert(name, value);
                    }
                }
            }
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbus::Message;

    fn updates(v: &[(&str, Value)]) -> Vec<(String, Value)> {
        v.iter().map(|(n, v)| (n.to_string(), v.clone())).collect()
    }

    #[test]
    fn change_gated_apply() {
        let mut store = PropertyStore::new();
        let d = store.apply(updates(&[("Foo", Value::U32(1))]), UpdateMode::ValueChangeOnly);
        assert_eq!(d.len(), 1);
        let d = store.apply(updates(&[("Foo", Value::U32(1))]), UpdateMode::ValueChangeOnly);
        assert!(d.is_empty());
        assert_eq!(store.get("Foo"), Some(&Value::U32(1)));
        // same payload, different tag
        let d = store.apply(updates(&[("Foo", Value::I32(1))]), UpdateMode::ValueChangeOnly);
        assert_eq!(d.get("Foo"), Some(&Value::I32(1)));
    }

    #[test]
    fn diff_contains_only_changes() {
        let mut store = PropertyStore::new();
        store.apply(
            updates(&[("A", Value::from("a")), ("B", Value::from(true))]),
            UpdateMode::ValueChangeOnly,
        );
        let d = store.apply(
            updates(&[("A", Value::from("a")), ("B", Value::from(false)), ("C", Value::Byte(9))]),
            UpdateMode::ValueChangeOnly,
        );
        assert_eq!(d.names().collect::<Vec<_>>(), vec!["B", "C"]);
        assert_eq!(store.snapshot().names().collect::<Vec<_>>(), vec!["A", "B", "C"]);
    }

    #[test]
    fn forced_apply_announces_everything() {
        let mut store = PropertyStore::new();
        store.apply(updates(&[("A", Value::U16(5))]), UpdateMode::Force);
        let d = store.apply(updates(&[("A", Value::U16(5))]), UpdateMode::Force);
        assert_eq!(d.get("A"), Some(&Value::U16(5)));
        assert_eq!(store.get("A"), Some(&Value::U16(5)));
    }

    #[test]
    fn forced_batch_is_announced_in_full() {
        let mut store = PropertyStore::new();
        let d = store.apply(
            updates(&[("A", Value::U16(1)), ("B", Value::U16(2)), ("A", Value::U16(3))]),
            UpdateMode::Force,
        );
        let v: Vec<_> = d.iter().map(|(n, v)| (n.to_owned(), v.clone())).collect();
        let expected: Vec<(String, Value)> = vec![
            ("A".into(), Value::U16(1)),
            ("B".into(), Value::U16(2)),
            ("A".into(), Value::U16(3)),
        ];
        assert_eq!(v, expected);
        assert_eq!(store.get("A"), Some(&Value::U16(3)));
    }

    #[test]
    fn nan_is_announced_once() {
        let mut store = PropertyStore::new();
        let d = store.apply(updates(&[("X", Value::F64(f64::NAN))]), UpdateMode::ValueChangeOnly);
        assert_eq!(d.len(), 1);
        let d = store.apply(updates(&[("X", Value::F64(f64::NAN))]), UpdateMode::ValueChangeOnly);
        assert!(d.is_empty());
    }

    #[test]
    fn map_keeps_insertion_order() {
        let mut m = PropertyMap::new();
        m.insert("z".into(), Value::U32(1));
        m.insert("a".into(), Value::U32(2));
        m.insert("z".into(), Value::U32(3));
        let v: Vec<_> = m.iter().map(|(n, v)| (n.to_owned(), v.clone())).collect();
        assert_eq!(v, vec![(String::from("z"), Value::U32(3)), (String::from("a"), Value::U32(2))]);
    }

    #[test]
    fn map_on_the_wire() {
        let m: PropertyMap = updates(&[("Foo", Value::I32(42)), ("Bar", Value::from("x"))])
            .into_iter()
            .collect();
        let msg = Message::new_method_call("com.example", "/", "com.example.Iface", "Foo")
            .unwrap()
            .append1(m.clone());
        assert_eq!(&*msg.iter_init().signature(), "a{sv}");
        assert_eq!(msg.read1::<PropertyMap>().unwrap(), m);
    }
}
