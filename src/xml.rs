//! A typed view of introspection documents, for reading back what a
//! server (this one or any other) reports about an object.

use anyhow::Result;
use serde_xml_rs::from_str;

macro_rules! get_vec {
    ($vec:expr, $kind:path) => {
        $vec.iter()
            .filter_map(|e| if let $kind(m) = e { Some(m) } else { None })
            .collect()
    };
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Annotation {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Arg {
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub typ: String,
    pub direction: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(rename_all = "lowercase")]
enum MemberElement {
    Arg(Arg),
    Annotation(Annotation),
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Method {
    pub name: String,

    #[serde(rename = "$value", default)]
    elems: Vec<MemberElement>,
}

impl Method {
    pub fn args(&self) -> Vec<&Arg> {
        get_vec!(self.elems, MemberElement::Arg)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Signal {
    pub name: String,

    #[serde(rename = "$value", default)]
    elems: Vec<MemberElement>,
}

impl Signal {
    pub fn args(&self) -> Vec<&Arg> {
        get_vec!(self.elems, MemberElement::Arg)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Property {
    pub name: String,
    #[serde(rename = "type")]
    pub typ: String,
    pub access: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(rename_all = "lowercase")]
enum InterfaceElement {
    Method(Method),
    Signal(Signal),
    Property(Property),
    Annotation(Annotation),
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Interface {
    pub name: String,

    #[serde(rename = "$value", default)]
    elems: Vec<InterfaceElement>,
}

impl Interface {
    pub fn methods(&self) -> Vec<&Method> {
        get_vec!(self.elems, InterfaceElement::Method)
    }

    pub fn signals(&self) -> Vec<&Signal> {
        get_vec!(self.elems, InterfaceElement::Signal)
    }

    pub fn properties(&self) -> Vec<&Property> {
        get_vec!(self.elems, InterfaceElement::Property)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(rename_all = "lowercase")]
enum NodeElement {
    Node(Node),
    Interface(Interface),
}

/// A node of the introspection tree. Child nodes only carry a name.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Node {
    pub name: Option<String>,

    #[serde(rename = "$value", default)]
    elems: Vec<NodeElement>,
}

impl Node {
    pub fn nodes(&self) -> Vec<&Node> {
        get_vec!(self.elems, NodeElement::Node)
    }

    pub fn interfaces(&self) -> Vec<&Interface> {
        get_vec!(self.elems, NodeElement::Interface)
    }

    pub fn interface(&self, name: &str) -> Option<&Interface> {
        self.interfaces().into_iter().find(|i| i.name == name)
    }
}

// the DTD reference carries nothing we read
fn strip_doctype(s: &str) -> &str {
    let t = s.trim_start();
    if t.starts_with("<!DOCTYPE") {
        match t.find('>') {
            Some(i) => &t[i + 1..],
            None => t,
        }
    } else {
        t
    }
}

impl std::str::FromStr for Node {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(from_str(strip_doctype(s))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"<!DOCTYPE node PUBLIC "-//freedesktop//DTD D-BUS Object Introspection 1.0//EN" "http://www.freedesktop.org/standards/dbus/1.0/introspect.dtd">
<node>
  <interface name="com.example.Iface">
    <method name="Add">
      <arg name="arg_0" type="u" direction="in"/>
      <arg name="out_0" type="u" direction="out"/>
    </method>
    <signal name="Happened">
      <arg name="arg_0" type="s"/>
    </signal>
    <property name="Foo" type="i" access="readwrite"/>
  </interface>
  <node name="child"/>
</node>
"#;

    #[test]
    fn parse_document() {
        let node: Node = DOC.parse().unwrap();
        assert!(node.name.is_none());
        let iface = node.interface("com.example.Iface").unwrap();
        assert_eq!(iface.methods()[0].args().len(), 2);
        assert_eq!(iface.signals()[0].args()[0].typ, "s");
        assert_eq!(iface.properties()[0].access, "readwrite");
        assert_eq!(node.nodes()[0].name.as_deref(), Some("child"));
    }

    #[test]
    fn doctype_is_skipped() {
        assert_eq!(strip_doctype("  <!DOCTYPE x>\n<node/>"), "\n<node/>");
        assert_eq!(strip_doctype("<node/>"), "<node/>");
    }
}
