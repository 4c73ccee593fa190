//! Introspection XML synthesis.

use crate::{object::Object, INTROSPECTABLE_INTERFACE, OBJECT_MANAGER_INTERFACE, PEER_INTERFACE};
use fxhash::FxHashSet;
use std::{borrow::Cow, fmt::Write};

const DOCTYPE: &str = "<!DOCTYPE node PUBLIC \
    \"-//freedesktop//DTD D-BUS Object Introspection 1.0//EN\" \
    \"http://www.freedesktop.org/standards/dbus/1.0/introspect.dtd\">\n";

/// Escape `s` for use inside a double quoted attribute value.
fn escape(s: &str) -> Cow<'_, str> {
    if !s.contains(|c: char| matches!(c, '&' | '<' | '>' | '"' | '\'')) {
        return Cow::Borrowed(s);
    }
    let mut out = String::with_capacity(s.len() + 8);
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    Cow::Owned(out)
}

fn standard_interfaces(xml: &mut String) {
    let _ = write!(
        xml,
        r#"  <interface name="{PEER_INTERFACE}">
    <method name="Ping"/>
    <method name="GetMachineId">
      <arg type="s" name="machine_uuid" direction="out"/>
    </method>
  </interface>
  <interface name="{INTROSPECTABLE_INTERFACE}">
    <method name="Introspect">
      <arg type="s" name="xml_data" direction="out"/>
    </method>
  </interface>
  <interface name="{OBJECT_MANAGER_INTERFACE}">
    <method name="GetManagedObjects">
      <arg type="a{{oa{{sa{{sv}}}}}}" name="object_paths_interfaces_and_properties" direction="out"/>
    </method>
    <signal name="InterfacesAdded">
      <arg type="o" name="object_path"/>
      <arg type="a{{sa{{sv}}}}" name="interfaces_and_properties"/>
    </signal>
    <signal name="InterfacesRemoved">
      <arg type="o" name="object_path"/>
      <arg type="as" name="interfaces"/>
    </signal>
  </interface>
"#
    );
}

fn object_interfaces(xml: &mut String, obj: &Object) {
    for iface in obj.interfaces() {
        let _ = writeln!(xml, "  <interface name=\"{}\">", escape(iface.name()));
        for (name, method) in iface.methods() {
            let name = escape(&name);
            let args = method.args();
            if args.is_empty() {
                let _ = writeln!(xml, "    <method name=\"{}\"/>", name);
                continue;
            }
            let _ = writeln!(xml, "    <method name=\"{}\">", name);
            for arg in args {
                let _ = writeln!(
                    xml,
                    "      <arg name=\"{}\" type=\"{}\" direction=\"{}\"/>",
                    escape(&arg.name),
                    escape(&arg.signature),
                    arg.direction
                );
            }
            xml.push_str("    </method>\n");
        }
        for signal in iface.signals() {
            let name = escape(&signal.name);
            if signal.args.is_empty() {
                let _ = writeln!(xml, "    <signal name=\"{}\"/>", name);
                continue;
            }
            let _ = writeln!(xml, "    <signal name=\"{}\">", name);
            for arg in &signal.args {
                let _ = writeln!(
                    xml,
                    "      <arg name=\"{}\" type=\"{}\"/>",
                    escape(&arg.name),
                    escape(&arg.signature)
                );
            }
            xml.push_str("    </signal>\n");
        }
        // access is not tracked per property
        for (name, value) in iface.properties().iter() {
            let _ = writeln!(
                xml,
                "    <property name=\"{}\" type=\"{}\" access=\"readwrite\"/>",
                escape(name),
                escape(&value.signature())
            );
        }
        xml.push_str("  </interface>\n");
    }
}

/// The immediate child segment of `path` below `prefix`, if `path` is
/// strictly below it. `prefix` is the requested path with `/` mapped to
/// the empty string.
fn child_segment<'a>(prefix: &str, path: &'a str) -> Option<&'a str> {
    let rest = path.strip_prefix(prefix)?.strip_prefix('/')?;
    let segment = match rest.find('/') {
        Some(i) => &rest[..i],
        None => rest,
    };
    if segment.is_empty() {
        None
    } else {
        Some(segment)
    }
}

/// Build the introspection document for `path`. The object registered
/// exactly at `path`, if any, contributes its interfaces, every object
/// below it contributes one child node per distinct immediate segment.
pub fn introspect(path: &str, objects: &[Object]) -> String {
    let prefix = if path == "/" { "" } else { path };
    let mut children = FxHashSet::default();
    let mut xml = String::from(DOCTYPE);
    xml.push_str("<node>\n");
    for obj in objects {
        let obj_path: &str = obj.path();
        if obj_path == path {
            standard_interfaces(&mut xml);
            object_interfaces(&mut xml, obj);
        } else if let Some(segment) = child_segment(prefix, obj_path) {
            if children.insert(segment) {
                let _ = writeln!(xml, "  <node name=\"{}\"/>", escape(segment));
            }
        }
    }
    xml.push_str("</node>\n");
    xml
}
