use anyhow::{anyhow, Result};
use dbus::nonblock::SyncConnection;
use dbus_objects::{xml, Interface, MethodError, ObjectServer, UpdateMode};
use log::{info, warn};
use std::{
    sync::Arc,
    time::{Duration, Instant},
};
use structopt::StructOpt;
use tokio::{task, time};

#[derive(StructOpt, Debug)]
struct Params {
    #[structopt(long = "system", help = "connect to the system bus instead of the session bus")]
    system: bool,
    #[structopt(
        short = "n",
        long = "name",
        help = "the well known name to request",
        default_value = "org.example.ObjectServer"
    )]
    name: String,
    #[structopt(
        short = "b",
        long = "base",
        help = "the object path to publish under",
        default_value = "/org/example"
    )]
    base: String,
    #[structopt(
        long = "interval",
        help = "how often to update the uptime property (seconds)",
        default_value = "5"
    )]
    interval: u64,
    #[structopt(long = "print-tree", help = "print the object tree and exit")]
    print_tree: bool,
}

fn print_obj(api: &xml::Node, path: &str) {
    for iface in api.interfaces() {
        println!(
            "obj {}, interface {}, methods {}, signals {}, properties {}",
            path,
            &iface.name,
            iface.methods().len(),
            iface.signals().len(),
            iface.properties().len()
        );
    }
    for child in api.nodes() {
        if let Some(name) = child.name.as_ref() {
            if path == "/" {
                println!("obj {}, child /{}", path, name)
            } else {
                println!("obj {}, child {}/{}", path, path, name)
            }
        }
    }
}

fn counter(server: &ObjectServer, base: &str) -> Result<Interface> {
    let obj = server.add_object(&format!("{}/counter", base.trim_end_matches('/')))?;
    let iface = obj.add_interface("org.example.Counter")?;
    iface.set_property("Count", 0u32, UpdateMode::ValueChangeOnly);
    iface.set_property("Uptime", 0u64, UpdateMode::ValueChangeOnly);
    iface.register_signal::<(u64,)>("Tick");
    iface.register_signal::<()>("Reset");
    let this = iface.clone();
    iface.register_method("Increment", move |(by,): (u32,)| {
        let count = this.property("Count").and_then(|v| v.as_i64()).unwrap_or(0) as u32;
        let count = count
            .checked_add(by)
            .ok_or_else(|| MethodError::InvalidArgs(format!("count would overflow by {}", by)))?;
        this.set_property("Count", count, UpdateMode::ValueChangeOnly);
        Ok((count,))
    });
    let this = iface.clone();
    iface.register_method("Reset", move |()| {
        this.set_property("Count", 0u32, UpdateMode::Force);
        this.emit_signal("Reset", ())
            .map_err(|e| MethodError::Failed(e.to_string()))
    });
    Ok(iface)
}

async fn tick(iface: Interface, interval: u64) {
    let start = Instant::now();
    let mut interval = time::interval(Duration::from_secs(interval.max(1)));
    loop {
        interval.tick().await;
        let uptime = start.elapsed().as_secs();
        iface.set_property("Uptime", uptime, UpdateMode::ValueChangeOnly);
        if let Err(e) = iface.emit_signal("Tick", (uptime,)) {
            warn!("failed to send tick {}", e)
        }
    }
}

fn connect(system: bool) -> Result<Arc<SyncConnection>> {
    let (resource, con) = if system {
        dbus_tokio::connection::new_system_sync()?
    } else {
        dbus_tokio::connection::new_session_sync()?
    };
    task::spawn(async move {
        let e = resource.await;
        warn!("lost connection to dbus {}", e)
    });
    Ok(con)
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let opts = Params::from_args();
    let con = connect(opts.system)?;
    let server = ObjectServer::new(con.clone());
    let iface = counter(&server, &opts.base)?;
    if opts.print_tree {
        for obj in server.objects() {
            let api: xml::Node = server.introspect(obj.path()).parse()?;
            print_obj(&api, obj.path())
        }
        return Ok(());
    }
    let serving = server.serve(&*con);
    con.request_name(opts.name.as_str(), false, true, false)
        .await
        .map_err(|e| anyhow!("failed to acquire {} {}", opts.name, e))?;
    info!("serving as {} under {}", opts.name, opts.base);
    task::spawn(tick(iface, opts.interval));
    serving.wait().await;
    Ok(())
}
