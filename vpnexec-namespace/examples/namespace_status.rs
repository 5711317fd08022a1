//! Show the calling process's namespaces and the configured references
//!
//! Run with: cargo run --example namespace_status

use vpnexec_core::NamespaceKind;
use vpnexec_namespace::{LauncherConfig, NamespaceInfo};

fn main() {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let info = NamespaceInfo::current();
    println!("Current process: {info}");

    let config = LauncherConfig::default();
    for kind in [NamespaceKind::Mount, NamespaceKind::Network] {
        let path = config.path_for(kind);
        let state = if path.exists() { "present" } else { "missing" };
        println!("{kind:<8} reference {} ({state})", path.display());

        match info.differs_from_init(kind) {
            Some(true) => println!("         already outside init's {kind} namespace"),
            Some(false) => println!("         in init's {kind} namespace"),
            None => println!("         init's {kind} namespace not readable"),
        }
    }
}
