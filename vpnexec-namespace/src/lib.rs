//! Joining pre-existing namespaces
//!
//! This crate moves the calling process into namespaces that something
//! else already created and pinned to the filesystem:
//! - Mount namespace - secondary tracking location
//! - Network namespace - standard `ip netns` registry
//!
//! It also carries the working directory across the mount namespace
//! switch and performs the final process replacement.

#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]

pub mod config;
pub mod executor;
pub mod manager;
pub mod workdir;

pub use config::LauncherConfig;
pub use executor::replace_process;
pub use manager::{NamespaceInfo, NamespaceManager};
pub use workdir::WorkingDirectory;
