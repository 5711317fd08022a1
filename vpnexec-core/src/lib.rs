//! vpn-exec Core - Foundation types, errors, and the system-call backend
//!
//! This crate provides the abstractions shared by every stage of the
//! launch pipeline: the error taxonomy, the value types passed between
//! stages, and the [`SystemBackend`] trait through which all kernel
//! interaction happens.

#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod backend;
pub mod error;
pub mod handle;
pub mod mock;
pub mod types;

pub use backend::{LinuxSystem, SystemBackend};
pub use error::{Error, NamespaceAction, PrivilegeError, Result, Warning};
pub use handle::ScopedHandle;
pub use mock::{Call, Fault, MockBackend, MockHandle};
pub use types::{CommandLine, Identity, NamespaceKind, Stage};

// Re-exported so dependants name ids without a direct nix dependency
pub use nix::unistd::{Gid, Uid};
