//! Privilege handling for vpn-exec
//!
//! This crate provides the one-way privilege drop performed before the
//! target command runs, and the probe proving it cannot be undone.

#![warn(missing_docs, clippy::all, clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]

pub mod privilege;

pub use privilege::{PrivilegeManager, PrivilegeOutcome};
