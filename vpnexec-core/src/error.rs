//! Error types for vpn-exec

use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::types::NamespaceKind;

/// What was being done to a namespace reference when it failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamespaceAction {
    /// Opening the reference path
    Open,
    /// Joining the namespace with setns(2)
    Enter,
}

impl fmt::Display for NamespaceAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => f.write_str("open"),
            Self::Enter => f.write_str("enter"),
        }
    }
}

/// Fatal vpn-exec errors
///
/// Every variant terminates the run with exit status 1.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Missing or malformed invocation arguments
    #[error("{message}")]
    Usage {
        /// Error message
        message: String,
    },

    /// A namespace reference could not be opened or joined
    #[error("Failed to {action} {kind} namespace ({}): {source}", .path.display())]
    Namespace {
        /// Namespace being entered
        kind: NamespaceKind,
        /// Step that failed
        action: NamespaceAction,
        /// Reference path
        path: PathBuf,
        /// Underlying OS error
        source: io::Error,
    },

    /// A held handle could not be released
    #[error("Failed to close {resource}: {source}")]
    Resource {
        /// What the handle referred to
        resource: String,
        /// Underlying OS error
        source: io::Error,
    },

    /// Privilege could not be dropped, or was not dropped for good
    #[error(transparent)]
    Privilege(#[from] PrivilegeError),

    /// The target command could not be started
    #[error("Failed to execute {program}: {source}")]
    Exec {
        /// Target program as given on the command line
        program: String,
        /// Underlying OS error
        source: io::Error,
    },

    /// Invalid configuration
    #[error("Invalid configuration: {message}")]
    InvalidConfig {
        /// Error message
        message: String,
    },
}

impl Error {
    /// Shorthand for a [`Error::Usage`]
    #[must_use]
    pub fn usage(message: impl Into<String>) -> Self {
        Self::Usage {
            message: message.into(),
        }
    }
}

/// Privilege drop failures
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum PrivilegeError {
    /// The set{u,g}id call that lowers privilege failed
    #[error("Failed to drop elevated {what} privilege to {id}: {source}")]
    DropFailed {
        /// "user" or "group"
        what: &'static str,
        /// Target id
        id: u32,
        /// Underlying OS error
        source: io::Error,
    },

    /// Elevated identity could be regained after the drop
    #[error("Failed to properly drop elevated privileges: {what} id {id} can still be regained")]
    Reversible {
        /// "user" or "group"
        what: &'static str,
        /// Id that was regained
        id: u32,
    },
}

/// Non-fatal conditions
///
/// These are logged and the pipeline continues with the working
/// directory possibly differing from the caller's.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Warning {
    /// The current directory could not be read or opened
    #[error("Failed to capture current directory: {source}")]
    CwdCapture {
        /// Underlying OS error
        source: io::Error,
    },

    /// The captured directory could not be re-entered
    #[error("Failed to restore current directory ({}): {source}", .path.display())]
    CwdRestore {
        /// Directory path at capture time
        path: PathBuf,
        /// Underlying OS error
        source: io::Error,
    },
}

/// Result type alias for vpn-exec operations
pub type Result<T> = std::result::Result<T, Error>;
