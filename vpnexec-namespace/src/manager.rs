//! Namespace entry

use std::fmt;
use std::fs;

use vpnexec_core::{Error, NamespaceAction, NamespaceKind, Result, ScopedHandle, SystemBackend};

use crate::config::LauncherConfig;

/// Joins the namespaces named by a [`LauncherConfig`]
#[derive(Debug)]
pub struct NamespaceManager<'a, B: SystemBackend> {
    backend: &'a B,
    config: &'a LauncherConfig,
}

impl<'a, B: SystemBackend> NamespaceManager<'a, B> {
    /// Create a new namespace manager
    #[must_use]
    pub const fn new(backend: &'a B, config: &'a LauncherConfig) -> Self {
        Self { backend, config }
    }

    /// Get the configuration
    #[must_use]
    pub const fn config(&self) -> &LauncherConfig {
        self.config
    }

    /// Join the configured namespace of `kind`
    ///
    /// Opens the reference, calls setns(2) with it and closes it again.
    /// The reference is released on every path; a failed close after a
    /// successful join is reported as [`Error::Resource`].
    ///
    /// # Errors
    /// Returns [`Error::Namespace`] if the reference cannot be opened or
    /// joined
    pub fn enter(&self, kind: NamespaceKind) -> Result<()> {
        let path = self.config.path_for(kind);
        let label = format!("{kind} namespace reference");

        tracing::debug!(namespace = %kind, path = %path.display(), "Opening namespace reference");

        let handle = self.backend.open_namespace(path).map_err(|source| {
            tracing::debug!(
                namespace = %kind,
                path = %path.display(),
                error = %source,
                "Failed to open namespace reference"
            );
            Error::Namespace {
                kind,
                action: NamespaceAction::Open,
                path: path.to_path_buf(),
                source,
            }
        })?;
        let reference = ScopedHandle::new(self.backend, handle, label.clone());

        self.backend
            .enter_namespace(reference.get(), kind)
            .map_err(|source| {
                tracing::debug!(
                    namespace = %kind,
                    path = %path.display(),
                    error = %source,
                    "Failed to enter namespace"
                );
                Error::Namespace {
                    kind,
                    action: NamespaceAction::Enter,
                    path: path.to_path_buf(),
                    source,
                }
            })?;

        reference.release().map_err(|source| Error::Resource {
            resource: label,
            source,
        })?;

        tracing::debug!(namespace = %kind, "Entered namespace");

        Ok(())
    }
}

/// Namespace identities of a process, as read from `/proc/<pid>/ns`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NamespaceInfo {
    /// Mount namespace ID
    pub mnt: Option<String>,
    /// Network namespace ID
    pub net: Option<String>,
}

impl NamespaceInfo {
    /// Namespaces of the calling process
    #[must_use]
    pub fn current() -> Self {
        Self::read("self")
    }

    /// Namespaces of a specific PID
    #[must_use]
    pub fn for_pid(pid: u32) -> Self {
        Self::read(&pid.to_string())
    }

    fn read(pid: &str) -> Self {
        let read_ns = |kind: NamespaceKind| -> Option<String> {
            let path = format!("/proc/{pid}/ns/{}", kind.proc_name());
            fs::read_link(&path)
                .map(|p| p.to_string_lossy().into_owned())
                .map_err(|e| tracing::trace!(path = %path, error = %e, "Cannot read namespace link"))
                .ok()
        };

        Self {
            mnt: read_ns(NamespaceKind::Mount),
            net: read_ns(NamespaceKind::Network),
        }
    }

    /// Namespace ID for a kind
    #[must_use]
    pub fn get(&self, kind: NamespaceKind) -> Option<&str> {
        match kind {
            NamespaceKind::Mount => self.mnt.as_deref(),
            NamespaceKind::Network => self.net.as_deref(),
        }
    }

    /// Check if in a different namespace than init (PID 1)
    ///
    /// `None` if init's namespaces are not readable, which is normal
    /// for unprivileged callers.
    #[must_use]
    pub fn differs_from_init(&self, kind: NamespaceKind) -> Option<bool> {
        let init = Self::for_pid(1);
        Some(self.get(kind)? != init.get(kind)?)
    }
}

impl fmt::Display for NamespaceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "mnt={} net={}",
            self.mnt.as_deref().unwrap_or("?"),
            self.net.as_deref().unwrap_or("?")
        )
    }
}
