//! Launcher configuration

use std::path::{Path, PathBuf};

use vpnexec_core::{Error, NamespaceKind, Result};

/// Mount namespace reference, outside the `ip netns` registry
pub const DEFAULT_MOUNT_NAMESPACE_PATH: &str = "/var/run/netns/confmountns/vpn";

/// Network namespace reference in the `ip netns` registry
pub const DEFAULT_NETWORK_NAMESPACE_PATH: &str = "/var/run/netns/vpn";

/// Where the namespaces to join are pinned
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(test, derive(serde::Serialize, serde::Deserialize))]
pub struct LauncherConfig {
    /// Mount namespace reference
    pub mount_namespace_path: PathBuf,

    /// Network namespace reference
    pub network_namespace_path: PathBuf,
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            mount_namespace_path: PathBuf::from(DEFAULT_MOUNT_NAMESPACE_PATH),
            network_namespace_path: PathBuf::from(DEFAULT_NETWORK_NAMESPACE_PATH),
        }
    }
}

impl LauncherConfig {
    /// Create a configuration with the built-in paths
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a different mount namespace reference
    #[must_use]
    pub fn with_mount_namespace(mut self, path: impl Into<PathBuf>) -> Self {
        self.mount_namespace_path = path.into();
        self
    }

    /// Use a different network namespace reference
    #[must_use]
    pub fn with_network_namespace(mut self, path: impl Into<PathBuf>) -> Self {
        self.network_namespace_path = path.into();
        self
    }

    /// Reference path for a namespace kind
    #[must_use]
    pub fn path_for(&self, kind: NamespaceKind) -> &Path {
        match kind {
            NamespaceKind::Mount => &self.mount_namespace_path,
            NamespaceKind::Network => &self.network_namespace_path,
        }
    }

    /// Whether both paths are the built-in ones
    #[must_use]
    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }

    /// Check both paths are absolute
    ///
    /// Relative references would resolve against the caller's directory,
    /// and the mount reference would resolve differently after the switch.
    pub fn validate(&self) -> Result<()> {
        for kind in [NamespaceKind::Mount, NamespaceKind::Network] {
            let path = self.path_for(kind);
            if !path.is_absolute() {
                return Err(Error::InvalidConfig {
                    message: format!(
                        "{kind} namespace path must be absolute, got: {}",
                        path.display()
                    ),
                });
            }
        }
        Ok(())
    }
}
