//! Core type definitions with strong typing and validation

use std::ffi::{CStr, CString, OsStr};
use std::fmt;
use std::os::unix::ffi::OsStrExt;

use nix::sched::CloneFlags;
use nix::unistd::{Gid, Uid};

use crate::backend::SystemBackend;
use crate::{Error, Result};

/// Namespace kinds vpn-exec can join
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NamespaceKind {
    /// Mount namespace
    Mount,
    /// Network namespace
    Network,
}

impl NamespaceKind {
    /// Flag passed to setns(2) so the kernel checks the reference type
    #[must_use]
    pub const fn clone_flag(self) -> CloneFlags {
        match self {
            Self::Mount => CloneFlags::CLONE_NEWNS,
            Self::Network => CloneFlags::CLONE_NEWNET,
        }
    }

    /// Entry name under `/proc/<pid>/ns`
    #[must_use]
    pub const fn proc_name(self) -> &'static str {
        match self {
            Self::Mount => "mnt",
            Self::Network => "net",
        }
    }
}

impl fmt::Display for NamespaceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mount => f.write_str("mount"),
            Self::Network => f.write_str("network"),
        }
    }
}

/// Pipeline stages, in the order they are reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    /// Nothing done yet
    Start,
    /// A target command is present
    ArgsChecked,
    /// Working directory handle held
    CwdCaptured,
    /// Joined the mount namespace
    InMountNs,
    /// Back in the captured working directory
    CwdRestored,
    /// Joined the network namespace
    InNetNs,
    /// Privilege dropped or intentionally retained
    PrivilegeDecided,
    /// Replacing the process image
    Exec,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Start => "start",
            Self::ArgsChecked => "args-checked",
            Self::CwdCaptured => "cwd-captured",
            Self::InMountNs => "in-mount-ns",
            Self::CwdRestored => "cwd-restored",
            Self::InNetNs => "in-net-ns",
            Self::PrivilegeDecided => "privilege-decided",
            Self::Exec => "exec",
        };
        f.write_str(name)
    }
}

/// Identity of the invoking user, read once at start
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity {
    /// Real user id
    pub uid: Uid,
    /// Effective user id
    pub euid: Uid,
    /// Real group id
    pub gid: Gid,
    /// Effective group id
    pub egid: Gid,
    /// Started in secure-execution mode (set-id or file-capability install)
    pub secure_exec: bool,
}

impl Identity {
    /// Read the process identity
    #[must_use]
    pub fn read<B: SystemBackend + ?Sized>(backend: &B) -> Self {
        Self {
            uid: backend.real_uid(),
            euid: backend.effective_uid(),
            gid: backend.real_gid(),
            egid: backend.effective_gid(),
            secure_exec: backend.secure_exec(),
        }
    }

    /// Invoked by root; privilege is kept
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.uid.is_root()
    }

    /// Running with privilege the invoking user does not hold
    ///
    /// Covers set-id installs and file-capability installs; the latter
    /// leave real and effective ids equal and only show up as secure
    /// execution.
    #[must_use]
    pub fn is_elevated(&self) -> bool {
        self.secure_exec || self.uid != self.euid || self.gid != self.egid
    }
}

/// Target command and its argument vector
///
/// `argv[0]` is the target path itself, so the child sees its own name
/// rather than the launcher's.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    argv: Vec<CString>,
}

impl CommandLine {
    /// Build from raw invocation arguments, excluding the launcher's own name
    ///
    /// # Errors
    /// Returns [`Error::Usage`] if no command is given or an argument holds
    /// a NUL byte.
    pub fn from_args<I, S>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let argv = args
            .into_iter()
            .map(|arg| {
                CString::new(arg.as_ref().as_bytes()).map_err(|_| {
                    Error::usage(format!(
                        "Argument contains a NUL byte: {}",
                        arg.as_ref().to_string_lossy()
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        if argv.is_empty() {
            return Err(Error::usage("No executable is specified."));
        }

        Ok(Self { argv })
    }

    /// Program looked up on `PATH`
    #[must_use]
    pub fn program(&self) -> &CStr {
        &self.argv[0]
    }

    /// Full argument vector, program first
    #[must_use]
    pub fn argv(&self) -> &[CString] {
        &self.argv
    }

    /// Lossy UTF-8 rendering of the program for diagnostics
    #[must_use]
    pub fn program_lossy(&self) -> String {
        self.program().to_string_lossy().into_owned()
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for arg in &self.argv {
            if !first {
                f.write_str(" ")?;
            }
            first = false;
            write!(f, "{}", arg.to_string_lossy())?;
        }
        Ok(())
    }
}
