//! System-call backend trait for pluggable implementations

use std::convert::Infallible;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io;
use std::os::fd::OwnedFd;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use nix::sched::setns;
use nix::unistd::{Gid, Uid};

use crate::types::{CommandLine, NamespaceKind};

/// Trait for the system calls the launch pipeline makes
///
/// This allows for different implementations:
/// - [`LinuxSystem`] - Production, talks to the kernel
/// - [`MockBackend`](crate::MockBackend) - Testing, records calls and models
///   set-id semantics without touching the process
///
/// Every fallible call is attempted exactly once by the caller; backends
/// never retry.
pub trait SystemBackend {
    /// Opaque handle to an open directory or namespace reference
    type Handle: fmt::Debug;

    /// Path of the current working directory
    ///
    /// # Errors
    /// Returns the OS error from getcwd(3)
    fn current_dir(&self) -> io::Result<PathBuf>;

    /// Open a directory handle usable with [`change_dir`](Self::change_dir)
    ///
    /// # Errors
    /// Returns the OS error if the path is missing or not a directory
    fn open_directory(&self, path: &Path) -> io::Result<Self::Handle>;

    /// Open a namespace reference read-only
    ///
    /// # Errors
    /// Returns the OS error if the reference cannot be opened
    fn open_namespace(&self, path: &Path) -> io::Result<Self::Handle>;

    /// Move the calling process into the namespace behind `handle`
    ///
    /// # Errors
    /// Returns the OS error from setns(2)
    fn enter_namespace(&self, handle: &Self::Handle, kind: NamespaceKind) -> io::Result<()>;

    /// Change the working directory to the directory behind `handle`
    ///
    /// # Errors
    /// Returns the OS error from fchdir(2)
    fn change_dir(&self, handle: &Self::Handle) -> io::Result<()>;

    /// Release a handle, reporting the close error
    ///
    /// # Errors
    /// Returns the OS error from close(2)
    fn close(&self, handle: Self::Handle) -> io::Result<()>;

    /// Real user id
    fn real_uid(&self) -> Uid;

    /// Effective user id
    fn effective_uid(&self) -> Uid;

    /// Real group id
    fn real_gid(&self) -> Gid;

    /// Effective group id
    fn effective_gid(&self) -> Gid;

    /// Whether the kernel started this process in secure-execution mode
    ///
    /// True for set-user-id, set-group-id and file-capability installs
    /// (`AT_SECURE` in the auxiliary vector), even when the real and
    /// effective ids are equal.
    fn secure_exec(&self) -> bool;

    /// Set real, effective and saved user id to `uid` (setresuid(2))
    ///
    /// Unlike setuid(2) this also clears the saved id when the caller is
    /// not root, so a non-root set-user-id install cannot switch back.
    ///
    /// # Errors
    /// Returns the OS error if the identity change is refused
    fn set_uid(&self, uid: Uid) -> io::Result<()>;

    /// Set real, effective and saved group id to `gid` (setresgid(2))
    ///
    /// # Errors
    /// Returns the OS error if the identity change is refused
    fn set_gid(&self, gid: Gid) -> io::Result<()>;

    /// Replace the process image, searching `PATH` for the program
    ///
    /// Only returns on failure.
    ///
    /// # Errors
    /// Returns the OS error from execvp(3)
    fn exec(&self, command: &CommandLine) -> io::Result<Infallible>;
}

/// Backend issuing real system calls on the current process
#[derive(Debug, Default, Clone, Copy)]
pub struct LinuxSystem;

impl LinuxSystem {
    /// Create a new Linux backend
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl SystemBackend for LinuxSystem {
    type Handle = OwnedFd;

    fn current_dir(&self) -> io::Result<PathBuf> {
        Ok(nix::unistd::getcwd()?)
    }

    fn open_directory(&self, path: &Path) -> io::Result<OwnedFd> {
        OpenOptions::new()
            .read(true)
            .custom_flags(libc::O_DIRECTORY)
            .open(path)
            .map(OwnedFd::from)
    }

    fn open_namespace(&self, path: &Path) -> io::Result<OwnedFd> {
        File::open(path).map(OwnedFd::from)
    }

    fn enter_namespace(&self, handle: &OwnedFd, kind: NamespaceKind) -> io::Result<()> {
        Ok(setns(handle, kind.clone_flag())?)
    }

    fn change_dir(&self, handle: &OwnedFd) -> io::Result<()> {
        Ok(nix::unistd::fchdir(handle)?)
    }

    fn close(&self, handle: OwnedFd) -> io::Result<()> {
        Ok(nix::unistd::close(handle)?)
    }

    fn real_uid(&self) -> Uid {
        nix::unistd::getuid()
    }

    fn effective_uid(&self) -> Uid {
        nix::unistd::geteuid()
    }

    fn real_gid(&self) -> Gid {
        nix::unistd::getgid()
    }

    fn effective_gid(&self) -> Gid {
        nix::unistd::getegid()
    }

    fn secure_exec(&self) -> bool {
        // SAFETY: getauxval only reads the auxiliary vector and returns 0
        // for absent entries
        unsafe { libc::getauxval(libc::AT_SECURE) != 0 }
    }

    fn set_uid(&self, uid: Uid) -> io::Result<()> {
        Ok(nix::unistd::setresuid(uid, uid, uid)?)
    }

    fn set_gid(&self, gid: Gid) -> io::Result<()> {
        Ok(nix::unistd::setresgid(gid, gid, gid)?)
    }

    fn exec(&self, command: &CommandLine) -> io::Result<Infallible> {
        Ok(nix::unistd::execvp(command.program(), command.argv())?)
    }
}
