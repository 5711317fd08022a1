//! Mock backend for testing (doesn't touch the process)

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::convert::Infallible;
use std::io;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use nix::unistd::{Gid, Uid};

use crate::backend::SystemBackend;
use crate::types::{CommandLine, NamespaceKind};

/// A system call observed by [`MockBackend`], in call order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    /// getcwd
    CurrentDir,
    /// open of a directory
    OpenDirectory(PathBuf),
    /// open of a namespace reference
    OpenNamespace(PathBuf),
    /// setns
    EnterNamespace(NamespaceKind),
    /// fchdir, with the directory the handle points at
    ChangeDir(PathBuf),
    /// close, with the path the handle was opened from
    Close(PathBuf),
    /// setresuid
    SetUid(u32),
    /// setresgid
    SetGid(u32),
    /// execvp, with the argument vector
    Exec(Vec<String>),
}

/// Failure to inject into a [`MockBackend`] operation
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Fault {
    /// getcwd fails with `ENOENT`
    CurrentDir,
    /// Opening any directory fails with `EACCES`
    OpenDirectory,
    /// Opening this namespace reference fails with `ENOENT`
    OpenNamespace(PathBuf),
    /// Joining this kind of namespace fails with `EINVAL`
    EnterNamespace(NamespaceKind),
    /// fchdir fails with `ENOENT`
    ChangeDir,
    /// Closing a directory handle fails with `EIO`
    CloseDirectory,
    /// Closing a namespace handle fails with `EIO`
    CloseNamespace,
    /// setresuid fails with `EPERM`
    SetUid,
    /// setresgid fails with `EPERM`
    SetGid,
    /// execvp fails with `ENOENT`
    Exec,
}

/// Handle issued by [`MockBackend`]
#[derive(Debug, PartialEq, Eq)]
pub struct MockHandle(u32);

#[derive(Debug)]
struct OpenEntry {
    path: PathBuf,
    directory: bool,
}

#[derive(Debug)]
struct MockState {
    calls: Vec<Call>,
    faults: HashSet<Fault>,
    handles: HashMap<u32, OpenEntry>,
    next_handle: u32,
    cwd: Option<PathBuf>,
    joined: Vec<NamespaceKind>,
    ruid: Uid,
    euid: Uid,
    suid: Uid,
    rgid: Gid,
    egid: Gid,
    sgid: Gid,
    reversible: bool,
    reversible_group: bool,
    file_capabilities: bool,
}

/// Mock backend for testing
///
/// Models the set-id rules of setresuid(2)/setresgid(2) with all three ids
/// equal: a privileged caller may pick any id; an unprivileged caller only
/// one of its current real, effective or saved ids. Joining a namespace
/// requires effective uid 0.
///
/// Defaults to a set-user-id-root install invoked by uid 1000 from
/// `/home/user`.
///
/// # Example
/// ```
/// use vpnexec_core::{MockBackend, SystemBackend, Uid};
///
/// let backend = MockBackend::new();
/// backend.set_uid(Uid::from_raw(1000)).unwrap();
///
/// assert!(backend.set_uid(Uid::from_raw(0)).is_err());
/// assert_eq!(backend.euid(), Uid::from_raw(1000));
/// ```
#[derive(Clone)]
pub struct MockBackend {
    state: Rc<RefCell<MockState>>,
}

impl MockBackend {
    /// Create a new mock backend
    #[must_use]
    pub fn new() -> Self {
        let user = Uid::from_raw(1000);
        let group = Gid::from_raw(1000);
        Self {
            state: Rc::new(RefCell::new(MockState {
                calls: Vec::new(),
                faults: HashSet::new(),
                handles: HashMap::new(),
                next_handle: 3,
                cwd: Some(PathBuf::from("/home/user")),
                joined: Vec::new(),
                ruid: user,
                euid: Uid::from_raw(0),
                suid: Uid::from_raw(0),
                rgid: group,
                egid: group,
                sgid: group,
                reversible: false,
                reversible_group: false,
                file_capabilities: false,
            })),
        }
    }

    /// Process invoked directly by root
    #[must_use]
    pub fn root() -> Self {
        Self::new()
            .with_uids(Uid::from_raw(0), Uid::from_raw(0))
            .with_gids(Gid::from_raw(0), Gid::from_raw(0))
    }

    /// Set real and effective uid (saved follows effective)
    #[must_use]
    pub fn with_uids(self, ruid: Uid, euid: Uid) -> Self {
        {
            let mut state = self.state.borrow_mut();
            state.ruid = ruid;
            state.euid = euid;
            state.suid = euid;
        }
        self
    }

    /// Set real and effective gid (saved follows effective)
    #[must_use]
    pub fn with_gids(self, rgid: Gid, egid: Gid) -> Self {
        {
            let mut state = self.state.borrow_mut();
            state.rgid = rgid;
            state.egid = egid;
            state.sgid = egid;
        }
        self
    }

    /// Set the working directory; `None` makes getcwd fail
    #[must_use]
    pub fn with_cwd(self, cwd: Option<PathBuf>) -> Self {
        self.state.borrow_mut().cwd = cwd;
        self
    }

    /// Inject a failure
    #[must_use]
    pub fn with_fault(self, fault: Fault) -> Self {
        self.state.borrow_mut().faults.insert(fault);
        self
    }

    /// Make a privileged id change only touch the effective id, leaving
    /// the real and saved ids elevated so they can be regained
    #[must_use]
    pub fn with_reversible_drop(self) -> Self {
        self.state.borrow_mut().reversible = true;
        self
    }

    /// Make a privileged group change leave the saved gid elevated, so
    /// only the group can be regained
    #[must_use]
    pub fn with_reversible_group_drop(self) -> Self {
        self.state.borrow_mut().reversible_group = true;
        self
    }

    /// Started from a file-capability install: secure-execution mode
    /// without any difference between real and effective ids
    #[must_use]
    pub fn with_file_capabilities(self) -> Self {
        self.state.borrow_mut().file_capabilities = true;
        self
    }

    /// All calls made so far
    #[must_use]
    pub fn calls(&self) -> Vec<Call> {
        self.state.borrow().calls.clone()
    }

    /// Number of handles opened and not yet closed
    #[must_use]
    pub fn open_handles(&self) -> usize {
        self.state.borrow().handles.len()
    }

    /// Namespaces joined, in order
    #[must_use]
    pub fn joined(&self) -> Vec<NamespaceKind> {
        self.state.borrow().joined.clone()
    }

    /// Current working directory
    #[must_use]
    pub fn cwd(&self) -> Option<PathBuf> {
        self.state.borrow().cwd.clone()
    }

    /// Current effective uid
    #[must_use]
    pub fn euid(&self) -> Uid {
        self.state.borrow().euid
    }

    /// Current real uid
    #[must_use]
    pub fn ruid(&self) -> Uid {
        self.state.borrow().ruid
    }

    /// Current effective gid
    #[must_use]
    pub fn egid(&self) -> Gid {
        self.state.borrow().egid
    }

    /// Argument vector handed to exec, if it was reached
    #[must_use]
    pub fn exec_argv(&self) -> Option<Vec<String>> {
        self.state.borrow().calls.iter().find_map(|call| match call {
            Call::Exec(argv) => Some(argv.clone()),
            _ => None,
        })
    }

    fn record(&self, call: Call) {
        self.state.borrow_mut().calls.push(call);
    }

    fn faulted(&self, fault: &Fault) -> bool {
        self.state.borrow().faults.contains(fault)
    }

    fn issue(&self, path: &Path, directory: bool) -> MockHandle {
        let mut state = self.state.borrow_mut();
        let id = state.next_handle;
        state.next_handle += 1;
        state.handles.insert(
            id,
            OpenEntry {
                path: path.to_path_buf(),
                directory,
            },
        );
        MockHandle(id)
    }

    fn entry(&self, handle: &MockHandle) -> io::Result<(PathBuf, bool)> {
        self.state
            .borrow()
            .handles
            .get(&handle.0)
            .map(|entry| (entry.path.clone(), entry.directory))
            .ok_or_else(|| errno(libc::EBADF))
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MockBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockBackend").finish_non_exhaustive()
    }
}

fn errno(code: i32) -> io::Error {
    io::Error::from_raw_os_error(code)
}

impl SystemBackend for MockBackend {
    type Handle = MockHandle;

    fn current_dir(&self) -> io::Result<PathBuf> {
        self.record(Call::CurrentDir);
        if self.faulted(&Fault::CurrentDir) {
            return Err(errno(libc::ENOENT));
        }
        self.cwd().ok_or_else(|| errno(libc::ENOENT))
    }

    fn open_directory(&self, path: &Path) -> io::Result<MockHandle> {
        self.record(Call::OpenDirectory(path.to_path_buf()));
        if self.faulted(&Fault::OpenDirectory) {
            return Err(errno(libc::EACCES));
        }
        Ok(self.issue(path, true))
    }

    fn open_namespace(&self, path: &Path) -> io::Result<MockHandle> {
        self.record(Call::OpenNamespace(path.to_path_buf()));
        if self.faulted(&Fault::OpenNamespace(path.to_path_buf())) {
            return Err(errno(libc::ENOENT));
        }
        Ok(self.issue(path, false))
    }

    fn enter_namespace(&self, handle: &MockHandle, kind: NamespaceKind) -> io::Result<()> {
        self.record(Call::EnterNamespace(kind));
        let (_, directory) = self.entry(handle)?;
        if directory || self.faulted(&Fault::EnterNamespace(kind)) {
            return Err(errno(libc::EINVAL));
        }
        if !self.euid().is_root() {
            return Err(errno(libc::EPERM));
        }
        self.state.borrow_mut().joined.push(kind);
        Ok(())
    }

    fn change_dir(&self, handle: &MockHandle) -> io::Result<()> {
        let (path, directory) = self.entry(handle)?;
        self.record(Call::ChangeDir(path.clone()));
        if !directory {
            return Err(errno(libc::ENOTDIR));
        }
        if self.faulted(&Fault::ChangeDir) {
            return Err(errno(libc::ENOENT));
        }
        self.state.borrow_mut().cwd = Some(path);
        Ok(())
    }

    fn close(&self, handle: MockHandle) -> io::Result<()> {
        let entry = self
            .state
            .borrow_mut()
            .handles
            .remove(&handle.0)
            .ok_or_else(|| errno(libc::EBADF))?;
        self.record(Call::Close(entry.path));

        let fault = if entry.directory {
            Fault::CloseDirectory
        } else {
            Fault::CloseNamespace
        };
        if self.faulted(&fault) {
            return Err(errno(libc::EIO));
        }
        Ok(())
    }

    fn real_uid(&self) -> Uid {
        self.state.borrow().ruid
    }

    fn effective_uid(&self) -> Uid {
        self.state.borrow().euid
    }

    fn real_gid(&self) -> Gid {
        self.state.borrow().rgid
    }

    fn effective_gid(&self) -> Gid {
        self.state.borrow().egid
    }

    fn set_uid(&self, uid: Uid) -> io::Result<()> {
        self.record(Call::SetUid(uid.as_raw()));
        if self.faulted(&Fault::SetUid) {
            return Err(errno(libc::EPERM));
        }

        let mut state = self.state.borrow_mut();
        if state.euid.is_root() && state.reversible {
            state.euid = uid;
            Ok(())
        } else if state.euid.is_root() || [state.ruid, state.euid, state.suid].contains(&uid) {
            state.ruid = uid;
            state.euid = uid;
            state.suid = uid;
            Ok(())
        } else {
            Err(errno(libc::EPERM))
        }
    }

    fn set_gid(&self, gid: Gid) -> io::Result<()> {
        self.record(Call::SetGid(gid.as_raw()));
        if self.faulted(&Fault::SetGid) {
            return Err(errno(libc::EPERM));
        }

        let mut state = self.state.borrow_mut();
        if state.euid.is_root() && state.reversible {
            state.egid = gid;
            Ok(())
        } else if state.euid.is_root() && state.reversible_group {
            state.rgid = gid;
            state.egid = gid;
            Ok(())
        } else if state.euid.is_root() || [state.rgid, state.egid, state.sgid].contains(&gid) {
            state.rgid = gid;
            state.egid = gid;
            state.sgid = gid;
            Ok(())
        } else {
            Err(errno(libc::EPERM))
        }
    }

    fn secure_exec(&self) -> bool {
        let state = self.state.borrow();
        state.file_capabilities || state.ruid != state.euid || state.rgid != state.egid
    }

    fn exec(&self, command: &CommandLine) -> io::Result<Infallible> {
        let argv = command
            .argv()
            .iter()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect();
        self.record(Call::Exec(argv));

        if self.faulted(&Fault::Exec) {
            return Err(errno(libc::ENOENT));
        }
        Err(io::Error::other("exec intercepted by mock backend"))
    }
}
