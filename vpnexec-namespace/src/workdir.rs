//! Carrying the working directory across a mount namespace switch
//!
//! The directory is held open rather than remembered by path: after the
//! switch the same path may name a different directory, or nothing.

use std::path::{Path, PathBuf};

use vpnexec_core::{Error, Result, ScopedHandle, SystemBackend, Warning};

/// Open handle on the directory the caller started in
#[derive(Debug)]
pub struct WorkingDirectory<'a, B: SystemBackend> {
    backend: &'a B,
    path: PathBuf,
    handle: ScopedHandle<'a, B>,
}

impl<'a, B: SystemBackend> WorkingDirectory<'a, B> {
    /// Open the current directory
    ///
    /// Failure is not fatal to the caller, so it comes back as a
    /// [`Warning`] rather than an [`Error`].
    pub fn capture(backend: &'a B) -> std::result::Result<Self, Warning> {
        let path = backend
            .current_dir()
            .map_err(|source| Warning::CwdCapture { source })?;
        let handle = backend
            .open_directory(&path)
            .map_err(|source| Warning::CwdCapture { source })?;

        tracing::debug!(cwd = %path.display(), "Captured working directory");

        Ok(Self {
            backend,
            handle: ScopedHandle::new(
                backend,
                handle,
                format!("old current directory {}", path.display()),
            ),
            path,
        })
    }

    /// Path at capture time
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// fchdir(2) back into the captured directory and release the handle
    ///
    /// A failed fchdir is returned as a [`Warning`]; the handle is released
    /// either way.
    ///
    /// # Errors
    /// Returns [`Error::Resource`] if the handle cannot be closed
    pub fn restore(self) -> Result<Option<Warning>> {
        let warning = match self.backend.change_dir(self.handle.get()) {
            Ok(()) => {
                tracing::debug!(cwd = %self.path.display(), "Restored working directory");
                None
            }
            Err(source) => Some(Warning::CwdRestore {
                path: self.path.clone(),
                source,
            }),
        };

        let resource = self.handle.label().to_string();
        self.handle
            .release()
            .map_err(|source| Error::Resource { resource, source })?;

        Ok(warning)
    }
}
