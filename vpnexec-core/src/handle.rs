//! Scoped ownership of backend handles

use std::fmt;
use std::io;

use crate::backend::SystemBackend;

/// A backend handle that is closed exactly once
///
/// [`release`](Self::release) closes the handle and hands back the close
/// error. A guard dropped without being released (an early return on a
/// failure path) closes the handle itself and logs a close failure.
pub struct ScopedHandle<'a, B: SystemBackend + ?Sized> {
    backend: &'a B,
    handle: Option<B::Handle>,
    label: String,
}

impl<'a, B: SystemBackend + ?Sized> ScopedHandle<'a, B> {
    /// Take ownership of `handle`; `label` names it in diagnostics
    pub fn new(backend: &'a B, handle: B::Handle, label: impl Into<String>) -> Self {
        Self {
            backend,
            handle: Some(handle),
            label: label.into(),
        }
    }

    /// Borrow the underlying handle
    #[must_use]
    pub fn get(&self) -> &B::Handle {
        // Only `release` and `drop` take the handle, and both consume self
        self.handle
            .as_ref()
            .unwrap_or_else(|| unreachable!("scoped handle used after release"))
    }

    /// What this handle refers to
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Close the handle now
    ///
    /// # Errors
    /// Returns the OS error from close(2)
    pub fn release(mut self) -> io::Result<()> {
        match self.handle.take() {
            Some(handle) => {
                tracing::trace!(handle = %self.label, "Releasing handle");
                self.backend.close(handle)
            }
            None => Ok(()),
        }
    }
}

impl<B: SystemBackend + ?Sized> Drop for ScopedHandle<'_, B> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            tracing::debug!(handle = %self.label, "Releasing handle on early exit");
            if let Err(e) = self.backend.close(handle) {
                tracing::warn!(handle = %self.label, error = %e, "Failed to close handle");
            }
        }
    }
}

impl<B: SystemBackend + ?Sized> fmt::Debug for ScopedHandle<'_, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopedHandle")
            .field("label", &self.label)
            .field("handle", &self.handle)
            .finish()
    }
}
