//! Permanent privilege drop

use vpnexec_core::{Gid, Identity, PrivilegeError, Result, SystemBackend, Uid};

/// What happened to the process identity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrivilegeOutcome {
    /// Invoked by root; full privilege kept on purpose
    Retained,
    /// Lowered to the invoking user for good
    Dropped {
        /// User id now in effect
        uid: Uid,
        /// Group id now in effect
        gid: Gid,
    },
}

/// Drops elevated privilege back to the invoking identity
#[derive(Debug)]
pub struct PrivilegeManager<'a, B: SystemBackend> {
    backend: &'a B,
    identity: Identity,
}

impl<'a, B: SystemBackend> PrivilegeManager<'a, B> {
    /// Create a new privilege manager for an identity read at start
    #[must_use]
    pub const fn new(backend: &'a B, identity: Identity) -> Self {
        Self { backend, identity }
    }

    /// Permanently become the invoking user
    ///
    /// Root callers keep their privilege. Otherwise the group identity is
    /// lowered first (it can no longer be changed once the user identity
    /// is), then the user identity, and finally every elevated id is
    /// probed: regaining any of them must fail.
    ///
    /// # Errors
    /// Returns [`PrivilegeError::DropFailed`] if lowering is refused, or
    /// [`PrivilegeError::Reversible`] if an elevated id can be regained.
    pub fn drop_privileges(&self) -> Result<PrivilegeOutcome> {
        let Identity {
            uid,
            euid,
            gid,
            egid,
            ..
        } = self.identity;

        if self.identity.is_root() {
            tracing::debug!("Invoked by root, keeping privileges");
            return Ok(PrivilegeOutcome::Retained);
        }

        let group_elevated = egid != gid;
        if group_elevated {
            tracing::debug!(from = egid.as_raw(), to = gid.as_raw(), "Dropping group privilege");
            self.backend
                .set_gid(gid)
                .map_err(|source| PrivilegeError::DropFailed {
                    what: "group",
                    id: gid.as_raw(),
                    source,
                })?;
        }

        tracing::debug!(from = euid.as_raw(), to = uid.as_raw(), "Dropping user privilege");
        self.backend
            .set_uid(uid)
            .map_err(|source| PrivilegeError::DropFailed {
                what: "user",
                id: uid.as_raw(),
                source,
            })?;

        self.verify_irreversible(group_elevated)?;

        tracing::debug!(uid = uid.as_raw(), gid = gid.as_raw(), "Privileges dropped");

        Ok(PrivilegeOutcome::Dropped { uid, gid })
    }

    /// The drop only counts if every elevated id is now out of reach
    fn verify_irreversible(&self, group_elevated: bool) -> Result<()> {
        let Identity {
            uid, euid, egid, ..
        } = self.identity;

        let mut uids = vec![Uid::from_raw(0)];
        if euid != uid && !euid.is_root() {
            uids.push(euid);
        }

        for target in uids {
            match self.backend.set_uid(target) {
                Ok(()) => {
                    tracing::debug!(uid = target.as_raw(), "Elevated user id regained after drop");
                    return Err(PrivilegeError::Reversible {
                        what: "user",
                        id: target.as_raw(),
                    }
                    .into());
                }
                Err(e) => tracing::trace!(uid = target.as_raw(), error = %e, "Regain refused"),
            }
        }

        if group_elevated {
            match self.backend.set_gid(egid) {
                Ok(()) => {
                    tracing::debug!(gid = egid.as_raw(), "Elevated group id regained after drop");
                    return Err(PrivilegeError::Reversible {
                        what: "group",
                        id: egid.as_raw(),
                    }
                    .into());
                }
                Err(e) => tracing::trace!(gid = egid.as_raw(), error = %e, "Regain refused"),
            }
        }

        Ok(())
    }
}
