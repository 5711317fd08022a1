//! Launch pipeline
//!
//! One linear pass, each step a precondition for the next:
//! capture cwd, join the mount namespace, restore cwd, join the network
//! namespace, drop privilege, exec. Every fatal error returns straight to
//! `main`; held handles are released by their guards on the way out.

use std::convert::Infallible;

use anyhow::Result;
use tracing::{debug, warn};
use vpnexec_core::{
    CommandLine, Error, Identity, LinuxSystem, NamespaceKind, Stage, SystemBackend,
};
use vpnexec_namespace::{
    LauncherConfig, NamespaceInfo, NamespaceManager, WorkingDirectory, replace_process,
};
use vpnexec_security::{PrivilegeManager, PrivilegeOutcome};

use crate::cli::Cli;

pub fn execute(cli: &Cli) -> Result<Infallible> {
    let command = CommandLine::from_args(&cli.command)?;
    debug!(stage = %Stage::ArgsChecked, command = %command);

    let backend = LinuxSystem::new();
    let identity = Identity::read(&backend);
    let config = resolve_config(cli, &identity)?;

    Ok(launch(&backend, &config, identity, &command)?)
}

/// Apply path overrides from the command line
///
/// Overrides are refused while running elevated (set-id or
/// file-capability install), unless invoked by root.
fn resolve_config(cli: &Cli, identity: &Identity) -> vpnexec_core::Result<LauncherConfig> {
    let mut config = LauncherConfig::new();
    if let Some(ref path) = cli.mount_ns {
        config = config.with_mount_namespace(path);
    }
    if let Some(ref path) = cli.net_ns {
        config = config.with_network_namespace(path);
    }

    if !config.is_default() && identity.is_elevated() && !identity.is_root() {
        return Err(Error::usage(
            "--mount-ns and --net-ns are not accepted while running with elevated privilege",
        ));
    }

    config.validate()?;
    Ok(config)
}

/// Run the pipeline from working-directory capture to exec
///
/// Only returns on failure.
pub fn launch<B: SystemBackend>(
    backend: &B,
    config: &LauncherConfig,
    identity: Identity,
    command: &CommandLine,
) -> vpnexec_core::Result<Infallible> {
    let cwd = match WorkingDirectory::capture(backend) {
        Ok(cwd) => {
            debug!(stage = %Stage::CwdCaptured, cwd = %cwd.path().display());
            Some(cwd)
        }
        Err(warning) => {
            warn!("{warning}");
            None
        }
    };

    let namespaces = NamespaceManager::new(backend, config);

    namespaces.enter(NamespaceKind::Mount)?;
    debug!(stage = %Stage::InMountNs);

    if let Some(cwd) = cwd {
        match cwd.restore()? {
            None => debug!(stage = %Stage::CwdRestored),
            Some(warning) => warn!("{warning}"),
        }
    }

    namespaces.enter(NamespaceKind::Network)?;
    debug!(stage = %Stage::InNetNs);

    if tracing::enabled!(tracing::Level::DEBUG) {
        debug!(namespaces = %NamespaceInfo::current(), "Joined namespaces");
    }

    let outcome = PrivilegeManager::new(backend, identity).drop_privileges()?;
    match outcome {
        PrivilegeOutcome::Retained => {
            debug!(stage = %Stage::PrivilegeDecided, "Running as root");
        }
        PrivilegeOutcome::Dropped { uid, gid } => {
            debug!(stage = %Stage::PrivilegeDecided, uid = uid.as_raw(), gid = gid.as_raw());
        }
    }

    debug!(stage = %Stage::Exec, command = %command);
    Err(replace_process(backend, command))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsString;
    use std::path::PathBuf;
    use vpnexec_core::{Call, Fault, Gid, MockBackend, PrivilegeError, Uid};

    fn printenv() -> CommandLine {
        CommandLine::from_args(["printenv", "PATH"]).unwrap()
    }

    fn run(backend: &MockBackend) -> Error {
        let config = LauncherConfig::default();
        let Err(err) = launch(backend, &config, Identity::read(backend), &printenv());
        err
    }

    fn opened_namespace(backend: &MockBackend, path: &str) -> bool {
        backend
            .calls()
            .contains(&Call::OpenNamespace(PathBuf::from(path)))
    }

    #[test]
    fn test_full_sequence_as_setuid_user() {
        let backend = MockBackend::new();

        let err = run(&backend);

        // The mock intercepts exec, so reaching it surfaces as an exec error
        assert!(matches!(err, Error::Exec { .. }));
        assert_eq!(
            backend.calls(),
            vec![
                Call::CurrentDir,
                Call::OpenDirectory("/home/user".into()),
                Call::OpenNamespace("/var/run/netns/confmountns/vpn".into()),
                Call::EnterNamespace(NamespaceKind::Mount),
                Call::Close("/var/run/netns/confmountns/vpn".into()),
                Call::ChangeDir("/home/user".into()),
                Call::Close("/home/user".into()),
                Call::OpenNamespace("/var/run/netns/vpn".into()),
                Call::EnterNamespace(NamespaceKind::Network),
                Call::Close("/var/run/netns/vpn".into()),
                Call::SetUid(1000),
                Call::SetUid(0),
                Call::Exec(vec!["printenv".into(), "PATH".into()]),
            ]
        );
        assert_eq!(backend.euid(), Uid::from_raw(1000));
        assert_eq!(backend.open_handles(), 0);
    }

    #[test]
    fn test_root_keeps_privilege_and_execs() {
        let backend = MockBackend::root();

        run(&backend);

        assert!(
            !backend
                .calls()
                .iter()
                .any(|c| matches!(c, Call::SetUid(_) | Call::SetGid(_)))
        );
        assert!(backend.euid().is_root());
        assert!(backend.exec_argv().is_some());
    }

    #[test]
    fn test_mount_failure_never_touches_network() {
        let backend = MockBackend::new().with_fault(Fault::OpenNamespace(
            "/var/run/netns/confmountns/vpn".into(),
        ));

        let err = run(&backend);

        assert!(matches!(
            err,
            Error::Namespace {
                kind: NamespaceKind::Mount,
                ..
            }
        ));
        assert!(!opened_namespace(&backend, "/var/run/netns/vpn"));
        assert!(backend.exec_argv().is_none());
        assert!(backend.euid().is_root());
        assert_eq!(backend.open_handles(), 0);
    }

    #[test]
    fn test_unprivileged_caller_stops_at_mount_namespace() {
        let backend = MockBackend::new().with_uids(Uid::from_raw(1000), Uid::from_raw(1000));

        let err = run(&backend);

        assert!(err.to_string().starts_with("Failed to enter mount namespace"));
        assert!(!opened_namespace(&backend, "/var/run/netns/vpn"));
        assert_eq!(backend.open_handles(), 0);
    }

    #[test]
    fn test_cwd_capture_failure_is_not_fatal() {
        let backend = MockBackend::new().with_cwd(None);

        let err = run(&backend);

        assert!(matches!(err, Error::Exec { .. }));
        assert!(
            !backend
                .calls()
                .iter()
                .any(|c| matches!(c, Call::ChangeDir(_)))
        );
        assert_eq!(
            backend.joined(),
            vec![NamespaceKind::Mount, NamespaceKind::Network]
        );
    }

    #[test]
    fn test_cwd_restore_failure_is_not_fatal() {
        let backend = MockBackend::new().with_fault(Fault::ChangeDir);

        let err = run(&backend);

        assert!(matches!(err, Error::Exec { .. }));
        assert!(opened_namespace(&backend, "/var/run/netns/vpn"));
        assert_eq!(backend.euid(), Uid::from_raw(1000));
        assert!(backend.exec_argv().is_some());
    }

    #[test]
    fn test_cwd_release_failure_is_fatal() {
        let backend = MockBackend::new().with_fault(Fault::CloseDirectory);

        let err = run(&backend);

        assert!(matches!(err, Error::Resource { .. }));
        assert!(!opened_namespace(&backend, "/var/run/netns/vpn"));
        assert!(backend.exec_argv().is_none());
    }

    #[test]
    fn test_network_failure_keeps_privilege_untouched() {
        let backend =
            MockBackend::new().with_fault(Fault::EnterNamespace(NamespaceKind::Network));

        let err = run(&backend);

        assert!(matches!(
            err,
            Error::Namespace {
                kind: NamespaceKind::Network,
                ..
            }
        ));
        assert!(
            !backend
                .calls()
                .iter()
                .any(|c| matches!(c, Call::SetUid(_)))
        );
        assert!(backend.exec_argv().is_none());
        assert_eq!(backend.open_handles(), 0);
    }

    #[test]
    fn test_reversible_drop_blocks_exec() {
        let backend = MockBackend::new().with_reversible_drop();

        let err = run(&backend);

        assert!(matches!(
            err,
            Error::Privilege(PrivilegeError::Reversible { .. })
        ));
        assert!(backend.exec_argv().is_none());
    }

    #[test]
    fn test_setgid_install_drops_group() {
        let backend = MockBackend::new().with_gids(Gid::from_raw(1000), Gid::from_raw(50));

        run(&backend);

        assert_eq!(backend.egid(), Gid::from_raw(1000));
        assert!(backend.exec_argv().is_some());
    }

    #[test]
    fn test_exec_failure_is_reported() {
        let backend = MockBackend::new().with_fault(Fault::Exec);

        let err = run(&backend);

        assert!(err.to_string().starts_with("Failed to execute printenv"));
    }

    fn cli(args: &[&str]) -> Cli {
        use clap::Parser;
        Cli::parse_from(std::iter::once("vpn-exec").chain(args.iter().copied()))
    }

    fn identity(uid: u32, euid: u32) -> Identity {
        Identity {
            uid: Uid::from_raw(uid),
            euid: Uid::from_raw(euid),
            gid: Gid::from_raw(uid),
            egid: Gid::from_raw(uid),
            secure_exec: uid != euid,
        }
    }

    #[test]
    fn test_overrides_refused_when_elevated() {
        let cli = cli(&["--net-ns", "/tmp/evil", "sh"]);

        let err = resolve_config(&cli, &identity(1000, 0)).unwrap_err();

        assert!(matches!(err, Error::Usage { .. }));
    }

    #[test]
    fn test_overrides_accepted_when_not_elevated() {
        let cli = cli(&["--mount-ns", "/run/t/mnt", "--net-ns", "/run/t/net", "sh"]);

        let config = resolve_config(&cli, &identity(1000, 1000)).unwrap();
        assert_eq!(config.mount_namespace_path, PathBuf::from("/run/t/mnt"));

        let config = resolve_config(&cli, &identity(0, 0)).unwrap();
        assert_eq!(config.network_namespace_path, PathBuf::from("/run/t/net"));
    }

    #[test]
    fn test_overrides_refused_for_file_capability_install() {
        let cli = cli(&["--mount-ns", "/tmp/pns/mnt", "--net-ns", "/tmp/pns/net", "sh"]);
        let backend = MockBackend::new()
            .with_uids(Uid::from_raw(65534), Uid::from_raw(65534))
            .with_gids(Gid::from_raw(65534), Gid::from_raw(65534))
            .with_file_capabilities();

        let err = resolve_config(&cli, &Identity::read(&backend)).unwrap_err();

        assert!(matches!(err, Error::Usage { .. }));
    }

    #[test]
    fn test_overrides_accepted_for_root_in_secure_exec() {
        let cli = cli(&["--net-ns", "/run/t/net", "sh"]);
        let backend = MockBackend::root().with_file_capabilities();

        let config = resolve_config(&cli, &Identity::read(&backend)).unwrap();

        assert_eq!(config.network_namespace_path, PathBuf::from("/run/t/net"));
    }

    #[test]
    fn test_regainable_group_blocks_exec() {
        let backend = MockBackend::new()
            .with_gids(Gid::from_raw(1000), Gid::from_raw(50))
            .with_reversible_group_drop();

        let err = run(&backend);

        assert!(matches!(
            err,
            Error::Privilege(PrivilegeError::Reversible {
                what: "group",
                id: 50
            })
        ));
        assert!(backend.exec_argv().is_none());
    }

    #[test]
    fn test_defaults_used_by_setuid_install() {
        let cli = cli(&["sh"]);

        let config = resolve_config(&cli, &identity(1000, 0)).unwrap();
        assert!(config.is_default());
    }

    #[test]
    fn test_relative_override_rejected() {
        let cli = cli(&["--mount-ns", "mnt", "sh"]);

        let err = resolve_config(&cli, &identity(1000, 1000)).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig { .. }));
    }

    #[test]
    fn test_missing_command_is_usage_error() {
        let err = CommandLine::from_args(Vec::<OsString>::new()).unwrap_err();
        assert!(matches!(err, Error::Usage { .. }));
    }
}
