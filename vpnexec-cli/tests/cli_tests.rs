use assert_cmd::Command;
use predicates::prelude::*;

/// Check if running as root
fn is_root() -> bool {
    unsafe { libc::geteuid() == 0 }
}

fn vpn_exec() -> Command {
    Command::new(env!("CARGO_BIN_EXE_vpn-exec"))
}

#[test]
fn test_help_command() {
    vpn_exec()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Run a command inside the VPN"))
        .stdout(predicate::str::contains("--mount-ns"))
        .stdout(predicate::str::contains("--net-ns"))
        .stdout(predicate::str::contains("COMMAND"));
}

#[test]
fn test_version_command() {
    vpn_exec()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("vpn-exec"));
}

#[test]
fn test_no_command_is_usage_error() {
    vpn_exec()
        .assert()
        .code(1)
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("No executable is specified."));
}

#[test]
fn test_verbose_without_command_is_usage_error() {
    vpn_exec()
        .arg("-v")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("No executable is specified."))
        .stderr(predicate::str::contains("namespace").not());
}

#[test]
fn test_unknown_option_exits_one() {
    vpn_exec()
        .arg("--bogus")
        .arg("true")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("unexpected argument"));
}

#[test]
fn test_missing_mount_reference_stops_before_network() {
    vpn_exec()
        .args(["-v", "--mount-ns", "/nonexistent/vpn-exec/mnt"])
        .args(["--net-ns", "/nonexistent/vpn-exec/net"])
        .arg("true")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Failed to open mount namespace"))
        .stderr(predicate::str::contains("/nonexistent/vpn-exec/net").not());
}

#[test]
fn test_relative_reference_rejected() {
    vpn_exec()
        .args(["--net-ns", "netns/vpn", "true"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("must be absolute"));
}

#[test]
fn test_enter_requires_privilege() {
    // Skip if running as root
    if is_root() {
        return;
    }

    vpn_exec()
        .args(["--mount-ns", "/proc/self/ns/mnt", "--net-ns", "/proc/self/ns/net"])
        .arg("true")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Failed to enter mount namespace"));
}

#[test]
#[ignore] // Requires CAP_SYS_ADMIN
fn test_exec_in_own_namespaces() {
    vpn_exec()
        .args(["--mount-ns", "/proc/self/ns/mnt", "--net-ns", "/proc/self/ns/net"])
        .args(["printenv", "VPN_EXEC_TEST_MARKER"])
        .env("VPN_EXEC_TEST_MARKER", "inside")
        .assert()
        .success()
        .stdout("inside\n");
}

#[test]
#[ignore] // Requires CAP_SYS_ADMIN
fn test_exec_missing_command() {
    vpn_exec()
        .args(["--mount-ns", "/proc/self/ns/mnt", "--net-ns", "/proc/self/ns/net"])
        .arg("vpn-exec-no-such-command")
        .assert()
        .code(1)
        .stderr(predicate::str::contains(
            "Failed to execute vpn-exec-no-such-command",
        ));
}

#[test]
#[ignore] // Requires CAP_SYS_ADMIN
fn test_working_directory_preserved() {
    let dir = std::env::temp_dir();
    let expected = dir.canonicalize().unwrap();

    vpn_exec()
        .current_dir(&dir)
        .args(["--mount-ns", "/proc/self/ns/mnt", "--net-ns", "/proc/self/ns/net"])
        .args(["pwd", "-P"])
        .assert()
        .success()
        .stdout(format!("{}\n", expected.display()));
}

#[test]
#[ignore] // Requires root, setpriv, and the VPN namespace references in /var/run/netns
fn test_setuid_install_runs_as_invoking_user() {
    use std::os::unix::fs::PermissionsExt;

    let dir = std::env::temp_dir().join(format!("vpn-exec-setuid-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::set_permissions(&dir, std::fs::Permissions::from_mode(0o755)).unwrap();

    let installed = dir.join("vpn-exec");
    std::fs::copy(env!("CARGO_BIN_EXE_vpn-exec"), &installed).unwrap();
    std::os::unix::fs::chown(&installed, Some(0), Some(0)).unwrap();
    std::fs::set_permissions(&installed, std::fs::Permissions::from_mode(0o4755)).unwrap();

    let assert = Command::new("setpriv")
        .args(["--reuid=65534", "--regid=65534", "--clear-groups", "--"])
        .arg(&installed)
        .args(["cat", "/proc/self/status"])
        .current_dir("/")
        .assert();

    std::fs::remove_dir_all(&dir).unwrap();

    assert
        .success()
        .stdout(predicate::str::contains("Uid:\t65534\t65534\t65534\t65534"))
        .stdout(predicate::str::contains("Gid:\t65534\t65534\t65534\t65534"))
        .stdout(predicate::str::contains("CapEff:\t0000000000000000"));
}
