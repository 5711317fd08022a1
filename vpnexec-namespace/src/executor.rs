//! Process replacement

use vpnexec_core::{CommandLine, Error, SystemBackend};

/// Replace the current process image with `command`
///
/// The program is looked up on `PATH` and receives `command` verbatim as
/// its argument vector. Joined namespaces and the current identity carry
/// over. On success this never returns; the returned value is always the
/// reason exec failed.
pub fn replace_process<B: SystemBackend>(backend: &B, command: &CommandLine) -> Error {
    tracing::debug!(command = %command, "Calling execvp...");

    let Err(source) = backend.exec(command);

    tracing::debug!(program = %command.program_lossy(), error = %source, "Failed to execute the target process");

    Error::Exec {
        program: command.program_lossy(),
        source,
    }
}
