//! Blocking subprocess helpers shared by the native tool wrappers.

use std::process::{Command, Output, Stdio};

use crate::error::SyncError;

/// Render a command line for logs and error messages.
pub(crate) fn command_line(cmd: &Command) -> String {
    let mut line = cmd.get_program().to_string_lossy().into_owned();
    for arg in cmd.get_args() {
        line.push(' ');
        line.push_str(&arg.to_string_lossy());
    }
    line
}

/// Run `cmd` to completion and require a zero exit status.
///
/// A non-zero exit is mapped through `on_failure`, which receives the command
/// line, the status, and the captured stderr.
pub(crate) fn run_checked<F>(cmd: &mut Command, on_failure: F) -> Result<Output, SyncError>
where
    F: FnOnce(String) -> SyncError,
{
    let line = command_line(cmd);
    let program = cmd.get_program().to_string_lossy().into_owned();
    tracing::debug!(command = %line, "spawning");

    let output = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .map_err(|source| SyncError::Spawn { program, source })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(on_failure(format!(
            "`{line}` exited with {}: {}",
            output.status,
            stderr.trim()
        )));
    }

    Ok(output)
}
