use std::process::Stdio;

use super::executor::SandboxConfig;

/// Characters that only mean something to a shell.
const SHELL_METACHARACTERS: &[char] = &[
    '|', ';', '&', '<', '>', '$', '`', '(', ')', '*', '?', '\'', '"', '\\', '\n', '~', '{', '}',
    '[', ']',
];

/// Whether an allowlisted command needs `sh -c` to mean what it says.
///
/// Plain commands are split on whitespace and executed directly so a missing
/// binary is reported as a spawn failure rather than a shell exit code.
pub fn needs_shell(command: &str) -> bool {
    command.contains(SHELL_METACHARACTERS)
}

/// Build the process for an approved command.
///
/// The returned command has stdin closed, both output streams piped, is killed
/// when dropped, and on Unix leads its own process group.
pub(super) fn build_command(
    command: &str,
    config: &SandboxConfig,
) -> Result<tokio::process::Command, String> {
    let mut cmd = if needs_shell(command) {
        let mut cmd = tokio::process::Command::new(&config.shell);
        cmd.arg("-c").arg(command);
        cmd
    } else {
        let mut parts = command.split_whitespace();
        let program = parts
            .next()
            .ok_or_else(|| "Cannot execute an empty command".to_string())?;
        let mut cmd = tokio::process::Command::new(program);
        cmd.args(parts);
        cmd
    };

    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    if let Some(dir) = &config.working_dir {
        cmd.current_dir(dir);
    }

    #[cfg(unix)]
    cmd.process_group(0);

    Ok(cmd)
}
