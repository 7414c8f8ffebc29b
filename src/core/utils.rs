use std::process::{Command, Stdio};

use anyhow::{Context, Result};

use crate::log_debug;

/// Start a process that outlives the launcher
///
/// The child is detached from our stdio, placed in its own process group and
/// never waited on.
pub fn spawn_detached(program: &str, args: &[String]) -> Result<()> {
    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
    }

    let child = command
        .spawn()
        .with_context(|| format!("Failed to start '{}'", program))?;
    log_debug!("Started detached process {} (pid {})", program, child.id());

    Ok(())
}

/// Split a command line on whitespace, dropping desktop-entry field codes (`%f`, `%U`, ...)
pub fn split_command_line(line: &str) -> Vec<String> {
    line.split_whitespace()
        .filter(|part| !part.starts_with('%'))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_command_line_drops_field_codes() {
        assert_eq!(split_command_line("firefox --new-window %u"), vec!["firefox", "--new-window"]);
        assert_eq!(split_command_line("  code   %F "), vec!["code"]);
        assert!(split_command_line("%U").is_empty());
    }

    #[test]
    fn test_spawn_missing_program_fails() {
        let err = spawn_detached("definitely-not-a-real-program-quickbar", &[]).unwrap_err();
        assert!(err.to_string().contains("definitely-not-a-real-program-quickbar"));
    }
}
