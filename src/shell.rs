//! Shell execution for config-defined commands

use std::collections::HashMap;
use std::path::Path;
use std::process::Command as ProcessCommand;

use log::debug;

use crate::command::RunError;

/// Run one shell line through `sh -c`, inheriting the parent environment
/// with `env` layered on top.
///
/// # Errors
///
/// Returns `RunError::Io` when the shell cannot be spawned and
/// `RunError::Process` when the line exits non-zero. A process killed by a
/// signal reports code -1.
pub fn run(line: &str, cwd: Option<&Path>, env: &HashMap<String, String>) -> Result<(), RunError> {
    debug!("Running '{line}'");

    let mut process = ProcessCommand::new("sh");
    process.arg("-c").arg(line);
    if let Some(dir) = cwd {
        process.current_dir(dir);
    }
    process.envs(env);

    let status = process.status()?;
    if status.success() {
        Ok(())
    } else {
        Err(RunError::Process {
            command: line.to_string(),
            code: status.code().unwrap_or(-1),
        })
    }
}
