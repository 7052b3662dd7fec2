//! Local execution: spawn a program, optionally feed stdin, capture output.

use super::{ExecError, ExecOutput};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, Command};

/// Run `program` with `args`. When `stdin` is given it is written and the
/// pipe closed before waiting. The child is killed if it outlives `limit`.
pub async fn exec_program(
    program: &Path,
    args: &[&str],
    stdin: Option<&[u8]>,
    limit: Duration,
) -> Result<ExecOutput, ExecError> {
    let child = Command::new(program)
        .args(args)
        .stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| ExecError::Spawn {
            program: program.display().to_string(),
            reason: e.to_string(),
        })?;

    // dropping the timed-out future drops the child, which kills it
    match tokio::time::timeout(limit, collect_output(child, stdin)).await {
        Ok(result) => result,
        Err(_) => Err(ExecError::TimedOut {
            program: program.display().to_string(),
            limit,
        }),
    }
}

async fn collect_output(mut child: Child, stdin: Option<&[u8]>) -> Result<ExecOutput, ExecError> {
    if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
        pipe.write_all(input)
            .await
            .map_err(|e| ExecError::Io(format!("stdin write error: {}", e)))?;
        // dropping the handle closes the pipe
        drop(pipe);
    }

    let output = child
        .wait_with_output()
        .await
        .map_err(|e| ExecError::Io(format!("wait error: {}", e)))?;

    Ok(ExecOutput {
        exit_code: output.status.code().unwrap_or(-1),
        stdout: output.stdout,
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
    })
}

/// Resolve an executable. Names containing a path separator are checked
/// directly; bare names are searched on `PATH`.
pub fn find_program(name: &str) -> Option<PathBuf> {
    let candidate = Path::new(name);
    if candidate.components().count() > 1 || candidate.is_absolute() {
        return is_executable(candidate).then(|| candidate.to_path_buf());
    }
    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var)
        .flat_map(|dir| executable_names(name).into_iter().map(move |n| dir.join(n)))
        .find(|p| is_executable(p))
}

#[cfg(windows)]
fn executable_names(name: &str) -> Vec<String> {
    vec![name.to_string(), format!("{name}.exe"), format!("{name}.cmd")]
}

#[cfg(not(windows))]
fn executable_names(name: &str) -> Vec<String> {
    vec![name.to_string()]
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
