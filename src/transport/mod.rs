//! Local process transport for the command-line collaborators (`az`,
//! `pandoc`).

pub mod local;

use std::time::Duration;

/// Output from running a program.
#[derive(Debug, Clone)]
pub struct ExecOutput {
    pub exit_code: i32,
    pub stdout: Vec<u8>,
    pub stderr: String,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// A program that could not be run to completion.
#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    #[error("failed to spawn {program}: {reason}")]
    Spawn { program: String, reason: String },

    #[error("{0}")]
    Io(String),

    /// The program was killed after exceeding its time limit.
    #[error("{program} timed out after {}s", .limit.as_secs_f64())]
    TimedOut { program: String, limit: Duration },
}
