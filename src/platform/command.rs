use std::io;
use std::process::{Command, ExitStatus};
use std::sync::Arc;

/// Captured result of an external helper (`lp`, `lpstat`, camera tools).
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub success: bool,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    fn from_status(status: ExitStatus, stdout: &[u8], stderr: &[u8]) -> Self {
        Self {
            success: status.success(),
            exit_code: status.code(),
            stdout: String::from_utf8_lossy(stdout).into_owned(),
            stderr: String::from_utf8_lossy(stderr).into_owned(),
        }
    }

    /// Short human readable reason for a failed invocation.
    pub fn failure_detail(&self) -> String {
        let exit = self
            .exit_code
            .map(|code| format!("exit code {code}"))
            .unwrap_or_else(|| "terminated by signal".to_string());
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            exit
        } else {
            format!("{exit}: {stderr}")
        }
    }
}

/// Runs `program` with `args`. Swappable so tests never spawn processes.
pub type CommandRunner = Arc<dyn Fn(&str, &[String]) -> io::Result<CommandOutput> + Send + Sync>;

pub fn default_runner() -> CommandRunner {
    Arc::new(|program: &str, args: &[String]| -> io::Result<CommandOutput> {
        let output = Command::new(program).args(args).output()?;
        Ok(CommandOutput::from_status(
            output.status,
            &output.stdout,
            &output.stderr,
        ))
    })
}

/// Arguments for running a template through `sh -c`.
pub fn shell_args(command: &str) -> Vec<String> {
    vec!["-c".to_string(), command.to_string()]
}
