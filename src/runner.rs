//! External command execution
//!
//! Every mutation this tool performs goes through `docker`, `gcloud`, or
//! `kubectl`. The [`CommandRunner`] trait is the single seam between the
//! pipeline stages and those processes, so tests can script responses and
//! assert on the exact invocations without touching a real project or
//! cluster.
//!
//! A non-zero exit is not an error at this level: stages inspect
//! [`CommandOutput`] to classify failures (pre-existence is tolerated,
//! permission denials are fatal, and so on).

use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::{Error, Result};

/// Captured result of one external command
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Whether the command exited zero
    pub success: bool,
    /// Standard output
    pub stdout: String,
    /// Standard error
    pub stderr: String,
}

impl CommandOutput {
    /// A successful output with the given stdout (test and mock helper)
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            success: true,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// A failed output with the given stderr (test and mock helper)
    pub fn err(stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }
}

impl From<std::process::Output> for CommandOutput {
    fn from(output: std::process::Output) -> Self {
        Self {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        }
    }
}

/// Render a program and its arguments as a single diagnostic string
pub fn command_line(program: &str, args: &[&str]) -> String {
    format!("{} {}", program, args.join(" "))
}

/// Trait for executing external commands (allows scripting in tests)
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Execute a command and capture its output
    async fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput>;

    /// Execute a command with the given string piped to stdin
    async fn run_with_stdin(
        &self,
        program: &str,
        args: &[&str],
        input: &str,
    ) -> Result<CommandOutput>;
}

/// Command runner that spawns real processes via tokio
#[derive(Debug, Default, Clone)]
pub struct ShellRunner;

#[async_trait]
impl CommandRunner for ShellRunner {
    async fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput> {
        debug!(program, ?args, "executing");
        let output = Command::new(program)
            .args(args)
            .output()
            .await
            .map_err(|e| Error::command(command_line(program, args), e.to_string()))?;
        Ok(CommandOutput::from(output))
    }

    async fn run_with_stdin(
        &self,
        program: &str,
        args: &[&str],
        input: &str,
    ) -> Result<CommandOutput> {
        debug!(program, ?args, "executing with stdin");
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::command(command_line(program, args), e.to_string()))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(input.as_bytes())
                .await
                .map_err(|e| Error::command(command_line(program, args), e.to_string()))?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| Error::command(command_line(program, args), e.to_string()))?;
        Ok(CommandOutput::from(output))
    }
}

/// Check that a tool is reachable on PATH
pub async fn tool_available<R: CommandRunner + ?Sized>(runner: &R, tool: &str) -> Result<bool> {
    let output = runner.run("which", &[tool]).await?;
    Ok(output.success)
}


#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn shell_runner_captures_stdout() {
        let runner = ShellRunner;
        let output = runner.run("echo", &["hello world"]).await.unwrap();
        assert!(output.success);
        assert!(output.stdout.contains("hello world"));
        assert!(output.stderr.is_empty());
    }

    #[tokio::test]
    async fn shell_runner_reports_nonzero_exit_as_output_not_error() {
        let runner = ShellRunner;
        let output = runner.run("sh", &["-c", "exit 3"]).await.unwrap();
        assert!(!output.success);
    }

    #[tokio::test]
    async fn shell_runner_captures_stderr() {
        let runner = ShellRunner;
        let output = runner
            .run("sh", &["-c", "echo boom >&2; exit 1"])
            .await
            .unwrap();
        assert!(!output.success);
        assert!(output.stderr.contains("boom"));
    }

    #[tokio::test]
    async fn shell_runner_pipes_stdin() {
        let runner = ShellRunner;
        let output = runner.run_with_stdin("cat", &[], "piped input").await.unwrap();
        assert!(output.success);
        assert_eq!(output.stdout, "piped input");
    }

    #[tokio::test]
    async fn missing_program_is_a_command_error() {
        let runner = ShellRunner;
        let result = runner.run("definitely-not-a-real-tool-xyz", &[]).await;
        assert!(matches!(result, Err(Error::CommandFailed { .. })));
    }

    #[tokio::test]
    async fn scripted_runner_records_invocations() {
        use testing::ScriptedRunner;

        let runner = ScriptedRunner::new(|program, _| {
            if program == "gcloud" {
                Ok(CommandOutput::ok("done"))
            } else {
                Ok(CommandOutput::err("unexpected"))
            }
        });

        runner.run("gcloud", &["projects", "list"]).await.unwrap();
        runner.run_with_stdin("kubectl", &["apply", "-f", "-"], "kind: Pod").await.unwrap();

        let calls = runner.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].line(), "gcloud projects list");
        assert_eq!(calls[1].stdin.as_deref(), Some("kind: Pod"));
    }

    #[test]
    fn command_line_joins_args() {
        assert_eq!(
            command_line("kubectl", &["get", "pods", "-n", "demo"]),
            "kubectl get pods -n demo"
        );
    }
}
