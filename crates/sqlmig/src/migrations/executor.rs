//! Script execution through an external database client
//!
//! The runner only needs "run this script, tell me the exit status and what
//! was printed". [`PsqlExecutor`] does that by piping the script into `psql`.

use std::io;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::config::DatabaseConfig;

/// Exit status and captured output of one script execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptOutput {
    /// `None` when the process was killed or never produced a status
    pub exit_code: Option<i32>,
    /// stdout lines followed by stderr lines
    pub lines: Vec<String>,
}

impl ScriptOutput {
    /// True only for a clean zero exit
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Runs a complete SQL script against the target database
#[async_trait]
pub trait ScriptExecutor: Send + Sync {
    async fn execute(&self, script: &str) -> io::Result<ScriptOutput>;
}

/// Executes scripts with `psql --set ON_ERROR_STOP=1`
pub struct PsqlExecutor {
    program: String,
    database: DatabaseConfig,
    timeout: Option<Duration>,
}

impl PsqlExecutor {
    /// Create an executor running `program` against `database`
    pub fn new(program: impl Into<String>, database: DatabaseConfig) -> Self {
        Self {
            program: program.into(),
            database,
            timeout: None,
        }
    }

    /// Bound each script execution; `None` waits indefinitely
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command
            .arg("--no-psqlrc")
            .arg("--quiet")
            .arg("--set")
            .arg("ON_ERROR_STOP=1")
            .arg(self.database.connection_url())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(password) = &self.database.password {
            command.env("PGPASSWORD", password);
        }
        command
    }

    async fn run(&self, script: &str) -> io::Result<ScriptOutput> {
        let mut child = self.command().spawn()?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "psql stdin unavailable"))?;
        let payload = script.to_owned();
        let writer = tokio::spawn(async move {
            let result = stdin.write_all(payload.as_bytes()).await;
            drop(stdin);
            result
        });

        let output = child.wait_with_output().await?;

        // psql may exit before draining stdin; the exit status already covers it.
        if let Ok(Err(e)) = writer.await {
            tracing::debug!("Writing script to {} stopped early: {}", self.program, e);
        }

        let mut lines = split_lines(&output.stdout);
        lines.extend(split_lines(&output.stderr));

        Ok(ScriptOutput {
            exit_code: output.status.code(),
            lines,
        })
    }
}

#[async_trait]
impl ScriptExecutor for PsqlExecutor {
    async fn execute(&self, script: &str) -> io::Result<ScriptOutput> {
        match self.timeout {
            None => self.run(script).await,
            Some(limit) => match tokio::time::timeout(limit, self.run(script)).await {
                Ok(result) => result,
                Err(_) => Ok(ScriptOutput {
                    exit_code: None,
                    lines: vec![format!(
                        "error: {} timed out after {:?}",
                        self.program, limit
                    )],
                }),
            },
        }
    }
}

fn split_lines(bytes: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(bytes)
        .lines()
        .map(str::to_string)
        .collect()
}
