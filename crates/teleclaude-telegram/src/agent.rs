//! The agent child process and its line-oriented event stream.
//!
//! The agent runs with stream-json on both pipes. The prompt goes in on
//! stdin, events come out on stdout, and every tool the agent wants to run
//! arrives as a `can_use_tool` control request that blocks the agent until
//! [`EventSource::reply`] answers it.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use teleclaude_config::AgentSection;
use teleclaude_core::{AgentEvent, PermissionReply, parse_line, user_message};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, info, warn};

use crate::error::TelegramResult;

/// Flags that put the agent into the bridge's protocol.
const PROTOCOL_ARGS: &[&str] = &[
    "--print",
    "--output-format",
    "stream-json",
    "--input-format",
    "stream-json",
    "--verbose",
    "--permission-prompt-tool",
    "stdio",
];

/// A source of agent events for one turn.
#[async_trait]
pub trait EventSource: Send {
    /// Next batch of events. `None` once the stream has ended.
    async fn next_events(&mut self) -> Option<Vec<AgentEvent>>;

    /// Answer an [`AgentEvent::PermissionRequest`].
    ///
    /// # Errors
    ///
    /// Returns an error if the agent can no longer be written to.
    async fn reply(&mut self, request_id: &str, reply: &PermissionReply) -> TelegramResult<()>;

    /// Stop producing events. Idempotent.
    async fn stop(&mut self);
}

/// A running agent invocation.
#[derive(Debug)]
pub struct AgentProcess {
    child: Child,
    /// Closed once the turn's result arrives, which lets the agent exit.
    stdin: Option<ChildStdin>,
    lines: Lines<BufReader<ChildStdout>>,
}

/// Command-line arguments for one invocation: configured flags, the protocol
/// flags, then the resume flag if any.
#[must_use]
pub fn build_args(config: &AgentSection, resume: Option<&str>) -> Vec<String> {
    let mut args = config.args.clone();
    args.extend(PROTOCOL_ARGS.iter().map(ToString::to_string));
    if let Some(session_id) = resume {
        args.push("--resume".to_string());
        args.push(session_id.to_string());
    }
    args
}

async fn write_line(stdin: &mut ChildStdin, line: &str) -> std::io::Result<()> {
    stdin.write_all(line.as_bytes()).await?;
    stdin.write_all(b"\n").await?;
    stdin.flush().await
}

fn stdin_closed() -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::BrokenPipe, "agent stdin closed")
}

impl AgentProcess {
    /// Start the agent and send it `prompt`, resuming `resume` if given.
    ///
    /// `working_dir` overrides the configured directory.
    ///
    /// # Errors
    ///
    /// Returns [`crate::TelegramBotError::Agent`] if the process cannot be
    /// spawned or does not accept the prompt.
    pub async fn spawn(
        config: &AgentSection,
        prompt: &str,
        resume: Option<&str>,
        working_dir: Option<&Path>,
    ) -> TelegramResult<Self> {
        let mut command = Command::new(&config.command);
        command
            .args(build_args(config, resume))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        if let Some(dir) = working_dir {
            command.current_dir(dir);
        } else if let Some(dir) = &config.working_dir {
            command.current_dir(dir);
        }

        let mut child = command.spawn()?;
        let stdout = child.stdout.take().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::BrokenPipe, "agent stdout not captured")
        })?;
        let mut stdin = child.stdin.take().ok_or_else(stdin_closed)?;
        write_line(&mut stdin, &user_message(prompt)).await?;

        info!(
            command = %config.command,
            pid = child.id(),
            resume = resume.is_some(),
            "agent started"
        );
        Ok(Self {
            child,
            stdin: Some(stdin),
            lines: BufReader::new(stdout).lines(),
        })
    }
}

#[async_trait]
impl EventSource for AgentProcess {
    async fn next_events(&mut self) -> Option<Vec<AgentEvent>> {
        match self.lines.next_line().await {
            Ok(Some(line)) => match parse_line(&line) {
                Ok(events) => {
                    if events
                        .iter()
                        .any(|e| matches!(e, AgentEvent::TurnSummary { .. }))
                    {
                        self.stdin = None;
                    }
                    Some(events)
                },
                Err(e) => {
                    warn!(error = %e, "skipping unparseable agent output");
                    Some(Vec::new())
                },
            },
            Ok(None) => {
                self.stdin = None;
                match self.child.wait().await {
                    Ok(status) if status.success() => debug!("agent exited"),
                    Ok(status) => warn!(%status, "agent exited with failure"),
                    Err(e) => warn!(error = %e, "failed to reap agent"),
                }
                None
            },
            Err(e) => {
                warn!(error = %e, "failed to read agent output");
                None
            },
        }
    }

    async fn reply(&mut self, request_id: &str, reply: &PermissionReply) -> TelegramResult<()> {
        let stdin = self.stdin.as_mut().ok_or_else(stdin_closed)?;
        write_line(stdin, &reply.to_line(request_id)).await?;
        debug!(%request_id, allow = reply.is_allow(), "permission reply sent");
        Ok(())
    }

    async fn stop(&mut self) {
        self.stdin = None;
        match self.child.kill().await {
            Ok(()) => info!("agent stopped"),
            Err(e) => debug!(error = %e, "agent already gone"),
        }
    }
}
