//! Line-oriented log sources the follower can tail

use crate::errors::{AgentError, Result};
use async_trait::async_trait;
use std::fmt;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::time::timeout;
use tracing::{debug, warn};

/// How long a finished stream's child process gets to report its exit status
const CHILD_EXIT_WAIT: Duration = Duration::from_secs(5);

/// Something that can (re)open a continuous stream of log lines.
#[async_trait]
pub trait LogSource: Send + Sync {
    /// Human-readable description used in log messages
    fn describe(&self) -> String;

    async fn open(&self) -> Result<LogStream>;
}

/// Why a log stream stopped producing lines
#[derive(Debug)]
pub enum StreamEnd {
    /// The tailing process exited
    Exited(ExitStatus),
    /// The underlying reader reached end of input
    Eof,
    /// The process did not report an exit status and was killed
    Killed,
}

impl fmt::Display for StreamEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamEnd::Exited(status) => match status.code() {
                Some(code) => write!(f, "process exited with return code {}", code),
                None => write!(f, "process terminated by signal"),
            },
            StreamEnd::Eof => write!(f, "end of input"),
            StreamEnd::Killed => write!(f, "process killed"),
        }
    }
}

/// An open stream of log lines, optionally backed by a child process.
pub struct LogStream {
    reader: BufReader<Box<dyn AsyncRead + Send + Unpin>>,
    child: Option<Child>,
    buf: Vec<u8>,
}

impl LogStream {
    /// Wrap any async reader, e.g. a pipe or an in-memory buffer
    pub fn from_reader<R>(reader: R) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        Self {
            reader: BufReader::new(Box::new(reader)),
            child: None,
            buf: Vec::new(),
        }
    }

    fn from_child<R>(reader: R, child: Child) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        Self {
            child: Some(child),
            ..Self::from_reader(reader)
        }
    }

    /// Next line without its line terminator, `None` at end of stream.
    ///
    /// Invalid UTF-8 is replaced rather than treated as a read error.
    pub async fn next_line(&mut self) -> std::io::Result<Option<String>> {
        self.buf.clear();
        let read = self.reader.read_until(b'\n', &mut self.buf).await?;
        if read == 0 {
            return Ok(None);
        }

        let line = String::from_utf8_lossy(&self.buf);
        Ok(Some(line.trim_end_matches(['\n', '\r']).to_string()))
    }

    /// Reap the child after end of stream and report how it ended
    pub async fn finish(mut self) -> StreamEnd {
        let Some(mut child) = self.child.take() else {
            return StreamEnd::Eof;
        };

        match timeout(CHILD_EXIT_WAIT, child.wait()).await {
            Ok(Ok(status)) => StreamEnd::Exited(status),
            Ok(Err(e)) => {
                warn!("Failed to collect log process exit status: {}", e);
                StreamEnd::Eof
            }
            Err(_) => {
                Self::kill(&mut child).await;
                StreamEnd::Killed
            }
        }
    }

    /// Stop the child after a read error
    pub async fn abort(mut self) {
        if let Some(mut child) = self.child.take() {
            Self::kill(&mut child).await;
        }
    }

    async fn kill(child: &mut Child) {
        if let Err(e) = child.kill().await {
            warn!("Failed to kill log process: {}", e);
        }
    }
}

/// Spawns a long-running command and tails its standard output.
#[derive(Debug, Clone)]
pub struct CommandSource {
    program: String,
    args: Vec<String>,
}

impl CommandSource {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// `journalctl -u <unit> -f -o cat`: message text only, one entry per line
    pub fn journalctl(unit: &str) -> Self {
        Self::new(
            "journalctl",
            ["-u", unit, "-f", "-o", "cat"].iter().map(|s| s.to_string()).collect(),
        )
    }
}

#[async_trait]
impl LogSource for CommandSource {
    fn describe(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    async fn open(&self) -> Result<LogStream> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| AgentError::Source(format!("failed to spawn {}: {}", self.program, e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AgentError::Source(format!("{} has no stdout pipe", self.program)))?;

        if let Some(stderr) = child.stderr.take() {
            let program = self.program.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    if !line.trim().is_empty() {
                        warn!("{} stderr: {}", program, line);
                    }
                }
            });
        }

        debug!("Spawned log process: {}", self.describe());
        Ok(LogStream::from_child(stdout, child))
    }
}
