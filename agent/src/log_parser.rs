//! sshd log line parsing

use crate::event::SshLogin;
use regex::Regex;
use std::sync::OnceLock;

/// Trait for turning a raw log line into a successful-login record
pub trait LogParser: Send + Sync {
    fn parse(&self, line: &str) -> Option<SshLogin>;
}

/// Matches sshd's "Accepted <method> for <user> from <addr> port <port>" lines,
/// wherever they appear in the line (journal `cat` output or syslog format).
pub struct SshAcceptedParser;

fn accepted_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"Accepted\s+([\w/-]+)\s+for\s+(\S+)\s+from\s+([\d.:a-fA-F]+)\s+port\s+(\d+)")
            .expect("accepted-login pattern is valid")
    })
}

impl LogParser for SshAcceptedParser {
    fn parse(&self, line: &str) -> Option<SshLogin> {
        parse_line(line)
    }
}

/// Parse one line. Returns `None` for anything that is not a successful login.
pub fn parse_line(line: &str) -> Option<SshLogin> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let captures = accepted_pattern().captures(line)?;
    let field = |group: usize| captures.get(group).map(|m| m.as_str().to_string());

    Some(SshLogin {
        method: field(1)?,
        user: field(2)?,
        source_ip: field(3)?,
        source_port: field(4)?,
        raw_message: line.to_string(),
    })
}
