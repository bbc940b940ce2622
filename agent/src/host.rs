//! Hostname detection

use tracing::warn;

/// Hostname reported with every event when no override is configured.
///
/// Falls back to `"unknown"` rather than failing so a host with a broken
/// hostname still reports its logins.
pub fn system_hostname() -> String {
    match nix::unistd::gethostname() {
        Ok(name) => match name.to_str() {
            Some(name) if !name.trim().is_empty() => return name.trim().to_string(),
            Some(_) => warn!("System hostname is empty"),
            None => warn!("System hostname is not valid UTF-8"),
        },
        Err(e) => warn!("Failed to get system hostname: {}", e),
    }

    "unknown".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hostname_is_never_empty() {
        assert!(!system_hostname().is_empty());
    }
}
