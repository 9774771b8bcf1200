//! Robot identity reported in the status line: hostname and deployed version

use crate::domain::types::UNKNOWN_VERSION;
use std::env;
use std::fs;
use std::path::Path;
use tracing::debug;

const KERNEL_HOSTNAME_PATH: &str = "/proc/sys/kernel/hostname";

/// Resolve the machine hostname.
///
/// Reads the kernel hostname, then falls back to `$HOSTNAME`, then `"localhost"`.
pub fn hostname() -> String {
    fs::read_to_string(KERNEL_HOSTNAME_PATH)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .or_else(|| env::var("HOSTNAME").ok().filter(|s| !s.trim().is_empty()))
        .unwrap_or_else(|| "localhost".to_string())
}

/// Read the deployment version marker, trimmed.
///
/// A missing or unreadable file yields `"unknown"`.
pub fn deployment_version(path: &Path) -> String {
    match fs::read_to_string(path) {
        Ok(content) => content.trim().to_string(),
        Err(e) => {
            debug!(path = %path.display(), error = %e, "deployment_version_missing");
            UNKNOWN_VERSION.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_missing_version_file_is_unknown() {
        let version = deployment_version(Path::new("/nonexistent/.deployment_version"));
        assert_eq!(version, "unknown");
    }

    #[test]
    fn test_version_file_is_trimmed() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"  2024.06.1-rc2\n").unwrap();
        file.flush().unwrap();

        assert_eq!(deployment_version(file.path()), "2024.06.1-rc2");
    }

    #[test]
    fn test_hostname_not_empty() {
        assert!(!hostname().is_empty());
    }
}
