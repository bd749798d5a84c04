//! Connectivity pre-checks for remote URLs

use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use crate::{Error, Result};

/// Host and port a remote URL connects to
///
/// Returns `None` for local remotes (plain paths and `file://` URLs), which
/// need no network.
pub fn remote_endpoint(url: &str) -> Option<(String, u16)> {
    let url = url.trim();

    if let Ok(parsed) = url::Url::parse(url) {
        let port = match parsed.scheme() {
            "http" | "https" => parsed.port_or_known_default(),
            "ssh" | "git+ssh" => Some(parsed.port().unwrap_or(22)),
            "git" => Some(parsed.port().unwrap_or(9418)),
            _ => None,
        }?;
        let host = parsed.host_str()?.to_string();
        return Some((host, port));
    }

    // scp-like syntax: [user@]host:path
    let (authority, _) = url.split_once(':')?;
    if authority.contains('/') || authority.len() <= 1 {
        return None;
    }
    let host = authority.rsplit('@').next()?.to_string();
    Some((host, 22))
}

/// Check that the host behind `url` accepts connections within `timeout`
pub fn check_reachable(url: &str, timeout: Duration) -> Result<()> {
    let Some((host, port)) = remote_endpoint(url) else {
        return Ok(());
    };

    let addrs = (host.as_str(), port)
        .to_socket_addrs()
        .map_err(|e| Error::Offline(format!("cannot resolve {}: {}", host, e)))?;

    for addr in addrs {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(_) => {
                tracing::debug!(%host, port, "Remote is reachable");
                return Ok(());
            }
            Err(e) => tracing::debug!(%addr, error = %e, "Connection attempt failed"),
        }
    }

    Err(Error::Offline(format!("cannot reach {}:{}", host, port)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_https_endpoint() {
        assert_eq!(
            remote_endpoint("https://github.com/owner/repo.git"),
            Some(("github.com".to_string(), 443))
        );
        assert_eq!(
            remote_endpoint("http://git.local:8080/repo"),
            Some(("git.local".to_string(), 8080))
        );
    }

    #[test]
    fn test_ssh_endpoints() {
        assert_eq!(
            remote_endpoint("git@github.com:owner/repo.git"),
            Some(("github.com".to_string(), 22))
        );
        assert_eq!(
            remote_endpoint("ssh://git@example.com:2222/repo"),
            Some(("example.com".to_string(), 2222))
        );
    }

    #[test]
    fn test_local_remotes_have_no_endpoint() {
        assert_eq!(remote_endpoint("/srv/git/mods.git"), None);
        assert_eq!(remote_endpoint("file:///srv/git/mods.git"), None);
        assert_eq!(remote_endpoint("../mods.git"), None);
        assert_eq!(remote_endpoint("C:\\mods\\repo"), None);
    }

    #[test]
    fn test_local_remote_is_always_reachable() {
        assert!(check_reachable("/srv/git/mods.git", Duration::from_millis(10)).is_ok());
    }
}
