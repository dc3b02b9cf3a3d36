//! Registry of known peer nodes, stored as normalized base URLs.

use std::collections::BTreeSet;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("unparseable peer address: {0}")]
    InvalidAddress(String),
}

#[derive(Debug, Default)]
pub struct NodeRegistry {
    peers: BTreeSet<String>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accepts `host:port` or a full http(s) URL; duplicates collapse.
    pub fn register(&mut self, address: &str) -> Result<(), RegistryError> {
        let normalized = normalize(address)?;
        self.peers.insert(normalized);
        Ok(())
    }

    pub fn addresses(&self) -> Vec<String> {
        self.peers.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}

/// Normalize to `scheme://host:port`, assuming `http://` when no scheme is
/// given. The port is required; paths are rejected.
fn normalize(address: &str) -> Result<String, RegistryError> {
    let invalid = || RegistryError::InvalidAddress(address.to_string());

    let trimmed = address.trim().trim_end_matches('/');
    let with_scheme = if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else if trimmed.contains("://") {
        return Err(invalid());
    } else {
        format!("http://{trimmed}")
    };

    let authority = with_scheme
        .splitn(2, "://")
        .nth(1)
        .filter(|rest| !rest.is_empty() && !rest.contains('/'))
        .ok_or_else(invalid)?;
    let (host, port) = authority.rsplit_once(':').ok_or_else(invalid)?;
    if host.is_empty() || port.parse::<u16>().is_err() {
        return Err(invalid());
    }

    Ok(with_scheme)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_host_port_gets_http_scheme() {
        let mut registry = NodeRegistry::new();
        registry.register("127.0.0.1:8081").unwrap();
        assert_eq!(registry.addresses(), vec!["http://127.0.0.1:8081"]);
    }

    #[test]
    fn full_urls_keep_their_scheme() {
        let mut registry = NodeRegistry::new();
        registry.register("https://node.example:8443").unwrap();
        registry.register("http://127.0.0.1:8081/").unwrap();
        assert_eq!(
            registry.addresses(),
            vec!["http://127.0.0.1:8081", "https://node.example:8443"]
        );
    }

    #[test]
    fn duplicates_collapse() {
        let mut registry = NodeRegistry::new();
        registry.register("127.0.0.1:8081").unwrap();
        registry.register("http://127.0.0.1:8081").unwrap();
        registry.register("http://127.0.0.1:8081/").unwrap();
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn garbage_is_rejected() {
        let mut registry = NodeRegistry::new();
        assert!(registry.register("").is_err());
        assert!(registry.register("   ").is_err());
        assert!(registry.register("localhost").is_err());
        assert!(registry.register("127.0.0.1:notaport").is_err());
        assert!(registry.register("ftp://127.0.0.1:8081").is_err());
        assert!(registry.register("http://127.0.0.1:8081/chain").is_err());
        assert!(registry.is_empty());
    }
}
