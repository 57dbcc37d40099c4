use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use crate::network::{ArtifactChecksum, DEFAULT_PORT};

/// Configuration of a [`crate::network::SyncServer`].
///
/// # Examples
///
/// ```rust
/// use mapscope::network::{ArtifactChecksum, ServerConfig};
///
/// let config = ServerConfig::default()
///     .with_port(0)
///     .with_password("hunter2")
///     .with_checksum(ArtifactChecksum::from_bytes(b"jar contents"));
/// assert_eq!(config.socket_addr().port(), 0);
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerConfig {
    /// Address to listen on.
    pub bind: IpAddr,
    /// Port to listen on. `0` picks a free port.
    pub port: u16,
    /// Password clients must present, if any.
    pub password: Option<String>,
    /// Checksum of the artifact being annotated.
    pub checksum: ArtifactChecksum,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            password: None,
            checksum: ArtifactChecksum::default(),
        }
    }
}

impl ServerConfig {
    /// Sets the listen address.
    #[must_use]
    pub fn with_bind(mut self, bind: IpAddr) -> Self {
        self.bind = bind;
        self
    }

    /// Sets the listen port.
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Requires clients to present `password`.
    #[must_use]
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Sets the artifact checksum clients must match.
    #[must_use]
    pub fn with_checksum(mut self, checksum: ArtifactChecksum) -> Self {
        self.checksum = checksum;
        self
    }

    /// The socket address to bind.
    #[must_use]
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }

    /// Returns true if `password` grants access.
    #[must_use]
    pub fn accepts_password(&self, password: Option<&str>) -> bool {
        match &self.password {
            Some(expected) => password == Some(expected.as_str()),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.port, DEFAULT_PORT);
        assert!(config.accepts_password(None));
        assert!(config.accepts_password(Some("anything")));
    }

    #[test]
    fn test_password() {
        let config = ServerConfig::default().with_password("secret");
        assert!(config.accepts_password(Some("secret")));
        assert!(!config.accepts_password(Some("guess")));
        assert!(!config.accepts_password(None));
    }
}
