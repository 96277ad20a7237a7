//! Node kinds and the typed property set carried by every tree node.

use serde::{Deserialize, Serialize};

/// Discriminates the three node shapes in a record tree.
///
/// A `Root` marks the top of one independent tree (there may be several
/// parallel roots, e.g. standard connections and imported sessions).
/// `Container` nodes own an ordered child list and double as inheritance
/// sources; `Connection` nodes are leaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeKind {
    Root,
    Container,
    Connection,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Root => "Root",
            NodeKind::Container => "Container",
            NodeKind::Connection => "Connection",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Root" => Some(NodeKind::Root),
            "Container" => Some(NodeKind::Container),
            "Connection" => Some(NodeKind::Connection),
            _ => None,
        }
    }
}

/// Remote protocol selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Protocol {
    Rdp,
    Vnc,
    Ssh,
    Telnet,
    Http,
    Https,
}

impl Protocol {
    /// Conventional default port for the protocol.
    pub fn default_port(&self) -> u16 {
        match self {
            Protocol::Rdp => 3389,
            Protocol::Vnc => 5900,
            Protocol::Ssh => 22,
            Protocol::Telnet => 23,
            Protocol::Http => 80,
            Protocol::Https => 443,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Rdp => "RDP",
            Protocol::Vnc => "VNC",
            Protocol::Ssh => "SSH",
            Protocol::Telnet => "Telnet",
            Protocol::Http => "HTTP",
            Protocol::Https => "HTTPS",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "RDP" => Some(Protocol::Rdp),
            "VNC" => Some(Protocol::Vnc),
            "SSH" | "SSH2" => Some(Protocol::Ssh),
            "TELNET" => Some(Protocol::Telnet),
            "HTTP" => Some(Protocol::Http),
            "HTTPS" => Some(Protocol::Https),
            _ => None,
        }
    }
}

impl Default for Protocol {
    fn default() -> Self {
        Protocol::Rdp
    }
}

/// Typed property set stored on every node.
///
/// Containers and roots carry the same set as leaves so they can act as
/// inheritance sources for their descendants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionProperties {
    pub description: String,
    pub icon: String,
    pub panel: String,
    pub hostname: String,
    pub protocol: Protocol,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub domain: String,
    /// Opaque lookup key into an external credential repository. Never an
    /// object reference; resolution is the consumer's concern.
    pub credential_ref: Option<String>,
}

impl Default for ConnectionProperties {
    fn default() -> Self {
        Self {
            description: String::new(),
            icon: String::new(),
            panel: "General".to_string(),
            hostname: String::new(),
            protocol: Protocol::default(),
            port: Protocol::default().default_port(),
            username: String::new(),
            password: String::new(),
            domain: String::new(),
            credential_ref: None,
        }
    }
}

impl ConnectionProperties {
    /// Create properties for a host, using the default protocol and its port.
    pub fn new(hostname: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            ..Self::default()
        }
    }

    /// Set the protocol and reset the port to its conventional default.
    pub fn with_protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = protocol;
        self.port = protocol.default_port();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = username.into();
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = password.into();
        self
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = domain.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_default_ports() {
        assert_eq!(Protocol::Rdp.default_port(), 3389);
        assert_eq!(Protocol::Ssh.default_port(), 22);
        assert_eq!(Protocol::Https.default_port(), 443);
    }

    #[test]
    fn test_protocol_parse_roundtrip() {
        for p in [
            Protocol::Rdp,
            Protocol::Vnc,
            Protocol::Ssh,
            Protocol::Telnet,
            Protocol::Http,
            Protocol::Https,
        ] {
            assert_eq!(Protocol::parse(p.as_str()), Some(p));
        }
        assert_eq!(Protocol::parse("gopher"), None);
    }

    #[test]
    fn test_with_protocol_resets_port() {
        let props = ConnectionProperties::new("example.com")
            .with_port(9000)
            .with_protocol(Protocol::Ssh);
        assert_eq!(props.port, 22);
    }
}
