//! Broker configuration

use std::net::SocketAddr;

/// Broker configuration options
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Address the publisher-facing listener binds to
    pub pub_addr: SocketAddr,

    /// Address the subscriber-facing listener binds to
    pub sub_addr: SocketAddr,

    /// Enable TCP_NODELAY on accepted sockets
    pub tcp_nodelay: bool,

    /// Replace a dead connection mapping when a subscriber id reconnects
    ///
    /// Off by default: the registry is first-registration-wins and a
    /// reconnecting id keeps its stale mapping (see `registry::connections`).
    pub replace_on_reconnect: bool,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            pub_addr: "0.0.0.0:7777".parse().unwrap(),
            sub_addr: "0.0.0.0:7778".parse().unwrap(),
            tcp_nodelay: true,
            replace_on_reconnect: false,
        }
    }
}

impl BrokerConfig {
    /// Create a config binding both listeners on the given ports
    pub fn with_ports(pub_port: u16, sub_port: u16) -> Self {
        Self {
            pub_addr: SocketAddr::from(([0, 0, 0, 0], pub_port)),
            sub_addr: SocketAddr::from(([0, 0, 0, 0], sub_port)),
            ..Default::default()
        }
    }

    /// Set the publisher listener address
    pub fn pub_addr(mut self, addr: SocketAddr) -> Self {
        self.pub_addr = addr;
        self
    }

    /// Set the subscriber listener address
    pub fn sub_addr(mut self, addr: SocketAddr) -> Self {
        self.sub_addr = addr;
        self
    }

    /// Set TCP_NODELAY on accepted sockets
    pub fn tcp_nodelay(mut self, enabled: bool) -> Self {
        self.tcp_nodelay = enabled;
        self
    }

    /// Enable replacing dead connection mappings on reconnect
    pub fn replace_on_reconnect(mut self, enabled: bool) -> Self {
        self.replace_on_reconnect = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BrokerConfig::default();

        assert_eq!(config.pub_addr.port(), 7777);
        assert_eq!(config.sub_addr.port(), 7778);
        assert!(config.tcp_nodelay);
        assert!(!config.replace_on_reconnect);
    }

    #[test]
    fn test_with_ports() {
        let config = BrokerConfig::with_ports(9000, 9001);

        assert_eq!(config.pub_addr.port(), 9000);
        assert_eq!(config.sub_addr.port(), 9001);
    }

    #[test]
    fn test_builder_chaining() {
        let pub_addr: SocketAddr = "127.0.0.1:5000".parse().unwrap();
        let sub_addr: SocketAddr = "127.0.0.1:5001".parse().unwrap();
        let config = BrokerConfig::default()
            .pub_addr(pub_addr)
            .sub_addr(sub_addr)
            .tcp_nodelay(false)
            .replace_on_reconnect(true);

        assert_eq!(config.pub_addr, pub_addr);
        assert_eq!(config.sub_addr, sub_addr);
        assert!(!config.tcp_nodelay);
        assert!(config.replace_on_reconnect);
    }
}
