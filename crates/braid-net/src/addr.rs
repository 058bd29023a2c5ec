//! Network addresses

use serde::{Deserialize, Serialize};
use std::fmt;

/// A `(host, port)` pair identifying one network endpoint
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NetworkAddress {
    /// Host name or IP literal
    pub host: String,
    /// TCP port
    pub port: u16,
}

impl NetworkAddress {
    /// Build an address from its parts
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// The `(host, port)` view `tokio::net` connect/bind calls accept
    pub fn to_pair(&self) -> (&str, u16) {
        (self.host.as_str(), self.port)
    }
}

impl fmt::Display for NetworkAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn displays_as_host_port() {
        let addr = NetworkAddress::new("10.0.0.7", 25575);
        assert_eq!(addr.to_string(), "10.0.0.7:25575");
    }

    #[test]
    fn deserializes_from_config_object() {
        let addr: NetworkAddress =
            serde_json::from_str(r#"{"host": "localhost", "port": 12345}"#).unwrap();
        assert_eq!(addr, NetworkAddress::new("localhost", 12345));
    }
}
