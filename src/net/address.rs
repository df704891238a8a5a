//! Listen address parsing.
//!
//! Accepted forms:
//! - `host:port` (or `:port`): TCP
//! - `unix://path`: filesystem socket, path kept verbatim so relative paths work
//! - `scheme://host[:port]`: `scheme` names the network; an empty host falls
//!   back to the URL path
//! - empty string: listening disabled

use std::fmt;

use url::Url;

/// Network used when the address carries no scheme.
pub const DEFAULT_NETWORK: &str = "tcp";

const UNIX_PREFIX: &str = "unix://";

/// A parsed `network` / `address` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenAddress {
    pub network: String,
    pub address: String,
}

impl ListenAddress {
    /// Parse a configured listen address. Never fails: anything without a
    /// recognizable scheme is taken as a plain TCP address.
    pub fn parse(value: &str) -> Self {
        let value = value.trim();

        if value
            .get(..UNIX_PREFIX.len())
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case(UNIX_PREFIX))
        {
            return Self::new("unix", &value[UNIX_PREFIX.len()..]);
        }

        if !value.contains("://") {
            return Self::new(DEFAULT_NETWORK, value);
        }

        match Url::parse(value) {
            Ok(url) => {
                let address = match (url.host_str(), url.port()) {
                    (Some(host), Some(port)) if !host.is_empty() => format!("{host}:{port}"),
                    (Some(host), None) if !host.is_empty() => host.to_string(),
                    _ => url.path().to_string(),
                };
                Self::new(url.scheme(), &address)
            }
            Err(_) => Self::new(DEFAULT_NETWORK, value),
        }
    }

    fn new(network: &str, address: &str) -> Self {
        let network = if network.is_empty() { DEFAULT_NETWORK } else { network };
        Self {
            network: network.to_ascii_lowercase(),
            address: address.to_string(),
        }
    }

    /// An empty address means the accept task has nothing to do.
    pub fn is_disabled(&self) -> bool {
        self.address.is_empty()
    }
}

impl Default for ListenAddress {
    fn default() -> Self {
        Self::new(DEFAULT_NETWORK, "0.0.0.0:80")
    }
}

impl fmt::Display for ListenAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.network, self.address)
    }
}
