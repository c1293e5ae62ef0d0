//! URL handling for Umbra
//!
//! This module provides URL normalization, domain extraction and the
//! classification of an address into the network that can reach it.

mod normalize;

pub use normalize::normalize_url;

use serde::Deserialize;
use std::fmt;
use std::str::FromStr;
use url::Url;

/// The transport a site is reachable over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkType {
    /// Direct internet access
    Clearnet,
    /// Tor hidden services, reached through the SOCKS proxy
    Tor,
    /// I2P eepsites, reached through the I2P HTTP proxy
    I2p,
}

impl NetworkType {
    pub const ALL: [NetworkType; 3] = [Self::Clearnet, Self::Tor, Self::I2p];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Clearnet => "clearnet",
            Self::Tor => "tor",
            Self::I2p => "i2p",
        }
    }

    /// Returns true if reaching this network needs a local proxy
    pub fn needs_proxy(&self) -> bool {
        !matches!(self, Self::Clearnet)
    }
}

impl fmt::Display for NetworkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NetworkType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "clearnet" => Ok(Self::Clearnet),
            "tor" => Ok(Self::Tor),
            "i2p" => Ok(Self::I2p),
            other => Err(format!("unknown network type '{}'", other)),
        }
    }
}

/// Classifies an address by the network that can reach it
///
/// `.onion` hosts are Tor, `.i2p` hosts are I2P and everything else is
/// clearnet. Strings that don't parse as URLs are classified by a suffix
/// check on the text before the first `/` after the scheme.
///
/// # Examples
///
/// ```
/// use umbra_crawler::url::{classify_network, NetworkType};
///
/// assert_eq!(classify_network("http://exampleonion.onion/"), NetworkType::Tor);
/// assert_eq!(classify_network("http://stats.i2p/"), NetworkType::I2p);
/// assert_eq!(classify_network("https://example.com/"), NetworkType::Clearnet);
/// ```
pub fn classify_network(url: &str) -> NetworkType {
    let host = match Url::parse(url.trim()) {
        Ok(parsed) => parsed.host_str().map(|h| h.to_lowercase()),
        Err(_) => None,
    }
    .unwrap_or_else(|| fallback_host(url));

    let host = host.trim_end_matches('.');
    if host.ends_with(".onion") {
        NetworkType::Tor
    } else if host.ends_with(".i2p") {
        NetworkType::I2p
    } else {
        NetworkType::Clearnet
    }
}

fn fallback_host(url: &str) -> String {
    let without_scheme = url.trim().split_once("://").map_or(url, |(_, rest)| rest);
    without_scheme
        .split(['/', '?', '#'])
        .next()
        .unwrap_or_default()
        .split(':')
        .next()
        .unwrap_or_default()
        .to_lowercase()
}

/// Extracts the lowercase host from a URL
pub fn extract_domain(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}

/// Returns the host with its port, the key a single site crawl stays within
pub fn site_key(url: &Url) -> Option<String> {
    let host = extract_domain(url)?;
    Some(match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host,
    })
}
