use huddle_core::IceServerConfig;
use std::env;

pub const DEFAULT_STUN_ADDR: &str = "stun:stun.l.google.com:19302";

/// Configuration for webrtc-rs peer connections.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub ice_servers: Vec<IceServerConfig>,
}

impl TransportConfig {
    pub fn with_stun_urls<I, S>(urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ice_servers: urls.into_iter().map(IceServerConfig::stun).collect(),
        }
    }

    /// Reads a comma separated `HUDDLE_STUN_URLS`, falling back to the default.
    pub fn from_env() -> Self {
        match env::var("HUDDLE_STUN_URLS") {
            Ok(raw) => Self::parse_stun_list(&raw),
            Err(_) => Self::default(),
        }
    }

    fn parse_stun_list(raw: &str) -> Self {
        let urls: Vec<&str> = raw
            .split(',')
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .collect();

        if urls.is_empty() {
            Self::default()
        } else {
            Self::with_stun_urls(urls)
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            ice_servers: vec![IceServerConfig::stun(DEFAULT_STUN_ADDR)],
        }
    }
}
