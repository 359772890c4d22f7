use crate::transport::MediaConstraints;
use std::env;
use std::time::Duration;
use tracing::warn;

/// Close code used for intentional disconnects. Any other code is abnormal.
pub const NORMAL_CLOSE_CODE: u16 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    Fixed,
    Exponential { max: Duration },
}

/// How the session retries after the relay connection drops while in a room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
    pub backoff: Backoff,
}

impl ReconnectPolicy {
    /// Delay before the given attempt, counted from 1.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed => self.delay,
            Backoff::Exponential { max } => {
                let shift = attempt.saturating_sub(1).min(16);
                self.delay.saturating_mul(1 << shift).min(max)
            }
        }
    }

    pub fn disabled() -> Self {
        Self {
            max_attempts: 0,
            ..Self::default()
        }
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(3),
            backoff: Backoff::Fixed,
        }
    }
}

/// What to do when a peer connection reports a terminal ICE failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailureRecovery {
    /// Tear everything down and rejoin the room under a fresh username.
    #[default]
    RejoinRoom,
    /// Replace only the failed negotiation.
    RenegotiatePeer,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub endpoint: String,
    pub connect_timeout: Duration,
    pub reconnect: ReconnectPolicy,
    pub normal_close_code: u16,
    pub failure_recovery: FailureRecovery,
    pub media: MediaConstraints,
    /// Sent as `create` in the join message.
    pub create_room: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            endpoint: "ws://127.0.0.1:8080/ws".to_owned(),
            connect_timeout: Duration::from_secs(5),
            reconnect: ReconnectPolicy::default(),
            normal_close_code: NORMAL_CLOSE_CODE,
            failure_recovery: FailureRecovery::default(),
            media: MediaConstraints::default(),
            create_room: true,
        }
    }
}

impl SessionConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Self::default()
        }
    }

    /// Defaults overridden by `HUDDLE_*` environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(url) = env::var("HUDDLE_SERVER_URL") {
            config.endpoint = url;
        }
        if let Some(ms) = env_u64("HUDDLE_CONNECT_TIMEOUT_MS") {
            config.connect_timeout = Duration::from_millis(ms);
        }
        if let Some(attempts) = env_u64("HUDDLE_RECONNECT_ATTEMPTS") {
            config.reconnect.max_attempts = u32::try_from(attempts).unwrap_or(u32::MAX);
        }
        if let Some(ms) = env_u64("HUDDLE_RECONNECT_DELAY_MS") {
            config.reconnect.delay = Duration::from_millis(ms);
        }

        config
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_reconnect(mut self, reconnect: ReconnectPolicy) -> Self {
        self.reconnect = reconnect;
        self
    }

    pub fn with_failure_recovery(mut self, recovery: FailureRecovery) -> Self {
        self.failure_recovery = recovery;
        self
    }

    pub fn with_media(mut self, media: MediaConstraints) -> Self {
        self.media = media;
        self
    }

    pub fn with_create_room(mut self, create: bool) -> Self {
        self.create_room = create;
        self
    }
}

fn env_u64(key: &str) -> Option<u64> {
    let raw = env::var(key).ok()?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("Ignoring {}={:?}: {}", key, raw, e);
            None
        }
    }
}
