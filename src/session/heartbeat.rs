/// Connection liveness
///
/// Both ends send the literal `heartbeat` frame on an interval and record the
/// time of every frame they receive. A connection that has been silent for
/// longer than the timeout is stale.
use std::time::Duration;
use tokio::time::Instant;

use crate::config::SessionConfig;

pub const HEARTBEAT_FRAME: &str = "heartbeat";

#[derive(Debug, Clone, Copy)]
pub struct HeartbeatConfig {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            timeout: Duration::from_secs(60),
        }
    }
}

impl From<&SessionConfig> for HeartbeatConfig {
    fn from(config: &SessionConfig) -> Self {
        Self {
            interval: config.heartbeat_interval(),
            timeout: config.heartbeat_timeout(),
        }
    }
}

#[derive(Debug)]
pub struct Liveness {
    last_frame: Instant,
    last_heartbeat_sent: Option<Instant>,
    config: HeartbeatConfig,
}

impl Liveness {
    pub fn new(config: HeartbeatConfig) -> Self {
        Self {
            last_frame: Instant::now(),
            last_heartbeat_sent: None,
            config,
        }
    }

    pub fn config(&self) -> HeartbeatConfig {
        self.config
    }

    /// Any inbound frame, heartbeat or not, proves the peer is alive
    pub fn record_frame(&mut self) {
        self.last_frame = Instant::now();
    }

    pub fn record_heartbeat_sent(&mut self) {
        self.last_heartbeat_sent = Some(Instant::now());
    }

    pub fn is_stale(&self) -> bool {
        self.last_frame.elapsed() > self.config.timeout
    }

    pub fn needs_heartbeat(&self) -> bool {
        match self.last_heartbeat_sent {
            None => true,
            Some(at) => at.elapsed() >= self.config.interval,
        }
    }

    pub fn silent_for(&self) -> Duration {
        self.last_frame.elapsed()
    }
}

pub fn is_heartbeat(frame: &str) -> bool {
    frame == HEARTBEAT_FRAME
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn becomes_stale_after_timeout_without_frames() {
        let mut liveness = Liveness::new(HeartbeatConfig::default());
        assert!(!liveness.is_stale());

        tokio::time::advance(Duration::from_secs(45)).await;
        liveness.record_frame();
        tokio::time::advance(Duration::from_secs(45)).await;
        assert!(!liveness.is_stale());

        tokio::time::advance(Duration::from_secs(16)).await;
        assert!(liveness.is_stale());
        assert!(liveness.silent_for() >= Duration::from_secs(61));
    }

    #[tokio::test(start_paused = true)]
    async fn heartbeat_due_every_interval() {
        let mut liveness = Liveness::new(HeartbeatConfig::default());
        assert!(liveness.needs_heartbeat());
        liveness.record_heartbeat_sent();
        assert!(!liveness.needs_heartbeat());

        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(liveness.needs_heartbeat());
    }
}
