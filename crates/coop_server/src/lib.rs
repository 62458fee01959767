//! # Co-op Headless Host
//!
//! Runs an authoritative session without rendering: binds a UDP socket,
//! spawns a small demo world and drives [`NetSession::update`] at a fixed
//! frame rate.
//!
//! - [`network`] - UDP adapter implementing the core transport contract
//! - [`demo`] - Demo world population and agent patrol driver

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod demo;
pub mod network;

use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use coop_core::config::{Role, SessionConfig};
use coop_core::error::{ConfigError, SyncError, TransportError};
use coop_core::session::{NetSession, SessionEvent};
use coop_core::transport::inbound_queue;
use coop_core::world::World;

use crate::demo::{DemoLayout, PatrolDriver};
use crate::network::UdpHostTransport;

/// Errors that stop the host.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Config could not be loaded or is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Socket setup failed.
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        /// Requested address.
        addr: SocketAddr,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Session setup failed.
    #[error(transparent)]
    Sync(#[from] SyncError),

    /// Transport failure outside the frame loop.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Server configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Interface to bind.
    pub bind_address: String,
    /// Port to listen on.
    pub port: u16,
    /// Session frames per second.
    pub frame_rate_hz: u32,
    /// Seconds of silence before a peer is dropped.
    pub peer_timeout_secs: u64,
    /// Session tuning. Must use the host role.
    pub session: SessionConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".into(),
            port: 7777,
            frame_rate_hz: 60,
            peer_timeout_secs: 10,
            session: SessionConfig::host(),
        }
    }
}

impl ServerConfig {
    /// Parse and validate a config from RON text.
    pub fn from_ron_str(ron: &str) -> Result<Self, ConfigError> {
        let config: Self = ron::from_str(ron)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a config from a RON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_ron_str(&contents)
    }

    /// Check value ranges, including the embedded session config.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.session.validate()?;
        if self.session.role != Role::Host {
            return Err(ConfigError::Invalid(
                "session.role must be Host for the headless server".into(),
            ));
        }
        if self.frame_rate_hz == 0 || self.frame_rate_hz > 1000 {
            return Err(ConfigError::Invalid(format!(
                "frame_rate_hz must be in 1..=1000, got {}",
                self.frame_rate_hz
            )));
        }
        if self.peer_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "peer_timeout_secs must be at least 1".into(),
            ));
        }
        self.socket_addr().map(|_| ())
    }

    /// Address to bind.
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let ip: IpAddr = self.bind_address.parse().map_err(|_| {
            ConfigError::Invalid(format!("bind_address '{}' is not an IP", self.bind_address))
        })?;
        Ok(SocketAddr::new(ip, self.port))
    }

    /// Time between frames.
    #[must_use]
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.frame_rate_hz.max(1)))
    }

    /// Silence allowed before a peer times out.
    #[must_use]
    pub fn peer_timeout(&self) -> Duration {
        Duration::from_secs(self.peer_timeout_secs)
    }
}

/// Run the host until `frame_limit` frames have passed, or forever.
pub async fn run(config: ServerConfig, frame_limit: Option<u64>) -> Result<(), ServerError> {
    config.validate()?;
    let addr = config.socket_addr()?;

    let (inbound, rx) = inbound_queue();
    let mut transport = UdpHostTransport::bind(addr, config.peer_timeout(), inbound)
        .await
        .map_err(|source| ServerError::Bind { addr, source })?;
    let receiver = transport.spawn_receiver();

    let mut session = NetSession::new(config.session.clone(), rx);
    let mut world = World::new();
    let demo = demo::populate(&mut session, &mut world, &DemoLayout::default())?;
    let driver = PatrolDriver::default();

    info!(
        addr = %transport.local_addr().unwrap_or(addr),
        frame_rate_hz = config.frame_rate_hz,
        agents = demo.agents.len(),
        items = demo.items.len(),
        "Host listening"
    );

    let mut ticker = tokio::time::interval(config.frame_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut last = Instant::now();
    let mut frames = 0u64;

    loop {
        ticker.tick().await;
        let now = Instant::now();
        let dt = now.duration_since(last).as_secs_f32();
        last = now;

        transport.expire_silent(now);
        driver.drive(&mut world, dt);
        for event in session.update(dt, &mut world, &mut transport) {
            handle_event(&mut transport, &event);
        }

        frames += 1;
        if frame_limit.is_some_and(|limit| frames >= limit) {
            break;
        }
    }

    let stats = session.stats();
    info!(frames, dropped = stats.dropped(), relayed = stats.relayed, "Host stopping");
    session.shutdown();
    receiver.abort();
    Ok(())
}

fn handle_event(transport: &mut UdpHostTransport, event: &SessionEvent) {
    match event {
        SessionEvent::PeerRefused(peer) => transport.disconnect(*peer),
        SessionEvent::PeerJoined { peer, player } => {
            info!(peer = %peer, player = %player, "Player joined");
        }
        SessionEvent::PeerLeft { peer, player } => {
            info!(peer = %peer, player = %player, "Player left");
        }
        other => debug!(event = ?other, "Session event"),
    }
}
