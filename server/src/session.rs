//! Client session tracking and liveness eviction.
//!
//! Sessions are keyed by player id, created on INIT, refreshed by any
//! valid traffic, and evicted after a configurable quiet period. The
//! roster is bounded; re-registration of a known player updates the
//! endpoint instead of consuming a slot.

use log::info;
use shared::SequenceGate;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// One registered player connection.
#[derive(Debug)]
pub struct Session {
    pub player_id: u8,
    pub addr: SocketAddr,
    pub last_seen: Instant,
    /// Deduplicates double-sent claim datagrams from this player.
    pub event_gate: SequenceGate,
}

impl Session {
    pub fn new(player_id: u8, addr: SocketAddr) -> Self {
        Self {
            player_id,
            addr,
            last_seen: Instant::now(),
            event_gate: SequenceGate::new(),
        }
    }

    pub fn refresh(&mut self, addr: SocketAddr) {
        self.addr = addr;
        self.last_seen = Instant::now();
    }

    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }
}

/// Result of an INIT registration attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterOutcome {
    /// New session created.
    Registered,
    /// Player was already known; endpoint and liveness refreshed.
    Refreshed,
    /// Roster is full and this player id is not in it.
    CapacityFull,
}

/// Bounded mapping from player id to live session.
pub struct SessionManager {
    sessions: HashMap<u8, Session>,
    max_sessions: usize,
    timeout: Duration,
}

impl SessionManager {
    pub fn new(max_sessions: usize, timeout: Duration) -> Self {
        Self {
            sessions: HashMap::new(),
            max_sessions,
            timeout,
        }
    }

    /// Registers a player, idempotently.
    pub fn register(&mut self, player_id: u8, addr: SocketAddr) -> RegisterOutcome {
        if let Some(session) = self.sessions.get_mut(&player_id) {
            session.refresh(addr);
            return RegisterOutcome::Refreshed;
        }
        if self.sessions.len() >= self.max_sessions {
            return RegisterOutcome::CapacityFull;
        }
        info!("player {} registered from {}", player_id, addr);
        self.sessions.insert(player_id, Session::new(player_id, addr));
        RegisterOutcome::Registered
    }

    pub fn is_registered(&self, player_id: u8) -> bool {
        self.sessions.contains_key(&player_id)
    }

    /// Marks traffic from a registered player, refreshing liveness and the
    /// sending endpoint.
    pub fn touch(&mut self, player_id: u8, addr: SocketAddr) -> bool {
        match self.sessions.get_mut(&player_id) {
            Some(session) => {
                session.refresh(addr);
                true
            }
            None => false,
        }
    }

    /// Runs the double-send duplicate filter for one claim datagram.
    ///
    /// Returns `false` when the sequence repeats the last accepted one
    /// (i.e. the second copy of a double-send) or the player is unknown.
    pub fn accept_event(&mut self, player_id: u8, sequence: u32) -> bool {
        match self.sessions.get_mut(&player_id) {
            Some(session) => session.event_gate.accept(sequence),
            None => false,
        }
    }

    /// Evicts sessions quiet for longer than the timeout, returning the
    /// evicted player ids.
    pub fn check_timeouts(&mut self) -> Vec<u8> {
        let timeout = self.timeout;
        let timed_out: Vec<u8> = self
            .sessions
            .values()
            .filter(|s| s.is_timed_out(timeout))
            .map(|s| s.player_id)
            .collect();

        for player_id in &timed_out {
            self.sessions.remove(player_id);
            info!("player {} evicted after timeout", player_id);
        }

        timed_out
    }

    /// Endpoints of all live sessions, for broadcast fan-out.
    pub fn addrs(&self) -> Vec<SocketAddr> {
        self.sessions.values().map(|s| s.addr).collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
