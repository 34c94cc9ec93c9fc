//! Server network layer: UDP ingress, broadcast loop, and fan-out.
//!
//! Three tasks plus the main loop, stitched together with channels:
//! - a receiver task that decodes datagrams off the socket and forwards
//!   the valid ones (invalid datagrams are dropped with a diagnostic,
//!   never an abort),
//! - a sender task that drains the outgoing queue, including the
//!   double-send pattern for events and game-over notices,
//! - the main loop, which exclusively owns the [`GridGame`] and the
//!   session roster, so claims and snapshot reads are never interleaved.
//!
//! The broadcast tick uses `MissedTickBehavior::Skip`: if a tick overruns,
//! the next one is skipped rather than queued, preserving real-time pacing.

use crate::game::{ClaimOutcome, GridGame};
use crate::session::{RegisterOutcome, SessionManager};
use log::{debug, error, info, warn};
use shared::{
    decode, encode, now_ms, CellCoord, CellEvent, Datagram, EventKind, Payload, SnapshotHistory,
    TelemetryEvent, TelemetrySink, DOUBLE_SEND_GAP_MS, REDUNDANCY, UNCLAIMED,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};

/// Server tuning knobs, filled in from the CLI.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub rate_hz: u32,
    pub max_sessions: usize,
    pub session_timeout: Duration,
}

/// Messages from the receiver task to the main loop.
#[derive(Debug)]
enum Ingress {
    Datagram { dgram: Datagram, addr: SocketAddr },
}

/// Messages from the main loop to the sender task.
#[derive(Debug)]
enum Egress {
    Broadcast {
        bytes: Vec<u8>,
        addrs: Vec<SocketAddr>,
    },
    /// Two identical transmissions per address, a short gap apart.
    DoubleSend {
        bytes: Vec<u8>,
        addrs: Vec<SocketAddr>,
    },
}

/// Authoritative GSync server: owns the game state, the session roster,
/// and the fixed-rate broadcast loop.
pub struct Server {
    socket: Arc<UdpSocket>,
    game: GridGame,
    sessions: SessionManager,
    history: SnapshotHistory,
    telemetry: Arc<dyn TelemetrySink>,

    tick_duration: Duration,
    sequence: u32,
    last_snapshot_id: u32,
    game_over_sent: bool,

    ingress_tx: mpsc::UnboundedSender<Ingress>,
    ingress_rx: mpsc::UnboundedReceiver<Ingress>,
    egress_tx: mpsc::UnboundedSender<Egress>,
    egress_rx: mpsc::UnboundedReceiver<Egress>,
}

impl Server {
    pub async fn new(
        config: ServerConfig,
        telemetry: Arc<dyn TelemetrySink>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        // binding is the only fatal failure; everything after this point
        // recovers locally
        let socket = Arc::new(UdpSocket::bind(&config.bind_addr).await?);
        info!("server listening on {}", config.bind_addr);

        let (ingress_tx, ingress_rx) = mpsc::unbounded_channel();
        let (egress_tx, egress_rx) = mpsc::unbounded_channel();

        Ok(Server {
            socket,
            game: GridGame::new(),
            sessions: SessionManager::new(config.max_sessions, config.session_timeout),
            history: SnapshotHistory::new(REDUNDANCY),
            telemetry,
            tick_duration: Duration::from_secs_f64(1.0 / config.rate_hz.max(1) as f64),
            sequence: 0,
            last_snapshot_id: 0,
            game_over_sent: false,
            ingress_tx,
            ingress_rx,
            egress_tx,
            egress_rx,
        })
    }

    /// Address the UDP socket actually bound to. Useful when binding
    /// port 0 in tests.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Spawns the task that decodes incoming datagrams.
    fn spawn_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let ingress_tx = self.ingress_tx.clone();
        let telemetry = Arc::clone(&self.telemetry);

        tokio::spawn(async move {
            let mut buffer = [0u8; 2048];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => match decode(&buffer[..len]) {
                        Ok(dgram) => {
                            if ingress_tx.send(Ingress::Datagram { dgram, addr }).is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            warn!("dropping datagram from {}: {}", addr, e);
                            telemetry.record(TelemetryEvent::DatagramDropped {
                                ts_ms: now_ms(),
                                reason: e.to_string(),
                            });
                        }
                    },
                    Err(e) => {
                        error!("error receiving datagram: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Spawns the task that drains the outgoing queue.
    fn spawn_sender(&mut self) {
        let socket = Arc::clone(&self.socket);
        let mut egress_rx = std::mem::replace(&mut self.egress_rx, mpsc::unbounded_channel().1);

        tokio::spawn(async move {
            while let Some(message) = egress_rx.recv().await {
                match message {
                    Egress::Broadcast { bytes, addrs } => {
                        Self::fan_out(&socket, &bytes, &addrs).await;
                    }
                    Egress::DoubleSend { bytes, addrs } => {
                        Self::fan_out(&socket, &bytes, &addrs).await;
                        tokio::time::sleep(Duration::from_millis(DOUBLE_SEND_GAP_MS)).await;
                        Self::fan_out(&socket, &bytes, &addrs).await;
                    }
                }
            }
        });
    }

    async fn fan_out(socket: &UdpSocket, bytes: &[u8], addrs: &[SocketAddr]) {
        for addr in addrs {
            if let Err(e) = socket.send_to(bytes, addr).await {
                error!("failed to send to {}: {}", addr, e);
            }
        }
    }

    fn next_sequence(&mut self) -> u32 {
        self.sequence = self.sequence.wrapping_add(1);
        self.sequence
    }

    fn queue(&self, message: Egress) {
        if self.egress_tx.send(message).is_err() {
            error!("sender task gone, dropping outgoing message");
        }
    }

    /// Routes one decoded datagram. All failure modes drop the datagram
    /// and keep serving.
    fn handle_datagram(&mut self, dgram: Datagram, addr: SocketAddr) {
        match dgram.payload {
            Payload::Init { player_id } => self.handle_init(player_id, addr),
            Payload::Event(ref event) => self.handle_event(event, dgram.sequence, addr),
            Payload::Snapshot(_) | Payload::GameOver(_) => {
                warn!(
                    "unexpected server-bound message type from {}, ignoring",
                    addr
                );
            }
        }
    }

    fn handle_init(&mut self, player_id: u8, addr: SocketAddr) {
        if player_id == UNCLAIMED {
            warn!("INIT with reserved player id 0 from {}", addr);
            self.telemetry.record(TelemetryEvent::DatagramDropped {
                ts_ms: now_ms(),
                reason: "reserved player id".to_string(),
            });
            return;
        }

        match self.sessions.register(player_id, addr) {
            RegisterOutcome::Registered => {
                self.telemetry.record(TelemetryEvent::SessionOpened {
                    ts_ms: now_ms(),
                    player_id,
                });
            }
            RegisterOutcome::Refreshed => {
                debug!("player {} refreshed from {}", player_id, addr);
            }
            RegisterOutcome::CapacityFull => {
                warn!("roster full, rejecting player {} from {}", player_id, addr);
                self.telemetry.record(TelemetryEvent::DatagramDropped {
                    ts_ms: now_ms(),
                    reason: "session capacity".to_string(),
                });
            }
        }
    }

    fn handle_event(&mut self, event: &CellEvent, sequence: u32, addr: SocketAddr) {
        if event.kind != EventKind::AcquireRequest {
            warn!("unexpected event kind from {}, ignoring", addr);
            return;
        }

        if !self.sessions.is_registered(event.player_id) {
            warn!(
                "claim from unknown player {} at {}, dropping",
                event.player_id, addr
            );
            self.telemetry.record(TelemetryEvent::DatagramDropped {
                ts_ms: now_ms(),
                reason: "unknown sender".to_string(),
            });
            return;
        }
        self.sessions.touch(event.player_id, addr);

        // second copy of a double-send: already decided, nothing to do
        if !self.sessions.accept_event(event.player_id, sequence) {
            debug!(
                "duplicate claim datagram seq {} from player {}",
                sequence, event.player_id
            );
            return;
        }

        let cell = match CellCoord::from_cell_id(event.cell_id) {
            Some(cell) => cell,
            None => {
                warn!(
                    "claim for out-of-range cell {} from player {}, dropping",
                    event.cell_id, event.player_id
                );
                self.telemetry.record(TelemetryEvent::DatagramDropped {
                    ts_ms: now_ms(),
                    reason: "invalid cell coordinate".to_string(),
                });
                return;
            }
        };

        let recv_ms = now_ms();
        let outcome = self.game.claim(event.player_id, cell);
        let accepted = matches!(outcome, ClaimOutcome::Accepted { .. });

        self.telemetry.record(TelemetryEvent::ClaimDecision {
            recv_ms,
            player_id: event.player_id,
            cell_id: event.cell_id,
            event_ts: event.event_ts,
            accepted,
        });
        info!(
            "claim: player {} cell {} accepted={}",
            event.player_id, event.cell_id, accepted
        );

        if let ClaimOutcome::Accepted { finished } = outcome {
            self.broadcast_claim(event.player_id, event.cell_id);
            if finished {
                self.finish_game();
            }
        }
    }

    /// Announces a decided claim to everyone immediately, without waiting
    /// for the next tick.
    fn broadcast_claim(&mut self, player_id: u8, cell_id: u16) {
        let dgram = Datagram {
            snapshot_id: self.last_snapshot_id,
            sequence: self.next_sequence(),
            timestamp_ms: now_ms(),
            payload: Payload::Event(CellEvent {
                player_id,
                kind: EventKind::CellClaimed,
                cell_id,
                event_ts: now_ms(),
            }),
        };

        match encode(&dgram) {
            Ok(bytes) => {
                let addrs = self.sessions.addrs();
                if !addrs.is_empty() {
                    self.queue(Egress::DoubleSend { bytes, addrs });
                }
            }
            Err(e) => error!("failed to encode claim event: {}", e),
        }
    }

    /// One broadcast tick: produce a snapshot, bundle it with the recent
    /// history, and fan it out.
    fn broadcast_tick(&mut self) {
        let chunk = self.game.snapshot();
        self.last_snapshot_id = chunk.id;
        self.history.push(chunk);

        let snapshot_id = self.last_snapshot_id;
        let sequence = self.next_sequence();
        let timestamp_ms = now_ms();
        let dgram = Datagram {
            snapshot_id,
            sequence,
            timestamp_ms,
            payload: Payload::Snapshot(self.history.bundle()),
        };

        match encode(&dgram) {
            Ok(bytes) => {
                let addrs = self.sessions.addrs();
                let clients = addrs.len();
                if !addrs.is_empty() {
                    self.queue(Egress::Broadcast { bytes, addrs });
                }
                self.telemetry.record(TelemetryEvent::SnapshotBroadcast {
                    ts_ms: timestamp_ms,
                    snapshot_id,
                    sequence,
                    clients,
                });
            }
            Err(e) => error!("failed to encode snapshot bundle: {}", e),
        }
    }

    /// Terminal transition: one final snapshot broadcast plus exactly one
    /// GAME_OVER (double-sent), then the tick stops.
    fn finish_game(&mut self) {
        if self.game_over_sent {
            return;
        }
        self.game_over_sent = true;

        // last snapshot carries the terminal flag for clients that miss
        // the GAME_OVER datagrams
        self.broadcast_tick();

        let outcome = match self.game.outcome() {
            Some(outcome) => outcome,
            None => {
                error!("finish requested while game still running");
                return;
            }
        };

        info!(
            "broadcasting GAME_OVER: winner {} with {} cells",
            outcome.winner_id, outcome.winner_cells
        );

        let dgram = Datagram {
            snapshot_id: self.last_snapshot_id,
            sequence: self.next_sequence(),
            timestamp_ms: now_ms(),
            payload: Payload::GameOver(outcome),
        };

        match encode(&dgram) {
            Ok(bytes) => {
                let addrs = self.sessions.addrs();
                if !addrs.is_empty() {
                    self.queue(Egress::DoubleSend { bytes, addrs });
                }
            }
            Err(e) => error!("failed to encode game over: {}", e),
        }
    }

    fn evict_idle(&mut self) {
        for player_id in self.sessions.check_timeouts() {
            self.telemetry.record(TelemetryEvent::SessionEvicted {
                ts_ms: now_ms(),
                player_id,
            });
        }
    }

    /// Main loop: single serialization point for all state mutation and
    /// snapshot production.
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.spawn_receiver();
        self.spawn_sender();

        let mut tick = interval(self.tick_duration);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut cleanup = interval(Duration::from_secs(1));

        info!(
            "broadcast loop running at {:.0} Hz",
            1.0 / self.tick_duration.as_secs_f64()
        );

        loop {
            tokio::select! {
                message = self.ingress_rx.recv() => {
                    match message {
                        Some(Ingress::Datagram { dgram, addr }) => {
                            self.handle_datagram(dgram, addr);
                        }
                        None => {
                            info!("ingress channel closed, shutting down");
                            break;
                        }
                    }
                },

                _ = tick.tick(), if !self.game_over_sent => {
                    self.broadcast_tick();
                    if self.game.is_finished() {
                        self.finish_game();
                    }
                },

                _ = cleanup.tick() => {
                    self.evict_idle();
                },
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{GameOutcome, NullSink, CELL_COUNT};

    fn test_addr() -> SocketAddr {
        "127.0.0.1:9100".parse().unwrap()
    }

    fn test_config() -> ServerConfig {
        ServerConfig {
            bind_addr: "127.0.0.1:0".to_string(),
            rate_hz: 20,
            max_sessions: 8,
            session_timeout: Duration::from_secs(5),
        }
    }

    async fn test_server() -> Server {
        Server::new(test_config(), Arc::new(NullSink))
            .await
            .expect("bind ephemeral port")
    }

    fn claim_datagram(player_id: u8, cell_id: u16, sequence: u32) -> Datagram {
        Datagram {
            snapshot_id: 0,
            sequence,
            timestamp_ms: now_ms(),
            payload: Payload::Event(CellEvent {
                player_id,
                kind: EventKind::AcquireRequest,
                cell_id,
                event_ts: now_ms(),
            }),
        }
    }

    fn init_datagram(player_id: u8) -> Datagram {
        Datagram {
            snapshot_id: 0,
            sequence: 0,
            timestamp_ms: now_ms(),
            payload: Payload::Init { player_id },
        }
    }

    #[test]
    fn test_claims_require_registration() {
        tokio_test::block_on(async {
            let mut server = test_server().await;

            server.handle_datagram(claim_datagram(1, 5, 1), test_addr());
            assert_eq!(server.game.grid().owner(5), Some(0));

            server.handle_datagram(init_datagram(1), test_addr());
            server.handle_datagram(claim_datagram(1, 5, 2), test_addr());
            assert_eq!(server.game.grid().owner(5), Some(1));
        });
    }

    #[test]
    fn test_double_sent_claim_decided_once() {
        tokio_test::block_on(async {
            let mut server = test_server().await;
            server.handle_datagram(init_datagram(1), test_addr());

            // both copies of the same logical claim share a sequence
            server.handle_datagram(claim_datagram(1, 3, 7), test_addr());
            server.handle_datagram(claim_datagram(1, 3, 7), test_addr());

            assert_eq!(server.game.grid().owner(3), Some(1));
            assert_eq!(server.game.grid().claimed_count(), 1);
        });
    }

    #[test]
    fn test_arrival_order_decides_conflicts() {
        tokio_test::block_on(async {
            let mut server = test_server().await;
            server.handle_datagram(init_datagram(1), test_addr());
            server.handle_datagram(init_datagram(2), "127.0.0.1:9101".parse().unwrap());

            server.handle_datagram(claim_datagram(1, 34, 1), test_addr());
            server.handle_datagram(
                claim_datagram(2, 34, 1),
                "127.0.0.1:9101".parse().unwrap(),
            );

            assert_eq!(server.game.grid().owner(34), Some(1));
        });
    }

    #[test]
    fn test_out_of_range_cell_is_dropped() {
        tokio_test::block_on(async {
            let mut server = test_server().await;
            server.handle_datagram(init_datagram(1), test_addr());
            server.handle_datagram(claim_datagram(1, 100, 1), test_addr());
            server.handle_datagram(claim_datagram(1, u16::MAX, 2), test_addr());
            assert_eq!(server.game.grid().claimed_count(), 0);
        });
    }

    #[test]
    fn test_full_board_sends_one_game_over() {
        tokio_test::block_on(async {
            let mut server = test_server().await;
            server.handle_datagram(init_datagram(1), test_addr());

            for cell in 0..CELL_COUNT as u16 {
                server.handle_datagram(claim_datagram(1, cell, cell as u32 + 1), test_addr());
            }

            assert!(server.game.is_finished());
            assert!(server.game_over_sent);
            assert_eq!(
                server.game.outcome(),
                Some(GameOutcome {
                    winner_id: 1,
                    winner_cells: 100,
                })
            );

            // a late claim after the terminal transition changes nothing
            server.handle_datagram(claim_datagram(1, 0, 101), test_addr());
            assert_eq!(server.game.grid().owner(0), Some(1));
        });
    }

    #[test]
    fn test_tick_broadcast_advances_snapshot_and_history() {
        tokio_test::block_on(async {
            let mut server = test_server().await;
            server.broadcast_tick();
            server.broadcast_tick();
            server.broadcast_tick();
            server.broadcast_tick();

            assert_eq!(server.last_snapshot_id, 4);
            // history is bounded at the redundancy factor
            assert_eq!(server.history.len(), REDUNDANCY);
            let ids: Vec<u32> = server.history.bundle().iter().map(|c| c.id).collect();
            assert_eq!(ids, vec![4, 3, 2]);
        });
    }
}
