//! Client network loop: INIT registration, claim double-send, and the
//! receive path feeding reconciliation.
//!
//! Reconciliation state is owned by this loop; the presentation side only
//! ever reads it. Decode failures and stale data are dropped and the loop
//! keeps going: the visible effect of loss is a briefly stale grid, never
//! a crash and never a retracted claim.

use crate::reconcile::{ClientView, LatencyTracker};
use crate::scenario::{Scenario, ScenarioDriver};
use log::{debug, error, info, warn};
use shared::{
    decode, encode, now_ms, CellEvent, Datagram, EventKind, Payload, SequenceGate,
    TelemetryEvent, TelemetrySink, DOUBLE_SEND_GAP_MS, GRID_N, UNCLAIMED,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::{interval, sleep};

/// How often a passive client re-announces itself so the server's
/// liveness eviction leaves it alone.
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(2);
/// How often the scenario driver gets a chance to claim.
const CLAIM_INTERVAL: Duration = Duration::from_millis(250);

pub struct Client {
    socket: UdpSocket,
    server_addr: SocketAddr,
    player_id: u8,
    sequence: u32,

    view: ClientView,
    latency: LatencyTracker,
    driver: ScenarioDriver,
    /// Deduplicates double-sent server events.
    event_gate: SequenceGate,
    telemetry: Arc<dyn TelemetrySink>,

    last_logged_claims: usize,
}

impl Client {
    pub async fn new(
        server_addr: &str,
        player_id: u8,
        scenario: Scenario,
        smoothing: f64,
        telemetry: Arc<dyn TelemetrySink>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        let server_addr = server_addr.parse()?;

        Ok(Client {
            socket,
            server_addr,
            player_id,
            sequence: 0,
            view: ClientView::new(),
            latency: LatencyTracker::new(smoothing),
            driver: ScenarioDriver::new(scenario),
            event_gate: SequenceGate::new(),
            telemetry,
            last_logged_claims: 0,
        })
    }

    /// Read-only handle for the render/presentation path.
    pub fn view(&self) -> &ClientView {
        &self.view
    }

    fn next_sequence(&mut self) -> u32 {
        self.sequence = self.sequence.wrapping_add(1);
        self.sequence
    }

    async fn send_init(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        let dgram = Datagram {
            snapshot_id: 0,
            sequence: self.next_sequence(),
            timestamp_ms: now_ms(),
            payload: Payload::Init {
                player_id: self.player_id,
            },
        };
        let bytes = encode(&dgram)?;
        self.socket.send_to(&bytes, self.server_addr).await?;
        Ok(())
    }

    /// Sends one logical claim as two identical datagrams a short gap
    /// apart. The server treats the copies as one request.
    async fn send_claim(&mut self, cell_id: u16) -> Result<(), Box<dyn std::error::Error>> {
        let dgram = Datagram {
            snapshot_id: 0,
            sequence: self.next_sequence(),
            timestamp_ms: now_ms(),
            payload: Payload::Event(CellEvent {
                player_id: self.player_id,
                kind: EventKind::AcquireRequest,
                cell_id,
                event_ts: now_ms(),
            }),
        };
        let bytes = encode(&dgram)?;

        self.socket.send_to(&bytes, self.server_addr).await?;
        sleep(Duration::from_millis(DOUBLE_SEND_GAP_MS)).await;
        self.socket.send_to(&bytes, self.server_addr).await?;

        info!("claim requested: cell {}", cell_id);
        Ok(())
    }

    fn handle_datagram(&mut self, dgram: Datagram) {
        match dgram.payload {
            Payload::Snapshot(ref chunks) => {
                let recv_ms = now_ms();
                let applied = self.view.apply_bundle(chunks);
                if applied.is_empty() {
                    debug!("bundle with no fresh snapshots (last applied {})", self.view.last_applied());
                    return;
                }

                let raw_latency = recv_ms.saturating_sub(dgram.timestamp_ms) as f64;
                let (latency_ms, jitter_ms) = self.latency.observe(raw_latency);
                for snapshot_id in applied {
                    self.telemetry.record(TelemetryEvent::SnapshotApplied {
                        recv_ms,
                        snapshot_id,
                        latency_ms,
                        jitter_ms,
                    });
                }
                self.log_view_if_changed();
            }

            Payload::Event(ref event) => {
                if !self.event_gate.accept(dgram.sequence) {
                    debug!("duplicate event datagram seq {}", dgram.sequence);
                    return;
                }
                if self.view.apply_event(event) {
                    info!(
                        "cell {} claimed by player {}",
                        event.cell_id, event.player_id
                    );
                    self.log_view_if_changed();
                }
            }

            Payload::GameOver(ref outcome) => {
                self.view.apply_game_over(outcome);
                info!(
                    "game over: winner player {} with {} cells",
                    outcome.winner_id, outcome.winner_cells
                );
            }

            Payload::Init { .. } => {
                warn!("unexpected INIT from server, ignoring");
            }
        }
    }

    fn log_view_if_changed(&mut self) {
        let claimed = self.view.grid().claimed_count();
        if claimed != self.last_logged_claims {
            self.last_logged_claims = claimed;
            info!(
                "grid: {} claimed, snapshot {}, latency {:.1}ms\n{}",
                claimed,
                self.view.last_applied(),
                self.latency.latency_ms().unwrap_or(0.0),
                render_grid(&self.view)
            );
        }
    }

    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        info!(
            "player {} -> {} ({:?} scenario)",
            self.player_id,
            self.server_addr,
            self.driver.scenario()
        );
        self.send_init().await?;

        let mut keepalive = interval(KEEPALIVE_INTERVAL);
        let mut claim_tick = interval(CLAIM_INTERVAL);
        let mut buffer = [0u8; 2048];

        while !self.view.is_finished() {
            tokio::select! {
                result = self.socket.recv_from(&mut buffer) => {
                    match result {
                        Ok((len, _)) => match decode(&buffer[..len]) {
                            Ok(dgram) => self.handle_datagram(dgram),
                            Err(e) => {
                                warn!("dropping datagram: {}", e);
                                self.telemetry.record(TelemetryEvent::DatagramDropped {
                                    ts_ms: now_ms(),
                                    reason: e.to_string(),
                                });
                            }
                        },
                        Err(e) => error!("error receiving datagram: {}", e),
                    }
                },

                _ = keepalive.tick() => {
                    if let Err(e) = self.send_init().await {
                        error!("keepalive failed: {}", e);
                    }
                },

                _ = claim_tick.tick() => {
                    if let Some(cell) = self.driver.next_claim(&self.view) {
                        if let Err(e) = self.send_claim(cell).await {
                            error!("claim send failed: {}", e);
                        }
                    }
                },
            }
        }

        match self.view.winner() {
            Some(winner) if winner == self.player_id => info!("you won"),
            Some(winner) => info!("player {} won", winner),
            None => info!("game ended without a recorded winner"),
        }

        Ok(())
    }
}

/// Compact textual grid for the log: one digit-or-dot per cell.
fn render_grid(view: &ClientView) -> String {
    let owners = view.grid().owners();
    let mut out = String::with_capacity(owners.len() + GRID_N);
    for row in 0..GRID_N {
        for col in 0..GRID_N {
            let owner = owners[row * GRID_N + col];
            if owner == UNCLAIMED {
                out.push('.');
            } else {
                out.push(char::from_digit((owner % 10) as u32, 10).unwrap_or('#'));
            }
        }
        if row + 1 < GRID_N {
            out.push('\n');
        }
    }
    out
}
