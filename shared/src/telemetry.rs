//! Structured telemetry events for the persistence collaborator.
//!
//! The engine never writes files. Every applied snapshot, claim decision,
//! session lifecycle change, and dropped datagram is handed to a
//! [`TelemetrySink`] as a row-shaped event; what the sink does with it
//! (CSV, JSON logs, nothing) is its own business.

use serde::Serialize;

/// One row of telemetry, emitted at the point the event is decided.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TelemetryEvent {
    /// Server broadcast a snapshot bundle to all live sessions.
    SnapshotBroadcast {
        ts_ms: u64,
        snapshot_id: u32,
        sequence: u32,
        clients: usize,
    },
    /// Server decided a claim request, accepted or not.
    ClaimDecision {
        recv_ms: u64,
        player_id: u8,
        cell_id: u16,
        event_ts: u64,
        accepted: bool,
    },
    /// Client applied a snapshot it had not seen before.
    SnapshotApplied {
        recv_ms: u64,
        snapshot_id: u32,
        latency_ms: f64,
        jitter_ms: f64,
    },
    SessionOpened {
        ts_ms: u64,
        player_id: u8,
    },
    SessionEvicted {
        ts_ms: u64,
        player_id: u8,
    },
    /// A datagram was rejected at ingestion and dropped.
    DatagramDropped {
        ts_ms: u64,
        reason: String,
    },
}

/// Receives telemetry rows from the engine.
pub trait TelemetrySink: Send + Sync {
    fn record(&self, event: TelemetryEvent);
}

/// Discards everything. Useful in tests.
#[derive(Debug, Default)]
pub struct NullSink;

impl TelemetrySink for NullSink {
    fn record(&self, _event: TelemetryEvent) {}
}

/// Emits each row as a JSON line on the `telemetry` log target.
///
/// Downstream tooling can scrape these lines into CSV without the engine
/// ever touching the filesystem.
#[derive(Debug, Default)]
pub struct LogSink;

impl TelemetrySink for LogSink {
    fn record(&self, event: TelemetryEvent) {
        match serde_json::to_string(&event) {
            Ok(row) => log::info!(target: "telemetry", "{}", row),
            Err(e) => log::warn!(target: "telemetry", "unserializable event: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_serialize_as_tagged_rows() {
        let event = TelemetryEvent::ClaimDecision {
            recv_ms: 1000,
            player_id: 2,
            cell_id: 34,
            event_ts: 990,
            accepted: true,
        };

        let row = serde_json::to_string(&event).unwrap();
        assert!(row.contains("\"event\":\"claim_decision\""));
        assert!(row.contains("\"cell_id\":34"));
        assert!(row.contains("\"accepted\":true"));
    }

    #[test]
    fn test_null_sink_accepts_everything() {
        let sink = NullSink;
        sink.record(TelemetryEvent::DatagramDropped {
            ts_ms: 0,
            reason: "checksum mismatch".to_string(),
        });
    }
}
