//! Protocol and state types shared by the GSync server and client.
//!
//! The synchronization engine is split across four concerns: the binary
//! wire codec ([`protocol`]), the fixed ownership grid ([`grid`]), the
//! redundant-transport helpers that survive datagram loss without
//! retransmission ([`redundancy`]), and the structured telemetry surface
//! ([`telemetry`]). Everything here is transport-agnostic; the actual UDP
//! plumbing lives in the server and client crates.

pub mod grid;
pub mod protocol;
pub mod redundancy;
pub mod telemetry;

pub use grid::{CellCoord, Grid, CELL_COUNT, GRID_N, UNCLAIMED};
pub use protocol::{
    decode, encode, CellEvent, Datagram, DecodeError, EncodeError, EventKind, GameOutcome,
    MsgType, Payload, SnapshotChunk, HEADER_LEN, MAX_PAYLOAD, PROTOCOL_TAG, PROTOCOL_VERSION,
};
pub use redundancy::{SequenceGate, SnapshotHistory, DOUBLE_SEND_GAP_MS, REDUNDANCY};
pub use telemetry::{LogSink, NullSink, TelemetryEvent, TelemetrySink};

/// Default server UDP port.
pub const DEFAULT_PORT: u16 = 10000;
/// Default bind/connect host.
pub const DEFAULT_HOST: &str = "127.0.0.1";
/// Default broadcast tick rate in Hz.
pub const DEFAULT_RATE_HZ: u32 = 20;
/// Seconds of silence before a session is evicted.
pub const DEFAULT_SESSION_TIMEOUT_SECS: u64 = 10;
/// Default cap on concurrent sessions.
pub const DEFAULT_MAX_SESSIONS: usize = 16;

/// Milliseconds since the Unix epoch, saturating instead of panicking on
/// a clock set before 1970.
pub fn now_ms() -> u64 {
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    let since_epoch = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis();
    since_epoch.min(u64::MAX as u128) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_ms_advances() {
        let a = now_ms();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = now_ms();
        assert!(b > a);
    }

    #[test]
    fn test_defaults_are_sane() {
        assert!(DEFAULT_RATE_HZ > 0);
        assert!(DEFAULT_MAX_SESSIONS > 0);
        assert_eq!(HEADER_LEN, 28);
    }
}
