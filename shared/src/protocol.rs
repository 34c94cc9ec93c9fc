//! Binary wire protocol: fixed 28-byte header plus hand-packed payloads.
//!
//! All multi-byte fields are big-endian. The checksum is a CRC-32 computed
//! over the first 24 header bytes (everything before the checksum field)
//! followed by the payload. A datagram that fails any header, checksum, or
//! payload check is rejected with a [`DecodeError`] and must be dropped by
//! the caller; none of these errors is fatal.

use crate::grid::{Grid, CELL_COUNT, GRID_N};
use thiserror::Error;

/// ASCII protocol tag carried by every datagram.
pub const PROTOCOL_TAG: [u8; 4] = *b"GSYN";
/// Current protocol version.
pub const PROTOCOL_VERSION: u8 = 2;
/// Fixed header size in bytes.
pub const HEADER_LEN: usize = 28;
/// Maximum payload size in bytes.
pub const MAX_PAYLOAD: usize = 1200;

/// Wire discriminator for the four message kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MsgType {
    Init = 0,
    Snapshot = 1,
    Event = 2,
    GameOver = 3,
}

impl MsgType {
    fn from_wire(value: u8) -> Option<Self> {
        match value {
            0 => Some(MsgType::Init),
            1 => Some(MsgType::Snapshot),
            2 => Some(MsgType::Event),
            3 => Some(MsgType::GameOver),
            _ => None,
        }
    }
}

/// Event discriminator inside an EVENT payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EventKind {
    /// Client asks the server for ownership of a cell.
    AcquireRequest = 0,
    /// Server announces a decided claim to all clients.
    CellClaimed = 1,
}

impl EventKind {
    fn from_wire(value: u8) -> Option<Self> {
        match value {
            0 => Some(EventKind::AcquireRequest),
            1 => Some(EventKind::CellClaimed),
            _ => None,
        }
    }
}

/// One full grid state at a single server tick, tagged with its id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotChunk {
    pub id: u32,
    pub finished: bool,
    pub grid: Grid,
}

/// A cell ownership event, either a request or an authoritative decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellEvent {
    pub player_id: u8,
    pub kind: EventKind,
    pub cell_id: u16,
    pub event_ts: u64,
}

/// Terminal game outcome broadcast once all cells are claimed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameOutcome {
    pub winner_id: u8,
    pub winner_cells: u8,
}

/// Decoded payload of a datagram, one variant per message type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Init { player_id: u8 },
    /// Redundancy bundle: newest snapshot first, up to K in total.
    Snapshot(Vec<SnapshotChunk>),
    Event(CellEvent),
    GameOver(GameOutcome),
}

impl Payload {
    pub fn msg_type(&self) -> MsgType {
        match self {
            Payload::Init { .. } => MsgType::Init,
            Payload::Snapshot(_) => MsgType::Snapshot,
            Payload::Event(_) => MsgType::Event,
            Payload::GameOver(_) => MsgType::GameOver,
        }
    }
}

/// A complete logical datagram: header fields plus payload.
///
/// The payload length and checksum are derived during encoding and are not
/// stored here. Sequence numbers wrap; wraparound is accepted on receipt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datagram {
    pub snapshot_id: u32,
    pub sequence: u32,
    pub timestamp_ms: u64,
    pub payload: Payload,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EncodeError {
    #[error("payload of {0} bytes exceeds the {MAX_PAYLOAD} byte limit")]
    PayloadTooLarge(usize),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("buffer too short or protocol tag mismatch")]
    MalformedHeader,
    #[error("unsupported protocol version {0}")]
    UnsupportedVersion(u8),
    #[error("unknown message type {0}")]
    UnknownMessageType(u8),
    #[error("declared payload length {declared} invalid for {actual} remaining bytes")]
    PayloadTooLarge { declared: usize, actual: usize },
    #[error("checksum mismatch: computed {computed:#010x}, received {received:#010x}")]
    ChecksumMismatch { computed: u32, received: u32 },
    #[error("payload does not match its message type")]
    MalformedPayload,
}

/// Serializes a datagram into header + payload bytes.
pub fn encode(dgram: &Datagram) -> Result<Vec<u8>, EncodeError> {
    let payload = encode_payload(&dgram.payload);
    if payload.len() > MAX_PAYLOAD {
        return Err(EncodeError::PayloadTooLarge(payload.len()));
    }

    let mut buf = Vec::with_capacity(HEADER_LEN + payload.len());
    buf.extend_from_slice(&PROTOCOL_TAG);
    buf.push(PROTOCOL_VERSION);
    buf.push(dgram.payload.msg_type() as u8);
    buf.extend_from_slice(&dgram.snapshot_id.to_be_bytes());
    buf.extend_from_slice(&dgram.sequence.to_be_bytes());
    buf.extend_from_slice(&dgram.timestamp_ms.to_be_bytes());
    buf.extend_from_slice(&(payload.len() as u16).to_be_bytes());

    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&buf);
    hasher.update(&payload);
    buf.extend_from_slice(&hasher.finalize().to_be_bytes());
    buf.extend_from_slice(&payload);

    Ok(buf)
}

/// Parses and validates a received datagram.
pub fn decode(data: &[u8]) -> Result<Datagram, DecodeError> {
    if data.len() < HEADER_LEN || data[0..4] != PROTOCOL_TAG {
        return Err(DecodeError::MalformedHeader);
    }

    let version = data[4];
    if version != PROTOCOL_VERSION {
        return Err(DecodeError::UnsupportedVersion(version));
    }

    let snapshot_id = u32::from_be_bytes([data[6], data[7], data[8], data[9]]);
    let sequence = u32::from_be_bytes([data[10], data[11], data[12], data[13]]);
    let timestamp_ms = u64::from_be_bytes([
        data[14], data[15], data[16], data[17], data[18], data[19], data[20], data[21],
    ]);

    let declared = u16::from_be_bytes([data[22], data[23]]) as usize;
    let actual = data.len() - HEADER_LEN;
    if declared > MAX_PAYLOAD || declared != actual {
        return Err(DecodeError::PayloadTooLarge { declared, actual });
    }

    let received = u32::from_be_bytes([data[24], data[25], data[26], data[27]]);
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&data[..24]);
    hasher.update(&data[HEADER_LEN..]);
    let computed = hasher.finalize();
    if computed != received {
        return Err(DecodeError::ChecksumMismatch { computed, received });
    }

    // only checksum-verified bytes are dispatched on
    let msg_type =
        MsgType::from_wire(data[5]).ok_or(DecodeError::UnknownMessageType(data[5]))?;

    let payload = decode_payload(msg_type, &data[HEADER_LEN..])?;

    Ok(Datagram {
        snapshot_id,
        sequence,
        timestamp_ms,
        payload,
    })
}

fn encode_payload(payload: &Payload) -> Vec<u8> {
    match payload {
        Payload::Init { player_id } => vec![*player_id],
        Payload::Snapshot(chunks) => {
            let mut buf = Vec::with_capacity(1 + chunks.len() * (6 + CELL_COUNT));
            buf.push(chunks.len() as u8);
            for chunk in chunks {
                buf.extend_from_slice(&chunk.id.to_be_bytes());
                buf.push(chunk.finished as u8);
                buf.push(GRID_N as u8);
                buf.extend_from_slice(chunk.grid.owners());
            }
            buf
        }
        Payload::Event(event) => {
            let mut buf = Vec::with_capacity(12);
            buf.push(event.player_id);
            buf.push(event.kind as u8);
            buf.extend_from_slice(&event.cell_id.to_be_bytes());
            buf.extend_from_slice(&event.event_ts.to_be_bytes());
            buf
        }
        Payload::GameOver(outcome) => vec![outcome.winner_id, outcome.winner_cells],
    }
}

fn decode_payload(msg_type: MsgType, data: &[u8]) -> Result<Payload, DecodeError> {
    match msg_type {
        MsgType::Init => {
            if data.len() != 1 {
                return Err(DecodeError::MalformedPayload);
            }
            Ok(Payload::Init { player_id: data[0] })
        }
        MsgType::Snapshot => {
            if data.is_empty() {
                return Err(DecodeError::MalformedPayload);
            }
            let count = data[0] as usize;
            let chunk_len = 6 + CELL_COUNT;
            if data.len() != 1 + count * chunk_len {
                return Err(DecodeError::MalformedPayload);
            }

            let mut chunks = Vec::with_capacity(count);
            for i in 0..count {
                let at = 1 + i * chunk_len;
                let id = u32::from_be_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]]);
                let finished = match data[at + 4] {
                    0 => false,
                    1 => true,
                    _ => return Err(DecodeError::MalformedPayload),
                };
                if data[at + 5] as usize != GRID_N {
                    return Err(DecodeError::MalformedPayload);
                }
                let mut owners = [0u8; CELL_COUNT];
                owners.copy_from_slice(&data[at + 6..at + 6 + CELL_COUNT]);
                chunks.push(SnapshotChunk {
                    id,
                    finished,
                    grid: Grid::from_owners(owners),
                });
            }
            Ok(Payload::Snapshot(chunks))
        }
        MsgType::Event => {
            if data.len() != 12 {
                return Err(DecodeError::MalformedPayload);
            }
            let kind = EventKind::from_wire(data[1]).ok_or(DecodeError::MalformedPayload)?;
            let cell_id = u16::from_be_bytes([data[2], data[3]]);
            let event_ts = u64::from_be_bytes([
                data[4], data[5], data[6], data[7], data[8], data[9], data[10], data[11],
            ]);
            Ok(Payload::Event(CellEvent {
                player_id: data[0],
                kind,
                cell_id,
                event_ts,
            }))
        }
        MsgType::GameOver => {
            if data.len() != 2 {
                return Err(DecodeError::MalformedPayload);
            }
            Ok(Payload::GameOver(GameOutcome {
                winner_id: data[0],
                winner_cells: data[1],
            }))
        }
    }
}
