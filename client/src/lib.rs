//! # GSync Client
//!
//! Consumes the server's best-effort snapshot stream and converges a local
//! grid view on the authoritative state, no matter how datagrams are lost,
//! duplicated, or reordered in transit.
//!
//! ## Design
//!
//! - **No prediction.** A claim is reflected locally only once the server
//!   confirms it via an EVENT or SNAPSHOT. Input latency is the price; a
//!   claim that appears and is later retracted can never happen.
//! - **Apply-if-newer.** Snapshots apply only when their id exceeds the
//!   highest already applied, which makes redundancy bundles and duplicate
//!   datagrams harmless by construction.
//! - **Single writer.** The network loop in [`network`] owns all
//!   reconciliation state; presentation reads it, never writes.
//!
//! Scenarios in [`scenario`] stand in for a UI: they decide which cell to
//! claim next so the whole pipeline can run headless.

pub mod network;
pub mod reconcile;
pub mod scenario;
