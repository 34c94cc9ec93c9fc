//! # GSync Authoritative Server
//!
//! The server owns the only canonical copy of the 10x10 ownership grid and
//! keeps every connected client converging on it over lossy UDP.
//!
//! ## Architecture
//!
//! All state mutation funnels through a single event loop that owns the
//! [`game::GridGame`] and the [`session::SessionManager`]: claim resolution
//! and snapshot production can never interleave, so no snapshot ever
//! observes a half-applied claim. Network receive and send run as separate
//! tokio tasks connected to the loop by channels.
//!
//! ## Loss tolerance
//!
//! There are no acknowledgments and no retransmissions. Each broadcast
//! bundles the current snapshot with the previous two, so a client that
//! missed two consecutive broadcasts still recovers full state from the
//! next datagram it receives. Claim outcomes and the terminal game-over
//! notice are sent twice; receivers deduplicate by sequence number.
//!
//! ## Conflict resolution
//!
//! Claims are decided strictly in network arrival order. The first request
//! for an unclaimed cell wins permanently; every later request for that
//! cell loses silently. The claim that fills the last cell flips the game
//! to its terminal phase exactly once.

pub mod game;
pub mod network;
pub mod session;
