//! # coedit-collab: real-time room synchronization for coedit
//!
//! A WebSocket server that keeps, per room, a shared file tree and the set of
//! connected participants, and fans every change out to the room.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐    WebSocket     ┌──────────────┐
//! │ CollabClient │ ◄──────────────► │  SyncServer  │
//! │  (per user)  │   JSON events    │   (central)  │
//! └──────────────┘                  └──────┬───────┘
//!                                          │ one Session per connection
//!                                          ▼
//!                                   ┌──────────────┐
//!                                   │  SyncEngine  │
//!                                   └──┬────────┬──┘
//!                                      │        │
//!                            ┌─────────┴──┐  ┌──┴──────────┐
//!                            │ RoomStore  │  │ Dispatcher  │
//!                            │ FileTree + │  │ room → subs │
//!                            │ Presence   │  │ (fan-out)   │
//!                            └────────────┘  └─────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`protocol`]: JSON wire protocol (`{"event", "data"}` envelopes)
//! - [`store`]: room registry with per-room exclusive sections
//! - [`presence`]: participant set and join/leave event sequences
//! - [`broadcast`]: per-room fan-out to session outboxes
//! - [`engine`]: store + dispatcher, one handle per server
//! - [`session`]: per-connection state and event dispatch
//! - [`server`]: WebSocket server
//! - [`client`]: WebSocket client with offline queue
//! - [`config`]: server and client configuration

pub mod broadcast;
pub mod client;
pub mod config;
pub mod engine;
pub mod presence;
pub mod protocol;
pub mod server;
pub mod session;
pub mod store;

// Re-exports for convenience
pub use broadcast::{Audience, BroadcastGroup, BroadcastStats, Dispatcher, Outbox};
pub use client::{ClientEvent, CollabClient, ConnectionState, OfflineQueue};
pub use config::{ClientConfig, ConfigError, ServerConfig};
pub use engine::SyncEngine;
pub use presence::{ParticipantSet, Upsert};
pub use protocol::{ClientMessage, ConnectionId, Participant, ProtocolError, ServerMessage};
pub use server::{ServerError, ServerStats, SyncServer};
pub use session::Session;
pub use store::{LeaveKey, LeaveOutcome, Room, RoomSnapshot, RoomStore};
