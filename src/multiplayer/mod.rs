//! Multiplayer over a realtime JSON database
//!
//! - `transport`: the database seam and an in-memory implementation
//! - `rooms`: room codes, passwords and player slots
//! - `sync`: throttled state publishing and peer interpolation

pub mod rooms;
pub mod sync;
pub mod transport;

pub use rooms::{PresenceStatus, RoomData, RoomManager, RoomMember, RoomStatus};
pub use sync::{RemotePlayer, RemoteSnapshot, SyncManager};
pub use transport::{CONNECTED_PATH, ListenerId, MemoryTransport, Transport, server_timestamp};
