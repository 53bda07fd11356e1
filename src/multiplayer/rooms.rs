//! Room creation and membership
//!
//! Rooms live at `rooms/{code}`. The host creates the room and takes slot
//! 0; joiners are admitted by a transaction that checks the password and
//! capacity atomically.

use std::collections::BTreeMap;
use std::rc::Rc;

use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::transport::{Transport, server_timestamp};
use crate::consts::ROOM_CAPACITY;
use crate::error::{RoomError, TransportError};

/// Unambiguous characters (no 0/O, 1/I)
const ROOM_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
pub const ROOM_CODE_LEN: usize = 6;
/// Attempts at finding an unused code before giving up
const MAX_CODE_ATTEMPTS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoomStatus {
    Lobby,
    Countdown,
    Racing,
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    Online,
    Offline,
}

/// Membership entry at `rooms/{code}/players/{uid}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomMember {
    pub name: String,
    pub slot: usize,
    pub status: PresenceStatus,
    #[serde(default)]
    pub ready: bool,
    /// Physics record owned by the sync layer; carried through untouched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomData {
    pub host_id: String,
    pub password: String,
    pub status: RoomStatus,
    /// Server timestamp placeholder until written
    #[serde(default)]
    pub created_at: Value,
    #[serde(default)]
    pub players: BTreeMap<String, RoomMember>,
}

impl RoomData {
    /// Lowest slot not held by any member
    fn free_slot(&self) -> Option<usize> {
        (0..ROOM_CAPACITY).find(|slot| !self.players.values().any(|m| m.slot == *slot))
    }
}

fn room_path(room_id: &str) -> String {
    format!("rooms/{room_id}")
}

pub struct RoomManager {
    transport: Rc<dyn Transport>,
    rng: Pcg32,
}

impl RoomManager {
    pub fn new(transport: Rc<dyn Transport>, seed: u64) -> Self {
        Self {
            transport,
            rng: Pcg32::seed_from_u64(seed),
        }
    }

    /// Random 6-character room code
    pub fn generate_code(&mut self) -> String {
        (0..ROOM_CODE_LEN)
            .map(|_| {
                let i = self.rng.random_range(0..ROOM_CODE_ALPHABET.len());
                ROOM_CODE_ALPHABET[i] as char
            })
            .collect()
    }

    /// Create a room with `host_uid` in slot 0; returns the room code
    pub fn create_room(&mut self, host_uid: &str, password: &str) -> Result<String, RoomError> {
        let mut room_id = self.generate_code();
        let mut attempts = 1;
        while self.transport.get(&room_path(&room_id))?.is_some() {
            if attempts >= MAX_CODE_ATTEMPTS {
                return Err(TransportError::Rejected {
                    path: room_path(&room_id),
                    reason: "no free room code".to_string(),
                }
                .into());
            }
            room_id = self.generate_code();
            attempts += 1;
        }

        let mut players = BTreeMap::new();
        players.insert(
            host_uid.to_string(),
            RoomMember {
                name: "Host".to_string(),
                slot: 0,
                status: PresenceStatus::Online,
                ready: true,
                state: None,
            },
        );
        let room = RoomData {
            host_id: host_uid.to_string(),
            password: password.to_string(),
            status: RoomStatus::Lobby,
            created_at: server_timestamp(),
            players,
        };

        self.transport
            .set(&room_path(&room_id), serde_json::to_value(&room).map_err(TransportError::from)?)?;
        log::info!("Room {} created by {}", room_id, host_uid);
        Ok(room_id)
    }

    /// Admit `uid` to a room; returns the member entry it holds
    ///
    /// A uid already in the room is marked online again and keeps its slot.
    pub fn join_room(&self, uid: &str, room_id: &str, password: &str) -> Result<RoomMember, RoomError> {
        let mut outcome: Result<RoomMember, RoomError> = Err(RoomError::NotFound(room_id.to_string()));

        self.transport.transaction(&room_path(room_id), &mut |current: Option<&Value>| {
            let Some(current) = current else {
                outcome = Err(RoomError::NotFound(room_id.to_string()));
                return None;
            };
            let mut room: RoomData = match serde_json::from_value(current.clone()) {
                Ok(room) => room,
                Err(e) => {
                    outcome = Err(TransportError::from(e).into());
                    return None;
                }
            };
            if room.password != password {
                outcome = Err(RoomError::InvalidCredentials);
                return None;
            }

            let member = match room.players.get_mut(uid) {
                Some(existing) => {
                    existing.status = PresenceStatus::Online;
                    existing.clone()
                }
                None => {
                    let Some(slot) = room.free_slot() else {
                        outcome = Err(RoomError::RoomFull);
                        return None;
                    };
                    let member = RoomMember {
                        name: format!("Player {}", slot + 1),
                        slot,
                        status: PresenceStatus::Online,
                        ready: false,
                        state: None,
                    };
                    room.players.insert(uid.to_string(), member.clone());
                    member
                }
            };

            match serde_json::to_value(&room) {
                Ok(next) => {
                    outcome = Ok(member);
                    Some(next)
                }
                Err(e) => {
                    outcome = Err(TransportError::from(e).into());
                    None
                }
            }
        })?;

        if let Ok(member) = &outcome {
            log::info!("{} joined room {} in slot {}", uid, room_id, member.slot);
        }
        outcome
    }

    pub fn get_room(&self, room_id: &str) -> Result<RoomData, RoomError> {
        let value = self
            .transport
            .get(&room_path(room_id))?
            .ok_or_else(|| RoomError::NotFound(room_id.to_string()))?;
        serde_json::from_value(value).map_err(|e| TransportError::from(e).into())
    }

    pub fn set_status(&self, room_id: &str, status: RoomStatus) -> Result<(), RoomError> {
        self.get_room(room_id)?;
        let value = serde_json::to_value(status).map_err(TransportError::from)?;
        self.transport
            .set(&format!("{}/status", room_path(room_id)), value)?;
        log::info!("Room {} is now {:?}", room_id, status);
        Ok(())
    }

    pub fn set_ready(&self, room_id: &str, uid: &str, ready: bool) -> Result<(), RoomError> {
        let room = self.get_room(room_id)?;
        if !room.players.contains_key(uid) {
            return Err(RoomError::NotFound(format!("{room_id}/{uid}")));
        }
        self.transport.set(
            &format!("{}/players/{uid}/ready", room_path(room_id)),
            Value::Bool(ready),
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::multiplayer::transport::MemoryTransport;
    use crate::platform::ManualClock;
    use serde_json::json;

    fn setup() -> (RoomManager, MemoryTransport) {
        let clock = ManualClock::new(5_000.0);
        let transport = MemoryTransport::new(Rc::new(clock));
        (RoomManager::new(Rc::new(transport.clone()), 7), transport)
    }

    #[test]
    fn test_room_code_alphabet() {
        let (mut rooms, _) = setup();
        for _ in 0..50 {
            let code = rooms.generate_code();
            assert_eq!(code.len(), ROOM_CODE_LEN);
            assert!(code.bytes().all(|c| ROOM_CODE_ALPHABET.contains(&c)));
        }
    }

    #[test]
    fn test_create_room_host_in_slot_zero() {
        let (mut rooms, transport) = setup();
        let code = rooms.create_room("host", "pw").unwrap();

        let room = rooms.get_room(&code).unwrap();
        assert_eq!(room.host_id, "host");
        assert_eq!(room.status, RoomStatus::Lobby);
        assert_eq!(room.created_at, json!(5_000.0));
        assert_eq!(room.players["host"].slot, 0);
        assert!(room.players["host"].ready);
        assert_eq!(
            transport.get(&format!("rooms/{code}/status")).unwrap(),
            Some(json!("LOBBY"))
        );
    }

    #[test]
    fn test_join_assigns_next_slot() {
        let (mut rooms, _) = setup();
        let code = rooms.create_room("host", "pw").unwrap();
        let a = rooms.join_room("a", &code, "pw").unwrap();
        let b = rooms.join_room("b", &code, "pw").unwrap();
        assert_eq!((a.slot, b.slot), (1, 2));
        assert_eq!(a.status, PresenceStatus::Online);
        assert!(!a.ready);
    }

    #[test]
    fn test_join_errors() {
        let (mut rooms, _) = setup();
        assert!(matches!(
            rooms.join_room("a", "NOPE00", "pw"),
            Err(RoomError::NotFound(_))
        ));

        let code = rooms.create_room("host", "pw").unwrap();
        assert!(matches!(
            rooms.join_room("a", &code, "wrong"),
            Err(RoomError::InvalidCredentials)
        ));

        for uid in ["a", "b", "c"] {
            rooms.join_room(uid, &code, "pw").unwrap();
        }
        assert!(matches!(
            rooms.join_room("d", &code, "pw"),
            Err(RoomError::RoomFull)
        ));
        assert_eq!(rooms.get_room(&code).unwrap().players.len(), ROOM_CAPACITY);
    }

    #[test]
    fn test_rejoin_keeps_slot() {
        let (mut rooms, transport) = setup();
        let code = rooms.create_room("host", "pw").unwrap();
        rooms.join_room("a", &code, "pw").unwrap();
        transport
            .set(&format!("rooms/{code}/players/a/status"), json!("offline"))
            .unwrap();

        let again = rooms.join_room("a", &code, "pw").unwrap();
        assert_eq!(again.slot, 1);
        assert_eq!(again.status, PresenceStatus::Online);
        assert_eq!(rooms.get_room(&code).unwrap().players.len(), 2);
    }

    #[test]
    fn test_join_preserves_synced_state() {
        let (mut rooms, transport) = setup();
        let code = rooms.create_room("host", "pw").unwrap();
        transport
            .set(&format!("rooms/{code}/players/host/state"), json!({"pos": 12.5}))
            .unwrap();
        rooms.join_room("a", &code, "pw").unwrap();
        assert_eq!(
            transport.get(&format!("rooms/{code}/players/host/state/pos")).unwrap(),
            Some(json!(12.5))
        );
    }

    #[test]
    fn test_status_and_ready() {
        let (mut rooms, _) = setup();
        let code = rooms.create_room("host", "pw").unwrap();
        rooms.join_room("a", &code, "pw").unwrap();
        rooms.set_ready(&code, "a", true).unwrap();
        rooms.set_status(&code, RoomStatus::Racing).unwrap();

        let room = rooms.get_room(&code).unwrap();
        assert!(room.players["a"].ready);
        assert_eq!(room.status, RoomStatus::Racing);
        assert!(rooms.set_ready(&code, "zz", true).is_err());
    }

    #[test]
    fn test_transport_failure_surfaces() {
        let (mut rooms, transport) = setup();
        transport.set_fail_writes(true);
        assert!(matches!(
            rooms.create_room("host", "pw"),
            Err(RoomError::Transport(_))
        ));
    }
}
