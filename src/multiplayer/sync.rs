//! Peer state synchronization
//!
//! Publishes the local racer's physics at a throttled rate and keeps the
//! last two snapshots of every peer so the renderer can interpolate
//! position between network updates.
//!
//! Transport callbacks never touch the manager directly: they push into an
//! inbox that [`SyncManager::pump`] drains once per frame.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::transport::{CONNECTED_PATH, ListenerId, Transport, server_timestamp};
use crate::platform::Clock;
use crate::settings::GameConfig;
use crate::sim::PhysicsState;

/// Wire record stored at `rooms/{room}/players/{uid}/state`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteSnapshot {
    #[serde(flatten)]
    pub physics: PhysicsState,
    /// Sender time (ms) when the record was written
    #[serde(default)]
    pub timestamp: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub streak: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_resonance_active: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connected: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_time: Option<f64>,
}

impl RemoteSnapshot {
    /// Peers without an explicit `connected` flag count as online
    pub fn is_connected(&self) -> bool {
        self.connected != Some(false)
    }
}

/// Locally tracked view of one peer
#[derive(Debug, Clone, PartialEq)]
pub struct RemotePlayer {
    pub uid: String,
    pub current_state: RemoteSnapshot,
    pub previous_state: RemoteSnapshot,
    /// Local receipt time (ms) of `current_state`
    pub last_update_time: f64,
    /// Local time the peer was first seen disconnected
    pub disconnected_since: Option<f64>,
}

enum Inbound {
    Players(Option<Value>),
    Connection(bool),
}

pub struct SyncManager {
    transport: Rc<dyn Transport>,
    clock: Rc<dyn Clock>,
    room_id: Option<String>,
    user_id: Option<String>,
    remote_players: HashMap<String, RemotePlayer>,
    /// Last snapshot of each evicted peer; stale copies are not re-admitted
    evicted: HashMap<String, RemoteSnapshot>,
    listeners: Vec<ListenerId>,
    inbox: Rc<RefCell<VecDeque<Inbound>>>,
    last_sync_time: Option<f64>,
    connected: bool,
    sync_interval_ms: f64,
    disconnect_grace_ms: f64,
}

impl SyncManager {
    pub fn new(transport: Rc<dyn Transport>, clock: Rc<dyn Clock>) -> Self {
        Self::with_config(transport, clock, &GameConfig::default())
    }

    pub fn with_config(transport: Rc<dyn Transport>, clock: Rc<dyn Clock>, config: &GameConfig) -> Self {
        let config = config.clone().sanitized();
        Self {
            transport,
            clock,
            room_id: None,
            user_id: None,
            remote_players: HashMap::new(),
            evicted: HashMap::new(),
            listeners: Vec::new(),
            inbox: Rc::new(RefCell::new(VecDeque::new())),
            last_sync_time: None,
            connected: false,
            sync_interval_ms: config.sync_interval_ms,
            disconnect_grace_ms: config.disconnect_grace_ms,
        }
    }

    pub fn is_syncing(&self) -> bool {
        self.room_id.is_some()
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Path of this client's state record, once syncing
    pub fn local_state_path(&self) -> Option<String> {
        let room = self.room_id.as_ref()?;
        let uid = self.user_id.as_ref()?;
        Some(state_path(room, uid))
    }

    /// Begin syncing `uid` in `room_id`, replacing any previous session
    pub fn start_sync(&mut self, room_id: &str, uid: &str) {
        self.stop_sync();
        self.room_id = Some(room_id.to_string());
        self.user_id = Some(uid.to_string());

        let inbox = self.inbox.clone();
        match self.transport.subscribe(
            &format!("rooms/{room_id}/players"),
            Box::new(move |value: Option<&Value>| {
                inbox
                    .borrow_mut()
                    .push_back(Inbound::Players(value.cloned()));
            }),
        ) {
            Ok(id) => self.listeners.push(id),
            Err(e) => log::error!("Failed to listen for players in {}: {}", room_id, e),
        }

        let inbox = self.inbox.clone();
        match self.transport.subscribe(
            CONNECTED_PATH,
            Box::new(move |value: Option<&Value>| {
                let online = value.and_then(Value::as_bool).unwrap_or(false);
                inbox.borrow_mut().push_back(Inbound::Connection(online));
            }),
        ) {
            Ok(id) => self.listeners.push(id),
            Err(e) => log::error!("Failed to listen for connection status: {}", e),
        }

        log::info!("Sync started for {} in room {}", uid, room_id);
        self.pump();
    }

    /// Release every listener and forget all peers; safe to call repeatedly
    pub fn stop_sync(&mut self) {
        for id in self.listeners.drain(..) {
            self.transport.unsubscribe(id);
        }
        if let Some(path) = self.local_state_path() {
            self.transport.cancel_on_disconnect(&path);
            log::info!("Sync stopped");
        }
        self.inbox.borrow_mut().clear();
        self.remote_players.clear();
        self.evicted.clear();
        self.room_id = None;
        self.user_id = None;
        self.last_sync_time = None;
        self.connected = false;
    }

    /// Apply queued transport events; returns how many were handled
    pub fn pump(&mut self) -> usize {
        let events: Vec<Inbound> = self.inbox.borrow_mut().drain(..).collect();
        let handled = events.len();
        for event in events {
            match event {
                Inbound::Players(value) => self.handle_players(value),
                Inbound::Connection(online) => self.handle_connection(online),
            }
        }
        self.evict_stale(self.clock.now_ms());
        handled
    }

    fn handle_players(&mut self, value: Option<Value>) {
        let Some(Value::Object(players)) = value else {
            return;
        };
        for (uid, entry) in players {
            if self.user_id.as_deref() == Some(uid.as_str()) {
                continue;
            }
            let Some(state) = entry.get("state") else {
                continue;
            };
            match serde_json::from_value::<RemoteSnapshot>(state.clone()) {
                Ok(snapshot) => {
                    // Unchanged peers ride along in every players snapshot
                    let unchanged = self
                        .remote_players
                        .get(&uid)
                        .is_some_and(|p| p.current_state == snapshot);
                    if !unchanged {
                        self.update_remote_player(&uid, snapshot);
                    }
                }
                Err(e) => log::warn!("Ignoring malformed state for {}: {}", uid, e),
            }
        }
    }

    fn handle_connection(&mut self, online: bool) {
        self.connected = online;
        if !online {
            log::warn!("Connection lost");
            return;
        }
        let Some(path) = self.local_state_path() else {
            return;
        };

        let offline = json!({ "connected": false, "timestamp": server_timestamp() });
        if let Err(e) = self.transport.on_disconnect_update(&path, offline) {
            log::error!("Failed to register disconnect handler: {}", e);
        }
        let online = json!({ "connected": true, "timestamp": server_timestamp() });
        if let Err(e) = self.transport.update(&path, online) {
            log::error!("Failed to mark connected: {}", e);
        }
        log::info!("Connected; presence registered at {}", path);
    }

    /// Publish local physics, at most once per sync interval
    ///
    /// Calls inside the window are dropped. Returns whether a write was
    /// issued. Transport failures are logged and swallowed; the next window
    /// retries naturally.
    pub fn write_local_state(
        &mut self,
        state: &PhysicsState,
        streak: Option<u32>,
        is_resonance_active: Option<bool>,
    ) -> bool {
        let Some(path) = self.local_state_path() else {
            log::warn!("write_local_state called before start_sync");
            return false;
        };
        let now = self.clock.now_ms();
        if let Some(last) = self.last_sync_time {
            if now - last < self.sync_interval_ms {
                return false;
            }
        }
        self.last_sync_time = Some(now);

        let record = RemoteSnapshot {
            physics: state.rounded(),
            timestamp: now,
            streak,
            is_resonance_active,
            connected: Some(true),
            finished: None,
            finish_time: None,
        };
        let value = match serde_json::to_value(&record) {
            Ok(v) => v,
            Err(e) => {
                log::error!("Failed to encode local state: {}", e);
                return false;
            }
        };
        match self.transport.set(&path, value) {
            Ok(()) => true,
            Err(e) => {
                log::error!("Sync write failed: {}", e);
                false
            }
        }
    }

    /// Publish the finishing record, bypassing the throttle
    pub fn send_race_finish(
        &mut self,
        state: &PhysicsState,
        streak: Option<u32>,
        is_resonance_active: Option<bool>,
    ) -> bool {
        let Some(path) = self.local_state_path() else {
            log::warn!("send_race_finish called before start_sync");
            return false;
        };

        let record = RemoteSnapshot {
            physics: state.rounded(),
            streak,
            is_resonance_active,
            connected: Some(true),
            finished: Some(true),
            ..Default::default()
        };
        let mut value = match serde_json::to_value(&record) {
            Ok(v) => v,
            Err(e) => {
                log::error!("Failed to encode finish record: {}", e);
                return false;
            }
        };
        if let Some(fields) = value.as_object_mut() {
            fields.insert("timestamp".to_string(), server_timestamp());
            fields.insert("finishTime".to_string(), server_timestamp());
        }

        match self.transport.set(&path, value) {
            Ok(()) => {
                log::info!("Race finish published");
                true
            }
            Err(e) => {
                log::error!("Failed to publish race finish: {}", e);
                false
            }
        }
    }

    /// Record a peer snapshot received now
    pub fn update_remote_player(&mut self, uid: &str, snapshot: RemoteSnapshot) {
        let now = self.clock.now_ms();
        self.update_remote_player_at(uid, snapshot, now);
    }

    /// Record a peer snapshot received at `now` (ms)
    ///
    /// The first snapshot seeds both interpolation endpoints; later ones
    /// shift current into previous. This client's own uid is ignored, as
    /// is an evicted peer until it reconnects or publishes a newer record.
    pub fn update_remote_player_at(&mut self, uid: &str, snapshot: RemoteSnapshot, now: f64) {
        if self.user_id.as_deref() == Some(uid) {
            return;
        }
        if let Some(last) = self.evicted.get(uid) {
            if !snapshot.is_connected() && snapshot.timestamp <= last.timestamp {
                return;
            }
            self.evicted.remove(uid);
            log::debug!("Evicted peer {} is back", uid);
        }
        let online = snapshot.is_connected();

        match self.remote_players.get_mut(uid) {
            Some(player) => {
                player.previous_state = std::mem::replace(&mut player.current_state, snapshot);
                player.last_update_time = now;
                player.disconnected_since = if online {
                    None
                } else {
                    player.disconnected_since.or(Some(now))
                };
            }
            None => {
                log::debug!("Tracking new peer {}", uid);
                self.remote_players.insert(
                    uid.to_string(),
                    RemotePlayer {
                        uid: uid.to_string(),
                        previous_state: snapshot.clone(),
                        current_state: snapshot,
                        last_update_time: now,
                        disconnected_since: (!online).then_some(now),
                    },
                );
            }
        }
    }

    /// Peer state with position interpolated to `at` (ms)
    ///
    /// Only position is blended; the other fields come from the latest
    /// snapshot. Unknown peers read as all zeros.
    pub fn get_interpolated_state(&self, uid: &str, at: f64) -> RemoteSnapshot {
        let Some(player) = self.remote_players.get(uid) else {
            return RemoteSnapshot::default();
        };
        let t = ((at - player.last_update_time) / self.sync_interval_ms).clamp(0.0, 1.0);
        let from = player.previous_state.physics.position;
        let to = player.current_state.physics.position;

        let mut state = player.current_state.clone();
        state.physics.position = from + (to - from) * t;
        state
    }

    fn is_expired(&self, player: &RemotePlayer, now: f64) -> bool {
        player
            .disconnected_since
            .is_some_and(|since| now - since > self.disconnect_grace_ms)
    }

    /// [`Self::get_interpolated_state`] at the current clock time
    pub fn get_interpolated_state_now(&self, uid: &str) -> RemoteSnapshot {
        self.get_interpolated_state(uid, self.clock.now_ms())
    }

    /// Peers still visible at `now`, sorted by uid
    pub fn get_remote_players(&self, now: f64) -> Vec<&RemotePlayer> {
        let mut players: Vec<&RemotePlayer> = self
            .remote_players
            .values()
            .filter(|p| !self.is_expired(p, now))
            .collect();
        players.sort_by(|a, b| a.uid.cmp(&b.uid));
        players
    }

    /// [`Self::get_remote_players`] at the current clock time
    pub fn get_remote_players_now(&self) -> Vec<&RemotePlayer> {
        self.get_remote_players(self.clock.now_ms())
    }

    /// Forget peers whose disconnect grace window has elapsed
    pub fn evict_stale(&mut self, now: f64) -> usize {
        let expired: Vec<String> = self
            .remote_players
            .values()
            .filter(|p| self.is_expired(p, now))
            .map(|p| p.uid.clone())
            .collect();
        for uid in &expired {
            if let Some(player) = self.remote_players.remove(uid) {
                self.evicted.insert(uid.clone(), player.current_state);
            }
            log::info!("Peer {} removed after disconnect", uid);
        }
        expired.len()
    }
}

impl Drop for SyncManager {
    fn drop(&mut self) {
        self.stop_sync();
    }
}

fn state_path(room_id: &str, uid: &str) -> String {
    format!("rooms/{room_id}/players/{uid}/state")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::multiplayer::transport::MemoryTransport;
    use crate::platform::ManualClock;

    fn setup() -> (SyncManager, MemoryTransport, ManualClock) {
        let clock = ManualClock::new(10_000.0);
        let transport = MemoryTransport::new(Rc::new(clock.clone()));
        let sync = SyncManager::new(Rc::new(transport.clone()), Rc::new(clock.clone()));
        (sync, transport, clock)
    }

    fn physics(position: f64) -> PhysicsState {
        PhysicsState {
            position,
            ..Default::default()
        }
    }

    fn snapshot(position: f64) -> RemoteSnapshot {
        RemoteSnapshot {
            physics: physics(position),
            ..Default::default()
        }
    }

    fn stored_position(transport: &MemoryTransport, path: &str) -> Option<f64> {
        transport
            .get(&format!("{path}/pos"))
            .unwrap()
            .and_then(|v| v.as_f64())
    }

    #[test]
    fn test_writes_are_throttled() {
        let (mut sync, transport, clock) = setup();
        sync.start_sync("ROOM01", "me");
        let path = sync.local_state_path().unwrap();

        let published: Vec<bool> = (1..=10)
            .map(|i| sync.write_local_state(&physics(i as f64), None, None))
            .collect();
        assert_eq!(published.iter().filter(|p| **p).count(), 1);
        assert_eq!(stored_position(&transport, &path), Some(1.0));

        clock.advance(100.0);
        assert!(!sync.write_local_state(&physics(20.0), None, None));

        clock.advance(100.0);
        assert!(sync.write_local_state(&physics(30.0), None, None));
        assert_eq!(stored_position(&transport, &path), Some(30.0));
    }

    #[test]
    fn test_write_path_and_rounding() {
        let (mut sync, transport, _) = setup();
        sync.start_sync("ROOM01", "me");
        let state = PhysicsState {
            position: 12.34567,
            velocity: 1.0004,
            acceleration: -0.0005,
            jerk: 2.0,
        };
        assert!(sync.write_local_state(&state, Some(3), Some(false)));

        let record = transport
            .get("rooms/ROOM01/players/me/state")
            .unwrap()
            .unwrap();
        assert_eq!(record["pos"], json!(12.346));
        assert_eq!(record["vel"], json!(1.0));
        assert_eq!(record["acc"], json!(-0.001));
        assert_eq!(record["streak"], json!(3));
        assert_eq!(record["isResonanceActive"], json!(false));
        assert_eq!(record["timestamp"], json!(10_000.0));
    }

    #[test]
    fn test_write_before_start_is_ignored() {
        let (mut sync, _, _) = setup();
        assert!(!sync.write_local_state(&physics(1.0), None, None));
        assert!(!sync.send_race_finish(&physics(1.0), None, None));
    }

    #[test]
    fn test_peer_updates_arrive_through_pump() {
        let (mut sync, transport, _) = setup();
        sync.start_sync("ROOM01", "me");

        transport
            .set("rooms/ROOM01/players/peer/state", json!({"pos": 5, "vel": 1, "acc": 0, "jerk": 0, "timestamp": 1}))
            .unwrap();
        assert!(sync.get_remote_players(10_000.0).is_empty());

        assert!(sync.pump() > 0);
        let players = sync.get_remote_players(10_000.0);
        assert_eq!(players.len(), 1);
        assert_eq!(players[0].uid, "peer");
        assert_eq!(players[0].current_state.physics.position, 5.0);
    }

    #[test]
    fn test_own_uid_excluded() {
        let (mut sync, _, _) = setup();
        sync.start_sync("ROOM01", "me");
        sync.write_local_state(&physics(1.0), None, None);
        sync.pump();
        assert!(sync.get_remote_players(10_000.0).is_empty());

        sync.update_remote_player("me", snapshot(3.0));
        assert!(sync.get_remote_players(10_000.0).is_empty());
    }

    #[test]
    fn test_first_snapshot_seeds_both_endpoints() {
        let (mut sync, _, _) = setup();
        sync.update_remote_player_at("p2", snapshot(7.0), 0.0);
        let player = sync.get_remote_players(0.0)[0];
        assert_eq!(player.previous_state, player.current_state);
        assert_eq!(sync.get_interpolated_state("p2", 100.0).physics.position, 7.0);
    }

    #[test]
    fn test_position_interpolation() {
        let (mut sync, _, clock) = setup();
        let now = clock.now_ms();
        sync.update_remote_player_at("p2", snapshot(0.0), now);
        let mut next = snapshot(100.0);
        next.physics.velocity = 9.0;
        next.streak = Some(4);
        sync.update_remote_player_at("p2", next, now);

        let mid = sync.get_interpolated_state("p2", now + 100.0);
        assert!((mid.physics.position - 50.0).abs() < 1e-9);
        assert_eq!(mid.physics.velocity, 9.0);
        assert_eq!(mid.streak, Some(4));

        assert_eq!(sync.get_interpolated_state("p2", now - 50.0).physics.position, 0.0);
        assert_eq!(sync.get_interpolated_state("p2", now + 500.0).physics.position, 100.0);
    }

    #[test]
    fn test_unknown_peer_reads_zero() {
        let (sync, _, _) = setup();
        assert_eq!(sync.get_interpolated_state("ghost", 0.0), RemoteSnapshot::default());
    }

    #[test]
    fn test_evicted_peer_stays_gone_through_pump() {
        let (mut sync, transport, clock) = setup();
        sync.start_sync("ROOM01", "me");
        transport
            .set("rooms/ROOM01/players/p2/state", json!({"pos": 1, "connected": false, "timestamp": 1}))
            .unwrap();
        sync.pump();
        assert_eq!(sync.get_remote_players_now().len(), 1);

        clock.advance(5_000.0);
        sync.pump();
        assert_eq!(sync.get_remote_players_now().len(), 1);

        clock.advance(5_001.0);
        sync.pump();
        assert!(sync.get_remote_players_now().is_empty());

        // Another peer publishing redelivers p2's stale record in the subtree
        transport
            .set("rooms/ROOM01/players/p3/state", json!({"pos": 2, "timestamp": 2}))
            .unwrap();
        sync.pump();
        let uids: Vec<&str> = sync
            .get_remote_players_now()
            .iter()
            .map(|p| p.uid.as_str())
            .collect();
        assert_eq!(uids, vec!["p3"]);

        sync.stop_sync();
        assert!(sync.evicted.is_empty());
    }

    #[test]
    fn test_evicted_peer_returns_on_reconnect() {
        let (mut sync, transport, clock) = setup();
        sync.start_sync("ROOM01", "me");
        transport
            .set("rooms/ROOM01/players/p2/state", json!({"pos": 1, "connected": false, "timestamp": 1}))
            .unwrap();
        sync.pump();
        clock.advance(10_001.0);
        sync.pump();
        assert!(sync.get_remote_players_now().is_empty());

        transport
            .set("rooms/ROOM01/players/p2/state", json!({"pos": 3, "connected": true, "timestamp": 20_000}))
            .unwrap();
        sync.pump();
        let players = sync.get_remote_players_now();
        assert_eq!(players.len(), 1);
        assert_eq!(players[0].current_state.physics.position, 3.0);
        assert_eq!(players[0].disconnected_since, None);
    }

    #[test]
    fn test_now_variants_read_the_clock() {
        let (mut sync, _, clock) = setup();
        let now = clock.now_ms();
        sync.update_remote_player_at("p2", snapshot(0.0), now);
        sync.update_remote_player_at("p2", snapshot(100.0), now);
        clock.advance(100.0);
        assert!((sync.get_interpolated_state_now("p2").physics.position - 50.0).abs() < 1e-9);
        assert_eq!(sync.get_remote_players_now().len(), 1);
    }

    #[test]
    fn test_disconnected_peer_grace_window() {
        let (mut sync, _, _) = setup();
        sync.update_remote_player_at("p2", snapshot(1.0), 0.0);
        let mut gone = snapshot(1.0);
        gone.connected = Some(false);
        sync.update_remote_player_at("p2", gone.clone(), 1_000.0);
        // A repeated offline record keeps the original disconnect time
        sync.update_remote_player_at("p2", gone, 4_000.0);

        assert_eq!(sync.get_remote_players(6_000.0).len(), 1);
        assert!(sync.get_remote_players(12_000.0).is_empty());

        assert_eq!(sync.evict_stale(6_000.0), 0);
        assert_eq!(sync.evict_stale(12_000.0), 1);
        assert!(sync.get_remote_players(0.0).is_empty());
    }

    #[test]
    fn test_reconnect_clears_disconnect_time() {
        let (mut sync, _, _) = setup();
        let mut gone = snapshot(1.0);
        gone.connected = Some(false);
        sync.update_remote_player_at("p2", gone, 0.0);
        sync.update_remote_player_at("p2", snapshot(2.0), 5_000.0);
        assert_eq!(sync.get_remote_players(60_000.0).len(), 1);
    }

    #[test]
    fn test_connection_presence() {
        let (mut sync, transport, _) = setup();
        sync.start_sync("ROOM01", "me");
        assert!(sync.is_connected());
        let path = "rooms/ROOM01/players/me/state";
        assert_eq!(transport.get(&format!("{path}/connected")).unwrap(), Some(json!(true)));

        transport.disconnect();
        assert_eq!(transport.get(&format!("{path}/connected")).unwrap(), Some(json!(false)));
        sync.pump();
        assert!(!sync.is_connected());
    }

    #[test]
    fn test_stop_sync_releases_everything() {
        let (mut sync, transport, _) = setup();
        sync.start_sync("ROOM01", "me");
        sync.update_remote_player("p2", snapshot(1.0));
        assert_eq!(transport.listener_count(), 2);

        sync.stop_sync();
        sync.stop_sync();
        assert_eq!(transport.listener_count(), 0);
        assert!(!sync.is_syncing());
        assert!(sync.get_remote_players(0.0).is_empty());

        transport
            .set("rooms/ROOM01/players/p3/state", json!({"pos": 1}))
            .unwrap();
        assert_eq!(sync.pump(), 0);
        assert!(sync.get_remote_players(0.0).is_empty());

        // Disconnect handler was cancelled
        transport.disconnect();
        assert_eq!(
            transport.get("rooms/ROOM01/players/me/state/connected").unwrap(),
            Some(json!(true))
        );
    }

    #[test]
    fn test_restart_switches_rooms() {
        let (mut sync, transport, _) = setup();
        sync.start_sync("ROOM01", "me");
        sync.start_sync("ROOM02", "me");
        assert_eq!(transport.listener_count(), 2);
        assert_eq!(
            sync.local_state_path().as_deref(),
            Some("rooms/ROOM02/players/me/state")
        );
    }

    #[test]
    fn test_race_finish_bypasses_throttle() {
        let (mut sync, transport, _) = setup();
        sync.start_sync("ROOM01", "me");
        assert!(sync.write_local_state(&physics(999.0), None, None));
        assert!(sync.send_race_finish(&physics(1000.0), Some(2), Some(false)));

        let record = transport
            .get("rooms/ROOM01/players/me/state")
            .unwrap()
            .unwrap();
        assert_eq!(record["finished"], json!(true));
        assert_eq!(record["finishTime"], json!(10_000.0));
        assert_eq!(record["pos"], json!(1000.0));
    }

    #[test]
    fn test_transport_failure_is_swallowed() {
        let (mut sync, transport, clock) = setup();
        sync.start_sync("ROOM01", "me");
        transport.set_fail_writes(true);
        assert!(!sync.write_local_state(&physics(1.0), None, None));

        transport.set_fail_writes(false);
        clock.advance(200.0);
        assert!(sync.write_local_state(&physics(2.0), None, None));
    }

    #[test]
    fn test_malformed_peer_record_skipped() {
        let (mut sync, transport, _) = setup();
        sync.start_sync("ROOM01", "me");
        transport
            .set("rooms/ROOM01/players/bad/state", json!({"pos": "far"}))
            .unwrap();
        sync.pump();
        assert!(sync.get_remote_players(10_000.0).is_empty());
    }
}
