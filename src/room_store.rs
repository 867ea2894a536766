//! Owns every live room and the join/leave lifecycle around them.

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;
use tracing::info;

use crate::engine::Room;
use crate::server_utils::random_room_id;
use crate::types::{EnvSnapshot, Outbound, RoomSummary, ServerEvent};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RoomError {
    #[error("room {0} not found")]
    NotFound(String),
}

#[derive(Debug, Default)]
pub struct RoomStore {
    rooms: BTreeMap<String, Room>,
}

impl RoomStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    pub fn contains(&self, room_id: &str) -> bool {
        self.rooms.contains_key(room_id)
    }

    pub fn get(&self, room_id: &str) -> Option<&Room> {
        self.rooms.get(room_id)
    }

    pub fn get_mut(&mut self, room_id: &str) -> Option<&mut Room> {
        self.rooms.get_mut(room_id)
    }

    pub fn rooms(&self) -> impl Iterator<Item = &Room> {
        self.rooms.values()
    }

    pub fn create_room(&mut self, conn_id: &str, ducktag: String) -> (String, Vec<Outbound>) {
        let mut rng = StdRng::from_os_rng();
        self.create_room_with_rng(conn_id, ducktag, &mut rng)
    }

    /// Like [`RoomStore::create_room`], drawing the room id and the room's own
    /// random stream from `rng`.
    pub fn create_room_with_rng(
        &mut self,
        conn_id: &str,
        ducktag: String,
        rng: &mut StdRng,
    ) -> (String, Vec<Outbound>) {
        let room_id = loop {
            let candidate = random_room_id(rng);
            if !self.rooms.contains_key(&candidate) {
                break candidate;
            }
        };
        let mut room = Room::with_rng(room_id.clone(), StdRng::seed_from_u64(rng.random()));
        room.add_player(conn_id, ducktag);
        let out = vec![
            Outbound::to(
                conn_id,
                ServerEvent::RoomCreated {
                    room_id: room_id.clone(),
                },
            ),
            Outbound::to(conn_id, room.init_event(conn_id)),
        ];
        self.rooms.insert(room_id.clone(), room);
        info!(room_id = %room_id, conn_id, rooms = self.rooms.len(), "room created");
        (room_id, out)
    }

    pub fn join_room(
        &mut self,
        room_id: &str,
        conn_id: &str,
        ducktag: String,
    ) -> Result<Vec<Outbound>, RoomError> {
        let room = self
            .rooms
            .get_mut(room_id)
            .ok_or_else(|| RoomError::NotFound(room_id.to_string()))?;
        let view = room.add_player(conn_id, ducktag);
        info!(room_id, conn_id, players = room.player_count(), "player joined");
        Ok(vec![
            Outbound::to(conn_id, room.init_event(conn_id)),
            Outbound::room_except(conn_id, ServerEvent::PlayerJoined(view)),
        ])
    }

    /// Removes the player and deletes the room once nobody is left in it.
    pub fn leave_room(&mut self, room_id: &str, conn_id: &str) -> Vec<Outbound> {
        let Some(room) = self.rooms.get_mut(room_id) else {
            return Vec::new();
        };
        let out = room.remove_player(conn_id);
        if !out.is_empty() {
            info!(room_id, conn_id, players = room.player_count(), "player left");
        }
        if room.player_count() == 0 {
            self.rooms.remove(room_id);
            info!(room_id, rooms = self.rooms.len(), "room deleted");
        }
        out
    }

    pub fn list_rooms(&self) -> Vec<RoomSummary> {
        self.rooms
            .values()
            .filter(|room| room.player_count() > 0)
            .map(|room| RoomSummary {
                room_id: room.id.clone(),
                player_count: room.player_count(),
            })
            .collect()
    }

    /// Advances every occupied room one step. Returns the events each room
    /// produced, keyed by room id; rooms that produced nothing are omitted.
    pub fn step_all(&mut self) -> Vec<(String, Vec<Outbound>)> {
        self.rooms.retain(|_, room| room.player_count() > 0);
        self.rooms
            .iter_mut()
            .filter_map(|(room_id, room)| {
                let out = room.step();
                (!out.is_empty()).then(|| (room_id.clone(), out))
            })
            .collect()
    }

    pub fn snapshots(&self) -> Vec<(String, EnvSnapshot)> {
        self.rooms
            .iter()
            .filter(|(_, room)| room.player_count() > 0)
            .map(|(room_id, room)| (room_id.clone(), room.build_snapshot()))
            .collect()
    }
}
