use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::constants::{DUCK_COLORS, PLAYER_SPAWN, WORLD_SEED};
use crate::geometry::Vec3;
use crate::types::{
    EnvSnapshot, NpcStateView, ObjectStateView, ObjectView, Outbound, PlayerView, ServerEvent,
};
use crate::world::{
    generate_building_colliders, generate_object_layout, spawn_npcs, BuildingCollider, Npc,
    PhysicsObject,
};

mod interaction_system;
mod npc_system;
mod physics_system;
mod utils;

pub use self::utils::carry_position;

#[derive(Clone, Debug)]
pub struct Player {
    pub position: Vec3,
    pub yaw: f32,
    pub pitch: f32,
    pub vel_y: f32,
    pub hold_distance: Option<f32>,
    pub hold_height: Option<f32>,
    pub held_id: Option<usize>,
    pub grabbed_by: Option<String>,
    pub color: u32,
    pub ducktag: String,
}

impl Player {
    fn spawn(color: u32, ducktag: String) -> Self {
        let (x, y, z) = PLAYER_SPAWN;
        Self {
            position: Vec3::new(x, y, z),
            yaw: 0.0,
            pitch: 0.0,
            vel_y: 0.0,
            hold_distance: None,
            hold_height: None,
            held_id: None,
            grabbed_by: None,
            color,
            ducktag,
        }
    }

    pub fn view(&self, id: &str) -> PlayerView {
        PlayerView {
            id: id.to_string(),
            x: self.position.x,
            y: self.position.y,
            z: self.position.z,
            yaw: self.yaw,
            pitch: self.pitch,
            vel_y: self.vel_y,
            hold_distance: self.hold_distance,
            hold_height: self.hold_height,
            held_id: self.held_id,
            grabbed_by: self.grabbed_by.clone(),
            color: self.color,
            ducktag: self.ducktag.clone(),
        }
    }
}

/// One isolated simulation instance. Owns every entity inside it.
#[derive(Clone, Debug)]
pub struct Room {
    pub id: String,
    pub objects: Vec<PhysicsObject>,
    pub colliders: Vec<BuildingCollider>,
    pub npcs: Vec<Npc>,
    pub players: BTreeMap<String, Player>,
    rng: StdRng,
    tick: u64,
}

impl Room {
    pub fn new(id: String) -> Self {
        Self::with_rng(id, StdRng::from_os_rng())
    }

    /// Same city and NPC roster as [`Room::new`]; `rng` drives object
    /// placement and NPC wander decisions.
    pub fn with_rng(id: String, mut rng: StdRng) -> Self {
        Self {
            id,
            objects: generate_object_layout(WORLD_SEED, &mut rng),
            colliders: generate_building_colliders(WORLD_SEED),
            npcs: spawn_npcs(WORLD_SEED),
            players: BTreeMap::new(),
            rng,
            tick: 0,
        }
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn has_player(&self, player_id: &str) -> bool {
        self.players.contains_key(player_id)
    }

    /// First palette color nobody in the room wears, else cycle by head count.
    pub fn next_color(&self) -> u32 {
        DUCK_COLORS
            .iter()
            .copied()
            .find(|color| !self.players.values().any(|player| player.color == *color))
            .unwrap_or(DUCK_COLORS[self.players.len() % DUCK_COLORS.len()])
    }

    pub fn add_player(&mut self, player_id: &str, ducktag: String) -> PlayerView {
        let color = self.next_color();
        let player = Player::spawn(color, ducktag);
        let view = player.view(player_id);
        self.players.insert(player_id.to_string(), player);
        view
    }

    /// Releases everything the player held or carried, then removes it.
    pub fn remove_player(&mut self, player_id: &str) -> Vec<Outbound> {
        let Some(player) = self.players.remove(player_id) else {
            return Vec::new();
        };
        let mut out = Vec::new();

        if let Some(object_id) = player.held_id {
            if let Some(object) = self.objects.get_mut(object_id) {
                if object.held_by.as_deref() == Some(player_id) {
                    object.held_by = None;
                    out.push(Outbound::room(ServerEvent::Drop {
                        player_id: player_id.to_string(),
                        object_id,
                    }));
                }
            }
        }

        let carried = self
            .players
            .iter_mut()
            .find(|(_, other)| other.grabbed_by.as_deref() == Some(player_id));
        if let Some((grabbed_id, grabbed)) = carried {
            grabbed.grabbed_by = None;
            out.push(Outbound::room(ServerEvent::PlayerReleased {
                grabber_id: player_id.to_string(),
                grabbed_id: grabbed_id.clone(),
            }));
        }

        for (npc_idx, npc) in self.npcs.iter_mut().enumerate() {
            if npc.grabbed_by() == Some(player_id) {
                npc.release();
                out.push(Outbound::room(ServerEvent::NpcDropped { npc_idx }));
            }
        }

        out.push(Outbound::room(ServerEvent::PlayerLeft(player_id.to_string())));
        out
    }

    /// Advances one fixed simulation step and returns the events it produced.
    pub fn step(&mut self) -> Vec<Outbound> {
        self.tick += 1;
        let mut out = Vec::new();
        self.integrate_objects(&mut out);
        self.resolve_object_npc_impacts();
        self.resolve_npc_npc_impacts();
        self.step_npcs(&mut out);
        out
    }

    pub fn build_snapshot(&self) -> EnvSnapshot {
        EnvSnapshot {
            objects: self.object_states(),
            npcs: self
                .npcs
                .iter()
                .map(|npc| NpcStateView {
                    x: npc.position.x,
                    y: npc.position.y,
                    z: npc.position.z,
                    vx: npc.velocity.x,
                    vy: npc.velocity.y,
                    vz: npc.velocity.z,
                })
                .collect(),
        }
    }

    pub fn object_states(&self) -> Vec<ObjectStateView> {
        self.objects
            .iter()
            .map(|object| ObjectStateView {
                id: object.id,
                x: object.position.x,
                y: object.position.y,
                z: object.position.z,
                vx: object.velocity.x,
                vy: object.velocity.y,
                vz: object.velocity.z,
                held_by: object.held_by.clone(),
            })
            .collect()
    }

    pub fn object_views(&self) -> Vec<ObjectView> {
        self.objects
            .iter()
            .map(|object| ObjectView {
                id: object.id,
                kind: object.kind,
                x: object.position.x,
                y: object.position.y,
                z: object.position.z,
                vx: object.velocity.x,
                vy: object.velocity.y,
                vz: object.velocity.z,
                mass: object.mass,
                size: object.size,
                held_by: object.held_by.clone(),
            })
            .collect()
    }

    pub fn player_views(&self) -> BTreeMap<String, PlayerView> {
        self.players
            .iter()
            .map(|(id, player)| (id.clone(), player.view(id)))
            .collect()
    }

    pub fn init_event(&self, your_id: &str) -> ServerEvent {
        ServerEvent::Init {
            your_id: your_id.to_string(),
            players: self.player_views(),
            objects: self.object_views(),
        }
    }

    /// Checks every holder/held pairing. Returns a description of the first
    /// broken pairing, if any.
    pub fn ownership_violation(&self) -> Option<String> {
        for object in &self.objects {
            if let Some(holder) = object.held_by.as_deref() {
                let paired = self
                    .players
                    .get(holder)
                    .map(|player| player.held_id == Some(object.id))
                    .unwrap_or(false);
                if !paired {
                    return Some(format!(
                        "object {} held by {holder} without back-reference",
                        object.id
                    ));
                }
            }
        }
        for (player_id, player) in &self.players {
            if let Some(object_id) = player.held_id {
                let paired = self
                    .objects
                    .get(object_id)
                    .map(|object| object.held_by.as_deref() == Some(player_id.as_str()))
                    .unwrap_or(false);
                if !paired {
                    return Some(format!("player {player_id} claims object {object_id}"));
                }
            }
            if let Some(grabber) = player.grabbed_by.as_deref() {
                if !self.players.contains_key(grabber) || grabber == player_id {
                    return Some(format!("player {player_id} grabbed by missing {grabber}"));
                }
            }
        }
        for (npc_idx, npc) in self.npcs.iter().enumerate() {
            if let Some(holder) = npc.grabbed_by() {
                if !self.players.contains_key(holder) {
                    return Some(format!("npc {npc_idx} grabbed by missing {holder}"));
                }
            }
        }
        None
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::Room;

    pub(crate) fn room_with_players(ids: &[&str]) -> Room {
        let mut room = Room::with_rng("test".to_string(), StdRng::seed_from_u64(42));
        for id in ids {
            room.add_player(id, format!("tag-{id}"));
        }
        room
    }

    /// Moves the city out of the way so a test controls every collider.
    pub(crate) fn clear_city(room: &mut Room) {
        room.colliders.clear();
        for (index, npc) in room.npcs.iter_mut().enumerate() {
            npc.position.x = 1_000.0 + index as f32 * 10.0;
            npc.position.z = 1_000.0;
        }
        for (index, object) in room.objects.iter_mut().enumerate() {
            object.position.x = -1_000.0 - index as f32 * 10.0;
            object.position.z = -1_000.0;
        }
    }
}
