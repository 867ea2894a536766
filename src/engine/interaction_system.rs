//! Client intents that change who holds what.
//!
//! Every operation checks its preconditions first and returns no events when
//! any of them fail: clients race each other and replay stale intents, so a
//! rejected intent is normal traffic rather than an error.

use super::utils::carry_position;
use super::Room;
use crate::constants::{
    DEFAULT_HOLD_DISTANCE, DEFAULT_HOLD_HEIGHT, NPC_HIT_PLAYER_DAMPING,
    OBJECT_HIT_PLAYER_DAMPING, WORLD_SEED,
};
use crate::geometry::Vec3;
use crate::types::{Outbound, PlayerMotion, PlayerUpdateRelay, RoomCommand, ServerEvent};
use crate::world::{generate_object_layout, NpcState};

impl Room {
    pub fn apply_command(&mut self, conn_id: &str, command: RoomCommand) -> Vec<Outbound> {
        match command {
            RoomCommand::PlayerUpdate(motion) => self.update_player(conn_id, motion),
            RoomCommand::MyDucktag { ducktag } => self.set_ducktag(conn_id, ducktag),
            RoomCommand::Grab { object_id } => self.grab_object(conn_id, object_id),
            RoomCommand::HeldObjectPos {
                object_id,
                position,
            } => self.held_object_pos(conn_id, object_id, position),
            RoomCommand::Throw {
                object_id,
                velocity,
                release_at,
            } => self.throw_object(conn_id, object_id, velocity, release_at),
            RoomCommand::Drop { object_id } => self.drop_object(conn_id, object_id),
            RoomCommand::GrabPlayer { grabbed_id } => self.grab_player(conn_id, &grabbed_id),
            RoomCommand::ReleasePlayer => self.release_player(conn_id),
            RoomCommand::ThrowPlayer {
                grabbed_id,
                velocity,
            } => self.throw_player(conn_id, &grabbed_id, velocity),
            RoomCommand::HitPlayer {
                target_id,
                velocity,
            } => self.hit_player(conn_id, &target_id, velocity),
            RoomCommand::GrabNpc { npc_idx } => self.grab_npc(conn_id, npc_idx),
            RoomCommand::ThrowNpc {
                npc_idx,
                position,
                velocity,
            } => self.throw_npc(conn_id, npc_idx, position, velocity),
            RoomCommand::DropNpc { npc_idx } => self.drop_npc(conn_id, npc_idx),
            RoomCommand::HeldNpcPos { npc_idx, position } => {
                self.held_npc_pos(conn_id, npc_idx, position)
            }
            RoomCommand::ObjectHitPlayer { object_index } => {
                self.object_hit_player(conn_id, object_index);
                Vec::new()
            }
            RoomCommand::NpcHitPlayer { npc_index } => {
                self.npc_hit_player(conn_id, npc_index);
                Vec::new()
            }
            RoomCommand::ResetWorld => {
                if !self.has_player(conn_id) {
                    return Vec::new();
                }
                self.reset_world()
            }
        }
    }

    pub fn grab_object(&mut self, player_id: &str, object_id: usize) -> Vec<Outbound> {
        let Some(player) = self.players.get_mut(player_id) else {
            return Vec::new();
        };
        let Some(object) = self.objects.get_mut(object_id) else {
            return Vec::new();
        };
        if object.held_by.is_some() || player.held_id.is_some() {
            return Vec::new();
        }
        object.held_by = Some(player_id.to_string());
        player.held_id = Some(object_id);
        vec![Outbound::room(ServerEvent::Grab {
            player_id: player_id.to_string(),
            object_id,
        })]
    }

    pub fn held_object_pos(
        &mut self,
        player_id: &str,
        object_id: usize,
        position: Vec3,
    ) -> Vec<Outbound> {
        let Some(object) = self.objects.get_mut(object_id) else {
            return Vec::new();
        };
        if object.held_by.as_deref() != Some(player_id) {
            return Vec::new();
        }
        object.position = position;
        object.velocity = Vec3::ZERO;
        vec![Outbound::room_except(
            player_id,
            ServerEvent::HeldObjectPos {
                object_id,
                x: position.x,
                y: position.y,
                z: position.z,
            },
        )]
    }

    pub fn throw_object(
        &mut self,
        player_id: &str,
        object_id: usize,
        velocity: Vec3,
        release_at: Option<Vec3>,
    ) -> Vec<Outbound> {
        if !self.release_object(player_id, object_id) {
            return Vec::new();
        }
        let Some(object) = self.objects.get_mut(object_id) else {
            return Vec::new();
        };
        if let Some(position) = release_at {
            object.position = position;
        }
        object.velocity = velocity;
        vec![Outbound::room(ServerEvent::Throw {
            player_id: player_id.to_string(),
            object_id,
            vx: velocity.x,
            vy: velocity.y,
            vz: velocity.z,
        })]
    }

    pub fn drop_object(&mut self, player_id: &str, object_id: usize) -> Vec<Outbound> {
        if !self.release_object(player_id, object_id) {
            return Vec::new();
        }
        vec![Outbound::room(ServerEvent::Drop {
            player_id: player_id.to_string(),
            object_id,
        })]
    }

    /// Clears both sides of a holding pair; false when `player_id` is not the holder.
    fn release_object(&mut self, player_id: &str, object_id: usize) -> bool {
        let Some(player) = self.players.get_mut(player_id) else {
            return false;
        };
        let Some(object) = self.objects.get_mut(object_id) else {
            return false;
        };
        if object.held_by.as_deref() != Some(player_id) {
            return false;
        }
        object.held_by = None;
        player.held_id = None;
        true
    }

    /// A player can carry at most one other player and can never end up
    /// carrying someone who is (transitively) carrying them.
    pub fn grab_player(&mut self, grabber_id: &str, grabbed_id: &str) -> Vec<Outbound> {
        if grabber_id == grabbed_id || !self.players.contains_key(grabber_id) {
            return Vec::new();
        }
        let Some(grabbed) = self.players.get(grabbed_id) else {
            return Vec::new();
        };
        if grabbed.grabbed_by.is_some()
            || self.carried_player_of(grabber_id).is_some()
            || self.is_carried_by(grabber_id, grabbed_id)
        {
            return Vec::new();
        }
        if let Some(grabbed) = self.players.get_mut(grabbed_id) {
            grabbed.grabbed_by = Some(grabber_id.to_string());
        }
        vec![Outbound::room(ServerEvent::PlayerGrabbed {
            grabber_id: grabber_id.to_string(),
            grabbed_id: grabbed_id.to_string(),
        })]
    }

    pub fn release_player(&mut self, grabber_id: &str) -> Vec<Outbound> {
        if !self.players.contains_key(grabber_id) {
            return Vec::new();
        }
        let Some(grabbed_id) = self.carried_player_of(grabber_id) else {
            return Vec::new();
        };
        if let Some(grabbed) = self.players.get_mut(&grabbed_id) {
            grabbed.grabbed_by = None;
        }
        vec![Outbound::room(ServerEvent::PlayerReleased {
            grabber_id: grabber_id.to_string(),
            grabbed_id,
        })]
    }

    pub fn throw_player(
        &mut self,
        grabber_id: &str,
        grabbed_id: &str,
        velocity: Vec3,
    ) -> Vec<Outbound> {
        if !self.players.contains_key(grabber_id) {
            return Vec::new();
        }
        let Some(grabbed) = self.players.get_mut(grabbed_id) else {
            return Vec::new();
        };
        if grabbed.grabbed_by.as_deref() != Some(grabber_id) {
            return Vec::new();
        }
        grabbed.grabbed_by = None;
        vec![
            Outbound::to(
                grabbed_id,
                ServerEvent::PlayerThrown {
                    vx: velocity.x,
                    vy: velocity.y,
                    vz: velocity.z,
                },
            ),
            Outbound::room(ServerEvent::PlayerReleased {
                grabber_id: grabber_id.to_string(),
                grabbed_id: grabbed_id.to_string(),
            }),
        ]
    }

    /// Relays a client-reported shove; the target's client applies it.
    pub fn hit_player(&self, player_id: &str, target_id: &str, velocity: Vec3) -> Vec<Outbound> {
        if !self.players.contains_key(player_id) || !self.players.contains_key(target_id) {
            return Vec::new();
        }
        vec![Outbound::to(
            target_id,
            ServerEvent::HitBy {
                vx: velocity.x,
                vy: velocity.y,
                vz: velocity.z,
            },
        )]
    }

    pub fn grab_npc(&mut self, player_id: &str, npc_idx: usize) -> Vec<Outbound> {
        if !self.players.contains_key(player_id) {
            return Vec::new();
        }
        let Some(npc) = self.npcs.get_mut(npc_idx) else {
            return Vec::new();
        };
        if npc.is_grabbed() {
            return Vec::new();
        }
        npc.state = NpcState::Grabbed {
            by: player_id.to_string(),
        };
        vec![Outbound::room_except(
            player_id,
            ServerEvent::NpcGrabbed {
                npc_idx,
                player_id: player_id.to_string(),
            },
        )]
    }

    pub fn throw_npc(
        &mut self,
        player_id: &str,
        npc_idx: usize,
        position: Vec3,
        velocity: Vec3,
    ) -> Vec<Outbound> {
        let Some(npc) = self.npcs.get_mut(npc_idx) else {
            return Vec::new();
        };
        if npc.grabbed_by() != Some(player_id) {
            return Vec::new();
        }
        npc.release();
        npc.position = position;
        npc.velocity = velocity;
        vec![Outbound::room_except(
            player_id,
            ServerEvent::NpcThrown {
                npc_idx,
                x: position.x,
                y: position.y,
                z: position.z,
                vx: velocity.x,
                vy: velocity.y,
                vz: velocity.z,
            },
        )]
    }

    pub fn drop_npc(&mut self, player_id: &str, npc_idx: usize) -> Vec<Outbound> {
        let Some(npc) = self.npcs.get_mut(npc_idx) else {
            return Vec::new();
        };
        if npc.grabbed_by() != Some(player_id) {
            return Vec::new();
        }
        npc.release();
        vec![Outbound::room_except(
            player_id,
            ServerEvent::NpcDropped { npc_idx },
        )]
    }

    pub fn held_npc_pos(
        &mut self,
        player_id: &str,
        npc_idx: usize,
        position: Vec3,
    ) -> Vec<Outbound> {
        let Some(npc) = self.npcs.get_mut(npc_idx) else {
            return Vec::new();
        };
        if npc.grabbed_by() != Some(player_id) {
            return Vec::new();
        }
        npc.position = position;
        npc.velocity = Vec3::ZERO;
        vec![Outbound::room_except(
            player_id,
            ServerEvent::HeldNpcPos {
                npc_idx,
                x: position.x,
                y: position.y,
                z: position.z,
            },
        )]
    }

    pub fn object_hit_player(&mut self, player_id: &str, object_index: usize) {
        if !self.players.contains_key(player_id) {
            return;
        }
        if let Some(object) = self.objects.get_mut(object_index) {
            object.velocity *= OBJECT_HIT_PLAYER_DAMPING;
        }
    }

    pub fn npc_hit_player(&mut self, player_id: &str, npc_index: usize) {
        if !self.players.contains_key(player_id) {
            return;
        }
        if let Some(npc) = self.npcs.get_mut(npc_index) {
            npc.velocity *= NPC_HIT_PLAYER_DAMPING;
        }
    }

    pub fn update_player(&mut self, player_id: &str, motion: PlayerMotion) -> Vec<Outbound> {
        let Some(player) = self.players.get_mut(player_id) else {
            return Vec::new();
        };
        player.position = Vec3::new(motion.x, motion.y, motion.z);
        player.yaw = motion.yaw;
        player.pitch = motion.pitch;
        if let Some(vel_y) = motion.vel_y {
            player.vel_y = vel_y;
        }
        player.hold_distance = motion.hold_distance;
        player.hold_height = motion.hold_height;
        let carrier = player.position;
        let yaw = player.yaw;

        let mut out = Vec::new();
        if let Some(held_id) = motion.held_player_id.as_deref() {
            let carrying = self
                .players
                .get(held_id)
                .map(|held| held.grabbed_by.as_deref() == Some(player_id))
                .unwrap_or(false);
            if carrying {
                let at = carry_position(
                    carrier,
                    yaw,
                    motion.hold_distance.unwrap_or(DEFAULT_HOLD_DISTANCE),
                    motion.hold_height.unwrap_or(DEFAULT_HOLD_HEIGHT),
                );
                out.push(Outbound::to(
                    held_id,
                    ServerEvent::GrabbedPosition {
                        x: at.x,
                        y: at.y,
                        z: at.z,
                    },
                ));
            }
        }
        out.insert(
            0,
            Outbound::room_except(
                player_id,
                ServerEvent::PlayerUpdate(PlayerUpdateRelay {
                    id: player_id.to_string(),
                    motion,
                }),
            ),
        );
        out
    }

    pub fn set_ducktag(&mut self, player_id: &str, ducktag: String) -> Vec<Outbound> {
        let Some(player) = self.players.get_mut(player_id) else {
            return Vec::new();
        };
        player.ducktag = ducktag.clone();
        vec![Outbound::room(ServerEvent::PlayerDucktag {
            id: player_id.to_string(),
            ducktag,
        })]
    }

    /// Lays out a fresh batch of objects. Buildings and NPCs are left as they are.
    pub fn reset_world(&mut self) -> Vec<Outbound> {
        self.objects = generate_object_layout(WORLD_SEED, &mut self.rng);
        for player in self.players.values_mut() {
            player.held_id = None;
        }
        vec![Outbound::room(ServerEvent::WorldReset {
            objects: self.object_states(),
        })]
    }

    fn carried_player_of(&self, grabber_id: &str) -> Option<String> {
        self.players
            .iter()
            .find(|(_, player)| player.grabbed_by.as_deref() == Some(grabber_id))
            .map(|(id, _)| id.clone())
    }

    /// Whether `candidate` appears anywhere up the chain of players carrying `player_id`.
    fn is_carried_by(&self, player_id: &str, candidate: &str) -> bool {
        let mut current = player_id;
        for _ in 0..self.players.len() {
            let Some(grabber) = self
                .players
                .get(current)
                .and_then(|player| player.grabbed_by.as_deref())
            else {
                return false;
            };
            if grabber == candidate {
                return true;
            }
            current = grabber;
        }
        false
    }
}
