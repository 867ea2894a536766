use std::collections::BTreeMap;

use serde::Serialize;

use crate::geometry::Vec3;
use crate::world::ObjectKind;

/// Connection identifier. A player's id is the id of the connection that owns it.
pub type ConnId = String;

#[derive(Clone, Debug, Serialize)]
pub struct ObjectView {
    pub id: usize,
    pub kind: ObjectKind,
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub vx: f32,
    pub vy: f32,
    pub vz: f32,
    pub mass: f32,
    pub size: Vec3,
    #[serde(rename = "heldBy")]
    pub held_by: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct ObjectStateView {
    pub id: usize,
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub vx: f32,
    pub vy: f32,
    pub vz: f32,
    #[serde(rename = "heldBy")]
    pub held_by: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct NpcStateView {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub vx: f32,
    pub vy: f32,
    pub vz: f32,
}

#[derive(Clone, Debug, Serialize)]
pub struct PlayerView {
    pub id: String,
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub yaw: f32,
    pub pitch: f32,
    #[serde(rename = "velY")]
    pub vel_y: f32,
    #[serde(rename = "holdDistance", skip_serializing_if = "Option::is_none")]
    pub hold_distance: Option<f32>,
    #[serde(rename = "holdHeight", skip_serializing_if = "Option::is_none")]
    pub hold_height: Option<f32>,
    #[serde(rename = "heldId")]
    pub held_id: Option<usize>,
    #[serde(rename = "grabbedBy")]
    pub grabbed_by: Option<String>,
    pub color: u32,
    pub ducktag: String,
}

/// Per-frame pose a client streams for its own player.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PlayerMotion {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub yaw: f32,
    pub pitch: f32,
    #[serde(rename = "velY", skip_serializing_if = "Option::is_none")]
    pub vel_y: Option<f32>,
    #[serde(rename = "holdDistance", skip_serializing_if = "Option::is_none")]
    pub hold_distance: Option<f32>,
    #[serde(rename = "holdHeight", skip_serializing_if = "Option::is_none")]
    pub hold_height: Option<f32>,
    #[serde(rename = "heldPlayerId", skip_serializing_if = "Option::is_none")]
    pub held_player_id: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct PlayerUpdateRelay {
    pub id: String,
    #[serde(flatten)]
    pub motion: PlayerMotion,
}

#[derive(Clone, Debug, Serialize)]
pub struct EnvSnapshot {
    pub objects: Vec<ObjectStateView>,
    pub npcs: Vec<NpcStateView>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RoomSummary {
    #[serde(rename = "roomId")]
    pub room_id: String,
    #[serde(rename = "playerCount")]
    pub player_count: usize,
}

/// Every message the server pushes, serialized as `{"event": .., "data": ..}`.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerEvent {
    RoomCreated {
        #[serde(rename = "roomId")]
        room_id: String,
    },
    RoomNotFound,
    Init {
        #[serde(rename = "yourId")]
        your_id: String,
        players: BTreeMap<String, PlayerView>,
        objects: Vec<ObjectView>,
    },
    PlayerJoined(PlayerView),
    PlayerLeft(String),
    PlayerUpdate(PlayerUpdateRelay),
    PlayerDucktag {
        id: String,
        ducktag: String,
    },
    Grab {
        #[serde(rename = "playerId")]
        player_id: String,
        #[serde(rename = "objectId")]
        object_id: usize,
    },
    Drop {
        #[serde(rename = "playerId")]
        player_id: String,
        #[serde(rename = "objectId")]
        object_id: usize,
    },
    Throw {
        #[serde(rename = "playerId")]
        player_id: String,
        #[serde(rename = "objectId")]
        object_id: usize,
        vx: f32,
        vy: f32,
        vz: f32,
    },
    HeldObjectPos {
        #[serde(rename = "objectId")]
        object_id: usize,
        x: f32,
        y: f32,
        z: f32,
    },
    GrabbedPosition {
        x: f32,
        y: f32,
        z: f32,
    },
    PlayerGrabbed {
        #[serde(rename = "grabberId")]
        grabber_id: String,
        #[serde(rename = "grabbedId")]
        grabbed_id: String,
    },
    PlayerReleased {
        #[serde(rename = "grabberId")]
        grabber_id: String,
        #[serde(rename = "grabbedId")]
        grabbed_id: String,
    },
    PlayerThrown {
        vx: f32,
        vy: f32,
        vz: f32,
    },
    HitBy {
        vx: f32,
        vy: f32,
        vz: f32,
    },
    NpcGrabbed {
        #[serde(rename = "npcIdx")]
        npc_idx: usize,
        #[serde(rename = "playerId")]
        player_id: String,
    },
    NpcThrown {
        #[serde(rename = "npcIdx")]
        npc_idx: usize,
        x: f32,
        y: f32,
        z: f32,
        vx: f32,
        vy: f32,
        vz: f32,
    },
    NpcDropped {
        #[serde(rename = "npcIdx")]
        npc_idx: usize,
    },
    HeldNpcPos {
        #[serde(rename = "npcIdx")]
        npc_idx: usize,
        x: f32,
        y: f32,
        z: f32,
    },
    BuildingDestroyed {
        #[serde(rename = "buildingId")]
        building_id: u32,
    },
    WorldReset {
        objects: Vec<ObjectStateView>,
    },
    EnvUpdate(EnvSnapshot),
}

/// Intents a connection can send once it is inside a room.
#[derive(Clone, Debug, PartialEq)]
pub enum RoomCommand {
    PlayerUpdate(PlayerMotion),
    MyDucktag { ducktag: String },
    Grab { object_id: usize },
    HeldObjectPos { object_id: usize, position: Vec3 },
    Throw {
        object_id: usize,
        velocity: Vec3,
        release_at: Option<Vec3>,
    },
    Drop { object_id: usize },
    GrabPlayer { grabbed_id: String },
    ReleasePlayer,
    ThrowPlayer { grabbed_id: String, velocity: Vec3 },
    HitPlayer { target_id: String, velocity: Vec3 },
    GrabNpc { npc_idx: usize },
    ThrowNpc {
        npc_idx: usize,
        position: Vec3,
        velocity: Vec3,
    },
    DropNpc { npc_idx: usize },
    HeldNpcPos { npc_idx: usize, position: Vec3 },
    ObjectHitPlayer { object_index: usize },
    NpcHitPlayer { npc_index: usize },
    ResetWorld,
}

/// Who receives an event produced inside a room.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Audience {
    Connection(ConnId),
    Room,
    RoomExcept(ConnId),
}

#[derive(Clone, Debug)]
pub struct Outbound {
    pub audience: Audience,
    pub event: ServerEvent,
}

impl Outbound {
    pub fn room(event: ServerEvent) -> Self {
        Self {
            audience: Audience::Room,
            event,
        }
    }

    pub fn room_except(conn_id: &str, event: ServerEvent) -> Self {
        Self {
            audience: Audience::RoomExcept(conn_id.to_string()),
            event,
        }
    }

    pub fn to(conn_id: &str, event: ServerEvent) -> Self {
        Self {
            audience: Audience::Connection(conn_id.to_string()),
            event,
        }
    }
}
