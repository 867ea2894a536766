use serde_json::{Map, Value};

use crate::geometry::Vec3;
use crate::server_utils::{normalize_room_id, sanitize_ducktag};
use crate::types::{PlayerMotion, RoomCommand};

#[derive(Clone, Debug, PartialEq)]
pub enum ClientCommand {
    ListRooms,
    CreateRoom { ducktag: String },
    JoinRoom { room_id: String, ducktag: String },
    LeaveRoom,
    Room(RoomCommand),
}

#[derive(Clone, Debug, PartialEq)]
pub struct ClientFrame {
    pub command: ClientCommand,
    pub ack: Option<u64>,
}

/// Parses `{"event": .., "data": .., "ack": ..}`. Anything malformed, including
/// non-finite numbers, yields `None`.
pub fn parse_client_message(raw: &str) -> Option<ClientFrame> {
    let value: Value = serde_json::from_str(raw).ok()?;
    let object = value.as_object()?;
    let event = object.get("event")?.as_str()?;
    let data = object.get("data").unwrap_or(&Value::Null);
    let ack = match object.get("ack") {
        None | Some(Value::Null) => None,
        Some(value) => Some(value.as_u64()?),
    };

    let command = match event {
        "listRooms" => ClientCommand::ListRooms,
        "createRoom" => ClientCommand::CreateRoom {
            ducktag: sanitize_ducktag(optional_str(data, "ducktag")),
        },
        "joinRoom" => {
            let room_id = match data {
                Value::String(room_id) => room_id.as_str(),
                Value::Object(fields) => fields
                    .get("roomId")
                    .and_then(Value::as_str)
                    .unwrap_or_default(),
                _ => "",
            };
            ClientCommand::JoinRoom {
                room_id: normalize_room_id(room_id),
                ducktag: sanitize_ducktag(optional_str(data, "ducktag")),
            }
        }
        "leaveRoom" => ClientCommand::LeaveRoom,
        _ => ClientCommand::Room(parse_room_command(event, data)?),
    };
    Some(ClientFrame { command, ack })
}

fn parse_room_command(event: &str, data: &Value) -> Option<RoomCommand> {
    let command = match event {
        "playerUpdate" => {
            let fields = data.as_object()?;
            RoomCommand::PlayerUpdate(PlayerMotion {
                x: required_f32(fields, "x")?,
                y: required_f32(fields, "y")?,
                z: required_f32(fields, "z")?,
                yaw: required_f32(fields, "yaw")?,
                pitch: required_f32(fields, "pitch")?,
                vel_y: optional_f32(fields, "velY")?,
                hold_distance: optional_f32(fields, "holdDistance")?,
                hold_height: optional_f32(fields, "holdHeight")?,
                held_player_id: match fields.get("heldPlayerId") {
                    None | Some(Value::Null) => None,
                    Some(value) => Some(value.as_str()?.to_string()),
                },
            })
        }
        "myDucktag" => RoomCommand::MyDucktag {
            ducktag: sanitize_ducktag(optional_str(data, "ducktag")),
        },
        "grab" => RoomCommand::Grab {
            object_id: index(data)?,
        },
        "heldObjectPos" => {
            let fields = data.as_object()?;
            RoomCommand::HeldObjectPos {
                object_id: index(fields.get("objectId")?)?,
                position: vec3(fields, "x", "y", "z")?,
            }
        }
        "throw" => {
            let fields = data.as_object()?;
            let release_at = if ["x", "y", "z"]
                .iter()
                .all(|key| fields.get(*key).is_some_and(|value| !value.is_null()))
            {
                Some(vec3(fields, "x", "y", "z")?)
            } else {
                None
            };
            RoomCommand::Throw {
                object_id: index(fields.get("objectId")?)?,
                velocity: vec3(fields, "vx", "vy", "vz")?,
                release_at,
            }
        }
        "drop" => RoomCommand::Drop {
            object_id: index(data)?,
        },
        "grabPlayer" => RoomCommand::GrabPlayer {
            grabbed_id: data.as_str()?.to_string(),
        },
        "releasePlayer" => RoomCommand::ReleasePlayer,
        "throwPlayer" => {
            let fields = data.as_object()?;
            RoomCommand::ThrowPlayer {
                grabbed_id: fields.get("grabbedId")?.as_str()?.to_string(),
                velocity: vec3(fields, "vx", "vy", "vz")?,
            }
        }
        "hitPlayer" => {
            let fields = data.as_object()?;
            RoomCommand::HitPlayer {
                target_id: fields.get("targetId")?.as_str()?.to_string(),
                velocity: vec3(fields, "vx", "vy", "vz")?,
            }
        }
        "grabNpc" => RoomCommand::GrabNpc {
            npc_idx: index(data)?,
        },
        "throwNpc" => {
            let fields = data.as_object()?;
            RoomCommand::ThrowNpc {
                npc_idx: index(fields.get("npcIdx")?)?,
                position: vec3(fields, "x", "y", "z")?,
                velocity: vec3(fields, "vx", "vy", "vz")?,
            }
        }
        "dropNpc" => RoomCommand::DropNpc {
            npc_idx: index(data)?,
        },
        "heldNpcPos" => {
            let fields = data.as_object()?;
            RoomCommand::HeldNpcPos {
                npc_idx: index(fields.get("npcIdx")?)?,
                position: vec3(fields, "x", "y", "z")?,
            }
        }
        "objectHitPlayer" => RoomCommand::ObjectHitPlayer {
            object_index: index(data.get("objectIndex")?)?,
        },
        "npcHitPlayer" => RoomCommand::NpcHitPlayer {
            npc_index: index(data.get("npcIndex")?)?,
        },
        "resetWorld" => RoomCommand::ResetWorld,
        _ => return None,
    };
    Some(command)
}

fn optional_str<'a>(data: &'a Value, key: &str) -> Option<&'a str> {
    data.get(key).and_then(Value::as_str)
}

/// Entity indices arrive as JSON numbers; integral floats are accepted too.
fn index(value: &Value) -> Option<usize> {
    if let Some(number) = value.as_u64() {
        return usize::try_from(number).ok();
    }
    let number = value.as_f64()?;
    if number.is_finite() && number >= 0.0 && number.fract() == 0.0 && number <= u32::MAX as f64 {
        return Some(number as usize);
    }
    None
}

fn finite_f32(value: &Value) -> Option<f32> {
    let number = value.as_f64()? as f32;
    number.is_finite().then_some(number)
}

fn required_f32(fields: &Map<String, Value>, key: &str) -> Option<f32> {
    finite_f32(fields.get(key)?)
}

fn optional_f32(fields: &Map<String, Value>, key: &str) -> Option<Option<f32>> {
    match fields.get(key) {
        None | Some(Value::Null) => Some(None),
        Some(value) => finite_f32(value).map(Some),
    }
}

fn vec3(fields: &Map<String, Value>, x: &str, y: &str, z: &str) -> Option<Vec3> {
    Some(Vec3::new(
        required_f32(fields, x)?,
        required_f32(fields, y)?,
        required_f32(fields, z)?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::DEFAULT_DUCKTAG;

    fn room_command(raw: &str) -> Option<RoomCommand> {
        match parse_client_message(raw)?.command {
            ClientCommand::Room(command) => Some(command),
            other => panic!("expected room command, got {other:?}"),
        }
    }

    #[test]
    fn parse_list_rooms_with_ack() {
        let frame = parse_client_message(r#"{"event":"listRooms","ack":7}"#)
            .expect("listRooms should parse");
        assert_eq!(frame.command, ClientCommand::ListRooms);
        assert_eq!(frame.ack, Some(7));
    }

    #[test]
    fn parse_rejects_bad_envelope() {
        assert!(parse_client_message("not json").is_none());
        assert!(parse_client_message(r#"{"data":1}"#).is_none());
        assert!(parse_client_message(r#"{"event":"listRooms","ack":"x"}"#).is_none());
        assert!(parse_client_message(r#"{"event":"fly","data":{}}"#).is_none());
    }

    #[test]
    fn create_room_defaults_ducktag() {
        let frame = parse_client_message(r#"{"event":"createRoom"}"#).expect("should parse");
        assert_eq!(
            frame.command,
            ClientCommand::CreateRoom {
                ducktag: DEFAULT_DUCKTAG.to_string()
            }
        );
    }

    #[test]
    fn join_room_accepts_object_or_bare_id() {
        let raw = r#"{"event":"joinRoom","data":{"roomId":"AB12","ducktag":"Tealy"}}"#;
        let frame = parse_client_message(raw).expect("should parse");
        assert_eq!(
            frame.command,
            ClientCommand::JoinRoom {
                room_id: "ab12".to_string(),
                ducktag: "Tealy".to_string()
            }
        );
        let frame =
            parse_client_message(r#"{"event":"joinRoom","data":"x9y8"}"#).expect("should parse");
        assert!(matches!(
            frame.command,
            ClientCommand::JoinRoom { ref room_id, ref ducktag }
                if room_id == "x9y8" && ducktag == DEFAULT_DUCKTAG
        ));
    }

    #[test]
    fn parse_player_update_with_optional_fields() {
        let raw = concat!(
            r#"{"event":"playerUpdate","data":{"x":1,"y":2,"z":3,"yaw":0.5,"pitch":-0.1,"#,
            r#""holdDistance":4,"heldPlayerId":"conn_2"}}"#,
        );
        let command = room_command(raw).expect("should parse");
        match command {
            RoomCommand::PlayerUpdate(motion) => {
                assert_eq!(motion.x, 1.0);
                assert_eq!(motion.vel_y, None);
                assert_eq!(motion.hold_distance, Some(4.0));
                assert_eq!(motion.held_player_id.as_deref(), Some("conn_2"));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn parse_player_update_requires_pose() {
        let raw = r#"{"event":"playerUpdate","data":{"x":1,"y":2,"z":3,"yaw":0}}"#;
        assert!(room_command(raw).is_none());
    }

    #[test]
    fn parse_bare_index_payloads() {
        assert_eq!(
            room_command(r#"{"event":"grab","data":5}"#),
            Some(RoomCommand::Grab { object_id: 5 })
        );
        assert_eq!(
            room_command(r#"{"event":"dropNpc","data":3.0}"#),
            Some(RoomCommand::DropNpc { npc_idx: 3 })
        );
        assert!(room_command(r#"{"event":"grab","data":-1}"#).is_none());
        assert!(room_command(r#"{"event":"grab","data":1.5}"#).is_none());
        assert!(room_command(r#"{"event":"grab","data":"5"}"#).is_none());
    }

    #[test]
    fn parse_throw_with_and_without_release_point() {
        let with_point = room_command(
            r#"{"event":"throw","data":{"objectId":2,"vx":1,"vy":2,"vz":3,"x":4,"y":5,"z":6}}"#,
        );
        assert_eq!(
            with_point,
            Some(RoomCommand::Throw {
                object_id: 2,
                velocity: Vec3::new(1.0, 2.0, 3.0),
                release_at: Some(Vec3::new(4.0, 5.0, 6.0)),
            })
        );
        let partial_point =
            room_command(r#"{"event":"throw","data":{"objectId":2,"vx":1,"vy":2,"vz":3,"x":4}}"#);
        assert!(matches!(
            partial_point,
            Some(RoomCommand::Throw { release_at: None, .. })
        ));
    }

    #[test]
    fn parse_rejects_out_of_range_numbers() {
        let huge = r#"{"event":"hitPlayer","data":{"targetId":"b","vx":1e300,"vy":0,"vz":0}}"#;
        assert!(room_command(huge).is_none());
        let missing_vz =
            r#"{"event":"throwNpc","data":{"npcIdx":1,"x":0,"y":0,"z":0,"vx":0,"vy":0}}"#;
        assert!(room_command(missing_vz).is_none());
    }

    #[test]
    fn parse_player_targeted_commands() {
        assert_eq!(
            room_command(r#"{"event":"grabPlayer","data":"conn_4"}"#),
            Some(RoomCommand::GrabPlayer {
                grabbed_id: "conn_4".to_string()
            })
        );
        assert_eq!(
            room_command(r#"{"event":"releasePlayer"}"#),
            Some(RoomCommand::ReleasePlayer)
        );
        assert_eq!(
            room_command(
                r#"{"event":"throwPlayer","data":{"grabbedId":"conn_4","vx":0,"vy":9,"vz":-3}}"#
            ),
            Some(RoomCommand::ThrowPlayer {
                grabbed_id: "conn_4".to_string(),
                velocity: Vec3::new(0.0, 9.0, -3.0),
            })
        );
    }

    #[test]
    fn parse_hit_reports() {
        assert_eq!(
            room_command(r#"{"event":"objectHitPlayer","data":{"objectIndex":12}}"#),
            Some(RoomCommand::ObjectHitPlayer { object_index: 12 })
        );
        assert_eq!(
            room_command(r#"{"event":"npcHitPlayer","data":{"npcIndex":4}}"#),
            Some(RoomCommand::NpcHitPlayer { npc_index: 4 })
        );
        assert_eq!(
            room_command(r#"{"event":"resetWorld"}"#),
            Some(RoomCommand::ResetWorld)
        );
    }
}
