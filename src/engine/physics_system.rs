use tracing::debug;

use super::Room;
use crate::constants::{
    BREAK_DAMPING, BREAK_SPEED, DAMPING, FLOOR_BOUNCE, FLOOR_FRICTION, FLOOR_Y, GRAVITY,
    NPC_AFTER_KNOCK_DAMPING, NPC_KNOCK_MIN_SPEED, OBJECT_AFTER_KNOCK_DAMPING,
    OBJECT_KNOCK_FACTOR, OBJECT_KNOCK_MIN_MASS, OBJECT_KNOCK_MIN_SPEED, PUSH_OUT_EPSILON,
    SIM_DT, WALL_BOUNCE_XZ, WALL_BOUNCE_Y,
};
use crate::geometry::{push_out, separation_axis, Aabb, Axis, Vec3};
use crate::types::{Outbound, ServerEvent};
use crate::world::{BuildingCollider, PhysicsObject};

const OBJECT_KNOCK_LIFT: f32 = 4.0;
const OBJECT_KNOCK_LIFT_PER_SPEED: f32 = 0.2;
const NPC_KNOCK_SCALE: f32 = 0.6;
const NPC_KNOCK_LIFT: f32 = 3.0;
const NPC_KNOCK_LIFT_PER_SPEED: f32 = 0.15;

impl Room {
    pub(super) fn integrate_objects(&mut self, out: &mut Vec<Outbound>) {
        let room_id = &self.id;
        let colliders = &mut self.colliders;
        for object in self.objects.iter_mut() {
            // The holder streams this object's position; integrating would fight it.
            if object.held_by.is_some() {
                continue;
            }
            object.velocity.y -= GRAVITY * SIM_DT;
            object.velocity *= DAMPING;
            object.position += object.velocity * SIM_DT;

            if let Some(building_id) =
                break_building(object.bounds(), &mut object.velocity, colliders)
            {
                debug!(
                    room = %room_id,
                    building_id,
                    object = object.id,
                    "building destroyed by object"
                );
                out.push(Outbound::room(ServerEvent::BuildingDestroyed { building_id }));
            }
            resolve_object_collisions(object, colliders);
        }
    }

    pub(super) fn resolve_object_npc_impacts(&mut self) {
        for object in self.objects.iter_mut() {
            let speed = object.velocity.length();
            if speed < OBJECT_KNOCK_MIN_SPEED {
                continue;
            }
            let bounds = object.bounds();
            let Some(npc) = self
                .npcs
                .iter_mut()
                .find(|npc| !npc.is_grabbed() && bounds.intersects(&npc.hitbox()))
            else {
                continue;
            };

            let scale = OBJECT_KNOCK_FACTOR / object.mass.max(OBJECT_KNOCK_MIN_MASS);
            let lift = OBJECT_KNOCK_LIFT + speed * OBJECT_KNOCK_LIFT_PER_SPEED;
            npc.velocity += Vec3::new(
                object.velocity.x * scale,
                (object.velocity.y * scale).max(lift),
                object.velocity.z * scale,
            );
            object.velocity *= OBJECT_AFTER_KNOCK_DAMPING;
        }
    }

    pub(super) fn resolve_npc_npc_impacts(&mut self) {
        for mover in 0..self.npcs.len() {
            let velocity = self.npcs[mover].velocity;
            let speed = velocity.length();
            if speed < NPC_KNOCK_MIN_SPEED {
                continue;
            }
            let hitbox = self.npcs[mover].hitbox();
            let target = self.npcs.iter().enumerate().position(|(index, other)| {
                index != mover && !other.is_grabbed() && hitbox.intersects(&other.hitbox())
            });
            let Some(target) = target else {
                continue;
            };

            let knock = NPC_KNOCK_SCALE * speed;
            let push = velocity * (NPC_KNOCK_SCALE / speed * knock);
            let lift = NPC_KNOCK_LIFT + speed * NPC_KNOCK_LIFT_PER_SPEED;
            self.npcs[target].velocity += Vec3::new(push.x, push.y.max(lift), push.z);
            self.npcs[mover].velocity *= NPC_AFTER_KNOCK_DAMPING;
        }
    }
}

/// Removes at most one collider hit at or above [`BREAK_SPEED`], scanning from
/// the most recently generated collider backwards, and damps `velocity`.
pub(super) fn break_building(
    bounds: Aabb,
    velocity: &mut Vec3,
    colliders: &mut Vec<BuildingCollider>,
) -> Option<u32> {
    if velocity.length() < BREAK_SPEED {
        return None;
    }
    let index = colliders
        .iter()
        .rposition(|collider| bounds.intersects(&collider.bounds))?;
    let removed = colliders.remove(index);
    *velocity *= BREAK_DAMPING;
    Some(removed.id)
}

fn resolve_object_collisions(object: &mut PhysicsObject, colliders: &[BuildingCollider]) {
    let half_y = object.size.y * 0.5;
    if object.position.y - half_y < FLOOR_Y {
        object.position.y = FLOOR_Y + half_y;
        if object.velocity.y < 0.0 {
            object.velocity.y *= FLOOR_BOUNCE;
        }
        object.velocity.x *= FLOOR_FRICTION;
        object.velocity.z *= FLOOR_FRICTION;
    }

    let mut bounds = object.bounds();
    for collider in colliders {
        if !bounds.intersects(&collider.bounds) {
            continue;
        }
        let overlap = bounds.overlap(&collider.bounds);
        let (min, max) = (collider.bounds.min, collider.bounds.max);
        match separation_axis(overlap) {
            Axis::Y => {
                object.position.y +=
                    push_out(object.position.y, min.y, max.y, overlap.y + PUSH_OUT_EPSILON);
                object.velocity.y *= WALL_BOUNCE_Y;
            }
            Axis::X => {
                object.position.x +=
                    push_out(object.position.x, min.x, max.x, overlap.x + PUSH_OUT_EPSILON);
                object.velocity.x *= WALL_BOUNCE_XZ;
            }
            Axis::Z => {
                object.position.z +=
                    push_out(object.position.z, min.z, max.z, overlap.z + PUSH_OUT_EPSILON);
                object.velocity.z *= WALL_BOUNCE_XZ;
            }
        }
        bounds = object.bounds();
    }
}
