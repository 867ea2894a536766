use rand::Rng;
use tracing::debug;

use super::physics_system::break_building;
use super::utils::random_unit_xz;
use super::Room;
use crate::constants::{
    GRAVITY, NPC_AIRBORNE_SPEED_SQ, NPC_AIR_DAMPING, NPC_LANDING_BOUNCE, NPC_LANDING_FRICTION,
    NPC_LEASH_RADIUS, NPC_PAUSE_CHANCE, NPC_REST_Y, NPC_SETTLE_HEIGHT, NPC_SETTLE_SPEED,
    NPC_SIZE, NPC_WALL_BOUNCE, PUSH_OUT_EPSILON, SIM_DT,
};
use crate::geometry::{push_out, separation_axis_xz, Aabb, Axis, Vec3};
use crate::types::{Outbound, ServerEvent};
use crate::world::{normalize_xz, BuildingCollider, Npc, NpcState};

impl Npc {
    pub fn hitbox(&self) -> Aabb {
        Self::hitbox_at(self.position)
    }

    /// Fixed gameplay box, independent of whatever mesh the client draws.
    pub fn hitbox_at(position: Vec3) -> Aabb {
        let (x, y, z) = NPC_SIZE;
        Aabb::from_center(position, Vec3::new(x * 0.5, y * 0.5, z * 0.5))
    }

    /// Hands the NPC back to the simulation; the next step decides whether it
    /// is still flying or can walk again.
    pub(crate) fn release(&mut self) {
        self.state = NpcState::Airborne;
    }

    fn is_ballistic(&self) -> bool {
        self.position.y > NPC_REST_Y || self.velocity.length_sq() > NPC_AIRBORNE_SPEED_SQ
    }
}

impl Room {
    pub(super) fn step_npcs(&mut self, out: &mut Vec<Outbound>) {
        let room_id = &self.id;
        let colliders = &mut self.colliders;
        let rng = &mut self.rng;
        for npc in self.npcs.iter_mut() {
            if npc.is_grabbed() {
                continue;
            }
            if npc.is_ballistic() {
                if let Some(building_id) = step_airborne(npc, colliders, rng) {
                    debug!(room = %room_id, building_id, "building destroyed by npc");
                    out.push(Outbound::room(ServerEvent::BuildingDestroyed { building_id }));
                }
                continue;
            }
            if npc.state == NpcState::Airborne {
                settle(npc, rng);
            }
            step_wandering(npc, colliders, rng);
        }
    }
}

fn step_airborne<R: Rng>(
    npc: &mut Npc,
    colliders: &mut Vec<BuildingCollider>,
    rng: &mut R,
) -> Option<u32> {
    npc.state = NpcState::Airborne;
    npc.velocity.y -= GRAVITY * SIM_DT;
    npc.velocity *= NPC_AIR_DAMPING;
    npc.position += npc.velocity * SIM_DT;

    let destroyed = break_building(npc.hitbox(), &mut npc.velocity, colliders);

    let hitbox = npc.hitbox();
    if let Some(collider) = colliders
        .iter()
        .find(|collider| hitbox.intersects(&collider.bounds))
    {
        let overlap = hitbox.overlap(&collider.bounds);
        let (min, max) = (collider.bounds.min, collider.bounds.max);
        match separation_axis_xz(overlap) {
            Axis::X => {
                npc.position.x +=
                    push_out(npc.position.x, min.x, max.x, overlap.x + PUSH_OUT_EPSILON);
                npc.velocity.x *= NPC_WALL_BOUNCE;
            }
            _ => {
                npc.position.z +=
                    push_out(npc.position.z, min.z, max.z, overlap.z + PUSH_OUT_EPSILON);
                npc.velocity.z *= NPC_WALL_BOUNCE;
            }
        }
    }

    if npc.position.y < NPC_REST_Y {
        npc.position.y = NPC_REST_Y;
        if npc.velocity.y < 0.0 {
            npc.velocity.y *= NPC_LANDING_BOUNCE;
        }
        npc.velocity.x *= NPC_LANDING_FRICTION;
        npc.velocity.z *= NPC_LANDING_FRICTION;
    }

    if npc.position.y <= NPC_REST_Y + NPC_SETTLE_HEIGHT && npc.velocity.length() < NPC_SETTLE_SPEED
    {
        settle(npc, rng);
    }

    destroyed
}

fn settle<R: Rng>(npc: &mut Npc, rng: &mut R) {
    npc.velocity = Vec3::ZERO;
    npc.state = NpcState::Wandering {
        timer: rng.random_range(0.5..2.0),
    };
}

fn step_wandering<R: Rng>(npc: &mut Npc, colliders: &[BuildingCollider], rng: &mut R) {
    let (mut timer, mut pause) = match npc.state {
        NpcState::Wandering { timer } => (timer, None),
        NpcState::Paused {
            timer,
            wander_timer,
        } => (wander_timer, Some(timer)),
        NpcState::Airborne | NpcState::Grabbed { .. } => return,
    };

    timer -= SIM_DT;
    if timer <= 0.0 {
        if pause.is_none() && rng.random::<f32>() < NPC_PAUSE_CHANCE {
            pause = Some(rng.random_range(1.0..3.0));
        } else {
            pause = None;
            let (dir_x, dir_z) = random_unit_xz(rng);
            npc.heading.dir_x = dir_x;
            npc.heading.dir_z = dir_z;
            npc.heading.speed = rng.random_range(2.5..5.0);
        }
        timer = rng.random_range(1.5..5.0);
    }

    if let Some(remaining) = pause {
        let remaining = remaining - SIM_DT;
        npc.state = if remaining <= 0.0 {
            NpcState::Wandering { timer }
        } else {
            NpcState::Paused {
                timer: remaining,
                wander_timer: timer,
            }
        };
        return;
    }

    let step = npc.heading.speed * SIM_DT;
    let next = Vec3::new(
        npc.position.x + npc.heading.dir_x * step,
        NPC_REST_Y,
        npc.position.z + npc.heading.dir_z * step,
    );
    let next_box = Npc::hitbox_at(next);
    if colliders
        .iter()
        .any(|collider| next_box.intersects(&collider.bounds))
    {
        let (dir_x, dir_z) = random_unit_xz(rng);
        npc.heading.dir_x = dir_x;
        npc.heading.dir_z = dir_z;
        timer = rng.random_range(0.5..2.0);
    } else {
        npc.position.x = next.x;
        npc.position.z = next.z;
    }

    if npc.position.x.abs() > NPC_LEASH_RADIUS || npc.position.z.abs() > NPC_LEASH_RADIUS {
        let (dir_x, dir_z) = normalize_xz(-npc.position.x, -npc.position.z);
        npc.heading.dir_x = dir_x;
        npc.heading.dir_z = dir_z;
    }

    npc.state = NpcState::Wandering { timer };
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;
    use crate::engine::test_support::{clear_city, room_with_players};
    use crate::world::Heading;

    fn walker(x: f32, z: f32, timer: f32) -> Npc {
        Npc {
            position: Vec3::new(x, NPC_REST_Y, z),
            velocity: Vec3::ZERO,
            heading: Heading {
                dir_x: 1.0,
                dir_z: 0.0,
                speed: 3.0,
            },
            state: NpcState::Wandering { timer },
        }
    }

    fn wall(id: u32, min: Vec3, max: Vec3) -> BuildingCollider {
        BuildingCollider {
            id,
            bounds: Aabb::new(min, max),
        }
    }

    #[test]
    fn wandering_npc_walks_along_heading() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut npc = walker(0.0, 0.0, 3.0);
        step_wandering(&mut npc, &[], &mut rng);
        assert!((npc.position.x - 3.0 * SIM_DT).abs() < 1e-6);
        assert_eq!(npc.position.z, 0.0);
        assert!(matches!(
            npc.state,
            NpcState::Wandering { timer } if (timer - (3.0 - SIM_DT)).abs() < 1e-6
        ));
    }

    #[test]
    fn expired_timer_either_pauses_or_turns() {
        let mut paused = 0;
        let mut turned = 0;
        for seed in 0..200u64 {
            let mut rng = StdRng::seed_from_u64(seed);
            let mut npc = walker(0.0, 0.0, 0.001);
            step_wandering(&mut npc, &[], &mut rng);
            match npc.state {
                NpcState::Paused {
                    timer,
                    wander_timer,
                } => {
                    paused += 1;
                    assert_eq!(npc.position.x, 0.0);
                    assert!(timer > 0.9 && timer < 3.0);
                    assert!((1.5..5.0).contains(&wander_timer));
                }
                NpcState::Wandering { timer } => {
                    turned += 1;
                    assert!((1.5..5.0).contains(&timer));
                    assert!((2.5..5.0).contains(&npc.heading.speed));
                }
                ref other => panic!("unexpected state {other:?}"),
            }
        }
        assert!(paused > 20, "paused {paused} times");
        assert!(turned > paused);
    }

    #[test]
    fn paused_npc_stays_put_until_pause_ends() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut npc = walker(2.0, 2.0, 0.0);
        npc.state = NpcState::Paused {
            timer: 2.5 * SIM_DT,
            wander_timer: 4.0,
        };
        step_wandering(&mut npc, &[], &mut rng);
        assert!(matches!(npc.state, NpcState::Paused { .. }));
        step_wandering(&mut npc, &[], &mut rng);
        step_wandering(&mut npc, &[], &mut rng);
        assert!(matches!(npc.state, NpcState::Wandering { .. }));
        assert_eq!(npc.position, Vec3::new(2.0, NPC_REST_Y, 2.0));

        step_wandering(&mut npc, &[], &mut rng);
        assert!(npc.position.x > 2.0);
    }

    #[test]
    fn blocked_move_is_rejected_and_rearms_short_timer() {
        let mut rng = StdRng::seed_from_u64(9);
        let colliders = vec![wall(0, Vec3::new(0.61, 0.0, -5.0), Vec3::new(5.0, 10.0, 5.0))];
        let mut npc = walker(0.0, 0.0, 4.0);
        step_wandering(&mut npc, &colliders, &mut rng);
        assert_eq!(npc.position.x, 0.0);
        assert!(matches!(npc.state, NpcState::Wandering { timer } if (0.5..2.0).contains(&timer)));
        let len = (npc.heading.dir_x.powi(2) + npc.heading.dir_z.powi(2)).sqrt();
        assert!((len - 1.0).abs() < 1e-4);
    }

    #[test]
    fn stray_npc_is_turned_back_toward_origin() {
        let mut rng = StdRng::seed_from_u64(2);
        let mut npc = walker(NPC_LEASH_RADIUS + 5.0, 0.0, 4.0);
        step_wandering(&mut npc, &[], &mut rng);
        assert!((npc.heading.dir_x + 1.0).abs() < 1e-6);
        assert!(npc.heading.dir_z.abs() < 1e-6);
    }

    #[test]
    fn airborne_npc_lands_and_resumes_wandering() {
        let mut room = room_with_players(&[]);
        clear_city(&mut room);
        room.npcs[0].position = Vec3::new(1_000.0, 6.0, 1_000.0);
        room.npcs[0].velocity = Vec3::new(3.0, 0.0, 0.0);
        room.step();
        assert_eq!(room.npcs[0].state, NpcState::Airborne);
        assert!(room.npcs[0].position.y < 6.0);

        for _ in 0..600 {
            room.step();
        }
        let npc = &room.npcs[0];
        assert!(matches!(npc.state, NpcState::Wandering { .. } | NpcState::Paused { .. }));
        assert_eq!(npc.velocity, Vec3::ZERO);
        assert_eq!(npc.position.y, NPC_REST_Y);
    }

    #[test]
    fn airborne_npc_is_pushed_out_on_the_ground_plane() {
        let mut rng = StdRng::seed_from_u64(4);
        let mut colliders = vec![wall(3, Vec3::new(0.0, 0.0, -10.0), Vec3::new(10.0, 20.0, 10.0))];
        let mut npc = walker(-0.5, 0.0, 1.0);
        npc.position.y = 5.0;
        npc.velocity = Vec3::new(6.0, 0.0, 0.0);
        let destroyed = step_airborne(&mut npc, &mut colliders, &mut rng);
        assert_eq!(destroyed, None);
        assert!(npc.position.x < -0.6);
        assert!(npc.velocity.x < 0.0);
        assert_eq!(colliders.len(), 1);
    }

    #[test]
    fn fast_npc_breaks_only_one_building_per_step() {
        let mut room = room_with_players(&["a"]);
        clear_city(&mut room);
        room.colliders
            .push(wall(40, Vec3::new(-5.0, 0.0, -5.0), Vec3::new(5.0, 30.0, 5.0)));
        room.colliders
            .push(wall(41, Vec3::new(-4.0, 0.0, -4.0), Vec3::new(4.0, 30.0, 4.0)));
        room.npcs[0].position = Vec3::new(0.0, 10.0, 0.0);
        room.npcs[0].velocity = Vec3::new(70.0, 0.0, 0.0);

        let out = room.step();
        let destroyed: Vec<_> = out
            .iter()
            .filter(|o| matches!(o.event, ServerEvent::BuildingDestroyed { .. }))
            .collect();
        assert_eq!(destroyed.len(), 1);
        assert_eq!(room.colliders.len(), 1);
        assert_eq!(room.colliders[0].id, 40);
    }

    #[test]
    fn grabbed_npc_is_frozen_in_place() {
        let mut room = room_with_players(&["a"]);
        clear_city(&mut room);
        room.grab_npc("a", 0);
        room.npcs[0].position = Vec3::new(1_000.0, 9.0, 1_000.0);
        for _ in 0..30 {
            room.step();
        }
        assert_eq!(room.npcs[0].position, Vec3::new(1_000.0, 9.0, 1_000.0));
    }
}
