use rand::Rng;
use serde::Serialize;

use crate::constants::{
    BLOCKS, BLOCK_SPACING, NPC_COUNT, NPC_REST_Y, OBJECT_COUNT, OBJECT_PLACEMENT_HALF_SPAN,
    ROAD_HALF_WIDTH, TOWER_ATTEMPTS, TOWER_CLEARANCE,
};
use crate::geometry::{Aabb, Vec3};
use crate::rng::SeededRng;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    Crate,
    Cylinder,
    Slab,
}

impl ObjectKind {
    fn from_roll(roll: f32) -> Self {
        if roll < 0.55 {
            Self::Crate
        } else if roll < 0.85 {
            Self::Cylinder
        } else {
            Self::Slab
        }
    }
}

#[derive(Clone, Debug)]
pub struct PhysicsObject {
    pub id: usize,
    pub kind: ObjectKind,
    pub position: Vec3,
    pub velocity: Vec3,
    pub mass: f32,
    /// Full extents; collision boxes use half of this.
    pub size: Vec3,
    pub held_by: Option<String>,
}

impl PhysicsObject {
    pub fn bounds(&self) -> Aabb {
        Aabb::from_center(self.position, self.size * 0.5)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BuildingCollider {
    pub id: u32,
    #[serde(flatten)]
    pub bounds: Aabb,
}

/// Horizontal walking intent kept across every NPC state so a knocked-over
/// NPC resumes the way it was heading.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Heading {
    pub dir_x: f32,
    pub dir_z: f32,
    pub speed: f32,
}

#[derive(Clone, Debug, PartialEq)]
pub enum NpcState {
    Wandering {
        timer: f32,
    },
    Paused {
        timer: f32,
        /// The direction-change countdown keeps running while paused.
        wander_timer: f32,
    },
    Airborne,
    Grabbed {
        by: String,
    },
}

#[derive(Clone, Debug)]
pub struct Npc {
    pub position: Vec3,
    pub velocity: Vec3,
    pub heading: Heading,
    pub state: NpcState,
}

impl Npc {
    pub fn grabbed_by(&self) -> Option<&str> {
        match &self.state {
            NpcState::Grabbed { by } => Some(by.as_str()),
            _ => None,
        }
    }

    pub fn is_grabbed(&self) -> bool {
        matches!(self.state, NpcState::Grabbed { .. })
    }
}

/// Block and tower maths runs in f64, the client's number type, and each
/// bound is rounded to f32 once so both sides land on the same boxes.
pub fn generate_building_colliders(seed: u32) -> Vec<BuildingCollider> {
    let mut rng = SeededRng::new(seed);
    let mut colliders = Vec::new();
    let mut next_id = 0u32;
    let road = f64::from(ROAD_HALF_WIDTH);

    for bx in -BLOCKS..=BLOCKS {
        for bz in -BLOCKS..=BLOCKS {
            let px = f64::from(bx) * f64::from(BLOCK_SPACING);
            let pz = f64::from(bz) * f64::from(BLOCK_SPACING);
            if px.abs() < road || pz.abs() < road {
                continue;
            }
            let count = 3 + rng.below(4);
            for _ in 0..count {
                let w = rng.range_f64(6.0, 14.0);
                let d = rng.range_f64(6.0, 14.0);
                let h = rng.range_f64(10.0, 42.0);
                let cx = px + rng.range_f64(-8.0, 8.0);
                let cz = pz + rng.range_f64(-8.0, 8.0);
                colliders.push(footprint(next_id, cx, cz, w, d, h));
                next_id += 1;
            }
        }
    }

    let clearance = f64::from(TOWER_CLEARANCE);
    for _ in 0..TOWER_ATTEMPTS {
        let x = rng.range_f64(-140.0, 140.0);
        let z = rng.range_f64(-140.0, 140.0);
        if x.abs() < clearance || z.abs() < clearance {
            continue;
        }
        let w = rng.range_f64(10.0, 22.0);
        let d = rng.range_f64(10.0, 22.0);
        let h = rng.range_f64(45.0, 95.0);
        colliders.push(footprint(next_id, x, z, w, d, h));
        next_id += 1;
    }

    colliders
}

fn footprint(id: u32, cx: f64, cz: f64, w: f64, d: f64, h: f64) -> BuildingCollider {
    BuildingCollider {
        id,
        bounds: Aabb::new(
            Vec3::new((cx - w / 2.0) as f32, 0.0, (cz - d / 2.0) as f32),
            Vec3::new((cx + w / 2.0) as f32, h as f32, (cz + d / 2.0) as f32),
        ),
    }
}

/// Category, size and mass follow the seeded stream; placement draws from
/// `placement` so fresh layouts do not spawn stacked on top of each other.
pub fn generate_object_layout<R: Rng>(seed: u32, placement: &mut R) -> Vec<PhysicsObject> {
    let mut rng = SeededRng::new(seed);
    let span = OBJECT_PLACEMENT_HALF_SPAN;
    (0..OBJECT_COUNT)
        .map(|id| {
            let kind = ObjectKind::from_roll(rng.next_f32());
            let x = placement.random_range(-span..span);
            let z = placement.random_range(-span..span);
            let y = placement.random_range(1.2..2.4);

            let (size, mass) = match kind {
                ObjectKind::Crate => {
                    let sx = rng.range(0.6, 1.4);
                    let sy = rng.range(0.6, 1.6);
                    let sz = rng.range(0.6, 1.4);
                    (Vec3::new(sx, sy, sz), rng.range(0.8, 2.5))
                }
                ObjectKind::Cylinder => {
                    let radius = rng.range(0.25, 0.55);
                    let height = rng.range(0.8, 1.8);
                    (
                        Vec3::new(radius * 2.0, height, radius * 2.0),
                        rng.range(0.6, 1.6),
                    )
                }
                ObjectKind::Slab => {
                    let sx = rng.range(1.5, 2.8);
                    let sy = rng.range(0.7, 1.2);
                    let sz = rng.range(2.4, 4.8);
                    (Vec3::new(sx, sy, sz), rng.range(2.5, 6.0))
                }
            };

            PhysicsObject {
                id,
                kind,
                position: Vec3::new(x, y, z),
                velocity: Vec3::ZERO,
                mass,
                size,
                held_by: None,
            }
        })
        .collect()
}

pub fn spawn_npcs(seed: u32) -> Vec<Npc> {
    let mut rng = SeededRng::new(seed);
    (0..NPC_COUNT)
        .map(|_| {
            let x = rng.range(-80.0, 80.0);
            let z = rng.range(-80.0, 80.0);
            let dx = rng.range(-1.0, 1.0);
            let dz = rng.range(-1.0, 1.0);
            let timer = rng.range(1.0, 4.0);
            let speed = rng.range(2.5, 5.0);
            let (dir_x, dir_z) = normalize_xz(dx, dz);
            Npc {
                position: Vec3::new(x, NPC_REST_Y, z),
                velocity: Vec3::ZERO,
                heading: Heading {
                    dir_x,
                    dir_z,
                    speed,
                },
                state: NpcState::Wandering { timer },
            }
        })
        .collect()
}

pub(crate) fn normalize_xz(x: f32, z: f32) -> (f32, f32) {
    let len = (x * x + z * z).sqrt();
    if len == 0.0 {
        (x, z)
    } else {
        (x / len, z / len)
    }
}
