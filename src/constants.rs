pub const SIM_RATE: u32 = 60;
pub const SIM_DT: f32 = 1.0 / SIM_RATE as f32;
pub const BROADCAST_MS: u64 = 50;

pub const WORLD_SEED: u32 = 12_345;

pub const GRAVITY: f32 = 28.0;
pub const DAMPING: f32 = 0.985;
pub const FLOOR_Y: f32 = 0.0;
/// Speed at or above which an impact removes a building collider.
pub const BREAK_SPEED: f32 = 55.0;
pub const BREAK_DAMPING: f32 = 0.4;

pub const FLOOR_BOUNCE: f32 = 0.35;
pub const FLOOR_FRICTION: f32 = 0.8;
pub const WALL_BOUNCE_Y: f32 = -0.25;
pub const WALL_BOUNCE_XZ: f32 = -0.3;
pub const PUSH_OUT_EPSILON: f32 = 0.01;

pub const OBJECT_COUNT: usize = 160;
pub const OBJECT_PLACEMENT_HALF_SPAN: f32 = 90.0;

pub const BLOCKS: i32 = 7;
pub const BLOCK_SPACING: f32 = 28.0;
pub const ROAD_HALF_WIDTH: f32 = 10.0;
pub const TOWER_ATTEMPTS: usize = 22;
pub const TOWER_CLEARANCE: f32 = 18.0;

pub const NPC_COUNT: usize = 20;
pub const NPC_SIZE: (f32, f32, f32) = (1.2, 2.4, 1.2);
pub const NPC_REST_Y: f32 = NPC_SIZE.1 * 0.5;
pub const NPC_AIR_DAMPING: f32 = 0.995;
pub const NPC_AIRBORNE_SPEED_SQ: f32 = 4.0;
pub const NPC_LANDING_BOUNCE: f32 = -0.3;
pub const NPC_LANDING_FRICTION: f32 = 0.7;
pub const NPC_WALL_BOUNCE: f32 = -0.4;
pub const NPC_SETTLE_SPEED: f32 = 1.5;
pub const NPC_SETTLE_HEIGHT: f32 = 0.05;
pub const NPC_PAUSE_CHANCE: f32 = 0.3;
pub const NPC_LEASH_RADIUS: f32 = 150.0;

pub const OBJECT_KNOCK_MIN_SPEED: f32 = 2.0;
pub const OBJECT_KNOCK_FACTOR: f32 = 0.8;
pub const OBJECT_KNOCK_MIN_MASS: f32 = 0.5;
pub const OBJECT_AFTER_KNOCK_DAMPING: f32 = 0.3;
pub const NPC_KNOCK_MIN_SPEED: f32 = 5.0;
pub const NPC_AFTER_KNOCK_DAMPING: f32 = 0.4;

pub const OBJECT_HIT_PLAYER_DAMPING: f32 = 0.25;
pub const NPC_HIT_PLAYER_DAMPING: f32 = 0.35;

pub const PLAYER_SPAWN: (f32, f32, f32) = (0.0, 2.0, 18.0);
pub const DEFAULT_DUCKTAG: &str = "Ducky1234";
pub const DUCKTAG_MAX_CHARS: usize = 24;
pub const DEFAULT_HOLD_DISTANCE: f32 = 6.0;
pub const DEFAULT_HOLD_HEIGHT: f32 = 5.0;
pub const DUCK_COLORS: [u32; 5] = [0xf5d547, 0x7dd3fc, 0xa3e635, 0xfb7185, 0xc084fc];

pub const ROOM_ID_LEN: usize = 4;
pub const ROOM_ID_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
