use std::collections::HashSet;

use clap::Parser;
use duck_sandbox_server::constants::SIM_RATE;
use duck_sandbox_server::engine::Room;
use duck_sandbox_server::geometry::Vec3;
use duck_sandbox_server::room_store::RoomStore;
use duck_sandbox_server::types::{RoomCommand, ServerEvent};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Ticks between two throws in the same room.
const THROW_INTERVAL_TICKS: u64 = 90;

#[derive(Parser, Debug)]
#[command(author, version, about = "Headless soak run of the sandbox simulation")]
struct Cli {
    #[arg(long, default_value_t = 4)]
    rooms: usize,
    #[arg(long, default_value_t = 30)]
    seconds: u64,
    #[arg(long, default_value_t = 70.0)]
    throw_speed: f32,
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Clone, Debug, Serialize)]
struct AnomalyRecord {
    tick: u64,
    message: String,
}

#[derive(Clone, Debug, Serialize)]
struct RoomResultLine {
    #[serde(rename = "roomId")]
    room_id: String,
    ticks: u64,
    throws: usize,
    #[serde(rename = "npcThrows")]
    npc_throws: usize,
    #[serde(rename = "buildingsDestroyed")]
    buildings_destroyed: usize,
    #[serde(rename = "collidersLeft")]
    colliders_left: usize,
    anomalies: Vec<AnomalyRecord>,
}

#[derive(Clone, Debug, Serialize)]
struct RunSummary {
    seed: u64,
    #[serde(rename = "roomCount")]
    room_count: usize,
    ticks: u64,
    #[serde(rename = "buildingsDestroyed")]
    buildings_destroyed: usize,
    #[serde(rename = "anomalyCount")]
    anomaly_count: usize,
}

struct SimRoom {
    room_id: String,
    thrower: String,
    carrier: String,
    throws: usize,
    npc_throws: usize,
    buildings_destroyed: usize,
    anomalies: Vec<AnomalyRecord>,
    anomaly_seen: HashSet<String>,
}

impl SimRoom {
    fn push_anomaly(&mut self, tick: u64, message: String) {
        if self.anomaly_seen.insert(message.clone()) {
            warn!(room_id = %self.room_id, tick, %message, "anomaly detected");
            self.anomalies.push(AnomalyRecord { tick, message });
        }
    }
}

fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let seed = cli.seed.unwrap_or_else(|| rand::rng().random());
    let ticks = cli.seconds * u64::from(SIM_RATE);
    info!(seed, rooms = cli.rooms, ticks, "soak started");

    let mut rng = StdRng::seed_from_u64(seed);
    let mut store = RoomStore::new();
    let mut sims = Vec::with_capacity(cli.rooms);
    for index in 0..cli.rooms {
        let thrower = format!("sim_{index}_a");
        let carrier = format!("sim_{index}_b");
        let (room_id, _) =
            store.create_room_with_rng(&thrower, format!("Thrower{index}"), &mut rng);
        store.join_room(&room_id, &carrier, format!("Carrier{index}"))?;
        sims.push(SimRoom {
            room_id,
            thrower,
            carrier,
            throws: 0,
            npc_throws: 0,
            buildings_destroyed: 0,
            anomalies: Vec::new(),
            anomaly_seen: HashSet::new(),
        });
    }

    for tick in 1..=ticks {
        if tick % THROW_INTERVAL_TICKS == 0 {
            for sim in &mut sims {
                let Some(room) = store.get_mut(&sim.room_id) else {
                    continue;
                };
                let cycle = (tick / THROW_INTERVAL_TICKS) as usize;
                if throw_object_at_building(room, &sim.thrower, cycle, cli.throw_speed) {
                    sim.throws += 1;
                }
                if throw_npc(room, &sim.carrier, cycle, &mut rng) {
                    sim.npc_throws += 1;
                }
            }
        }

        for (room_id, outbound) in store.step_all() {
            let destroyed = outbound
                .iter()
                .filter(|message| matches!(message.event, ServerEvent::BuildingDestroyed { .. }))
                .count();
            if let Some(sim) = sims.iter_mut().find(|sim| sim.room_id == room_id) {
                sim.buildings_destroyed += destroyed;
            }
        }

        for sim in &mut sims {
            let Some(room) = store.get(&sim.room_id) else {
                sim.push_anomaly(tick, "room disappeared while occupied".to_string());
                continue;
            };
            for message in collect_room_anomalies(room) {
                sim.push_anomaly(tick, message);
            }
        }
    }

    let mut total_destroyed = 0;
    let mut total_anomalies = 0;
    for sim in &sims {
        let line = RoomResultLine {
            room_id: sim.room_id.clone(),
            ticks,
            throws: sim.throws,
            npc_throws: sim.npc_throws,
            buildings_destroyed: sim.buildings_destroyed,
            colliders_left: store
                .get(&sim.room_id)
                .map(|room| room.colliders.len())
                .unwrap_or(0),
            anomalies: sim.anomalies.clone(),
        };
        total_destroyed += line.buildings_destroyed;
        total_anomalies += line.anomalies.len();
        println!("{}", serde_json::to_string(&line)?);
    }

    let summary = RunSummary {
        seed,
        room_count: sims.len(),
        ticks,
        buildings_destroyed: total_destroyed,
        anomaly_count: total_anomalies,
    };
    println!("{}", serde_json::to_string(&summary)?);
    info!(
        buildings_destroyed = total_destroyed,
        anomalies = total_anomalies,
        "soak finished"
    );

    if total_anomalies > 0 {
        std::process::exit(1);
    }
    Ok(())
}

/// Grabs an object, carries it next to the first standing building and
/// throws it straight at the building's west face.
fn throw_object_at_building(room: &mut Room, player_id: &str, cycle: usize, speed: f32) -> bool {
    if room.objects.is_empty() {
        return false;
    }
    let Some(target) = room.colliders.first().map(|collider| collider.bounds) else {
        return false;
    };
    let object_id = cycle % room.objects.len();
    if room
        .apply_command(player_id, RoomCommand::Grab { object_id })
        .is_empty()
    {
        return false;
    }

    let center = target.center();
    let release_at = Vec3::new(target.min.x - 4.0, center.y.clamp(2.0, 6.0), center.z);
    room.apply_command(
        player_id,
        RoomCommand::HeldObjectPos {
            object_id,
            position: release_at,
        },
    );
    !room
        .apply_command(
            player_id,
            RoomCommand::Throw {
                object_id,
                velocity: Vec3::new(speed, 2.0, 0.0),
                release_at: Some(release_at),
            },
        )
        .is_empty()
}

fn throw_npc(room: &mut Room, player_id: &str, cycle: usize, rng: &mut StdRng) -> bool {
    if room.npcs.is_empty() {
        return false;
    }
    let npc_idx = cycle % room.npcs.len();
    if room
        .apply_command(player_id, RoomCommand::GrabNpc { npc_idx })
        .is_empty()
    {
        return false;
    }
    let position = room.npcs[npc_idx].position + Vec3::new(0.0, 4.0, 0.0);
    let velocity = Vec3::new(
        rng.random_range(-20.0..20.0),
        rng.random_range(5.0..15.0),
        rng.random_range(-20.0..20.0),
    );
    !room
        .apply_command(
            player_id,
            RoomCommand::ThrowNpc {
                npc_idx,
                position,
                velocity,
            },
        )
        .is_empty()
}

fn collect_room_anomalies(room: &Room) -> Vec<String> {
    let mut anomalies = Vec::new();
    if let Some(violation) = room.ownership_violation() {
        anomalies.push(violation);
    }
    for object in &room.objects {
        if !object.position.is_finite() || !object.velocity.is_finite() {
            anomalies.push(format!("object {} has non-finite state", object.id));
        }
    }
    for (npc_idx, npc) in room.npcs.iter().enumerate() {
        if !npc.position.is_finite() || !npc.velocity.is_finite() {
            anomalies.push(format!("npc {npc_idx} has non-finite state"));
        }
    }
    anomalies
}
