use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use clap::Parser;
use duck_sandbox_server::constants::{BROADCAST_MS, SIM_RATE};
use duck_sandbox_server::room_store::RoomStore;
use duck_sandbox_server::server_protocol::{parse_client_message, ClientCommand};
use duck_sandbox_server::types::{Audience, Outbound, ServerEvent};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::sync::{mpsc, Mutex};
use tokio::time::MissedTickBehavior;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

const CLIENT_QUEUE_CAPACITY: usize = 256;

type SharedState = Arc<Mutex<ServerState>>;

#[derive(Debug, Parser)]
#[command(name = "duck-sandbox-server", about = "Multiplayer physics sandbox server")]
struct Cli {
    #[arg(long, env = "PORT", default_value_t = 3000)]
    port: u16,
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    host: String,
}

#[derive(Clone)]
struct ClientContext {
    tx: mpsc::Sender<String>,
    room_id: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum QueuePolicy {
    DropOnFull,
    DisconnectOnFull,
}

struct ServerState {
    clients: HashMap<String, ClientContext>,
    rooms: RoomStore,
}

impl ServerState {
    fn new() -> Self {
        Self {
            clients: HashMap::new(),
            rooms: RoomStore::new(),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    let state = Arc::new(Mutex::new(ServerState::new()));
    start_simulation_loop(state.clone());
    start_broadcast_loop(state.clone());

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/ws", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let bind_addr = format!("{}:{}", cli.host, cli.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;

    info!(addr = %bind_addr, "listening");
    axum::serve(listener, app)
        .await
        .context("server runtime failed")?;
    Ok(())
}

async fn healthz() -> impl IntoResponse {
    Json(json!({ "ok": true }))
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<SharedState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(state, socket))
}

async fn handle_socket(state: SharedState, socket: WebSocket) {
    let client_id = make_id("conn");
    let (tx, mut rx) = mpsc::channel::<String>(CLIENT_QUEUE_CAPACITY);

    {
        let mut guard = state.lock().await;
        guard
            .clients
            .insert(client_id.clone(), ClientContext { tx, room_id: None });
    }
    debug!(client_id = %client_id, "connected");

    // The registry owns the only sender, so removing the client ends this task.
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let writer = tokio::spawn(async move {
        while let Some(payload) = rx.recv().await {
            if ws_sender.send(Message::Text(payload.into())).await.is_err() {
                break;
            }
        }
        let _ = ws_sender.close().await;
    });

    while let Some(received) = ws_receiver.next().await {
        let Ok(message) = received else {
            break;
        };

        match message {
            Message::Text(raw) => {
                handle_client_message(&state, &client_id, raw.as_str()).await;
            }
            Message::Binary(raw) => match std::str::from_utf8(&raw) {
                Ok(text) => handle_client_message(&state, &client_id, text).await,
                Err(_) => debug!(client_id = %client_id, "ignored non-utf8 frame"),
            },
            Message::Close(_) => break,
            _ => {}
        }
    }

    handle_disconnect(&state, &client_id).await;
    let _ = writer.await;
}

async fn handle_client_message(state: &SharedState, client_id: &str, raw: &str) {
    let Some(frame) = parse_client_message(raw) else {
        debug!(client_id, "ignored malformed frame");
        return;
    };

    let mut guard = state.lock().await;
    let state = &mut *guard;
    if !state.clients.contains_key(client_id) {
        return;
    }

    match frame.command {
        ClientCommand::ListRooms => {
            let Some(ack) = frame.ack else {
                return;
            };
            let reply = json!({
                "event": "ack",
                "id": ack,
                "data": state.rooms.list_rooms(),
            });
            send_json(state, client_id, &reply, QueuePolicy::DisconnectOnFull);
        }
        ClientCommand::CreateRoom { ducktag } => {
            leave_current_room(state, client_id);
            let (room_id, outbound) = state.rooms.create_room(client_id, ducktag);
            set_client_room(state, client_id, Some(room_id.clone()));
            dispatch(state, &room_id, outbound, QueuePolicy::DisconnectOnFull);
        }
        ClientCommand::JoinRoom { room_id, ducktag } => {
            if current_room(state, client_id).as_deref() == Some(room_id.as_str()) {
                // Membership stays as is; the caller just gets a fresh init.
                if let Some(room) = state.rooms.get(&room_id) {
                    let reply = Outbound::to(client_id, room.init_event(client_id));
                    dispatch(state, &room_id, vec![reply], QueuePolicy::DisconnectOnFull);
                }
                return;
            }
            if state.rooms.contains(&room_id) {
                leave_current_room(state, client_id);
            }
            match state.rooms.join_room(&room_id, client_id, ducktag) {
                Ok(outbound) => {
                    set_client_room(state, client_id, Some(room_id.clone()));
                    dispatch(state, &room_id, outbound, QueuePolicy::DisconnectOnFull);
                }
                Err(err) => {
                    debug!(client_id, %err, "join rejected");
                    let reply = Outbound::to(client_id, ServerEvent::RoomNotFound);
                    dispatch(state, &room_id, vec![reply], QueuePolicy::DisconnectOnFull);
                }
            }
        }
        ClientCommand::LeaveRoom => leave_current_room(state, client_id),
        ClientCommand::Room(command) => {
            let Some(room_id) = current_room(state, client_id) else {
                return;
            };
            let Some(room) = state.rooms.get_mut(&room_id) else {
                return;
            };
            let outbound = room.apply_command(client_id, command);
            dispatch(state, &room_id, outbound, QueuePolicy::DisconnectOnFull);
        }
    }
}

async fn handle_disconnect(state: &SharedState, client_id: &str) {
    let mut guard = state.lock().await;
    disconnect_client_internal(&mut guard, client_id);
    debug!(client_id, "disconnected");
}

fn disconnect_client_internal(state: &mut ServerState, client_id: &str) {
    let Some(context) = state.clients.remove(client_id) else {
        return;
    };
    if let Some(room_id) = context.room_id {
        let outbound = state.rooms.leave_room(&room_id, client_id);
        dispatch(state, &room_id, outbound, QueuePolicy::DisconnectOnFull);
    }
}

/// The leaving connection still hears its own departure before it is detached.
fn leave_current_room(state: &mut ServerState, client_id: &str) {
    let Some(room_id) = current_room(state, client_id) else {
        return;
    };
    let outbound = state.rooms.leave_room(&room_id, client_id);
    dispatch(state, &room_id, outbound, QueuePolicy::DisconnectOnFull);
    set_client_room(state, client_id, None);
}

fn current_room(state: &ServerState, client_id: &str) -> Option<String> {
    state
        .clients
        .get(client_id)
        .and_then(|client| client.room_id.clone())
}

fn set_client_room(state: &mut ServerState, client_id: &str, room_id: Option<String>) {
    if let Some(client) = state.clients.get_mut(client_id) {
        client.room_id = room_id;
    }
}

fn start_simulation_loop(state: SharedState) {
    tokio::spawn(async move {
        let period = Duration::from_secs_f64(1.0 / f64::from(SIM_RATE));
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            let mut guard = state.lock().await;
            step_rooms(&mut guard);
        }
    });
}

fn start_broadcast_loop(state: SharedState) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_millis(BROADCAST_MS));
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            let guard = state.lock().await;
            broadcast_snapshots(&guard);
        }
    });
}

fn step_rooms(state: &mut ServerState) {
    for (room_id, outbound) in state.rooms.step_all() {
        dispatch(state, &room_id, outbound, QueuePolicy::DisconnectOnFull);
    }
}

/// Read-only over the simulation. A full queue just misses this frame.
fn broadcast_snapshots(state: &ServerState) {
    for (room_id, snapshot) in state.rooms.snapshots() {
        let payload = match serde_json::to_string(&ServerEvent::EnvUpdate(snapshot)) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(room_id = %room_id, %err, "failed to encode snapshot");
                continue;
            }
        };
        for (client_id, client) in &state.clients {
            if client.room_id.as_deref() != Some(room_id.as_str()) {
                continue;
            }
            enqueue(client_id, client, payload.clone(), QueuePolicy::DropOnFull);
        }
    }
}

fn dispatch(state: &mut ServerState, room_id: &str, outbound: Vec<Outbound>, policy: QueuePolicy) {
    let mut failed_clients = Vec::new();
    for message in outbound {
        let payload = match serde_json::to_string(&message.event) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(room_id, %err, "failed to encode event");
                continue;
            }
        };
        for client_id in recipients(state, room_id, &message.audience) {
            let Some(client) = state.clients.get(&client_id) else {
                continue;
            };
            if enqueue(&client_id, client, payload.clone(), policy)
                && !failed_clients.contains(&client_id)
            {
                failed_clients.push(client_id);
            }
        }
    }
    for client_id in failed_clients {
        disconnect_client_internal(state, &client_id);
    }
}

/// Queues `payload` for one client. Returns true when the client has to be
/// disconnected because its queue is full.
fn enqueue(client_id: &str, client: &ClientContext, payload: String, policy: QueuePolicy) -> bool {
    if client.tx.try_send(payload).is_ok() {
        return false;
    }
    match policy {
        QueuePolicy::DropOnFull => {
            debug!(client_id, "frame dropped, queue full");
            false
        }
        QueuePolicy::DisconnectOnFull => {
            warn!(client_id, "client queue full, disconnecting");
            true
        }
    }
}

fn recipients(state: &ServerState, room_id: &str, audience: &Audience) -> Vec<String> {
    let in_room = |client: &ClientContext| client.room_id.as_deref() == Some(room_id);
    match audience {
        Audience::Connection(client_id) => state
            .clients
            .contains_key(client_id)
            .then(|| client_id.clone())
            .into_iter()
            .collect(),
        Audience::Room => state
            .clients
            .iter()
            .filter(|&(_, client)| in_room(client))
            .map(|(client_id, _)| client_id.clone())
            .collect(),
        Audience::RoomExcept(excluded) => state
            .clients
            .iter()
            .filter(|&(client_id, client)| client_id != excluded && in_room(client))
            .map(|(client_id, _)| client_id.clone())
            .collect(),
    }
}

fn send_json(state: &mut ServerState, client_id: &str, message: &Value, policy: QueuePolicy) {
    let must_disconnect = state
        .clients
        .get(client_id)
        .map(|client| enqueue(client_id, client, message.to_string(), policy))
        .unwrap_or(false);
    if must_disconnect {
        disconnect_client_internal(state, client_id);
    }
}

fn make_id(prefix: &str) -> String {
    let seq = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}_{seq}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_with_clients(
        ids: &[(&str, Option<&str>)],
    ) -> (ServerState, Vec<mpsc::Receiver<String>>) {
        state_with_capacity(ids, 2)
    }

    fn state_with_capacity(
        ids: &[(&str, Option<&str>)],
        capacity: usize,
    ) -> (ServerState, Vec<mpsc::Receiver<String>>) {
        let mut state = ServerState::new();
        let mut receivers = Vec::new();
        for (id, room_id) in ids {
            let (tx, rx) = mpsc::channel(capacity);
            state.clients.insert(
                id.to_string(),
                ClientContext {
                    tx,
                    room_id: room_id.map(str::to_string),
                },
            );
            receivers.push(rx);
        }
        (state, receivers)
    }

    #[test]
    fn room_audiences_resolve_against_membership() {
        let (state, _rx) = state_with_clients(&[
            ("conn_1", Some("abcd")),
            ("conn_2", Some("abcd")),
            ("conn_3", Some("wxyz")),
            ("conn_4", None),
        ]);
        let mut everyone = recipients(&state, "abcd", &Audience::Room);
        everyone.sort();
        assert_eq!(everyone, vec!["conn_1", "conn_2"]);
        assert_eq!(
            recipients(&state, "abcd", &Audience::RoomExcept("conn_1".to_string())),
            vec!["conn_2"]
        );
        assert_eq!(
            recipients(&state, "abcd", &Audience::Connection("conn_4".to_string())),
            vec!["conn_4"]
        );
        assert!(recipients(&state, "abcd", &Audience::Connection("gone".to_string())).is_empty());
    }

    #[test]
    fn snapshots_drop_instead_of_disconnecting() {
        let (mut state, mut receivers) = state_with_clients(&[("conn_1", None)]);
        let (room_id, _) = state.rooms.create_room("conn_1", "A".to_string());
        set_client_room(&mut state, "conn_1", Some(room_id));
        for _ in 0..5 {
            broadcast_snapshots(&state);
        }
        assert!(state.clients.contains_key("conn_1"));
        let first = receivers[0].try_recv().expect("snapshot queued");
        assert!(first.contains("\"envUpdate\""));
    }

    #[test]
    fn full_queue_on_events_disconnects_and_leaves_room() {
        let (mut state, _receivers) = state_with_clients(&[("conn_1", None)]);
        let (room_id, _) = state.rooms.create_room("conn_1", "A".to_string());
        set_client_room(&mut state, "conn_1", Some(room_id.clone()));
        let spam: Vec<Outbound> = (0..3)
            .map(|_| Outbound::to("conn_1", ServerEvent::RoomNotFound))
            .collect();
        dispatch(&mut state, &room_id, spam, QueuePolicy::DisconnectOnFull);
        assert!(!state.clients.contains_key("conn_1"));
        assert!(!state.rooms.contains(&room_id));
    }

    fn connected(ids: &[&str]) -> (SharedState, Vec<mpsc::Receiver<String>>) {
        let ids: Vec<(&str, Option<&str>)> = ids.iter().map(|id| (*id, None)).collect();
        let (state, receivers) = state_with_capacity(&ids, 64);
        (Arc::new(Mutex::new(state)), receivers)
    }

    fn drain(rx: &mut mpsc::Receiver<String>) -> Vec<Value> {
        let mut messages = Vec::new();
        while let Ok(payload) = rx.try_recv() {
            messages.push(serde_json::from_str(&payload).expect("valid json"));
        }
        messages
    }

    fn events(messages: &[Value]) -> Vec<&str> {
        messages
            .iter()
            .filter_map(|message| message["event"].as_str())
            .collect()
    }

    async fn room_of(state: &SharedState, client_id: &str) -> Option<String> {
        state.lock().await.clients[client_id].room_id.clone()
    }

    #[tokio::test]
    async fn list_rooms_replies_only_when_acked() {
        let (state, mut receivers) = connected(&["conn_1"]);
        handle_client_message(&state, "conn_1", r#"{"event":"listRooms"}"#).await;
        assert!(drain(&mut receivers[0]).is_empty());

        handle_client_message(&state, "conn_1", r#"{"event":"createRoom"}"#).await;
        drain(&mut receivers[0]);
        handle_client_message(&state, "conn_1", r#"{"event":"listRooms","ack":3}"#).await;
        let replies = drain(&mut receivers[0]);
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0]["event"], "ack");
        assert_eq!(replies[0]["id"], 3);
        assert_eq!(replies[0]["data"].as_array().map(Vec::len), Some(1));
    }

    #[tokio::test]
    async fn unknown_room_is_reported_to_the_caller_only() {
        let (state, mut receivers) = connected(&["conn_1", "conn_2"]);
        handle_client_message(&state, "conn_2", r#"{"event":"createRoom"}"#).await;
        drain(&mut receivers[1]);

        handle_client_message(&state, "conn_1", r#"{"event":"joinRoom","data":"zzzz"}"#).await;
        assert_eq!(events(&drain(&mut receivers[0])), vec!["roomNotFound"]);
        assert!(drain(&mut receivers[1]).is_empty());
        assert_eq!(room_of(&state, "conn_1").await, None);
    }

    #[tokio::test]
    async fn rejoining_own_room_resends_init_without_rejoining() {
        let (state, mut receivers) = connected(&["conn_1", "conn_2"]);
        handle_client_message(&state, "conn_1", r#"{"event":"createRoom"}"#).await;
        let room_id = room_of(&state, "conn_1").await.expect("in a room");
        let join = format!(r#"{{"event":"joinRoom","data":"{room_id}"}}"#);
        handle_client_message(&state, "conn_2", &join).await;
        drain(&mut receivers[0]);
        drain(&mut receivers[1]);

        handle_client_message(&state, "conn_1", &join).await;
        let replies = drain(&mut receivers[0]);
        assert_eq!(events(&replies), vec!["init"]);
        assert_eq!(replies[0]["data"]["yourId"], "conn_1");
        assert!(drain(&mut receivers[1]).is_empty());
        let guard = state.lock().await;
        assert_eq!(guard.rooms.get(&room_id).map(|room| room.player_count()), Some(2));
    }

    #[tokio::test]
    async fn create_room_while_in_a_room_leaves_and_deletes_the_old_one() {
        let (state, mut receivers) = connected(&["conn_1"]);
        handle_client_message(&state, "conn_1", r#"{"event":"createRoom"}"#).await;
        drain(&mut receivers[0]);

        handle_client_message(&state, "conn_1", r#"{"event":"createRoom"}"#).await;
        let second = room_of(&state, "conn_1").await.expect("in a room");
        assert_eq!(
            events(&drain(&mut receivers[0])),
            vec!["playerLeft", "roomCreated", "init"]
        );
        let guard = state.lock().await;
        // The first room was deleted before the second id was drawn.
        assert_eq!(guard.rooms.len(), 1);
        assert!(guard.rooms.contains(&second));
    }

    #[tokio::test]
    async fn join_room_while_in_a_room_moves_the_connection() {
        let (state, mut receivers) = connected(&["conn_1", "conn_2"]);
        handle_client_message(&state, "conn_1", r#"{"event":"createRoom"}"#).await;
        handle_client_message(&state, "conn_2", r#"{"event":"createRoom"}"#).await;
        let old_room = room_of(&state, "conn_1").await.expect("in a room");
        let target = room_of(&state, "conn_2").await.expect("in a room");
        drain(&mut receivers[0]);
        drain(&mut receivers[1]);

        let join = format!(r#"{{"event":"joinRoom","data":{{"roomId":"{target}"}}}}"#);
        handle_client_message(&state, "conn_1", &join).await;
        assert_eq!(room_of(&state, "conn_1").await, Some(target.clone()));
        assert_eq!(events(&drain(&mut receivers[0])), vec!["playerLeft", "init"]);
        assert_eq!(events(&drain(&mut receivers[1])), vec!["playerJoined"]);
        let guard = state.lock().await;
        assert!(!guard.rooms.contains(&old_room));
        assert_eq!(guard.rooms.get(&target).map(|room| room.player_count()), Some(2));
    }

    #[tokio::test]
    async fn room_commands_outside_a_room_are_ignored() {
        let (state, mut receivers) = connected(&["conn_1", "conn_2"]);
        handle_client_message(&state, "conn_2", r#"{"event":"createRoom"}"#).await;
        drain(&mut receivers[1]);

        handle_client_message(&state, "conn_1", r#"{"event":"grab","data":0}"#).await;
        handle_client_message(&state, "conn_1", r#"{"event":"resetWorld"}"#).await;
        assert!(drain(&mut receivers[0]).is_empty());
        assert!(drain(&mut receivers[1]).is_empty());
        assert!(state.lock().await.clients.contains_key("conn_1"));
    }

    #[test]
    fn make_id_is_unique() {
        assert_ne!(make_id("conn"), make_id("conn"));
    }
}
