pub mod constants;
pub mod engine;
pub mod geometry;
pub mod rng;
pub mod room_store;
pub mod server_protocol;
pub mod server_utils;
pub mod types;
pub mod world;
