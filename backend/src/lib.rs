// Crate root for the burst relay server modules.

pub mod app;
pub mod buffers;
pub mod config;
pub mod constants;
pub mod control;
pub mod http;
pub mod net;
pub mod registration;
pub mod relay;
pub mod transport;
pub mod utils;
pub mod ws;
