// Module naming follows project convention (RMP = ring buffer message
// protocol, TP = topic protocol)
pub mod config;
pub mod error;

#[allow(non_snake_case)]
pub mod Core;

#[allow(non_snake_case)]
pub mod RMP;

#[allow(non_snake_case)]
pub mod TP;

#[allow(non_snake_case)]
pub mod Bus;

#[allow(non_snake_case)]
pub mod Debug {
    pub mod StructDebug;
}

pub use config::TransportConfig;
pub use error::{BusError, Result};
pub use Bus::{BackpressurePolicy, Publisher, Subscriber, Transport, TransportBuilder};
