// Per-process context and the publisher/subscriber roles built on it.

mod builder;
mod publisher;
mod subscriber;
mod transport;

pub use builder::TransportBuilder;
pub use publisher::{BackpressurePolicy, Publisher};
pub use subscriber::Subscriber;
pub use transport::{Transport, TransportStats};
