// Alarm websocket: per-location sockets, correlated commands, durable subscriptions.

mod manager;
mod registry;
mod socket;

pub use manager::{AlarmManager, ConnectionState};
pub use registry::AlarmCallback;
