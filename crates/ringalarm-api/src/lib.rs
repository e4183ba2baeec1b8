// ringalarm-api: Async Rust client for the Ring alarm cloud (REST + alarm websocket)

pub mod alarm;
mod auth;
pub mod body;
pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod models;
mod queue;
pub mod session;
pub mod socketio;
mod transport;

pub use alarm::{AlarmCallback, AlarmManager, ConnectionState};
pub use body::Body;
pub use cache::{CacheRecord, CredentialCache, FileCache, MemoryCache};
pub use client::RingClient;
pub use config::{Endpoints, ReconnectConfig, SessionConfig};
pub use error::{AuthError, Error};
pub use http::{ApiRequest, ApiResponse};
pub use models::{AlarmMessage, AlarmMode, Station};
pub use session::{AuthPhase, Session};
