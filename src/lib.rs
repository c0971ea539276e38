//! Realtime broadcast chat: a session registry, a single-worker broadcast
//! dispatcher, and a line-JSON TCP transport in front of them.

pub mod config;
pub mod error;
pub mod protocol;
pub mod registry;
pub mod server;

pub use config::ServerConfig;
pub use error::{ConfigError, ProtocolError, RegistryError};
pub use protocol::{ChatMessage, ClientPacket, ConnectionId, JoinPayload, ServerPacket};
pub use registry::SessionRegistry;
pub use server::dispatcher::{Audience, DispatchCommand, Dispatcher, Outbox, Phase};
pub use server::Server;
