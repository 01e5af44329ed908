//! Blobfield Hub
//!
//! Real-time state server for the Blobfield installation. Visitors connect
//! over WebSocket, answer a short identity prompt and become a blob whose
//! look slowly blends with everyone else in the room.
//!
//! # Architecture
//!
//! - **Session**: one record per connection, keyed by a sequential id
//! - **World**: lobby-wide intent, energy and mood
//! - **Operator**: global pause and reset
//! - **Hub**: owns all of the above; every message and clock step is one
//!   discrete mutation
//! - **Runner**: the single task that drives a hub from its command queue
//!   and a 10 Hz clock
//! - **Server**: axum router with `/ws`, `/health` and static assets
//!
//! # Usage
//!
//! ```no_run
//! use blobfield_hub::{BlobfieldServer, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = BlobfieldServer::new(ServerConfig::from_env()?);
//!     server.serve().await?;
//!     Ok(())
//! }
//! ```

pub mod clock;
pub mod config;
pub mod error;
pub mod hub;
pub mod operator;
pub mod protocol;
pub mod runner;
pub mod server;
pub mod session;
pub mod world;

pub use clock::{SimulationClock, DEFAULT_TICK_INTERVAL, TICKS_PER_SECOND};
pub use config::ServerConfig;
pub use error::{Error, Result};
pub use hub::{Hub, HubConfig, HubStatus, CROSS_INFLUENCE, IDENTITY_PULL};
pub use operator::{OperatorAction, OperatorController, OperatorState};
pub use protocol::{ClientMessage, PeerView, ServerMessage};
pub use runner::{spawn_hub, HubHandle};
pub use server::BlobfieldServer;
pub use session::{CapacityExceeded, Session, SessionId, SessionRegistry, Stage};
pub use world::{Mood, WorldState};
