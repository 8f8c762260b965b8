//! Agent bridge — validates chat requests and runs them through the external
//! agent interpreter, buffered or as Server-Sent Events.

pub mod process;
pub mod routes;
pub mod schema;
pub mod sse;

pub use process::{AgentChunk, AgentEvent, AgentProcess, AgentScript};
pub use routes::{BridgeState, bridge_routes, health_routes};
pub use schema::{AgentSpec, ChatTurn, LanggraphRequest, SwarmRequest};
