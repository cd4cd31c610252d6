/*!
 * relaynode - remote management agent for proxy nodes
 *
 * Exposes a NodeManager gRPC service through which a fleet controller pushes
 * users and inbound settings to a node and pulls host/daemon telemetry back.
 *
 * Layers:
 * - `server`: protobuf <-> model translation
 * - `facade`: validation, collaborator sequencing and envelope rendering
 * - `collab`: config store, daemon controller and status collector
 */

pub mod agent;
pub mod collab;
pub mod config;
pub mod context;
pub mod error;
pub mod facade;
pub mod logging;
pub mod model;
pub mod server;

pub use config::AgentConfig;
pub use context::CallContext;
pub use error::{NodeError, RequestError, Result};
pub use facade::NodeFacade;
pub use model::Envelope;
pub use server::NodeManagerService;
