//! Networked relay
//!
//! # Architecture
//!
//! Every node runs the same `NodeService`; its `Topology` decides the role:
//!
//! - **Leaf**: runs each call against its local backend and replies
//! - **Orchestrator**: waits until every expected participant has issued
//!   the call, fans it out to all leaves, merges their replies and hands the
//!   merged result to every participant
//!
//! # Modules
//!
//! - `protocol`: message definitions and framing
//! - `peer`: outbound requests to other nodes
//! - `topology`: node role and sorted peer list
//! - `dispatcher`: local execution or scatter/gather with reduction
//! - `node_service`: request handling front and TCP server

pub mod dispatcher;
pub mod node_service;
pub mod peer;
pub mod protocol;
pub mod topology;

pub use dispatcher::Dispatcher;
pub use node_service::{get_node_id, NodeService, ServiceFront};
pub use peer::PeerClient;
pub use protocol::{Message, PROTOCOL_VERSION};
pub use topology::Topology;
