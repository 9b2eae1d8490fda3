//! Scatter/gather dispatcher
//!
//! Runs one operation exactly as this node's role dictates:
//!
//! - **Leaf**: the registered handler runs against the local backend on a
//!   blocking thread.
//! - **Orchestrator**: the call is sent to every peer at once, the replies are
//!   collected in topology order and merged with the operation's reduction
//!   policy.
//!
//! Attestation and key provisioning are served here too but never go
//! through the barrier.

use super::peer::PeerClient;
use super::protocol::{AddClientKeyMessage, CallMessage, Message, ReportRequest};
use super::topology::Topology;
use crate::backend::{AttestationReport, ClientKey, Collaborators};
use crate::error::DispatchError;
use crate::operation::{OperationEntry, OperationRegistry, Outcome, Params, ReductionPolicy, ReplyKind};
use futures::future::join_all;
use std::sync::Arc;

/// Call name of the attestation bypass
pub const GET_REPORT: &str = "get-report";

/// Call name of the key provisioning bypass
pub const ADD_CLIENT_KEY: &str = "add-client-key";

pub struct Dispatcher {
    topology: Topology,
    registry: Arc<OperationRegistry>,
    collaborators: Collaborators,
    client: PeerClient,
    /// Identity this node presents to its peers
    node_id: String,
}

impl Dispatcher {
    /// Create a dispatcher; fails if the registry is incomplete
    pub fn new(
        topology: Topology,
        registry: Arc<OperationRegistry>,
        collaborators: Collaborators,
        client: PeerClient,
        node_id: impl Into<String>,
    ) -> anyhow::Result<Self> {
        registry.validate()?;
        Ok(Self {
            topology,
            registry,
            collaborators,
            client,
            node_id: node_id.into(),
        })
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// Run `params` once, locally or across all peers
    pub async fn execute(&self, params: Params) -> Result<Outcome, DispatchError> {
        let operation = params.operation();
        let entry = *self.registry.get(operation).ok_or_else(|| {
            DispatchError::violation(format!("{} has no registry entry", operation))
        })?;

        match &self.topology {
            Topology::Leaf => self.execute_local(entry, params).await,
            Topology::Orchestrator { peers, .. } => self.scatter_gather(entry, params, peers).await,
        }
    }

    async fn execute_local(&self, entry: OperationEntry, params: Params) -> Result<Outcome, DispatchError> {
        let operation = entry.operation.as_str();
        let compute = self.collaborators.compute.clone();
        log::debug!("{} running locally", entry.method);

        let outcome = tokio::task::spawn_blocking(move || (entry.handler)(compute.as_ref(), &params))
            .await
            .map_err(|e| DispatchError::OperationFailed {
                operation,
                reason: format!("handler aborted: {}", e),
            })?
            .map_err(|e| DispatchError::OperationFailed {
                operation,
                reason: format!("{:#}", e),
            })?;

        if outcome.kind() != entry.reply {
            return Err(DispatchError::violation(format!(
                "{} handler returned {:?}, expected {:?}",
                operation,
                outcome.kind(),
                entry.reply
            )));
        }
        Ok(outcome)
    }

    async fn scatter_gather(
        &self,
        entry: OperationEntry,
        params: Params,
        peers: &[String],
    ) -> Result<Outcome, DispatchError> {
        let operation = entry.operation.as_str();
        let request = Message::Call(CallMessage::new(self.node_id.as_str(), params));
        log::info!("{} -> {} peers", entry.method, peers.len());

        let replies = join_all(peers.iter().map(|peer| self.client.call(peer, &request))).await;

        let mut outcomes = Vec::with_capacity(peers.len());
        for (peer, reply) in peers.iter().zip(replies) {
            outcomes.push(peer_outcome(operation, entry.reply, peer, reply?)?);
        }

        let merged = entry.reduction.reduce(operation, peers.len(), outcomes);
        if let Err(e) = &merged {
            log::warn!("{} reduction failed: {}", operation, e);
        }
        merged
    }

    /// Attestation report of this node, or of the primary peer
    ///
    /// The orchestrator forwards to the primary peer only and returns its
    /// report verbatim.
    pub async fn remote_report(&self) -> Result<AttestationReport, DispatchError> {
        let Some(primary) = self.topology.primary() else {
            let attestor = self.collaborators.attestor.clone();
            return tokio::task::spawn_blocking(move || attestor.report_with_public_key())
                .await
                .map_err(|e| failed(GET_REPORT, format!("attestor aborted: {}", e)))?
                .map_err(|e| failed(GET_REPORT, format!("{:#}", e)));
        };

        log::info!("{} -> primary peer {}", GET_REPORT, primary);
        match self
            .client
            .call(primary, &Message::GetReport(ReportRequest::default()))
            .await?
        {
            Message::Report(reply) => match reply.report {
                Some(report) if reply.status == crate::error::STATUS_OK => Ok(report),
                _ => Err(failed(
                    GET_REPORT,
                    format!(
                        "primary peer {}: {}",
                        primary,
                        reply.error.unwrap_or_else(|| format!("status {}", reply.status))
                    ),
                )),
            },
            other => Err(unexpected_reply(primary, &other)),
        }
    }

    /// Install a client key here, or on every peer
    ///
    /// Peer statuses are merged with status-sum.
    pub async fn provision_key(&self, key: ClientKey) -> Result<Outcome, DispatchError> {
        let peers = self.topology.peers();
        if peers.is_empty() {
            let keys = self.collaborators.keys.clone();
            let status = tokio::task::spawn_blocking(move || keys.install_client_key(&key))
                .await
                .map_err(|e| failed(ADD_CLIENT_KEY, format!("key store aborted: {}", e)))?
                .map_err(|e| failed(ADD_CLIENT_KEY, format!("{:#}", e)))?;
            return Ok(Outcome::Status(status));
        }

        log::info!("{} -> {} peers", ADD_CLIENT_KEY, peers.len());
        let request = Message::AddClientKey(AddClientKeyMessage::new(key));
        let replies = join_all(peers.iter().map(|peer| self.client.call(peer, &request))).await;

        let mut statuses = Vec::with_capacity(peers.len());
        for (peer, reply) in peers.iter().zip(replies) {
            statuses.push(peer_outcome(ADD_CLIENT_KEY, ReplyKind::Status, peer, reply?)?);
        }
        ReductionPolicy::StatusSum.reduce(ADD_CLIENT_KEY, peers.len(), statuses)
    }
}

fn failed(operation: &'static str, reason: String) -> DispatchError {
    DispatchError::OperationFailed { operation, reason }
}

fn unexpected_reply(peer: &str, reply: &Message) -> DispatchError {
    match reply {
        Message::Error(e) => DispatchError::violation(format!("peer {} rejected the request: {}", peer, e.error)),
        other => DispatchError::violation(format!("peer {} answered with {}", peer, other.name())),
    }
}

/// Typed outcome of one peer reply
fn peer_outcome(
    operation: &'static str,
    expected: ReplyKind,
    peer: &str,
    reply: Message,
) -> Result<Outcome, DispatchError> {
    let reply = match reply {
        Message::Reply(reply) => reply,
        other => return Err(unexpected_reply(peer, &other)),
    };

    let outcome = reply
        .into_result()
        .map_err(|reason| failed(operation, format!("peer {}: {}", peer, reason)))?;

    if outcome.kind() != expected {
        return Err(DispatchError::violation(format!(
            "peer {} replied to {} with {:?}, expected {:?}",
            peer,
            operation,
            outcome.kind(),
            expected
        )));
    }
    Ok(outcome)
}
