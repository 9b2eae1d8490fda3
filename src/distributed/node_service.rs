//! Node service
//!
//! Runs on every node, leaf or orchestrator. The node service:
//! - Listens for client and orchestrator connections
//! - Serves many sequential requests per connection
//! - Bounds concurrent request handling with a worker pool
//! - Drives calls through the barrier (orchestrator) or straight to the
//!   dispatcher (leaf)
//! - Turns every failure into a reply; the connection survives it

use super::dispatcher::Dispatcher;
use super::protocol::*;
use crate::barrier::Barrier;
use crate::error::DispatchError;
use crate::operation::Outcome;
use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;

/// Request-facing adapter over the barrier and the dispatcher
pub struct ServiceFront {
    dispatcher: Dispatcher,
    /// Present only on an orchestrator
    barrier: Option<Barrier>,
}

impl ServiceFront {
    pub fn new(dispatcher: Dispatcher, barrier_timeout: Duration) -> Self {
        let barrier = dispatcher
            .topology()
            .participants()
            .cloned()
            .map(|participants| Barrier::new(participants, barrier_timeout));

        Self { dispatcher, barrier }
    }

    pub fn barrier(&self) -> Option<&Barrier> {
        self.barrier.as_ref()
    }

    /// Answer one request
    pub async fn handle(&self, request: Message) -> Message {
        if let Some(version) = request.protocol_version() {
            if version != PROTOCOL_VERSION {
                log::warn!(
                    "Rejecting {}: protocol version {} (expected {})",
                    request.name(),
                    version,
                    PROTOCOL_VERSION
                );
                return Message::Error(ErrorMessage::new(format!(
                    "Protocol version mismatch: got {}, expected {}",
                    version, PROTOCOL_VERSION
                )));
            }
        }

        match request {
            Message::Call(call) => {
                let operation = call.params.operation();
                let caller = call.caller.clone();
                match self.call(call).await {
                    Ok(outcome) => Message::Reply(ReplyMessage::success(outcome)),
                    Err(e) => {
                        log::error!("{} for {} failed ({}): {}", operation, caller, e.kind(), e);
                        Message::Reply(ReplyMessage::failure(&e))
                    }
                }
            }
            Message::GetReport(_) => match self.dispatcher.remote_report().await {
                Ok(report) => Message::Report(ReportMessage::success(report)),
                Err(e) => {
                    log::error!("Report request failed ({}): {}", e.kind(), e);
                    Message::Report(ReportMessage::failure(&e))
                }
            },
            Message::AddClientKey(msg) => match self.dispatcher.provision_key(msg.key).await {
                Ok(outcome) => Message::Reply(ReplyMessage::success(outcome)),
                Err(e) => {
                    log::error!("Key provisioning failed ({}): {}", e.kind(), e);
                    Message::Reply(ReplyMessage::failure(&e))
                }
            },
            other => {
                log::warn!("Unexpected {} message from client", other.name());
                Message::Error(ErrorMessage::new(format!("Unexpected {} request", other.name())))
            }
        }
    }

    async fn call(&self, call: CallMessage) -> Result<Outcome, DispatchError> {
        match &self.barrier {
            None => self.dispatcher.execute(call.params).await,
            Some(barrier) => {
                barrier
                    .synchronize(&call.caller, call.params, |params| self.dispatcher.execute(params))
                    .await
            }
        }
    }
}

/// Node service
///
/// Accepts connections and serves each one on its own task.
pub struct NodeService {
    listener: TcpListener,
    front: Arc<ServiceFront>,
    workers: Arc<Semaphore>,
}

impl NodeService {
    /// Bind `listen_addr`; `workers` bounds concurrently handled requests
    pub async fn bind(listen_addr: &str, front: ServiceFront, workers: usize) -> Result<Self> {
        let listener = TcpListener::bind(listen_addr)
            .await
            .with_context(|| format!("Failed to bind node service on {}", listen_addr))?;

        Ok(Self {
            listener,
            front: Arc::new(front),
            workers: Arc::new(Semaphore::new(workers)),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener.local_addr().context("Failed to read local address")
    }

    /// Run the node service until the listener fails
    pub async fn run(self) -> Result<()> {
        log::info!("Node service listening on {}", self.local_addr()?);

        loop {
            let (stream, addr) = self
                .listener
                .accept()
                .await
                .context("Failed to accept connection")?;
            log::debug!("Connection from {}", addr);

            let front = self.front.clone();
            let workers = self.workers.clone();
            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, front, workers).await {
                    log::warn!("Connection from {} closed: {:#}", addr, e);
                }
            });
        }
    }
}

/// Serve requests on one connection until the client hangs up
async fn handle_connection(mut stream: TcpStream, front: Arc<ServiceFront>, workers: Arc<Semaphore>) -> Result<()> {
    stream.set_nodelay(true).ok();

    while let Some(frame) = read_frame(&mut stream).await? {
        let reply = match decode_message(&frame) {
            Ok(request) => {
                let _permit = workers.acquire().await.context("Worker pool closed")?;
                front.handle(request).await
            }
            Err(e) => {
                log::warn!("Undecodable request: {:#}", e);
                Message::Error(ErrorMessage::new(format!("{:#}", e)))
            }
        };
        write_message(&mut stream, &reply).await?;
    }

    Ok(())
}

/// Node identifier (hostname, or "unknown")
pub fn get_node_id() -> String {
    hostname::get()
        .ok()
        .and_then(|name| name.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string())
}
